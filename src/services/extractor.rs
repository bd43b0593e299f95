//! 附件解析服务 - 业务能力层
//!
//! 每种 `AttachmentKind` 对应一个纯函数，新增格式只需要新增一个变体和一个函数。
//! 不认识的类型标签直接返回 `UnsupportedFormat`，不做猜测

use std::borrow::Cow;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use lopdf::Document;
use tracing::debug;

use crate::error::ExtractionError;
use crate::models::{Attachment, AttachmentKind, ExtractedContent, Table};

/// 单个格式的解析函数
pub type ExtractFn = fn(&[u8]) -> Result<ExtractedContent, String>;

/// 无法提取文字的 PDF 页面标记
pub fn unextractable_marker(page: u32) -> String {
    format!("[unextractable content: page {}]", page)
}

/// PDF 页面中图片的标记
pub fn unextractable_image_marker(page: u32, image: usize) -> String {
    format!("[unextractable content: page {}, image {}]", page, image)
}

/// 附件解析能力
pub trait Extractor: Send + Sync {
    fn extract(&self, attachment: &Attachment) -> Result<ExtractedContent, ExtractionError>;
}

/// 按类型分发的解析器注册表
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractorRegistry;

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self
    }

    /// 类型对应的解析函数
    pub fn extract_fn(kind: AttachmentKind) -> ExtractFn {
        match kind {
            AttachmentKind::Pdf => extract_pdf,
            AttachmentKind::Csv => extract_csv,
            AttachmentKind::Json => extract_json,
            AttachmentKind::Spreadsheet => extract_spreadsheet,
            AttachmentKind::PlainText => extract_plain_text,
        }
    }
}

impl Extractor for ExtractorRegistry {
    fn extract(&self, attachment: &Attachment) -> Result<ExtractedContent, ExtractionError> {
        let kind = AttachmentKind::from_tag(&attachment.type_tag).ok_or_else(|| {
            ExtractionError::UnsupportedFormat {
                attachment: attachment.name.clone(),
                type_tag: attachment.type_tag.clone(),
            }
        })?;

        if attachment.content.is_empty() {
            return Err(ExtractionError::Empty {
                attachment: attachment.name.clone(),
            });
        }

        debug!(
            "解析附件 {} ({}), {} 字节",
            attachment.name,
            kind,
            attachment.content.len()
        );

        Self::extract_fn(kind)(&attachment.content).map_err(|reason| ExtractionError::Corrupt {
            attachment: attachment.name.clone(),
            kind,
            reason,
        })
    }
}

fn extract_plain_text(blob: &[u8]) -> Result<ExtractedContent, String> {
    Ok(ExtractedContent::Text(
        String::from_utf8_lossy(blob).trim().to_string(),
    ))
}

fn extract_json(blob: &[u8]) -> Result<ExtractedContent, String> {
    let text = std::str::from_utf8(blob).map_err(|e| format!("不是 UTF-8 文本: {}", e))?;
    // 只做校验，原文保留，避免大数字经过 f64 丢精度
    serde_json::from_str::<serde_json::Value>(text).map_err(|e| format!("JSON 解析失败: {}", e))?;
    Ok(ExtractedContent::Text(text.trim().to_string()))
}

fn extract_csv(blob: &[u8]) -> Result<ExtractedContent, String> {
    let text = decode_text(blob);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format!("CSV 表头解析失败: {}", e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| format!("CSV 行解析失败: {}", e))?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }

    Ok(ExtractedContent::Tables(vec![Table {
        name: None,
        headers,
        rows,
    }]))
}

/// UTF-8 优先，否则按 Latin-1 逐字节解码（不会失败）
fn decode_text(blob: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(blob) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            debug!("附件不是 UTF-8，按 Latin-1 解码");
            Cow::Owned(blob.iter().map(|&b| char::from(b)).collect())
        }
    }
}

fn extract_spreadsheet(blob: &[u8]) -> Result<ExtractedContent, String> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(blob.to_vec()))
        .map_err(|e| format!("无法打开表格: {}", e))?;

    let mut tables = Vec::new();
    for sheet_name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| format!("无法读取工作表 {}: {}", sheet_name, e))?;

        let mut rows = range.rows().map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
        let Some(headers) = rows.next() else {
            continue;
        };

        tables.push(Table {
            name: Some(sheet_name),
            headers,
            rows: rows.collect(),
        });
    }

    if tables.is_empty() {
        return Err("表格中没有数据".to_string());
    }
    Ok(ExtractedContent::Tables(tables))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn extract_pdf(blob: &[u8]) -> Result<ExtractedContent, String> {
    let document = Document::load_mem(blob).map_err(|e| format!("PDF 解析失败: {}", e))?;

    let pages = document.get_pages();
    if pages.is_empty() {
        return Err("PDF 没有页面".to_string());
    }

    let mut parts = Vec::with_capacity(pages.len());
    for (page_number, page_id) in &pages {
        match document.extract_text(&[*page_number]) {
            Ok(text) if !text.trim().is_empty() => parts.push(text.trim().to_string()),
            Ok(_) => parts.push(unextractable_marker(*page_number)),
            Err(e) => parts.push(format!(
                "[unextractable content: page {}: {}]",
                page_number, e
            )),
        }

        // 图片本身无法转成文字，只留下位置标记
        match document.get_page_images(*page_id) {
            Ok(images) => parts.extend(
                (1..=images.len()).map(|image| unextractable_image_marker(*page_number, image)),
            ),
            Err(e) => debug!("第 {} 页的图片资源无法读取: {}", page_number, e),
        }
    }

    Ok(ExtractedContent::Text(parts.join("\n\n")))
}
