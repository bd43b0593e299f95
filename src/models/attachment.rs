use std::fmt;

use serde::{Deserialize, Serialize};

/// 支持的附件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Pdf,
    Csv,
    Json,
    Spreadsheet,
    PlainText,
}

impl AttachmentKind {
    /// 全部类型
    pub const ALL: [AttachmentKind; 5] = [
        AttachmentKind::Pdf,
        AttachmentKind::Csv,
        AttachmentKind::Json,
        AttachmentKind::Spreadsheet,
        AttachmentKind::PlainText,
    ];

    /// 标准名称
    pub fn name(self) -> &'static str {
        match self {
            AttachmentKind::Pdf => "pdf",
            AttachmentKind::Csv => "csv",
            AttachmentKind::Json => "json",
            AttachmentKind::Spreadsheet => "spreadsheet",
            AttachmentKind::PlainText => "plain-text",
        }
    }

    /// 从类型标签解析（扩展名或 MIME 类型，忽略大小写）
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        // MIME 参数（如 charset）不参与判断
        let tag = tag.split(';').next().unwrap_or_default().trim();
        let tag = tag.strip_prefix('.').unwrap_or(tag);

        match tag {
            "pdf" | "application/pdf" => Some(AttachmentKind::Pdf),
            "csv" | "text/csv" => Some(AttachmentKind::Csv),
            "json" | "application/json" => Some(AttachmentKind::Json),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" | "spreadsheet"
            | "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.oasis.opendocument.spreadsheet" => Some(AttachmentKind::Spreadsheet),
            "txt" | "text" | "md" | "plain-text" | "text/plain" | "text/markdown" => {
                Some(AttachmentKind::PlainText)
            }
            _ => None,
        }
    }

    /// 从链接地址的扩展名推断类型，查询串和锚点不参与判断
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let file_name = path.rsplit('/').next().unwrap_or_default();
        let (_, ext) = file_name.rsplit_once('.')?;
        Self::from_tag(ext)
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 题目附带的原始附件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// 附件标识（来源地址）
    pub name: String,
    /// 声明的类型标签
    pub type_tag: String,
    /// 原始字节
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            content,
        }
    }
}

/// 表格数据，单元格一律保留为文本
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    /// 工作表名称（CSV 没有）
    pub name: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// 渲染为提示词中的文本表格
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(name) = &self.name {
            out.push_str(&format!("Sheet: {}\n", name));
        }
        out.push_str(&self.headers.join(" | "));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.join(" | "));
            out.push('\n');
        }
        out.push_str(&format!("({} rows)", self.rows.len()));
        out
    }
}

/// 附件解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedContent {
    Text(String),
    Tables(Vec<Table>),
}

impl ExtractedContent {
    /// 渲染为提示词文本
    pub fn render(&self) -> String {
        match self {
            ExtractedContent::Text(text) => text.clone(),
            ExtractedContent::Tables(tables) => tables
                .iter()
                .map(Table::render)
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_tag() {
        assert_eq!(AttachmentKind::from_tag("CSV"), Some(AttachmentKind::Csv));
        assert_eq!(AttachmentKind::from_tag(".xlsx"), Some(AttachmentKind::Spreadsheet));
        assert_eq!(
            AttachmentKind::from_tag("application/json; charset=utf-8"),
            Some(AttachmentKind::Json)
        );
        assert_eq!(AttachmentKind::from_tag("image/png"), None);
        assert_eq!(AttachmentKind::from_tag(""), None);
    }

    #[test]
    fn test_kind_from_url() {
        assert_eq!(
            AttachmentKind::from_url("https://example.com/data/sales.csv?v=2"),
            Some(AttachmentKind::Csv)
        );
        assert_eq!(
            AttachmentKind::from_url("https://example.com/report.PDF#page=2"),
            Some(AttachmentKind::Pdf)
        );
        assert_eq!(AttachmentKind::from_url("https://example.com/submit"), None);
    }

    #[test]
    fn test_table_render_keeps_order() {
        let table = Table {
            name: None,
            headers: vec!["city".into(), "population".into()],
            rows: vec![vec!["Oslo".into(), "0709000".into()]],
        };
        assert_eq!(table.render(), "city | population\nOslo | 0709000\n(1 rows)");
    }
}
