//! 题目页面解析 - 业务能力层
//!
//! 把浏览器渲染后的页面内容解析成题干、提交地址、答案格式和附件链接。
//! 纯函数，不访问网络

use std::collections::HashSet;
use std::sync::OnceLock;

use base64::{engine::general_purpose, Engine as _};
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::models::{AnswerFormat, AttachmentKind};

/// 在页面中执行的读取脚本
///
/// 优先取 `#result` 的 HTML，同时带上 body 文本和所有链接
pub const READ_PAGE_JS: &str = r#"
(() => {
    const result = document.querySelector('#result');
    const links = Array.from(document.querySelectorAll('a[href]'))
        .map(a => ({ text: (a.textContent || '').trim(), href: a.href }));
    return {
        html: result ? result.innerHTML : '',
        text: document.body ? document.body.innerText : '',
        links: links
    };
})()
"#;

/// 页面上的一个链接
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageLink {
    #[serde(default)]
    pub text: String,
    pub href: String,
}

/// `READ_PAGE_JS` 的返回值
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RenderedContent {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub links: Vec<PageLink>,
}

/// 待下载的附件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentLink {
    pub url: String,
    /// 扩展名形式的类型标签
    pub type_tag: String,
}

/// 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPage {
    pub question: String,
    pub submit_url: String,
    pub answer_format: AnswerFormat,
    pub attachment_links: Vec<AttachmentLink>,
    /// 页面正文，和题干相同或为空时为 `None`
    pub page_text: Option<String>,
}

/// 页面正文最多保留的字符数
pub const PAGE_TEXT_LIMIT: usize = 3000;

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect("static regex is valid"))
        }
    };
}

static_regex!(atob_backtick_re, r"atob\(`([^`]+)`\)");
static_regex!(atob_quoted_re, r#"atob\(["']([^"']+)["']\)"#);
static_regex!(base64_label_re, r"base64[:\s]+([A-Za-z0-9+/=]{16,})");
static_regex!(href_re, r#"(?i)href\s*=\s*["']([^"']+)["']"#);
static_regex!(
    hidden_block_re,
    r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>"
);
static_regex!(
    block_tag_re,
    r"(?i)<br\s*/?>|</(p|div|li|tr|h[1-6]|pre|table)>"
);
static_regex!(tag_re, r"<[^>]+>");
static_regex!(blank_lines_re, r"\n\s*\n\s*\n+");
static_regex!(submit_path_re, r#"https?://[^\s<>"'\)]+/submit[^\s<>"'\)]*"#);
static_regex!(post_to_re, r#"(?i)post.*?to\s+(https?://[^\s<>"'\)]+)"#);
static_regex!(submit_to_re, r#"(?i)submit.*?to\s+(https?://[^\s<>"'\)]+)"#);
static_regex!(post_to_path_re, r#"(?i)post\b.*?\bto\s+(/[^\s<>"'\)]*)"#);
static_regex!(sample_answer_re, r#""answer"\s*:\s*("[^"]*"|[^,}\s]+)"#);

/// 解析渲染后的页面
///
/// 题干为空时返回错误原因
pub fn parse_page(page_url: &str, rendered: &RenderedContent) -> Result<ParsedPage, String> {
    let raw = if rendered.html.trim().is_empty() {
        rendered.text.clone()
    } else {
        rendered.html.clone()
    };
    let raw = decode_embedded_base64(&raw).unwrap_or(raw);

    let question = html_to_text(&raw);
    if question.is_empty() {
        return Err("页面中没有题目内容".to_string());
    }

    let submit_url = find_submit_url(page_url, &question, &raw);
    let answer_format = detect_answer_format(&question);

    let mut hrefs: Vec<String> = rendered.links.iter().map(|l| l.href.clone()).collect();
    hrefs.extend(
        href_re()
            .captures_iter(&raw)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
    );
    let attachment_links = collect_attachment_links(page_url, &hrefs, &submit_url);
    let page_text = page_text_beside(&question, &rendered.text);

    debug!(
        "页面解析完成: 题干 {} 字符, 格式 {}, 附件 {} 个, 提交地址 {}",
        question.chars().count(),
        answer_format,
        attachment_links.len(),
        submit_url
    );

    Ok(ParsedPage {
        question,
        submit_url,
        answer_format,
        attachment_links,
        page_text,
    })
}

/// body 文本里可能有题干之外的说明（示例、提示），与题干不同时保留前 `PAGE_TEXT_LIMIT` 个字符
fn page_text_beside(question: &str, body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() || body == question.trim() {
        return None;
    }
    Some(body.chars().take(PAGE_TEXT_LIMIT).collect())
}

/// 解码页面中通过 `atob(...)` 或 `base64:` 嵌入的内容
pub fn decode_embedded_base64(content: &str) -> Option<String> {
    if !content.contains("atob") && !content.to_ascii_lowercase().contains("base64") {
        return None;
    }

    [atob_backtick_re(), atob_quoted_re(), base64_label_re()]
        .into_iter()
        .filter_map(|re| re.captures(content))
        .filter_map(|c| c.get(1))
        .find_map(|m| {
            let cleaned: String = m.as_str().split_whitespace().collect();
            let bytes = general_purpose::STANDARD.decode(cleaned).ok()?;
            String::from_utf8(bytes).ok()
        })
}

/// 把 HTML 转成纯文本
pub fn html_to_text(html: &str) -> String {
    let text = hidden_block_re().replace_all(html, "");
    let text = block_tag_re().replace_all(&text, "\n");
    let text = tag_re().replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let text: Vec<&str> = text.lines().map(str::trim_end).collect();
    blank_lines_re()
        .replace_all(&text.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// 查找提交地址，找不到时使用页面域名下的 `/submit`
pub fn find_submit_url(page_url: &str, text: &str, raw: &str) -> String {
    for content in [text, raw] {
        if let Some(m) = submit_path_re().find(content) {
            return clean_url(m.as_str());
        }
        for re in [post_to_re(), submit_to_re()] {
            if let Some(m) = re.captures(content).and_then(|c| c.get(1)) {
                return clean_url(m.as_str());
            }
        }
        if let Some(m) = post_to_path_re().captures(content).and_then(|c| c.get(1)) {
            if let Some(url) = resolve_link(page_url, m.as_str()) {
                return clean_url(&url);
            }
        }
    }

    resolve_link(page_url, "/submit").unwrap_or_else(|| format!("{}/submit", page_url.trim_end_matches('/')))
}

fn clean_url(url: &str) -> String {
    url.trim_end_matches(['.', ',', ';', ':']).to_string()
}

/// 根据题干推断答案格式
///
/// 先看示例提交内容里 `"answer":` 的取值，再看措辞
pub fn detect_answer_format(question: &str) -> AnswerFormat {
    if let Some(sample) = sample_answer_re()
        .captures(question)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
    {
        let lowered = sample.to_ascii_lowercase();
        if lowered == "true" || lowered == "false" {
            return AnswerFormat::Boolean;
        }
        if sample.parse::<f64>().is_ok() {
            return AnswerFormat::Number;
        }
        if lowered.contains("base64") || lowered.starts_with("\"data:") {
            return AnswerFormat::Base64;
        }
    }

    let lowered = question.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| lowered.contains(w));

    if mentions(&["base64", "data uri", "data:image", "as a file", "image file"]) {
        AnswerFormat::Base64
    } else if mentions(&["true or false", "true/false", "boolean", "yes or no"]) {
        AnswerFormat::Boolean
    } else if mentions(&[
        "how many",
        "sum of",
        "count",
        "total",
        "average",
        "mean",
        "median",
        "number",
    ]) {
        AnswerFormat::Number
    } else {
        AnswerFormat::String
    }
}

fn resolve_link(page_url: &str, href: &str) -> Option<String> {
    match Url::parse(href) {
        Ok(url) => Some(url.to_string()),
        Err(_) => Url::parse(page_url).ok()?.join(href).ok().map(|u| u.to_string()),
    }
}

fn collect_attachment_links(page_url: &str, hrefs: &[String], submit_url: &str) -> Vec<AttachmentLink> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for href in hrefs {
        let Some(url) = resolve_link(page_url, href) else {
            continue;
        };
        if url == submit_url || AttachmentKind::from_url(&url).is_none() {
            continue;
        }
        if !seen.insert(url.clone()) {
            continue;
        }
        let type_tag = extension_of(&url);
        links.push(AttachmentLink { url, type_tag });
    }

    links
}

fn extension_of(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://quiz.example.net/demo?email=a%40b.c";

    #[test]
    fn test_decode_atob_payload() {
        // "Q1. What is the sum?"
        let html = "<script>document.querySelector('#result').innerHTML = atob(`UTEuIFdoYXQgaXMgdGhlIHN1bT8=`)</script>";
        assert_eq!(decode_embedded_base64(html).as_deref(), Some("Q1. What is the sum?"));
        assert_eq!(decode_embedded_base64("plain question"), None);
    }

    #[test]
    fn test_html_to_text() {
        let html = "<p>Download <a href=\"/data.csv\">file</a>.</p><style>p{}</style><div>Sum the &quot;value&quot; column</div>";
        assert_eq!(html_to_text(html), "Download file.\nSum the \"value\" column");
    }

    #[test]
    fn test_submit_url_patterns() {
        let text = "Post your answer to https://quiz.example.net/submit with this JSON payload.";
        assert_eq!(
            find_submit_url(PAGE_URL, text, text),
            "https://quiz.example.net/submit"
        );

        let text = "POST the JSON to https://grader.example.org/api/answers.";
        assert_eq!(
            find_submit_url(PAGE_URL, text, text),
            "https://grader.example.org/api/answers"
        );

        let text = "Post your answer to /answer with the url of this page.";
        assert_eq!(
            find_submit_url(PAGE_URL, text, text),
            "https://quiz.example.net/answer"
        );

        assert_eq!(
            find_submit_url(PAGE_URL, "no hints here", ""),
            "https://quiz.example.net/submit"
        );
    }

    #[test]
    fn test_detect_answer_format_from_sample_payload() {
        let q = r#"{"email": "you@example.com", "url": "...", "answer": 12345}"#;
        assert_eq!(detect_answer_format(q), AnswerFormat::Number);
        let q = r#"{"answer": true}"#;
        assert_eq!(detect_answer_format(q), AnswerFormat::Boolean);
        let q = r#"{"answer": "data:image/png;base64,..."}"#;
        assert_eq!(detect_answer_format(q), AnswerFormat::Base64);
    }

    #[test]
    fn test_detect_answer_format_from_wording() {
        assert_eq!(
            detect_answer_format("How many rows have a value above 10?"),
            AnswerFormat::Number
        );
        assert_eq!(
            detect_answer_format("Answer true or false: is the trend increasing?"),
            AnswerFormat::Boolean
        );
        assert_eq!(
            detect_answer_format("Attach the chart as a base64 PNG."),
            AnswerFormat::Base64
        );
        assert_eq!(
            detect_answer_format("Which city has the highest sales?"),
            AnswerFormat::String
        );
    }

    #[test]
    fn test_parse_page_collects_attachments() {
        let rendered = RenderedContent {
            html: "<p>What is the sum of the \"value\" column in <a href=\"/files/data.csv\">this file</a>?</p>\
                   <p>Post your answer to https://quiz.example.net/submit</p>"
                .to_string(),
            text: String::new(),
            links: vec![
                PageLink {
                    text: "this file".into(),
                    href: "https://quiz.example.net/files/data.csv".into(),
                },
                PageLink {
                    text: "report".into(),
                    href: "https://quiz.example.net/files/report.pdf?dl=1".into(),
                },
                PageLink {
                    text: "home".into(),
                    href: "https://quiz.example.net/".into(),
                },
            ],
        };

        let parsed = parse_page(PAGE_URL, &rendered).unwrap();
        assert_eq!(parsed.submit_url, "https://quiz.example.net/submit");
        assert_eq!(parsed.answer_format, AnswerFormat::Number);
        assert_eq!(
            parsed.attachment_links,
            vec![
                AttachmentLink {
                    url: "https://quiz.example.net/files/data.csv".into(),
                    type_tag: "csv".into(),
                },
                AttachmentLink {
                    url: "https://quiz.example.net/files/report.pdf?dl=1".into(),
                    type_tag: "pdf".into(),
                },
            ]
        );
        assert!(parsed.question.starts_with("What is the sum"));
    }

    #[test]
    fn test_parse_page_falls_back_to_body_text() {
        let rendered = RenderedContent {
            html: "   ".into(),
            text: "Name the capital of Norway.".into(),
            links: vec![],
        };
        let parsed = parse_page(PAGE_URL, &rendered).unwrap();
        assert_eq!(parsed.question, "Name the capital of Norway.");
        assert_eq!(parsed.answer_format, AnswerFormat::String);
    }

    #[test]
    fn test_parse_empty_page_fails() {
        assert!(parse_page(PAGE_URL, &RenderedContent::default()).is_err());
    }

    #[test]
    fn test_page_text_is_kept_when_it_adds_to_the_question() {
        let rendered = RenderedContent {
            html: "<p>What is the total?</p>".into(),
            text: format!("What is the total?\nHint: ignore rows marked void.\n{}", "x".repeat(5000)),
            links: vec![],
        };
        let parsed = parse_page(PAGE_URL, &rendered).unwrap();
        let page_text = parsed.page_text.expect("body text differs from question");
        assert!(page_text.contains("Hint: ignore rows marked void."));
        assert_eq!(page_text.chars().count(), PAGE_TEXT_LIMIT);

        let same = RenderedContent {
            html: String::new(),
            text: "  Name the capital of Norway.\n".into(),
            links: vec![],
        };
        assert_eq!(parse_page(PAGE_URL, &same).unwrap().page_text, None);
    }
}
