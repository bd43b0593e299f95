//! 答案校验服务 - 业务能力层
//!
//! 把模型的原始输出按照题目声明的格式规范化，不合法时返回 `ValidationError`。
//! 纯函数，没有副作用

use std::sync::OnceLock;

use base64::{engine::general_purpose, Engine as _};
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::error::ValidationError;
use crate::models::{AnswerFormat, AnswerValue};

/// 成对的引号
const QUOTE_PAIRS: [(char, char); 5] = [('"', '"'), ('\'', '\''), ('`', '`'), ('“', '”'), ('‘', '’')];

fn numeral_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("numeral regex is valid")
    })
}

fn answer_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^\s*(?:\*\*)?(?:final\s+)?answer(?:\*\*)?\s*[:=]\s*(.+?)\s*$")
            .expect("answer line regex is valid")
    })
}

/// 按期望格式校验并规范化
pub fn coerce(raw_text: &str, expected: AnswerFormat) -> Result<AnswerValue, ValidationError> {
    match expected {
        AnswerFormat::Number => coerce_number(raw_text),
        AnswerFormat::String => coerce_string(raw_text),
        AnswerFormat::Boolean => coerce_boolean(raw_text),
        AnswerFormat::Base64 => coerce_base64(raw_text),
    }
}

fn coerce_number(raw_text: &str) -> Result<AnswerValue, ValidationError> {
    let text = raw_text.trim();
    if !numeral_re().is_match(text) {
        return Err(ValidationError::new(
            AnswerFormat::Number,
            raw_text,
            "不是合法的数字",
        ));
    }

    let is_integral = !text.contains(['.', 'e', 'E']);
    if is_integral {
        if let Ok(value) = text.parse::<i64>() {
            return Ok(AnswerValue::Integer(value));
        }
    }

    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(AnswerValue::Float(value)),
        _ => Err(ValidationError::new(
            AnswerFormat::Number,
            raw_text,
            "数值超出范围",
        )),
    }
}

fn coerce_string(raw_text: &str) -> Result<AnswerValue, ValidationError> {
    let text = strip_quotes(raw_text.trim());
    if text.is_empty() {
        return Err(ValidationError::new(AnswerFormat::String, raw_text, "答案为空"));
    }
    Ok(AnswerValue::Text(text.to_string()))
}

fn coerce_boolean(raw_text: &str) -> Result<AnswerValue, ValidationError> {
    match raw_text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(AnswerValue::Boolean(true)),
        "false" | "no" | "0" => Ok(AnswerValue::Boolean(false)),
        _ => Err(ValidationError::new(
            AnswerFormat::Boolean,
            raw_text,
            "只接受 true/false、yes/no、1/0",
        )),
    }
}

fn coerce_base64(raw_text: &str) -> Result<AnswerValue, ValidationError> {
    let text = raw_text.trim();
    // data URI 整体保留，只校验 payload
    let payload = match text.strip_prefix("data:") {
        Some(rest) => match rest.split_once(";base64,") {
            Some((_, payload)) => payload,
            None => {
                return Err(ValidationError::new(
                    AnswerFormat::Base64,
                    raw_text,
                    "data URI 缺少 ;base64, 标记",
                ))
            }
        },
        None => text,
    };

    if payload.is_empty() {
        return Err(ValidationError::new(AnswerFormat::Base64, raw_text, "内容为空"));
    }

    general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ValidationError::new(AnswerFormat::Base64, raw_text, e.to_string()))?;

    Ok(AnswerValue::Base64(text.to_string()))
}

/// 去掉一层成对的引号
fn strip_quotes(text: &str) -> &str {
    for (open, close) in QUOTE_PAIRS {
        if let Some(inner) = text.strip_prefix(open).and_then(|t| t.strip_suffix(close)) {
            return inner;
        }
    }
    text
}

/// 从模型回复中取出答案部分
///
/// 依次尝试：去掉 Markdown 代码块、JSON 对象中的 `answer` 字段、`Answer: ...` 行；
/// 都不匹配时原样返回
pub fn unwrap_model_output(raw: &str) -> String {
    let text = strip_code_fence(raw.trim());

    if text.starts_with('{') {
        if let Ok(JsonValue::Object(map)) = serde_json::from_str::<JsonValue>(text) {
            if let Some(answer) = map.get("answer") {
                return match answer {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
            }
        }
    }

    if let Some(captures) = answer_line_re().captures_iter(text).last() {
        if let Some(value) = captures.get(1) {
            return value.as_str().to_string();
        }
    }

    text.to_string()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    // 第一行可能是语言标记
    match body.split_once('\n') {
        Some((first, remaining)) if !first.trim().contains(' ') => remaining.trim(),
        _ => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_accepts_integers_and_floats() {
        assert_eq!(coerce(" 42 ", AnswerFormat::Number), Ok(AnswerValue::Integer(42)));
        assert_eq!(coerce("-7", AnswerFormat::Number), Ok(AnswerValue::Integer(-7)));
        assert_eq!(coerce("3.25", AnswerFormat::Number), Ok(AnswerValue::Float(3.25)));
        assert_eq!(coerce(".5", AnswerFormat::Number), Ok(AnswerValue::Float(0.5)));
        assert_eq!(coerce("1e3", AnswerFormat::Number), Ok(AnswerValue::Float(1000.0)));
    }

    #[test]
    fn test_number_rejects_decorations() {
        for bad in ["1,000", "12 kg", "$5", "abc", "", "NaN", "inf", "1.2.3"] {
            let err = coerce(bad, AnswerFormat::Number).unwrap_err();
            assert_eq!(err.expected, AnswerFormat::Number);
            assert_eq!(err.text, bad);
        }
    }

    #[test]
    fn test_huge_integer_falls_back_to_float() {
        let value = coerce("123456789012345678901234", AnswerFormat::Number).unwrap();
        assert!(matches!(value, AnswerValue::Float(_)));
    }

    #[test]
    fn test_string_strips_whitespace_and_quotes() {
        assert_eq!(
            coerce("  \"Paris\"\n", AnswerFormat::String),
            Ok(AnswerValue::Text("Paris".into()))
        );
        assert_eq!(
            coerce("“New York”", AnswerFormat::String),
            Ok(AnswerValue::Text("New York".into()))
        );
        // 不成对的引号保留
        assert_eq!(
            coerce("it's", AnswerFormat::String),
            Ok(AnswerValue::Text("it's".into()))
        );
        assert!(coerce("  \"\" ", AnswerFormat::String).is_err());
    }

    #[test]
    fn test_boolean_spellings() {
        for t in ["true", "TRUE", "Yes", "1"] {
            assert_eq!(coerce(t, AnswerFormat::Boolean), Ok(AnswerValue::Boolean(true)));
        }
        for f in ["false", "No", " 0 "] {
            assert_eq!(coerce(f, AnswerFormat::Boolean), Ok(AnswerValue::Boolean(false)));
        }
        assert!(coerce("maybe", AnswerFormat::Boolean).is_err());
        assert!(coerce("yes.", AnswerFormat::Boolean).is_err());
    }

    #[test]
    fn test_base64_validation() {
        assert_eq!(
            coerce("aGVsbG8=", AnswerFormat::Base64),
            Ok(AnswerValue::Base64("aGVsbG8=".into()))
        );
        assert_eq!(
            coerce("data:image/png;base64,aGVsbG8=", AnswerFormat::Base64),
            Ok(AnswerValue::Base64("data:image/png;base64,aGVsbG8=".into()))
        );
        // 缺少填充
        assert!(coerce("aGVsbG8", AnswerFormat::Base64).is_err());
        // 非法字符
        assert!(coerce("aGVs*G8=", AnswerFormat::Base64).is_err());
        assert!(coerce("data:image/png,aGVsbG8=", AnswerFormat::Base64).is_err());
        assert!(coerce("", AnswerFormat::Base64).is_err());
    }

    #[test]
    fn test_coerce_is_idempotent_on_canonical_text() {
        let cases = [
            ("42", AnswerFormat::Number),
            ("2.5", AnswerFormat::Number),
            ("17.0", AnswerFormat::Number),
            ("Paris", AnswerFormat::String),
            ("yes", AnswerFormat::Boolean),
            ("aGVsbG8=", AnswerFormat::Base64),
        ];
        for (text, format) in cases {
            let first = coerce(text, format).unwrap();
            let second = coerce(&first.to_string(), format).unwrap();
            match format {
                AnswerFormat::Number => assert_eq!(first.as_f64(), second.as_f64()),
                _ => assert_eq!(first, second),
            }
        }
    }

    #[test]
    fn test_unwrap_model_output() {
        assert_eq!(unwrap_model_output("42"), "42");
        assert_eq!(unwrap_model_output("```\n17\n```"), "17");
        assert_eq!(unwrap_model_output("```json\n{\"answer\": 12}\n```"), "12");
        assert_eq!(unwrap_model_output("{\"answer\": \"Oslo\"}"), "Oslo");
        assert_eq!(
            unwrap_model_output("The sum of the column is shown below.\nAnswer: 305"),
            "305"
        );
        assert_eq!(unwrap_model_output("**Final Answer**: true"), "true");
        assert_eq!(unwrap_model_output("abc"), "abc");
    }
}
