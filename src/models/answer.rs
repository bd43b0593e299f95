use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 题目声明的答案格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerFormat {
    /// 数值（整数或小数）
    Number,
    /// 文本
    String,
    /// 布尔值
    Boolean,
    /// base64 编码的二进制内容
    Base64,
}

impl AnswerFormat {
    /// 标准名称
    pub fn name(self) -> &'static str {
        match self {
            AnswerFormat::Number => "number",
            AnswerFormat::String => "string",
            AnswerFormat::Boolean => "boolean",
            AnswerFormat::Base64 => "base64",
        }
    }

    /// 给模型的格式说明
    pub fn instruction(self) -> &'static str {
        match self {
            AnswerFormat::Number => {
                "Reply with a single number only (digits, optional sign and decimal point). No units, no thousands separators."
            }
            AnswerFormat::String => "Reply with the answer text only, without quotes or explanation.",
            AnswerFormat::Boolean => "Reply with exactly one word: true or false.",
            AnswerFormat::Base64 => {
                "Reply with the base64-encoded content only (or a data URI of the form data:<mime>;base64,<payload>)."
            }
        }
    }
}

impl fmt::Display for AnswerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AnswerFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "number" | "numeric" | "integer" | "float" => Ok(AnswerFormat::Number),
            "string" | "text" => Ok(AnswerFormat::String),
            "boolean" | "bool" => Ok(AnswerFormat::Boolean),
            "base64" | "file" | "binary" => Ok(AnswerFormat::Base64),
            other => Err(format!("未知的答案格式: {}", other)),
        }
    }
}

/// 经过校验与规范化的答案
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    /// 原样保留的 base64 文本（或 data URI）
    Base64(String),
}

impl AnswerValue {
    /// 数值答案转为 f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AnswerValue::Integer(v) => Some(*v as f64),
            AnswerValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// 提交用的 JSON 值
    pub fn to_json(&self) -> JsonValue {
        match self {
            AnswerValue::Integer(v) => JsonValue::from(*v),
            AnswerValue::Float(v) => JsonValue::from(*v),
            AnswerValue::Boolean(v) => JsonValue::from(*v),
            AnswerValue::Text(v) | AnswerValue::Base64(v) => JsonValue::from(v.as_str()),
        }
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Integer(v) => write!(f, "{}", v),
            AnswerValue::Float(v) => write!(f, "{}", v),
            AnswerValue::Boolean(v) => write!(f, "{}", v),
            AnswerValue::Text(v) | AnswerValue::Base64(v) => f.write_str(v),
        }
    }
}
