use thiserror::Error;

use crate::models::{AnswerFormat, AttachmentKind};

/// 应用程序错误类型
///
/// 只在进程边界（main / 前端入口）使用，会话内部的错误不会越过 `SessionReport`
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Render(#[from] RenderError),
    /// 服务监听失败
    #[error("服务启动失败: {0}")]
    Server(#[from] std::io::Error),
}

/// 会话已超过截止时间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("已超过会话截止时间")]
pub struct TimeoutExceeded;

/// 附件解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// 类型标签不在支持列表中
    #[error("不支持的附件格式 '{type_tag}' ({attachment})")]
    UnsupportedFormat { attachment: String, type_tag: String },
    /// 附件内容为空（通常是下载失败）
    #[error("附件内容为空 ({attachment})")]
    Empty { attachment: String },
    /// 内容损坏或子格式无法解析
    #[error("附件解析失败 ({attachment}, {kind}): {reason}")]
    Corrupt {
        attachment: String,
        kind: AttachmentKind,
        reason: String,
    },
}

impl ExtractionError {
    /// 出错附件的标识
    pub fn attachment(&self) -> &str {
        match self {
            ExtractionError::UnsupportedFormat { attachment, .. }
            | ExtractionError::Empty { attachment }
            | ExtractionError::Corrupt { attachment, .. } => attachment,
        }
    }
}

/// 模型输出不符合期望的答案格式
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("答案不是合法的 {expected}: {text:?} ({reason})")]
pub struct ValidationError {
    pub expected: AnswerFormat,
    pub text: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(expected: AnswerFormat, text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            expected,
            text: text.into(),
            reason: reason.into(),
        }
    }
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum SolverError {
    /// 请求构建失败
    #[error("LLM 请求构建失败 (模型: {model}): {reason}")]
    RequestBuildFailed { model: String, reason: String },
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
}

/// 浏览器 / 提交相关错误
#[derive(Debug, Error)]
pub enum RenderError {
    /// 启动浏览器失败
    #[error("启动无头浏览器失败: {reason}")]
    LaunchFailed { reason: String },
    /// 创建页面失败
    #[error("创建页面失败: {source}")]
    PageCreationFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 页面中没有题目内容
    #[error("无法从页面 {url} 提取题目: {reason}")]
    ParseFailed { url: String, reason: String },
    /// 网络请求失败
    #[error("请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 提交接口返回了无法识别的响应
    #[error("提交接口返回错误响应 ({endpoint}): status={status}, body={body}")]
    BadResponse {
        endpoint: String,
        status: u16,
        body: String,
    },
}

impl From<chromiumoxide::error::CdpError> for RenderError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        RenderError::ScriptExecutionFailed {
            source: Box::new(err),
        }
    }
}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        RenderError::ScriptExecutionFailed {
            source: Box::new(err),
        }
    }
}

/// 单道题无法得到合法答案
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// 题干和附件都不可用，没有可以提问的内容
    #[error("题目内容不可用: {reason}")]
    Extraction { reason: String },
    /// 纠正重试次数用尽后答案仍然不合法
    #[error("答案校验失败: {source}")]
    Validation {
        raw_output: String,
        #[source]
        source: ValidationError,
    },
    /// LLM 不可用
    #[error("LLM 不可用: {0}")]
    SolverUnavailable(#[source] SolverError),
    /// 截止时间已到
    #[error(transparent)]
    Timeout(#[from] TimeoutExceeded),
}

impl ResolutionError {
    /// 最后一次拿到的模型原始输出（如果有）
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            ResolutionError::Validation { raw_output, .. } => Some(raw_output),
            _ => None,
        }
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("配置文件解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
