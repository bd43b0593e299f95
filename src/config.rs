use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "QUIZ_CONFIG";

/// 程序配置
///
/// 优先级：环境变量 > 配置文件 > 默认值
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 调用方需要提供的密钥
    pub secret: String,
    /// 登记的邮箱，提交答案时一并发送
    pub email: String,
    pub bind_address: String,
    pub port: u16,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    // --- 会话配置 ---
    /// 整个测验的时间预算（秒）
    pub time_budget_secs: u64,
    /// 每道题答错后允许的重试次数
    pub max_retries: u32,
    /// 答案格式不合法时的纠正次数
    pub max_reprompts: u32,
    /// 单个附件放入上下文的最大字符数
    pub max_attachment_chars: usize,
    // --- 浏览器配置 ---
    /// 浏览器可执行文件，为空时由 chromiumoxide 自动查找
    pub browser_executable: Option<String>,
    /// 导航后等待页面脚本执行的时间（毫秒）
    pub render_settle_ms: u64,
    pub navigation_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub submit_timeout_secs: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            secret: String::new(),
            email: String::new(),
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            llm_temperature: 0.1,
            llm_max_tokens: 4000,
            time_budget_secs: 180,
            max_retries: 2,
            max_reprompts: 1,
            max_attachment_chars: 5000,
            browser_executable: None,
            render_settle_ms: 2000,
            navigation_timeout_secs: 30,
            download_timeout_secs: 30,
            submit_timeout_secs: 30,
            verbose_logging: false,
        }
    }
}

/// 单次会话使用的参数，在创建编排器时传入
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub time_budget: Duration,
    pub max_retries: u32,
    pub max_reprompts: u32,
    pub max_attachment_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Config::default().session_config()
    }
}

/// 浏览器与提交接口的参数
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RendererConfig {
    pub email: String,
    pub secret: String,
    pub browser_executable: Option<String>,
    pub render_settle: Duration,
    pub navigation_timeout: Duration,
    pub download_timeout: Duration,
    pub submit_timeout: Duration,
}

impl Config {
    /// 默认值 + 环境变量
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// 解析 TOML 配置，缺省的字段使用默认值
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// 读取 `QUIZ_CONFIG` 指向的配置文件（可选），再应用环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                let text = std::fs::read_to_string(&path).map_err(|source| {
                    ConfigError::FileReadFailed {
                        path: path.clone(),
                        source,
                    }
                })?;
                Self::from_toml_str(&text)
                    .map_err(|source| ConfigError::TomlParseFailed { path, source })?
            }
            _ => Self::default(),
        };
        base.with_overrides(|name| std::env::var(name).ok())
    }

    /// 用 `lookup` 提供的值覆盖配置
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = text("QUIZ_SECRET") {
            self.secret = v;
        }
        if let Some(v) = text("QUIZ_EMAIL") {
            self.email = v;
        }
        if let Some(v) = text("BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Some(v) = text("LLM_API_KEY") {
            self.llm_api_key = v;
        }
        if let Some(v) = text("LLM_API_BASE_URL") {
            self.llm_api_base_url = v;
        }
        if let Some(v) = text("LLM_MODEL_NAME") {
            self.llm_model_name = v;
        }
        if let Some(v) = text("BROWSER_EXECUTABLE") {
            self.browser_executable = Some(v);
        }

        parse_into(&lookup, "PORT", "u16", &mut self.port)?;
        parse_into(&lookup, "LLM_TEMPERATURE", "f32", &mut self.llm_temperature)?;
        parse_into(&lookup, "LLM_MAX_TOKENS", "u32", &mut self.llm_max_tokens)?;
        parse_into(&lookup, "TIME_BUDGET_SECS", "u64", &mut self.time_budget_secs)?;
        parse_into(&lookup, "MAX_RETRIES", "u32", &mut self.max_retries)?;
        parse_into(&lookup, "MAX_REPROMPTS", "u32", &mut self.max_reprompts)?;
        parse_into(
            &lookup,
            "MAX_ATTACHMENT_CHARS",
            "usize",
            &mut self.max_attachment_chars,
        )?;
        parse_into(&lookup, "RENDER_SETTLE_MS", "u64", &mut self.render_settle_ms)?;
        parse_into(
            &lookup,
            "NAVIGATION_TIMEOUT_SECS",
            "u64",
            &mut self.navigation_timeout_secs,
        )?;
        parse_into(
            &lookup,
            "DOWNLOAD_TIMEOUT_SECS",
            "u64",
            &mut self.download_timeout_secs,
        )?;
        parse_into(
            &lookup,
            "SUBMIT_TIMEOUT_SECS",
            "u64",
            &mut self.submit_timeout_secs,
        )?;
        parse_into(&lookup, "VERBOSE_LOGGING", "bool", &mut self.verbose_logging)?;

        Ok(self)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            time_budget: Duration::from_secs(self.time_budget_secs),
            max_retries: self.max_retries,
            max_reprompts: self.max_reprompts,
            max_attachment_chars: self.max_attachment_chars,
        }
    }

    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            email: self.email.clone(),
            secret: self.secret.clone(),
            browser_executable: self.browser_executable.clone(),
            render_settle: Duration::from_millis(self.render_settle_ms),
            navigation_timeout: Duration::from_secs(self.navigation_timeout_secs),
            download_timeout: Duration::from_secs(self.download_timeout_secs),
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
        }
    }
}

fn parse_into<T, F>(
    lookup: &F,
    var_name: &str,
    expected_type: &str,
    target: &mut T,
) -> Result<(), ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var_name).filter(|v| !v.is_empty()) else {
        return Ok(());
    };
    *target = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            value,
            expected_type: expected_type.to_string(),
        })?;
    Ok(())
}
