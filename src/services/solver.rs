//! LLM 解题服务 - 业务能力层
//!
//! 只负责"把提示词交给模型并拿回文本"，不关心答案格式校验和流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::SolverError;
use crate::infrastructure::Deadline;
use crate::models::AnswerFormat;

/// 解题系统提示词
pub const SYSTEM_PROMPT: &str = "You are an expert data analyst and problem solver. \
You read quiz questions together with any attached data (tables, documents, JSON), \
clean and analyse the data, and compute the exact answer that is requested. \
Be precise. Your reply must contain only the final answer value in the requested format, \
never an explanation.";

/// 解题能力
///
/// 输入组合好的上下文，输出模型的原始文本
#[async_trait]
pub trait Solver: Send + Sync {
    async fn ask(
        &self,
        context: &str,
        expected: AnswerFormat,
        deadline: Deadline,
    ) -> Result<String, SolverError>;
}

/// 基于 OpenAI 兼容接口的解题服务
pub struct LlmSolver {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmSolver {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（去掉首尾空白）
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> Result<String, SolverError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(|e| self.build_failed(e))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| self.build_failed(e))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| self.build_failed(e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            SolverError::ApiCallFailed {
                model: self.model_name.clone(),
                source: Box::new(e),
            }
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| SolverError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        Ok(content)
    }

    fn build_failed(&self, err: impl std::fmt::Display) -> SolverError {
        SolverError::RequestBuildFailed {
            model: self.model_name.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl Solver for LlmSolver {
    async fn ask(
        &self,
        context: &str,
        expected: AnswerFormat,
        deadline: Deadline,
    ) -> Result<String, SolverError> {
        debug!(
            "请求模型作答，期望格式: {}，剩余时间: {:?}",
            expected,
            deadline.remaining()
        );
        self.send_to_llm(context, Some(SYSTEM_PROMPT)).await
    }
}
