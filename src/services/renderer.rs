//! 页面渲染与提交服务 - 业务能力层
//!
//! ## 职责
//! - 打开题目页面，等待脚本执行后读取内容
//! - 下载附件
//! - 把答案 POST 到提交接口并解释返回结果
//!
//! 每个会话持有自己的 `ChromiumRenderer`（独立的浏览器进程），会话之间不共享 Cookie 和页面

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Browser;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::launch_headless_browser;
use crate::config::RendererConfig;
use crate::error::RenderError;
use crate::infrastructure::{Deadline, JsExecutor};
use crate::models::{AnswerValue, Attachment, QuestionPage, SubmissionResult};
use crate::services::page_parser::{parse_page, RenderedContent, READ_PAGE_JS};

/// 渲染能力
#[async_trait]
pub trait Renderer: Send + Sync {
    /// 打开题目页面
    async fn open(&self, url: &str, deadline: Deadline) -> Result<QuestionPage, RenderError>;

    /// 提交答案
    async fn submit(
        &self,
        page: &QuestionPage,
        answer: &AnswerValue,
        deadline: Deadline,
    ) -> Result<SubmissionResult, RenderError>;

    /// 释放浏览器资源
    async fn close(&self) {}
}

/// 为每个会话创建独立的渲染器
#[async_trait]
pub trait RendererLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Renderer>, RenderError>;
}

/// 提交接口的返回内容
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitResponse {
    pub correct: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl SubmitResponse {
    /// 转换成会话使用的判定结果
    pub fn into_result(self) -> SubmissionResult {
        let next = self.url.filter(|u| !u.trim().is_empty());
        let reason = self.reason.filter(|r| !r.trim().is_empty());
        match (self.correct, next) {
            (true, Some(url)) => SubmissionResult::CorrectWithNext(url),
            (true, None) => SubmissionResult::CorrectFinal,
            (false, next) => SubmissionResult::Incorrect { reason, next },
        }
    }
}

struct BrowserHandle {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// 基于 chromiumoxide + reqwest 的渲染器
pub struct ChromiumRenderer {
    browser: Mutex<Option<BrowserHandle>>,
    executor: JsExecutor,
    http: reqwest::Client,
    config: RendererConfig,
}

impl ChromiumRenderer {
    /// 启动浏览器并准备一个空白页面
    pub async fn launch(config: RendererConfig) -> Result<Self, RenderError> {
        let (browser, handler) =
            launch_headless_browser(config.browser_executable.as_deref()).await?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::PageCreationFailed {
                source: Box::new(e),
            })?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RenderError::LaunchFailed {
                reason: format!("HTTP 客户端创建失败: {}", e),
            })?;

        info!("✅ 渲染器就绪");

        Ok(Self {
            browser: Mutex::new(Some(BrowserHandle { browser, handler })),
            executor: JsExecutor::new(page),
            http,
            config,
        })
    }

    async fn download(&self, url: &str, deadline: Deadline) -> Result<Vec<u8>, RenderError> {
        let timeout = bounded(self.config.download_timeout, deadline);
        let request_failed = |e: reqwest::Error| RenderError::RequestFailed {
            endpoint: url.to_string(),
            source: Box::new(e),
        };

        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(request_failed)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::BadResponse {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let bytes = response.bytes().await.map_err(request_failed)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn open(&self, url: &str, deadline: Deadline) -> Result<QuestionPage, RenderError> {
        info!("🌐 打开题目页面: {}", url);

        let navigation_timeout = bounded(self.config.navigation_timeout, deadline);
        tokio::time::timeout(navigation_timeout, self.executor.goto(url))
            .await
            .map_err(|e| RenderError::NavigationFailed {
                url: url.to_string(),
                source: Box::new(e),
            })??;

        // 题目内容通常由页面脚本写入，需要等待执行完成
        tokio::time::sleep(bounded(self.config.render_settle, deadline)).await;

        let rendered: RenderedContent = self.executor.eval_as(READ_PAGE_JS).await?;
        let parsed = parse_page(url, &rendered).map_err(|reason| RenderError::ParseFailed {
            url: url.to_string(),
            reason,
        })?;

        let mut page = QuestionPage::new(
            url,
            parsed.question,
            parsed.answer_format,
            parsed.submit_url,
        )
        .with_page_text(parsed.page_text);

        for link in parsed.attachment_links {
            // 下载失败的附件保留为空内容，由解析阶段标记为不可用
            let content = match self.download(&link.url, deadline).await {
                Ok(bytes) => {
                    debug!("下载附件 {} 完成, {} 字节", link.url, bytes.len());
                    bytes
                }
                Err(e) => {
                    warn!("下载附件失败: {}", e);
                    Vec::new()
                }
            };
            page = page.with_attachment(Attachment::new(link.url, link.type_tag, content));
        }

        info!(
            "✓ 页面解析完成: 格式 {}, 附件 {} 个",
            page.answer_format,
            page.attachments.len()
        );
        Ok(page)
    }

    async fn submit(
        &self,
        page: &QuestionPage,
        answer: &AnswerValue,
        deadline: Deadline,
    ) -> Result<SubmissionResult, RenderError> {
        let payload = json!({
            "email": self.config.email,
            "secret": self.config.secret,
            "url": page.url,
            "answer": answer.to_json(),
        });
        debug!("提交到 {}: answer={}", page.submit_url, answer);

        let response = self
            .http
            .post(&page.submit_url)
            .json(&payload)
            .timeout(bounded(self.config.submit_timeout, deadline))
            .send()
            .await
            .map_err(|e| RenderError::RequestFailed {
                endpoint: page.submit_url.clone(),
                source: Box::new(e),
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RenderError::RequestFailed {
                endpoint: page.submit_url.clone(),
                source: Box::new(e),
            })?;

        // 答错时服务端可能返回非 2xx，只要内容可以解析就接受
        let parsed: SubmitResponse =
            serde_json::from_str(&body).map_err(|_| RenderError::BadResponse {
                endpoint: page.submit_url.clone(),
                status,
                body: body.clone(),
            })?;

        Ok(parsed.into_result())
    }

    async fn close(&self) {
        let Some(mut handle) = self.browser.lock().await.take() else {
            return;
        };
        if let Err(e) = handle.browser.close().await {
            warn!("关闭浏览器失败: {}", e);
        }
        let _ = handle.browser.wait().await;
        handle.handler.abort();
        debug!("浏览器已关闭");
    }
}

/// 按配置启动 `ChromiumRenderer`
pub struct ChromiumLauncher {
    config: RendererConfig,
}

impl ChromiumLauncher {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RendererLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn Renderer>, RenderError> {
        let renderer = ChromiumRenderer::launch(self.config.clone()).await?;
        Ok(Box::new(renderer))
    }
}

/// 单次调用的超时不超过会话剩余时间
fn bounded(limit: Duration, deadline: Deadline) -> Duration {
    limit.min(deadline.remaining())
}
