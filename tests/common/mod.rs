#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use llm_quiz_solver::error::{RenderError, SolverError};
use llm_quiz_solver::models::{AnswerFormat, AnswerValue, QuestionPage, SubmissionResult};
use llm_quiz_solver::services::{Renderer, RendererLauncher, Solver};
use llm_quiz_solver::{Deadline, SessionConfig};

pub const SUBMIT_URL: &str = "https://quiz.example/submit";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn session_config(max_retries: u32) -> SessionConfig {
    SessionConfig {
        time_budget: Duration::from_secs(30),
        max_retries,
        max_reprompts: 1,
        max_attachment_chars: 5000,
    }
}

pub fn question(url: &str, text: &str, format: AnswerFormat) -> QuestionPage {
    QuestionPage::new(url, text, format, SUBMIT_URL)
}

/// 渲染器在哪一步卡住
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    Open,
    Submit,
}

/// 像真实渲染器一样用 `min(上限, 剩余时间)` 包住一个永远等不到的调用
async fn stall_until(deadline: Deadline) -> Result<(), tokio::time::error::Elapsed> {
    let limit = Duration::from_secs(30).min(deadline.remaining());
    tokio::time::timeout(limit, tokio::time::sleep(Duration::from_secs(60))).await
}

/// 预设页面和判定结果的渲染器
#[derive(Default)]
pub struct ScriptedRenderer {
    pages: HashMap<String, QuestionPage>,
    stall: Option<Stall>,
    results: Mutex<VecDeque<SubmissionResult>>,
    submissions: Mutex<Vec<(String, AnswerValue)>>,
    opened: Mutex<Vec<String>>,
    closed: Mutex<bool>,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page: QuestionPage) -> Self {
        self.pages.insert(page.url.clone(), page);
        self
    }

    pub fn with_results(self, results: Vec<SubmissionResult>) -> Self {
        *self.results.lock().unwrap() = results.into();
        self
    }

    /// 在指定步骤卡住，直到自己的超时触发
    pub fn stalling_on(mut self, stall: Stall) -> Self {
        self.stall = Some(stall);
        self
    }

    pub fn submissions(&self) -> Vec<(String, AnswerValue)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn open(&self, url: &str, deadline: Deadline) -> Result<QuestionPage, RenderError> {
        self.opened.lock().unwrap().push(url.to_string());
        if self.stall == Some(Stall::Open) {
            stall_until(deadline)
                .await
                .map_err(|e| RenderError::NavigationFailed {
                    url: url.to_string(),
                    source: Box::new(e),
                })?;
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| RenderError::ParseFailed {
                url: url.to_string(),
                reason: "no such page".to_string(),
            })
    }

    async fn submit(
        &self,
        page: &QuestionPage,
        answer: &AnswerValue,
        deadline: Deadline,
    ) -> Result<SubmissionResult, RenderError> {
        self.submissions
            .lock()
            .unwrap()
            .push((page.url.clone(), answer.clone()));
        if self.stall == Some(Stall::Submit) {
            stall_until(deadline)
                .await
                .map_err(|e| RenderError::RequestFailed {
                    endpoint: page.submit_url.clone(),
                    source: Box::new(e),
                })?;
        }
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RenderError::BadResponse {
                endpoint: page.submit_url.clone(),
                status: 500,
                body: "no scripted result".to_string(),
            })
    }

    async fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }
}

/// 转发给共享的 `ScriptedRenderer`，便于测试结束后检查
pub struct SharedRenderer(pub Arc<ScriptedRenderer>);

#[async_trait]
impl Renderer for SharedRenderer {
    async fn open(&self, url: &str, deadline: Deadline) -> Result<QuestionPage, RenderError> {
        self.0.open(url, deadline).await
    }

    async fn submit(
        &self,
        page: &QuestionPage,
        answer: &AnswerValue,
        deadline: Deadline,
    ) -> Result<SubmissionResult, RenderError> {
        self.0.submit(page, answer, deadline).await
    }

    async fn close(&self) {
        self.0.close().await
    }
}

/// 启动器：有预设渲染器时返回它，否则模拟浏览器无法启动
pub struct ScriptedLauncher {
    renderer: Option<Arc<ScriptedRenderer>>,
}

impl ScriptedLauncher {
    pub fn returning(renderer: Arc<ScriptedRenderer>) -> Self {
        Self {
            renderer: Some(renderer),
        }
    }

    pub fn failing() -> Self {
        Self { renderer: None }
    }
}

#[async_trait]
impl RendererLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn Renderer>, RenderError> {
        match &self.renderer {
            Some(renderer) => Ok(Box::new(SharedRenderer(renderer.clone()))),
            None => Err(RenderError::LaunchFailed {
                reason: "no browser in tests".to_string(),
            }),
        }
    }
}

/// 按顺序返回预设回复的模型
#[derive(Default)]
pub struct ScriptedSolver {
    replies: Mutex<VecDeque<Result<String, SolverError>>>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedSolver {
    pub fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            ..Self::default()
        }
    }

    pub fn with_error_first(self, error: SolverError) -> Self {
        self.replies.lock().unwrap().push_front(Err(error));
        self
    }

    /// 每次回复前等待，用于模拟超时
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Solver for ScriptedSolver {
    async fn ask(
        &self,
        context: &str,
        _expected: AnswerFormat,
        _deadline: Deadline,
    ) -> Result<String, SolverError> {
        self.prompts.lock().unwrap().push(context.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(SolverError::EmptyContent {
                    model: "scripted".to_string(),
                })
            })
    }
}
