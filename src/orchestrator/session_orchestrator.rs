//! 会话编排器 - 编排层
//!
//! ## 职责
//!
//! 在一个截止时间内驱动整场测验：取题 → 求解 → 提交 → 判定 → 重试或前进。
//!
//! ## 状态转换
//!
//! ```text
//! FETCHING ──页面──▶ RESOLVING ──答案──▶ SUBMITTING ──▶ AWAITING_RESULT
//!    ▲                 │  ▲                                  │
//!    │                 │  └──────── 答错且还有重试次数 ───────┤
//!    │                 ▼                                     ▼
//!    └──── 有下一题 ── ADVANCING ◀──────── 答对 ──────────────┘
//!                      │
//!                      └── 没有下一题 ──▶ DONE
//! ```
//!
//! 任何阻塞调用之前都会检查截止时间，过期即进入 `TIMED_OUT`；
//! 渲染器自身的超时若发生在截止时间之后，同样算作 `TIMED_OUT`；
//! 不可恢复的错误进入 `FAILED`。调用方永远拿到 `SessionReport`

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::ResolutionError;
use crate::infrastructure::Deadline;
use crate::models::{
    AnswerValue, AttemptOutcome, QuestionAttempt, QuestionPage, QuizSession, SessionReport,
    SessionState, SubmissionResult,
};
use crate::services::{Extractor, Renderer, RendererLauncher, Solver};
use crate::utils::logging::log_session_report;
use crate::workflow::{PreparedQuestion, QuestionCtx, QuestionResolver, RejectedAnswer};

/// 正在处理的题目
struct ActiveQuestion {
    page: QuestionPage,
    prepared: PreparedQuestion,
    ctx: QuestionCtx,
    rejected: Vec<RejectedAnswer>,
    answer: Option<AnswerValue>,
    result: Option<SubmissionResult>,
}

/// 会话编排器
///
/// 每次 `run` 创建一个新的 `QuizSession`，会话之间不共享可变状态
pub struct SessionOrchestrator {
    renderer: Arc<dyn Renderer>,
    resolver: QuestionResolver,
    config: SessionConfig,
    caller: Option<String>,
}

impl SessionOrchestrator {
    pub fn new(renderer: Arc<dyn Renderer>, solver: Arc<dyn Solver>, config: SessionConfig) -> Self {
        Self {
            renderer,
            resolver: QuestionResolver::new(solver, config.max_reprompts, config.max_attachment_chars),
            config,
            caller: None,
        }
    }

    /// 记录调用方身份（仅用于报告）
    pub fn with_caller(mut self, caller: Option<String>) -> Self {
        self.caller = caller;
        self
    }

    /// 替换附件解析器
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.resolver = self.resolver.with_extractor(extractor);
        self
    }

    /// 从 `entry_url` 开始答题，直到测验结束、失败或超时
    pub async fn run(&self, entry_url: &str, time_budget: Duration) -> SessionReport {
        let deadline = Deadline::after(time_budget);
        let mut session = QuizSession::start(entry_url, self.caller.clone(), deadline);
        let label = session.started_at.format("%H%M%S%3f").to_string();

        info!(
            "[会话 {}] 🚀 开始答题: {} (时间预算 {:?}, 每题最多 {} 次尝试)",
            label,
            entry_url,
            time_budget,
            self.config.max_retries + 1
        );

        let mut next_url = Some(entry_url.to_string());
        let mut active: Option<ActiveQuestion> = None;
        let mut failure: Option<String> = None;

        while !session.state.is_terminal() {
            let next_state = match session.state {
                SessionState::Fetching => {
                    self.fetch(&mut session, &label, &mut next_url, &mut active, &mut failure)
                        .await
                }
                SessionState::Resolving => match active.as_mut() {
                    Some(question) => self.resolve(&mut session, question, &mut failure).await,
                    None => missing_question(&mut failure),
                },
                SessionState::Submitting => match active.as_mut() {
                    Some(question) => self.submit(&mut session, question, &mut failure).await,
                    None => missing_question(&mut failure),
                },
                SessionState::AwaitingResult => match active.as_mut() {
                    Some(question) => {
                        self.interpret(&mut session, question, &mut next_url, &mut failure)
                    }
                    None => missing_question(&mut failure),
                },
                SessionState::Advancing => match &next_url {
                    Some(url) if session.deadline.is_expired() => {
                        failure = Some(format!("截止时间已到，未能打开下一题 {}", url));
                        SessionState::TimedOut
                    }
                    Some(_) => SessionState::Fetching,
                    None => SessionState::Done,
                },
                SessionState::Done | SessionState::TimedOut | SessionState::Failed => {
                    session.state
                }
            };

            if next_state != session.state {
                debug!("[会话 {}] 状态 {} → {}", label, session.state, next_state);
            }
            if next_state == SessionState::TimedOut {
                close_in_flight(&mut session, "已超过会话截止时间");
            }
            session.state = next_state;
        }

        let report = session.finish(failure);
        log_session_report(&report);
        report
    }

    async fn fetch(
        &self,
        session: &mut QuizSession,
        label: &str,
        next_url: &mut Option<String>,
        active: &mut Option<ActiveQuestion>,
        failure: &mut Option<String>,
    ) -> SessionState {
        let Some(url) = next_url.take() else {
            return SessionState::Done;
        };
        let deadline = session.deadline;

        let page = match deadline.run(self.renderer.open(&url, deadline)).await {
            Err(_) => {
                warn!("[会话 {}] ⏱ 打开 {} 时超时", label, url);
                *failure = Some(format!("打开 {} 时超过截止时间", url));
                return SessionState::TimedOut;
            }
            Ok(Err(e)) if deadline.is_expired() => {
                warn!("[会话 {}] ⏱ 打开 {} 时超时: {}", label, url, e);
                *failure = Some(format!("打开 {} 时超过截止时间: {}", url, e));
                return SessionState::TimedOut;
            }
            Ok(Err(e)) => {
                error!("[会话 {}] ❌ 页面渲染失败: {}", label, e);
                *failure = Some(e.to_string());
                return SessionState::Failed;
            }
            Ok(Ok(page)) => page,
        };

        let ctx = QuestionCtx::new(label, session.questions_completed + 1, 1);
        info!("{} 📄 题目已加载: {}", ctx, page.url);

        match self.resolver.prepare(&page, &ctx) {
            Ok(prepared) => {
                *active = Some(ActiveQuestion {
                    page,
                    prepared,
                    ctx,
                    rejected: Vec::new(),
                    answer: None,
                    result: None,
                });
                SessionState::Resolving
            }
            Err(e) => {
                error!("{} ❌ {}", ctx, e);
                *failure = Some(e.to_string());
                SessionState::Failed
            }
        }
    }

    async fn resolve(
        &self,
        session: &mut QuizSession,
        question: &mut ActiveQuestion,
        failure: &mut Option<String>,
    ) -> SessionState {
        let deadline = session.deadline;
        if deadline.is_expired() {
            *failure = Some(format!("{} 求解前已超过截止时间", question.ctx));
            return SessionState::TimedOut;
        }

        let ctx = question.ctx.clone();
        let attempt = session.record(QuestionAttempt::new(
            ctx.question_index,
            question.page.url.clone(),
            ctx.attempt_number,
        ));

        let resolved = self
            .resolver
            .resolve(&question.prepared, &question.rejected, &ctx, deadline)
            .await;

        match resolved {
            Ok(resolution) => {
                attempt.raw_output = Some(resolution.raw_output);
                attempt.answer = Some(resolution.answer.clone());
                question.answer = Some(resolution.answer);
                SessionState::Submitting
            }
            Err(ResolutionError::Timeout(_)) => {
                warn!("{} ⏱ 求解时超时", ctx);
                *failure = Some(format!("{} 求解时超过截止时间", ctx));
                SessionState::TimedOut
            }
            Err(ResolutionError::SolverUnavailable(e)) => {
                attempt.settle(AttemptOutcome::Error, Some(e.to_string()));
                if ctx.attempt_number <= self.config.max_retries {
                    warn!("{} ⚠️ 模型调用失败，计入重试次数后重试: {}", ctx, e);
                    question.ctx = ctx.next_attempt();
                    SessionState::Resolving
                } else {
                    error!("{} ❌ 模型调用失败，重试次数用尽: {}", ctx, e);
                    *failure = Some(format!("{} 模型不可用: {}", ctx, e));
                    SessionState::Failed
                }
            }
            Err(e) => {
                attempt.raw_output = e.raw_output().map(str::to_string);
                attempt.settle(AttemptOutcome::Error, Some(e.to_string()));
                error!("{} ❌ 无法得到合法答案: {}", ctx, e);
                *failure = Some(format!("{} {}", ctx, e));
                SessionState::Failed
            }
        }
    }

    async fn submit(
        &self,
        session: &mut QuizSession,
        question: &mut ActiveQuestion,
        failure: &mut Option<String>,
    ) -> SessionState {
        let deadline = session.deadline;
        let ctx = &question.ctx;
        let Some(answer) = question.answer.take() else {
            *failure = Some(format!("{} 没有可提交的答案", ctx));
            return SessionState::Failed;
        };

        info!("{} 📤 提交答案: {}", ctx, answer);
        match deadline
            .run(self.renderer.submit(&question.page, &answer, deadline))
            .await
        {
            Err(_) => {
                warn!("{} ⏱ 提交时超时", ctx);
                *failure = Some(format!("{} 提交时超过截止时间", ctx));
                SessionState::TimedOut
            }
            Ok(Err(e)) if deadline.is_expired() => {
                warn!("{} ⏱ 提交时超时: {}", ctx, e);
                *failure = Some(format!("{} 提交时超过截止时间: {}", ctx, e));
                SessionState::TimedOut
            }
            Ok(Err(e)) => {
                error!("{} ❌ 提交失败: {}", ctx, e);
                if let Some(attempt) = session.current_attempt_mut() {
                    attempt.settle(AttemptOutcome::Error, Some(e.to_string()));
                }
                *failure = Some(format!("{} 提交失败: {}", ctx, e));
                SessionState::Failed
            }
            Ok(Ok(result)) => {
                question.answer = Some(answer);
                question.result = Some(result);
                SessionState::AwaitingResult
            }
        }
    }

    fn interpret(
        &self,
        session: &mut QuizSession,
        question: &mut ActiveQuestion,
        next_url: &mut Option<String>,
        failure: &mut Option<String>,
    ) -> SessionState {
        let ctx = question.ctx.clone();
        let (Some(result), Some(answer)) = (question.result.take(), question.answer.take()) else {
            *failure = Some(format!("{} 缺少提交结果", ctx));
            return SessionState::Failed;
        };

        match result {
            SubmissionResult::CorrectWithNext(url) => {
                info!("{} ✅ 回答正确，下一题: {}", ctx, url);
                settle_current(session, AttemptOutcome::Accepted, None);
                session.questions_completed += 1;
                *next_url = Some(url);
                SessionState::Advancing
            }
            SubmissionResult::CorrectFinal => {
                info!("{} ✅ 回答正确，测验结束", ctx);
                settle_current(session, AttemptOutcome::Accepted, None);
                session.questions_completed += 1;
                *next_url = None;
                SessionState::Advancing
            }
            SubmissionResult::Incorrect { reason, next } => {
                warn!(
                    "{} ❌ 回答错误: {}",
                    ctx,
                    reason.as_deref().unwrap_or("服务端未给出原因")
                );
                if let Some(next) = &next {
                    debug!("{} 服务端同时给出了下一题: {}", ctx, next);
                }
                settle_current(session, AttemptOutcome::Rejected, reason.clone());
                question.rejected.push(RejectedAnswer { answer, reason });

                if ctx.attempt_number <= self.config.max_retries {
                    question.ctx = ctx.next_attempt();
                    SessionState::Resolving
                } else {
                    *failure = Some(format!(
                        "{} {} 次尝试均被判错",
                        ctx, ctx.attempt_number
                    ));
                    SessionState::Failed
                }
            }
        }
    }
}

/// 启动独立的渲染器，完成一次会话后关闭
///
/// 渲染器无法启动时返回 `FAILED` 报告
pub async fn run_session(
    launcher: &dyn RendererLauncher,
    solver: Arc<dyn Solver>,
    config: SessionConfig,
    entry_url: &str,
    caller: Option<String>,
) -> SessionReport {
    let renderer: Arc<dyn Renderer> = match launcher.launch().await {
        Ok(renderer) => Arc::from(renderer),
        Err(e) => {
            error!("❌ 渲染器启动失败: {}", e);
            return SessionReport::failed_before_start(entry_url, caller, e.to_string());
        }
    };

    let time_budget = config.time_budget;
    let orchestrator =
        SessionOrchestrator::new(renderer.clone(), solver, config).with_caller(caller);
    let report = orchestrator.run(entry_url, time_budget).await;
    renderer.close().await;
    report
}

fn settle_current(session: &mut QuizSession, outcome: AttemptOutcome, reason: Option<String>) {
    if let Some(attempt) = session.current_attempt_mut() {
        attempt.settle(outcome, reason);
    }
}

/// 超时时关闭仍在进行中的尝试
fn close_in_flight(session: &mut QuizSession, reason: &str) {
    if let Some(attempt) = session.current_attempt_mut() {
        if attempt.outcome() == AttemptOutcome::Pending {
            attempt.settle(AttemptOutcome::Error, Some(reason.to_string()));
        }
    }
}

fn missing_question(failure: &mut Option<String>) -> SessionState {
    *failure = Some("内部状态错误: 没有正在处理的题目".to_string());
    SessionState::Failed
}
