//! 会话与答题记录

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::AnswerValue;
use crate::infrastructure::Deadline;

/// 会话状态机的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Fetching,
    Resolving,
    Submitting,
    AwaitingResult,
    Advancing,
    Done,
    TimedOut,
    Failed,
}

impl SessionState {
    /// 是否为终止状态
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Done | SessionState::TimedOut | SessionState::Failed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Fetching => "FETCHING",
            SessionState::Resolving => "RESOLVING",
            SessionState::Submitting => "SUBMITTING",
            SessionState::AwaitingResult => "AWAITING_RESULT",
            SessionState::Advancing => "ADVANCING",
            SessionState::Done => "DONE",
            SessionState::TimedOut => "TIMED_OUT",
            SessionState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// 单次答题尝试的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Pending,
    Accepted,
    Rejected,
    Error,
}

/// 一道题的一次答题尝试
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionAttempt {
    /// 题目序号（从 1 开始）
    pub question_index: usize,
    /// 题目页面地址
    pub question_url: String,
    /// 尝试序号（从 1 开始）
    pub attempt_number: u32,
    /// 模型原始输出
    pub raw_output: Option<String>,
    /// 规范化后的答案
    pub answer: Option<AnswerValue>,
    outcome: AttemptOutcome,
    /// 被拒绝或出错的原因
    pub reason: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl QuestionAttempt {
    pub fn new(question_index: usize, question_url: impl Into<String>, attempt_number: u32) -> Self {
        Self {
            question_index,
            question_url: question_url.into(),
            attempt_number,
            raw_output: None,
            answer: None,
            outcome: AttemptOutcome::Pending,
            reason: None,
            started_at: Utc::now(),
        }
    }

    pub fn outcome(&self) -> AttemptOutcome {
        self.outcome
    }

    /// 设置最终结果
    ///
    /// 只有 `Pending` 状态可以被设置，结果一旦确定不再改变；返回是否设置成功
    pub fn settle(&mut self, outcome: AttemptOutcome, reason: Option<String>) -> bool {
        if self.outcome != AttemptOutcome::Pending || outcome == AttemptOutcome::Pending {
            warn!(
                "忽略对题目 #{} 尝试 #{} 的重复结算: {:?} -> {:?}",
                self.question_index, self.attempt_number, self.outcome, outcome
            );
            return false;
        }
        self.outcome = outcome;
        self.reason = reason;
        true
    }
}

/// 一次完整的测验会话
///
/// 由编排器独占，运行结束后转换为 `SessionReport`
#[derive(Debug)]
pub struct QuizSession {
    pub entry_url: String,
    /// 调用方身份（仅用于审计）
    pub caller: Option<String>,
    pub started_at: DateTime<Utc>,
    pub deadline: Deadline,
    pub state: SessionState,
    pub questions_completed: usize,
    attempts: Vec<QuestionAttempt>,
}

impl QuizSession {
    pub fn start(entry_url: impl Into<String>, caller: Option<String>, deadline: Deadline) -> Self {
        Self {
            entry_url: entry_url.into(),
            caller,
            started_at: Utc::now(),
            deadline,
            state: SessionState::Fetching,
            questions_completed: 0,
            attempts: Vec::new(),
        }
    }

    pub fn attempts(&self) -> &[QuestionAttempt] {
        &self.attempts
    }

    /// 记录一次新的尝试
    pub fn record(&mut self, attempt: QuestionAttempt) -> &mut QuestionAttempt {
        self.attempts.push(attempt);
        let last = self.attempts.len() - 1;
        &mut self.attempts[last]
    }

    /// 最近一次尝试
    pub fn current_attempt_mut(&mut self) -> Option<&mut QuestionAttempt> {
        self.attempts.last_mut()
    }

    /// 结束会话并生成报告
    pub fn finish(self, failure: Option<String>) -> SessionReport {
        let finished_at = Utc::now();
        SessionReport {
            entry_url: self.entry_url,
            caller: self.caller,
            state: self.state,
            questions_completed: self.questions_completed,
            attempts: self.attempts,
            started_at: self.started_at,
            deadline_at: self.deadline.wall_clock(),
            finished_at,
            elapsed_ms: (finished_at - self.started_at).num_milliseconds().max(0) as u64,
            failure,
        }
    }
}

/// 会话结束后交给调用方的报告
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub entry_url: String,
    pub caller: Option<String>,
    /// 终止状态：DONE / TIMED_OUT / FAILED
    pub state: SessionState,
    pub questions_completed: usize,
    pub attempts: Vec<QuestionAttempt>,
    pub started_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub failure: Option<String>,
}

impl SessionReport {
    /// 会话还未开始就失败（例如浏览器无法启动）
    pub fn failed_before_start(
        entry_url: impl Into<String>,
        caller: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        let mut session = QuizSession::start(entry_url, caller, Deadline::expired_now());
        session.state = SessionState::Failed;
        session.finish(Some(reason.into()))
    }

    pub fn is_success(&self) -> bool {
        self.state == SessionState::Done
    }
}
