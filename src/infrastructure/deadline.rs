//! 会话截止时间 - 基础设施层
//!
//! 所有可能长时间阻塞的调用（渲染、LLM、提交）都通过 `Deadline::run` 执行，
//! 到点后直接丢弃正在执行的 future，而不是等它自然结束

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::error::TimeoutExceeded;

/// 预算大到无法表示时使用的上限（约 30 年）
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// 会话截止时间
///
/// 创建后只读，可以随意复制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    wall_clock: DateTime<Utc>,
}

impl Deadline {
    /// 从现在起 `budget` 之后截止
    pub fn after(budget: Duration) -> Self {
        let now = Instant::now();
        let wall_budget = chrono::Duration::from_std(budget).unwrap_or(chrono::Duration::MAX);
        Self {
            at: now.checked_add(budget).unwrap_or_else(|| now + FAR_FUTURE),
            wall_clock: Utc::now()
                .checked_add_signed(wall_budget)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// 已经过期的截止时间
    pub fn expired_now() -> Self {
        Self {
            at: Instant::now(),
            wall_clock: Utc::now(),
        }
    }

    /// 截止时刻（墙钟时间，仅用于报告）
    pub fn wall_clock(&self) -> DateTime<Utc> {
        self.wall_clock
    }

    /// 是否已经过期
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// 剩余时间，过期后为 0
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// 检查截止时间，过期则返回错误
    pub fn check(&self) -> Result<(), TimeoutExceeded> {
        if self.is_expired() {
            Err(TimeoutExceeded)
        } else {
            Ok(())
        }
    }

    /// 在截止时间内执行 `fut`
    ///
    /// 已过期时不会轮询 `fut`，因此不会发出任何请求；执行中到点则直接丢弃
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, TimeoutExceeded> {
        self.check()?;
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| TimeoutExceeded)
    }
}
