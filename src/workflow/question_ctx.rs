//! 题目处理上下文
//!
//! 封装"我正在处理哪次会话的第几题、第几次尝试"这一信息

use std::fmt::Display;

/// 题目处理上下文
///
/// 只用于日志前缀
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionCtx {
    /// 会话标识
    pub session: String,

    /// 题目序号（从1开始）
    pub question_index: usize,

    /// 尝试序号（从1开始）
    pub attempt_number: u32,
}

impl QuestionCtx {
    /// 创建新的题目上下文
    pub fn new(session: impl Into<String>, question_index: usize, attempt_number: u32) -> Self {
        Self {
            session: session.into(),
            question_index,
            attempt_number,
        }
    }

    /// 同一道题的下一次尝试
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt_number: self.attempt_number + 1,
            ..self.clone()
        }
    }
}

impl Display for QuestionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[会话 {}][题目 #{} 尝试 #{}]",
            self.session, self.question_index, self.attempt_number
        )
    }
}
