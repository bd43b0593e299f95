//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责驱动整场测验，是整个系统的"指挥中心"。
//!
//! ### `session_orchestrator` - 会话编排器
//! - 持有会话截止时间和答题记录（QuizSession）
//! - 按状态机调度渲染、求解、提交
//! - 管理每题的重试次数
//! - 输出会话报告（SessionReport）
//!
//! ## 层次关系
//!
//! ```text
//! session_orchestrator (处理一场测验)
//!     ↓
//! workflow::QuestionResolver (处理单个题目)
//!     ↓
//! services (能力层：renderer / solver / extractor / validator)
//!     ↓
//! infrastructure (基础设施：JsExecutor / Deadline)
//! ```

pub mod session_orchestrator;

pub use session_orchestrator::{run_session, SessionOrchestrator};
