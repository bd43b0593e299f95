//! # LLM Quiz Solver
//!
//! 自动完成网页上的数据分析测验：渲染题目页面，解析附件，
//! 让大模型计算答案，校验格式后提交，直到测验结束或时间用尽
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//! - `Deadline` - 会话截止时间，所有阻塞调用都在它之内执行
//! - `browser/` - 启动无头浏览器
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个题目
//! - `Renderer` - 打开页面、下载附件、提交答案
//! - `Solver` - LLM 解题能力
//! - `Extractor` - 附件解析能力
//! - `answer_validator` - 答案格式校验
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一道题"的完整处理流程
//! - `QuestionCtx` - 上下文封装（会话 + 题目序号 + 尝试序号）
//! - `QuestionResolver` - 流程编排（extract → ask → validate → re-prompt）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/session_orchestrator` - 会话状态机，管理截止时间和重试
//!
//! ### 入口
//! - `api/` - HTTP 服务（/quiz、/health）
//!
//! ## 模块结构

pub mod api;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, SessionConfig};
pub use error::AppError;
pub use infrastructure::{Deadline, JsExecutor};
pub use models::{AnswerFormat, AnswerValue, QuestionPage, SessionReport, SessionState};
pub use orchestrator::{run_session, SessionOrchestrator};
pub use workflow::{QuestionCtx, QuestionResolver};
