//! 业务能力层（Services）
//!
//! 每个服务只描述"我能做什么"，不关心会话流程

pub mod answer_validator;
pub mod extractor;
pub mod page_parser;
pub mod renderer;
pub mod solver;

pub use extractor::{Extractor, ExtractorRegistry};
pub use renderer::{ChromiumLauncher, ChromiumRenderer, Renderer, RendererLauncher};
pub use solver::{LlmSolver, Solver};
