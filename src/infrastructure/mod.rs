pub mod deadline;
pub mod js_executor;

pub use deadline::Deadline;
pub use js_executor::JsExecutor;
