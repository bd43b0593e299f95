pub mod question_ctx;
pub mod question_resolver;

pub use question_ctx::QuestionCtx;
pub use question_resolver::{PreparedQuestion, QuestionResolver, RejectedAnswer, Resolution};
