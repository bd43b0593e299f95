pub mod answer;
pub mod attachment;
pub mod question_page;
pub mod session;

pub use answer::{AnswerFormat, AnswerValue};
pub use attachment::{Attachment, AttachmentKind, ExtractedContent, Table};
pub use question_page::{QuestionPage, SubmissionResult};
pub use session::{AttemptOutcome, QuestionAttempt, QuizSession, SessionReport, SessionState};
