//! 单题求解流程 - 流程层
//!
//! 核心职责：把"一道题"变成一个合法的答案
//!
//! 流程顺序：
//! 1. `prepare`：解析全部附件，拼出上下文（每道题只做一次）
//! 2. `resolve`：询问模型 → 取出答案 → 按格式校验
//! 3. 校验失败时把错误作为反馈再问一次，直到纠正次数用尽

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ResolutionError;
use crate::infrastructure::Deadline;
use crate::models::{AnswerFormat, AnswerValue, QuestionPage};
use crate::services::answer_validator::{coerce, unwrap_model_output};
use crate::services::{Extractor, ExtractorRegistry, Solver};
use crate::utils::logging::truncate_text;
use crate::workflow::question_ctx::QuestionCtx;

/// 解析好附件、可以直接提问的题目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuestion {
    /// 题干 + 附件内容
    pub context: String,
    pub answer_format: AnswerFormat,
    /// 无法使用的附件数量
    pub unavailable_attachments: usize,
}

/// 之前被判错的答案
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedAnswer {
    pub answer: AnswerValue,
    pub reason: Option<String>,
}

/// 一次成功的求解
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// 模型最后一次的原始输出
    pub raw_output: String,
    pub answer: AnswerValue,
    /// 本次求解调用模型的次数
    pub solver_calls: u32,
}

/// 单题求解流程
///
/// - 不持有浏览器资源
/// - 只依赖业务能力（extractor / solver / validator）
pub struct QuestionResolver {
    solver: Arc<dyn Solver>,
    extractor: Arc<dyn Extractor>,
    max_reprompts: u32,
    max_attachment_chars: usize,
}

impl QuestionResolver {
    pub fn new(solver: Arc<dyn Solver>, max_reprompts: u32, max_attachment_chars: usize) -> Self {
        Self {
            solver,
            extractor: Arc::new(ExtractorRegistry::new()),
            max_reprompts,
            max_attachment_chars,
        }
    }

    /// 替换附件解析器
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// 解析附件并组合上下文
    ///
    /// 单个附件失败只会留下不可用标记；题干为空且没有可用附件时才返回错误
    pub fn prepare(
        &self,
        page: &QuestionPage,
        ctx: &QuestionCtx,
    ) -> Result<PreparedQuestion, ResolutionError> {
        let question = page.question.trim();
        let mut context = format!("Question (page: {}):\n{}\n", page.url, question);
        if let Some(page_text) = &page.page_text {
            context.push_str(&format!("\nPage content:\n{}\n", page_text));
        }
        let mut usable = 0;
        let mut unavailable = 0;

        for (i, attachment) in page.attachments.iter().enumerate() {
            context.push_str(&format!("\nAttachment {} ({}):\n", i + 1, attachment.name));
            match self.extractor.extract(attachment) {
                Ok(content) => {
                    usable += 1;
                    let text = content.render();
                    context.push_str(&cap_text(&text, self.max_attachment_chars));
                    context.push('\n');
                }
                Err(e) => {
                    unavailable += 1;
                    warn!("{} ⚠️ 附件不可用: {}", ctx, e);
                    context.push_str(&format!("[attachment unavailable: {}]\n", e));
                }
            }
        }

        if question.is_empty() && usable == 0 {
            return Err(ResolutionError::Extraction {
                reason: format!(
                    "题干为空，{} 个附件均不可用",
                    page.attachments.len()
                ),
            });
        }

        debug!(
            "{} 上下文 {} 字符 (可用附件 {}, 不可用 {})",
            ctx,
            context.chars().count(),
            usable,
            unavailable
        );

        Ok(PreparedQuestion {
            context,
            answer_format: page.answer_format,
            unavailable_attachments: unavailable,
        })
    }

    /// 询问模型并校验答案
    ///
    /// `rejected` 中的答案会作为反馈附加在上下文之后
    pub async fn resolve(
        &self,
        prepared: &PreparedQuestion,
        rejected: &[RejectedAnswer],
        ctx: &QuestionCtx,
        deadline: Deadline,
    ) -> Result<Resolution, ResolutionError> {
        let format = prepared.answer_format;
        let mut prompt = build_prompt(prepared, rejected);
        let mut calls = 0;

        loop {
            calls += 1;
            info!("{} 🤖 询问模型 (第 {} 次, 格式 {})", ctx, calls, format);

            let raw_output = deadline
                .run(self.solver.ask(&prompt, format, deadline))
                .await?
                .map_err(ResolutionError::SolverUnavailable)?;
            debug!("{} 模型输出: {}", ctx, truncate_text(&raw_output, 200));

            let candidate = unwrap_model_output(&raw_output);
            match coerce(&candidate, format) {
                Ok(answer) => {
                    info!("{} ✓ 得到答案: {}", ctx, truncate_text(&answer.to_string(), 80));
                    return Ok(Resolution {
                        raw_output,
                        answer,
                        solver_calls: calls,
                    });
                }
                Err(e) if calls <= self.max_reprompts => {
                    warn!("{} ⚠️ 答案格式不合法，要求模型纠正: {}", ctx, e);
                    prompt.push_str(&format!(
                        "\n\nYour previous reply was {:?}, which is not a valid {} answer ({}). {}",
                        truncate_text(&raw_output, 200),
                        format,
                        e.reason,
                        format.instruction()
                    ));
                }
                Err(e) => {
                    warn!("{} ❌ 纠正次数用尽，答案仍不合法: {}", ctx, e);
                    return Err(ResolutionError::Validation {
                        raw_output,
                        source: e,
                    });
                }
            }
        }
    }
}

fn build_prompt(prepared: &PreparedQuestion, rejected: &[RejectedAnswer]) -> String {
    let mut prompt = prepared.context.clone();

    if !rejected.is_empty() {
        prompt.push_str("\nThese answers were already submitted and judged incorrect:\n");
        for previous in rejected {
            match &previous.reason {
                Some(reason) => prompt.push_str(&format!("- {} (reason: {})\n", previous.answer, reason)),
                None => prompt.push_str(&format!("- {}\n", previous.answer)),
            }
        }
        prompt.push_str("Re-check the data and give a different answer.\n");
    }

    prompt.push_str(&format!(
        "\nAnswer format: {}. {}",
        prepared.answer_format,
        prepared.answer_format.instruction()
    ));
    prompt
}

/// 超出长度时截断并注明
fn cap_text(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!(
        "{}\n[truncated: showing first {} of {} characters]",
        head, max_chars, total
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SolverError;
    use crate::models::Attachment;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// 按顺序返回预设回复，并记录收到的提示词
    struct ScriptedSolver {
        replies: Mutex<VecDeque<Result<String, SolverError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedSolver {
        fn new(replies: Vec<Result<String, SolverError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Solver for ScriptedSolver {
        async fn ask(
            &self,
            context: &str,
            _expected: AnswerFormat,
            _deadline: Deadline,
        ) -> Result<String, SolverError> {
            self.prompts.lock().unwrap().push(context.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SolverError::EmptyContent { model: "scripted".into() }))
        }
    }

    fn ok(text: &str) -> Result<String, SolverError> {
        Ok(text.to_string())
    }

    fn ctx() -> QuestionCtx {
        QuestionCtx::new("test", 1, 1)
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(30))
    }

    fn page(format: AnswerFormat) -> QuestionPage {
        QuestionPage::new(
            "https://quiz.example/q1",
            "What is the total of the amount column?",
            format,
            "https://quiz.example/submit",
        )
    }

    #[test]
    fn test_prepare_marks_unavailable_attachments() {
        let resolver = QuestionResolver::new(ScriptedSolver::new(vec![]), 1, 5000);
        let page = page(AnswerFormat::Number)
            .with_attachment(Attachment::new("https://quiz.example/a.csv", "csv", b"amount\n3\n4\n".to_vec()))
            .with_attachment(Attachment::new("https://quiz.example/b.png", "png", b"\x89PNG".to_vec()));

        let prepared = resolver.prepare(&page, &ctx()).unwrap();
        assert_eq!(prepared.unavailable_attachments, 1);
        assert!(prepared.context.contains("amount\n3\n4\n(2 rows)"));
        assert!(prepared.context.contains("[attachment unavailable: "));
        assert!(prepared.context.contains("What is the total"));
    }

    #[test]
    fn test_prepare_includes_page_content() {
        let resolver = QuestionResolver::new(ScriptedSolver::new(vec![]), 1, 5000);
        let with_text = page(AnswerFormat::Number)
            .with_page_text(Some("Only count rows where status is paid.".into()));

        let prepared = resolver.prepare(&with_text, &ctx()).unwrap();
        let question = prepared.context.find("What is the total").unwrap();
        let content = prepared
            .context
            .find("Page content:\nOnly count rows where status is paid.")
            .unwrap();
        assert!(question < content);

        let plain = resolver.prepare(&page(AnswerFormat::Number), &ctx()).unwrap();
        assert!(!plain.context.contains("Page content:"));
    }

    #[test]
    fn test_prepare_caps_long_attachments() {
        let resolver = QuestionResolver::new(ScriptedSolver::new(vec![]), 1, 10);
        let page = page(AnswerFormat::String)
            .with_attachment(Attachment::new("notes.txt", "txt", "x".repeat(25).into_bytes()));

        let prepared = resolver.prepare(&page, &ctx()).unwrap();
        assert!(prepared.context.contains(&format!(
            "{}\n[truncated: showing first 10 of 25 characters]",
            "x".repeat(10)
        )));
    }

    #[test]
    fn test_prepare_fails_with_nothing_to_ask() {
        let resolver = QuestionResolver::new(ScriptedSolver::new(vec![]), 1, 5000);
        let page = QuestionPage::new("https://quiz.example/q1", "  ", AnswerFormat::Number, "s")
            .with_attachment(Attachment::new("empty.csv", "csv", Vec::new()));

        let err = resolver.prepare(&page, &ctx()).unwrap_err();
        assert!(matches!(err, ResolutionError::Extraction { .. }));
    }

    #[tokio::test]
    async fn test_resolve_coerces_first_reply() {
        let solver = ScriptedSolver::new(vec![ok("```\n42\n```")]);
        let resolver = QuestionResolver::new(solver.clone(), 1, 5000);
        let prepared = resolver.prepare(&page(AnswerFormat::Number), &ctx()).unwrap();

        let resolution = resolver.resolve(&prepared, &[], &ctx(), deadline()).await.unwrap();
        assert_eq!(resolution.answer, AnswerValue::Integer(42));
        assert_eq!(resolution.solver_calls, 1);
        assert!(solver.prompts()[0].ends_with(AnswerFormat::Number.instruction()));
    }

    #[tokio::test]
    async fn test_invalid_reply_is_reprompted_with_feedback() {
        let solver = ScriptedSolver::new(vec![ok("abc"), ok("17")]);
        let resolver = QuestionResolver::new(solver.clone(), 1, 5000);
        let prepared = resolver.prepare(&page(AnswerFormat::Number), &ctx()).unwrap();

        let resolution = resolver.resolve(&prepared, &[], &ctx(), deadline()).await.unwrap();
        assert_eq!(resolution.answer, AnswerValue::Integer(17));
        assert_eq!(resolution.solver_calls, 2);

        let prompts = solver.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Your previous reply was \"abc\""));
    }

    #[tokio::test]
    async fn test_reprompt_budget_exhausted() {
        let solver = ScriptedSolver::new(vec![ok("abc"), ok("still not a number"), ok("5")]);
        let resolver = QuestionResolver::new(solver.clone(), 1, 5000);
        let prepared = resolver.prepare(&page(AnswerFormat::Number), &ctx()).unwrap();

        let err = resolver.resolve(&prepared, &[], &ctx(), deadline()).await.unwrap_err();
        assert_eq!(err.raw_output(), Some("still not a number"));
        assert!(matches!(err, ResolutionError::Validation { .. }));
        assert_eq!(solver.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_solver_error_is_reported() {
        let solver = ScriptedSolver::new(vec![Err(SolverError::EmptyContent { model: "m".into() })]);
        let resolver = QuestionResolver::new(solver, 1, 5000);
        let prepared = resolver.prepare(&page(AnswerFormat::Boolean), &ctx()).unwrap();

        let err = resolver.resolve(&prepared, &[], &ctx(), deadline()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::SolverUnavailable(_)));
    }

    #[tokio::test]
    async fn test_expired_deadline_asks_nothing() {
        let solver = ScriptedSolver::new(vec![ok("true")]);
        let resolver = QuestionResolver::new(solver.clone(), 1, 5000);
        let prepared = resolver.prepare(&page(AnswerFormat::Boolean), &ctx()).unwrap();

        let err = resolver
            .resolve(&prepared, &[], &ctx(), Deadline::expired_now())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Timeout(_)));
        assert!(solver.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_answers_are_fed_back() {
        let solver = ScriptedSolver::new(vec![ok("12")]);
        let resolver = QuestionResolver::new(solver.clone(), 1, 5000);
        let prepared = resolver.prepare(&page(AnswerFormat::Number), &ctx()).unwrap();
        let rejected = vec![RejectedAnswer {
            answer: AnswerValue::Integer(10),
            reason: Some("Too low".into()),
        }];

        resolver.resolve(&prepared, &rejected, &ctx(), deadline()).await.unwrap();
        assert!(solver.prompts()[0].contains("- 10 (reason: Too low)"));
    }
}
