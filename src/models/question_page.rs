use super::{AnswerFormat, Attachment};

/// 渲染完成的一道题
///
/// 抓取后不可变，一道题只对应一个 `QuestionPage`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionPage {
    /// 题目页面地址（提交时回传）
    pub url: String,
    /// 题干
    pub question: String,
    /// 附件
    pub attachments: Vec<Attachment>,
    /// 声明的答案格式
    pub answer_format: AnswerFormat,
    /// 提交接口地址
    pub submit_url: String,
    /// 页面正文（与题干不同时才保留，已截断）
    pub page_text: Option<String>,
}

impl QuestionPage {
    pub fn new(
        url: impl Into<String>,
        question: impl Into<String>,
        answer_format: AnswerFormat,
        submit_url: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            question: question.into(),
            attachments: Vec::new(),
            answer_format,
            submit_url: submit_url.into(),
            page_text: None,
        }
    }

    pub fn with_page_text(mut self, page_text: Option<String>) -> Self {
        self.page_text = page_text;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// 提交答案后服务端的判定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    /// 正确，并给出下一题地址
    CorrectWithNext(String),
    /// 正确，测验结束
    CorrectFinal,
    /// 错误
    Incorrect {
        reason: Option<String>,
        /// 服务端同时给出的下一题地址（仅记录）
        next: Option<String>,
    },
}
