/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::{AttemptOutcome, SessionReport, SessionState};

/// 初始化 tracing 订阅器
///
/// 优先使用 `RUST_LOG`，否则按 `verbose` 选择 debug / info。重复调用无副作用
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 测验自动解题服务");
    info!("🤖 模型: {} ({})", config.llm_model_name, config.llm_api_base_url);
    info!(
        "⏱  时间预算: {} 秒, 每题重试: {} 次, 格式纠正: {} 次",
        config.time_budget_secs, config.max_retries, config.max_reprompts
    );
    if config.secret.is_empty() {
        warn!("⚠️  未配置 QUIZ_SECRET，所有 /quiz 请求都会被拒绝");
    }
    info!("{}", "=".repeat(60));
}

/// 打印会话报告
pub fn log_session_report(report: &SessionReport) {
    let accepted = report
        .attempts
        .iter()
        .filter(|a| a.outcome() == AttemptOutcome::Accepted)
        .count();

    info!("\n{}", "=".repeat(60));
    info!("📊 会话结束: {}", report.entry_url);
    info!(
        "完成时间: {}",
        report.finished_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    match report.state {
        SessionState::Done => info!("✅ 状态: {}", report.state),
        _ => error!("❌ 状态: {}", report.state),
    }
    info!("📄 完成题目: {}", report.questions_completed);
    info!("📝 尝试次数: {} (通过 {})", report.attempts.len(), accepted);
    info!("⏱  耗时: {} ms", report.elapsed_ms);
    if let Some(failure) = &report.failure {
        info!("原因: {}", failure);
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
