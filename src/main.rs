use std::sync::Arc;

use anyhow::{Context, Result};
use llm_quiz_solver::api::{self, AppState};
use llm_quiz_solver::services::{ChromiumLauncher, LlmSolver};
use llm_quiz_solver::utils::logging;
use llm_quiz_solver::{run_session, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load().context("配置加载失败")?;

    // 初始化日志
    logging::init(config.verbose_logging);
    logging::log_startup(&config);

    let solver = Arc::new(LlmSolver::new(&config));
    let launcher = Arc::new(ChromiumLauncher::new(config.renderer_config()));

    // 带 URL 参数时只跑一场测验并打印报告
    if let Some(url) = std::env::args().nth(1) {
        let report = run_session(
            launcher.as_ref(),
            solver,
            config.session_config(),
            &url,
            Some(config.email.clone()),
        )
        .await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let state = Arc::new(AppState {
        config,
        solver,
        launcher,
    });
    api::serve(state).await?;

    Ok(())
}
