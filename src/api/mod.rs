//! HTTP 入口
//!
//! 校验调用方身份后启动一次会话，把 `SessionReport` 作为响应返回

pub mod quiz;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;

use crate::config::Config;
use crate::error::AppError;
use crate::services::{RendererLauncher, Solver};

/// 所有请求共享的只读状态
pub struct AppState {
    pub config: Config,
    pub solver: Arc<dyn Solver>,
    pub launcher: Arc<dyn RendererLauncher>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(quiz::index))
        .route("/health", get(quiz::health))
        .route("/quiz", post(quiz::start_quiz))
        .with_state(state)
}

/// 监听配置的地址直到进程退出
pub async fn serve(state: Arc<AppState>) -> Result<(), AppError> {
    let addr = format!("{}:{}", state.config.bind_address, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 服务已启动: http://{}", addr);

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
