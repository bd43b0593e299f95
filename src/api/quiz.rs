use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::orchestrator::run_session;

/// `POST /quiz` 请求体
#[derive(Debug, Clone, Deserialize)]
pub struct QuizRequest {
    pub email: String,
    pub secret: String,
    pub url: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

pub async fn index() -> impl IntoResponse {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": ["GET /health", "POST /quiz"],
    }))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

pub async fn start_quiz(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QuizRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::warn!("无效的请求体: {}", rejection.body_text());
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let config = &state.config;
    if config.secret.is_empty() || req.secret != config.secret {
        tracing::warn!("密钥错误，拒绝请求 (email={})", req.email);
        return error_response(StatusCode::FORBIDDEN, "Invalid secret");
    }
    if req.email != config.email {
        tracing::warn!("邮箱不匹配，拒绝请求 (email={})", req.email);
        return error_response(StatusCode::FORBIDDEN, "Email does not match");
    }
    if req.url.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing quiz url");
    }

    tracing::info!("收到答题请求: {} (email={})", req.url, req.email);

    let report = run_session(
        state.launcher.as_ref(),
        state.solver.clone(),
        config.session_config(),
        req.url.trim(),
        Some(req.email),
    )
    .await;

    (StatusCode::OK, Json(report)).into_response()
}
