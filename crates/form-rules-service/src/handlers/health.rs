//! 存活探针

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::state::AppState;

/// 服务进程正常即返回 ok，附带当前存储规模
///
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "form-rules-service",
        "rules": state.rules.len(),
        "templates": state.templates.len()
    }))
}
