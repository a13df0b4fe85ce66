//! 规则评估 API 处理器

use axum::{Json, extract::State};
use rule_engine::EvaluationOutcome;

use crate::{
    dto::{ApiResponse, EvaluateRequest, MatchedRuleResult},
    error::Result,
    service,
    state::AppState,
};

/// 评估规则，只返回命中的规则
///
/// POST /api/rules/evaluate
pub async fn evaluate_rules(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<ApiResponse<Vec<MatchedRuleResult>>>> {
    let outcome = service::evaluate(&*state.rules, &*state.templates, &state.engine, &req)?;
    let matched = outcome
        .matched_rules
        .into_iter()
        .map(MatchedRuleResult::from)
        .collect();
    Ok(Json(ApiResponse::success(matched)))
}

/// 评估规则并返回完整的派生状态、告警与命中规则
///
/// POST /api/rules/evaluate/state
pub async fn evaluate_state(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<ApiResponse<EvaluationOutcome>>> {
    let outcome = service::evaluate(&*state.rules, &*state.templates, &state.engine, &req)?;
    Ok(Json(ApiResponse::success(outcome)))
}
