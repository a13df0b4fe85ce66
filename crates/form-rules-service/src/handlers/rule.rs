//! 规则配置 API 处理器
//!
//! 规则的增删改查与保存前校验。保存时先校验单条规则，再检查与现有规则合并后
//! 是否超限或产生循环依赖，任一失败都拒绝保存。

use axum::{
    Json,
    extract::{Path, Query, State},
};
use forms_shared::observability::metrics as obs_metrics;
use rule_engine::{Rule, RuleError, RuleRepository};
use tracing::info;
use validator::Validate;

use crate::{
    dto::{ApiResponse, DeletedResponse, RuleQuery, TemplateQuery, UpsertRuleRequest, ValidationReport},
    error::Result,
    service,
    state::AppState,
};

/// 获取规则列表（按定义顺序）
///
/// GET /api/rules
pub async fn list_rules(
    State(state): State<AppState>,
    Query(query): Query<RuleQuery>,
) -> Result<Json<ApiResponse<Vec<Rule>>>> {
    let rules = state.rules.list(&query.filter());
    Ok(Json(ApiResponse::success(rules)))
}

/// 获取规则详情
///
/// GET /api/rules/{id}
pub async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Rule>>> {
    let rule = state
        .rules
        .get(&id)
        .ok_or(RuleError::RuleNotFound(id))?;
    Ok(Json(ApiResponse::success(rule)))
}

/// 创建规则
///
/// POST /api/rules
pub async fn create_rule(
    State(state): State<AppState>,
    Query(query): Query<TemplateQuery>,
    Json(req): Json<UpsertRuleRequest>,
) -> Result<Json<ApiResponse<Rule>>> {
    req.validate()?;
    let saved = save(&state, req.into_rule(None), query.template_id.as_deref())?;

    info!(rule_id = %saved.id, "Rule created");
    Ok(Json(ApiResponse::success_with_message(saved, "规则已保存")))
}

/// 更新规则（不存在时创建）
///
/// PUT /api/rules/{id}
pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TemplateQuery>,
    Json(req): Json<UpsertRuleRequest>,
) -> Result<Json<ApiResponse<Rule>>> {
    req.validate()?;
    let saved = save(&state, req.into_rule(Some(id)), query.template_id.as_deref())?;

    info!(rule_id = %saved.id, "Rule updated");
    Ok(Json(ApiResponse::success_with_message(saved, "规则已保存")))
}

/// 删除规则
///
/// DELETE /api/rules/{id}
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeletedResponse>>> {
    let removed = state.delete_rule(&id)?;
    obs_metrics::set_rules_loaded(state.rules.len());

    info!(rule_id = %removed.id, "Rule deleted");
    Ok(Json(ApiResponse::success(DeletedResponse { id: removed.id })))
}

/// 校验规则但不保存
///
/// POST /api/rules/validate
pub async fn validate_rule(
    State(state): State<AppState>,
    Query(query): Query<TemplateQuery>,
    Json(rule): Json<Rule>,
) -> Result<Json<ApiResponse<ValidationReport>>> {
    let report = service::validate(
        &*state.rules,
        &*state.templates,
        &state.engine,
        &rule,
        query.template_id.as_deref(),
    )?;
    Ok(Json(ApiResponse::success(report)))
}

fn save(state: &AppState, rule: Rule, template_id: Option<&str>) -> Result<Rule> {
    let result = service::resolve_catalog(&*state.templates, template_id)
        .and_then(|catalog| state.save_rule(rule, catalog.as_deref()));

    match &result {
        Ok(_) => obs_metrics::record_rule_save("ok", None),
        Err(e) => obs_metrics::record_rule_save("rejected", Some(e.error_code())),
    }
    obs_metrics::set_rules_loaded(state.rules.len());

    result
}
