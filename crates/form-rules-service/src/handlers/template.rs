//! 表单模板 API 处理器
//!
//! 模板决定了规则动作可以指向哪些字段/分区，以及 calculate 的精度与 clearValue 的默认值。

use axum::{
    Json,
    extract::{Path, State},
};
use rule_engine::{FormTemplate, TemplateRepository};
use tracing::info;
use validator::Validate;

use crate::{
    dto::{ApiResponse, UpsertTemplateRequest},
    error::{Result, ServiceError},
    state::AppState,
};

/// 注册或替换表单模板
///
/// PUT /api/templates/{id}
pub async fn put_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpsertTemplateRequest>,
) -> Result<Json<ApiResponse<FormTemplate>>> {
    req.validate()?;
    let saved = state.templates.put(req.into_template(id));

    info!(template_id = %saved.id, version = saved.version, "Template saved");
    Ok(Json(ApiResponse::success(saved)))
}

/// 获取表单模板
///
/// GET /api/templates/{id}
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<FormTemplate>>> {
    let template = state
        .templates
        .get(&id)
        .ok_or(ServiceError::TemplateNotFound(id))?;
    Ok(Json(ApiResponse::success(template)))
}
