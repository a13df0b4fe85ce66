//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use forms_shared::observability::middleware as obs_middleware;

use crate::{handlers, state::AppState};

/// 规则配置与评估路由
///
/// 静态段（evaluate、validate）优先于 `{id}` 匹配。
pub fn rule_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/rules",
            get(handlers::rule::list_rules).post(handlers::rule::create_rule),
        )
        .route("/rules/evaluate", post(handlers::evaluate::evaluate_rules))
        .route(
            "/rules/evaluate/state",
            post(handlers::evaluate::evaluate_state),
        )
        .route("/rules/validate", post(handlers::rule::validate_rule))
        .route(
            "/rules/{id}",
            get(handlers::rule::get_rule)
                .put(handlers::rule::update_rule)
                .delete(handlers::rule::delete_rule),
        )
}

/// 表单模板路由
pub fn template_routes() -> Router<AppState> {
    Router::new().route(
        "/templates/{id}",
        put(handlers::template::put_template).get(handlers::template::get_template),
    )
}

/// 全部 API 路由（挂载在 /api 下）
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(rule_routes()).merge(template_routes())
}

/// 组装完整应用：API、健康检查与可观测性中间件
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .route("/health", get(handlers::health::health_check))
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}
