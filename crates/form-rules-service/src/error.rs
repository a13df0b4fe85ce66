//! 规则服务错误类型定义

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rule_engine::RuleError;
use serde_json::json;

/// 规则服务错误类型
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("表单模板不存在: {0}")]
    TemplateNotFound(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ServiceError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::TemplateNotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Rule(err) => match err {
                RuleError::RuleNotFound(_) => StatusCode::NOT_FOUND,
                RuleError::CyclicRuleSet { .. } | RuleError::LimitExceeded { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                RuleError::ParseError(_)
                | RuleError::MalformedCondition { .. }
                | RuleError::InvalidOperator { .. }
                | RuleError::InvalidValue { .. }
                | RuleError::UnknownTarget(_)
                | RuleError::Formula(_)
                | RuleError::JsonError(_) => StatusCode::BAD_REQUEST,
            },
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::TemplateNotFound(_) => "TEMPLATE_NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Rule(err) => err.code(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 内部错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(ServiceError, StatusCode, &'static str)> {
        vec![
            (ServiceError::Validation("name".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            (ServiceError::TemplateNotFound("admission".into()), StatusCode::NOT_FOUND, "TEMPLATE_NOT_FOUND"),
            (ServiceError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            (RuleError::RuleNotFound("r1".into()).into(), StatusCode::NOT_FOUND, "RULE_NOT_FOUND"),
            (
                RuleError::CyclicRuleSet { cycle: vec!["a".into(), "b".into(), "a".into()] }.into(),
                StatusCode::UNPROCESSABLE_ENTITY,
                "CYCLIC_RULE_SET",
            ),
            (
                RuleError::LimitExceeded { what: "rules", max: 500, actual: 501 }.into(),
                StatusCode::UNPROCESSABLE_ENTITY,
                "LIMIT_EXCEEDED",
            ),
            (
                RuleError::InvalidOperator { operator: "roughly".into(), path: "conditions.conditions[0]".into() }.into(),
                StatusCode::BAD_REQUEST,
                "INVALID_OPERATOR",
            ),
            (
                RuleError::InvalidValue { operator: "between".into(), reason: "需要 [min, max]".into() }.into(),
                StatusCode::BAD_REQUEST,
                "INVALID_OPERATOR_VALUE",
            ),
            (RuleError::UnknownTarget("ghost".into()).into(), StatusCode::BAD_REQUEST, "UNKNOWN_TARGET"),
            (RuleError::Formula("除数为零".into()).into(), StatusCode::BAD_REQUEST, "FORMULA_ERROR"),
            (RuleError::ParseError("空消息".into()).into(), StatusCode::BAD_REQUEST, "RULE_PARSE_ERROR"),
        ]
    }

    #[test]
    fn test_all_variants_status_code() {
        for (error, expected_status, label) in all_error_variants() {
            assert_eq!(error.status_code(), expected_status, "状态码不匹配: variant={label}");
        }
    }

    #[test]
    fn test_all_variants_error_code() {
        for (error, _status, expected_code) in all_error_variants() {
            assert_eq!(error.error_code(), expected_code);
        }
    }

    #[tokio::test]
    async fn test_into_response_body() {
        let response = ServiceError::TemplateNotFound("admission".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "TEMPLATE_NOT_FOUND");
        assert!(json["data"].is_null());
    }

    #[tokio::test]
    async fn test_internal_error_message_is_masked() {
        let response = ServiceError::Internal("secret path /etc".into()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(!json["message"].as_str().unwrap().contains("/etc"));
    }
}
