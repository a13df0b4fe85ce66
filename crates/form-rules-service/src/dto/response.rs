//! 响应 DTO 定义

use rule_engine::{Action, MatchedRule, RuleType};
use serde::Serialize;

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    /// 创建成功响应（自定义消息）
    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

/// 命中的规则
///
/// 未命中的规则不出现在结果中，因此 `applied` 恒为 true。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedRuleResult {
    pub rule_id: String,
    pub rule_name: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub actions: Vec<Action>,
    pub applied: bool,
}

impl From<MatchedRule> for MatchedRuleResult {
    fn from(matched: MatchedRule) -> Self {
        Self {
            rule_id: matched.rule_id,
            rule_name: matched.rule_name,
            rule_type: matched.rule_type,
            actions: matched.actions,
            applied: true,
        }
    }
}

/// 规则校验结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// 条件中引用的上下文字段
    pub referenced_fields: Vec<String>,
}

/// 删除结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedResponse {
    pub id: String,
}
