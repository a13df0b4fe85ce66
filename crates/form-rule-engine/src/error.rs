//! 规则引擎错误类型
//!
//! 只有在规则编写/加载阶段就能发现的问题才会以 `RuleError` 形式返回；
//! 评估阶段的问题一律降级为 [`Warning`](crate::warnings::Warning)。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则解析失败: {0}")]
    ParseError(String),

    #[error("条件格式错误 '{path}': {reason}")]
    MalformedCondition { path: String, reason: String },

    #[error("无效的操作符: '{operator}' (位置 {path})")]
    InvalidOperator { operator: String, path: String },

    #[error("操作符 {operator} 的取值无效: {reason}")]
    InvalidValue { operator: String, reason: String },

    #[error("目标字段不存在: {0}")]
    UnknownTarget(String),

    #[error("公式错误: {0}")]
    Formula(String),

    #[error("规则集存在循环依赖: {}", cycle.join(" -> "))]
    CyclicRuleSet { cycle: Vec<String> },

    #[error("超出限制: {what} 最大 {max}, 实际 {actual}")]
    LimitExceeded {
        what: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RuleError {
    /// 错误码（HTTP 层直接透出）
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseError(_) => "RULE_PARSE_ERROR",
            Self::MalformedCondition { .. } => "MALFORMED_CONDITION",
            Self::InvalidOperator { .. } => "INVALID_OPERATOR",
            Self::InvalidValue { .. } => "INVALID_OPERATOR_VALUE",
            Self::UnknownTarget(_) => "UNKNOWN_TARGET",
            Self::Formula(_) => "FORMULA_ERROR",
            Self::CyclicRuleSet { .. } => "CYCLIC_RULE_SET",
            Self::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::JsonError(_) => "INVALID_JSON",
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = RuleError::CyclicRuleSet {
            cycle: vec!["bmi".into(), "weight".into(), "bmi".into()],
        };
        assert_eq!(err.to_string(), "规则集存在循环依赖: bmi -> weight -> bmi");
        assert_eq!(err.code(), "CYCLIC_RULE_SET");
    }
}
