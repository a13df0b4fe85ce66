//! 评估期告警
//!
//! 评估阶段遇到的问题（条件格式错误、目标不存在、公式无法计算）不会中断整轮评估，
//! 而是收集为告警随结果返回。

use crate::models::ActionType;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Warning {
    /// 条件缺少字段/操作符、取值形态不对或正则无效，按 false 处理
    MalformedCondition {
        rule_id: String,
        path: String,
        reason: String,
    },
    /// 动作目标不在模板中，动作被跳过
    UnknownTarget {
        rule_id: String,
        action: ActionType,
        target: String,
    },
    /// calculate 动作无法求值，目标值保持不变
    FormulaError {
        rule_id: String,
        target: String,
        reason: String,
    },
    /// 条件嵌套超过上限，超出部分按 false 处理
    DepthExceeded {
        rule_id: String,
        path: String,
        max_depth: usize,
    },
}

impl Warning {
    pub fn rule_id(&self) -> &str {
        match self {
            Self::MalformedCondition { rule_id, .. }
            | Self::UnknownTarget { rule_id, .. }
            | Self::FormulaError { rule_id, .. }
            | Self::DepthExceeded { rule_id, .. } => rule_id,
        }
    }

    /// 指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedCondition { .. } => "malformed_condition",
            Self::UnknownTarget { .. } => "unknown_target",
            Self::FormulaError { .. } => "formula_error",
            Self::DepthExceeded { .. } => "depth_exceeded",
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedCondition {
                rule_id,
                path,
                reason,
            } => write!(f, "[{}] 条件格式错误 {}: {}", rule_id, path, reason),
            Self::UnknownTarget {
                rule_id,
                action,
                target,
            } => write!(f, "[{}] {} 动作的目标不存在: {}", rule_id, action, target),
            Self::FormulaError {
                rule_id,
                target,
                reason,
            } => write!(f, "[{}] 计算 {} 失败: {}", rule_id, target, reason),
            Self::DepthExceeded {
                rule_id,
                path,
                max_depth,
            } => write!(f, "[{}] {} 嵌套超过 {} 层", rule_id, path, max_depth),
        }
    }
}
