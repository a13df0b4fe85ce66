//! 规则操作符定义
//!
//! 操作符表是固定的：每个操作符声明是否需要取值、取值是什么形态。
//! 保存规则时按此表校验，评估时按此表决定比较语义。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    // 通用比较
    Equals,
    NotEquals,

    // 数值比较
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Between,

    // 字符串操作
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Matches,

    // 空值检查
    IsEmpty,
    IsNotEmpty,

    // 列表检查
    In,
    NotIn,
}

/// 操作符期望的取值形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// 不需要取值
    None,
    /// 任意标量，按字符串/数值宽松比较
    Scalar,
    /// 必须可转换为数值
    Numeric,
    /// 取值列表
    List,
    /// `[min, max]` 闭区间
    Range,
    /// 正则表达式
    Pattern,
}

/// 操作符元信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperatorSpec {
    pub operator: Operator,
    pub requires_value: bool,
    pub value_kind: ValueKind,
}

impl Operator {
    pub const ALL: [Operator; 16] = [
        Self::Equals,
        Self::NotEquals,
        Self::GreaterThan,
        Self::LessThan,
        Self::GreaterThanOrEqual,
        Self::LessThanOrEqual,
        Self::Between,
        Self::Contains,
        Self::NotContains,
        Self::StartsWith,
        Self::EndsWith,
        Self::Matches,
        Self::IsEmpty,
        Self::IsNotEmpty,
        Self::In,
        Self::NotIn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::GreaterThanOrEqual => "greater_than_or_equal",
            Self::LessThanOrEqual => "less_than_or_equal",
            Self::Between => "between",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Matches => "matches",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
            Self::In => "in",
            Self::NotIn => "not_in",
        }
    }

    /// 操作符元信息
    pub fn spec(&self) -> OperatorSpec {
        let value_kind = match self {
            Self::Equals
            | Self::NotEquals
            | Self::Contains
            | Self::NotContains
            | Self::StartsWith
            | Self::EndsWith => ValueKind::Scalar,
            Self::GreaterThan
            | Self::LessThan
            | Self::GreaterThanOrEqual
            | Self::LessThanOrEqual => ValueKind::Numeric,
            Self::Between => ValueKind::Range,
            Self::Matches => ValueKind::Pattern,
            Self::In | Self::NotIn => ValueKind::List,
            Self::IsEmpty | Self::IsNotEmpty => ValueKind::None,
        };

        OperatorSpec {
            operator: *self,
            requires_value: value_kind != ValueKind::None,
            value_kind,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|op| op.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown operator: {}", s))
    }
}

/// 条件中引用的操作符
///
/// 未知的操作符字符串会被原样保留而不是让整条规则反序列化失败：
/// 保存时由编译器拒绝，评估时按格式错误处理（结果为 false 并产生告警）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperatorRef {
    Known(Operator),
    Unknown(String),
}

impl OperatorRef {
    pub fn known(&self) -> Option<Operator> {
        match self {
            Self::Known(op) => Some(*op),
            Self::Unknown(_) => None,
        }
    }
}

impl Default for OperatorRef {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl From<Operator> for OperatorRef {
    fn from(op: Operator) -> Self {
        Self::Known(op)
    }
}

impl fmt::Display for OperatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(op) => write!(f, "{}", op),
            Self::Unknown(raw) => write!(f, "{}", raw),
        }
    }
}

/// 操作符注册表
pub struct OperatorRegistry;

impl OperatorRegistry {
    /// 按名称查找操作符
    pub fn lookup(key: &str) -> Option<OperatorSpec> {
        key.parse::<Operator>().ok().map(|op| op.spec())
    }

    /// 全部操作符（固定顺序）
    pub fn all() -> impl Iterator<Item = OperatorSpec> {
        Operator::ALL.iter().map(|op| op.spec())
    }
}

/// 逻辑操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}
