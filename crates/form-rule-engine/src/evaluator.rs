//! 条件评估器
//!
//! 叶子条件按操作符表比较，逻辑组递归短路求值。
//! 评估是全函数：任何格式问题都只会让条件为 false 并记录告警，不会返回错误或 panic。

use crate::error::{Result, RuleError};
use crate::models::{Condition, ConditionGroup, ConditionNode, EvaluationContext};
use crate::operators::{LogicalOperator, Operator, OperatorRef};
use crate::warnings::Warning;
use regex::Regex;
use serde_json::{Number, Value};
use std::borrow::Cow;

/// 默认最大嵌套深度
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// 评估过程中收集的告警与追踪信息
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub warnings: Vec<Warning>,
    pub trace: Vec<String>,
}

/// 条件评估器
#[derive(Debug, Clone)]
pub struct ConditionEvaluator {
    max_depth: usize,
    trace_enabled: bool,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            trace_enabled: false,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// 评估任意条件节点，丢弃告警
    ///
    /// 供工作流等外部模块把条件评估当作黑盒使用。
    pub fn evaluate(&self, node: &ConditionNode, context: &EvaluationContext) -> bool {
        let mut diagnostics = Diagnostics::default();
        self.evaluate_node(node, context, "", "root", 1, &mut diagnostics)
    }

    /// 评估规则的根条件组
    pub fn evaluate_group(
        &self,
        group: &ConditionGroup,
        context: &EvaluationContext,
        rule_id: &str,
        diagnostics: &mut Diagnostics,
    ) -> bool {
        self.group(group, context, rule_id, "conditions", 1, diagnostics)
    }

    fn evaluate_node(
        &self,
        node: &ConditionNode,
        context: &EvaluationContext,
        rule_id: &str,
        path: &str,
        depth: usize,
        diagnostics: &mut Diagnostics,
    ) -> bool {
        match node {
            ConditionNode::Condition(cond) => {
                self.condition(cond, context, rule_id, path, diagnostics)
            }
            ConditionNode::Group(group) => {
                self.group(group, context, rule_id, path, depth, diagnostics)
            }
        }
    }

    /// 评估逻辑组节点（短路求值）
    fn group(
        &self,
        group: &ConditionGroup,
        context: &EvaluationContext,
        rule_id: &str,
        path: &str,
        depth: usize,
        diagnostics: &mut Diagnostics,
    ) -> bool {
        if depth > self.max_depth {
            diagnostics.warnings.push(Warning::DepthExceeded {
                rule_id: rule_id.to_string(),
                path: path.to_string(),
                max_depth: self.max_depth,
            });
            return false;
        }

        if self.trace_enabled {
            diagnostics.trace.push(format!(
                "{}: 开始评估 {} 组 (共 {} 个子节点)",
                path,
                group.operator,
                group.conditions.len()
            ));
        }

        match group.operator {
            LogicalOperator::And => {
                for (i, child) in group.conditions.iter().enumerate() {
                    let child_path = format!("{}.conditions[{}]", path, i);
                    if !self.evaluate_node(child, context, rule_id, &child_path, depth + 1, diagnostics)
                    {
                        if self.trace_enabled {
                            diagnostics
                                .trace
                                .push(format!("{}: AND 短路 - 子节点 {} 不匹配", path, i));
                        }
                        return false;
                    }
                }
                // 空 AND 组恒为真
                true
            }
            LogicalOperator::Or => {
                for (i, child) in group.conditions.iter().enumerate() {
                    let child_path = format!("{}.conditions[{}]", path, i);
                    if self.evaluate_node(child, context, rule_id, &child_path, depth + 1, diagnostics)
                    {
                        if self.trace_enabled {
                            diagnostics
                                .trace
                                .push(format!("{}: OR 短路 - 子节点 {} 匹配", path, i));
                        }
                        return true;
                    }
                }
                // 空 OR 组恒为假
                false
            }
        }
    }

    /// 评估叶子条件
    fn condition(
        &self,
        cond: &Condition,
        context: &EvaluationContext,
        rule_id: &str,
        path: &str,
        diagnostics: &mut Diagnostics,
    ) -> bool {
        let malformed = |reason: String, diagnostics: &mut Diagnostics| {
            diagnostics.warnings.push(Warning::MalformedCondition {
                rule_id: rule_id.to_string(),
                path: path.to_string(),
                reason,
            });
            false
        };

        if cond.field.trim().is_empty() {
            return malformed("缺少字段".to_string(), diagnostics);
        }

        let operator = match &cond.operator {
            OperatorRef::Known(op) => *op,
            OperatorRef::Unknown(raw) if raw.is_empty() => {
                return malformed("缺少操作符".to_string(), diagnostics);
            }
            OperatorRef::Unknown(raw) => {
                return malformed(format!("未知操作符 '{}'", raw), diagnostics);
            }
        };

        let field_value = context.get_field(&cond.field);
        let matched = match Self::compare(field_value, operator, &cond.value) {
            Ok(matched) => matched,
            Err(e) => return malformed(e.to_string(), diagnostics),
        };

        if self.trace_enabled {
            diagnostics.trace.push(format!(
                "{}: {} => {}",
                path,
                cond,
                if matched { "MATCHED" } else { "NOT_MATCHED" }
            ));
        }

        matched
    }

    /// 按操作符比较字段值与期望值
    ///
    /// 仅当期望值本身形态错误（列表/区间/正则）时返回错误；
    /// 字段缺失或无法转为数值属于正常的"不匹配"。
    pub fn compare(
        field_value: Option<&Value>,
        operator: Operator,
        expected: &Value,
    ) -> Result<bool> {
        match operator {
            Operator::IsEmpty => Ok(Self::is_empty(field_value)),
            Operator::IsNotEmpty => Ok(!Self::is_empty(field_value)),
            Operator::Equals => Ok(Self::loose_eq(field_value, expected)),
            Operator::NotEquals => Ok(!Self::loose_eq(field_value, expected)),
            Operator::GreaterThan => Ok(Self::numeric(field_value, expected, |a, b| a > b)),
            Operator::LessThan => Ok(Self::numeric(field_value, expected, |a, b| a < b)),
            Operator::GreaterThanOrEqual => {
                Ok(Self::numeric(field_value, expected, |a, b| a >= b))
            }
            Operator::LessThanOrEqual => Ok(Self::numeric(field_value, expected, |a, b| a <= b)),
            Operator::Between => Self::between(field_value, expected),
            Operator::Contains => Ok(Self::contains(field_value, expected)),
            Operator::NotContains => Ok(!Self::contains(field_value, expected)),
            Operator::StartsWith => {
                Ok(Self::coerce_string(field_value).starts_with(Self::coerce_string(Some(expected)).as_ref()))
            }
            Operator::EndsWith => {
                Ok(Self::coerce_string(field_value).ends_with(Self::coerce_string(Some(expected)).as_ref()))
            }
            Operator::In => Self::in_list(field_value, expected),
            Operator::NotIn => Self::in_list(field_value, expected).map(|r| !r),
            Operator::Matches => Self::regex_match(field_value, expected),
        }
    }

    /// 判断值是否为空
    fn is_empty(value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(arr)) => arr.is_empty(),
            Some(Value::Object(obj)) => obj.is_empty(),
            _ => false,
        }
    }

    /// 宽松相等：双方都是数值时按数值比较，否则统一转字符串比较
    fn loose_eq(field: Option<&Value>, expected: &Value) -> bool {
        if let (Some(Value::Number(a)), Value::Number(b)) = (field, expected) {
            if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
                return a == b;
            }
        }

        Self::coerce_string(field) == Self::coerce_string(Some(expected))
    }

    /// 数值比较，任何一方无法转为数值时结果为 false
    fn numeric<F>(field: Option<&Value>, expected: &Value, cmp: F) -> bool
    where
        F: Fn(f64, f64) -> bool,
    {
        match (to_number(field), to_number(Some(expected))) {
            (Some(a), Some(b)) => cmp(a, b),
            _ => false,
        }
    }

    /// 范围比较 (between)，expected 应为 [min, max] 数组，闭区间
    fn between(field: Option<&Value>, expected: &Value) -> Result<bool> {
        let bounds = match expected.as_array() {
            Some(arr) if arr.len() == 2 => arr,
            _ => {
                return Err(RuleError::InvalidValue {
                    operator: Operator::Between.to_string(),
                    reason: "需要 [min, max] 数组".to_string(),
                });
            }
        };

        let (Some(min), Some(max)) = (to_number(Some(&bounds[0])), to_number(Some(&bounds[1])))
        else {
            return Err(RuleError::InvalidValue {
                operator: Operator::Between.to_string(),
                reason: "区间端点必须是数值".to_string(),
            });
        };

        Ok(to_number(field).is_some_and(|v| v >= min && v <= max))
    }

    /// 字符串包含子串；数组字段按元素包含
    fn contains(field: Option<&Value>, expected: &Value) -> bool {
        match field {
            Some(Value::Array(items)) => items.iter().any(|item| Self::loose_eq(Some(item), expected)),
            _ => Self::coerce_string(field).contains(Self::coerce_string(Some(expected)).as_ref()),
        }
    }

    /// 列表包含检查 (in)；多选字段任一元素在列表中即匹配
    fn in_list(field: Option<&Value>, expected: &Value) -> Result<bool> {
        let list = expected.as_array().ok_or_else(|| RuleError::InvalidValue {
            operator: Operator::In.to_string(),
            reason: format!("需要数组，实际为 {}", type_name(expected)),
        })?;

        let is_member = |value: &Value| list.iter().any(|item| Self::loose_eq(Some(value), item));

        Ok(match field {
            None => false,
            Some(Value::Array(items)) => items.iter().any(is_member),
            Some(value) => is_member(value),
        })
    }

    /// 正则表达式匹配
    fn regex_match(field: Option<&Value>, expected: &Value) -> Result<bool> {
        let pattern = expected.as_str().ok_or_else(|| RuleError::InvalidValue {
            operator: Operator::Matches.to_string(),
            reason: format!("需要正则字符串，实际为 {}", type_name(expected)),
        })?;

        let regex = Regex::new(pattern).map_err(|e| RuleError::InvalidValue {
            operator: Operator::Matches.to_string(),
            reason: format!("无效的正则表达式 '{}': {}", pattern, e),
        })?;

        Ok(regex.is_match(&Self::coerce_string(field)))
    }

    /// 字符串化：缺失和 null 视为空串，整数值不带小数点，数组用逗号连接
    pub fn coerce_string(value: Option<&Value>) -> Cow<'_, str> {
        match value {
            None | Some(Value::Null) => Cow::Borrowed(""),
            Some(Value::String(s)) => Cow::Borrowed(s.as_str()),
            Some(Value::Bool(b)) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Some(Value::Number(n)) => Cow::Owned(number_to_string(n)),
            Some(Value::Array(items)) => Cow::Owned(
                items
                    .iter()
                    .map(|item| Self::coerce_string(Some(item)).into_owned())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Some(other @ Value::Object(_)) => Cow::Owned(other.to_string()),
        }
    }
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// 尝试将 Value 转换为 f64
///
/// 空值（缺失、null、空串）、数组和对象都不是数值。
pub fn to_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn number_to_string(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        // f64 的 Display 对整数值不输出 ".0"
        n.as_f64().map(|f| f.to_string()).unwrap_or_default()
    }
}

/// 获取值的类型名称
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
