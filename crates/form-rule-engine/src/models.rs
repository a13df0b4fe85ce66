//! 规则引擎领域模型

use crate::operators::{LogicalOperator, Operator, OperatorRef};
use crate::warnings::Warning;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// 未指定目标的提示信息挂在表单级条目上
pub const FORM_SCOPE: &str = "_form";

/// 规则类型（HTTP 结果中以 `type` 字段透出）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleType {
    #[default]
    Visibility,
    Validation,
    Calculation,
    ClinicalDecision,
}

/// 规则定义
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "type")]
    pub rule_type: RuleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub conditions: ConditionGroup,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    pub fn new(name: impl Into<String>, conditions: ConditionGroup, actions: Vec<Action>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            rule_type: RuleType::default(),
            category: None,
            enabled: true,
            priority: 0,
            conditions,
            actions,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_type(mut self, rule_type: RuleType) -> Self {
        self.rule_type = rule_type;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// 条件树节点（条件或逻辑组）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    Group(ConditionGroup),
    Condition(Condition),
}

impl From<Condition> for ConditionNode {
    fn from(cond: Condition) -> Self {
        Self::Condition(cond)
    }
}

impl From<ConditionGroup> for ConditionNode {
    fn from(group: ConditionGroup) -> Self {
        Self::Group(group)
    }
}

/// 条件节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub operator: OperatorRef,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

/// 逻辑组节点
///
/// 兼容旧版扁平条件列表：直接给出数组时按单层 AND 组处理。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "GroupRepr")]
pub struct ConditionGroup {
    pub operator: LogicalOperator,
    pub conditions: Vec<ConditionNode>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GroupRepr {
    Flat(Vec<ConditionNode>),
    Tree {
        operator: LogicalOperator,
        conditions: Vec<ConditionNode>,
    },
}

impl From<GroupRepr> for ConditionGroup {
    fn from(repr: GroupRepr) -> Self {
        match repr {
            GroupRepr::Flat(conditions) => Self::and(conditions),
            GroupRepr::Tree {
                operator,
                conditions,
            } => Self::new(operator, conditions),
        }
    }
}

impl ConditionGroup {
    pub fn new(operator: LogicalOperator, conditions: Vec<ConditionNode>) -> Self {
        Self {
            operator,
            conditions,
        }
    }

    pub fn and(conditions: Vec<ConditionNode>) -> Self {
        Self::new(LogicalOperator::And, conditions)
    }

    pub fn or(conditions: Vec<ConditionNode>) -> Self {
        Self::new(LogicalOperator::Or, conditions)
    }

    /// 便捷构造：由若干叶子条件组成的 AND 组
    pub fn all_of(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::and(conditions.into_iter().map(ConditionNode::from).collect())
    }

    /// 条件树引用的全部字段路径（去重，按出现顺序）
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        let mut stack: Vec<&ConditionNode> = self.conditions.iter().rev().collect();

        while let Some(node) = stack.pop() {
            match node {
                ConditionNode::Condition(cond) => {
                    if !cond.field.is_empty() && !fields.contains(&cond.field.as_str()) {
                        fields.push(&cond.field);
                    }
                }
                ConditionNode::Group(group) => stack.extend(group.conditions.iter().rev()),
            }
        }

        fields
    }
}

impl Default for ConditionGroup {
    fn default() -> Self {
        Self::and(Vec::new())
    }
}

/// 动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Show,
    Hide,
    Enable,
    Disable,
    Require,
    Optional,
    SetValue,
    ClearValue,
    Calculate,
    ShowAlert,
    ShowWarning,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Show => "show",
            Self::Hide => "hide",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Require => "require",
            Self::Optional => "optional",
            Self::SetValue => "setValue",
            Self::ClearValue => "clearValue",
            Self::Calculate => "calculate",
            Self::ShowAlert => "showAlert",
            Self::ShowWarning => "showWarning",
        };
        f.write_str(s)
    }
}

/// 规则命中后执行的动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Show {
        target: String,
    },
    Hide {
        target: String,
    },
    Enable {
        target: String,
    },
    Disable {
        target: String,
    },
    Require {
        target: String,
    },
    Optional {
        target: String,
    },
    SetValue {
        target: String,
        #[serde(default)]
        value: Value,
    },
    ClearValue {
        target: String,
    },
    Calculate {
        target: String,
        formula: String,
    },
    ShowAlert {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        message: String,
    },
    ShowWarning {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        message: String,
    },
}

impl Action {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::Show { .. } => ActionType::Show,
            Self::Hide { .. } => ActionType::Hide,
            Self::Enable { .. } => ActionType::Enable,
            Self::Disable { .. } => ActionType::Disable,
            Self::Require { .. } => ActionType::Require,
            Self::Optional { .. } => ActionType::Optional,
            Self::SetValue { .. } => ActionType::SetValue,
            Self::ClearValue { .. } => ActionType::ClearValue,
            Self::Calculate { .. } => ActionType::Calculate,
            Self::ShowAlert { .. } => ActionType::ShowAlert,
            Self::ShowWarning { .. } => ActionType::ShowWarning,
        }
    }

    /// 动作作用的字段/分区 ID；提示类动作未指定目标时返回 None
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Show { target }
            | Self::Hide { target }
            | Self::Enable { target }
            | Self::Disable { target }
            | Self::Require { target }
            | Self::Optional { target }
            | Self::SetValue { target, .. }
            | Self::ClearValue { target }
            | Self::Calculate { target, .. } => Some(target),
            Self::ShowAlert { target, .. } | Self::ShowWarning { target, .. } => {
                target.as_deref()
            }
        }
    }

    /// 是否会写入字段值（参与循环依赖检测）
    pub fn writes_value(&self) -> bool {
        matches!(self, Self::SetValue { .. } | Self::Calculate { .. })
    }
}

/// 评估上下文 - 表单数据 + 患者属性 + 就诊属性
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationContext {
    data: Value,
}

impl EvaluationContext {
    pub fn new(data: Value) -> Self {
        Self { data }
    }

    /// 从 JSON 对象创建
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let data: Value = serde_json::from_str(json)?;
        Ok(Self { data })
    }

    /// 组装上下文：表单字段位于顶层，患者/就诊属性分别挂在 `patient` / `visit` 下
    pub fn from_parts(form_data: Value, patient: Option<Value>, visit: Option<Value>) -> Self {
        let mut root = match form_data {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        if let Some(patient) = patient {
            root.insert("patient".to_string(), patient);
        }
        if let Some(visit) = visit {
            root.insert("visit".to_string(), visit);
        }

        Self {
            data: Value::Object(root),
        }
    }

    /// 获取字段值（支持点号分隔的路径，如 "vitals.heartRate" 或 "diagnoses.0.code"）
    pub fn get_field(&self, path: &str) -> Option<&Value> {
        let mut current = &self.data;

        for part in path.split('.') {
            match current {
                Value::Object(map) => {
                    current = map.get(part)?;
                }
                Value::Array(arr) => {
                    let index: usize = part.parse().ok()?;
                    current = arr.get(index)?;
                }
                _ => return None,
            }
        }

        Some(current)
    }

    /// 返回写入了一个字段的新上下文（原上下文不变）
    ///
    /// 数字段落与 `get_field` 一致按数组下标处理：下标在范围内时写入该元素，
    /// 等于数组长度时追加。其余缺失或类型不符的中间节点被替换为对象。
    pub fn with_field(&self, path: &str, value: Value) -> Self {
        let mut data = self.data.clone();
        let mut current = &mut data;
        for part in path.split('.') {
            current = child_slot(current, part);
        }
        *current = value;
        Self { data }
    }

    /// 获取底层数据
    pub fn data(&self) -> &Value {
        &self.data
    }
}

fn child_slot<'a>(node: &'a mut Value, part: &str) -> &'a mut Value {
    let index = match &*node {
        Value::Array(items) => part.parse::<usize>().ok().filter(|i| *i <= items.len()),
        _ => None,
    };

    match (index, node) {
        (Some(i), Value::Array(items)) => {
            if i == items.len() {
                items.push(Value::Null);
            }
            &mut items[i]
        }
        (_, node) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            // 对象上按键索引会在缺失时插入 null
            &mut node[part]
        }
    }
}

/// 单个字段/分区的派生状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetState {
    pub visible: bool,
    pub enabled: bool,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Default for TargetState {
    fn default() -> Self {
        Self {
            visible: true,
            enabled: true,
            required: false,
            value: None,
            errors: Vec::new(),
        }
    }
}

/// 派生状态：targetId -> 状态
///
/// 使用有序 Map，保证同样的输入序列化结果逐字节一致。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivedState {
    targets: BTreeMap<String, TargetState>,
}

impl DerivedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取目标状态；从未写入过的目标返回 None
    pub fn get(&self, target: &str) -> Option<&TargetState> {
        self.targets.get(target)
    }

    /// 获取目标状态，未出现的目标视为全默认
    pub fn state_of(&self, target: &str) -> TargetState {
        self.targets.get(target).cloned().unwrap_or_default()
    }

    pub fn is_visible(&self, target: &str) -> bool {
        self.targets.get(target).is_none_or(|s| s.visible)
    }

    pub fn is_enabled(&self, target: &str) -> bool {
        self.targets.get(target).is_none_or(|s| s.enabled)
    }

    pub fn is_required(&self, target: &str) -> bool {
        self.targets.get(target).is_some_and(|s| s.required)
    }

    pub fn value(&self, target: &str) -> Option<&Value> {
        self.targets.get(target).and_then(|s| s.value.as_ref())
    }

    pub fn errors(&self, target: &str) -> &[String] {
        self.targets
            .get(target)
            .map(|s| s.errors.as_slice())
            .unwrap_or(&[])
    }

    pub fn entry_mut(&mut self, target: &str) -> &mut TargetState {
        self.targets.entry(target.to_string()).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TargetState)> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// 命中的规则
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedRule {
    pub rule_id: String,
    pub rule_name: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub priority: i32,
    pub actions: Vec<Action>,
}

/// 一次完整评估的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationOutcome {
    pub derived_state: DerivedState,
    pub warnings: Vec<Warning>,
    /// 按优先级从高到低排列
    pub matched_rules: Vec<MatchedRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_deserialization() {
        let json = r#"
        {
            "id": "rule-001",
            "name": "pregnancy_history",
            "ruleType": "visibility",
            "priority": 10,
            "conditions": {
                "operator": "AND",
                "conditions": [
                    {"field": "patient.gender", "operator": "equals", "value": "female"},
                    {
                        "operator": "OR",
                        "conditions": [
                            {"field": "patient.age", "operator": "greater_than_or_equal", "value": 12},
                            {"field": "visit.department", "operator": "equals", "value": "obstetrics"}
                        ]
                    }
                ]
            },
            "actions": [
                {"type": "show", "target": "pregnancyHistory"},
                {"type": "require", "target": "lastMenstrualPeriod"}
            ]
        }
        "#;

        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.id, "rule-001");
        assert!(rule.enabled);
        assert_eq!(rule.priority, 10);
        assert_eq!(rule.conditions.operator, LogicalOperator::And);
        assert_eq!(rule.conditions.conditions.len(), 2);
        assert!(matches!(
            &rule.conditions.conditions[1],
            ConditionNode::Group(g) if g.operator == LogicalOperator::Or
        ));
        assert_eq!(
            rule.actions[0],
            Action::Show {
                target: "pregnancyHistory".to_string()
            }
        );
    }

    #[test]
    fn test_flat_condition_list_is_and_group() {
        let json = r#"
        {
            "id": "legacy",
            "name": "legacy flat rule",
            "type": "validation",
            "conditions": [
                {"field": "vitals.temperature", "operator": "greater_than", "value": 38.5},
                {"field": "vitals.heartRate", "operator": "greater_than", "value": 100}
            ],
            "actions": [{"type": "showAlert", "target": "vitals", "message": "possible sepsis"}]
        }
        "#;

        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.rule_type, RuleType::Validation);
        assert_eq!(rule.conditions.operator, LogicalOperator::And);
        assert_eq!(rule.conditions.conditions.len(), 2);
        assert_eq!(
            rule.conditions.fields(),
            vec!["vitals.temperature", "vitals.heartRate"]
        );
    }

    #[test]
    fn test_action_wire_format() {
        let action = Action::Calculate {
            target: "bmi".to_string(),
            formula: "{weight} / ({height} / 100) ^ 2".to_string(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(
            json,
            json!({"type": "calculate", "target": "bmi", "formula": "{weight} / ({height} / 100) ^ 2"})
        );

        let alert: Action =
            serde_json::from_value(json!({"type": "showAlert", "message": "check dose"})).unwrap();
        assert_eq!(alert.action_type(), ActionType::ShowAlert);
        assert_eq!(alert.target(), None);

        let bad = serde_json::from_value::<Action>(json!({"type": "explode", "target": "x"}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_evaluation_context() {
        let ctx = EvaluationContext::from_parts(
            json!({
                "vitals": {"heartRate": 130, "temperature": 37.2},
                "diagnoses": [{"code": "I10"}, {"code": "E11"}]
            }),
            Some(json!({"gender": "male", "age": 54})),
            Some(json!({"department": "cardiology"})),
        );

        assert_eq!(ctx.get_field("vitals.heartRate"), Some(&json!(130)));
        assert_eq!(ctx.get_field("patient.gender"), Some(&json!("male")));
        assert_eq!(ctx.get_field("visit.department"), Some(&json!("cardiology")));
        assert_eq!(ctx.get_field("diagnoses.1.code"), Some(&json!("E11")));
        assert_eq!(ctx.get_field("vitals.spo2"), None);
        assert_eq!(ctx.get_field("patient.gender.x"), None);
    }

    #[test]
    fn test_with_field_leaves_original_untouched() {
        let ctx = EvaluationContext::new(json!({"vitals": {"heartRate": 80}}));
        let updated = ctx
            .with_field("vitals.heartRate", json!(130))
            .with_field("labs.glucose", json!(7.8));

        assert_eq!(ctx.get_field("vitals.heartRate"), Some(&json!(80)));
        assert_eq!(updated.get_field("vitals.heartRate"), Some(&json!(130)));
        assert_eq!(updated.get_field("labs.glucose"), Some(&json!(7.8)));
    }

    #[test]
    fn test_with_field_writes_into_array_elements() {
        let ctx = EvaluationContext::new(json!({
            "diagnoses": [{"code": "I10"}, {"code": "E11"}]
        }));

        let updated = ctx.with_field("diagnoses.0.code", json!("J45"));
        assert_eq!(updated.get_field("diagnoses.0.code"), Some(&json!("J45")));
        assert_eq!(updated.get_field("diagnoses.1.code"), Some(&json!("E11")));
        assert!(updated.get_field("diagnoses").is_some_and(Value::is_array));

        let appended = updated.with_field("diagnoses.2.code", json!("N18"));
        assert_eq!(appended.get_field("diagnoses.2.code"), Some(&json!("N18")));
        assert_eq!(appended.get_field("diagnoses.0.code"), Some(&json!("J45")));

        assert_eq!(ctx.get_field("diagnoses.0.code"), Some(&json!("I10")));
    }

    #[test]
    fn test_derived_state_defaults() {
        let mut state = DerivedState::new();
        assert!(state.is_visible("anything"));
        assert!(state.is_enabled("anything"));
        assert!(!state.is_required("anything"));

        state.entry_mut("allergies").required = true;
        assert!(state.is_required("allergies"));
        assert_eq!(state.len(), 1);

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            json!({"allergies": {"visible": true, "enabled": true, "required": true, "errors": []}})
        );
    }
}
