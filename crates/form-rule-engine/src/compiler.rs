//! 规则编译器
//!
//! 保存规则时做完整校验（字段、操作符、取值形态、嵌套深度、公式语法、动作目标），
//! 加载规则集时检查规模上限和循环依赖，产出只读的 [`CompiledRuleSet`]。

use crate::cycle::CycleGuard;
use crate::error::{Result, RuleError};
use crate::evaluator::{DEFAULT_MAX_DEPTH, to_number, type_name};
use crate::formula::Formula;
use crate::models::{Action, Condition, ConditionGroup, ConditionNode, Rule};
use crate::operators::{OperatorRef, ValueKind};
use crate::template::TargetCatalog;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// 默认规则集规模上限
pub const DEFAULT_MAX_RULES: usize = 500;

/// 引擎限制与开关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 条件树最大嵌套深度
    pub max_depth: usize,
    /// 单个规则集最多包含的规则数
    pub max_rules: usize,
    /// 是否记录评估追踪
    pub trace: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_rules: DEFAULT_MAX_RULES,
            trace: false,
        }
    }
}

/// 已通过加载检查的规则集
///
/// 只能通过 [`RuleCompiler::compile_set`] 构造，因此持有它就意味着规模合法且不存在循环依赖。
#[derive(Debug, Clone)]
pub struct CompiledRuleSet {
    rules: Arc<[Rule]>,
    catalog: Option<Arc<TargetCatalog>>,
    /// 启用规则的应用顺序：优先级升序，同优先级按定义顺序
    order: Vec<usize>,
    /// 条件与公式中引用的全部字段
    referenced_fields: BTreeSet<String>,
}

impl CompiledRuleSet {
    pub fn rules(&self) -> &Arc<[Rule]> {
        &self.rules
    }

    pub fn catalog(&self) -> Option<&TargetCatalog> {
        self.catalog.as_deref()
    }

    /// 按应用顺序遍历启用的规则（后应用者覆盖先应用者）
    pub fn application_order(&self) -> impl Iterator<Item = (usize, &Rule)> {
        self.order.iter().map(|&i| (i, &self.rules[i]))
    }

    pub fn referenced_fields(&self) -> &BTreeSet<String> {
        &self.referenced_fields
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// 规则编译器
#[derive(Debug, Clone, Default)]
pub struct RuleCompiler {
    config: EngineConfig,
}

impl RuleCompiler {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 从 JSON 字符串解析并校验规则
    pub fn compile_from_json(&self, json: &str, catalog: Option<&TargetCatalog>) -> Result<Rule> {
        let rule: Rule = serde_json::from_str(json)?;
        self.validate(&rule, catalog)?;
        Ok(rule)
    }

    /// 校验单条规则（保存时调用）
    pub fn validate(&self, rule: &Rule, catalog: Option<&TargetCatalog>) -> Result<()> {
        if rule.id.trim().is_empty() {
            return Err(RuleError::ParseError("规则 ID 不能为空".to_string()));
        }

        if rule.name.trim().is_empty() {
            return Err(RuleError::ParseError("规则名称不能为空".to_string()));
        }

        self.validate_group(&rule.conditions, "conditions", 1)?;

        for (i, action) in rule.actions.iter().enumerate() {
            self.validate_action(action, &format!("actions[{}]", i), catalog)?;
        }

        Ok(())
    }

    /// 校验规则集并生成 [`CompiledRuleSet`]
    ///
    /// 单条规则的条件问题不在此处拒绝，评估时按告警处理；这里只检查规模和循环依赖。
    pub fn compile_set(
        &self,
        rules: impl Into<Arc<[Rule]>>,
        catalog: Option<Arc<TargetCatalog>>,
    ) -> Result<CompiledRuleSet> {
        let rules: Arc<[Rule]> = rules.into();

        if rules.len() > self.config.max_rules {
            return Err(RuleError::LimitExceeded {
                what: "规则数",
                max: self.config.max_rules,
                actual: rules.len(),
            });
        }

        CycleGuard::check(&rules)?;

        let mut order: Vec<usize> = (0..rules.len()).filter(|&i| rules[i].enabled).collect();
        order.sort_by_key(|&i| (rules[i].priority, i));

        let mut referenced_fields = BTreeSet::new();
        for rule in rules.iter() {
            referenced_fields.extend(rule.conditions.fields().into_iter().map(str::to_string));
            for action in &rule.actions {
                if let Action::Calculate { formula, .. } = action {
                    if let Ok(parsed) = Formula::parse(formula) {
                        referenced_fields.extend(parsed.references());
                    }
                }
            }
        }

        Ok(CompiledRuleSet {
            rules,
            catalog,
            order,
            referenced_fields,
        })
    }

    fn validate_group(&self, group: &ConditionGroup, path: &str, depth: usize) -> Result<()> {
        if depth > self.config.max_depth {
            return Err(RuleError::LimitExceeded {
                what: "条件嵌套深度",
                max: self.config.max_depth,
                actual: depth,
            });
        }

        for (i, child) in group.conditions.iter().enumerate() {
            let child_path = format!("{}.conditions[{}]", path, i);
            match child {
                ConditionNode::Condition(cond) => self.validate_condition(cond, &child_path)?,
                ConditionNode::Group(inner) => self.validate_group(inner, &child_path, depth + 1)?,
            }
        }

        Ok(())
    }

    fn validate_condition(&self, cond: &Condition, path: &str) -> Result<()> {
        if cond.field.trim().is_empty() {
            return Err(RuleError::MalformedCondition {
                path: path.to_string(),
                reason: "字段不能为空".to_string(),
            });
        }

        let operator = match &cond.operator {
            OperatorRef::Known(op) => *op,
            OperatorRef::Unknown(raw) => {
                return Err(RuleError::InvalidOperator {
                    operator: raw.clone(),
                    path: path.to_string(),
                });
            }
        };

        let spec = operator.spec();
        let invalid = |reason: String| RuleError::InvalidValue {
            operator: operator.to_string(),
            reason: format!("{}: {}", path, reason),
        };

        if spec.requires_value && cond.value.is_null() {
            return Err(invalid("缺少取值".to_string()));
        }

        match spec.value_kind {
            ValueKind::None => {}
            ValueKind::Scalar => {
                if cond.value.is_array() || cond.value.is_object() {
                    return Err(invalid(format!("需要标量值，实际为 {}", type_name(&cond.value))));
                }
            }
            ValueKind::Numeric => {
                if to_number(Some(&cond.value)).is_none() {
                    return Err(invalid(format!("需要数值，实际为 {}", cond.value)));
                }
            }
            ValueKind::List => {
                if !cond.value.is_array() {
                    return Err(invalid(format!("需要数组，实际为 {}", type_name(&cond.value))));
                }
            }
            ValueKind::Range => {
                let bounds: Option<Vec<f64>> = cond
                    .value
                    .as_array()
                    .filter(|arr| arr.len() == 2)
                    .and_then(|arr| arr.iter().map(|v| to_number(Some(v))).collect());
                match bounds.as_deref() {
                    Some([min, max]) if min <= max => {}
                    Some(_) => return Err(invalid("区间下限大于上限".to_string())),
                    None => return Err(invalid("需要 [min, max] 数值数组".to_string())),
                }
            }
            ValueKind::Pattern => {
                let Value::String(pattern) = &cond.value else {
                    return Err(invalid(format!("需要正则字符串，实际为 {}", type_name(&cond.value))));
                };
                regex::Regex::new(pattern)
                    .map_err(|e| invalid(format!("正则表达式无效: {}", e)))?;
            }
        }

        Ok(())
    }

    fn validate_action(
        &self,
        action: &Action,
        path: &str,
        catalog: Option<&TargetCatalog>,
    ) -> Result<()> {
        if let Some(target) = action.target() {
            if target.trim().is_empty() {
                return Err(RuleError::ParseError(format!("{}: 动作目标不能为空", path)));
            }
            if let Some(catalog) = catalog {
                if !catalog.contains(target) {
                    return Err(RuleError::UnknownTarget(target.to_string()));
                }
            }
        }

        match action {
            Action::Calculate { target, formula } => {
                Formula::parse(formula)
                    .map_err(|e| RuleError::Formula(format!("{} ({}): {}", path, target, e)))?;
            }
            Action::ShowAlert { message, .. } | Action::ShowWarning { message, .. } => {
                if message.trim().is_empty() {
                    return Err(RuleError::ParseError(format!("{}: 提示信息不能为空", path)));
                }
            }
            _ => {}
        }

        Ok(())
    }
}
