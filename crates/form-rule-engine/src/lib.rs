//! 表单规则引擎
//!
//! 根据表单数据、患者与就诊属性评估条件规则，推导字段/分区的可见、启用、必填状态，
//! 计算字段取值并产生临床决策提示。评估是纯函数：同样的规则和上下文永远得到同样的结果。
//!
//! - JSON 规则定义（嵌套 AND/OR 条件树，兼容扁平条件列表）
//! - 保存时校验，加载时检查规模与循环依赖
//! - 短路求值、嵌套深度保护、可选的评估追踪
//! - 可观察的派生状态存储（表单渲染端）

pub mod actions;
pub mod compiler;
pub mod cycle;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod formula;
pub mod models;
pub mod operators;
pub mod state;
pub mod store;
pub mod template;
pub mod warnings;

use std::sync::Arc;

pub use actions::ActionApplier;
pub use compiler::{CompiledRuleSet, EngineConfig, RuleCompiler};
pub use cycle::{CycleGuard, DependencyGraph};
pub use error::{Result, RuleError};
pub use evaluator::{ConditionEvaluator, Diagnostics};
pub use executor::RuleSetEvaluator;
pub use formula::Formula;
pub use models::{
    Action, ActionType, Condition, ConditionGroup, ConditionNode, DerivedState,
    EvaluationContext, EvaluationOutcome, FORM_SCOPE, MatchedRule, Rule, RuleType, TargetState,
};
pub use operators::{LogicalOperator, Operator, OperatorRef, OperatorRegistry};
pub use state::{DerivedStateStore, StateSnapshot};
pub use store::{RuleFilter, RuleRepository, RuleStore};
pub use template::{FormTemplate, TargetCatalog, TemplateRepository, TemplateStore};
pub use warnings::Warning;

/// 一次性评估规则集
///
/// 只有加载期的致命问题（规则数超限、循环依赖）会返回错误；
/// 评估期的问题都以告警形式出现在结果中。
pub fn evaluate(
    rules: impl Into<Arc<[Rule]>>,
    context: &EvaluationContext,
    config: &EngineConfig,
) -> Result<EvaluationOutcome> {
    evaluate_with_catalog(rules, None, context, config)
}

/// 在表单模板的目标目录下评估规则集
pub fn evaluate_with_catalog(
    rules: impl Into<Arc<[Rule]>>,
    catalog: Option<Arc<TargetCatalog>>,
    context: &EvaluationContext,
    config: &EngineConfig,
) -> Result<EvaluationOutcome> {
    let rule_set = RuleCompiler::new(*config).compile_set(rules, catalog)?;
    Ok(RuleSetEvaluator::new(config).evaluate(&rule_set, context))
}
