//! 规则集评估
//!
//! 每次评估都从默认状态重新开始：过滤启用规则、按优先级排序、逐条评估条件、
//! 对命中的规则依次应用动作。高优先级规则最后应用，因此覆盖低优先级规则；
//! 同优先级时后定义的规则覆盖先定义的。

use crate::actions::ActionApplier;
use crate::compiler::{CompiledRuleSet, EngineConfig};
use crate::evaluator::{ConditionEvaluator, Diagnostics};
use crate::models::{Action, DerivedState, EvaluationContext, EvaluationOutcome, MatchedRule};
use std::cmp::Reverse;
use std::time::Instant;
use tracing::debug;

/// 规则集评估器
#[derive(Debug, Clone)]
pub struct RuleSetEvaluator {
    evaluator: ConditionEvaluator,
}

impl RuleSetEvaluator {
    pub fn new(config: &EngineConfig) -> Self {
        let mut evaluator = ConditionEvaluator::new().with_max_depth(config.max_depth);
        if config.trace {
            evaluator = evaluator.with_trace();
        }
        Self { evaluator }
    }

    /// 评估整个规则集
    pub fn evaluate(&self, rule_set: &CompiledRuleSet, context: &EvaluationContext) -> EvaluationOutcome {
        let start = Instant::now();
        let applier = ActionApplier::new(rule_set.catalog());

        let mut state = Self::initial_state(rule_set);
        let mut diagnostics = Diagnostics::default();
        let mut matched: Vec<(usize, MatchedRule)> = Vec::new();

        for (index, rule) in rule_set.application_order() {
            if !self
                .evaluator
                .evaluate_group(&rule.conditions, context, &rule.id, &mut diagnostics)
            {
                continue;
            }

            debug!(rule_id = %rule.id, priority = rule.priority, "规则命中");

            for action in &rule.actions {
                state = applier.apply(action, context, state, &rule.id, &mut diagnostics.warnings);
            }

            matched.push((
                index,
                MatchedRule {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    rule_type: rule.rule_type,
                    priority: rule.priority,
                    actions: rule.actions.clone(),
                },
            ));
        }

        // 对外按优先级从高到低报告，同优先级保持定义顺序
        matched.sort_by_key(|(index, m)| (Reverse(m.priority), *index));

        let elapsed = start.elapsed();
        metrics::counter!("rule_evaluations_total").increment(1);
        metrics::histogram!("rule_evaluation_duration_seconds").record(elapsed.as_secs_f64());
        for warning in &diagnostics.warnings {
            metrics::counter!("rule_warnings_total", "kind" => warning.kind()).increment(1);
        }

        debug!(
            rules = rule_set.len(),
            matched = matched.len(),
            warnings = diagnostics.warnings.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "规则集评估完成"
        );

        EvaluationOutcome {
            derived_state: state,
            warnings: diagnostics.warnings,
            matched_rules: matched.into_iter().map(|(_, m)| m).collect(),
            trace: diagnostics.trace,
        }
    }

    /// 构建默认状态
    ///
    /// 目录中的字段和分区都可见、可编辑、非必填，取值为模板默认值；
    /// 被某条启用规则 `show` 的目标默认隐藏，被 `enable` 的目标默认禁用，
    /// 即规则条件就是它们的显示/启用条件。
    fn initial_state(rule_set: &CompiledRuleSet) -> DerivedState {
        let mut state = DerivedState::new();
        let catalog = rule_set.catalog();

        if let Some(catalog) = catalog {
            for id in catalog.ids() {
                let entry = state.entry_mut(id);
                entry.value = catalog.default_value(id).cloned();
            }
        }

        for (_, rule) in rule_set.application_order() {
            for action in &rule.actions {
                let (target, reveal) = match action {
                    Action::Show { target } => (target, true),
                    Action::Enable { target } => (target, false),
                    _ => continue,
                };
                if catalog.is_some_and(|c| !c.contains(target)) {
                    continue;
                }

                let entry = state.entry_mut(target);
                if reveal {
                    entry.visible = false;
                } else {
                    entry.enabled = false;
                }
            }
        }

        state
    }
}

impl Default for RuleSetEvaluator {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}
