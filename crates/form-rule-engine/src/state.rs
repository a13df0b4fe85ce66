//! 派生状态存储
//!
//! 表单渲染端持有的可观察状态：每次表单数据或规则集变化都同步地从零重新评估，
//! 新快照通过 `ArcSwap` 整体替换，读取端只会看到旧快照或新快照，不会看到中间状态。

use crate::compiler::CompiledRuleSet;
use crate::executor::RuleSetEvaluator;
use crate::models::{EvaluationContext, EvaluationOutcome, TargetState};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// 某一时刻的完整状态
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    /// 单调递增的版本号
    pub revision: u64,
    pub context: EvaluationContext,
    pub outcome: EvaluationOutcome,
}

/// 派生状态存储
#[derive(Clone)]
pub struct DerivedStateStore {
    current: Arc<ArcSwap<StateSnapshot>>,
    rule_set: Arc<ArcSwap<CompiledRuleSet>>,
    evaluator: RuleSetEvaluator,
    /// 串行化写入，保证版本号与写入顺序一致
    write_lock: Arc<Mutex<()>>,
}

impl DerivedStateStore {
    /// 用规则集和初始上下文创建，立即完成第一次评估
    pub fn new(rule_set: CompiledRuleSet, evaluator: RuleSetEvaluator, context: EvaluationContext) -> Self {
        let outcome = evaluator.evaluate(&rule_set, &context);
        let snapshot = StateSnapshot {
            revision: 0,
            context,
            outcome,
        };

        Self {
            current: Arc::new(ArcSwap::from_pointee(snapshot)),
            rule_set: Arc::new(ArcSwap::from_pointee(rule_set)),
            evaluator,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// 当前快照（一次原子 load）
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        self.current.load_full()
    }

    pub fn revision(&self) -> u64 {
        self.current.load().revision
    }

    /// 读取某个目标的派生状态
    pub fn field(&self, target: &str) -> TargetState {
        self.current.load().outcome.derived_state.state_of(target)
    }

    pub fn rule_set(&self) -> Arc<CompiledRuleSet> {
        self.rule_set.load_full()
    }

    /// 替换整个表单上下文
    pub fn set_context(&self, context: EvaluationContext) -> Arc<StateSnapshot> {
        let _guard = self.write_lock.lock();
        self.recompute(context, &self.rule_set.load())
    }

    /// 写入单个字段（表单编辑触发）
    pub fn set_field(&self, path: &str, value: Value) -> Arc<StateSnapshot> {
        let _guard = self.write_lock.lock();
        let context = self.current.load().context.with_field(path, value);
        self.recompute(context, &self.rule_set.load())
    }

    /// 替换规则集（规则保存后触发）
    pub fn replace_rules(&self, rule_set: CompiledRuleSet) -> Arc<StateSnapshot> {
        let _guard = self.write_lock.lock();
        let rule_set = Arc::new(rule_set);
        self.rule_set.store(rule_set.clone());
        let context = self.current.load().context.clone();
        self.recompute(context, &rule_set)
    }

    fn recompute(&self, context: EvaluationContext, rule_set: &CompiledRuleSet) -> Arc<StateSnapshot> {
        let outcome = self.evaluator.evaluate(rule_set, &context);
        let revision = self.current.load().revision + 1;
        let snapshot = Arc::new(StateSnapshot {
            revision,
            context,
            outcome,
        });

        self.current.store(snapshot.clone());
        debug!(revision, "派生状态已更新");
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::RuleCompiler;
    use crate::models::{Action, Condition, ConditionGroup, Rule};
    use crate::operators::Operator;
    use serde_json::json;

    fn tachycardia_rules() -> CompiledRuleSet {
        let rule = Rule::new(
            "tachycardia",
            ConditionGroup::all_of([Condition::new("vitals.heartRate", Operator::GreaterThan, 120)]),
            vec![Action::ShowAlert {
                target: Some("vitals".into()),
                message: "心率过快".into(),
            }],
        );
        RuleCompiler::default().compile_set(vec![rule], None).unwrap()
    }

    #[test]
    fn test_set_field_recomputes() {
        let store = DerivedStateStore::new(
            tachycardia_rules(),
            RuleSetEvaluator::default(),
            EvaluationContext::new(json!({"vitals": {"heartRate": 80}})),
        );
        assert!(store.field("vitals").errors.is_empty());
        let before = store.snapshot();

        let after = store.set_field("vitals.heartRate", json!(130));

        assert_eq!(after.revision, 1);
        assert_eq!(store.field("vitals").errors, vec!["心率过快".to_string()]);
        // 旧快照不受影响
        assert!(before.outcome.derived_state.errors("vitals").is_empty());

        store.set_field("vitals.heartRate", json!(90));
        assert!(store.field("vitals").errors.is_empty());
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn test_every_write_matches_fresh_evaluation() {
        let store = DerivedStateStore::new(
            tachycardia_rules(),
            RuleSetEvaluator::default(),
            EvaluationContext::new(json!({"vitals": {"heartRate": 130}})),
        );

        for (path, value) in [
            ("notes", json!("夜间入院")),
            ("vitals", json!({"heartRate": 70})),
            ("vitals.heartRate", json!(140)),
        ] {
            let snapshot = store.set_field(path, value);
            let fresh = RuleSetEvaluator::default().evaluate(&store.rule_set(), &snapshot.context);
            assert_eq!(snapshot.outcome.matched_rules.len(), fresh.matched_rules.len());
            assert_eq!(snapshot.outcome.derived_state, fresh.derived_state);
        }
        assert_eq!(store.revision(), 3);
    }

    #[test]
    fn test_replace_rules() {
        let empty = RuleCompiler::default().compile_set(Vec::new(), None).unwrap();
        let store = DerivedStateStore::new(
            empty,
            RuleSetEvaluator::default(),
            EvaluationContext::new(json!({"vitals": {"heartRate": 150}})),
        );
        assert!(store.snapshot().outcome.matched_rules.is_empty());

        let snapshot = store.replace_rules(tachycardia_rules());
        assert_eq!(snapshot.outcome.matched_rules.len(), 1);
        assert_eq!(store.rule_set().len(), 1);
    }

    #[test]
    fn test_concurrent_writers_produce_monotonic_revisions() {
        use std::thread;

        let store = DerivedStateStore::new(
            tachycardia_rules(),
            RuleSetEvaluator::default(),
            EvaluationContext::default(),
        );

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        store.set_field("vitals.heartRate", json!(100 + t * 25 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.revision(), 100);
    }
}
