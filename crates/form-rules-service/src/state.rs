//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use forms_shared::config::RuleEngineConfig;
use parking_lot::Mutex;
use rule_engine::{EngineConfig, Rule, RuleCompiler, RuleStore, TargetCatalog, TemplateStore};
use std::sync::Arc;

use crate::error::{Result, ServiceError};
use crate::service;

/// Axum 应用共享状态
///
/// 规则与模板存储通过 Arc 在 handler 间共享，由启动代码注入。
/// 规则写入经由 `save_lock` 串行化，保存前检查与写入之间不会插入其他写入。
#[derive(Clone)]
pub struct AppState {
    pub rules: Arc<RuleStore>,
    pub templates: Arc<TemplateStore>,
    pub engine: EngineConfig,
    save_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// 创建空存储的应用状态
    pub fn new(engine: EngineConfig) -> Self {
        Self::with_stores(
            Arc::new(RuleStore::new(RuleCompiler::new(engine))),
            Arc::new(TemplateStore::new()),
            engine,
        )
    }

    /// 注入已有存储
    pub fn with_stores(rules: Arc<RuleStore>, templates: Arc<TemplateStore>, engine: EngineConfig) -> Self {
        Self {
            rules,
            templates,
            engine,
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    /// 检查并保存规则
    ///
    /// 与现有规则合并后的检查和写入在同一把锁内完成，
    /// 并发保存不会让存储中的规则集成环或超限。
    pub fn save_rule(&self, rule: Rule, catalog: Option<&TargetCatalog>) -> Result<Rule> {
        let _guard = self.save_lock.lock();
        service::check_before_save(&*self.rules, &rule, catalog, &self.engine)?;
        self.rules.upsert(rule, catalog).map_err(ServiceError::from)
    }

    /// 删除规则
    pub fn delete_rule(&self, id: &str) -> Result<Rule> {
        let _guard = self.save_lock.lock();
        self.rules.delete(id).map_err(ServiceError::from)
    }

    /// 从配置文件中的引擎配置创建
    pub fn from_config(config: &RuleEngineConfig) -> Self {
        Self::new(EngineConfig {
            max_depth: config.max_depth,
            max_rules: config.max_rules,
            trace: config.trace,
        })
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rule_engine::{Action, ConditionGroup, RuleFilter, RuleRepository};
    use std::sync::Barrier;
    use std::thread;

    fn calculate(id: &str, target: &str, formula: &str) -> Rule {
        Rule::new(
            id,
            ConditionGroup::default(),
            vec![Action::Calculate {
                target: target.into(),
                formula: formula.into(),
            }],
        )
        .with_id(id)
    }

    #[test]
    fn test_concurrent_saves_never_store_a_cycle() {
        for _ in 0..50 {
            let state = AppState::default();
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = [
                calculate("a", "a_value", "{b_value} + 1"),
                calculate("b", "b_value", "{a_value} * 2"),
            ]
            .into_iter()
            .map(|rule| {
                let state = state.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    state.save_rule(rule, None).is_ok()
                })
            })
            .collect();

            let saved = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count();

            assert_eq!(saved, 1);
            assert_eq!(state.rules.len(), 1);
            let stored = state.rules.list(&RuleFilter::all());
            assert!(RuleCompiler::default().compile_set(stored, None).is_ok());
        }
    }

    #[test]
    fn test_delete_rule_missing() {
        let state = AppState::default();
        let err = state.delete_rule("ghost").unwrap_err();
        assert_eq!(err.error_code(), "RULE_NOT_FOUND");
    }

    #[test]
    fn test_from_config_maps_limits() {
        let state = AppState::from_config(&RuleEngineConfig {
            max_depth: 8,
            max_rules: 50,
            trace: true,
        });
        assert_eq!(state.engine.max_depth, 8);
        assert_eq!(state.engine.max_rules, 50);
        assert!(state.engine.trace);
        assert_eq!(state.rules.compiler().config().max_rules, 50);
        assert!(state.rules.is_empty());
    }
}
