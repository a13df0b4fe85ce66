//! 规则存储
//!
//! `RuleRepository` 是引擎读取规则的唯一入口，持久化实现由调用方注入。
//! `RuleStore` 是基于 DashMap 的内存实现：保存前完整校验，整条替换，
//! 并记住每条规则第一次写入的顺序（同优先级规则按此顺序决定覆盖关系）。

use crate::compiler::RuleCompiler;
use crate::error::{Result, RuleError};
use crate::models::Rule;
use crate::template::TargetCatalog;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, instrument, warn};

/// 规则查询条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleFilter {
    /// 只返回这些 ID 的规则
    pub ids: Option<Vec<String>>,
    pub category: Option<String>,
    /// 只返回启用的规则
    pub active_only: bool,
}

impl RuleFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    pub fn matches(&self, rule: &Rule) -> bool {
        if self.active_only && !rule.enabled {
            return false;
        }
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == &rule.id) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if rule.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        true
    }
}

/// 规则仓储接口
#[cfg_attr(test, mockall::automock)]
pub trait RuleRepository: Send + Sync {
    fn get(&self, id: &str) -> Option<Rule>;
    /// 按定义顺序返回匹配的规则
    fn list(&self, filter: &RuleFilter) -> Vec<Rule>;
}

#[derive(Debug, Clone)]
struct StoredRule {
    seq: u64,
    rule: Rule,
}

/// 内存规则存储
#[derive(Clone, Default)]
pub struct RuleStore {
    rules: Arc<DashMap<String, StoredRule>>,
    sequence: Arc<AtomicU64>,
    compiler: RuleCompiler,
}

impl RuleStore {
    pub fn new(compiler: RuleCompiler) -> Self {
        Self {
            rules: Arc::new(DashMap::new()),
            sequence: Arc::new(AtomicU64::new(0)),
            compiler,
        }
    }

    pub fn compiler(&self) -> &RuleCompiler {
        &self.compiler
    }

    /// 获取当前存储的规则数量
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 校验并保存规则；同 ID 的规则整条替换，保留创建时间和定义顺序
    #[instrument(skip(self, rule, catalog), fields(rule_id = %rule.id, rule_name = %rule.name))]
    pub fn upsert(&self, mut rule: Rule, catalog: Option<&TargetCatalog>) -> Result<Rule> {
        self.compiler.validate(&rule, catalog)?;
        rule.updated_at = Utc::now();

        match self.rules.entry(rule.id.clone()) {
            Entry::Occupied(mut entry) => {
                rule.created_at = entry.get().rule.created_at;
                let seq = entry.get().seq;
                entry.insert(StoredRule {
                    seq,
                    rule: rule.clone(),
                });
                info!("规则已更新: {}", rule.id);
            }
            Entry::Vacant(entry) => {
                let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
                entry.insert(StoredRule {
                    seq,
                    rule: rule.clone(),
                });
                info!("规则已加载: {}", rule.id);
            }
        }

        Ok(rule)
    }

    /// 从 JSON 字符串加载规则
    #[instrument(skip(self, json, catalog))]
    pub fn load_from_json(&self, json: &str, catalog: Option<&TargetCatalog>) -> Result<String> {
        let rule: Rule = serde_json::from_str(json)?;
        let saved = self.upsert(rule, catalog)?;
        Ok(saved.id)
    }

    /// 批量加载规则，失败的规则被跳过并记录
    #[instrument(skip(self, rules, catalog))]
    pub fn load_batch(
        &self,
        rules: Vec<Rule>,
        catalog: Option<&TargetCatalog>,
    ) -> (Vec<String>, Vec<(String, RuleError)>) {
        let mut loaded_ids = Vec::with_capacity(rules.len());
        let mut errors = Vec::new();

        for rule in rules {
            let rule_id = rule.id.clone();
            match self.upsert(rule, catalog) {
                Ok(_) => loaded_ids.push(rule_id),
                Err(e) => errors.push((rule_id, e)),
            }
        }

        if !errors.is_empty() {
            warn!("批量加载部分失败: {:?}", errors);
        }

        info!("批量加载完成: {} 成功, {} 失败", loaded_ids.len(), errors.len());
        (loaded_ids, errors)
    }

    /// 删除规则
    #[instrument(skip(self))]
    pub fn delete(&self, rule_id: &str) -> Result<Rule> {
        match self.rules.remove(rule_id) {
            Some((_, stored)) => {
                info!("规则已删除: {}", rule_id);
                Ok(stored.rule)
            }
            None => {
                warn!("删除不存在的规则: {}", rule_id);
                Err(RuleError::RuleNotFound(rule_id.to_string()))
            }
        }
    }

    pub fn contains(&self, rule_id: &str) -> bool {
        self.rules.contains_key(rule_id)
    }

    /// 按定义顺序获取规则快照，评估期间不受并发写入影响
    pub fn snapshot(&self, filter: &RuleFilter) -> Arc<[Rule]> {
        let mut selected: Vec<(u64, Rule)> = self
            .rules
            .iter()
            .filter(|entry| filter.matches(&entry.rule))
            .map(|entry| (entry.seq, entry.rule.clone()))
            .collect();
        selected.sort_by_key(|(seq, _)| *seq);

        selected.into_iter().map(|(_, rule)| rule).collect()
    }

    /// 清空所有规则
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.rules.len();
        self.rules.clear();
        info!("已清空 {} 条规则", count);
    }
}

impl RuleRepository for RuleStore {
    fn get(&self, id: &str) -> Option<Rule> {
        self.rules.get(id).map(|entry| entry.rule.clone())
    }

    fn list(&self, filter: &RuleFilter) -> Vec<Rule> {
        self.snapshot(filter).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, Condition, ConditionGroup};
    use crate::operators::Operator;
    use crate::template::{FieldDef, FieldType, FormTemplate};

    fn sample_rule(id: &str, name: &str) -> Rule {
        Rule::new(
            name,
            ConditionGroup::all_of([
                Condition::new("patient.gender", Operator::Equals, "female"),
                Condition::new("patient.age", Operator::GreaterThanOrEqual, 12),
            ]),
            vec![Action::Show {
                target: "pregnancyHistory".to_string(),
            }],
        )
        .with_id(id)
    }

    fn sample_rule_json(id: &str, name: &str) -> String {
        format!(
            r#"
            {{
                "id": "{}",
                "name": "{}",
                "conditions": {{
                    "operator": "AND",
                    "conditions": [
                        {{"field": "patient.gender", "operator": "equals", "value": "female"}}
                    ]
                }},
                "actions": [{{"type": "show", "target": "pregnancyHistory"}}]
            }}
            "#,
            id, name
        )
    }

    #[test]
    fn test_upsert_rule() {
        let store = RuleStore::default();
        store.upsert(sample_rule("rule-001", "test"), None).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.contains("rule-001"));
        assert_eq!(store.get("rule-001").unwrap().name, "test");
    }

    #[test]
    fn test_load_from_json() {
        let store = RuleStore::default();
        let rule_id = store.load_from_json(&sample_rule_json("rule-001", "test"), None).unwrap();

        assert_eq!(rule_id, "rule-001");
        assert!(store.contains("rule-001"));
    }

    #[test]
    fn test_get_nonexistent_rule() {
        let store = RuleStore::default();
        assert!(store.get("nonexistent").is_none());
    }

    #[test]
    fn test_invalid_rule_is_not_saved() {
        let store = RuleStore::default();
        let json = r#"{
            "id": "bad",
            "name": "bad",
            "conditions": [{"field": "a", "operator": "approximately", "value": 1}],
            "actions": []
        }"#;

        let err = store.load_from_json(json, None).unwrap_err();
        assert_eq!(err.code(), "INVALID_OPERATOR");
        assert!(store.is_empty());
    }

    #[test]
    fn test_unknown_target_rejected_against_catalog() {
        let store = RuleStore::default();
        let catalog = FormTemplate::new("t", "t")
            .with_field(FieldDef::new("notes", FieldType::Text))
            .catalog();

        let result = store.upsert(sample_rule("rule-001", "test"), Some(&catalog));
        assert!(matches!(result, Err(RuleError::UnknownTarget(_))));
    }

    #[test]
    fn test_replacement_keeps_definition_order() {
        let store = RuleStore::default();
        store.upsert(sample_rule("a", "first"), None).unwrap();
        store.upsert(sample_rule("b", "second"), None).unwrap();
        let created = store.get("a").unwrap().created_at;

        store.upsert(sample_rule("a", "first v2"), None).unwrap();

        let snapshot = store.snapshot(&RuleFilter::all());
        let names: Vec<&str> = snapshot.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first v2", "second"]);
        assert_eq!(store.get("a").unwrap().created_at, created);
    }

    #[test]
    fn test_delete_rule() {
        let store = RuleStore::default();
        store.upsert(sample_rule("rule-001", "test"), None).unwrap();

        let removed = store.delete("rule-001").unwrap();

        assert_eq!(removed.id, "rule-001");
        assert!(!store.contains("rule-001"));
        assert!(matches!(store.delete("rule-001"), Err(RuleError::RuleNotFound(_))));
    }

    #[test]
    fn test_snapshot_filters() {
        let store = RuleStore::default();
        store.upsert(sample_rule("a", "a").with_category("obstetrics"), None).unwrap();
        store.upsert(sample_rule("b", "b").disabled(), None).unwrap();
        store.upsert(sample_rule("c", "c"), None).unwrap();

        assert_eq!(store.snapshot(&RuleFilter::all()).len(), 3);
        assert_eq!(store.snapshot(&RuleFilter::all().active_only()).len(), 2);
        assert_eq!(store.snapshot(&RuleFilter::all().with_category("obstetrics")).len(), 1);

        let by_id = store.list(&RuleFilter::all().with_ids(vec!["c".into(), "a".into()]));
        let ids: Vec<&str> = by_id.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_load_batch() {
        let store = RuleStore::default();
        let mut broken = sample_rule("rule-003", "broken");
        broken.name = String::new();

        let (loaded, errors) = store.load_batch(
            vec![sample_rule("rule-001", "test1"), sample_rule("rule-002", "test2"), broken],
            None,
        );

        assert_eq!(loaded.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "rule-003");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_clear() {
        let store = RuleStore::default();
        store.upsert(sample_rule("rule-001", "test1"), None).unwrap();
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_mock_repository() {
        let mut repo = MockRuleRepository::new();
        repo.expect_get()
            .withf(|id| id == "rule-001")
            .returning(|id| Some(sample_rule(id, "mocked")));

        assert_eq!(repo.get("rule-001").unwrap().name, "mocked");
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let store = RuleStore::default();
        let store_clone = store.clone();

        let handle = thread::spawn(move || {
            for i in 0..100 {
                store_clone
                    .upsert(sample_rule(&format!("rule-{}", i), &format!("test-{}", i)), None)
                    .unwrap();
            }
        });

        for i in 100..200 {
            store
                .upsert(sample_rule(&format!("rule-{}", i), &format!("test-{}", i)), None)
                .unwrap();
        }

        handle.join().unwrap();

        assert_eq!(store.len(), 200);
    }
}
