//! 启动预加载
//!
//! 从 JSON 文件加载表单模板（模板数组）和规则（规则数组）。模板先于规则加载；
//! 单条规则校验失败只记录告警并跳过，文件不可读或格式错误则启动失败。

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use forms_shared::config::SeedConfig;
use forms_shared::observability::metrics as obs_metrics;
use rule_engine::{FormTemplate, Rule, RuleCompiler};
use tracing::{info, warn};

use crate::state::AppState;

/// 预加载结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    pub templates: usize,
    pub rules_loaded: usize,
    pub rules_rejected: usize,
}

/// 按配置预加载模板与规则
pub fn load(config: &SeedConfig, state: &AppState) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    if let Some(path) = &config.templates_path {
        let templates: Vec<FormTemplate> = read_json(path)?;
        summary.templates = templates.len();
        for template in templates {
            state.templates.put(template);
        }
    }

    if let Some(path) = &config.rules_path {
        let rules: Vec<Rule> = read_json(path)?;
        let (loaded, rejected) = state.rules.load_batch(rules, None);
        for (rule_id, err) in &rejected {
            warn!(rule_id = %rule_id, code = err.code(), "预加载规则被拒绝: {}", err);
        }
        summary.rules_loaded = loaded.len();
        summary.rules_rejected = rejected.len();

        // 合并后的规则集必须能通过加载检查，否则每次评估都会失败
        let snapshot = state.rules.snapshot(&rule_engine::RuleFilter::all());
        RuleCompiler::new(state.engine)
            .compile_set(snapshot, None)
            .with_context(|| format!("预加载的规则集无法使用: {}", path.display()))?;
    }

    obs_metrics::set_rules_loaded(state.rules.len());
    info!(
        templates = summary.templates,
        rules_loaded = summary.rules_loaded,
        rules_rejected = summary.rules_rejected,
        "Seed data loaded"
    );
    Ok(summary)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("读取预加载文件失败: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("解析预加载文件失败: {}", path.display()))
}
