//! 规则服务逻辑
//!
//! handler 只负责 HTTP 编解码，评估、保存前检查和校验都在这里完成。
//! 所有函数只依赖仓储 trait，便于注入不同实现。

use std::sync::Arc;

use rule_engine::{
    EngineConfig, EvaluationOutcome, Rule, RuleCompiler, RuleFilter, RuleRepository,
    RuleSetEvaluator, TargetCatalog, TemplateRepository,
};
use tracing::{debug, instrument};

use crate::dto::{EvaluateRequest, ValidationReport};
use crate::error::{Result, ServiceError};

/// 按模板 ID 取目标目录；未指定模板时返回 None
pub fn resolve_catalog(
    templates: &dyn TemplateRepository,
    template_id: Option<&str>,
) -> Result<Option<Arc<TargetCatalog>>> {
    match template_id {
        None => Ok(None),
        Some(id) => templates
            .get(id)
            .map(|template| Some(Arc::new(template.catalog())))
            .ok_or_else(|| ServiceError::TemplateNotFound(id.to_string())),
    }
}

/// 评估一次请求
///
/// 规则按存储顺序取快照，加载期的致命错误（循环依赖、规则数超限）直接返回，
/// 其余问题以告警形式出现在结果中。
#[instrument(skip_all, fields(rule_ids = ?request.rule_ids, template_id = ?request.template_id))]
pub fn evaluate(
    rules: &dyn RuleRepository,
    templates: &dyn TemplateRepository,
    engine: &EngineConfig,
    request: &EvaluateRequest,
) -> Result<EvaluationOutcome> {
    let catalog = resolve_catalog(templates, request.template_id.as_deref())?;
    let snapshot: Arc<[Rule]> = rules.list(&request.filter()).into();

    let config = EngineConfig {
        trace: engine.trace || request.trace,
        ..*engine
    };
    let rule_set = RuleCompiler::new(config).compile_set(snapshot, catalog)?;
    let outcome = RuleSetEvaluator::new(&config).evaluate(&rule_set, &request.context());

    debug!(
        rules = rule_set.len(),
        matched = outcome.matched_rules.len(),
        warnings = outcome.warnings.len(),
        "评估请求完成"
    );
    Ok(outcome)
}

/// 保存前检查：单条规则校验，再把候选规则放进现有规则集检查规模与循环依赖
///
/// 同 ID 的现有规则被候选规则替换，位置不变。
pub fn check_before_save(
    rules: &dyn RuleRepository,
    candidate: &Rule,
    catalog: Option<&TargetCatalog>,
    engine: &EngineConfig,
) -> Result<()> {
    let compiler = RuleCompiler::new(*engine);
    compiler.validate(candidate, catalog)?;

    let mut combined = rules.list(&RuleFilter::all());
    match combined.iter_mut().find(|rule| rule.id == candidate.id) {
        Some(existing) => *existing = candidate.clone(),
        None => combined.push(candidate.clone()),
    }

    compiler.compile_set(combined, None)?;
    Ok(())
}

/// 校验规则但不保存
pub fn validate(
    rules: &dyn RuleRepository,
    templates: &dyn TemplateRepository,
    engine: &EngineConfig,
    rule: &Rule,
    template_id: Option<&str>,
) -> Result<ValidationReport> {
    let catalog = resolve_catalog(templates, template_id)?;
    let referenced_fields = rule
        .conditions
        .fields()
        .into_iter()
        .map(str::to_string)
        .collect();

    let report = match check_before_save(rules, rule, catalog.as_deref(), engine) {
        Ok(()) => ValidationReport {
            valid: true,
            code: None,
            message: None,
            referenced_fields,
        },
        Err(ServiceError::Rule(err)) => ValidationReport {
            valid: false,
            code: Some(err.code().to_string()),
            message: Some(err.to_string()),
            referenced_fields,
        },
        Err(other) => return Err(other),
    };

    Ok(report)
}
