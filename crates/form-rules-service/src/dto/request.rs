//! 请求 DTO 定义

use std::collections::HashSet;

use rule_engine::template::{FieldDef, SectionDef};
use rule_engine::{
    Action, ConditionGroup, EvaluationContext, FormTemplate, Rule, RuleFilter, RuleType,
};
use serde::Deserialize;
use serde_json::Value;
use validator::{Validate, ValidationError};

/// 规则评估请求
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    #[serde(default)]
    pub form_data: Value,
    /// 只评估指定规则，缺省时评估全部已存储规则
    pub rule_ids: Option<Vec<String>>,
    pub patient: Option<Value>,
    pub visit: Option<Value>,
    /// 指定后按模板目录校验动作目标并提供字段精度与默认值
    pub template_id: Option<String>,
    /// 在结果中附带评估追踪
    #[serde(default)]
    pub trace: bool,
}

impl EvaluateRequest {
    /// 组装评估上下文
    pub fn context(&self) -> EvaluationContext {
        EvaluationContext::from_parts(
            self.form_data.clone(),
            self.patient.clone(),
            self.visit.clone(),
        )
    }

    /// 参与评估的规则范围
    pub fn filter(&self) -> RuleFilter {
        match &self.rule_ids {
            Some(ids) => RuleFilter::all().with_ids(ids.clone()),
            None => RuleFilter::all(),
        }
    }
}

/// 创建/更新规则请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertRuleRequest {
    /// 创建时可指定 ID，缺省自动生成；更新时以路径中的 ID 为准
    #[validate(length(min = 1, max = 100, message = "规则 ID 长度必须在1-100个字符之间"))]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 200, message = "规则名称长度必须在1-200个字符之间"))]
    pub name: String,
    pub description: Option<String>,
    #[serde(default, alias = "type")]
    pub rule_type: RuleType,
    #[validate(length(min = 1, max = 50, message = "规则分类长度必须在1-50个字符之间"))]
    pub category: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub conditions: ConditionGroup,
    #[validate(length(max = 100, message = "单条规则最多 100 个动作"))]
    #[serde(default)]
    pub actions: Vec<Action>,
}

fn default_enabled() -> bool {
    true
}

impl UpsertRuleRequest {
    /// 转换为规则定义；`path_id` 优先于请求体中的 ID
    pub fn into_rule(self, path_id: Option<String>) -> Rule {
        let mut rule = Rule::new(self.name, self.conditions, self.actions).with_priority(self.priority);
        if let Some(id) = path_id.or(self.id) {
            rule = rule.with_id(id);
        }
        rule.description = self.description;
        rule.rule_type = self.rule_type;
        rule.category = self.category;
        rule.enabled = self.enabled;
        rule
    }
}

/// 规则列表查询参数
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleQuery {
    pub category: Option<String>,
    #[serde(default)]
    pub active_only: bool,
}

impl RuleQuery {
    pub fn filter(&self) -> RuleFilter {
        let mut filter = RuleFilter::all();
        if let Some(category) = &self.category {
            filter = filter.with_category(category.clone());
        }
        if self.active_only {
            filter = filter.active_only();
        }
        filter
    }
}

/// 指定模板的查询参数（保存/校验规则时用于检查动作目标）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateQuery {
    pub template_id: Option<String>,
}

/// 注册表单模板请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertTemplateRequest {
    #[serde(default)]
    pub code: String,
    #[validate(length(min = 1, max = 100, message = "模板名称长度必须在1-100个字符之间"))]
    pub name: String,
    #[validate(custom(function = "unique_field_ids"))]
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[validate(custom(function = "unique_section_ids"))]
    #[serde(default)]
    pub sections: Vec<SectionDef>,
}

impl UpsertTemplateRequest {
    pub fn into_template(self, id: String) -> FormTemplate {
        let mut template = FormTemplate::new(id, self.name);
        template.code = self.code;
        template.fields = self.fields;
        template.sections = self.sections;
        template
    }
}

fn unique_field_ids(fields: &[FieldDef]) -> Result<(), ValidationError> {
    unique_ids(fields.iter().map(|f| f.id.as_str()), "duplicate_field_id")
}

fn unique_section_ids(sections: &[SectionDef]) -> Result<(), ValidationError> {
    unique_ids(sections.iter().map(|s| s.id.as_str()), "duplicate_section_id")
}

fn unique_ids<'a>(ids: impl Iterator<Item = &'a str>, code: &'static str) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(ValidationError::new("empty_id").with_message("ID 不能为空".into()));
        }
        if !seen.insert(id) {
            return Err(ValidationError::new(code).with_message(format!("ID 重复: {}", id).into()));
        }
    }
    Ok(())
}
