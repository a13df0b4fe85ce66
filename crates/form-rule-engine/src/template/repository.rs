//! 模板仓储
//!
//! 规则保存和评估时通过 `TemplateRepository` 查找表单模板，以得到目标目录。
//! `TemplateStore` 是基于 DashMap 的内存实现。

use super::models::FormTemplate;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// 模板仓储接口
#[cfg_attr(test, mockall::automock)]
pub trait TemplateRepository: Send + Sync {
    fn get(&self, id: &str) -> Option<FormTemplate>;
}

/// 内存模板存储
#[derive(Clone, Default)]
pub struct TemplateStore {
    templates: Arc<DashMap<String, FormTemplate>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册或替换模板
    ///
    /// 替换时版本号自增。
    ///
    /// # Returns
    /// 实际保存的模板
    #[instrument(skip(self, template), fields(template_id = %template.id))]
    pub fn put(&self, mut template: FormTemplate) -> FormTemplate {
        template.updated_at = Utc::now();

        if let Some(existing) = self.templates.get(&template.id) {
            template.version = template.version.max(existing.version + 1);
        }

        self.templates.insert(template.id.clone(), template.clone());
        info!(
            "模板已保存: {} (v{}, {} 个字段)",
            template.id,
            template.version,
            template.fields.len()
        );
        template
    }

    /// 删除模板
    #[instrument(skip(self))]
    pub fn remove(&self, id: &str) -> Option<FormTemplate> {
        self.templates.remove(id).map(|(_, t)| t)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateRepository for TemplateStore {
    fn get(&self, id: &str) -> Option<FormTemplate> {
        self.templates.get(id).map(|t| t.clone())
    }
}
