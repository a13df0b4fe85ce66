//! 表单模板模块
//!
//! - `FormTemplate`: 表单模板，包含字段与分区定义
//! - `TargetCatalog`: 由模板导出的动作目标目录（ID、字段类型、精度、默认值）
//! - `TemplateRepository`: 模板查找接口及内存实现 `TemplateStore`

pub mod models;
pub mod repository;

pub use models::*;
pub use repository::{TemplateRepository, TemplateStore};
