//! 表单模板数据模型
//!
//! 模板描述表单有哪些字段和分区；规则引擎只关心其中的 ID、字段类型和精度，
//! 由 [`TargetCatalog`] 统一提供。

use crate::models::FORM_SCOPE;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

/// 字段类型
///
/// 决定了前端输入组件，以及 `clearValue` 动作把字段重置成什么值
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    /// 单行文本
    Text,
    /// 多行文本
    Textarea,
    /// 数值
    Number,
    /// 布尔开关
    Boolean,
    /// 日期
    Date,
    /// 单选下拉
    Select,
    /// 多选
    MultiSelect,
    /// 复选框
    Checkbox,
}

impl FieldType {
    /// 清空字段时写入的默认值
    pub fn empty_value(&self) -> Value {
        match self {
            Self::Text | Self::Textarea | Self::Date | Self::Select => json!(""),
            Self::Number => Value::Null,
            Self::Boolean | Self::Checkbox => json!(false),
            Self::MultiSelect => json!([]),
        }
    }
}

/// 字段定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// 字段 ID，规则条件与动作都通过它引用字段
    pub id: String,
    /// 显示标签
    #[serde(default)]
    pub label: String,
    pub field_type: FieldType,
    /// 数值字段的小数位数，`calculate` 结果按此四舍五入
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    /// 初始值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// 所属分区 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl FieldDef {
    pub fn new(id: impl Into<String>, field_type: FieldType) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            field_type,
            precision: None,
            default_value: None,
            section: None,
        }
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

/// 分区定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectionDef {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

impl SectionDef {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// 表单模板
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormTemplate {
    pub id: String,
    /// 业务编码，如 "ADMISSION_ASSESSMENT"
    #[serde(default)]
    pub code: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub sections: Vec<SectionDef>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl FormTemplate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            code: id.to_uppercase(),
            id,
            name: name.into(),
            version: 1,
            fields: Vec::new(),
            sections: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_section(mut self, section: SectionDef) -> Self {
        self.sections.push(section);
        self
    }

    pub fn field(&self, id: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// 构建目标目录
    pub fn catalog(&self) -> TargetCatalog {
        TargetCatalog::from_template(self)
    }
}

/// 目标条目
#[derive(Debug, Clone, PartialEq)]
pub enum TargetKind {
    Field {
        field_type: FieldType,
        precision: Option<u32>,
        default_value: Option<Value>,
    },
    Section,
}

/// 目标目录：动作可以作用的全部字段/分区 ID
///
/// 表单级条目 `_form` 永远存在，用于承载没有指定目标的提示信息。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetCatalog {
    targets: HashMap<String, TargetKind>,
    /// 模板中的声明顺序
    order: Vec<String>,
}

impl TargetCatalog {
    pub fn from_template(template: &FormTemplate) -> Self {
        let mut catalog = Self::default();

        for section in &template.sections {
            catalog.insert(section.id.clone(), TargetKind::Section);
        }
        for field in &template.fields {
            catalog.insert(
                field.id.clone(),
                TargetKind::Field {
                    field_type: field.field_type,
                    precision: field.precision,
                    default_value: field.default_value.clone(),
                },
            );
        }

        catalog
    }

    fn insert(&mut self, id: String, kind: TargetKind) {
        if self.targets.insert(id.clone(), kind).is_none() {
            self.order.push(id);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        id == FORM_SCOPE || self.targets.contains_key(id)
    }

    pub fn kind(&self, id: &str) -> Option<&TargetKind> {
        self.targets.get(id)
    }

    pub fn field_type(&self, id: &str) -> Option<FieldType> {
        match self.targets.get(id) {
            Some(TargetKind::Field { field_type, .. }) => Some(*field_type),
            _ => None,
        }
    }

    pub fn precision(&self, id: &str) -> Option<u32> {
        match self.targets.get(id) {
            Some(TargetKind::Field { precision, .. }) => *precision,
            _ => None,
        }
    }

    pub fn default_value(&self, id: &str) -> Option<&Value> {
        match self.targets.get(id) {
            Some(TargetKind::Field { default_value, .. }) => default_value.as_ref(),
            _ => None,
        }
    }

    /// `clearValue` 的重置值；类型未知时为 null
    pub fn empty_value_for(&self, id: &str) -> Value {
        self.field_type(id)
            .map(|t| t.empty_value())
            .unwrap_or(Value::Null)
    }

    /// 按模板声明顺序遍历目标 ID（分区在前，字段在后）
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
