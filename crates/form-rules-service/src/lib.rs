//! 表单规则服务
//!
//! 以 REST API 暴露表单规则引擎：规则的保存与校验、表单模板注册、
//! 服务端一次性评估（`/api/rules/evaluate`）。
//!
//! ## 模块结构
//!
//! - `dto`: 请求和响应的数据传输对象
//! - `error`: 错误类型定义
//! - `service`: 评估与保存前检查，只依赖仓储 trait
//! - `handlers`: HTTP 请求处理器
//! - `routes`: 路由配置
//! - `seed`: 启动时从 JSON 文件预加载规则与模板
//! - `state`: 应用状态

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod seed;
pub mod service;
pub mod state;

pub use dto::{ApiResponse, EvaluateRequest, MatchedRuleResult, UpsertRuleRequest, ValidationReport};
pub use error::{Result, ServiceError};
pub use state::AppState;
