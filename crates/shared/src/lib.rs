//! 共享库
//!
//! 表单服务共用的配置加载与可观测性（日志、Prometheus 指标、HTTP 中间件）基础设施。

pub mod config;
pub mod observability;
