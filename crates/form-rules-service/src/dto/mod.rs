//! 数据传输对象
//!
//! 请求体/查询参数与响应体，JSON 字段统一 camelCase。

pub mod request;
pub mod response;

pub use request::*;
pub use response::*;
