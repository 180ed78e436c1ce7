//! Meow 离线缓存代理
//!
//! 在浏览器与应用源站之间缓存静态资源和动态请求，源站不可用时提供离线访问。
//! 导出公共 API 和类型，供集成测试和外部 crate 使用。

pub mod application;
pub mod cache;
pub mod cli;
pub mod config;
pub mod consts;
pub mod error;
pub mod fetch;
pub mod http;
pub mod middlewares;
pub mod proxy;
pub mod utils;
