use async_trait::async_trait;
use http::HeaderName;

use crate::error::Result;

pub mod client;
pub mod request;
pub mod response;

pub use client::HttpFetcher;
pub use request::{Destination, ProxyRequest, RequestMode};
pub use response::{ProxyResponse, ResponseKind};

/// 网络访问能力
///
/// `Err` 表示无法获得任何响应（DNS、连接失败、超时等），
/// 4xx/5xx 之类的错误状态码仍然是 `Ok` 响应。
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse>;
}

/// 检查给定的头部是否应该在代理中被排除转发。
/// 像 "host"、"connection" 等逐跳头部通常会被排除，以避免冲突或安全问题。
pub fn is_exclude_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "host"
            | "connection"
            | "proxy-authenticate"
            | "upgrade"
            | "proxy-authorization"
            | "keep-alive"
            | "transfer-encoding"
            | "te"
    )
}

/// 将头部从一个 `HeaderMap` 复制到另一个，排除在 `is_exclude_header` 中指定的头部。
pub fn copy_headers(from: &http::HeaderMap, to: &mut http::HeaderMap) {
    for (name, value) in from.iter() {
        if !is_exclude_header(name) {
            to.append(name.clone(), value.clone());
        }
    }
}
