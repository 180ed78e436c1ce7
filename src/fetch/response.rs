use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header::{HeaderName, VARY}};
use serde::{Deserialize, Serialize};

/// 响应类型，对应浏览器 `Response.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// 同源响应
    #[default]
    Basic,
    /// 跨域且以 cors 模式请求
    Cors,
    /// 跨域 no-cors 响应，内容对调用方不可见
    Opaque,
}

/// 完整捕获的响应：状态码、头部和响应体
///
/// `body` 使用 `Bytes`，克隆只增加引用计数，
/// 写入缓存的副本与返回给调用方的原始响应共享同一块内存。
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub kind: ResponseKind,
}

impl ProxyResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            kind: ResponseKind::Basic,
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    /// 只有同源且状态码为 200 的响应会被动态缓存
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK && self.kind == ResponseKind::Basic
    }

    /// `Vary` 头部中列出的请求头名称（小写）
    pub fn vary_headers(&self) -> Vec<String> {
        self.headers
            .get_all(VARY)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect()
    }
}
