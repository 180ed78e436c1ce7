use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::fetch::{ProxyRequest, ProxyResponse};

/// 缓存的查找键：请求地址加上响应 `Vary` 所列请求头的取值
///
/// 方法总是视为 GET，因此不参与键的构成。
/// `vary` 按头部名称排序，保证相同取值产生相同的键。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestIdentity {
    url: String,
    vary: Vec<(String, String)>,
}

const VARY_ANY: &str = "*";

/// 不参与区分条目的 `Vary` 头部
///
/// 存储的响应体都已解码，内容编码与请求无关。
const IGNORED_VARY: [&str; 1] = ["accept-encoding"];

fn is_ignored_vary(name: &str) -> bool {
    IGNORED_VARY.iter().any(|ignored| name.eq_ignore_ascii_case(ignored))
}

impl RequestIdentity {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            vary: Vec::new(),
        }
    }

    /// 按响应的 `Vary` 头部从请求中提取对应的请求头取值
    pub fn for_response(request: &ProxyRequest, response: &ProxyResponse) -> Self {
        let mut vary = response
            .vary_headers()
            .into_iter()
            .filter(|name| !is_ignored_vary(name))
            .map(|name| {
                let value = header_value(&request.headers, &name);
                (name, value)
            })
            .collect::<Vec<_>>();
        vary.sort();
        vary.dedup();
        Self {
            url: request.url(),
            vary,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn vary(&self) -> &[(String, String)] {
        &self.vary
    }

    /// 判断一个请求是否命中该键
    ///
    /// `Vary: *` 永远不命中。
    pub fn matches(&self, url: &str, headers: &HeaderMap) -> bool {
        if self.url != url {
            return false;
        }
        self.vary.iter().all(|(name, value)| {
            name != VARY_ANY && (is_ignored_vary(name) || header_value(headers, name) == *value)
        })
    }

    /// 与 url 无关的 vary 部分，用作同一地址下不同条目的区分
    pub fn vary_key(&self) -> String {
        self.vary
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(", ")
}
