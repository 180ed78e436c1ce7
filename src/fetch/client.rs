use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, Uri};
use reqwest::Client;
use tracing::debug;

use super::{Fetcher, ProxyRequest, ProxyResponse, RequestMode, ResponseKind, copy_headers};
use crate::error::{Error, Result};

/// 基于 reqwest 的网络访问实现
///
/// 复用同一个 `Client` 以共享连接池。`origin` 用于判断响应是否同源。
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    origin: Uri,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(origin: Uri, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Any(anyhow::anyhow!("failed to initialize reqwest client: {e}")))?;
        Ok(Self {
            client,
            origin,
            timeout,
        })
    }

    pub fn origin(&self) -> &Uri {
        &self.origin
    }
}

/// 根据请求来源判断响应类型
pub fn classify_response(request: &ProxyRequest, origin: &Uri) -> ResponseKind {
    if request.is_same_origin(origin) {
        ResponseKind::Basic
    } else if request.mode == RequestMode::Cors {
        ResponseKind::Cors
    } else {
        ResponseKind::Opaque
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse> {
        let url = request.url();
        let network_err = |e: reqwest::Error| Error::Network {
            url: url.clone(),
            reason: e.to_string(),
        };

        let mut forward_req = self
            .client
            .request(request.method.clone(), url.as_str())
            .timeout(self.timeout);
        let mut headers = HeaderMap::new();
        copy_headers(&request.headers, &mut headers);
        forward_req = forward_req.headers(headers);
        if !request.body.is_empty() {
            forward_req = forward_req.body(request.body.clone());
        }

        let res = forward_req.send().await.map_err(network_err)?;
        let status = res.status();
        let mut headers = HeaderMap::new();
        copy_headers(res.headers(), &mut headers);
        let body = res.bytes().await.map_err(network_err)?;
        debug!("fetched {} {} {}", request.method, url, status);

        Ok(ProxyResponse {
            status,
            headers,
            body,
            kind: classify_response(request, &self.origin),
        })
    }
}
