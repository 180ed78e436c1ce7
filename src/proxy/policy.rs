use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::CachingProxy;
use crate::{
    cache::{CacheStore, RequestIdentity},
    error::{Error, Result},
    fetch::{ProxyRequest, ProxyResponse},
};

/// 一次拦截的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// 不拦截，由宿主原样发往网络
    PassThrough,
    /// 缓存命中，未访问网络
    Cache(ProxyResponse),
    /// 缓存未命中，来自网络
    Network(ProxyResponse),
    /// 网络失败后返回的兜底缓存
    Fallback(ProxyResponse),
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&ProxyResponse> {
        match self {
            FetchOutcome::PassThrough => None,
            FetchOutcome::Cache(res) | FetchOutcome::Network(res) | FetchOutcome::Fallback(res) => {
                Some(res)
            }
        }
    }

    pub fn into_response(self) -> Option<ProxyResponse> {
        match self {
            FetchOutcome::PassThrough => None,
            FetchOutcome::Cache(res) | FetchOutcome::Network(res) | FetchOutcome::Fallback(res) => {
                Some(res)
            }
        }
    }

    /// 用于日志和响应头的来源标记
    pub fn source(&self) -> &'static str {
        match self {
            FetchOutcome::PassThrough => "pass-through",
            FetchOutcome::Cache(_) => "cache",
            FetchOutcome::Network(_) => "network",
            FetchOutcome::Fallback(_) => "fallback",
        }
    }
}

impl CachingProxy {
    /// 缓存优先，网络兜底，网络失败时按请求类型返回兜底缓存
    ///
    /// 1. 非 GET 或非 http(s) 请求直接放行，不读也不写缓存
    /// 2. 命中缓存直接返回
    /// 3. 未命中则请求网络，同源 200 响应在后台写入缓存
    /// 4. 网络失败时导航请求返回根文档，图片请求返回占位图，其他请求返回错误
    pub async fn handle_fetch(&self, request: &ProxyRequest) -> Result<FetchOutcome> {
        if !request.is_read() {
            debug!("Skip non-GET request: {} {}", request.method, request.uri);
            return Ok(FetchOutcome::PassThrough);
        }
        if !request.is_http() {
            debug!("Skip non-http request: {}", request.uri);
            return Ok(FetchOutcome::PassThrough);
        }
        let Some(store) = self.store().filter(|_| self.state().is_serving()) else {
            debug!(
                "[{}] Not serving in state {:?}, pass through {}",
                self.namespace(),
                self.state(),
                request.uri
            );
            return Ok(FetchOutcome::PassThrough);
        };
        let store = store.clone();

        match store.lookup(request).await {
            Ok(Some(cached)) => {
                info!("Serving from cache: {}", request.uri);
                return Ok(FetchOutcome::Cache(cached));
            }
            Ok(None) => {}
            Err(err) => warn!("Cache lookup failed for {}: {}", request.uri, err),
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.cache_in_background(store, request, &response);
                }
                Ok(FetchOutcome::Network(response))
            }
            Err(err) => {
                error!("Fetch failed: {}", err);
                self.fallback(&store, request).await
            }
        }
    }

    /// 复制一份响应在后台写入，写入失败只记录日志
    fn cache_in_background(
        &self,
        store: Arc<dyn CacheStore>,
        request: &ProxyRequest,
        response: &ProxyResponse,
    ) {
        let identity = RequestIdentity::for_response(request, response);
        let copy = response.clone();
        self.wait_until(async move {
            let url = identity.url().to_string();
            match store.put(identity, copy).await {
                Ok(()) => info!("Caching new resource: {}", url),
                Err(err) => warn!("Failed to cache {}: {}", url, err),
            }
        });
    }

    async fn fallback(
        &self,
        store: &Arc<dyn CacheStore>,
        request: &ProxyRequest,
    ) -> Result<FetchOutcome> {
        let path = if request.is_navigation() {
            &self.config().root_document
        } else if request.is_image() {
            &self.config().image_placeholder
        } else {
            return Err(Error::Offline(request.url()));
        };

        let fallback_req = ProxyRequest::get(self.config().resolve(path)?);
        match store.lookup(&fallback_req).await? {
            Some(response) => {
                info!("Returning cached {} for offline {}", path, request.uri);
                Ok(FetchOutcome::Fallback(response))
            }
            None => Err(Error::Offline(request.url())),
        }
    }
}
