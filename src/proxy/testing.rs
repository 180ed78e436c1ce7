//! 单元测试用的网络模拟

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use dashmap::DashMap;
use http::{StatusCode, Uri};
use parking_lot::Mutex;

use super::ProxyConfig;
use crate::{
    cache::{CacheNamespace, CacheStorage, CacheStore, MemoryStorage, RequestIdentity},
    error::{Error, Result},
    fetch::{Fetcher, ProxyRequest, ProxyResponse},
};

pub const ORIGIN: &str = "http://cats.example";

pub fn url(path: &str) -> Uri {
    format!("{ORIGIN}{path}").parse().unwrap()
}

pub fn config(namespace: &str, assets: &[&str]) -> ProxyConfig {
    ProxyConfig::new(namespace, Uri::from_static(ORIGIN)).with_static_assets(assets.iter().copied())
}

/// 按 url 返回预设响应，可切换为离线
#[derive(Default)]
pub struct MockFetcher {
    routes: DashMap<String, ProxyResponse>,
    offline: AtomicBool,
    requests: Mutex<Vec<ProxyRequest>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, path: &str, response: ProxyResponse) -> Self {
        self.routes.insert(url(path).to_string(), response);
        self
    }

    pub fn with_body(self, path: &str, body: &'static str) -> Self {
        self.with(path, ProxyResponse::ok(body))
    }

    pub fn set(&self, path: &str, response: ProxyResponse) {
        self.routes.insert(url(path).to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<ProxyRequest> {
        self.requests.lock().clone()
    }

    pub fn reset_calls(&self) {
        self.requests.lock().clear();
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse> {
        self.requests.lock().push(request.clone());
        let url = request.url();
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network {
                url,
                reason: "offline".into(),
            });
        }
        Ok(self
            .routes
            .get(&url)
            .map(|res| res.clone())
            .unwrap_or_else(|| ProxyResponse::new(StatusCode::NOT_FOUND, "Not Found")))
    }
}

#[derive(Default)]
struct Faults {
    put: AtomicBool,
    delete: AtomicBool,
}

/// 内存存储，可按需让写入或删除命名空间失败
pub struct FlakyStorage {
    inner: MemoryStorage,
    faults: Arc<Faults>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self {
            inner: MemoryStorage::new(),
            faults: Arc::default(),
        }
    }

    pub fn fail_puts(&self, fail: bool) {
        self.faults.put.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.faults.delete.store(fail, Ordering::SeqCst);
    }
}

struct FlakyStore {
    inner: Arc<dyn CacheStore>,
    faults: Arc<Faults>,
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn put(&self, identity: RequestIdentity, response: ProxyResponse) -> Result<()> {
        if self.faults.put.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("quota exceeded: {}", identity.url())));
        }
        self.inner.put(identity, response).await
    }

    async fn lookup(&self, request: &ProxyRequest) -> Result<Option<ProxyResponse>> {
        self.inner.lookup(request).await
    }

    async fn delete(&self, identity: &RequestIdentity) -> Result<bool> {
        self.inner.delete(identity).await
    }

    async fn keys(&self) -> Result<Vec<RequestIdentity>> {
        self.inner.keys().await
    }
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    async fn open(&self, namespace: &str) -> Result<Arc<dyn CacheStore>> {
        Ok(Arc::new(FlakyStore {
            inner: self.inner.open(namespace).await?,
            faults: self.faults.clone(),
        }))
    }

    async fn has(&self, namespace: &str) -> Result<bool> {
        self.inner.has(namespace).await
    }

    async fn keys(&self) -> Result<Vec<CacheNamespace>> {
        self.inner.keys().await
    }

    async fn delete(&self, namespace: &str) -> Result<bool> {
        if self.faults.delete.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("{namespace} is locked")));
        }
        self.inner.delete(namespace).await
    }
}
