use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{CacheNamespace, CacheStorage, CacheStore, RequestIdentity, StoredEntry};
use crate::{
    error::Result,
    fetch::{ProxyRequest, ProxyResponse},
};

/// 进程内存储，进程退出即丢失
#[derive(Debug, Default)]
pub struct MemoryStorage {
    namespaces: DashMap<CacheNamespace, Arc<MemoryStore>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 以 url 为一级键，同一 url 下按 vary 取值区分多个条目
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<StoredEntry>>,
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn put(&self, identity: RequestIdentity, response: ProxyResponse) -> Result<()> {
        let mut slot = self.entries.entry(identity.url().to_string()).or_default();
        slot.retain(|entry| entry.identity != identity);
        slot.push(StoredEntry { identity, response });
        Ok(())
    }

    async fn lookup(&self, request: &ProxyRequest) -> Result<Option<ProxyResponse>> {
        let url = request.url();
        let Some(slot) = self.entries.get(&url) else {
            return Ok(None);
        };
        let found = slot
            .iter()
            .rev()
            .find(|entry| entry.identity.matches(&url, &request.headers))
            .map(|entry| entry.response.clone());
        Ok(found)
    }

    async fn delete(&self, identity: &RequestIdentity) -> Result<bool> {
        let Some(mut slot) = self.entries.get_mut(identity.url()) else {
            return Ok(false);
        };
        let before = slot.len();
        slot.retain(|entry| entry.identity != *identity);
        let removed = slot.len() != before;
        let empty = slot.is_empty();
        drop(slot);
        if empty {
            self.entries.remove(identity.url());
        }
        Ok(removed)
    }

    async fn keys(&self) -> Result<Vec<RequestIdentity>> {
        let mut keys = self
            .entries
            .iter()
            .flat_map(|slot| {
                slot.value()
                    .iter()
                    .map(|entry| entry.identity.clone())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        keys.sort_by(|a, b| a.url().cmp(b.url()));
        Ok(keys)
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, namespace: &str) -> Result<Arc<dyn CacheStore>> {
        let store: Arc<dyn CacheStore> = self
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .clone();
        Ok(store)
    }

    async fn has(&self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces.contains_key(namespace))
    }

    async fn keys(&self) -> Result<Vec<CacheNamespace>> {
        let mut keys = self
            .namespaces
            .iter()
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces.remove(namespace).is_some())
    }
}
