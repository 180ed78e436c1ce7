//! 缓存存储
//!
//! 存储按命名空间（缓存版本）划分，每个命名空间内以 [`RequestIdentity`] 为键保存完整响应。
//! 同一键重复写入时后写覆盖先写，不保留历史。

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::{StorageConfig, StorageKind},
    error::Result,
    fetch::{ProxyRequest, ProxyResponse},
};

pub mod disk;
pub mod identity;
pub mod memory;

pub use disk::DiskStorage;
pub use identity::RequestIdentity;
pub use memory::MemoryStorage;

/// 标识一代缓存内容的版本名
pub type CacheNamespace = String;

/// 一条已保存的缓存条目
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub identity: RequestIdentity,
    pub response: ProxyResponse,
}

/// 单个命名空间内的缓存
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 写入一条完整响应，覆盖相同键的旧条目
    async fn put(&self, identity: RequestIdentity, response: ProxyResponse) -> Result<()>;

    /// 查找与请求匹配的条目，方法视为 GET
    async fn lookup(&self, request: &ProxyRequest) -> Result<Option<ProxyResponse>>;

    async fn delete(&self, identity: &RequestIdentity) -> Result<bool>;

    async fn keys(&self) -> Result<Vec<RequestIdentity>>;

    async fn len(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }
}

/// 宿主提供的持久化存储，管理所有命名空间
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// 打开命名空间，不存在时创建
    async fn open(&self, namespace: &str) -> Result<Arc<dyn CacheStore>>;

    async fn has(&self, namespace: &str) -> Result<bool>;

    /// 列出所有命名空间
    async fn keys(&self) -> Result<Vec<CacheNamespace>>;

    /// 删除整个命名空间，不存在时返回 `false`
    async fn delete(&self, namespace: &str) -> Result<bool>;
}

/// 根据配置创建存储后端
pub fn build_storage(config: &StorageConfig) -> Arc<dyn CacheStorage> {
    match config.kind {
        StorageKind::Memory => Arc::new(MemoryStorage::new()),
        StorageKind::Disk => Arc::new(DiskStorage::new(&config.path)),
    }
}
