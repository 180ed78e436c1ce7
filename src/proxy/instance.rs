use std::{future::Future, sync::Arc};

use futures::future::try_join_all;
use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::{LifecycleEvent, ProxyConfig, ProxyState};
use crate::{
    cache::{CacheStorage, CacheStore, RequestIdentity},
    error::{Error, Result},
    fetch::{Fetcher, ProxyRequest, ProxyResponse},
};

/// 单个版本的缓存代理
///
/// 持有该版本的命名空间。安装成功前不会处理任何请求，
/// 后台缓存写入通过 [`CachingProxy::wait_until`] 登记，
/// 在 [`CachingProxy::settle`] 返回前全部完成。
pub struct CachingProxy {
    config: ProxyConfig,
    pub(super) storage: Arc<dyn CacheStorage>,
    pub(super) fetcher: Arc<dyn Fetcher>,
    state: RwLock<ProxyState>,
    store: OnceCell<Arc<dyn CacheStore>>,
    tasks: TaskTracker,
}

impl std::fmt::Debug for CachingProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingProxy")
            .field("namespace", &self.config.namespace)
            .field("state", &self.state())
            .finish()
    }
}

impl CachingProxy {
    pub fn new(
        config: ProxyConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
            state: RwLock::new(ProxyState::Installing),
            store: OnceCell::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn state(&self) -> ProxyState {
        *self.state.read()
    }

    /// 安装或恢复完成后可用的缓存
    pub(super) fn store(&self) -> Option<&Arc<dyn CacheStore>> {
        self.store.get()
    }

    fn transition(&self, event: LifecycleEvent) -> Result<ProxyState> {
        let mut state = self.state.write();
        let next = state.next(event)?;
        debug!(
            "[{}] lifecycle {:?} -> {:?} ({:?})",
            self.config.namespace, *state, next, event
        );
        *state = next;
        Ok(next)
    }

    /// 安装：一次性拉取全部静态资源并写入新的命名空间
    ///
    /// 任一资源失败则整个安装失败，实例被丢弃，命名空间中不留下任何条目。
    pub async fn install(&self) -> Result<()> {
        if self.state() != ProxyState::Installing {
            return Err(Error::InvalidTransition {
                from: self.state(),
                event: LifecycleEvent::Installed,
            });
        }
        info!("[{}] Installing...", self.config.namespace);

        match self.populate().await {
            Ok(store) => {
                let _ = self.store.set(store);
                self.transition(LifecycleEvent::Installed)?;
                info!(
                    "[{}] Static assets cached successfully ({} assets)",
                    self.config.namespace,
                    self.config.static_assets.len()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "[{}] Failed to cache static assets: {}",
                    self.config.namespace, err
                );
                self.transition(LifecycleEvent::InstallFailed)?;
                Err(err)
            }
        }
    }

    /// 先拉取全部资源，全部成功后才清空并打开命名空间写入
    async fn populate(&self) -> Result<Arc<dyn CacheStore>> {
        let requests = self.config.static_asset_requests()?;
        let responses = try_join_all(requests.iter().map(|req| self.fetch_asset(req))).await?;

        let namespace = &self.config.namespace;
        // 恢复失败留下的旧命名空间可能含有多余条目
        if self.storage.delete(namespace).await? {
            debug!("[{}] Cleared stale persisted cache", namespace);
        }
        let store = self.storage.open(namespace).await?;
        for (req, res) in requests.iter().zip(responses) {
            let identity = RequestIdentity::for_response(req, &res);
            if let Err(err) = store.put(identity, res).await {
                if let Err(del_err) = self.storage.delete(namespace).await {
                    warn!("[{}] Failed to drop partial cache: {}", namespace, del_err);
                }
                return Err(Error::Population {
                    namespace: namespace.clone(),
                    asset: req.url(),
                    reason: err.to_string(),
                });
            }
        }
        Ok(store)
    }

    async fn fetch_asset(&self, req: &ProxyRequest) -> Result<ProxyResponse> {
        let population_err = |reason: String| Error::Population {
            namespace: self.config.namespace.clone(),
            asset: req.url(),
            reason,
        };
        let res = self
            .fetcher
            .fetch(req)
            .await
            .map_err(|e| population_err(e.to_string()))?;
        if !res.status.is_success() {
            return Err(population_err(format!("status {}", res.status)));
        }
        Ok(res)
    }

    /// 从已持久化的命名空间恢复，跳过网络拉取
    ///
    /// 只有当命名空间中已包含全部静态资源时才算恢复成功。
    pub async fn restore(&self) -> Result<bool> {
        let namespace = &self.config.namespace;
        if self.state() != ProxyState::Installing || !self.storage.has(namespace).await? {
            return Ok(false);
        }
        let store = self.storage.open(namespace).await?;
        for req in self.config.static_asset_requests()? {
            if store.lookup(&req).await?.is_none() {
                debug!("[{}] Persisted cache misses {}", namespace, req.url());
                return Ok(false);
            }
        }
        let _ = self.store.set(store);
        self.transition(LifecycleEvent::Installed)?;
        info!("[{}] Restored from persisted cache", namespace);
        Ok(true)
    }

    /// 激活：进入 Active 后删除其他所有命名空间
    ///
    /// 删除失败只记录日志，留待下次激活时清理。
    pub async fn activate(&self) -> Result<()> {
        info!("[{}] Activating...", self.config.namespace);
        self.transition(LifecycleEvent::Activate)?;
        let deleted = self.cleanup().await;
        info!(
            "[{}] Activated successfully, {} old caches deleted",
            self.config.namespace, deleted
        );
        Ok(())
    }

    async fn cleanup(&self) -> usize {
        let namespaces = match self.storage.keys().await {
            Ok(namespaces) => namespaces,
            Err(err) => {
                warn!("Failed to list caches: {}", err);
                return 0;
            }
        };
        let mut deleted = 0;
        for name in namespaces
            .iter()
            .filter(|name| **name != self.config.namespace)
        {
            info!("Deleting old cache: {}", name);
            match self.storage.delete(name).await {
                Ok(_) => deleted += 1,
                Err(err) => warn!("Failed to delete old cache {}: {}", name, err),
            }
        }
        deleted
    }

    /// 被新版本取代
    pub fn supersede(&self) -> Result<ProxyState> {
        let state = self.transition(LifecycleEvent::Supersede)?;
        info!("[{}] Superseded", self.config.namespace);
        Ok(state)
    }

    /// 登记一个必须完成的后台任务
    pub fn wait_until<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// 等待所有已登记的后台任务完成
    pub async fn settle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}
