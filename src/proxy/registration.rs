use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    CachingProxy, ClientHost, FetchOutcome, Message, Notification, NotificationAction,
    ProxyConfig, ProxyState, PushPayload,
};
use crate::{
    cache::{CacheNamespace, CacheStorage},
    config::NotificationConfig,
    error::Result,
    fetch::{Fetcher, ProxyRequest},
};

/// 连接到代理的客户端（页面）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(u64);

impl From<u64> for ClientId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// 代理注册表
///
/// 管理等待中和正在服务的版本，所有版本共享同一个 `CacheStorage`。
/// 同一时刻至多一个 Active 版本，请求只会交给它处理。
pub struct Registration {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<dyn ClientHost>,
    notification: NotificationConfig,
    active: RwLock<Option<Arc<CachingProxy>>>,
    waiting: RwLock<Option<Arc<CachingProxy>>>,
    /// 客户端及其当前控制者的命名空间
    clients: DashMap<ClientId, Option<CacheNamespace>>,
    next_client: AtomicU64,
    /// 串行化安装与激活
    lifecycle: Mutex<()>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionStatus {
    pub namespace: CacheNamespace,
    pub state: ProxyState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationStatus {
    pub active: Option<VersionStatus>,
    pub waiting: Option<VersionStatus>,
    pub namespaces: Vec<CacheNamespace>,
    pub clients: usize,
}

fn version_status(proxy: &Option<Arc<CachingProxy>>) -> Option<VersionStatus> {
    proxy.as_ref().map(|p| VersionStatus {
        namespace: p.namespace().to_string(),
        state: p.state(),
    })
}

impl Registration {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        host: Arc<dyn ClientHost>,
        notification: NotificationConfig,
    ) -> Self {
        Self {
            storage,
            fetcher,
            host,
            notification,
            active: RwLock::new(None),
            waiting: RwLock::new(None),
            clients: DashMap::new(),
            next_client: AtomicU64::new(1),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn active(&self) -> Option<Arc<CachingProxy>> {
        self.active.read().clone()
    }

    pub fn waiting(&self) -> Option<Arc<CachingProxy>> {
        self.waiting.read().clone()
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    /// 注册一个新版本
    ///
    /// 没有活动版本且存储中已有完整的同名命名空间时直接恢复，否则重新安装。
    /// 安装失败时旧版本继续服务。安装成功后若配置了跳过等待，
    /// 或旧版本没有客户端，则立即激活。
    pub async fn register(&self, config: ProxyConfig) -> Result<ProxyState> {
        let _guard = self.lifecycle.lock().await;

        if let Some(active) = self.active()
            && active.namespace() == config.namespace
        {
            debug!("[{}] Already active", config.namespace);
            return Ok(ProxyState::Active);
        }
        if let Some(waiting) = self.waiting()
            && waiting.namespace() == config.namespace
        {
            debug!("[{}] Already waiting", config.namespace);
            return Ok(ProxyState::Waiting);
        }

        let skip_waiting = config.skip_waiting_on_install;
        let proxy = Arc::new(CachingProxy::new(
            config,
            self.storage.clone(),
            self.fetcher.clone(),
        ));
        let restored = self.active().is_none() && proxy.restore().await?;
        if !restored {
            proxy.install().await?;
        }

        let replaced = self.waiting.write().replace(proxy.clone());
        if let Some(replaced) = replaced {
            replaced.supersede()?;
        }

        if skip_waiting || !self.has_active_clients() {
            self.activate_waiting().await?;
        } else {
            info!(
                "[{}] Installed, waiting for {} clients to leave",
                proxy.namespace(),
                self.clients.len()
            );
        }
        Ok(proxy.state())
    }

    /// 激活等待中的版本并接管所有客户端，调用方必须持有 `lifecycle` 锁
    async fn activate_waiting(&self) -> Result<()> {
        let Some(proxy) = self.waiting() else {
            debug!("No waiting version to activate");
            return Ok(());
        };
        proxy.activate().await?;
        self.waiting.write().take();

        let previous = self.active.write().replace(proxy.clone());
        if let Some(previous) = previous {
            previous.supersede()?;
            previous.settle().await;
        }

        let namespace = proxy.namespace().to_string();
        for mut client in self.clients.iter_mut() {
            *client.value_mut() = Some(namespace.clone());
        }
        info!(
            "[{}] Claimed {} clients",
            namespace,
            self.clients.len()
        );
        Ok(())
    }

    /// 跳过等待，立即激活
    pub async fn skip_waiting(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.activate_waiting().await
    }

    pub async fn post_message(&self, message: Message) -> Result<()> {
        match message {
            Message::SkipWaiting => {
                info!("Received SKIP_WAITING");
                self.skip_waiting().await
            }
            Message::Unknown => {
                warn!("Ignore unknown message");
                Ok(())
            }
        }
    }

    fn has_active_clients(&self) -> bool {
        let Some(active) = self.active() else {
            return false;
        };
        self.clients
            .iter()
            .any(|client| client.value().as_deref() == Some(active.namespace()))
    }

    /// 新客户端由当前活动版本控制
    pub fn connect_client(&self) -> ClientId {
        let id = ClientId(self.next_client.fetch_add(1, Ordering::Relaxed));
        let controller = self.active().map(|p| p.namespace().to_string());
        debug!("Client {:?} connected, controller {:?}", id, controller);
        self.clients.insert(id, controller);
        id
    }

    /// 客户端断开，旧版本没有客户端时激活等待中的版本
    ///
    /// 未知的客户端返回 `false`。
    pub async fn disconnect_client(&self, id: ClientId) -> Result<bool> {
        let _guard = self.lifecycle.lock().await;
        if self.clients.remove(&id).is_none() {
            return Ok(false);
        }
        debug!("Client {:?} disconnected", id);
        if self.waiting().is_some() && !self.has_active_clients() {
            self.activate_waiting().await?;
        }
        Ok(true)
    }

    pub fn controller(&self, id: ClientId) -> Option<CacheNamespace> {
        self.clients.get(&id).and_then(|c| c.value().clone())
    }

    /// 交给活动版本处理，没有活动版本时放行
    pub async fn handle_fetch(&self, request: &ProxyRequest) -> Result<FetchOutcome> {
        match self.active() {
            Some(proxy) => proxy.handle_fetch(request).await,
            None => Ok(FetchOutcome::PassThrough),
        }
    }

    /// 处理推送，没有内容的推送不展示通知
    pub async fn push(&self, payload: Option<PushPayload>) -> Result<Option<Notification>> {
        let Some(payload) = payload else {
            debug!("Push without payload");
            return Ok(None);
        };
        info!("Push received: {:?}", payload);
        let notification = Notification::from_push(&payload, &self.notification);
        self.host.show_notification(&notification).await?;
        Ok(Some(notification))
    }

    /// 通知点击：`view` 打开应用首页，其余动作只关闭通知
    pub async fn notification_click(&self, action: Option<&str>) -> Result<NotificationAction> {
        info!("Notification clicked: {:?}", action);
        let action = NotificationAction::parse(action);
        if action == NotificationAction::View {
            self.host.open_window(&self.notification.open_url).await?;
        }
        Ok(action)
    }

    pub fn sync(&self, tag: &str) {
        info!("Background sync triggered: {}", tag);
    }

    pub async fn status(&self) -> Result<RegistrationStatus> {
        let namespaces = self.storage.keys().await?;
        Ok(RegistrationStatus {
            active: version_status(&self.active()),
            waiting: version_status(&self.waiting()),
            namespaces,
            clients: self.clients.len(),
        })
    }

    /// 等待活动版本的后台写入完成
    pub async fn settle(&self) {
        if let Some(active) = self.active() {
            active.settle().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::MemoryStorage,
        proxy::testing::{MockFetcher, config, url},
    };
    use async_trait::async_trait;

    /// 记录宿主收到的调用
    #[derive(Default)]
    struct RecordingHost {
        shown: parking_lot::Mutex<Vec<Notification>>,
        opened: parking_lot::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ClientHost for RecordingHost {
        async fn show_notification(&self, notification: &Notification) -> Result<()> {
            self.shown.lock().push(notification.clone());
            Ok(())
        }

        async fn open_window(&self, url: &str) -> Result<()> {
            self.opened.lock().push(url.to_string());
            Ok(())
        }
    }

    struct Fixture {
        registration: Registration,
        fetcher: Arc<MockFetcher>,
        storage: Arc<MemoryStorage>,
        host: Arc<RecordingHost>,
    }

    fn fixture() -> Fixture {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_body("/", "<html>root</html>")
                .with_body("/index.html", "<html>index</html>")
                .with_body("/style.css", "body{}"),
        );
        let storage = Arc::new(MemoryStorage::new());
        let host = Arc::new(RecordingHost::default());
        let registration = Registration::new(
            storage.clone(),
            fetcher.clone(),
            host.clone(),
            NotificationConfig::default(),
        );
        Fixture {
            registration,
            fetcher,
            storage,
            host,
        }
    }

    const ASSETS: &[&str] = &["/", "/index.html", "/style.css"];

    #[tokio::test]
    async fn test_first_register_activates() {
        let f = fixture();
        let state = f.registration.register(config("v1", ASSETS)).await.unwrap();

        assert_eq!(state, ProxyState::Active);
        assert!(f.registration.waiting().is_none());
        let active = f.registration.active().unwrap();
        assert_eq!(active.namespace(), "v1");
    }

    #[tokio::test]
    async fn test_register_same_version_is_noop() {
        let f = fixture();
        f.registration.register(config("v1", ASSETS)).await.unwrap();
        f.fetcher.reset_calls();

        let state = f.registration.register(config("v1", ASSETS)).await.unwrap();
        assert_eq!(state, ProxyState::Active);
        assert_eq!(f.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_upgrade_leaves_one_namespace() {
        let f = fixture();
        f.registration.register(config("v1", ASSETS)).await.unwrap();
        let old = f.registration.active().unwrap();

        f.registration.register(config("v2", ASSETS)).await.unwrap();

        assert_eq!(old.state(), ProxyState::Superseded);
        assert_eq!(f.registration.active().unwrap().namespace(), "v2");
        assert_eq!(f.storage.keys().await.unwrap(), vec!["v2"]);
    }

    #[tokio::test]
    async fn test_failed_upgrade_keeps_old_version() {
        let f = fixture();
        f.registration.register(config("v1", ASSETS)).await.unwrap();

        let err = f
            .registration
            .register(config("v2", &["/", "/missing.js"]))
            .await;
        assert!(err.is_err());

        let active = f.registration.active().unwrap();
        assert_eq!(active.namespace(), "v1");
        assert_eq!(active.state(), ProxyState::Active);
        assert!(f.registration.waiting().is_none());
        assert_eq!(f.storage.keys().await.unwrap(), vec!["v1"]);
    }

    #[tokio::test]
    async fn test_new_version_waits_for_clients() {
        let f = fixture();
        f.registration.register(config("v1", ASSETS)).await.unwrap();
        let client = f.registration.connect_client();
        assert_eq!(f.registration.controller(client).as_deref(), Some("v1"));

        let state = f
            .registration
            .register(config("v2", ASSETS).with_skip_waiting(false))
            .await
            .unwrap();
        assert_eq!(state, ProxyState::Waiting);
        assert_eq!(f.registration.active().unwrap().namespace(), "v1");
        assert_eq!(f.registration.waiting().unwrap().namespace(), "v2");

        assert!(f.registration.disconnect_client(client).await.unwrap());
        assert_eq!(f.registration.active().unwrap().namespace(), "v2");
        assert!(!f.registration.disconnect_client(client).await.unwrap());
        assert!(f.registration.waiting().is_none());
    }

    #[tokio::test]
    async fn test_skip_waiting_message_claims_clients() {
        let f = fixture();
        f.registration.register(config("v1", ASSETS)).await.unwrap();
        let client = f.registration.connect_client();
        f.registration
            .register(config("v2", ASSETS).with_skip_waiting(false))
            .await
            .unwrap();

        f.registration
            .post_message(Message::SkipWaiting)
            .await
            .unwrap();

        assert_eq!(f.registration.active().unwrap().namespace(), "v2");
        assert_eq!(f.registration.controller(client).as_deref(), Some("v2"));
        assert_eq!(f.storage.keys().await.unwrap(), vec!["v2"]);
    }

    #[tokio::test]
    async fn test_unknown_message_is_ignored() {
        let f = fixture();
        f.registration.register(config("v1", ASSETS)).await.unwrap();
        f.registration.post_message(Message::Unknown).await.unwrap();
        assert_eq!(f.registration.active().unwrap().namespace(), "v1");
    }

    #[tokio::test]
    async fn test_restore_skips_network() {
        let f = fixture();
        f.registration.register(config("v1", ASSETS)).await.unwrap();
        f.fetcher.reset_calls();

        let restarted = Registration::new(
            f.storage.clone(),
            f.fetcher.clone(),
            f.host.clone(),
            NotificationConfig::default(),
        );
        let state = restarted.register(config("v1", ASSETS)).await.unwrap();

        assert_eq!(state, ProxyState::Active);
        assert_eq!(f.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_without_active_passes_through() {
        let f = fixture();
        let outcome = f
            .registration
            .handle_fetch(&ProxyRequest::get(url("/style.css")))
            .await
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::PassThrough));
    }

    #[tokio::test]
    async fn test_push_shows_notification() {
        let f = fixture();
        let shown = f
            .registration
            .push(Some(PushPayload {
                title: Some("New meme".into()),
                body: None,
            }))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(shown.title, "New meme");
        assert_eq!(shown.body, "New cat meme available!");
        assert_eq!(f.host.shown.lock().len(), 1);

        assert!(f.registration.push(None).await.unwrap().is_none());
        assert_eq!(f.host.shown.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_notification_click() {
        let f = fixture();
        let action = f.registration.notification_click(Some("view")).await.unwrap();
        assert_eq!(action, NotificationAction::View);
        assert_eq!(*f.host.opened.lock(), vec!["/".to_string()]);

        let action = f
            .registration
            .notification_click(Some("close"))
            .await
            .unwrap();
        assert_eq!(action, NotificationAction::Close);
        f.registration.notification_click(None).await.unwrap();
        assert_eq!(f.host.opened.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_status() {
        let f = fixture();
        f.registration.register(config("v1", ASSETS)).await.unwrap();
        f.registration.connect_client();

        let status = f.registration.status().await.unwrap();
        assert_eq!(
            status.active,
            Some(VersionStatus {
                namespace: "v1".into(),
                state: ProxyState::Active,
            })
        );
        assert!(status.waiting.is_none());
        assert_eq!(status.namespaces, vec!["v1"]);
        assert_eq!(status.clients, 1);
    }
}
