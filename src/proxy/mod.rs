//! 离线缓存代理
//!
//! 每个版本对应一个 [`CachingProxy`] 实例和一个缓存命名空间，
//! [`Registration`] 负责在多个版本之间切换。

use http::Uri;

use crate::{
    config::ProxySettings,
    consts::{image_placeholder, root_document, skip_waiting_on_install},
    error::Result,
    fetch::ProxyRequest,
};

pub mod instance;
pub mod lifecycle;
pub mod message;
pub mod notification;
pub mod policy;
pub mod registration;
#[cfg(test)]
pub(crate) mod testing;

pub use instance::CachingProxy;
pub use lifecycle::{LifecycleEvent, ProxyState};
pub use message::Message;
pub use notification::{ClientHost, LoggingHost, Notification, NotificationAction, PushPayload};
pub use policy::FetchOutcome;
pub use registration::{ClientId, Registration, RegistrationStatus};

/// 单个代理版本的配置，构造时传入，生命周期内不可变
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    /// 缓存命名空间，同时作为版本号
    pub namespace: String,
    /// 应用源站，只使用 scheme 和 authority
    pub origin: Uri,
    /// 安装时必须全部缓存成功的资源路径
    pub static_assets: Vec<String>,
    pub root_document: String,
    pub image_placeholder: String,
    pub skip_waiting_on_install: bool,
}

impl ProxyConfig {
    pub fn new(namespace: impl Into<String>, origin: Uri) -> Self {
        Self {
            namespace: namespace.into(),
            origin,
            static_assets: Vec::new(),
            root_document: root_document(),
            image_placeholder: image_placeholder(),
            skip_waiting_on_install: skip_waiting_on_install(),
        }
    }

    pub fn with_static_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_skip_waiting(mut self, skip_waiting: bool) -> Self {
        self.skip_waiting_on_install = skip_waiting;
        self
    }

    pub fn from_settings(settings: &ProxySettings) -> Result<Self> {
        Ok(Self {
            namespace: settings.version.clone(),
            origin: settings.origin_uri()?,
            static_assets: settings.static_assets.clone(),
            root_document: settings.root_document.clone(),
            image_placeholder: settings.image_placeholder.clone(),
            skip_waiting_on_install: settings.skip_waiting_on_install,
        })
    }

    /// 将根路径解析为源站上的绝对地址
    pub fn resolve(&self, path: &str) -> Result<Uri> {
        let scheme = self.origin.scheme_str().unwrap_or("http");
        let authority = self
            .origin
            .authority()
            .map(|a| a.as_str())
            .unwrap_or_default();
        Ok(format!("{scheme}://{authority}{path}").parse()?)
    }

    pub fn static_asset_requests(&self) -> Result<Vec<ProxyRequest>> {
        self.static_assets
            .iter()
            .map(|path| self.resolve(path).map(ProxyRequest::get))
            .collect()
    }
}
