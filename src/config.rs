use std::{fs, path::Path};

use http::Uri;
use serde::Deserialize;

use crate::{
    consts::{
        cache_namespace, control_prefix, fetch_timeout, image_placeholder, log_folder, log_level,
        notification_badge, notification_body, notification_icon, notification_open_url,
        notification_title, notification_vibrate, process_timeout, root_document, server_ip,
        server_port, skip_waiting_on_install, static_assets, storage_path,
    },
    error::{Error, Result},
};

/// 代理对外监听的地址
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "server_ip")]
    pub ip: String,
    #[serde(default = "server_port")]
    pub port: u16,
    /// 单个请求处理超时时间（秒）
    #[serde(default = "process_timeout")]
    pub timeout: u16,
    /// 控制接口路径前缀
    #[serde(default = "control_prefix")]
    pub control_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: server_ip(),
            port: server_port(),
            timeout: process_timeout(),
            control_prefix: control_prefix(),
        }
    }
}

/// 缓存代理配置
#[derive(Deserialize, Clone, Debug)]
pub struct ProxySettings {
    /// 缓存版本，即当前命名空间名称
    #[serde(default = "cache_namespace")]
    pub version: String,
    /// 应用所在源站，例如 `http://127.0.0.1:8080`
    pub origin: String,
    /// 安装时必须预先缓存的资源，均为根路径开头
    #[serde(default = "static_assets")]
    pub static_assets: Vec<String>,
    /// 离线导航时返回的文档
    #[serde(default = "root_document")]
    pub root_document: String,
    /// 离线图片请求的占位图
    #[serde(default = "image_placeholder")]
    pub image_placeholder: String,
    /// 安装完成后立即激活，不等待旧版本的客户端断开
    #[serde(default = "skip_waiting_on_install")]
    pub skip_waiting_on_install: bool,
    /// 网络请求超时时间（秒）
    #[serde(default = "fetch_timeout")]
    pub fetch_timeout: u16,
}

impl ProxySettings {
    pub fn origin_uri(&self) -> Result<Uri> {
        let uri: Uri = self.origin.trim_end_matches('/').parse()?;
        if !matches!(uri.scheme_str(), Some("http") | Some("https")) || uri.authority().is_none() {
            return Err(Error::Config(format!(
                "proxy.origin must be an absolute http(s) url: {}",
                self.origin
            )));
        }
        Ok(uri)
    }
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    Disk,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StorageConfig {
    #[serde(default)]
    pub kind: StorageKind,
    /// 磁盘存储根目录
    #[serde(default = "storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::default(),
            path: storage_path(),
        }
    }
}

/// 推送通知的默认内容
#[derive(Deserialize, Clone, Debug)]
pub struct NotificationConfig {
    #[serde(default = "notification_title")]
    pub title: String,
    #[serde(default = "notification_body")]
    pub body: String,
    #[serde(default = "notification_icon")]
    pub icon: String,
    #[serde(default = "notification_badge")]
    pub badge: String,
    #[serde(default = "notification_vibrate")]
    pub vibrate: Vec<u32>,
    #[serde(default = "notification_open_url")]
    pub open_url: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: notification_title(),
            body: notification_body(),
            icon: notification_icon(),
            badge: notification_badge(),
            vibrate: notification_vibrate(),
            open_url: notification_open_url(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    #[serde(default = "log_level")]
    pub log_level: String,
    /// 日志文件夹，日志按天分割
    #[serde(default = "log_folder")]
    pub log_folder: String,
    #[serde(default)]
    pub server: ServerConfig,
    pub proxy: ProxySettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl Settings {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let file = fs::read_to_string(path)?;
        Self::from_toml(&file)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let proxy = &self.proxy;
        if proxy.version.trim().is_empty() {
            return Err(Error::Config("proxy.version must not be empty".into()));
        }
        proxy.origin_uri()?;

        let root_relative = proxy
            .static_assets
            .iter()
            .chain([&proxy.root_document, &proxy.image_placeholder]);
        for path in root_relative {
            if !path.starts_with('/') {
                return Err(Error::Config(format!(
                    "asset path must be root-relative: {path}"
                )));
            }
        }

        let prefix = &self.server.control_prefix;
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            return Err(Error::Config(format!(
                "server.control_prefix must look like /_proxy: {prefix}"
            )));
        }

        if self.storage.kind == StorageKind::Disk && self.storage.path.trim().is_empty() {
            return Err(Error::Config("storage.path is required for disk storage".into()));
        }
        Ok(())
    }
}
