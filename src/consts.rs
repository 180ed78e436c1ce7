use std::env;

pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("MEOW_COMMIT");
pub const COMPILER: &str = env!("MEOW_COMPILER");
pub const OS: &str = env::consts::OS;
pub const ARCH: &str = env::consts::ARCH;

// config defaults
pub const LOG_LEVEL: &str = "info";
pub fn log_level() -> String {
    LOG_LEVEL.to_string()
}

pub const LOG_FOLDER: &str = "./logs";
pub fn log_folder() -> String {
    LOG_FOLDER.to_string()
}

pub const SERVER_IP: &str = "0.0.0.0";
pub fn server_ip() -> String {
    SERVER_IP.to_string()
}

pub const SERVER_PORT: u16 = 4000;
pub fn server_port() -> u16 {
    SERVER_PORT
}

pub const PROCESS_TIMEOUT: u16 = 75;
pub fn process_timeout() -> u16 {
    PROCESS_TIMEOUT
}

/// 控制接口（消息、推送、通知点击）的路径前缀
pub const CONTROL_PREFIX: &str = "/_proxy";
pub fn control_prefix() -> String {
    CONTROL_PREFIX.to_string()
}

pub const CACHE_NAMESPACE: &str = "cat-memes-pwa-v1";
pub fn cache_namespace() -> String {
    CACHE_NAMESPACE.to_string()
}

pub const STATIC_ASSETS: [&str; 7] = [
    "/",
    "/index.html",
    "/style.css",
    "/js/main.js",
    "/manifest.json",
    "/images/pwa-icon-192.png",
    "/images/pwa-icon-512.png",
];
pub fn static_assets() -> Vec<String> {
    STATIC_ASSETS.map(|a| a.to_string()).to_vec()
}

pub const ROOT_DOCUMENT: &str = "/index.html";
pub fn root_document() -> String {
    ROOT_DOCUMENT.to_string()
}

pub const IMAGE_PLACEHOLDER: &str = "/images/pwa-icon-192.png";
pub fn image_placeholder() -> String {
    IMAGE_PLACEHOLDER.to_string()
}

pub const FETCH_TIMEOUT: u16 = 30;
pub fn fetch_timeout() -> u16 {
    FETCH_TIMEOUT
}

pub fn skip_waiting_on_install() -> bool {
    true
}

pub const STORAGE_PATH: &str = "./cache";
pub fn storage_path() -> String {
    STORAGE_PATH.to_string()
}

// notification defaults
pub const NOTIFICATION_TITLE: &str = "Cat Memes";
pub fn notification_title() -> String {
    NOTIFICATION_TITLE.to_string()
}

pub const NOTIFICATION_BODY: &str = "New cat meme available!";
pub fn notification_body() -> String {
    NOTIFICATION_BODY.to_string()
}

pub const NOTIFICATION_ICON: &str = "/images/pwa-icon-192.png";
pub fn notification_icon() -> String {
    NOTIFICATION_ICON.to_string()
}

pub const NOTIFICATION_BADGE: &str = "/images/pwa-icon-128.png";
pub fn notification_badge() -> String {
    NOTIFICATION_BADGE.to_string()
}

pub const NOTIFICATION_VIBRATE: [u32; 3] = [100, 50, 100];
pub fn notification_vibrate() -> Vec<u32> {
    NOTIFICATION_VIBRATE.to_vec()
}

/// 点击通知 `view` 动作时打开的地址
pub const NOTIFICATION_OPEN_URL: &str = "/";
pub fn notification_open_url() -> String {
    NOTIFICATION_OPEN_URL.to_string()
}
