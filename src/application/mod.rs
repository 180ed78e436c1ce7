use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum_server::Handle;
use http::Uri;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::{
    cache::build_storage,
    config::{ServerConfig, Settings},
    consts::{ARCH, COMMIT, COMPILER, NAME, OS, VERSION},
    fetch::{Fetcher, HttpFetcher},
    http::{AppState, make_server, shutdown_servers},
    proxy::{LoggingHost, ProxyConfig, Registration},
    utils::init_logger,
};

/// 初始化日志系统
pub fn initialize_logger(settings: &Settings) -> Result<WorkerGuard> {
    let guard = init_logger(settings.log_level.as_str(), settings.log_folder.as_str())
        .with_context(|| "Failed to initialize logger")?;
    info!("{} v{} ({})", NAME, VERSION, COMMIT);
    info!("Compiler: {}", COMPILER);
    info!("OS: {} {}", OS, ARCH);
    debug!("Configuration: {:?}", settings);
    Ok(guard)
}

/// 运行中的代理服务
///
/// 持有版本注册表和服务器句柄，配置变化时注册新版本或重启服务器。
pub struct Application {
    registration: Arc<Registration>,
    fetcher: Arc<dyn Fetcher>,
    origin: Uri,
    server: Mutex<ServerConfig>,
    handles: Mutex<Vec<Handle<SocketAddr>>>,
}

impl Application {
    pub fn new(settings: &Settings) -> Result<Self> {
        let origin = settings.proxy.origin_uri()?;
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(
            origin.clone(),
            Duration::from_secs(settings.proxy.fetch_timeout.into()),
        )?);
        let storage = build_storage(&settings.storage);
        let registration = Arc::new(Registration::new(
            storage,
            fetcher.clone(),
            Arc::new(LoggingHost),
            settings.notification.clone(),
        ));
        Ok(Self {
            registration,
            fetcher,
            origin,
            server: Mutex::new(settings.server.clone()),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn registration(&self) -> &Arc<Registration> {
        &self.registration
    }

    /// 服务器实际监听的地址，端口配置为 0 时由系统分配
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let handle = self.handles.lock().await.first().cloned()?;
        handle.listening().await
    }

    fn state(&self) -> AppState {
        AppState::new(
            self.registration.clone(),
            self.fetcher.clone(),
            self.origin.clone(),
        )
    }

    /// 注册配置中的版本
    ///
    /// 安装失败不影响服务启动，此时请求直接转发到源站。
    pub async fn register(&self, settings: &Settings) {
        let config = match ProxyConfig::from_settings(&settings.proxy) {
            Ok(config) => config,
            Err(err) => {
                error!("Invalid proxy config: {}", err);
                return;
            }
        };
        let namespace = config.namespace.clone();
        match self.registration.register(config).await {
            Ok(state) => info!("[{}] Registered, state {:?}", namespace, state),
            Err(err) => error!("[{}] Registration failed: {}", namespace, err),
        }
    }

    /// 注册初始版本并启动服务器
    pub async fn start(&self, settings: &Settings) -> Result<()> {
        self.register(settings).await;
        let handle = make_server(&settings.server, self.state()).await?;
        self.handles.lock().await.push(handle);
        info!("Server started");
        Ok(())
    }

    /// 处理配置文件变更
    pub async fn handle_config_change(&self, result: crate::error::Result<Settings>) {
        let new_settings = match result {
            Ok(settings) => settings,
            Err(e) => {
                error!("Failed to reload config file: {:?}", e);
                return;
            }
        };
        info!("Config file reloaded successfully");

        if let Ok(origin) = new_settings.proxy.origin_uri()
            && origin != self.origin
        {
            warn!("Origin changed to {}, restart to apply", origin);
        }
        self.register(&new_settings).await;

        let mut server = self.server.lock().await;
        if *server == new_settings.server {
            return;
        }
        info!("Server config changed, restarting server...");
        let mut handles = self.handles.lock().await;
        shutdown_servers(&mut handles).await;
        match make_server(&new_settings.server, self.state()).await {
            Ok(handle) => {
                handles.push(handle);
                *server = new_settings.server;
                info!("Server has been restarted successfully");
            }
            Err(e) => error!("Failed to restart server: {:?}", e),
        }
    }

    /// 优雅关闭服务器和配置监听器
    pub async fn shutdown(&self, stop_tx: Option<oneshot::Sender<()>>) {
        info!("Received shutdown signal, closing servers...");

        let mut handles = self.handles.lock().await;
        shutdown_servers(&mut handles).await;
        // 等待后台缓存写入完成
        self.registration.settle().await;

        if let Some(stop_tx) = stop_tx
            && stop_tx.send(()).is_err()
        {
            error!("Failed to send stop signal to config watcher");
        }

        info!("Application shutdown complete");
    }
}
