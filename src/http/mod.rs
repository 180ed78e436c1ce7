use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use axum_server::Handle;
use http::{StatusCode, Uri};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, info};

use crate::{
    config::ServerConfig,
    fetch::Fetcher,
    middlewares::{add_version, logging_route},
    proxy::Registration,
};

pub mod control;
pub mod error;
// 拦截并代理发往源站的请求
pub mod intercept;

/// 所有路由共享的状态
#[derive(Clone)]
pub struct AppState {
    pub registration: Arc<Registration>,
    /// 放行的请求直接经由它访问源站
    pub fetcher: Arc<dyn Fetcher>,
    pub origin: Uri,
}

impl AppState {
    pub fn new(registration: Arc<Registration>, fetcher: Arc<dyn Fetcher>, origin: Uri) -> Self {
        Self {
            registration,
            fetcher,
            origin,
        }
    }
}

/// 构建路由
///
/// 控制接口挂载在 `control_prefix` 下，其余请求全部交给拦截器。
pub fn make_router(server: &ServerConfig, state: AppState) -> Router {
    let prefix = server.control_prefix.as_str();
    let control = Router::new()
        .route("/message", post(control::message))
        .route("/push", post(control::push))
        .route("/notificationclick", post(control::notification_click))
        .route("/sync", post(control::sync))
        .route("/status", get(control::status))
        .route("/clients", post(control::connect_client))
        .route("/clients/{id}", delete(control::disconnect_client));
    debug!("Control routes registered under {}", prefix);

    let router = Router::new()
        .nest(prefix, control)
        .fallback(intercept::intercept)
        .layer(DefaultBodyLimit::max(intercept::MAX_BODY_SIZE))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(add_version))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::SERVICE_UNAVAILABLE,
                    Duration::from_secs(server.timeout.into()),
                )),
        )
        .with_state(state);

    logging_route(router)
}

/// 启动服务器
pub async fn make_server(
    server: &ServerConfig,
    state: AppState,
) -> anyhow::Result<Handle<SocketAddr>> {
    debug!("make_server start with server: {:?}", server);
    let router = make_router(server, state);

    let addr = format!("{}:{}", server.ip, server.port);
    let addr: SocketAddr = addr.parse()?;

    let handle = Handle::new();
    let handle_clone = handle.clone();

    // 生成一个任务来运行服务器
    tokio::spawn(async move {
        info!("Listening on http://{}", addr);
        if let Err(err) = axum_server::bind(addr)
            .handle(handle_clone)
            .serve(router.into_make_service())
            .await
        {
            tracing::error!("Server on {} stopped: {:?}", addr, err);
        }
    });

    Ok(handle)
}

/// 优雅关闭所有服务器
///
/// 服务器将在 30 秒内完成正在处理的请求后停止。
pub async fn shutdown_servers(handles: &mut Vec<Handle<SocketAddr>>) {
    for handle in handles.iter() {
        handle.graceful_shutdown(Some(Duration::from_secs(30)));
    }
    handles.clear();
    info!("All servers have been signaled to shut down");
}
