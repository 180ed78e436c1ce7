//! 集成测试的公共辅助函数和工具
#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::SocketAddr,
    path::Path,
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use axum::{
    Router,
    extract::{Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use dashmap::DashMap;

use meow::{application::Application, config::Settings};

/// 模拟的应用源站
pub struct OriginServer {
    pub addr: SocketAddr,
    handle: Handle<SocketAddr>,
    state: Arc<OriginState>,
}

struct OriginState {
    routes: HashMap<&'static str, (&'static str, &'static str)>,
    hits: DashMap<String, usize>,
}

/// 源站提供的静态资源：路径、类型、内容
pub const ORIGIN_ROUTES: &[(&str, &str, &str)] = &[
    ("/", "text/html", "<html>root</html>"),
    ("/index.html", "text/html", "<html>index</html>"),
    ("/style.css", "text/css", "body{}"),
    ("/js/main.js", "text/javascript", "console.log('meow')"),
    ("/manifest.json", "application/manifest+json", "{}"),
    ("/images/pwa-icon-192.png", "image/png", "PNG192"),
    ("/images/pwa-icon-512.png", "image/png", "PNG512"),
];

async fn serve_origin(State(state): State<Arc<OriginState>>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    let hits = {
        let mut entry = state.hits.entry(path.clone()).or_insert(0);
        *entry += 1;
        *entry
    };
    // 每次返回不同内容的动态接口
    if path == "/api/random" {
        return ([(CONTENT_TYPE, "text/plain")], format!("cat-{hits}")).into_response();
    }
    match state.routes.get(path.as_str()) {
        Some((content_type, body)) => ([(CONTENT_TYPE, *content_type)], *body).into_response(),
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

impl OriginServer {
    pub async fn start() -> Result<Self> {
        let state = Arc::new(OriginState {
            routes: ORIGIN_ROUTES
                .iter()
                .map(|(path, content_type, body)| (*path, (*content_type, *body)))
                .collect(),
            hits: DashMap::new(),
        });
        let router = Router::new()
            .fallback(serve_origin)
            .with_state(state.clone());

        let handle = Handle::new();
        let server_handle = handle.clone();
        let addr: SocketAddr = "127.0.0.1:0".parse()?;
        tokio::spawn(async move {
            let _ = axum_server::bind(addr)
                .handle(server_handle)
                .serve(router.into_make_service())
                .await;
        });
        let addr = handle
            .listening()
            .await
            .ok_or_else(|| anyhow::anyhow!("origin failed to start"))?;
        Ok(Self {
            addr,
            handle,
            state,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state.hits.get(path).map(|v| *v).unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.state.hits.iter().map(|v| *v.value()).sum()
    }

    /// 关闭源站，模拟网络断开
    pub async fn stop(&self) {
        self.handle.shutdown();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// 生成代理配置，监听随机端口
pub fn proxy_settings(origin: &str, version: &str, assets: &[&str], extra: &str) -> Result<Settings> {
    let assets = assets
        .iter()
        .map(|a| format!("\"{a}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let content = format!(
        r#"
log_level = "debug"

[server]
ip = "127.0.0.1"
port = 0

[proxy]
version = "{version}"
origin = "{origin}"
static_assets = [{assets}]
{extra}
"#
    );
    Ok(Settings::from_toml(&content)?)
}

pub fn disk_storage(path: &Path) -> String {
    format!("\n[storage]\nkind = \"disk\"\npath = \"{}\"\n", path.display())
}

/// 启动代理并返回其访问地址
pub async fn start_proxy(settings: &Settings) -> Result<(Arc<Application>, String)> {
    let app = Arc::new(Application::new(settings)?);
    app.start(settings).await?;
    let addr = app
        .local_addr()
        .await
        .ok_or_else(|| anyhow::anyhow!("proxy failed to start"))?;
    Ok((app, format!("http://{addr}")))
}

pub fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()?)
}
