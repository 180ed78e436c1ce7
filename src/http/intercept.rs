//! 拦截发往源站的请求，交给当前活动版本处理

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use http::{
    HeaderMap, HeaderName, HeaderValue, Method, Uri,
    header::{ACCEPT, ACCEPT_ENCODING, CONTENT_LENGTH},
};
use tracing::debug;

use super::{
    AppState,
    error::{RouteError, RouteResult},
};
use crate::fetch::{Destination, ProxyRequest, ProxyResponse, RequestMode, copy_headers};

/// 请求体大小上限
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// 标记响应来源：cache、network、fallback 或 pass-through
pub const SOURCE_HEADER: HeaderName = HeaderName::from_static("x-meow-source");

const SEC_FETCH_MODE: &str = "sec-fetch-mode";
const SEC_FETCH_DEST: &str = "sec-fetch-dest";

/// 推断请求模式
///
/// 优先使用 `Sec-Fetch-Mode`，没有时将接受 html 的 GET 请求视为导航。
pub fn request_mode(method: &Method, headers: &HeaderMap) -> RequestMode {
    if let Some(mode) = headers
        .get(SEC_FETCH_MODE)
        .and_then(|v| v.to_str().ok())
        .and_then(RequestMode::from_header)
    {
        return mode;
    }
    let accepts_html = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"));
    if method == Method::GET && accepts_html {
        RequestMode::Navigate
    } else {
        RequestMode::default()
    }
}

pub fn request_destination(mode: RequestMode, path: &str, headers: &HeaderMap) -> Destination {
    if let Some(dest) = headers
        .get(SEC_FETCH_DEST)
        .and_then(|v| v.to_str().ok())
        .and_then(Destination::from_header)
        && dest != Destination::Other
    {
        return dest;
    }
    if mode == RequestMode::Navigate {
        return Destination::Document;
    }
    Destination::guess_from_path(path)
}

/// 将入站请求改写为指向源站的 `ProxyRequest`
pub async fn to_proxy_request(origin: &Uri, req: Request) -> RouteResult<ProxyRequest> {
    let (parts, body) = req.into_parts();
    let path_query = parts
        .uri
        .path_and_query()
        .map(|v| v.as_str())
        .unwrap_or("/");
    let scheme = origin.scheme_str().unwrap_or("http");
    let authority = origin.authority().map(|a| a.as_str()).unwrap_or_default();
    let uri: Uri = format!("{scheme}://{authority}{path_query}")
        .parse()
        .map_err(|e| RouteError::BadRequest(format!("{e}")))?;

    let body = to_bytes(body, MAX_BODY_SIZE)
        .await
        .map_err(|e| RouteError::BadRequest(format!("failed to read body: {e}")))?;

    let mode = request_mode(&parts.method, &parts.headers);
    let destination = request_destination(mode, parts.uri.path(), &parts.headers);
    let mut headers = HeaderMap::new();
    copy_headers(&parts.headers, &mut headers);
    headers.remove(CONTENT_LENGTH);
    // 内容编码由客户端与源站自行协商，缓存只保存解码后的响应体
    headers.remove(ACCEPT_ENCODING);

    Ok(ProxyRequest {
        method: parts.method,
        uri,
        headers,
        mode,
        destination,
        body,
    })
}

fn into_axum_response(res: ProxyResponse, source: &'static str) -> Response {
    let mut response = Response::builder().status(res.status);
    if let Some(headers) = response.headers_mut() {
        copy_headers(&res.headers, headers);
        headers.remove(CONTENT_LENGTH);
        headers.insert(SOURCE_HEADER, HeaderValue::from_static(source));
    }
    match response.body(Body::from(res.body)) {
        Ok(res) => res,
        Err(err) => RouteError::from(anyhow::Error::from(err)).into_response(),
    }
}

/// 所有未命中控制接口的请求都从这里进入
pub async fn intercept(State(state): State<AppState>, req: Request) -> RouteResult<Response> {
    let proxy_req = to_proxy_request(&state.origin, req).await?;
    debug!(
        "intercept {} {} mode {:?} dest {:?}",
        proxy_req.method, proxy_req.uri, proxy_req.mode, proxy_req.destination
    );

    let outcome = state.registration.handle_fetch(&proxy_req).await?;
    let source = outcome.source();
    let res = match outcome.into_response() {
        Some(res) => res,
        None => state.fetcher.fetch(&proxy_req).await?,
    };
    debug!("{} served from {}", proxy_req.uri, source);
    Ok(into_axum_response(res, source))
}
