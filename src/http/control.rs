//! 页面与代理之间的控制接口

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
};
use http::StatusCode;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use super::{AppState, error::RouteResult};
use crate::{
    error::Result,
    cache::CacheNamespace,
    proxy::{ClientId, Message, PushPayload, RegistrationStatus},
};

#[derive(Debug, Default, Deserialize)]
pub struct NotificationClick {
    #[serde(default)]
    pub action: Option<String>,
}

/// 新连接客户端的标识和控制它的版本
#[derive(Debug, Serialize)]
pub struct ClientInfo {
    pub id: ClientId,
    pub controller: Option<CacheNamespace>,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub tag: String,
}

/// 空请求体视为没有内容
fn parse_optional<T: DeserializeOwned>(body: &Bytes) -> Result<Option<T>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(body)?))
}

pub async fn message(State(state): State<AppState>, body: Bytes) -> RouteResult<StatusCode> {
    let message: Message = serde_json::from_slice(&body).map_err(crate::error::Error::from)?;
    debug!("message {:?}", message);
    state.registration.post_message(message).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn push(State(state): State<AppState>, body: Bytes) -> RouteResult<impl IntoResponse> {
    let payload = parse_optional::<PushPayload>(&body)?;
    let notification = state.registration.push(payload).await?;
    Ok((StatusCode::ACCEPTED, Json(notification)))
}

pub async fn notification_click(
    State(state): State<AppState>,
    body: Bytes,
) -> RouteResult<StatusCode> {
    let click = parse_optional::<NotificationClick>(&body)?.unwrap_or_default();
    state
        .registration
        .notification_click(click.action.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn sync(State(state): State<AppState>, body: Bytes) -> RouteResult<StatusCode> {
    let req: SyncRequest = serde_json::from_slice(&body).map_err(crate::error::Error::from)?;
    state.registration.sync(&req.tag);
    Ok(StatusCode::NO_CONTENT)
}

/// 页面打开时登记，存在客户端时新版本会进入等待
pub async fn connect_client(State(state): State<AppState>) -> (StatusCode, Json<ClientInfo>) {
    let id = state.registration.connect_client();
    let controller = state.registration.controller(id);
    (StatusCode::CREATED, Json(ClientInfo { id, controller }))
}

pub async fn disconnect_client(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> RouteResult<StatusCode> {
    if state.registration.disconnect_client(ClientId::from(id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

pub async fn status(State(state): State<AppState>) -> RouteResult<Json<RegistrationStatus>> {
    Ok(Json(state.registration.status().await?))
}
