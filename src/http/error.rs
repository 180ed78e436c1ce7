use std::fmt::Display;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use serde_repr::*;
use tracing::{error, warn};

use crate::error::Error;

#[derive(thiserror::Error, Debug)]
pub enum RouteError {
    #[error("{0}")]
    Any(#[from] anyhow::Error),
    #[error("{0}")]
    Infallible(#[from] std::convert::Infallible),
    #[error("{0}")]
    Proxy(#[from] Error),
    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize_repr, Deserialize_repr, PartialEq, Debug)]
#[repr(u16)]
pub enum ErrorCode {
    Normal = 200,
    InternalError = 1000,
    BadRequest = 1001,
    Offline = 1002,
    NotServing = 1003,
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ErrorCode::*;

        let res = match self {
            Normal => "",
            InternalError => "服务器内部错误",
            BadRequest => "请求格式错误",
            Offline => "网络不可用且没有缓存",
            NotServing => "没有正在服务的版本",
        };
        f.write_str(res)?;
        Ok(())
    }
}

/// Log and return INTERNAL_SERVER_ERROR
fn log_internal_error<T: Display>(err: T) -> (StatusCode, ErrorCode, String) {
    use ErrorCode::*;

    error!("{err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        InternalError,
        "internal server error".to_string(),
    )
}

/// 代理自身的错误，离线时返回 502
fn proxy_error(err: Error) -> (StatusCode, ErrorCode, String) {
    match err {
        Error::Offline(_) | Error::Network { .. } => {
            warn!("{err}");
            (StatusCode::BAD_GATEWAY, ErrorCode::Offline, err.to_string())
        }
        Error::NoActiveProxy => (
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::NotServing,
            err.to_string(),
        ),
        Error::Json(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadRequest, err.to_string()),
        err => log_internal_error(err),
    }
}

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        use RouteError::*;

        let (status_code, code, err_message) = match self {
            Any(err) => log_internal_error(err),
            Infallible(err) => log_internal_error(err),
            Proxy(err) => proxy_error(err),
            BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadRequest, msg),
        };
        let body = Json(json!({
            "code": code,
            "message": code.to_string(),
            "error": err_message
        }));
        (status_code, body).into_response()
    }
}

pub type RouteResult<T, E = RouteError> = Result<T, E>;
