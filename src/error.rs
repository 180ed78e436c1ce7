use std::io;

use http::uri::InvalidUri;

use crate::proxy::{LifecycleEvent, ProxyState};

#[allow(clippy::enum_variant_names)]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    // from
    #[error("failed io {0}")]
    Io(#[from] io::Error),
    #[error("failed to decode toml {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("failed to handle json {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to handle http {0}")]
    Http(#[from] http::Error),
    #[error("failed to convert url {0}")]
    InvalidUri(#[from] InvalidUri),
    #[error("failed to convert header {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    // config
    #[error("invalid config: {0}")]
    Config(String),

    // network
    #[error("network request to {url} failed: {reason}")]
    Network { url: String, reason: String },
    #[error("no cached response or fallback for {0}")]
    Offline(String),

    // cache store
    #[error("cache storage error: {0}")]
    Storage(String),
    #[error("failed to populate cache {namespace}: {asset} {reason}")]
    Population {
        namespace: String,
        asset: String,
        reason: String,
    },

    // lifecycle
    #[error("invalid lifecycle transition {event:?} from {from:?}")]
    InvalidTransition {
        from: ProxyState,
        event: LifecycleEvent,
    },
    #[error("no active proxy")]
    NoActiveProxy,

    #[error("internal server error {0}")]
    Any(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = anyhow::Result<T, E>;
