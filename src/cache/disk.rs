use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use dashmap::DashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::{fs, sync::Mutex};
use tracing::{debug, warn};

use super::{CacheNamespace, CacheStorage, CacheStore, RequestIdentity};
use crate::{
    error::{Error, Result},
    fetch::{ProxyRequest, ProxyResponse, ResponseKind},
};

/// 磁盘存储，跨进程重启保留
///
/// 目录结构：
/// ```text
/// <root>/<base64url(namespace)>/<md5(url)>/<md5(vary)>.json
///                                          <md5(vary)>-<seq>.body
/// ```
/// 元数据文件通过 rename 原子落盘，元数据可见时响应体一定已经写完。
/// 同一条目的写入和删除在进程内串行执行。
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
    locks: EntryLocks,
}

/// 以元数据路径为键的条目锁，同一存储打开的所有命名空间共享
type EntryLocks = Arc<DashMap<PathBuf, Arc<Mutex<()>>>>;

impl DiskStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_owned(),
            locks: Arc::default(),
        }
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(URL_SAFE_NO_PAD.encode(namespace))
    }
}

#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
    locks: EntryLocks,
}

/// 条目元数据
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    identity: RequestIdentity,
    status: u16,
    headers: Vec<(String, String)>,
    kind: ResponseKind,
    body_file: String,
    stored_at: i64,
}

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

fn unique_suffix() -> String {
    let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", chrono::Utc::now().timestamp_micros(), seq)
}

fn digest(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

fn headers_to_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn pairs_to_headers(pairs: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!("Skip invalid stored header name: {name}");
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            warn!("Skip invalid stored header value: {value}");
            continue;
        };
        headers.append(name, value);
    }
    headers
}

async fn read_meta(path: &Path) -> Result<Option<EntryMeta>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl DiskStore {
    fn slot_dir(&self, url: &str) -> PathBuf {
        self.dir.join(digest(url))
    }

    fn meta_path(&self, identity: &RequestIdentity) -> PathBuf {
        self.slot_dir(identity.url())
            .join(format!("{}.json", digest(&identity.vary_key())))
    }

    fn entry_lock(&self, meta_path: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(meta_path.to_owned())
            .or_default()
            .clone()
    }

    /// 读取同一 url 下所有完整写入的条目
    async fn read_slot(slot: &Path) -> Result<Vec<EntryMeta>> {
        let mut dir = match fs::read_dir(slot).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut metas = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_meta(&path).await {
                Ok(Some(meta)) => metas.push(meta),
                Ok(None) => {}
                Err(e) => warn!("Skip unreadable cache entry {:?}: {}", path, e),
            }
        }
        Ok(metas)
    }

    async fn load_response(slot: &Path, meta: EntryMeta) -> Result<Option<ProxyResponse>> {
        let body = match fs::read(slot.join(&meta.body_file)).await {
            Ok(body) => body,
            // 并发覆盖时旧响应体可能已被清理
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let status = StatusCode::from_u16(meta.status)
            .map_err(|e| Error::Storage(format!("invalid stored status {}: {e}", meta.status)))?;
        Ok(Some(ProxyResponse {
            status,
            headers: pairs_to_headers(&meta.headers),
            body: body.into(),
            kind: meta.kind,
        }))
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn put(&self, identity: RequestIdentity, response: ProxyResponse) -> Result<()> {
        let slot = self.slot_dir(identity.url());
        fs::create_dir_all(&slot).await?;

        let meta_path = self.meta_path(&identity);
        let lock = self.entry_lock(&meta_path);
        let _guard = lock.lock().await;
        let previous = read_meta(&meta_path).await.ok().flatten();

        let stem = digest(&identity.vary_key());
        let suffix = unique_suffix();
        let body_file = format!("{stem}-{suffix}.body");
        let body_path = slot.join(&body_file);
        if let Err(e) = fs::write(&body_path, &response.body).await {
            let _ = fs::remove_file(&body_path).await;
            return Err(e.into());
        }

        let meta = EntryMeta {
            identity,
            status: response.status.as_u16(),
            headers: headers_to_pairs(&response.headers),
            kind: response.kind,
            body_file,
            stored_at: chrono::Utc::now().timestamp(),
        };
        let tmp_path = slot.join(format!("{stem}.json.tmp-{suffix}"));
        let written = async {
            fs::write(&tmp_path, serde_json::to_vec(&meta)?).await?;
            fs::rename(&tmp_path, &meta_path).await?;
            Ok::<_, Error>(())
        }
        .await;
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path).await;
            let _ = fs::remove_file(&body_path).await;
            return Err(e);
        }

        if let Some(previous) = previous
            && previous.body_file != meta.body_file
        {
            let _ = fs::remove_file(slot.join(previous.body_file)).await;
        }
        debug!("Stored {} in {:?}", meta.identity.url(), self.dir);
        Ok(())
    }

    async fn lookup(&self, request: &ProxyRequest) -> Result<Option<ProxyResponse>> {
        let url = request.url();
        let slot = self.slot_dir(&url);
        for meta in Self::read_slot(&slot).await? {
            if !meta.identity.matches(&url, &request.headers) {
                continue;
            }
            if let Some(response) = Self::load_response(&slot, meta).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    async fn delete(&self, identity: &RequestIdentity) -> Result<bool> {
        let meta_path = self.meta_path(identity);
        let lock = self.entry_lock(&meta_path);
        let _guard = lock.lock().await;
        let Some(meta) = read_meta(&meta_path).await? else {
            return Ok(false);
        };
        if meta.identity != *identity {
            return Ok(false);
        }
        fs::remove_file(&meta_path).await?;
        let slot = self.slot_dir(identity.url());
        let _ = fs::remove_file(slot.join(meta.body_file)).await;
        // 目录非空时删除失败，忽略即可
        let _ = fs::remove_dir(&slot).await;
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<RequestIdentity>> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let metas = Self::read_slot(&entry.path()).await?;
            keys.extend(metas.into_iter().map(|meta| meta.identity));
        }
        keys.sort_by(|a, b| a.url().cmp(b.url()));
        Ok(keys)
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, namespace: &str) -> Result<Arc<dyn CacheStore>> {
        let dir = self.namespace_dir(namespace);
        fs::create_dir_all(&dir).await?;
        Ok(Arc::new(DiskStore {
            dir,
            locks: self.locks.clone(),
        }))
    }

    async fn has(&self, namespace: &str) -> Result<bool> {
        Ok(fs::try_exists(self.namespace_dir(namespace)).await?)
    }

    async fn keys(&self) -> Result<Vec<CacheNamespace>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut namespaces = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let decoded = name
                .to_str()
                .and_then(|name| URL_SAFE_NO_PAD.decode(name).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok());
            match decoded {
                Some(namespace) => namespaces.push(namespace),
                None => warn!("Skip unknown directory in cache root: {:?}", name),
            }
        }
        namespaces.sort();
        Ok(namespaces)
    }

    async fn delete(&self, namespace: &str) -> Result<bool> {
        let dir = self.namespace_dir(namespace);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
