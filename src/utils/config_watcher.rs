use notify::{EventKind, RecursiveMode, Watcher};
use std::{
    path::Path,
    sync::mpsc,
    time::Duration,
};
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::{config::Settings, error::Result};

/// 合并短时间内的连续写入事件
const DEBOUNCE: Duration = Duration::from_millis(500);

fn is_replaced(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Remove(_) | EventKind::Modify(notify::event::ModifyKind::Name(_))
    )
}

/// 启动配置文件监听
///
/// 文件变化时重新解析配置，把解析结果交给 `callback`。
/// 返回的发送器用于停止监听线程。
pub fn start_config_watcher(
    config_path: impl AsRef<Path>,
    callback: impl Fn(Result<Settings>) + Send + 'static,
) -> Result<oneshot::Sender<()>> {
    let (stop_tx, mut stop_rx) = oneshot::channel();
    let config_path = config_path.as_ref().to_owned();

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx)
        .map_err(|e| anyhow::anyhow!("failed to create watcher: {e}"))?;
    watcher
        .watch(&config_path, RecursiveMode::NonRecursive)
        .map_err(|e| anyhow::anyhow!("failed to watch {:?}: {e}", config_path))?;
    info!("Watching config file: {:?}", config_path);

    std::thread::spawn(move || {
        loop {
            if stop_rx.try_recv().is_ok() {
                info!("Stopping config watcher");
                break;
            }

            match rx.recv_timeout(Duration::from_secs(1)) {
                Ok(Ok(event)) => {
                    // 只关心内容变化和文件被替换
                    if !matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) {
                        continue;
                    }
                    info!("Config file event: {:?}", event.kind);
                    let mut replaced = is_replaced(&event.kind);
                    // 等待文件写入完成，合并期间的所有事件
                    while let Ok(next) = rx.recv_timeout(DEBOUNCE) {
                        if let Ok(next) = next {
                            replaced |= is_replaced(&next.kind);
                        }
                    }

                    // 编辑器保存时可能先删除再创建文件，需要重新 watch
                    if replaced {
                        if let Err(e) = watcher.unwatch(&config_path) {
                            error!("Failed to unwatch config file (ignored): {:?}", e);
                        }
                        if let Err(e) = watcher.watch(&config_path, RecursiveMode::NonRecursive) {
                            error!("Failed to re-watch config file: {:?}", e);
                        }
                    }

                    callback(Settings::new(&config_path));
                }
                Ok(Err(e)) => error!("Watch error: {:?}", e),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watcher channel disconnected");
                    break;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
            }
        }

        if let Err(e) = watcher.unwatch(&config_path) {
            error!("Failed to unwatch config file: {:?}", e);
        }
    });

    Ok(stop_tx)
}
