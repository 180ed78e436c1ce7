use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{config::NotificationConfig, error::Result};

/// 推送消息内容，字段均可省略
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationButton {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationData {
    /// 毫秒时间戳
    pub date_of_arrival: i64,
    pub primary_key: u32,
}

/// 展示给用户的通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationButton>,
}

impl Notification {
    /// 由推送内容生成通知，空字段使用默认值
    pub fn from_push(payload: &PushPayload, defaults: &NotificationConfig) -> Self {
        let pick = |value: &Option<String>, default: &str| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        Self {
            title: pick(&payload.title, &defaults.title),
            body: pick(&payload.body, &defaults.body),
            icon: defaults.icon.clone(),
            badge: defaults.badge.clone(),
            vibrate: defaults.vibrate.clone(),
            data: NotificationData {
                date_of_arrival: chrono::Utc::now().timestamp_millis(),
                primary_key: 1,
            },
            actions: vec![
                NotificationButton {
                    action: NotificationAction::VIEW.to_string(),
                    title: "View Meme".to_string(),
                },
                NotificationButton {
                    action: NotificationAction::CLOSE.to_string(),
                    title: "Close".to_string(),
                },
            ],
        }
    }
}

/// 用户点击通知时选择的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationAction {
    View,
    Close,
    /// 点击通知本体或未知按钮
    Other(Option<String>),
}

impl NotificationAction {
    pub const VIEW: &'static str = "view";
    pub const CLOSE: &'static str = "close";

    pub fn parse(action: Option<&str>) -> Self {
        match action {
            Some(Self::VIEW) => Self::View,
            Some(Self::CLOSE) => Self::Close,
            other => Self::Other(other.map(str::to_string)),
        }
    }
}

/// 通知和窗口由宿主负责展示
#[async_trait]
pub trait ClientHost: Send + Sync {
    async fn show_notification(&self, notification: &Notification) -> Result<()>;

    /// 打开或聚焦应用窗口
    async fn open_window(&self, url: &str) -> Result<()>;
}

/// 没有界面时只记录日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHost;

#[async_trait]
impl ClientHost for LoggingHost {
    async fn show_notification(&self, notification: &Notification) -> Result<()> {
        info!(
            "Notification: {} - {}",
            notification.title, notification.body
        );
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        info!("Open window: {}", url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_defaults() {
        let defaults = NotificationConfig::default();
        let notification = Notification::from_push(&PushPayload::default(), &defaults);

        assert_eq!(notification.title, "Cat Memes");
        assert_eq!(notification.body, "New cat meme available!");
        assert_eq!(notification.icon, "/images/pwa-icon-192.png");
        assert_eq!(notification.badge, "/images/pwa-icon-128.png");
        assert_eq!(notification.vibrate, vec![100, 50, 100]);
        assert_eq!(notification.data.primary_key, 1);
        let actions = notification
            .actions
            .iter()
            .map(|a| a.action.as_str())
            .collect::<Vec<_>>();
        assert_eq!(actions, vec!["view", "close"]);
    }

    #[test]
    fn test_notification_from_payload() {
        let payload: PushPayload =
            serde_json::from_str(r#"{"title":"Caturday","body":"","extra":true}"#).unwrap();
        let notification = Notification::from_push(&payload, &NotificationConfig::default());

        assert_eq!(notification.title, "Caturday");
        // 空字符串同样使用默认值
        assert_eq!(notification.body, "New cat meme available!");
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(NotificationAction::parse(Some("view")), NotificationAction::View);
        assert_eq!(NotificationAction::parse(Some("close")), NotificationAction::Close);
        assert_eq!(
            NotificationAction::parse(Some("uninstall")),
            NotificationAction::Other(Some("uninstall".to_string()))
        );
        assert_eq!(NotificationAction::parse(None), NotificationAction::Other(None));
    }
}
