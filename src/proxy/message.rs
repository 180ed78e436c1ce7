use serde::{Deserialize, Serialize};

/// 应用页面发给代理的消息
///
/// ```json
/// { "type": "SKIP_WAITING" }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// 立即激活等待中的版本
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skip_waiting() {
        let message: Message = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(message, Message::SkipWaiting);
    }

    #[test]
    fn test_parse_unknown_message() {
        let message: Message =
            serde_json::from_str(r#"{"type":"CLEAR_CACHE","extra":1}"#).unwrap();
        assert_eq!(message, Message::Unknown);
    }

    #[test]
    fn test_missing_type_is_rejected() {
        assert!(serde_json::from_str::<Message>(r#"{"kind":"SKIP_WAITING"}"#).is_err());
    }
}
