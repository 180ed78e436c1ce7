use serde::Serialize;

use crate::error::{Error, Result};

/// 代理实例的生命周期状态
///
/// ```text
/// Installing --Installed--> Waiting --Activate--> Active --Supersede--> Superseded
///      |                       |
///  InstallFailed           Supersede
///      v                       v
///  Discarded               Discarded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyState {
    Installing,
    Waiting,
    Active,
    Superseded,
    /// 安装失败或在等待期间被更新的版本替换，永远不会再处理请求
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// 静态资源全部写入缓存
    Installed,
    InstallFailed,
    Activate,
    Supersede,
}

impl ProxyState {
    pub fn next(self, event: LifecycleEvent) -> Result<Self> {
        use LifecycleEvent::*;
        use ProxyState::*;

        let next = match (self, event) {
            (Installing, Installed) => Waiting,
            (Installing, InstallFailed) => Discarded,
            (Waiting, Activate) => Active,
            (Waiting, Supersede) => Discarded,
            (Active, Supersede) => Superseded,
            (from, event) => return Err(Error::InvalidTransition { from, event }),
        };
        Ok(next)
    }

    /// 只有 Active 状态的实例处理请求
    pub fn is_serving(self) -> bool {
        self == ProxyState::Active
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProxyState::Superseded | ProxyState::Discarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = ProxyState::Installing;
        let state = state.next(LifecycleEvent::Installed).unwrap();
        assert_eq!(state, ProxyState::Waiting);
        let state = state.next(LifecycleEvent::Activate).unwrap();
        assert_eq!(state, ProxyState::Active);
        assert!(state.is_serving());
        let state = state.next(LifecycleEvent::Supersede).unwrap();
        assert_eq!(state, ProxyState::Superseded);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_install_failure_discards() {
        let state = ProxyState::Installing
            .next(LifecycleEvent::InstallFailed)
            .unwrap();
        assert_eq!(state, ProxyState::Discarded);
        assert!(!state.is_serving());
    }

    #[test]
    fn test_waiting_replaced_by_newer_version() {
        let state = ProxyState::Waiting.next(LifecycleEvent::Supersede).unwrap();
        assert_eq!(state, ProxyState::Discarded);
    }

    #[test]
    fn test_invalid_transitions() {
        // 未安装完成不能激活
        assert!(matches!(
            ProxyState::Installing.next(LifecycleEvent::Activate),
            Err(Error::InvalidTransition {
                from: ProxyState::Installing,
                event: LifecycleEvent::Activate
            })
        ));
        assert!(ProxyState::Active.next(LifecycleEvent::Activate).is_err());
        assert!(ProxyState::Active.next(LifecycleEvent::Installed).is_err());
        assert!(ProxyState::Discarded.next(LifecycleEvent::Activate).is_err());
        assert!(ProxyState::Superseded.next(LifecycleEvent::Supersede).is_err());
    }
}
