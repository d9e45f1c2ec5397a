use std::time::Duration;

/// Maximum time to wait for the launch bridge to acknowledge the association request.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Backup bound on `Session::start`; the session's own client timeout is shorter.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_millis(60_000);
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_CANCEL_AFTER_PEER_UI_CLOSED: Duration = Duration::from_millis(5_000);
/// How long a started session listens for the wallet to connect.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_millis(90_000);

/// Every independently enforced bound of one orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub ready: Duration,
    pub start: Duration,
    pub close: Duration,
    pub cancel_after_peer_ui_closed: Duration,
    pub client: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            ready: DEFAULT_READY_TIMEOUT,
            start: DEFAULT_START_TIMEOUT,
            close: DEFAULT_CLOSE_TIMEOUT,
            cancel_after_peer_ui_closed: DEFAULT_CANCEL_AFTER_PEER_UI_CLOSED,
            client: DEFAULT_CLIENT_TIMEOUT,
        }
    }
}
