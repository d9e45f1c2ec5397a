//! Contract between the orchestrator and whatever brings the wallet to the
//! foreground (an OS intent, a child process, a test double).

use crate::descriptor::LaunchRequest;
use crate::error::LaunchError;
use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Asks the host environment to open the wallet for an association.
#[async_trait]
pub trait PeerLauncher: Send + Sync {
    /// Resolves once the request has been dispatched. Fails with
    /// [`LaunchError::PeerNotFound`] when nothing can handle the URI.
    ///
    /// `on_peer_ui_complete` should be fired when the wallet's UI flow ends;
    /// dropping it without firing means "never".
    async fn launch(
        &self,
        request: LaunchRequest,
        on_peer_ui_complete: PeerUiCompletion,
    ) -> Result<(), LaunchError>;
}

/// One-shot signal fired by the bridge when the wallet UI closes.
/// Consumed on use, so it fires at most once.
#[derive(Debug)]
pub struct PeerUiCompletion {
    tx: oneshot::Sender<Instant>,
}

impl PeerUiCompletion {
    pub fn complete(self) {
        let _ = self.tx.send(Instant::now());
    }
}

/// The orchestrator's side of an outstanding launch.
#[derive(Debug)]
pub struct PendingLaunch {
    rx: oneshot::Receiver<Instant>,
}

impl PendingLaunch {
    /// Resolves with the instant the wallet UI closed. Pends forever if the
    /// bridge dropped its [`PeerUiCompletion`] without firing it.
    pub async fn peer_ui_closed(self) -> Instant {
        match self.rx.await {
            Ok(at) => at,
            Err(_) => std::future::pending().await,
        }
    }
}

pub fn pending_launch() -> (PeerUiCompletion, PendingLaunch) {
    let (tx, rx) = oneshot::channel();
    (PeerUiCompletion { tx }, PendingLaunch { rx })
}
