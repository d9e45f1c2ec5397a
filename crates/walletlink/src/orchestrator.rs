use crate::client::WalletClient;
use crate::config::SessionTimeouts;
use crate::descriptor::SessionDescriptor;
use crate::error::{LaunchError, StartErrorKind};
use crate::gate::SingleFlightGate;
use crate::launch::{PeerLauncher, pending_launch};
use crate::session::{CloseOutcome, Session};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use walletlink_protocol::uri::UriPrefix;

/// `Some` with the exchange's value, or `None` when setup failed, timed out,
/// or was cancelled. The reason is reported on the event stream.
pub type ExchangeResult<T> = Option<T>;

const EVENT_CAPACITY: usize = 64;

/// Progress and failure signals of an orchestration, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    GateAcquired,
    LaunchDispatched { port: u16 },
    /// Nothing could handle the association URI. User-actionable.
    PeerNotFound { uri: String },
    /// The launch bridge did not acknowledge within the ready timeout.
    ReadyTimedOut,
    LaunchFailed { message: String },
    PeerUiClosed,
    SessionStarting { port: u16 },
    SessionStarted { wallet_name: Option<String> },
    StartFailed(StartErrorKind),
    /// The grace period after the wallet UI closed ran out.
    ExchangeCancelled,
    SessionClosed(CloseOutcome),
    GateReleased,
}

struct Inner {
    gate: SingleFlightGate,
    timeouts: SessionTimeouts,
    events: broadcast::Sender<LinkEvent>,
}

/// Runs one wallet exchange at a time, from launch to teardown.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(timeouts: SessionTimeouts) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                gate: SingleFlightGate::new(),
                timeouts,
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.inner.events.subscribe()
    }

    /// Orchestrations currently holding the gate (0 or 1).
    pub fn in_flight(&self) -> usize {
        self.inner.gate.holders()
    }

    pub fn timeouts(&self) -> SessionTimeouts {
        self.inner.timeouts
    }

    /// Refuse further orchestrations. One already holding the gate finishes.
    pub fn shutdown(&self) {
        self.inner.gate.close();
    }

    fn emit(&self, event: LinkEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Launch the wallet, connect, run `action`, and tear down.
    ///
    /// Calls are serialized process-wide: a second caller waits until the
    /// first has closed its session. The session is closed and the gate
    /// released on every path; if the returned future is dropped midway the
    /// session is dropped first, which aborts its listener and connection.
    pub async fn with_session<T, F, Fut>(
        &self,
        launcher: &dyn PeerLauncher,
        uri_prefix: Option<UriPrefix>,
        action: F,
    ) -> ExchangeResult<T>
    where
        F: FnOnce(WalletClient) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let permit = match self.inner.gate.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::warn!(err = %e, "orchestrator is shut down");
                return None;
            }
        };
        self.emit(LinkEvent::GateAcquired);

        let result = self.run_locked(launcher, uri_prefix, action).await;

        permit.release();
        self.emit(LinkEvent::GateReleased);
        result
    }

    async fn run_locked<T, F, Fut>(
        &self,
        launcher: &dyn PeerLauncher,
        uri_prefix: Option<UriPrefix>,
        action: F,
    ) -> ExchangeResult<T>
    where
        F: FnOnce(WalletClient) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let timeouts = self.inner.timeouts;
        let descriptor = SessionDescriptor::build(timeouts.client, uri_prefix);
        let request = descriptor.launch_request();
        let port = request.port();
        let (completion, pending) = pending_launch();

        match bounded(timeouts.ready, launcher.launch(request, completion)).await {
            None => {
                tracing::info!(
                    port,
                    timeout_ms = timeouts.ready.as_millis() as u64,
                    "wallet launch was not acknowledged"
                );
                self.emit(LinkEvent::ReadyTimedOut);
                return None;
            }
            Some(Err(LaunchError::PeerNotFound { uri })) => {
                tracing::warn!(%uri, "no wallet found for association");
                self.emit(LinkEvent::PeerNotFound { uri });
                return None;
            }
            Some(Err(e)) => {
                tracing::warn!(err = %e, "wallet launch failed");
                self.emit(LinkEvent::LaunchFailed {
                    message: e.to_string(),
                });
                return None;
            }
            Some(Ok(())) => {
                tracing::debug!(port, "wallet launch dispatched");
                self.emit(LinkEvent::LaunchDispatched { port });
            }
        }

        let mut session = Session::new(descriptor);
        let interrupt = CancellationToken::new();

        let result = {
            let work = self.start_and_exchange(&mut session, &interrupt, action);
            let grace = async {
                let closed_at = pending.peer_ui_closed().await;
                self.emit(LinkEvent::PeerUiClosed);
                tokio::time::sleep_until(closed_at + timeouts.cancel_after_peer_ui_closed).await;
            };
            tokio::pin!(work, grace);

            tokio::select! {
                biased;
                result = &mut work => result,
                () = &mut grace => {
                    tracing::info!(port, "wallet closed without finishing, cancelling session");
                    self.emit(LinkEvent::ExchangeCancelled);
                    interrupt.cancel();
                    work.await
                }
            }
        };

        let outcome = session.close(timeouts.close).await;
        self.emit(LinkEvent::SessionClosed(outcome));
        result
    }

    async fn start_and_exchange<T, F, Fut>(
        &self,
        session: &mut Session,
        interrupt: &CancellationToken,
        action: F,
    ) -> Option<T>
    where
        F: FnOnce(WalletClient) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        self.emit(LinkEvent::SessionStarting {
            port: session.descriptor().port(),
        });
        match session.start(interrupt, self.inner.timeouts.start).await {
            Ok(client) => self.emit(LinkEvent::SessionStarted {
                wallet_name: client.wallet_name().map(str::to_string),
            }),
            Err(e) => {
                self.emit(LinkEvent::StartFailed(e.kind()));
                return None;
            }
        }
        session.run_exchange(interrupt, action).await
    }
}

/// `timeout` that treats a zero budget as already expired, without polling
/// the future even once.
async fn bounded<F: Future>(budget: Duration, fut: F) -> Option<F::Output> {
    if budget.is_zero() {
        return None;
    }
    tokio::time::timeout(budget, fut).await.ok()
}
