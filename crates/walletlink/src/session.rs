use crate::client::{Connection, WalletClient};
use crate::descriptor::{AssociationToken, SessionDescriptor};
use crate::error::{HandshakeError, StartError};
use futures_util::StreamExt;
use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use walletlink_protocol::{MAX_LINE_BYTES, PROTOCOL_VERSION, PeerFrame};

/// Lifecycle of one local association. Transitions only move forward,
/// except `Exchanging -> Ready` between calls and `Failed`, which any
/// non-terminal state may enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Starting,
    Ready,
    Exchanging,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    fn rank(self) -> u8 {
        match self {
            SessionState::Unstarted => 0,
            SessionState::Starting => 1,
            SessionState::Ready => 2,
            SessionState::Exchanging => 3,
            SessionState::Closing => 4,
            SessionState::Closed | SessionState::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, SessionState::Failed) => true,
            (SessionState::Exchanging, SessionState::Ready) => true,
            _ => next.rank() > self.rank(),
        }
    }
}

/// What `close` actually did. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    /// `close` had already run on this session.
    AlreadyClosed,
    /// The wallet did not acknowledge the shutdown within the close timeout.
    TimedOut,
}

/// One single-use local association: listen, accept the wallet, run one
/// exchange, close.
pub struct Session {
    descriptor: SessionDescriptor,
    state: SessionState,
    abort: CancellationToken,
    client: Option<WalletClient>,
    released: bool,
}

impl Session {
    pub fn new(descriptor: SessionDescriptor) -> Self {
        Self {
            descriptor,
            state: SessionState::Unstarted,
            abort: CancellationToken::new(),
            client: None,
            released: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn descriptor(&self) -> &SessionDescriptor {
        &self.descriptor
    }

    /// Token that aborts this session's own connect attempt. Cancelling it
    /// makes a pending `start` fail with [`StartError::Cancelled`].
    pub fn abort_handle(&self) -> CancellationToken {
        self.abort.clone()
    }

    fn transition(&mut self, next: SessionState) -> bool {
        if self.state.can_transition_to(next) {
            tracing::debug!(port = self.descriptor.port(), from = ?self.state, to = ?next, "session state");
            self.state = next;
            true
        } else {
            tracing::warn!(port = self.descriptor.port(), from = ?self.state, to = ?next, "refusing session state transition");
            false
        }
    }

    /// Listen for the wallet and complete the handshake.
    ///
    /// `interrupt` belongs to the caller; cancelling it yields
    /// [`StartError::Interrupted`]. `start_timeout` bounds the whole wait on
    /// top of the descriptor's own client timeout.
    pub async fn start(
        &mut self,
        interrupt: &CancellationToken,
        start_timeout: Duration,
    ) -> Result<WalletClient, StartError> {
        if self.state != SessionState::Unstarted {
            return Err(StartError::TransportFailure(HandshakeError::InvalidState(
                self.state,
            )));
        }
        self.transition(SessionState::Starting);

        let port = self.descriptor.port();
        let mut task = AbortOnDropHandle::new(tokio::spawn(accept_peer(
            port,
            self.descriptor.token().clone(),
            self.descriptor.client_timeout(),
            self.abort.clone(),
        )));

        let result = tokio::select! {
            biased;
            _ = interrupt.cancelled() => Err(StartError::Interrupted),
            res = tokio::time::timeout(start_timeout, &mut task) => match res {
                Err(_) => Err(StartError::TimedOut { after: start_timeout }),
                Ok(Err(join)) if join.is_cancelled() => Err(StartError::Cancelled),
                Ok(Err(join)) => Err(StartError::TransportFailure(HandshakeError::TaskFailed(
                    join.to_string(),
                ))),
                Ok(Ok(Err(HandshakeError::Aborted))) => Err(StartError::Cancelled),
                Ok(Ok(Err(e))) => Err(StartError::TransportFailure(e)),
                Ok(Ok(Ok((conn, wallet_name)))) => Ok(WalletClient::new(conn, wallet_name)),
            },
        };
        drop(task);

        match result {
            Ok(client) => {
                tracing::info!(port, wallet = client.wallet_name().unwrap_or("unknown"), "wallet connected");
                self.client = Some(client.clone());
                self.transition(SessionState::Ready);
                Ok(client)
            }
            Err(e) => {
                tracing::warn!(port, err = %e, "session start failed");
                self.transition(SessionState::Failed);
                Err(e)
            }
        }
    }

    /// Run the caller's exchange against the connected wallet. Returns `None`
    /// if the session is not ready or `interrupt` fires first.
    pub async fn run_exchange<T, F, Fut>(
        &mut self,
        interrupt: &CancellationToken,
        action: F,
    ) -> Option<T>
    where
        F: FnOnce(WalletClient) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let client = match (&self.client, self.state) {
            (Some(client), SessionState::Ready) => client.clone(),
            _ => {
                tracing::warn!(state = ?self.state, "exchange requested on a session that is not ready");
                return None;
            }
        };

        self.transition(SessionState::Exchanging);
        let result = tokio::select! {
            biased;
            _ = interrupt.cancelled() => {
                tracing::info!(port = self.descriptor.port(), "exchange interrupted");
                return None;
            }
            result = action(client.clone()) => result,
        };

        if client.is_failed() {
            self.transition(SessionState::Failed);
        } else {
            self.transition(SessionState::Ready);
        }
        result
    }

    /// Tear the session down, waiting at most `close_timeout` for the wallet
    /// to hang up. Safe to call more than once.
    pub async fn close(&mut self, close_timeout: Duration) -> CloseOutcome {
        if self.released {
            return CloseOutcome::AlreadyClosed;
        }
        self.released = true;
        self.abort.cancel();

        if !self.state.is_terminal() {
            self.transition(SessionState::Closing);
        }

        let mut outcome = CloseOutcome::Closed;
        if let Some(client) = self.client.take() {
            match tokio::time::timeout(close_timeout, client.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(err = %e, "wallet connection already gone"),
                Err(_) => {
                    tracing::warn!(
                        port = self.descriptor.port(),
                        timeout_ms = close_timeout.as_millis() as u64,
                        "timed out closing session"
                    );
                    outcome = CloseOutcome::TimedOut;
                }
            }
        }

        if self.state != SessionState::Failed {
            self.transition(SessionState::Closed);
        }
        outcome
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.abort.cancel();
    }
}

/// Accept connections on the loopback port until one presents the right
/// token, the client timeout passes, or `abort` fires. Handshakes run
/// concurrently so a connection that never says hello cannot hold up the
/// wallet behind it.
async fn accept_peer(
    port: u16,
    token: AssociationToken,
    client_timeout: Duration,
    abort: CancellationToken,
) -> Result<(Connection, Option<String>), HandshakeError> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
        .await
        .map_err(|source| HandshakeError::Bind { port, source })?;
    tracing::debug!(port, "listening for wallet");

    let deadline = Instant::now() + client_timeout;
    let mut handshakes = JoinSet::new();
    loop {
        tokio::select! {
            biased;
            _ = abort.cancelled() => return Err(HandshakeError::Aborted),
            _ = tokio::time::sleep_until(deadline) => {
                return Err(HandshakeError::NoPeer { waited: client_timeout });
            }
            Some(joined) = handshakes.join_next(), if !handshakes.is_empty() => match joined {
                Ok(Ok(accepted)) => return Ok(accepted),
                Ok(Err(e @ HandshakeError::VersionMismatch { .. })) => return Err(e),
                Ok(Err(e)) => tracing::warn!(port, err = %e, "rejected wallet connection"),
                Err(e) => tracing::warn!(port, err = %e, "wallet handshake task failed"),
            },
            accepted = listener.accept() => {
                let (stream, addr) = accepted.map_err(HandshakeError::Accept)?;
                tracing::debug!(port, %addr, "wallet connection accepted");
                handshakes.spawn(handshake(stream, token.clone()));
            }
        }
    }
}

async fn handshake(
    stream: TcpStream,
    token: AssociationToken,
) -> Result<(Connection, Option<String>), HandshakeError> {
    let (r, w) = stream.into_split();
    let mut reader = FramedRead::new(r, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    let writer = FramedWrite::new(w, LinesCodec::new_with_max_length(MAX_LINE_BYTES));

    let line = reader
        .next()
        .await
        .ok_or(HandshakeError::Disconnected)?
        .map_err(|e| HandshakeError::Codec(e.to_string()))?;
    let frame: PeerFrame = serde_json::from_str(&line)
        .map_err(|e| HandshakeError::UnexpectedFrame(e.to_string()))?;

    let PeerFrame::Hello {
        association,
        wallet_name,
        version,
    } = frame
    else {
        return Err(HandshakeError::UnexpectedFrame(line));
    };

    if !token.matches_encoded(&association) {
        return Err(HandshakeError::BadToken);
    }
    if version != PROTOCOL_VERSION {
        return Err(HandshakeError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            got: version,
        });
    }

    Ok((Connection::new(reader, writer), wallet_name))
}
