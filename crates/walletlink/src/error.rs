use crate::session::SessionState;
use std::time::Duration;
use thiserror::Error;

/// Why `Session::start` did not produce a connected client.
#[derive(Debug, Error)]
pub enum StartError {
    /// The orchestration that owns the session was cancelled while waiting.
    #[error("interrupted while waiting for the wallet to connect")]
    Interrupted,
    #[error("timed out after {}ms waiting for the wallet to connect", after.as_millis())]
    TimedOut { after: Duration },
    #[error("failed establishing local association: {0}")]
    TransportFailure(#[source] HandshakeError),
    /// The session itself aborted the connect before it completed.
    #[error("local association was cancelled before the wallet connected")]
    Cancelled,
}

impl StartError {
    pub fn kind(&self) -> StartErrorKind {
        match self {
            StartError::Interrupted => StartErrorKind::Interrupted,
            StartError::TimedOut { .. } => StartErrorKind::TimedOut,
            StartError::TransportFailure(_) => StartErrorKind::TransportFailure,
            StartError::Cancelled => StartErrorKind::Cancelled,
        }
    }
}

/// Payload-free discriminant of [`StartError`], carried on the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartErrorKind {
    Interrupted,
    TimedOut,
    TransportFailure,
    Cancelled,
}

/// Failures of the listening side of a session before it becomes ready.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("failed to listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),
    #[error("no wallet connected within {}ms", waited.as_millis())]
    NoPeer { waited: Duration },
    #[error("wallet presented the wrong association token")]
    BadToken,
    #[error("protocol mismatch: wallet={got} expected={expected}")]
    VersionMismatch { expected: u32, got: u32 },
    #[error("expected wallet hello, got {0}")]
    UnexpectedFrame(String),
    #[error("wallet disconnected during handshake")]
    Disconnected,
    #[error("socket read failed: {0}")]
    Codec(String),
    #[error("session aborted")]
    Aborted,
    #[error("connect task failed: {0}")]
    TaskFailed(String),
    #[error("session cannot start from state {0:?}")]
    InvalidState(SessionState),
}

/// Why the peer-launch bridge could not dispatch the association request.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Nothing is registered to handle the association URI.
    #[error("no wallet endpoint found for {uri}")]
    PeerNotFound { uri: String },
    #[error("failed to launch wallet: {0}")]
    Failed(String),
}

/// Errors from a single wallet call over a connected session.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("wallet disconnected")]
    Disconnected,
    #[error("socket write failed: {0}")]
    Transport(String),
    #[error("invalid frame from wallet: {0}")]
    Protocol(String),
    #[error("wallet returned {code}: {message}")]
    Wallet { code: String, message: String },
    #[error("missing {0} payload in wallet reply")]
    MissingPayload(&'static str),
}

impl ClientError {
    /// Whether the connection is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ClientError::Wallet { .. } | ClientError::MissingPayload(_)
        )
    }
}

/// Errors on the wallet side of an association.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("failed to connect to 127.0.0.1:{port} after {attempts} attempts: {source}")]
    Connect {
        port: u16,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("socket failed: {0}")]
    Transport(String),
    #[error("invalid frame from dapp: {0}")]
    Protocol(String),
}

/// Returned by the gate after it has been shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("single-flight gate is closed")]
pub struct GateClosed;
