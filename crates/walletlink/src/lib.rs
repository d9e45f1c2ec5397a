//! Single-flight local association sessions between a dapp and a wallet.
//!
//! An [`Orchestrator`] serializes every exchange behind one process-wide
//! permit: it launches the wallet through a [`PeerLauncher`], waits for the
//! wallet to connect to a loopback [`Session`], runs the caller's exchange
//! against a [`WalletClient`], and always closes the session before the next
//! caller may begin.

pub mod account;
pub mod client;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod gate;
pub mod launch;
pub mod orchestrator;
pub mod peer;
pub mod session;

pub use account::Authorization;
pub use client::WalletClient;
pub use config::SessionTimeouts;
pub use descriptor::{AssociationToken, LaunchRequest, SessionDescriptor};
pub use error::{
    ClientError, GateClosed, HandshakeError, LaunchError, PeerError, StartError, StartErrorKind,
};
pub use gate::{GatePermit, SingleFlightGate};
pub use launch::{PeerLauncher, PeerUiCompletion, PendingLaunch, pending_launch};
pub use orchestrator::{ExchangeResult, LinkEvent, Orchestrator};
pub use peer::{PeerConnection, RetryPolicy, WalletHandler, WalletPeer};
pub use session::{CloseOutcome, Session, SessionState};
