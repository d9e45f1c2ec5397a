//! Wallet side of a local association.

use crate::error::PeerError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use walletlink_protocol::{
    AssociationUri, ClientFrame, MAX_LINE_BYTES, PROTOCOL_VERSION, PeerFrame, WalletRequest,
    WalletResponse,
};

/// Answers the dapp's calls.
#[async_trait]
pub trait WalletHandler: Send {
    async fn handle(&mut self, request: WalletRequest) -> WalletResponse;
}

/// Connect retries. The dapp may still be binding its port when the wallet
/// is launched.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn normalized_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let capped = attempt.min(31);
        let mult = 1u64 << capped.saturating_sub(1);
        let millis = self.base_delay.as_millis() as u64;
        Duration::from_millis(
            millis
                .saturating_mul(mult)
                .min(self.max_delay.as_millis() as u64),
        )
    }
}

pub struct WalletPeer {
    association: AssociationUri,
    wallet_name: Option<String>,
    retry: RetryPolicy,
}

impl WalletPeer {
    pub fn new(association: AssociationUri) -> Self {
        Self {
            association,
            wallet_name: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn wallet_name(mut self, name: impl Into<String>) -> Self {
        self.wallet_name = Some(name.into());
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Connect to the dapp's loopback port and send `Hello`.
    pub async fn connect(&self) -> Result<PeerConnection, PeerError> {
        let port = self.association.port;
        let attempts = self.retry.normalized_attempts();
        let mut attempt = 1;
        let stream = loop {
            match TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await {
                Ok(stream) => break stream,
                Err(source) if attempt >= attempts => {
                    return Err(PeerError::Connect {
                        port,
                        attempts,
                        source,
                    });
                }
                Err(e) => {
                    tracing::debug!(port, attempt, err = %e, "dapp not listening yet");
                    tokio::time::sleep(self.retry.backoff_delay(attempt)).await;
                    attempt += 1;
                }
            }
        };

        let (r, w) = stream.into_split();
        let reader = FramedRead::new(r, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
        let mut writer = FramedWrite::new(w, LinesCodec::new_with_max_length(MAX_LINE_BYTES));

        let hello = PeerFrame::Hello {
            association: self.association.association.clone(),
            wallet_name: self.wallet_name.clone(),
            version: PROTOCOL_VERSION,
        };
        let line = serde_json::to_string(&hello).map_err(|e| PeerError::Protocol(e.to_string()))?;
        writer
            .send(line)
            .await
            .map_err(|e| PeerError::Transport(e.to_string()))?;
        tracing::info!(port, "connected to dapp");

        Ok(PeerConnection { reader, writer })
    }

    /// Connect and serve until the dapp closes the association.
    pub async fn run<H: WalletHandler>(&self, handler: &mut H) -> Result<u64, PeerError> {
        self.connect().await?.serve(handler).await
    }
}

/// An authenticated association, from the wallet's side.
pub struct PeerConnection {
    reader: FramedRead<OwnedReadHalf, LinesCodec>,
    writer: FramedWrite<OwnedWriteHalf, LinesCodec>,
}

impl PeerConnection {
    /// Answer calls until `Close` or EOF. Returns the number of calls served.
    pub async fn serve<H: WalletHandler>(mut self, handler: &mut H) -> Result<u64, PeerError> {
        let mut served = 0;
        while let Some(line) = self.reader.next().await {
            let line = line.map_err(|e| PeerError::Transport(e.to_string()))?;
            let frame: ClientFrame = serde_json::from_str(&line)
                .map_err(|e| PeerError::Protocol(format!("{e}: {line}")))?;
            match frame {
                ClientFrame::Call { id, request } => {
                    tracing::debug!(id, method = request.method(), "dapp call");
                    let response = handler.handle(request).await;
                    let reply = serde_json::to_string(&PeerFrame::Reply { id, response })
                        .map_err(|e| PeerError::Protocol(e.to_string()))?;
                    self.writer
                        .send(reply)
                        .await
                        .map_err(|e| PeerError::Transport(e.to_string()))?;
                    served += 1;
                }
                ClientFrame::Close => {
                    tracing::debug!("dapp closed association");
                    break;
                }
            }
        }
        Ok(served)
    }
}
