use crate::error::ClientError;
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use walletlink_protocol::{
    AuthorizationResult, Capabilities, ClientFrame, Cluster, DappIdentity, PeerFrame,
    SignedPayloads, WalletRequest, WalletResponse,
};

/// Framed halves of an accepted, authenticated wallet connection.
pub(crate) struct Connection {
    pub(crate) reader: FramedRead<OwnedReadHalf, LinesCodec>,
    pub(crate) writer: FramedWrite<OwnedWriteHalf, LinesCodec>,
    next_id: u64,
}

impl Connection {
    pub(crate) fn new(
        reader: FramedRead<OwnedReadHalf, LinesCodec>,
        writer: FramedWrite<OwnedWriteHalf, LinesCodec>,
    ) -> Self {
        Self {
            reader,
            writer,
            next_id: 0,
        }
    }
}

/// Handle to the wallet on a ready session. Cheap to clone; calls are
/// serialized over the single underlying connection.
#[derive(Clone)]
pub struct WalletClient {
    conn: Arc<Mutex<Connection>>,
    failed: Arc<AtomicBool>,
    wallet_name: Option<Arc<str>>,
}

impl fmt::Debug for WalletClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletClient")
            .field("wallet_name", &self.wallet_name)
            .field("failed", &self.is_failed())
            .finish_non_exhaustive()
    }
}

impl WalletClient {
    pub(crate) fn new(conn: Connection, wallet_name: Option<String>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            failed: Arc::new(AtomicBool::new(false)),
            wallet_name: wallet_name.map(Arc::from),
        }
    }

    /// Name the wallet announced in its hello, if any.
    pub fn wallet_name(&self) -> Option<&str> {
        self.wallet_name.as_deref()
    }

    /// Whether a transport error has made the connection unusable.
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Send a call and wait for its reply. Replies to earlier, abandoned
    /// calls are skipped.
    pub async fn request(
        &self,
        request: WalletRequest,
    ) -> Result<Option<serde_json::Value>, ClientError> {
        let result = self.request_inner(request).await;
        if let Err(e) = &result
            && e.is_fatal()
        {
            self.failed.store(true, Ordering::SeqCst);
        }
        result
    }

    async fn request_inner(
        &self,
        request: WalletRequest,
    ) -> Result<Option<serde_json::Value>, ClientError> {
        if self.is_failed() {
            return Err(ClientError::Disconnected);
        }

        let mut conn = self.conn.lock().await;
        conn.next_id += 1;
        let id = conn.next_id;
        tracing::debug!(id, method = request.method(), "wallet call");

        let line = serde_json::to_string(&ClientFrame::Call { id, request })
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        conn.writer
            .send(line)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        loop {
            let Some(line) = conn.reader.next().await else {
                return Err(ClientError::Disconnected);
            };
            let line = line.map_err(|e| ClientError::Transport(e.to_string()))?;
            let frame: PeerFrame = serde_json::from_str(&line)
                .map_err(|e| ClientError::Protocol(format!("{e}: {line}")))?;
            match frame {
                PeerFrame::Reply { id: reply_id, response } if reply_id == id => {
                    return match response {
                        WalletResponse::Ok { data } => Ok(data),
                        WalletResponse::Error { code, message } => {
                            Err(ClientError::Wallet { code, message })
                        }
                    };
                }
                PeerFrame::Reply { id: stale, .. } => {
                    tracing::debug!(expected = id, got = stale, "skipping stale wallet reply");
                }
                PeerFrame::Hello { .. } => {
                    tracing::warn!("ignoring repeated wallet hello");
                }
            }
        }
    }

    pub async fn authorize(
        &self,
        identity: DappIdentity,
        cluster: Cluster,
    ) -> Result<AuthorizationResult, ClientError> {
        let data = self
            .request(WalletRequest::Authorize { identity, cluster })
            .await?;
        decode(data, "authorization")
    }

    pub async fn reauthorize(
        &self,
        identity: DappIdentity,
        auth_token: &str,
    ) -> Result<AuthorizationResult, ClientError> {
        let data = self
            .request(WalletRequest::Reauthorize {
                identity,
                auth_token: auth_token.to_string(),
            })
            .await?;
        decode(data, "authorization")
    }

    pub async fn deauthorize(&self, auth_token: &str) -> Result<(), ClientError> {
        self.request(WalletRequest::Deauthorize {
            auth_token: auth_token.to_string(),
        })
        .await?;
        Ok(())
    }

    pub async fn get_capabilities(&self) -> Result<Capabilities, ClientError> {
        let data = self.request(WalletRequest::GetCapabilities).await?;
        decode(data, "capabilities")
    }

    pub async fn sign_transactions(
        &self,
        payloads: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<u8>>, ClientError> {
        let data = self
            .request(WalletRequest::SignTransactions { payloads })
            .await?;
        let signed: SignedPayloads = decode(data, "signed transactions")?;
        Ok(signed.signed_payloads)
    }

    pub async fn sign_messages(
        &self,
        addresses: Vec<Vec<u8>>,
        payloads: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<u8>>, ClientError> {
        let data = self
            .request(WalletRequest::SignMessages {
                addresses,
                payloads,
            })
            .await?;
        let signed: SignedPayloads = decode(data, "signed messages")?;
        Ok(signed.signed_payloads)
    }

    /// Tell the wallet we are done and wait for it to hang up.
    pub(crate) async fn shutdown(&self) -> Result<(), ClientError> {
        let mut conn = self.conn.lock().await;
        if !self.is_failed() {
            let line = serde_json::to_string(&ClientFrame::Close)
                .map_err(|e| ClientError::Protocol(e.to_string()))?;
            conn.writer
                .send(line)
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
        }
        SinkExt::<String>::close(&mut conn.writer)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        // Drain until EOF so the wallet sees an orderly shutdown.
        while let Some(line) = conn.reader.next().await {
            if line.is_err() {
                break;
            }
        }
        self.failed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(
    data: Option<serde_json::Value>,
    what: &'static str,
) -> Result<T, ClientError> {
    let data = data.ok_or(ClientError::MissingPayload(what))?;
    serde_json::from_value(data).map_err(|e| ClientError::Protocol(format!("{what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};
    use walletlink_protocol::MAX_LINE_BYTES;

    async fn connected_pair() -> (WalletClient, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let wallet = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let (r, w) = stream.into_split();
        let conn = Connection::new(
            FramedRead::new(r, LinesCodec::new_with_max_length(MAX_LINE_BYTES)),
            FramedWrite::new(w, LinesCodec::new_with_max_length(MAX_LINE_BYTES)),
        );
        (WalletClient::new(conn, Some("test wallet".to_string())), wallet)
    }

    fn framed(
        stream: TcpStream,
    ) -> (
        FramedRead<OwnedReadHalf, LinesCodec>,
        FramedWrite<OwnedWriteHalf, LinesCodec>,
    ) {
        let (r, w) = stream.into_split();
        (
            FramedRead::new(r, LinesCodec::new()),
            FramedWrite::new(w, LinesCodec::new()),
        )
    }

    async fn reply(
        writer: &mut FramedWrite<OwnedWriteHalf, LinesCodec>,
        id: u64,
        response: WalletResponse,
    ) {
        let line = serde_json::to_string(&PeerFrame::Reply { id, response }).unwrap();
        writer.send(line).await.unwrap();
    }

    #[tokio::test]
    async fn request_matches_reply_by_id() {
        let (client, wallet) = connected_pair().await;
        let (mut reader, mut writer) = framed(wallet);

        let server = tokio::spawn(async move {
            let line = reader.next().await.unwrap().unwrap();
            let frame: ClientFrame = serde_json::from_str(&line).unwrap();
            let ClientFrame::Call { id, request } = frame else {
                panic!("expected call");
            };
            assert_eq!(request.method(), "get_capabilities");
            // A stale reply first, then the real one.
            reply(&mut writer, id + 100, WalletResponse::ok(None)).await;
            let caps = Capabilities {
                supports_clone_authorization: false,
                supports_sign_and_send_transactions: true,
                max_transactions_per_request: Some(10),
                max_messages_per_request: Some(1),
            };
            reply(
                &mut writer,
                id,
                WalletResponse::ok(Some(serde_json::to_value(&caps).unwrap())),
            )
            .await;
        });

        let caps = client.get_capabilities().await.unwrap();
        assert_eq!(caps.max_transactions_per_request, Some(10));
        assert_eq!(client.wallet_name(), Some("test wallet"));
        assert!(!client.is_failed());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn wallet_error_keeps_connection_usable() {
        let (client, wallet) = connected_pair().await;
        let (mut reader, mut writer) = framed(wallet);

        let server = tokio::spawn(async move {
            let line = reader.next().await.unwrap().unwrap();
            let ClientFrame::Call { id, .. } = serde_json::from_str(&line).unwrap() else {
                panic!("expected call");
            };
            reply(
                &mut writer,
                id,
                WalletResponse::error("declined", "user declined"),
            )
            .await;
        });

        let err = client.deauthorize("tok").await.unwrap_err();
        assert!(matches!(err, ClientError::Wallet { ref code, .. } if code == "declined"));
        assert!(!client.is_failed());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_marks_client_failed() {
        let (client, wallet) = connected_pair().await;
        drop(wallet);

        let err = client.get_capabilities().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(client.is_failed());
        assert!(matches!(
            client.get_capabilities().await,
            Err(ClientError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn missing_payload_is_reported() {
        let (client, wallet) = connected_pair().await;
        let (mut reader, mut writer) = framed(wallet);

        let server = tokio::spawn(async move {
            let line = reader.next().await.unwrap().unwrap();
            let ClientFrame::Call { id, .. } = serde_json::from_str(&line).unwrap() else {
                panic!("expected call");
            };
            reply(&mut writer, id, WalletResponse::ok(None)).await;
        });

        let err = client
            .authorize(
                DappIdentity {
                    uri: None,
                    icon: None,
                    name: Some("test".to_string()),
                },
                Cluster::Devnet,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MissingPayload("authorization")));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_sends_close_and_waits_for_eof() {
        let (client, wallet) = connected_pair().await;
        let (mut reader, writer) = framed(wallet);

        let server = tokio::spawn(async move {
            let line = reader.next().await.unwrap().unwrap();
            let frame: ClientFrame = serde_json::from_str(&line).unwrap();
            assert!(matches!(frame, ClientFrame::Close));
            drop(writer);
        });

        client.shutdown().await.unwrap();
        assert!(client.is_failed());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_after_disconnect_still_returns() {
        let (client, wallet) = connected_pair().await;
        drop(wallet);
        assert!(client.request(WalletRequest::GetCapabilities).await.is_err());
        assert!(client.is_failed());

        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), client.shutdown())
            .await
            .unwrap();
        assert!(client.is_failed());
    }

    #[tokio::test]
    async fn debug_shows_name_and_health_only() {
        let (client, _wallet) = connected_pair().await;
        let shown = format!("{client:?}");
        assert!(shown.contains("test wallet"));
        assert!(shown.contains("failed: false"));
        assert!(!shown.contains("conn"));
    }
}
