use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use walletlink::WalletHandler;
use walletlink_protocol::{
    AuthorizationResult, Capabilities, SignedPayloads, WalletRequest, WalletResponse,
};

pub const MOCK_WALLET_NAME: &str = "walletlink mock wallet";
pub const MOCK_ACCOUNT_LABEL: &str = "Mock Account";

/// Approves everything (or declines authorization when asked to). Keys and
/// tokens are derived deterministically so separate runs agree.
pub struct MockWallet {
    public_key: [u8; 32],
    decline: bool,
}

impl MockWallet {
    pub fn new(decline: bool) -> Self {
        Self {
            public_key: Sha256::digest(MOCK_WALLET_NAME.as_bytes()).into(),
            decline,
        }
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    fn auth_token(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.public_key);
        hasher.update(b"auth-token");
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// The payload followed by a fake 32-byte signature over it.
    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.public_key);
        hasher.update(payload);
        let mut signed = payload.to_vec();
        signed.extend_from_slice(&hasher.finalize());
        signed
    }

    fn authorization(&self) -> WalletResponse {
        let result = AuthorizationResult {
            auth_token: self.auth_token(),
            public_key: self.public_key.to_vec(),
            account_label: Some(MOCK_ACCOUNT_LABEL.to_string()),
            wallet_uri_base: None,
        };
        to_response(&result)
    }

    fn check_token(&self, auth_token: &str) -> Option<WalletResponse> {
        (auth_token != self.auth_token())
            .then(|| WalletResponse::error("auth_token_invalid", "unknown auth token"))
    }
}

#[async_trait]
impl WalletHandler for MockWallet {
    async fn handle(&mut self, request: WalletRequest) -> WalletResponse {
        match request {
            WalletRequest::Authorize { identity, cluster } => {
                if self.decline {
                    return WalletResponse::error("authorization_declined", "user declined");
                }
                tracing::info!(dapp = identity.name.as_deref().unwrap_or("unknown"), %cluster, "approving dapp");
                self.authorization()
            }
            WalletRequest::Reauthorize { auth_token, .. } => self
                .check_token(&auth_token)
                .unwrap_or_else(|| self.authorization()),
            WalletRequest::Deauthorize { auth_token } => self
                .check_token(&auth_token)
                .unwrap_or_else(|| WalletResponse::ok(None)),
            WalletRequest::GetCapabilities => to_response(&Capabilities {
                supports_clone_authorization: false,
                supports_sign_and_send_transactions: false,
                max_transactions_per_request: Some(10),
                max_messages_per_request: Some(10),
            }),
            WalletRequest::SignTransactions { payloads } => to_response(&SignedPayloads {
                signed_payloads: payloads.iter().map(|p| self.sign(p)).collect(),
            }),
            WalletRequest::SignMessages {
                addresses,
                payloads,
            } => {
                if addresses.iter().any(|a| a.as_slice() != self.public_key.as_slice()) {
                    return WalletResponse::error("invalid_address", "address not held by this wallet");
                }
                to_response(&SignedPayloads {
                    signed_payloads: payloads.iter().map(|p| self.sign(p)).collect(),
                })
            }
        }
    }
}

fn to_response<T: serde::Serialize>(data: &T) -> WalletResponse {
    match serde_json::to_value(data) {
        Ok(value) => WalletResponse::ok(Some(value)),
        Err(e) => WalletResponse::error("internal", e.to_string()),
    }
}
