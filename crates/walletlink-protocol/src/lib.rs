pub mod uri;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

pub use uri::{AssociationUri, UriError};

/// Version advertised by both ends in the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum size of a JSON-lines frame on the association socket (64 KiB).
pub const MAX_LINE_BYTES: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Typed enums for wire format safety
// ---------------------------------------------------------------------------

/// Which cluster the dapp wants the wallet to operate against.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cluster {
    #[default]
    Devnet,
    Testnet,
    MainnetBeta,
}

impl FromStr for Cluster {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "devnet" => Ok(Cluster::Devnet),
            "testnet" => Ok(Cluster::Testnet),
            "mainnet-beta" => Ok(Cluster::MainnetBeta),
            other => Err(format!("unknown cluster: {other}")),
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cluster::Devnet => write!(f, "devnet"),
            Cluster::Testnet => write!(f, "testnet"),
            Cluster::MainnetBeta => write!(f, "mainnet-beta"),
        }
    }
}

/// How the dapp presents itself in the wallet's approval UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DappIdentity {
    pub uri: Option<Url>,
    /// Relative to `uri`.
    pub icon: Option<String>,
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// A frame sent by the wallet to the dapp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerFrame {
    /// First frame on every connection. `association` must echo the token
    /// carried in the association URI.
    Hello {
        association: String,
        #[serde(default)]
        wallet_name: Option<String>,
        version: u32,
    },
    /// Reply to the `Call` with the same id.
    Reply { id: u64, response: WalletResponse },
}

/// A frame sent by the dapp to the wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Call { id: u64, request: WalletRequest },
    /// The dapp is done; the wallet should drop the connection.
    Close,
}

// ---------------------------------------------------------------------------
// Wallet RPC call shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum WalletRequest {
    Authorize {
        identity: DappIdentity,
        cluster: Cluster,
    },
    Reauthorize {
        identity: DappIdentity,
        auth_token: String,
    },
    Deauthorize {
        auth_token: String,
    },
    GetCapabilities,
    SignTransactions {
        #[serde(with = "base64_vec")]
        payloads: Vec<Vec<u8>>,
    },
    SignMessages {
        #[serde(with = "base64_vec")]
        addresses: Vec<Vec<u8>>,
        #[serde(with = "base64_vec")]
        payloads: Vec<Vec<u8>>,
    },
}

impl WalletRequest {
    /// Method name, for logging.
    pub fn method(&self) -> &'static str {
        match self {
            WalletRequest::Authorize { .. } => "authorize",
            WalletRequest::Reauthorize { .. } => "reauthorize",
            WalletRequest::Deauthorize { .. } => "deauthorize",
            WalletRequest::GetCapabilities => "get_capabilities",
            WalletRequest::SignTransactions { .. } => "sign_transactions",
            WalletRequest::SignMessages { .. } => "sign_messages",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WalletResponse {
    Ok {
        #[serde(default)]
        data: Option<serde_json::Value>,
    },
    Error {
        code: String,
        message: String,
    },
}

impl WalletResponse {
    pub fn ok(data: Option<serde_json::Value>) -> Self {
        WalletResponse::Ok { data }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        WalletResponse::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Data types returned in Ok.data
// ---------------------------------------------------------------------------

/// Result of `Authorize` and `Reauthorize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    pub auth_token: String,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_uri_base: Option<Url>,
}

/// Result of `GetCapabilities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_clone_authorization: bool,
    pub supports_sign_and_send_transactions: bool,
    pub max_transactions_per_request: Option<u32>,
    pub max_messages_per_request: Option<u32>,
}

/// Result of `SignTransactions` and `SignMessages`, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPayloads {
    #[serde(with = "base64_vec")]
    pub signed_payloads: Vec<Vec<u8>>,
}

pub mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

mod base64_vec {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&STANDARD.encode(item))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(d)?;
        encoded
            .iter()
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}
