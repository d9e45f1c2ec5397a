use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;
use url::Url;
use walletlink_protocol::AssociationUri;
use walletlink_protocol::uri::UriPrefix;
use zeroize::Zeroizing;

/// Length of the association token in bytes.
pub const TOKEN_LEN: usize = 32;

/// Dynamic/private port range the listening endpoint is drawn from.
pub const PORT_RANGE: RangeInclusive<u16> = 49152..=65535;

/// Shared secret binding the wallet's connection to this association.
#[derive(Clone)]
pub struct AssociationToken(Zeroizing<[u8; TOKEN_LEN]>);

impl AssociationToken {
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; TOKEN_LEN]);
        OsRng.fill_bytes(&mut bytes[..]);
        Self(bytes)
    }

    /// The form carried in the association URI and echoed back in `Hello`.
    pub fn encoded(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0[..])
    }

    /// Constant-time comparison against a token presented by a wallet.
    pub fn matches_encoded(&self, presented: &str) -> bool {
        let Ok(bytes) = URL_SAFE_NO_PAD.decode(presented) else {
            return false;
        };
        if bytes.len() != TOKEN_LEN {
            return false;
        }
        bytes
            .iter()
            .zip(self.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for AssociationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AssociationToken(<redacted>)")
    }
}

/// Everything needed to start one local association. Built fresh for every
/// orchestration attempt and dropped with the session.
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    port: u16,
    token: AssociationToken,
    uri_prefix: Option<UriPrefix>,
    client_timeout: Duration,
}

impl SessionDescriptor {
    /// `client_timeout` bounds how long the session listens for the wallet.
    pub fn build(client_timeout: Duration, uri_prefix: Option<UriPrefix>) -> Self {
        Self {
            port: OsRng.gen_range(PORT_RANGE),
            token: AssociationToken::generate(),
            uri_prefix,
            client_timeout,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn token(&self) -> &AssociationToken {
        &self.token
    }

    pub fn uri_prefix(&self) -> Option<&UriPrefix> {
        self.uri_prefix.as_ref()
    }

    pub fn client_timeout(&self) -> Duration {
        self.client_timeout
    }

    /// The request handed to the peer-launch bridge.
    pub fn launch_request(&self) -> LaunchRequest {
        let association = AssociationUri {
            prefix: self.uri_prefix.clone(),
            port: self.port,
            association: self.token.encoded(),
        };
        LaunchRequest {
            uri: association.to_url(),
            association,
        }
    }
}

/// An externally dispatchable "open the wallet" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub uri: Url,
    pub association: AssociationUri,
}

impl LaunchRequest {
    pub fn port(&self) -> u16 {
        self.association.port
    }
}
