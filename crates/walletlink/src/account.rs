use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use walletlink_protocol::uri::UriPrefix;
use walletlink_protocol::{AuthorizationResult, Cluster, base64_bytes};

/// What a successful authorize exchange leaves behind. Immutable: a later
/// exchange that refreshes it produces a new value instead of mutating
/// shared state.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub auth_token: String,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_uri_base: Option<Url>,
    pub cluster: Cluster,
}

impl Authorization {
    pub fn new(result: AuthorizationResult, cluster: Cluster) -> Self {
        Self {
            auth_token: result.auth_token,
            public_key: result.public_key,
            account_label: result.account_label,
            wallet_uri_base: result.wallet_uri_base,
            cluster,
        }
    }

    /// Apply a reauthorize result. Fields the wallet omitted carry over.
    pub fn refresh(&self, result: AuthorizationResult) -> Self {
        Self {
            auth_token: result.auth_token,
            public_key: result.public_key,
            account_label: result.account_label.or_else(|| self.account_label.clone()),
            wallet_uri_base: result
                .wallet_uri_base
                .or_else(|| self.wallet_uri_base.clone()),
            cluster: self.cluster,
        }
    }

    /// Prefix for the next association URI, so the same wallet is targeted.
    pub fn uri_prefix(&self) -> Option<UriPrefix> {
        let base = self.wallet_uri_base.clone()?;
        match UriPrefix::try_from(base) {
            Ok(prefix) => Some(prefix),
            Err(e) => {
                tracing::warn!(err = %e, "ignoring unusable wallet uri base");
                None
            }
        }
    }
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorization")
            .field("auth_token", &"<redacted>")
            .field("public_key_len", &self.public_key.len())
            .field("account_label", &self.account_label)
            .field("wallet_uri_base", &self.wallet_uri_base)
            .field("cluster", &self.cluster)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(token: &str, base: Option<&str>) -> AuthorizationResult {
        AuthorizationResult {
            auth_token: token.to_string(),
            public_key: vec![7; 32],
            account_label: Some("main".to_string()),
            wallet_uri_base: base.map(|b| Url::parse(b).unwrap()),
        }
    }

    #[test]
    fn refresh_keeps_omitted_fields() {
        let auth = Authorization::new(
            result("one", Some("https://wallet.example.com/")),
            Cluster::Testnet,
        );
        let mut next = result("two", None);
        next.account_label = None;

        let refreshed = auth.refresh(next);
        assert_eq!(refreshed.auth_token, "two");
        assert_eq!(refreshed.account_label.as_deref(), Some("main"));
        assert_eq!(refreshed.wallet_uri_base, auth.wallet_uri_base);
        assert_eq!(refreshed.cluster, Cluster::Testnet);
        assert_eq!(auth.auth_token, "one");
    }

    #[test]
    fn uri_prefix_from_wallet_base() {
        let auth = Authorization::new(
            result("t", Some("https://wallet.example.com/mwa/")),
            Cluster::Devnet,
        );
        let prefix = auth.uri_prefix().unwrap();
        assert_eq!(prefix.as_url().as_str(), "https://wallet.example.com/mwa/");

        let opaque = Authorization::new(result("t", Some("mailto:x@example.com")), Cluster::Devnet);
        assert!(opaque.uri_prefix().is_none());
        let none = Authorization::new(result("t", None), Cluster::Devnet);
        assert!(none.uri_prefix().is_none());
    }

    #[test]
    fn debug_hides_token() {
        let auth = Authorization::new(result("secret-token", None), Cluster::Devnet);
        assert!(!format!("{auth:?}").contains("secret-token"));
    }

    #[test]
    fn serde_shape() {
        let auth = Authorization::new(result("t", None), Cluster::MainnetBeta);
        let json = serde_json::to_value(&auth).unwrap();
        assert_eq!(json["cluster"], "mainnet-beta");
        assert!(json.get("wallet_uri_base").is_none());
        let back: Authorization = serde_json::from_value(json).unwrap();
        assert_eq!(back, auth);
    }
}
