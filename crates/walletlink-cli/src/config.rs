use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use walletlink::SessionTimeouts;
use walletlink::config::{
    DEFAULT_CANCEL_AFTER_PEER_UI_CLOSED, DEFAULT_CLIENT_TIMEOUT, DEFAULT_CLOSE_TIMEOUT,
    DEFAULT_READY_TIMEOUT, DEFAULT_START_TIMEOUT,
};
use walletlink_protocol::{Cluster, DappIdentity};

/// Executable expected to handle association URIs when none is configured.
pub const DEFAULT_WALLET_CMD: &str = "walletlink-wallet";
pub const DEFAULT_INSTALL_URL: &str = "https://solanamobile.com/wallets";

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Program and leading arguments; the association URI is appended.
    pub wallet_cmd: String,
    pub cluster: Cluster,
    pub state_dir: Option<PathBuf>,
    /// Shown with the "no wallet found" notice.
    pub install_url: String,
    pub identity: IdentityConfig,
    pub ready_timeout_ms: u64,
    pub start_timeout_ms: u64,
    pub close_timeout_ms: u64,
    pub cancel_after_peer_ui_closed_ms: u64,
    pub client_timeout_ms: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct IdentityConfig {
    pub name: String,
    pub uri: Option<Url>,
    pub icon: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "walletlink".to_string(),
            uri: None,
            icon: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wallet_cmd: DEFAULT_WALLET_CMD.to_string(),
            cluster: Cluster::default(),
            state_dir: None,
            install_url: DEFAULT_INSTALL_URL.to_string(),
            identity: IdentityConfig::default(),
            ready_timeout_ms: millis(DEFAULT_READY_TIMEOUT),
            start_timeout_ms: millis(DEFAULT_START_TIMEOUT),
            close_timeout_ms: millis(DEFAULT_CLOSE_TIMEOUT),
            cancel_after_peer_ui_closed_ms: millis(DEFAULT_CANCEL_AFTER_PEER_UI_CLOSED),
            client_timeout_ms: millis(DEFAULT_CLIENT_TIMEOUT),
        }
    }
}

impl Config {
    /// Load `explicit` if given (it must exist), otherwise the default
    /// location, falling back to defaults when that file is absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::config_path(), false),
        };
        if !path.exists() {
            if required {
                anyhow::bail!("config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn config_path() -> PathBuf {
        dirs_path().join("config.toml")
    }

    pub fn timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            ready: Duration::from_millis(self.ready_timeout_ms),
            start: Duration::from_millis(self.start_timeout_ms),
            close: Duration::from_millis(self.close_timeout_ms),
            cancel_after_peer_ui_closed: Duration::from_millis(self.cancel_after_peer_ui_closed_ms),
            client: Duration::from_millis(self.client_timeout_ms),
        }
    }

    pub fn dapp_identity(&self) -> DappIdentity {
        DappIdentity {
            uri: self.identity.uri.clone(),
            icon: self.identity.icon.clone(),
            name: Some(self.identity.name.clone()),
        }
    }
}

fn dirs_path() -> PathBuf {
    if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(config_dir).join("walletlink")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("walletlink")
    } else {
        PathBuf::from("/tmp/walletlink")
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}
