use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walletlink::Authorization;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

const DEFAULT_STATE_DIR: &str = ".local/state/walletlink";
const AUTHORIZATION_FILE: &str = "authorization.json";

/// Priority: `$WALLETLINK_STATE_DIR`, then `~/.local/state/walletlink`.
pub fn default_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WALLETLINK_STATE_DIR") {
        return PathBuf::from(dir);
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(DEFAULT_STATE_DIR),
        Err(_) => {
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/walletlink-{uid}"))
        }
    }
}

/// The stored authorization of this dapp with its wallet.
pub struct AccountStore {
    dir: PathBuf,
}

impl AccountStore {
    /// Create the directory (mode `0700`) if needed.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create state dir {}", dir.display()))?;
        }
        #[cfg(unix)]
        {
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
                .with_context(|| format!("failed to set state dir permissions {}", dir.display()))?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path(&self) -> PathBuf {
        self.dir.join(AUTHORIZATION_FILE)
    }

    pub fn load(&self) -> Result<Option<Authorization>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let auth = serde_json::from_str(&contents)
            .with_context(|| format!("corrupt authorization in {}", path.display()))?;
        Ok(Some(auth))
    }

    /// Written to a temp file with mode `0600` and renamed into place.
    pub fn save(&self, auth: &Authorization) -> Result<()> {
        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(auth)?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        #[cfg(unix)]
        {
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("failed to set permissions on {}", tmp.display()))?;
        }
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }

    /// Returns whether anything was stored.
    pub fn clear(&self) -> Result<bool> {
        let path = self.path();
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove {}", path.display()))?;
        Ok(true)
    }
}
