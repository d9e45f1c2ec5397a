use anyhow::{Context, Result};
use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

struct Env {
    _temp: tempfile::TempDir,
    config_home: PathBuf,
    state_dir: PathBuf,
}

impl Env {
    fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("failed to create tempdir")?;
        let config_home = temp.path().join("config");
        let state_dir = temp.path().join("state");
        std::fs::create_dir_all(&config_home)?;
        Ok(Self {
            config_home,
            state_dir,
            _temp: temp,
        })
    }

    fn authorization_path(&self) -> PathBuf {
        self.state_dir.join("authorization.json")
    }

    /// The CLI with a wallet command that runs this same binary as a mock wallet.
    fn cli(&self, wallet_args: &str) -> Command {
        let wallet = format!("{} mock-wallet {wallet_args}", mock_wallet_bin().display());
        self.cli_with_wallet(&wallet)
    }

    fn cli_with_wallet(&self, wallet_cmd: &str) -> Command {
        let mut cmd = cargo_bin_cmd!("walletlink");
        cmd.env("XDG_CONFIG_HOME", &self.config_home)
            .env("RUST_LOG", "walletlink=debug")
            .arg("--state-dir")
            .arg(&self.state_dir)
            .arg("--wallet-cmd")
            .arg(wallet_cmd);
        cmd
    }
}

fn mock_wallet_bin() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_walletlink"))
}

#[test]
fn capabilities_via_mock_wallet() -> Result<()> {
    let env = Env::new()?;
    env.cli("")
        .arg("capabilities")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"max_messages_per_request\": 10"));
    Ok(())
}

#[test]
fn authorize_sign_deauthorize() -> Result<()> {
    let env = Env::new()?;

    env.cli("")
        .args(["--cluster", "testnet", "authorize"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Mock Account ("));

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(env.authorization_path())?)?;
    assert_eq!(stored["cluster"], "testnet");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(env.authorization_path())?
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let output = env
        .cli("")
        .args(["sign-message", "hello wallet"])
        .output()
        .context("failed to run sign-message")?;
    assert!(
        output.status.success(),
        "sign-message failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let signature = String::from_utf8(output.stdout)?;
    assert!(!signature.trim().is_empty());

    env.cli("")
        .arg("deauthorize")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("deauthorized Mock Account"));
    assert!(!env.authorization_path().exists());
    Ok(())
}

#[test]
fn missing_wallet_shows_install_notice() -> Result<()> {
    let env = Env::new()?;
    env.cli_with_wallet("walletlink-no-such-wallet-xyz")
        .arg("capabilities")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No wallet found (Install a wallet:"))
        .stderr(predicate::str::contains("no wallet session was established"));
    Ok(())
}

#[test]
fn declined_authorization_shows_notice() -> Result<()> {
    let env = Env::new()?;
    env.cli("--decline")
        .arg("authorize")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Authorization failed"));
    assert!(!env.authorization_path().exists());
    Ok(())
}

#[test]
fn sign_message_requires_authorization() -> Result<()> {
    let env = Env::new()?;
    env.cli("")
        .args(["sign-message", "hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not authorized"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn explicit_config_timeouts_apply() -> Result<()> {
    let env = Env::new()?;
    let config = env.config_home.join("custom.toml");
    // The wallet process exits without connecting, so the session gives up
    // at the client timeout instead of the 90 s default.
    std::fs::write(&config, "client_timeout_ms = 200\n")?;

    let started = std::time::Instant::now();
    env.cli_with_wallet("true")
        .arg("--config")
        .arg(&config)
        .arg("capabilities")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no wallet session was established"));
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    Ok(())
}

#[test]
fn mock_wallet_rejects_bad_uri() {
    cargo_bin_cmd!("walletlink")
        .args(["mock-wallet", "https://example.com/not-an-association"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid association URI"));
}
