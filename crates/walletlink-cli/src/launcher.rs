use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;
use walletlink::{LaunchError, LaunchRequest, PeerLauncher, PeerUiCompletion};

/// Opens the wallet by running a local program with the association URI as
/// its last argument. The wallet "UI" closes when the process exits.
pub struct ProcessLauncher {
    program: String,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// `command` is split on whitespace: program first, then arguments.
    pub fn from_command(command: &str) -> anyhow::Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("wallet command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl PeerLauncher for ProcessLauncher {
    async fn launch(
        &self,
        request: LaunchRequest,
        on_peer_ui_complete: PeerUiCompletion,
    ) -> Result<(), LaunchError> {
        let uri = request.uri.to_string();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&uri)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => LaunchError::PeerNotFound { uri: uri.clone() },
                _ => LaunchError::Failed(format!("{}: {e}", self.program)),
            })?;

        let program = self.program.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::debug!(%program, %status, "wallet process exited"),
                Err(e) => tracing::warn!(%program, err = %e, "failed waiting for wallet process"),
            }
            on_peer_ui_complete.complete();
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use walletlink::{SessionDescriptor, pending_launch};

    fn request() -> LaunchRequest {
        SessionDescriptor::build(Duration::from_secs(1), None).launch_request()
    }

    #[test]
    fn command_is_split() {
        let launcher = ProcessLauncher::from_command("wallet  --flag  x").unwrap();
        assert_eq!(launcher.program, "wallet");
        assert_eq!(launcher.args, vec!["--flag", "x"]);
        assert!(ProcessLauncher::from_command("   ").is_err());
    }

    #[tokio::test]
    async fn missing_program_is_peer_not_found() {
        let launcher = ProcessLauncher::from_command("walletlink-no-such-wallet-xyz").unwrap();
        let (done, _pending) = pending_launch();
        let err = launcher.launch(request(), done).await.unwrap_err();
        assert!(matches!(err, LaunchError::PeerNotFound { uri } if uri.starts_with("solana-wallet:")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_exit_fires_completion() {
        let launcher = ProcessLauncher::from_command("true").unwrap();
        let (done, pending) = pending_launch();
        launcher.launch(request(), done).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), pending.peer_ui_closed())
            .await
            .unwrap();
    }
}
