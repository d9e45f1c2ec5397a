mod config;
mod launcher;
mod mock_wallet;
mod notices;
mod state;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use config::Config;
use launcher::ProcessLauncher;
use mock_wallet::{MOCK_WALLET_NAME, MockWallet};
use notices::{AUTHORIZATION_FAILED, Notices};
use state::AccountStore;
use std::future::Future;
use std::path::PathBuf;
use walletlink::{Authorization, ClientError, Orchestrator, WalletClient, WalletPeer};
use walletlink_protocol::uri::UriPrefix;
use walletlink_protocol::{AssociationUri, Cluster};

#[derive(Parser)]
#[command(name = "walletlink", version, about = "Talk to a wallet over a local association")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/walletlink/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State directory holding the stored authorization.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Wallet command; the association URI is appended as the last argument.
    #[arg(long, global = true)]
    wallet_cmd: Option<String>,

    /// devnet, testnet or mainnet-beta.
    #[arg(long, global = true)]
    cluster: Option<Cluster>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Dapp(DappCommand),
    /// Act as a wallet that approves every request.
    MockWallet {
        /// Decline authorization requests instead.
        #[arg(long)]
        decline: bool,
        /// Association URI handed over by the dapp.
        association_uri: String,
    },
}

/// Commands that talk to a wallet on behalf of this dapp.
#[derive(Subcommand)]
enum DappCommand {
    /// Authorize this dapp with the wallet and remember the account.
    Authorize,
    /// Sign a message with the authorized account.
    SignMessage {
        /// Message text.
        message: String,
    },
    /// Revoke the stored authorization.
    Deauthorize,
    /// Show what the wallet supports.
    Capabilities,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "walletlink=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => bail!("interrupted"),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let command = match cli.command {
        Command::MockWallet {
            decline,
            association_uri,
        } => return run_mock_wallet(&association_uri, decline).await,
        Command::Dapp(command) => command,
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(cmd) = cli.wallet_cmd {
        config.wallet_cmd = cmd;
    }
    if let Some(cluster) = cli.cluster {
        config.cluster = cluster;
    }
    let state_dir = cli
        .state_dir
        .or_else(|| config.state_dir.clone())
        .unwrap_or_else(state::default_state_dir);

    let mut app = App::new(config, &state_dir)?;
    let result = match command {
        DappCommand::Authorize => app.authorize().await,
        DappCommand::SignMessage { message } => app.sign_message(message).await,
        DappCommand::Deauthorize => app.deauthorize().await,
        DappCommand::Capabilities => app.capabilities().await,
    };
    app.flush_notices();
    result
}

struct App {
    config: Config,
    orchestrator: Orchestrator,
    launcher: ProcessLauncher,
    store: AccountStore,
    notices: Notices,
}

impl App {
    fn new(config: Config, state_dir: &std::path::Path) -> Result<Self> {
        let launcher = ProcessLauncher::from_command(&config.wallet_cmd)?;
        let store = AccountStore::open(state_dir)?;
        Ok(Self {
            orchestrator: Orchestrator::new(config.timeouts()),
            config,
            launcher,
            store,
            notices: Notices::new(),
        })
    }

    /// One wallet session; user-facing problems end up in `notices`.
    async fn session<T, F, Fut>(&mut self, prefix: Option<UriPrefix>, action: F) -> Result<T>
    where
        F: FnOnce(WalletClient) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let mut events = self.orchestrator.subscribe();
        let result = self
            .orchestrator
            .with_session(&self.launcher, prefix, action)
            .await;
        while let Ok(event) = events.try_recv() {
            self.notices.observe(&event, &self.config.install_url);
        }
        result.context("no wallet session was established")
    }

    fn flush_notices(&mut self) {
        let pending: Vec<_> = self.notices.pending().cloned().collect();
        for notice in pending {
            eprintln!("{notice}");
            self.notices.pop_shown(notice.seq);
        }
    }

    async fn authorize(&mut self) -> Result<()> {
        let identity = self.config.dapp_identity();
        let cluster = self.config.cluster;
        let prefix = self.store.load()?.and_then(|auth| auth.uri_prefix());

        let outcome = self
            .session(prefix, move |client| async move {
                Some(client.authorize(identity, cluster).await)
            })
            .await?;

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                self.notices.show(AUTHORIZATION_FAILED, None);
                return Err(e).context("wallet refused authorization");
            }
        };
        let auth = Authorization::new(result, cluster);
        self.store.save(&auth)?;
        tracing::info!(cluster = %auth.cluster, "authorization stored");
        println!("{}", account_line(&auth));
        Ok(())
    }

    async fn sign_message(&mut self, message: String) -> Result<()> {
        let auth = self.require_authorization()?;
        let identity = self.config.dapp_identity();
        let token = auth.auth_token.clone();
        let payload = message.into_bytes();

        let (refreshed, signed) = self
            .session(auth.uri_prefix(), move |client| async move {
                let exchange = async {
                    let refreshed = client.reauthorize(identity, &token).await?;
                    let signed = client
                        .sign_messages(vec![refreshed.public_key.clone()], vec![payload])
                        .await?;
                    Ok::<_, ClientError>((refreshed, signed))
                };
                Some(exchange.await)
            })
            .await?
            .context("wallet refused to sign")?;

        self.store.save(&auth.refresh(refreshed))?;
        let signed = signed
            .first()
            .context("wallet returned no signed message")?;
        println!("{}", STANDARD.encode(signed));
        Ok(())
    }

    async fn deauthorize(&mut self) -> Result<()> {
        let auth = self.require_authorization()?;
        let token = auth.auth_token.clone();

        self.session(auth.uri_prefix(), move |client| async move {
            Some(client.deauthorize(&token).await)
        })
        .await?
        .context("wallet refused to deauthorize")?;

        self.store.clear()?;
        println!("deauthorized {}", account_line(&auth));
        Ok(())
    }

    async fn capabilities(&mut self) -> Result<()> {
        let prefix = self.store.load()?.and_then(|auth| auth.uri_prefix());
        let caps = self
            .session(prefix, |client| async move {
                Some(client.get_capabilities().await)
            })
            .await?
            .context("wallet did not report capabilities")?;
        println!("{}", serde_json::to_string_pretty(&caps)?);
        Ok(())
    }

    fn require_authorization(&self) -> Result<Authorization> {
        self.store
            .load()?
            .context("not authorized; run `walletlink authorize` first")
    }
}

fn account_line(auth: &Authorization) -> String {
    format!(
        "{} ({})",
        auth.account_label.as_deref().unwrap_or("Unnamed account"),
        bs58::encode(&auth.public_key).into_string()
    )
}

async fn run_mock_wallet(uri: &str, decline: bool) -> Result<()> {
    let association =
        AssociationUri::parse(uri).with_context(|| format!("invalid association URI: {uri}"))?;
    let peer = WalletPeer::new(association).wallet_name(MOCK_WALLET_NAME);
    let mut wallet = MockWallet::new(decline);
    tracing::info!(
        address = %bs58::encode(wallet.public_key()).into_string(),
        decline,
        "mock wallet connecting"
    );
    let served = peer
        .run(&mut wallet)
        .await
        .context("mock wallet session failed")?;
    tracing::info!(served, "mock wallet finished");
    Ok(())
}
