use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::error;
use tracing_subscriber::EnvFilter;

use wagate::client::webdriver::WebDriverClient;
use wagate::client::MessagingClient;
use wagate::config::Config;
use wagate::gateway::auth::TokenGuard;
use wagate::gateway::{self, AppState};
use wagate::session::{self, SessionTracker};

/// Token-gated HTTP API over a WhatsApp Web session.
#[derive(Debug, Parser)]
#[command(name = "wagate", version, about)]
struct Cli {
    /// Path to the TOML config file (default: ~/.wagate/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the WebDriver endpoint URL.
    #[arg(long)]
    webdriver: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wagate=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.gateway.host = host;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(webdriver) = cli.webdriver {
        config.browser.webdriver_url = webdriver;
    }
    let token = config.resolve_token()?;

    let client: Arc<dyn MessagingClient> = Arc::new(WebDriverClient::new(
        config.browser.clone(),
        config.session_dir(),
    ));
    let tracker = Arc::new(SessionTracker::new());

    // Lifecycle events flow client -> pump -> tracker; handlers only read.
    let (events_tx, events_rx) = mpsc::channel(100);
    tokio::spawn(session::drive(
        tracker.clone(),
        client.clone(),
        events_rx,
        config.browser.print_qr,
    ));

    {
        let client = client.clone();
        tokio::spawn(async move {
            if let Err(err) = client.initialize().await {
                error!("client initialization failed: {err:#}");
            }
            if let Err(err) = client.listen(events_tx).await {
                error!("client event loop ended: {err:#}");
            }
        });
    }

    let state = AppState {
        client,
        session: tracker,
        guard: Arc::new(TokenGuard::new(token)),
    };
    gateway::run_gateway(&config, state).await
}
