//! callbridge server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! environment variables, and serves the webhook and call-control endpoints
//! over HTTP.
//!
//! Every key can be set from the environment with a `CALLBRIDGE_` prefix;
//! nested keys use a `__` separator, e.g. `CALLBRIDGE_ASSISTANT__VOICE=verse`.

use std::path::PathBuf;

use anyhow::Context as _;
use callbridge_realtime::RealtimeClient;
use callbridge_server::{AppState, BridgeConfig};
use callbridge_store_memory::CallRegistry;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Twilio to realtime SIP call bridge")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Validate the configuration, report problems, and exit.
  #[arg(long)]
  check_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("CALLBRIDGE")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read configuration")?;

  let bridge_cfg: BridgeConfig = settings
    .try_deserialize()
    .context("failed to deserialise BridgeConfig")?;

  bridge_cfg.log_summary();

  if cli.check_config {
    let problems = bridge_cfg.problems();
    if problems.is_empty() {
      println!("configuration OK");
      return Ok(());
    }
    anyhow::bail!("configuration has {} problem(s): {}", problems.len(), problems.join("; "));
  }

  let client = RealtimeClient::new(bridge_cfg.client_config())
    .context("failed to build realtime HTTP client")?;

  let address = format!("{}:{}", bridge_cfg.host, bridge_cfg.port);
  let state = AppState::new(CallRegistry::new(), client, bridge_cfg);
  let sessions = state.sessions.clone();
  let app = callbridge_server::router(state);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  sessions.shutdown().await;

  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}
