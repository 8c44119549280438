use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lockbox_browser::FantocciniBrowserDriver;
use lockbox_domain::config::{Config, ConfigSeverity};
use lockbox_portal::RealPortalClient;
use lockbox_store::{FsBlobStore, PrivateStore, SharedStore};
use lockbox_vault::Vault;
use tracing_subscriber::EnvFilter;

mod api;
mod scheduler;
mod state;
mod tasks;
mod time;

use scheduler::Scheduler;
use state::{AppState, CurrentDay};

/// CLI flags, falling back to their `LOCKBOX_*` env var when unset — the
/// rest of the configuration (§6) is env-only, read by [`Config::from_env`].
#[derive(Parser)]
#[command(name = "lockbox", about = "Attendance form automation gateway")]
struct Cli {
    /// Directory holding the private/shared JSON stores and the blob bucket.
    #[arg(long, default_value = "./data")]
    state_dir: std::path::PathBuf,

    /// Address the HTTP API binds to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind_addr: String,

    /// Base URL of the school portal.
    #[arg(long, default_value = "https://portal.example.edu")]
    portal_url: String,

    /// WebDriver (geckodriver/Firefox) endpoint the browser adapter connects to.
    #[arg(long, default_value = "http://localhost:4444")]
    webdriver_url: String,
}

fn env_or(var: &str, fallback: String) -> String {
    std::env::var(var).ok().filter(|v| !v.is_empty()).unwrap_or(fallback)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut cli = Cli::parse();
    cli.state_dir = env_or("LOCKBOX_STATE_DIR", cli.state_dir.display().to_string()).into();
    cli.bind_addr = env_or("LOCKBOX_BIND_ADDR", cli.bind_addr);
    cli.portal_url = env_or("LOCKBOX_PORTAL_URL", cli.portal_url);
    cli.webdriver_url = env_or("LOCKBOX_WEBDRIVER_URL", cli.webdriver_url);

    let (config, issues) = match Config::from_env() {
        Ok(pair) => pair,
        Err(issues) => {
            for issue in &issues {
                tracing::error!("config: {issue}");
            }
            anyhow::bail!("config validation failed");
        }
    };
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }

    std::fs::create_dir_all(&cli.state_dir).with_context(|| format!("creating state dir {:?}", cli.state_dir))?;

    let private = Arc::new(PrivateStore::new(&cli.state_dir));
    let shared = Arc::new(SharedStore::new(&cli.state_dir));
    let blobs: Arc<dyn lockbox_store::BlobStore> = Arc::new(FsBlobStore::new(cli.state_dir.join("blobs")));
    let vault = Arc::new(Vault::new(&config.credential_key).context("initializing credential vault")?);
    let portal: Arc<dyn lockbox_portal::PortalClient> = Arc::new(RealPortalClient::new(cli.portal_url.clone()));
    let browser: Arc<dyn lockbox_browser::BrowserDriver> = Arc::new(FantocciniBrowserDriver::new(cli.webdriver_url.clone()));

    let scheduler = Scheduler::new(private.clone());

    let state = AppState {
        config: Arc::new(config),
        private,
        shared,
        blobs,
        vault,
        portal,
        browser,
        scheduler: scheduler.clone(),
        current_day: Arc::new(CurrentDay::default()),
    };

    scheduler.start(state.clone()).await;

    let app = api::router(state.clone()).with_state(state).layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&cli.bind_addr).await.with_context(|| format!("binding to {}", cli.bind_addr))?;
    tracing::info!(addr = %cli.bind_addr, "lockbox listening");

    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,lockbox_gateway=debug")))
        .json()
        .init();
}
