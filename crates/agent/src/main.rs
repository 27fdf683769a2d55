//! `aegis-agent` -- enforcement agent for one managed computer.
//!
//! Long-polls the control plane for the current access config and
//! reconciles local account state against it every few seconds. The two
//! loops cooperate through a shared config slot: the fetcher replaces it
//! when the version moves, the ticker reads it on every pass.
//!
//! # Configuration
//!
//! | Source               | Default            | Description                |
//! |----------------------|--------------------|----------------------------|
//! | `AEGIS_AGENT_CONFIG` | `aegis-agent.yaml` | Path of the YAML config    |
//!
//! The YAML file itself must provide `server_url` and `client_id`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aegis_agent::config::{AgentConfig, DEFAULT_CONFIG_PATH};
use aegis_agent::control::AccountControl;
use aegis_agent::enforcer::Enforcer;
use aegis_agent::fetcher::ConfigFetcher;
use aegis_core::ClientConfig;

/// Pacing of fetch iterations; the long-poll itself holds up to 55 s, so a
/// healthy agent reconnects almost immediately while a failing one retries
/// about once a minute.
const FETCH_INTERVAL: Duration = Duration::from_secs(60);

/// How often the enforcement loop reconciles local account state.
const RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aegis_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path =
        std::env::var("AEGIS_AGENT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());

    let config = AgentConfig::load(&config_path).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = %config_path, "Cannot load agent configuration");
        std::process::exit(1);
    });

    tracing::info!(
        server_url = %config.server_url,
        client_id = %config.client_id,
        "Starting aegis-agent"
    );

    let fetcher = ConfigFetcher::new(&config.server_url, &config.client_id);
    let current: Arc<RwLock<Option<ClientConfig>>> = Arc::new(RwLock::new(None));

    tokio::select! {
        () = fetch_loop(&fetcher, &current) => {}
        () = enforce_loop(platform_control(), &current) => {}
        () = shutdown_signal() => {
            tracing::info!("Shutting down");
        }
    }
}

/// The platform's account-control capability.
#[cfg(windows)]
fn platform_control() -> aegis_agent::control::WindowsAccountControl {
    aegis_agent::control::WindowsAccountControl::new()
}

#[cfg(not(windows))]
fn platform_control() -> aegis_agent::control::LoggingAccountControl {
    aegis_agent::control::LoggingAccountControl::new()
}

/// Fetch loop: long-poll the config endpoint with the last-known version
/// and publish every new config. Errors are logged and retried on the next
/// iteration; the interval bounds the reconnect rate.
async fn fetch_loop(fetcher: &ConfigFetcher, current: &RwLock<Option<ClientConfig>>) {
    let mut ticker = tokio::time::interval(FETCH_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut last_version = String::new();

    loop {
        ticker.tick().await;

        match fetcher.fetch(&last_version).await {
            Ok(Some(config)) => {
                if config.version != last_version {
                    tracing::info!(
                        version = %config.version,
                        users = config.users.len(),
                        "Received updated config"
                    );
                    last_version = config.version.clone();
                    *current.write().await = Some(config);
                } else {
                    tracing::debug!(version = %config.version, "Config unchanged");
                }
            }
            Ok(None) => {
                tracing::debug!("Long-poll closed with no change");
            }
            Err(e) => {
                tracing::error!(error = %e, "Config fetch failed");
            }
        }
    }
}

/// Ticker loop: reconcile local account state against the current config.
/// Keeps enforcing the last fetched config across network outages.
async fn enforce_loop<C: AccountControl>(control: C, current: &RwLock<Option<ClientConfig>>) {
    let mut enforcer = Enforcer::new(control);
    let mut ticker = tokio::time::interval(RECONCILE_INTERVAL);

    loop {
        ticker.tick().await;

        let config = current.read().await.clone();
        if let Some(config) = config {
            enforcer.reconcile(&config, Local::now()).await;
        }
    }
}

/// Wait for a termination signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}
