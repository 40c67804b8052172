//! Beacon service discovery registry daemon
//!
//! Nodes PUT announcements with a TTL, clients GET live service instances
//! by type and optional pool. Operator-declared static services come from
//! the config file and never expire.

mod http;

use anyhow::{Context, Result};
use beacon_common::Config;
use beacon_store::{
    schema, Clock, DynamicStore, MemoryStaticStore, ServiceQuery, StaticStore, SystemClock,
};
use clap::Parser;
use http::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "beacond")]
#[command(about = "Beacon service discovery registry")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/beacond/config.toml")]
    config: String,

    /// Listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level (overrides config)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config file if it exists; CLI args take precedence
    let config: Config = if std::path::Path::new(&args.config).exists() {
        let config_str = std::fs::read_to_string(&args.config)?;
        toml::from_str(&config_str)
            .with_context(|| format!("failed to parse config file {}", args.config))?
    } else {
        Config::default()
    };

    let listen = args.listen.unwrap_or(config.server.listen.clone());
    let log_level = args.log_level.unwrap_or(config.logging.level.clone());

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Beacon registry");
    info!("Environment: {}", config.discovery.environment);
    info!("Announcement TTL: {} ms", config.discovery.max_age_ms);

    // Schema must be in place before any read or write; failure is fatal.
    let column_family = schema::ensure(&config.store, &config.discovery.keyspace)
        .context("schema setup failed")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let dynamic = Arc::new(DynamicStore::new(
        column_family,
        clock,
        Duration::from_millis(config.discovery.max_age_ms),
    ));
    dynamic.initialize().context("store initialization failed")?;

    let statics: Arc<dyn StaticStore> =
        Arc::new(MemoryStaticStore::from_config(&config.static_services));
    if !config.static_services.is_empty() {
        info!("Loaded {} static service(s)", config.static_services.len());
    }

    let query = ServiceQuery::new(
        Arc::clone(&dynamic),
        statics,
        config.discovery.environment.clone(),
    );

    let state = Arc::new(AppState {
        dynamic: Arc::clone(&dynamic),
        query,
    });
    let app = http::router(state);

    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address {listen}: {e}"))?;

    info!("Serving discovery API on {addr}");
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    dynamic.shutdown();
    info!("Registry shut down gracefully");

    Ok(())
}
