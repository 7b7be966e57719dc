// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Umbra Vault Node
//!
//! Entry point for the `umbra-node` binary. Parses CLI arguments, initializes
//! logging and metrics, wires a vault to in-memory collaborators, runs the
//! oracle relayer and serves the HTTP/WS API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     start the node
//! - `config`  validate parameters and print the effective configuration
//! - `version` print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod relayer;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;

use umbra_adapters::Deployment;
use umbra_protocol::config::PROTOCOL_VERSION;

use cli::{Commands, UmbraNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = UmbraNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Config(args) => print_config(&args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: API server, metrics endpoint and relayer.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let config = args.vault.vault_config();
    logging::init_logging(
        &args.log_level,
        LogFormat::from_str_lossy(&args.log_format),
        &config.address,
    );

    config.validate().context("invalid vault configuration")?;

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        relay_interval_ms = args.relay_interval_ms,
        vault = %config.address,
        oracle = %config.oracle,
        max_vault_ltv_bp = config.policy.max_vault_ltv_bp,
        min_health_factor_bp = config.policy.min_health_factor_bp,
        "starting umbra-node"
    );

    // --- Vault and collaborators ---
    let deployment = Deployment::new(config, args.vault.pool_config())
        .context("failed to construct vault")?;
    deployment
        .seed_liquidity(args.vault.pool_liquidity)
        .context("failed to seed pool liquidity")?;
    let deployment = Arc::new(deployment);

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState::new(
        format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        deployment,
        Arc::clone(&node_metrics),
        event_tx,
    );
    app_state.refresh_gauges();

    // --- API server ---
    let api_router = api::create_router(app_state.clone());
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Relayer ---
    let relay_loop = tokio::spawn(relayer::run(
        app_state.clone(),
        Duration::from_millis(args.relay_interval_ms.max(1)),
    ));

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    relay_loop.abort();
    let pending = app_state.deployment.vault.pending_count();
    if pending > 0 {
        tracing::warn!(pending, "stopping with operations still awaiting decryption");
    }
    tracing::info!("umbra-node stopped");
    Ok(())
}

/// Validates the vault parameters and prints them as JSON.
fn print_config(args: &cli::VaultArgs) -> Result<()> {
    let config = args.vault_config();
    config.validate().context("invalid vault configuration")?;
    let out = serde_json::json!({
        "vault": config,
        "pool": args.pool_config(),
        "pool_liquidity": args.pool_liquidity,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("umbra-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", PROTOCOL_VERSION);
    println!("rustc      {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that branch never completes.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
