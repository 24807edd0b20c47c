// Copyright (c) 2026 VaultPay Contributors. MIT License.
// See LICENSE for details.

//! # VaultPay Node
//!
//! Entry point for the `vaultpay-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the account store, and serves the
//! escrow engine over HTTP/WS.
//!
//! The binary supports two subcommands:
//!
//! - `run`     — start the node
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use vaultpay_contracts::EscrowEngine;
use vaultpay_protocol::clock::SystemClock;
use vaultpay_protocol::config::EngineConfig;
use vaultpay_protocol::money::Amount;
use vaultpay_protocol::session::SessionRegistry;
use vaultpay_protocol::storage::{MemoryStore, SledStore, Store};

use cli::{Commands, StorageBackend, VaultPayCli};
use metrics::NodeMetrics;

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = VaultPayCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Opens the configured store and serves the API and metrics endpoints
/// until a shutdown signal arrives.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(&args.log_level, args.log_format);

    let starting_balance: Amount = args
        .starting_balance
        .parse()
        .with_context(|| format!("invalid starting balance {:?}", args.starting_balance))?;
    let config = EngineConfig {
        starting_balance,
        default_time_limit_hours: args.default_time_limit_hours,
    };

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        storage = ?args.storage,
        starting_balance = %config.starting_balance,
        default_time_limit_hours = config.default_time_limit_hours,
        "starting vaultpay-node"
    );

    // --- Storage ---
    let store: Arc<dyn Store> = match args.storage {
        StorageBackend::Sled => {
            let db_path = args.data_dir.join("db");
            std::fs::create_dir_all(&db_path).with_context(|| {
                format!("failed to create database directory: {}", db_path.display())
            })?;
            let db = SledStore::open(&db_path)
                .with_context(|| format!("failed to open database at {}", db_path.display()))?;
            tracing::info!(
                path = %db_path.display(),
                accounts = db.account_count(),
                transactions = db.transaction_count(),
                "database opened"
            );
            Arc::new(db)
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage; all data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    // --- Engine ---
    let engine = Arc::new(EscrowEngine::new(store, Arc::new(SystemClock), config));

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            vaultpay_protocol::config::PROTOCOL_VERSION,
        ),
        engine,
        sessions: Arc::new(SessionRegistry::new()),
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

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

    tracing::info!("vaultpay-node stopped");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("vaultpay-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol      {}", vaultpay_protocol::config::PROTOCOL_VERSION);
    println!("rustc         {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed the error is logged and that branch never fires.
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
