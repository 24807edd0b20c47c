//! # CLI Interface
//!
//! Defines the command-line argument structure for `vaultpay-node` using
//! `clap` derive. Two subcommands: `run` and `version`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use vaultpay_protocol::config::{
    DEFAULT_API_PORT, DEFAULT_METRICS_PORT, DEFAULT_TIME_LIMIT_HOURS,
};

use crate::logging::LogFormat;

/// VaultPay escrow node.
///
/// Serves the escrow engine over a JSON REST API with a WebSocket event
/// stream, and exposes Prometheus metrics on a separate port.
#[derive(Parser, Debug)]
#[command(
    name = "vaultpay-node",
    about = "VaultPay conditional-release escrow node",
    version,
    propagate_version = true
)]
pub struct VaultPayCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Where accounts and transactions are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// sled database under `--data-dir`.
    Sled,
    /// Process memory; everything is lost on exit.
    Memory,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the sled database. Created on first run.
    #[arg(long, short = 'd', env = "VAULTPAY_DATA_DIR", default_value = "./vaultpay-data")]
    pub data_dir: PathBuf,

    /// Storage backend.
    #[arg(long, value_enum, env = "VAULTPAY_STORAGE", default_value_t = StorageBackend::Sled)]
    pub storage: StorageBackend,

    /// Address to bind both listeners on.
    #[arg(long, env = "VAULTPAY_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the REST and WebSocket API.
    #[arg(long, env = "VAULTPAY_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "VAULTPAY_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Balance credited to new accounts, in KSH (e.g. `1000` or `1000.00`).
    #[arg(long, env = "VAULTPAY_STARTING_BALANCE", default_value = "1000")]
    pub starting_balance: String,

    /// Time limit in hours applied when a sender leaves it blank.
    #[arg(long, env = "VAULTPAY_DEFAULT_TIME_LIMIT", default_value_t = DEFAULT_TIME_LIMIT_HOURS)]
    pub default_time_limit_hours: u32,

    /// Log output format.
    #[arg(long, value_enum, env = "VAULTPAY_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, env = "VAULTPAY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
