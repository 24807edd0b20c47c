// Copyright (c) 2026 VaultPay Contributors. MIT License.
// See LICENSE for details.

//! # VaultPay Protocol — Core Library
//!
//! Accounts, money, and escrow transactions for a peer-to-peer payment app
//! where the sender's funds sit in escrow until the receiver has met every
//! agreed condition and the sender confirms the order arrived.
//!
//! ## Architecture
//!
//! - **account** — Profiles, balances, password hashing.
//! - **money** — `Amount` in minor units with checked arithmetic.
//! - **transaction** — Escrow records, draft validation, the lifecycle state machine.
//! - **trust** — Reputation score derived from history.
//! - **storage** — The `Store` trait plus in-memory and sled backends.
//! - **session** — Explicit caller context and the bearer-token registry.
//! - **ids** — Vault IDs and VTID references.
//! - **clock** — Injectable time source.
//! - **config** — Constants and the engine configuration.
//!
//! The orchestration that ties these together (locking, validation order,
//! settlement) lives in the `vaultpay-contracts` crate.

pub mod account;
pub mod clock;
pub mod config;
pub mod ids;
pub mod money;
pub mod session;
pub mod storage;
pub mod transaction;
pub mod trust;

pub use money::Amount;
