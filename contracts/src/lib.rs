//! # VaultPay Escrow Engine
//!
//! The service layer of VaultPay: signup and login, recipient lookup, and
//! conditional-release escrow between two accounts.
//!
//! - **engine** — [`EscrowEngine`], shared behind an `Arc` by every transport.
//! - **error** — [`EngineError`], the single error type callers match on.
//!
//! ## Design Principles
//!
//! 1. Money never moves outside the store's atomic hold/settle operations.
//! 2. State transitions are explicit enum variants decided by the pure
//!    lifecycle in `vaultpay-protocol`; the engine only persists them.
//! 3. Callers identify themselves with an explicit `Session` on every call.

pub mod engine;
pub mod error;

pub use engine::{EscrowEngine, PublicAccount, SendRequest, StepOutcome, TransactionView};
pub use error::{EngineError, EngineResult};
