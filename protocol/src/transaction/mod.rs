//! # Transaction Module
//!
//! Escrow transactions: what they are, how they are built, and how they move
//! through their lifecycle.
//!
//! ```text
//! types.rs     — EscrowTransaction, EscrowStatus, Condition, TimeRemaining, patches
//! builder.rs   — EscrowDraft validation into a Pending transaction
//! lifecycle.rs — accept / toggle_condition / mark_order_received / cancel
//! ```
//!
//! The lifecycle methods are pure. They return a [`Transition`] telling the
//! caller whether funds must leave escrow; persisting that outcome is the
//! store's job.

pub mod builder;
pub mod lifecycle;
pub mod types;

pub use builder::{DraftError, EscrowDraft};
pub use lifecycle::LifecycleError;
pub use types::{
    Condition, Direction, EscrowStatus, EscrowTransaction, Party, Release, TimeRemaining,
    TransactionPatch, Transition,
};
