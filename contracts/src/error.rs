//! Errors surfaced by [`crate::EscrowEngine`].
//!
//! Lower layers keep their own error types; this enum wraps them and adds
//! the failures only the engine can detect (lookups, authentication,
//! authorization). Display strings are the messages shown to users.

use thiserror::Error;

use vaultpay_protocol::account::credentials::CredentialError;
use vaultpay_protocol::money::{Amount, AmountError};
use vaultpay_protocol::storage::StoreError;
use vaultpay_protocol::transaction::{DraftError, LifecycleError};

#[derive(Debug, Error)]
pub enum EngineError {
    /// A required input was blank. Carries the user-facing message.
    #[error("{0}")]
    MissingField(&'static str),

    #[error("Email already registered")]
    EmailTaken,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("recipient not found")]
    RecipientNotFound,

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Amount, requested: Amount },

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    /// The caller is neither sender nor receiver.
    #[error("not a party to this transaction")]
    NotAParty,

    /// Every generated code collided with an existing one.
    #[error("could not generate a unique {0}")]
    CodeExhausted(&'static str),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Draft(#[from] DraftError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Lifts store errors that have a dedicated engine variant.
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientBalance {
                available,
                requested,
            } => Self::InsufficientBalance {
                available,
                requested,
            },
            StoreError::TransactionNotFound(id) => Self::TransactionNotFound(id),
            StoreError::AccountNotFound(id) => Self::AccountNotFound(id),
            StoreError::Duplicate { kind: "email", .. } => Self::EmailTaken,
            other => Self::Store(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
