//! # Storage Module
//!
//! The persistence contract the escrow engine is written against, and two
//! implementations of it.
//!
//! ```text
//! mod.rs    — Store trait, StoreError, shared hold/settle rules
//! memory.rs — MemoryStore: HashMaps behind one RwLock
//! db.rs     — SledStore: sled trees, multi-tree transactions, bincode values
//! ```
//!
//! ## Atomicity
//!
//! Money only moves through [`Store::hold_escrow`] and
//! [`Store::settle_escrow`]. Each is a single atomic unit in both
//! implementations: the balance change and the transaction write land
//! together or not at all. `settle_escrow` refuses a transaction whose
//! stored copy is already terminal, so escrowed funds are released at most
//! once.

pub mod db;
pub mod memory;

#[cfg(test)]
pub(crate) mod conformance;

pub use db::SledStore;
pub use memory::MemoryStore;

use crate::account::{Account, ProfileUpdate};
use crate::money::Amount;
use crate::transaction::{EscrowStatus, EscrowTransaction, Party, Release, TransactionPatch};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    /// A unique key (email, vault id, transaction id or reference) is taken.
    #[error("duplicate {kind}: {value}")]
    Duplicate { kind: &'static str, value: String },

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Amount, requested: Amount },

    #[error("balance overflow crediting account {0}")]
    BalanceOverflow(String),

    /// The stored transaction is completed or cancelled and may not change.
    #[error("transaction {0} is already settled")]
    AlreadySettled(String),

    /// The request contradicts the stored data (e.g. a release to the wrong
    /// account).
    #[error("invalid escrow operation: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Blocking key-value persistence for accounts and escrow transactions.
pub trait Store: Send + Sync {
    // -- Accounts -----------------------------------------------------------

    /// Inserts a new account. Email and vault id must be unused.
    fn create_account(&self, account: &Account) -> StoreResult<()>;

    fn get_account(&self, id: &str) -> StoreResult<Option<Account>>;

    fn get_account_by_vault_id(&self, vault_id: &str) -> StoreResult<Option<Account>>;

    /// Looks up by normalized email.
    fn get_account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    fn vault_id_exists(&self, vault_id: &str) -> StoreResult<bool> {
        Ok(self.get_account_by_vault_id(vault_id)?.is_some())
    }

    /// Overwrites a balance. Escrow never uses this; it exists for
    /// administrative corrections.
    fn update_account_balance(&self, id: &str, balance: Amount) -> StoreResult<Account>;

    fn update_profile(&self, id: &str, update: &ProfileUpdate) -> StoreResult<Account>;

    /// Removes `tx_id` from the account's unread list.
    fn mark_transaction_read(&self, account_id: &str, tx_id: &str) -> StoreResult<Account>;

    // -- Transactions -------------------------------------------------------

    /// Inserts a transaction record without moving any money.
    fn create_transaction(&self, tx: &EscrowTransaction) -> StoreResult<()>;

    fn get_transaction(&self, id: &str) -> StoreResult<Option<EscrowTransaction>>;

    fn get_transaction_by_reference(&self, reference: &str)
        -> StoreResult<Option<EscrowTransaction>>;

    fn reference_exists(&self, reference: &str) -> StoreResult<bool> {
        Ok(self.get_transaction_by_reference(reference)?.is_some())
    }

    /// Applies a partial update to a non-terminal transaction.
    fn update_transaction(&self, id: &str, patch: &TransactionPatch)
        -> StoreResult<EscrowTransaction>;

    /// Every transaction the account sent or received, oldest first.
    fn list_transactions_for_account(&self, account_id: &str)
        -> StoreResult<Vec<EscrowTransaction>>;

    // -- Escrow -------------------------------------------------------------

    /// Atomically debits the sender by `tx.amount` and stores `tx`.
    ///
    /// Also queues `tx.id` on the receiver's unread list. Returns the
    /// sender's updated account.
    fn hold_escrow(&self, tx: &EscrowTransaction) -> StoreResult<Account>;

    /// Atomically stores the terminal `tx` and credits `release`.
    ///
    /// Returns the beneficiary's updated account.
    fn settle_escrow(&self, tx: &EscrowTransaction, release: &Release) -> StoreResult<Account>;
}

// ---------------------------------------------------------------------------
// Shared rules
// ---------------------------------------------------------------------------

/// Debits `sender` and notifies `receiver` for a new hold.
pub(crate) fn apply_hold(
    sender: &mut Account,
    receiver: &mut Account,
    tx: &EscrowTransaction,
) -> StoreResult<()> {
    if sender.id != tx.sender_id || receiver.id != tx.receiver_id {
        return Err(StoreError::Invalid(format!(
            "accounts do not match transaction {}",
            tx.id
        )));
    }
    if sender.id == receiver.id {
        return Err(StoreError::Invalid(format!(
            "transaction {} sends to its own sender",
            tx.id
        )));
    }
    if tx.is_terminal() {
        return Err(StoreError::AlreadySettled(tx.id.clone()));
    }
    sender.balance = sender
        .balance
        .checked_sub(tx.amount)
        .ok_or(StoreError::InsufficientBalance {
            available: sender.balance,
            requested: tx.amount,
        })?;
    if !receiver.unread_transactions.contains(&tx.id) {
        receiver.unread_transactions.push(tx.id.clone());
    }
    Ok(())
}

/// Credits `beneficiary` for a terminal transition of `stored` into `tx`.
pub(crate) fn apply_settlement(
    stored: &EscrowTransaction,
    tx: &EscrowTransaction,
    release: &Release,
    beneficiary: &mut Account,
) -> StoreResult<()> {
    if stored.is_terminal() {
        return Err(StoreError::AlreadySettled(stored.id.clone()));
    }
    if !tx.is_terminal() {
        return Err(StoreError::Invalid(format!(
            "transaction {} is {}, not terminal",
            tx.id, tx.status
        )));
    }
    let expected_beneficiary = match tx.status {
        EscrowStatus::Completed => Party::Receiver,
        _ => Party::Sender,
    };
    if tx.id != stored.id
        || release.beneficiary != expected_beneficiary
        || release.amount != stored.amount
        || release.account_id != stored.account_of(release.beneficiary)
        || beneficiary.id != release.account_id
    {
        return Err(StoreError::Invalid(format!(
            "release does not match transaction {}",
            tx.id
        )));
    }
    beneficiary.balance = beneficiary
        .balance
        .checked_add(release.amount)
        .ok_or_else(|| StoreError::BalanceOverflow(beneficiary.id.clone()))?;
    Ok(())
}
