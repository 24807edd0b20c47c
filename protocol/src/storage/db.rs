//! # SledStore — Persistent Storage Engine
//!
//! The on-disk [`Store`], built on sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree           | Key                          | Value                       |
//! |----------------|------------------------------|-----------------------------|
//! | `accounts`     | account id (UTF-8)           | `bincode(Account)`          |
//! | `vault_ids`    | vault id (UTF-8)             | account id                  |
//! | `emails`       | normalized email (UTF-8)     | account id                  |
//! | `transactions` | transaction id (UTF-8)       | `bincode(EscrowTransaction)`|
//! | `references`   | VTID reference (UTF-8)       | transaction id              |
//! | `party_index`  | `{account id}/{tx id}`       | empty                       |
//!
//! ## Atomicity
//!
//! Every write that touches more than one key runs inside a sled
//! multi-tree transaction, so a unique-index entry never exists without its
//! record and a balance never changes without the escrow record that
//! explains it. `hold_escrow` and `settle_escrow` flush before returning.

use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::debug;

use super::{apply_hold, apply_settlement, Store, StoreError, StoreResult};
use crate::account::{normalize_email, Account, ProfileUpdate};
use crate::money::Amount;
use crate::transaction::{EscrowTransaction, Release, TransactionPatch};

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_str(bytes: &[u8]) -> StoreResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn abort<T>(err: StoreError) -> ConflictableTransactionResult<T, StoreError> {
    Err(ConflictableTransactionError::Abort(err))
}

fn tx_get<T: DeserializeOwned>(
    tree: &TransactionalTree,
    key: &str,
) -> ConflictableTransactionResult<Option<T>, StoreError> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => decode(&bytes)
            .map(Some)
            .map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

fn tx_put<T: Serialize>(
    tree: &TransactionalTree,
    key: &str,
    value: &T,
) -> ConflictableTransactionResult<(), StoreError> {
    let bytes = encode(value).map_err(ConflictableTransactionError::Abort)?;
    tree.insert(key.as_bytes(), bytes)?;
    Ok(())
}

fn party_key(account_id: &str, tx_id: &str) -> String {
    format!("{account_id}/{tx_id}")
}

/// Unwraps sled's transaction error into ours.
fn flatten(err: TransactionError<StoreError>) -> StoreError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StoreError::Sled(e),
    }
}

/// Writes a new transaction and its reference and party index entries.
fn insert_transaction(
    transactions: &TransactionalTree,
    references: &TransactionalTree,
    party_index: &TransactionalTree,
    tx: &EscrowTransaction,
) -> ConflictableTransactionResult<(), StoreError> {
    if transactions.get(tx.id.as_bytes())?.is_some() {
        return abort(StoreError::Duplicate {
            kind: "transaction id",
            value: tx.id.clone(),
        });
    }
    if references.get(tx.reference.as_bytes())?.is_some() {
        return abort(StoreError::Duplicate {
            kind: "reference",
            value: tx.reference.clone(),
        });
    }
    tx_put(transactions, &tx.id, tx)?;
    references.insert(tx.reference.as_bytes(), tx.id.as_bytes())?;
    party_index.insert(party_key(&tx.sender_id, &tx.id).as_bytes(), Vec::<u8>::new())?;
    party_index.insert(party_key(&tx.receiver_id, &tx.id).as_bytes(), Vec::<u8>::new())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// SledStore
// ---------------------------------------------------------------------------

/// Persistent [`Store`] backed by sled.
///
/// Cloning is cheap; clones share the same database handle.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    accounts: Tree,
    vault_ids: Tree,
    emails: Tree,
    transactions: Tree,
    references: Tree,
    party_index: Tree,
}

impl SledStore {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A database that is removed when the store is dropped.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        Ok(Self {
            accounts: db.open_tree("accounts")?,
            vault_ids: db.open_tree("vault_ids")?,
            emails: db.open_tree("emails")?,
            transactions: db.open_tree("transactions")?,
            references: db.open_tree("references")?,
            party_index: db.open_tree("party_index")?,
            db,
        })
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Blocks until all pending writes are durable.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(tree: &Tree, key: &str) -> StoreResult<Option<T>> {
        match tree.get(key.as_bytes())? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Follows an index tree to the account it points at.
    fn account_via(&self, index: &Tree, key: &str) -> StoreResult<Option<Account>> {
        match index.get(key.as_bytes())? {
            Some(id) => Self::get(&self.accounts, &decode_str(&id)?),
            None => Ok(None),
        }
    }

    /// Read-modify-write of one account inside a transaction.
    fn modify_account(
        &self,
        id: &str,
        f: impl Fn(&mut Account),
    ) -> StoreResult<Account> {
        self.accounts
            .transaction(|accounts| {
                let Some(mut account) = tx_get::<Account>(accounts, id)? else {
                    return abort(StoreError::AccountNotFound(id.to_string()));
                };
                f(&mut account);
                tx_put(accounts, id, &account)?;
                Ok(account)
            })
            .map_err(flatten)
    }
}

impl Store for SledStore {
    fn create_account(&self, account: &Account) -> StoreResult<()> {
        let email = normalize_email(&account.email);
        (&self.accounts, &self.vault_ids, &self.emails)
            .transaction(|(accounts, vault_ids, emails)| {
                if emails.get(email.as_bytes())?.is_some() {
                    return abort(StoreError::Duplicate {
                        kind: "email",
                        value: email.clone(),
                    });
                }
                if vault_ids.get(account.vault_id.as_bytes())?.is_some() {
                    return abort(StoreError::Duplicate {
                        kind: "vault id",
                        value: account.vault_id.clone(),
                    });
                }
                if accounts.get(account.id.as_bytes())?.is_some() {
                    return abort(StoreError::Duplicate {
                        kind: "account id",
                        value: account.id.clone(),
                    });
                }
                tx_put(accounts, &account.id, account)?;
                vault_ids.insert(account.vault_id.as_bytes(), account.id.as_bytes())?;
                emails.insert(email.as_bytes(), account.id.as_bytes())?;
                Ok(())
            })
            .map_err(flatten)?;
        debug!(account = %account.id, vault_id = %account.vault_id, "account persisted");
        Ok(())
    }

    fn get_account(&self, id: &str) -> StoreResult<Option<Account>> {
        Self::get(&self.accounts, id)
    }

    fn get_account_by_vault_id(&self, vault_id: &str) -> StoreResult<Option<Account>> {
        self.account_via(&self.vault_ids, vault_id)
    }

    fn get_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        self.account_via(&self.emails, &normalize_email(email))
    }

    fn vault_id_exists(&self, vault_id: &str) -> StoreResult<bool> {
        Ok(self.vault_ids.contains_key(vault_id.as_bytes())?)
    }

    fn update_account_balance(&self, id: &str, balance: Amount) -> StoreResult<Account> {
        self.modify_account(id, |account| account.balance = balance)
    }

    fn update_profile(&self, id: &str, update: &ProfileUpdate) -> StoreResult<Account> {
        self.modify_account(id, |account| update.apply(account))
    }

    fn mark_transaction_read(&self, account_id: &str, tx_id: &str) -> StoreResult<Account> {
        self.modify_account(account_id, |account| {
            account.unread_transactions.retain(|id| id != tx_id)
        })
    }

    fn create_transaction(&self, tx: &EscrowTransaction) -> StoreResult<()> {
        (&self.transactions, &self.references, &self.party_index)
            .transaction(|(transactions, references, party_index)| {
                insert_transaction(transactions, references, party_index, tx)
            })
            .map_err(flatten)
    }

    fn get_transaction(&self, id: &str) -> StoreResult<Option<EscrowTransaction>> {
        Self::get(&self.transactions, id)
    }

    fn get_transaction_by_reference(
        &self,
        reference: &str,
    ) -> StoreResult<Option<EscrowTransaction>> {
        match self.references.get(reference.as_bytes())? {
            Some(id) => Self::get(&self.transactions, &decode_str(&id)?),
            None => Ok(None),
        }
    }

    fn reference_exists(&self, reference: &str) -> StoreResult<bool> {
        Ok(self.references.contains_key(reference.as_bytes())?)
    }

    fn update_transaction(
        &self,
        id: &str,
        patch: &TransactionPatch,
    ) -> StoreResult<EscrowTransaction> {
        self.transactions
            .transaction(|transactions| {
                let Some(mut tx) = tx_get::<EscrowTransaction>(transactions, id)? else {
                    return abort(StoreError::TransactionNotFound(id.to_string()));
                };
                if tx.is_terminal() {
                    return abort(StoreError::AlreadySettled(id.to_string()));
                }
                patch.apply(&mut tx);
                tx_put(transactions, id, &tx)?;
                Ok(tx)
            })
            .map_err(flatten)
    }

    fn list_transactions_for_account(
        &self,
        account_id: &str,
    ) -> StoreResult<Vec<EscrowTransaction>> {
        let prefix = party_key(account_id, "");
        let mut txs = Vec::new();
        for entry in self.party_index.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            let key = decode_str(&key)?;
            let tx_id = &key[prefix.len()..];
            let tx = Self::get::<EscrowTransaction>(&self.transactions, tx_id)?
                .ok_or_else(|| StoreError::TransactionNotFound(tx_id.to_string()))?;
            txs.push(tx);
        }
        txs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(txs)
    }

    fn hold_escrow(&self, tx: &EscrowTransaction) -> StoreResult<Account> {
        let sender = (
            &self.accounts,
            &self.transactions,
            &self.references,
            &self.party_index,
        )
            .transaction(|(accounts, transactions, references, party_index)| {
                let Some(mut sender) = tx_get::<Account>(accounts, &tx.sender_id)? else {
                    return abort(StoreError::AccountNotFound(tx.sender_id.clone()));
                };
                let Some(mut receiver) = tx_get::<Account>(accounts, &tx.receiver_id)? else {
                    return abort(StoreError::AccountNotFound(tx.receiver_id.clone()));
                };
                apply_hold(&mut sender, &mut receiver, tx)
                    .map_err(ConflictableTransactionError::Abort)?;
                insert_transaction(transactions, references, party_index, tx)?;
                tx_put(accounts, &sender.id, &sender)?;
                tx_put(accounts, &receiver.id, &receiver)?;
                Ok(sender)
            })
            .map_err(flatten)?;
        self.flush()?;
        Ok(sender)
    }

    fn settle_escrow(&self, tx: &EscrowTransaction, release: &Release) -> StoreResult<Account> {
        let beneficiary = (&self.accounts, &self.transactions)
            .transaction(|(accounts, transactions)| {
                let Some(stored) = tx_get::<EscrowTransaction>(transactions, &tx.id)? else {
                    return abort(StoreError::TransactionNotFound(tx.id.clone()));
                };
                let Some(mut beneficiary) = tx_get::<Account>(accounts, &release.account_id)?
                else {
                    return abort(StoreError::AccountNotFound(release.account_id.clone()));
                };
                apply_settlement(&stored, tx, release, &mut beneficiary)
                    .map_err(ConflictableTransactionError::Abort)?;
                tx_put(transactions, &tx.id, tx)?;
                tx_put(accounts, &beneficiary.id, &beneficiary)?;
                Ok(beneficiary)
            })
            .map_err(flatten)?;
        self.flush()?;
        Ok(beneficiary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
