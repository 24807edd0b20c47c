//! In-memory [`Store`].
//!
//! All maps sit behind a single `parking_lot::RwLock`, so every write
//! operation (including the two-account escrow moves) is atomic with respect
//! to every other. Nothing survives a restart.

use parking_lot::RwLock;
use std::collections::HashMap;

use super::{apply_hold, apply_settlement, Store, StoreError, StoreResult};
use crate::account::{normalize_email, Account, ProfileUpdate};
use crate::money::Amount;
use crate::transaction::{EscrowTransaction, Release, TransactionPatch};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    /// vault id → account id
    vault_ids: HashMap<String, String>,
    /// email → account id
    emails: HashMap<String, String>,
    transactions: HashMap<String, EscrowTransaction>,
    /// reference → transaction id
    references: HashMap<String, String>,
}

impl MemoryState {
    fn account(&self, id: &str) -> StoreResult<Account> {
        self.accounts
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::AccountNotFound(id.to_string()))
    }

    fn account_mut(&mut self, id: &str) -> StoreResult<&mut Account> {
        self.accounts
            .get_mut(id)
            .ok_or_else(|| StoreError::AccountNotFound(id.to_string()))
    }

    fn insert_transaction(&mut self, tx: &EscrowTransaction) -> StoreResult<()> {
        if self.transactions.contains_key(&tx.id) {
            return Err(StoreError::Duplicate {
                kind: "transaction id",
                value: tx.id.clone(),
            });
        }
        if self.references.contains_key(&tx.reference) {
            return Err(StoreError::Duplicate {
                kind: "reference",
                value: tx.reference.clone(),
            });
        }
        self.references.insert(tx.reference.clone(), tx.id.clone());
        self.transactions.insert(tx.id.clone(), tx.clone());
        Ok(())
    }
}

/// Process-local store, mainly for tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn create_account(&self, account: &Account) -> StoreResult<()> {
        let mut state = self.state.write();
        let email = normalize_email(&account.email);
        if state.emails.contains_key(&email) {
            return Err(StoreError::Duplicate {
                kind: "email",
                value: email,
            });
        }
        if state.vault_ids.contains_key(&account.vault_id) {
            return Err(StoreError::Duplicate {
                kind: "vault id",
                value: account.vault_id.clone(),
            });
        }
        if state.accounts.contains_key(&account.id) {
            return Err(StoreError::Duplicate {
                kind: "account id",
                value: account.id.clone(),
            });
        }
        state.emails.insert(email, account.id.clone());
        state
            .vault_ids
            .insert(account.vault_id.clone(), account.id.clone());
        state.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    fn get_account(&self, id: &str) -> StoreResult<Option<Account>> {
        Ok(self.state.read().accounts.get(id).cloned())
    }

    fn get_account_by_vault_id(&self, vault_id: &str) -> StoreResult<Option<Account>> {
        let state = self.state.read();
        Ok(state
            .vault_ids
            .get(vault_id)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    fn get_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let state = self.state.read();
        Ok(state
            .emails
            .get(&normalize_email(email))
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    fn update_account_balance(&self, id: &str, balance: Amount) -> StoreResult<Account> {
        let mut state = self.state.write();
        let account = state.account_mut(id)?;
        account.balance = balance;
        Ok(account.clone())
    }

    fn update_profile(&self, id: &str, update: &ProfileUpdate) -> StoreResult<Account> {
        let mut state = self.state.write();
        let account = state.account_mut(id)?;
        update.apply(account);
        Ok(account.clone())
    }

    fn mark_transaction_read(&self, account_id: &str, tx_id: &str) -> StoreResult<Account> {
        let mut state = self.state.write();
        let account = state.account_mut(account_id)?;
        account.unread_transactions.retain(|id| id != tx_id);
        Ok(account.clone())
    }

    fn create_transaction(&self, tx: &EscrowTransaction) -> StoreResult<()> {
        self.state.write().insert_transaction(tx)
    }

    fn get_transaction(&self, id: &str) -> StoreResult<Option<EscrowTransaction>> {
        Ok(self.state.read().transactions.get(id).cloned())
    }

    fn get_transaction_by_reference(
        &self,
        reference: &str,
    ) -> StoreResult<Option<EscrowTransaction>> {
        let state = self.state.read();
        Ok(state
            .references
            .get(reference)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    fn update_transaction(
        &self,
        id: &str,
        patch: &TransactionPatch,
    ) -> StoreResult<EscrowTransaction> {
        let mut state = self.state.write();
        let tx = state
            .transactions
            .get_mut(id)
            .ok_or_else(|| StoreError::TransactionNotFound(id.to_string()))?;
        if tx.is_terminal() {
            return Err(StoreError::AlreadySettled(id.to_string()));
        }
        patch.apply(tx);
        Ok(tx.clone())
    }

    fn list_transactions_for_account(
        &self,
        account_id: &str,
    ) -> StoreResult<Vec<EscrowTransaction>> {
        let state = self.state.read();
        let mut txs: Vec<_> = state
            .transactions
            .values()
            .filter(|tx| tx.party_of(account_id).is_some())
            .cloned()
            .collect();
        txs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(txs)
    }

    fn hold_escrow(&self, tx: &EscrowTransaction) -> StoreResult<Account> {
        let mut state = self.state.write();
        let mut sender = state.account(&tx.sender_id)?;
        let mut receiver = state.account(&tx.receiver_id)?;
        apply_hold(&mut sender, &mut receiver, tx)?;
        state.insert_transaction(tx)?;
        state.accounts.insert(receiver.id.clone(), receiver);
        state.accounts.insert(sender.id.clone(), sender.clone());
        Ok(sender)
    }

    fn settle_escrow(&self, tx: &EscrowTransaction, release: &Release) -> StoreResult<Account> {
        let mut state = self.state.write();
        let stored = state
            .transactions
            .get(&tx.id)
            .cloned()
            .ok_or_else(|| StoreError::TransactionNotFound(tx.id.clone()))?;
        let mut beneficiary = state.account(&release.account_id)?;
        apply_settlement(&stored, tx, release, &mut beneficiary)?;
        state.transactions.insert(tx.id.clone(), tx.clone());
        state
            .accounts
            .insert(beneficiary.id.clone(), beneficiary.clone());
        Ok(beneficiary)
    }
}
