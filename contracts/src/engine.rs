//! # Escrow Engine
//!
//! Orchestrates accounts and escrow transactions on top of a [`Store`].
//!
//! The lifecycle rules themselves live on
//! [`EscrowTransaction`](vaultpay_protocol::transaction::EscrowTransaction);
//! the engine adds what they cannot know about:
//!
//! 1. **Who is calling** — every user operation takes an explicit
//!    [`Session`].
//! 2. **Serialization** — lifecycle steps on the same transaction run one at
//!    a time under a per-transaction mutex.
//! 3. **Money** — creation places a hold, terminal transitions settle it, and
//!    both go through the store's atomic operations.
//!
//! The engine is `Send + Sync`; share it behind an `Arc`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use vaultpay_protocol::account::{
    credentials, normalize_email, Account, ProfileUpdate, PublicProfile, Signup,
};
use vaultpay_protocol::clock::Clock;
use vaultpay_protocol::config::EngineConfig;
use vaultpay_protocol::ids::{generate_vault_id, generate_vtid, new_id, normalize_code};
use vaultpay_protocol::money::Amount;
use vaultpay_protocol::session::Session;
use vaultpay_protocol::storage::Store;
use vaultpay_protocol::transaction::{
    Direction, DraftError, EscrowDraft, EscrowTransaction, LifecycleError, Party, Release,
    TimeRemaining, TransactionPatch, Transition,
};
use vaultpay_protocol::trust::{TransactionStats, TrustReport};

use crate::error::{EngineError, EngineResult};

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Everything the sender supplies to open an escrow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    /// Receiver's public lookup code, as typed.
    pub recipient_vault_id: String,
    pub amount: Amount,
    pub conditions: Vec<String>,
    /// Falls back to [`EngineConfig::default_time_limit_hours`].
    #[serde(default)]
    pub time_limit_hours: Option<u32>,
}

/// A transaction as one of its parties sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: EscrowTransaction,
    /// The viewer's side.
    pub role: Party,
    /// The other side, if the account still resolves.
    pub counterparty: Option<PublicProfile>,
    pub time_remaining: TimeRemaining,
    pub unread: bool,
}

/// Result of a lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub transaction: EscrowTransaction,
    /// Set when the step settled the escrow.
    pub release: Option<Release>,
}

/// A public profile together with its trust report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicAccount {
    #[serde(flatten)]
    pub profile: PublicProfile,
    pub trust: TrustReport,
}

// ---------------------------------------------------------------------------
// EscrowEngine
// ---------------------------------------------------------------------------

pub struct EscrowEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    /// Per-transaction serialization. An entry exists only while a step on
    /// that transaction is running or waiting.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for EscrowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowEngine")
            .field("config", &self.config)
            .field("locked_transactions", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl EscrowEngine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            config,
            locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -- Accounts -----------------------------------------------------------

    /// Creates an account with the configured starting balance and opens a
    /// session for it.
    ///
    /// # Errors
    ///
    /// [`EngineError::MissingField`] for a blank email, name or password (in
    /// that order), [`EngineError::EmailTaken`] if the email is registered.
    pub fn register(&self, signup: Signup) -> EngineResult<(Account, Session)> {
        let email = normalize_email(&signup.email);
        let name = signup.name.trim();
        if email.is_empty() {
            return Err(EngineError::MissingField("Email is required"));
        }
        if name.is_empty() {
            return Err(EngineError::MissingField("Name is required"));
        }
        if signup.password.trim().is_empty() {
            return Err(EngineError::MissingField("Password is required"));
        }
        if self.store.get_account_by_email(&email)?.is_some() {
            return Err(EngineError::EmailTaken);
        }

        let password_hash = credentials::hash_password(&signup.password)?;
        let vault_id = generate_vault_id(|code| self.store.vault_id_exists(code))?
            .ok_or(EngineError::CodeExhausted("vault id"))?;
        let now = self.clock.now();
        let account = Account {
            id: new_id(),
            vault_id,
            name: name.to_string(),
            email,
            phone: signup.phone.trim().to_string(),
            location: signup.location.trim().to_string(),
            balance: self.config.starting_balance,
            password_hash,
            created_at: now,
            unread_transactions: Vec::new(),
        };
        self.store
            .create_account(&account)
            .map_err(EngineError::from_store)?;

        info!(account = %account.id, vault_id = %account.vault_id, "account registered");
        let session = Session::open(&account, now);
        Ok((account, session))
    }

    /// Checks credentials and opens a session.
    pub fn login(&self, email: &str, password: &str) -> EngineResult<(Account, Session)> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(EngineError::MissingField("Email is required"));
        }
        let account = self
            .store
            .get_account_by_email(&email)?
            .ok_or(EngineError::UserNotFound)?;
        if !credentials::verify_password(password, &account.password_hash) {
            warn!(account = %account.id, "login rejected");
            return Err(EngineError::InvalidCredentials);
        }
        debug!(account = %account.id, "login");
        let session = Session::open(&account, self.clock.now());
        Ok((account, session))
    }

    /// The caller's own account.
    pub fn account(&self, session: &Session) -> EngineResult<Account> {
        self.store
            .get_account(&session.account_id)?
            .ok_or_else(|| EngineError::AccountNotFound(session.account_id.clone()))
    }

    pub fn update_profile(
        &self,
        session: &Session,
        update: &ProfileUpdate,
    ) -> EngineResult<Account> {
        if matches!(&update.name, Some(name) if name.trim().is_empty()) {
            return Err(EngineError::MissingField("Name is required"));
        }
        self.store
            .update_profile(&session.account_id, update)
            .map_err(EngineError::from_store)
    }

    /// Resolves a vault id the caller wants to send money to.
    pub fn find_recipient(&self, session: &Session, vault_id: &str) -> EngineResult<PublicProfile> {
        let account = self.resolve_recipient(session, vault_id)?;
        Ok(account.public_profile())
    }

    /// Anyone's public profile and trust report.
    pub fn public_profile(&self, vault_id: &str) -> EngineResult<PublicAccount> {
        let code = normalize_code(vault_id);
        if code.is_empty() {
            return Err(EngineError::MissingField("Please enter a VaultID"));
        }
        let account = self
            .store
            .get_account_by_vault_id(&code)?
            .ok_or(EngineError::UserNotFound)?;
        Ok(PublicAccount {
            trust: self.trust_report(&account.id)?,
            profile: account.public_profile(),
        })
    }

    /// Recomputes the trust report from the account's full history.
    pub fn trust_report(&self, account_id: &str) -> EngineResult<TrustReport> {
        let history = self.store.list_transactions_for_account(account_id)?;
        Ok(TransactionStats::for_account(account_id, &history).into())
    }

    fn resolve_recipient(&self, session: &Session, vault_id: &str) -> EngineResult<Account> {
        let code = normalize_code(vault_id);
        if code.is_empty() {
            return Err(EngineError::MissingField("Please enter a VaultID"));
        }
        let recipient = self
            .store
            .get_account_by_vault_id(&code)?
            .ok_or(EngineError::RecipientNotFound)?;
        if recipient.id == session.account_id {
            return Err(DraftError::SelfTransfer.into());
        }
        Ok(recipient)
    }

    // -- Escrow creation ----------------------------------------------------

    /// Opens an escrow: validates, debits the sender, stores the `Pending`
    /// transaction.
    ///
    /// # Errors
    ///
    /// Checked in this order: recipient ([`EngineError::RecipientNotFound`],
    /// self transfer), conditions, time limit, amount, then balance
    /// ([`EngineError::InsufficientBalance`]). The balance is re-checked
    /// inside the store's atomic hold.
    pub fn send(&self, session: &Session, request: SendRequest) -> EngineResult<EscrowTransaction> {
        let recipient = self.resolve_recipient(session, &request.recipient_vault_id)?;
        let sender = self.account(session)?;

        let reference = generate_vtid(|code| self.store.reference_exists(code))?
            .ok_or(EngineError::CodeExhausted("transaction reference"))?;
        let tx = EscrowDraft {
            sender_id: sender.id.clone(),
            receiver_id: recipient.id.clone(),
            amount: request.amount,
            conditions: request.conditions,
            time_limit_hours: request
                .time_limit_hours
                .unwrap_or(self.config.default_time_limit_hours),
        }
        .build(new_id(), reference, self.clock.now())?;

        if sender.balance < tx.amount {
            return Err(EngineError::InsufficientBalance {
                available: sender.balance,
                requested: tx.amount,
            });
        }
        let sender = self.store.hold_escrow(&tx).map_err(EngineError::from_store)?;

        info!(
            tx = %tx.id,
            reference = %tx.reference,
            sender = %sender.id,
            receiver = %recipient.id,
            amount = %tx.amount,
            "escrow opened"
        );
        Ok(tx)
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Receiver accepts. Starts the deadline and marks the transaction read.
    pub fn accept(&self, session: &Session, tx_id: &str) -> EngineResult<StepOutcome> {
        let outcome = self.step(session, tx_id, "accept", |tx, caller, now| tx.accept(caller, now))?;
        // The accept is already committed.
        if let Err(e) = self.store.mark_transaction_read(&session.account_id, tx_id) {
            warn!(tx = %tx_id, account = %session.account_id, error = %e, "failed to clear unread marker");
        }
        Ok(outcome)
    }

    /// Sender flips condition `index`.
    pub fn toggle_condition(
        &self,
        session: &Session,
        tx_id: &str,
        index: usize,
    ) -> EngineResult<StepOutcome> {
        self.step(session, tx_id, "toggle_condition", |tx, caller, now| {
            tx.toggle_condition(caller, index, now)
        })
    }

    /// Sender confirms the order arrived.
    pub fn mark_order_received(&self, session: &Session, tx_id: &str) -> EngineResult<StepOutcome> {
        self.step(session, tx_id, "mark_order_received", |tx, caller, now| {
            tx.mark_order_received(caller, now)
        })
    }

    /// Sender reclaims the funds after the deadline.
    pub fn cancel(&self, session: &Session, tx_id: &str) -> EngineResult<StepOutcome> {
        self.step(session, tx_id, "cancel", |tx, caller, now| tx.cancel(caller, now))
    }

    /// Runs one lifecycle step under the transaction's lock and persists the
    /// outcome.
    fn step(
        &self,
        session: &Session,
        tx_id: &str,
        op: &'static str,
        apply: impl FnOnce(&mut EscrowTransaction, &str, DateTime<Utc>) -> Result<Transition, LifecycleError>,
    ) -> EngineResult<StepOutcome> {
        // Unknown ids and outsiders never get a lock entry.
        self.load_for_party(session, tx_id)?;

        let lock = self.lock_for(tx_id);
        let result = {
            let _guard = lock.lock();
            self.step_locked(session, tx_id, op, apply)
        };
        drop(lock);
        self.locks
            .remove_if(tx_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Body of [`Self::step`]. The caller holds the transaction's lock.
    fn step_locked(
        &self,
        session: &Session,
        tx_id: &str,
        op: &'static str,
        apply: impl FnOnce(&mut EscrowTransaction, &str, DateTime<Utc>) -> Result<Transition, LifecycleError>,
    ) -> EngineResult<StepOutcome> {
        let mut tx = self.load_for_party(session, tx_id)?;
        let transition = apply(&mut tx, &session.account_id, self.clock.now())?;

        let outcome = match transition {
            Transition::Updated => {
                let stored = self
                    .store
                    .update_transaction(tx_id, &TransactionPatch::from_transaction(&tx))
                    .map_err(EngineError::from_store)?;
                debug!(tx = %tx_id, op, status = %stored.status, "escrow updated");
                StepOutcome {
                    transaction: stored,
                    release: None,
                }
            }
            Transition::Settled(release) => {
                let beneficiary = self
                    .store
                    .settle_escrow(&tx, &release)
                    .map_err(EngineError::from_store)?;
                info!(
                    tx = %tx_id,
                    op,
                    status = %tx.status,
                    beneficiary = %beneficiary.id,
                    amount = %release.amount,
                    "escrow settled"
                );
                StepOutcome {
                    transaction: tx,
                    release: Some(release),
                }
            }
        };

        Ok(outcome)
    }

    /// Entries live only while some step holds or waits on them.
    fn lock_for(&self, tx_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(tx_id.to_string()).or_default().value())
    }

    fn load_for_party(&self, session: &Session, tx_id: &str) -> EngineResult<EscrowTransaction> {
        let tx = self
            .store
            .get_transaction(tx_id)?
            .ok_or_else(|| EngineError::TransactionNotFound(tx_id.to_string()))?;
        if tx.party_of(&session.account_id).is_none() {
            return Err(EngineError::NotAParty);
        }
        Ok(tx)
    }

    // -- Reads --------------------------------------------------------------

    /// One transaction, visible only to its parties.
    pub fn transaction(&self, session: &Session, tx_id: &str) -> EngineResult<TransactionView> {
        let tx = self.load_for_party(session, tx_id)?;
        let viewer = self.account(session)?;
        self.view(&viewer, tx, self.clock.now())
    }

    /// Time left before the sender may cancel.
    pub fn time_remaining(&self, session: &Session, tx_id: &str) -> EngineResult<TimeRemaining> {
        let tx = self.load_for_party(session, tx_id)?;
        Ok(tx.time_remaining(self.clock.now()))
    }

    /// The caller's transactions, newest first. `None` returns both
    /// directions.
    pub fn history(
        &self,
        session: &Session,
        direction: Option<Direction>,
    ) -> EngineResult<Vec<TransactionView>> {
        let viewer = self.account(session)?;
        let now = self.clock.now();
        let mut txs = self.store.list_transactions_for_account(&viewer.id)?;
        txs.reverse();
        txs.into_iter()
            .filter(|tx| match direction {
                None => true,
                Some(Direction::Sent) => tx.sender_id == viewer.id,
                Some(Direction::Received) => tx.receiver_id == viewer.id,
            })
            .map(|tx| self.view(&viewer, tx, now))
            .collect()
    }

    /// Clears `tx_id` from the caller's unread list.
    pub fn mark_read(&self, session: &Session, tx_id: &str) -> EngineResult<Account> {
        self.load_for_party(session, tx_id)?;
        self.store
            .mark_transaction_read(&session.account_id, tx_id)
            .map_err(EngineError::from_store)
    }

    fn view(
        &self,
        viewer: &Account,
        tx: EscrowTransaction,
        now: DateTime<Utc>,
    ) -> EngineResult<TransactionView> {
        let role = tx.party_of(&viewer.id).ok_or(EngineError::NotAParty)?;
        let other = match role {
            Party::Sender => Party::Receiver,
            Party::Receiver => Party::Sender,
        };
        let counterparty = self
            .store
            .get_account(tx.account_of(other))?
            .map(|a| a.public_profile());
        Ok(TransactionView {
            role,
            counterparty,
            time_remaining: tx.time_remaining(now),
            unread: viewer.unread_transactions.contains(&tx.id),
            transaction: tx,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vaultpay_protocol::clock::ManualClock;
    use vaultpay_protocol::storage::{MemoryStore, StoreError, StoreResult};
    use vaultpay_protocol::transaction::EscrowStatus;

    fn engine() -> (EscrowEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let engine = EscrowEngine::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            EngineConfig::default(),
        );
        (engine, clock)
    }

    fn signup(engine: &EscrowEngine, name: &str) -> (Account, Session) {
        engine
            .register(Signup {
                name: name.into(),
                email: format!("{name}@vaultpay.test"),
                password: "hunter2".into(),
                ..Signup::default()
            })
            .unwrap()
    }

    fn request(to: &Account, amount: &str) -> SendRequest {
        SendRequest {
            recipient_vault_id: to.vault_id.clone(),
            amount: amount.parse().unwrap(),
            conditions: vec!["Deliver goods".into()],
            time_limit_hours: Some(1),
        }
    }

    #[test]
    fn register_validates_and_rejects_duplicates() {
        let (engine, _) = engine();
        let err = engine
            .register(Signup {
                name: "x".into(),
                password: "p".into(),
                ..Signup::default()
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "Email is required");

        let (account, session) = signup(&engine, "amina");
        assert_eq!(account.balance, Amount::from_minor(100_000));
        assert!(account.vault_id.starts_with("VID-"));
        assert_eq!(session.account_id, account.id);

        let err = engine
            .register(Signup {
                name: "Other".into(),
                email: " AMINA@vaultpay.test ".into(),
                password: "p".into(),
                ..Signup::default()
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::EmailTaken));
    }

    #[test]
    fn login_checks_password() {
        let (engine, _) = engine();
        let (account, _) = signup(&engine, "amina");

        let (found, _) = engine.login("Amina@vaultpay.test", "hunter2").unwrap();
        assert_eq!(found.id, account.id);
        assert!(matches!(
            engine.login("amina@vaultpay.test", "wrong"),
            Err(EngineError::InvalidCredentials)
        ));
        assert!(matches!(
            engine.login("nobody@vaultpay.test", "hunter2"),
            Err(EngineError::UserNotFound)
        ));
    }

    #[test]
    fn send_validation_order() {
        let (engine, _) = engine();
        let (alice, a) = signup(&engine, "alice");
        let (bob, _) = signup(&engine, "bob");

        let mut req = request(&bob, "0");
        req.conditions.clear();
        req.recipient_vault_id = "VID-NOPE0000".into();
        assert!(matches!(engine.send(&a, req.clone()), Err(EngineError::RecipientNotFound)));

        req.recipient_vault_id = alice.vault_id.clone();
        assert!(matches!(
            engine.send(&a, req.clone()),
            Err(EngineError::Draft(DraftError::SelfTransfer))
        ));

        req.recipient_vault_id = bob.vault_id.to_lowercase();
        assert!(matches!(
            engine.send(&a, req.clone()),
            Err(EngineError::Draft(DraftError::NoConditions))
        ));

        req.conditions = vec!["x".into()];
        req.time_limit_hours = Some(0);
        assert!(matches!(
            engine.send(&a, req.clone()),
            Err(EngineError::Draft(DraftError::InvalidTimeLimit))
        ));

        req.time_limit_hours = None;
        assert!(matches!(
            engine.send(&a, req.clone()),
            Err(EngineError::Draft(DraftError::ZeroAmount))
        ));

        req.amount = "1000.01".parse().unwrap();
        assert!(matches!(
            engine.send(&a, req.clone()),
            Err(EngineError::InsufficientBalance { .. })
        ));

        req.amount = "1000".parse().unwrap();
        let tx = engine.send(&a, req).unwrap();
        assert_eq!(tx.time_limit_hours, 48);
        assert_eq!(engine.account(&a).unwrap().balance, Amount::ZERO);
    }

    #[test]
    fn only_parties_can_see_or_touch_a_transaction() {
        let (engine, _) = engine();
        let (_, a) = signup(&engine, "alice");
        let (bob, b) = signup(&engine, "bob");
        let (_, c) = signup(&engine, "carol");

        let tx = engine.send(&a, request(&bob, "10")).unwrap();
        assert!(matches!(engine.transaction(&c, &tx.id), Err(EngineError::NotAParty)));
        assert!(matches!(engine.accept(&c, &tx.id), Err(EngineError::NotAParty)));
        assert!(matches!(
            engine.accept(&a, &tx.id),
            Err(EngineError::Lifecycle(LifecycleError::WrongParty {
                required: Party::Receiver
            }))
        ));
        assert!(matches!(
            engine.accept(&b, "missing"),
            Err(EngineError::TransactionNotFound(_))
        ));
    }

    #[test]
    fn accept_marks_read_and_view_reflects_role() {
        let (engine, clock) = engine();
        let (alice, a) = signup(&engine, "alice");
        let (bob, b) = signup(&engine, "bob");

        let tx = engine.send(&a, request(&bob, "300")).unwrap();
        let view = engine.transaction(&b, &tx.id).unwrap();
        assert!(view.unread);
        assert_eq!(view.role, Party::Receiver);
        assert_eq!(view.counterparty.unwrap().vault_id, alice.vault_id);

        clock.advance(Duration::minutes(10));
        let outcome = engine.accept(&b, &tx.id).unwrap();
        assert_eq!(outcome.transaction.status, EscrowStatus::Accepted);
        assert_eq!(
            engine.time_remaining(&a, &tx.id).unwrap(),
            TimeRemaining::Remaining {
                hours: 1,
                minutes: 0
            }
        );
        assert!(!engine.transaction(&b, &tx.id).unwrap().unread);
    }

    #[test]
    fn completion_credits_receiver_once() {
        let (engine, _) = engine();
        let (_, a) = signup(&engine, "alice");
        let (bob, b) = signup(&engine, "bob");

        let tx = engine.send(&a, request(&bob, "300")).unwrap();
        engine.accept(&b, &tx.id).unwrap();
        assert!(engine.toggle_condition(&a, &tx.id, 0).unwrap().release.is_none());
        let outcome = engine.mark_order_received(&a, &tx.id).unwrap();
        assert_eq!(outcome.transaction.status, EscrowStatus::Completed);
        assert_eq!(outcome.release.unwrap().beneficiary, Party::Receiver);

        assert_eq!(engine.account(&b).unwrap().balance, Amount::from_minor(130_000));
        assert_eq!(engine.account(&a).unwrap().balance, Amount::from_minor(70_000));

        assert!(engine.mark_order_received(&a, &tx.id).is_err());
        assert!(engine.cancel(&a, &tx.id).is_err());
        assert_eq!(engine.account(&b).unwrap().balance, Amount::from_minor(130_000));
    }

    #[test]
    fn cancel_after_deadline_refunds_sender() {
        let (engine, clock) = engine();
        let (_, a) = signup(&engine, "alice");
        let (bob, b) = signup(&engine, "bob");

        let tx = engine.send(&a, request(&bob, "250.50")).unwrap();
        engine.accept(&b, &tx.id).unwrap();
        assert!(matches!(
            engine.cancel(&a, &tx.id),
            Err(EngineError::Lifecycle(LifecycleError::TimeLimitNotExpired { .. }))
        ));

        clock.advance(Duration::hours(1));
        let outcome = engine.cancel(&a, &tx.id).unwrap();
        assert_eq!(outcome.transaction.status, EscrowStatus::Cancelled);
        assert_eq!(engine.account(&a).unwrap().balance, Amount::from_minor(100_000));
        assert_eq!(engine.account(&b).unwrap().balance, Amount::from_minor(100_000));
        assert_eq!(engine.time_remaining(&b, &tx.id).unwrap(), TimeRemaining::Closed);
    }

    #[test]
    fn history_filters_by_direction_newest_first() {
        let (engine, clock) = engine();
        let (alice, a) = signup(&engine, "alice");
        let (bob, b) = signup(&engine, "bob");

        let first = engine.send(&a, request(&bob, "1")).unwrap();
        clock.advance(Duration::seconds(1));
        let second = engine.send(&b, request(&alice, "2")).unwrap();
        clock.advance(Duration::seconds(1));
        let third = engine.send(&a, request(&bob, "3")).unwrap();

        let ids = |views: Vec<TransactionView>| -> Vec<String> {
            views.into_iter().map(|v| v.transaction.id).collect()
        };
        assert_eq!(
            ids(engine.history(&a, None).unwrap()),
            vec![third.id.clone(), second.id.clone(), first.id.clone()]
        );
        assert_eq!(
            ids(engine.history(&a, Some(Direction::Sent)).unwrap()),
            vec![third.id.clone(), first.id.clone()]
        );
        assert_eq!(
            ids(engine.history(&a, Some(Direction::Received)).unwrap()),
            vec![second.id.clone()]
        );

        let acct = engine.mark_read(&a, &second.id).unwrap();
        assert!(acct.unread_transactions.is_empty());
    }

    #[test]
    fn public_profile_and_recipient_lookup() {
        let (engine, _) = engine();
        let (alice, a) = signup(&engine, "alice");
        let (bob, _) = signup(&engine, "bob");

        assert!(matches!(
            engine.find_recipient(&a, "   "),
            Err(EngineError::MissingField("Please enter a VaultID"))
        ));
        assert!(matches!(
            engine.find_recipient(&a, &alice.vault_id),
            Err(EngineError::Draft(DraftError::SelfTransfer))
        ));
        assert_eq!(engine.find_recipient(&a, &bob.vault_id).unwrap().name, "bob");

        let public = engine.public_profile(&bob.vault_id).unwrap();
        assert_eq!(public.trust.score, 100);
        assert!(matches!(
            engine.public_profile("VID-NOPE0000"),
            Err(EngineError::UserNotFound)
        ));
    }

    #[test]
    fn profile_update_rejects_blank_name() {
        let (engine, _) = engine();
        let (_, a) = signup(&engine, "alice");
        let blank = ProfileUpdate {
            name: Some("  ".into()),
            ..ProfileUpdate::default()
        };
        assert!(matches!(
            engine.update_profile(&a, &blank),
            Err(EngineError::MissingField(_))
        ));
        let updated = engine
            .update_profile(
                &a,
                &ProfileUpdate {
                    location: Some("Kisumu".into()),
                    ..ProfileUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.location, "Kisumu");
    }

    #[test]
    fn lock_entries_do_not_outlive_steps() {
        let (engine, _) = engine();
        let (_, a) = signup(&engine, "alice");
        let (bob, b) = signup(&engine, "bob");
        let (_, c) = signup(&engine, "carol");

        for i in 0..1_000 {
            assert!(engine.accept(&b, &format!("bogus-{i}")).is_err());
        }
        assert_eq!(engine.locks.len(), 0);

        let pending = engine.send(&a, request(&bob, "5")).unwrap();
        let accepted = engine.send(&a, request(&bob, "5")).unwrap();
        assert!(engine.accept(&c, &pending.id).is_err());
        assert!(engine.accept(&a, &pending.id).is_err());
        engine.accept(&b, &accepted.id).unwrap();
        engine.toggle_condition(&a, &accepted.id, 0).unwrap();
        assert!(engine.toggle_condition(&a, &accepted.id, 9).is_err());
        assert_eq!(engine.locks.len(), 0);
        assert!(format!("{engine:?}").contains("locked_transactions: 0"));
    }

    /// Delegates to a [`MemoryStore`] but cannot clear unread markers.
    struct StuckUnread(MemoryStore);

    impl Store for StuckUnread {
        fn create_account(&self, account: &Account) -> StoreResult<()> {
            self.0.create_account(account)
        }
        fn get_account(&self, id: &str) -> StoreResult<Option<Account>> {
            self.0.get_account(id)
        }
        fn get_account_by_vault_id(&self, vault_id: &str) -> StoreResult<Option<Account>> {
            self.0.get_account_by_vault_id(vault_id)
        }
        fn get_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
            self.0.get_account_by_email(email)
        }
        fn update_account_balance(&self, id: &str, balance: Amount) -> StoreResult<Account> {
            self.0.update_account_balance(id, balance)
        }
        fn update_profile(&self, id: &str, update: &ProfileUpdate) -> StoreResult<Account> {
            self.0.update_profile(id, update)
        }
        fn mark_transaction_read(&self, _: &str, tx_id: &str) -> StoreResult<Account> {
            Err(StoreError::Invalid(format!("cannot mark {tx_id} read")))
        }
        fn create_transaction(&self, tx: &EscrowTransaction) -> StoreResult<()> {
            self.0.create_transaction(tx)
        }
        fn get_transaction(&self, id: &str) -> StoreResult<Option<EscrowTransaction>> {
            self.0.get_transaction(id)
        }
        fn get_transaction_by_reference(
            &self,
            reference: &str,
        ) -> StoreResult<Option<EscrowTransaction>> {
            self.0.get_transaction_by_reference(reference)
        }
        fn update_transaction(
            &self,
            id: &str,
            patch: &TransactionPatch,
        ) -> StoreResult<EscrowTransaction> {
            self.0.update_transaction(id, patch)
        }
        fn list_transactions_for_account(
            &self,
            account_id: &str,
        ) -> StoreResult<Vec<EscrowTransaction>> {
            self.0.list_transactions_for_account(account_id)
        }
        fn hold_escrow(&self, tx: &EscrowTransaction) -> StoreResult<Account> {
            self.0.hold_escrow(tx)
        }
        fn settle_escrow(&self, tx: &EscrowTransaction, release: &Release) -> StoreResult<Account> {
            self.0.settle_escrow(tx, release)
        }
    }

    #[test]
    fn accept_is_not_undone_by_unread_marker_failure() {
        let engine = EscrowEngine::new(
            Arc::new(StuckUnread(MemoryStore::new())),
            Arc::new(ManualClock::default()),
            EngineConfig::default(),
        );
        let (_, a) = signup(&engine, "alice");
        let (bob, b) = signup(&engine, "bob");
        let tx = engine.send(&a, request(&bob, "10")).unwrap();

        let outcome = engine.accept(&b, &tx.id).unwrap();
        assert_eq!(outcome.transaction.status, EscrowStatus::Accepted);
        assert!(engine.transaction(&b, &tx.id).unwrap().unread);
    }
}
