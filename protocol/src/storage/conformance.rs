//! Behaviour every [`Store`] implementation must share. Each backend's test
//! module calls these against a fresh instance.

use chrono::{Duration, Utc};

use super::{Store, StoreError};
use crate::account::{sample_account, Account, ProfileUpdate};
use crate::money::Amount;
use crate::transaction::{
    Condition, EscrowStatus, EscrowTransaction, Party, Release, TransactionPatch, Transition,
};

fn seed(store: &dyn Store, id: &str, vault_id: &str, balance: u64) -> Account {
    let account = sample_account(id, vault_id, Amount::from_minor(balance));
    store.create_account(&account).unwrap();
    account
}

fn escrow(id: &str, reference: &str, sender: &str, receiver: &str, amount: u64) -> EscrowTransaction {
    EscrowTransaction {
        id: id.to_string(),
        reference: reference.to_string(),
        sender_id: sender.to_string(),
        receiver_id: receiver.to_string(),
        amount: Amount::from_minor(amount),
        status: EscrowStatus::Pending,
        conditions: vec![Condition::new("deliver")],
        time_limit_hours: 48,
        created_at: Utc::now(),
        accepted_at: None,
        order_received: false,
        settled_at: None,
    }
}

fn settled(store: &dyn Store, tx: &mut EscrowTransaction) -> Release {
    let now = Utc::now();
    tx.accept(&tx.receiver_id.clone(), now).unwrap();
    store
        .update_transaction(&tx.id, &TransactionPatch::from_transaction(tx))
        .unwrap();
    tx.toggle_condition(&tx.sender_id.clone(), 0, now).unwrap();
    match tx.mark_order_received(&tx.sender_id.clone(), now).unwrap() {
        Transition::Settled(release) => release,
        Transition::Updated => panic!("expected completion"),
    }
}

pub(crate) fn account_crud(store: &dyn Store) {
    let alice = seed(store, "alice", "VID-AAAAAAAA", 100_000);

    assert_eq!(store.get_account("alice").unwrap(), Some(alice.clone()));
    assert_eq!(
        store.get_account_by_vault_id("VID-AAAAAAAA").unwrap(),
        Some(alice.clone())
    );
    assert_eq!(
        store.get_account_by_email("  ALICE@example.com ").unwrap(),
        Some(alice.clone())
    );
    assert!(store.vault_id_exists("VID-AAAAAAAA").unwrap());
    assert!(!store.vault_id_exists("VID-ZZZZZZZZ").unwrap());
    assert!(store.get_account("nobody").unwrap().is_none());

    let updated = store
        .update_account_balance("alice", Amount::from_minor(5))
        .unwrap();
    assert_eq!(updated.balance, Amount::from_minor(5));

    let updated = store
        .update_profile(
            "alice",
            &ProfileUpdate {
                name: Some("Alice W".into()),
                phone: None,
                location: Some("Mombasa".into()),
            },
        )
        .unwrap();
    assert_eq!(updated.name, "Alice W");
    assert_eq!(updated.location, "Mombasa");
    assert_eq!(store.get_account("alice").unwrap(), Some(updated));

    assert!(matches!(
        store.update_account_balance("nobody", Amount::ZERO),
        Err(StoreError::AccountNotFound(_))
    ));
}

pub(crate) fn duplicate_accounts_rejected(store: &dyn Store) {
    seed(store, "alice", "VID-AAAAAAAA", 0);

    let mut same_email = sample_account("other", "VID-BBBBBBBB", Amount::ZERO);
    same_email.email = "Alice@Example.com".into();
    assert!(matches!(
        store.create_account(&same_email),
        Err(StoreError::Duplicate { kind: "email", .. })
    ));

    let same_vault = sample_account("other", "VID-AAAAAAAA", Amount::ZERO);
    assert!(matches!(
        store.create_account(&same_vault),
        Err(StoreError::Duplicate { kind: "vault id", .. })
    ));

    // Neither failed insert may leave index entries behind.
    assert!(!store.vault_id_exists("VID-BBBBBBBB").unwrap());
    assert!(store.get_account("other").unwrap().is_none());
}

pub(crate) fn hold_debits_sender_and_notifies_receiver(store: &dyn Store) {
    seed(store, "alice", "VID-AAAAAAAA", 100_000);
    seed(store, "bob", "VID-BBBBBBBB", 0);

    let tx = escrow("t1", "VTID-AAAAAAAAAA", "alice", "bob", 30_000);
    let sender = store.hold_escrow(&tx).unwrap();
    assert_eq!(sender.balance, Amount::from_minor(70_000));

    let bob = store.get_account("bob").unwrap().unwrap();
    assert_eq!(bob.balance, Amount::ZERO);
    assert_eq!(bob.unread_transactions, vec!["t1".to_string()]);

    assert_eq!(store.get_transaction("t1").unwrap(), Some(tx.clone()));
    assert_eq!(
        store.get_transaction_by_reference("VTID-AAAAAAAAAA").unwrap(),
        Some(tx.clone())
    );
    assert!(store.reference_exists("VTID-AAAAAAAAAA").unwrap());

    let bob = store.mark_transaction_read("bob", "t1").unwrap();
    assert!(bob.unread_transactions.is_empty());

    // Same reference again is refused and nothing moves.
    let dup = escrow("t2", "VTID-AAAAAAAAAA", "alice", "bob", 1_000);
    assert!(matches!(
        store.hold_escrow(&dup),
        Err(StoreError::Duplicate { kind: "reference", .. })
    ));
    let alice = store.get_account("alice").unwrap().unwrap();
    assert_eq!(alice.balance, Amount::from_minor(70_000));
}

pub(crate) fn hold_rejects_overdraft(store: &dyn Store) {
    seed(store, "alice", "VID-AAAAAAAA", 1_000);
    seed(store, "bob", "VID-BBBBBBBB", 0);

    let tx = escrow("t1", "VTID-AAAAAAAAAA", "alice", "bob", 1_001);
    match store.hold_escrow(&tx) {
        Err(StoreError::InsufficientBalance {
            available,
            requested,
        }) => {
            assert_eq!(available, Amount::from_minor(1_000));
            assert_eq!(requested, Amount::from_minor(1_001));
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }
    assert!(store.get_transaction("t1").unwrap().is_none());
    let bob = store.get_account("bob").unwrap().unwrap();
    assert!(bob.unread_transactions.is_empty());

    // Exact balance is fine.
    let tx = escrow("t2", "VTID-BBBBBBBBBB", "alice", "bob", 1_000);
    assert_eq!(store.hold_escrow(&tx).unwrap().balance, Amount::ZERO);

    let missing = escrow("t3", "VTID-CCCCCCCCCC", "alice", "ghost", 1);
    assert!(matches!(
        store.hold_escrow(&missing),
        Err(StoreError::AccountNotFound(_))
    ));
}

pub(crate) fn settle_credits_exactly_once(store: &dyn Store) {
    seed(store, "alice", "VID-AAAAAAAA", 100_000);
    seed(store, "bob", "VID-BBBBBBBB", 0);

    let mut tx = escrow("t1", "VTID-AAAAAAAAAA", "alice", "bob", 30_000);
    store.hold_escrow(&tx).unwrap();
    let release = settled(store, &mut tx);
    assert_eq!(release.beneficiary, Party::Receiver);

    let bob = store.settle_escrow(&tx, &release).unwrap();
    assert_eq!(bob.balance, Amount::from_minor(30_000));
    let stored = store.get_transaction("t1").unwrap().unwrap();
    assert_eq!(stored.status, EscrowStatus::Completed);
    assert!(stored.settled_at.is_some());

    assert!(matches!(
        store.settle_escrow(&tx, &release),
        Err(StoreError::AlreadySettled(_))
    ));
    assert!(matches!(
        store.update_transaction("t1", &TransactionPatch::default()),
        Err(StoreError::AlreadySettled(_))
    ));
    let bob = store.get_account("bob").unwrap().unwrap();
    assert_eq!(bob.balance, Amount::from_minor(30_000));
    let alice = store.get_account("alice").unwrap().unwrap();
    assert_eq!(alice.balance, Amount::from_minor(70_000));
}

pub(crate) fn settle_rejects_mismatched_release(store: &dyn Store) {
    seed(store, "alice", "VID-AAAAAAAA", 100_000);
    seed(store, "bob", "VID-BBBBBBBB", 0);

    let mut tx = escrow("t1", "VTID-AAAAAAAAAA", "alice", "bob", 30_000);
    store.hold_escrow(&tx).unwrap();

    // Not terminal yet.
    let early = Release {
        beneficiary: Party::Receiver,
        account_id: "bob".into(),
        amount: tx.amount,
    };
    assert!(matches!(
        store.settle_escrow(&tx, &early),
        Err(StoreError::Invalid(_))
    ));

    let release = settled(store, &mut tx);
    let inflated = Release {
        amount: Amount::from_minor(999_999),
        ..release.clone()
    };
    assert!(matches!(
        store.settle_escrow(&tx, &inflated),
        Err(StoreError::Invalid(_))
    ));
    let wrong_party = Release {
        beneficiary: Party::Sender,
        account_id: "alice".into(),
        ..release
    };
    assert!(matches!(
        store.settle_escrow(&tx, &wrong_party),
        Err(StoreError::Invalid(_))
    ));

    let stored = store.get_transaction("t1").unwrap().unwrap();
    assert_eq!(stored.status, EscrowStatus::Accepted);
    assert_eq!(
        store.get_account("alice").unwrap().unwrap().balance,
        Amount::from_minor(70_000)
    );
    assert_eq!(
        store.get_account("bob").unwrap().unwrap().balance,
        Amount::ZERO
    );
}

pub(crate) fn update_transaction_and_lookup(store: &dyn Store) {
    let tx = escrow("t1", "VTID-AAAAAAAAAA", "alice", "bob", 10);
    store.create_transaction(&tx).unwrap();
    assert!(matches!(
        store.create_transaction(&tx),
        Err(StoreError::Duplicate { .. })
    ));

    let now = Utc::now();
    let updated = store
        .update_transaction(
            "t1",
            &TransactionPatch {
                status: Some(EscrowStatus::Accepted),
                accepted_at: Some(now),
                ..TransactionPatch::default()
            },
        )
        .unwrap();
    assert_eq!(updated.status, EscrowStatus::Accepted);
    assert_eq!(updated.accepted_at, Some(now));
    assert_eq!(updated.conditions, tx.conditions);
    assert_eq!(store.get_transaction("t1").unwrap(), Some(updated));

    assert!(matches!(
        store.update_transaction("missing", &TransactionPatch::default()),
        Err(StoreError::TransactionNotFound(_))
    ));
    assert!(store.get_transaction_by_reference("VTID-ZZZZZZZZZZ").unwrap().is_none());
}

pub(crate) fn listing_is_per_account_and_ordered(store: &dyn Store) {
    let base = Utc::now();
    let mut first = escrow("t1", "VTID-AAAAAAAAAA", "alice", "bob", 1);
    first.created_at = base;
    let mut second = escrow("t2", "VTID-BBBBBBBBBB", "carol", "alice", 2);
    second.created_at = base + Duration::seconds(5);
    let mut unrelated = escrow("t3", "VTID-CCCCCCCCCC", "bob", "carol", 3);
    unrelated.created_at = base + Duration::seconds(1);

    // Insert out of order.
    store.create_transaction(&second).unwrap();
    store.create_transaction(&unrelated).unwrap();
    store.create_transaction(&first).unwrap();

    let ids: Vec<_> = store
        .list_transactions_for_account("alice")
        .unwrap()
        .into_iter()
        .map(|tx| tx.id)
        .collect();
    assert_eq!(ids, vec!["t1", "t2"]);
    assert_eq!(store.list_transactions_for_account("carol").unwrap().len(), 2);
    assert!(store.list_transactions_for_account("dave").unwrap().is_empty());
}
