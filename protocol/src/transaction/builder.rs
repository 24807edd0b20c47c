//! Escrow transaction construction.
//!
//! [`EscrowDraft`] collects what the sender typed and validates it into a
//! `Pending` [`EscrowTransaction`]. Balance is not checked here; that happens
//! atomically when the store places the hold.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{Condition, EscrowStatus, EscrowTransaction};
use crate::config::MIN_CONDITIONS;
use crate::money::Amount;

/// Reasons a draft cannot become a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("cannot send to self")]
    SelfTransfer,

    #[error("at least one condition required")]
    NoConditions,

    /// A condition was empty after trimming.
    #[error("condition {0} is blank")]
    BlankCondition(usize),

    #[error("time limit must be at least one hour")]
    InvalidTimeLimit,

    #[error("amount must be greater than zero")]
    ZeroAmount,
}

/// Unvalidated send request, already resolved to account ids.
#[derive(Debug, Clone)]
pub struct EscrowDraft {
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: Amount,
    pub conditions: Vec<String>,
    pub time_limit_hours: u32,
}

impl EscrowDraft {
    /// Validates the draft and produces a `Pending` transaction.
    ///
    /// Checks run in the order the user sees them: recipient, conditions,
    /// time limit, amount.
    pub fn build(
        self,
        id: String,
        reference: String,
        now: DateTime<Utc>,
    ) -> Result<EscrowTransaction, DraftError> {
        if self.sender_id == self.receiver_id {
            return Err(DraftError::SelfTransfer);
        }
        if self.conditions.len() < MIN_CONDITIONS {
            return Err(DraftError::NoConditions);
        }
        let conditions = self
            .conditions
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let text = text.trim();
                if text.is_empty() {
                    Err(DraftError::BlankCondition(i))
                } else {
                    Ok(Condition::new(text))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        if self.time_limit_hours == 0 {
            return Err(DraftError::InvalidTimeLimit);
        }
        if self.amount.is_zero() {
            return Err(DraftError::ZeroAmount);
        }

        Ok(EscrowTransaction {
            id,
            reference,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            amount: self.amount,
            status: EscrowStatus::Pending,
            conditions,
            time_limit_hours: self.time_limit_hours,
            created_at: now,
            accepted_at: None,
            order_received: false,
            settled_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> EscrowDraft {
        EscrowDraft {
            sender_id: "alice".into(),
            receiver_id: "bob".into(),
            amount: Amount::from_minor(30_000),
            conditions: vec!["  ship the phone ".into()],
            time_limit_hours: 1,
        }
    }

    fn build(d: EscrowDraft) -> Result<EscrowTransaction, DraftError> {
        d.build("id".into(), "VTID-ABCDEFGHJK".into(), Utc::now())
    }

    #[test]
    fn valid_draft_builds_pending_transaction() {
        let tx = build(draft()).unwrap();
        assert_eq!(tx.status, EscrowStatus::Pending);
        assert_eq!(tx.conditions, vec![Condition::new("ship the phone")]);
        assert!(!tx.order_received);
        assert!(tx.accepted_at.is_none());
    }

    #[test]
    fn rejects_self_transfer() {
        let mut d = draft();
        d.receiver_id = "alice".into();
        assert_eq!(build(d), Err(DraftError::SelfTransfer));
    }

    #[test]
    fn rejects_missing_or_blank_conditions() {
        let mut d = draft();
        d.conditions.clear();
        assert_eq!(build(d), Err(DraftError::NoConditions));

        let mut d = draft();
        d.conditions.push("   ".into());
        assert_eq!(build(d), Err(DraftError::BlankCondition(1)));
    }

    #[test]
    fn rejects_zero_time_limit_and_amount() {
        let mut d = draft();
        d.time_limit_hours = 0;
        assert_eq!(build(d), Err(DraftError::InvalidTimeLimit));

        let mut d = draft();
        d.amount = Amount::ZERO;
        assert_eq!(build(d), Err(DraftError::ZeroAmount));
    }

    #[test]
    fn conditions_are_checked_before_amount() {
        let mut d = draft();
        d.conditions.clear();
        d.amount = Amount::ZERO;
        assert_eq!(build(d), Err(DraftError::NoConditions));
    }
}
