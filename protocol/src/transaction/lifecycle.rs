//! The escrow state machine.
//!
//! Pure transitions on [`EscrowTransaction`]: each method checks who is
//! calling and what state the transaction is in, mutates it, and reports
//! whether money has to move. Nothing here touches storage or balances.
//!
//! Completion has two triggers (ticking the last condition, marking the
//! order received) that converge on a single rule: the transaction completes
//! as soon as the order is received *and* every condition is met.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{EscrowStatus, EscrowTransaction, Party, Release, Transition};

/// Rejected lifecycle steps.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The caller is not the party allowed to take this step.
    #[error("only the {required} can do this")]
    WrongParty { required: Party },

    #[error("transaction is {current}, expected {expected}")]
    InvalidState {
        current: EscrowStatus,
        expected: EscrowStatus,
    },

    #[error("condition {index} does not exist (transaction has {len})")]
    ConditionOutOfRange { index: usize, len: usize },

    #[error("time limit not expired (deadline {deadline})")]
    TimeLimitNotExpired { deadline: DateTime<Utc> },
}

impl EscrowTransaction {
    /// Receiver accepts a pending transaction. The deadline now runs from
    /// `now`.
    pub fn accept(&mut self, caller: &str, now: DateTime<Utc>) -> Result<Transition, LifecycleError> {
        self.require(caller, Party::Receiver, EscrowStatus::Pending)?;
        self.status = EscrowStatus::Accepted;
        self.accepted_at = Some(now);
        Ok(Transition::Updated)
    }

    /// Sender flips one condition. May complete the transaction.
    pub fn toggle_condition(
        &mut self,
        caller: &str,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<Transition, LifecycleError> {
        self.require(caller, Party::Sender, EscrowStatus::Accepted)?;
        let len = self.conditions.len();
        let condition = self
            .conditions
            .get_mut(index)
            .ok_or(LifecycleError::ConditionOutOfRange { index, len })?;
        condition.completed = !condition.completed;
        Ok(self.try_complete(now))
    }

    /// Sender confirms delivery. May complete the transaction. Repeating it
    /// is harmless.
    pub fn mark_order_received(
        &mut self,
        caller: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition, LifecycleError> {
        self.require(caller, Party::Sender, EscrowStatus::Accepted)?;
        self.order_received = true;
        Ok(self.try_complete(now))
    }

    /// Sender takes the money back after the deadline.
    ///
    /// Only accepted transactions can be cancelled; a pending transaction the
    /// receiver never accepted stays pending.
    pub fn cancel(&mut self, caller: &str, now: DateTime<Utc>) -> Result<Transition, LifecycleError> {
        self.require(caller, Party::Sender, EscrowStatus::Accepted)?;
        let deadline = self.deadline();
        if now < deadline {
            return Err(LifecycleError::TimeLimitNotExpired { deadline });
        }
        self.status = EscrowStatus::Cancelled;
        self.settled_at = Some(now);
        Ok(Transition::Settled(self.release_to(Party::Sender)))
    }

    fn require(
        &self,
        caller: &str,
        party: Party,
        expected: EscrowStatus,
    ) -> Result<(), LifecycleError> {
        if self.account_of(party) != caller {
            return Err(LifecycleError::WrongParty { required: party });
        }
        if self.status != expected {
            return Err(LifecycleError::InvalidState {
                current: self.status,
                expected,
            });
        }
        Ok(())
    }

    fn try_complete(&mut self, now: DateTime<Utc>) -> Transition {
        if self.order_received && self.all_conditions_met() {
            self.status = EscrowStatus::Completed;
            self.settled_at = Some(now);
            Transition::Settled(self.release_to(Party::Receiver))
        } else {
            Transition::Updated
        }
    }

    fn release_to(&self, beneficiary: Party) -> Release {
        Release {
            beneficiary,
            account_id: self.account_of(beneficiary).to_string(),
            amount: self.amount,
        }
    }
}
