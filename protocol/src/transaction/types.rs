//! Core type definitions for escrow transactions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::MS_PER_HOUR;
use crate::money::Amount;

// ---------------------------------------------------------------------------
// EscrowStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an escrow transaction.
///
/// ```text
/// Pending ──accept──► Accepted ──conditions + order received──► Completed
///                         │
///                         └──cancel (deadline passed)──► Cancelled
/// ```
///
/// `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    /// Funds are held; the receiver has not accepted yet.
    Pending,
    /// The receiver accepted; the deadline clock runs from acceptance.
    Accepted,
    /// Funds were released to the receiver.
    Completed,
    /// Funds were returned to the sender.
    Cancelled,
}

impl EscrowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// One item of the release checklist the sender ticks off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub description: String,
    pub completed: bool,
}

impl Condition {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            completed: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Parties
// ---------------------------------------------------------------------------

/// The two sides of an escrow transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Sender,
    Receiver,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sender => write!(f, "sender"),
            Self::Receiver => write!(f, "receiver"),
        }
    }
}

/// Filter for history queries, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

// ---------------------------------------------------------------------------
// EscrowTransaction
// ---------------------------------------------------------------------------

/// A conditional-release payment from `sender_id` to `receiver_id`.
///
/// `amount` leaves the sender's balance when the transaction is created and
/// is credited to exactly one party when it reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowTransaction {
    /// Internal identifier (UUID v4).
    pub id: String,
    /// Public reference code (`VTID-...`).
    pub reference: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: Amount,
    pub status: EscrowStatus,
    /// Release checklist, in the order the sender wrote it.
    pub conditions: Vec<Condition>,
    /// Whole hours the receiver has to deliver after accepting.
    pub time_limit_hours: u32,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    /// Set by the sender once the goods or service arrived.
    pub order_received: bool,
    /// When the transaction reached `Completed` or `Cancelled`.
    pub settled_at: Option<DateTime<Utc>>,
}

impl EscrowTransaction {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn all_conditions_met(&self) -> bool {
        self.conditions.iter().all(|c| c.completed)
    }

    /// The instant after which the sender may cancel.
    ///
    /// Measured from acceptance; a transaction that was never accepted falls
    /// back to its creation time.
    pub fn deadline(&self) -> DateTime<Utc> {
        let start = self.accepted_at.unwrap_or(self.created_at);
        start + Duration::milliseconds(i64::from(self.time_limit_hours) * MS_PER_HOUR)
    }

    /// Which side `account_id` is on, if any.
    pub fn party_of(&self, account_id: &str) -> Option<Party> {
        if self.sender_id == account_id {
            Some(Party::Sender)
        } else if self.receiver_id == account_id {
            Some(Party::Receiver)
        } else {
            None
        }
    }

    pub fn account_of(&self, party: Party) -> &str {
        match party {
            Party::Sender => &self.sender_id,
            Party::Receiver => &self.receiver_id,
        }
    }

    /// Remaining time as shown in transaction history.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> TimeRemaining {
        if self.is_terminal() {
            return TimeRemaining::Closed;
        }
        let remaining_ms = (self.deadline() - now).num_milliseconds();
        if remaining_ms <= 0 {
            return TimeRemaining::Expired;
        }
        TimeRemaining::Remaining {
            hours: remaining_ms / MS_PER_HOUR,
            minutes: (remaining_ms % MS_PER_HOUR) / 60_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Transition outcomes
// ---------------------------------------------------------------------------

/// Funds leaving escrow on a terminal transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub beneficiary: Party,
    pub account_id: String,
    pub amount: Amount,
}

/// Result of a successful lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Non-terminal change; nothing moves.
    Updated,
    /// The transaction became terminal and `Release` must be credited.
    Settled(Release),
}

/// Output of [`EscrowTransaction::time_remaining`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TimeRemaining {
    /// Completed or cancelled.
    Closed,
    /// Deadline reached; the sender may cancel.
    Expired,
    Remaining { hours: i64, minutes: i64 },
}

impl fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Transaction closed"),
            Self::Expired => write!(f, "Time expired"),
            Self::Remaining { hours, minutes } => write!(f, "{hours}h {minutes}m remaining"),
        }
    }
}

// ---------------------------------------------------------------------------
// TransactionPatch
// ---------------------------------------------------------------------------

/// Partial update for [`crate::storage::Store::update_transaction`].
///
/// Each `Some` field overwrites the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionPatch {
    pub status: Option<EscrowStatus>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub conditions: Option<Vec<Condition>>,
    pub order_received: Option<bool>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl TransactionPatch {
    /// Patch carrying every mutable field of `tx`.
    pub fn from_transaction(tx: &EscrowTransaction) -> Self {
        Self {
            status: Some(tx.status),
            accepted_at: tx.accepted_at,
            conditions: Some(tx.conditions.clone()),
            order_received: Some(tx.order_received),
            settled_at: tx.settled_at,
        }
    }

    pub fn apply(&self, tx: &mut EscrowTransaction) {
        if let Some(status) = self.status {
            tx.status = status;
        }
        if let Some(at) = self.accepted_at {
            tx.accepted_at = Some(at);
        }
        if let Some(conditions) = &self.conditions {
            tx.conditions = conditions.clone();
        }
        if let Some(received) = self.order_received {
            tx.order_received = received;
        }
        if let Some(at) = self.settled_at {
            tx.settled_at = Some(at);
        }
    }
}
