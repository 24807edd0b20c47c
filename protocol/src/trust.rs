//! # Trust Score
//!
//! A reputation number between 0 and 200 derived from an account's escrow
//! history. It is never stored; every read recomputes it.
//!
//! ```text
//! total == 0          → 100
//! volume bonus        = min(50, completed / 20 · 50)
//! success bonus       = completed / total · 50
//! failure penalty     = cancelled / total · 50
//! score               = round(100 + volume + success − failure), clamped to [0, 200]
//! ```

use serde::{Deserialize, Serialize};

use crate::config::{
    TRUST_BASELINE, TRUST_COMPONENT_WEIGHT, TRUST_MAX, TRUST_VOLUME_SATURATION,
};
use crate::transaction::{EscrowStatus, EscrowTransaction};

/// Computes the trust score from raw counts.
pub fn trust_score(total: u64, completed: u64, cancelled: u64) -> u32 {
    if total == 0 {
        return TRUST_BASELINE;
    }
    let total = total as f64;
    let completed = completed as f64;
    let cancelled = cancelled as f64;

    let volume_bonus =
        (completed / TRUST_VOLUME_SATURATION * TRUST_COMPONENT_WEIGHT).min(TRUST_COMPONENT_WEIGHT);
    let success_bonus = completed / total * TRUST_COMPONENT_WEIGHT;
    let failure_penalty = cancelled / total * TRUST_COMPONENT_WEIGHT;

    let score = (f64::from(TRUST_BASELINE) + volume_bonus + success_bonus - failure_penalty).round();
    score.clamp(0.0, f64::from(TRUST_MAX)) as u32
}

/// Per-status counts over every transaction an account took part in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStats {
    pub total: u64,
    pub pending: u64,
    pub accepted: u64,
    pub completed: u64,
    pub cancelled: u64,
}

impl TransactionStats {
    /// Counts the transactions where `account_id` is sender or receiver.
    pub fn for_account<'a>(
        account_id: &str,
        transactions: impl IntoIterator<Item = &'a EscrowTransaction>,
    ) -> Self {
        let mut stats = Self::default();
        for tx in transactions {
            if tx.party_of(account_id).is_none() {
                continue;
            }
            stats.total += 1;
            match tx.status {
                EscrowStatus::Pending => stats.pending += 1,
                EscrowStatus::Accepted => stats.accepted += 1,
                EscrowStatus::Completed => stats.completed += 1,
                EscrowStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    pub fn trust_score(&self) -> u32 {
        trust_score(self.total, self.completed, self.cancelled)
    }
}

/// Stats plus the score derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustReport {
    pub stats: TransactionStats,
    pub score: u32,
}

impl From<TransactionStats> for TrustReport {
    fn from(stats: TransactionStats) -> Self {
        Self {
            score: stats.trust_score(),
            stats,
        }
    }
}
