//! # Accounts
//!
//! An [`Account`] is a user profile plus a single balance. Accounts are
//! created at signup and never deleted. The balance is only moved by the
//! escrow engine through the store's atomic hold/settle operations.

pub mod credentials;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Amount;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Internal identifier (UUID v4).
    pub id: String,
    /// Public lookup code other users type to find this account.
    pub vault_id: String,
    /// Display name.
    pub name: String,
    /// Lower-cased, trimmed. Unique across accounts.
    pub email: String,
    pub phone: String,
    pub location: String,
    /// Available (not escrowed) balance.
    pub balance: Amount,
    /// Output of [`credentials::hash_password`].
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    /// Incoming transactions the user has not opened yet.
    pub unread_transactions: Vec<String>,
}

impl Account {
    /// The subset of the account other users may see.
    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            vault_id: self.vault_id.clone(),
            name: self.name.clone(),
            location: self.location.clone(),
            member_since: self.created_at,
        }
    }
}

/// What a counterparty sees when looking an account up by vault id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub vault_id: String,
    pub name: String,
    pub location: String,
    pub member_since: DateTime<Utc>,
}

/// Signup input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Signup {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub location: String,
    pub password: String,
}

/// Partial profile edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl ProfileUpdate {
    /// Applies the update in place, trimming every provided value.
    pub fn apply(&self, account: &mut Account) {
        if let Some(name) = &self.name {
            account.name = name.trim().to_string();
        }
        if let Some(phone) = &self.phone {
            account.phone = phone.trim().to_string();
        }
        if let Some(location) = &self.location {
            account.location = location.trim().to_string();
        }
    }
}

/// Canonical form of an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
pub(crate) fn sample_account(id: &str, vault_id: &str, balance: Amount) -> Account {
    Account {
        id: id.to_string(),
        vault_id: vault_id.to_string(),
        name: format!("user {id}"),
        email: format!("{id}@example.com"),
        phone: String::new(),
        location: String::new(),
        balance,
        password_hash: credentials::hash_password("pw").unwrap(),
        created_at: Utc::now(),
        unread_transactions: Vec::new(),
    }
}
