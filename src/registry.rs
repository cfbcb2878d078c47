//! The account registry: every managed account, its number, and which one
//! is active.
//!
//! Persisted as `sequence.json`:
//!
//! ```json
//! {
//!   "activeAccountNumber": 2,
//!   "lastUpdated": "2025-01-01T00:00:00Z",
//!   "sequence": [1, 2],
//!   "accounts": {
//!     "1": { "email": "a@b.com", "uuid": "…", "type": "oauth", "added": "…" }
//!   }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::AccountError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Subscription login whose credentials live in the secret backend
    #[default]
    Oauth,
    /// Custom endpoint + token kept in the API vault
    Api,
}

impl AccountType {
    pub fn label(&self) -> &'static str {
        match self {
            AccountType::Oauth => "OAuth",
            AccountType::Api => "API",
        }
    }
}

/// One registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEntry {
    /// Email for OAuth accounts, free-text label for API accounts
    pub email: String,
    pub uuid: String,
    /// Older registries carry no type; those accounts are OAuth
    #[serde(rename = "type", default)]
    pub account_type: AccountType,
    pub added: DateTime<Utc>,
}

impl AccountEntry {
    pub fn new(email: impl Into<String>, uuid: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            email: email.into(),
            uuid: uuid.into(),
            account_type,
            added: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub active_account_number: Option<u32>,
    pub last_updated: DateTime<Utc>,
    pub sequence: Vec<u32>,
    pub accounts: BTreeMap<u32, AccountEntry>,
    /// Highest number ever handed out, so removed numbers stay retired
    #[serde(default, skip_serializing_if = "is_zero")]
    pub highest_assigned: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            active_account_number: None,
            last_updated: Utc::now(),
            sequence: Vec::new(),
            accounts: BTreeMap::new(),
            highest_assigned: 0,
        }
    }
}

impl Registry {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// `max(existing numbers) + 1`, or 1 for an empty registry.
    ///
    /// Numbers of removed accounts are never handed out again.
    pub fn next_account_number(&self) -> u32 {
        let max_live = self.accounts.keys().copied().max().unwrap_or(0);
        max_live.max(self.highest_assigned) + 1
    }

    pub fn get(&self, number: u32) -> Option<&AccountEntry> {
        self.accounts.get(&number)
    }

    pub fn contains(&self, number: u32) -> bool {
        self.accounts.contains_key(&number)
    }

    /// Exact match against registered emails/labels
    pub fn find_by_email(&self, email: &str) -> Option<u32> {
        self.accounts
            .iter()
            .find(|(_, entry)| entry.email == email)
            .map(|(number, _)| *number)
    }

    /// Exact match restricted to OAuth accounts
    pub fn find_oauth(&self, email: &str) -> Option<u32> {
        self.accounts
            .iter()
            .find(|(_, entry)| entry.account_type == AccountType::Oauth && entry.email == email)
            .map(|(number, _)| *number)
    }

    pub fn active(&self) -> Option<(u32, &AccountEntry)> {
        let number = self.active_account_number?;
        self.accounts.get(&number).map(|entry| (number, entry))
    }

    /// Register an account at the end of the rotation order
    pub fn insert(&mut self, number: u32, entry: AccountEntry) {
        if self.accounts.insert(number, entry).is_none() {
            self.sequence.push(number);
        }
        self.highest_assigned = self.highest_assigned.max(number);
        self.touch();
    }

    /// Drop an account from both the map and the rotation order.
    ///
    /// If it was active, nothing becomes active in its place.
    pub fn remove(&mut self, number: u32) -> Option<AccountEntry> {
        let entry = self.accounts.remove(&number)?;
        self.sequence.retain(|n| *n != number);
        if self.active_account_number == Some(number) {
            self.active_account_number = None;
        }
        self.touch();
        Some(entry)
    }

    pub fn set_active(&mut self, number: u32) {
        self.active_account_number = Some(number);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// The account a rotate should land on: the one after the active
    /// account in `sequence`, wrapping around, or the first one when
    /// nothing is active.
    pub fn next_in_rotation(&self) -> Result<u32, AccountError> {
        let first = *self.sequence.first().ok_or(AccountError::NoAccounts)?;
        let Some(active) = self.active_account_number else {
            return Ok(first);
        };
        match self.sequence.iter().position(|n| *n == active) {
            Some(idx) => Ok(self.sequence[(idx + 1) % self.sequence.len()]),
            None => Ok(first),
        }
    }

    /// Structural invariants: `sequence` and `accounts` hold the same set
    /// of numbers with no duplicates, and the active number is registered.
    pub fn validate(&self) -> Result<(), String> {
        let seq: BTreeSet<u32> = self.sequence.iter().copied().collect();
        if seq.len() != self.sequence.len() {
            return Err("sequence contains duplicate account numbers".into());
        }
        let keys: BTreeSet<u32> = self.accounts.keys().copied().collect();
        if seq != keys {
            return Err(format!(
                "sequence {:?} does not match registered accounts {:?}",
                seq, keys
            ));
        }
        match self.active_account_number {
            Some(active) if !keys.contains(&active) => {
                return Err(format!("active account {} is not registered", active));
            }
            _ => {}
        }
        if self.accounts.keys().any(|n| *n == 0) {
            return Err("account numbers start at 1".into());
        }
        Ok(())
    }
}
