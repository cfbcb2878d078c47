//! The API vault: endpoint + token per API account number.
//!
//! Kept apart from the registry because it holds long-lived secrets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::registry::{AccountType, Registry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRecord {
    /// Display name, same as the registry label
    pub name: String,
    pub base_url: String,
    pub auth_token: String,
    pub added: DateTime<Utc>,
}

impl ApiRecord {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            auth_token: auth_token.into(),
            added: Utc::now(),
        }
    }

    /// Token with everything but the last four characters hidden
    pub fn masked_token(&self) -> String {
        let chars: Vec<char> = self.auth_token.chars().collect();
        if chars.len() <= 4 {
            return "****".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{}", tail)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiVault {
    pub last_updated: DateTime<Utc>,
    pub accounts: BTreeMap<u32, ApiRecord>,
}

impl Default for ApiVault {
    fn default() -> Self {
        Self {
            last_updated: Utc::now(),
            accounts: BTreeMap::new(),
        }
    }
}

impl ApiVault {
    pub fn get(&self, number: u32) -> Option<&ApiRecord> {
        self.accounts.get(&number)
    }

    pub fn upsert(&mut self, number: u32, record: ApiRecord) {
        self.accounts.insert(number, record);
        self.last_updated = Utc::now();
    }

    pub fn remove(&mut self, number: u32) -> Option<ApiRecord> {
        let removed = self.accounts.remove(&number);
        if removed.is_some() {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// The vault holds a record for exactly the API-type accounts of the
    /// registry: none missing, no orphans.
    pub fn check_against(&self, registry: &Registry) -> Result<(), String> {
        for (number, entry) in &registry.accounts {
            if entry.account_type == AccountType::Api && !self.accounts.contains_key(number) {
                return Err(format!("API account {} has no vault record", number));
            }
        }
        for number in self.accounts.keys() {
            match registry.get(*number) {
                Some(entry) if entry.account_type == AccountType::Api => {}
                _ => return Err(format!("vault record {} has no API account", number)),
            }
        }
        Ok(())
    }
}
