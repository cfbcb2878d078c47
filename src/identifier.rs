//! Turning a user-supplied account identifier into an account number.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::AccountError;
use crate::registry::Registry;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid email regex")
});

/// How an identifier string is to be looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Number(String),
    Email(String),
}

impl Identifier {
    /// Classify without touching the registry. All digits means a number;
    /// anything else must look like an email address.
    pub fn parse(input: &str) -> Result<Self, AccountError> {
        let input = input.trim();
        if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Self::Number(input.to_string()));
        }
        if is_valid_email(input) {
            return Ok(Self::Email(input.to_string()));
        }
        Err(AccountError::InvalidIdentifier(input.to_string()))
    }
}

pub fn is_valid_email(input: &str) -> bool {
    EMAIL_RE.is_match(input)
}

/// Resolve `input` to a registered account number
pub fn resolve(registry: &Registry, input: &str) -> Result<u32, AccountError> {
    match Identifier::parse(input)? {
        Identifier::Number(digits) => digits
            .parse::<u32>()
            .ok()
            .filter(|n| registry.contains(*n))
            .ok_or(AccountError::AccountNotFound(digits)),
        Identifier::Email(email) => registry
            .find_by_email(&email)
            .ok_or(AccountError::AccountNotFound(email)),
    }
}
