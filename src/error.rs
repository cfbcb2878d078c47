//! Domain errors raised by the account engine.
//!
//! Everything else in the crate propagates `anyhow::Error`; these variants
//! ride inside it and callers recover them with `downcast_ref`.

use std::path::PathBuf;
use thiserror::Error;

/// Broad failure classes, used by the CLI and by tests to reason about
/// whether any state could have been touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any mutation
    Precondition,
    /// Account, backup or vault record absent
    NotFound,
    /// A write would have produced an invalid document
    Persistence,
    /// Backup state was deleted behind our back
    MissingBackup,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("No active Claude account found. Please log in to Claude Code first.")]
    NotLoggedIn,

    #[error("Missing required values: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    #[error("Invalid account identifier '{0}': expected an account number or an email address")]
    InvalidIdentifier(String),

    #[error("An account labelled '{0}' already exists")]
    LabelInUse(String),

    #[error("No account found matching '{0}'")]
    AccountNotFound(String),

    #[error("No credentials found for {email} (account {number}); refusing to store an empty backup")]
    NoCredentials { number: u32, email: String },

    #[error("Missing {part} backup for account {number} ({email})")]
    MissingBackup {
        number: u32,
        email: String,
        part: &'static str,
    },

    #[error("API account {0} has no vault record")]
    VaultRecordMissing(u32),

    #[error("No accounts are managed yet")]
    NoAccounts,

    #[error("Refusing to write {}: {reason}", .path.display())]
    Persistence { path: PathBuf, reason: String },
}

impl AccountError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotLoggedIn
            | Self::MissingCredentials(_)
            | Self::InvalidIdentifier(_)
            | Self::LabelInUse(_)
            | Self::NoCredentials { .. } => ErrorKind::Precondition,
            Self::AccountNotFound(_) | Self::VaultRecordMissing(_) | Self::NoAccounts => {
                ErrorKind::NotFound
            }
            Self::Persistence { .. } => ErrorKind::Persistence,
            Self::MissingBackup { .. } => ErrorKind::MissingBackup,
        }
    }
}

/// Pull the domain error kind out of an `anyhow::Error`, if there is one.
pub fn kind_of(err: &anyhow::Error) -> Option<ErrorKind> {
    err.downcast_ref::<AccountError>().map(AccountError::kind)
}
