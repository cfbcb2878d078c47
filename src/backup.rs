//! Per-account snapshots of an OAuth login: the credential blob plus a
//! full copy of the host config document, keyed by (number, email).

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::error::AccountError;
use crate::fs_utils::{ensure_private_dir, remove_if_exists, write_private_atomic};
use crate::host::HostConfig;
use crate::paths::Paths;
use crate::secrets::{LIVE_CREDENTIALS, SecretBackend, backup_name};

/// Both halves of a restored login
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub credentials: String,
    pub config: Value,
}

/// Which halves of a backup are present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupPresence {
    pub credentials: bool,
    pub config: bool,
}

impl BackupPresence {
    pub fn complete(&self) -> bool {
        self.credentials && self.config
    }
}

#[derive(Clone, Copy)]
pub struct Backups<'a> {
    paths: &'a Paths,
    secrets: &'a dyn SecretBackend,
}

impl<'a> Backups<'a> {
    pub fn new(paths: &'a Paths, secrets: &'a dyn SecretBackend) -> Self {
        Self { paths, secrets }
    }

    fn config_path(&self, number: u32, email: &str) -> PathBuf {
        self.paths.config_backup(number, email)
    }

    /// Capture the live login as account `number`'s snapshot.
    ///
    /// An empty live credential blob is refused rather than skipped.
    pub fn backup(&self, host: &HostConfig, number: u32, email: &str) -> Result<()> {
        let credentials = self
            .secrets
            .get(LIVE_CREDENTIALS)?
            .filter(|blob| !blob.trim().is_empty())
            .ok_or_else(|| AccountError::NoCredentials {
                number,
                email: email.to_string(),
            })?;
        let config = host.read()?.ok_or(AccountError::NotLoggedIn)?;

        ensure_private_dir(&self.paths.configs_dir)?;
        let mut content =
            serde_json::to_vec_pretty(&config).context("Failed to serialize host config")?;
        content.push(b'\n');
        write_private_atomic(&self.config_path(number, email), &content, |bytes| {
            serde_json::from_slice::<Value>(bytes)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })?;

        self.secrets
            .set(&backup_name(number, email), &credentials)
            .with_context(|| format!("Failed to back up credentials for {}", email))?;

        debug!(number, email, "backed up OAuth login");
        Ok(())
    }

    /// Load both halves of account `number`'s snapshot. Either half missing
    /// is an error; nothing is returned piecemeal.
    pub fn restore(&self, number: u32, email: &str) -> Result<Snapshot> {
        let missing = |part: &'static str| AccountError::MissingBackup {
            number,
            email: email.to_string(),
            part,
        };

        let credentials = self
            .secrets
            .get(&backup_name(number, email))?
            .filter(|blob| !blob.trim().is_empty())
            .ok_or_else(|| missing("credential"))?;

        let config_path = self.config_path(number, email);
        if !config_path.exists() {
            return Err(missing("config").into());
        }
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", config_path.display()))?;

        Ok(Snapshot {
            credentials,
            config,
        })
    }

    /// Remove both halves
    pub fn discard(&self, number: u32, email: &str) -> Result<()> {
        self.secrets.delete(&backup_name(number, email))?;
        remove_if_exists(&self.config_path(number, email))?;
        debug!(number, email, "discarded OAuth backup");
        Ok(())
    }

    pub fn presence(&self, number: u32, email: &str) -> Result<BackupPresence> {
        Ok(BackupPresence {
            credentials: self.secrets.get(&backup_name(number, email))?.is_some(),
            config: self.config_path(number, email).exists(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, kind_of};
    use crate::secrets::MemorySecrets;
    use crate::test_utils::{host_config, login_as, setup_test_paths};
    use tempfile::TempDir;

    #[test]
    fn test_backup_and_restore() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let secrets = MemorySecrets::new();
        let host = HostConfig::new(&paths.claude_config);
        let backups = Backups::new(&paths, &secrets);

        login_as(&paths, "a@b.com", "uuid-a");
        secrets.set(LIVE_CREDENTIALS, "blob-a").unwrap();

        backups.backup(&host, 1, "a@b.com").unwrap();
        assert!(backups.presence(1, "a@b.com").unwrap().complete());

        let snapshot = backups.restore(1, "a@b.com").unwrap();
        assert_eq!(snapshot.credentials, "blob-a");
        assert_eq!(snapshot.config, host_config("a@b.com", "uuid-a"));
    }

    #[test]
    fn test_backup_refuses_empty_credentials() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let secrets = MemorySecrets::new();
        let host = HostConfig::new(&paths.claude_config);
        let backups = Backups::new(&paths, &secrets);

        login_as(&paths, "a@b.com", "uuid-a");
        let err = backups.backup(&host, 1, "a@b.com").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AccountError>(),
            Some(AccountError::NoCredentials { number: 1, .. })
        ));

        secrets.set(LIVE_CREDENTIALS, "   ").unwrap();
        assert!(backups.backup(&host, 1, "a@b.com").is_err());
        assert!(!paths.config_backup(1, "a@b.com").exists());
    }

    #[test]
    fn test_restore_requires_both_halves() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let secrets = MemorySecrets::new();
        let host = HostConfig::new(&paths.claude_config);
        let backups = Backups::new(&paths, &secrets);

        login_as(&paths, "a@b.com", "uuid-a");
        secrets.set(LIVE_CREDENTIALS, "blob-a").unwrap();
        backups.backup(&host, 1, "a@b.com").unwrap();

        fs::remove_file(paths.config_backup(1, "a@b.com")).unwrap();
        let err = backups.restore(1, "a@b.com").unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::MissingBackup));

        backups.backup(&host, 1, "a@b.com").unwrap();
        secrets.delete(&backup_name(1, "a@b.com")).unwrap();
        let err = backups.restore(1, "a@b.com").unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::MissingBackup));
    }

    #[test]
    fn test_discard() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let secrets = MemorySecrets::new();
        let host = HostConfig::new(&paths.claude_config);
        let backups = Backups::new(&paths, &secrets);

        login_as(&paths, "a@b.com", "uuid-a");
        secrets.set(LIVE_CREDENTIALS, "blob-a").unwrap();
        backups.backup(&host, 1, "a@b.com").unwrap();

        backups.discard(1, "a@b.com").unwrap();
        let presence = backups.presence(1, "a@b.com").unwrap();
        assert!(!presence.credentials && !presence.config);
        // live login is untouched
        assert!(secrets.contains(LIVE_CREDENTIALS));
    }
}
