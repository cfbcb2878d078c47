//! Secret backends: named get/set/delete of opaque credential blobs.
//!
//! The name [`LIVE_CREDENTIALS`] always refers to wherever the host
//! application itself reads its OAuth credentials from; every other name is
//! ccswap's own storage.

use anyhow::{Context, Result, bail};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::fs_utils::{ensure_private_dir, remove_if_exists, write_private_atomic};
use crate::paths::{Paths, SecretBackendKind};

/// Name of the host application's live credential entry
pub const LIVE_CREDENTIALS: &str = "live";

/// Keychain service the host application stores its credentials under
pub const HOST_KEYCHAIN_SERVICE: &str = "Claude Code-credentials";

pub trait SecretBackend {
    /// `None` when nothing is stored under `name`
    fn get(&self, name: &str) -> Result<Option<String>>;
    fn set(&self, name: &str, value: &str) -> Result<()>;
    /// Deleting a missing entry is not an error
    fn delete(&self, name: &str) -> Result<()>;
    /// Human-readable location, for diagnostics
    fn describe(&self) -> String;
}

/// Secret name of an OAuth account's credential backup
pub fn backup_name(number: u32, email: &str) -> String {
    format!("account-{}-{}", number, email)
}

/// Pick the backend configured in `paths`
pub fn open_backend(paths: &Paths) -> Result<Box<dyn SecretBackend>> {
    match paths.secret_backend {
        SecretBackendKind::File => Ok(Box::new(FileSecrets::new(paths))),
        #[cfg(all(feature = "keychain", target_os = "macos"))]
        SecretBackendKind::Keychain => Ok(Box::new(KeychainSecrets::new())),
        #[cfg(all(not(feature = "keychain"), target_os = "macos"))]
        SecretBackendKind::Keychain => {
            bail!("This build of ccswap has no keychain support.\nHint: Rebuild with `--features keychain` or set CCSWAP_SECRET_BACKEND=file.")
        }
        // Claude Code only keeps its credentials in the keychain on macOS
        #[cfg(not(target_os = "macos"))]
        SecretBackendKind::Keychain => {
            bail!("The keychain secret backend is only available on macOS.\nHint: Set CCSWAP_SECRET_BACKEND=file.")
        }
    }
}

/// Owner-only files. The live entry is the host's `.credentials.json`.
#[derive(Debug, Clone)]
pub struct FileSecrets {
    dir: PathBuf,
    live_path: PathBuf,
}

impl FileSecrets {
    pub fn new(paths: &Paths) -> Self {
        Self {
            dir: paths.credentials_dir.clone(),
            live_path: paths.claude_credentials.clone(),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        if name == LIVE_CREDENTIALS {
            return self.live_path.clone();
        }
        let safe: String = name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!(".claude-credentials-{}.json", safe))
    }
}

impl SecretBackend for FileSecrets {
    fn get(&self, name: &str) -> Result<Option<String>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read credentials: {}", path.display()))?;
        Ok(Some(content))
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        if name != LIVE_CREDENTIALS {
            ensure_private_dir(&self.dir)?;
        }
        write_private_atomic(&self.path_for(name), value.as_bytes(), |_| Ok(()))
    }

    fn delete(&self, name: &str) -> Result<()> {
        remove_if_exists(&self.path_for(name)).map(|_| ())
    }

    fn describe(&self) -> String {
        format!("files in {}", self.dir.display())
    }
}

/// OS keychain through the `keyring` crate
#[cfg(all(feature = "keychain", target_os = "macos"))]
#[derive(Debug, Clone)]
pub struct KeychainSecrets {
    user: String,
}

#[cfg(all(feature = "keychain", target_os = "macos"))]
impl KeychainSecrets {
    pub fn new() -> Self {
        let user = std::env::var("USER").unwrap_or_else(|_| "ccswap".to_string());
        Self { user }
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry> {
        let service = if name == LIVE_CREDENTIALS {
            HOST_KEYCHAIN_SERVICE.to_string()
        } else {
            format!("ccswap-{}", name)
        };
        keyring::Entry::new(&service, &self.user)
            .with_context(|| format!("Failed to open keychain entry '{}'", service))
    }
}

#[cfg(all(feature = "keychain", target_os = "macos"))]
impl Default for KeychainSecrets {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(feature = "keychain", target_os = "macos"))]
impl SecretBackend for KeychainSecrets {
    fn get(&self, name: &str) -> Result<Option<String>> {
        match self.entry(name)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read keychain entry '{}'", name)),
        }
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        self.entry(name)?
            .set_password(value)
            .with_context(|| format!("Failed to write keychain entry '{}'", name))
    }

    fn delete(&self, name: &str) -> Result<()> {
        match self.entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete keychain entry '{}'", name)),
        }
    }

    fn describe(&self) -> String {
        format!("OS keychain (user {})", self.user)
    }
}

/// In-process backend for tests
#[derive(Debug, Default)]
pub struct MemorySecrets {
    entries: RefCell<HashMap<String, String>>,
}

impl MemorySecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.borrow().contains_key(name)
    }
}

impl SecretBackend for MemorySecrets {
    fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self.entries.borrow().get(name).cloned())
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() {
            bail!("secret name cannot be empty");
        }
        self.entries
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.entries.borrow_mut().remove(name);
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
