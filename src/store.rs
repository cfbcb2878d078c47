//! Durable storage for the registry and the API vault.
//!
//! The engine talks to an [`AccountStore`]; [`FileStore`] is the real one,
//! [`MemoryStore`] backs tests.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::AccountError;
use crate::fs_utils::{read_json, write_json_atomic};
use crate::paths::Paths;
use crate::registry::Registry;
use crate::vault::ApiVault;

/// Exclusive hold on the store for one read-modify-write cycle.
///
/// Released on drop.
pub struct StoreLock {
    file: Option<File>,
}

impl StoreLock {
    /// A guard that locks nothing, for stores with no other writers
    pub fn noop() -> Self {
        Self { file: None }
    }

    /// Open and lock `path` for exclusive access (blocks until available)
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            crate::fs_utils::ensure_private_dir(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {:?}", path))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to lock: {:?}", path))?;

        Ok(Self { file: Some(file) })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            // Release the lock (ignore errors during drop)
            let _ = FileExt::unlock(file);
        }
    }
}

pub trait AccountStore {
    /// Serialize against other ccswap processes until the guard drops
    fn lock(&self) -> Result<StoreLock>;

    /// Load the registry; a store that was never written yields an empty one
    fn load_registry(&self) -> Result<Registry>;

    /// Persist the registry. Refuses a registry that breaks its invariants.
    fn save_registry(&self, registry: &Registry) -> Result<()>;

    fn load_vault(&self) -> Result<ApiVault>;

    /// Persist the vault. `registry` is the registry as it will stand once
    /// the current operation commits; the vault must agree with it.
    fn save_vault(&self, vault: &ApiVault, registry: &Registry) -> Result<()>;
}

fn invalid(path: &Path, reason: String) -> anyhow::Error {
    AccountError::Persistence {
        path: path.to_path_buf(),
        reason,
    }
    .into()
}

/// JSON documents under the ccswap base directory
#[derive(Debug, Clone)]
pub struct FileStore {
    registry_file: PathBuf,
    vault_file: PathBuf,
    lock_file: PathBuf,
}

impl FileStore {
    pub fn new(paths: &Paths) -> Self {
        Self {
            registry_file: paths.registry_file.clone(),
            vault_file: paths.vault_file.clone(),
            lock_file: paths.lock_file.clone(),
        }
    }
}

impl AccountStore for FileStore {
    fn lock(&self) -> Result<StoreLock> {
        StoreLock::acquire(&self.lock_file)
    }

    fn load_registry(&self) -> Result<Registry> {
        let registry: Registry = read_json(&self.registry_file)?.unwrap_or_default();
        registry
            .validate()
            .map_err(|reason| invalid(&self.registry_file, reason))?;
        Ok(registry)
    }

    fn save_registry(&self, registry: &Registry) -> Result<()> {
        registry
            .validate()
            .map_err(|reason| invalid(&self.registry_file, reason))?;
        write_json_atomic(&self.registry_file, registry, Registry::validate)
    }

    fn load_vault(&self) -> Result<ApiVault> {
        Ok(read_json(&self.vault_file)?.unwrap_or_default())
    }

    fn save_vault(&self, vault: &ApiVault, registry: &Registry) -> Result<()> {
        vault
            .check_against(registry)
            .map_err(|reason| invalid(&self.vault_file, reason))?;
        write_json_atomic(&self.vault_file, vault, |_| Ok(()))
    }
}

/// In-process store for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    registry: RefCell<Option<Registry>>,
    vault: RefCell<Option<ApiVault>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryStore {
    fn lock(&self) -> Result<StoreLock> {
        Ok(StoreLock::noop())
    }

    fn load_registry(&self) -> Result<Registry> {
        Ok(self.registry.borrow().clone().unwrap_or_default())
    }

    fn save_registry(&self, registry: &Registry) -> Result<()> {
        registry
            .validate()
            .map_err(|reason| invalid(Path::new("<memory>/registry"), reason))?;
        *self.registry.borrow_mut() = Some(registry.clone());
        Ok(())
    }

    fn load_vault(&self) -> Result<ApiVault> {
        Ok(self.vault.borrow().clone().unwrap_or_default())
    }

    fn save_vault(&self, vault: &ApiVault, registry: &Registry) -> Result<()> {
        vault
            .check_against(registry)
            .map_err(|reason| invalid(Path::new("<memory>/vault"), reason))?;
        *self.vault.borrow_mut() = Some(vault.clone());
        Ok(())
    }
}
