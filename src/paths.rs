use anyhow::{Context, Result};
use directories::BaseDirs;
use std::path::{Path, PathBuf};

use crate::fs_utils::ensure_private_dir;

/// Which secret backend holds OAuth credential blobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretBackendKind {
    /// Permission-restricted files under the base directory
    File,
    /// macOS keychain (requires the `keychain` feature)
    Keychain,
}

impl SecretBackendKind {
    /// Keychain on macOS when compiled in, flat files everywhere else
    pub fn platform_default() -> Self {
        if cfg!(all(target_os = "macos", feature = "keychain")) {
            Self::Keychain
        } else {
            Self::File
        }
    }
}

impl std::str::FromStr for SecretBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keychain" => Ok(Self::Keychain),
            _ => Err(format!("invalid secret backend: {}", s)),
        }
    }
}

/// All computed paths used by ccswap
#[derive(Debug, Clone)]
pub struct Paths {
    /// ~/.claude-swap
    pub base_dir: PathBuf,
    /// ~/.claude-swap/sequence.json
    pub registry_file: PathBuf,
    /// ~/.claude-swap/api-accounts.json
    pub vault_file: PathBuf,
    /// ~/.claude-swap/configs
    pub configs_dir: PathBuf,
    /// ~/.claude-swap/credentials
    pub credentials_dir: PathBuf,
    /// ~/.claude-swap/api-env.sh
    pub env_file: PathBuf,
    /// ~/.claude-swap/.lock
    pub lock_file: PathBuf,
    /// ~/.claude
    pub claude_dir: PathBuf,
    /// ~/.claude.json (or ~/.claude/.claude.json)
    pub claude_config: PathBuf,
    /// ~/.claude/.credentials.json
    pub claude_credentials: PathBuf,
    /// ~/.zshrc, ~/.bashrc, ...
    pub shell_rc: PathBuf,
    pub secret_backend: SecretBackendKind,
}

impl Paths {
    /// Resolve paths from the home directory and the `CCSWAP_*` /
    /// `CLAUDE_CONFIG_DIR` environment overrides
    pub fn new() -> Result<Self> {
        let base_dirs = BaseDirs::new().context("Failed to determine home directory")?;
        let home = base_dirs.home_dir();

        let base_dir = env_path("CCSWAP_HOME").unwrap_or_else(|| home.join(".claude-swap"));

        let (claude_dir, claude_config) = match env_path("CLAUDE_CONFIG_DIR") {
            Some(dir) => {
                let config = dir.join(".claude.json");
                (dir, config)
            }
            None => {
                let dir = home.join(".claude");
                let nested = dir.join(".claude.json");
                let config = if nested.exists() {
                    nested
                } else {
                    home.join(".claude.json")
                };
                (dir, config)
            }
        };

        let shell_rc = env_path("CCSWAP_SHELL_RC").unwrap_or_else(|| {
            let shell = std::env::var("SHELL").unwrap_or_default();
            detect_shell_rc(home, &shell)
        });

        let secret_backend = match std::env::var("CCSWAP_SECRET_BACKEND") {
            Ok(value) => value
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid CCSWAP_SECRET_BACKEND")?,
            Err(_) => SecretBackendKind::platform_default(),
        };

        Ok(Self::from_parts(
            base_dir,
            claude_dir,
            claude_config,
            shell_rc,
            secret_backend,
        ))
    }

    /// Build the layout under an explicit base directory
    pub fn from_parts(
        base_dir: PathBuf,
        claude_dir: PathBuf,
        claude_config: PathBuf,
        shell_rc: PathBuf,
        secret_backend: SecretBackendKind,
    ) -> Self {
        Self {
            registry_file: base_dir.join("sequence.json"),
            vault_file: base_dir.join("api-accounts.json"),
            configs_dir: base_dir.join("configs"),
            credentials_dir: base_dir.join("credentials"),
            env_file: base_dir.join("api-env.sh"),
            lock_file: base_dir.join(".lock"),
            claude_credentials: claude_dir.join(".credentials.json"),
            base_dir,
            claude_dir,
            claude_config,
            shell_rc,
            secret_backend,
        }
    }

    /// Get the path of an account's host-config snapshot
    pub fn config_backup(&self, number: u32, email: &str) -> PathBuf {
        self.configs_dir
            .join(format!(".claude-config-{}-{}.json", number, email))
    }

    /// Ensure all owned directories exist with owner-only permissions
    pub fn ensure_dirs(&self) -> Result<()> {
        ensure_private_dir(&self.base_dir)?;
        ensure_private_dir(&self.configs_dir)?;
        ensure_private_dir(&self.credentials_dir)?;
        Ok(())
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Pick the startup file for a login shell path such as `/bin/zsh`
pub fn detect_shell_rc(home: &Path, shell: &str) -> PathBuf {
    let name = Path::new(shell)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    match name {
        "zsh" => home.join(".zshrc"),
        "bash" if cfg!(target_os = "macos") => home.join(".bash_profile"),
        "bash" => home.join(".bashrc"),
        _ => home.join(".profile"),
    }
}
