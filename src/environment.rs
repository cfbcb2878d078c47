//! Environment projection for API accounts.
//!
//! An active API account is exposed to the host application through two
//! environment variables. They are written to a generated env file and to a
//! marked block in the user's shell startup file; switching away removes
//! both.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::fs_utils::{remove_if_exists, write_private_atomic, write_user_file_atomic};
use crate::paths::Paths;
use crate::vault::ApiRecord;

pub const BASE_URL_VAR: &str = "ANTHROPIC_BASE_URL";
pub const AUTH_TOKEN_VAR: &str = "ANTHROPIC_AUTH_TOKEN";

pub const BLOCK_START: &str = "# >>> ccswap api account >>>";
pub const BLOCK_END: &str = "# <<< ccswap api account <<<";

pub trait EnvironmentProjector {
    /// Make `record`'s endpoint and token the ones new shells pick up
    fn apply(&self, record: &ApiRecord) -> Result<()>;
    /// Remove every trace written by [`apply`](Self::apply)
    fn clear(&self) -> Result<()>;
    /// Whether an API environment is currently projected
    fn is_applied(&self) -> bool;
}

/// Quote a value for POSIX shells
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `export` lines for an API account
pub fn export_lines(record: &ApiRecord) -> Vec<String> {
    vec![
        format!("export {}={}", BASE_URL_VAR, shell_quote(&record.base_url)),
        format!("export {}={}", AUTH_TOKEN_VAR, shell_quote(&record.auth_token)),
    ]
}

/// Line that removes both variables from a shell
pub fn unset_line() -> String {
    format!("unset {} {}", BASE_URL_VAR, AUTH_TOKEN_VAR)
}

/// Drop every managed block from `content`, keeping all other lines as-is
pub fn strip_managed_block(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut inside = false;
    let lines: Vec<&str> = content.split_inclusive('\n').collect();

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim_end();
        if !inside && trimmed == BLOCK_START {
            // an unterminated block only loses its start marker
            let terminated = lines[idx + 1..].iter().any(|l| l.trim_end() == BLOCK_END);
            inside = terminated;
            continue;
        }
        if inside {
            if trimmed == BLOCK_END {
                inside = false;
            }
            continue;
        }
        out.push_str(line);
    }
    out
}

/// Writes the env file and the shell startup block
#[derive(Debug, Clone)]
pub struct ShellProjector {
    env_file: PathBuf,
    shell_rc: PathBuf,
}

impl ShellProjector {
    pub fn new(paths: &Paths) -> Self {
        Self {
            env_file: paths.env_file.clone(),
            shell_rc: paths.shell_rc.clone(),
        }
    }

    fn read_rc(&self) -> Result<String> {
        if !self.shell_rc.exists() {
            return Ok(String::new());
        }
        fs::read_to_string(&self.shell_rc)
            .with_context(|| format!("Failed to read {}", self.shell_rc.display()))
    }

    fn write_rc(&self, content: &str) -> Result<()> {
        write_user_file_atomic(&self.shell_rc, content.as_bytes(), |bytes| {
            let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
            let starts = text.lines().filter(|l| l.trim_end() == BLOCK_START).count();
            if starts > 1 {
                return Err("more than one managed block".into());
            }
            Ok(())
        })
    }
}

impl EnvironmentProjector for ShellProjector {
    fn apply(&self, record: &ApiRecord) -> Result<()> {
        let exports = export_lines(record);

        let mut env = String::from("# Generated by ccswap. Overwritten on every switch.\n");
        for line in &exports {
            env.push_str(line);
            env.push('\n');
        }
        write_private_atomic(&self.env_file, env.as_bytes(), |_| Ok(()))?;

        let mut rc = strip_managed_block(&self.read_rc()?);
        if !rc.is_empty() && !rc.ends_with('\n') {
            rc.push('\n');
        }
        rc.push_str(BLOCK_START);
        rc.push('\n');
        for line in &exports {
            rc.push_str(line);
            rc.push('\n');
        }
        rc.push_str(BLOCK_END);
        rc.push('\n');
        self.write_rc(&rc)?;

        debug!(env_file = %self.env_file.display(), shell_rc = %self.shell_rc.display(), "projected API environment");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        remove_if_exists(&self.env_file)?;
        if self.shell_rc.exists() {
            let current = self.read_rc()?;
            let stripped = strip_managed_block(&current);
            if stripped != current {
                self.write_rc(&stripped)?;
            }
        }
        debug!("cleared API environment");
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.env_file.exists()
    }
}
