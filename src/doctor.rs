//! Diagnostic tool for ccswap.
//!
//! This module implements the `ccswap doctor` command, which checks the
//! setup for common issues:
//! - Existence and permissions of the ccswap directories.
//! - Validity of the registry and its agreement with the API vault.
//! - Presence of both backup halves for every OAuth account.
//! - The host's login and the projected API environment.
//!
//! It reports issues to the user with a pass/fail/warn status.

use anstyle::AnsiColor;
use std::fs;

use crate::backup::Backups;
use crate::environment::BLOCK_START;
use crate::fs_utils::mode_of;
use crate::host::HostConfig;
use crate::paths::Paths;
use crate::registry::{AccountType, Registry};
use crate::secrets::{LIVE_CREDENTIALS, SecretBackend};
use crate::store::AccountStore;
use crate::ui::Ui;

/// Run the doctor diagnostics. Returns false when any check failed.
pub fn run_doctor(
    paths: &Paths,
    store: &dyn AccountStore,
    secrets: &dyn SecretBackend,
    ui: &Ui,
) -> bool {
    ui.section("ccswap Doctor");
    ui.newline();

    let mut healthy = true;

    // 1. Directories
    healthy &= check_step(ui, "Directories", || {
        let mut ok = true;
        for dir in [&paths.base_dir, &paths.configs_dir, &paths.credentials_dir] {
            if !dir.exists() {
                ui.println(format!("  {} Missing: {}", ui.icon_err(), dir.display()));
                ok = false;
                continue;
            }
            match mode_of(dir) {
                Some(mode) if mode & 0o077 != 0 => {
                    ui.println(format!(
                        "  {} {} is accessible to other users (mode {:o})",
                        ui.icon_warn(),
                        dir.display(),
                        mode
                    ));
                }
                _ => {
                    ui.println(format!("  {} {}", ui.icon_ok(), dir.display()));
                }
            }
        }

        if !paths.claude_dir.exists() {
            // Not an error if Claude Code has never been run
            ui.println(format!(
                "  {} Claude directory missing: {}",
                ui.icon_warn(),
                paths.claude_dir.display()
            ));
        }
        ok
    });

    // 2. Registry and vault
    let mut registry = None;
    healthy &= check_step(ui, "Registry", || {
        let loaded = match store.load_registry() {
            Ok(r) => r,
            Err(e) => {
                ui.println(format!("  {} Registry unreadable: {:#}", ui.icon_err(), e));
                return false;
            }
        };
        ui.println(format!(
            "  {} {} account(s) registered",
            ui.icon_ok(),
            loaded.accounts.len()
        ));
        match loaded.active() {
            Some((number, entry)) => ui.println(format!(
                "  {} Active account: #{} {}",
                ui.icon_info(),
                number,
                entry.email
            )),
            None => ui.println(format!("  {} No active account", ui.icon_info())),
        }

        let ok = match store.load_vault() {
            Ok(vault) => match vault.check_against(&loaded) {
                Ok(()) => {
                    ui.println(format!("  {} API vault agrees with registry", ui.icon_ok()));
                    true
                }
                Err(reason) => {
                    ui.println(format!("  {} API vault: {}", ui.icon_err(), reason));
                    false
                }
            },
            Err(e) => {
                ui.println(format!("  {} API vault unreadable: {:#}", ui.icon_err(), e));
                false
            }
        };
        registry = Some(loaded);
        ok
    });

    // 3. Backups
    if let Some(registry) = &registry {
        healthy &= check_step(ui, "Backups", || check_backups(paths, secrets, registry, ui));
    }

    // 4. Host login
    check_step(ui, "Claude Code Login", || {
        let host = HostConfig::new(&paths.claude_config);
        match host.current_identity() {
            Ok(Some(identity)) => {
                let managed = registry
                    .as_ref()
                    .and_then(|r| r.find_oauth(&identity.email));
                match managed {
                    Some(number) => ui.println(format!(
                        "  {} Logged in as {} (#{})",
                        ui.icon_ok(),
                        identity.email,
                        number
                    )),
                    None => ui.println(format!(
                        "  {} Logged in as {}, not managed",
                        ui.icon_warn(),
                        identity.email
                    )),
                }
            }
            Ok(None) => ui.println(format!(
                "  {} Not logged in ({})",
                ui.icon_warn(),
                host.path().display()
            )),
            Err(e) => ui.println(format!("  {} {:#}", ui.icon_err(), e)),
        }
        match secrets.get(LIVE_CREDENTIALS) {
            Ok(Some(_)) => ui.println(format!("  {} Live credentials present", ui.icon_ok())),
            Ok(None) => ui.println(format!("  {} No live credentials", ui.icon_warn())),
            Err(e) => ui.println(format!("  {} {:#}", ui.icon_err(), e)),
        }
        true
    });

    // 5. API environment
    healthy &= check_step(ui, "API Environment", || {
        let env_file = paths.env_file.exists();
        let rc_block = fs::read_to_string(&paths.shell_rc)
            .map(|rc| rc.matches(BLOCK_START).count())
            .unwrap_or(0);
        let api_active = registry
            .as_ref()
            .and_then(Registry::active)
            .is_some_and(|(_, entry)| entry.account_type == AccountType::Api);

        ui.println(format!(
            "  {} Shell startup file: {}",
            ui.icon_info(),
            paths.shell_rc.display()
        ));
        let mut ok = true;
        if rc_block > 1 {
            ui.println(format!(
                "  {} {} managed blocks found; expected at most one",
                ui.icon_err(),
                rc_block
            ));
            ok = false;
        }
        match (api_active, env_file) {
            (true, false) => {
                ui.println(format!(
                    "  {} API account active but {} is missing",
                    ui.icon_err(),
                    paths.env_file.display()
                ));
                ok = false;
            }
            (false, true) => {
                ui.println(format!(
                    "  {} Stale {} left behind",
                    ui.icon_warn(),
                    paths.env_file.display()
                ));
            }
            (true, true) => ui.println(format!("  {} Environment projected", ui.icon_ok())),
            (false, false) => ui.println(format!("  {} Nothing projected", ui.icon_ok())),
        }
        if env_file && rc_block == 0 {
            ui.println(format!(
                "  {} Shell startup file does not source the environment",
                ui.icon_warn()
            ));
        }
        ok
    });

    // 6. Secret backend
    check_step(ui, "Secret Backend", || {
        ui.println(format!("  {} {}", ui.icon_info(), secrets.describe()));
        true
    });

    healthy
}

fn check_backups(paths: &Paths, secrets: &dyn SecretBackend, registry: &Registry, ui: &Ui) -> bool {
    let backups = Backups::new(paths, secrets);
    let mut all_present = true;

    for (number, entry) in &registry.accounts {
        if entry.account_type != AccountType::Oauth {
            continue;
        }
        match backups.presence(*number, &entry.email) {
            Ok(presence) if presence.complete() => {
                ui.println(format!("    {} #{} {}", ui.icon_ok(), number, entry.email));
            }
            Ok(presence) => {
                let mut missing = Vec::new();
                if !presence.credentials {
                    missing.push("credentials");
                }
                if !presence.config {
                    missing.push("config");
                }
                ui.println(format!(
                    "    {} #{} {} (missing: {})",
                    ui.icon_err(),
                    number,
                    entry.email,
                    missing.join(", ")
                ));
                all_present = false;
            }
            Err(e) => {
                ui.println(format!("    {} #{} {}: {:#}", ui.icon_err(), number, entry.email, e));
                all_present = false;
            }
        }
    }
    all_present
}

fn check_step<F>(ui: &Ui, name: &str, check_fn: F) -> bool
where
    F: FnOnce() -> bool,
{
    ui.println(ui.bold(format!("Checking {}...", name)));
    let success = check_fn();
    if !success {
        ui.println(ui.colored("  Issues detected!", AnsiColor::Red));
    }
    ui.newline();
    success
}
