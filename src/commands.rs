//! High-level command orchestration for the CLI.
//!
//! Each function here corresponds to a subcommand in `main.rs`. They call
//! into [`SwitchEngine`] for anything that changes state and own all
//! user-facing text: `crate::ui` for output, prompts and spinners.

use anyhow::{Result, bail};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::doctor::run_doctor;
use crate::paths::Paths;
use crate::registry::AccountType;
use crate::secrets::SecretBackend;
use crate::store::AccountStore;
use crate::switch::{AccountKind, AddOutcome, SwitchEngine, SwitchOutcome};
use crate::ui::Ui;
use crate::wait::{WaitOutcome, host_process_running, wait_until};

/// List all managed accounts
pub fn list(engine: &SwitchEngine, ui: &Ui) -> Result<()> {
    let overview = engine.overview()?;

    if overview.accounts.is_empty() {
        ui.warn("No accounts managed yet.");
        ui.newline();
        ui.println("Log in to Claude Code, then run:");
        ui.println(format!("  {} add-oauth-account", ui.bold("ccswap")));
        return Ok(());
    }

    let mut table = ui.table();
    table.set_header(vec![
        ui.header_cell(""),
        ui.header_cell("#"),
        ui.header_cell("Account"),
        ui.header_cell("Type"),
        ui.header_cell("Details"),
        ui.header_cell("Added"),
    ]);

    for account in &overview.accounts {
        let is_active = overview.active == Some(account.number);
        let marker = if is_active { ui.icon_active() } else { " " };
        let label = if is_active {
            ui.colored_cell(&account.label, comfy_table::Color::Green)
        } else {
            ui.cell(&account.label)
        };
        let details = match &account.kind {
            AccountKind::Oauth => account.uuid.clone(),
            AccountKind::Api(record) => format!("{} {}", record.base_url, record.masked_token()),
        };

        table.add_row(vec![
            ui.cell(marker),
            ui.cell(account.number.to_string()),
            label,
            ui.type_cell(account.account_type()),
            ui.colored_cell(details, comfy_table::Color::DarkGrey),
            ui.cell(account.added.format("%Y-%m-%d").to_string()),
        ]);
    }

    ui.section("Accounts");
    ui.println(table.to_string());

    if let Some(live) = &overview.live {
        if overview.live_number.is_none() {
            ui.newline();
            ui.warn(format!(
                "Claude Code is logged in as {}, which is not managed.\nHint: Run 'ccswap add-oauth-account' to keep it.",
                live.email
            ));
        }
    }

    Ok(())
}

/// Show the active account and what the host application is using
pub fn status(engine: &SwitchEngine, ui: &Ui) -> Result<()> {
    let overview = engine.overview()?;
    let active = overview
        .active
        .and_then(|n| overview.accounts.iter().find(|a| a.number == n));

    ui.section("Current Account");
    ui.newline();

    let mut table = ui.table();
    match active {
        Some(account) => {
            table.add_row(vec![
                ui.cell("Active:"),
                ui.header_cell(format!("#{} {}", account.number, account.label)),
            ]);
            table.add_row(vec![ui.cell("Type:"), ui.type_cell(account.account_type())]);
        }
        None => {
            table.add_row(vec![ui.cell("Active:"), ui.cell("(none)")]);
        }
    }

    let live = match (&overview.live, overview.live_number) {
        (Some(id), Some(n)) => ui.cell(format!("{} (#{})", id.email, n)),
        (Some(id), None) => {
            ui.colored_cell(format!("{} (unmanaged)", id.email), comfy_table::Color::Yellow)
        }
        (None, _) => ui.colored_cell("not logged in", comfy_table::Color::Yellow),
    };
    table.add_row(vec![ui.cell("Claude Code login:"), live]);
    table.add_row(vec![
        ui.cell("API environment:"),
        ui.cell(if overview.env_applied { "projected" } else { "-" }),
    ]);

    ui.println(table.to_string());
    Ok(())
}

/// Register the account Claude Code is currently logged in to
pub fn add_oauth(engine: &SwitchEngine, ui: &Ui) -> Result<()> {
    match engine.add_oauth()? {
        AddOutcome::Added { number, email } => {
            ui.ok(format!("Added account #{}: {}", number, email));
        }
        AddOutcome::AlreadyManaged { number, email } => {
            ui.warn(format!("{} is already managed as account #{}", email, number));
        }
    }
    Ok(())
}

/// Register an API endpoint account
pub fn add_api(
    engine: &SwitchEngine,
    ui: &Ui,
    name: Option<&str>,
    base_url: Option<&str>,
    auth_token: Option<&str>,
) -> Result<()> {
    let number = engine.add_api(name, base_url, auth_token)?;
    ui.ok(format!("Added API account #{}", number));
    ui.info(format!("Activate it with: ccswap switch-to {}", number));
    Ok(())
}

/// Remove an account after confirmation
pub fn remove(engine: &SwitchEngine, ui: &Ui, identifier: &str, yes: bool) -> Result<()> {
    let preview = engine.removal_preview(identifier)?;

    if preview.is_active {
        ui.warn(format!(
            "Account #{} ({}) is the active account. After removal no account will be active.",
            preview.number, preview.label
        ));
    }

    if !yes {
        let confirmed = ui.confirm(
            &format!("Remove account #{} ({})?", preview.number, preview.label),
            "Stored credentials for this account will be deleted",
        )?;
        if !confirmed {
            ui.warn("Removal cancelled.");
            return Ok(());
        }
    }

    let removed = engine.remove(&preview.number.to_string())?;
    ui.ok(format!("Removed account #{} ({})", removed.number, removed.label));
    if removed.is_active {
        ui.println("Run 'ccswap switch' or 'ccswap switch-to <account>' to pick a new one.");
    }
    Ok(())
}

/// Rotate to the next account
pub fn switch(engine: &SwitchEngine, ui: &Ui, wait_secs: Option<u64>) -> Result<()> {
    wait_for_host_exit(ui, wait_secs)?;
    let spinner = ui.spinner("Switching account...");
    let outcome = engine.rotate();
    ui.spinner_done(&spinner);
    report_switch(ui, outcome?);
    Ok(())
}

/// Switch to a specific account
pub fn switch_to(engine: &SwitchEngine, ui: &Ui, identifier: &str, wait_secs: Option<u64>) -> Result<()> {
    wait_for_host_exit(ui, wait_secs)?;
    let spinner = ui.spinner(format!("Switching to {}...", identifier));
    let outcome = engine.switch_to(identifier);
    ui.spinner_done(&spinner);
    report_switch(ui, outcome?);
    Ok(())
}

fn report_switch(ui: &Ui, outcome: SwitchOutcome) {
    match outcome {
        SwitchOutcome::Switched {
            to,
            label,
            account_type,
            ..
        } => {
            ui.ok(format!("Switched to account #{}: {}", to, label));
            match account_type {
                AccountType::Oauth => {
                    ui.println(ui.dim("Restart Claude Code for the change to take effect."));
                }
                AccountType::Api => {
                    ui.println("New shells pick up the endpoint automatically. For this shell run:");
                    ui.println(format!("  eval \"$({} env)\"", ui.bold("ccswap")));
                }
            }
        }
        SwitchOutcome::RegisteredLive { number, email } => {
            ui.warn(format!(
                "Claude Code was logged in to an unmanaged account; added it as #{} ({}).",
                number, email
            ));
            ui.println("Run 'ccswap switch' again to rotate.");
        }
    }
}

/// Print shell commands for the active account, for `eval "$(ccswap env)"`
pub fn env(engine: &SwitchEngine, ui: &Ui) -> Result<()> {
    for line in engine.environment_commands()? {
        ui.println(line);
    }
    Ok(())
}

/// Run diagnostics on the ccswap setup
pub fn doctor(
    paths: &Paths,
    store: &dyn AccountStore,
    secrets: &dyn SecretBackend,
    ui: &Ui,
) -> Result<()> {
    if !run_doctor(paths, store, secrets, ui) {
        bail!("Doctor found problems");
    }
    Ok(())
}

fn wait_for_host_exit(ui: &Ui, wait_secs: Option<u64>) -> Result<()> {
    let Some(secs) = wait_secs else {
        return Ok(());
    };
    if !host_process_running() {
        return Ok(());
    }

    let spinner = ui.spinner(format!("Waiting up to {}s for Claude Code to exit...", secs));
    let cancel = AtomicBool::new(false);
    let outcome = wait_until(
        || !host_process_running(),
        Duration::from_secs(secs),
        Duration::from_millis(500),
        &cancel,
    );
    ui.spinner_done(&spinner);

    match outcome {
        WaitOutcome::Ready => Ok(()),
        WaitOutcome::TimedOut | WaitOutcome::Cancelled => bail!(
            "Claude Code is still running after {}s.\nHint: Quit Claude Code, then switch again.",
            secs
        ),
    }
}
