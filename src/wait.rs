//! Waiting for the host application to exit before a switch.
//!
//! Swapping credentials under a running Claude Code session makes it write
//! stale tokens back on exit, so the CLI can optionally hold off until no
//! `claude` process is left.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

/// Process name of the host application
pub const HOST_PROCESS: &str = "claude";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

/// Poll `ready` every `interval` until it returns true, `timeout` elapses,
/// or `cancel` is set.
pub fn wait_until<F>(mut ready: F, timeout: Duration, interval: Duration, cancel: &AtomicBool) -> WaitOutcome
where
    F: FnMut() -> bool,
{
    let started = Instant::now();
    loop {
        if cancel.load(Ordering::Relaxed) {
            return WaitOutcome::Cancelled;
        }
        if ready() {
            return WaitOutcome::Ready;
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return WaitOutcome::TimedOut;
        }
        std::thread::sleep(interval.min(timeout - elapsed));
    }
}

/// Whether any process named like the host application is running
pub fn host_process_running() -> bool {
    let refresh = RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing());
    let mut system = System::new_with_specifics(refresh);
    system.refresh_processes(ProcessesToUpdate::All, true);
    let own_pid = sysinfo::get_current_pid().ok();
    system.processes().iter().any(|(pid, process)| {
        Some(*pid) != own_pid && process.name().to_string_lossy().eq_ignore_ascii_case(HOST_PROCESS)
    })
}
