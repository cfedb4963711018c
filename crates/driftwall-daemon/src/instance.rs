//! Single-instance check and CLI multiplexer (§4.K): on startup, decides
//! whether this invocation becomes the daemon or a client of an already
//! running one, and carries out the client-side half of every control-plane
//! command.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use driftwall_config::{pid_is_alive, read_pid_file, read_state, write_set_index, OutputStatus};
use driftwall_scheduler::validate_set_index;

use crate::cli::Command;

const KILL_TIMEOUT: Duration = Duration::from_secs(5);
const KILL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The PID of a live running daemon, if the PID file names one that's
/// still alive per `kill(pid, 0)`.
pub fn running_daemon_pid(name: &str) -> Option<u32> {
    let pid = read_pid_file(name)?;
    pid_is_alive(pid).then_some(pid)
}

/// Carries out a client-side control-plane command against the daemon
/// named `name`. Callers must already know a live instance exists.
pub fn dispatch(name: &str, pid: u32, command: Command) -> Result<()> {
    match command {
        Command::Kill => kill(pid),
        Command::Next => send_signal(pid, libc::SIGUSR1).context("requesting next"),
        Command::Pause => send_signal(pid, libc::SIGUSR2).context("requesting pause"),
        Command::Resume => send_signal(pid, libc::SIGCONT).context("requesting resume"),
        Command::Set { idx } => set_index(name, pid, idx),
        Command::Current => print_current(name),
        Command::Status => print_status(name),
    }
}

fn send_signal(pid: u32, signal: i32) -> Result<()> {
    let result = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if result != 0 {
        return Err(std::io::Error::last_os_error()).context(format!("sending signal {signal} to pid {pid}"));
    }
    Ok(())
}

/// SIGTERM, then polls `kill(pid, 0)` every 100ms for up to 5 seconds
/// before escalating to SIGKILL (§4.K, §5).
fn kill(pid: u32) -> Result<()> {
    send_signal(pid, libc::SIGTERM)?;
    let deadline = Instant::now() + KILL_TIMEOUT;
    while Instant::now() < deadline {
        if !pid_is_alive(pid) {
            return Ok(());
        }
        thread::sleep(KILL_POLL_INTERVAL);
    }
    if pid_is_alive(pid) {
        tracing::warn!(pid, "daemon did not exit within 5s of SIGTERM; escalating to SIGKILL");
        send_signal(pid, libc::SIGKILL)?;
    }
    Ok(())
}

/// Writes the set-index file then signals SIGRTMIN (§4.K). Validates
/// against the first output's published cycle length when a state file is
/// available, so an out-of-range request fails locally without waking the
/// daemon; an absent state file (first run, not yet rendered) skips that
/// check and lets the daemon's own per-output validation apply.
fn set_index(name: &str, pid: u32, idx: usize) -> Result<()> {
    let records = read_state(name).unwrap_or_default();
    if let Some(record) = records.first() {
        validate_set_index(&record.output_id, idx, record.cycle_total as usize)?;
    }
    write_set_index(name, idx as u32).context("writing set-index file")?;
    send_signal(pid, unsafe { libc::SIGRTMIN() }).context("signaling set-index request")
}

fn print_current(name: &str) -> Result<()> {
    let records = read_state(name).context("reading state file")?;
    if records.is_empty() {
        println!("no published state yet");
        return Ok(());
    }
    for record in records {
        println!("{}: {}", record.output_id, record.current_path);
    }
    Ok(())
}

fn print_status(name: &str) -> Result<()> {
    let records = read_state(name).context("reading state file")?;
    if records.is_empty() {
        println!("no published state yet");
        return Ok(());
    }
    for record in records {
        println!(
            "{} [{}] mode={} cycle={}/{} status={} errors={}",
            record.output_id,
            record.current_path,
            record.mode,
            record.cycle_index,
            record.cycle_total,
            status_str(record.status),
            record.errors_count,
        );
    }
    Ok(())
}

fn status_str(status: OutputStatus) -> &'static str {
    match status {
        OutputStatus::Running => "running",
        OutputStatus::Paused => "paused",
        OutputStatus::Dormant => "dormant",
        OutputStatus::Error => "error",
    }
}

/// Reports that no daemon is currently running, for every client command
/// except those that tolerate it (none do; §4.K requires a live instance).
pub fn no_daemon_running() -> anyhow::Error {
    anyhow::anyhow!("driftwall is not running")
}
