//! Runtime-file persistence: PID file, advisory state file, and the
//! set-index side-channel file consumed by SIGRTMIN (§4.J, §4.K, §6).
//!
//! The state file is guarded by both an in-process mutex (so two writers in
//! the same daemon process never interleave) and an advisory `fcntl` file
//! lock (so a sibling CLI invocation reading the file sees a consistent
//! snapshot), per §5's shared-state model.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StateFileError;
use crate::paths::runtime_dir;

static STATE_FILE_LOCK: Mutex<()> = Mutex::new(());

/// Status reported in the state file for an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    Running,
    Paused,
    Dormant,
    Error,
}

impl OutputStatus {
    fn as_str(self) -> &'static str {
        match self {
            OutputStatus::Running => "running",
            OutputStatus::Paused => "paused",
            OutputStatus::Dormant => "dormant",
            OutputStatus::Error => "error",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "running" => Some(OutputStatus::Running),
            "paused" => Some(OutputStatus::Paused),
            "dormant" => Some(OutputStatus::Dormant),
            "error" => Some(OutputStatus::Error),
            _ => None,
        }
    }
}

/// One output's published state, as read back by the CLI multiplexer.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputStateRecord {
    pub output_id: String,
    pub current_path: String,
    pub mode: String,
    pub cycle_index: u32,
    pub cycle_total: u32,
    pub status: OutputStatus,
    /// Consecutive render/present failures since the last successful
    /// frame; reset to 0 on success, drives the `Running` -> `Error`
    /// transition once it crosses the daemon's threshold (§8 scenario 6).
    pub errors_count: u32,
}

pub fn pid_file_path(name: &str) -> PathBuf {
    runtime_dir().join(format!("{name}.pid"))
}

pub fn state_file_path(name: &str) -> PathBuf {
    runtime_dir().join(format!("{name}-state"))
}

pub fn set_index_file_path(name: &str) -> PathBuf {
    runtime_dir().join(format!("{name}-set-index"))
}

/// Writes the PID file for the current process. Called once at daemon
/// startup after the single-instance check passes.
pub fn write_pid_file(name: &str) -> Result<(), StateFileError> {
    let path = pid_file_path(name);
    let pid = std::process::id();
    std::fs::write(&path, pid.to_string()).map_err(|source| StateFileError::Write { path, source })
}

pub fn read_pid_file(name: &str) -> Option<u32> {
    let path = pid_file_path(name);
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

pub fn remove_pid_file(name: &str) {
    let _ = std::fs::remove_file(pid_file_path(name));
}

/// Writes one output's state as `key=value` lines, per the §6 persisted
/// state format. Appends/replaces only this output's block; other outputs'
/// blocks in the same file are preserved so multi-output daemons share one
/// state file.
pub fn write_state(name: &str, record: &OutputStateRecord) -> Result<(), StateFileError> {
    let _guard = STATE_FILE_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
    let path = state_file_path(name);

    let mut records = read_all_records(&path).unwrap_or_default();
    if let Some(existing) = records.iter_mut().find(|r| r.output_id == record.output_id) {
        *existing = record.clone();
    } else {
        records.push(record.clone());
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .map_err(|source| StateFileError::Write { path: path.clone(), source })?;

    lock_exclusive(&file);
    for rec in &records {
        writeln!(file, "output_id={}", rec.output_id)
            .and_then(|_| writeln!(file, "current_path={}", rec.current_path))
            .and_then(|_| writeln!(file, "mode={}", rec.mode))
            .and_then(|_| writeln!(file, "cycle_index={}", rec.cycle_index))
            .and_then(|_| writeln!(file, "cycle_total={}", rec.cycle_total))
            .and_then(|_| writeln!(file, "status={}", rec.status.as_str()))
            .and_then(|_| writeln!(file, "errors_count={}", rec.errors_count))
            .and_then(|_| writeln!(file, "---"))
            .map_err(|source| StateFileError::Write { path: path.clone(), source })?;
    }
    unlock(&file);
    Ok(())
}

/// Reads every output's state record, used by the CLI's `current`/`status`
/// commands to answer without waking the daemon.
pub fn read_state(name: &str) -> Result<Vec<OutputStateRecord>, StateFileError> {
    let _guard = STATE_FILE_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
    read_all_records(&state_file_path(name))
}

fn read_all_records(path: &Path) -> Result<Vec<OutputStateRecord>, StateFileError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(StateFileError::Read { path: path.to_path_buf(), source }),
    };
    lock_shared(&file);
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|source| StateFileError::Read { path: path.to_path_buf(), source })?;
    unlock(&file);

    let mut records = Vec::new();
    let mut output_id = None;
    let mut current_path = None;
    let mut mode = None;
    let mut cycle_index = None;
    let mut cycle_total = None;
    let mut status = None;
    let mut errors_count = None;

    for line in contents.lines() {
        if line == "---" {
            let record = OutputStateRecord {
                output_id: output_id.take().ok_or_else(|| StateFileError::Malformed(line.to_string()))?,
                current_path: current_path.take().unwrap_or_default(),
                mode: mode.take().unwrap_or_default(),
                cycle_index: cycle_index.take().unwrap_or(0),
                cycle_total: cycle_total.take().unwrap_or(0),
                status: status.take().unwrap_or(OutputStatus::Running),
                errors_count: errors_count.take().unwrap_or(0),
            };
            records.push(record);
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "output_id" => output_id = Some(value.to_string()),
            "current_path" => current_path = Some(value.to_string()),
            "mode" => mode = Some(value.to_string()),
            "cycle_index" => cycle_index = value.parse().ok(),
            "cycle_total" => cycle_total = value.parse().ok(),
            "status" => status = OutputStatus::parse(value),
            "errors_count" => errors_count = value.parse().ok(),
            _ => {}
        }
    }
    Ok(records)
}

/// Writes the one-shot set-index file consumed by SIGRTMIN (§4.K: the CLI
/// writes the file, then signals; the daemon reads-and-removes it).
pub fn write_set_index(name: &str, index: u32) -> Result<(), StateFileError> {
    let path = set_index_file_path(name);
    std::fs::write(&path, index.to_string()).map_err(|source| StateFileError::Write { path, source })
}

/// Reads and removes the set-index file. Returns `None` if the file was
/// absent — per §10's open question, the daemon must treat that as a
/// warning-worthy race, not a crash.
pub fn take_set_index(name: &str) -> Option<u32> {
    let path = set_index_file_path(name);
    let contents = std::fs::read_to_string(&path).ok()?;
    let _ = std::fs::remove_file(&path);
    contents.trim().parse().ok()
}

fn lock_exclusive(file: &File) {
    use std::os::unix::io::AsRawFd;
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_EX);
    }
}

fn lock_shared(file: &File) {
    use std::os::unix::io::AsRawFd;
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_SH);
    }
}

fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

/// Whether the process recorded in the PID file is still alive, per
/// `kill(pid, 0)` semantics used by the single-instance check (§4.K).
pub fn pid_is_alive(pid: u32) -> bool {
    let result = unsafe { libc::kill(pid as libc::pid_t, 0) };
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    static ENV_LOCK: StdMutex<()> = StdMutex::new(());

    fn with_runtime_dir<R>(f: impl FnOnce() -> R) -> R {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let previous = std::env::var("XDG_RUNTIME_DIR").ok();
        std::env::set_var("XDG_RUNTIME_DIR", dir.path());
        let result = f();
        match previous {
            Some(value) => std::env::set_var("XDG_RUNTIME_DIR", value),
            None => std::env::remove_var("XDG_RUNTIME_DIR"),
        }
        result
    }

    #[test]
    fn state_round_trips_exactly() {
        with_runtime_dir(|| {
            let record = OutputStateRecord {
                output_id: "HDMI-A-2".into(),
                current_path: "/tmp/a.png".into(),
                mode: "image".into(),
                cycle_index: 1,
                cycle_total: 3,
                status: OutputStatus::Running,
                errors_count: 0,
            };
            write_state("driftwall-test", &record).unwrap();
            let records = read_state("driftwall-test").unwrap();
            assert_eq!(records, vec![record]);
        });
    }

    #[test]
    fn writing_one_output_preserves_others() {
        with_runtime_dir(|| {
            let a = OutputStateRecord {
                output_id: "A".into(),
                current_path: "/tmp/a.png".into(),
                mode: "image".into(),
                cycle_index: 0,
                cycle_total: 1,
                status: OutputStatus::Running,
                errors_count: 0,
            };
            let b = OutputStateRecord {
                output_id: "B".into(),
                current_path: "/tmp/b.glsl".into(),
                mode: "shader".into(),
                cycle_index: 0,
                cycle_total: 0,
                status: OutputStatus::Dormant,
                errors_count: 3,
            };
            write_state("driftwall-test", &a).unwrap();
            write_state("driftwall-test", &b).unwrap();
            let records = read_state("driftwall-test").unwrap();
            assert_eq!(records.len(), 2);
        });
    }

    #[test]
    fn set_index_is_consumed_once() {
        with_runtime_dir(|| {
            write_set_index("driftwall-test", 2).unwrap();
            assert_eq!(take_set_index("driftwall-test"), Some(2));
            assert_eq!(take_set_index("driftwall-test"), None);
        });
    }

    #[test]
    fn pid_file_round_trips() {
        with_runtime_dir(|| {
            write_pid_file("driftwall-test").unwrap();
            let pid = read_pid_file("driftwall-test").unwrap();
            assert_eq!(pid, std::process::id());
            assert!(pid_is_alive(pid));
            remove_pid_file("driftwall-test");
            assert!(read_pid_file("driftwall-test").is_none());
        });
    }
}
