//! Declarative configuration, path resolution, and runtime-file persistence
//! for driftwall (§4.J, §4.K, §6 of the core specification).
//!
//! This crate is the "configuration collaborator": it owns the `toml`
//! deserialization schema for `output.<name>` blocks, validates the parsed
//! values against the ranges in §6, expands directory `path`/`shader`
//! references into cycle lists, and resolves an output's config by
//! connector name, then model name, then `default`. It also owns the
//! PID file, advisory state file, and set-index side-channel file that the
//! daemon publishes and the CLI multiplexer reads.

mod error;
mod load;
mod paths;
mod state;
mod types;

pub use error::{ConfigError, StateFileError};
pub use load::{config_load, default_entries, resolve_for_output, OutputEntry};
pub use paths::{default_config_path, runtime_dir, PathResolver};
pub use state::{
    pid_file_path, pid_is_alive, read_pid_file, read_state, remove_pid_file, set_index_file_path,
    state_file_path, take_set_index, write_pid_file, write_set_index, write_state,
    OutputStateRecord, OutputStatus,
};
pub use types::{
    DisplayMode, ImageConfig, ModeConfig, ShaderConfig, TransitionKind, WallpaperConfig,
};

/// Default name used to derive runtime-file names (`<name>.pid`,
/// `<name>-state`, `<name>-set-index`) and the config directory
/// (`$XDG_CONFIG_HOME/<name>/config.toml`).
pub const DAEMON_NAME: &str = "driftwall";
