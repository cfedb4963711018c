//! CLI surface (§6, §10 "CLI"): one binary operating as either the daemon
//! or a client depending on PID-file liveness (§4.K). Daemon-mode flags are
//! top-level; control-plane commands are `clap` subcommands.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "driftwall", version, about = "GPU-accelerated wallpaper daemon")]
pub struct Cli {
    /// Run in the foreground instead of daemonizing.
    #[arg(short = 'f', long = "foreground")]
    pub foreground: bool,

    /// Path to the config file; defaults to $XDG_CONFIG_HOME/driftwall/config.toml.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Increases log verbosity; repeatable (-v, -vv).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Terminates the running daemon.
    Kill,
    /// Advances every cycling output to its next entry.
    Next,
    /// Pauses cycling and shader time advancement.
    Pause,
    /// Resumes a paused daemon.
    Resume,
    /// Jumps every cycling output directly to a cycle index (out-of-range
    /// outputs ignore the request; §4.G).
    Set {
        /// Zero-based index into the cycle list.
        idx: usize,
    },
    /// Prints the currently displayed wallpaper per output.
    Current,
    /// Prints each output's full published state.
    Status,
}

pub fn parse() -> Cli {
    Cli::parse()
}
