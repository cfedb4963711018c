//! Entry point wiring: parses the CLI, initialises logging, then decides
//! whether this invocation becomes the daemon or a client of an already
//! running one (§4.K).

mod cli;
mod daemon;
mod daemonize;
mod instance;
mod outputs;
mod signals;
mod timerfd;
mod wakeup;

use anyhow::Result;
use cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = cli::parse();
    initialise_tracing(cli.verbose);

    match cli.command.clone() {
        Some(command) => run_client_command(command),
        None => run_daemon(cli),
    }
}

fn initialise_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn,driftwall=info,driftwall_daemon=info,driftwall_render=info,driftwall_config=info,driftwall_scheduler=info,naga=error,wgpu=error,wgpu_core=error,wgpu_hal=error",
        1 => "info,driftwall=debug,driftwall_daemon=debug,driftwall_render=debug,driftwall_config=debug,driftwall_scheduler=debug,naga=error,wgpu=error,wgpu_core=error,wgpu_hal=error",
        _ => "debug,driftwall=trace,driftwall_daemon=trace,driftwall_render=trace,driftwall_config=trace,driftwall_scheduler=trace,naga=warn,wgpu=warn,wgpu_core=warn,wgpu_hal=warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run_client_command(command: cli::Command) -> Result<()> {
    let pid = instance::running_daemon_pid(driftwall_config::DAEMON_NAME)
        .ok_or_else(instance::no_daemon_running)?;
    instance::dispatch(driftwall_config::DAEMON_NAME, pid, command)
}

fn run_daemon(cli: Cli) -> Result<()> {
    if let Some(pid) = instance::running_daemon_pid(driftwall_config::DAEMON_NAME) {
        anyhow::bail!("driftwall is already running (pid {pid})");
    }

    let foreground = cli.foreground;
    if !foreground {
        daemonize::daemonize()?;
    }

    daemon::run(cli)
}
