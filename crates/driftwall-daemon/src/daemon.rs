//! The event loop & control plane (§4.I): single-threaded, cooperative,
//! built on `poll()` over the compositor's event fd, the signalfd, the
//! wakeup eventfd, and each output's frame timerfd.

use std::io;
use std::time::Instant;

use anyhow::{Context, Result};
use driftwall_config::{
    config_load, default_config_path, resolve_for_output, runtime_dir, take_set_index,
    write_pid_file, write_state, OutputEntry, OutputStateRecord, OutputStatus, DAEMON_NAME,
};
use driftwall_render::{
    CompositorBackend, CompositorSurfaceHandle, OutputEngine, OutputEvent, SharedGpu,
    ShaderCompiler, WaylandBackend, X11Backend,
};
use driftwall_scheduler::{CycleOutcome, CycleScheduler, CycleTarget};

use crate::cli::Cli;
use crate::outputs::ManagedOutput;
use crate::signals::{SignalFd, SignalKind};
use crate::wakeup::WakeupFd;

/// Removes the PID file on every exit path, including early returns via `?`.
struct PidGuard<'a> {
    name: &'a str,
}

impl Drop for PidGuard<'_> {
    fn drop(&mut self) {
        driftwall_config::remove_pid_file(self.name);
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path().context("resolving default config path")?,
    };
    let entries = config_load(&config_path).context("loading configuration")?;

    write_pid_file(DAEMON_NAME).context("writing pid file")?;
    let _pid_guard = PidGuard { name: DAEMON_NAME };

    tracing::info!(
        config = %config_path.display(),
        runtime_dir = %runtime_dir().display(),
        "starting driftwall"
    );

    if std::env::var_os("WAYLAND_DISPLAY").is_some() {
        let backend = WaylandBackend::connect().context("connecting to Wayland compositor")?;
        run_with_backend(backend, entries)
    } else {
        let backend = X11Backend::connect().context("connecting to X11 display")?;
        run_with_backend(backend, entries)
    }
}

/// Render/present failures an output must accumulate consecutively before
/// its published status flips from `Running` to `Error` (§8 scenario 6).
const MAX_CONSECUTIVE_RENDER_ERRORS: u32 = 5;

fn run_with_backend<B: CompositorBackend>(mut backend: B, entries: Vec<OutputEntry>) -> Result<()> {
    let compiler = ShaderCompiler::default();
    let discovered = backend.discover_outputs().context("discovering outputs")?;
    anyhow::ensure!(!discovered.is_empty(), "no outputs discovered");

    let mut handles = discovered.into_iter();
    let (first_id, first_surface) = handles.next().expect("checked non-empty above");
    let config = resolve_for_output(&entries, &first_id, &first_id)
        .cloned()
        .with_context(|| format!("no config resolved for output '{first_id}' and no default block"))?;
    let (width, height) = first_surface.physical_size().unwrap_or((1920, 1080));
    let (gpu, wgpu_surface) = SharedGpu::for_surface(&first_surface).context("initializing GPU")?;
    let engine = OutputEngine::new(first_id, &gpu, wgpu_surface, width, height, config, compiler)
        .context("building first output's render engine")?;
    let mut outputs = vec![ManagedOutput::new(engine)?];

    for (output_id, surface) in handles {
        let config = match resolve_for_output(&entries, &output_id, &output_id) {
            Some(cfg) => cfg.clone(),
            None => {
                tracing::warn!(output = %output_id, "no config resolved; skipping output");
                continue;
            }
        };
        let (width, height) = surface.physical_size().unwrap_or((1920, 1080));
        let wgpu_surface = gpu.create_surface_for(&surface).context("creating output surface")?;
        let engine = OutputEngine::new(output_id, &gpu, wgpu_surface, width, height, config, compiler)
            .context("building output's render engine")?;
        outputs.push(ManagedOutput::new(engine)?);
    }

    for output in &outputs {
        publish_state(DAEMON_NAME, output, OutputStatus::Running);
    }

    let signal_fd = SignalFd::new().context("setting up signalfd")?;
    let wakeup_fd = WakeupFd::new().context("setting up wakeup eventfd")?;
    let scheduler = CycleScheduler::new();

    event_loop(
        &gpu,
        &mut backend,
        &mut outputs,
        &entries,
        compiler,
        &signal_fd,
        &wakeup_fd,
        &scheduler,
    )?;

    shutdown(gpu, outputs);
    Ok(())
}

fn event_loop<B: CompositorBackend>(
    gpu: &SharedGpu,
    backend: &mut B,
    outputs: &mut Vec<ManagedOutput>,
    entries: &[OutputEntry],
    compiler: ShaderCompiler,
    signal_fd: &SignalFd,
    wakeup_fd: &WakeupFd,
    scheduler: &CycleScheduler,
) -> Result<()> {
    loop {
        let timeout_ms = next_timeout_ms(outputs);

        let mut pollfds = vec![
            libc::pollfd { fd: backend.event_fd(), events: libc::POLLIN, revents: 0 },
            libc::pollfd { fd: signal_fd.as_raw_fd(), events: libc::POLLIN, revents: 0 },
            libc::pollfd { fd: wakeup_fd.as_raw_fd(), events: libc::POLLIN, revents: 0 },
        ];
        for output in outputs.iter() {
            let fd = output.timer.as_ref().map(|t| t.as_raw_fd()).unwrap_or(-1);
            pollfds.push(libc::pollfd { fd, events: libc::POLLIN, revents: 0 });
        }

        let ready = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err).context("poll() failed");
        }

        let mut shutdown_requested = false;
        for signal in signal_fd.drain() {
            match signal {
                SignalKind::Shutdown => shutdown_requested = true,
                SignalKind::Next => scheduler.requests().request_next(),
                SignalKind::Pause => {
                    for output in outputs.iter_mut() {
                        output.paused = true;
                    }
                }
                SignalKind::Resume => {
                    for output in outputs.iter_mut() {
                        output.paused = false;
                    }
                }
                SignalKind::SetIndex => match take_set_index(DAEMON_NAME) {
                    Some(index) => scheduler.requests().request_set_index(index),
                    None => tracing::warn!("SIGRTMIN received but no set-index file was present"),
                },
            }
        }
        if shutdown_requested {
            tracing::info!("shutdown requested, exiting event loop");
            return Ok(());
        }

        for event in backend.dispatch_pending().context("dispatching compositor events")? {
            match event {
                OutputEvent::Resized { output_id, width, height } => {
                    if let Some(output) = outputs.iter_mut().find(|o| o.engine.output_id() == output_id) {
                        output.engine.resize(gpu, width, height);
                    }
                }
                OutputEvent::Removed { output_id } => {
                    outputs.retain(|o| o.engine.output_id() != output_id);
                }
                OutputEvent::DisplayLost { output_id } => {
                    if let Some(output) = outputs.iter_mut().find(|o| o.engine.output_id() == output_id) {
                        if !output.dormant {
                            tracing::warn!(output = %output_id, "compositor surface lost; marking output dormant");
                            output.dormant = true;
                            publish_state(DAEMON_NAME, output, status_of(output));
                        }
                    }
                }
                OutputEvent::Added { output_id, width, height } => {
                    if let Some(output) = outputs.iter_mut().find(|o| o.engine.output_id() == output_id) {
                        tracing::info!(output = %output_id, "output reappeared; resuming");
                        output.dormant = false;
                        output.errors_count = 0;
                        output.engine.resize(gpu, width, height);
                        publish_state(DAEMON_NAME, output, status_of(output));
                    } else {
                        match spawn_output(backend, gpu, entries, compiler, &output_id) {
                            Ok(managed) => {
                                tracing::info!(output = %output_id, "new output detected");
                                publish_state(DAEMON_NAME, &managed, OutputStatus::Running);
                                outputs.push(managed);
                            }
                            Err(err) => {
                                tracing::warn!(output = %output_id, error = %err, "failed to initialize newly detected output");
                            }
                        }
                    }
                }
            }
        }

        wakeup_fd.drain();

        let redraw: Vec<bool> = outputs
            .iter()
            .map(|output| match &output.timer {
                Some(timer) => timer.drain_expirations() > 0,
                None => true,
            })
            .collect();

        let now = Instant::now();
        let outcomes = scheduler.tick(now, outputs.as_mut_slice());
        for (output, outcome) in outputs.iter_mut().zip(outcomes.iter()) {
            if matches!(outcome, CycleOutcome::Advanced | CycleOutcome::SetToIndex(_)) {
                if let Err(err) = output.engine.apply_cycle_entry(gpu) {
                    tracing::warn!(output = output.engine.output_id(), error = %err, "failed to apply cycle entry");
                }
                output.engine.preload_next();
                publish_state(DAEMON_NAME, output, status_of(output));
            }
        }

        for (output, should_redraw) in outputs.iter_mut().zip(redraw.iter()) {
            if output.dormant || !should_redraw {
                continue;
            }
            match output.engine.render_frame(gpu, now) {
                Ok(()) => {
                    if output.errors_count > 0 {
                        output.errors_count = 0;
                        publish_state(DAEMON_NAME, output, status_of(output));
                    }
                }
                Err(wgpu::SurfaceError::Lost) => {
                    tracing::warn!(output = output.engine.output_id(), "surface lost; marking output dormant");
                    output.dormant = true;
                    publish_state(DAEMON_NAME, output, status_of(output));
                }
                Err(err) => {
                    output.errors_count = output.errors_count.saturating_add(1);
                    tracing::warn!(
                        output = output.engine.output_id(),
                        error = %err,
                        errors_count = output.errors_count,
                        "render error"
                    );
                    if output.errors_count == MAX_CONSECUTIVE_RENDER_ERRORS {
                        publish_state(DAEMON_NAME, output, status_of(output));
                    }
                }
            }
        }
    }
}

/// Builds and wraps the render engine for an output that appeared after
/// startup (§8 scenario 6): either a hot-plugged monitor, or a reannounced
/// `wl_output` this daemon has never seen before.
fn spawn_output<B: CompositorBackend>(
    backend: &B,
    gpu: &SharedGpu,
    entries: &[OutputEntry],
    compiler: ShaderCompiler,
    output_id: &str,
) -> Result<ManagedOutput> {
    let surface = backend
        .surface_for(output_id)
        .with_context(|| format!("backend has no surface for newly announced output '{output_id}'"))?;
    let config = resolve_for_output(entries, output_id, output_id)
        .cloned()
        .with_context(|| format!("no config resolved for output '{output_id}' and no default block"))?;
    let (width, height) = surface.physical_size().unwrap_or((1920, 1080));
    let wgpu_surface = gpu.create_surface_for(&surface).context("creating output surface")?;
    let engine = OutputEngine::new(output_id.to_string(), gpu, wgpu_surface, width, height, config, compiler)
        .context("building new output's render engine")?;
    ManagedOutput::new(engine)
}

fn next_timeout_ms(outputs: &[ManagedOutput]) -> i32 {
    // Pause only freezes cycling, not rendering (§4.G/§6), so a paused
    // shader output still needs frequent wakeups to keep animating. A
    // dormant output has no surface to render to at all.
    let continuous = outputs.iter().any(|output| {
        !output.dormant
            && ((output.timer.is_none() && output.engine.config().is_shader())
                || output.engine.is_transitioning())
    });
    if continuous {
        16
    } else {
        250
    }
}

fn status_of(output: &ManagedOutput) -> OutputStatus {
    if output.dormant {
        OutputStatus::Dormant
    } else if output.errors_count >= MAX_CONSECUTIVE_RENDER_ERRORS {
        OutputStatus::Error
    } else if output.paused {
        OutputStatus::Paused
    } else {
        OutputStatus::Running
    }
}

fn publish_state(name: &str, output: &ManagedOutput, status: OutputStatus) {
    let cfg = output.engine.config();
    let current_path = if cfg.cycle_paths.is_empty() {
        cfg.image()
            .map(|c| c.path.display().to_string())
            .or_else(|| cfg.shader().map(|c| c.shader_path.display().to_string()))
            .unwrap_or_default()
    } else {
        cfg.cycle_paths[output.engine.current_cycle_index()]
            .display()
            .to_string()
    };

    let record = OutputStateRecord {
        output_id: output.engine.output_id().to_string(),
        current_path,
        mode: if cfg.is_image() { "image".to_string() } else { "shader".to_string() },
        cycle_index: output.engine.current_cycle_index() as u32,
        cycle_total: cfg.cycle_paths.len() as u32,
        status,
        errors_count: output.errors_count,
    };
    if let Err(err) = write_state(name, &record) {
        tracing::warn!(output = %record.output_id, error = %err, "failed to publish state");
    }
}

extern "C" fn force_exit(_: i32) {
    unsafe {
        libc::_exit(1);
    }
}

/// Bounds teardown to 2 seconds (§4.I/§5): arms `alarm(2)` with a handler
/// that force-exits if GPU teardown deadlocks on a disconnected display,
/// then drops every GPU resource.
fn shutdown(gpu: SharedGpu, outputs: Vec<ManagedOutput>) {
    unsafe {
        libc::signal(libc::SIGALRM, force_exit as usize);
        libc::alarm(2);
    }
    drop(outputs);
    drop(gpu);
    unsafe {
        libc::alarm(0);
    }
}
