//! Registry of live outputs (§4.E/§4.H/§4.I): pairs each
//! [`OutputEngine`] with the `timerfd` that paces it when its shader mode
//! runs with `vsync=false`, and delegates [`CycleTarget`] to the engine so
//! the scheduler can drive the registry directly.

use std::time::Duration;

use anyhow::Result;
use driftwall_config::WallpaperConfig;
use driftwall_render::OutputEngine;
use driftwall_scheduler::CycleTarget;

use crate::timerfd::TimerFd;

pub struct ManagedOutput {
    pub engine: OutputEngine,
    pub timer: Option<TimerFd>,
    pub paused: bool,
    /// Set when the compositor surface is known to be unusable (§8
    /// scenario 6: compositor disconnect) but the output hasn't been
    /// destroyed outright; the event loop stops polling and rendering it
    /// until a matching `Added`/`Resized` event clears this.
    pub dormant: bool,
    /// Consecutive render/present failures since the last success; drives
    /// the `Running` -> `Error` status transition.
    pub errors_count: u32,
}

impl ManagedOutput {
    pub fn new(engine: OutputEngine) -> Result<Self> {
        let mut managed = Self {
            engine,
            timer: None,
            paused: false,
            dormant: false,
            errors_count: 0,
        };
        managed.rearm_timer()?;
        Ok(managed)
    }

    /// (Re)arms this output's frame-pacing timerfd per its current config:
    /// only shader outputs with `vsync=false` get one (§4.E/§10).
    pub fn rearm_timer(&mut self) -> Result<()> {
        let needs_timer = self
            .engine
            .config()
            .shader()
            .map(|s| !s.vsync)
            .unwrap_or(false);

        if !needs_timer {
            self.timer = None;
            return Ok(());
        }

        let fps = self
            .engine
            .config()
            .shader()
            .map(|s| s.shader_fps)
            .unwrap_or(60)
            .max(1);
        let interval = Duration::from_secs_f64(1.0 / fps as f64);

        let timer = TimerFd::new()?;
        timer.arm_periodic(interval)?;
        self.timer = Some(timer);
        Ok(())
    }
}

impl CycleTarget for ManagedOutput {
    fn output_id(&self) -> &str {
        self.engine.output_id()
    }

    fn cycle_count(&self) -> usize {
        self.engine.cycle_count()
    }

    fn current_cycle_index(&self) -> usize {
        self.engine.current_cycle_index()
    }

    fn is_paused(&self) -> bool {
        // A dormant output (compositor surface lost) freezes exactly like
        // a paused one: no `next`/`set <idx>`/timer-driven advance until
        // it's revived.
        self.paused || self.dormant
    }

    fn should_cycle(&self, now: std::time::Instant) -> bool {
        self.engine.should_cycle(now)
    }

    fn advance_cycle(&mut self, now: std::time::Instant) {
        self.engine.advance_cycle(now)
    }

    fn set_cycle_index(&mut self, index: usize, now: std::time::Instant) {
        self.engine.set_cycle_index(index, now)
    }
}

/// Applies a just-loaded config to an output, rearming its timer if the
/// shader/vsync combination changed.
pub fn apply_config(output: &mut ManagedOutput, gpu: &driftwall_render::SharedGpu, config: WallpaperConfig) -> Result<()> {
    output.engine.apply_config(gpu, config)?;
    output.rearm_timer()
}
