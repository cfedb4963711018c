//! Per-output render engine (§4.E): owns one output's GPU surface, its
//! active image or shader program, cycle position, in-flight transition,
//! and preloader, and exposes the operations the event loop and scheduler
//! drive it with. Shaped after the teacher's `gpu/state.rs::GpuState`
//! (surface + pipeline + uniforms + frame bookkeeping bundled behind one
//! per-output type), but carrying the specification's separate
//! image/shader modes instead of the teacher's shader-only, crossfade-only
//! model.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use driftwall_config::{DisplayMode, ModeConfig, TransitionKind, WallpaperConfig};
use driftwall_scheduler::CycleTarget;

use crate::decode::decode;
use crate::error::RenderError;
use crate::fps::FpsCounter;
use crate::fps_overlay::FpsOverlay;
use crate::gpu::{OutputTarget, SharedGpu};
use crate::image_pipeline::{ImagePipeline, ImageTexture};
use crate::preload::Preloader;
use crate::shader_host::Program;
use crate::transition::{TransitionPipeline, TransitionTimer};
use crate::types::ShaderCompiler;

enum ModeRuntime {
    Image {
        current: ImageTexture,
        current_path: PathBuf,
        outgoing: Option<ImageTexture>,
    },
    Shader {
        program: Option<Program>,
        shader_path: PathBuf,
        consecutive_failures: u32,
    },
}

/// One physical output's full render state. Created once per output at
/// startup (or when a new output appears) and torn down when the output is
/// removed.
pub struct OutputEngine {
    output_id: String,
    config: WallpaperConfig,
    target: OutputTarget,
    image_pipeline: ImagePipeline,
    transition_pipeline: TransitionPipeline,
    mode: ModeRuntime,
    cycle_index: usize,
    last_cycle: Instant,
    preloader: Preloader,
    transition: Option<TransitionTimer>,
    mouse: [f32; 4],
    compiler: ShaderCompiler,
    fps_counter: FpsCounter,
    fps_overlay: FpsOverlay,
}

impl OutputEngine {
    /// Builds the initial render state for `output_id` from `config`,
    /// uploading or compiling whatever its mode requires.
    pub fn new(
        output_id: String,
        gpu: &SharedGpu,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
        config: WallpaperConfig,
        compiler: ShaderCompiler,
    ) -> Result<Self> {
        let vsync = config.shader().map(|s| s.vsync).unwrap_or(true);
        let target = OutputTarget::new(gpu, surface, width, height, vsync)
            .context("configuring output surface")?;
        let image_pipeline = ImagePipeline::new(&gpu.device, target.format);
        let transition_pipeline = TransitionPipeline::new(&gpu.device, target.format);
        let fps_overlay = FpsOverlay::new(&gpu.device, target.format);

        let mode = Self::build_mode_runtime(&gpu.device, &gpu.queue, target.format, &config, width, height, compiler)?;

        Ok(Self {
            output_id,
            config,
            target,
            image_pipeline,
            transition_pipeline,
            mode,
            cycle_index: 0,
            last_cycle: Instant::now(),
            preloader: Preloader::new(),
            transition: None,
            mouse: [0.0; 4],
            compiler,
            fps_counter: FpsCounter::new(Instant::now()),
            fps_overlay,
        })
    }

    fn build_mode_runtime(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        config: &WallpaperConfig,
        width: u32,
        height: u32,
        compiler: ShaderCompiler,
    ) -> Result<ModeRuntime> {
        match &config.mode {
            ModeConfig::Image(image_cfg) => {
                let decoded = decode(&image_cfg.path, width, height, image_cfg.display_mode)
                    .with_context(|| format!("decoding {}", image_cfg.path.display()))?;
                let current = {
                    let image_pipeline = ImagePipeline::new(device, surface_format);
                    image_pipeline.upload(device, queue, &decoded)
                };
                Ok(ModeRuntime::Image {
                    current,
                    current_path: image_cfg.path.clone(),
                    outgoing: None,
                })
            }
            ModeConfig::Shader(shader_cfg) => {
                let program = Program::load(
                    device,
                    queue,
                    surface_format,
                    &shader_cfg.shader_path,
                    &shader_cfg.channels,
                    width,
                    height,
                    compiler,
                )
                .map_err(|err| RenderError::ShaderCompile {
                    output: String::new(),
                    stage: err.stage,
                    info_log: err.info_log,
                    line_hint: err.line_hint,
                })?;
                Ok(ModeRuntime::Shader {
                    program: Some(program),
                    shader_path: shader_cfg.shader_path.clone(),
                    consecutive_failures: 0,
                })
            }
        }
    }

    pub fn output_id(&self) -> &str {
        &self.output_id
    }

    pub fn config(&self) -> &WallpaperConfig {
        &self.config
    }

    /// Replaces this output's configuration wholesale (§4.E: configs are
    /// immutable once constructed and swapped in full, never mutated).
    /// Rebuilds whatever GPU resources the new mode needs.
    pub fn apply_config(&mut self, gpu: &SharedGpu, config: WallpaperConfig) -> Result<()> {
        let width = self.target.width;
        let height = self.target.height;
        self.mode = Self::build_mode_runtime(
            &gpu.device,
            &gpu.queue,
            self.target.format,
            &config,
            width,
            height,
            self.compiler,
        )?;
        let vsync = config.shader().map(|s| s.vsync).unwrap_or(true);
        self.target.set_vsync(gpu, vsync);
        self.config = config;
        self.cycle_index = 0;
        self.last_cycle = Instant::now();
        self.transition = None;
        Ok(())
    }

    /// Directly swaps in a new static image, starting a transition if the
    /// config names one (§4.D/§4.E).
    pub fn set_wallpaper(&mut self, gpu: &SharedGpu, path: &Path, display_mode: DisplayMode) -> Result<()> {
        let decoded = decode(path, self.target.width, self.target.height, display_mode)
            .with_context(|| format!("decoding {}", path.display()))?;
        let incoming = self.image_pipeline.upload(&gpu.device, &gpu.queue, &decoded);

        let transition_cfg = self.config.image().map(|c| (c.transition, c.transition_duration));
        match &mut self.mode {
            ModeRuntime::Image {
                current,
                current_path,
                outgoing,
            } => {
                let previous = std::mem::replace(current, incoming);
                *current_path = path.to_path_buf();
                *outgoing = Some(previous);
                if let Some((kind, duration)) = transition_cfg {
                    self.transition = TransitionTimer::new(kind, duration, Instant::now());
                    if self.transition.is_none() {
                        *outgoing = None;
                    }
                } else {
                    *outgoing = None;
                }
            }
            ModeRuntime::Shader { .. } => {
                anyhow::bail!("set_wallpaper called on a shader-mode output");
            }
        }
        Ok(())
    }

    /// Swaps the active shader program. On compile failure, keeps
    /// rendering the previous program and returns `Err` so the caller can
    /// bump its latch via [`Program::note_load_failure`]-equivalent
    /// bookkeeping, which lives on `self` here since `OutputEngine`
    /// persists across attempts.
    pub fn set_shader(
        &mut self,
        gpu: &SharedGpu,
        path: &Path,
        channels: &[PathBuf],
    ) -> Result<(), crate::error::ShaderError> {
        let ModeRuntime::Shader {
            program,
            shader_path,
            consecutive_failures,
        } = &mut self.mode
        else {
            return Err(crate::error::ShaderError {
                stage: "swap",
                info_log: "set_shader called on an image-mode output".to_string(),
                line_hint: None,
            });
        };

        match Program::load(
            &gpu.device,
            &gpu.queue,
            self.target.format,
            path,
            channels,
            self.target.width,
            self.target.height,
            self.compiler,
        ) {
            Ok(next) => {
                if let Some(old) = program.replace(next) {
                    old.destroy();
                }
                *shader_path = path.to_path_buf();
                *consecutive_failures = 0;
                Ok(())
            }
            Err(err) => {
                let tripped = Program::note_load_failure(consecutive_failures);
                if tripped {
                    tracing::warn!(
                        output = %self.output_id,
                        path = %path.display(),
                        "shader failed to load three times in a row; holding last-good program"
                    );
                }
                Err(err)
            }
        }
    }

    /// Resizes the output surface and every dependent GPU resource.
    pub fn resize(&mut self, gpu: &SharedGpu, width: u32, height: u32) {
        self.target.resize(gpu, width, height);
        if let ModeRuntime::Shader {
            program: Some(program),
            ..
        } = &mut self.mode
        {
            program.resize(&gpu.device, width, height);
        }
    }

    pub fn set_mouse(&mut self, x: f32, y: f32, left_down: bool, click_x: f32, click_y: f32) {
        self.mouse = [
            x,
            y,
            if left_down { click_x } else { -click_x.abs() },
            click_y,
        ];
    }

    /// Preloads the next cycle entry on a worker thread ahead of
    /// `should_cycle` firing, so the transition starts without decode
    /// jitter (§4.F).
    pub fn preload_next(&mut self) {
        if !self.config.cycle_enabled() {
            return;
        }
        let next_index = (self.cycle_index + 1) % self.config.cycle_paths.len();
        let path = self.config.cycle_paths[next_index].clone();
        let display_mode = self.config.image().map(|c| c.display_mode).unwrap_or_default();
        self.preloader
            .preload(path, self.target.width, self.target.height, display_mode);
    }

    /// Renders one frame. `now` drives shader time uniforms and transition
    /// progress.
    pub fn render_frame(&mut self, gpu: &SharedGpu, now: Instant) -> Result<(), wgpu::SurfaceError> {
        let frame = self.target.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        match &mut self.mode {
            ModeRuntime::Shader {
                program: Some(program),
                ..
            } => {
                let speed = self.config.shader().map(|s| s.shader_speed).unwrap_or(1.0);
                program.render_frame(&gpu.device, &gpu.queue, &view, now, self.mouse, speed);
            }
            ModeRuntime::Shader { program: None, .. } => {}
            ModeRuntime::Image { current, outgoing, .. } => {
                let display_mode = self.config.image().map(|c| c.display_mode).unwrap_or_default();
                let finished = match (&self.transition, outgoing.as_ref()) {
                    (Some(timer), Some(previous)) => {
                        let (progress, finished) = timer.progress(now);
                        self.transition_pipeline.render_frame(
                            &gpu.device,
                            &gpu.queue,
                            &view,
                            previous.view(),
                            current.view(),
                            self.target.width,
                            self.target.height,
                            timer.kind(),
                            progress,
                        );
                        finished
                    }
                    _ => {
                        self.image_pipeline.render_frame(
                            &gpu.device,
                            &gpu.queue,
                            &view,
                            current,
                            display_mode,
                            self.target.width,
                            self.target.height,
                        );
                        true
                    }
                };
                if finished {
                    self.transition = None;
                    *outgoing = None;
                }
            }
        }

        self.fps_counter.record_frame(now);
        if self.config.show_fps {
            self.fps_overlay.render(
                &gpu.device,
                &gpu.queue,
                &view,
                self.target.width,
                self.target.height,
                self.fps_counter.current_fps(),
            );
        }

        frame.present();
        Ok(())
    }

    /// Current measured frames-per-second for this output, updated once per
    /// one-second window (§4.E).
    pub fn current_fps(&self) -> u32 {
        self.fps_counter.current_fps()
    }

    /// Whether the output is currently animating a transition; the
    /// scheduler must not advance the cycle again until this clears
    /// (§4.E/§4.G: "not mid-transition").
    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }
}

impl CycleTarget for OutputEngine {
    fn output_id(&self) -> &str {
        &self.output_id
    }

    fn cycle_count(&self) -> usize {
        self.config.cycle_paths.len()
    }

    fn current_cycle_index(&self) -> usize {
        self.cycle_index
    }

    fn is_paused(&self) -> bool {
        // Pause/dormant state lives on `ManagedOutput`, not the engine
        // itself; an engine used directly (e.g. tests) never pauses.
        false
    }

    fn should_cycle(&self, now: Instant) -> bool {
        self.config.cycle_enabled()
            && self.config.cycle_duration > Duration::ZERO
            && !self.is_transitioning()
            && now.saturating_duration_since(self.last_cycle) >= self.config.cycle_duration
    }

    fn advance_cycle(&mut self, now: Instant) {
        if !self.config.cycle_enabled() {
            return;
        }
        self.cycle_index = (self.cycle_index + 1) % self.config.cycle_paths.len();
        self.last_cycle = now;
        // Actual GPU work (texture upload, channel-0 swap, or transition
        // start) happens on the event loop's next tick, once it has a
        // `SharedGpu` handle to pass to `apply_cycle_entry`.
    }

    fn set_cycle_index(&mut self, index: usize, now: Instant) {
        self.cycle_index = index;
        self.last_cycle = now;
    }
}

impl OutputEngine {
    /// Performs the GPU-side work for the cycle position `advance_cycle`/
    /// `set_cycle_index` just moved to: uploads the next image, or (for
    /// the hybrid shader-plus-image-cycle case from §4.E) swaps iChannel0
    /// on the running shader instead of recompiling it.
    pub fn apply_cycle_entry(&mut self, gpu: &SharedGpu) -> Result<()> {
        if !self.config.cycle_enabled() {
            return Ok(());
        }
        let path = self.config.cycle_paths[self.cycle_index].clone();

        if self.config.is_hybrid_channel_cycle() {
            if let ModeRuntime::Shader {
                program: Some(program),
                ..
            } = &mut self.mode
            {
                program.reload_channel0(&gpu.device, &gpu.queue, &path);
            }
            return Ok(());
        }

        let display_mode = self.config.image().map(|c| c.display_mode).unwrap_or_default();
        if self.preloader.is_ready_for(&path) {
            if let Some((_, decoded)) = self.preloader.take_upload_pending() {
                let incoming = self.image_pipeline.upload(&gpu.device, &gpu.queue, &decoded);
                self.swap_in_image(incoming, path);
                self.preloader.clear_ready();
                return Ok(());
            }
        }
        self.set_wallpaper(gpu, &path, display_mode)
    }

    fn swap_in_image(&mut self, incoming: ImageTexture, path: PathBuf) {
        let transition_cfg = self.config.image().map(|c| (c.transition, c.transition_duration));
        if let ModeRuntime::Image {
            current,
            current_path,
            outgoing,
        } = &mut self.mode
        {
            let previous = std::mem::replace(current, incoming);
            *current_path = path;
            if let Some((kind, duration)) = transition_cfg {
                self.transition = TransitionTimer::new(kind, duration, Instant::now());
            }
            *outgoing = if self.transition.is_some() { Some(previous) } else { None };
        }
    }
}
