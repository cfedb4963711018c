//! GPU device/instance (shared across outputs) and per-output surface
//! wiring (§4.A, §4.H). `wgpu` stands in for the spec's EGL/GL call layer
//! per SPEC_FULL §1's REDESIGN note; the teacher's adapter-selection and
//! present-mode logic (`renderer/src/gpu/context.rs`) is reused almost
//! verbatim, trimmed of the antialiasing/power-preference knobs the spec
//! does not call for.

use anyhow::{anyhow, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Created once for the whole daemon and shared by reference across every
/// output, matching the "Global daemon state" data model entry
/// (`gpu_instance, gpu_device, gpu_queue`).
pub struct SharedGpu {
    pub instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl SharedGpu {
    /// Creates the shared instance/device/queue using the first output's
    /// surface to pick a compatible adapter. Subsequent outputs reuse this
    /// device; additional outputs on a different adapter are not
    /// supported (matches the teacher's single-adapter assumption).
    pub fn for_surface<T>(target: &T) -> Result<(Self, wgpu::Surface<'static>)>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;

        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let adapter_info = adapter.get_info();
        tracing::info!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "selected GPU adapter"
        );

        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("driftwall gpu device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        Ok((
            Self {
                instance,
                device,
                queue,
            },
            surface,
        ))
    }

    /// Creates a surface for an additional output against the already
    /// resolved instance, matching the single-adapter assumption
    /// documented on [`SharedGpu::for_surface`].
    pub fn create_surface_for<T>(&self, target: &T) -> Result<wgpu::Surface<'static>>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;

        unsafe {
            self.instance
                .create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                    raw_display_handle: display_handle.as_raw(),
                    raw_window_handle: window_handle.as_raw(),
                })
        }
        .context("failed to create rendering surface")
    }
}

/// Per-output surface configuration and physical size, owned exclusively
/// by that output per the "Output state" data model entry.
pub struct OutputTarget {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
}

impl OutputTarget {
    /// Configures `surface` (already created against `gpu`'s adapter) at
    /// `(width, height)`. `vsync` selects the present mode per §4.E's
    /// frame-timer-vs-vsync rule: vsync=true arms `PresentMode::Fifo`
    /// (swap interval 1); vsync=false prefers `Immediate`/`Mailbox`
    /// (swap interval 0, paced instead by a timerfd).
    pub fn new(
        gpu: &SharedGpu,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self> {
        let adapter = pollster::block_on(gpu.instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            },
        ))
        .context("failed to re-resolve adapter for output surface")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .unwrap_or(caps.formats[0]);

        let present_mode = select_present_mode(&caps.present_modes, vsync);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);

        Ok(Self {
            surface,
            config,
            format,
            width: width.max(1),
            height: height.max(1),
        })
    }

    pub fn resize(&mut self, gpu: &SharedGpu, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.width = width;
        self.height = height;
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&gpu.device, &self.config);
    }

    pub fn set_vsync(&mut self, gpu: &SharedGpu, vsync: bool) {
        let target = select_present_mode(&[self.config.present_mode], vsync);
        if target != self.config.present_mode {
            self.config.present_mode = target;
            self.surface.configure(&gpu.device, &self.config);
        }
    }
}

fn select_present_mode(available: &[wgpu::PresentMode], vsync: bool) -> wgpu::PresentMode {
    if vsync {
        available
            .iter()
            .copied()
            .find(|m| *m == wgpu::PresentMode::Fifo)
            .unwrap_or(wgpu::PresentMode::Fifo)
    } else {
        available
            .iter()
            .copied()
            .find(|m| *m == wgpu::PresentMode::Immediate)
            .or_else(|| {
                available
                    .iter()
                    .copied()
                    .find(|m| *m == wgpu::PresentMode::Mailbox)
            })
            .unwrap_or(wgpu::PresentMode::Fifo)
    }
}
