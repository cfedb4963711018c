//! Image-to-image transition engine (§4.D): fade / slide-left / slide-right
//! / glitch / pixelate between two textures, progress-driven. The
//! ease-in-out-cubic progress curve is the same shape as the teacher's
//! `CrossfadeCurve::EaseInOut` (`gpu/timeline.rs`), repurposed here for
//! image transitions since shader-to-shader crossfade is out of scope.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use driftwall_config::TransitionKind;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct TransitionUniforms {
    resolution: [f32; 2],
    progress: f32,
    kind: u32,
}

fn kind_index(kind: TransitionKind) -> u32 {
    match kind {
        TransitionKind::None => 0,
        TransitionKind::Fade => 1,
        TransitionKind::SlideLeft => 2,
        TransitionKind::SlideRight => 3,
        TransitionKind::Glitch => 4,
        TransitionKind::Pixelate => 5,
    }
}

/// Eased progress in [0, 1]; ease-in-out-cubic per §4.D ("ease-in-out-cubic
/// curve for fade"). Slide/glitch/pixelate use the raw linear `t` instead,
/// since their visual motion doesn't benefit from easing the same way.
fn ease_in_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// Tracks one in-flight transition's timing; pure value type with no GPU
/// handles so it's cheap to carry around output state.
pub struct TransitionTimer {
    start: Instant,
    duration: Duration,
    kind: TransitionKind,
}

impl TransitionTimer {
    pub fn new(kind: TransitionKind, duration: Duration, now: Instant) -> Option<Self> {
        if kind == TransitionKind::None || duration <= Duration::ZERO {
            None
        } else {
            Some(Self {
                start: now,
                duration,
                kind,
            })
        }
    }

    pub fn kind(&self) -> TransitionKind {
        self.kind
    }

    /// Returns `(progress, finished)`. `progress` is eased for `Fade`.
    pub fn progress(&self, now: Instant) -> (f32, bool) {
        let elapsed = now.saturating_duration_since(self.start);
        let raw = elapsed.as_secs_f32() / self.duration.as_secs_f32().max(f32::EPSILON);
        let finished = raw >= 1.0;
        let progress = match self.kind {
            TransitionKind::Fade => ease_in_out_cubic(raw),
            _ => raw.clamp(0.0, 1.0),
        };
        (progress, finished)
    }
}

/// One compiled pipeline shared by every transition kind for an output,
/// matching §4.D: "a single fragment shader is compiled once per output".
pub struct TransitionPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
}

impl TransitionPipeline {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("driftwall transition shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(TRANSITION_WGSL)),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("driftwall transition bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("driftwall transition pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("driftwall transition pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("driftwall transition uniforms"),
            contents: bytemuck::bytes_of(&TransitionUniforms {
                resolution: [0.0, 0.0],
                progress: 0.0,
                kind: 0,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("driftwall transition sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
        }
    }

    /// Renders one transition frame from `from_view` to `to_view` at
    /// `progress`, writing to `target_view`.
    pub fn render_frame(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target_view: &wgpu::TextureView,
        from_view: &wgpu::TextureView,
        to_view: &wgpu::TextureView,
        width: u32,
        height: u32,
        kind: TransitionKind,
        progress: f32,
    ) {
        queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&TransitionUniforms {
                resolution: [width as f32, height as f32],
                progress,
                kind: kind_index(kind),
            }),
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("driftwall transition bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(from_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(to_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("driftwall transition frame"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("driftwall transition pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        queue.submit(Some(encoder.finish()));
    }
}

const TRANSITION_WGSL: &str = r#"
struct Uniforms {
    resolution: vec2<f32>,
    progress: f32,
    kind: u32,
};

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var tex_from: texture_2d<f32>;
@group(0) @binding(2) var tex_to: texture_2d<f32>;
@group(0) @binding(3) var tex_sampler: sampler;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOut {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -3.0),
        vec2<f32>(3.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    var out: VertexOut;
    let pos = positions[vertex_index];
    out.uv = pos * 0.5 + vec2<f32>(0.5, 0.5);
    out.position = vec4<f32>(pos, 0.0, 1.0);
    return out;
}

fn hash(p: vec2<f32>) -> f32 {
    return fract(sin(dot(p, vec2<f32>(12.9898, 78.233))) * 43758.5453);
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    var uv = in.uv;
    let p = u.progress;

    if (u.kind == 2u) {
        // slide-left: incoming image enters from the right
        uv = vec2<f32>(uv.x + p, uv.y);
        if (uv.x < 1.0) {
            return textureSample(tex_from, tex_sampler, uv);
        }
        return textureSample(tex_to, tex_sampler, vec2<f32>(uv.x - 1.0, uv.y));
    }
    if (u.kind == 3u) {
        // slide-right: incoming image enters from the left
        uv = vec2<f32>(uv.x - p, uv.y);
        if (uv.x >= 0.0) {
            return textureSample(tex_from, tex_sampler, uv);
        }
        return textureSample(tex_to, tex_sampler, vec2<f32>(uv.x + 1.0, uv.y));
    }
    if (u.kind == 4u) {
        // glitch: progressive horizontal block displacement that settles at p=1
        let block = floor(uv.y * 24.0);
        let jitter = (hash(vec2<f32>(block, floor(p * 20.0))) - 0.5) * (1.0 - p) * 0.15;
        let from_color = textureSample(tex_from, tex_sampler, vec2<f32>(uv.x + jitter, uv.y));
        let to_color = textureSample(tex_to, tex_sampler, uv);
        return mix(from_color, to_color, p);
    }
    if (u.kind == 5u) {
        // pixelate: shrink the sampled grid toward zero then back up as p -> 1
        let shrink = 1.0 - abs(p - 0.5) * 2.0;
        let cells = mix(1.0, 48.0, shrink);
        let size = max(u.resolution / cells, vec2<f32>(1.0));
        let snapped = floor(uv * u.resolution / size) * size / u.resolution;
        let from_color = textureSample(tex_from, tex_sampler, snapped);
        let to_color = textureSample(tex_to, tex_sampler, snapped);
        return mix(from_color, to_color, step(0.5, p));
    }

    // fade (kind == 1) and the kind == 0 passthrough both cross-fade linearly
    let from_color = textureSample(tex_from, tex_sampler, uv);
    let to_color = textureSample(tex_to, tex_sampler, uv);
    return mix(from_color, to_color, p);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ease_in_out_cubic_is_monotonic_and_bounded() {
        let mut last = 0.0;
        for step in 0..=10 {
            let t = step as f32 / 10.0;
            let sample = ease_in_out_cubic(t);
            assert!(sample >= last - f32::EPSILON);
            assert!((0.0..=1.0).contains(&sample));
            last = sample;
        }
        assert!((ease_in_out_cubic(0.0) - 0.0).abs() < 1e-6);
        assert!((ease_in_out_cubic(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn transition_timer_reports_progress_and_finishes() {
        let start = Instant::now();
        let timer = TransitionTimer::new(TransitionKind::SlideLeft, Duration::from_millis(100), start)
            .expect("timer");
        let (progress, finished) = timer.progress(start + Duration::from_millis(50));
        assert!((progress - 0.5).abs() < 0.05);
        assert!(!finished);
        let (_, finished) = timer.progress(start + Duration::from_millis(150));
        assert!(finished);
    }

    #[test]
    fn none_kind_never_produces_a_timer() {
        assert!(TransitionTimer::new(TransitionKind::None, Duration::from_secs(1), Instant::now())
            .is_none());
    }

    #[test]
    fn zero_duration_never_produces_a_timer() {
        assert!(TransitionTimer::new(TransitionKind::Fade, Duration::ZERO, Instant::now()).is_none());
    }
}
