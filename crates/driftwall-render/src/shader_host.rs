//! Shadertoy-compatible shader host (§4.C): compiles single- or multi-pass
//! programs, owns ping-pong buffer render targets, and drives per-frame
//! uniform updates. Pipeline/bind-group wiring follows the teacher's
//! `renderer/src/gpu/pipeline.rs` shape; multi-pass buffer chaining and the
//! three-strikes `shader_load_failed` latch are new, since the teacher only
//! ever compiles one pass.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use wgpu::util::DeviceExt;

use crate::compile::{compile_fragment_shader, compile_vertex_shader, recommended_buffer_scale, split_passes};
use crate::error::ShaderError;
use crate::gpu::{load_channels, ChannelTexture, ShadertoyUniforms};
use crate::types::{PassKind, ShaderCompiler};

const MAX_CONSECUTIVE_FAILURES: u32 = 3;

struct PingPong {
    textures: [wgpu::Texture; 2],
    views: [wgpu::TextureView; 2],
    current: usize,
}

impl PingPong {
    fn new(device: &wgpu::Device, width: u32, height: u32, label: &str) -> Self {
        let make = |i: usize| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("{label}-{i}")),
                size: wgpu::Extent3d {
                    width: width.max(1),
                    height: height.max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba16Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        };
        let (t0, v0) = make(0);
        let (t1, v1) = make(1);
        Self {
            textures: [t0, t1],
            views: [v0, v1],
            current: 0,
        }
    }

    fn read_view(&self) -> &wgpu::TextureView {
        &self.views[self.current]
    }

    fn write_view(&self) -> &wgpu::TextureView {
        &self.views[1 - self.current]
    }

    fn swap(&mut self) {
        self.current = 1 - self.current;
    }
}

struct PassRuntime {
    kind: PassKind,
    pipeline: wgpu::RenderPipeline,
    channel_bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniforms: ShadertoyUniforms,
    last_frame: Instant,
    frame_count: u32,
    width: u32,
    height: u32,
}

/// A compiled, ready-to-render Shadertoy program: one or more passes,
/// rendered in `PassKind::render_order()`.
pub struct Program {
    shader_path: PathBuf,
    channel_layout: wgpu::BindGroupLayout,
    passes: Vec<PassRuntime>,
    buffer_targets: Vec<(PassKind, PingPong)>,
    external_channels: Vec<ChannelTexture>,
    shader_start: Instant,
}

impl Program {
    /// Compiles `path` against `channel_paths` at `(width, height)`. On
    /// compile/link failure, returns `ShaderError` and bumps the caller's
    /// failure counter via [`Program::note_load_failure`] semantics; the
    /// caller is expected to keep the previously active `Program`.
    pub fn load(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        path: &Path,
        channel_paths: &[PathBuf],
        width: u32,
        height: u32,
        compiler: ShaderCompiler,
    ) -> Result<Self, ShaderError> {
        let source = std::fs::read_to_string(path).map_err(|err| ShaderError {
            stage: "read",
            info_log: err.to_string(),
            line_hint: None,
        })?;

        let vertex_module = compile_vertex_shader(device, compiler).map_err(|err| ShaderError {
            stage: "vertex",
            info_log: err.to_string(),
            line_hint: None,
        })?;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("driftwall uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let channel_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("driftwall channel layout"),
            entries: &channel_layout_entries(),
        });

        let external_channels = load_channels(device, queue, channel_paths);

        let parsed = split_passes(&source);
        let mut buffer_targets = Vec::new();
        for (kind, _) in &parsed {
            if kind.is_buffer() {
                buffer_targets.push((
                    *kind,
                    PingPong::new(device, width, height, &format!("{:?}", kind)),
                ));
            }
        }

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("driftwall pass layout"),
            bind_group_layouts: &[&uniform_layout, &channel_layout],
            push_constant_ranges: &[],
        });

        let mut passes = Vec::with_capacity(parsed.len());
        for (kind, body) in &parsed {
            let scale = if kind.is_buffer() {
                recommended_buffer_scale(body)
            } else {
                1.0
            };
            let pass_w = ((width.max(1) as f32) * scale).round().max(1.0) as u32;
            let pass_h = ((height.max(1) as f32) * scale).round().max(1.0) as u32;

            let fragment_module =
                compile_fragment_shader(device, body, compiler).map_err(|err| ShaderError {
                    stage: "fragment",
                    info_log: format!("{kind:?}: {err}"),
                    line_hint: None,
                })?;

            let target_format = if *kind == PassKind::Image {
                surface_format
            } else {
                wgpu::TextureFormat::Rgba16Float
            };

            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("driftwall shader pass"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some("main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            });

            let uniforms = ShadertoyUniforms::new(pass_w, pass_h);
            let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("driftwall pass uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("driftwall uniform bind group"),
                layout: &uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });

            let channel_bind_group = build_channel_bind_group(
                device,
                &channel_layout,
                *kind,
                &external_channels,
                &buffer_targets,
            );

            passes.push(PassRuntime {
                kind: *kind,
                pipeline,
                channel_bind_group,
                uniform_buffer,
                uniform_bind_group,
                uniforms,
                last_frame: Instant::now(),
                frame_count: 0,
                width: pass_w,
                height: pass_h,
            });
        }

        // Render in canonical order regardless of source order.
        passes.sort_by_key(|p| PassKind::render_order().iter().position(|k| *k == p.kind));

        Ok(Self {
            shader_path: path.to_path_buf(),
            channel_layout,
            passes,
            buffer_targets,
            external_channels,
            shader_start: Instant::now(),
        })
    }

    pub fn shader_path(&self) -> &Path {
        &self.shader_path
    }

    /// Replaces channel 0's external texture, used by the hybrid
    /// shader-plus-image-cycle case (§4.E): when a shader output's cycle
    /// list is made of image paths, cycling swaps iChannel0 instead of
    /// recompiling the program.
    pub fn reload_channel0(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, path: &Path) {
        let mut replacement = load_channels(device, queue, std::slice::from_ref(&path));
        self.external_channels[0] = replacement.swap_remove(0);
        for pass in &mut self.passes {
            pass.channel_bind_group = build_channel_bind_group(
                device,
                &self.channel_layout,
                pass.kind,
                &self.external_channels,
                &self.buffer_targets,
            );
        }
    }

    /// Records a failed `load` attempt against the three-strikes latch
    /// (§4.C). Call this whenever `Program::load` returns `Err` for the
    /// same configured path.
    pub fn note_load_failure(consecutive_failures: &mut u32) -> bool {
        *consecutive_failures += 1;
        *consecutive_failures >= MAX_CONSECUTIVE_FAILURES
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        for (kind, target) in &mut self.buffer_targets {
            *target = PingPong::new(device, width, height, &format!("{kind:?}"));
        }
        for pass in &mut self.passes {
            pass.width = width.max(1);
            pass.height = height.max(1);
            pass.uniforms.set_resolution(pass.width, pass.height);
            pass.channel_bind_group = build_channel_bind_group(
                device,
                &self.channel_layout,
                pass.kind,
                &self.external_channels,
                &self.buffer_targets,
            );
        }
    }

    /// Renders every pass in order, writing the final `Image` pass to
    /// `target_view`. `speed` is the shader config's animation-speed
    /// multiplier.
    pub fn render_frame(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target_view: &wgpu::TextureView,
        now: Instant,
        mouse: [f32; 4],
        speed: f32,
    ) {
        let shader_start = self.shader_start;
        for pass in &mut self.passes {
            pass.uniforms
                .update_time(shader_start, &mut pass.last_frame, &mut pass.frame_count, now, speed);
            pass.uniforms.set_mouse(mouse);
            queue.write_buffer(&pass.uniform_buffer, 0, bytemuck::bytes_of(&pass.uniforms));
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("driftwall shader frame"),
        });

        for pass in &self.passes {
            let write_target = if pass.kind.is_buffer() {
                self.buffer_targets
                    .iter()
                    .find(|(k, _)| *k == pass.kind)
                    .map(|(_, t)| t.write_view())
            } else {
                None
            };
            let view = write_target.unwrap_or(target_view);

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("driftwall pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
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
            render_pass.set_pipeline(&pass.pipeline);
            render_pass.set_bind_group(0, &pass.uniform_bind_group, &[]);
            render_pass.set_bind_group(1, &pass.channel_bind_group, &[]);
            render_pass.draw(0..3, 0..1);
            drop(render_pass);
        }

        queue.submit(Some(encoder.finish()));

        for (_, target) in &mut self.buffer_targets {
            target.swap();
        }
    }

    pub fn destroy(self) {
        drop(self);
    }
}

fn channel_layout_entries() -> [wgpu::BindGroupLayoutEntry; 8] {
    let mut entries = [wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }; 8];
    for index in 0..4u32 {
        entries[(index * 2) as usize].binding = index * 2;
        entries[(index * 2 + 1) as usize] = wgpu::BindGroupLayoutEntry {
            binding: index * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };
    }
    entries
}

/// Wires channel 0 of a buffer pass to its own previous frame (self
/// feedback, matching the `feedback`-keyword heuristic in
/// `recommended_buffer_scale`); every other slot, and all channels of the
/// `Image` pass, use the configured external channel textures. The
/// specification's declarative config only names a flat list of channel
/// paths, so this is the interpretation recorded as an open-question
/// resolution.
fn build_channel_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    kind: PassKind,
    external: &[ChannelTexture],
    buffer_targets: &[(PassKind, PingPong)],
) -> wgpu::BindGroup {
    let self_feedback = if kind.is_buffer() {
        buffer_targets.iter().find(|(k, _)| *k == kind)
    } else {
        None
    };

    let mut entries = Vec::with_capacity(8);
    // A single shared placeholder sampler (linear/repeat) for every slot;
    // channel textures were already created with their own sampler but we
    // reuse the external one uniformly for simplicity.
    let default_sampler = &external[0].sampler;

    for index in 0..4u32 {
        let view = if index == 0 {
            self_feedback
                .map(|(_, t)| t.read_view())
                .unwrap_or(&external[index as usize].view)
        } else {
            &external[index as usize].view
        };
        entries.push(wgpu::BindGroupEntry {
            binding: index * 2,
            resource: wgpu::BindingResource::TextureView(view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: index * 2 + 1,
            resource: wgpu::BindingResource::Sampler(default_sampler),
        });
    }

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("driftwall channel bind group"),
        layout,
        entries: &entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_consecutive_failures_trips_the_latch() {
        let mut failures = 0u32;
        assert!(!Program::note_load_failure(&mut failures));
        assert!(!Program::note_load_failure(&mut failures));
        assert!(Program::note_load_failure(&mut failures));
    }
}
