//! Static image blit pipeline (part of §4.B/§4.E): uploads a decoded image
//! to a GPU texture and draws it to the output surface honoring
//! `DisplayMode` (center/stretch/fit/fill/tile). No pack example renders a
//! plain image to a `wgpu` surface (the teacher only ever draws Shadertoy
//! passes), so this follows the same self-contained WGSL-pipeline shape as
//! `transition.rs`'s pipeline, with `recommended_buffer_scale`-style GLSL
//! dropped in favor of a small WGSL fragment shader doing the UV mapping.

use std::borrow::Cow;

use driftwall_config::DisplayMode;
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::decode::DecodedImage;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ImageUniforms {
    /// (scale_x, scale_y, offset_x, offset_y) applied to the sampled UV,
    /// computed per display mode so the texture maps onto the surface the
    /// way its mode names: `fit` letterboxes, `fill` crops, `stretch` maps
    /// 1:1 to the full surface, `center`/`tile` keep native texel scale.
    uv_transform: [f32; 4],
    tile: u32,
    _padding: [u32; 3],
}

fn uv_transform(
    mode: DisplayMode,
    image_w: u32,
    image_h: u32,
    surface_w: u32,
    surface_h: u32,
) -> ([f32; 4], bool) {
    let (iw, ih) = (image_w.max(1) as f32, image_h.max(1) as f32);
    let (sw, sh) = (surface_w.max(1) as f32, surface_h.max(1) as f32);
    let image_aspect = iw / ih;
    let surface_aspect = sw / sh;

    match mode {
        DisplayMode::Stretch => ([1.0, 1.0, 0.0, 0.0], false),
        DisplayMode::Fit => {
            let (scale_x, scale_y) = if surface_aspect > image_aspect {
                (image_aspect / surface_aspect, 1.0)
            } else {
                (1.0, surface_aspect / image_aspect)
            };
            (
                [scale_x, scale_y, (1.0 - scale_x) / 2.0, (1.0 - scale_y) / 2.0],
                false,
            )
        }
        DisplayMode::Fill => {
            let (scale_x, scale_y) = if surface_aspect > image_aspect {
                (1.0, image_aspect / surface_aspect)
            } else {
                (surface_aspect / image_aspect, 1.0)
            };
            (
                [scale_x, scale_y, (1.0 - scale_x) / 2.0, (1.0 - scale_y) / 2.0],
                false,
            )
        }
        DisplayMode::Center => {
            let scale_x = iw / sw;
            let scale_y = ih / sh;
            (
                [scale_x, scale_y, (1.0 - scale_x) / 2.0, (1.0 - scale_y) / 2.0],
                false,
            )
        }
        DisplayMode::Tile => {
            let scale_x = sw / iw;
            let scale_y = sh / ih;
            ([scale_x, scale_y, 0.0, 0.0], true)
        }
    }
}

/// One compiled pipeline shared across every image shown on an output, per
/// the same "compile once" rationale as [`crate::transition::TransitionPipeline`].
pub struct ImagePipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
}

/// An uploaded image ready to draw, reused across frames until the
/// wallpaper changes.
pub struct ImageTexture {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl ImageTexture {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl ImagePipeline {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("driftwall image shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(IMAGE_WGSL)),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("driftwall image bind group layout"),
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
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("driftwall image pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("driftwall image pipeline"),
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
            label: Some("driftwall image uniforms"),
            contents: bytemuck::bytes_of(&ImageUniforms {
                uv_transform: [1.0, 1.0, 0.0, 0.0],
                tile: 0,
                _padding: [0; 3],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("driftwall image sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            pipeline,
            bind_group_layout,
            uniform_buffer,
            sampler,
        }
    }

    pub fn upload(&self, device: &wgpu::Device, queue: &wgpu::Queue, image: &DecodedImage) -> ImageTexture {
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("driftwall wallpaper image"),
                size: wgpu::Extent3d {
                    width: image.width.max(1),
                    height: image.height.max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            &image.pixels,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        ImageTexture {
            view,
            width: image.width,
            height: image.height,
        }
    }

    pub fn render_frame(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target_view: &wgpu::TextureView,
        texture: &ImageTexture,
        mode: DisplayMode,
        surface_width: u32,
        surface_height: u32,
    ) {
        let (transform, tile) =
            uv_transform(mode, texture.width, texture.height, surface_width, surface_height);
        queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&ImageUniforms {
                uv_transform: transform,
                tile: tile as u32,
                _padding: [0; 3],
            }),
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("driftwall image bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("driftwall image frame"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("driftwall image pass"),
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

const IMAGE_WGSL: &str = r#"
struct Uniforms {
    uv_transform: vec4<f32>,
    tile: u32,
};

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var tex: texture_2d<f32>;
@group(0) @binding(2) var tex_sampler: sampler;

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

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let scale = u.uv_transform.xy;
    let offset = u.uv_transform.zw;
    var uv = (in.uv - offset) / scale;
    if (u.tile == 0u && (uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0)) {
        return vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }
    uv = fract(uv);
    return textureSample(tex, tex_sampler, uv);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stretch_maps_uv_one_to_one() {
        let (transform, tile) = uv_transform(DisplayMode::Stretch, 800, 600, 1920, 1080);
        assert_eq!(transform, [1.0, 1.0, 0.0, 0.0]);
        assert!(!tile);
    }

    #[test]
    fn fit_letterboxes_a_narrower_image() {
        let (transform, _) = uv_transform(DisplayMode::Fit, 1000, 1000, 1920, 1080);
        assert!(transform[1] < 1.0);
        assert!((transform[0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn fill_crops_a_narrower_image() {
        let (transform, _) = uv_transform(DisplayMode::Fill, 1000, 1000, 1920, 1080);
        assert!(transform[0] < 1.0);
        assert!((transform[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn tile_requests_wraparound_sampling() {
        let (_, tile) = uv_transform(DisplayMode::Tile, 64, 64, 1920, 1080);
        assert!(tile);
    }
}
