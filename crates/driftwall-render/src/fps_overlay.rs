//! FPS watermark (§4.E `show_fps`): a small translucent digit readout drawn
//! in the corner of the output after the ordinary frame. No pack example
//! draws text to a `wgpu` surface, so this borrows
//! [`crate::image_pipeline::ImagePipeline`]'s shape (fullscreen-triangle
//! WGSL blit, uploaded RGBA texture) and adds alpha blending plus a
//! restricted `set_viewport` so the same trick that fills an entire surface
//! in `ImagePipeline` instead fills only a corner of it.

use std::borrow::Cow;

use wgpu::util::{DeviceExt, TextureDataOrder};

/// 3x5 pixel glyphs for the digits, MSB-first per row, lowest 3 bits used.
const DIGIT_GLYPHS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111], // 0
    [0b010, 0b110, 0b010, 0b010, 0b111], // 1
    [0b111, 0b001, 0b111, 0b100, 0b111], // 2
    [0b111, 0b001, 0b111, 0b001, 0b111], // 3
    [0b101, 0b101, 0b111, 0b001, 0b001], // 4
    [0b111, 0b100, 0b111, 0b001, 0b111], // 5
    [0b111, 0b100, 0b111, 0b101, 0b111], // 6
    [0b111, 0b001, 0b001, 0b001, 0b001], // 7
    [0b111, 0b101, 0b111, 0b101, 0b111], // 8
    [0b111, 0b101, 0b111, 0b001, 0b111], // 9
];

const GLYPH_W: u32 = 3;
const GLYPH_H: u32 = 5;
const GLYPH_SCALE: u32 = 4;
const GLYPH_GAP: u32 = 1 * GLYPH_SCALE;
const MARGIN_PX: u32 = 12;

/// Rasterizes `fps` (clamped to 3 digits) as an RGBA8 buffer, opaque white
/// strokes on a transparent field, scaled up so single-pixel glyphs remain
/// legible on a hi-dpi output.
fn rasterize(fps: u32) -> (u32, u32, Vec<u8>) {
    let digits: Vec<u8> = {
        let clamped = fps.min(999);
        let s = clamped.to_string();
        s.bytes().map(|b| b - b'0').collect()
    };

    let glyph_px_w = GLYPH_W * GLYPH_SCALE;
    let glyph_px_h = GLYPH_H * GLYPH_SCALE;
    let width = digits.len() as u32 * glyph_px_w + digits.len().saturating_sub(1) as u32 * GLYPH_GAP;
    let height = glyph_px_h;
    let mut buf = vec![0u8; (width * height * 4) as usize];

    for (i, &digit) in digits.iter().enumerate() {
        let glyph = &DIGIT_GLYPHS[digit as usize];
        let x0 = i as u32 * (glyph_px_w + GLYPH_GAP);
        for row in 0..GLYPH_H {
            let bits = glyph[row as usize];
            for col in 0..GLYPH_W {
                let on = (bits >> (GLYPH_W - 1 - col)) & 1 == 1;
                if !on {
                    continue;
                }
                for dy in 0..GLYPH_SCALE {
                    for dx in 0..GLYPH_SCALE {
                        let px = x0 + col * GLYPH_SCALE + dx;
                        let py = row * GLYPH_SCALE + dy;
                        let idx = ((py * width + px) * 4) as usize;
                        buf[idx] = 255;
                        buf[idx + 1] = 255;
                        buf[idx + 2] = 255;
                        buf[idx + 3] = 230;
                    }
                }
            }
        }
    }

    (width.max(1), height.max(1), buf)
}

/// Compiled once per output and reused across frames; the uploaded texture
/// is rebuilt only when the displayed value changes.
pub struct FpsOverlay {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    cached: Option<(u32, wgpu::TextureView, u32, u32)>,
}

impl FpsOverlay {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("driftwall fps overlay shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(OVERLAY_WGSL)),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("driftwall fps overlay bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("driftwall fps overlay pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("driftwall fps overlay pipeline"),
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
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("driftwall fps overlay sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            pipeline,
            bind_group_layout,
            sampler,
            cached: None,
        }
    }

    /// Draws the watermark over whatever is already in `target_view`. Must
    /// run after the frame's own render pass so its `LoadOp::Load` has
    /// something to blend onto.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target_view: &wgpu::TextureView,
        surface_width: u32,
        surface_height: u32,
        fps: u32,
    ) {
        let needs_rebuild = match &self.cached {
            Some((cached_fps, _, _, _)) => *cached_fps != fps,
            None => true,
        };
        if needs_rebuild {
            let (w, h, pixels) = rasterize(fps);
            let texture = device.create_texture_with_data(
                queue,
                &wgpu::TextureDescriptor {
                    label: Some("driftwall fps overlay glyphs"),
                    size: wgpu::Extent3d {
                        width: w,
                        height: h,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                },
                TextureDataOrder::LayerMajor,
                &pixels,
            );
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            self.cached = Some((fps, view, w, h));
        }

        let Some((_, view, glyph_w, glyph_h)) = &self.cached else {
            return;
        };

        if surface_width == 0 || surface_height == 0 {
            return;
        }

        let viewport_w = (*glyph_w).min(surface_width) as f32;
        let viewport_h = (*glyph_h).min(surface_height) as f32;
        let viewport_x = surface_width.saturating_sub(*glyph_w + MARGIN_PX) as f32;
        let viewport_y = MARGIN_PX as f32;

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("driftwall fps overlay bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("driftwall fps overlay frame"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("driftwall fps overlay pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_viewport(viewport_x, viewport_y, viewport_w, viewport_h, 0.0, 1.0);
            pass.draw(0..3, 0..1);
        }
        queue.submit(Some(encoder.finish()));
    }
}

const OVERLAY_WGSL: &str = r#"
@group(0) @binding(0) var tex: texture_2d<f32>;
@group(0) @binding(1) var tex_sampler: sampler;

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
    var uv = in.uv;
    uv.y = 1.0 - uv.y;
    return textureSample(tex, tex_sampler, uv);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rasterizes_single_digit_at_base_glyph_size() {
        let (w, h, pixels) = rasterize(7);
        assert_eq!(w, GLYPH_W * GLYPH_SCALE);
        assert_eq!(h, GLYPH_H * GLYPH_SCALE);
        assert_eq!(pixels.len(), (w * h * 4) as usize);
        assert!(pixels.iter().any(|&b| b != 0));
    }

    #[test]
    fn rasterizes_three_digits_wider_than_one() {
        let (single_w, _, _) = rasterize(9);
        let (triple_w, _, _) = rasterize(144);
        assert!(triple_w > single_w);
    }

    #[test]
    fn clamps_to_three_digits() {
        let (clamped_w, _, _) = rasterize(999);
        let (over_w, _, _) = rasterize(100_000);
        assert_eq!(clamped_w, over_w);
    }
}
