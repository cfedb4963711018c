//! iChannel texture loading for the shader host (§4.C). Each channel slot
//! is a plain 2D texture sourced from a configured path, or a 1x1 white
//! placeholder when unset or unreadable — mirrors the teacher's
//! `renderer/src/gpu/channels.rs` placeholder-on-failure behavior, trimmed
//! of the cubemap and keyboard-input channel kinds the specification
//! doesn't call for.

use std::path::Path;

use anyhow::{Context, Result};
use image::GenericImageView;
use wgpu::util::{DeviceExt, TextureDataOrder};

use super::uniforms::CHANNEL_COUNT;

pub struct ChannelTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub width: u32,
    pub height: u32,
}

/// Loads the configured channel textures in order, substituting a
/// placeholder for empty slots or load failures so a bad channel path
/// never prevents the shader from rendering.
pub fn load_channels(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    paths: &[impl AsRef<Path>],
) -> Vec<ChannelTexture> {
    let mut channels = Vec::with_capacity(CHANNEL_COUNT);
    for index in 0..CHANNEL_COUNT {
        let resource = match paths.get(index) {
            Some(path) => match load_texture_channel(device, queue, path.as_ref()) {
                Ok(texture) => texture,
                Err(error) => {
                    tracing::warn!(
                        channel = index,
                        path = %path.as_ref().display(),
                        error = %error,
                        "failed to load channel texture; using placeholder"
                    );
                    placeholder_channel(device, queue)
                }
            },
            None => placeholder_channel(device, queue),
        };
        channels.push(resource);
    }
    channels
}

fn load_texture_channel(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    path: &Path,
) -> Result<ChannelTexture> {
    let image = image::open(path).with_context(|| format!("loading channel {}", path.display()))?;
    let (width, height) = image.dimensions();
    let rgba = image.to_rgba8();

    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(&format!("channel:{}", path.display())),
            size: wgpu::Extent3d {
                width,
                height,
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
        &rgba,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("channel sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });

    Ok(ChannelTexture {
        texture,
        view,
        sampler,
        width,
        height,
    })
}

fn placeholder_channel(device: &wgpu::Device, queue: &wgpu::Queue) -> ChannelTexture {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("channel placeholder"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
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
        &[255u8, 255, 255, 255],
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("channel placeholder sampler"),
        ..Default::default()
    });
    ChannelTexture {
        texture,
        view,
        sampler,
        width: 1,
        height: 1,
    }
}
