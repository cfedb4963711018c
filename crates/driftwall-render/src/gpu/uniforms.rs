//! Shadertoy-compatible uniform block (§4.C's uniform list) and per-frame
//! update logic. Layout and `update_time` bookkeeping are adapted from the
//! teacher's `renderer/src/gpu/uniforms.rs`, trimmed to the uniform set
//! SPEC_FULL actually names (no `iSampleRate`/`iChannelTime`/`iFade`,
//! since audio channels and shader crossfade are out of scope here).

use bytemuck::{Pod, Zeroable};
use chrono::{Datelike, Local, Timelike};
use std::time::Instant;

pub const CHANNEL_COUNT: usize = 4;

#[repr(C, align(16))]
#[derive(Clone, Copy)]
pub struct ShadertoyUniforms {
    pub i_resolution: [f32; 4],
    pub i_time: f32,
    pub i_time_delta: f32,
    pub i_frame_rate: f32,
    pub i_frame: i32,
    pub i_mouse: [f32; 4],
    pub i_date: [f32; 4],
    pub i_channel_resolution: [[f32; 4]; CHANNEL_COUNT],
}

unsafe impl Zeroable for ShadertoyUniforms {}
unsafe impl Pod for ShadertoyUniforms {}

impl ShadertoyUniforms {
    pub fn new(width: u32, height: u32) -> Self {
        let mut uniforms = Self {
            i_resolution: [width as f32, height as f32, 1.0, 0.0],
            i_time: 0.0,
            i_time_delta: 0.0,
            i_frame_rate: 0.0,
            i_frame: 0,
            i_mouse: [0.0; 4],
            i_date: [0.0; 4],
            i_channel_resolution: [[0.0; 4]; CHANNEL_COUNT],
        };
        uniforms.refresh_date();
        uniforms
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.i_resolution[0] = width as f32;
        self.i_resolution[1] = height as f32;
        self.i_resolution[2] = 1.0;
    }

    pub fn set_channel_resolution(&mut self, index: usize, width: u32, height: u32) {
        if let Some(slot) = self.i_channel_resolution.get_mut(index) {
            *slot = [width as f32, height as f32, 1.0, 0.0];
        }
    }

    pub fn set_mouse(&mut self, mouse: [f32; 4]) {
        self.i_mouse = mouse;
    }

    /// Advances `iTime`/`iTimeDelta`/`iFrame`/`iFrameRate` for one rendered
    /// frame. `shader_start` is the instant the active shader began
    /// running (reset to `now` whenever a shader is swapped, per §4.C's
    /// "new shader's iTime begins at 0 on switch"); `speed` is the
    /// animation-speed multiplier from the shader config.
    pub fn update_time(
        &mut self,
        shader_start: Instant,
        last_frame: &mut Instant,
        frame_count: &mut u32,
        now: Instant,
        speed: f32,
    ) {
        let elapsed = now.saturating_duration_since(shader_start).as_secs_f32() * speed;
        let delta = now.saturating_duration_since(*last_frame).as_secs_f32() * speed;
        *last_frame = now;

        self.i_time = elapsed;
        self.i_time_delta = delta;
        self.i_frame = (*frame_count).min(i32::MAX as u32) as i32;
        self.i_frame_rate = if delta > 0.0 { 1.0 / delta } else { 0.0 };
        *frame_count = frame_count.saturating_add(1);
        self.refresh_date();
    }

    fn refresh_date(&mut self) {
        let local_now = Local::now();
        let seconds_since_midnight = local_now.num_seconds_from_midnight() as f32
            + local_now.nanosecond() as f32 / 1_000_000_000.0;
        self.i_date = [
            local_now.year() as f32,
            local_now.month() as f32,
            local_now.day() as f32,
            seconds_since_midnight,
        ];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_time_resets_on_fresh_shader_start() {
        let mut uniforms = ShadertoyUniforms::new(800, 600);
        let start = Instant::now();
        let mut last_frame = start;
        let mut frame_count = 0;
        uniforms.update_time(start, &mut last_frame, &mut frame_count, start, 1.0);
        assert_eq!(uniforms.i_time, 0.0);
        assert_eq!(uniforms.i_frame, 0);
        assert_eq!(frame_count, 1);
    }

    #[test]
    fn speed_multiplier_scales_elapsed_time() {
        let mut uniforms = ShadertoyUniforms::new(800, 600);
        let start = Instant::now();
        let mut last_frame = start;
        let mut frame_count = 0;
        let later = start + std::time::Duration::from_secs(2);
        uniforms.update_time(start, &mut last_frame, &mut frame_count, later, 2.0);
        assert!((uniforms.i_time - 4.0).abs() < 1e-4);
    }

    #[test]
    fn resolution_z_is_pixel_aspect_one() {
        let mut uniforms = ShadertoyUniforms::new(800, 600);
        assert_eq!(uniforms.i_resolution, [800.0, 600.0, 1.0, 0.0]);
        uniforms.set_resolution(1024, 768);
        assert_eq!(uniforms.i_resolution, [1024.0, 768.0, 1.0, 0.0]);
    }

    #[test]
    fn channel_resolution_is_stored_per_slot() {
        let mut uniforms = ShadertoyUniforms::new(800, 600);
        uniforms.set_channel_resolution(1, 256, 256);
        assert_eq!(uniforms.i_channel_resolution[1], [256.0, 256.0, 1.0, 0.0]);
        assert_eq!(uniforms.i_channel_resolution[0], [0.0; 4]);
    }
}
