//! Per-output FPS counter (§4.E: "frames are counted per second window").

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct FpsCounter {
    window_start: Instant,
    frames_this_window: u32,
    current_fps: u32,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames_this_window: 0,
            current_fps: 0,
        }
    }

    /// Records one rendered frame at `now`, rolling the 1-second window
    /// and updating `current_fps` when it elapses.
    pub fn record_frame(&mut self, now: Instant) {
        self.frames_this_window += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= Duration::from_secs(1) {
            self.current_fps = self.frames_this_window;
            self.frames_this_window = 0;
            self.window_start = now;
        }
    }

    pub fn current_fps(&self) -> u32 {
        self.current_fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_frame_count_after_one_second_window() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(start);
        for i in 0..60 {
            counter.record_frame(start + Duration::from_millis(i * 16));
        }
        assert_eq!(counter.current_fps(), 0);
        counter.record_frame(start + Duration::from_millis(1001));
        assert!(counter.current_fps() >= 60);
    }
}
