//! Async preloader (§4.F): decodes the next-in-cycle image on a worker
//! thread so the main thread's GPU upload and transition start are free of
//! decode jitter. One worker per output at a time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use driftwall_config::DisplayMode;

use crate::decode::{decode, DecodedImage};

struct Slot {
    decoded: Mutex<Option<DecodedImage>>,
    ready: AtomicBool,
    upload_pending: AtomicBool,
    worker_active: AtomicBool,
    requested_path: Mutex<Option<PathBuf>>,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            decoded: Mutex::new(None),
            ready: AtomicBool::new(false),
            upload_pending: AtomicBool::new(false),
            worker_active: AtomicBool::new(false),
            requested_path: Mutex::new(None),
        }
    }
}

/// Per-output preload state machine: `Idle -> Decoding -> UploadPending ->
/// Idle`. The worker thread is detached; cancellation on output
/// destruction is done by dropping the `Preloader` and ignoring any
/// in-flight result the detached thread later produces (the slot is
/// behind an `Arc`, so the thread's write is harmless once nobody reads
/// it back).
pub struct Preloader {
    slot: Arc<Slot>,
    handle: Option<JoinHandle<()>>,
}

impl Default for Preloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Preloader {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Slot::default()),
            handle: None,
        }
    }

    /// Spawns a worker for `path` if one isn't already active (idempotent
    /// per §4.F). Any previous ready-but-unconsumed image is discarded.
    pub fn preload(&mut self, path: PathBuf, target_w: u32, target_h: u32, mode: DisplayMode) {
        if self.slot.worker_active.load(Ordering::Acquire) {
            return;
        }
        self.slot.ready.store(false, Ordering::Release);
        self.slot.upload_pending.store(false, Ordering::Release);
        *self.slot.requested_path.lock().unwrap() = Some(path.clone());
        self.slot.worker_active.store(true, Ordering::Release);

        let slot = Arc::clone(&self.slot);
        self.handle = Some(std::thread::spawn(move || {
            let result = decode(&path, target_w, target_h, mode);
            match result {
                Ok(image) => {
                    *slot.decoded.lock().unwrap() = Some(image);
                    slot.upload_pending.store(true, Ordering::Release);
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), error = %error, "preload decode failed");
                }
            }
            slot.worker_active.store(false, Ordering::Release);
        }));
    }

    /// Main-thread tick: if an upload is pending, takes the decoded image
    /// out of the slot and marks the slot `ready`. Returns the image to
    /// upload, if any.
    pub fn take_upload_pending(&self) -> Option<(PathBuf, DecodedImage)> {
        if !self.slot.upload_pending.swap(false, Ordering::AcqRel) {
            return None;
        }
        let image = self.slot.decoded.lock().unwrap().take()?;
        let path = self.slot.requested_path.lock().unwrap().clone()?;
        self.slot.ready.store(true, Ordering::Release);
        Some((path, image))
    }

    /// True once the preloaded texture for `path` is ready to use
    /// directly, matching §4.F's `ready && preload_path == requested_path`
    /// check at transition time.
    pub fn is_ready_for(&self, path: &std::path::Path) -> bool {
        self.slot.ready.load(Ordering::Acquire)
            && self
                .slot
                .requested_path
                .lock()
                .unwrap()
                .as_deref()
                .map(|p| p == path)
                .unwrap_or(false)
    }

    pub fn clear_ready(&self) {
        self.slot.ready.store(false, Ordering::Release);
        *self.slot.requested_path.lock().unwrap() = None;
    }

    pub fn is_worker_active(&self) -> bool {
        self.slot.worker_active.load(Ordering::Acquire)
    }
}

impl Drop for Preloader {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use std::time::{Duration, Instant};

    fn write_png(dir: &std::path::Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(8, 8, Rgba([1, 2, 3, 255]));
        buffer.save(&path).unwrap();
        path
    }

    fn wait_for<F: Fn() -> bool>(f: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !f() {
            assert!(Instant::now() < deadline, "timed out waiting for condition");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn preload_then_take_upload_pending_yields_the_decoded_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "a.png");
        let mut preloader = Preloader::new();
        preloader.preload(path.clone(), 8, 8, DisplayMode::Stretch);
        wait_for(|| !preloader.is_worker_active());

        let (taken_path, image) = preloader.take_upload_pending().expect("pending upload");
        assert_eq!(taken_path, path);
        assert_eq!(image.width, 8);
        assert!(preloader.is_ready_for(&path));
    }

    #[test]
    fn second_preload_is_ignored_while_worker_active() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = write_png(dir.path(), "a.png");
        let path_b = write_png(dir.path(), "b.png");
        let mut preloader = Preloader::new();
        preloader.preload(path_a.clone(), 8, 8, DisplayMode::Stretch);
        preloader.preload(path_b, 8, 8, DisplayMode::Stretch);
        wait_for(|| !preloader.is_worker_active());
        let (taken_path, _) = preloader.take_upload_pending().expect("pending upload");
        assert_eq!(taken_path, path_a);
    }

    #[test]
    fn clear_ready_resets_is_ready_for() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "a.png");
        let mut preloader = Preloader::new();
        preloader.preload(path.clone(), 8, 8, DisplayMode::Stretch);
        wait_for(|| !preloader.is_worker_active());
        preloader.take_upload_pending();
        assert!(preloader.is_ready_for(&path));
        preloader.clear_ready();
        assert!(!preloader.is_ready_for(&path));
    }
}
