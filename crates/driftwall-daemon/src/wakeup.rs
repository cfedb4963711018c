//! `eventfd`-backed wakeup used to break the event loop's `poll()` from a
//! config-reload or control thread without any dedicated protocol of its
//! own (§4.I: "`wakeup_fd` (eventfd) used by config and control threads to
//! break poll").

use std::io;
use std::os::fd::RawFd;

use anyhow::{Context, Result};

pub struct WakeupFd {
    fd: RawFd,
}

impl WakeupFd {
    pub fn new() -> Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if fd < 0 {
            return Err(io::Error::last_os_error()).context("creating eventfd");
        }
        Ok(Self { fd })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Wakes a thread blocked in `poll()` on this fd.
    pub fn notify(&self) {
        let value: u64 = 1;
        unsafe {
            libc::write(self.fd, &value as *const _ as *const libc::c_void, 8);
        }
    }

    /// Clears the counter so the fd stops reporting readable until the
    /// next `notify`.
    pub fn drain(&self) {
        let mut value: u64 = 0;
        unsafe {
            libc::read(self.fd, &mut value as *mut _ as *mut libc::c_void, 8);
        }
    }
}

impl Drop for WakeupFd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
