//! Per-output frame pacer for `vsync=false` shader outputs (§4.E/§4.I): a
//! real `timerfd_create`/`timerfd_settime` armed at `1s / shader_fps`, per
//! §10's "deliberate point of fidelity beyond the teacher's own software-
//! accumulator pacer".

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use anyhow::{Context, Result};

pub struct TimerFd {
    fd: RawFd,
}

impl TimerFd {
    pub fn new() -> Result<Self> {
        let fd = unsafe {
            libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_NONBLOCK | libc::TFD_CLOEXEC)
        };
        if fd < 0 {
            return Err(io::Error::last_os_error()).context("creating timerfd");
        }
        Ok(Self { fd })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Arms a recurring timer firing every `interval`, matching `1s /
    /// shader_fps` as computed by the caller.
    pub fn arm_periodic(&self, interval: Duration) -> Result<()> {
        let spec = duration_to_timespec(interval);
        let itimerspec = libc::itimerspec {
            it_interval: spec,
            it_value: spec,
        };
        let result = unsafe { libc::timerfd_settime(self.fd, 0, &itimerspec, std::ptr::null_mut()) };
        if result != 0 {
            return Err(io::Error::last_os_error()).context("arming timerfd");
        }
        Ok(())
    }

    pub fn disarm(&self) -> Result<()> {
        let zero = libc::itimerspec {
            it_interval: libc::timespec { tv_sec: 0, tv_nsec: 0 },
            it_value: libc::timespec { tv_sec: 0, tv_nsec: 0 },
        };
        let result = unsafe { libc::timerfd_settime(self.fd, 0, &zero, std::ptr::null_mut()) };
        if result != 0 {
            return Err(io::Error::last_os_error()).context("disarming timerfd");
        }
        Ok(())
    }

    /// Reads and discards the expiration counter, returning how many
    /// periods elapsed since the last read (0 if the timer hasn't fired).
    pub fn drain_expirations(&self) -> u64 {
        let mut buf = [0u8; 8];
        let read = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, 8) };
        if read == 8 {
            u64::from_ne_bytes(buf)
        } else {
            0
        }
    }
}

fn duration_to_timespec(duration: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as i64,
    }
}

impl Drop for TimerFd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
