//! signalfd-based control-plane signal delivery (§4.I, §10 "Low-level Unix
//! primitives"). All of SIGTERM/SIGINT/SIGUSR1/SIGUSR2/SIGCONT/SIGRTMIN are
//! blocked process-wide at startup and read back through one pollable fd,
//! never through an installed handler — matching §5's "all signals are
//! blocked process-wide and delivered through signal_fd".

use std::io;
use std::mem;
use std::os::fd::RawFd;

use anyhow::{Context, Result};

/// What a drained signal means to the event loop, already mapped from the
/// raw signal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Shutdown,
    Next,
    Pause,
    Resume,
    SetIndex,
}

pub struct SignalFd {
    fd: RawFd,
    set_index_signal: i32,
}

impl SignalFd {
    /// Blocks the control-plane signal set on the current thread (inherited
    /// by the whole process since this runs before any other thread is
    /// spawned) and opens a signalfd over it.
    pub fn new() -> Result<Self> {
        let set_index_signal = unsafe { libc::SIGRTMIN() };
        unsafe {
            let mut mask: libc::sigset_t = mem::zeroed();
            libc::sigemptyset(&mut mask);
            for signal in [
                libc::SIGTERM,
                libc::SIGINT,
                libc::SIGUSR1,
                libc::SIGUSR2,
                libc::SIGCONT,
                set_index_signal,
            ] {
                libc::sigaddset(&mut mask, signal);
            }

            if libc::sigprocmask(libc::SIG_BLOCK, &mask, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error()).context("blocking control-plane signals");
            }

            let fd = libc::signalfd(-1, &mask, libc::SFD_CLOEXEC | libc::SFD_NONBLOCK);
            if fd < 0 {
                return Err(io::Error::last_os_error()).context("creating signalfd");
            }

            Ok(Self { fd, set_index_signal })
        }
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Drains every signalfd_siginfo currently queued, mapped to the
    /// event-loop action each one triggers (§4.I step 1).
    pub fn drain(&self) -> Vec<SignalKind> {
        let mut kinds = Vec::new();
        let mut info: libc::signalfd_siginfo = unsafe { mem::zeroed() };
        loop {
            let size = mem::size_of::<libc::signalfd_siginfo>();
            let read = unsafe {
                libc::read(self.fd, &mut info as *mut _ as *mut libc::c_void, size)
            };
            if read != size as isize {
                break;
            }
            let signo = info.ssi_signo as i32;
            let kind = if signo == libc::SIGTERM || signo == libc::SIGINT {
                SignalKind::Shutdown
            } else if signo == libc::SIGUSR1 {
                SignalKind::Next
            } else if signo == libc::SIGUSR2 {
                SignalKind::Pause
            } else if signo == libc::SIGCONT {
                SignalKind::Resume
            } else if signo == self.set_index_signal {
                SignalKind::SetIndex
            } else {
                continue;
            };
            kinds.push(kind);
        }
        kinds
    }
}

impl Drop for SignalFd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
