//! Background daemonization for the default (no `-f`/`--foreground`) CLI
//! mode (§6: "`<none>` = daemonize"). A standard double-fork detaching from
//! the controlling terminal. No pack example daemonizes — every teacher
//! binary runs in the foreground under a session manager — so this is
//! built directly against `libc`, consistent with §10's low-level Unix
//! primitives convention.

use std::ffi::CString;

use anyhow::{Context, Result};

/// Forks twice and detaches from the controlling terminal. Returns once in
/// the final background process; the original process and the intermediate
/// child both exit inside this call and never return.
pub fn daemonize() -> Result<()> {
    fork_and_exit_parent("first fork failed")?;

    if unsafe { libc::setsid() } < 0 {
        return Err(std::io::Error::last_os_error()).context("setsid failed");
    }

    fork_and_exit_parent("second fork failed")?;

    redirect_standard_fds()?;
    std::env::set_current_dir("/").context("chdir to / failed")?;
    Ok(())
}

fn fork_and_exit_parent(context: &'static str) -> Result<()> {
    match unsafe { libc::fork() } {
        -1 => Err(std::io::Error::last_os_error()).context(context),
        0 => Ok(()),
        _ => unsafe { libc::_exit(0) },
    }
}

fn redirect_standard_fds() -> Result<()> {
    let dev_null = CString::new("/dev/null").expect("no interior nul in literal path");
    unsafe {
        let fd = libc::open(dev_null.as_ptr(), libc::O_RDWR);
        if fd < 0 {
            return Err(std::io::Error::last_os_error()).context("opening /dev/null");
        }
        libc::dup2(fd, libc::STDIN_FILENO);
        libc::dup2(fd, libc::STDOUT_FILENO);
        libc::dup2(fd, libc::STDERR_FILENO);
        if fd > libc::STDERR_FILENO {
            libc::close(fd);
        }
    }
    Ok(())
}
