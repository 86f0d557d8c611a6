use std::ffi::{CString, OsStr, OsString};
use std::io::{self, Error, Result};
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

use crate::process::ExitStatus;

pub use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, SIGKILL};

fn check_err<T: Ord + Default>(num: T) -> Result<T> {
    if num < T::default() {
        return Err(Error::last_os_error());
    }
    Ok(num)
}

/// Create a pipe, returning `(read_end, write_end)`.
///
/// Both descriptors are close-on-exec, atomically where the platform has
/// `pipe2()`.  A descriptor installed into a child with `dup2()` loses the
/// flag on its new number, which is what the child side wants.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris"
))]
pub fn pipe() -> Result<(RawFd, RawFd)> {
    let mut fds = [0 as libc::c_int; 2];
    check_err(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;
    Ok((fds[0], fds[1]))
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris"
)))]
pub fn pipe() -> Result<(RawFd, RawFd)> {
    let mut fds = [0 as libc::c_int; 2];
    check_err(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    for &fd in &fds {
        if let Err(e) = set_cloexec(fd) {
            unsafe {
                libc::close(fds[0]);
                libc::close(fds[1]);
            }
            return Err(e);
        }
    }
    Ok((fds[0], fds[1]))
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris"
)))]
fn set_cloexec(fd: RawFd) -> Result<()> {
    let old = check_err(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
    check_err(unsafe { libc::fcntl(fd, libc::F_SETFD, old | libc::FD_CLOEXEC) })?;
    Ok(())
}

pub fn dup2(oldfd: RawFd, newfd: RawFd) -> Result<()> {
    check_err(unsafe { libc::dup2(oldfd, newfd) })?;
    Ok(())
}

pub fn close(fd: RawFd) -> Result<()> {
    check_err(unsafe { libc::close(fd) })?;
    Ok(())
}

/// A single `read(2)`.  `EINTR` is reported to the caller.
pub fn read(fd: RawFd, buf: &mut [u8]) -> Result<usize> {
    let n = check_err(unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) })?;
    Ok(n as usize)
}

/// A single `write(2)`.  `EINTR` is reported to the caller.
pub fn write(fd: RawFd, buf: &[u8]) -> Result<usize> {
    let n = check_err(unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) })?;
    Ok(n as usize)
}

#[repr(transparent)]
pub struct PollFd(libc::pollfd);

impl PollFd {
    pub fn new(fd: RawFd, events: i16) -> PollFd {
        PollFd(libc::pollfd {
            fd,
            events,
            revents: 0,
        })
    }

    pub fn test(&self, mask: i16) -> bool {
        self.0.revents & mask != 0
    }
}

/// Wait for readiness on `fds`.  `None` waits indefinitely.
pub fn poll(fds: &mut [PollFd], timeout: Option<Duration>) -> Result<usize> {
    let timeout = timeout
        .map(|t| t.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1);
    let fds_ptr = fds.as_mut_ptr() as *mut libc::pollfd;
    let cnt = check_err(unsafe { libc::poll(fds_ptr, fds.len() as libc::nfds_t, timeout) })?;
    Ok(cnt as usize)
}

/// Fork the current process.
///
/// Returns `Some(pid)` in the parent and `None` in the child.
///
/// # Safety
///
/// The child of a multi-threaded parent may only perform async-signal-safe
/// operations until it calls `exec` or `_exit`.
pub unsafe fn fork() -> Result<Option<u32>> {
    let pid = check_err(unsafe { libc::fork() })?;
    if pid == 0 {
        Ok(None)
    } else {
        Ok(Some(pid as u32))
    }
}

fn os_to_cstring(s: &OsStr) -> Result<CString> {
    let bytes = s.as_bytes();
    if bytes.contains(&0) {
        return Err(Error::from_raw_os_error(libc::EINVAL));
    }
    // not expected to fail on Unix, as Unix arguments *are* C strings
    CString::new(bytes).map_err(|_| Error::from_raw_os_error(libc::EINVAL))
}

struct CVec {
    // Pointed to by elements of `ptrs`.
    #[allow(dead_code)]
    strings: Vec<CString>,

    // nullptr-terminated vector of pointers into `strings`.
    ptrs: Vec<*const libc::c_char>,
}

impl CVec {
    fn new(slice: &[OsString]) -> Result<CVec> {
        let strings = slice
            .iter()
            .map(|s| os_to_cstring(s))
            .collect::<Result<Vec<CString>>>()?;
        let ptrs = strings
            .iter()
            .map(|s| s.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();
        Ok(CVec { strings, ptrs })
    }
}

/// Prepare everything `execvp` needs, so that the child only has to make the
/// call.  Allocation between `fork()` and `exec` is not safe in a
/// multi-threaded parent.
pub fn prep_exec(argv: &[OsString]) -> Result<impl FnOnce() -> Result<()>> {
    let Some(cmd) = argv.first() else {
        return Err(Error::from_raw_os_error(libc::EINVAL));
    };
    let cmd = os_to_cstring(cmd)?;
    let args = CVec::new(argv)?;
    Ok(move || {
        let _ = &args;
        unsafe {
            libc::execvp(cmd.as_ptr(), args.ptrs.as_ptr());
        }
        Err(Error::last_os_error())
    })
}

pub fn _exit(status: u8) -> ! {
    unsafe { libc::_exit(status as libc::c_int) }
}

/// Wait for `pid`, retrying on `EINTR`.
pub fn waitpid(pid: u32) -> Result<ExitStatus> {
    let mut status = 0 as libc::c_int;
    loop {
        let ret = unsafe { libc::waitpid(pid as libc::pid_t, &mut status, 0) };
        match check_err(ret) {
            Ok(_) => return Ok(decode_exit_status(status)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn decode_exit_status(status: i32) -> ExitStatus {
    if libc::WIFEXITED(status) {
        ExitStatus::Exited(libc::WEXITSTATUS(status) as u32)
    } else if libc::WIFSIGNALED(status) {
        ExitStatus::Signaled(libc::WTERMSIG(status) as u8)
    } else {
        ExitStatus::Other(status)
    }
}

pub fn kill(pid: u32, signal: i32) -> Result<()> {
    check_err(unsafe { libc::kill(pid as libc::pid_t, signal) })?;
    Ok(())
}

pub fn reset_sigpipe() -> Result<()> {
    // libstd ignores SIGPIPE, and children inherit ignored signals and the
    // signal mask.  Test programs expect the defaults.
    unsafe {
        let mut set: libc::sigset_t = mem::zeroed();
        check_err(libc::sigemptyset(&mut set))?;
        let rc = libc::pthread_sigmask(libc::SIG_SETMASK, &set, ptr::null_mut());
        if rc != 0 {
            return Err(Error::from_raw_os_error(rc));
        }
        if libc::signal(libc::SIGPIPE, libc::SIG_DFL) == libc::SIG_ERR {
            return Err(Error::last_os_error());
        }
    }
    Ok(())
}

/// Duplicate `fd` onto the lowest free number >= `min`, close-on-exec.
pub fn dup_cloexec_above(fd: RawFd, min: RawFd) -> Result<RawFd> {
    check_err(unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, min) })
}
