use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::os::fd::FromRawFd;
use std::os::unix::io::RawFd;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::handle::FileHandle;
use crate::muxer::{MuxObserver, Muxer};
use crate::pipe::Pipe;
use crate::posix;
use crate::stream::UnbufferedReadStream;

/// Exit status of a test process.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ExitStatus {
    /// The process exited with the specified exit code.
    Exited(u32),

    /// The process was killed by the signal with the specified number.
    Signaled(u8),

    /// The wait status cannot be described by the preceding two variants.
    ///
    /// This should not occur in normal operation.
    Other(i32),
}

impl ExitStatus {
    /// True if the process exited with code 0.
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit code {}", code),
            ExitStatus::Signaled(sig) => write!(f, "signal {}", sig),
            ExitStatus::Other(raw) => write!(f, "wait status {:#x}", raw),
        }
    }
}

/// A test program run with its stdout and stderr captured line by line.
///
/// `run()` opens a pipe per output channel, starts the program with the
/// write ends installed as descriptors 1 and 2, and drains the read ends
/// with a [`Muxer`].  Extra handles, such as the descriptor the program
/// reports results on, can be installed at fixed numbers with
/// [`install`](Self::install).
///
/// There is no timeout.  A program that never closes its output keeps
/// `run()` blocked; bounding its lifetime is up to the caller.
#[derive(Debug)]
pub struct TestProcess {
    argv: Vec<OsString>,
    installs: Vec<(FileHandle, RawFd)>,
}

impl TestProcess {
    pub fn new(argv: &[impl AsRef<OsStr>]) -> TestProcess {
        TestProcess {
            argv: argv.iter().map(|a| a.as_ref().to_owned()).collect(),
            installs: vec![],
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> TestProcess {
        self.argv.push(arg.as_ref().to_owned());
        self
    }

    /// Install `handle` as descriptor `target_fd` in the child.
    ///
    /// The parent's copy is closed once the child has started.  `target_fd`
    /// must be above 2 and must not be used twice.
    pub fn install(mut self, handle: FileHandle, target_fd: RawFd) -> TestProcess {
        self.installs.push((handle, target_fd));
        self
    }

    /// Start the program, deliver its output to `observer`, and wait for it.
    ///
    /// Returns once both output channels reached end of input and the
    /// process has been reaped.
    ///
    /// # Errors
    ///
    /// `Error::System` if a pipe cannot be created, `fork()` fails, the
    /// program cannot be executed (`call == "execvp"`, carrying the child's
    /// errno), or reading the exec report or the output fails.  In the
    /// last two cases the child is killed and reaped before the error is
    /// returned.
    pub fn run<O: MuxObserver>(self, observer: O) -> Result<(ExitStatus, O)> {
        if self.argv.is_empty() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "argv must not be empty",
            )));
        }

        let (out_read, mut out_write) = Pipe::new()?.into_ends();
        let (err_read, mut err_write) = Pipe::new()?.into_ends();
        let (mut exec_fail_read, mut exec_fail_write) = Pipe::new()?.into_ends();

        // Every descriptor the child moves or keeps must sit above all the
        // target numbers, so that no remap clobbers one still needed.
        let mut installs = self.installs;
        let highest_target = installs.iter().map(|&(_, fd)| fd).fold(2, RawFd::max);
        lift_above(&mut out_write, highest_target)?;
        lift_above(&mut err_write, highest_target)?;
        lift_above(&mut exec_fail_write, highest_target)?;
        for (handle, _) in installs.iter_mut() {
            lift_above(handle, highest_target)?;
        }
        let just_exec = posix::prep_exec(&self.argv).map_err(Error::system("execvp"))?;

        debug!(argv = ?self.argv, "starting test process");
        let pid = match unsafe { posix::fork() }.map_err(Error::system("fork"))? {
            Some(pid) => pid,
            None => {
                drop(out_read);
                drop(err_read);
                drop(exec_fail_read);
                let errno = match child_setup(out_write, err_write, &mut installs) {
                    Ok(()) => match just_exec() {
                        Ok(()) => libc::ENOEXEC,
                        Err(e) => e.raw_os_error().unwrap_or(libc::ENOEXEC),
                    },
                    Err(e) => e.raw_os_error().unwrap_or(libc::EBADF),
                };
                report_exec_failure(&exec_fail_write, errno);
                posix::_exit(127);
            }
        };

        // The parent's copies of the child ends must go before draining, or
        // the read ends never see end of input.
        drop(out_write);
        drop(err_write);
        drop(exec_fail_write);
        drop(installs);

        let exec_failure = read_exec_failure(&mut exec_fail_read);
        if let Some(errno) = kill_on_error(pid, exec_failure)? {
            let _ = posix::waitpid(pid);
            return Err(Error::System {
                call: "execvp",
                source: io::Error::from_raw_os_error(errno),
            });
        }
        drop(exec_fail_read);

        let mut out = UnbufferedReadStream::new(out_read)?;
        let mut err = UnbufferedReadStream::new(err_read)?;
        let mut muxer = Muxer::new(observer);
        let drained = muxer.read(&mut out, &mut err);
        kill_on_error(pid, drained)?;

        let status = posix::waitpid(pid).map_err(Error::system("waitpid"))?;
        debug!(pid, %status, "test process finished");
        Ok((status, muxer.into_observer()))
    }
}

/// Pass `result` through; on error, kill and reap `pid` first so that no
/// child is left running or unreaped.
pub(crate) fn kill_on_error<T>(pid: u32, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        warn!(pid, error = %e, "lost track of test process; killing it");
        let _ = posix::kill(pid, posix::SIGKILL);
        let _ = posix::waitpid(pid);
    }
    result
}

// Replace `handle` by a close-on-exec duplicate numbered above `highest`.
fn lift_above(handle: &mut FileHandle, highest: RawFd) -> Result<()> {
    let fd = handle.get()?;
    if fd > highest {
        return Ok(());
    }
    let lifted = posix::dup_cloexec_above(fd, highest + 1).map_err(Error::system("fcntl"))?;
    // The duplicate is fresh and owned by nothing else; the old number is
    // closed when the previous handle is dropped here.
    *handle = unsafe { FileHandle::from_raw_fd(lifted) };
    Ok(())
}

// Runs in the child between fork() and exec: no allocation, no logging.
fn child_setup(
    mut out_write: FileHandle,
    mut err_write: FileHandle,
    installs: &mut [(FileHandle, RawFd)],
) -> Result<()> {
    out_write.remap(1)?;
    err_write.remap(2)?;
    for (handle, target_fd) in installs.iter_mut() {
        let target_fd = *target_fd;
        // Every source sits above every target, so this always dup2()s and
        // the new number comes out inheritable.
        handle.remap(target_fd)?;
        handle.disown()?;
    }
    out_write.disown()?;
    err_write.disown()?;
    posix::reset_sigpipe().map_err(Error::system("sigprocmask"))?;
    Ok(())
}

// Also runs in the child.  Failure to report leaves the parent with end of
// input on the pipe; the 127 exit status still tells the story.
fn report_exec_failure(pipe: &FileHandle, errno: i32) {
    let Ok(fd) = pipe.get() else {
        return;
    };
    let code = (errno as u32).to_le_bytes();
    let mut rest = &code[..];
    while !rest.is_empty() {
        match posix::write(fd, rest) {
            Ok(n) if n > 0 => rest = &rest[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            _ => return,
        }
    }
}

/// Read the child's errno from the exec-failure pipe.  End of input means
/// the exec succeeded and closed the pipe.
pub(crate) fn read_exec_failure(pipe: &mut FileHandle) -> Result<Option<i32>> {
    let fd = pipe.get()?;
    let mut buf = [0u8; 4];
    let mut total = 0;
    while total < buf.len() {
        match posix::read(fd, &mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::System { call: "read", source: e }),
        }
    }
    match total {
        0 => Ok(None),
        4 => Ok(Some(u32::from_le_bytes(buf) as i32)),
        _ => Err(Error::System {
            call: "read",
            source: io::ErrorKind::UnexpectedEof.into(),
        }),
    }
}
