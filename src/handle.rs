use std::fmt;
use std::fs::File;
use std::mem;
use std::os::fd::{FromRawFd, IntoRawFd, OwnedFd};
use std::os::unix::io::{AsRawFd, RawFd};

use crate::error::{Error, Result};
use crate::posix;

const INVALID_FD: RawFd = -1;

/// Exclusive owner of one OS descriptor.
///
/// A `FileHandle` is either empty or the only owner of its descriptor; the
/// descriptor is closed exactly once, when the owning handle is dropped.
/// Ownership moves with the value.  [`take`](Self::take) and
/// [`transfer_to`](Self::transfer_to) move it out of a handle that is only
/// reachable by reference, leaving that handle empty.
pub struct FileHandle {
    fd: RawFd,
}

impl FileHandle {
    /// Create an empty handle.
    pub fn new() -> FileHandle {
        FileHandle { fd: INVALID_FD }
    }

    /// True if the handle currently owns a descriptor.
    pub fn is_valid(&self) -> bool {
        self.fd != INVALID_FD
    }

    /// Return the owned descriptor without giving up ownership.
    ///
    /// # Errors
    ///
    /// `Error::InvalidHandle` if the handle is empty.
    pub fn get(&self) -> Result<RawFd> {
        if !self.is_valid() {
            return Err(Error::InvalidHandle);
        }
        Ok(self.fd)
    }

    /// Move the descriptor into a new handle, leaving `self` empty.
    pub fn take(&mut self) -> FileHandle {
        FileHandle {
            fd: mem::replace(&mut self.fd, INVALID_FD),
        }
    }

    /// Make `other` the sole owner of this handle's descriptor.
    ///
    /// Whatever `other` owned before is closed.  `self` is left empty.
    pub fn transfer_to(&mut self, other: &mut FileHandle) {
        *other = self.take();
    }

    /// Give up ownership without closing, returning the descriptor.
    ///
    /// # Errors
    ///
    /// `Error::InvalidHandle` if the handle is empty.
    pub fn disown(&mut self) -> Result<RawFd> {
        let fd = self.get()?;
        self.fd = INVALID_FD;
        Ok(fd)
    }

    /// Move the open file onto descriptor number `target_fd`.
    ///
    /// Whatever `target_fd` referred to before is closed by `dup2()`, the
    /// old descriptor number is released, and the handle owns `target_fd`
    /// from then on.  If the handle already owns `target_fd`, nothing
    /// happens.
    ///
    /// This is used between `fork()` and `exec` and must stay free of
    /// allocation and logging.
    ///
    /// # Errors
    ///
    /// `Error::InvalidHandle` if the handle is empty, `Error::System` if
    /// `dup2()` or `close()` fails.  If `dup2()` fails the handle is left
    /// untouched.
    pub fn remap(&mut self, target_fd: RawFd) -> Result<()> {
        let fd = self.get()?;
        if fd == target_fd {
            return Ok(());
        }
        posix::dup2(fd, target_fd).map_err(Error::system("dup2"))?;
        self.fd = target_fd;
        posix::close(fd).map_err(Error::system("close"))
    }
}

impl Default for FileHandle {
    fn default() -> FileHandle {
        FileHandle::new()
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.is_valid() {
            let _ = posix::close(self.fd);
        }
    }
}

impl FromRawFd for FileHandle {
    /// Take ownership of `fd`.
    ///
    /// The caller must guarantee that nothing else owns `fd`.
    unsafe fn from_raw_fd(fd: RawFd) -> FileHandle {
        FileHandle { fd }
    }
}

impl AsRawFd for FileHandle {
    /// The owned descriptor, or `-1` for an empty handle.
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl IntoRawFd for FileHandle {
    fn into_raw_fd(mut self) -> RawFd {
        mem::replace(&mut self.fd, INVALID_FD)
    }
}

impl From<OwnedFd> for FileHandle {
    fn from(fd: OwnedFd) -> FileHandle {
        FileHandle {
            fd: fd.into_raw_fd(),
        }
    }
}

impl From<File> for FileHandle {
    fn from(file: File) -> FileHandle {
        FileHandle::from(OwnedFd::from(file))
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            f.debug_tuple("FileHandle").field(&self.fd).finish()
        } else {
            f.write_str("FileHandle(<empty>)")
        }
    }
}
