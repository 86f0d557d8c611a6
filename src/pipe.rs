use std::os::fd::FromRawFd;

use crate::error::{Error, Result};
use crate::handle::FileHandle;
use crate::posix;
use crate::stream::{ReadStream, WriteStream};

/// A connected pair of descriptors, each owned by its own [`FileHandle`].
///
/// Both ends are close-on-exec.  Installing an end into a child with
/// [`FileHandle::remap`] gives the target number an inheritable copy.  The
/// fields are public: once created, the ends are independent and are
/// usually moved to different owners.
#[derive(Debug)]
pub struct Pipe {
    pub read_end: FileHandle,
    pub write_end: FileHandle,
}

impl Pipe {
    /// Allocate a new pipe.
    ///
    /// # Errors
    ///
    /// `Error::System` if the OS cannot allocate the descriptors, e.g. when
    /// the descriptor table is full.
    pub fn new() -> Result<Pipe> {
        let (read_fd, write_fd) = posix::pipe().map_err(Error::system("pipe"))?;
        // pipe() hands back two fresh descriptors that nothing else owns.
        unsafe {
            Ok(Pipe {
                read_end: FileHandle::from_raw_fd(read_fd),
                write_end: FileHandle::from_raw_fd(write_fd),
            })
        }
    }

    /// Split the pipe into `(read_end, write_end)`.
    pub fn into_ends(self) -> (FileHandle, FileHandle) {
        (self.read_end, self.write_end)
    }

    /// Wrap both ends in buffered streams.
    pub fn into_streams(self) -> Result<(ReadStream, WriteStream)> {
        Ok((
            ReadStream::new(self.read_end)?,
            WriteStream::new(self.write_end)?,
        ))
    }
}
