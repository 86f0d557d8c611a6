use std::io::{self, BufRead, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};

use crate::error::{Error, Result};
use crate::handle::FileHandle;
use crate::posix;
use crate::sysbuf::SystemBuf;

/// Buffered, text-oriented reading end bound to a [`FileHandle`].
///
/// The stream owns the handle; the buffer inside only borrows its
/// descriptor.
#[derive(Debug)]
pub struct ReadStream {
    // Declared before `handle` so the buffer goes away before the close.
    buf: SystemBuf,
    handle: FileHandle,
}

impl ReadStream {
    /// Bind a buffered read stream to `handle`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidHandle` if `handle` is empty.
    pub fn new(handle: FileHandle) -> Result<ReadStream> {
        let fd = handle.get()?;
        Ok(ReadStream {
            buf: SystemBuf::new(fd),
            handle,
        })
    }

    /// Like [`new`](Self::new), with an explicit buffer capacity.
    pub fn with_capacity(handle: FileHandle, capacity: usize) -> Result<ReadStream> {
        let fd = handle.get()?;
        Ok(ReadStream {
            buf: SystemBuf::with_capacity(fd, capacity),
            handle,
        })
    }

    /// The handle this stream reads from.
    pub fn handle(&self) -> &FileHandle {
        &self.handle
    }

    /// Read the next line, without its `\n`.
    ///
    /// A final line without a terminator is returned as is.  Returns
    /// `Ok(None)` at end of input.  Invalid UTF-8 is replaced with U+FFFD.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = Vec::new();
        if self.buf.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Read the next whitespace-delimited token.
    ///
    /// Leading whitespace is skipped; the delimiter that ends the token is
    /// left in the stream.  Returns `Ok(None)` if end of input comes before
    /// any token byte.
    pub fn read_token(&mut self) -> Result<Option<String>> {
        let mut token = Vec::new();
        while let Some(byte) = self.read_byte()? {
            if byte.is_ascii_whitespace() {
                if token.is_empty() {
                    continue;
                }
                self.buf.unread(byte)?;
                break;
            }
            token.push(byte);
        }
        if token.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&token).into_owned()))
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8];
        match self.buf.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    pub(crate) fn has_buffered(&self) -> bool {
        self.buf.has_buffered()
    }

    /// Unwrap the handle.  Buffered, unread input is discarded.
    pub fn into_handle(self) -> FileHandle {
        let ReadStream { buf, handle } = self;
        drop(buf);
        handle
    }
}

impl Read for ReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buf.read(buf)
    }
}

impl BufRead for ReadStream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.buf.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.buf.consume(amt)
    }
}

impl AsRawFd for ReadStream {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}

/// Reading end that issues exactly one `read(2)` per read request.
///
/// Nothing is held back in user space, so readiness reported by `poll()` on
/// the descriptor always reflects what the next read will see.  `EINTR` is
/// passed through as `ErrorKind::Interrupted`.
#[derive(Debug)]
pub struct UnbufferedReadStream {
    handle: FileHandle,
}

impl UnbufferedReadStream {
    /// Bind an unbuffered read stream to `handle`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidHandle` if `handle` is empty.
    pub fn new(handle: FileHandle) -> Result<UnbufferedReadStream> {
        handle.get()?;
        Ok(UnbufferedReadStream { handle })
    }

    pub fn handle(&self) -> &FileHandle {
        &self.handle
    }

    pub fn into_handle(self) -> FileHandle {
        self.handle
    }
}

impl Read for UnbufferedReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        posix::read(self.handle.as_raw_fd(), buf)
    }
}

impl AsRawFd for UnbufferedReadStream {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}

/// Buffered writing end bound to a [`FileHandle`].
///
/// Pending output is flushed when the stream is dropped, before the handle
/// closes the descriptor.  Call [`flush`](Write::flush) to observe errors.
#[derive(Debug)]
pub struct WriteStream {
    // Declared before `handle` so the final flush happens before the close.
    buf: SystemBuf,
    handle: FileHandle,
}

impl WriteStream {
    /// Bind a buffered write stream to `handle`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidHandle` if `handle` is empty.
    pub fn new(handle: FileHandle) -> Result<WriteStream> {
        let fd = handle.get()?;
        Ok(WriteStream {
            buf: SystemBuf::new(fd),
            handle,
        })
    }

    pub fn with_capacity(handle: FileHandle, capacity: usize) -> Result<WriteStream> {
        let fd = handle.get()?;
        Ok(WriteStream {
            buf: SystemBuf::with_capacity(fd, capacity),
            handle,
        })
    }

    /// The handle this stream writes to.
    pub fn handle(&self) -> &FileHandle {
        &self.handle
    }

    /// Flush pending output and unwrap the handle.
    pub fn into_handle(self) -> Result<FileHandle> {
        let WriteStream { mut buf, handle } = self;
        buf.flush().map_err(Error::Io)?;
        Ok(handle)
    }
}

impl Write for WriteStream {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.buf.flush()
    }
}

impl AsRawFd for WriteStream {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}
