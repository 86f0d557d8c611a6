use std::fmt;
use std::io::{self, BufRead, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};

use crate::posix;

/// Buffer capacity used by [`SystemBuf::new`].
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Buffered byte stream over a borrowed descriptor.
///
/// `SystemBuf` keeps one read buffer and one write buffer of the same
/// capacity.  It never owns the descriptor: dropping it flushes pending
/// output but does not close anything, so the descriptor must outlive it.
/// Ownership lives in [`FileHandle`](crate::FileHandle).
///
/// A read performs at most one `read(2)` of up to `capacity()` bytes, and only
/// when the read buffer is empty.  Writes accumulate until the buffer is full
/// and are then sent with as many `write(2)` calls as it takes.  `EINTR` is
/// retried transparently in both directions.  On a non-blocking descriptor a
/// write that would block waits for `POLLOUT`; a read that would block is
/// reported as `ErrorKind::WouldBlock`.
pub struct SystemBuf {
    fd: RawFd,
    read_buf: Box<[u8]>,
    read_pos: usize,
    read_end: usize,
    write_buf: Vec<u8>,
}

impl SystemBuf {
    /// Wrap `fd` with [`DEFAULT_BUFFER_SIZE`] buffers.
    pub fn new(fd: RawFd) -> SystemBuf {
        SystemBuf::with_capacity(fd, DEFAULT_BUFFER_SIZE)
    }

    /// Wrap `fd` with buffers of `capacity` bytes (at least one).
    pub fn with_capacity(fd: RawFd, capacity: usize) -> SystemBuf {
        let capacity = capacity.max(1);
        SystemBuf {
            fd,
            read_buf: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            read_end: 0,
            write_buf: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.read_buf.len()
    }

    /// True if bytes already read from the descriptor are waiting to be
    /// consumed.
    pub fn has_buffered(&self) -> bool {
        self.read_pos < self.read_end
    }

    /// Push `byte` back so that it is the next byte read.
    ///
    /// One byte of pushback is always available after a successful read.
    ///
    /// # Errors
    ///
    /// Fails with `ErrorKind::Other` when the read buffer is full of unread
    /// data and has no room in front of it.
    pub fn unread(&mut self, byte: u8) -> io::Result<()> {
        if self.read_pos > 0 {
            self.read_pos -= 1;
        } else if self.read_end < self.read_buf.len() {
            self.read_buf.copy_within(0..self.read_end, 1);
            self.read_end += 1;
        } else {
            return Err(io::Error::other("no room to push back a byte"));
        }
        self.read_buf[self.read_pos] = byte;
        Ok(())
    }

    fn flush_buf(&mut self) -> io::Result<()> {
        let mut written = 0;
        let result = loop {
            if written == self.write_buf.len() {
                break Ok(());
            }
            match posix::write(self.fd, &self.write_buf[written..]) {
                Ok(0) => {
                    break Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "descriptor accepted no data",
                    ));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if let Err(e) = wait_writable(self.fd) {
                        break Err(e);
                    }
                }
                Err(e) => break Err(e),
            }
        };
        // Only what reached the descriptor leaves the buffer, so a later
        // flush neither drops nor repeats bytes.
        self.write_buf.drain(..written);
        result
    }
}

fn wait_writable(fd: RawFd) -> io::Result<()> {
    let mut fds = [posix::PollFd::new(fd, posix::POLLOUT)];
    loop {
        match posix::poll(&mut fds, None) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

impl Read for SystemBuf {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for SystemBuf {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.read_pos >= self.read_end {
            let n = loop {
                match posix::read(self.fd, &mut self.read_buf) {
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    result => break result?,
                }
            };
            self.read_pos = 0;
            self.read_end = n;
        }
        Ok(&self.read_buf[self.read_pos..self.read_end])
    }

    fn consume(&mut self, amt: usize) {
        self.read_pos = (self.read_pos + amt).min(self.read_end);
    }
}

impl Write for SystemBuf {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        if self.write_buf.len() == self.capacity() {
            self.flush_buf()?;
        }
        let n = data.len().min(self.capacity() - self.write_buf.len());
        self.write_buf.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buf()
    }
}

impl AsRawFd for SystemBuf {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for SystemBuf {
    fn drop(&mut self) {
        let _ = self.flush_buf();
    }
}

impl fmt::Debug for SystemBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemBuf")
            .field("fd", &self.fd)
            .field("capacity", &self.capacity())
            .field("buffered_in", &(self.read_end - self.read_pos))
            .field("buffered_out", &self.write_buf.len())
            .finish()
    }
}
