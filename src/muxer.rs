use std::fmt;
use std::io::{self, Read};
use std::os::unix::io::AsRawFd;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::posix;
use crate::stream::{ReadStream, UnbufferedReadStream};

const CHUNK_SIZE: usize = 4096;

/// Which output channel of the child a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Stdout => "stdout",
            Channel::Stderr => "stderr",
        })
    }
}

/// Receiver of the lines a [`Muxer`] reassembles.
pub trait MuxObserver {
    /// A complete line arrived on `channel`.  `line` excludes the `\n`.
    fn on_line(&mut self, channel: Channel, line: &str);

    /// Both channels reached end of input.  Called once per successful
    /// [`Muxer::read`], after the last `on_line`.
    fn on_eof(&mut self);
}

impl<T: MuxObserver + ?Sized> MuxObserver for &mut T {
    fn on_line(&mut self, channel: Channel, line: &str) {
        (**self).on_line(channel, line)
    }

    fn on_eof(&mut self) {
        (**self).on_eof()
    }
}

/// A stream the muxer can wait on and read from.
pub trait MuxSource: Read + AsRawFd {
    /// True if data is already buffered in user space, where `poll()` cannot
    /// see it.
    fn has_buffered(&self) -> bool {
        false
    }
}

impl MuxSource for UnbufferedReadStream {}

impl MuxSource for ReadStream {
    fn has_buffered(&self) -> bool {
        ReadStream::has_buffered(self)
    }
}

impl MuxSource for std::fs::File {}

/// Observer that keeps everything it is told.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LineCollector {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub eof_count: usize,
}

impl LineCollector {
    pub fn new() -> LineCollector {
        LineCollector::default()
    }
}

impl MuxObserver for LineCollector {
    fn on_line(&mut self, channel: Channel, line: &str) {
        match channel {
            Channel::Stdout => self.stdout.push(line.to_owned()),
            Channel::Stderr => self.stderr.push(line.to_owned()),
        }
    }

    fn on_eof(&mut self) {
        self.eof_count += 1;
    }
}

/// Per-channel state of one drain: the unterminated tail seen so far and
/// whether the channel is still open.
struct LineBuffer {
    channel: Channel,
    pending: Vec<u8>,
    open: bool,
}

impl LineBuffer {
    fn new(channel: Channel) -> LineBuffer {
        LineBuffer {
            channel,
            pending: Vec::new(),
            open: true,
        }
    }

    fn feed(&mut self, data: &[u8], observer: &mut impl MuxObserver) {
        self.pending.extend_from_slice(data);
        let mut start = 0;
        while let Some(pos) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let line = &self.pending[start..start + pos];
            observer.on_line(self.channel, &String::from_utf8_lossy(line));
            start += pos + 1;
        }
        self.pending.drain(..start);
    }

    fn finish(&mut self, observer: &mut impl MuxObserver) {
        if !self.pending.is_empty() {
            observer.on_line(self.channel, &String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
        self.open = false;
        debug!(channel = %self.channel, "end of input");
    }
}

/// Drains a child's stdout and stderr together, line by line.
///
/// Both channels are drained from the calling thread.  While both are open
/// the muxer waits on them with `poll()` and reads whichever is ready, so a
/// producer that only writes to one of them never keeps lines of the other
/// from being delivered.  Once one channel is exhausted the other is read
/// directly; a non-blocking source with nothing to offer yet is waited on
/// with `poll()` before the read is retried.
///
/// Lines of one channel are delivered in the order they were written.  No
/// order is promised between channels beyond what readiness happens to
/// give.
pub struct Muxer<O> {
    observer: O,
}

impl<O: MuxObserver> Muxer<O> {
    pub fn new(observer: O) -> Muxer<O> {
        Muxer { observer }
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    /// Drain `out` and `err` until both reach end of input.
    ///
    /// A trailing fragment without a terminator is delivered as a final
    /// line of its channel.  `on_eof` fires once both channels are done,
    /// before this returns.  There is no timeout: a peer that never closes
    /// its end keeps this call blocked.
    ///
    /// # Errors
    ///
    /// `Error::System` if `poll()` or a `read()` fails, or if a descriptor
    /// is not open.  Lines delivered before the failure stay delivered;
    /// `on_eof` is not called.
    pub fn read<A, B>(&mut self, out: &mut A, err: &mut B) -> Result<()>
    where
        A: MuxSource,
        B: MuxSource,
    {
        let mut out_lines = LineBuffer::new(Channel::Stdout);
        let mut err_lines = LineBuffer::new(Channel::Stderr);
        let mut chunk = [0u8; CHUNK_SIZE];

        loop {
            let (out_ready, err_ready) = match (out_lines.open, err_lines.open) {
                (false, false) => break,
                // With one stream left, the read itself provides the wait.
                (true, false) => (true, false),
                (false, true) => (false, true),
                (true, true) => wait_readable(out, err)?,
            };
            if out_ready {
                self.pump(out, &mut out_lines, &mut chunk)?;
            }
            if err_ready {
                self.pump(err, &mut err_lines, &mut chunk)?;
            }
        }

        self.observer.on_eof();
        Ok(())
    }

    fn pump(
        &mut self,
        source: &mut impl MuxSource,
        lines: &mut LineBuffer,
        chunk: &mut [u8],
    ) -> Result<()> {
        let n = loop {
            match source.read(chunk) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // A non-blocking source with nothing to read yet.
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => wait_one_readable(&*source)?,
                result => break result.map_err(Error::system("read"))?,
            }
        };
        trace!(channel = %lines.channel, bytes = n, "read chunk");
        if n == 0 {
            lines.finish(&mut self.observer);
        } else {
            lines.feed(&chunk[..n], &mut self.observer);
        }
        Ok(())
    }
}

fn wait_readable(out: &impl MuxSource, err: &impl MuxSource) -> Result<(bool, bool)> {
    // Data sitting in a user-space buffer is invisible to poll().
    if out.has_buffered() || err.has_buffered() {
        return Ok((out.has_buffered(), err.has_buffered()));
    }

    let mut fds = [
        posix::PollFd::new(out.as_raw_fd(), posix::POLLIN),
        posix::PollFd::new(err.as_raw_fd(), posix::POLLIN),
    ];
    loop {
        match posix::poll(&mut fds, None) {
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::System { call: "poll", source: e }),
        }
    }
    check_valid(&fds)?;

    // HUP and ERR count as readable: the read that follows reports the
    // end of input or the error.
    let mask = posix::POLLIN | posix::POLLHUP | posix::POLLERR;
    Ok((fds[0].test(mask), fds[1].test(mask)))
}

fn wait_one_readable(source: &impl MuxSource) -> Result<()> {
    let mut fds = [posix::PollFd::new(source.as_raw_fd(), posix::POLLIN)];
    loop {
        match posix::poll(&mut fds, None) {
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::System { call: "poll", source: e }),
        }
    }
    check_valid(&fds)
}

// poll() flags a descriptor that is not open with POLLNVAL instead of
// failing the call.
fn check_valid(fds: &[posix::PollFd]) -> Result<()> {
    if fds.iter().any(|fd| fd.test(posix::POLLNVAL)) {
        return Err(Error::System {
            call: "poll",
            source: io::Error::from_raw_os_error(libc::EBADF),
        });
    }
    Ok(())
}

impl<O: fmt::Debug> fmt::Debug for Muxer<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Muxer")
            .field("observer", &self.observer)
            .finish()
    }
}
