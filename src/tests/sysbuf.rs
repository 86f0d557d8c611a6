use tempfile::TempDir;

use std::fs::{self, File};
use std::io::{BufRead, ErrorKind, Read, Write};
use std::os::unix::io::AsRawFd;
use std::thread;
use std::time::Duration;

use super::{pattern, set_nonblocking};
use crate::{DEFAULT_BUFFER_SIZE, Pipe, SystemBuf, UnbufferedReadStream};

fn write_then_read(len: usize) {
    let tmpdir = TempDir::new().unwrap();
    let path = tmpdir.path().join("data");
    let data = pattern(len);
    {
        let file = File::create(&path).unwrap();
        let mut buf = SystemBuf::with_capacity(file.as_raw_fd(), 1024);
        buf.write_all(&data).unwrap();
        buf.flush().unwrap();
    }
    assert_eq!(fs::read(&path).unwrap(), data);

    let file = File::open(&path).unwrap();
    let mut buf = SystemBuf::with_capacity(file.as_raw_fd(), 1024);
    let mut out = Vec::new();
    buf.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn short_write_read() {
    write_then_read(64);
}

#[test]
fn long_write_read() {
    write_then_read(65536);
}

#[test]
fn default_capacity() {
    let file = File::open("/dev/null").unwrap();
    assert_eq!(SystemBuf::new(file.as_raw_fd()).capacity(), DEFAULT_BUFFER_SIZE);
    assert_eq!(SystemBuf::with_capacity(file.as_raw_fd(), 0).capacity(), 1);
}

#[test]
fn read_is_bounded_by_capacity() {
    let tmpdir = TempDir::new().unwrap();
    let path = tmpdir.path().join("data");
    fs::write(&path, pattern(4096)).unwrap();

    let file = File::open(&path).unwrap();
    let mut buf = SystemBuf::with_capacity(file.as_raw_fd(), 1024);
    let mut chunk = [0u8; 4096];
    assert_eq!(buf.read(&mut chunk).unwrap(), 1024);
    assert_eq!(&chunk[..1024], &pattern(1024)[..]);
}

#[test]
fn write_accepts_at_most_capacity() {
    let tmpdir = TempDir::new().unwrap();
    let path = tmpdir.path().join("data");
    let file = File::create(&path).unwrap();
    let mut buf = SystemBuf::with_capacity(file.as_raw_fd(), 4);
    assert_eq!(buf.write(b"abcdefgh").unwrap(), 4);
    assert_eq!(buf.write(b"efgh").unwrap(), 4);
    drop(buf);
    assert_eq!(fs::read(&path).unwrap(), b"abcdefgh");
}

#[test]
fn flush_on_drop() {
    let tmpdir = TempDir::new().unwrap();
    let path = tmpdir.path().join("data");
    let file = File::create(&path).unwrap();
    {
        let mut buf = SystemBuf::new(file.as_raw_fd());
        buf.write_all(b"pending").unwrap();
        assert!(fs::read(&path).unwrap().is_empty());
    }
    assert_eq!(fs::read(&path).unwrap(), b"pending");
}

#[test]
fn pipe_round_trip() {
    let (mut rs, mut ws) = Pipe::new().unwrap().into_streams().unwrap();
    let data = pattern(200_000);
    let expected = data.clone();
    let writer = thread::spawn(move || {
        ws.write_all(&data).unwrap();
    });
    let mut out = Vec::new();
    rs.read_to_end(&mut out).unwrap();
    writer.join().unwrap();
    assert_eq!(out, expected);
}

#[test]
fn nonblocking_write_waits_for_reader() {
    // The buffer is larger than the pipe, so flushing it hits EAGAIN until
    // the reader starts draining.
    let (read_end, write_end) = Pipe::new().unwrap().into_ends();
    set_nonblocking(write_end.get().unwrap());
    let reader = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        let mut rs = UnbufferedReadStream::new(read_end).unwrap();
        let mut out = Vec::new();
        rs.read_to_end(&mut out).unwrap();
        out
    });
    let data = pattern(300_000);
    {
        let mut buf = SystemBuf::with_capacity(write_end.get().unwrap(), 100_000);
        buf.write_all(&data).unwrap();
        buf.flush().unwrap();
    }
    drop(write_end);
    assert_eq!(reader.join().unwrap(), data);
}

#[test]
fn unread_after_read() {
    let tmpdir = TempDir::new().unwrap();
    let path = tmpdir.path().join("data");
    fs::write(&path, "abc").unwrap();
    let file = File::open(&path).unwrap();
    let mut buf = SystemBuf::new(file.as_raw_fd());

    let mut byte = [0u8];
    buf.read_exact(&mut byte).unwrap();
    assert_eq!(&byte, b"a");
    buf.unread(b'a').unwrap();
    buf.read_exact(&mut byte).unwrap();
    assert_eq!(&byte, b"a");

    buf.unread(b'z').unwrap();
    let mut rest = String::new();
    buf.read_to_string(&mut rest).unwrap();
    assert_eq!(rest, "zbc");
}

#[test]
fn unread_before_read() {
    let file = File::open("/dev/null").unwrap();
    let mut buf = SystemBuf::new(file.as_raw_fd());
    buf.unread(b'x').unwrap();
    assert!(buf.has_buffered());
    let mut out = Vec::new();
    buf.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"x");
}

#[test]
fn unread_into_full_buffer() {
    let tmpdir = TempDir::new().unwrap();
    let path = tmpdir.path().join("data");
    fs::write(&path, "abcdefgh").unwrap();
    let file = File::open(&path).unwrap();
    let mut buf = SystemBuf::with_capacity(file.as_raw_fd(), 4);
    assert_eq!(buf.fill_buf().unwrap(), b"abcd");
    assert_eq!(buf.unread(b'_').unwrap_err().kind(), ErrorKind::Other);
}
