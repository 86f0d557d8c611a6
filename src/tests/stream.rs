use std::io::{Read, Write};

use crate::{Error, FileHandle, Pipe, ReadStream, UnbufferedReadStream, WriteStream};

#[test]
fn tokens_through_pipe() {
    let (mut rs, mut ws) = Pipe::new().unwrap().into_streams().unwrap();
    ws.write_all(b"1Test 1message\n").unwrap();
    drop(ws);
    assert_eq!(rs.read_token().unwrap().as_deref(), Some("1Test"));
    assert_eq!(rs.read_token().unwrap().as_deref(), Some("1message"));
    assert_eq!(rs.read_token().unwrap(), None);
}

#[test]
fn token_leaves_delimiter() {
    let (mut rs, mut ws) = Pipe::new().unwrap().into_streams().unwrap();
    ws.write_all(b"  word\nrest of line\n").unwrap();
    drop(ws);
    assert_eq!(rs.read_token().unwrap().as_deref(), Some("word"));
    assert_eq!(rs.read_line().unwrap().as_deref(), Some(""));
    assert_eq!(rs.read_line().unwrap().as_deref(), Some("rest of line"));
}

#[test]
fn lines_through_pipe() {
    let (mut rs, mut ws) = Pipe::new().unwrap().into_streams().unwrap();
    ws.write_all(b"first\nsecond\n\nlast").unwrap();
    drop(ws);
    assert_eq!(rs.read_line().unwrap().as_deref(), Some("first"));
    assert_eq!(rs.read_line().unwrap().as_deref(), Some("second"));
    assert_eq!(rs.read_line().unwrap().as_deref(), Some(""));
    assert_eq!(rs.read_line().unwrap().as_deref(), Some("last"));
    assert_eq!(rs.read_line().unwrap(), None);
}

#[test]
fn streams_own_pipe_ends() {
    let pipe = Pipe::new().unwrap();
    let read_fd = pipe.read_end.get().unwrap();
    let write_fd = pipe.write_end.get().unwrap();
    let (rs, ws) = pipe.into_streams().unwrap();
    assert_eq!(rs.handle().get().unwrap(), read_fd);
    assert_eq!(ws.handle().get().unwrap(), write_fd);
}

#[test]
fn empty_handle_rejected() {
    assert!(matches!(
        ReadStream::new(FileHandle::new()),
        Err(Error::InvalidHandle)
    ));
    assert!(matches!(
        UnbufferedReadStream::new(FileHandle::new()),
        Err(Error::InvalidHandle)
    ));
    assert!(matches!(
        WriteStream::new(FileHandle::new()),
        Err(Error::InvalidHandle)
    ));
}

#[test]
fn write_stream_into_handle_flushes() {
    let (read_end, write_end) = Pipe::new().unwrap().into_ends();
    let mut ws = WriteStream::new(write_end).unwrap();
    ws.write_all(b"buffered").unwrap();
    let write_end = ws.into_handle().unwrap();
    drop(write_end);

    let mut rs = ReadStream::new(read_end).unwrap();
    assert_eq!(rs.read_line().unwrap().as_deref(), Some("buffered"));
}

#[test]
fn unbuffered_reads_what_is_there() {
    let (read_end, write_end) = Pipe::new().unwrap().into_ends();
    let mut ws = WriteStream::new(write_end).unwrap();
    ws.write_all(b"abc").unwrap();
    ws.flush().unwrap();

    let mut rs = UnbufferedReadStream::new(read_end).unwrap();
    let mut buf = [0u8; 100];
    assert_eq!(rs.read(&mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], b"abc");

    drop(ws);
    assert_eq!(rs.read(&mut buf).unwrap(), 0);
}

#[test]
fn invalid_utf8_line() {
    let (mut rs, mut ws) = Pipe::new().unwrap().into_streams().unwrap();
    ws.write_all(b"a\xffb\n").unwrap();
    drop(ws);
    assert_eq!(rs.read_line().unwrap().as_deref(), Some("a\u{FFFD}b"));
}
