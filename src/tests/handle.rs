use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd};

use crate::{Error, FileHandle, Pipe, UnbufferedReadStream, WriteStream};

fn devnull() -> FileHandle {
    FileHandle::from(File::open("/dev/null").unwrap())
}

fn read_all(handle: FileHandle) -> Vec<u8> {
    let mut out = Vec::new();
    UnbufferedReadStream::new(handle)
        .unwrap()
        .read_to_end(&mut out)
        .unwrap();
    out
}

#[test]
fn empty_handle() {
    let h = FileHandle::new();
    assert!(!h.is_valid());
    assert!(matches!(h.get(), Err(Error::InvalidHandle)));
    assert_eq!(h.as_raw_fd(), -1);

    let h = FileHandle::default();
    assert!(!h.is_valid());
}

#[test]
fn adopt_descriptor() {
    let file = File::open("/dev/null").unwrap();
    let fd = file.as_raw_fd();
    let h = FileHandle::from(file);
    assert!(h.is_valid());
    assert_eq!(h.get().unwrap(), fd);
    assert_eq!(h.as_raw_fd(), fd);
}

#[test]
fn take_moves_ownership() {
    let mut a = devnull();
    let fd = a.get().unwrap();
    let b = a.take();
    assert!(!a.is_valid());
    assert_eq!(b.get().unwrap(), fd);

    // Taking from an empty handle yields another empty handle.
    let c = a.take();
    assert!(!c.is_valid());
}

#[test]
fn transfer_closes_previous() {
    let (read_end, write_end) = Pipe::new().unwrap().into_ends();
    let mut target = write_end;
    let mut source = devnull();
    let fd = source.get().unwrap();
    source.transfer_to(&mut target);
    assert!(!source.is_valid());
    assert_eq!(target.get().unwrap(), fd);
    // The pipe's only write end is gone.
    assert!(read_all(read_end).is_empty());
}

#[test]
fn drop_closes() {
    let (read_end, write_end) = Pipe::new().unwrap().into_ends();
    drop(write_end);
    assert!(read_all(read_end).is_empty());
}

#[test]
fn disown_leaves_open() {
    let (read_end, mut write_end) = Pipe::new().unwrap().into_ends();
    let fd = write_end.disown().unwrap();
    assert!(!write_end.is_valid());
    drop(write_end);

    let mut ws = WriteStream::new(unsafe { FileHandle::from_raw_fd(fd) }).unwrap();
    ws.write_all(b"still open").unwrap();
    drop(ws);
    assert_eq!(read_all(read_end), b"still open");

    assert!(matches!(
        FileHandle::new().disown(),
        Err(Error::InvalidHandle)
    ));
}

#[test]
fn into_raw_fd_releases() {
    let (read_end, write_end) = Pipe::new().unwrap().into_ends();
    let fd = write_end.into_raw_fd();
    let mut ws = WriteStream::new(unsafe { FileHandle::from_raw_fd(fd) }).unwrap();
    ws.write_all(b"x").unwrap();
    drop(ws);
    assert_eq!(read_all(read_end), b"x");
}

#[test]
fn remap_moves_descriptor() {
    // A number this test owns, so concurrently running tests are unaffected.
    let target = File::open("/dev/null").unwrap().into_raw_fd();
    let (read_end, mut write_end) = Pipe::new().unwrap().into_ends();
    assert_ne!(write_end.get().unwrap(), target);

    write_end.remap(target).unwrap();
    assert_eq!(write_end.get().unwrap(), target);

    let mut ws = WriteStream::new(write_end).unwrap();
    ws.write_all(b"remapped").unwrap();
    drop(ws);
    assert_eq!(read_all(read_end), b"remapped");
}

#[test]
fn remap_onto_itself() {
    let (read_end, mut write_end) = Pipe::new().unwrap().into_ends();
    let fd = write_end.get().unwrap();
    write_end.remap(fd).unwrap();
    assert_eq!(write_end.get().unwrap(), fd);

    let mut ws = WriteStream::new(write_end).unwrap();
    ws.write_all(b"same").unwrap();
    drop(ws);
    assert_eq!(read_all(read_end), b"same");
}

#[test]
fn remap_empty() {
    assert!(matches!(
        FileHandle::new().remap(100),
        Err(Error::InvalidHandle)
    ));
}
