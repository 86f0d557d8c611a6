mod handle;
mod stream;
mod sysbuf;

use std::os::unix::io::RawFd;

use crate::{
    Config, Error, ExitStatus, FileHandle, LineCollector, Outcome, Pipe, ReadStream, SystemBuf,
    TestProcess, TestProgram, UnbufferedReadStream, WriteStream,
};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn public_types_are_send_and_sync() {
    assert_send_sync::<FileHandle>();
    assert_send_sync::<SystemBuf>();
    assert_send_sync::<ReadStream>();
    assert_send_sync::<UnbufferedReadStream>();
    assert_send_sync::<WriteStream>();
    assert_send_sync::<Pipe>();
    assert_send_sync::<LineCollector>();
    assert_send_sync::<TestProcess>();
    assert_send_sync::<ExitStatus>();
    assert_send_sync::<Error>();
    assert_send_sync::<TestProgram>();
    assert_send_sync::<Config>();
    assert_send_sync::<Outcome>();
}

/// `len` bytes cycling through `A`..=`Z`.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'A' + (i % 26) as u8).collect()
}

/// Put `fd` in non-blocking mode.
pub fn set_nonblocking(fd: RawFd) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        assert!(flags >= 0);
        assert_eq!(libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK), 0);
    }
}
