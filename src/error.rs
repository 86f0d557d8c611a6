use std::io;

use thiserror::Error;

/// Errors produced by the process I/O core.
#[derive(Debug, Error)]
pub enum Error {
    /// The operation needs a descriptor, but the handle owns none.
    #[error("invalid file handle")]
    InvalidHandle,

    /// A system call failed: pipe allocation, descriptor remapping, `poll`,
    /// a raw `read`/`write`, `fork`, `exec` and the like.
    #[error("{call} failed: {source}")]
    System {
        call: &'static str,
        source: io::Error,
    },

    /// A buffered read or write failed after `EINTR` retries.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The test program's command line could not be understood.
    #[error("{0}")]
    Usage(String),
}

impl Error {
    /// Adapter for `map_err` that tags an OS error with the failing call.
    pub fn system(call: &'static str) -> impl FnOnce(io::Error) -> Error {
        move |source| Error::System { call, source }
    }

    /// The OS error number behind this error, if there is one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::System { source, .. } | Error::Io(source) => source.raw_os_error(),
            Error::InvalidHandle | Error::Usage(_) => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        match e {
            Error::InvalidHandle => io::Error::new(io::ErrorKind::InvalidInput, e),
            Error::System { source, .. } | Error::Io(source) => source,
            Error::Usage(_) => io::Error::new(io::ErrorKind::InvalidInput, e),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
