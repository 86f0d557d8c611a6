//! Process I/O core of a test-program harness.
//!
//! The crate provides the plumbing a harness needs to run a test program and
//! capture what it prints, and the pieces a test program needs to report
//! its results:
//!
//! * [`FileHandle`], the exclusive owner of one OS descriptor, which can be
//!   remapped onto a fixed descriptor number before `exec`;
//! * [`SystemBuf`], a buffered byte stream over a borrowed descriptor, and
//!   the directional [`ReadStream`], [`UnbufferedReadStream`] and
//!   [`WriteStream`] built on it;
//! * [`Pipe`], a close-on-exec pipe whose ends are owned handles;
//! * [`Muxer`], which drains a child's stdout and stderr from one thread
//!   and delivers them to a [`MuxObserver`] as whole lines;
//! * [`TestProcess`], which runs a program with both channels captured;
//! * [`TestProgram`] and [`ResultsWriter`], the test-program side: case
//!   selection by glob, the command line, and the result records.
//!
//! # Example
//!
//! ```no_run
//! use tpio::{LineCollector, TestProcess};
//!
//! let (status, lines) = TestProcess::new(&["sh", "-c", "echo out; echo err >&2"])
//!     .run(LineCollector::new())?;
//! assert!(status.success());
//! assert_eq!(lines.stdout, ["out"]);
//! assert_eq!(lines.stderr, ["err"]);
//! # Ok::<(), tpio::Error>(())
//! ```
//!
//! The crate is Unix-only.

#![warn(missing_debug_implementations, rust_2018_idioms)]

mod error;
mod handle;
mod muxer;
mod pipe;
mod posix;
mod process;
mod results;
mod stream;
mod sysbuf;

pub mod glob;
pub mod logging;
pub mod program;

pub use error::{Error, Result};
pub use handle::FileHandle;
pub use muxer::{Channel, LineCollector, MuxObserver, MuxSource, Muxer};
pub use pipe::Pipe;
pub use process::{ExitStatus, TestProcess};
pub use program::{CaseContext, Config, ProgramContext, TestCase, TestProgram};
pub use results::{Outcome, ResultsWriter};
pub use stream::{ReadStream, UnbufferedReadStream, WriteStream};
pub use sysbuf::{DEFAULT_BUFFER_SIZE, SystemBuf};

#[cfg(test)]
mod tests;
