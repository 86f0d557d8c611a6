use std::io::Write;
use std::os::unix::io::RawFd;

use crate::error::Result;
use crate::sysbuf::SystemBuf;

/// Final state of one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
    Skipped(String),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// Writer of outcome records on the results descriptor.
///
/// The descriptor is borrowed: it is commonly the process's own stdout and
/// is never closed here.  Each record is one line and is flushed as soon as
/// it is complete:
///
/// ```text
/// tcs-count: 2
/// tc-start: first
/// tc-end: first, passed
/// tc-start: second
/// tc-end: second, failed, expected 3, got 4
/// ```
#[derive(Debug)]
pub struct ResultsWriter {
    buf: SystemBuf,
}

impl ResultsWriter {
    pub fn new(fd: RawFd) -> ResultsWriter {
        ResultsWriter {
            buf: SystemBuf::new(fd),
        }
    }

    pub fn tcs_count(&mut self, count: usize) -> Result<()> {
        self.record(format_args!("tcs-count: {}", count))
    }

    pub fn tc_start(&mut self, ident: &str) -> Result<()> {
        self.record(format_args!("tc-start: {}", ident))
    }

    pub fn tc_end(&mut self, ident: &str, outcome: &Outcome) -> Result<()> {
        match outcome {
            Outcome::Passed => self.record(format_args!("tc-end: {}, passed", ident)),
            Outcome::Failed(reason) => {
                self.record(format_args!("tc-end: {}, failed, {}", ident, one_line(reason)))
            }
            Outcome::Skipped(reason) => {
                self.record(format_args!("tc-end: {}, skipped, {}", ident, one_line(reason)))
            }
        }
    }

    fn record(&mut self, args: std::fmt::Arguments<'_>) -> Result<()> {
        self.buf.write_fmt(args)?;
        self.buf.write_all(b"\n")?;
        self.buf.flush()?;
        Ok(())
    }
}

// A reason must not break the one-record-per-line format.
fn one_line(reason: &str) -> String {
    reason.replace('\n', "<<NEWLINE>>")
}
