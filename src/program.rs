//! The test-program side: a set of named test cases, the command line that
//! selects and runs them, and the records they report.

use std::any::Any;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{self, Write};
use std::os::unix::io::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::{CommandFactory, FromArgMatches, Parser};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::glob;
use crate::results::{Outcome, ResultsWriter};

/// Body of a test case.
pub type CaseBody = fn(&CaseContext<'_>) -> Outcome;

/// A named, described test case.
#[derive(Clone)]
pub struct TestCase {
    ident: String,
    descr: String,
    body: CaseBody,
}

impl TestCase {
    pub fn new(ident: impl Into<String>, descr: impl Into<String>, body: CaseBody) -> TestCase {
        TestCase {
            ident: ident.into(),
            descr: descr.into(),
            body,
        }
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }

    pub fn descr(&self) -> &str {
        &self.descr
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("ident", &self.ident)
            .field("descr", &self.descr)
            .finish_non_exhaustive()
    }
}

/// Configuration variables set with `-v var=value`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Config {
    vars: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn has(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Split a `var=value` assignment.  The value may be empty and may
    /// itself contain `=`; the name may not be empty.
    ///
    /// # Errors
    ///
    /// `Error::Usage` if there is no `=` or the name is empty.
    pub fn parse_assignment(assignment: &str) -> Result<(String, String)> {
        match assignment.split_once('=') {
            Some((name, value)) if !name.is_empty() => Ok((name.to_owned(), value.to_owned())),
            _ => Err(Error::Usage(format!(
                "Invalid variable assignment '{}'; must be of the form var=value.",
                assignment
            ))),
        }
    }
}

impl FromIterator<(String, String)> for Config {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Config {
        Config {
            vars: iter.into_iter().collect(),
        }
    }
}

/// What a running test case can see of its environment.
#[derive(Debug)]
pub struct CaseContext<'a> {
    ident: &'a str,
    config: &'a Config,
    srcdir: &'a Path,
}

impl CaseContext<'_> {
    pub fn ident(&self) -> &str {
        self.ident
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    /// Shorthand for `config().get(name)`.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.config.get(name)
    }

    /// Directory holding the test's data files.
    pub fn srcdir(&self) -> &Path {
        self.srcdir
    }
}

/// Identity of the running program, used in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramContext {
    progname: String,
}

impl ProgramContext {
    pub fn new(progname: impl Into<String>) -> ProgramContext {
        ProgramContext {
            progname: progname.into(),
        }
    }

    /// Derive the program name from `argv[0]`, dropping any directory.
    pub fn from_argv0(argv0: &OsStr) -> ProgramContext {
        let name = Path::new(argv0)
            .file_name()
            .unwrap_or(argv0)
            .to_string_lossy()
            .into_owned();
        ProgramContext::new(name)
    }

    pub fn progname(&self) -> &str {
        &self.progname
    }
}

#[derive(Debug, Parser)]
#[command(
    disable_version_flag = true,
    about = "This is an independent test program.",
    after_help = "Positional arguments are glob patterns selecting test cases; `*' and `?' \
                  are the only meta-characters."
)]
struct Options {
    /// List test cases and their purpose
    #[arg(short = 'l')]
    list: bool,

    /// The file descriptor to which the test program will send the results
    /// of the test cases
    #[arg(short = 'r', value_name = "fd", default_value = "1", value_parser = parse_results_fd)]
    results_fd: RawFd,

    /// Directory where the test's data files are located
    #[arg(short = 's', value_name = "srcdir", default_value = ".")]
    srcdir: PathBuf,

    /// Sets the configuration variable `var' to `value'
    #[arg(short = 'v', value_name = "var=value", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    #[arg(value_name = "test_case", default_value = "*")]
    patterns: Vec<String>,
}

fn parse_results_fd(arg: &str) -> std::result::Result<RawFd, String> {
    match arg.as_bytes() {
        [digit] if digit.is_ascii_digit() => Ok(RawFd::from(digit - b'0')),
        _ => Err("Invalid value for -r; must be a single digit.".to_owned()),
    }
}

fn parse_var(arg: &str) -> std::result::Result<(String, String), String> {
    Config::parse_assignment(arg).map_err(|e| e.to_string())
}

/// A test program: its identity and the test cases it contains.
#[derive(Debug, Clone)]
pub struct TestProgram {
    ctx: ProgramContext,
    cases: Vec<TestCase>,
}

impl TestProgram {
    pub fn new(ctx: ProgramContext) -> TestProgram {
        TestProgram { ctx, cases: vec![] }
    }

    /// Register a test case.
    ///
    /// # Panics
    ///
    /// If a test case with the same identifier is already registered.
    pub fn add(&mut self, case: TestCase) {
        assert!(
            self.cases.iter().all(|c| c.ident != case.ident),
            "duplicate test case identifier {:?}",
            case.ident
        );
        self.cases.push(case);
    }

    /// Builder form of [`add`](Self::add).
    pub fn with_case(mut self, case: TestCase) -> TestProgram {
        self.add(case);
        self
    }

    pub fn context(&self) -> &ProgramContext {
        &self.ctx
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Select the test cases matching any of `patterns`.
    ///
    /// Patterns without meta-characters must match an identifier exactly.
    /// Cases come out in the order the patterns select them, each at most
    /// once; within one pattern, registration order is kept.
    pub fn filter<S: AsRef<str>>(&self, patterns: &[S]) -> Vec<&TestCase> {
        let mut selected: Vec<&TestCase> = vec![];
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let mut matched = false;
            for case in &self.cases {
                let hit = if glob::is_glob(pattern) {
                    glob::matches_glob(pattern, &case.ident)
                } else {
                    pattern == case.ident
                };
                if !hit {
                    continue;
                }
                matched = true;
                if !selected.iter().any(|c| c.ident == case.ident) {
                    selected.push(case);
                }
            }
            if !matched {
                warn!(pattern, "pattern matches no test case");
            }
        }
        selected
    }

    /// Print the selected test cases, one per line: the identifier padded
    /// to four columns past the longest one, then the description.
    pub fn list<S: AsRef<str>>(&self, patterns: &[S], out: &mut impl Write) -> io::Result<()> {
        let selected = self.filter(patterns);
        let col = selected.iter().map(|c| c.ident.len()).max().unwrap_or(0) + 4;
        for case in selected {
            let line = format!("{:<col$}{}", case.ident, case.descr, col = col);
            writeln!(out, "{}", line.trim_end())?;
        }
        Ok(())
    }

    /// Run `selected` in order and report each outcome to `results`.
    ///
    /// A body that panics counts as failed.  Standard output and error are
    /// flushed before each end record so captured output precedes it.
    /// Returns the number of failed test cases.
    pub fn run(
        &self,
        selected: &[&TestCase],
        config: &Config,
        srcdir: &Path,
        results: &mut ResultsWriter,
    ) -> Result<usize> {
        results.tcs_count(selected.len())?;
        let mut failed = 0;
        for case in selected {
            debug!(ident = %case.ident, "running test case");
            results.tc_start(&case.ident)?;
            let ctx = CaseContext {
                ident: &case.ident,
                config,
                srcdir,
            };
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| (case.body)(&ctx))) {
                Ok(outcome) => outcome,
                Err(payload) => Outcome::Failed(format!("panicked: {}", panic_message(&*payload))),
            };
            io::stdout().flush()?;
            io::stderr().flush()?;
            debug!(ident = %case.ident, ?outcome, "test case finished");
            if outcome.is_failure() {
                failed += 1;
            }
            results.tc_end(&case.ident, &outcome)?;
        }
        Ok(failed)
    }

    /// Command-line entry point.  `args` includes `argv[0]`.
    ///
    /// Returns the process exit code: 0 when no selected test case failed
    /// (and for `-h` and `-l`), 1 on any failure or usage error.
    pub fn main<I, T>(&self, args: I) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match self.try_main(args) {
            Ok(code) => code,
            Err(Error::Usage(msg)) => {
                self.usage_error(&msg);
                1
            }
            Err(e) => {
                eprintln!("{}: ERROR: {}", self.ctx.progname, e);
                1
            }
        }
    }

    fn try_main<I, T>(&self, args: I) -> Result<i32>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let Some(options) = self.parse_options(args)? else {
            return Ok(0);
        };
        if options.list {
            self.list(&options.patterns, &mut io::stdout().lock())?;
            return Ok(0);
        }

        let config: Config = options.vars.into_iter().collect();
        let selected = self.filter(&options.patterns);
        let mut results = ResultsWriter::new(options.results_fd);
        let failed = self.run(&selected, &config, &options.srcdir, &mut results)?;
        debug!(selected = selected.len(), failed, "test program done");
        Ok(if failed > 0 { 1 } else { 0 })
    }

    /// Returns `None` when help was requested and printed.
    fn parse_options<I, T>(&self, args: I) -> Result<Option<Options>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let command = Options::command().bin_name(self.ctx.progname.clone());
        let matches = match command.try_get_matches_from(args) {
            Ok(matches) => matches,
            Err(e) if e.kind() == ErrorKind::DisplayHelp => {
                e.print()?;
                return Ok(None);
            }
            Err(e) => return Err(Error::Usage(clap_message(&e))),
        };
        let options =
            Options::from_arg_matches(&matches).map_err(|e| Error::Usage(clap_message(&e)))?;
        Ok(Some(options))
    }

    fn usage_error(&self, msg: &str) {
        let prog = &self.ctx.progname;
        eprintln!("{}: ERROR: {}", prog, msg);
        eprintln!("{}: Type `{} -h' for more details.", prog, prog);
    }
}

// First line of a clap error, without its "error: " tag.
fn clap_message(e: &clap::Error) -> String {
    let rendered = e.to_string();
    let first = rendered.lines().next().unwrap_or_default();
    first.strip_prefix("error: ").unwrap_or(first).to_owned()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
