use std::env;
use std::process;

use tpio::logging::init_logging;
use tpio::{CaseContext, Outcome, ProgramContext, TestCase, TestProgram};

fn pass(_ctx: &CaseContext<'_>) -> Outcome {
    println!("hello from pass");
    Outcome::Passed
}

fn fail(_ctx: &CaseContext<'_>) -> Outcome {
    eprintln!("about to fail");
    Outcome::Failed("expected 3, got 4".to_owned())
}

fn skip_unless_enabled(ctx: &CaseContext<'_>) -> Outcome {
    match ctx.var("enabled") {
        Some("yes") => Outcome::Passed,
        _ => Outcome::Skipped("enabled is not set to yes".to_owned()),
    }
}

fn partial_line(_ctx: &CaseContext<'_>) -> Outcome {
    print!("no newline at the end");
    Outcome::Passed
}

fn main() {
    init_logging();
    let argv0 = env::args_os().next().unwrap_or_else(|| "sample".into());
    let program = TestProgram::new(ProgramContext::from_argv0(&argv0))
        .with_case(TestCase::new("pass", "Prints a line and passes", pass))
        .with_case(TestCase::new("fail", "Prints to stderr and fails", fail))
        .with_case(TestCase::new(
            "skip_unless_enabled",
            "Passes only when enabled=yes",
            skip_unless_enabled,
        ))
        .with_case(TestCase::new(
            "partial_line",
            "Prints output without a trailing newline",
            partial_line,
        ));
    process::exit(program.main(env::args_os()));
}
