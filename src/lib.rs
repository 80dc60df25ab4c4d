//! # drft
//!
//! CLI front-end for [`stackkit`] stacks.
//!
//! A stack definition is ordinary Rust: build a [`Stack`], register your
//! record types, add providers and resources, then hand control to
//! [`run`]. The resulting binary understands `plan`, `apply`, `destroy`
//! and `refresh`, with the exit codes scripts expect (0 on success, 1 when
//! an operation failed or the user declined).
//!
//! ```ignore
//! fn main() -> ! {
//!     let mut stack = drft::Stack::new("prod", drft::StateStore::new(".drft/state.json"));
//!     // register types, add providers and resources...
//!     drft::run(&stack)
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod ui;

use std::ffi::OsString;

use clap::Parser;

pub use stackkit::{
    self, DependentResource, ExecutionReport, OpKind, Operation, Plan, Provider, Resource,
    ResourceRef, ResourceState, Stack, StateStore,
};

use cli::{Cli, Command};

/// Parse `args` and run the matching subcommand against the stack.
///
/// Returns the process exit code instead of exiting, so stack programs and
/// tests can wrap it.
pub fn run_with_args<I, T>(stack: &Stack, args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.exit_code() == 0 { 0 } else { 2 };
        }
    };

    init_logging(cli.verbose);
    let verbose = cli.verbose > 0;

    let result = match cli.command {
        Command::Plan { json } => commands::plan::run(stack, json, verbose),
        Command::Apply { auto_approve } => commands::apply::run(stack, auto_approve, verbose),
        Command::Destroy { auto_approve } => commands::destroy::run(stack, auto_approve, verbose),
        Command::Refresh => commands::refresh::run(stack, verbose),
        Command::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "drft", &mut std::io::stdout());
            Ok(0)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            1
        }
    }
}

/// Run against the current process arguments and exit.
pub fn run(stack: &Stack) -> ! {
    let code = run_with_args(stack, std::env::args_os());
    std::process::exit(code);
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    // try_init: stack programs may run several commands in one process.
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .try_init();
}
