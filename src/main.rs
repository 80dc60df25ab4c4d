//! `drft` launcher.
//!
//! The engine itself cannot know a user's resources; those live in a stack
//! program the user builds against the `drft` library. This binary finds
//! that program in a few well-known paths and executes it, forwarding its
//! own arguments verbatim.

use std::path::PathBuf;
use std::process::{Command, ExitCode, Stdio};

use anyhow::{Context, Result};
use colored::Colorize;

const STACK_PROGRAM_PATHS: &[&str] = &[
    ".drft/stack",
    "./drft-stack",
    "target/debug/drft-stack",
    "target/release/drft-stack",
];

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "✗".red());
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let program = discover_stack_program().with_context(|| {
        format!(
            "no stack program found; build a binary that calls drft::run with your stack \
             and place it at one of: {}",
            STACK_PROGRAM_PATHS.join(", ")
        )
    })?;

    let status = Command::new(&program)
        .args(std::env::args_os().skip(1))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("failed to execute {}", program.display()))?;

    Ok(ExitCode::from(status.code().unwrap_or(1).clamp(0, 255) as u8))
}

fn discover_stack_program() -> Option<PathBuf> {
    STACK_PROGRAM_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}
