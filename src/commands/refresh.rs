//! `drft refresh` - overwrite the persisted state with what providers
//! actually observe, without mutating any external system.

use anyhow::{Context, Result};
use colored::Colorize;
use stackkit::Stack;

use crate::ui;

pub fn run(stack: &Stack, _verbose: bool) -> Result<i32> {
    let refreshed = stack.refresh().context("refresh failed")?;

    println!();
    for id in &refreshed {
        println!("  {} {}", "↻".cyan(), id);
    }
    ui::success(&format!("Refreshed {} resources", refreshed.len()));
    Ok(0)
}
