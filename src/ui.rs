//! Terminal output helpers for plan and execution rendering.

use anyhow::Result;
use colored::Colorize;
use stackkit::{ExecutionReport, OpKind, Plan};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Ask for the literal answer `yes`.
pub fn confirm_yes(prompt: &str) -> Result<bool> {
    let answer: String = dialoguer::Input::new()
        .with_prompt(format!("{prompt} Only 'yes' will be accepted"))
        .allow_empty(true)
        .interact_text()?;
    Ok(answer.trim() == "yes")
}

/// Render a plan as an operation list with a summary line.
pub fn render_plan(plan: &Plan, verbose: bool) {
    if plan.is_empty() {
        println!();
        success("No changes. Desired state matches the persisted state.");
        render_unchanged(plan, verbose);
        return;
    }

    println!();
    println!("{}", "Planned operations".bold());
    for op in &plan.operations {
        let symbol = match op.kind() {
            OpKind::Create => "+".green(),
            OpKind::Update => "~".yellow(),
            OpKind::Delete => "-".red(),
        };
        println!("  {} {:<8} {}", symbol, op.kind().to_string(), op.resource().description());

        if verbose
            && let stackkit::Operation::Update { diffs, .. } = op
        {
            for diff in diffs {
                println!("      {}", diff.to_string().dimmed());
            }
        }
    }

    let creates = plan.operations.iter().filter(|o| o.kind() == OpKind::Create).count();
    let updates = plan.operations.iter().filter(|o| o.kind() == OpKind::Update).count();
    let deletes = plan.operations.iter().filter(|o| o.kind() == OpKind::Delete).count();
    println!();
    println!(
        "  {} to create, {} to update, {} to delete",
        creates.to_string().green(),
        updates.to_string().yellow(),
        deletes.to_string().red()
    );

    render_unchanged(plan, verbose);
}

fn render_unchanged(plan: &Plan, verbose: bool) {
    if !verbose {
        return;
    }
    if let Some(diagnostics) = &plan.diagnostics
        && !diagnostics.unchanged.is_empty()
    {
        println!();
        for id in &diagnostics.unchanged {
            println!("  {} {} unchanged", "○".dimmed(), id.dimmed());
        }
    }
}

/// Render per-operation results and the closing summary line.
pub fn render_report(report: &ExecutionReport) {
    println!();
    for result in &report.results {
        let op = &result.operation;
        if result.success {
            println!(
                "  {} {} {}",
                "✓".green(),
                op.kind(),
                op.resource().description()
            );
        } else {
            println!(
                "  {} {} {}: {}",
                "✗".red(),
                op.kind(),
                op.resource().description(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    println!();
    println!(
        "Successful: {} / Failed: {} / Total: {}",
        report.successful(),
        report.failed(),
        report.total()
    );
}
