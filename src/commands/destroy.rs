//! `drft destroy` - delete every managed resource.

use anyhow::{Context, Result};
use stackkit::Stack;

use crate::ui;

pub fn run(stack: &Stack, auto_approve: bool, verbose: bool) -> Result<i32> {
    let plan = stack.destroy_plan(verbose).context("planning failed")?;
    ui::render_plan(&plan, verbose);

    if plan.is_empty() {
        return Ok(0);
    }

    if !auto_approve && !ui::confirm_yes("Destroy these resources?")? {
        println!();
        ui::warn("Destroy cancelled");
        return Ok(1);
    }

    let report = stack.apply(&plan).context("destroy failed")?;
    ui::render_report(&report);
    Ok(if report.success() { 0 } else { 1 })
}
