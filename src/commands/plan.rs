//! `drft plan` - show the operations an apply would perform.

use anyhow::{Context, Result};
use stackkit::Stack;

use crate::ui;

pub fn run(stack: &Stack, json: bool, verbose: bool) -> Result<i32> {
    let plan = stack.plan(verbose).context("planning failed")?;

    if json {
        let rendered = plan.to_json(stack.registry())?;
        println!("{}", serde_json::to_string_pretty(&rendered)?);
        return Ok(0);
    }

    ui::render_plan(&plan, verbose);
    Ok(0)
}
