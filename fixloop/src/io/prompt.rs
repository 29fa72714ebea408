//! Repair prompt builder.
//!
//! Renders a fixed template embedding the implementation, the read-only
//! tests, and the latest test result. Output is a pure function of the
//! inputs: no timestamps, no environment lookups, and the result is
//! serialized with a stable field order.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::types::TestExecutionResult;

const REPAIR_TEMPLATE: &str = include_str!("prompts/repair.md");

/// Everything needed to render one repair prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub source_path: &'a Path,
    pub test_path: &'a Path,
    /// Current implementation contents (code to modify).
    pub source: &'a str,
    /// Test file contents (reference only).
    pub tests: &'a str,
    /// Latest test result (diagnostic evidence).
    pub result: &'a TestExecutionResult,
    /// Code-fence tag for the source language.
    pub fence: &'a str,
}

/// A rendered prompt ready to send to the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairPrompt {
    content: String,
}

impl RepairPrompt {
    pub fn as_str(&self) -> &str {
        &self.content
    }
}

impl From<String> for RepairPrompt {
    fn from(content: String) -> Self {
        Self { content }
    }
}

/// Render the repair prompt for the given inputs.
pub fn build_repair_prompt(inputs: &PromptInputs<'_>) -> Result<RepairPrompt> {
    let results = inputs
        .result
        .to_pretty_json()
        .context("serialize test result")?;

    let mut env = Environment::new();
    env.add_template("repair", REPAIR_TEMPLATE)
        .context("load repair template")?;
    let template = env.get_template("repair").context("get repair template")?;
    let content = template
        .render(context! {
            source_path => inputs.source_path.display().to_string(),
            test_path => inputs.test_path.display().to_string(),
            source => inputs.source,
            source_fence => fence_for(inputs.source),
            tests => inputs.tests,
            tests_fence => fence_for(inputs.tests),
            results_fence => fence_for(&results),
            results => results,
            fence => inputs.fence,
        })
        .context("render repair prompt")?;

    Ok(RepairPrompt { content })
}

/// Backtick fence one longer than the longest backtick run in `payload`
/// (at least three), so the payload cannot close its own block.
fn fence_for(payload: &str) -> String {
    let longest = payload
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}
