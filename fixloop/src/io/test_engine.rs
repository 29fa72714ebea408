//! Test engine abstraction and the command-backed adapter.
//!
//! The [`TestEngine`] trait decouples the repair loop from the concrete test
//! runner (vitest by default). Tests use scripted engines that return queued
//! results without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::types::TestExecutionResult;
use crate::io::config::TestConfig;
use crate::io::process::{expand_args, run_with_timeout};

const REPORT_SCHEMA: &str = include_str!("../../schemas/test_report.schema.json");

/// Bytes of engine output quoted in errors when no report was produced.
const ERROR_TAIL_BYTES: usize = 2_000;

/// Parameters for one test run.
#[derive(Debug, Clone)]
pub struct TestRequest {
    /// Working directory the engine runs in.
    pub workdir: PathBuf,
    /// The single test file to run.
    pub test_path: PathBuf,
    pub timeout: Duration,
}

/// Runs a test file once, non-interactively, and returns its structured result.
///
/// An `Err` means the engine itself could not run or report; failing tests are
/// an `Ok` result with a non-zero failed-suite count.
pub trait TestEngine {
    fn run(&self, request: &TestRequest) -> Result<TestExecutionResult>;
}

/// Engine that spawns a configured command and reads back its JSON report.
#[derive(Debug, Clone)]
pub struct CommandTestEngine {
    config: TestConfig,
}

impl CommandTestEngine {
    pub fn new(config: TestConfig) -> Self {
        Self { config }
    }
}

impl TestEngine for CommandTestEngine {
    #[instrument(skip_all, fields(test = %request.test_path.display(), timeout_secs = request.timeout.as_secs()))]
    fn run(&self, request: &TestRequest) -> Result<TestExecutionResult> {
        let report_path = request.workdir.join(&self.config.report_path);
        remove_report(&report_path)?;

        let test_arg = request.test_path.to_string_lossy();
        let report_arg = report_path.to_string_lossy();
        let args = expand_args(
            &self.config.command,
            &[("test", test_arg.as_ref()), ("report", report_arg.as_ref())],
        );
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| anyhow!("test command is empty"))?;

        info!(program = %program, "running test engine");
        let mut cmd = Command::new(program);
        cmd.args(rest).current_dir(&request.workdir);
        let output = run_with_timeout(cmd, request.timeout, self.config.output_limit_bytes)
            .context("start test engine")?;

        if output.timed_out {
            bail!("test engine timed out after {:?}", request.timeout);
        }
        if !report_path.exists() {
            bail!(
                "test engine produced no report at {} (exit status {:?}):\n{}",
                report_path.display(),
                output.status.code(),
                output.tail(ERROR_TAIL_BYTES)
            );
        }

        let raw = fs::read_to_string(&report_path)
            .with_context(|| format!("read test report {}", report_path.display()))?;
        remove_report(&report_path)?;

        let result = parse_report(&raw)
            .with_context(|| format!("parse test report {}", report_path.display()))?;
        debug!(
            exit_code = ?output.status.code(),
            total = result.num_total_test_suites,
            failed = result.num_failed_test_suites,
            "test engine finished"
        );
        Ok(result)
    }
}

/// Parse an engine JSON report after checking it against the report schema.
pub fn parse_report(raw: &str) -> Result<TestExecutionResult> {
    let report: Value = serde_json::from_str(raw).context("parse report json")?;
    let schema: Value = serde_json::from_str(REPORT_SCHEMA).context("parse report schema")?;
    validate_schema(&report, &schema)?;
    let result = serde_json::from_value(report).context("decode report")?;
    Ok(result)
}

/// Validate a JSON instance against a JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .context("compile report schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("report schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

/// The report is scratch space: clear it before a run and after reading it.
fn remove_report(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "failed to remove test report");
            Err(err).with_context(|| format!("remove test report {}", path.display()))
        }
    }
}
