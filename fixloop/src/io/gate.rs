//! Validation gate applied to each candidate before it replaces the source.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::io::config::ValidateConfig;
use crate::io::process::{expand_args, run_with_timeout};
use crate::io::source::sibling_path;

const REASON_TAIL_BYTES: usize = 4_000;

/// Whether a candidate may be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    Accepted,
    Rejected(String),
}

/// Rejects empty candidates and, when configured, candidates that fail a
/// checker command (compiler, type checker, linter).
#[derive(Debug, Clone)]
pub struct CandidateGate {
    config: ValidateConfig,
}

impl CandidateGate {
    pub fn new(config: ValidateConfig) -> Self {
        Self { config }
    }

    /// Check `candidate` as a replacement for `source_path`.
    ///
    /// The candidate is written to a hidden sibling of the source (same
    /// directory and extension) for the checker, and removed afterwards. An
    /// `Err` means the checker could not be started at all. The checker runs
    /// for at most the smaller of its configured timeout and `budget`.
    #[instrument(skip_all, fields(source = %source_path.display(), candidate_bytes = candidate.len()))]
    pub fn check(
        &self,
        workdir: &Path,
        source_path: &Path,
        candidate: &str,
        budget: Duration,
    ) -> Result<GateVerdict> {
        if candidate.trim().is_empty() {
            return Ok(GateVerdict::Rejected(
                "empty extraction: the reply contained no usable code block".to_string(),
            ));
        }
        if self.config.command.is_empty() {
            return Ok(GateVerdict::Accepted);
        }

        let candidate_path = sibling_path(source_path, "fixloop-candidate");
        fs::write(workdir.join(&candidate_path), candidate)
            .with_context(|| format!("write candidate {}", candidate_path.display()))?;

        let outcome = self.run_checker(workdir, &candidate_path, budget);
        if let Err(err) = fs::remove_file(workdir.join(&candidate_path)) {
            warn!(path = %candidate_path.display(), err = %err, "failed to remove candidate file");
        }
        outcome
    }

    fn run_checker(
        &self,
        workdir: &Path,
        candidate_path: &Path,
        budget: Duration,
    ) -> Result<GateVerdict> {
        let file_arg = candidate_path.to_string_lossy();
        let args = expand_args(&self.config.command, &[("file", file_arg.as_ref())]);
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| anyhow!("validate command is empty"))?;

        let mut cmd = Command::new(program);
        cmd.args(rest).current_dir(workdir);
        let timeout = Duration::from_secs(self.config.timeout_secs).min(budget);
        let output = run_with_timeout(cmd, timeout, self.config.output_limit_bytes)
            .context("start validate command")?;

        if output.timed_out {
            return Ok(GateVerdict::Rejected(format!(
                "validation timed out after {timeout:?}"
            )));
        }
        if !output.success() {
            return Ok(GateVerdict::Rejected(format!(
                "validation failed (exit status {:?}):\n{}",
                output.status.code(),
                output.tail(REASON_TAIL_BYTES)
            )));
        }
        debug!("candidate passed validation");
        Ok(GateVerdict::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const BUDGET: Duration = Duration::from_secs(30);

    fn gate(command: &[&str]) -> CandidateGate {
        CandidateGate::new(ValidateConfig {
            command: command.iter().map(|arg| arg.to_string()).collect(),
            timeout_secs: 10,
            output_limit_bytes: 10_000,
        })
    }

    #[test]
    fn rejects_empty_candidate_without_running_checker() {
        let temp = tempfile::tempdir().expect("tempdir");
        let gate = gate(&["fixloop-no-such-checker"]);
        let verdict = gate
            .check(temp.path(), Path::new("a.ts"), "  \n\t", BUDGET)
            .expect("check");
        assert!(matches!(verdict, GateVerdict::Rejected(reason) if reason.contains("empty extraction")));
    }

    #[test]
    fn accepts_non_empty_candidate_without_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let verdict = gate(&[])
            .check(temp.path(), Path::new("a.ts"), "export const a = 1;", BUDGET)
            .expect("check");
        assert_eq!(verdict, GateVerdict::Accepted);
    }

    #[cfg(unix)]
    #[test]
    fn checker_sees_candidate_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src")).expect("src dir");
        let gate = gate(&["sh", "-c", "grep -q 'export' \"$1\"", "sh", "{file}"]);

        let accepted = gate
            .check(temp.path(), Path::new("src/a.ts"), "export const a = 1;", BUDGET)
            .expect("check");
        assert_eq!(accepted, GateVerdict::Accepted);

        let rejected = gate
            .check(temp.path(), Path::new("src/a.ts"), "const a = 1;", BUDGET)
            .expect("check");
        assert!(matches!(rejected, GateVerdict::Rejected(_)));

        assert!(!temp.path().join(PathBuf::from("src/.a.fixloop-candidate.ts")).exists());
    }

    #[cfg(unix)]
    #[test]
    fn rejection_reason_includes_checker_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let gate = gate(&["sh", "-c", "echo \"error TS1005: ';' expected\" >&2; exit 2"]);

        let verdict = gate
            .check(temp.path(), Path::new("a.ts"), "export const = ;", BUDGET)
            .expect("check");
        match verdict {
            GateVerdict::Rejected(reason) => {
                assert!(reason.contains("TS1005"));
                assert!(reason.contains("Some(2)"));
            }
            GateVerdict::Accepted => panic!("expected rejection"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn checker_timeout_is_clamped_to_budget() {
        let temp = tempfile::tempdir().expect("tempdir");
        let gate = gate(&["sh", "-c", "sleep 5; true"]);
        let started = std::time::Instant::now();

        let verdict = gate
            .check(
                temp.path(),
                Path::new("a.ts"),
                "export const a = 1;",
                Duration::from_millis(200),
            )
            .expect("check");

        assert!(matches!(verdict, GateVerdict::Rejected(reason) if reason.contains("timed out")));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn missing_checker_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = gate(&["fixloop-no-such-checker", "{file}"])
            .check(temp.path(), Path::new("a.ts"), "export const a = 1;", BUDGET)
            .unwrap_err();
        assert!(err.to_string().contains("start validate command"));
        assert!(!temp.path().join(".a.fixloop-candidate.ts").exists());
    }
}
