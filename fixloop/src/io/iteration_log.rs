//! Per-iteration records under the configured `log_dir`.
//!
//! Layout: `<log_dir>/<iteration>/` holding `result.json`, `meta.json`, and
//! on failing iterations `prompt.md` plus one `reply-<attempt>.md` per
//! generation attempt.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{TestExecutionResult, Verdict};

/// Summary written to `meta.json`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IterationMeta {
    pub iteration: u32,
    pub verdict: Verdict,
    /// Whether a candidate replaced the source in this iteration.
    pub revised: bool,
    /// Rejection reasons, in attempt order.
    pub rejections: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub result_path: PathBuf,
    pub meta_path: PathBuf,
    pub prompt_path: PathBuf,
}

impl IterationPaths {
    pub fn new(log_dir: &Path, iteration: u32) -> Self {
        let dir = log_dir.join(iteration.to_string());
        Self {
            result_path: dir.join("result.json"),
            meta_path: dir.join("meta.json"),
            prompt_path: dir.join("prompt.md"),
            dir,
        }
    }

    pub fn reply_path(&self, attempt: u32) -> PathBuf {
        self.dir.join(format!("reply-{attempt}.md"))
    }
}

/// Writer for one iteration's records. A `None` log dir makes every call a no-op.
#[derive(Debug, Clone)]
pub struct IterationLog {
    paths: Option<IterationPaths>,
}

impl IterationLog {
    pub fn open(log_dir: Option<&Path>, iteration: u32) -> Result<Self> {
        let paths = match log_dir {
            Some(dir) => {
                let paths = IterationPaths::new(dir, iteration);
                fs::create_dir_all(&paths.dir)
                    .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;
                Some(paths)
            }
            None => None,
        };
        Ok(Self { paths })
    }

    pub fn paths(&self) -> Option<&IterationPaths> {
        self.paths.as_ref()
    }

    pub fn record_result(&self, result: &TestExecutionResult) -> Result<()> {
        match &self.paths {
            Some(paths) => write_json(&paths.result_path, result),
            None => Ok(()),
        }
    }

    pub fn record_prompt(&self, prompt: &str) -> Result<()> {
        match &self.paths {
            Some(paths) => write_text(&paths.prompt_path, prompt),
            None => Ok(()),
        }
    }

    pub fn record_reply(&self, attempt: u32, reply: &str) -> Result<()> {
        match &self.paths {
            Some(paths) => write_text(&paths.reply_path(attempt), reply),
            None => Ok(()),
        }
    }

    pub fn record_meta(&self, meta: &IterationMeta) -> Result<()> {
        match &self.paths {
            Some(paths) => write_json(&paths.meta_path, meta),
            None => Ok(()),
        }
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    write_text(path, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing() -> TestExecutionResult {
        TestExecutionResult {
            num_total_test_suites: 1,
            num_passed_test_suites: 1,
            num_failed_test_suites: 0,
            test_results: Vec::new(),
        }
    }

    #[test]
    fn disabled_log_writes_nothing() {
        let log = IterationLog::open(None, 1).expect("open");
        assert!(log.paths().is_none());
        log.record_result(&passing()).expect("result");
        log.record_prompt("prompt").expect("prompt");
    }

    #[test]
    fn writes_iteration_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = IterationLog::open(Some(temp.path()), 2).expect("open");

        log.record_result(&passing()).expect("result");
        log.record_prompt("the prompt").expect("prompt");
        log.record_reply(1, "first reply").expect("reply");
        log.record_meta(&IterationMeta {
            iteration: 2,
            verdict: Verdict::Failure,
            revised: true,
            rejections: Vec::new(),
        })
        .expect("meta");

        let dir = temp.path().join("2");
        let result: TestExecutionResult = serde_json::from_str(
            &fs::read_to_string(dir.join("result.json")).expect("read result"),
        )
        .expect("parse result");
        assert_eq!(result, passing());
        assert_eq!(
            fs::read_to_string(dir.join("prompt.md")).expect("read prompt"),
            "the prompt"
        );
        assert_eq!(
            fs::read_to_string(dir.join("reply-1.md")).expect("read reply"),
            "first reply"
        );
        let meta = fs::read_to_string(dir.join("meta.json")).expect("read meta");
        assert!(meta.contains("\"verdict\": \"failure\""));
    }
}
