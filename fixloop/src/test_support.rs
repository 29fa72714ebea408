//! Test-only helpers: scripted collaborators and a scratch workspace.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{TestEntry, TestExecutionResult};
use crate::io::generator::Generator;
use crate::io::test_engine::{TestEngine, TestRequest};
use crate::looping::RepairTarget;

/// Result where every suite passed.
pub fn passing_result(total: u32) -> TestExecutionResult {
    TestExecutionResult {
        num_total_test_suites: total,
        num_passed_test_suites: total,
        num_failed_test_suites: 0,
        test_results: vec![TestEntry {
            name: "src/lib.test.ts".to_string(),
            status: "passed".to_string(),
            message: None,
            assertion_results: Vec::new(),
        }],
    }
}

/// Result with `failed` of `total` suites failing.
pub fn failing_result(total: u32, failed: u32) -> TestExecutionResult {
    TestExecutionResult {
        num_total_test_suites: total,
        num_passed_test_suites: total.saturating_sub(failed),
        num_failed_test_suites: failed,
        test_results: vec![TestEntry {
            name: "src/lib.test.ts".to_string(),
            status: "failed".to_string(),
            message: Some(format!("{failed} of {total} failed")),
            assertion_results: Vec::new(),
        }],
    }
}

/// Test engine that replays queued results in order.
///
/// Each run also snapshots the source file named by [`Self::watching`], so
/// tests can assert what the engine saw on disk.
pub struct ScriptedTestEngine {
    queue: RefCell<VecDeque<Result<TestExecutionResult, String>>>,
    requests: RefCell<Vec<TestRequest>>,
    watched: Option<PathBuf>,
    snapshots: RefCell<Vec<String>>,
}

impl ScriptedTestEngine {
    pub fn new(results: Vec<Result<TestExecutionResult, String>>) -> Self {
        Self {
            queue: RefCell::new(results.into()),
            requests: RefCell::new(Vec::new()),
            watched: None,
            snapshots: RefCell::new(Vec::new()),
        }
    }

    pub fn watching(mut self, source_file: PathBuf) -> Self {
        self.watched = Some(source_file);
        self
    }

    pub fn requests(&self) -> Vec<TestRequest> {
        self.requests.borrow().clone()
    }

    pub fn snapshots(&self) -> Vec<String> {
        self.snapshots.borrow().clone()
    }
}

impl TestEngine for ScriptedTestEngine {
    fn run(&self, request: &TestRequest) -> Result<TestExecutionResult> {
        self.requests.borrow_mut().push(request.clone());
        if let Some(path) = &self.watched {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("snapshot {}", path.display()))?;
            self.snapshots.borrow_mut().push(contents);
        }
        match self.queue.borrow_mut().pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted test engine exhausted")),
        }
    }
}

/// Generator that replays queued replies and records every prompt and the
/// timeout it was given.
pub struct ScriptedGenerator {
    queue: RefCell<VecDeque<Result<String, String>>>,
    prompts: RefCell<Vec<String>>,
    timeouts: RefCell<Vec<Duration>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            queue: RefCell::new(replies.into()),
            prompts: RefCell::new(Vec::new()),
            timeouts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.borrow().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn complete(&self, prompt: &str, timeout: Duration) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.timeouts.borrow_mut().push(timeout);
        match self.queue.borrow_mut().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted generator exhausted")),
        }
    }
}

/// Scratch directory holding `src/lib.ts` and `src/lib.test.ts`.
pub struct RepairWorkspace {
    dir: TempDir,
}

impl RepairWorkspace {
    pub const SOURCE: &'static str = "src/lib.ts";
    pub const TESTS: &'static str = "src/lib.test.ts";

    pub fn new(source: &str, tests: &str) -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        fs::create_dir_all(dir.path().join("src")).context("create src dir")?;
        fs::write(dir.path().join(Self::SOURCE), source).context("write source")?;
        fs::write(dir.path().join(Self::TESTS), tests).context("write tests")?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn target(&self) -> RepairTarget {
        RepairTarget {
            workdir: self.root().to_path_buf(),
            source_path: PathBuf::from(Self::SOURCE),
            test_path: PathBuf::from(Self::TESTS),
        }
    }

    pub fn source_file(&self) -> PathBuf {
        self.root().join(Self::SOURCE)
    }

    pub fn read_source(&self) -> Result<String> {
        fs::read_to_string(self.source_file()).context("read workspace source")
    }

    pub fn read_tests(&self) -> Result<String> {
        fs::read_to_string(self.root().join(Self::TESTS)).context("read workspace tests")
    }
}
