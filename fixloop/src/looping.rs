//! The repair loop controller.
//!
//! Each iteration reads the source and test artifacts, runs the tests, and
//! stops on success. On failure it renders a repair prompt, asks the
//! generator for a replacement, gates the candidate, and atomically commits
//! it. Iterations are strictly sequential; the source on disk is the only
//! live revision.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, info_span, warn};

use crate::core::budget::{clamp_timeout, remaining_budget};
use crate::core::extract::ResponseParser;
use crate::core::interpreter::classify;
use crate::core::language::fence_tag_for;
use crate::core::types::{TestExecutionResult, Verdict};
use crate::io::config::RepairConfig;
use crate::io::gate::{CandidateGate, GateVerdict};
use crate::io::generator::{Generator, generate_code};
use crate::io::iteration_log::{IterationLog, IterationMeta};
use crate::io::prompt::{PromptInputs, build_repair_prompt};
use crate::io::source::{read_artifact, write_atomic};
use crate::io::test_engine::{TestEngine, TestRequest};

/// The file pair under repair. Paths are relative to `workdir` unless absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairTarget {
    pub workdir: PathBuf,
    pub source_path: PathBuf,
    pub test_path: PathBuf,
}

impl RepairTarget {
    pub fn source_file(&self) -> PathBuf {
        self.workdir.join(&self.source_path)
    }

    pub fn test_file(&self) -> PathBuf {
        self.workdir.join(&self.test_path)
    }
}

/// Loop limits and settings resolved from [`RepairConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Test runs allowed before giving up.
    pub max_iterations: u32,
    /// Wall-clock budget for the whole loop.
    pub timeout: Option<Duration>,
    /// Per-run cap for the test engine (further clamped by the budget).
    pub test_timeout: Duration,
    pub max_generation_attempts: u32,
    pub fence_tag: String,
    pub log_dir: Option<PathBuf>,
}

impl LoopConfig {
    pub fn from_config(cfg: &RepairConfig, source_path: &Path) -> Self {
        Self {
            max_iterations: cfg.max_iterations,
            timeout: cfg.timeout_secs.map(Duration::from_secs),
            test_timeout: Duration::from_secs(cfg.test.timeout_secs),
            max_generation_attempts: cfg.max_generation_attempts,
            fence_tag: cfg
                .generator
                .fence_tag
                .clone()
                .unwrap_or_else(|| fence_tag_for(source_path).to_string()),
            log_dir: cfg.log_dir.clone(),
        }
    }
}

/// Reason why `run_repair_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// Every test passed.
    Passed,
    /// The last allowed test run still failed.
    MaxIterationsReached { max_iterations: u32 },
    /// The wall-clock budget ran out before the tests passed.
    TimedOut { elapsed: Duration },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Test runs performed.
    pub iterations: u32,
    /// Candidates committed to the source file.
    pub revisions: u32,
    pub stop: LoopStop,
}

impl LoopOutcome {
    pub fn passed(&self) -> bool {
        self.stop == LoopStop::Passed
    }
}

/// Progress notifications emitted while the loop runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent<'a> {
    TestsRan {
        iteration: u32,
        verdict: Verdict,
        result: &'a TestExecutionResult,
    },
    CandidateRejected {
        iteration: u32,
        attempt: u32,
        reason: &'a str,
    },
    SourceRevised {
        iteration: u32,
        attempt: u32,
        bytes: usize,
    },
    /// Every generation attempt in this iteration was rejected; the source
    /// is unchanged.
    GenerationExhausted { iteration: u32, attempts: u32 },
}

/// Run test/repair iterations until the tests pass or a limit is reached.
///
/// Errors from the test engine, the generator, the gate's checker, or file
/// I/O abort the loop immediately. Failing tests and rejected candidates do
/// not.
pub fn run_repair_loop<T, G, F>(
    target: &RepairTarget,
    engine: &T,
    generator: &G,
    parser: &dyn ResponseParser,
    gate: &CandidateGate,
    config: &LoopConfig,
    mut on_event: F,
) -> Result<LoopOutcome>
where
    T: TestEngine,
    G: Generator,
    F: FnMut(&LoopEvent<'_>),
{
    let started = Instant::now();
    // A budget too large to represent as an instant is treated as unbounded.
    let deadline = config
        .timeout
        .and_then(|timeout| started.checked_add(timeout));
    let source_file = target.source_file();
    let test_file = target.test_file();

    let mut iterations = 0u32;
    let mut revisions = 0u32;
    loop {
        let Some(remaining) = remaining_budget(deadline, Instant::now()) else {
            return Ok(LoopOutcome {
                iterations,
                revisions,
                stop: LoopStop::TimedOut {
                    elapsed: started.elapsed(),
                },
            });
        };

        iterations += 1;
        let iteration = iterations;
        let span = info_span!("iteration", iteration);
        let _enter = span.enter();
        let log = IterationLog::open(config.log_dir.as_deref(), iteration)?;

        let source = read_artifact(&source_file).context("read source")?;
        let tests = read_artifact(&test_file).context("read tests")?;

        let result = engine
            .run(&TestRequest {
                workdir: target.workdir.clone(),
                test_path: target.test_path.clone(),
                timeout: clamp_timeout(config.test_timeout, remaining),
            })
            .context("run tests")?;
        log.record_result(&result)?;

        let verdict = classify(&result);
        info!(
            verdict = verdict.as_str(),
            failed_suites = result.num_failed_test_suites,
            "tests finished"
        );
        on_event(&LoopEvent::TestsRan {
            iteration,
            verdict,
            result: &result,
        });

        let mut meta = IterationMeta {
            iteration,
            verdict,
            revised: false,
            rejections: Vec::new(),
        };

        if verdict == Verdict::Success {
            log.record_meta(&meta)?;
            return Ok(LoopOutcome {
                iterations,
                revisions,
                stop: LoopStop::Passed,
            });
        }
        if iteration >= config.max_iterations {
            log.record_meta(&meta)?;
            return Ok(LoopOutcome {
                iterations,
                revisions,
                stop: LoopStop::MaxIterationsReached {
                    max_iterations: config.max_iterations,
                },
            });
        }

        let prompt = build_repair_prompt(&PromptInputs {
            source_path: &target.source_path,
            test_path: &target.test_path,
            source: &source,
            tests: &tests,
            result: &result,
            fence: &config.fence_tag,
        })?;
        log.record_prompt(prompt.as_str())?;

        let mut attempts = 0u32;
        while attempts < config.max_generation_attempts {
            let Some(remaining) = remaining_budget(deadline, Instant::now()) else {
                break;
            };
            attempts += 1;

            let generation = generate_code(generator, parser, &prompt, remaining)?;
            log.record_reply(attempts, &generation.reply)?;

            let Some(remaining) = remaining_budget(deadline, Instant::now()) else {
                break;
            };
            match gate.check(
                &target.workdir,
                &target.source_path,
                &generation.code,
                remaining,
            )? {
                GateVerdict::Accepted => {
                    write_atomic(&source_file, &generation.code).context("write source")?;
                    revisions += 1;
                    meta.revised = true;
                    on_event(&LoopEvent::SourceRevised {
                        iteration,
                        attempt: attempts,
                        bytes: generation.code.len(),
                    });
                    break;
                }
                GateVerdict::Rejected(reason) => {
                    warn!(attempt = attempts, reason = %reason, "candidate rejected");
                    on_event(&LoopEvent::CandidateRejected {
                        iteration,
                        attempt: attempts,
                        reason: &reason,
                    });
                    meta.rejections.push(reason);
                }
            }
        }

        if !meta.revised
            && attempts == config.max_generation_attempts
            && meta.rejections.len() == attempts as usize
        {
            on_event(&LoopEvent::GenerationExhausted {
                iteration,
                attempts,
            });
        }
        log.record_meta(&meta)?;
    }
}
