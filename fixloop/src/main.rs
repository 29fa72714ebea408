//! `fixloop`: repair a source file until its test file passes.
//!
//! Runs the test file, and while any test fails, sends the source, the tests,
//! and the failure report to a code-generation service, writes back the
//! corrected source, and tries again.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;

use fixloop::core::extract::FencedBlockParser;
use fixloop::core::types::Verdict;
use fixloop::exit_codes;
use fixloop::io::config::{
    ConfigOverrides, DEFAULT_CONFIG_FILE, RepairConfig, apply_overrides, load_config,
};
use fixloop::io::gate::CandidateGate;
use fixloop::io::generator::OpenAiGenerator;
use fixloop::io::test_engine::CommandTestEngine;
use fixloop::logging;
use fixloop::looping::{LoopConfig, LoopEvent, LoopOutcome, LoopStop, RepairTarget, run_repair_loop};

#[derive(Parser, Debug)]
#[command(
    name = "fixloop",
    version,
    about = "Repair a source file until its test file passes"
)]
struct Cli {
    /// Source file to repair. Replaced with each accepted revision.
    source: PathBuf,

    /// Test file that defines correct behavior. Never modified.
    test: PathBuf,

    /// Config file (defaults to `fixloop.toml` in the working directory if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of test runs before giving up.
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Wall-clock budget for the whole run, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Model name sent to the generation service.
    #[arg(long)]
    model: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            max_iterations: self.max_iterations,
            timeout_secs: self.timeout_secs,
            model: self.model.clone(),
        }
    }
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(outcome) => std::process::exit(report_outcome(&outcome)),
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: &Cli) -> Result<LoopOutcome> {
    ensure_exists(&cli.source, "source file")?;
    ensure_exists(&cli.test, "test file")?;

    let workdir = std::env::current_dir().context("resolve working directory")?;
    let cfg = resolve_config(&workdir, cli)?;

    let target = RepairTarget {
        workdir,
        source_path: cli.source.clone(),
        test_path: cli.test.clone(),
    };
    let loop_config = LoopConfig::from_config(&cfg, &cli.source);
    let engine = CommandTestEngine::new(cfg.test.clone());
    let generator = OpenAiGenerator::new(&cfg.generator);
    let parser = FencedBlockParser::new(&loop_config.fence_tag);
    let gate = CandidateGate::new(cfg.validate.clone());

    run_repair_loop(
        &target,
        &engine,
        &generator,
        &parser,
        &gate,
        &loop_config,
        |event| report_event(&cli.source, event),
    )
}

fn ensure_exists(path: &Path, label: &str) -> Result<()> {
    if !path.exists() {
        bail!("{label} does not exist: {}", path.display());
    }
    Ok(())
}

fn resolve_config(workdir: &Path, cli: &Cli) -> Result<RepairConfig> {
    let base = match &cli.config {
        Some(path) => {
            ensure_exists(path, "config file")?;
            load_config(path)?
        }
        None => load_config(&workdir.join(DEFAULT_CONFIG_FILE))?,
    };
    apply_overrides(base, &cli.overrides())
}

fn report_event(source: &Path, event: &LoopEvent<'_>) {
    match event {
        LoopEvent::TestsRan {
            iteration,
            verdict: Verdict::Failure,
            result,
        } => println!(
            "Iteration {iteration}: {} of {} test suites failed.",
            result.num_failed_test_suites, result.num_total_test_suites
        ),
        LoopEvent::TestsRan { .. } => {}
        LoopEvent::CandidateRejected {
            iteration,
            attempt,
            reason,
        } => eprintln!(
            "Iteration {iteration}: candidate {attempt} rejected: {}",
            reason.lines().next().unwrap_or_default()
        ),
        LoopEvent::SourceRevised { .. } => {
            println!("Updated {}; re-running tests...", source.display());
        }
        LoopEvent::GenerationExhausted {
            iteration,
            attempts,
        } => eprintln!(
            "Iteration {iteration}: all {attempts} candidates rejected; source left unchanged."
        ),
    }
}

/// Print the final status line and pick the exit code.
fn report_outcome(outcome: &LoopOutcome) -> i32 {
    match &outcome.stop {
        LoopStop::Passed => {
            println!("All tests passed.");
            exit_codes::OK
        }
        LoopStop::MaxIterationsReached { max_iterations } => {
            eprintln!(
                "Gave up: tests still failing after {} iterations (max_iterations = {max_iterations}).",
                outcome.iterations
            );
            exit_codes::GAVE_UP
        }
        LoopStop::TimedOut { elapsed } => {
            eprintln!(
                "Gave up: timed out after {:.1}s and {} iterations.",
                elapsed.as_secs_f64(),
                outcome.iterations
            );
            exit_codes::GAVE_UP
        }
    }
}
