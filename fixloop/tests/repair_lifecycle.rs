//! Loop-level tests for full repair scenarios.
//!
//! These drive `run_repair_loop` with scripted test engines and generators
//! to check end-to-end behavior: what reaches the generator, what lands on
//! disk, and when the loop stops.

use std::time::Duration;

use fixloop::core::extract::FencedBlockParser;
use fixloop::core::types::{AssertionEntry, TestEntry, TestExecutionResult};
use fixloop::io::config::ValidateConfig;
use fixloop::io::gate::CandidateGate;
use fixloop::looping::{LoopConfig, LoopEvent, LoopStop, run_repair_loop};
use fixloop::test_support::{
    RepairWorkspace, ScriptedGenerator, ScriptedTestEngine, failing_result, passing_result,
};

const BROKEN_SOURCE: &str = "export function myfunc(input: string): string[] {\n  return [];\n}\n";

const FIXED_SOURCE: &str = "export function myfunc(input: string): string[] {\n  const match = input.match(/^(株式会社|合同会社).+/);\n  return match ? [match[0]] : [];\n}";

const TESTS: &str = "import { describe, expect, it } from 'vitest';\nimport { myfunc } from './lib';\n\ndescribe('regex', () => {\n  it('matches company prefixes', () => {\n    expect(myfunc('合資会社日本')).toEqual([]);\n    expect(myfunc('株式会社組')).toEqual(['株式会社組']);\n    expect(myfunc('合同会社製作所')).toEqual(['合同会社製作所']);\n    expect(myfunc('商事株式会社')).toEqual([]);\n  });\n});\n";

fn loop_config(max_iterations: u32) -> LoopConfig {
    LoopConfig {
        max_iterations,
        timeout: Some(Duration::from_secs(60)),
        test_timeout: Duration::from_secs(30),
        max_generation_attempts: 3,
        fence_tag: "typescript".to_string(),
        log_dir: None,
    }
}

fn gate() -> CandidateGate {
    CandidateGate::new(ValidateConfig::default())
}

/// Three of four cases fail against the stub implementation.
fn three_of_four_failing() -> TestExecutionResult {
    let case = |title: &str, status: &str| AssertionEntry {
        full_name: format!("regex {title}"),
        status: status.to_string(),
        failure_messages: if status == "failed" {
            vec![format!("AssertionError: {title}")]
        } else {
            Vec::new()
        },
    };
    TestExecutionResult {
        num_total_test_suites: 4,
        num_passed_test_suites: 1,
        num_failed_test_suites: 3,
        test_results: vec![TestEntry {
            name: "src/lib.test.ts".to_string(),
            status: "failed".to_string(),
            message: None,
            assertion_results: vec![
                case("rejects other company types", "passed"),
                case("matches kabushiki", "failed"),
                case("matches godo", "failed"),
                case("rejects suffix", "failed"),
            ],
        }],
    }
}

/// Stub source fails 3/4, the generator returns a fix, the second run passes.
#[test]
fn failing_source_is_repaired_in_one_revision() {
    let ws = RepairWorkspace::new(BROKEN_SOURCE, TESTS).expect("workspace");
    let failing = three_of_four_failing();
    let engine = ScriptedTestEngine::new(vec![Ok(failing.clone()), Ok(passing_result(4))])
        .watching(ws.source_file());
    let generator = ScriptedGenerator::new(vec![Ok(format!(
        "The regex was missing. Here is the corrected file:\n\n```typescript\n{FIXED_SOURCE}\n```\n\nThis should pass all four cases."
    ))]);
    let parser = FencedBlockParser::new("typescript");
    let mut failures_seen = Vec::new();

    let outcome = run_repair_loop(
        &ws.target(),
        &engine,
        &generator,
        &parser,
        &gate(),
        &loop_config(10),
        |event| {
            if let LoopEvent::TestsRan { result, .. } = event {
                failures_seen.push((result.num_failed_test_suites, result.num_passed_test_suites));
            }
        },
    )
    .expect("loop");

    assert_eq!(outcome.stop, LoopStop::Passed);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.revisions, 1);
    assert_eq!(failures_seen, vec![(3, 1), (0, 4)]);

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(BROKEN_SOURCE.trim_end()));
    assert!(prompts[0].contains(TESTS.trim_end()));
    assert!(prompts[0].contains(&failing.to_pretty_json().expect("json")));

    assert_eq!(ws.read_source().expect("source"), FIXED_SOURCE);
    assert_eq!(ws.read_tests().expect("tests"), TESTS);
    assert_eq!(engine.snapshots(), vec![BROKEN_SOURCE.to_string(), FIXED_SOURCE.to_string()]);
}

/// Source already passes: one run, no generation request.
#[test]
fn passing_source_needs_no_generation() {
    let ws = RepairWorkspace::new(FIXED_SOURCE, TESTS).expect("workspace");
    let engine = ScriptedTestEngine::new(vec![Ok(passing_result(4))]);
    let generator = ScriptedGenerator::new(Vec::new());
    let parser = FencedBlockParser::new("typescript");

    let outcome = run_repair_loop(
        &ws.target(),
        &engine,
        &generator,
        &parser,
        &gate(),
        &loop_config(10),
        |_| {},
    )
    .expect("loop");

    assert!(outcome.passed());
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.revisions, 0);
    assert!(generator.prompts().is_empty());
    assert_eq!(engine.requests().len(), 1);
    assert_eq!(ws.read_source().expect("source"), FIXED_SOURCE);
}

/// A reply without a code block is a rejected candidate: the source is not
/// overwritten with an empty string and the loop keeps going without error.
#[test]
fn reply_without_code_block_leaves_source_untouched() {
    let ws = RepairWorkspace::new(BROKEN_SOURCE, TESTS).expect("workspace");
    let engine = ScriptedTestEngine::new(vec![
        Ok(failing_result(4, 3)),
        Ok(failing_result(4, 3)),
        Ok(passing_result(4)),
    ])
    .watching(ws.source_file());
    let generator = ScriptedGenerator::new(vec![
        Ok("I am not sure what is wrong here.".to_string()),
        Ok("Still unsure.".to_string()),
        Ok("Try changing the regex.".to_string()),
        Ok(format!("```typescript\n{FIXED_SOURCE}\n```")),
    ]);
    let parser = FencedBlockParser::new("typescript");
    let mut rejected = 0;

    let outcome = run_repair_loop(
        &ws.target(),
        &engine,
        &generator,
        &parser,
        &gate(),
        &loop_config(10),
        |event| {
            if matches!(event, LoopEvent::CandidateRejected { .. }) {
                rejected += 1;
            }
        },
    )
    .expect("loop");

    assert!(outcome.passed());
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.revisions, 1);
    assert_eq!(rejected, 3);
    // Iteration 1 exhausts its three attempts; iteration 2 commits on its first.
    assert_eq!(
        engine.snapshots(),
        vec![
            BROKEN_SOURCE.to_string(),
            BROKEN_SOURCE.to_string(),
            FIXED_SOURCE.to_string(),
        ]
    );
}

/// Generator keeps producing code that never passes; the cap ends the run.
#[test]
fn non_converging_repair_gives_up_at_cap() {
    let ws = RepairWorkspace::new(BROKEN_SOURCE, TESTS).expect("workspace");
    let engine = ScriptedTestEngine::new(vec![
        Ok(failing_result(4, 3)),
        Ok(failing_result(4, 2)),
        Ok(failing_result(4, 1)),
    ]);
    let generator = ScriptedGenerator::new(vec![
        Ok("```typescript\nattempt(1);\n```".to_string()),
        Ok("```typescript\nattempt(2);\n```".to_string()),
    ]);
    let parser = FencedBlockParser::new("typescript");

    let outcome = run_repair_loop(
        &ws.target(),
        &engine,
        &generator,
        &parser,
        &gate(),
        &loop_config(3),
        |_| {},
    )
    .expect("loop");

    assert_eq!(
        outcome.stop,
        LoopStop::MaxIterationsReached { max_iterations: 3 }
    );
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.revisions, 2);
    assert_eq!(ws.read_source().expect("source"), "attempt(2);");
}

/// Each run targets only the configured test file with a bounded timeout.
#[test]
fn test_requests_target_single_test_file() {
    let ws = RepairWorkspace::new(BROKEN_SOURCE, TESTS).expect("workspace");
    let engine = ScriptedTestEngine::new(vec![Ok(passing_result(1))]);
    let generator = ScriptedGenerator::new(Vec::new());
    let parser = FencedBlockParser::new("typescript");

    run_repair_loop(
        &ws.target(),
        &engine,
        &generator,
        &parser,
        &gate(),
        &loop_config(1),
        |_| {},
    )
    .expect("loop");

    let requests = engine.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].test_path, ws.target().test_path);
    assert_eq!(requests[0].workdir, ws.root());
    assert!(requests[0].timeout <= Duration::from_secs(30));
}
