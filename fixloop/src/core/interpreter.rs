//! Deterministic classification of test-engine results.

use crate::core::types::{TestExecutionResult, Verdict};

/// Classify a test run as `Success` or `Failure`.
///
/// The verdict depends only on the failed-suite count: zero is `Success`,
/// anything else is `Failure`. Totals and per-test entries are carried along
/// untouched for the repair prompt.
pub fn classify(result: &TestExecutionResult) -> Verdict {
    if result.num_failed_test_suites == 0 {
        Verdict::Success
    } else {
        Verdict::Failure
    }
}
