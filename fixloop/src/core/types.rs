//! Shared deterministic types for the repair loop.
//!
//! These types define the contracts between the test engine adapter, the
//! result interpreter, and the prompt builder. They carry no I/O and their
//! serialized form is stable (field order follows declaration order).

use serde::{Deserialize, Serialize};

/// Structured outcome of one test-engine run against a single test file.
///
/// Field names follow the engine's JSON report so the report deserializes
/// directly. Unknown report fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestExecutionResult {
    pub num_total_test_suites: u32,
    pub num_passed_test_suites: u32,
    pub num_failed_test_suites: u32,
    #[serde(default)]
    pub test_results: Vec<TestEntry>,
}

/// One per-file (or per-test) entry from the engine report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEntry {
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_results: Vec<AssertionEntry>,
}

/// Individual assertion outcome nested under a [`TestEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionEntry {
    pub full_name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure_messages: Vec<String>,
}

impl TestExecutionResult {
    /// Render the full record as pretty JSON for embedding in a prompt.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Pass/fail classification of a [`TestExecutionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Success,
    Failure,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Success => "success",
            Verdict::Failure => "failure",
        }
    }
}
