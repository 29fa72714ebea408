//! Test-driven repair loop.
//!
//! Given a source file and an immutable test file, `fixloop` runs the tests,
//! and while any fail, asks a code-generation service for a corrected source
//! file, commits it, and runs the tests again. The crate keeps a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (result classification, reply
//!   parsing, language detection). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (config, processes, test engine,
//!   prompt rendering, HTTP generation, file writes).
//!
//! [`looping`] coordinates the two into the bounded repair loop the CLI runs.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
