//! Stable exit codes for the `fixloop` CLI.
//!
//! Code 2 is left to clap for usage errors.

/// Every test passed.
pub const OK: i32 = 0;
/// Invalid paths or config, or a fatal error from the test engine or generator.
pub const INVALID: i32 = 1;
/// The loop stopped at its iteration cap or wall-clock timeout without passing.
pub const GAVE_UP: i32 = 3;
