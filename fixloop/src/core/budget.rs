//! Wall-clock budget helpers for the repair loop.

use std::time::{Duration, Instant};

/// Remaining time until `deadline`, or `None` once it has passed.
///
/// With no deadline the budget is unbounded and `Some(Duration::MAX)` is
/// returned.
pub fn remaining_budget(deadline: Option<Instant>, now: Instant) -> Option<Duration> {
    match deadline {
        None => Some(Duration::MAX),
        Some(deadline) => deadline
            .checked_duration_since(now)
            .filter(|remaining| !remaining.is_zero()),
    }
}

/// Clamp a per-operation timeout to the remaining run budget.
pub fn clamp_timeout(timeout: Duration, remaining: Duration) -> Duration {
    timeout.min(remaining)
}
