//! Side-effecting adapters used by the repair loop.

pub mod config;
pub mod gate;
pub mod generator;
pub mod iteration_log;
pub mod process;
pub mod prompt;
pub mod source;
pub mod test_engine;
