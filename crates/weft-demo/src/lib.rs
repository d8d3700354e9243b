#![forbid(unsafe_code)]

//! Command-line replays of the weft reference scenarios.

pub mod cli;
pub mod error;
pub mod report;

pub use cli::{Cli, Commands, run, run_from_env};
pub use error::{DemoError, Result};
