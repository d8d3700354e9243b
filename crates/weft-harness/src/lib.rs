#![forbid(unsafe_code)]

//! Test harness for the weft runtime.
//!
//! - [`server::DefinitionServer`]: an in-process [`Transport`](weft_runtime::Transport)
//!   that serves component definitions and echoes other actions, passing
//!   every request and response through JSON.
//! - [`expect::ExpectedErrors`]: "this exact error occurred N times" ledger.
//! - [`wait::wait_for`]: run turns until a predicate holds.
//! - [`scenario`]: the destroy-race and batch-isolation scenarios.

pub mod expect;
pub mod scenario;
pub mod server;
pub mod wait;

pub use expect::{ErrorMismatch, ExpectedErrors};
pub use scenario::{IsolationOutcome, RaceOutcome, RaceScenario, ScenarioError};
pub use server::DefinitionServer;
pub use wait::{WaitError, wait_for};
