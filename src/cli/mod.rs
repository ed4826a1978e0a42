//! Command Line Interface (CLI) layer for carfuse.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) for the HTTP service and the
//! one-shot local fusion. It wires user-provided options to the library
//! functionality exposed via `carfuse::api` and `carfuse::server`.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
