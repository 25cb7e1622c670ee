//! assertagent - multi-agent assertion generation for unit tests
//!
//! Given a test prefix with an assertion placeholder, a writer agent
//! proposes an assertion, the project tools verify it statically and by
//! running the test, and a reviewer agent accepts it or sends feedback.
//!
//! # Architecture
//!
//! - **debugger**: jdb / ipdb session paused at the assertion point
//! - **project**: owner of the test file, static checks and test runs
//! - **agent**: conversation engine and the explorer, writer and reviewer roles
//! - **pipeline**: per-cycle graph, per-task driver and batch runs
//! - **models**: chat completion transport
//! - **telemetry**: per-task resource log

pub mod errors;
pub mod config;
pub mod types;
pub mod syntax;
pub mod tools;
pub mod project;
pub mod debugger;
pub mod models;
pub mod telemetry;
pub mod agent;
pub mod pipeline;
pub mod cli;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use errors::{AgentError, Result};
pub use config::Config;
