//! CLI module for assertagent
//!
//! Handles command-line argument parsing; configuration lives in
//! `crate::config`.

pub mod args;

pub use args::{Args, Commands, RunArgs, Verbosity};
