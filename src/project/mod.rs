//! Project mutation and verification
//!
//! Owns the test file under completion and everything that checks a
//! candidate against the real project: static checks, Maven/pytest runs
//! and JUnit report parsing.

pub mod masked;
pub mod report;
pub mod runner;
pub mod static_check;
pub mod tools;

pub use masked::MaskedFile;
pub use report::TestReport;
pub use runner::{runner_for, MavenRunner, PytestRunner, TestRunner};
pub use static_check::check_assert;
pub use tools::{ProjectTools, TestRun};
