//! Orchestration graph, per-task driver and batch runs

pub mod batch;
pub mod driver;
pub mod graph;

pub use batch::{load_dataset, task_range, BatchRunner, BatchSummary, TaskOutcome, TaskResult};
pub use driver::run_task;
pub use graph::{CycleGraph, GraphState};
