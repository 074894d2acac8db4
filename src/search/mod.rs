//! Search module - parallel best-first exploration of future placements.

pub mod calculator;
pub mod evaluator;
pub mod node;
pub mod worker;

pub use calculator::{CalculatorStatus, NodeCalculator, PruningPolicy};
pub use evaluator::Evaluator;
pub use node::{NodeArena, NodeId};
pub use worker::{max_worker_count, Task, TaskContext, WorkerPool};
