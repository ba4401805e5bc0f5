//! Concurrent batch dispatch against the command gateway.
//!
//! A batch is a set of operations launched as independent tasks, joined at
//! a full barrier, and only then verified. The subsystem offers no
//! transactional batch API, so the harness manufactures stop-the-world
//! checkpoints structurally: the join establishes the happens-before edge
//! that keeps verification from racing any in-flight mutation.

mod batch;
mod dispatch;

pub use batch::{Expectation, Operation, OperationBatch, PlannedOp};
pub use dispatch::{BatchOutcome, ConcurrentOperationRunner, OpOutcome, RunnerPhase};
