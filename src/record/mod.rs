//! Internal records for tasks and evaluator frames.

pub mod frame;
pub mod task;

pub use task::TaskState;

pub(crate) use frame::{FramePhase, FrameRecord, FrameWaiter, Wait};
pub(crate) use task::{TaskRecord, Trapper};
