//! Weft: a structured-concurrency task kernel.
//!
//! # Overview
//!
//! Every unit of work is a task: a node in a dynamically-growing supervision
//! tree with deterministic lifecycle rules, resource-scoped cleanup, and
//! propagating failure/halt semantics. Task bodies are suspendable
//! computations that yield *instructions*; the kernel dispatches each
//! instruction, manages parent/child links, and guarantees that no task
//! outlives its resources or its supervisor.
//!
//! # Core guarantees
//!
//! - **Structured termination**: a task reaches a terminal state only after
//!   every child has; nothing is orphaned.
//! - **Halt is not an error**: cooperative cancellation aborts the body
//!   through its cleanup path and is distinguishable from failure.
//! - **Deterministic ordering**: single-threaded cooperative scheduling,
//!   FIFO resumption, reverse-spawn-order halt cascades, ensure hooks before
//!   trappers.
//! - **Scoped resources**: a resource's cleanup runs when its owning scope
//!   exits, on every exit path.
//!
//! # Module structure
//!
//! - [`types`]: identifiers, outcomes, halt reasons, spawn options
//! - [`error`]: error taxonomy
//! - [`deferred`]: one-shot settled results
//! - [`op`]: operations, instructions, bodies, resources
//! - [`record`]: task and frame records, the task state machine
//! - [`runtime`]: the kernel, configuration, events, handles
//! - [`combinator`]: race, all, timeout
//! - [`util`]: arena allocator
//!
//! # Example
//!
//! ```
//! use weft::{op, Kernel};
//!
//! let mut kernel = Kernel::new();
//! let outcome = kernel.run(op::spawn(op::value(21_i32)).then(|child| {
//!     child.join().map(|n| n * 2)
//! }));
//! assert_eq!(outcome.unwrap(), 42);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]

pub mod combinator;
pub mod deferred;
pub mod error;
pub mod op;
pub mod record;
pub mod runtime;
pub mod test_utils;
pub mod tracing_compat;
pub mod types;
pub mod util;

pub use combinator::{all, race, with_timeout};
pub use deferred::{deferred, Deferred, Resolver, SettleError};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use op::{call, ensure, never, sleep, spawn, spawn_with, use_resource, IntoOp, Op, Resource, Scope};
pub use record::TaskState;
pub use runtime::{
    DeadlockPolicy, Event, FrameView, Kernel, KernelBuilder, KernelConfig, SpawnError, TaskHandle,
    Waker,
};
pub use types::{HaltKind, HaltReason, Outcome, SpawnOptions, Time};
