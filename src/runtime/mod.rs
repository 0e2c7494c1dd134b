//! Kernel runtime: records driver, run queue, timers, events, handles.
//!
//! - [`kernel`]: the single-threaded owner of the supervision tree and the
//!   instruction evaluation loop
//! - [`config`]: kernel configuration and builder
//! - [`controller`]: body classification and task/frame bridging
//! - [`queue`]: FIFO run queue and wakers
//! - [`timer`]: deadline heap for the virtual clock
//! - [`events`]: synchronous supervision event bus
//! - [`handle`]: non-owning task handles

pub mod config;
pub(crate) mod controller;
pub mod events;
pub mod handle;
pub mod kernel;
pub(crate) mod queue;
pub(crate) mod timer;

pub use config::{DeadlockPolicy, KernelBuilder, KernelConfig};
pub use events::Event;
pub use handle::TaskHandle;
pub use kernel::{FrameView, Kernel, SpawnError};
pub use queue::Waker;
