//! FIFO run queue and frame wakers.
//!
//! Every external event that readies a frame — a deferred settling, a timer
//! firing, a task reaching terminal state — goes through the run queue, so
//! frames resume in FIFO order relative to the event that readied them.
//!
//! A [`Waker`] targets one parked frame at one wait epoch. The kernel bumps a
//! frame's epoch whenever a wait is cleared or the frame is destroyed, so a
//! stale waker's delivery is dropped at the pop site instead of resuming the
//! wrong wait.

use crate::error::Error;
use crate::op::OpValue;
use crate::types::FrameId;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A queued resumption for a parked frame.
pub(crate) struct Wake {
    pub frame: FrameId,
    pub epoch: u64,
    pub signal: Result<OpValue, Error>,
}

impl std::fmt::Debug for Wake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wake")
            .field("frame", &self.frame)
            .field("epoch", &self.epoch)
            .field("ok", &self.signal.is_ok())
            .finish()
    }
}

/// Shared handle to the kernel's FIFO run queue.
#[derive(Clone, Default)]
pub(crate) struct RunQueue {
    inner: Rc<RefCell<VecDeque<Wake>>>,
}

impl RunQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, wake: Wake) {
        self.inner.borrow_mut().push_back(wake);
    }

    pub(crate) fn pop(&self) -> Option<Wake> {
        self.inner.borrow_mut().pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}

impl std::fmt::Debug for RunQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunQueue")
            .field("len", &self.inner.borrow().len())
            .finish()
    }
}

/// How a wake's signal is translated before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WakeMode {
    /// Deliver the signal as produced.
    Passthrough,
    /// Replace whatever the signal was with a unit resumption. Used by
    /// halt-joins, which await termination but never observe the outcome.
    Discard,
}

/// Wakes one parked frame, once.
///
/// This is the integration point handed to `suspend` installers: settle it
/// from wherever the external event lands and the suspended operation
/// resumes. Waking a frame whose wait has since been cleared or destroyed is
/// harmless.
#[derive(Clone)]
pub struct Waker {
    queue: RunQueue,
    frame: FrameId,
    epoch: u64,
    mode: WakeMode,
}

impl Waker {
    pub(crate) fn new(queue: RunQueue, frame: FrameId, epoch: u64) -> Self {
        Self {
            queue,
            frame,
            epoch,
            mode: WakeMode::Passthrough,
        }
    }

    pub(crate) fn discarding(mut self) -> Self {
        self.mode = WakeMode::Discard;
        self
    }

    pub(crate) fn frame(&self) -> FrameId {
        self.frame
    }

    /// Enqueues a resumption carrying `signal`. Staleness is judged at
    /// delivery, not here.
    pub fn wake(&self, signal: Result<OpValue, Error>) {
        let signal = match self.mode {
            WakeMode::Passthrough => signal,
            WakeMode::Discard => Ok(crate::op::nil()),
        };
        self.queue.push(Wake {
            frame: self.frame,
            epoch: self.epoch,
            signal,
        });
    }

    /// Enqueues a successful resumption with `value`.
    pub fn wake_with<T: 'static>(&self, value: T) {
        self.wake(Ok(Rc::new(value)));
    }
}

impl std::fmt::Debug for Waker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waker")
            .field("frame", &self.frame)
            .field("epoch", &self.epoch)
            .field("mode", &self.mode)
            .finish()
    }
}
