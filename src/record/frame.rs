//! Evaluator frame record.
//!
//! A frame drives one body: it owns the thunk stack of pending resume
//! signals, the single wait slot installed by the most recent suspending
//! instruction, the set of sub-frames created by `call`/resource init, and
//! the scope-local context dictionary inherited through the parent chain.
//!
//! Waits carry an epoch. Clearing a wait or destroying the frame bumps the
//! epoch, so wakers minted for an earlier suspension are dropped at delivery
//! instead of resuming the wrong wait. Exactly one wait is installed at a
//! time; a new suspension replaces, never chains.

use crate::deferred::DeferredCell;
use crate::error::Error;
use crate::op::body::{Body, Signal};
use crate::op::instruction::CancelFn;
use crate::op::OpValue;
use crate::types::{FrameId, TaskId};
use core::fmt;
use smallvec::SmallVec;
use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

/// What a parked frame is waiting on.
pub(crate) enum Wait {
    /// Not parked.
    None,
    /// A queued resumption will arrive (initial start, or a plain wake).
    Queued,
    /// A deferred settling; `cancel` is the best-effort foreign cancel.
    Deferred {
        cell: DeferredCell,
        cancel: Option<CancelFn>,
    },
    /// A timer on the virtual clock.
    Timer,
    /// An external event via a `suspend` installer.
    External { cancel: Option<CancelFn> },
    /// A child frame's exit. `owned` means the child sits in this frame's
    /// children set and is torn down by the drain; an unowned child (a
    /// resource init rooted elsewhere) is destroyed when this wait is
    /// interrupted.
    ChildExit { frame: FrameId, owned: bool },
}

impl Wait {
    pub(crate) const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Debug for Wait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Queued => write!(f, "Queued"),
            Self::Deferred { .. } => write!(f, "Deferred"),
            Self::Timer => write!(f, "Timer"),
            Self::External { .. } => write!(f, "External"),
            Self::ChildExit { frame, owned } => write!(f, "ChildExit({frame:?}, owned={owned})"),
        }
    }
}

/// Who is notified when this frame exits.
#[derive(Debug, Clone, Copy)]
pub(crate) enum FrameWaiter {
    /// The frame is a task's root frame; its exit settles the controller.
    Task(TaskId),
    /// A parent frame parked on this frame's exit.
    Frame(FrameId),
    /// Nobody; the exit is only logged.
    Detached,
}

/// Lifecycle phase of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FramePhase {
    /// The body is being driven.
    Running,
    /// The body has returned; sub-frames are being destroyed in reverse
    /// insertion order.
    Draining,
}

/// Internal record for one evaluator frame.
pub(crate) struct FrameRecord {
    pub id: FrameId,
    /// Task whose supervision tree this frame works under. Spawns issued
    /// from the frame default to this task as parent.
    pub owner: TaskId,
    /// Parent frame for context inheritance and drain membership.
    pub parent: Option<FrameId>,
    /// Sub-frames in creation order.
    pub children: SmallVec<[FrameId; 2]>,
    /// The body, absent only while a resume call is in flight or after exit.
    pub body: Option<Box<dyn Body>>,
    /// Stack of pending signals; the top is delivered next.
    pub thunks: Vec<Signal>,
    pub wait: Wait,
    /// Bumped whenever a wait is cleared; stale wakes compare unequal.
    pub epoch: u64,
    /// Teardown flags.
    pub aborted: bool,
    pub crash: Option<Error>,
    pub phase: FramePhase,
    /// The body's own result, recorded when it returns.
    pub body_result: Option<Result<OpValue, Error>>,
    /// Errors collected while destroying sub-frames.
    pub teardown: Vec<Error>,
    pub waiter: FrameWaiter,
    /// Scope-local values; lookups fall back through the parent chain.
    pub context: HashMap<&'static str, Rc<dyn Any>>,
    /// True while the kernel is inside this frame's drive loop.
    pub driving: bool,
    /// True while the kernel is inside this frame's synchronous drain loop.
    pub drain_inline: bool,
}

impl FrameRecord {
    pub(crate) fn new(
        id: FrameId,
        owner: TaskId,
        parent: Option<FrameId>,
        body: Box<dyn Body>,
        waiter: FrameWaiter,
    ) -> Self {
        Self {
            id,
            owner,
            parent,
            children: SmallVec::new(),
            body: Some(body),
            thunks: Vec::new(),
            wait: Wait::None,
            epoch: 0,
            aborted: false,
            crash: None,
            phase: FramePhase::Running,
            body_result: None,
            teardown: Vec::new(),
            waiter,
            context: HashMap::new(),
            driving: false,
            drain_inline: false,
        }
    }

    /// Clears the wait slot and invalidates outstanding wakers.
    /// Returns what was being waited on.
    pub(crate) fn clear_wait(&mut self) -> Wait {
        self.epoch += 1;
        std::mem::replace(&mut self.wait, Wait::None)
    }

    /// Removes `child` from the children set, preserving order.
    pub(crate) fn remove_child(&mut self, child: FrameId) -> bool {
        match self.children.iter().position(|&c| c == child) {
            Some(pos) => {
                self.children.remove(pos);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for FrameRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRecord")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("phase", &self.phase)
            .field("wait", &self.wait)
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}
