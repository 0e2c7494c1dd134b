//! Task record and state machine.
//!
//! A task is a supervised unit of work: a node of the supervision tree with
//! an identity, a state, an ordered set of children, and a terminal outcome.
//! This module owns the legal-state table; the kernel triggers transitions
//! but the record enforces them, so an illegal trigger is visible at exactly
//! one place.
//!
//! ```text
//! pending ──start──► running ──resolve──► completing ──children drained──► completed
//!                       │    ──reject───► erroring   ──children drained──► errored
//!                       │                     │
//!                       └──halt── ◄──halt─────┘
//!                           ▼
//!                        halting  ──children drained──► halted
//! ```
//!
//! `completing`, `erroring`, and `halting` are finishing substates: the body
//! is done (or being torn down), no new instructions are accepted, and the
//! halt cascade over the children is in progress.

use crate::deferred::DeferredCell;
use crate::error::Error;
use crate::op::instruction::EnsureFn;
use crate::op::{OpValue, RawOp};
use crate::runtime::controller::Controller;
use crate::tracing_compat::trace;
use crate::types::{HaltReason, SpawnOptions, TaskId};
use core::fmt;
use smallvec::SmallVec;

/// The state of a task in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Created but not yet started.
    Pending,
    /// Body is being driven.
    Running,
    /// Body resolved; waiting for children to drain.
    Completing,
    /// Terminal: settled with a result.
    Completed,
    /// Body rejected; forced halt cascade in progress.
    Erroring,
    /// Terminal: settled with an error.
    Errored,
    /// Halt requested; teardown and cascade in progress.
    Halting,
    /// Terminal: halted before settling.
    Halted,
}

impl TaskState {
    /// Returns true for the three terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Halted)
    }

    /// Returns true for the three finishing substates.
    #[must_use]
    pub const fn is_finishing(self) -> bool {
        matches!(self, Self::Completing | Self::Erroring | Self::Halting)
    }

    /// Returns true if the task accepts new work (spawns).
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns the state's display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Erroring => "erroring",
            Self::Errored => "errored",
            Self::Halting => "halting",
            Self::Halted => "halted",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A callback slot fired once when the observed task reaches terminal state.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Trapper {
    /// The parent's trap: propagate errors, unlink, resume.
    Parent(TaskId),
    /// Continue the parent's halt cascade with the recorded force flag.
    Cascade { parent: TaskId, force: bool },
}

/// Internal record for one task.
pub(crate) struct TaskRecord {
    pub id: TaskId,
    /// Public monotonic id, unique within the kernel.
    pub serial: u64,
    pub state: TaskState,
    pub parent: Option<TaskId>,
    /// Children in spawn order.
    pub children: SmallVec<[TaskId; 4]>,
    /// Fired once at terminal entry, after ensure hooks, in order.
    pub trappers: Vec<Trapper>,
    /// Fired once at terminal entry, in registration order.
    pub ensures: Vec<EnsureFn>,
    pub options: SpawnOptions,
    pub controller: Controller,
    /// Body payload held between creation and start.
    pub pending_op: Option<RawOp>,
    /// One-shot outcome cell observed by joiners and the root runner.
    pub outcome: DeferredCell,
    /// Result or error staged while the children drain.
    pub staged: Option<Result<OpValue, Error>>,
    /// Why the task is halting, when it is.
    pub halt_reason: Option<HaltReason>,
}

impl TaskRecord {
    pub(crate) fn new(
        id: TaskId,
        serial: u64,
        parent: Option<TaskId>,
        options: SpawnOptions,
        op: RawOp,
        outcome: DeferredCell,
    ) -> Self {
        Self {
            id,
            serial,
            state: TaskState::Pending,
            parent,
            children: SmallVec::new(),
            trappers: Vec::new(),
            ensures: Vec::new(),
            options,
            controller: Controller::new(),
            pending_op: Some(op),
            outcome,
            staged: None,
            halt_reason: None,
        }
    }

    /// Pending → Running. Returns true if the state changed.
    pub(crate) fn start(&mut self) -> bool {
        match self.state {
            TaskState::Pending => {
                trace!(task = self.serial, from = "pending", to = "running", "task state transition");
                self.state = TaskState::Running;
                true
            }
            _ => false,
        }
    }

    /// Running → Completing. Returns true if the state changed.
    pub(crate) fn begin_completing(&mut self) -> bool {
        match self.state {
            TaskState::Running => {
                trace!(task = self.serial, from = "running", to = "completing", "task state transition");
                self.state = TaskState::Completing;
                true
            }
            _ => false,
        }
    }

    /// Running | Completing → Erroring. Returns true if the state changed.
    pub(crate) fn begin_erroring(&mut self) -> bool {
        match self.state {
            TaskState::Running | TaskState::Completing => {
                trace!(task = self.serial, from = self.state.name(), to = "erroring", "task state transition");
                self.state = TaskState::Erroring;
                true
            }
            _ => false,
        }
    }

    /// Running | Completing | Erroring → Halting. Returns true if changed.
    ///
    /// Entering `halting` discards whatever was staged; a halted task has
    /// neither result nor error.
    pub(crate) fn begin_halting(&mut self, reason: HaltReason) -> bool {
        match self.state {
            TaskState::Running | TaskState::Completing | TaskState::Erroring => {
                trace!(
                    task = self.serial,
                    from = self.state.name(),
                    to = "halting",
                    reason = %reason,
                    "task state transition"
                );
                self.state = TaskState::Halting;
                self.staged = None;
                self.halt_reason = Some(reason);
                true
            }
            _ => false,
        }
    }

    /// Finishing → terminal. Returns the terminal state entered.
    pub(crate) fn finish(&mut self) -> Option<TaskState> {
        let terminal = match self.state {
            TaskState::Completing => TaskState::Completed,
            TaskState::Erroring => TaskState::Errored,
            TaskState::Halting => TaskState::Halted,
            _ => return None,
        };
        trace!(task = self.serial, from = self.state.name(), to = terminal.name(), "task state transition");
        self.state = terminal;
        Some(terminal)
    }

    /// Removes `child` from the children set, preserving spawn order.
    pub(crate) fn remove_child(&mut self, child: TaskId) -> bool {
        match self.children.iter().position(|&c| c == child) {
            Some(pos) => {
                self.children.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Returns true once the task may enter its terminal state.
    pub(crate) fn ready_to_finish(&self) -> bool {
        self.state.is_finishing() && self.controller.done && self.children.is_empty()
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("serial", &self.serial)
            .field("state", &self.state)
            .field("parent", &self.parent)
            .field("children", &self.children.len())
            .field("body", &self.controller.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::DeferredState;
    use crate::util::ArenaIndex;

    fn record() -> TaskRecord {
        TaskRecord::new(
            TaskId::from_arena(ArenaIndex::new(0, 0)),
            1,
            None,
            SpawnOptions::default(),
            RawOp::Value(crate::op::nil()),
            DeferredState::new_cell(),
        )
    }

    #[test]
    fn happy_path_transitions() {
        let mut t = record();
        assert_eq!(t.state, TaskState::Pending);
        assert!(t.start());
        assert!(t.begin_completing());
        t.controller.done = true;
        assert!(t.ready_to_finish());
        assert_eq!(t.finish(), Some(TaskState::Completed));
        assert!(t.state.is_terminal());
    }

    #[test]
    fn reject_from_completing_is_legal() {
        let mut t = record();
        t.start();
        t.begin_completing();
        assert!(t.begin_erroring());
        assert_eq!(t.finish(), Some(TaskState::Errored));
    }

    #[test]
    fn halt_supersedes_erroring_and_discards_staging() {
        let mut t = record();
        t.start();
        t.begin_erroring();
        t.staged = Some(Err(Error::operation("x")));
        assert!(t.begin_halting(HaltReason::default()));
        assert!(t.staged.is_none());
        assert_eq!(t.finish(), Some(TaskState::Halted));
    }

    #[test]
    fn illegal_triggers_are_rejected() {
        let mut t = record();
        assert!(!t.begin_completing());
        assert!(!t.begin_halting(HaltReason::default()));
        assert!(t.finish().is_none());

        t.start();
        t.begin_completing();
        t.controller.done = true;
        t.finish();
        // Terminal is absorbing.
        assert!(!t.start());
        assert!(!t.begin_erroring());
        assert!(!t.begin_halting(HaltReason::default()));
    }

    #[test]
    fn finish_waits_for_children_and_controller() {
        let mut t = record();
        t.start();
        t.begin_completing();
        assert!(!t.ready_to_finish());
        t.controller.done = true;
        assert!(t.ready_to_finish());
        t.children.push(TaskId::from_arena(ArenaIndex::new(1, 0)));
        assert!(!t.ready_to_finish());
    }

    #[test]
    fn remove_child_preserves_order() {
        let mut t = record();
        let a = TaskId::from_arena(ArenaIndex::new(1, 0));
        let b = TaskId::from_arena(ArenaIndex::new(2, 0));
        let c = TaskId::from_arena(ArenaIndex::new(3, 0));
        t.children.extend([a, b, c]);
        assert!(t.remove_child(b));
        assert_eq!(t.children.as_slice(), &[a, c]);
        assert!(!t.remove_child(b));
    }
}
