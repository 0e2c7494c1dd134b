//! The kernel: owner of the supervision tree and the evaluation loop.
//!
//! The kernel is the single-threaded owner of every task and frame record,
//! the FIFO run queue, the timer heap, and the virtual clock. At any moment
//! exactly one frame makes progress; frames suspend only at instruction
//! boundaries, and a frame may be interrupted only while suspended. There is
//! no locking anywhere in here because nothing is shared across threads.
//!
//! The flow: [`Kernel::run`] creates a root task and drives the queue. Each
//! task's body is driven by a frame: pop a pending
//! signal, step the body, dispatch the yielded instruction. Instructions
//! either settle synchronously (pushing the next signal), park the frame
//! behind a wait, or create child tasks/frames. Task termination flows
//! through the state machine in `record::task`, the serial halt cascade, and
//! the finalize step that fires ensure hooks, then trappers, then settles
//! the outcome cell.

use crate::deferred::DeferredState;
use crate::error::{Error, ErrorKind};
use crate::op::body::{Body, Signal, Step};
use crate::op::instruction::{EnsureFn, Instruction};
use crate::op::resource::Scope;
use crate::op::{downcast_value, nil, Op, OpValue, RawOp};
use crate::record::{
    FramePhase, FrameRecord, FrameWaiter, TaskRecord, TaskState, Trapper, Wait,
};
use crate::runtime::config::{DeadlockPolicy, KernelBuilder, KernelConfig};
use crate::runtime::controller::BodyKind;
use crate::runtime::events::{Event, EventBus};
use crate::runtime::handle::RawHandle;
use crate::runtime::queue::{RunQueue, Wake, Waker};
use crate::runtime::timer::TimerHeap;
use crate::tracing_compat::{debug, trace, warn};
use crate::types::{Exit, FrameId, HaltReason, Outcome, SpawnOptions, TaskId, Time};
use crate::util::Arena;
use std::any::Any;
use std::rc::Rc;

/// Context key holding the resource scope for the frames of a task.
pub(crate) const SCOPE_KEY: &str = "weft.resource-scope";

/// Error raised when a spawn request is rejected.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SpawnError {
    /// The spawning task is not in the `running` state.
    #[error("spawn on a task that is not running (state: {state})")]
    NotRunning {
        /// The offending task's state.
        state: TaskState,
    },
    /// The configured live-task limit is reached.
    #[error("task admission limit reached ({limit} live tasks)")]
    LimitReached {
        /// The configured limit.
        limit: usize,
    },
}

impl From<SpawnError> for Error {
    fn from(e: SpawnError) -> Self {
        let kind = match e {
            SpawnError::NotRunning { .. } => ErrorKind::Programmer,
            SpawnError::LimitReached { .. } => ErrorKind::Admission,
        };
        Self::new(kind).with_context(e.to_string())
    }
}

/// The cooperative structured-concurrency kernel.
pub struct Kernel {
    tasks: Arena<TaskRecord>,
    frames: Arena<FrameRecord>,
    queue: RunQueue,
    timers: TimerHeap,
    now: Time,
    bus: EventBus,
    next_serial: u64,
    config: KernelConfig,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    /// Creates a kernel with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    /// Starts building a configured kernel.
    #[must_use]
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    pub(crate) fn with_config(config: KernelConfig) -> Self {
        Self {
            tasks: Arena::new(),
            frames: Arena::new(),
            queue: RunQueue::new(),
            timers: TimerHeap::new(),
            now: Time::ZERO,
            bus: EventBus::new(),
            next_serial: 0,
            config,
        }
    }

    /// Returns the configuration this kernel was built with.
    #[must_use]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Returns the current reading of the virtual clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.now
    }

    /// Returns the number of live (non-terminal) tasks.
    #[must_use]
    pub fn live_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Registers a synchronous observer for state, link, and unlink events.
    ///
    /// Listeners run at the transition point and must not call back into the
    /// kernel.
    pub fn subscribe(&self, listener: impl FnMut(&Event) + 'static) {
        self.bus.subscribe(listener);
    }

    /// Runs `op` as the root task to completion and returns its outcome.
    ///
    /// Drives the run queue until the root terminates, advancing the virtual
    /// clock whenever the schedule has only timers left. If the schedule
    /// goes quiescent with the root still live, the configured
    /// [`DeadlockPolicy`] applies.
    pub fn run<T: Clone + 'static>(&mut self, op: Op<T>) -> Outcome<T> {
        let root = match self.create_task(None, op.raw, SpawnOptions::default()) {
            Ok(id) => id,
            Err(e) => return Outcome::Errored(e),
        };
        let outcome = self
            .tasks
            .get(root.arena_index())
            .expect("root record just created")
            .outcome
            .clone();
        self.start_task(root);

        let mut deadlock_recovery = false;
        loop {
            while let Some(wake) = self.queue.pop() {
                self.deliver(wake);
            }
            if let Some(result) = DeferredState::peek(&outcome) {
                return match result {
                    Ok(v) => match downcast_value::<T>(v) {
                        Ok(value) => Outcome::Completed(value),
                        Err(e) => Outcome::Errored(e),
                    },
                    Err(e) if e.is_halted() => Outcome::Halted,
                    Err(e) => Outcome::Errored(e),
                };
            }
            if let Some(at) = self.timers.next_deadline() {
                if self.now < at {
                    trace!(now = %self.now, next = %at, "advancing virtual clock");
                    self.now = at;
                }
                while let Some((frame, epoch)) = self.timers.pop_due(self.now) {
                    self.queue.push(Wake {
                        frame,
                        epoch,
                        signal: Ok(nil()),
                    });
                }
                continue;
            }
            match self.config.deadlock {
                DeadlockPolicy::HaltRoot if !deadlock_recovery => {
                    deadlock_recovery = true;
                    warn!("schedule quiescent with live tasks; halting root");
                    let _ = self.halt_task(root, HaltReason::deadlock());
                }
                _ => {
                    return Outcome::Errored(
                        Error::new(ErrorKind::Deadlock)
                            .with_context("schedule went quiescent with live tasks"),
                    )
                }
            }
        }
    }

    // ── Task lifecycle ───────────────────────────────────────────────────

    fn create_task(
        &mut self,
        parent: Option<TaskId>,
        op: RawOp,
        options: SpawnOptions,
    ) -> Result<TaskId, Error> {
        if let Some(limit) = self.config.max_tasks {
            if self.tasks.len() >= limit {
                return Err(SpawnError::LimitReached { limit }.into());
            }
        }
        self.next_serial += 1;
        let serial = self.next_serial;
        let outcome = DeferredState::new_cell();
        let id = TaskId::from_arena(self.tasks.insert_with(|idx| {
            TaskRecord::new(
                TaskId::from_arena(idx),
                serial,
                parent,
                options,
                op,
                outcome.clone(),
            )
        }));
        if let Some(p) = parent {
            let parent_serial = self.serial_of(p);
            if let Some(prec) = self.tasks.get_mut(p.arena_index()) {
                prec.children.push(id);
            }
            if let Some(crec) = self.tasks.get_mut(id.arena_index()) {
                crec.trappers.push(Trapper::Parent(p));
            }
            debug!(parent = parent_serial, child = serial, "task linked");
            self.bus.emit(&Event::Link {
                parent: parent_serial,
                child: serial,
            });
        }
        Ok(id)
    }

    /// Starts a pending task: transition to running and enqueue the first
    /// body step. The body itself does not run until the queue reaches it.
    fn start_task(&mut self, tid: TaskId) {
        let (op, serial, scope) = {
            let Some(rec) = self.tasks.get_mut(tid.arena_index()) else {
                return;
            };
            let Some(op) = rec.pending_op.take() else {
                return;
            };
            if !rec.start() {
                return;
            }
            let kind = BodyKind::classify(&op);
            rec.controller.kind = Some(kind);
            debug!(task = rec.serial, body = ?kind, "task started");
            (op, rec.serial, rec.options.resource_scope.unwrap_or(tid))
        };
        self.emit_state(serial, TaskState::Pending, TaskState::Running);
        let fid = self.create_frame(tid, None, op.into_body(), FrameWaiter::Task(tid));
        if let Some(frame) = self.frames.get_mut(fid.arena_index()) {
            frame.context.insert(SCOPE_KEY, Rc::new(scope));
            frame.wait = Wait::Queued;
            let epoch = frame.epoch;
            self.queue.push(Wake {
                frame: fid,
                epoch,
                signal: Ok(nil()),
            });
        }
        if let Some(rec) = self.tasks.get_mut(tid.arena_index()) {
            rec.controller.frame = Some(fid);
        }
    }

    fn spawn_from(
        &mut self,
        parent: TaskId,
        op: RawOp,
        options: SpawnOptions,
    ) -> Result<OpValue, Error> {
        let Some(prec) = self.tasks.get(parent.arena_index()) else {
            return Err(Error::programmer("spawn on a task that no longer exists"));
        };
        if !prec.state.is_running() {
            return Err(SpawnError::NotRunning { state: prec.state }.into());
        }
        let child = self.create_task(Some(parent), op, options)?;
        self.start_task(child);
        let rec = self
            .tasks
            .get(child.arena_index())
            .expect("child record just created");
        Ok(Rc::new(RawHandle {
            task: child,
            id: rec.serial,
            outcome: rec.outcome.clone(),
        }))
    }

    /// Body resolved: enter `completing`, release non-blocking children, and
    /// finish once the children set drains.
    fn resolve_task(&mut self, tid: TaskId, value: OpValue) {
        let serial = {
            let Some(rec) = self.tasks.get_mut(tid.arena_index()) else {
                return;
            };
            if !rec.begin_completing() {
                return;
            }
            rec.staged = Some(Ok(value));
            rec.serial
        };
        self.emit_state(serial, TaskState::Running, TaskState::Completing);
        self.halt_children(tid, false);
        self.resume_task(tid);
    }

    /// Body or child failed: enter `erroring`, tear the body down, and run a
    /// forced cascade over the children.
    fn reject_task(&mut self, tid: TaskId, error: Error) {
        let Some(rec) = self.tasks.get_mut(tid.arena_index()) else {
            return;
        };
        match rec.state {
            TaskState::Running | TaskState::Completing => {
                let from = rec.state;
                rec.begin_erroring();
                rec.staged = Some(Err(error));
                let serial = rec.serial;
                let frame = rec.controller.frame;
                self.emit_state(serial, from, TaskState::Erroring);
                if let Some(f) = frame {
                    self.destroy_frame(f, None);
                }
                self.halt_children(tid, true);
                self.resume_task(tid);
            }
            TaskState::Erroring => {
                debug!(task = rec.serial, error = %error, "additional error while erroring; keeping the first");
            }
            _ => {}
        }
    }

    /// Requests a halt. Idempotent and eventually terminal; a pending task
    /// is the only illegal target.
    pub(crate) fn halt_task(&mut self, tid: TaskId, reason: HaltReason) -> Result<(), Error> {
        let Some(rec) = self.tasks.get_mut(tid.arena_index()) else {
            return Ok(());
        };
        match rec.state {
            TaskState::Pending => Err(Error::programmer("halt on a task that was never started")),
            TaskState::Running | TaskState::Completing | TaskState::Erroring => {
                let from = rec.state;
                rec.begin_halting(reason);
                let serial = rec.serial;
                let frame = rec.controller.frame;
                self.emit_state(serial, from, TaskState::Halting);
                if let Some(f) = frame {
                    self.destroy_frame(f, None);
                }
                self.halt_children(tid, true);
                self.resume_task(tid);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Walks the children in reverse spawn order and halts the first
    /// haltable one, scheduling a trapper that re-enters this walk when it
    /// terminates. Halts therefore proceed one child at a time.
    ///
    /// `force` is false only on the normal-resolve path, where
    /// `block_parent` children survive and are waited for instead.
    fn halt_children(&mut self, parent: TaskId, force: bool) {
        let Some(rec) = self.tasks.get(parent.arena_index()) else {
            return;
        };
        let children: Vec<TaskId> = rec.children.iter().copied().collect();
        for child in children.into_iter().rev() {
            let Some(crec) = self.tasks.get_mut(child.arena_index()) else {
                continue;
            };
            if crec.state.is_terminal() {
                continue;
            }
            if force || !crec.options.block_parent {
                crec.trappers.push(Trapper::Cascade { parent, force });
                let _ = self.halt_task(child, HaltReason::cascade());
                return;
            }
        }
    }

    /// Advances a finishing task to its terminal state once its body has
    /// exited and its children set is empty.
    fn resume_task(&mut self, tid: TaskId) {
        let (from, terminal, serial) = {
            let Some(rec) = self.tasks.get_mut(tid.arena_index()) else {
                return;
            };
            if !rec.ready_to_finish() {
                return;
            }
            let from = rec.state;
            let Some(terminal) = rec.finish() else {
                return;
            };
            (from, terminal, rec.serial)
        };
        self.emit_state(serial, from, terminal);
        self.finalize_task(tid, terminal, serial);
    }

    /// Terminal entry: ensure hooks in registration order, then trappers,
    /// then the outcome settles and the record is destroyed.
    fn finalize_task(&mut self, tid: TaskId, terminal: TaskState, serial: u64) {
        let (ensures, trappers, staged, halt_reason, outcome, ignore_error) = {
            let rec = self
                .tasks
                .get_mut(tid.arena_index())
                .expect("finalizing task record");
            (
                std::mem::take(&mut rec.ensures),
                std::mem::take(&mut rec.trappers),
                rec.staged.take(),
                rec.halt_reason,
                rec.outcome.clone(),
                rec.options.ignore_error,
            )
        };
        trace!(task = serial, state = terminal.name(), hooks = ensures.len(), "running ensure hooks");
        for hook in ensures {
            hook();
        }
        let child_error = match (&terminal, &staged) {
            (TaskState::Errored, Some(Err(e))) => Some(e.clone()),
            _ => None,
        };
        for trapper in trappers {
            match trapper {
                Trapper::Parent(parent) => {
                    self.parent_trap(parent, tid, serial, terminal, child_error.clone(), ignore_error);
                }
                Trapper::Cascade { parent, force } => self.halt_children(parent, force),
            }
        }
        let result = match terminal {
            TaskState::Completed => staged.unwrap_or(Ok(nil())),
            TaskState::Errored => {
                staged.unwrap_or_else(|| Err(Error::operation("task errored")))
            }
            _ => Err(Error::halted_because(halt_reason.unwrap_or_default())),
        };
        DeferredState::settle(&outcome, result);
        self.tasks.remove(tid.arena_index());
        debug!(task = serial, state = terminal.name(), "task destroyed");
    }

    /// The parent's trap on a terminal child: propagate the error unless
    /// masked, unlink, resume.
    fn parent_trap(
        &mut self,
        parent: TaskId,
        child: TaskId,
        child_serial: u64,
        child_state: TaskState,
        child_error: Option<Error>,
        child_ignores_error: bool,
    ) {
        let Some(prec) = self.tasks.get(parent.arena_index()) else {
            return;
        };
        let parent_serial = prec.serial;
        let parent_ignores = prec.options.ignore_child_errors;
        if child_state == TaskState::Errored && !child_ignores_error && !parent_ignores {
            if let Some(error) = child_error {
                self.reject_task(parent, error);
            }
        }
        if let Some(prec) = self.tasks.get_mut(parent.arena_index()) {
            if prec.remove_child(child) {
                self.bus.emit(&Event::Unlink {
                    parent: parent_serial,
                    child: child_serial,
                });
            }
        }
        self.resume_task(parent);
    }

    fn register_ensure(&mut self, target: TaskId, hook: EnsureFn) {
        match self.tasks.get_mut(target.arena_index()) {
            Some(rec) if !rec.state.is_terminal() => rec.ensures.push(hook),
            // Terminal or destroyed: the hook's moment has passed; run it now.
            _ => hook(),
        }
    }

    // ── Frame evaluation ─────────────────────────────────────────────────

    fn create_frame(
        &mut self,
        owner: TaskId,
        parent: Option<FrameId>,
        body: Box<dyn Body>,
        waiter: FrameWaiter,
    ) -> FrameId {
        let fid = FrameId::from_arena(self.frames.insert_with(|idx| {
            FrameRecord::new(FrameId::from_arena(idx), owner, parent, body, waiter)
        }));
        if let Some(p) = parent {
            if let Some(prec) = self.frames.get_mut(p.arena_index()) {
                prec.children.push(fid);
            }
        }
        fid
    }

    /// Seeds a fresh frame's initial resumption and drives it inline.
    fn kick_frame(&mut self, fid: FrameId) {
        if let Some(frame) = self.frames.get_mut(fid.arena_index()) {
            frame.thunks.push(Signal::Resume(nil()));
        }
        self.drive(fid);
    }

    /// The evaluation loop: pop a pending signal, step the body, dispatch
    /// the yielded instruction. Stops when the frame parks (no thunks) or
    /// the body returns.
    fn drive(&mut self, fid: FrameId) {
        {
            let Some(frame) = self.frames.get_mut(fid.arena_index()) else {
                return;
            };
            if frame.driving {
                return;
            }
            frame.driving = true;
        }
        loop {
            let (signal, mut body) = {
                let Some(frame) = self.frames.get_mut(fid.arena_index()) else {
                    return;
                };
                let Some(signal) = frame.thunks.pop() else {
                    break;
                };
                let Some(body) = frame.body.take() else {
                    break;
                };
                (signal, body)
            };
            match body.resume(signal) {
                Step::Done(result) => {
                    if let Some(frame) = self.frames.get_mut(fid.arena_index()) {
                        frame.driving = false;
                    }
                    self.begin_exit(fid, result);
                    return;
                }
                Step::Yield(instr) => {
                    let Some(frame) = self.frames.get_mut(fid.arena_index()) else {
                        return;
                    };
                    frame.body = Some(body);
                    self.dispatch(fid, instr);
                }
            }
        }
        if let Some(frame) = self.frames.get_mut(fid.arena_index()) {
            frame.driving = false;
        }
    }

    /// Pushes an instruction outcome into the frame as its next signal.
    fn settle_frame(&mut self, fid: FrameId, result: Result<OpValue, Error>) {
        let Some(frame) = self.frames.get_mut(fid.arena_index()) else {
            return;
        };
        let signal = match result {
            Ok(v) => Signal::Resume(v),
            Err(e) => Signal::Throw(e),
        };
        frame.thunks.push(signal);
    }

    fn owner_of(&self, fid: FrameId) -> Option<TaskId> {
        self.frames.get(fid.arena_index()).map(|f| f.owner)
    }

    fn serial_of(&self, tid: TaskId) -> u64 {
        self.tasks.get(tid.arena_index()).map_or(0, |r| r.serial)
    }

    pub(crate) fn context_lookup(&self, fid: FrameId, key: &str) -> Option<Rc<dyn Any>> {
        let mut cursor = Some(fid);
        while let Some(f) = cursor {
            let frame = self.frames.get(f.arena_index())?;
            if let Some(value) = frame.context.get(key) {
                return Some(value.clone());
            }
            cursor = frame.parent;
        }
        None
    }

    /// Interprets one instruction against the frame.
    fn dispatch(&mut self, fid: FrameId, instr: Instruction) {
        match instr {
            Instruction::Settle(s) => self.settle_frame(fid, s.result),
            Instruction::Action(a) => {
                let result = (a.run)(&mut FrameView {
                    kernel: &mut *self,
                    frame: fid,
                });
                self.settle_frame(fid, result);
            }
            Instruction::Ensure(e) => {
                let Some(target) = e.task.or_else(|| self.owner_of(fid)) else {
                    return;
                };
                self.register_ensure(target, e.hook);
                self.settle_frame(fid, Ok(nil()));
            }
            Instruction::Spawn(s) => {
                let Some(parent) = s.parent.or_else(|| self.owner_of(fid)) else {
                    return;
                };
                let result = self.spawn_from(parent, s.op, s.options);
                self.settle_frame(fid, result);
            }
            Instruction::Suspend(s) => {
                {
                    let Some(frame) = self.frames.get_mut(fid.arena_index()) else {
                        return;
                    };
                    frame.wait = Wait::External { cancel: None };
                }
                let epoch = self
                    .frames
                    .get(fid.arena_index())
                    .map_or(0, |f| f.epoch);
                let waker = Waker::new(self.queue.clone(), fid, epoch);
                let cancel = (s.install)(waker);
                if let Some(frame) = self.frames.get_mut(fid.arena_index()) {
                    if let Wait::External { cancel: slot } = &mut frame.wait {
                        *slot = cancel;
                    }
                }
            }
            Instruction::Sleep(s) => {
                let at = self.now + s.duration;
                let Some(frame) = self.frames.get_mut(fid.arena_index()) else {
                    return;
                };
                frame.wait = Wait::Timer;
                let epoch = frame.epoch;
                self.timers.push(at, fid, epoch);
            }
            Instruction::AwaitDeferred(a) => {
                if let Some(result) = DeferredState::peek(&a.cell) {
                    self.settle_frame(fid, result);
                    return;
                }
                let Some(frame) = self.frames.get_mut(fid.arena_index()) else {
                    return;
                };
                let epoch = frame.epoch;
                let cell = a.cell.clone();
                frame.wait = Wait::Deferred {
                    cell: a.cell,
                    cancel: a.cancel,
                };
                DeferredState::poll(&cell, Waker::new(self.queue.clone(), fid, epoch));
            }
            Instruction::HaltTask(h) => {
                if let Err(e) = self.halt_task(h.task, HaltReason::new(crate::types::HaltKind::Explicit)) {
                    self.settle_frame(fid, Err(e));
                    return;
                }
                let Some(frame) = self.frames.get_mut(fid.arena_index()) else {
                    return;
                };
                if frame.aborted {
                    // The halt tore this frame down too; the abort signal is
                    // already queued on the thunk stack.
                    return;
                }
                if DeferredState::is_settled(&h.outcome) {
                    frame.thunks.push(Signal::Resume(nil()));
                    return;
                }
                let epoch = frame.epoch;
                frame.wait = Wait::Deferred {
                    cell: h.outcome.clone(),
                    cancel: None,
                };
                DeferredState::poll(
                    &h.outcome,
                    Waker::new(self.queue.clone(), fid, epoch).discarding(),
                );
            }
            Instruction::Call(c) => {
                let Some(owner) = self.owner_of(fid) else {
                    return;
                };
                let cf = self.create_frame(owner, Some(fid), c.op.into_body(), FrameWaiter::Frame(fid));
                if let Some(frame) = self.frames.get_mut(fid.arena_index()) {
                    frame.wait = Wait::ChildExit {
                        frame: cf,
                        owned: true,
                    };
                }
                self.kick_frame(cf);
            }
            Instruction::Resource(r) => {
                let Some(owner) = self.owner_of(fid) else {
                    return;
                };
                let scope_task = self
                    .context_lookup(fid, SCOPE_KEY)
                    .and_then(|v| v.downcast::<TaskId>().ok())
                    .map_or(owner, |rc| *rc);
                let (scope_frame, scope_serial) = {
                    let Some(scope_rec) = self.tasks.get(scope_task.arena_index()) else {
                        self.settle_frame(
                            fid,
                            Err(Error::programmer("resource scope no longer exists")),
                        );
                        return;
                    };
                    if !scope_rec.state.is_running() {
                        self.settle_frame(
                            fid,
                            Err(Error::programmer("resource scope is not accepting work")),
                        );
                        return;
                    }
                    match scope_rec.controller.frame {
                        Some(f) => (f, scope_rec.serial),
                        None => {
                            self.settle_frame(
                                fid,
                                Err(Error::programmer("resource scope is not accepting work")),
                            );
                            return;
                        }
                    }
                };
                let scope = Scope {
                    task: scope_task,
                    id: scope_serial,
                };
                let raw = (r.init)(scope);
                let cf = self.create_frame(
                    scope_task,
                    Some(scope_frame),
                    raw.into_body(),
                    FrameWaiter::Frame(fid),
                );
                if let Some(frame) = self.frames.get_mut(fid.arena_index()) {
                    frame.wait = Wait::ChildExit {
                        frame: cf,
                        owned: false,
                    };
                }
                self.kick_frame(cf);
            }
        }
    }

    /// Delivers a queued wake to its frame, dropping it if stale.
    fn deliver(&mut self, wake: Wake) {
        let Some(frame) = self.frames.get_mut(wake.frame.arena_index()) else {
            return;
        };
        if frame.epoch != wake.epoch || frame.wait.is_none() {
            return;
        }
        let _ = frame.clear_wait();
        let signal = match wake.signal {
            Ok(v) => Signal::Resume(v),
            Err(e) => Signal::Throw(e),
        };
        frame.thunks.push(signal);
        self.drive(wake.frame);
    }

    /// Tears a frame down: installs the abort flags, cancels the current
    /// wait, and lets the body unwind. The body may keep yielding cleanup
    /// instructions afterwards; the frame still ends aborted.
    pub(crate) fn destroy_frame(&mut self, fid: FrameId, reason: Option<Error>) {
        {
            let Some(frame) = self.frames.get_mut(fid.arena_index()) else {
                return;
            };
            if frame.aborted {
                if frame.crash.is_none() {
                    frame.crash = reason;
                }
                return;
            }
            frame.aborted = true;
            frame.crash = reason;
            if frame.phase == FramePhase::Draining {
                // Already unwinding; the drain keeps going and the exit
                // classification picks up the abort flags.
                return;
            }
        }
        let wait = self
            .frames
            .get_mut(fid.arena_index())
            .map(FrameRecord::clear_wait)
            .unwrap_or(Wait::None);
        match wait {
            Wait::None | Wait::Queued | Wait::Timer => {}
            Wait::Deferred { cell, cancel } => {
                DeferredState::forget_waiter(&cell, fid);
                if let Some(c) = cancel {
                    c();
                }
            }
            Wait::External { cancel } => {
                if let Some(c) = cancel {
                    c();
                }
            }
            Wait::ChildExit { frame: child, owned } => {
                if owned {
                    // The child stays linked; the drain tears it down.
                } else {
                    if let Some(crec) = self.frames.get_mut(child.arena_index()) {
                        crec.waiter = FrameWaiter::Detached;
                    }
                    self.destroy_frame(child, None);
                }
            }
        }
        let driving = {
            let Some(frame) = self.frames.get_mut(fid.arena_index()) else {
                return;
            };
            frame.thunks.push(Signal::Abort);
            frame.driving
        };
        if !driving {
            self.drive(fid);
        }
    }

    /// The body returned; record its result and drain the sub-frames in
    /// reverse creation order.
    fn begin_exit(&mut self, fid: FrameId, result: Result<OpValue, Error>) {
        let Some(frame) = self.frames.get_mut(fid.arena_index()) else {
            return;
        };
        frame.phase = FramePhase::Draining;
        frame.body_result = Some(result);
        self.drain_next(fid);
    }

    /// Destroys the youngest remaining sub-frame and waits for its exit,
    /// repeating until none remain, then finishes the frame's own exit.
    fn drain_next(&mut self, fid: FrameId) {
        loop {
            let child = {
                let Some(frame) = self.frames.get_mut(fid.arena_index()) else {
                    return;
                };
                debug_assert_eq!(frame.phase, FramePhase::Draining);
                match frame.children.last().copied() {
                    Some(child) => {
                        frame.wait = Wait::ChildExit {
                            frame: child,
                            owned: true,
                        };
                        frame.drain_inline = true;
                        child
                    }
                    None => break,
                }
            };
            self.destroy_frame(child, None);
            let Some(frame) = self.frames.get_mut(fid.arena_index()) else {
                return;
            };
            frame.drain_inline = false;
            if !frame.wait.is_none() {
                // Child teardown is asynchronous; the drain resumes when its
                // exit is delivered.
                return;
            }
        }
        self.finish_exit(fid);
    }

    /// Classifies the frame's exit and notifies its waiter.
    fn finish_exit(&mut self, fid: FrameId) {
        let Some(record) = self.frames.remove(fid.arena_index()) else {
            return;
        };
        if let Some(pfid) = record.parent {
            if let Some(parent) = self.frames.get_mut(pfid.arena_index()) {
                parent.remove_child(fid);
            }
        }
        let teardown_error = if record.teardown.is_empty() {
            None
        } else {
            Some(Error::teardown(&record.teardown))
        };
        let exit = if record.aborted {
            match record.crash {
                Some(e) => Exit::Crashed(e),
                None => match teardown_error {
                    Some(e) => Exit::Crashed(e),
                    None => Exit::Aborted,
                },
            }
        } else {
            match record.body_result.unwrap_or_else(|| Ok(nil())) {
                Ok(v) => match teardown_error {
                    Some(e) => Exit::Err(e),
                    None => Exit::Ok(v),
                },
                Err(e) => Exit::Err(e),
            }
        };
        match record.waiter {
            FrameWaiter::Task(tid) => self.controller_exit(tid, exit),
            FrameWaiter::Frame(pfid) => self.deliver_to_parent(pfid, fid, exit),
            FrameWaiter::Detached => {
                if let Exit::Err(_e) | Exit::Crashed(_e) = exit {
                    warn!(error = %_e, "detached frame exited with an error");
                }
            }
        }
    }

    /// Routes a sub-frame's exit into the frame that was waiting on it.
    fn deliver_to_parent(&mut self, pfid: FrameId, child: FrameId, exit: Exit) {
        let (matches_wait, draining, drain_inline, driving) = {
            let Some(parent) = self.frames.get_mut(pfid.arena_index()) else {
                if let Exit::Err(_e) | Exit::Crashed(_e) = exit {
                    warn!(error = %_e, "sub-frame error lost; waiting frame is gone");
                }
                return;
            };
            let matches_wait = matches!(
                parent.wait,
                Wait::ChildExit { frame, .. } if frame == child
            );
            if matches_wait {
                let _ = parent.clear_wait();
            }
            (
                matches_wait,
                parent.phase == FramePhase::Draining,
                parent.drain_inline,
                parent.driving,
            )
        };
        if !matches_wait {
            // The parent aborted past this wait; keep the teardown error.
            if let Exit::Err(e) | Exit::Crashed(e) = exit {
                if let Some(parent) = self.frames.get_mut(pfid.arena_index()) {
                    parent.teardown.push(e);
                }
            }
            return;
        }
        if draining {
            if let Exit::Err(e) | Exit::Crashed(e) = exit {
                if let Some(parent) = self.frames.get_mut(pfid.arena_index()) {
                    parent.teardown.push(e);
                }
            }
            if !drain_inline {
                self.drain_next(pfid);
            }
            return;
        }
        let signal = match exit {
            Exit::Ok(v) => Signal::Resume(v),
            Exit::Err(e) | Exit::Crashed(e) => Signal::Throw(e),
            Exit::Aborted => Signal::Throw(Error::operation(
                "sub-operation aborted before settling",
            )),
        };
        if let Some(parent) = self.frames.get_mut(pfid.arena_index()) {
            parent.thunks.push(signal);
        }
        if !driving {
            self.drive(pfid);
        }
    }

    /// A task's root frame exited; settle the controller and advance the
    /// state machine.
    fn controller_exit(&mut self, tid: TaskId, exit: Exit) {
        {
            let Some(rec) = self.tasks.get_mut(tid.arena_index()) else {
                return;
            };
            rec.controller.finish();
        }
        match exit {
            Exit::Ok(v) => self.resolve_task(tid, v),
            Exit::Err(e) => self.reject_task(tid, e),
            Exit::Aborted => self.resume_task(tid),
            Exit::Crashed(_e) => {
                warn!(error = %_e, "teardown error while halting; task still halts");
                self.resume_task(tid);
            }
        }
    }

    fn emit_state(&self, task: u64, from: TaskState, to: TaskState) {
        trace!(task, from = from.name(), to = to.name(), "state event");
        self.bus.emit(&Event::State { task, from, to });
    }

    /// Reads a task's current state, if its record is still live.
    pub(crate) fn state_of(&self, tid: TaskId) -> Option<TaskState> {
        self.tasks.get(tid.arena_index()).map(|r| r.state)
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("tasks", &self.tasks.len())
            .field("frames", &self.frames.len())
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

/// A body's window onto its frame during an action instruction.
///
/// Provides access to the frame's context dictionary (scope-local values
/// inherited through the parent chain) and the virtual clock. It does not
/// expose the supervision tree; tree mutations go through instructions.
pub struct FrameView<'k> {
    kernel: &'k mut Kernel,
    frame: FrameId,
}

impl FrameView<'_> {
    /// Returns the public id of the task this frame works under.
    #[must_use]
    pub fn task(&self) -> u64 {
        self.kernel
            .owner_of(self.frame)
            .map_or(0, |tid| self.kernel.serial_of(tid))
    }

    /// Returns the current reading of the virtual clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.kernel.now
    }

    /// Looks up a context value, falling back through the parent frames.
    #[must_use]
    pub fn get<T: 'static>(&self, key: &str) -> Option<Rc<T>> {
        self.kernel
            .context_lookup(self.frame, key)
            .and_then(|v| v.downcast::<T>().ok())
    }

    /// Sets a context value on this frame, visible to it and its sub-frames.
    pub fn set<T: 'static>(&mut self, key: &'static str, value: T) {
        if let Some(frame) = self.kernel.frames.get_mut(self.frame.arena_index()) {
            frame.context.insert(key, Rc::new(value));
        }
    }

    pub(crate) fn state_of(&self, task: TaskId) -> Option<TaskState> {
        self.kernel.state_of(task)
    }
}

impl std::fmt::Debug for FrameView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameView")
            .field("frame", &self.frame)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op;

    #[test]
    fn run_value_op_completes() {
        let mut kernel = Kernel::new();
        let outcome = kernel.run(Op::value(42_i32));
        assert_eq!(outcome.unwrap(), 42);
        assert_eq!(kernel.live_tasks(), 0);
    }

    #[test]
    fn run_failing_op_errors() {
        let mut kernel = Kernel::new();
        let outcome = kernel.run(Op::<i32>::fail(Error::operation("boom")));
        match outcome {
            Outcome::Errored(e) => assert_eq!(e.context_str(), Some("boom")),
            other => panic!("expected error outcome, got {other}"),
        }
    }

    #[test]
    fn sleep_advances_virtual_clock() {
        let mut kernel = Kernel::new();
        let outcome = kernel.run(op::sleep(std::time::Duration::from_millis(250)));
        assert!(outcome.is_completed());
        assert_eq!(kernel.now().as_millis(), 250);
    }

    #[test]
    fn deadlock_policy_fail_reports_error() {
        let mut kernel = Kernel::builder()
            .deadlock(DeadlockPolicy::Fail)
            .build();
        let outcome = kernel.run(op::never::<i32>());
        match outcome {
            Outcome::Errored(e) => assert_eq!(e.kind(), ErrorKind::Deadlock),
            other => panic!("expected deadlock error, got {other}"),
        }
    }

    #[test]
    fn deadlock_policy_halt_root_unwinds() {
        let mut kernel = Kernel::new();
        let outcome = kernel.run(op::never::<i32>());
        assert!(outcome.is_halted());
        assert_eq!(kernel.live_tasks(), 0);
    }

    #[test]
    fn admission_limit_rejects_spawns() {
        let mut kernel = Kernel::builder().max_tasks(1).build();
        let outcome = kernel.run(op::spawn(Op::value(1_i32)).then(|h| h.join()));
        match outcome {
            Outcome::Errored(e) => assert_eq!(e.kind(), ErrorKind::Admission),
            other => panic!("expected admission error, got {other}"),
        }
    }

    #[test]
    fn then_chains_through_the_kernel() {
        let mut kernel = Kernel::new();
        let outcome = kernel.run(Op::value(20_i32).then(|n| Op::value(n + 2)).map(|n| n * 2));
        assert_eq!(outcome.unwrap(), 44);
    }
}
