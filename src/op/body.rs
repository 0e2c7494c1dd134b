//! The evaluator protocol and body adapters.
//!
//! A body is the steppable form of an operation: a state machine the
//! evaluator drives by delivering a [`Signal`] and receiving a [`Step`]
//! back. The trio of signals mirrors the classic iterator contract —
//! `Resume` is `next(value)`, `Throw` is `throw(error)`, `Abort` is
//! `return()`.
//!
//! Protocol rules a body must follow:
//!
//! - The first signal is `Resume(nil)`, or `Abort` if the frame was torn
//!   down before it ever ran.
//! - A body that has no interest in a thrown error propagates it by
//!   returning `Done(Err(..))`; swallowing it is a `try/catch`.
//! - After `Abort`, the body may keep yielding cleanup instructions — the
//!   evaluator runs them normally — but the frame still ends aborted.
//!
//! The adapters here cover the three controller kinds (plain value,
//! deferred, step body) plus the chaining used by `then`/`and_finally` and
//! single-instruction operations.

use crate::error::Error;
use crate::op::instruction::Instruction;
use crate::op::{nil, OpValue, RawOp};

/// What the evaluator delivers into a suspended body.
pub enum Signal {
    /// The previous instruction settled with a value (or this is the initial
    /// resumption, carrying nil).
    Resume(OpValue),
    /// The previous instruction failed.
    Throw(Error),
    /// The frame is being torn down.
    Abort,
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resume(_) => write!(f, "Resume"),
            Self::Throw(e) => write!(f, "Throw({e})"),
            Self::Abort => write!(f, "Abort"),
        }
    }
}

/// What a body does next.
pub enum Step {
    /// Suspend on an instruction.
    Yield(Instruction),
    /// The body is finished.
    Done(Result<OpValue, Error>),
}

impl Step {
    /// A `Done` step carrying a unit value.
    #[must_use]
    pub fn done_nil() -> Self {
        Self::Done(Ok(nil()))
    }
}

/// A steppable operation body.
pub trait Body: 'static {
    /// Advances the state machine with one signal.
    fn resume(&mut self, signal: Signal) -> Step;
}

impl<F> Body for F
where
    F: FnMut(Signal) -> Step + 'static,
{
    fn resume(&mut self, signal: Signal) -> Step {
        self(signal)
    }
}

/// Body that settles immediately with a prepared result.
pub(crate) struct ImmediateBody {
    result: Option<Result<OpValue, Error>>,
}

impl ImmediateBody {
    pub(crate) fn new(result: Result<OpValue, Error>) -> Self {
        Self {
            result: Some(result),
        }
    }
}

impl Body for ImmediateBody {
    fn resume(&mut self, signal: Signal) -> Step {
        match signal {
            Signal::Abort => Step::done_nil(),
            Signal::Throw(e) => Step::Done(Err(e)),
            Signal::Resume(_) => match self.result.take() {
                Some(result) => Step::Done(result),
                None => Step::done_nil(),
            },
        }
    }
}

/// Body that yields a single instruction and finishes with its outcome.
pub(crate) struct InstrBody {
    instr: Option<Instruction>,
}

impl InstrBody {
    pub(crate) fn new(instr: Instruction) -> Self {
        Self { instr: Some(instr) }
    }
}

impl Body for InstrBody {
    fn resume(&mut self, signal: Signal) -> Step {
        match (self.instr.take(), signal) {
            (_, Signal::Abort) => Step::done_nil(),
            (Some(instr), Signal::Resume(_)) => Step::Yield(instr),
            (Some(_), Signal::Throw(e)) | (None, Signal::Throw(e)) => Step::Done(Err(e)),
            (None, Signal::Resume(v)) => Step::Done(Ok(v)),
        }
    }
}

/// Continuation invoked with the first body's value; produces the next op or
/// fails (e.g. on a value-type mismatch).
pub(crate) type ChainFn = Box<dyn FnOnce(OpValue) -> Result<RawOp, Error>>;

/// Body that runs an inner body, then chains into a second one built from
/// the inner value.
pub(crate) struct ThenBody {
    inner: Box<dyn Body>,
    next: Option<ChainFn>,
    aborted: bool,
}

impl ThenBody {
    pub(crate) fn new(inner: Box<dyn Body>, next: ChainFn) -> Self {
        Self {
            inner,
            next: Some(next),
            aborted: false,
        }
    }
}

impl Body for ThenBody {
    fn resume(&mut self, signal: Signal) -> Step {
        if matches!(signal, Signal::Abort) {
            self.aborted = true;
        }
        match self.inner.resume(signal) {
            Step::Yield(instr) => Step::Yield(instr),
            Step::Done(Ok(v)) => {
                if self.aborted {
                    return Step::Done(Ok(v));
                }
                let Some(next) = self.next.take() else {
                    return Step::Done(Ok(v));
                };
                match next(v) {
                    Ok(raw) => {
                        self.inner = raw.into_body();
                        self.inner.resume(Signal::Resume(nil()))
                    }
                    Err(e) => Step::Done(Err(e)),
                }
            }
            Step::Done(Err(e)) => Step::Done(Err(e)),
        }
    }
}

/// Terminal mapping applied to an inner body's settled result.
pub(crate) type DoneMapFn = Box<dyn FnOnce(Result<OpValue, Error>) -> Result<OpValue, Error>>;

/// Body that rewrites the inner body's final result. Used by `catch_halt`
/// and outcome-discarding waits.
pub(crate) struct MapDoneBody {
    inner: Box<dyn Body>,
    map: Option<DoneMapFn>,
    aborted: bool,
}

impl MapDoneBody {
    pub(crate) fn new(inner: Box<dyn Body>, map: DoneMapFn) -> Self {
        Self {
            inner,
            map: Some(map),
            aborted: false,
        }
    }
}

impl Body for MapDoneBody {
    fn resume(&mut self, signal: Signal) -> Step {
        if matches!(signal, Signal::Abort) {
            self.aborted = true;
        }
        match self.inner.resume(signal) {
            Step::Yield(instr) => Step::Yield(instr),
            Step::Done(res) => {
                if self.aborted {
                    return Step::Done(res);
                }
                match self.map.take() {
                    Some(map) => Step::Done(map(res)),
                    None => Step::Done(res),
                }
            }
        }
    }
}

/// Body that runs cleanup steps after the inner body settles, on every exit
/// path including abort. The inner result is reinstated after a clean
/// cleanup; a cleanup failure replaces it.
pub(crate) struct FinallyBody {
    inner: Box<dyn Body>,
    cleanup: Option<Box<dyn FnOnce() -> RawOp>>,
    saved: Option<Result<OpValue, Error>>,
}

impl FinallyBody {
    pub(crate) fn new(inner: Box<dyn Body>, cleanup: Box<dyn FnOnce() -> RawOp>) -> Self {
        Self {
            inner,
            cleanup: Some(cleanup),
            saved: None,
        }
    }
}

impl Body for FinallyBody {
    fn resume(&mut self, signal: Signal) -> Step {
        match self.inner.resume(signal) {
            Step::Yield(instr) => Step::Yield(instr),
            Step::Done(res) => match self.cleanup.take() {
                Some(cleanup) => {
                    // Body settled; run the cleanup op in its place.
                    self.saved = Some(res);
                    self.inner = cleanup().into_body();
                    let step = self.start_cleanup();
                    self.resume_cleanup(step)
                }
                None => self.finish_cleanup(res),
            },
        }
    }
}

impl FinallyBody {
    fn start_cleanup(&mut self) -> Step {
        self.inner.resume(Signal::Resume(nil()))
    }

    fn resume_cleanup(&mut self, step: Step) -> Step {
        match step {
            Step::Yield(instr) => Step::Yield(instr),
            Step::Done(res) => self.finish_cleanup(res),
        }
    }

    fn finish_cleanup(&mut self, res: Result<OpValue, Error>) -> Step {
        match (res, self.saved.take()) {
            (Ok(_), Some(saved)) => Step::Done(saved),
            (Ok(v), None) => Step::Done(Ok(v)),
            (Err(e), _) => Step::Done(Err(e)),
        }
    }
}

/// Body built lazily from a closure the first time it is resumed.
pub(crate) struct LazyBody {
    build: Option<Box<dyn FnOnce() -> RawOp>>,
    inner: Option<Box<dyn Body>>,
}

impl LazyBody {
    pub(crate) fn new(build: Box<dyn FnOnce() -> RawOp>) -> Self {
        Self {
            build: Some(build),
            inner: None,
        }
    }
}

impl Body for LazyBody {
    fn resume(&mut self, signal: Signal) -> Step {
        if self.inner.is_none() {
            if matches!(signal, Signal::Abort) {
                return Step::done_nil();
            }
            let build = self.build.take().expect("lazy body built twice");
            self.inner = Some(build().into_body());
        }
        self.inner
            .as_mut()
            .expect("lazy body present")
            .resume(signal)
    }
}
