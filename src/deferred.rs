//! One-shot settled results.
//!
//! A deferred is a single-use cell that is settled exactly once with a value
//! or an error, and observed by any number of waiters. The kernel uses the
//! untyped cell for task outcome delivery; the typed [`Deferred`]/[`Resolver`]
//! pair is the integration point for foreign asynchronous values and for
//! combinator signalling.
//!
//! Settling is first-write-wins: later settles report
//! [`SettleError::AlreadySettled`] and change nothing. Waiters registered
//! after settlement are woken immediately.

use crate::error::Error;
use crate::op::OpValue;
use crate::runtime::queue::Waker;
use crate::types::FrameId;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

/// Error returned when settling a deferred that has already settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SettleError {
    /// The deferred was already resolved or rejected.
    #[error("deferred already settled")]
    AlreadySettled,
}

/// Untyped one-shot cell shared between producers, waiters, and the kernel.
#[derive(Default)]
pub(crate) struct DeferredState {
    result: Option<Result<OpValue, Error>>,
    waiters: Vec<Waker>,
}

impl std::fmt::Debug for DeferredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredState")
            .field("settled", &self.result.is_some())
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

pub(crate) type DeferredCell = Rc<RefCell<DeferredState>>;

impl DeferredState {
    pub(crate) fn new_cell() -> DeferredCell {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Settles the cell and wakes every registered waiter.
    pub(crate) fn settle(cell: &DeferredCell, result: Result<OpValue, Error>) -> bool {
        let waiters = {
            let mut state = cell.borrow_mut();
            if state.result.is_some() {
                return false;
            }
            state.result = Some(result);
            std::mem::take(&mut state.waiters)
        };
        let state = cell.borrow();
        let result = state.result.as_ref().expect("just settled");
        for waiter in waiters {
            waiter.wake(result.clone());
        }
        true
    }

    /// Returns the settled result, or registers `waker` and returns `None`.
    pub(crate) fn poll(cell: &DeferredCell, waker: Waker) -> Option<Result<OpValue, Error>> {
        let mut state = cell.borrow_mut();
        match &state.result {
            Some(result) => Some(result.clone()),
            None => {
                state.waiters.push(waker);
                None
            }
        }
    }

    /// Drops the waiter for `frame`, if registered. Called when a waiting
    /// frame is interrupted.
    pub(crate) fn forget_waiter(cell: &DeferredCell, frame: FrameId) {
        cell.borrow_mut().waiters.retain(|w| w.frame() != frame);
    }

    pub(crate) fn is_settled(cell: &DeferredCell) -> bool {
        cell.borrow().result.is_some()
    }

    /// Reads the settled result without registering a waiter.
    pub(crate) fn peek(cell: &DeferredCell) -> Option<Result<OpValue, Error>> {
        cell.borrow().result.clone()
    }
}

/// Creates a connected resolver/deferred pair.
#[must_use]
pub fn deferred<T: 'static>() -> (Resolver<T>, Deferred<T>) {
    let cell = DeferredState::new_cell();
    (
        Resolver {
            cell: cell.clone(),
            _marker: PhantomData,
        },
        Deferred {
            cell,
            cancel: None,
            _marker: PhantomData,
        },
    )
}

/// The producing half of a deferred.
///
/// Cloneable so several competitors can race to settle; exactly one wins.
pub struct Resolver<T> {
    cell: DeferredCell,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Resolver<T> {
    /// Resolves the deferred with a value.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError::AlreadySettled`] if it was already settled.
    pub fn resolve(&self, value: T) -> Result<(), SettleError> {
        if DeferredState::settle(&self.cell, Ok(Rc::new(value))) {
            Ok(())
        } else {
            Err(SettleError::AlreadySettled)
        }
    }

    /// Rejects the deferred with an error.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError::AlreadySettled`] if it was already settled.
    pub fn reject(&self, error: Error) -> Result<(), SettleError> {
        if DeferredState::settle(&self.cell, Err(error)) {
            Ok(())
        } else {
            Err(SettleError::AlreadySettled)
        }
    }
}

impl<T> std::fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("settled", &DeferredState::is_settled(&self.cell))
            .finish()
    }
}

/// The consuming half of a deferred.
///
/// Awaiting it inside an operation suspends the frame until the producer
/// settles. If the awaiting task is halted first, the registered cancel hook
/// (if any) fires as a best-effort cancellation of the foreign work; the
/// pending value is dropped either way.
pub struct Deferred<T> {
    pub(crate) cell: DeferredCell,
    pub(crate) cancel: Option<Rc<dyn Fn()>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            cancel: self.cancel.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Deferred<T> {
    /// Attaches a best-effort cancel hook, invoked when an awaiting frame is
    /// interrupted before the deferred settles.
    #[must_use]
    pub fn with_cancel(mut self, hook: impl Fn() + 'static) -> Self {
        self.cancel = Some(Rc::new(hook));
        self
    }

    /// Returns true once the deferred has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        DeferredState::is_settled(&self.cell)
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("settled", &DeferredState::is_settled(&self.cell))
            .finish()
    }
}
