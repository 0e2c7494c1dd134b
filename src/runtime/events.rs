//! Synchronous event bus for supervision observers.
//!
//! The state machine emits an event for every transition — finishing entry
//! and terminal entry both — and link/unlink events when children join or
//! leave a parent. Delivery is synchronous at the transition point, so an
//! observer sees events in exactly the order the kernel performed them.
//!
//! Listeners must not call back into the kernel; they are observation hooks
//! for inspection and testing, not actors.

use crate::record::TaskState;
use std::cell::RefCell;
use std::rc::Rc;

/// A supervision event. Tasks are named by their public monotonic id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A task moved along the state machine.
    State {
        /// The task's public id.
        task: u64,
        /// The state being left.
        from: TaskState,
        /// The state being entered.
        to: TaskState,
    },
    /// A child joined a parent's supervision set.
    Link {
        /// The parent's public id.
        parent: u64,
        /// The child's public id.
        child: u64,
    },
    /// A child left a parent's supervision set.
    Unlink {
        /// The parent's public id.
        parent: u64,
        /// The child's public id.
        child: u64,
    },
}

type Listener = Box<dyn FnMut(&Event)>;

/// Registry of synchronous observers.
#[derive(Clone, Default)]
pub(crate) struct EventBus {
    listeners: Rc<RefCell<Vec<Listener>>>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&self, listener: impl FnMut(&Event) + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    pub(crate) fn emit(&self, event: &Event) {
        for listener in self.listeners.borrow_mut().iter_mut() {
            listener(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}
