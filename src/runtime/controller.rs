//! Controller: the bridge between a task and the frame driving its body.
//!
//! At start, a task's payload is classified into one of three body kinds and
//! handed to an evaluator frame; at frame exit, the controller marks the
//! task settled so the state machine can advance once the children drain.

use crate::op::RawOp;
use crate::types::FrameId;

/// The kind of body a task was started with. Recorded for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyKind {
    /// A step body producing instructions.
    Steps,
    /// A foreign settled-later value.
    Deferred,
    /// A plain value; resolves on the first step.
    Value,
}

impl BodyKind {
    pub(crate) fn classify(op: &RawOp) -> Self {
        match op {
            RawOp::Body(_) => Self::Steps,
            RawOp::Deferred { .. } => Self::Deferred,
            RawOp::Value(_) => Self::Value,
        }
    }
}

/// Per-task controller state.
#[derive(Debug)]
pub(crate) struct Controller {
    /// The root frame, while the body is live.
    pub frame: Option<FrameId>,
    /// Set once the body has exited (any path); the task cannot accept new
    /// instructions afterwards.
    pub done: bool,
    /// Recorded body kind, surfaced in record diagnostics and start logs.
    pub kind: Option<BodyKind>,
}

impl Controller {
    pub(crate) fn new() -> Self {
        Self {
            frame: None,
            done: false,
            kind: None,
        }
    }

    /// Marks the body exited and forgets the frame.
    pub(crate) fn finish(&mut self) {
        self.frame = None;
        self.done = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn classification_covers_all_payloads() {
        assert_eq!(
            BodyKind::classify(&RawOp::Value(Rc::new(1_i32))),
            BodyKind::Value
        );
        let (_r, d) = crate::deferred::deferred::<i32>();
        let raw = crate::op::Op::<i32>::from(d).raw;
        assert_eq!(BodyKind::classify(&raw), BodyKind::Deferred);
        let body = crate::op::Op::value(1_i32).then(|v| crate::op::Op::value(v)).raw;
        assert_eq!(BodyKind::classify(&body), BodyKind::Steps);
    }

    #[test]
    fn finish_clears_frame() {
        let mut controller = Controller::new();
        controller.done = false;
        controller.finish();
        assert!(controller.done);
        assert!(controller.frame.is_none());
    }
}
