//! Deferred settlement handles for await-directive nodes.
//!
//! The engine has no async runtime of its own: an [`Deferred`] is settled
//! by whoever owns the underlying operation (the host wrapper, a worker
//! bridge, a test), and settlement re-enters the synchronous `update`
//! path of the owning element. A handle settles exactly once; later
//! settle calls are ignored.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;

type Continuation = Box<dyn FnOnce(&Result<Value, Value>)>;

enum DeferredState {
    Pending(Vec<Continuation>),
    Settled(Result<Value, Value>),
}

/// A shareable handle to one pending asynchronous operation.
#[derive(Clone)]
pub struct Deferred {
    state: Rc<RefCell<DeferredState>>,
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

impl Deferred {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(DeferredState::Pending(Vec::new()))),
        }
    }

    /// An already-resolved handle.
    pub fn resolved(value: Value) -> Self {
        Self {
            state: Rc::new(RefCell::new(DeferredState::Settled(Ok(value)))),
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(*self.state.borrow(), DeferredState::Settled(_))
    }

    /// Settle successfully. No-op if already settled.
    pub fn resolve(&self, value: Value) {
        self.settle(Ok(value));
    }

    /// Settle with an error. No-op if already settled.
    pub fn reject(&self, error: Value) {
        self.settle(Err(error));
    }

    /// Register a continuation. Runs immediately when already settled.
    pub fn on_settle(&self, f: impl FnOnce(&Result<Value, Value>) + 'static) {
        let settled = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                DeferredState::Pending(continuations) => {
                    continuations.push(Box::new(f));
                    None
                }
                DeferredState::Settled(outcome) => Some(outcome.clone()),
            }
        };
        if let Some(outcome) = settled {
            f(&outcome);
        }
    }

    fn settle(&self, outcome: Result<Value, Value>) {
        let continuations = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                DeferredState::Pending(continuations) => {
                    let drained = std::mem::take(continuations);
                    *state = DeferredState::Settled(outcome.clone());
                    drained
                }
                DeferredState::Settled(_) => return,
            }
        };
        for continuation in continuations {
            continuation(&outcome);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_settles_exactly_once() {
        let deferred = Deferred::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log = seen.clone();
        deferred.on_settle(move |outcome| {
            log.borrow_mut().push(outcome.clone());
        });

        deferred.resolve(Value::Int(1));
        deferred.resolve(Value::Int(2));
        deferred.reject(Value::str("late"));

        assert_eq!(*seen.borrow(), vec![Ok(Value::Int(1))]);
    }

    #[test]
    fn test_late_continuation_runs_immediately() {
        let deferred = Deferred::new();
        deferred.reject(Value::str("boom"));

        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        deferred.on_settle(move |outcome| {
            assert_eq!(*outcome, Err(Value::str("boom")));
            flag.set(true);
        });
        assert!(ran.get());
    }
}
