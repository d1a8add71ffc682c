#![forbid(unsafe_code)]

//! Single-threaded deferred values.
//!
//! A [`Deferred<T>`] is the engine's promise: a shared slot that is either
//! pending with a queue of waiters or settled with a `Result<T, Fault>`.
//! There is no executor and no `Send`; continuations run on the caller's
//! stack when the value settles, and the cooperative scheduler decides when
//! that happens.
//!
//! # Invariants
//!
//! 1. **Settled short-circuits**: `on_settle` against an already-settled
//!    deferred runs the callback immediately on the current stack, without
//!    any queue hop.
//! 2. Waiters run in registration order (FIFO), each receiving its own clone
//!    of the result.
//! 3. A deferred settles at most once; a second `settle` is rejected and
//!    reported through the return value so the caller can log it.
//! 4. Callbacks may register new waiters or settle *other* deferreds; no
//!    borrow is held while user code runs.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::fault::Fault;

type Waiter<T> = Box<dyn FnOnce(Result<T, Fault>)>;

enum State<T> {
    Pending(Vec<Waiter<T>>),
    Settled(Result<T, Fault>),
}

/// A shared, clonable handle to an eventually-available value.
pub struct Deferred<T> {
    state: Rc<RefCell<State<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> Deferred<T> {
    /// A deferred with no value yet.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Pending(Vec::new()))),
        }
    }

    /// A deferred already settled with a success value.
    #[must_use]
    pub fn settled(value: T) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Settled(Ok(value)))),
        }
    }

    /// A deferred already settled with a failure.
    #[must_use]
    pub fn failed(fault: Fault) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Settled(Err(fault)))),
        }
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(&*self.state.borrow(), State::Settled(_))
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.is_settled()
    }

    /// Two handles to the same underlying slot?
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// Settle with `result`, running all waiters in registration order.
    ///
    /// Returns `false` if the deferred was already settled; the late result
    /// is dropped and no waiter runs. Callers treat that as a reportable
    /// double-settle.
    pub fn settle(&self, result: Result<T, Fault>) -> bool {
        let waiters = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Settled(_) => return false,
                State::Pending(waiters) => {
                    let waiters = std::mem::take(waiters);
                    *state = State::Settled(result.clone());
                    waiters
                }
            }
        };
        // Borrow released above: waiters are free to touch this deferred.
        for waiter in waiters {
            waiter(result.clone());
        }
        true
    }

    /// Run `f` with the result: immediately if settled, else when settled.
    pub fn on_settle(&self, f: impl FnOnce(Result<T, Fault>) + 'static) {
        let ready = match &*self.state.borrow() {
            State::Settled(result) => Some(result.clone()),
            State::Pending(_) => None,
        };
        match ready {
            Some(result) => f(result),
            None => {
                if let State::Pending(waiters) = &mut *self.state.borrow_mut() {
                    waiters.push(Box::new(f));
                }
            }
        }
    }

    /// The settled result, if any.
    #[must_use]
    pub fn peek(&self) -> Option<Result<T, Fault>> {
        match &*self.state.borrow() {
            State::Settled(result) => Some(result.clone()),
            State::Pending(_) => None,
        }
    }

    /// Derive a new deferred by transforming the result.
    ///
    /// If `self` is already settled, the returned deferred settles before
    /// `map` returns (invariant 1).
    #[must_use]
    pub fn map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + 'static,
        F: FnOnce(Result<T, Fault>) -> Result<U, Fault> + 'static,
    {
        let mapped = Deferred::pending();
        let out = mapped.clone();
        self.on_settle(move |result| {
            out.settle(f(result));
        });
        mapped
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.borrow() {
            State::Pending(waiters) => f
                .debug_struct("Deferred")
                .field("state", &"pending")
                .field("waiters", &waiters.len())
                .finish(),
            State::Settled(Ok(_)) => f
                .debug_struct("Deferred")
                .field("state", &"settled")
                .finish(),
            State::Settled(Err(fault)) => f
                .debug_struct("Deferred")
                .field("state", &"failed")
                .field("fault", &fault.message())
                .finish(),
        }
    }
}
