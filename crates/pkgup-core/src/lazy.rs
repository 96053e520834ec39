//! At-most-once lazy values shared between tasks.
//!
//! A [`Lazy`] cell holds either a pending thunk or its result. The first
//! reader takes the thunk and runs it without holding the lock; concurrent
//! readers block until the value (or failure) is published. Failures are
//! sticky: every reader of a failed cell observes the same diagnostic.
//!
//! Cells may depend on each other by one thunk calling another cell's
//! `get`; a cell transitively demanding itself would block forever, which
//! is a static bug in the field graph, not a runtime condition to detect.

use std::sync::{Arc, Condvar, Mutex};

use anyhow::{anyhow, Result};

type Thunk<T> = Box<dyn FnOnce() -> Result<T> + Send>;

enum State<T> {
    Pending(Option<Thunk<T>>),
    Computing,
    Ready(Arc<T>),
    Failed(String),
}

pub struct Lazy<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

impl<T> Lazy<T> {
    pub fn new(thunk: impl FnOnce() -> Result<T> + Send + 'static) -> Self {
        Self {
            state: Mutex::new(State::Pending(Some(Box::new(thunk)))),
            ready: Condvar::new(),
        }
    }

    /// An already-resolved cell; used for values known at construction.
    pub fn ready(value: T) -> Self {
        Self {
            state: Mutex::new(State::Ready(Arc::new(value))),
            ready: Condvar::new(),
        }
    }

    /// Resolve the cell, computing it on first demand.
    pub fn get(&self) -> Result<Arc<T>> {
        let mut state = self.state.lock().expect("lazy cell poisoned");
        loop {
            match &mut *state {
                State::Pending(thunk) => {
                    let thunk = thunk.take().expect("pending cell without thunk");
                    *state = State::Computing;
                    drop(state);

                    let result = thunk();

                    let mut state = self.state.lock().expect("lazy cell poisoned");
                    return match result {
                        Ok(value) => {
                            let value = Arc::new(value);
                            *state = State::Ready(Arc::clone(&value));
                            self.ready.notify_all();
                            Ok(value)
                        }
                        Err(err) => {
                            let message = format!("{err:#}");
                            *state = State::Failed(message.clone());
                            self.ready.notify_all();
                            Err(anyhow!(message))
                        }
                    };
                }
                State::Computing => {
                    state = self.ready.wait(state).expect("lazy cell poisoned");
                }
                State::Ready(value) => return Ok(Arc::clone(value)),
                State::Failed(message) => return Err(anyhow!(message.clone())),
            }
        }
    }
}
