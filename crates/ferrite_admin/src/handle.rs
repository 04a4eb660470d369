//! Single-assignment completion handles.
//!
//! A `CompletionHandle` is the client's unit of async result delivery: it is
//! resolved exactly once with a value or an error, supports any number of
//! waiters, and runs listeners attached after resolution immediately.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use crate::error::AdminError;

type Listener<T> = Box<dyn FnOnce(&Result<T, AdminError>) + Send>;

enum State<T> {
    Pending(Vec<Listener<T>>),
    Done(Result<T, AdminError>),
}

struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

impl<T> Shared<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read side of a single-assignment result.
pub struct CompletionHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for CompletionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// Write side; resolving is idempotent and the first resolution wins.
pub struct Completer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> CompletionHandle<T> {
    /// Create an unresolved handle with its completer.
    pub fn new() -> (Completer<T>, CompletionHandle<T>) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::Pending(Vec::new())),
            notify: Notify::new(),
        });
        (
            Completer {
                shared: shared.clone(),
            },
            CompletionHandle { shared },
        )
    }

    /// Await the result. Safe to call from any number of tasks.
    pub async fn get(&self) -> Result<T, AdminError> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register for a wakeup before checking state so a resolution
            // landing in between cannot be missed.
            notified.as_mut().enable();
            if let Some(done) = self.try_get() {
                return done;
            }
            notified.await;
        }
    }

    /// The result if already resolved.
    pub fn try_get(&self) -> Option<Result<T, AdminError>> {
        match &*self.shared.lock() {
            State::Pending(_) => None,
            State::Done(result) => Some(result.clone()),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(&*self.shared.lock(), State::Done(_))
    }

    /// Attach a listener. Listeners attached after resolution run
    /// immediately on the calling task.
    pub fn when_complete(&self, listener: impl FnOnce(&Result<T, AdminError>) + Send + 'static) {
        let mut state = self.shared.lock();
        match &mut *state {
            State::Pending(listeners) => listeners.push(Box::new(listener)),
            State::Done(result) => {
                let result = result.clone();
                // Run the late listener outside the state lock.
                drop(state);
                listener(&result);
            }
        }
    }
}

impl<T: Clone + Send + 'static> Completer<T> {
    /// Resolve with a value. Returns false if already resolved.
    pub fn complete(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    /// Resolve with an error. Returns false if already resolved.
    pub fn fail(&self, error: AdminError) -> bool {
        self.resolve(Err(error))
    }

    fn resolve(&self, result: Result<T, AdminError>) -> bool {
        let listeners = {
            let mut state = self.shared.lock();
            match &mut *state {
                State::Done(_) => return false,
                State::Pending(listeners) => {
                    let listeners = std::mem::take(listeners);
                    *state = State::Done(result.clone());
                    listeners
                }
            }
        };
        for listener in listeners {
            listener(&result);
        }
        self.shared.notify.notify_waiters();
        true
    }
}
