//! Aggregation of per-item completion handles into a combined handle.
//!
//! A batch of N items yields N individual handles plus one combined handle.
//! The combined handle completes only once every item has succeeded, in
//! item-submission order, and fails as soon as any item fails without
//! waiting for the stragglers. Individual handles still resolve with their
//! own true outcomes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::AdminError;
use crate::handle::CompletionHandle;

/// Combined handle over `handles`, yielding every value in input order.
///
/// An empty slice completes immediately with an empty vector. The first
/// item failure fails the combined handle verbatim; completion handles are
/// single-assignment, so later failures are no-ops.
pub fn join_all<T: Clone + Send + 'static>(
    handles: &[CompletionHandle<T>],
) -> CompletionHandle<Vec<T>> {
    let (completer, combined) = CompletionHandle::new();
    let total = handles.len();
    if total == 0 {
        completer.complete(Vec::new());
        return combined;
    }

    let slots: Arc<Mutex<Vec<Option<T>>>> = Arc::new(Mutex::new(vec![None; total]));
    let remaining = Arc::new(AtomicUsize::new(total));

    for (index, handle) in handles.iter().enumerate() {
        let completer = completer.clone();
        let slots = slots.clone();
        let remaining = remaining.clone();
        handle.when_complete(move |result| match result {
            Ok(value) => {
                slots
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)[index] = Some(value.clone());
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let values = slots
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .iter_mut()
                        .map(|slot| slot.take().expect("all slots filled"))
                        .collect();
                    completer.complete(values);
                }
            }
            Err(error) => {
                completer.fail(error.clone());
            }
        });
    }

    combined
}

/// Combined unit handle: succeeds once every item succeeds, fails with the
/// first item failure.
pub fn join_unit<T: Clone + Send + 'static>(
    handles: &[CompletionHandle<T>],
) -> CompletionHandle<()> {
    let joined = join_all(handles);
    let (completer, combined) = CompletionHandle::new();
    joined.when_complete(move |result| match result {
        Ok(_) => {
            completer.complete(());
        }
        Err(error) => {
            completer.fail(error.clone());
        }
    });
    combined
}
