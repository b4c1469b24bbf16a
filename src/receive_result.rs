// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! `ReceiveResult`: the single-resolution async promise returned from a
//! `receive` or zero-downstream `propagate` call that couldn't be
//! satisfied synchronously.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::NodeErrorValue;
use crate::threads;

/// The terminal value a [`ReceiveResult`] resolves to.
#[derive(Debug, Clone)]
pub enum ReceiveValue<T> {
    /// A message was delivered.
    Value(T),
    /// The queue drained before a message satisfying the waiter arrived.
    Drained,
    /// The node errored before a message satisfying the waiter arrived.
    Errored(NodeErrorValue),
}

type Callback<T> = Box<dyn FnOnce(ReceiveValue<T>) + Send>;

enum Inner<T> {
    Pending(Vec<Callback<T>>),
    Resolved(ReceiveValue<T>),
    Cancelled,
}

/// A single-resolution promise. Mirrors the "result channel / async
/// promise" collaborator the node's `receive`/`propagate` paths consume:
/// `subscribe` registers interest, `resolve` (the spec's `success`)
/// settles it exactly once, and `defer_within_transaction` is the hook
/// mutating operations use to postpone side effects raised while a
/// `transactional()` upgrade is walking the subgraph.
pub struct ReceiveResult<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone + Send + 'static> ReceiveResult<T> {
    #[must_use]
    pub fn pending() -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new(Inner::Pending(Vec::new())) })
    }

    /// Already-resolved result, for the synchronous-success fast path.
    #[must_use]
    pub fn ready(value: ReceiveValue<T>) -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new(Inner::Resolved(value)) })
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(*self.inner.lock(), Inner::Resolved(_))
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(*self.inner.lock(), Inner::Pending(_))
    }

    /// Registers `cb` to run once this result settles. If already
    /// resolved, `cb` runs immediately (on the calling thread); if
    /// cancelled, `cb` never runs.
    pub fn subscribe(&self, cb: impl FnOnce(ReceiveValue<T>) + Send + 'static) {
        let mut guard = self.inner.lock();
        match &mut *guard {
            Inner::Pending(subscribers) => subscribers.push(Box::new(cb)),
            Inner::Resolved(value) => {
                let value = value.clone();
                drop(guard);
                cb(value);
            },
            Inner::Cancelled => {},
        }
    }

    /// Settles the result. Returns `false` if it was already resolved or
    /// cancelled (resolution is definitive and happens at most once).
    pub fn resolve(&self, value: ReceiveValue<T>) -> bool {
        let subscribers = {
            let mut guard = self.inner.lock();
            match &*guard {
                Inner::Pending(_) => {
                    let Inner::Pending(subscribers) =
                        std::mem::replace(&mut *guard, Inner::Resolved(value.clone()))
                    else {
                        unreachable!()
                    };
                    subscribers
                },
                Inner::Resolved(_) | Inner::Cancelled => return false,
            }
        };
        for cb in subscribers {
            cb(value.clone());
        }
        true
    }

    /// Cancels a still-pending result; its callback (if any) will never
    /// fire. No-op returning `false` once already resolved.
    pub fn cancel(&self) -> bool {
        let mut guard = self.inner.lock();
        if matches!(*guard, Inner::Pending(_)) {
            *guard = Inner::Cancelled;
            true
        } else {
            false
        }
    }

    /// Runs `f` after the current transaction commits rather than
    /// inline. Implemented by handing `f` to the process-wide cleanup
    /// worker (see [`crate::threads`]): it always runs off the caller's
    /// stack, which is what actually matters for breaking the recursive
    /// lock cycles `transactional()` and the connector cascades would
    /// otherwise create.
    pub fn defer_within_transaction(f: impl FnOnce() + Send + 'static) {
        threads::enqueue_cleanup(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn resolves_once() {
        let result: Arc<ReceiveResult<i32>> = ReceiveResult::pending();
        assert!(result.resolve(ReceiveValue::Value(1)));
        assert!(!result.resolve(ReceiveValue::Value(2)));
        assert!(result.is_resolved());
    }

    #[test]
    fn subscriber_after_resolve_runs_immediately() {
        let result: Arc<ReceiveResult<i32>> = ReceiveResult::pending();
        result.resolve(ReceiveValue::Value(7));
        let seen = Arc::new(AtomicBool::new(false));
        let seen2 = seen.clone();
        result.subscribe(move |v| {
            if let ReceiveValue::Value(7) = v {
                seen2.store(true, Ordering::SeqCst);
            }
        });
        assert!(seen.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_suppresses_future_resolution() {
        let result: Arc<ReceiveResult<i32>> = ReceiveResult::pending();
        assert!(result.cancel());
        assert!(!result.resolve(ReceiveValue::Value(1)));
    }

    #[test]
    fn cancel_after_resolve_is_noop() {
        let result: Arc<ReceiveResult<i32>> = ReceiveResult::pending();
        result.resolve(ReceiveValue::Value(1));
        assert!(!result.cancel());
    }
}
