// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The per-node message FIFO.
//!
//! A `Queue` has no lock of its own: every path that touches one is
//! already running under the owning [`crate::node::Node`]'s exclusive
//! lock, so `enqueue`'s "push, then call `on_complete` before the caller
//! releases anything" idiom is what the node relies on to keep queue
//! insertion atomic with its own lock window.

use std::collections::VecDeque;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::NodeErrorValue;
use crate::receive_result::{ReceiveResult, ReceiveValue};

struct Queued<T> {
    message: T,
    /// Set for messages delivered into a consumed node; carried as
    /// metadata only (see `SPEC_FULL.md` §4.1's "persist" note) — it does
    /// not change FIFO dequeue order.
    #[allow(dead_code)]
    persist: bool,
    /// Resolves once this specific message is actually handed to a
    /// reader (via `receive`/`read_node`) or discarded (queue errors out
    /// from under it). This is the "queue's receive-result" `propagate`
    /// hands back to its caller as `Outcome::Delivered`.
    ack: Option<Arc<ReceiveResult<T>>>,
}

struct Waiter<T> {
    predicate: Option<Box<dyn Fn(&T) -> bool + Send>>,
    result: Arc<ReceiveResult<T>>,
}

enum Flavor {
    Normal,
    Transactional,
    Drained,
    Errored(NodeErrorValue),
}

/// FIFO buffer with optional pending-receive waiters, plus the fixed
/// drained/error sentinel flavors a node's queue field is replaced with
/// on a terminal transition.
pub struct Queue<T> {
    flavor: Flavor,
    messages: VecDeque<Queued<T>>,
    /// A node with more than one concurrently pending `receive` is the
    /// rare case — almost always zero or one — so this stays inline
    /// rather than allocating on the heap for the common case.
    waiters: SmallVec<[Waiter<T>; 1]>,
    closed: bool,
}

impl<T: Clone + Send + 'static> Queue<T> {
    #[must_use]
    pub fn new(transactional: bool) -> Self {
        Self {
            flavor: if transactional { Flavor::Transactional } else { Flavor::Normal },
            messages: VecDeque::new(),
            waiters: SmallVec::new(),
            closed: false,
        }
    }

    /// The fixed, always-empty, always-closed queue a drained node's
    /// state carries.
    #[must_use]
    pub fn drained_sentinel() -> Self {
        Self { flavor: Flavor::Drained, messages: VecDeque::new(), waiters: SmallVec::new(), closed: true }
    }

    /// The fixed, always-closed queue carrying `err` that an errored
    /// node's state carries.
    #[must_use]
    pub fn errored(err: NodeErrorValue) -> Self {
        Self { flavor: Flavor::Errored(err), messages: VecDeque::new(), waiters: SmallVec::new(), closed: true }
    }

    #[must_use]
    pub fn is_transactional(&self) -> bool {
        matches!(self.flavor, Flavor::Transactional)
    }

    /// A copy carrying the same buffered messages but flagged
    /// transactional, installed when a node is upgraded by
    /// `transactional()`.
    #[must_use]
    pub fn transactional_copy(&self) -> Self
    where
        T: Clone,
    {
        Self {
            flavor: Flavor::Transactional,
            messages: self
                .messages
                .iter()
                .map(|q| Queued { message: q.message.clone(), persist: q.persist, ack: q.ack.clone() })
                .collect(),
            waiters: SmallVec::new(),
            closed: self.closed,
        }
    }

    #[must_use]
    pub fn closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn drained(&self) -> bool {
        matches!(self.flavor, Flavor::Drained) || (self.closed && self.messages.is_empty() && self.waiters.is_empty())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Pushes `message`, satisfying the oldest matching waiter
    /// synchronously if one exists, then invokes `on_complete` before
    /// returning. Callers release their own lock only after this
    /// returns, so `on_complete` runs inside the enqueue window.
    ///
    /// Returns the message's own delivery-acknowledgement result: it
    /// resolves with the same value the moment a reader actually
    /// consumes this message (immediately, if a waiter was already
    /// parked for it).
    pub fn enqueue(&mut self, message: T, persist: bool, on_complete: impl FnOnce()) -> Arc<ReceiveResult<T>> {
        let ack = if let Some(idx) = self.waiters.iter().position(|w| w.predicate.as_deref().is_none_or(|p| p(&message))) {
            let waiter = self.waiters.remove(idx);
            waiter.result.resolve(ReceiveValue::Value(message.clone()));
            ReceiveResult::ready(ReceiveValue::Value(message))
        } else {
            let ack = ReceiveResult::pending();
            self.messages.push_back(Queued { message, persist, ack: Some(ack.clone()) });
            ack
        };
        on_complete();
        ack
    }

    /// Resolves synchronously against the oldest buffered message
    /// matching `predicate` (`None` matches anything), otherwise
    /// registers a waiter and returns a pending [`ReceiveResult`].
    pub fn receive(&mut self, predicate: Option<Box<dyn Fn(&T) -> bool + Send>>) -> Arc<ReceiveResult<T>> {
        if let Flavor::Drained = self.flavor {
            return ReceiveResult::ready(ReceiveValue::Drained);
        }
        if let Flavor::Errored(err) = &self.flavor {
            return ReceiveResult::ready(ReceiveValue::Errored(err.clone()));
        }
        let idx = self.messages.iter().position(|q| predicate.as_deref().is_none_or(|p| p(&q.message)));
        if let Some(idx) = idx {
            let queued = self.messages.remove(idx).expect("index just located");
            if let Some(ack) = &queued.ack {
                ack.resolve(ReceiveValue::Value(queued.message.clone()));
            }
            return ReceiveResult::ready(ReceiveValue::Value(queued.message));
        }
        if self.closed {
            return ReceiveResult::ready(ReceiveValue::Drained);
        }
        let result = ReceiveResult::pending();
        self.waiters.push(Waiter { predicate, result: result.clone() });
        result
    }

    /// Removes and returns every buffered message, in FIFO order. Each
    /// message's delivery ack resolves with the same value: `drain` is
    /// as much a "delivery" as a `receive` match is.
    pub fn drain_messages(&mut self) -> Vec<T> {
        self.messages
            .drain(..)
            .map(|q| {
                if let Some(ack) = &q.ack {
                    ack.resolve(ReceiveValue::Value(q.message.clone()));
                }
                q.message
            })
            .collect()
    }

    /// Marks the queue closed; any still-pending waiter resolves
    /// `Drained` once the buffer is also empty, matching `drained()`'s
    /// definition.
    pub fn close(&mut self) {
        self.closed = true;
        if self.messages.is_empty() {
            for waiter in self.waiters.drain(..) {
                waiter.result.resolve(ReceiveValue::Drained);
            }
        }
    }

    /// Wakes every pending waiter with `err`, resolves every
    /// still-buffered message's delivery ack as errored (those messages
    /// are discarded, not delivered to anyone), and marks the queue
    /// closed.
    pub fn error(&mut self, err: &NodeErrorValue) {
        self.closed = true;
        for waiter in self.waiters.drain(..) {
            waiter.result.resolve(ReceiveValue::Errored(err.clone()));
        }
        for queued in self.messages.drain(..) {
            if let Some(ack) = &queued.ack {
                ack.resolve(ReceiveValue::Errored(err.clone()));
            }
        }
    }

    /// Removes a specific pending waiter by its result handle, used by
    /// `Node::cancel`. No-op if the waiter already resolved.
    pub fn cancel_receive(&mut self, result: &Arc<ReceiveResult<T>>) {
        self.waiters.retain(|w| !Arc::ptr_eq(&w.result, result));
    }

    /// The dispatch-message protocol a newly linked edge drains the
    /// queue's buffered messages through: each buffered message is
    /// handed to `dispatch`, in FIFO order, then the buffer is cleared.
    /// Each message's delivery ack resolves once handed off.
    pub fn dispatch_into(&mut self, mut dispatch: impl FnMut(T)) {
        for queued in self.messages.drain(..) {
            if let Some(ack) = &queued.ack {
                ack.resolve(ReceiveValue::Value(queued.message.clone()));
            }
            dispatch(queued.message);
        }
    }
}
