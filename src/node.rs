// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The [`Node`] core: the thread-safe vertex at the center of this crate.
//!
//! A `Node` owns a [`crate::mode::Mode`] state machine, a set of
//! downstream [`Edge`]s, a watcher list, and a named-cancellation table,
//! all kept consistent under its own [`AsymmetricLock`]. See
//! `SPEC_FULL.md` §4 for the full contract; this module is the
//! implementation of that contract.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::config::{NodeConfig, Operator};
use crate::edge::{Edge, EdgeId, Outcome, Propagator, Target};
use crate::error::{NodeError, NodeErrorValue, Result};
use crate::lock::{acquire_all_exclusive, AsymmetricLock, ExclusiveGuard, SharedGuard};
use crate::mode::Mode;
use crate::node_id::NodeId;
use crate::queue::Queue;
use crate::receive_result::{ReceiveResult, ReceiveValue};
use crate::state_snapshot::{NodeStateValue, StateHolder};

type WatcherFn<T> = Arc<dyn Fn(Mode, usize, Option<NodeErrorValue>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WatcherId(u64);

impl WatcherId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a registered cancellation name actually reverses.
enum CancelEntry<T> {
    /// `link`'s cancellation: calling it `unlink`s the edge.
    Edge(EdgeId),
    /// `receive`'s cancellation: calling it cancels the pending result.
    Receive(Arc<ReceiveResult<T>>),
    /// `on_state_changed`'s cancellation: calling it removes the watcher.
    Watcher(WatcherId),
}

/// A thread-safe vertex in a dataflow graph of message propagators.
///
/// See the module documentation and `SPEC_FULL.md` §3–§4 for the full
/// contract. Every node is constructed behind an `Arc` (via
/// [`Node::new`]) because edges, cancellation thunks, and the
/// `transactional()` upgrade all need to hand out owning references to
/// the node they close over; a node keeps a [`Weak`] reference to its
/// own `Arc` (populated through `Arc::new_cyclic`) rather than an
/// `Arc<Self>`-receiver API, which keeps every method a plain `&self`
/// call and lets `Node` implement [`Propagator`] directly.
pub struct Node<T> {
    id: NodeId,
    self_ref: Weak<Node<T>>,
    lock: AsymmetricLock,
    description: String,
    operator: Option<Operator<T>>,
    grounded: bool,
    state: StateHolder<T>,
    edges: RwLock<Vec<Edge<T>>>,
    watchers: Mutex<Vec<(WatcherId, WatcherFn<T>)>>,
    cancellations: Mutex<HashMap<String, CancelEntry<T>>>,
    /// Set for the duration of a [`Node::transactional`] upgrade that has
    /// this node in its locked set; `cancel` checks this before doing
    /// anything so a reentrant cancel during the upgrade fails fast
    /// instead of deadlocking against a lock this thread already holds.
    in_transaction: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> Node<T> {
    /// Builds a new, open node from `config`.
    #[must_use]
    pub fn new(config: NodeConfig<T>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            id: NodeId::next(),
            self_ref: self_ref.clone(),
            lock: AsymmetricLock::new(),
            description: config.description,
            operator: config.operator,
            grounded: config.grounded,
            state: StateHolder::new(NodeStateValue::new(config.permanent)),
            edges: RwLock::new(Vec::new()),
            watchers: Mutex::new(Vec::new()),
            cancellations: Mutex::new(HashMap::new()),
            in_transaction: AtomicBool::new(false),
        })
    }

    fn self_arc(&self) -> Arc<Self> {
        self.self_ref.upgrade().expect("node outlives its own weak self-reference")
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.state.load().mode
    }

    #[must_use]
    pub fn downstream_count(&self) -> usize {
        self.state.load().downstream_count
    }

    /// A consistent, lock-free snapshot of this node's current state.
    #[must_use]
    pub fn state(&self) -> Arc<NodeStateValue<T>> {
        self.state.load()
    }

    /// Current queue depth, `0` if the queue was never materialized.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.state.load().queue.as_ref().map_or(0, |q| q.lock().len())
    }

    pub fn acquire_shared(&self) -> SharedGuard<'_> {
        self.lock.acquire_shared()
    }

    pub fn acquire_exclusive(&self) -> ExclusiveGuard<'_> {
        self.lock.acquire_exclusive()
    }

    pub fn try_acquire_shared(&self) -> Option<SharedGuard<'_>> {
        self.lock.try_acquire_shared()
    }

    pub fn try_acquire_exclusive(&self) -> Option<ExclusiveGuard<'_>> {
        self.lock.try_acquire_exclusive()
    }

    fn edges_snapshot(&self) -> Vec<Edge<T>> {
        self.edges.read().clone()
    }

    /// Materializes the queue if one doesn't exist yet, under the
    /// exclusive lock. Assumes the caller does **not** already hold
    /// `self.lock` — use [`Self::materialize_queue_locked`] if it does.
    fn ensure_queue(&self) -> Arc<Mutex<Queue<T>>> {
        if let Some(q) = &self.state.load().queue {
            return q.clone();
        }
        let guard = self.lock.acquire_exclusive();
        let snap = self.state.load();
        let queue = self.materialize_queue_locked(&snap);
        drop(guard);
        queue
    }

    /// Same as [`Self::ensure_queue`] but assumes `self.lock` is already
    /// held exclusively by the caller.
    fn materialize_queue_locked(&self, snap: &NodeStateValue<T>) -> Arc<Mutex<Queue<T>>> {
        if let Some(q) = &snap.queue {
            return q.clone();
        }
        let queue = Arc::new(Mutex::new(Queue::new(snap.transactional)));
        let mut new_state = snap.clone();
        new_state.queue = Some(queue.clone());
        new_state.read = true;
        self.state.store(new_state);
        queue
    }

    /// Runs `operator` (if set) against `msg`, returning the transformed
    /// message, `Ok(None)` for a filtered message, or the operator's
    /// error untouched — the caller decides what to do with a failure.
    fn apply_operator(&self, msg: T) -> std::result::Result<Option<T>, NodeErrorValue> {
        match &self.operator {
            None => Ok(Some(msg)),
            Some(op) => op(msg),
        }
    }

    /// Transitions this node to `Mode::Error` carrying `err`. Shared by
    /// the public `error()` entry point and the operator-failure path in
    /// `propagate`, which must do the same thing without going through
    /// `error`'s `force`/`permanent` guard (an operator failure is not a
    /// polite request, it always errors the node).
    fn transition_to_error(&self, err: NodeErrorValue) {
        let guard = self.lock.acquire_exclusive();
        let snap = self.state.load();
        if snap.mode.is_terminal() {
            drop(guard);
            return;
        }
        self.edges.write().clear();
        let old_queue = snap.queue.clone();
        let mut new_state = (*snap).clone();
        new_state.mode = Mode::Error;
        new_state.downstream_count = 0;
        new_state.split = None;
        new_state.error = Some(err.clone());
        new_state.queue = Some(Arc::new(Mutex::new(Queue::errored(err.clone()))));
        self.state.store(new_state);
        drop(guard);
        // Settling the old queue's waiters can synchronously reenter this
        // node (a waiting reader's drained-check subscriber), so it must
        // run after this node's own lock is released.
        if let Some(q) = &old_queue {
            q.lock().error(&err);
        }
        tracing::warn!(node = %self.description, error = %err, "node entered error mode");
        self.notify_watchers(Mode::Error, 0, Some(err));
    }

    /// Notifies every watcher with `(mode, count, err)`, swallowing any
    /// panic from an individual callback (`SPEC_FULL.md` §7: "a failing
    /// watcher is logged but does not affect Node state"). If `mode` is
    /// terminal, clears the watcher and cancellation tables afterward —
    /// once a node reaches `Drained`/`Error` no further notification or
    /// cancellation bookkeeping is meaningful.
    fn notify_watchers(&self, mode: Mode, count: usize, err: Option<NodeErrorValue>) {
        let callbacks: Vec<WatcherFn<T>> = self.watchers.lock().iter().map(|(_, cb)| cb.clone()).collect();
        for cb in callbacks {
            let err = err.clone();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| cb(mode, count, err)));
            if outcome.is_err() {
                tracing::warn!(node = %self.description, "state-changed watcher panicked; ignoring");
            }
        }
        if mode.is_terminal() {
            self.watchers.lock().clear();
            self.cancellations.lock().clear();
        }
    }

    /// Promotes a `Closed` node to `Drained` once its queue has actually
    /// emptied out. Called after any synchronous read (`receive`,
    /// `read_node`, `drain`) that might have just emptied the buffer.
    fn check_drained_after_read(&self) {
        let guard = self.lock.acquire_exclusive();
        let snap = self.state.load();
        if !matches!(snap.mode, Mode::Closed) {
            drop(guard);
            return;
        }
        let Some(queue) = snap.queue.clone() else {
            drop(guard);
            return;
        };
        if !queue.lock().drained() {
            drop(guard);
            return;
        }
        let mut new_state = (*snap).clone();
        new_state.mode = Mode::Drained;
        new_state.queue = Some(Arc::new(Mutex::new(Queue::drained_sentinel())));
        self.state.store(new_state);
        drop(guard);
        tracing::debug!(node = %self.description, "queue emptied after close; node drained");
        self.notify_watchers(Mode::Drained, 0, None);
    }

    // -- propagation ----------------------------------------------------

    /// Accepts `msg` from upstream. See `SPEC_FULL.md` §4.2 for the full
    /// decision tree this implements.
    #[must_use]
    pub fn propagate(&self, msg: T, transform: bool) -> Outcome<T> {
        if transform {
            match self.apply_operator(msg) {
                Ok(Some(msg)) => self.propagate_transformed(msg),
                Ok(None) => Outcome::Filtered,
                Err(err) => {
                    self.transition_to_error(err);
                    Outcome::Errored
                },
            }
        } else {
            self.propagate_transformed(msg)
        }
    }

    /// `propagate` past the operator step: decides between grounding,
    /// rejection, consumed delivery, queueing, single-edge fusion, and
    /// fan-out.
    fn propagate_transformed(&self, msg: T) -> Outcome<T> {
        let snap = self.state.load();
        if self.grounded && snap.downstream_count == 0 {
            return Outcome::Grounded;
        }
        match snap.mode {
            Mode::Closed | Mode::Drained => Outcome::Closed,
            Mode::Error => Outcome::Errored,
            Mode::Consumed => {
                let queue = snap.queue.clone().expect("consumed node always has a materialized queue");
                // No node-level guard here: `enqueue`'s `on_complete` may
                // synchronously resolve a waiting reader's result, whose
                // subscriber reenters this same node (e.g.
                // `check_drained_after_read`). The queue's own mutex is
                // what actually protects its contents; holding this
                // node's lock across that reentrant call would deadlock
                // a thread against itself.
                let ack = queue.lock().enqueue(msg, true, || {});
                Outcome::Delivered(ack)
            },
            Mode::Open | Mode::Split => {
                let edges = self.edges_snapshot();
                match edges.len() {
                    0 => {
                        let queue = self.ensure_queue();
                        let persist = !self.grounded;
                        let ack = queue.lock().enqueue(msg, persist, || {});
                        tracing::trace!(node = %self.description, "enqueued with no downstream edges");
                        Outcome::Delivered(ack)
                    },
                    1 => {
                        if let Some(queue) = &snap.queue {
                            queue.lock().enqueue(msg.clone(), false, || {});
                        }
                        self.propagate_fused(edges.into_iter().next().expect("len checked above").target, msg)
                    },
                    _ => {
                        if let Some(queue) = &snap.queue {
                            queue.lock().enqueue(msg.clone(), false, || {});
                        }
                        let mut results = Vec::with_capacity(edges.len());
                        for edge in &edges {
                            let outcome = edge.target.propagate(msg.clone(), true);
                            if !edge.sneaky {
                                results.push(outcome);
                            }
                        }
                        Outcome::FanOut(results)
                    },
                }
            },
        }
    }

    /// The fused single-edge walk (`SPEC_FULL.md` §4.3): hops from node
    /// to node while each has exactly one downstream edge and is still
    /// open/split, applying each hop's operator and enqueuing into its
    /// own queue (if materialized) without ever holding two locks at
    /// once. Falls back to a normal recursive `propagate` the moment a
    /// hop isn't eligible to keep fusing.
    fn propagate_fused(&self, mut target: Target<T>, mut msg: T) -> Outcome<T> {
        loop {
            let Target::Node(next) = &target else {
                return target.propagate(msg, true);
            };
            let next_snapshot = next.state.load();
            if !next_snapshot.mode.is_propagating() {
                return target.propagate(msg, true);
            }
            let next_edges = next.edges_snapshot();
            if next_edges.len() != 1 {
                return target.propagate(msg, true);
            }

            msg = match next.apply_operator(msg) {
                Ok(Some(msg)) => msg,
                Ok(None) => return Outcome::Filtered,
                Err(err) => {
                    next.transition_to_error(err);
                    return Outcome::Errored;
                },
            };

            // Re-read: topology or mode may have changed between the
            // snapshot above and now. No lock is held across this
            // enqueue — `enqueue`'s completion can synchronously reenter
            // `next` (e.g. a waiting reader's drained-check), so holding
            // `next`'s own lock here would risk a thread deadlocking
            // against itself; the queue's own mutex is what actually
            // guards its contents.
            let recheck = next.state.load();
            if !recheck.mode.is_propagating() || next.edges_snapshot().len() != 1 {
                return next.propagate_transformed(msg);
            }
            if let Some(queue) = &recheck.queue {
                queue.lock().enqueue(msg.clone(), false, || {});
            }

            target = next_edges.into_iter().next().expect("len checked above").target;
        }
    }

    // -- linking ----------------------------------------------------------

    /// Attaches `edge` as a new downstream link. See `SPEC_FULL.md`
    /// §4.2's `link` bullet for the full per-mode contract.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NameInUse`] if `name` is already registered
    /// for a different cancellation on this node.
    pub fn link(
        &self,
        name: Option<String>,
        edge: Edge<T>,
        pre: impl FnOnce(bool),
        post: impl FnOnce(bool),
    ) -> Result<bool> {
        let guard = self.lock.acquire_exclusive();
        if let Some(n) = &name {
            if self.cancellations.lock().contains_key(n) {
                drop(guard);
                pre(false);
                post(false);
                return Err(NodeError::NameInUse(n.clone()));
            }
        }
        let snap = self.state.load();
        match snap.mode {
            Mode::Open | Mode::Split => {
                pre(true);
                let edge_id = edge.id;
                let target = edge.target.clone();
                let mut new_state = (*snap).clone();
                if !edge.sneaky {
                    new_state.downstream_count += 1;
                }
                let became_first = !edge.sneaky && new_state.downstream_count == 1;
                if new_state.read && new_state.queue.is_none() {
                    new_state.queue = Some(Arc::new(Mutex::new(Queue::new(new_state.transactional))));
                }
                let drain_into_new_edge = if became_first { new_state.queue.clone() } else { None };
                let make_transactional = new_state.transactional;
                self.edges.write().push(edge);
                let new_count = new_state.downstream_count;
                self.state.store(new_state);
                drop(guard);

                if make_transactional {
                    target.transactional();
                }
                if let Some(queue) = drain_into_new_edge {
                    let pending: Vec<T> = queue.lock().drain_messages();
                    for m in pending {
                        target.propagate(m, true);
                    }
                }
                if let Some(n) = name {
                    self.cancellations.lock().insert(n, CancelEntry::Edge(edge_id));
                }
                if new_count == 0 || new_count == 1 {
                    self.notify_watchers(snap.mode, new_count, None);
                }
                post(true);
                Ok(true)
            },
            Mode::Closed => {
                pre(true);
                let edge_id = edge.id;
                let target = edge.target.clone();
                let mut new_state = (*snap).clone();
                let old_queue = new_state.queue.take();
                new_state.mode = Mode::Drained;
                new_state.downstream_count = 0;
                new_state.queue = Some(Arc::new(Mutex::new(Queue::drained_sentinel())));
                self.state.store(new_state);
                drop(guard);

                if let Some(old_queue) = old_queue {
                    let mut pending = Vec::new();
                    old_queue.lock().dispatch_into(|m| pending.push(m));
                    for m in pending {
                        target.propagate(m, true);
                    }
                }
                if let Some(n) = name {
                    // There is no live edge left to unlink (drained nodes
                    // hold none); `unlink` on this id is a spent no-op.
                    self.cancellations.lock().insert(n, CancelEntry::Edge(edge_id));
                }
                tracing::debug!(node = %self.description, "closed node drained by newly linked consumer");
                self.notify_watchers(Mode::Drained, 0, None);
                post(true);
                Ok(true)
            },
            Mode::Error | Mode::Drained | Mode::Consumed => {
                drop(guard);
                pre(false);
                post(false);
                Ok(false)
            },
        }
    }

    /// Removes `edge_id` from this node's downstream set. A no-op
    /// returning `false` if the edge isn't present (see `SPEC_FULL.md`
    /// §9's resolution of the "always-unreachable branch" open
    /// question) or the node isn't in a linkable mode.
    pub fn unlink(&self, edge_id: EdgeId) -> bool {
        let guard = self.lock.acquire_exclusive();
        let snap = self.state.load();
        if !matches!(snap.mode, Mode::Open | Mode::Split) {
            drop(guard);
            return false;
        }
        let removed = {
            let mut edges = self.edges.write();
            edges.iter().position(|e| e.id == edge_id).map(|idx| edges.remove(idx))
        };
        let Some(removed) = removed else {
            drop(guard);
            return false;
        };
        let mut new_state = (*snap).clone();
        if !removed.sneaky {
            new_state.downstream_count = new_state.downstream_count.saturating_sub(1);
        }
        let became_empty = new_state.downstream_count == 0;
        if became_empty && new_state.permanent {
            new_state.queue = Some(Arc::new(Mutex::new(Queue::new(new_state.transactional))));
            let notify_mode = new_state.mode;
            self.state.store(new_state);
            drop(guard);
            self.notify_watchers(notify_mode, 0, None);
            true
        } else if became_empty {
            self.state.store(new_state);
            drop(guard);
            self.close(false);
            true
        } else {
            let notify_mode = new_state.mode;
            let notify_count = new_state.downstream_count;
            self.state.store(new_state);
            drop(guard);
            if notify_count == 0 || notify_count == 1 {
                self.notify_watchers(notify_mode, notify_count, None);
            }
            true
        }
    }

    // -- consume / unconsume ----------------------------------------------

    /// Installs `edge` as this node's sole consumer. `Ok` wraps a
    /// one-shot cancellation thunk equivalent to calling `unconsume`.
    pub fn consume(&self, edge: Edge<T>) -> Option<Box<dyn FnOnce() -> bool + Send>> {
        let guard = self.lock.acquire_exclusive();
        let snap = self.state.load();
        match snap.mode {
            Mode::Split => {
                let split = snap.split.clone().expect("split mode always carries a split target");
                drop(guard);
                split.consume(edge)
            },
            Mode::Drained | Mode::Error => {
                // Idempotent: nothing to install, but report success with
                // a thunk that does nothing when invoked.
                drop(guard);
                Some(Box::new(|| false))
            },
            Mode::Open if snap.downstream_count == 0 => {
                let edge_id = edge.id;
                let target = edge.target.clone();
                let queue = self.materialize_queue_locked(&snap);
                let mut new_state = (*snap).clone();
                new_state.queue = Some(queue);
                new_state.mode = Mode::Consumed;
                new_state.downstream_count = 1;
                let make_transactional = new_state.transactional;
                *self.edges.write() = vec![edge];
                self.state.store(new_state);
                drop(guard);

                if make_transactional {
                    target.transactional();
                }
                self.notify_watchers(Mode::Consumed, 1, None);
                let this = self.self_arc();
                Some(Box::new(move || this.unconsume(edge_id)))
            },
            _ => {
                drop(guard);
                None
            },
        }
    }

    /// Detaches the sole consumer `edge_id`, reverting to `Open` or
    /// `Closed` depending on whether the queue had already been closed.
    pub fn unconsume(&self, edge_id: EdgeId) -> bool {
        let guard = self.lock.acquire_exclusive();
        let snap = self.state.load();
        if snap.mode != Mode::Consumed {
            drop(guard);
            return false;
        }
        let is_match = self.edges.read().first().is_some_and(|e| e.id == edge_id);
        if !is_match {
            drop(guard);
            return false;
        }
        self.edges.write().clear();
        let mut new_state = (*snap).clone();
        let queue_closed = new_state.queue.as_ref().is_none_or(|q| q.lock().closed());
        new_state.downstream_count = 0;
        new_state.mode = if queue_closed { Mode::Closed } else { Mode::Open };
        let notify_mode = new_state.mode;
        self.state.store(new_state);
        drop(guard);
        self.notify_watchers(notify_mode, 0, None);
        true
    }

    // -- split --------------------------------------------------------------

    /// Hands this node's queue, edges, watchers, and cancellations to a
    /// fresh clone, leaving this node in `Mode::Split` with a single
    /// synthetic downstream edge to the clone. See `SPEC_FULL.md` §4.2.
    #[must_use]
    pub fn split(&self) -> Arc<Node<T>> {
        let guard = self.lock.acquire_exclusive();
        let snap = self.state.load();

        // No operator on the clone: `self` already ran it (in `propagate`,
        // before `propagate_transformed` ever reaches the fused walk that
        // hops onto this clone via the synthetic join edge below), so
        // re-applying it here would transform every message twice.
        let clone = Node::new(NodeConfig {
            description: self.description.clone(),
            operator: None,
            grounded: self.grounded,
            permanent: snap.permanent,
        });
        let mut clone_state = (*snap).clone();
        clone_state.split = None;
        clone.state.store(clone_state);
        *clone.edges.write() = std::mem::take(&mut *self.edges.write());
        *clone.watchers.lock() = std::mem::take(&mut *self.watchers.lock());
        *clone.cancellations.lock() = std::mem::take(&mut *self.cancellations.lock());

        let mut new_state = (*snap).clone();
        new_state.mode = Mode::Split;
        new_state.queue = None;
        new_state.split = Some(clone.clone());
        new_state.downstream_count = 0;
        self.state.store(new_state);
        drop(guard);

        let this = self.self_arc();
        crate::connectors::join(&this, &clone, "split").expect("a freshly split node's synthetic join edge cannot fail");
        clone
    }

    // -- close / error --------------------------------------------------------

    /// Stops accepting new messages. A no-op on an already-terminal or
    /// `Split` node (closure of a split subgraph flows through the split
    /// target instead), and on a `permanent` node unless `force`.
    pub fn close(&self, force: bool) -> bool {
        let guard = self.lock.acquire_exclusive();
        let snap = self.state.load();
        if snap.mode.is_terminal() || snap.mode == Mode::Split {
            drop(guard);
            return false;
        }
        if snap.permanent && !force {
            drop(guard);
            return false;
        }
        self.edges.write().clear();
        let old_queue = snap.queue.clone();
        let is_empty = old_queue.as_ref().is_none_or(|q| q.lock().is_empty());
        let mut new_state = (*snap).clone();
        new_state.downstream_count = 0;
        if is_empty {
            new_state.mode = Mode::Drained;
            new_state.queue = Some(Arc::new(Mutex::new(Queue::drained_sentinel())));
        } else {
            new_state.mode = Mode::Closed;
        }
        let notify_mode = new_state.mode;
        self.state.store(new_state);
        drop(guard);
        // Same reentrancy hazard as `transition_to_error`: settle the old
        // queue only after this node's own lock is released.
        if let Some(q) = &old_queue {
            q.lock().close();
        }
        tracing::debug!(node = %self.description, mode = ?notify_mode, "node closed");
        self.notify_watchers(notify_mode, 0, None);
        true
    }

    /// Transitions to `Mode::Error`, same guard semantics as `close`
    /// (except `Split` nodes error directly rather than delegating).
    pub fn error(&self, err: NodeErrorValue, force: bool) -> bool {
        let guard = self.lock.acquire_exclusive();
        let snap = self.state.load();
        if snap.mode.is_terminal() {
            drop(guard);
            return false;
        }
        if snap.permanent && !force {
            drop(guard);
            return false;
        }
        drop(guard);
        self.transition_to_error(err);
        true
    }

    // -- receive / read / drain --------------------------------------------

    /// Registers a cancellable read. If `name` is already bound to a
    /// pending receive, this is idempotent (`Ok(true)`, no second
    /// registration); if bound to something else, it's an error.
    pub fn receive(&self, name: Option<String>, callback: impl FnOnce(ReceiveValue<T>) + Send + 'static) -> Result<bool> {
        let guard = self.lock.acquire_exclusive();
        let snap = self.state.load();
        if let Mode::Split = snap.mode {
            let split = snap.split.clone().expect("split mode always carries a split target");
            drop(guard);
            return split.receive(name, callback);
        }
        if let Some(n) = &name {
            match self.cancellations.lock().get(n) {
                Some(CancelEntry::Receive(_)) => {
                    drop(guard);
                    return Ok(true);
                },
                Some(_) => {
                    drop(guard);
                    return Err(NodeError::InvalidReceiveState(n.clone()));
                },
                None => {},
            }
        }
        let queue = self.materialize_queue_locked(&snap);
        drop(guard);

        let result = queue.lock().receive(None);
        let this = self.self_arc();
        result.subscribe(move |_| this.check_drained_after_read());

        if let Some(n) = name {
            if result.is_pending() {
                self.cancellations.lock().insert(n.clone(), CancelEntry::Receive(result.clone()));
                let this = self.self_arc();
                let name_for_removal = n;
                result.subscribe(move |_| {
                    this.cancellations.lock().remove(&name_for_removal);
                });
            }
        }
        result.subscribe(callback);
        Ok(true)
    }

    /// Uncancellable read: forwards to the split target if split,
    /// otherwise reads straight off the queue.
    #[must_use]
    pub fn read_node(&self) -> Arc<ReceiveResult<T>> {
        let snap = self.state.load();
        if let Mode::Split = snap.mode {
            return snap.split.clone().expect("split mode always carries a split target").read_node();
        }
        let queue = self.ensure_queue();
        let result = queue.lock().receive(None);
        let this = self.self_arc();
        result.subscribe(move |_| this.check_drained_after_read());
        result
    }

    /// Atomically empties the queue, returning every buffered message in
    /// FIFO order.
    #[must_use]
    pub fn drain(&self) -> Vec<T> {
        let snap = self.state.load();
        if let Mode::Split = snap.mode {
            return snap.split.clone().expect("split mode always carries a split target").drain();
        }
        let guard = self.lock.acquire_exclusive();
        let snap = self.state.load();
        let Some(queue) = snap.queue.clone() else {
            drop(guard);
            return Vec::new();
        };
        let messages = queue.lock().drain_messages();
        drop(guard);
        self.check_drained_after_read();
        messages
    }

    // -- transactional / cancel / watchers ----------------------------------

    /// Upgrades this node's entire reachable downstream subgraph to
    /// transactional queues. Discovers the reachable `Node` targets
    /// first (best-effort, without holding any lock), then acquires
    /// every discovered node's exclusive lock as one deadlock-free set
    /// (sorted by `NodeId`, see `SPEC_FULL.md` §9's "hand-over-hand on
    /// sets" note) before installing each node's transactional queue
    /// copy and releasing the whole set at once.
    pub fn transactional(&self) {
        if self.state.load().transactional {
            return;
        }

        let mut discovered = vec![self.self_arc()];
        let mut seen = HashSet::new();
        seen.insert(self.id);
        let mut frontier = vec![self.self_arc()];
        while let Some(node) = frontier.pop() {
            for edge in node.edges.read().iter() {
                match edge.target.as_node() {
                    Some(next) if seen.insert(next.id) => {
                        discovered.push(next.clone());
                        frontier.push(next.clone());
                    },
                    Some(_) => {},
                    None => edge.target.transactional(),
                }
            }
        }
        discovered.sort_by_key(|n| n.id);
        discovered.dedup_by_key(|n| n.id);

        for node in &discovered {
            node.in_transaction.store(true, Ordering::SeqCst);
        }
        let locks: Vec<&AsymmetricLock> = discovered.iter().map(|n| &n.lock).collect();
        let _guards = acquire_all_exclusive(locks);

        for node in &discovered {
            let snap = node.state.load();
            if snap.transactional {
                continue;
            }
            let mut new_state = (*snap).clone();
            new_state.transactional = true;
            if let Some(q) = &new_state.queue {
                new_state.queue = Some(Arc::new(Mutex::new(q.lock().transactional_copy())));
            }
            node.state.store(new_state);
        }
        for node in &discovered {
            node.in_transaction.store(false, Ordering::SeqCst);
        }
    }

    /// Reverses a prior `link`/`receive`/`on_state_changed` registration.
    /// Rejected outright while this node is part of an in-progress
    /// `transactional()` upgrade.
    pub fn cancel(&self, name: &str) -> Result<bool> {
        if self.in_transaction.load(Ordering::SeqCst) {
            return Err(NodeError::CancelDuringTransaction);
        }
        let guard = self.lock.acquire_exclusive();
        let snap = self.state.load();
        if let Mode::Split = snap.mode {
            let split = snap.split.clone().expect("split mode always carries a split target");
            drop(guard);
            return split.cancel(name);
        }
        let entry = self.cancellations.lock().remove(name);
        match entry {
            None => {
                drop(guard);
                Ok(false)
            },
            Some(CancelEntry::Edge(edge_id)) => {
                drop(guard);
                Ok(self.unlink(edge_id))
            },
            Some(CancelEntry::Receive(result)) => {
                if let Some(q) = &snap.queue {
                    q.lock().cancel_receive(&result);
                }
                result.cancel();
                drop(guard);
                Ok(true)
            },
            Some(CancelEntry::Watcher(id)) => {
                self.watchers.lock().retain(|(wid, _)| *wid != id);
                drop(guard);
                Ok(true)
            },
        }
    }

    /// Registers a state-change watcher, invoking it once immediately
    /// with the current `(mode, downstream_count, error)`. A no-op on an
    /// already-terminal node.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NameInUse`] if `name` is already registered
    /// for a different cancellation on this node.
    pub fn on_state_changed(
        &self,
        name: Option<String>,
        callback: impl Fn(Mode, usize, Option<NodeErrorValue>) + Send + Sync + 'static,
    ) -> Result<bool> {
        let guard = self.lock.acquire_exclusive();
        if let Some(n) = &name {
            if self.cancellations.lock().contains_key(n) {
                drop(guard);
                return Err(NodeError::NameInUse(n.clone()));
            }
        }
        let snap = self.state.load();
        if snap.mode.is_terminal() {
            drop(guard);
            return Ok(false);
        }
        let id = WatcherId::next();
        let cb: WatcherFn<T> = Arc::new(callback);
        self.watchers.lock().push((id, cb.clone()));
        if let Some(n) = name {
            self.cancellations.lock().insert(n, CancelEntry::Watcher(id));
        }
        drop(guard);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| cb(snap.mode, snap.downstream_count, snap.error.clone())));
        if outcome.is_err() {
            tracing::warn!(node = %self.description, "state-changed watcher panicked on initial invocation; ignoring");
        }
        Ok(true)
    }
}

impl<T: Clone + Send + Sync + 'static> Propagator<T> for Node<T> {
    fn propagate(&self, msg: T, transform: bool) -> Outcome<T> {
        Node::propagate(self, msg, transform)
    }

    fn downstream_count(&self) -> usize {
        Node::downstream_count(self)
    }

    fn transactional(&self) {
        Node::transactional(self);
    }

    fn description(&self) -> &str {
        Node::description(self)
    }
}
