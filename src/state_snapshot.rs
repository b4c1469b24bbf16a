// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The immutable `NodeState` snapshot and its lock-free holder.
//!
//! A node's mode, downstream count, queue handle, error, and flags are
//! replaced as one atomic unit on every transition. Readers that only
//! need a consistent snapshot (predicates like `closed?`, the fused
//! propagation walk's mode check before it decides whether to continue)
//! load it through `ArcSwap` without ever touching the node's
//! [`crate::lock::AsymmetricLock`] — only the installing writer needs the
//! exclusive lock, to serialize against concurrent transitions.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::error::NodeErrorValue;
use crate::mode::Mode;
use crate::node::Node;
use crate::queue::Queue;

/// Plain-data snapshot of everything about a node that changes on a
/// mode transition. See `SPEC_FULL.md` §3 for the field-by-field
/// contract.
pub struct NodeStateValue<T> {
    pub mode: Mode,
    pub downstream_count: usize,
    pub split: Option<Arc<Node<T>>>,
    pub error: Option<NodeErrorValue>,
    /// Wrapped in a `Mutex` purely for interior mutability: every access
    /// happens while the owning node's exclusive lock is already held,
    /// so this is never contended, but `Queue`'s `&mut self` methods
    /// still need somewhere to live behind the shared `Arc` snapshot.
    pub queue: Option<Arc<Mutex<Queue<T>>>>,
    pub read: bool,
    pub transactional: bool,
    pub permanent: bool,
}

impl<T> NodeStateValue<T> {
    pub fn new(permanent: bool) -> Self {
        Self {
            mode: Mode::Open,
            downstream_count: 0,
            split: None,
            error: None,
            queue: None,
            read: false,
            transactional: false,
            permanent,
        }
    }
}

// Hand-written rather than `#[derive(Clone)]`: a derive would add a
// spurious `T: Clone` bound even though every field holding a `T` does
// so behind an `Arc`.
impl<T> Clone for NodeStateValue<T> {
    fn clone(&self) -> Self {
        Self {
            mode: self.mode,
            downstream_count: self.downstream_count,
            split: self.split.clone(),
            error: self.error.clone(),
            queue: self.queue.clone(),
            read: self.read,
            transactional: self.transactional,
            permanent: self.permanent,
        }
    }
}

/// Lock-free holder for a [`NodeStateValue`]. `load` is a snapshot read;
/// `store` installs a whole new value and must only be called while the
/// node's exclusive lock is held.
pub struct StateHolder<T>(ArcSwap<NodeStateValue<T>>);

impl<T> StateHolder<T> {
    pub fn new(value: NodeStateValue<T>) -> Self {
        Self(ArcSwap::from_pointee(value))
    }

    pub fn load(&self) -> Arc<NodeStateValue<T>> {
        self.0.load_full()
    }

    pub fn store(&self, value: NodeStateValue<T>) {
        self.0.store(Arc::new(value));
    }
}
