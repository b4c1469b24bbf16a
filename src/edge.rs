// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Edges, propagation targets, and the outcome of a propagation attempt.
//!
//! A node's downstream set is not always other nodes — connectors and
//! external collaborators may install a bare [`Propagator`]. [`Target`]
//! closes over exactly those two cases so the fused single-edge walk and
//! the fan-out path can dispatch without any dynamic downcasting: a node
//! target is matched directly and recurses through [`crate::node::Node`]
//! in full, while any other propagator goes through the trait's own
//! `propagate`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::node::Node;
use crate::receive_result::ReceiveResult;

/// Identifies one [`Edge`] instance for later removal by `unlink`,
/// independent of its target's identity (two edges may legitimately
/// point at the same target).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeId(u64);

impl EdgeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The result of one propagation attempt at a single edge or node.
#[derive(Clone)]
pub enum Outcome<T> {
    /// Accepted; resolves once a downstream consumer actually reads it.
    Delivered(Arc<ReceiveResult<T>>),
    /// Accepted and fully handled with no further waiting possible
    /// (e.g. delivered straight into a consumed node's queue).
    Grounded,
    /// Rejected by a filtering propagator without being an error.
    Filtered,
    /// The target was already closed or drained; the message was
    /// dropped.
    Closed,
    /// The target had already errored; the message was dropped.
    Errored,
    /// Multiple downstream edges were walked; one outcome per edge, in
    /// edge-registration order.
    FanOut(Vec<Outcome<T>>),
}

/// Object-safe trait for anything an [`Edge`] may target besides another
/// [`Node`] directly.
pub trait Propagator<T>: Send + Sync {
    fn propagate(&self, msg: T, transform: bool) -> Outcome<T>;
    fn downstream_count(&self) -> usize;
    /// Participates in a `transactional()` upgrade rooted upstream of it.
    /// Most external propagators have no sub-structure of their own to
    /// lock, so the default is a no-op.
    fn transactional(&self) {}
    fn description(&self) -> &str;
}

/// What an [`Edge`] points at.
pub enum Target<T> {
    Node(Arc<Node<T>>),
    Other(Arc<dyn Propagator<T>>),
}

impl<T> Clone for Target<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Node(n) => Self::Node(n.clone()),
            Self::Other(p) => Self::Other(p.clone()),
        }
    }
}

impl<T> Target<T> {
    pub fn propagate(&self, msg: T, transform: bool) -> Outcome<T> {
        match self {
            Self::Node(node) => node.propagate(msg, transform),
            Self::Other(propagator) => propagator.propagate(msg, transform),
        }
    }

    #[must_use]
    pub fn downstream_count(&self) -> usize {
        match self {
            Self::Node(node) => node.downstream_count(),
            Self::Other(propagator) => propagator.downstream_count(),
        }
    }

    pub fn transactional(&self) {
        match self {
            Self::Node(node) => node.transactional(),
            Self::Other(propagator) => propagator.transactional(),
        }
    }

    #[must_use]
    pub fn as_node(&self) -> Option<&Arc<Node<T>>> {
        match self {
            Self::Node(node) => Some(node),
            Self::Other(_) => None,
        }
    }

    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Node(node) => node.description().to_string(),
            Self::Other(propagator) => propagator.description().to_string(),
        }
    }
}

/// A directed connection from a node to one downstream [`Target`].
pub struct Edge<T> {
    pub id: EdgeId,
    pub target: Target<T>,
    /// Human-readable label surfaced in error messages and debug logs.
    pub description: String,
    /// Edges installed by a connector's internal plumbing (watcher
    /// propagation, cascade bookkeeping) rather than by user-level
    /// `link`; excluded from `downstream_count` so connectors remain
    /// transparent to `propagate`'s queue-vs-direct decision.
    pub sneaky: bool,
}

impl<T> Edge<T> {
    #[must_use]
    pub fn new(target: Target<T>, description: impl Into<String>) -> Self {
        Self { id: EdgeId::next(), target, description: description.into(), sneaky: false }
    }

    #[must_use]
    pub fn sneaky(target: Target<T>, description: impl Into<String>) -> Self {
        Self { id: EdgeId::next(), target, description: description.into(), sneaky: true }
    }
}

// Hand-written rather than `#[derive(Clone)]`: a derive would add a
// spurious `T: Clone` bound even though the only `T`-bearing field,
// `target`, is already cloneable regardless of `T` itself.
impl<T> Clone for Edge<T> {
    fn clone(&self) -> Self {
        Self { id: self.id, target: self.target.clone(), description: self.description.clone(), sneaky: self.sneaky }
    }
}
