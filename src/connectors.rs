// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! `connect`/`siphon`/`join`: composing `link` with state-change watchers
//! so closure and error cascade across an edge without the caller having
//! to wire that up by hand. See `SPEC_FULL.md` §4.5.
//!
//! Every watcher here closes over a [`Weak`] reference to its other end,
//! never a strong one — a live edge already keeps `dst` alive through
//! `src`'s edge list, and a watcher holding a second strong reference the
//! other way would leak both nodes in a cycle once disconnected. Cascade
//! work (`close`, `error`, `unlink`) is always deferred through
//! [`crate::threads::enqueue_cleanup`] so it runs off the watcher-firing
//! thread's stack, breaking the recursive-lock cycle a same-stack cascade
//! would otherwise risk.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::edge::{Edge, Target};
use crate::error::{NodeErrorValue, Result};
use crate::mode::Mode;
use crate::node::Node;
use crate::threads;

fn next_watcher_name(prefix: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("{prefix}-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Links `src` to `dst`, then wires up whichever cascades `upstream`/
/// `downstream` ask for.
///
/// - `downstream`: when `src` drains or errors, `dst` is closed or
///   errored to match.
/// - `upstream`: when `dst` closes or drains, `src`'s edge toward it is
///   unlinked; when `dst` errors, `src` either errors too (if
///   `downstream` is also set — a [`join`]) or is merely unlinked (a
///   [`siphon`]).
///
/// Returns `Ok(false)` if `link` itself was rejected (see
/// [`Node::link`]); no watchers are registered in that case.
///
/// # Errors
///
/// Propagates any error `link`/`on_state_changed` returns (a duplicate
/// internal cancellation name, which cannot happen from this function's
/// own unnamed registrations but can in principle bubble from a
/// caller-supplied `name`... this function never passes one, so in
/// practice this is always `Ok`).
pub fn connect<T: Clone + Send + Sync + 'static>(
    src: &Arc<Node<T>>,
    dst: &Arc<Node<T>>,
    upstream: bool,
    downstream: bool,
    description: impl Into<String>,
) -> Result<bool> {
    let edge = Edge::new(Target::Node(dst.clone()), description);
    let edge_id = edge.id;
    if !src.link(None, edge, |_| {}, |_| {})? {
        return Ok(false);
    }

    if downstream {
        let dst_weak = Arc::downgrade(dst);
        src.on_state_changed(None, move |mode, _count, err| {
            downstream_callback(&dst_weak, mode, err);
        })?;
    }

    if upstream {
        let src_weak = Arc::downgrade(src);
        let watcher_name = next_watcher_name("connector-upstream");
        dst.on_state_changed(Some(watcher_name.clone()), move |mode, _count, err| {
            upstream_callback(&src_weak, edge_id, downstream, mode, err);
        })?;

        if !downstream {
            // siphon: once src itself reaches a terminal state there is
            // no more cascade to carry, so drop the watcher we just
            // registered on dst rather than leaking it for dst's
            // lifetime.
            let dst_weak = Arc::downgrade(dst);
            src.on_state_changed(None, move |mode, _, _| {
                if mode.is_terminal() {
                    if let Some(dst) = dst_weak.upgrade() {
                        let name = watcher_name.clone();
                        threads::enqueue_cleanup(move || {
                            let _ = dst.cancel(&name);
                        });
                    }
                }
            })?;
        }
    }

    Ok(true)
}

fn downstream_callback<T: Clone + Send + Sync + 'static>(dst_weak: &Weak<Node<T>>, mode: Mode, err: Option<NodeErrorValue>) {
    let Some(dst) = dst_weak.upgrade() else { return };
    match mode {
        Mode::Drained => {
            threads::enqueue_cleanup(move || {
                dst.close(false);
            });
        },
        Mode::Error => {
            if let Some(err) = err {
                threads::enqueue_cleanup(move || {
                    dst.error(err, false);
                });
            }
        },
        _ => {},
    }
}

fn upstream_callback<T: Clone + Send + Sync + 'static>(
    src_weak: &Weak<Node<T>>,
    edge_id: crate::edge::EdgeId,
    is_join: bool,
    mode: Mode,
    err: Option<NodeErrorValue>,
) {
    let Some(src) = src_weak.upgrade() else { return };
    match mode {
        Mode::Closed | Mode::Drained => {
            threads::enqueue_cleanup(move || {
                src.unlink(edge_id);
            });
        },
        Mode::Error if is_join => {
            if let Some(err) = err {
                threads::enqueue_cleanup(move || {
                    src.error(err, false);
                });
            }
        },
        Mode::Error => {
            threads::enqueue_cleanup(move || {
                src.unlink(edge_id);
            });
        },
        _ => {},
    }
}

/// `connect` with `upstream = true, downstream = false`: a one-way tap
/// that stops forwarding once either end goes terminal, but never
/// propagates `dst`'s errors back onto `src`.
///
/// # Errors
///
/// See [`connect`].
pub fn siphon<T: Clone + Send + Sync + 'static>(src: &Arc<Node<T>>, dst: &Arc<Node<T>>, description: impl Into<String>) -> Result<bool> {
    connect(src, dst, true, false, description)
}

/// `connect` with `upstream = true, downstream = true`: both ends track
/// each other's closure and error state.
///
/// # Errors
///
/// See [`connect`].
pub fn join<T: Clone + Send + Sync + 'static>(src: &Arc<Node<T>>, dst: &Arc<Node<T>>, description: impl Into<String>) -> Result<bool> {
    connect(src, dst, true, true, description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::error::PlainError;
    use std::thread;
    use std::time::Duration;

    fn settle() {
        // The cascade runs on the process-wide cleanup thread; give it a
        // moment to drain before asserting on its effects.
        thread::sleep(Duration::from_millis(50));
    }

    #[test]
    fn join_cascades_drain_downstream() {
        let src: Arc<Node<i32>> = Node::new(NodeConfig::new("src"));
        let dst: Arc<Node<i32>> = Node::new(NodeConfig::new("dst"));
        join(&src, &dst, "edge").unwrap();
        src.consume(Edge::new(Target::Other(Arc::new(NoopSink)), "consumer"));
        src.close(false);
        settle();
        assert!(matches!(dst.mode(), Mode::Closed | Mode::Drained));
    }

    #[test]
    fn join_cascades_error_both_ways() {
        let src: Arc<Node<i32>> = Node::new(NodeConfig::new("src"));
        let dst: Arc<Node<i32>> = Node::new(NodeConfig::new("dst"));
        join(&src, &dst, "edge").unwrap();
        src.error(PlainError::boxed("boom"), false);
        settle();
        assert_eq!(dst.mode(), Mode::Error);
    }

    #[test]
    fn siphon_does_not_propagate_error_upstream() {
        let src: Arc<Node<i32>> = Node::new(NodeConfig::new("src"));
        let dst: Arc<Node<i32>> = Node::new(NodeConfig::new("dst"));
        siphon(&src, &dst, "edge").unwrap();
        dst.error(PlainError::boxed("downstream boom"), false);
        settle();
        assert_ne!(src.mode(), Mode::Error);
    }

    struct NoopSink;

    impl crate::edge::Propagator<i32> for NoopSink {
        fn propagate(&self, _msg: i32, _transform: bool) -> crate::edge::Outcome<i32> {
            crate::edge::Outcome::Grounded
        }

        fn downstream_count(&self) -> usize {
            0
        }

        fn description(&self) -> &str {
            "noop"
        }
    }
}
