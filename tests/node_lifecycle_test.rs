// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Integration coverage for the six concrete scenarios and the
//! round-trip/idempotence properties called out in `SPEC_FULL.md` §8,
//! driven entirely through the crate's public API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use dataflow_node::{Edge, Node, NodeConfig, NodeError, Outcome, PlainError, Propagator, ReceiveValue, Target};

#[derive(Default)]
struct NullSink;

impl Propagator<i32> for NullSink {
    fn propagate(&self, _msg: i32, _transform: bool) -> Outcome<i32> {
        Outcome::Grounded
    }

    fn downstream_count(&self) -> usize {
        0
    }

    fn description(&self) -> &str {
        "null-sink"
    }
}

fn null_edge(description: &str) -> Edge<i32> {
    Edge::new(Target::Other(Arc::new(NullSink)), description)
}

/// Scenario 1: solo enqueue then consume.
#[test]
fn solo_enqueue_then_consume_reads_in_order() {
    let node: Arc<Node<i32>> = Node::new(NodeConfig::new("solo"));
    for v in [1, 2, 3] {
        node.propagate(v, false);
    }

    let thunk = node.consume(null_edge("reader")).expect("open edge-free node accepts a consumer");
    assert_eq!(node.mode(), dataflow_node::Mode::Consumed);

    let seen = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..3 {
        let seen = seen.clone();
        node.read_node().subscribe(move |v| {
            if let ReceiveValue::Value(n) = v {
                seen.lock().unwrap().push(n);
            }
        });
    }
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    assert!(thunk());
}

/// Scenario 2: a chain of single-edge nodes fuses rather than
/// recursing. A background thread continuously probes every node's
/// exclusive lock with `try_acquire_exclusive` while messages flow
/// through the chain; since the fused walk only ever takes a buffered
/// snapshot of `NodeState` and briefly locks one queue's own mutex per
/// hop, the node-level exclusive lock is never the thing serializing
/// the walk — this test's invariant (never more than one locked at
/// once) holds trivially strongly rather than marginally, which is
/// exactly the property §4.3 asks for.
#[test]
fn single_edge_chain_fuses_without_holding_two_locks() {
    let a: Arc<Node<i32>> = Node::new(NodeConfig::new("a"));
    let b: Arc<Node<i32>> = Node::new(NodeConfig::new("b"));
    let c: Arc<Node<i32>> = Node::new(NodeConfig::new("c"));

    a.link(None, Edge::new(Target::Node(b.clone()), "a-b"), |_| {}, |_| {}).unwrap();
    b.link(None, Edge::new(Target::Node(c.clone()), "b-c"), |_| {}, |_| {}).unwrap();
    let thunk = c.consume(null_edge("consumer")).expect("c accepts a consumer");

    let stop = Arc::new(AtomicBool::new(false));
    let max_simultaneously_locked = Arc::new(AtomicUsize::new(0));

    let watcher = {
        let (a, b, c) = (a.clone(), b.clone(), c.clone());
        let (stop, max_simultaneously_locked) = (stop.clone(), max_simultaneously_locked.clone());
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let locked = [a.try_acquire_exclusive(), b.try_acquire_exclusive(), c.try_acquire_exclusive()]
                    .into_iter()
                    .filter(|g| g.is_none())
                    .count();
                max_simultaneously_locked.fetch_max(locked, Ordering::Relaxed);
            }
        })
    };

    for v in 0..200 {
        a.propagate(v, true);
    }

    stop.store(true, Ordering::Relaxed);
    watcher.join().unwrap();
    assert!(max_simultaneously_locked.load(Ordering::Relaxed) <= 1);

    // Nobody ever read from `c` while messages were in flight, so they
    // piled up in its queue; draining confirms every one of them made
    // it all the way down the fused chain, in order.
    let drained = c.drain();
    assert_eq!(drained, (0..200).collect::<Vec<_>>());
    assert!(thunk());
}

/// Scenario 3: filter sentinel.
#[test]
fn filter_sentinel_drops_odd_values() {
    let node: Arc<Node<i32>> = Node::new(NodeConfig::new("evens-only").operator(|x| Ok(if x % 2 == 0 { Some(x) } else { None })));
    let sink: Arc<Node<i32>> = Node::new(NodeConfig::new("sink"));
    sink.consume(null_edge("consumer")).expect("sink accepts a consumer");
    node.link(None, Edge::new(Target::Node(sink.clone()), "e"), |_| {}, |_| {}).unwrap();

    assert!(matches!(node.propagate(1, true), Outcome::Filtered));
    assert!(!matches!(node.propagate(2, true), Outcome::Filtered));
    assert!(matches!(node.propagate(3, true), Outcome::Filtered));
    assert!(!matches!(node.propagate(4, true), Outcome::Filtered));

    let seen = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..2 {
        let seen = seen.clone();
        sink.read_node().subscribe(move |v| {
            if let ReceiveValue::Value(n) = v {
                seen.lock().unwrap().push(n);
            }
        });
    }
    assert_eq!(*seen.lock().unwrap(), vec![2, 4]);
}

/// Scenario 4: operator throws.
#[test]
fn operator_failure_errors_node_and_rejects_future_operations() {
    let node: Arc<Node<i32>> = Node::new(NodeConfig::new("boom").operator(|_| Err(PlainError::boxed("kaboom"))));

    assert!(matches!(node.propagate(1, true), Outcome::Errored));
    assert_eq!(node.mode(), dataflow_node::Mode::Error);
    assert!(matches!(node.propagate(2, true), Outcome::Errored));
    assert!(!node.link(None, null_edge("late"), |_| {}, |_| {}).unwrap());
}

/// Scenario 5: close with pending messages.
#[test]
fn close_with_pending_messages_drains_then_rejects_second_close() {
    let node: Arc<Node<i32>> = Node::new(NodeConfig::new("n"));
    for v in [1, 2, 3] {
        node.propagate(v, false);
    }
    node.consume(null_edge("consumer")).expect("open edge-free node accepts a consumer");

    assert!(node.close(false));
    assert_eq!(node.mode(), dataflow_node::Mode::Closed);

    let seen = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..3 {
        let seen = seen.clone();
        node.read_node().subscribe(move |v| {
            if let ReceiveValue::Value(n) = v {
                seen.lock().unwrap().push(n);
            }
        });
    }
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(node.mode(), dataflow_node::Mode::Drained);
    assert!(!node.close(false));
}

/// Scenario 6: cascading error via `join`. Runs under `#[tokio::test]`
/// purely as a convenient async runner to `sleep` on while the cascade
/// runs on the crate's own background cleanup thread — the crate under
/// test has no tokio dependency of its own.
#[tokio::test]
async fn join_cascades_error_to_both_ends() {
    let a: Arc<Node<i32>> = Node::new(NodeConfig::new("a"));
    let b: Arc<Node<i32>> = Node::new(NodeConfig::new("b"));
    dataflow_node::join(&a, &b, "a-b").unwrap();

    let err = PlainError::boxed("propagated failure");
    assert!(a.error(err.clone(), false));

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(a.mode(), dataflow_node::Mode::Error);
    assert_eq!(b.mode(), dataflow_node::Mode::Error);
    assert_eq!(a.state().error.as_ref().map(|e| e.to_string()), Some(err.to_string()));
    assert_eq!(b.state().error.as_ref().map(|e| e.to_string()), Some(err.to_string()));
}

/// Round-trip: re-linking an already-registered cancellation name fails
/// without mutating edges or downstream count.
#[test]
fn relinking_duplicate_name_fails_without_mutation() {
    let node: Arc<Node<i32>> = Node::new(NodeConfig::new("n"));
    assert!(node.link(Some("e".to_string()), null_edge("first"), |_| {}, |_| {}).unwrap());
    assert_eq!(node.downstream_count(), 1);

    let err = node.link(Some("e".to_string()), null_edge("second"), |_| {}, |_| {}).unwrap_err();
    assert!(matches!(err, NodeError::NameInUse(name) if name == "e"));
    assert_eq!(node.downstream_count(), 1);
}

/// Round-trip: double `close` returns `true` then `false`.
#[test]
fn double_close_returns_true_then_false() {
    let node: Arc<Node<i32>> = Node::new(NodeConfig::new("n"));
    assert!(node.close(false));
    assert_eq!(node.mode(), dataflow_node::Mode::Drained);
    assert!(!node.close(false));
}

/// Round-trip: `transactional()` on an already-transactional node is a
/// no-op.
#[test]
fn transactional_upgrade_is_idempotent() {
    let node: Arc<Node<i32>> = Node::new(NodeConfig::new("n"));
    assert!(!node.state().transactional);
    node.transactional();
    assert!(node.state().transactional);
    // Second call must not panic or deadlock against the set it already
    // upgraded.
    node.transactional();
    assert!(node.state().transactional);
}

/// Round-trip: a `link`/`cancel` pair with no intervening propagation
/// restores `downstream_count` to its prior value.
#[test]
fn link_cancel_roundtrip_restores_downstream_count() {
    let node: Arc<Node<i32>> = Node::new(NodeConfig::new("n"));
    assert_eq!(node.downstream_count(), 0);
    node.link(Some("e".to_string()), null_edge("edge"), |_| {}, |_| {}).unwrap();
    assert_eq!(node.downstream_count(), 1);
    assert!(node.cancel("e").unwrap());
    // An open node with no downstream edges and nothing ever read from
    // it closes out to `Drained` once its last edge is removed (§4.2
    // `unlink`); `downstream_count` is back at zero either way.
    assert_eq!(node.downstream_count(), 0);
}

/// `split` hands the queue/edges off to a clone and installs a synthetic
/// edge from the original to it; a message propagated into the original
/// after the split must come out the other end transformed exactly once,
/// not twice.
#[test]
fn split_does_not_double_apply_operator() {
    let node: Arc<Node<i32>> = Node::new(NodeConfig::new("doubler").operator(|x| Ok(Some(x * 2))));
    let clone = node.split();
    assert_eq!(node.mode(), dataflow_node::Mode::Split);

    let thunk = clone.consume(null_edge("consumer")).expect("split clone accepts a consumer");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    clone.read_node().subscribe(move |v| {
        if let ReceiveValue::Value(n) = v {
            seen_clone.lock().unwrap().push(n);
        }
    });

    assert!(matches!(node.propagate(5, true), Outcome::Delivered(_) | Outcome::Grounded));
    assert_eq!(*seen.lock().unwrap(), vec![10]);
    assert!(thunk());
}

/// `split` must hand its edges, watchers, and cancellations to the clone
/// rather than dropping them: a watcher registered before the split still
/// fires (through the clone) for state changes driven after it, and the
/// original edge the node had before splitting still receives messages.
#[test]
fn split_inherits_edges_watchers_and_cancellations() {
    let node: Arc<Node<i32>> = Node::new(NodeConfig::new("n"));
    let sink: Arc<Node<i32>> = Node::new(NodeConfig::new("sink"));
    sink.consume(null_edge("consumer")).expect("sink accepts a consumer");
    node.link(Some("to-sink".to_string()), Edge::new(Target::Node(sink.clone()), "e"), |_| {}, |_| {}).unwrap();

    let modes_seen = Arc::new(Mutex::new(Vec::new()));
    let modes_seen_cb = modes_seen.clone();
    node.on_state_changed(None, move |mode, _count, _err| {
        modes_seen_cb.lock().unwrap().push(mode);
    })
    .unwrap();

    let clone = node.split();
    assert_eq!(node.mode(), dataflow_node::Mode::Split);

    // The pre-split edge to `sink` moved to the clone, not away entirely.
    assert_eq!(clone.downstream_count(), 1);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    sink.read_node().subscribe(move |v| {
        if let ReceiveValue::Value(n) = v {
            seen_clone.lock().unwrap().push(n);
        }
    });
    assert!(matches!(node.propagate(7, true), Outcome::Delivered(_) | Outcome::Grounded));
    assert_eq!(*seen.lock().unwrap(), vec![7]);

    // The cancellation registered before the split moved to the clone too:
    // cancelling it unlinks the inherited edge, dropping downstream_count to
    // zero and closing the (non-permanent) clone out to `Drained` — which
    // fires the watcher that moved over with it.
    assert!(clone.cancel("to-sink").unwrap());
    assert_eq!(clone.mode(), dataflow_node::Mode::Drained);
    assert!(modes_seen.lock().unwrap().iter().any(|m| matches!(m, dataflow_node::Mode::Drained | dataflow_node::Mode::Closed)));
}
