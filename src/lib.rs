// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! `dataflow-node` — a thread-safe, mode-aware vertex for concurrent
//! dataflow graphs.
//!
//! A [`Node`] accepts messages via [`Node::propagate`], forwards them to
//! zero or more downstream edges, and moves through a small state
//! machine (`Open` → `Split` / `Consumed` → `Closed` → `Drained`, with
//! `Error` reachable from any non-terminal state) as it's linked,
//! consumed, closed, or fails. Everything about a node — its edges, its
//! watchers, its buffered messages — is kept consistent under its own
//! per-node lock; there is no global lock and no async runtime in the
//! hot path.
//!
//! ## Core Modules
//!
//! - [`node`]: the [`Node`] type itself — propagation, linking,
//!   consuming, splitting, closing, receiving, transactions
//! - [`edge`]: [`Edge`], [`Target`], the [`Propagator`] trait, and
//!   [`Outcome`]
//! - [`mode`]: the [`Mode`] state machine
//! - [`connectors`]: [`connect`]/[`siphon`]/[`join`], cascading closure
//!   and error across an edge
//! - [`config`]: [`NodeConfig`], a node's construction-time parameters
//! - [`receive_result`]: [`ReceiveResult`], the single-resolution promise
//!   `receive`/`read_node` return
//! - [`error`]: [`NodeError`] and [`NodeErrorValue`]
//! - [`helpers`]: predicate helpers over `Mode`/`Outcome`/`ReceiveValue`
//! - [`lock`]: the per-node [`AsymmetricLock`]
//! - [`node_id`]: [`NodeId`], the total order used for multi-node locking
//!
//! ## Quick Start
//!
//! ```
//! use dataflow_node::{Edge, Node, NodeConfig, Outcome, Target};
//!
//! let upstream = Node::<i32>::new(NodeConfig::new("upstream"));
//! let downstream = Node::<i32>::new(NodeConfig::new("downstream"));
//!
//! let thunk = downstream
//!     .consume(Edge::new(Target::Other(std::sync::Arc::new(Sink)), "sink"))
//!     .expect("open, edge-free node accepts a consumer");
//!
//! upstream
//!     .link(None, Edge::new(Target::Node(downstream.clone()), "to-downstream"), |_| {}, |_| {})
//!     .expect("open node accepts a link");
//!
//! match upstream.propagate(7, true) {
//!     Outcome::Delivered(_) | Outcome::Grounded => {},
//!     _ => panic!("unexpected outcome"),
//! }
//! thunk();
//!
//! # struct Sink;
//! # impl dataflow_node::Propagator<i32> for Sink {
//! #     fn propagate(&self, _msg: i32, _transform: bool) -> Outcome<i32> { Outcome::Grounded }
//! #     fn downstream_count(&self) -> usize { 0 }
//! #     fn description(&self) -> &str { "sink" }
//! # }
//! ```

// Module declarations
pub mod config;
pub mod connectors;
pub mod edge;
pub mod error;
pub mod helpers;
pub mod lock;
pub mod mode;
pub mod node;
pub mod node_id;
pub mod queue;
pub mod receive_result;
pub mod state_snapshot;
pub mod threads;

// Convenience re-exports for commonly used types

// Core node abstraction
pub use node::Node;

// Edges, targets, propagation outcomes
pub use edge::{Edge, EdgeId, Outcome, Propagator, Target};

// Construction-time configuration
pub use config::{NodeConfig, Operator};

// State machine
pub use mode::Mode;

// Error handling
pub use error::{NodeError, NodeErrorValue, PlainError, Result};

// The async result channel `receive`/`read_node` return
pub use receive_result::{ReceiveResult, ReceiveValue};

// Connector helpers
pub use connectors::{connect, join, siphon};

// Node identity, used for deadlock-free multi-node locking
pub use node_id::NodeId;

// Predicate helpers
pub use helpers::{
    error_value, is_closed, is_closed_outcome, is_consumed, is_drained, is_drained_value, is_error, is_error_outcome,
    is_errored_value, is_filtered_outcome, is_split,
};
