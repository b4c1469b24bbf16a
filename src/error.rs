// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for the dataflow node.
//!
//! [`NodeError`] covers the handful of operations that can be rejected
//! outright (a duplicate cancellation name, cancelling mid-transaction).
//! It is distinct from the arbitrary user error a node carries once it
//! enters [`crate::mode::Mode::Error`] — see [`NodeErrorValue`].

use std::sync::Arc;
use thiserror::Error;

/// The error a node carries while in `Mode::Error`.
///
/// Any `std::error::Error` can be boxed into this; operators are free to
/// fail with whatever error type suits them.
pub type NodeErrorValue = Arc<dyn std::error::Error + Send + Sync>;

/// A minimal string-backed error, handy for tests and simple operators
/// that don't want to define their own error type.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PlainError(pub String);

impl PlainError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub fn boxed(msg: impl Into<String>) -> NodeErrorValue {
        Arc::new(Self::new(msg))
    }
}

/// Operations this crate can reject before touching node state.
#[derive(Debug, Error)]
pub enum NodeError {
    /// `link`/`receive`/`on_state_changed` called with a cancellation name
    /// already registered on this node.
    #[error("cancellation name '{0}' is already registered")]
    NameInUse(String),

    /// `receive` called with a name already bound to something other than
    /// a pending result (a watcher or edge cancellation, for instance).
    #[error("'{0}' is not bound to a receivable result")]
    InvalidReceiveState(String),

    /// `cancel` called while a `transactional()` hand-over-hand upgrade is
    /// in progress on this node.
    #[error("cancel() is forbidden while a transactional upgrade is in progress")]
    CancelDuringTransaction,
}

/// Convenience alias for fallible node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
