// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The node lifecycle state machine.
//!
//! ```text
//!                 ┌──────────┐
//!        ┌───────►│  Split   │──────┐
//!        │        └──────────┘      │
//!   consume/unconsume                │
//!        │                          error
//!        ▼                          │
//!   ┌─────────┐   close(pending)  ┌───────┐   drains    ┌─────────┐
//!   │  Open   │──────────────────►│ Closed│────────────►│ Drained │
//!   └─────────┘   close(empty)    └───────┘              └─────────┘
//!        │  ▲              │                                  ▲
//!        │  │              └───────────── error ───────────┐  │
//!        ▼  │                                               ▼  │
//!   ┌──────────┐                                         ┌───────┐
//!   │ Consumed │───────────────────── error ─────────────►│ Error │
//!   └──────────┘                                           └───────┘
//! ```
//!
//! `Drained` and `Error` are terminal. `Open` ⇄ `Consumed` and `Open` ⇄
//! `Closed` (via a newly-linked edge draining a closed queue back into
//! `Drained`, or a fresh `link` reopening a permanent node) are the only
//! reversible edges; everything else moves monotonically toward a
//! terminal mode.

/// The lifecycle state of a [`crate::node::Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Accepting messages; may hold zero, one, or many downstream edges.
    Open,
    /// Queue and reads have been handed off to a clone (`state.split`).
    Split,
    /// A single designated consumer is attached; every message persists
    /// into the queue for it.
    Consumed,
    /// No longer accepting upstream messages; the queue may still hold
    /// buffered messages.
    Closed,
    /// Terminal. The queue is the drained sentinel (always empty, always
    /// closed).
    Drained,
    /// Terminal. The queue is the error sentinel carrying the node's
    /// error value.
    Error,
}

impl Mode {
    /// `Drained` and `Error` are sticky — no further mutating operation
    /// changes them.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Drained | Self::Error)
    }

    /// `Open` or `Split` are the only modes from which `propagate` walks
    /// the fused single-edge chain or fans out to multiple edges.
    #[must_use]
    pub fn is_propagating(self) -> bool {
        matches!(self, Self::Open | Self::Split)
    }
}

#[cfg(test)]
mod tests {
    use super::Mode;

    #[test]
    fn terminal_modes() {
        assert!(Mode::Drained.is_terminal());
        assert!(Mode::Error.is_terminal());
        assert!(!Mode::Open.is_terminal());
        assert!(!Mode::Closed.is_terminal());
    }

    #[test]
    fn propagating_modes() {
        assert!(Mode::Open.is_propagating());
        assert!(Mode::Split.is_propagating());
        assert!(!Mode::Consumed.is_propagating());
        assert!(!Mode::Closed.is_propagating());
    }
}
