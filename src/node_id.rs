// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Stable node identity, used only to give `transactional()`'s
//! hand-over-hand set acquisition a total order to lock against.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A monotonically-assigned, process-wide unique node identity.
///
/// Sorting a set of nodes by `NodeId` before acquiring their locks gives
/// `acquire_all` a consistent, deadlock-free order regardless of which
/// thread discovered the set or in what order edges happen to be walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::NodeId;

    #[test]
    fn ids_are_strictly_increasing() {
        let a = NodeId::next();
        let b = NodeId::next();
        assert!(a < b);
    }
}
