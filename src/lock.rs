// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The per-node asymmetric lock: shared for reads, exclusive for the
//! state-transition and linking operations that mutate it.
//!
//! Backed by `parking_lot::RwLock` rather than `std::sync::RwLock` for
//! the same reason the rest of this crate avoids poisoning-on-panic
//! semantics in its hot path: a panicking watcher callback (already
//! guarded against, see [`crate::node::Node::on_state_changed`]) must not
//! wedge every future lock acquisition on this node.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// RAII guard for the shared (read) mode of an [`AsymmetricLock`].
pub type SharedGuard<'a> = RwLockReadGuard<'a, ()>;

/// RAII guard for the exclusive (write) mode of an [`AsymmetricLock`].
pub type ExclusiveGuard<'a> = RwLockWriteGuard<'a, ()>;

/// A lock with no payload of its own — it only ever guards the node's
/// own state, edges, watchers, and cancellations, which live alongside
/// it rather than inside it (letting `NodeState` reads bypass the lock
/// entirely via `ArcSwap`, see [`crate::state_snapshot`]).
#[derive(Debug, Default)]
pub struct AsymmetricLock {
    inner: RwLock<()>,
}

impl AsymmetricLock {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: RwLock::new(()) }
    }

    pub fn acquire_shared(&self) -> SharedGuard<'_> {
        self.inner.read()
    }

    pub fn acquire_exclusive(&self) -> ExclusiveGuard<'_> {
        self.inner.write()
    }

    pub fn try_acquire_shared(&self) -> Option<SharedGuard<'_>> {
        self.inner.try_read()
    }

    pub fn try_acquire_exclusive(&self) -> Option<ExclusiveGuard<'_>> {
        self.inner.try_write()
    }
}

/// Acquires every lock in `locks` in the order given. Callers are
/// responsible for pre-sorting `locks` by a stable total order (this
/// crate sorts by [`crate::node_id::NodeId`]) so that two threads racing
/// to acquire overlapping sets never deadlock.
///
/// `release_all` has no function of its own: dropping the returned `Vec`
/// releases every guard it holds, in reverse acquisition order.
pub fn acquire_all_exclusive<'a, I>(locks: I) -> Vec<ExclusiveGuard<'a>>
where
    I: IntoIterator<Item = &'a AsymmetricLock>,
{
    locks.into_iter().map(AsymmetricLock::acquire_exclusive).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_locks_do_not_block_each_other() {
        let lock = AsymmetricLock::new();
        let _a = lock.acquire_shared();
        let b = lock.try_acquire_shared();
        assert!(b.is_some());
    }

    #[test]
    fn exclusive_lock_blocks_everything() {
        let lock = AsymmetricLock::new();
        let _guard = lock.acquire_exclusive();
        assert!(lock.try_acquire_shared().is_none());
        assert!(lock.try_acquire_exclusive().is_none());
    }

    #[test]
    fn acquire_all_locks_every_entry() {
        let locks = [AsymmetricLock::new(), AsymmetricLock::new(), AsymmetricLock::new()];
        let guards = acquire_all_exclusive(locks.iter());
        assert_eq!(guards.len(), 3);
        for l in &locks {
            assert!(l.try_acquire_shared().is_none());
        }
        drop(guards);
        for l in &locks {
            assert!(l.try_acquire_shared().is_some());
        }
    }
}
