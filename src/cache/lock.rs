//! Poison-tolerant lock acquisition for the in-process stores.
//!
//! The guarded data is a cache or an in-memory collection, so when a
//! panicking thread poisons a lock the right move is to take the
//! inner value and keep serving, not to spread the panic.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    module: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!(module, op, mode = "read", "Continuing past a poisoned lock");
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    module: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(module, op, mode = "write", "Continuing past a poisoned lock");
        poisoned.into_inner()
    })
}
