use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_read<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                lock_kind = "rwlock.read",
                result = "poisoned_recovered",
                hint = "preview state may be mid-update after a panic in another task",
                "Recovered from poisoned preview state lock"
            );
            poisoned.into_inner()
        }
    }
}

pub(crate) fn rw_write<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                lock_kind = "rwlock.write",
                result = "poisoned_recovered",
                hint = "preview state may be mid-update after a panic in another task",
                "Recovered from poisoned preview state lock"
            );
            poisoned.into_inner()
        }
    }
}
