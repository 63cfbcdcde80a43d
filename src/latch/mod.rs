//! Thin exclusive/shared latch wrapper over `parking_lot`'s raw lock API.
//!
//! A [`Latch`] is not a transactional lock: it only serializes short-lived
//! in-memory access to a single frame or structure, never spans I/O or
//! blocks across a caller's logical operation boundary.

use parking_lot::lock_api::RawRwLock;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct Latch {
    lock: RwLock<()>,
}

impl Latch {
    pub fn new() -> Self {
        Self {
            lock: RwLock::new(()),
        }
    }

    pub fn rlock(&self) {
        unsafe { self.lock.raw() }.lock_shared();
    }

    pub fn runlock(&self) {
        unsafe { self.lock.raw().unlock_shared() };
    }

    pub fn wlock(&self) {
        unsafe { self.lock.raw() }.lock_exclusive();
    }

    pub fn wunlock(&self) {
        unsafe { self.lock.raw().unlock_exclusive() };
    }

    pub fn rguard(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    pub fn wguard(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }

    #[cfg(test)]
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}
