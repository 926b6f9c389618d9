//! Mutual exclusion around the single device link.
//!
//! The link is half-duplex: a status poll and a speed command must never
//! interleave their request/response windows. [`TransportGuard`] owns the
//! link outright and only lends it out for the duration of a closure, so
//! there is no way to reach the raw link without holding the lock.

use std::sync::Arc;

use parking_lot::Mutex;

use super::DeviceLink;

/// Shared, serialized access to one [`DeviceLink`].
///
/// Clones share the same link. No ordering between waiting callers is
/// promised, only that at most one closure runs at a time.
pub struct TransportGuard<L> {
    inner: Arc<Mutex<L>>,
}

impl<L> TransportGuard<L>
where
    L: DeviceLink,
{
    /// Takes ownership of `link`.
    pub fn new(link: L) -> Self {
        Self {
            inner: Arc::new(Mutex::new(link)),
        }
    }

    /// Runs `f` with exclusive access to the link.
    ///
    /// The lock is released on every exit path, including unwinding. Link
    /// errors returned by `f` are passed through untouched.
    pub fn with_guard<R>(&self, f: impl FnOnce(&mut L) -> R) -> R {
        let mut link = self.inner.lock();
        f(&mut link)
    }

    /// Returns `true` when another caller currently holds the link.
    pub fn is_busy(&self) -> bool {
        self.inner.is_locked()
    }

    /// Returns `true` when both guards wrap the same link.
    pub fn same_link(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<L> Clone for TransportGuard<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
