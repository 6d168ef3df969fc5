//! Re-entrant serialization of access to shared HPI state
//!
//! The same thread may take the guard again while already holding it, so a
//! multi-step operation (adding a resource and all of its RDRs) can run under
//! one hold while calling helpers that lock on their own.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::sync::Arc;

/// Cloneable handle to state protected by a re-entrant mutex
pub struct Guard<T> {
    inner: Arc<ReentrantMutex<RefCell<T>>>,
}

impl<T> Clone for Guard<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Default> Default for Guard<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Guard<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(value))),
        }
    }

    /// Hold the guard until the returned value is dropped
    ///
    /// Nested holds and crate operations from the holding thread proceed;
    /// other threads block until the hold is released.
    pub fn hold(&self) -> ReentrantMutexGuard<'_, RefCell<T>> {
        self.inner.lock()
    }

    /// Run `f` with shared access
    ///
    /// `f` may nest further `read` calls but must not call `write` on the
    /// same guard; that would borrow the state mutably while it is shared.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let held = self.inner.lock();
        let value = held.borrow();
        f(&value)
    }

    /// Run `f` with exclusive access
    ///
    /// `f` must not call back into this guard. Crate code only ever passes
    /// closures over the plain state, so the borrow never overlaps.
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let held = self.inner.lock();
        let mut value = held.borrow_mut();
        f(&mut value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_reentrant_hold() {
        let guard = Guard::new(Vec::<u32>::new());
        let _outer = guard.hold();
        guard.write(|v| v.push(1));
        {
            let _inner = guard.hold();
            guard.write(|v| v.push(2));
        }
        assert_eq!(guard.read(|v| v.clone()), vec![1, 2]);
    }

    #[test]
    fn test_nested_reads_share_the_state() {
        let guard = Guard::new(5u32);
        let _held = guard.hold();
        let sum = guard.read(|outer| guard.read(|inner| outer + inner));
        assert_eq!(sum, 10);
    }

    #[test]
    fn test_hold_excludes_other_threads() {
        let guard = Guard::new(Vec::<u32>::new());
        let writers: Vec<_> = (0..8)
            .map(|n| {
                let guard = guard.clone();
                thread::spawn(move || {
                    let _batch = guard.hold();
                    for i in 0..50 {
                        guard.write(|v| v.push(n * 1000 + i));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        // Each batch of 50 appears contiguously
        let values = guard.read(|v| v.clone());
        assert_eq!(values.len(), 400);
        for chunk in values.chunks(50) {
            let batch = chunk[0] / 1000;
            assert!(chunk.iter().all(|v| v / 1000 == batch));
        }
    }
}
