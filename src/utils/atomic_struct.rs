// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::sync::{atomic::Ordering, Arc};

use crossbeam::epoch::{self, Atomic, Owned};

struct Slot<T>(Atomic<Arc<T>>);

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        // Last handle is gone, so no reader can hold a guard on this slot.
        unsafe {
            let guard = epoch::unprotected();
            let current = self.0.load(Ordering::Relaxed, guard);
            if !current.is_null() {
                drop(current.into_owned());
            }
        }
    }
}

/// AtomicStruct is the atomically settable version of any struct T.
/// Useful for configuration snapshots, which are read on every operation but updated very rarely.
/// Readers never block: `get()` hands out a complete `Arc<T>`, either the old or the new value.
/// Replaced values are reclaimed once every reader pinned before the swap has moved on.
pub struct AtomicStruct<T>(Arc<Slot<T>>);

impl<T: Send + Sync + 'static> AtomicStruct<T> {
    pub fn new(init: T) -> Self {
        Self(Arc::new(Slot(Atomic::new(Arc::new(init)))))
    }

    pub fn get(&self) -> Arc<T> {
        let guard = epoch::pin();
        let current = self.0 .0.load(Ordering::Acquire, &guard);
        // Never null: set in new() and only ever swapped for another value.
        unsafe { current.deref() }.clone()
    }

    pub fn set(&self, val: T) {
        let guard = epoch::pin();
        let old = self.0 .0.swap(Owned::new(Arc::new(val)), Ordering::AcqRel, &guard);
        unsafe {
            guard.defer_destroy(old);
        }
    }
}

impl<T> Clone for AtomicStruct<T> {
    fn clone(&self) -> Self {
        AtomicStruct(self.0.clone())
    }
}

impl<T: std::fmt::Debug + Send + Sync + 'static> std::fmt::Debug for AtomicStruct<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicStruct").field(&self.get()).finish()
    }
}
