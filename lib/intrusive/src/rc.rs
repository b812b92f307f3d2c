//! A reference-counted smart pointer whose count lives inside the managed
//! object instead of in a separate allocation. Grounded on
//! `IntrusiveRefCounted`/`intrusive_ref_ptr`: used for process and file
//! objects, whose ownership graph is a DAG (a file is owned by the mount
//! table and referenced by open file descriptors, never the reverse), so no
//! weak-pointer variant is needed.

use core::ops::Deref;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Implemented by types with an embedded atomic reference count, usable as
/// the target of an [`ArcIntrusive`].
pub trait IntrusiveRefCounted {
    fn ref_count(&self) -> &AtomicUsize;
}

/// An intrusively reference-counted pointer to a `T`. Unlike `alloc::sync::Arc`,
/// this does not own or free the backing storage on the last drop; the
/// object's owner (a static table, a process's object slab) reclaims it,
/// using the count reaching zero only as the signal to do so.
pub struct ArcIntrusive<T: IntrusiveRefCounted + ?Sized> {
    ptr: NonNull<T>,
}

// Safety: all access to the managed object goes through atomic operations
// on the embedded count and through `&T`/`&mut T` borrows the caller is
// responsible for synchronizing, exactly as with `alloc::sync::Arc`.
unsafe impl<T: IntrusiveRefCounted + Sync + Send + ?Sized> Send for ArcIntrusive<T> {}
unsafe impl<T: IntrusiveRefCounted + Sync + Send + ?Sized> Sync for ArcIntrusive<T> {}

impl<T: IntrusiveRefCounted + ?Sized> ArcIntrusive<T> {
    /// Wraps `ptr`, taking one reference.
    ///
    /// # Safety
    /// `ptr` must point to a live `T` for as long as any `ArcIntrusive`
    /// built from it remains alive, and `T`'s embedded count must already
    /// reflect its other current owners.
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        ptr.as_ref().ref_count().fetch_add(1, Ordering::Relaxed);
        ArcIntrusive { ptr }
    }

    pub fn as_ptr(&self) -> NonNull<T> {
        self.ptr
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.ptr == b.ptr
    }

    /// Number of live `ArcIntrusive` referencing the same object.
    pub fn strong_count(this: &Self) -> usize {
        this.ref_count().load(Ordering::Acquire)
    }
}

impl<T: IntrusiveRefCounted + ?Sized> Clone for ArcIntrusive<T> {
    fn clone(&self) -> Self {
        self.ref_count().fetch_add(1, Ordering::Relaxed);
        ArcIntrusive { ptr: self.ptr }
    }
}

impl<T: IntrusiveRefCounted + ?Sized> Deref for ArcIntrusive<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: holding an `ArcIntrusive` guarantees the object is live.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: IntrusiveRefCounted + ?Sized> Drop for ArcIntrusive<T> {
    fn drop(&mut self) {
        // `AcqRel`: the release half publishes our writes to whichever
        // owner observes the count drop to zero; the acquire half picks up
        // every other dropped reference's writes when we're the last one.
        let prev = self.ref_count().fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev >= 1, "reference count underflow");
        // Reaching zero is reported to the object's owner by its own
        // bookkeeping (mount table entry removal, fd table slot reuse),
        // not by this pointer, which never allocated or owns storage.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counted {
        count: AtomicUsize,
        value: i32,
    }

    impl IntrusiveRefCounted for Counted {
        fn ref_count(&self) -> &AtomicUsize {
            &self.count
        }
    }

    #[test]
    fn clone_increments_and_drop_decrements() {
        let mut obj = Counted { count: AtomicUsize::new(0), value: 42 };
        let ptr = NonNull::from(&mut obj);
        unsafe {
            let a = ArcIntrusive::from_raw(ptr);
            assert_eq!(ArcIntrusive::strong_count(&a), 1);
            assert_eq!(a.value, 42);
            {
                let b = a.clone();
                assert_eq!(ArcIntrusive::strong_count(&a), 2);
                assert!(ArcIntrusive::ptr_eq(&a, &b));
            }
            assert_eq!(ArcIntrusive::strong_count(&a), 1);
        }
    }
}
