//! Handle types for values that live on the garbage collected heap.

use std::cell::RefCell;
use std::fmt::{self, Debug, Display};
use std::ptr::NonNull;

use crate::cell::{CellHeader, GcBox};
use crate::trace::{Finalize, Trace, Tracer};

/// A handle to a garbage collected cell.
///
/// Handles are cheap to clone and compare by cell identity with
/// [`Gc::ptr_eq`]. A handle does not root the cell: it stays valid only
/// while the cell is reachable from the roots passed to every collection,
/// which the engine guarantees by collecting exclusively at safe points.
pub struct Gc<T: Trace> {
    pub(crate) inner: NonNull<GcBox<T>>,
}

impl<T: Trace> Gc<T> {
    pub(crate) fn from_raw(inner: NonNull<GcBox<T>>) -> Self {
        Self { inner }
    }

    /// Returns `true` if the two handles point to the same cell.
    #[inline]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.inner == b.inner
    }

    /// An address-based identity for the cell, stable for its lifetime.
    ///
    /// Used by the interpreter's inline caches as a cheap shape witness.
    #[inline]
    pub fn addr(&self) -> usize {
        self.inner.as_ptr() as usize
    }

    pub(crate) fn header(&self) -> NonNull<CellHeader> {
        self.inner.cast::<CellHeader>()
    }
}

impl<T: Trace> Clone for Gc<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self { inner: self.inner }
    }
}

impl<T: Trace> std::ops::Deref for Gc<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: the reachability contract documented on the type: the
        // engine only collects at safe points with every live handle's cell
        // in the root set, so the cell behind a dereferenced handle is alive.
        unsafe { &self.inner.as_ref().value }
    }
}

impl<T: Trace> Finalize for Gc<T> {}

// SAFETY: a handle's single outgoing edge is the cell it points to.
unsafe impl<T: Trace> Trace for Gc<T> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark_cell(self.header());
    }
}

impl<T: Trace + Debug> Debug for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&**self, f)
    }
}

impl<T: Trace + Display> Display for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&**self, f)
    }
}

/// A mutable memory location on the garbage collected heap.
///
/// This is a [`RefCell`] that participates in tracing. The collector only
/// runs while no mutable borrow is outstanding, which collections at safe
/// points guarantee.
#[derive(Debug, Default)]
pub struct GcRefCell<T> {
    cell: RefCell<T>,
}

/// A shared borrow of a [`GcRefCell`].
pub type GcRef<'a, T> = std::cell::Ref<'a, T>;

/// An exclusive borrow of a [`GcRefCell`].
pub type GcRefMut<'a, T> = std::cell::RefMut<'a, T>;

impl<T> GcRefCell<T> {
    /// Creates a new cell containing `value`.
    pub fn new(value: T) -> Self {
        Self {
            cell: RefCell::new(value),
        }
    }

    /// Immutably borrows the wrapped value.
    ///
    /// # Panics
    ///
    /// Panics if the value is currently mutably borrowed.
    #[inline]
    #[track_caller]
    pub fn borrow(&self) -> GcRef<'_, T> {
        self.cell.borrow()
    }

    /// Mutably borrows the wrapped value.
    ///
    /// # Panics
    ///
    /// Panics if the value is currently borrowed.
    #[inline]
    #[track_caller]
    pub fn borrow_mut(&self) -> GcRefMut<'_, T> {
        self.cell.borrow_mut()
    }

    /// Immutably borrows the wrapped value, returning an error if the value
    /// is currently mutably borrowed.
    #[inline]
    pub fn try_borrow(&self) -> Result<GcRef<'_, T>, std::cell::BorrowError> {
        self.cell.try_borrow()
    }

    /// Mutably borrows the wrapped value, returning an error if the value is
    /// currently borrowed.
    #[inline]
    pub fn try_borrow_mut(&self) -> Result<GcRefMut<'_, T>, std::cell::BorrowMutError> {
        self.cell.try_borrow_mut()
    }
}

impl<T> Finalize for GcRefCell<T> {}

// SAFETY: collections run at safe points where no mutable borrow is live, so
// the shared borrow taken while tracing cannot fail.
unsafe impl<T: Trace> Trace for GcRefCell<T> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer) {
        self.cell.borrow().trace(tracer);
    }
}

impl<T: Clone> Clone for GcRefCell<T> {
    fn clone(&self) -> Self {
        Self::new(self.cell.borrow().clone())
    }
}
