//! Heap cell layout: the header every garbage collected allocation carries,
//! and the kind descriptor the collector dispatches scan and free through.

use std::cell::Cell;
use std::ptr::NonNull;

use crate::trace::{Finalize, Trace, Tracer};

/// The mark state of a cell, advanced by the collector during a cycle.
///
/// `Marked` means reachable but not yet scanned; the distinction is what
/// makes mark-stack overflow recoverable, since the heap can re-walk the
/// cell list looking for `Marked` cells whose children were never pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MarkState {
    /// Not (yet) proven reachable this cycle.
    Unmarked = 0,
    /// Reachable, outgoing references not yet visited.
    Marked = 1,
    /// Reachable and fully scanned.
    Scanned = 2,
}

/// The kind descriptor of a cell: a static scan/free hook pair.
///
/// Every cell kind has exactly one of these, monomorphized by
/// [`CellOps::for_type`]. Both hooks are required even for leaf kinds; a leaf
/// scan simply visits nothing.
pub struct CellOps {
    /// Visits the cell's outgoing references.
    pub scan: unsafe fn(NonNull<CellHeader>, &mut Tracer),
    /// Runs the finalizer and releases the allocation.
    pub free: unsafe fn(NonNull<CellHeader>),
    /// Size of the full allocation, for heap statistics.
    pub size: usize,
}

impl CellOps {
    /// The descriptor for cells holding a `T`.
    pub fn for_type<T: Trace>() -> &'static Self {
        unsafe fn scan<T: Trace>(header: NonNull<CellHeader>, tracer: &mut Tracer) {
            // SAFETY: the header is the first field of a `repr(C)`
            // `GcBox<T>`, so the cast recovers the full cell.
            let cell = unsafe { header.cast::<GcBox<T>>().as_ref() };
            cell.value.trace(tracer);
        }

        unsafe fn free<T: Trace>(header: NonNull<CellHeader>) {
            // SAFETY: same layout argument as `scan`; the box was created by
            // `GcBox::allocate` and is dropped exactly once, here.
            let cell = unsafe { Box::from_raw(header.cast::<GcBox<T>>().as_ptr()) };
            cell.value.finalize();
            drop(cell);
        }

        struct OpsFor<T>(std::marker::PhantomData<T>);

        impl<T: Trace> OpsFor<T> {
            const OPS: CellOps = CellOps {
                scan: scan::<T>,
                free: free::<T>,
                size: std::mem::size_of::<GcBox<T>>(),
            };
        }

        &OpsFor::<T>::OPS
    }
}

impl std::fmt::Debug for CellOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellOps").field("size", &self.size).finish()
    }
}

/// The header shared by all heap cells: kind descriptor, mark state and the
/// link into the heap's cell list.
#[derive(Debug)]
pub struct CellHeader {
    pub(crate) ops: &'static CellOps,
    mark: Cell<MarkState>,
    pub(crate) next: Cell<Option<NonNull<CellHeader>>>,
}

impl CellHeader {
    pub(crate) fn new<T: Trace>() -> Self {
        Self {
            ops: CellOps::for_type::<T>(),
            mark: Cell::new(MarkState::Unmarked),
            next: Cell::new(None),
        }
    }

    /// The cell's current mark state.
    #[inline]
    pub fn mark_state(&self) -> MarkState {
        self.mark.get()
    }

    #[inline]
    pub(crate) fn set_mark_state(&self, state: MarkState) {
        self.mark.set(state);
    }
}

/// A garbage collected allocation: header followed by the value.
///
/// `repr(C)` so a pointer to the header is a pointer to the box, which is
/// what lets the type-erased cell list recover the typed value inside the
/// kind hooks.
#[repr(C)]
#[derive(Debug)]
pub struct GcBox<T: Trace> {
    pub(crate) header: CellHeader,
    pub(crate) value: T,
}

impl<T: Trace> GcBox<T> {
    /// Allocates a cell without publishing it to any heap.
    ///
    /// The cell only becomes visible to a collector once
    /// [`Heap::adopt`][crate::Heap] links it into the cell list, at which
    /// point its scan hook must already be safe to run; taking the fully
    /// constructed value here is what guarantees that.
    pub(crate) fn allocate(value: T) -> NonNull<Self> {
        let cell = Box::new(Self {
            header: CellHeader::new::<T>(),
            value,
        });
        // SAFETY: `Box::into_raw` never returns null.
        unsafe { NonNull::new_unchecked(Box::into_raw(cell)) }
    }
}
