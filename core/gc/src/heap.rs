//! The heap: allocation, the global cell list, and the collector itself.

use std::ptr::NonNull;

use log::{debug, trace};

use crate::cell::{CellHeader, GcBox, MarkState};
use crate::pointers::Gc;
use crate::trace::{Trace, Tracer};

/// Upper bound of the mark stack.
///
/// Overflow is not an error: the collector falls back to rescanning the cell
/// list for cells that are marked but unscanned, repeating until none remain.
const MARK_STACK_CAPACITY: usize = 4096;

/// Initial collection threshold in bytes.
const INITIAL_THRESHOLD: usize = 1024 * 1024;

/// After a cycle, the next threshold is the live size times this factor.
const THRESHOLD_GROWTH: usize = 2;

/// Allocation and collection statistics, queryable by hosts and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of live cells.
    pub cells: usize,
    /// Bytes held by live cells (headers included).
    pub bytes: usize,
    /// Number of completed collection cycles.
    pub collections: usize,
}

/// The garbage collected heap.
///
/// Owns every cell the engine can observe, linked into a single intrusive
/// list. Collection is explicit: the engine calls [`Heap::collect`] with the
/// current root set, either because [`Heap::should_collect`] reports memory
/// pressure or because the host requested it.
#[derive(Debug)]
pub struct Heap {
    head: Option<NonNull<CellHeader>>,
    stats: HeapStats,
    threshold: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self {
            head: None,
            stats: HeapStats::default(),
            threshold: INITIAL_THRESHOLD,
        }
    }

    /// Allocates `value` on the heap and returns a handle to it.
    ///
    /// The cell is published to the cell list immediately; since `value` is
    /// fully constructed before the call, its scan hook is already safe to
    /// run.
    pub fn alloc<T: Trace>(&mut self, value: T) -> Gc<T> {
        let cell = GcBox::allocate(value);
        // SAFETY: freshly allocated, not yet shared.
        let header = cell.cast::<CellHeader>();
        unsafe {
            header.as_ref().next.set(self.head);
        }
        self.head = Some(header);
        self.stats.cells += 1;
        self.stats.bytes += std::mem::size_of::<GcBox<T>>();
        Gc::from_raw(cell)
    }

    /// Current allocation statistics.
    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Whether enough has been allocated since the last cycle that the
    /// engine should collect at the next safe point.
    pub fn should_collect(&self) -> bool {
        self.stats.bytes >= self.threshold
    }

    /// Runs a full mark-sweep cycle with `roots` as the root set.
    ///
    /// Everything transitively reachable from `roots` survives; everything
    /// else is finalized and freed. The engine must pass every live handle's
    /// owner here: runtime stacks, registered contexts, suspended frames,
    /// the realm table, the module registry and the symbol registry.
    pub fn collect(&mut self, roots: &dyn Trace) {
        let before = self.stats;

        self.mark(roots);
        self.sweep();

        self.threshold = (self.stats.bytes * THRESHOLD_GROWTH).max(INITIAL_THRESHOLD);
        self.stats.collections += 1;
        debug!(
            "gc cycle {}: {} -> {} cells, {} -> {} bytes",
            self.stats.collections, before.cells, self.stats.cells, before.bytes, self.stats.bytes
        );
    }

    fn mark(&mut self, roots: &dyn Trace) {
        let mut tracer = Tracer::new(MARK_STACK_CAPACITY);
        roots.trace(&mut tracer);

        loop {
            self.drain(&mut tracer);
            if !tracer.overflowed {
                break;
            }
            // The mark stack overflowed: some cells are marked but their
            // children were never pushed. Re-walk the cell list scanning
            // those directly, until a pass completes without overflow.
            tracer.overflowed = false;
            trace!("gc mark stack overflow, rescanning cell list");
            let mut cursor = self.head;
            while let Some(header) = cursor {
                // SAFETY: every pointer in the cell list refers to a live
                // cell until the next sweep.
                let cell = unsafe { header.as_ref() };
                if cell.mark_state() == MarkState::Marked {
                    cell.set_mark_state(MarkState::Scanned);
                    // SAFETY: scan hook invoked on the cell kind it was
                    // created for.
                    unsafe { (cell.ops.scan)(header, &mut tracer) };
                }
                cursor = cell.next.get();
            }
        }
    }

    fn drain(&mut self, tracer: &mut Tracer) {
        while let Some(header) = tracer.stack.pop() {
            // SAFETY: marked cells are live until the next sweep.
            let cell = unsafe { header.as_ref() };
            if cell.mark_state() == MarkState::Marked {
                cell.set_mark_state(MarkState::Scanned);
                // SAFETY: scan hook invoked on the cell kind it was created
                // for.
                unsafe { (cell.ops.scan)(header, tracer) };
            }
        }
    }

    fn sweep(&mut self) {
        let mut cursor = self.head;
        let mut prev: Option<NonNull<CellHeader>> = None;

        while let Some(header) = cursor {
            // SAFETY: cells are owned by this list and freed only below.
            let cell = unsafe { header.as_ref() };
            let next = cell.next.get();
            if cell.mark_state() == MarkState::Unmarked {
                match prev {
                    // SAFETY: `prev` is a live survivor.
                    Some(p) => unsafe { p.as_ref().next.set(next) },
                    None => self.head = next,
                }
                self.stats.cells -= 1;
                self.stats.bytes -= cell.ops.size;
                // SAFETY: the cell is unreachable and unlinked; the free
                // hook consumes the allocation exactly once.
                unsafe { (cell.ops.free)(header) };
            } else {
                cell.set_mark_state(MarkState::Unmarked);
                prev = Some(header);
            }
            cursor = next;
        }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        // Free every remaining cell; an empty root set reclaims the world.
        self.mark(&());
        self.sweep();
    }
}
