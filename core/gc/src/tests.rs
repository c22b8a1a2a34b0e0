use crate::{custom_trace, empty_trace, Finalize, Gc, GcRefCell, Heap, Trace};
use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug)]
struct Leaf(#[allow(dead_code)] i32);

impl Finalize for Leaf {}

// SAFETY: no outgoing edges.
unsafe impl Trace for Leaf {
    empty_trace!();
}

#[derive(Debug)]
struct Node {
    next: GcRefCell<Option<Gc<Node>>>,
}

impl Finalize for Node {}

// SAFETY: the single edge is traced.
unsafe impl Trace for Node {
    custom_trace!(this, mark, {
        mark(&this.next);
    });
}

struct CountsDrop(Rc<Cell<usize>>);

impl Finalize for CountsDrop {
    fn finalize(&self) {
        self.0.set(self.0.get() + 1);
    }
}

// SAFETY: no outgoing edges.
unsafe impl Trace for CountsDrop {
    empty_trace!();
}

#[test]
fn rooted_cells_survive() {
    let mut heap = Heap::new();
    let root = heap.alloc(Leaf(7));
    assert_eq!(heap.stats().cells, 1);

    heap.collect(&root);
    assert_eq!(heap.stats().cells, 1);
    assert_eq!(root.0, 7);
}

#[test]
fn unreachable_cells_are_freed() {
    let mut heap = Heap::new();
    let _garbage = heap.alloc(Leaf(1));
    let root = heap.alloc(Leaf(2));
    assert_eq!(heap.stats().cells, 2);

    heap.collect(&root);
    assert_eq!(heap.stats().cells, 1);
}

#[test]
fn cycles_are_reclaimed() {
    let mut heap = Heap::new();
    let a = heap.alloc(Node {
        next: GcRefCell::new(None),
    });
    let b = heap.alloc(Node {
        next: GcRefCell::new(Some(a.clone())),
    });
    *a.next.borrow_mut() = Some(b.clone());
    assert_eq!(heap.stats().cells, 2);

    // Still rooted through `a`; the cycle keeps both alive.
    heap.collect(&a);
    assert_eq!(heap.stats().cells, 2);

    // Dropping the only root makes the whole cycle unreachable.
    drop(a);
    drop(b);
    heap.collect(&());
    assert_eq!(heap.stats().cells, 0);
}

#[test]
fn finalizer_runs_on_sweep() {
    let count = Rc::new(Cell::new(0));
    let mut heap = Heap::new();
    let _dead = heap.alloc(CountsDrop(count.clone()));
    heap.collect(&());
    assert_eq!(count.get(), 1);
}

#[derive(Debug)]
struct Wide {
    children: Vec<Gc<Leaf>>,
}

impl Finalize for Wide {}

// SAFETY: all children are traced.
unsafe impl Trace for Wide {
    custom_trace!(this, mark, {
        mark(&this.children);
    });
}

#[test]
fn mark_stack_overflow_recovers() {
    // A single cell with more children than the mark stack can hold forces
    // the overflow flag; the rescan handshake must still scan every child.
    let mut heap = Heap::new();
    let children: Vec<_> = (0..20_000).map(|i| heap.alloc(Leaf(i))).collect();
    let root = heap.alloc(Wide { children });
    assert_eq!(heap.stats().cells, 20_001);

    heap.collect(&root);
    assert_eq!(heap.stats().cells, 20_001);

    drop(root);
    heap.collect(&());
    assert_eq!(heap.stats().cells, 0);
}

#[test]
fn stats_track_bytes_and_collections() {
    let mut heap = Heap::new();
    let before = heap.stats();
    assert_eq!(before.bytes, 0);

    let root = heap.alloc(Leaf(0));
    assert!(heap.stats().bytes > 0);

    heap.collect(&root);
    assert_eq!(heap.stats().collections, 1);

    drop(root);
    heap.collect(&());
    assert_eq!(heap.stats().bytes, 0);
}
