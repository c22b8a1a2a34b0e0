//! Garbage collector for the Kestrel ECMAScript engine.
//!
//! This is a stop-the-world, mark-sweep collector over a single linked list
//! of heap cells. There is no generational split, no compaction and no write
//! barrier; the engine owns exactly one [`Heap`] and calls
//! [`Heap::collect`] at safe points, passing the current root set.
//!
//! Ownership model: *the collector owns every cell; client code holds
//! handles*. A [`Gc<T>`] handle stays valid for as long as the cell it points
//! to is reachable from the roots supplied to every collection. Dereferencing
//! a handle to an unreachable cell after a collection is undefined behavior,
//! which is why the engine only ever collects while its stacks, registered
//! contexts and registries are handed in as roots.

#![allow(clippy::let_unit_value)]

mod cell;
mod heap;
mod pointers;
mod trace;

pub use cell::{CellHeader, CellOps, GcBox, MarkState};
pub use heap::{Heap, HeapStats};
pub use pointers::{Gc, GcRefCell, GcRef, GcRefMut};
pub use trace::{Finalize, Trace, Tracer};

#[cfg(test)]
mod tests;
