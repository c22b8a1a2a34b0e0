//! Realms: isolated sets of intrinsics with their own global object.

use std::rc::Rc;

use kestrel_gc::{custom_trace, Finalize, Gc, GcRefCell, Heap, Trace};
use rustc_hash::FxHashMap;

use crate::context::intrinsics::Intrinsics;
use crate::environments::{DeclarativeEnvironment, DeclarativeKind, Environment, ScopeShape};
use crate::object::{JsObject, ObjectData};
use crate::string::JsString;
use crate::symbol::JsSymbol;

/// A realm: intrinsics, a global object and a global environment.
///
/// Values do not automatically cross realms; every context starts with one
/// realm and hosts may create more.
#[derive(Clone)]
pub struct Realm {
    inner: Gc<RealmInner>,
}

struct RealmInner {
    intrinsics: Intrinsics,
    global_object: JsObject,
    global_environment: Gc<DeclarativeEnvironment>,
    /// Backs `Symbol.for`; keyed by the registration string.
    symbol_registry: GcRefCell<FxHashMap<JsString, JsSymbol>>,
}

impl Realm {
    /// Allocates a bare realm; builtin population happens separately once a
    /// context exists.
    pub(crate) fn allocate(heap: &mut Heap) -> Self {
        let intrinsics = Intrinsics::allocate(heap);
        let global_object = JsObject::alloc_raw(
            heap,
            Some(intrinsics.object_prototype()),
            ObjectData::ordinary(),
        );
        let global_environment = heap.alloc(DeclarativeEnvironment::raw(
            DeclarativeKind::Global(global_object.clone()),
            Rc::new(ScopeShape::default()),
            None,
        ));
        Self {
            inner: heap.alloc(RealmInner {
                intrinsics,
                global_object,
                global_environment,
                symbol_registry: GcRefCell::new(FxHashMap::default()),
            }),
        }
    }

    /// The intrinsics of the realm.
    pub fn intrinsics(&self) -> &Intrinsics {
        &self.inner.intrinsics
    }

    /// The global object.
    pub fn global_object(&self) -> JsObject {
        self.inner.global_object.clone()
    }

    /// The global environment.
    pub fn global_environment(&self) -> Environment {
        Environment::Declarative(self.inner.global_environment.clone())
    }

    /// `Symbol.for ( key )`: the realm-wide symbol registry.
    pub fn symbol_for(&self, key: &JsString) -> JsSymbol {
        let mut registry = self.inner.symbol_registry.borrow_mut();
        registry
            .entry(key.clone())
            .or_insert_with(|| JsSymbol::new(Some(key.clone())))
            .clone()
    }

    /// Returns `true` if both handles are the same realm.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Gc::ptr_eq(&a.inner, &b.inner)
    }
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm").finish_non_exhaustive()
    }
}

impl Finalize for RealmInner {}

// SAFETY: intrinsics, the global object and the global environment are all
// cell edges.
unsafe impl Trace for RealmInner {
    custom_trace!(this, mark, {
        mark(&this.intrinsics);
        mark(&this.global_object);
        mark(&this.global_environment);
    });
}

impl Finalize for Realm {}

// SAFETY: single edge to the realm cell.
unsafe impl Trace for Realm {
    custom_trace!(this, mark, {
        mark(&this.inner);
    });
}
