//! The private environment chain, active inside class bodies.

use kestrel_gc::{custom_trace, Finalize, Gc, Trace};
use rustc_hash::FxHashMap;

use crate::context::Context;
use crate::object::PrivateName;
use crate::string::JsString;

/// A scope of private names, linked to the enclosing class's scope.
///
/// Each evaluation of a `class` expression installs fresh name cells, so
/// `#x` of one class never matches `#x` of another even though the
/// descriptions collide.
#[derive(Debug)]
pub struct PrivateEnvironment {
    names: FxHashMap<JsString, PrivateName>,
    outer: Option<Gc<PrivateEnvironment>>,
}

impl PrivateEnvironment {
    /// Creates a scope declaring `descriptions`, chained to `outer`.
    pub fn new(
        descriptions: &[JsString],
        outer: Option<Gc<PrivateEnvironment>>,
        context: &mut Context,
    ) -> Gc<Self> {
        let names = descriptions
            .iter()
            .map(|d| (d.clone(), PrivateName::new(d)))
            .collect();
        context.heap().alloc(Self { names, outer })
    }

    /// Resolves a `#name` reference, walking outward.
    pub fn resolve(this: &Gc<Self>, description: &JsString) -> Option<PrivateName> {
        let mut cursor = Some(this.clone());
        while let Some(env) = cursor {
            if let Some(name) = env.names.get(description) {
                return Some(name.clone());
            }
            cursor = env.outer.clone();
        }
        None
    }
}

impl Finalize for PrivateEnvironment {}

// SAFETY: the outer scope is the only cell edge; names are identity cells
// outside the GC heap.
unsafe impl Trace for PrivateEnvironment {
    custom_trace!(this, mark, {
        if let Some(outer) = &this.outer {
            mark(outer);
        }
    });
}
