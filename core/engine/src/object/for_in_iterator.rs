//! The `for..in` iterator.
//!
//! The iterator remembers the object currently being enumerated, the key
//! snapshot taken when it entered that object, the set of keys already
//! yielded, and ascends the prototype chain when a level is exhausted.
//! Every step re-reads the property descriptor, so concurrent mutation of
//! the target is tolerated: deleted keys are skipped, and keys seen on a
//! lower level shadow inherited ones.

use std::collections::VecDeque;

use kestrel_gc::{custom_trace, Finalize, Trace};
use rustc_hash::FxHashSet;

use crate::context::Context;
use crate::property::PropertyKey;
use crate::string::JsString;
use crate::value::JsValue;
use crate::JsResult;

/// State of a `for..in` enumeration.
#[derive(Debug, Clone)]
pub struct ForInIterator {
    object: JsValue,
    visited_keys: FxHashSet<JsString>,
    remaining_keys: VecDeque<JsString>,
    object_was_visited: bool,
}

impl ForInIterator {
    /// `CreateForInIterator ( object )`
    pub(crate) fn new(object: JsValue) -> Self {
        Self {
            object,
            visited_keys: FxHashSet::default(),
            remaining_keys: VecDeque::default(),
            object_was_visited: false,
        }
    }

    /// Advances the enumeration, returning the next key or `None` when
    /// exhausted.
    pub(crate) fn step(&mut self, context: &mut Context) -> JsResult<Option<JsString>> {
        if self.object.is_null_or_undefined() {
            return Ok(None);
        }
        let mut object = self.object.to_object(context)?;
        loop {
            if !self.object_was_visited {
                for key in object.__own_property_keys__(context)? {
                    match key {
                        PropertyKey::String(key) => self.remaining_keys.push_back(key),
                        PropertyKey::Index(index) => {
                            self.remaining_keys.push_back(JsString::from(index.to_string()));
                        }
                        PropertyKey::Symbol(_) => {}
                    }
                }
                self.object_was_visited = true;
            }
            while let Some(key) = self.remaining_keys.pop_front() {
                if self.visited_keys.contains(&key) {
                    continue;
                }
                // Re-fetch the descriptor: the property may be gone or no
                // longer enumerable by now.
                if let Some(desc) =
                    object.__get_own_property__(&PropertyKey::from(key.clone()), context)?
                {
                    self.visited_keys.insert(key.clone());
                    if desc.expect_enumerable() {
                        return Ok(Some(key));
                    }
                }
            }
            match object.__get_prototype_of__(context)? {
                Some(proto) => object = proto,
                None => return Ok(None),
            }
            self.object = JsValue::from(object.clone());
            self.object_was_visited = false;
        }
    }
}

impl Finalize for ForInIterator {}

// SAFETY: the enumerated object is the only edge.
unsafe impl Trace for ForInIterator {
    custom_trace!(this, mark, {
        mark(&this.object);
    });
}
