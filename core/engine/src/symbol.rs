//! ECMAScript `Symbol` values.
//!
//! Symbols compare by cell identity; the description is purely diagnostic.
//! The well-known symbols the engine itself dispatches through
//! (`@@iterator`, `@@asyncIterator`, …) are process-wide singletons.

use std::cell::Cell;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use kestrel_gc::{empty_trace, Finalize, Trace};

use crate::string::JsString;

#[derive(Debug)]
struct Inner {
    /// Unique identity, also used as the hash.
    id: u64,
    description: Option<JsString>,
}

/// An ECMAScript `Symbol` value.
#[derive(Debug, Clone)]
pub struct JsSymbol {
    inner: Rc<Inner>,
}

thread_local! {
    static SYMBOL_ID: Cell<u64> = const { Cell::new(RESERVED_IDS) };

    static WELL_KNOWN: WellKnownSymbols = WellKnownSymbols::new();
}

/// Identifiers below this value are reserved for well-known symbols.
const RESERVED_IDS: u64 = 16;

impl JsSymbol {
    /// Creates a fresh symbol, distinct from every other symbol.
    pub fn new(description: Option<JsString>) -> Self {
        let id = SYMBOL_ID.with(|c| {
            let id = c.get();
            c.set(id + 1);
            id
        });
        Self {
            inner: Rc::new(Inner { id, description }),
        }
    }

    const fn well_known(id: u64, description: &'static str) -> (u64, &'static str) {
        (id, description)
    }

    /// The symbol's description, if any.
    pub fn description(&self) -> Option<JsString> {
        self.inner.description.clone()
    }

    /// The unique identity of the symbol.
    #[inline]
    pub fn hash(&self) -> u64 {
        self.inner.id
    }

    /// `@@iterator`
    pub fn iterator() -> Self {
        WELL_KNOWN.with(|w| w.iterator.clone())
    }

    /// `@@async_iterator`
    pub fn async_iterator() -> Self {
        WELL_KNOWN.with(|w| w.async_iterator.clone())
    }

    /// `@@to_primitive`
    pub fn to_primitive() -> Self {
        WELL_KNOWN.with(|w| w.to_primitive.clone())
    }

    /// `@@to_string_tag`
    pub fn to_string_tag() -> Self {
        WELL_KNOWN.with(|w| w.to_string_tag.clone())
    }

    /// `@@has_instance`
    pub fn has_instance() -> Self {
        WELL_KNOWN.with(|w| w.has_instance.clone())
    }
}

struct WellKnownSymbols {
    iterator: JsSymbol,
    async_iterator: JsSymbol,
    to_primitive: JsSymbol,
    to_string_tag: JsSymbol,
    has_instance: JsSymbol,
}

impl WellKnownSymbols {
    fn new() -> Self {
        let make = |(id, desc): (u64, &'static str)| JsSymbol {
            inner: Rc::new(Inner {
                id,
                description: Some(JsString::from(desc)),
            }),
        };
        Self {
            iterator: make(JsSymbol::well_known(0, "Symbol.iterator")),
            async_iterator: make(JsSymbol::well_known(1, "Symbol.asyncIterator")),
            to_primitive: make(JsSymbol::well_known(2, "Symbol.toPrimitive")),
            to_string_tag: make(JsSymbol::well_known(3, "Symbol.toStringTag")),
            has_instance: make(JsSymbol::well_known(4, "Symbol.hasInstance")),
        }
    }
}

impl PartialEq for JsSymbol {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for JsSymbol {}

impl Hash for JsSymbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.inner.id);
    }
}

impl Display for JsSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.description {
            Some(desc) => write!(f, "Symbol({desc})"),
            None => write!(f, "Symbol()"),
        }
    }
}

impl Finalize for JsSymbol {}

// SAFETY: symbols are reference counted outside the GC heap and hold no
// cell handles.
unsafe impl Trace for JsSymbol {
    empty_trace!();
}

#[cfg(test)]
mod tests {
    use super::JsSymbol;
    use crate::string::JsString;

    #[test]
    fn symbols_are_identity() {
        let a = JsSymbol::new(Some(JsString::from("x")));
        let b = JsSymbol::new(Some(JsString::from("x")));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn well_known_symbols_are_singletons() {
        assert_eq!(JsSymbol::iterator(), JsSymbol::iterator());
        assert_ne!(JsSymbol::iterator(), JsSymbol::async_iterator());
    }
}
