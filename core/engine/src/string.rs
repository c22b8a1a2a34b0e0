//! The string type used by the engine.
//!
//! [`JsString`] is an immutable, cheaply clonable string with a cached hash
//! and a memoized *index form*: the canonical array-index interpretation of
//! the string, computed once and reused by every property access that keys
//! an `Array` or integer-indexed object.

use std::borrow::Borrow;
use std::cell::Cell;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;

use kestrel_gc::{empty_trace, Finalize, Trace};

/// The memoized canonical-index state of a string.
///
/// `Unknown` means the parse has not run yet; canonicalization is idempotent,
/// so once the state leaves `Unknown` it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexForm {
    Unknown,
    NotAnIndex,
    Index(u32),
}

#[derive(Debug)]
struct Inner {
    string: Box<str>,
    hash: Cell<Option<u64>>,
    index: Cell<IndexForm>,
}

/// An immutable ECMAScript string.
#[derive(Debug, Clone)]
pub struct JsString {
    inner: Rc<Inner>,
}

impl JsString {
    /// Creates a new empty string.
    pub fn empty() -> Self {
        Self::from("")
    }

    /// The underlying string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.inner.string
    }

    /// The length of the string in code units.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.string.encode_utf16().count()
    }

    /// Returns `true` if the string is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.string.is_empty()
    }

    /// The canonical array-index form of the string, if it has one.
    ///
    /// A string is an array index when it parses as a base-10 integer in
    /// `0..u32::MAX` with no leading zeros and no sign. The result is
    /// memoized on the cell; `canonicalize(canonicalize(s)) == canonicalize(s)`
    /// holds trivially.
    pub fn as_index(&self) -> Option<u32> {
        match self.inner.index.get() {
            IndexForm::Index(index) => Some(index),
            IndexForm::NotAnIndex => None,
            IndexForm::Unknown => {
                let parsed = Self::parse_index(&self.inner.string);
                self.inner.index.set(match parsed {
                    Some(index) => IndexForm::Index(index),
                    None => IndexForm::NotAnIndex,
                });
                parsed
            }
        }
    }

    fn parse_index(s: &str) -> Option<u32> {
        if s.is_empty() || s.len() > 10 {
            return None;
        }
        if s.len() > 1 && s.starts_with('0') {
            return None;
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // `u32::MAX` itself is not a valid array index.
        s.parse::<u32>().ok().filter(|&i| i < u32::MAX)
    }

    /// The cached hash of the string contents.
    fn cached_hash(&self) -> u64 {
        match self.inner.hash.get() {
            Some(hash) => hash,
            None => {
                let mut hasher = rustc_hash::FxHasher::default();
                self.inner.string.hash(&mut hasher);
                let hash = hasher.finish();
                self.inner.hash.set(Some(hash));
                hash
            }
        }
    }

    /// Concatenates two strings.
    pub fn concat(&self, other: &JsString) -> JsString {
        let mut s = String::with_capacity(self.inner.string.len() + other.inner.string.len());
        s.push_str(&self.inner.string);
        s.push_str(&other.inner.string);
        JsString::from(s)
    }

    /// Returns `true` if both handles point at the same allocation.
    #[inline]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        Self {
            inner: Rc::new(Inner {
                string: s.into(),
                hash: Cell::new(None),
                index: Cell::new(IndexForm::Unknown),
            }),
        }
    }
}

impl From<String> for JsString {
    fn from(s: String) -> Self {
        Self {
            inner: Rc::new(Inner {
                string: s.into_boxed_str(),
                hash: Cell::new(None),
                index: Cell::new(IndexForm::Unknown),
            }),
        }
    }
}

impl From<Box<str>> for JsString {
    fn from(s: Box<str>) -> Self {
        Self {
            inner: Rc::new(Inner {
                string: s,
                hash: Cell::new(None),
                index: Cell::new(IndexForm::Unknown),
            }),
        }
    }
}

impl Deref for JsString {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for JsString {
    #[inline]
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for JsString {
    #[inline]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq for JsString {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner) || self.inner.string == other.inner.string
    }
}

impl Eq for JsString {}

impl PartialEq<str> for JsString {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for JsString {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialOrd for JsString {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JsString {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Hash for JsString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.cached_hash());
    }
}

impl Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self.as_str(), f)
    }
}

impl Finalize for JsString {}

// SAFETY: strings are reference counted outside the GC heap and hold no
// cell handles.
unsafe impl Trace for JsString {
    empty_trace!();
}

#[cfg(test)]
mod tests {
    use super::JsString;

    #[test]
    fn index_form() {
        assert_eq!(JsString::from("0").as_index(), Some(0));
        assert_eq!(JsString::from("42").as_index(), Some(42));
        assert_eq!(JsString::from("4294967294").as_index(), Some(4_294_967_294));
        // u32::MAX is 2^32 - 1, which is the array length bound, not an index.
        assert_eq!(JsString::from("4294967295").as_index(), None);
        assert_eq!(JsString::from("01").as_index(), None);
        assert_eq!(JsString::from("-1").as_index(), None);
        assert_eq!(JsString::from("1.5").as_index(), None);
        assert_eq!(JsString::from("").as_index(), None);
        assert_eq!(JsString::from("x").as_index(), None);
    }

    #[test]
    fn index_form_is_memoized_and_idempotent() {
        let s = JsString::from("7");
        assert_eq!(s.as_index(), Some(7));
        assert_eq!(s.as_index(), Some(7));
    }

    #[test]
    fn equality_and_hash() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let a = JsString::from("hello");
        let b = JsString::from("hello");
        assert_eq!(a, b);
        assert!(!JsString::ptr_eq(&a, &b));

        let hash = |s: &JsString| {
            let mut h = DefaultHasher::new();
            s.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&a), hash(&b));
    }
}
