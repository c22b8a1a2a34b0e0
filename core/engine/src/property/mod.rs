//! Property keys, attributes and descriptors.

use bitflags::bitflags;
use kestrel_gc::{custom_trace, Finalize, Trace};

use crate::string::JsString;
use crate::symbol::JsSymbol;
use crate::value::JsValue;

/// The key of an object property.
///
/// Strings are canonicalized on conversion: a string with a valid index form
/// becomes an `Index` key, which is what keeps `Array` and integer-indexed
/// dispatch on the fast path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// An array-index key.
    Index(u32),
    /// A string key with no index form.
    String(JsString),
    /// A symbol key.
    Symbol(JsSymbol),
}

impl PropertyKey {
    /// The key as an array index, if it is one.
    pub fn as_index(&self) -> Option<u32> {
        match self {
            Self::Index(index) => Some(*index),
            _ => None,
        }
    }

    /// Converts the key back into a value.
    pub fn to_value(&self) -> JsValue {
        match self {
            Self::Index(index) => JsValue::from(JsString::from(index.to_string())),
            Self::String(string) => JsValue::from(string.clone()),
            Self::Symbol(symbol) => JsValue::from(symbol.clone()),
        }
    }
}

impl From<JsString> for PropertyKey {
    fn from(string: JsString) -> Self {
        match string.as_index() {
            Some(index) => Self::Index(index),
            None => Self::String(string),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(string: &str) -> Self {
        Self::from(JsString::from(string))
    }
}

impl From<JsSymbol> for PropertyKey {
    fn from(symbol: JsSymbol) -> Self {
        Self::Symbol(symbol)
    }
}

impl From<u32> for PropertyKey {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::String(string) => write!(f, "{string}"),
            Self::Symbol(symbol) => write!(f, "{symbol}"),
        }
    }
}

impl Finalize for PropertyKey {}

// SAFETY: keys hold no cell handles; strings and symbols are reference
// counted.
unsafe impl Trace for PropertyKey {
    kestrel_gc::empty_trace!();
}

bitflags! {
    /// The three boolean attributes of a data property, packed.
    ///
    /// Used by builders and built-in registration; the full descriptor type
    /// below is what the meta-object protocol trades in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Attribute: u8 {
        /// The `[[Writable]]` attribute.
        const WRITABLE = 0b0000_0001;
        /// The `[[Enumerable]]` attribute.
        const ENUMERABLE = 0b0000_0010;
        /// The `[[Configurable]]` attribute.
        const CONFIGURABLE = 0b0000_0100;
    }
}

impl Attribute {
    /// Writable, enumerable and configurable.
    pub const fn all_set() -> Self {
        Self::all()
    }
}

/// A property descriptor: a bag of up to six optional fields.
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-property-descriptor-specification-type
#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptor {
    value: Option<JsValue>,
    writable: Option<bool>,
    get: Option<JsValue>,
    set: Option<JsValue>,
    enumerable: Option<bool>,
    configurable: Option<bool>,
}

impl PropertyDescriptor {
    /// Creates a builder for a descriptor.
    pub fn builder() -> PropertyDescriptorBuilder {
        PropertyDescriptorBuilder::default()
    }

    /// An empty descriptor.
    pub fn empty() -> Self {
        Self::default()
    }

    /// `IsDataDescriptor`: has a `[[Value]]` or `[[Writable]]` field.
    pub fn is_data_descriptor(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    /// `IsAccessorDescriptor`: has a `[[Get]]` or `[[Set]]` field.
    pub fn is_accessor_descriptor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    /// `IsGenericDescriptor`: neither data nor accessor.
    pub fn is_generic_descriptor(&self) -> bool {
        !self.is_data_descriptor() && !self.is_accessor_descriptor()
    }

    /// The `[[Value]]` field.
    pub fn value(&self) -> Option<&JsValue> {
        self.value.as_ref()
    }

    /// The `[[Writable]]` field.
    pub fn writable(&self) -> Option<bool> {
        self.writable
    }

    /// The `[[Get]]` field.
    pub fn get(&self) -> Option<&JsValue> {
        self.get.as_ref()
    }

    /// The `[[Set]]` field.
    pub fn set(&self) -> Option<&JsValue> {
        self.set.as_ref()
    }

    /// The `[[Enumerable]]` field.
    pub fn enumerable(&self) -> Option<bool> {
        self.enumerable
    }

    /// The `[[Configurable]]` field.
    pub fn configurable(&self) -> Option<bool> {
        self.configurable
    }

    /// The `[[Value]]` field, or `undefined` when absent.
    pub fn expect_value(&self) -> JsValue {
        self.value.clone().unwrap_or_default()
    }

    /// The `[[Enumerable]]` field, defaulting to `false`.
    pub fn expect_enumerable(&self) -> bool {
        self.enumerable.unwrap_or(false)
    }

    /// The `[[Writable]]` field, defaulting to `false`.
    pub fn expect_writable(&self) -> bool {
        self.writable.unwrap_or(false)
    }

    /// The `[[Configurable]]` field, defaulting to `false`.
    pub fn expect_configurable(&self) -> bool {
        self.configurable.unwrap_or(false)
    }

    /// `CompletePropertyDescriptor`: fills every absent field with its
    /// default.
    pub fn complete(mut self) -> Self {
        if self.is_generic_descriptor() || self.is_data_descriptor() {
            self.value.get_or_insert_with(JsValue::undefined);
            self.writable.get_or_insert(false);
        } else {
            self.get.get_or_insert_with(JsValue::undefined);
            self.set.get_or_insert_with(JsValue::undefined);
        }
        self.enumerable.get_or_insert(false);
        self.configurable.get_or_insert(false);
        self
    }

    /// Overlays the present fields of `other` onto `self`.
    pub fn fill_with(&mut self, other: &Self) {
        if let Some(value) = &other.value {
            self.value = Some(value.clone());
        }
        if let Some(writable) = other.writable {
            self.writable = Some(writable);
        }
        if let Some(get) = &other.get {
            self.get = Some(get.clone());
        }
        if let Some(set) = &other.set {
            self.set = Some(set.clone());
        }
        if let Some(enumerable) = other.enumerable {
            self.enumerable = Some(enumerable);
        }
        if let Some(configurable) = other.configurable {
            self.configurable = Some(configurable);
        }
    }
}

impl From<Attribute> for PropertyDescriptor {
    fn from(attribute: Attribute) -> Self {
        Self::builder()
            .writable(attribute.contains(Attribute::WRITABLE))
            .enumerable(attribute.contains(Attribute::ENUMERABLE))
            .configurable(attribute.contains(Attribute::CONFIGURABLE))
            .build()
    }
}

impl Finalize for PropertyDescriptor {}

// SAFETY: the value/get/set fields are the outgoing edges.
unsafe impl Trace for PropertyDescriptor {
    custom_trace!(this, mark, {
        if let Some(value) = &this.value {
            mark(value);
        }
        if let Some(get) = &this.get {
            mark(get);
        }
        if let Some(set) = &this.set {
            mark(set);
        }
    });
}

/// Builder for [`PropertyDescriptor`].
#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptorBuilder {
    inner: PropertyDescriptor,
}

impl PropertyDescriptorBuilder {
    /// Sets the `[[Value]]` field.
    pub fn value<V: Into<JsValue>>(mut self, value: V) -> Self {
        self.inner.value = Some(value.into());
        self
    }

    /// Sets the `[[Writable]]` field.
    pub fn writable(mut self, writable: bool) -> Self {
        self.inner.writable = Some(writable);
        self
    }

    /// Sets the `[[Get]]` field.
    pub fn get<V: Into<JsValue>>(mut self, get: V) -> Self {
        self.inner.get = Some(get.into());
        self
    }

    /// Sets the `[[Set]]` field.
    pub fn set<V: Into<JsValue>>(mut self, set: V) -> Self {
        self.inner.set = Some(set.into());
        self
    }

    /// Sets the `[[Enumerable]]` field.
    pub fn enumerable(mut self, enumerable: bool) -> Self {
        self.inner.enumerable = Some(enumerable);
        self
    }

    /// Sets the `[[Configurable]]` field.
    pub fn configurable(mut self, configurable: bool) -> Self {
        self.inner.configurable = Some(configurable);
        self
    }

    /// Finishes the descriptor.
    pub fn build(self) -> PropertyDescriptor {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::{PropertyDescriptor, PropertyKey};
    use crate::string::JsString;

    #[test]
    fn string_keys_canonicalize_to_indexes() {
        assert_eq!(PropertyKey::from(JsString::from("3")), PropertyKey::Index(3));
        assert!(matches!(
            PropertyKey::from(JsString::from("03")),
            PropertyKey::String(_)
        ));
        assert!(matches!(
            PropertyKey::from(JsString::from("length")),
            PropertyKey::String(_)
        ));
    }

    #[test]
    fn descriptor_kinds() {
        let data = PropertyDescriptor::builder().value(1).writable(true).build();
        assert!(data.is_data_descriptor());
        assert!(!data.is_accessor_descriptor());

        let generic = PropertyDescriptor::builder().enumerable(true).build();
        assert!(generic.is_generic_descriptor());
    }

    #[test]
    fn complete_fills_defaults() {
        let desc = PropertyDescriptor::empty().complete();
        assert_eq!(desc.expect_writable(), false);
        assert!(desc.value().is_some());
        assert_eq!(desc.expect_enumerable(), false);
        assert_eq!(desc.expect_configurable(), false);
    }
}
