//! Ordered property storage.
//!
//! Index keys live in their own table and enumerate in ascending numeric
//! order; string and symbol keys keep insertion order. Own-key enumeration
//! yields indexes, then strings, then symbols, which is the observable
//! property order everywhere in the engine.

use std::hash::BuildHasherDefault;

use indexmap::IndexMap;
use kestrel_gc::{custom_trace, Finalize, Trace};
use rustc_hash::{FxHashMap, FxHasher};

use crate::property::{PropertyDescriptor, PropertyKey};
use crate::string::JsString;
use crate::symbol::JsSymbol;

type OrderedMap<K> = IndexMap<K, PropertyDescriptor, BuildHasherDefault<FxHasher>>;

/// The property table of an object.
#[derive(Default)]
pub struct PropertyMap {
    indexed_properties: FxHashMap<u32, PropertyDescriptor>,
    string_properties: OrderedMap<JsString>,
    symbol_properties: OrderedMap<JsSymbol>,
}

impl PropertyMap {
    /// Gets the property with the given key.
    pub fn get(&self, key: &PropertyKey) -> Option<&PropertyDescriptor> {
        match key {
            PropertyKey::Index(index) => self.indexed_properties.get(index),
            PropertyKey::String(string) => self.string_properties.get(string),
            PropertyKey::Symbol(symbol) => self.symbol_properties.get(symbol),
        }
    }

    /// Inserts a property, returning the previous descriptor if any.
    pub fn insert(
        &mut self,
        key: &PropertyKey,
        property: PropertyDescriptor,
    ) -> Option<PropertyDescriptor> {
        match key {
            PropertyKey::Index(index) => self.indexed_properties.insert(*index, property),
            PropertyKey::String(string) => self.string_properties.insert(string.clone(), property),
            PropertyKey::Symbol(symbol) => self.symbol_properties.insert(symbol.clone(), property),
        }
    }

    /// Removes a property, preserving the insertion order of the remaining
    /// ones.
    pub fn remove(&mut self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        match key {
            PropertyKey::Index(index) => self.indexed_properties.remove(index),
            PropertyKey::String(string) => self.string_properties.shift_remove(string),
            PropertyKey::Symbol(symbol) => self.symbol_properties.shift_remove(symbol),
        }
    }

    /// Returns `true` if a property with the given key exists.
    pub fn contains_key(&self, key: &PropertyKey) -> bool {
        match key {
            PropertyKey::Index(index) => self.indexed_properties.contains_key(index),
            PropertyKey::String(string) => self.string_properties.contains_key(string),
            PropertyKey::Symbol(symbol) => self.symbol_properties.contains_key(symbol),
        }
    }

    /// The number of properties in the table.
    pub fn len(&self) -> usize {
        self.indexed_properties.len() + self.string_properties.len() + self.symbol_properties.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The own keys in enumeration order: ascending indexes, then strings
    /// and symbols in insertion order.
    pub fn keys(&self) -> Vec<PropertyKey> {
        let mut keys: Vec<PropertyKey> = Vec::with_capacity(self.len());
        let mut indexes: Vec<u32> = self.indexed_properties.keys().copied().collect();
        indexes.sort_unstable();
        keys.extend(indexes.into_iter().map(PropertyKey::Index));
        keys.extend(
            self.string_properties
                .keys()
                .cloned()
                .map(PropertyKey::String),
        );
        keys.extend(
            self.symbol_properties
                .keys()
                .cloned()
                .map(PropertyKey::Symbol),
        );
        keys
    }

    /// The index keys present, unsorted.
    pub fn index_property_keys(&self) -> impl Iterator<Item = u32> + '_ {
        self.indexed_properties.keys().copied()
    }

    /// The slot of a string key in the ordered table, for inline caches.
    pub(crate) fn string_slot(&self, key: &JsString) -> Option<usize> {
        self.string_properties.get_index_of(key)
    }

    /// Reads the descriptor at a cached string slot.
    pub(crate) fn string_slot_entry(&self, slot: usize) -> Option<(&JsString, &PropertyDescriptor)> {
        self.string_properties.get_index(slot)
    }
}

impl Finalize for PropertyMap {}

// SAFETY: all descriptors are traced; keys hold no cell handles.
unsafe impl Trace for PropertyMap {
    custom_trace!(this, mark, {
        for desc in this.indexed_properties.values() {
            mark(desc);
        }
        for desc in this.string_properties.values() {
            mark(desc);
        }
        for desc in this.symbol_properties.values() {
            mark(desc);
        }
    });
}
