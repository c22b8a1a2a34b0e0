//! Integer-indexed exotic objects: a typed view over an element buffer.
//!
//! Canonical numeric keys dispatch straight to the buffer; everything else
//! behaves ordinarily. Out-of-bounds indices read as `undefined` and ignore
//! writes, and index properties are never configurable.
//!
//! More information:
//!  - [ECMAScript reference][spec]
//!
//! [spec]: https://tc39.es/ecma262/#sec-integer-indexed-exotic-objects

use super::{
    ordinary_define_own_property, ordinary_delete, ordinary_get, ordinary_get_own_property,
    ordinary_has_property, ordinary_set, InternalObjectMethods, ORDINARY_INTERNAL_METHODS,
};
use crate::context::Context;
use crate::object::{JsObject, ObjectKind};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::value::JsValue;
use crate::JsResult;

/// The vtable of integer-indexed exotic objects.
pub(crate) static INTEGER_INDEXED_INTERNAL_METHODS: InternalObjectMethods =
    InternalObjectMethods {
        __get_own_property__: integer_indexed_get_own_property,
        __has_property__: integer_indexed_has_property,
        __define_own_property__: integer_indexed_define_own_property,
        __get__: integer_indexed_get,
        __set__: integer_indexed_set,
        __delete__: integer_indexed_delete,
        __own_property_keys__: integer_indexed_own_property_keys,
        ..ORDINARY_INTERNAL_METHODS
    };

fn element(obj: &JsObject, index: u32) -> Option<f64> {
    let object = obj.borrow();
    let ObjectKind::IntegerIndexed(data) = &object.data.kind else {
        return None;
    };
    data.elements.get(index as usize).copied()
}

fn set_element(obj: &JsObject, index: u32, value: f64) -> bool {
    let mut object = obj.borrow_mut();
    let ObjectKind::IntegerIndexed(data) = &mut object.data.kind else {
        return false;
    };
    match data.elements.get_mut(index as usize) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

fn len(obj: &JsObject) -> usize {
    let object = obj.borrow();
    match &object.data.kind {
        ObjectKind::IntegerIndexed(data) => data.elements.len(),
        _ => 0,
    }
}

/// `[[GetOwnProperty]] ( P )`
pub(crate) fn integer_indexed_get_own_property(
    obj: &JsObject,
    key: &PropertyKey,
    context: &mut Context,
) -> JsResult<Option<PropertyDescriptor>> {
    if let Some(index) = key.as_index() {
        return Ok(element(obj, index).map(|value| {
            PropertyDescriptor::builder()
                .value(value)
                .writable(true)
                .enumerable(true)
                .configurable(false)
                .build()
        }));
    }
    ordinary_get_own_property(obj, key, context)
}

/// `[[HasProperty]] ( P )`
pub(crate) fn integer_indexed_has_property(
    obj: &JsObject,
    key: &PropertyKey,
    context: &mut Context,
) -> JsResult<bool> {
    if let Some(index) = key.as_index() {
        return Ok(element(obj, index).is_some());
    }
    ordinary_has_property(obj, key, context)
}

/// `[[DefineOwnProperty]] ( P, Desc )`
pub(crate) fn integer_indexed_define_own_property(
    obj: &JsObject,
    key: &PropertyKey,
    desc: PropertyDescriptor,
    context: &mut Context,
) -> JsResult<bool> {
    if let Some(index) = key.as_index() {
        if element(obj, index).is_none() {
            return Ok(false);
        }
        if desc.is_accessor_descriptor()
            || desc.configurable() == Some(true)
            || desc.enumerable() == Some(false)
            || desc.writable() == Some(false)
        {
            return Ok(false);
        }
        if let Some(value) = desc.value() {
            let number = value.to_number(context)?;
            return Ok(set_element(obj, index, number));
        }
        return Ok(true);
    }
    ordinary_define_own_property(obj, key, desc, context)
}

/// `[[Get]] ( P, Receiver )`
pub(crate) fn integer_indexed_get(
    obj: &JsObject,
    key: &PropertyKey,
    receiver: &JsValue,
    context: &mut Context,
) -> JsResult<JsValue> {
    if let Some(index) = key.as_index() {
        return Ok(element(obj, index).map_or(JsValue::undefined(), JsValue::from));
    }
    ordinary_get(obj, key, receiver, context)
}

/// `[[Set]] ( P, V, Receiver )`
pub(crate) fn integer_indexed_set(
    obj: &JsObject,
    key: PropertyKey,
    value: JsValue,
    receiver: JsValue,
    context: &mut Context,
) -> JsResult<bool> {
    if let Some(index) = key.as_index() {
        let number = value.to_number(context)?;
        // Out-of-bounds writes are silently dropped.
        set_element(obj, index, number);
        return Ok(true);
    }
    ordinary_set(obj, key, value, receiver, context)
}

/// `[[Delete]] ( P )`
pub(crate) fn integer_indexed_delete(
    obj: &JsObject,
    key: &PropertyKey,
    context: &mut Context,
) -> JsResult<bool> {
    if let Some(index) = key.as_index() {
        return Ok(element(obj, index).is_none());
    }
    ordinary_delete(obj, key, context)
}

/// `[[OwnPropertyKeys]] ( )`
pub(crate) fn integer_indexed_own_property_keys(
    obj: &JsObject,
    _context: &mut Context,
) -> JsResult<Vec<PropertyKey>> {
    let mut keys: Vec<PropertyKey> = (0..len(obj) as u32).map(PropertyKey::Index).collect();
    for key in obj.borrow().properties().keys() {
        if !matches!(key, PropertyKey::Index(_)) {
            keys.push(key);
        }
    }
    Ok(keys)
}
