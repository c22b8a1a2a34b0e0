//! String exotic objects: non-configurable index properties materialized
//! from the wrapped string.
//!
//! More information:
//!  - [ECMAScript reference][spec]
//!
//! [spec]: https://tc39.es/ecma262/#sec-string-exotic-objects

use super::{
    ordinary_define_own_property, ordinary_get_own_property, validate_and_apply_property_descriptor,
    InternalObjectMethods, ORDINARY_INTERNAL_METHODS,
};
use crate::context::Context;
use crate::object::{JsObject, ObjectKind};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::string::JsString;
use crate::JsResult;

/// The vtable of `String` exotic objects.
pub(crate) static STRING_EXOTIC_INTERNAL_METHODS: InternalObjectMethods =
    InternalObjectMethods {
        __get_own_property__: string_exotic_get_own_property,
        __define_own_property__: string_exotic_define_own_property,
        __own_property_keys__: string_exotic_own_property_keys,
        ..ORDINARY_INTERNAL_METHODS
    };

fn wrapped_string(obj: &JsObject) -> JsString {
    let object = obj.borrow();
    let ObjectKind::StringExotic(string) = &object.data.kind else {
        unreachable!("string exotic vtable installed on a non-string object");
    };
    string.clone()
}

/// `StringGetOwnProperty ( S, P )`
fn string_get_own_property(obj: &JsObject, key: &PropertyKey) -> Option<PropertyDescriptor> {
    let index = key.as_index()? as usize;
    let string = wrapped_string(obj);
    let unit = string.as_str().encode_utf16().nth(index)?;
    let value = JsString::from(String::from_utf16_lossy(&[unit]));
    Some(
        PropertyDescriptor::builder()
            .value(value)
            .writable(false)
            .enumerable(true)
            .configurable(false)
            .build(),
    )
}

/// `[[GetOwnProperty]] ( P )`
pub(crate) fn string_exotic_get_own_property(
    obj: &JsObject,
    key: &PropertyKey,
    context: &mut Context,
) -> JsResult<Option<PropertyDescriptor>> {
    let desc = ordinary_get_own_property(obj, key, context)?;
    if desc.is_some() {
        return Ok(desc);
    }
    Ok(string_get_own_property(obj, key))
}

/// `[[DefineOwnProperty]] ( P, Desc )`
pub(crate) fn string_exotic_define_own_property(
    obj: &JsObject,
    key: &PropertyKey,
    desc: PropertyDescriptor,
    context: &mut Context,
) -> JsResult<bool> {
    if let Some(string_desc) = string_get_own_property(obj, key) {
        // 2. Index slots only accept compatible redefinitions.
        let extensible = obj.borrow().extensible();
        return Ok(validate_and_apply_property_descriptor(
            None,
            extensible,
            desc,
            Some(string_desc),
        ));
    }
    ordinary_define_own_property(obj, key, desc, context)
}

/// `[[OwnPropertyKeys]] ( )`: string indices first, in order.
pub(crate) fn string_exotic_own_property_keys(
    obj: &JsObject,
    _context: &mut Context,
) -> JsResult<Vec<PropertyKey>> {
    let string = wrapped_string(obj);
    let len = string.len();

    let mut keys: Vec<PropertyKey> = (0..len as u32).map(PropertyKey::Index).collect();

    let object = obj.borrow();
    let mut extra: Vec<u32> = object
        .properties()
        .index_property_keys()
        .filter(|&index| index as usize >= len)
        .collect();
    extra.sort_unstable();
    keys.extend(extra.into_iter().map(PropertyKey::Index));

    for key in object.properties().keys() {
        if !matches!(key, PropertyKey::Index(_)) {
            keys.push(key);
        }
    }
    Ok(keys)
}
