//! Array exotic objects: the `length` invariant.
//!
//! More information:
//!  - [ECMAScript reference][spec]
//!
//! [spec]: https://tc39.es/ecma262/#sec-array-exotic-objects

use super::{ordinary_define_own_property, InternalObjectMethods, ORDINARY_INTERNAL_METHODS};
use crate::context::Context;
use crate::error::JsNativeError;
use crate::object::JsObject;
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::value::JsValue;
use crate::JsResult;

/// The vtable of array exotic objects; only `[[DefineOwnProperty]]` differs
/// from the ordinary object.
pub(crate) static ARRAY_EXOTIC_INTERNAL_METHODS: InternalObjectMethods = InternalObjectMethods {
    __define_own_property__: array_exotic_define_own_property,
    ..ORDINARY_INTERNAL_METHODS
};

/// `[[DefineOwnProperty]] ( P, Desc )` for arrays.
pub(crate) fn array_exotic_define_own_property(
    obj: &JsObject,
    key: &PropertyKey,
    desc: PropertyDescriptor,
    context: &mut Context,
) -> JsResult<bool> {
    match key {
        // 2. If P is "length", run ArraySetLength.
        PropertyKey::String(string) if string == "length" => {
            array_set_length(obj, desc, context)
        }
        // 3. Index keys grow the length.
        PropertyKey::Index(index) => {
            let index = *index;
            let old_len_desc = obj
                .borrow()
                .properties()
                .get(&PropertyKey::from("length"))
                .cloned()
                .expect("arrays always have a length");
            let old_len = old_len_desc
                .value()
                .and_then(JsValue::as_number)
                .expect("array length is a number") as u64;

            // 3.d. Refuse to grow past a frozen length.
            if u64::from(index) >= old_len && !old_len_desc.expect_writable() {
                return Ok(false);
            }

            // 3.e. Ordinary definition of the element itself.
            if !ordinary_define_own_property(obj, key, desc, context)? {
                return Ok(false);
            }

            // 3.f. Keep length one past the largest index.
            if u64::from(index) >= old_len {
                let new_len_desc = PropertyDescriptor::builder()
                    .value(JsValue::from(index + 1))
                    .writable(old_len_desc.expect_writable())
                    .enumerable(false)
                    .configurable(false)
                    .build();
                obj.borrow_mut()
                    .properties_mut()
                    .insert(&PropertyKey::from("length"), new_len_desc);
            }
            Ok(true)
        }
        _ => ordinary_define_own_property(obj, key, desc, context),
    }
}

/// `ArraySetLength ( A, Desc )`
///
/// Shrinking deletes the excess elements in descending index order and stops
/// at the first non-configurable one.
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-arraysetlength
fn array_set_length(
    obj: &JsObject,
    desc: PropertyDescriptor,
    context: &mut Context,
) -> JsResult<bool> {
    let length_key = PropertyKey::from("length");

    // 1. If Desc does not have a [[Value]] field, fall through to the
    // ordinary path.
    let Some(new_len_value) = desc.value().cloned() else {
        return ordinary_define_own_property(obj, &length_key, desc, context);
    };

    // 3..6. newLen must round-trip through ToUint32.
    let new_len = new_len_value.to_u32(context)?;
    let number_len = new_len_value.to_number(context)?;
    if f64::from(new_len) != number_len {
        return Err(JsNativeError::range()
            .with_message("invalid array length")
            .into());
    }

    let old_len_desc = obj
        .borrow()
        .properties()
        .get(&length_key)
        .cloned()
        .expect("arrays always have a length");
    let old_len = old_len_desc
        .value()
        .and_then(JsValue::as_number)
        .expect("array length is a number") as u64;

    let mut new_len_desc = old_len_desc.clone();
    new_len_desc.fill_with(&desc);
    let requested_writable = new_len_desc.expect_writable();

    // 11. Growing (or equal) lengths apply directly.
    if u64::from(new_len) >= old_len {
        let final_desc = PropertyDescriptor::builder()
            .value(JsValue::from(new_len))
            .writable(requested_writable)
            .enumerable(false)
            .configurable(false)
            .build();
        obj.borrow_mut()
            .properties_mut()
            .insert(&length_key, final_desc);
        return Ok(true);
    }

    // 12. A non-writable length cannot shrink.
    if !old_len_desc.expect_writable() {
        return Ok(false);
    }

    // 15..16. Delete indices >= newLen, largest first.
    let mut doomed: Vec<u32> = obj
        .borrow()
        .properties()
        .index_property_keys()
        .filter(|&index| u64::from(index) >= u64::from(new_len))
        .collect();
    doomed.sort_unstable_by(|a, b| b.cmp(a));

    for index in doomed {
        let configurable = obj
            .borrow()
            .properties()
            .get(&PropertyKey::Index(index))
            .map(PropertyDescriptor::expect_configurable)
            .unwrap_or(true);
        if !configurable {
            // 16.b. Stop at the first survivor; length lands just past it.
            let stop_desc = PropertyDescriptor::builder()
                .value(JsValue::from(index + 1))
                .writable(requested_writable)
                .enumerable(false)
                .configurable(false)
                .build();
            obj.borrow_mut()
                .properties_mut()
                .insert(&length_key, stop_desc);
            return Ok(false);
        }
        obj.borrow_mut()
            .properties_mut()
            .remove(&PropertyKey::Index(index));
    }

    let final_desc = PropertyDescriptor::builder()
        .value(JsValue::from(new_len))
        .writable(requested_writable)
        .enumerable(false)
        .configurable(false)
        .build();
    obj.borrow_mut()
        .properties_mut()
        .insert(&length_key, final_desc);
    Ok(true)
}
