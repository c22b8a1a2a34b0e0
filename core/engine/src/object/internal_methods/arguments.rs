//! Mapped arguments exotic objects.
//!
//! A mapped arguments object re-routes the numeric indices that correspond
//! to simple parameters through the function environment, so `arguments[0]`
//! and the first parameter stay two names for one binding.
//!
//! More information:
//!  - [ECMAScript reference][spec]
//!
//! [spec]: https://tc39.es/ecma262/#sec-arguments-exotic-objects

use super::{
    ordinary_define_own_property, ordinary_delete, ordinary_get, ordinary_get_own_property,
    ordinary_set, InternalObjectMethods, ORDINARY_INTERNAL_METHODS,
};
use crate::builtins::function::arguments::MappedArguments;
use crate::context::Context;
use crate::object::{JsObject, ObjectKind};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::value::JsValue;
use crate::JsResult;

/// The vtable of mapped arguments objects.
pub(crate) static MAPPED_ARGUMENTS_INTERNAL_METHODS: InternalObjectMethods =
    InternalObjectMethods {
        __get_own_property__: arguments_exotic_get_own_property,
        __define_own_property__: arguments_exotic_define_own_property,
        __get__: arguments_exotic_get,
        __set__: arguments_exotic_set,
        __delete__: arguments_exotic_delete,
        ..ORDINARY_INTERNAL_METHODS
    };

fn mapped_slot(obj: &JsObject, key: &PropertyKey) -> Option<(MappedArguments, u32, u32)> {
    let index = key.as_index()?;
    let object = obj.borrow();
    let ObjectKind::MappedArguments(map) = &object.data.kind else {
        return None;
    };
    map.slot(index).map(|slot| (map.clone(), index, slot))
}

/// `[[GetOwnProperty]] ( P )`: patches the mapped value into the ordinary
/// descriptor.
pub(crate) fn arguments_exotic_get_own_property(
    obj: &JsObject,
    key: &PropertyKey,
    context: &mut Context,
) -> JsResult<Option<PropertyDescriptor>> {
    let Some(mut desc) = ordinary_get_own_property(obj, key, context)? else {
        return Ok(None);
    };
    if let Some((map, _, slot)) = mapped_slot(obj, key) {
        let mut patched = desc.clone();
        patched.fill_with(&PropertyDescriptor::builder().value(map.get(slot)).build());
        desc = patched;
    }
    Ok(Some(desc))
}

/// `[[DefineOwnProperty]] ( P, Desc )`: keeps the parameter map in sync.
pub(crate) fn arguments_exotic_define_own_property(
    obj: &JsObject,
    key: &PropertyKey,
    desc: PropertyDescriptor,
    context: &mut Context,
) -> JsResult<bool> {
    let mapped = mapped_slot(obj, key);

    let mut new_arg_desc = desc.clone();
    // 4. A writable data redefinition without a value keeps the mapped value
    // alive through the ordinary define below.
    if let Some((map, _, slot)) = &mapped {
        if desc.is_data_descriptor() && desc.value().is_none() && desc.writable() != Some(false) {
            new_arg_desc = desc.clone();
            new_arg_desc.fill_with(
                &PropertyDescriptor::builder().value(map.get(*slot)).build(),
            );
        }
    }

    // 6. Ordinary definition.
    if !ordinary_define_own_property(obj, key, new_arg_desc, context)? {
        return Ok(false);
    }

    // 7. Update or sever the mapping.
    if let Some((map, index, slot)) = mapped {
        if desc.is_accessor_descriptor() {
            map.unmap(index);
        } else {
            if let Some(value) = desc.value() {
                map.set(slot, value.clone());
            }
            if desc.writable() == Some(false) {
                map.unmap(index);
            }
        }
    }
    Ok(true)
}

/// `[[Get]] ( P, Receiver )`: mapped indices read the environment.
pub(crate) fn arguments_exotic_get(
    obj: &JsObject,
    key: &PropertyKey,
    receiver: &JsValue,
    context: &mut Context,
) -> JsResult<JsValue> {
    if let Some((map, _, slot)) = mapped_slot(obj, key) {
        return Ok(map.get(slot));
    }
    ordinary_get(obj, key, receiver, context)
}

/// `[[Set]] ( P, V, Receiver )`: mapped indices write the environment.
pub(crate) fn arguments_exotic_set(
    obj: &JsObject,
    key: PropertyKey,
    value: JsValue,
    receiver: JsValue,
    context: &mut Context,
) -> JsResult<bool> {
    let same_receiver = receiver
        .as_object()
        .is_some_and(|r| JsObject::equals(r, obj));
    if same_receiver {
        if let Some((map, _, slot)) = mapped_slot(obj, &key) {
            map.set(slot, value.clone());
        }
    }
    ordinary_set(obj, key, value, receiver, context)
}

/// `[[Delete]] ( P )`: a deleted index loses its mapping.
pub(crate) fn arguments_exotic_delete(
    obj: &JsObject,
    key: &PropertyKey,
    context: &mut Context,
) -> JsResult<bool> {
    let mapped = mapped_slot(obj, key);
    let result = ordinary_delete(obj, key, context)?;
    if result {
        if let Some((map, index, _)) = mapped {
            map.unmap(index);
        }
    }
    Ok(result)
}
