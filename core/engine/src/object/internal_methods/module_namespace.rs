//! Module namespace exotic objects: frozen, sorted exports, values read
//! through the exporting module's environment on every access.
//!
//! More information:
//!  - [ECMAScript reference][spec]
//!
//! [spec]: https://tc39.es/ecma262/#sec-module-namespace-exotic-objects

use super::{InternalObjectMethods, ORDINARY_INTERNAL_METHODS};
use crate::context::Context;
use crate::object::{JsObject, JsPrototype, ModuleNamespace, ObjectKind};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::value::JsValue;
use crate::JsResult;

/// The vtable of module namespace objects.
pub(crate) static MODULE_NAMESPACE_INTERNAL_METHODS: InternalObjectMethods =
    InternalObjectMethods {
        __get_prototype_of__: namespace_get_prototype_of,
        __set_prototype_of__: namespace_set_prototype_of,
        __is_extensible__: namespace_is_extensible,
        __prevent_extensions__: namespace_prevent_extensions,
        __get_own_property__: namespace_get_own_property,
        __define_own_property__: namespace_define_own_property,
        __has_property__: namespace_has_property,
        __get__: namespace_get,
        __set__: namespace_set,
        __delete__: namespace_delete,
        __own_property_keys__: namespace_own_property_keys,
        ..ORDINARY_INTERNAL_METHODS
    };

fn namespace_data(obj: &JsObject) -> ModuleNamespace {
    let object = obj.borrow();
    let ObjectKind::ModuleNamespace(namespace) = &object.data.kind else {
        unreachable!("module namespace vtable installed on a non-namespace object");
    };
    namespace.clone()
}

/// `[[GetPrototypeOf]] ( )`: always `null`.
fn namespace_get_prototype_of(_obj: &JsObject, _context: &mut Context) -> JsResult<JsPrototype> {
    Ok(None)
}

/// `[[SetPrototypeOf]] ( V )`: only `null` is accepted.
fn namespace_set_prototype_of(
    _obj: &JsObject,
    prototype: JsPrototype,
    _context: &mut Context,
) -> JsResult<bool> {
    Ok(prototype.is_none())
}

/// `[[IsExtensible]] ( )`: never.
fn namespace_is_extensible(_obj: &JsObject, _context: &mut Context) -> JsResult<bool> {
    Ok(false)
}

/// `[[PreventExtensions]] ( )`: trivially succeeds.
fn namespace_prevent_extensions(_obj: &JsObject, _context: &mut Context) -> JsResult<bool> {
    Ok(true)
}

/// `[[GetOwnProperty]] ( P )`: export bindings surface as
/// `{writable, enumerable, non-configurable}` data properties.
fn namespace_get_own_property(
    obj: &JsObject,
    key: &PropertyKey,
    context: &mut Context,
) -> JsResult<Option<PropertyDescriptor>> {
    let PropertyKey::String(name) = key else {
        return Ok(obj.borrow().properties().get(key).cloned());
    };
    let namespace = namespace_data(obj);
    if !namespace.exports.contains(name) {
        return Ok(None);
    }
    let value = namespace_get(obj, key, &obj.clone().into(), context)?;
    Ok(Some(
        PropertyDescriptor::builder()
            .value(value)
            .writable(true)
            .enumerable(true)
            .configurable(false)
            .build(),
    ))
}

/// `[[DefineOwnProperty]] ( P, Desc )`: only no-op redefinitions succeed.
fn namespace_define_own_property(
    obj: &JsObject,
    key: &PropertyKey,
    desc: PropertyDescriptor,
    context: &mut Context,
) -> JsResult<bool> {
    let Some(current) = namespace_get_own_property(obj, key, context)? else {
        return Ok(false);
    };
    if desc.is_accessor_descriptor() {
        return Ok(false);
    }
    if desc.writable() == Some(false)
        || desc.enumerable() == Some(false)
        || desc.configurable() == Some(true)
    {
        return Ok(false);
    }
    if let Some(value) = desc.value() {
        return Ok(value.same_value(&current.expect_value()));
    }
    Ok(true)
}

/// `[[HasProperty]] ( P )`
fn namespace_has_property(
    obj: &JsObject,
    key: &PropertyKey,
    _context: &mut Context,
) -> JsResult<bool> {
    match key {
        PropertyKey::String(name) => Ok(namespace_data(obj).exports.contains(name)),
        _ => Ok(obj.borrow().properties().contains_key(key)),
    }
}

/// `[[Get]] ( P, Receiver )`: resolves the export and reads the defining
/// module's environment.
fn namespace_get(
    obj: &JsObject,
    key: &PropertyKey,
    _receiver: &JsValue,
    context: &mut Context,
) -> JsResult<JsValue> {
    let PropertyKey::String(name) = key else {
        return Ok(obj
            .borrow()
            .properties()
            .get(key)
            .map(PropertyDescriptor::expect_value)
            .unwrap_or_default());
    };
    let namespace = namespace_data(obj);
    if !namespace.exports.contains(name) {
        return Ok(JsValue::undefined());
    }
    namespace.module.exported_binding_value(name, context)
}

/// `[[Set]] ( P, V, Receiver )`: always fails.
fn namespace_set(
    _obj: &JsObject,
    _key: PropertyKey,
    _value: JsValue,
    _receiver: JsValue,
    _context: &mut Context,
) -> JsResult<bool> {
    Ok(false)
}

/// `[[Delete]] ( P )`: exports cannot be deleted.
fn namespace_delete(
    obj: &JsObject,
    key: &PropertyKey,
    _context: &mut Context,
) -> JsResult<bool> {
    match key {
        PropertyKey::String(name) => Ok(!namespace_data(obj).exports.contains(name)),
        _ => Ok(true),
    }
}

/// `[[OwnPropertyKeys]] ( )`: sorted export names.
fn namespace_own_property_keys(
    obj: &JsObject,
    _context: &mut Context,
) -> JsResult<Vec<PropertyKey>> {
    let namespace = namespace_data(obj);
    let mut keys: Vec<PropertyKey> = namespace
        .exports
        .iter()
        .cloned()
        .map(PropertyKey::String)
        .collect();
    keys.extend(
        obj.borrow()
            .properties()
            .keys()
            .into_iter()
            .filter(|key| matches!(key, PropertyKey::Symbol(_))),
    );
    Ok(keys)
}
