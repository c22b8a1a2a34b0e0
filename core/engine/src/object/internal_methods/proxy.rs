//! Proxy exotic objects: every internal method dispatches to a handler trap
//! or forwards to the target, with the invariant checks the trap results
//! must pass.
//!
//! More information:
//!  - [ECMAScript reference][spec]
//!
//! [spec]: https://tc39.es/ecma262/#sec-proxy-object-internal-methods-and-internal-slots

use rustc_hash::FxHashSet;

use super::{validate_and_apply_property_descriptor, InternalObjectMethods, ORDINARY_INTERNAL_METHODS};
use crate::context::Context;
use crate::error::JsNativeError;
use crate::object::{JsObject, JsPrototype, ObjectKind};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::value::JsValue;
use crate::JsResult;

/// The vtable of plain proxies.
pub(crate) static PROXY_INTERNAL_METHODS: InternalObjectMethods = InternalObjectMethods {
    __get_prototype_of__: proxy_get_prototype_of,
    __set_prototype_of__: proxy_set_prototype_of,
    __is_extensible__: proxy_is_extensible,
    __prevent_extensions__: proxy_prevent_extensions,
    __get_own_property__: proxy_get_own_property,
    __define_own_property__: proxy_define_own_property,
    __has_property__: proxy_has_property,
    __get__: proxy_get,
    __set__: proxy_set,
    __delete__: proxy_delete,
    __own_property_keys__: proxy_own_property_keys,
    ..ORDINARY_INTERNAL_METHODS
};

/// The vtable of proxies over callable targets.
pub(crate) static PROXY_CALL_INTERNAL_METHODS: InternalObjectMethods = InternalObjectMethods {
    __call__: Some(proxy_call),
    ..PROXY_INTERNAL_METHODS
};

/// The vtable of proxies over constructor targets.
pub(crate) static PROXY_CONSTRUCT_INTERNAL_METHODS: InternalObjectMethods =
    InternalObjectMethods {
        __call__: Some(proxy_call),
        __construct__: Some(proxy_construct),
        ..PROXY_INTERNAL_METHODS
    };

/// Reads the (target, handler) pair or throws for a revoked proxy.
fn proxy_data(obj: &JsObject) -> JsResult<(JsObject, JsObject)> {
    let object = obj.borrow();
    let ObjectKind::Proxy(proxy) = &object.data.kind else {
        unreachable!("proxy vtable installed on a non-proxy object");
    };
    proxy.try_data()
}

/// Looks up a trap on the handler; `Ok(None)` means "forward to target".
fn trap(handler: &JsObject, name: &str, context: &mut Context) -> JsResult<Option<JsObject>> {
    handler.get_method(PropertyKey::from(name), context)
}

/// `[[GetPrototypeOf]] ( )`
fn proxy_get_prototype_of(obj: &JsObject, context: &mut Context) -> JsResult<JsPrototype> {
    let (target, handler) = proxy_data(obj)?;
    let Some(trap) = trap(&handler, "getPrototypeOf", context)? else {
        return target.__get_prototype_of__(context);
    };
    let result = trap.call(&handler.clone().into(), &[target.clone().into()], context)?;
    let proto = match &result {
        JsValue::Object(o) => Some(o.clone()),
        JsValue::Null => None,
        _ => {
            return Err(JsNativeError::typ()
                .with_message("proxy getPrototypeOf must return an object or null")
                .into())
        }
    };
    // Invariant: a non-extensible target pins its prototype.
    if !target.__is_extensible__(context)? {
        let target_proto = target.__get_prototype_of__(context)?;
        if !same_proto(&proto, &target_proto) {
            return Err(JsNativeError::typ()
                .with_message("proxy getPrototypeOf disagrees with non-extensible target")
                .into());
        }
    }
    Ok(proto)
}

fn same_proto(a: &JsPrototype, b: &JsPrototype) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => JsObject::equals(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// `[[SetPrototypeOf]] ( V )`
fn proxy_set_prototype_of(
    obj: &JsObject,
    prototype: JsPrototype,
    context: &mut Context,
) -> JsResult<bool> {
    let (target, handler) = proxy_data(obj)?;
    let Some(trap) = trap(&handler, "setPrototypeOf", context)? else {
        return target.__set_prototype_of__(prototype, context);
    };
    let proto_value = prototype
        .clone()
        .map_or(JsValue::null(), JsValue::from);
    let result = trap
        .call(
            &handler.clone().into(),
            &[target.clone().into(), proto_value],
            context,
        )?
        .to_boolean();
    if !result {
        return Ok(false);
    }
    if !target.__is_extensible__(context)? {
        let target_proto = target.__get_prototype_of__(context)?;
        if !same_proto(&prototype, &target_proto) {
            return Err(JsNativeError::typ()
                .with_message("proxy setPrototypeOf changed the prototype of a non-extensible target")
                .into());
        }
    }
    Ok(true)
}

/// `[[IsExtensible]] ( )`
fn proxy_is_extensible(obj: &JsObject, context: &mut Context) -> JsResult<bool> {
    let (target, handler) = proxy_data(obj)?;
    let Some(trap) = trap(&handler, "isExtensible", context)? else {
        return target.__is_extensible__(context);
    };
    let result = trap
        .call(&handler.clone().into(), &[target.clone().into()], context)?
        .to_boolean();
    if result != target.__is_extensible__(context)? {
        return Err(JsNativeError::typ()
            .with_message("proxy isExtensible disagrees with target")
            .into());
    }
    Ok(result)
}

/// `[[PreventExtensions]] ( )`
fn proxy_prevent_extensions(obj: &JsObject, context: &mut Context) -> JsResult<bool> {
    let (target, handler) = proxy_data(obj)?;
    let Some(trap) = trap(&handler, "preventExtensions", context)? else {
        return target.__prevent_extensions__(context);
    };
    let result = trap
        .call(&handler.clone().into(), &[target.clone().into()], context)?
        .to_boolean();
    if result && target.__is_extensible__(context)? {
        return Err(JsNativeError::typ()
            .with_message("proxy preventExtensions left target extensible")
            .into());
    }
    Ok(result)
}

/// `[[GetOwnProperty]] ( P )`
fn proxy_get_own_property(
    obj: &JsObject,
    key: &PropertyKey,
    context: &mut Context,
) -> JsResult<Option<PropertyDescriptor>> {
    let (target, handler) = proxy_data(obj)?;
    let Some(trap) = trap(&handler, "getOwnPropertyDescriptor", context)? else {
        return target.__get_own_property__(key, context);
    };
    let result = trap.call(
        &handler.clone().into(),
        &[target.clone().into(), key.to_value()],
        context,
    )?;
    let target_desc = target.__get_own_property__(key, context)?;
    if result.is_undefined() {
        if let Some(target_desc) = &target_desc {
            // Reporting a real non-configurable property as absent is a
            // lie the invariants refuse.
            if !target_desc.expect_configurable() {
                return Err(JsNativeError::typ()
                    .with_message("proxy hid a non-configurable property")
                    .into());
            }
            if !target.__is_extensible__(context)? {
                return Err(JsNativeError::typ()
                    .with_message("proxy hid a property of a non-extensible target")
                    .into());
            }
        }
        return Ok(None);
    }
    if !result.is_object() {
        return Err(JsNativeError::typ()
            .with_message("proxy getOwnPropertyDescriptor must return an object or undefined")
            .into());
    }
    let desc = crate::object::operations::to_property_descriptor(&result, context)?.complete();
    let extensible = target.__is_extensible__(context)?;
    let valid = validate_and_apply_property_descriptor(
        None,
        extensible,
        desc.clone(),
        target_desc.clone(),
    );
    if !valid {
        return Err(JsNativeError::typ()
            .with_message("proxy getOwnPropertyDescriptor reported an incompatible descriptor")
            .into());
    }
    if !desc.expect_configurable() {
        let compatible = target_desc
            .as_ref()
            .is_some_and(|d| !d.expect_configurable());
        if !compatible {
            return Err(JsNativeError::typ()
                .with_message("proxy reported a non-configurable descriptor for a configurable property")
                .into());
        }
    }
    Ok(Some(desc))
}

/// `[[DefineOwnProperty]] ( P, Desc )`
fn proxy_define_own_property(
    obj: &JsObject,
    key: &PropertyKey,
    desc: PropertyDescriptor,
    context: &mut Context,
) -> JsResult<bool> {
    let (target, handler) = proxy_data(obj)?;
    let Some(trap) = trap(&handler, "defineProperty", context)? else {
        return target.__define_own_property__(key, desc, context);
    };
    let desc_obj = crate::object::operations::from_property_descriptor(&desc, context);
    let result = trap
        .call(
            &handler.clone().into(),
            &[target.clone().into(), key.to_value(), desc_obj.into()],
            context,
        )?
        .to_boolean();
    if !result {
        return Ok(false);
    }
    let target_desc = target.__get_own_property__(key, context)?;
    let extensible = target.__is_extensible__(context)?;
    match &target_desc {
        None => {
            if !extensible {
                return Err(JsNativeError::typ()
                    .with_message("proxy defined a property on a non-extensible target")
                    .into());
            }
        }
        Some(target_desc) => {
            if !validate_and_apply_property_descriptor(
                None,
                extensible,
                desc.clone(),
                Some(target_desc.clone()),
            ) {
                return Err(JsNativeError::typ()
                    .with_message("proxy defined an incompatible property")
                    .into());
            }
        }
    }
    Ok(true)
}

/// `[[HasProperty]] ( P )`
fn proxy_has_property(
    obj: &JsObject,
    key: &PropertyKey,
    context: &mut Context,
) -> JsResult<bool> {
    let (target, handler) = proxy_data(obj)?;
    let Some(trap) = trap(&handler, "has", context)? else {
        return target.__has_property__(key, context);
    };
    let result = trap
        .call(
            &handler.clone().into(),
            &[target.clone().into(), key.to_value()],
            context,
        )?
        .to_boolean();
    if !result {
        if let Some(target_desc) = target.__get_own_property__(key, context)? {
            if !target_desc.expect_configurable() {
                return Err(JsNativeError::typ()
                    .with_message("proxy hid a non-configurable property from 'in'")
                    .into());
            }
            if !target.__is_extensible__(context)? {
                return Err(JsNativeError::typ()
                    .with_message("proxy hid a property of a non-extensible target from 'in'")
                    .into());
            }
        }
    }
    Ok(result)
}

/// `[[Get]] ( P, Receiver )`
fn proxy_get(
    obj: &JsObject,
    key: &PropertyKey,
    receiver: &JsValue,
    context: &mut Context,
) -> JsResult<JsValue> {
    let (target, handler) = proxy_data(obj)?;
    let Some(trap) = trap(&handler, "get", context)? else {
        return target.__get__(key, receiver, context);
    };
    let result = trap.call(
        &handler.clone().into(),
        &[target.clone().into(), key.to_value(), receiver.clone()],
        context,
    )?;
    if let Some(target_desc) = target.__get_own_property__(key, context)? {
        if !target_desc.expect_configurable() {
            if target_desc.is_data_descriptor() && !target_desc.expect_writable() {
                let expected = target_desc.expect_value();
                if !result.same_value(&expected) {
                    return Err(JsNativeError::typ()
                        .with_message("proxy get reported a different value for a frozen property")
                        .into());
                }
            }
            if target_desc.is_accessor_descriptor()
                && target_desc.get().is_none_or(JsValue::is_undefined)
                && !result.is_undefined()
            {
                return Err(JsNativeError::typ()
                    .with_message("proxy get reported a value for a getter-less accessor")
                    .into());
            }
        }
    }
    Ok(result)
}

/// `[[Set]] ( P, V, Receiver )`
fn proxy_set(
    obj: &JsObject,
    key: PropertyKey,
    value: JsValue,
    receiver: JsValue,
    context: &mut Context,
) -> JsResult<bool> {
    let (target, handler) = proxy_data(obj)?;
    let Some(trap) = trap(&handler, "set", context)? else {
        return target.__set__(key, value, receiver, context);
    };
    let result = trap
        .call(
            &handler.clone().into(),
            &[
                target.clone().into(),
                key.to_value(),
                value.clone(),
                receiver,
            ],
            context,
        )?
        .to_boolean();
    if !result {
        return Ok(false);
    }
    if let Some(target_desc) = target.__get_own_property__(&key, context)? {
        if !target_desc.expect_configurable() {
            if target_desc.is_data_descriptor() && !target_desc.expect_writable() {
                let expected = target_desc.expect_value();
                if !value.same_value(&expected) {
                    return Err(JsNativeError::typ()
                        .with_message("proxy set changed the value of a frozen property")
                        .into());
                }
            }
            if target_desc.is_accessor_descriptor()
                && target_desc.set().is_none_or(JsValue::is_undefined)
            {
                return Err(JsNativeError::typ()
                    .with_message("proxy set succeeded on a setter-less accessor")
                    .into());
            }
        }
    }
    Ok(true)
}

/// `[[Delete]] ( P )`
fn proxy_delete(obj: &JsObject, key: &PropertyKey, context: &mut Context) -> JsResult<bool> {
    let (target, handler) = proxy_data(obj)?;
    let Some(trap) = trap(&handler, "deleteProperty", context)? else {
        return target.__delete__(key, context);
    };
    let result = trap
        .call(
            &handler.clone().into(),
            &[target.clone().into(), key.to_value()],
            context,
        )?
        .to_boolean();
    if !result {
        return Ok(false);
    }
    if let Some(target_desc) = target.__get_own_property__(key, context)? {
        if !target_desc.expect_configurable() {
            return Err(JsNativeError::typ()
                .with_message("proxy deleted a non-configurable property")
                .into());
        }
        if !target.__is_extensible__(context)? {
            return Err(JsNativeError::typ()
                .with_message("proxy deleted a property of a non-extensible target")
                .into());
        }
    }
    Ok(true)
}

/// `[[OwnPropertyKeys]] ( )`
fn proxy_own_property_keys(obj: &JsObject, context: &mut Context) -> JsResult<Vec<PropertyKey>> {
    let (target, handler) = proxy_data(obj)?;
    let Some(trap) = trap(&handler, "ownKeys", context)? else {
        return target.__own_property_keys__(context);
    };
    let result = trap.call(&handler.clone().into(), &[target.clone().into()], context)?;
    let Some(list) = result.as_object() else {
        return Err(JsNativeError::typ()
            .with_message("proxy ownKeys must return an array of keys")
            .into());
    };

    // CreateListFromArrayLike, strings and symbols only, no duplicates.
    let len = list
        .get(PropertyKey::from("length"), context)?
        .to_length(context)?;
    let mut keys = Vec::with_capacity(len as usize);
    let mut seen = FxHashSet::default();
    for i in 0..len {
        let element = list.get(PropertyKey::Index(i as u32), context)?;
        let key = match &element {
            JsValue::String(string) => PropertyKey::from(string.clone()),
            JsValue::Symbol(symbol) => PropertyKey::Symbol(symbol.clone()),
            _ => {
                return Err(JsNativeError::typ()
                    .with_message("proxy ownKeys returned a non-key value")
                    .into())
            }
        };
        if !seen.insert(key.clone()) {
            return Err(JsNativeError::typ()
                .with_message("proxy ownKeys returned a duplicate key")
                .into());
        }
        keys.push(key);
    }

    // Invariant: every non-configurable target key must be present.
    for target_key in target.__own_property_keys__(context)? {
        if let Some(desc) = target.__get_own_property__(&target_key, context)? {
            if !desc.expect_configurable() && !keys.contains(&target_key) {
                return Err(JsNativeError::typ()
                    .with_message("proxy ownKeys omitted a non-configurable key")
                    .into());
            }
        }
    }
    Ok(keys)
}

/// `[[Call]] ( thisArgument, argumentsList )`
fn proxy_call(
    obj: &JsObject,
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let (target, handler) = proxy_data(obj)?;
    let Some(trap) = trap(&handler, "apply", context)? else {
        return target.call(this, args, context);
    };
    let args_array = crate::builtins::array::create_array_from_list(args.to_vec(), context);
    trap.call(
        &handler.clone().into(),
        &[target.clone().into(), this.clone(), args_array.into()],
        context,
    )
}

/// `[[Construct]] ( argumentsList, newTarget )`
fn proxy_construct(
    obj: &JsObject,
    args: &[JsValue],
    new_target: &JsObject,
    context: &mut Context,
) -> JsResult<JsObject> {
    let (target, handler) = proxy_data(obj)?;
    let Some(trap) = trap(&handler, "construct", context)? else {
        return target.construct(args, Some(new_target), context);
    };
    let args_array = crate::builtins::array::create_array_from_list(args.to_vec(), context);
    let result = trap.call(
        &handler.clone().into(),
        &[
            target.clone().into(),
            args_array.into(),
            new_target.clone().into(),
        ],
        context,
    )?;
    match result {
        JsValue::Object(object) => Ok(object),
        _ => Err(JsNativeError::typ()
            .with_message("proxy construct must return an object")
            .into()),
    }
}
