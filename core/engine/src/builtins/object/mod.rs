//! The `Object` built-in.

use super::BuiltInBuilder;
use crate::context::Context;
use crate::error::JsNativeError;
use crate::object::{operations::to_property_descriptor, JsObject};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::value::JsValue;
use crate::JsResult;

/// `Object ( [ value ] )`
fn object_constructor(
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    match args.first() {
        None | Some(JsValue::Undefined | JsValue::Null) => {
            Ok(JsObject::with_object_proto(context).into())
        }
        Some(value) => Ok(value.to_object(context)?.into()),
    }
}

/// `Object.defineProperty ( O, P, Attributes )`
fn object_define_property(
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let Some(obj) = args.first().and_then(JsValue::as_object).cloned() else {
        return Err(JsNativeError::typ()
            .with_message("Object.defineProperty called on a non-object")
            .into());
    };
    let key = args
        .get(1)
        .cloned()
        .unwrap_or_default()
        .to_property_key(context)?;
    let desc = to_property_descriptor(&args.get(2).cloned().unwrap_or_default(), context)?;
    obj.define_property_or_throw(key, desc, context)?;
    Ok(obj.into())
}

/// `Object.keys ( O )`
fn object_keys(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let obj = args.first().cloned().unwrap_or_default().to_object(context)?;
    let mut keys = Vec::new();
    for key in obj.__own_property_keys__(context)? {
        if matches!(key, PropertyKey::Symbol(_)) {
            continue;
        }
        if let Some(desc) = obj.__get_own_property__(&key, context)? {
            if desc.expect_enumerable() {
                keys.push(key.to_value());
            }
        }
    }
    Ok(crate::builtins::array::create_array_from_list(keys, context).into())
}

/// `Object.getPrototypeOf ( O )`
fn object_get_prototype_of(
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let obj = args.first().cloned().unwrap_or_default().to_object(context)?;
    Ok(obj
        .__get_prototype_of__(context)?
        .map_or(JsValue::null(), JsValue::from))
}

/// `Object.prototype.hasOwnProperty ( V )`
fn object_has_own_property(
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let key = args
        .first()
        .cloned()
        .unwrap_or_default()
        .to_property_key(context)?;
    let obj = this.to_object(context)?;
    Ok(obj.__get_own_property__(&key, context)?.is_some().into())
}

/// `Object.prototype.toString ( )`
fn object_to_string(this: &JsValue, _: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    Ok(match this {
        JsValue::Undefined => JsValue::from("[object Undefined]"),
        JsValue::Null => JsValue::from("[object Null]"),
        JsValue::Object(obj) if obj.borrow().is_array() => JsValue::from("[object Array]"),
        JsValue::Object(obj) if obj.is_callable() => JsValue::from("[object Function]"),
        _ => JsValue::from("[object Object]"),
    })
}

/// `Object.prototype.valueOf ( )`
fn object_value_of(this: &JsValue, _: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    Ok(this.to_object(context)?.into())
}

/// Wires `Object` and `Object.prototype` into the realm.
pub(crate) fn init(context: &mut Context) {
    let object_prototype = context.intrinsics().object_prototype();
    BuiltInBuilder::new(&object_prototype, context)
        .method(object_has_own_property, "hasOwnProperty", 1)
        .method(object_to_string, "toString", 0)
        .method(object_value_of, "valueOf", 0);

    let constructor = crate::builtins::function::native_constructor(
        object_constructor,
        "Object",
        1,
        context,
    );
    BuiltInBuilder::new(&constructor, context)
        .method(object_define_property, "defineProperty", 3)
        .method(object_keys, "keys", 1)
        .method(object_get_prototype_of, "getPrototypeOf", 1);
    constructor.borrow_mut().properties_mut().insert(
        &PropertyKey::from("prototype"),
        PropertyDescriptor::builder()
            .value(object_prototype.clone())
            .writable(false)
            .enumerable(false)
            .configurable(false)
            .build(),
    );
    object_prototype.borrow_mut().properties_mut().insert(
        &PropertyKey::from("constructor"),
        PropertyDescriptor::builder()
            .value(constructor.clone())
            .writable(true)
            .enumerable(false)
            .configurable(true)
            .build(),
    );
    super::define_global("Object", constructor, context);
}
