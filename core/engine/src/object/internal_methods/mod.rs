//! The meta-object protocol: eleven internal methods every object responds
//! to, plus optional `[[Call]]`/`[[Construct]]`.
//!
//! Ordinary objects use the implementations in this module; exotic kinds
//! override a subset in their own modules and fall back to these for the
//! rest. The vtables are static so that dispatch is a single indirect call.
//!
//! More information:
//!  - [ECMAScript reference][spec]
//!
//! [spec]: https://tc39.es/ecma262/#sec-ordinary-object-internal-methods-and-internal-slots

pub(crate) mod arguments;
pub(crate) mod array;
pub(crate) mod bound_function;
pub(crate) mod function;
pub(crate) mod integer_indexed;
pub(crate) mod module_namespace;
pub(crate) mod proxy;
pub(crate) mod string;

use crate::context::Context;
use crate::object::{JsObject, JsPrototype};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::value::JsValue;
use crate::JsResult;

/// The static vtable of internal methods for one object kind.
#[derive(Clone, Copy)]
#[allow(missing_docs)]
pub struct InternalObjectMethods {
    pub(crate) __get_prototype_of__: fn(&JsObject, &mut Context) -> JsResult<JsPrototype>,
    pub(crate) __set_prototype_of__: fn(&JsObject, JsPrototype, &mut Context) -> JsResult<bool>,
    pub(crate) __is_extensible__: fn(&JsObject, &mut Context) -> JsResult<bool>,
    pub(crate) __prevent_extensions__: fn(&JsObject, &mut Context) -> JsResult<bool>,
    pub(crate) __get_own_property__:
        fn(&JsObject, &PropertyKey, &mut Context) -> JsResult<Option<PropertyDescriptor>>,
    pub(crate) __define_own_property__:
        fn(&JsObject, &PropertyKey, PropertyDescriptor, &mut Context) -> JsResult<bool>,
    pub(crate) __has_property__: fn(&JsObject, &PropertyKey, &mut Context) -> JsResult<bool>,
    pub(crate) __get__: fn(&JsObject, &PropertyKey, &JsValue, &mut Context) -> JsResult<JsValue>,
    pub(crate) __set__:
        fn(&JsObject, PropertyKey, JsValue, JsValue, &mut Context) -> JsResult<bool>,
    pub(crate) __delete__: fn(&JsObject, &PropertyKey, &mut Context) -> JsResult<bool>,
    pub(crate) __own_property_keys__: fn(&JsObject, &mut Context) -> JsResult<Vec<PropertyKey>>,
    pub(crate) __call__:
        Option<fn(&JsObject, &JsValue, &[JsValue], &mut Context) -> JsResult<JsValue>>,
    pub(crate) __construct__:
        Option<fn(&JsObject, &[JsValue], &JsObject, &mut Context) -> JsResult<JsObject>>,
}

impl std::fmt::Debug for InternalObjectMethods {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalObjectMethods").finish_non_exhaustive()
    }
}

/// The vtable of ordinary objects.
pub(crate) static ORDINARY_INTERNAL_METHODS: InternalObjectMethods = InternalObjectMethods {
    __get_prototype_of__: ordinary_get_prototype_of,
    __set_prototype_of__: ordinary_set_prototype_of,
    __is_extensible__: ordinary_is_extensible,
    __prevent_extensions__: ordinary_prevent_extensions,
    __get_own_property__: ordinary_get_own_property,
    __define_own_property__: ordinary_define_own_property,
    __has_property__: ordinary_has_property,
    __get__: ordinary_get,
    __set__: ordinary_set,
    __delete__: ordinary_delete,
    __own_property_keys__: ordinary_own_property_keys,
    __call__: None,
    __construct__: None,
};

impl JsObject {
    /// `[[GetPrototypeOf]]`
    pub fn __get_prototype_of__(&self, context: &mut Context) -> JsResult<JsPrototype> {
        let f = self.borrow().data.internal_methods.__get_prototype_of__;
        f(self, context)
    }

    /// `[[SetPrototypeOf]]`
    pub fn __set_prototype_of__(
        &self,
        prototype: JsPrototype,
        context: &mut Context,
    ) -> JsResult<bool> {
        let f = self.borrow().data.internal_methods.__set_prototype_of__;
        f(self, prototype, context)
    }

    /// `[[IsExtensible]]`
    pub fn __is_extensible__(&self, context: &mut Context) -> JsResult<bool> {
        let f = self.borrow().data.internal_methods.__is_extensible__;
        f(self, context)
    }

    /// `[[PreventExtensions]]`
    pub fn __prevent_extensions__(&self, context: &mut Context) -> JsResult<bool> {
        let f = self.borrow().data.internal_methods.__prevent_extensions__;
        f(self, context)
    }

    /// `[[GetOwnProperty]]`
    pub fn __get_own_property__(
        &self,
        key: &PropertyKey,
        context: &mut Context,
    ) -> JsResult<Option<PropertyDescriptor>> {
        let f = self.borrow().data.internal_methods.__get_own_property__;
        f(self, key, context)
    }

    /// `[[DefineOwnProperty]]`
    pub fn __define_own_property__(
        &self,
        key: &PropertyKey,
        desc: PropertyDescriptor,
        context: &mut Context,
    ) -> JsResult<bool> {
        let f = self.borrow().data.internal_methods.__define_own_property__;
        f(self, key, desc, context)
    }

    /// `[[HasProperty]]`
    pub fn __has_property__(&self, key: &PropertyKey, context: &mut Context) -> JsResult<bool> {
        let f = self.borrow().data.internal_methods.__has_property__;
        f(self, key, context)
    }

    /// `[[Get]]`
    pub fn __get__(
        &self,
        key: &PropertyKey,
        receiver: &JsValue,
        context: &mut Context,
    ) -> JsResult<JsValue> {
        let f = self.borrow().data.internal_methods.__get__;
        f(self, key, receiver, context)
    }

    /// `[[Set]]`
    pub fn __set__(
        &self,
        key: PropertyKey,
        value: JsValue,
        receiver: JsValue,
        context: &mut Context,
    ) -> JsResult<bool> {
        let f = self.borrow().data.internal_methods.__set__;
        f(self, key, value, receiver, context)
    }

    /// `[[Delete]]`
    pub fn __delete__(&self, key: &PropertyKey, context: &mut Context) -> JsResult<bool> {
        let f = self.borrow().data.internal_methods.__delete__;
        f(self, key, context)
    }

    /// `[[OwnPropertyKeys]]`
    pub fn __own_property_keys__(&self, context: &mut Context) -> JsResult<Vec<PropertyKey>> {
        let f = self.borrow().data.internal_methods.__own_property_keys__;
        f(self, context)
    }

    /// `[[Call]]`, if present.
    pub(crate) fn __call__(
        &self,
        this: &JsValue,
        args: &[JsValue],
        context: &mut Context,
    ) -> JsResult<JsValue> {
        let f = self.borrow().data.internal_methods.__call__;
        match f {
            Some(call) => call(self, this, args, context),
            None => Err(crate::error::JsNativeError::typ()
                .with_message("not a callable function")
                .into()),
        }
    }

    /// `[[Construct]]`, if present.
    pub(crate) fn __construct__(
        &self,
        args: &[JsValue],
        new_target: &JsObject,
        context: &mut Context,
    ) -> JsResult<JsObject> {
        let f = self.borrow().data.internal_methods.__construct__;
        match f {
            Some(construct) => construct(self, args, new_target, context),
            None => Err(crate::error::JsNativeError::typ()
                .with_message("not a constructor")
                .into()),
        }
    }
}

/// `OrdinaryGetPrototypeOf ( O )`
pub(crate) fn ordinary_get_prototype_of(
    obj: &JsObject,
    _context: &mut Context,
) -> JsResult<JsPrototype> {
    Ok(obj.borrow().prototype().clone())
}

/// `OrdinarySetPrototypeOf ( O, V )`
pub(crate) fn ordinary_set_prototype_of(
    obj: &JsObject,
    prototype: JsPrototype,
    _context: &mut Context,
) -> JsResult<bool> {
    // 1. Let current be O.[[Prototype]].
    let current = obj.borrow().prototype().clone();

    // 2. If SameValue(V, current) is true, return true.
    if match (&prototype, &current) {
        (Some(a), Some(b)) => JsObject::equals(a, b),
        (None, None) => true,
        _ => false,
    } {
        return Ok(true);
    }

    // 3. If O.[[Extensible]] is false, return false.
    if !obj.borrow().extensible() {
        return Ok(false);
    }

    // 4..7. Walk the new prototype chain; a cycle through O is refused.
    // The loop stops early at any exotic prototype whose [[GetPrototypeOf]]
    // is not the ordinary one.
    let mut p = prototype.clone();
    while let Some(proto) = p {
        if JsObject::equals(&proto, obj) {
            return Ok(false);
        }
        let ordinary: fn(&JsObject, &mut Context) -> JsResult<JsPrototype> =
            ordinary_get_prototype_of;
        if proto.borrow().data.internal_methods.__get_prototype_of__ != ordinary {
            break;
        }
        p = proto.borrow().prototype().clone();
    }

    // 8. Set O.[[Prototype]] to V.
    obj.borrow_mut().set_prototype(prototype);
    Ok(true)
}

/// `OrdinaryIsExtensible ( O )`
pub(crate) fn ordinary_is_extensible(obj: &JsObject, _context: &mut Context) -> JsResult<bool> {
    Ok(obj.borrow().extensible())
}

/// `OrdinaryPreventExtensions ( O )`
pub(crate) fn ordinary_prevent_extensions(
    obj: &JsObject,
    _context: &mut Context,
) -> JsResult<bool> {
    obj.borrow_mut().set_extensible(false);
    Ok(true)
}

/// `OrdinaryGetOwnProperty ( O, P )`
pub(crate) fn ordinary_get_own_property(
    obj: &JsObject,
    key: &PropertyKey,
    _context: &mut Context,
) -> JsResult<Option<PropertyDescriptor>> {
    Ok(obj.borrow().properties().get(key).cloned())
}

/// `OrdinaryDefineOwnProperty ( O, P, Desc )`
pub(crate) fn ordinary_define_own_property(
    obj: &JsObject,
    key: &PropertyKey,
    desc: PropertyDescriptor,
    context: &mut Context,
) -> JsResult<bool> {
    // 1. Let current be ? O.[[GetOwnProperty]](P).
    let current = obj.__get_own_property__(key, context)?;

    // 2. Let extensible be ? IsExtensible(O).
    let extensible = obj.__is_extensible__(context)?;

    // 3. Return ValidateAndApplyPropertyDescriptor(O, P, extensible, Desc, current).
    Ok(validate_and_apply_property_descriptor(
        Some((obj, key)),
        extensible,
        desc,
        current,
    ))
}

/// `ValidateAndApplyPropertyDescriptor ( O, P, extensible, Desc, current )`
///
/// When `obj_and_key` is `None` the descriptor is only validated.
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-validateandapplypropertydescriptor
pub(crate) fn validate_and_apply_property_descriptor(
    obj_and_key: Option<(&JsObject, &PropertyKey)>,
    extensible: bool,
    desc: PropertyDescriptor,
    current: Option<PropertyDescriptor>,
) -> bool {
    let Some(current) = current else {
        // 2. If current is undefined:
        //    a. If extensible is false, return false.
        if !extensible {
            return false;
        }
        //    c. If O is not undefined, create the property.
        if let Some((obj, key)) = obj_and_key {
            obj.borrow_mut()
                .properties_mut()
                .insert(key, desc.complete());
        }
        return true;
    };

    // 3. Assert: current is a fully populated descriptor.
    // 4. If every field of Desc is absent, return true.
    if desc.is_generic_descriptor() && desc.enumerable().is_none() && desc.configurable().is_none()
    {
        return true;
    }

    // 5. If current.[[Configurable]] is false:
    if !current.expect_configurable() {
        // a. Desc cannot flip [[Configurable]].
        if desc.configurable() == Some(true) {
            return false;
        }
        // b. Desc cannot change [[Enumerable]].
        if let Some(enumerable) = desc.enumerable() {
            if enumerable != current.expect_enumerable() {
                return false;
            }
        }
        // c. Desc cannot switch between data and accessor.
        if !desc.is_generic_descriptor()
            && desc.is_accessor_descriptor() != current.is_accessor_descriptor()
        {
            return false;
        }
        if current.is_accessor_descriptor() {
            // d. Accessor halves cannot change.
            if let Some(get) = desc.get() {
                if !same_value_opt(Some(get), current.get()) {
                    return false;
                }
            }
            if let Some(set) = desc.set() {
                if !same_value_opt(Some(set), current.set()) {
                    return false;
                }
            }
        } else if !current.expect_writable() {
            // e. A non-writable data property cannot change value or become
            // writable.
            if desc.writable() == Some(true) {
                return false;
            }
            if let Some(value) = desc.value() {
                if !same_value_opt(Some(value), current.value()) {
                    return false;
                }
            }
        }
    }

    // 6. If O is not undefined, apply Desc over current.
    if let Some((obj, key)) = obj_and_key {
        let mut new = if !desc.is_generic_descriptor()
            && desc.is_accessor_descriptor() != current.is_accessor_descriptor()
        {
            // Switching between data and accessor keeps only the shared
            // attributes.
            let mut base = PropertyDescriptor::builder()
                .enumerable(current.expect_enumerable())
                .configurable(current.expect_configurable())
                .build();
            base.fill_with(&desc);
            base.complete()
        } else {
            let mut base = current;
            base.fill_with(&desc);
            base
        };
        new = new.complete();
        obj.borrow_mut().properties_mut().insert(key, new);
    }

    true
}

fn same_value_opt(a: Option<&JsValue>, b: Option<&JsValue>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_value(b),
        (None, None) => true,
        _ => false,
    }
}

/// `OrdinaryHasProperty ( O, P )`
pub(crate) fn ordinary_has_property(
    obj: &JsObject,
    key: &PropertyKey,
    context: &mut Context,
) -> JsResult<bool> {
    // 1. Has own?
    if obj.__get_own_property__(key, context)?.is_some() {
        return Ok(true);
    }
    // 2. Else ask the prototype.
    let parent = obj.__get_prototype_of__(context)?;
    match parent {
        Some(parent) => parent.__has_property__(key, context),
        None => Ok(false),
    }
}

/// `OrdinaryGet ( O, P, Receiver )`
pub(crate) fn ordinary_get(
    obj: &JsObject,
    key: &PropertyKey,
    receiver: &JsValue,
    context: &mut Context,
) -> JsResult<JsValue> {
    // 1. Let desc be ? O.[[GetOwnProperty]](P).
    match obj.__get_own_property__(key, context)? {
        // 2. If desc is undefined, follow the prototype chain.
        None => {
            let parent = obj.__get_prototype_of__(context)?;
            match parent {
                Some(parent) => parent.__get__(key, receiver, context),
                None => Ok(JsValue::undefined()),
            }
        }
        Some(desc) => {
            if desc.is_data_descriptor() {
                // 3. Return desc.[[Value]].
                return Ok(desc.expect_value());
            }
            // 4..7. Accessor: call the getter with the receiver.
            match desc.get() {
                Some(JsValue::Object(getter)) => getter.clone().call(receiver, &[], context),
                _ => Ok(JsValue::undefined()),
            }
        }
    }
}

/// `OrdinarySetWithOwnDescriptor ( O, P, V, Receiver, ownDesc )`
pub(crate) fn ordinary_set(
    obj: &JsObject,
    key: PropertyKey,
    value: JsValue,
    receiver: JsValue,
    context: &mut Context,
) -> JsResult<bool> {
    // 1. Let ownDesc be ? O.[[GetOwnProperty]](P), walking the chain when
    // absent.
    let own_desc = match obj.__get_own_property__(&key, context)? {
        Some(desc) => desc,
        None => {
            let parent = obj.__get_prototype_of__(context)?;
            if let Some(parent) = parent {
                return parent.__set__(key, value, receiver, context);
            }
            PropertyDescriptor::builder()
                .value(JsValue::undefined())
                .writable(true)
                .enumerable(true)
                .configurable(true)
                .build()
        }
    };

    if own_desc.is_data_descriptor() {
        // 2.a. Writability gate.
        if !own_desc.expect_writable() {
            return Ok(false);
        }
        // 2.b. Receiver must be an object.
        let Some(receiver_obj) = receiver.as_object().cloned() else {
            return Ok(false);
        };
        // 2.c..e. Define on the receiver.
        let existing = receiver_obj.__get_own_property__(&key, context)?;
        match existing {
            Some(existing) => {
                if existing.is_accessor_descriptor() {
                    return Ok(false);
                }
                if !existing.expect_writable() {
                    return Ok(false);
                }
                receiver_obj.__define_own_property__(
                    &key,
                    PropertyDescriptor::builder().value(value).build(),
                    context,
                )
            }
            None => {
                // CreateDataProperty(Receiver, P, V).
                receiver_obj.__define_own_property__(
                    &key,
                    PropertyDescriptor::builder()
                        .value(value)
                        .writable(true)
                        .enumerable(true)
                        .configurable(true)
                        .build(),
                    context,
                )
            }
        }
    } else {
        // 3..7. Accessor: call the setter with the receiver.
        match own_desc.set() {
            Some(JsValue::Object(setter)) => {
                setter.clone().call(&receiver, &[value], context)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// `OrdinaryDelete ( O, P )`
pub(crate) fn ordinary_delete(
    obj: &JsObject,
    key: &PropertyKey,
    context: &mut Context,
) -> JsResult<bool> {
    Ok(match obj.__get_own_property__(key, context)? {
        None => true,
        Some(desc) if desc.expect_configurable() => {
            obj.borrow_mut().properties_mut().remove(key);
            true
        }
        Some(_) => false,
    })
}

/// `OrdinaryOwnPropertyKeys ( O )`
pub(crate) fn ordinary_own_property_keys(
    obj: &JsObject,
    _context: &mut Context,
) -> JsResult<Vec<PropertyKey>> {
    Ok(obj.borrow().properties().keys())
}
