//! Abstract operations on objects: the convenience layer over the
//! meta-object protocol that the interpreter and builtins share.
//!
//! More information:
//!  - [ECMAScript reference][spec]
//!
//! [spec]: https://tc39.es/ecma262/#sec-operations-on-objects

use crate::context::Context;
use crate::error::JsNativeError;
use crate::object::JsObject;
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::value::JsValue;
use crate::JsResult;

impl JsObject {
    /// `Get ( O, P )`
    pub fn get<K: Into<PropertyKey>>(&self, key: K, context: &mut Context) -> JsResult<JsValue> {
        let key = key.into();
        self.__get__(&key, &self.clone().into(), context)
    }

    /// `Set ( O, P, V, Throw )`
    pub fn set<K: Into<PropertyKey>, V: Into<JsValue>>(
        &self,
        key: K,
        value: V,
        throw: bool,
        context: &mut Context,
    ) -> JsResult<bool> {
        let key = key.into();
        let success = self.__set__(key.clone(), value.into(), self.clone().into(), context)?;
        if !success && throw {
            return Err(JsNativeError::typ()
                .with_message(format!("cannot set property '{key}'"))
                .into());
        }
        Ok(success)
    }

    /// `HasProperty ( O, P )`
    pub fn has_property<K: Into<PropertyKey>>(
        &self,
        key: K,
        context: &mut Context,
    ) -> JsResult<bool> {
        self.__has_property__(&key.into(), context)
    }

    /// `CreateDataProperty ( O, P, V )`
    pub fn create_data_property<K: Into<PropertyKey>, V: Into<JsValue>>(
        &self,
        key: K,
        value: V,
        context: &mut Context,
    ) -> JsResult<bool> {
        let desc = PropertyDescriptor::builder()
            .value(value.into())
            .writable(true)
            .enumerable(true)
            .configurable(true)
            .build();
        self.__define_own_property__(&key.into(), desc, context)
    }

    /// `CreateDataPropertyOrThrow ( O, P, V )`
    pub fn create_data_property_or_throw<K: Into<PropertyKey>, V: Into<JsValue>>(
        &self,
        key: K,
        value: V,
        context: &mut Context,
    ) -> JsResult<()> {
        let key = key.into();
        if !self.create_data_property(key.clone(), value, context)? {
            return Err(JsNativeError::typ()
                .with_message(format!("cannot define property '{key}'"))
                .into());
        }
        Ok(())
    }

    /// `DefinePropertyOrThrow ( O, P, desc )`
    pub fn define_property_or_throw<K: Into<PropertyKey>>(
        &self,
        key: K,
        desc: PropertyDescriptor,
        context: &mut Context,
    ) -> JsResult<()> {
        let key = key.into();
        if !self.__define_own_property__(&key, desc, context)? {
            return Err(JsNativeError::typ()
                .with_message(format!("cannot define property '{key}'"))
                .into());
        }
        Ok(())
    }

    /// `DeletePropertyOrThrow ( O, P )`
    pub fn delete_property_or_throw<K: Into<PropertyKey>>(
        &self,
        key: K,
        context: &mut Context,
    ) -> JsResult<()> {
        let key = key.into();
        if !self.__delete__(&key, context)? {
            return Err(JsNativeError::typ()
                .with_message(format!("cannot delete property '{key}'"))
                .into());
        }
        Ok(())
    }

    /// `GetMethod ( V, P )`: `undefined`/`null` methods read as absent.
    pub fn get_method<K: Into<PropertyKey>>(
        &self,
        key: K,
        context: &mut Context,
    ) -> JsResult<Option<JsObject>> {
        let func = self.get(key, context)?;
        if func.is_null_or_undefined() {
            return Ok(None);
        }
        match func.as_callable() {
            Some(callable) => Ok(Some(callable.clone())),
            None => Err(JsNativeError::typ()
                .with_message("method value is not callable")
                .into()),
        }
    }

    /// `Call ( F, V, argumentsList )`
    pub fn call(&self, this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        self.__call__(this, args, context)
    }

    /// `Construct ( F, argumentsList, newTarget )`
    ///
    /// `new_target` defaults to the constructor itself.
    pub fn construct(
        &self,
        args: &[JsValue],
        new_target: Option<&JsObject>,
        context: &mut Context,
    ) -> JsResult<JsObject> {
        let new_target = new_target.unwrap_or(self).clone();
        self.__construct__(args, &new_target, context)
    }

    /// `OrdinaryHasInstance ( C, O )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-ordinaryhasinstance
    pub fn ordinary_has_instance(
        self,
        value: &JsValue,
        context: &mut Context,
    ) -> JsResult<bool> {
        // 2. Bound functions delegate to their target.
        if let crate::object::ObjectKind::BoundFunction(bound) = &self.borrow().data.kind {
            let target = bound.target.clone();
            return value.instance_of(&target.into(), context);
        }

        // 3. Non-objects are never instances.
        let Some(mut object) = value.as_object().cloned() else {
            return Ok(false);
        };

        // 4. Let P be ? Get(C, "prototype").
        let prototype = self.get("prototype", context)?;
        let Some(prototype) = prototype.as_object() else {
            return Err(JsNativeError::typ()
                .with_message("constructor prototype is not an object")
                .into());
        };

        // 5. Walk O's prototype chain looking for P.
        loop {
            match object.__get_prototype_of__(context)? {
                None => return Ok(false),
                Some(proto) => {
                    if JsObject::equals(&proto, prototype) {
                        return Ok(true);
                    }
                    object = proto;
                }
            }
        }
    }

    /// `CopyDataProperties ( target, source, excludedItems )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-copydataproperties
    pub fn copy_data_properties(
        &self,
        source: &JsValue,
        excluded_keys: &[PropertyKey],
        context: &mut Context,
    ) -> JsResult<()> {
        // 1. null/undefined sources contribute nothing.
        if source.is_null_or_undefined() {
            return Ok(());
        }
        let from = source.to_object(context)?;
        for key in from.__own_property_keys__(context)? {
            if excluded_keys.contains(&key) {
                continue;
            }
            if let Some(desc) = from.__get_own_property__(&key, context)? {
                if desc.expect_enumerable() {
                    let value = from.get(key.clone(), context)?;
                    self.create_data_property_or_throw(key, value, context)?;
                }
            }
        }
        Ok(())
    }

    /// `LengthOfArrayLike ( obj )`
    pub fn length_of_array_like(&self, context: &mut Context) -> JsResult<u64> {
        self.get("length", context)?.to_length(context)
    }
}

/// `ToPropertyDescriptor ( Obj )`: reads a descriptor bag from an object.
pub(crate) fn to_property_descriptor(
    value: &JsValue,
    context: &mut Context,
) -> JsResult<PropertyDescriptor> {
    let Some(obj) = value.as_object() else {
        return Err(JsNativeError::typ()
            .with_message("property descriptor must be an object")
            .into());
    };
    let mut builder = PropertyDescriptor::builder();
    if obj.has_property("enumerable", context)? {
        builder = builder.enumerable(obj.get("enumerable", context)?.to_boolean());
    }
    if obj.has_property("configurable", context)? {
        builder = builder.configurable(obj.get("configurable", context)?.to_boolean());
    }
    if obj.has_property("value", context)? {
        builder = builder.value(obj.get("value", context)?);
    }
    if obj.has_property("writable", context)? {
        builder = builder.writable(obj.get("writable", context)?.to_boolean());
    }
    if obj.has_property("get", context)? {
        let get = obj.get("get", context)?;
        if !get.is_undefined() && get.as_callable().is_none() {
            return Err(JsNativeError::typ()
                .with_message("getter must be callable")
                .into());
        }
        builder = builder.get(get);
    }
    if obj.has_property("set", context)? {
        let set = obj.get("set", context)?;
        if !set.is_undefined() && set.as_callable().is_none() {
            return Err(JsNativeError::typ()
                .with_message("setter must be callable")
                .into());
        }
        builder = builder.set(set);
    }
    let desc = builder.build();
    if desc.is_data_descriptor() && desc.is_accessor_descriptor() {
        return Err(JsNativeError::typ()
            .with_message("property descriptor cannot be both data and accessor")
            .into());
    }
    Ok(desc)
}

/// `FromPropertyDescriptor ( Desc )`: materializes a descriptor bag.
pub(crate) fn from_property_descriptor(
    desc: &PropertyDescriptor,
    context: &mut Context,
) -> JsObject {
    let obj = JsObject::with_object_proto(context);
    let mut set = |name: &str, value: JsValue| {
        let _ = obj.create_data_property(name, value, context);
    };
    if let Some(value) = desc.value() {
        set("value", value.clone());
    }
    if let Some(writable) = desc.writable() {
        set("writable", writable.into());
    }
    if let Some(get) = desc.get() {
        set("get", get.clone());
    }
    if let Some(s) = desc.set() {
        set("set", s.clone());
    }
    if let Some(enumerable) = desc.enumerable() {
        set("enumerable", enumerable.into());
    }
    if let Some(configurable) = desc.configurable() {
        set("configurable", configurable.into());
    }
    obj
}
