//! The `Array` built-in: creation, the exotic length behavior's public
//! face, and the array iterator that `for..of` and spread rely on.

use kestrel_gc::{custom_trace, Finalize, Trace};

use super::BuiltInBuilder;
use crate::builtins::iterable::create_iter_result_object;
use crate::context::Context;
use crate::error::JsNativeError;
use crate::object::{JsObject, ObjectData, ObjectKind};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::symbol::JsSymbol;
use crate::value::JsValue;
use crate::JsResult;

/// The state of an array iterator.
#[derive(Debug, Clone)]
pub struct ArrayIterator {
    array: JsObject,
    next_index: u64,
    done: bool,
}

impl Finalize for ArrayIterator {}

// SAFETY: the iterated array is the edge.
unsafe impl Trace for ArrayIterator {
    custom_trace!(this, mark, {
        mark(&this.array);
    });
}

/// `ArrayCreate ( length )`
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-arraycreate
pub fn array_create(length: u64, context: &mut Context) -> JsResult<JsObject> {
    if length > u64::from(u32::MAX) {
        return Err(JsNativeError::range()
            .with_message("invalid array length")
            .into());
    }
    let proto = context.intrinsics().array_prototype();
    let array = JsObject::from_proto_and_data(Some(proto), ObjectData::array(), context);
    array.borrow_mut().properties_mut().insert(
        &PropertyKey::from("length"),
        PropertyDescriptor::builder()
            .value(JsValue::from(length as u32))
            .writable(true)
            .enumerable(false)
            .configurable(false)
            .build(),
    );
    Ok(array)
}

/// `CreateArrayFromList ( elements )`
pub fn create_array_from_list(elements: Vec<JsValue>, context: &mut Context) -> JsObject {
    let array = array_create(elements.len() as u64, context)
        .expect("list length always fits an array");
    {
        let mut borrow = array.borrow_mut();
        let properties = borrow.properties_mut();
        for (i, value) in elements.into_iter().enumerate() {
            properties.insert(
                &PropertyKey::Index(i as u32),
                PropertyDescriptor::builder()
                    .value(value)
                    .writable(true)
                    .enumerable(true)
                    .configurable(true)
                    .build(),
            );
        }
    }
    array
}

/// `Array ( ...values )`, covering both call and construct.
fn array_constructor(
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    match args {
        [JsValue::Integer(len)] if *len >= 0 => {
            Ok(array_create(*len as u64, context)?.into())
        }
        [JsValue::Integer(_) | JsValue::Rational(_)] => Err(JsNativeError::range()
            .with_message("invalid array length")
            .into()),
        _ => Ok(create_array_from_list(args.to_vec(), context).into()),
    }
}

/// `Array.prototype.push ( ...items )`
fn array_prototype_push(
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let obj = this.to_object(context)?;
    let mut len = obj.length_of_array_like(context)?;
    for item in args {
        obj.set(PropertyKey::Index(len as u32), item.clone(), true, context)?;
        len += 1;
    }
    obj.set("length", JsValue::from(len as u32), true, context)?;
    Ok(JsValue::from(len as u32))
}

/// `Array.prototype.values ( )`
fn array_prototype_values(
    this: &JsValue,
    _args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let array = this.to_object(context)?;
    let proto = context.intrinsics().array_iterator_prototype.clone();
    let iterator = JsObject::from_proto_and_data(
        Some(proto),
        ObjectData::array_iterator(ArrayIterator {
            array,
            next_index: 0,
            done: false,
        }),
        context,
    );
    Ok(iterator.into())
}

/// `%ArrayIteratorPrototype%.next ( )`
fn array_iterator_next(
    this: &JsValue,
    _args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let (array, index, done) = {
        let Some(object) = this.as_object() else {
            return Err(JsNativeError::typ()
                .with_message("array iterator next called on a non-object")
                .into());
        };
        let object = object.borrow();
        let ObjectKind::ArrayIterator(iterator) = &object.data.kind else {
            return Err(JsNativeError::typ()
                .with_message("array iterator next called on the wrong object")
                .into());
        };
        (iterator.array.clone(), iterator.next_index, iterator.done)
    };
    if done {
        return Ok(create_iter_result_object(JsValue::undefined(), true, context));
    }
    let len = array.length_of_array_like(context)?;
    if index >= len {
        if let Some(object) = this.as_object() {
            if let ObjectKind::ArrayIterator(iterator) = &mut object.borrow_mut().data.kind {
                iterator.done = true;
            }
        }
        return Ok(create_iter_result_object(JsValue::undefined(), true, context));
    }
    let value = array.get(PropertyKey::Index(index as u32), context)?;
    if let Some(object) = this.as_object() {
        if let ObjectKind::ArrayIterator(iterator) = &mut object.borrow_mut().data.kind {
            iterator.next_index = index + 1;
        }
    }
    Ok(create_iter_result_object(value, false, context))
}

/// The `Array.prototype.values` function object, shared with arguments
/// objects.
pub(crate) fn values_intrinsic(context: &mut Context) -> JsValue {
    let proto = context.intrinsics().array_prototype();
    let borrow = proto.borrow();
    borrow
        .properties()
        .get(&PropertyKey::from("values"))
        .map(PropertyDescriptor::expect_value)
        .unwrap_or_default()
}

/// Wires `Array`, `Array.prototype` and the array iterator into the realm.
pub(crate) fn init(context: &mut Context) {
    let array_prototype = context.intrinsics().array_prototype();
    BuiltInBuilder::new(&array_prototype, context)
        .method(array_prototype_push, "push", 1)
        .method(array_prototype_values, "values", 0);

    // @@iterator is the same function object as `values`.
    let values = values_intrinsic(context);
    array_prototype.borrow_mut().properties_mut().insert(
        &PropertyKey::Symbol(JsSymbol::iterator()),
        PropertyDescriptor::builder()
            .value(values)
            .writable(true)
            .enumerable(false)
            .configurable(true)
            .build(),
    );

    let iterator_prototype = context.intrinsics().array_iterator_prototype.clone();
    BuiltInBuilder::new(&iterator_prototype, context).method(array_iterator_next, "next", 0);

    // Replace the placeholder constructor with a real native function
    // carrying the prototype link.
    let constructor =
        crate::builtins::function::native_constructor(array_constructor_adapter, "Array", 1, context);
    constructor.borrow_mut().properties_mut().insert(
        &PropertyKey::from("prototype"),
        PropertyDescriptor::builder()
            .value(array_prototype.clone())
            .writable(false)
            .enumerable(false)
            .configurable(false)
            .build(),
    );
    array_prototype.borrow_mut().properties_mut().insert(
        &PropertyKey::from("constructor"),
        PropertyDescriptor::builder()
            .value(constructor.clone())
            .writable(true)
            .enumerable(false)
            .configurable(true)
            .build(),
    );
    super::define_global("Array", constructor, context);
}

fn array_constructor_adapter(
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    array_constructor(this, args, context)
}
