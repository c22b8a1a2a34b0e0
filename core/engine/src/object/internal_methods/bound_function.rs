//! Bound function exotic objects.
//!
//! More information:
//!  - [ECMAScript reference][spec]
//!
//! [spec]: https://tc39.es/ecma262/#sec-bound-function-exotic-objects

use super::{InternalObjectMethods, ORDINARY_INTERNAL_METHODS};
use crate::context::Context;
use crate::object::{JsObject, ObjectKind};
use crate::value::JsValue;
use crate::JsResult;

/// The vtable of non-constructor bound functions.
pub(crate) static BOUND_FUNCTION_INTERNAL_METHODS: InternalObjectMethods =
    InternalObjectMethods {
        __call__: Some(bound_function_exotic_call),
        ..ORDINARY_INTERNAL_METHODS
    };

/// The vtable of constructable bound functions.
pub(crate) static BOUND_CONSTRUCTOR_INTERNAL_METHODS: InternalObjectMethods =
    InternalObjectMethods {
        __call__: Some(bound_function_exotic_call),
        __construct__: Some(bound_function_exotic_construct),
        ..ORDINARY_INTERNAL_METHODS
    };

fn bound_data(obj: &JsObject) -> (JsObject, JsValue, Vec<JsValue>) {
    let object = obj.borrow();
    let ObjectKind::BoundFunction(bound) = &object.data.kind else {
        unreachable!("bound function vtable installed on a non-bound object");
    };
    (bound.target.clone(), bound.this.clone(), bound.args.clone())
}

/// `[[Call]] ( thisArgument, argumentsList )`
fn bound_function_exotic_call(
    obj: &JsObject,
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    // 1..4. Call the target with the bound this and the bound arguments
    // prepended.
    let (target, bound_this, mut bound_args) = bound_data(obj);
    bound_args.extend_from_slice(args);
    target.call(&bound_this, &bound_args, context)
}

/// `[[Construct]] ( argumentsList, newTarget )`
fn bound_function_exotic_construct(
    obj: &JsObject,
    args: &[JsValue],
    new_target: &JsObject,
    context: &mut Context,
) -> JsResult<JsObject> {
    let (target, _, mut bound_args) = bound_data(obj);
    bound_args.extend_from_slice(args);

    // 5. If SameValue(F, newTarget), set newTarget to target.
    let new_target = if JsObject::equals(obj, new_target) {
        target.clone()
    } else {
        new_target.clone()
    };

    target.construct(&bound_args, Some(&new_target), context)
}
