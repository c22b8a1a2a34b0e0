//! Function objects: `[[Call]]` and `[[Construct]]` over the ordinary
//! object behavior. The actual calling machinery lives with the function
//! builtin, next to the interpreter entry points.

use super::{InternalObjectMethods, ORDINARY_INTERNAL_METHODS};
use crate::builtins::function;
use crate::context::Context;
use crate::object::JsObject;
use crate::value::JsValue;
use crate::JsResult;

/// The vtable of callable, non-constructor functions.
pub(crate) static FUNCTION_INTERNAL_METHODS: InternalObjectMethods = InternalObjectMethods {
    __call__: Some(function_call),
    ..ORDINARY_INTERNAL_METHODS
};

/// The vtable of constructors.
pub(crate) static CONSTRUCTOR_INTERNAL_METHODS: InternalObjectMethods = InternalObjectMethods {
    __call__: Some(function_call),
    __construct__: Some(function_construct),
    ..ORDINARY_INTERNAL_METHODS
};

fn function_call(
    obj: &JsObject,
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    function::call_function(obj, this, args, context)
}

fn function_construct(
    obj: &JsObject,
    args: &[JsValue],
    new_target: &JsObject,
    context: &mut Context,
) -> JsResult<JsObject> {
    function::construct_function(obj, args, new_target, context)
}
