//! The `Proxy` constructor.

use crate::context::Context;
use crate::error::JsNativeError;
use crate::object::{JsObject, ObjectData, Proxy};
use crate::value::JsValue;
use crate::JsResult;

/// `Proxy ( target, handler )`
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-proxy-target-handler
fn proxy_constructor(
    _new_target: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let (Some(target), Some(handler)) = (
        args.first().and_then(JsValue::as_object).cloned(),
        args.get(1).and_then(JsValue::as_object).cloned(),
    ) else {
        return Err(JsNativeError::typ()
            .with_message("Proxy target and handler must be objects")
            .into());
    };
    let proxy = Proxy {
        call: target.is_callable(),
        construct: target.is_constructor(),
        target: Some(target),
        handler: Some(handler),
    };
    Ok(JsObject::from_proto_and_data(None, ObjectData::proxy(proxy), context).into())
}

/// Wires `Proxy` into the realm.
pub(crate) fn init(context: &mut Context) {
    let constructor = crate::builtins::function::native_constructor(
        proxy_constructor,
        "Proxy",
        2,
        context,
    );
    super::define_global("Proxy", constructor, context);
}
