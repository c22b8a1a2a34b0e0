//! The error constructors and prototypes.

use super::BuiltInBuilder;
use crate::context::Context;
use crate::error::JsNativeErrorKind;
use crate::object::{JsObject, ObjectData};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::value::JsValue;
use crate::JsResult;

/// Builds the error object carrying `kind` and `message`, with a stack
/// trace captured from the active context chain.
pub(crate) fn create_error_object(
    kind: JsNativeErrorKind,
    message: &str,
    context: &mut Context,
) -> JsObject {
    let proto = context.intrinsics().error_prototype(kind);
    let object = JsObject::from_proto_and_data(Some(proto), ObjectData::error(kind), context);
    let stack = context.vm.capture_stack_trace(&format!("{kind}: {message}"));
    {
        let mut borrow = object.borrow_mut();
        let properties = borrow.properties_mut();
        properties.insert(
            &PropertyKey::from("message"),
            PropertyDescriptor::builder()
                .value(message)
                .writable(true)
                .enumerable(false)
                .configurable(true)
                .build(),
        );
        properties.insert(
            &PropertyKey::from("stack"),
            PropertyDescriptor::builder()
                .value(stack)
                .writable(true)
                .enumerable(false)
                .configurable(true)
                .build(),
        );
    }
    object
}

fn error_constructor_for(kind: JsNativeErrorKind) -> crate::builtins::function::NativeFunctionPointer {
    // One adapter per kind keeps the native-function signature flat.
    macro_rules! ctor {
        ($kind:expr) => {{
            fn ctor(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
                construct_error($kind, this, args, context)
            }
            ctor
        }};
    }
    match kind {
        JsNativeErrorKind::Error => ctor!(JsNativeErrorKind::Error),
        JsNativeErrorKind::Syntax => ctor!(JsNativeErrorKind::Syntax),
        JsNativeErrorKind::Reference => ctor!(JsNativeErrorKind::Reference),
        JsNativeErrorKind::Type => ctor!(JsNativeErrorKind::Type),
        JsNativeErrorKind::Range => ctor!(JsNativeErrorKind::Range),
        JsNativeErrorKind::Uri => ctor!(JsNativeErrorKind::Uri),
    }
}

/// `Error ( message )` and its subclasses; works for call and construct.
fn construct_error(
    kind: JsNativeErrorKind,
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let message = match args.first() {
        Some(JsValue::Undefined) | None => String::new(),
        Some(value) => value.to_string(context)?.to_string(),
    };
    Ok(create_error_object(kind, &message, context).into())
}

/// `Error.prototype.toString ( )`
fn error_to_string(this: &JsValue, _: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let Some(obj) = this.as_object().cloned() else {
        return Err(crate::error::JsNativeError::typ()
            .with_message("Error.prototype.toString called on a non-object")
            .into());
    };
    let name = obj.get("name", context)?;
    let name = if name.is_undefined() {
        "Error".to_string()
    } else {
        name.to_string(context)?.to_string()
    };
    let message = obj.get("message", context)?;
    let message = if message.is_undefined() {
        String::new()
    } else {
        message.to_string(context)?.to_string()
    };
    Ok(if message.is_empty() {
        JsValue::from(name.as_str())
    } else {
        JsValue::from(format!("{name}: {message}").as_str())
    })
}

/// Wires every error constructor/prototype pair into the realm.
pub(crate) fn init(context: &mut Context) {
    let kinds = [
        (JsNativeErrorKind::Error, "Error"),
        (JsNativeErrorKind::Type, "TypeError"),
        (JsNativeErrorKind::Range, "RangeError"),
        (JsNativeErrorKind::Reference, "ReferenceError"),
        (JsNativeErrorKind::Syntax, "SyntaxError"),
        (JsNativeErrorKind::Uri, "URIError"),
    ];

    let base_prototype = context.intrinsics().error_prototype(JsNativeErrorKind::Error);
    BuiltInBuilder::new(&base_prototype, context).method(error_to_string, "toString", 0);

    for (kind, name) in kinds {
        let prototype = context.intrinsics().error_prototype(kind);
        {
            let mut borrow = prototype.borrow_mut();
            let properties = borrow.properties_mut();
            properties.insert(
                &PropertyKey::from("name"),
                PropertyDescriptor::builder()
                    .value(name)
                    .writable(true)
                    .enumerable(false)
                    .configurable(true)
                    .build(),
            );
            properties.insert(
                &PropertyKey::from("message"),
                PropertyDescriptor::builder()
                    .value("")
                    .writable(true)
                    .enumerable(false)
                    .configurable(true)
                    .build(),
            );
        }

        let constructor = crate::builtins::function::native_constructor(
            error_constructor_for(kind),
            name,
            1,
            context,
        );
        constructor.borrow_mut().properties_mut().insert(
            &PropertyKey::from("prototype"),
            PropertyDescriptor::builder()
                .value(prototype.clone())
                .writable(false)
                .enumerable(false)
                .configurable(false)
                .build(),
        );
        prototype.borrow_mut().properties_mut().insert(
            &PropertyKey::from("constructor"),
            PropertyDescriptor::builder()
                .value(constructor.clone())
                .writable(true)
                .enumerable(false)
                .configurable(true)
                .build(),
        );
        super::define_global(name, constructor, context);
    }
}
