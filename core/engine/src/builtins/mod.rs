//! The built-in objects the engine core needs: `Object`, `Function`,
//! `Array`, the error constructors, iterators, generators and `Promise`.
//!
//! Anything beyond this set (collections, dates, JSON, internationalized
//! text) belongs to an embedding layer, not to the core.

pub mod array;
pub mod async_function;
pub mod async_generator;
pub mod error;
pub mod function;
pub mod generator;
pub mod iterable;
pub mod object;
pub mod promise;
pub mod proxy;

use crate::context::Context;
use crate::object::JsObject;
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::value::JsValue;

/// Attaches methods and properties to a built-in object.
///
/// Thin by design: builtins are wired once per realm, so this only needs to
/// cover the method/property shapes that actually occur.
pub(crate) struct BuiltInBuilder<'a> {
    object: &'a JsObject,
    context: &'a mut Context,
}

impl<'a> BuiltInBuilder<'a> {
    pub(crate) fn new(object: &'a JsObject, context: &'a mut Context) -> Self {
        Self { object, context }
    }

    /// Adds a non-enumerable method.
    pub(crate) fn method(
        self,
        function: function::NativeFunctionPointer,
        name: &str,
        length: u32,
    ) -> Self {
        let method = function::native_function(function, name, length, self.context);
        self.object.borrow_mut().properties_mut().insert(
            &PropertyKey::from(name),
            PropertyDescriptor::builder()
                .value(method)
                .writable(true)
                .enumerable(false)
                .configurable(true)
                .build(),
        );
        self
    }

    /// Adds a non-enumerable method under a symbol key.
    pub(crate) fn symbol_method(
        self,
        function: function::NativeFunctionPointer,
        symbol: crate::symbol::JsSymbol,
        name: &str,
        length: u32,
    ) -> Self {
        let method = function::native_function(function, name, length, self.context);
        self.object.borrow_mut().properties_mut().insert(
            &PropertyKey::Symbol(symbol),
            PropertyDescriptor::builder()
                .value(method)
                .writable(true)
                .enumerable(false)
                .configurable(true)
                .build(),
        );
        self
    }
}

/// Defines a value on the global object with the standard builtin
/// attributes.
pub(crate) fn define_global<V: Into<JsValue>>(name: &str, value: V, context: &mut Context) {
    let global = context.global_object();
    global.borrow_mut().properties_mut().insert(
        &PropertyKey::from(name),
        PropertyDescriptor::builder()
            .value(value.into())
            .writable(true)
            .enumerable(false)
            .configurable(true)
            .build(),
    );
}

/// Populates a freshly allocated realm with its built-in objects.
pub(crate) fn initialize(context: &mut Context) {
    object::init(context);
    function::init(context);
    error::init(context);
    array::init(context);
    generator::init(context);
    async_generator::init(context);
    iterable_init(context);
    promise::init(context);
    proxy::init(context);
    global_init(context);
}

fn iterable_init(context: &mut Context) {
    let proto = context.intrinsics().async_from_sync_iterator_prototype.clone();
    BuiltInBuilder::new(&proto, context).method(
        iterable::AsyncFromSyncIterator::next,
        "next",
        1,
    );

    // %IteratorPrototype%[@@iterator] returns `this`.
    fn identity(this: &JsValue, _: &[JsValue], _: &mut Context) -> crate::JsResult<JsValue> {
        Ok(this.clone())
    }
    let iterator_prototype = context.intrinsics().iterator_prototype();
    BuiltInBuilder::new(&iterator_prototype, context).symbol_method(
        identity,
        crate::symbol::JsSymbol::iterator(),
        "[Symbol.iterator]",
        0,
    );
}

fn global_init(context: &mut Context) {
    let global = context.global_object();
    {
        let mut borrow = global.borrow_mut();
        let properties = borrow.properties_mut();
        for (name, value) in [
            ("undefined", JsValue::undefined()),
            ("NaN", JsValue::nan()),
            ("Infinity", JsValue::Rational(f64::INFINITY)),
        ] {
            properties.insert(
                &PropertyKey::from(name),
                PropertyDescriptor::builder()
                    .value(value)
                    .writable(false)
                    .enumerable(false)
                    .configurable(false)
                    .build(),
            );
        }
    }
    define_global("globalThis", global.clone(), context);

    // The eval intrinsic: identity anchor for the direct-eval check. The
    // behavior itself comes from the host-installed hook.
    fn eval(_this: &JsValue, args: &[JsValue], context: &mut Context) -> crate::JsResult<JsValue> {
        crate::vm::perform_eval(args.first().cloned().unwrap_or_default(), false, context)
    }
    let eval_fn = function::native_function(eval, "eval", 1, context);
    context
        .intrinsics()
        .eval_function
        .set(eval_fn.clone())
        .ok();
    define_global("eval", eval_fn, context);

    // Minimal host diagnostics channel; scripts in the wild expect at least
    // a `print`.
    fn print(_this: &JsValue, args: &[JsValue], context: &mut Context) -> crate::JsResult<JsValue> {
        let mut pieces = Vec::with_capacity(args.len());
        for arg in args {
            pieces.push(arg.to_string(context)?.to_string());
        }
        log::info!("{}", pieces.join(" "));
        Ok(JsValue::undefined())
    }
    let print_fn = function::native_function(print, "print", 1, context);
    define_global("print", print_fn, context);
}
