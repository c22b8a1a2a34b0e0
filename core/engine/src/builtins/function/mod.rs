//! Function objects: native functions, compiled functions, and the calling
//! machinery shared by the interpreter and the embedding API.

pub mod arguments;

use kestrel_gc::{custom_trace, Finalize, Gc, GcRefCell, Trace};

use crate::builtins::BuiltInBuilder;
use crate::context::Context;
use crate::environments::{
    DeclarativeEnvironment, DeclarativeKind, Environment, FunctionSlots, PrivateEnvironment,
};
use crate::error::JsNativeError;
use crate::object::{
    BoundFunction, JsObject, ObjectData, PrivateElement, PrivateName,
};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::string::JsString;
use crate::value::JsValue;
use crate::vm::{CallFrame, CodeBlock, CodeBlockFlags, CompletionRecord};
use crate::JsResult;

/// The signature of a native (Rust) function exposed to script.
pub type NativeFunctionPointer = fn(&JsValue, &[JsValue], &mut Context) -> JsResult<JsValue>;

/// Whether a class constructor is base or derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstructorKind {
    /// A base constructor: `this` is created before the body runs.
    #[default]
    Base,
    /// A derived constructor: `this` appears when `super()` returns.
    Derived,
}

/// The key of a class field definition.
#[derive(Debug, Clone)]
pub enum ClassFieldKey {
    /// An ordinary property key (possibly computed at class evaluation).
    Property(PropertyKey),
    /// A private name.
    Private(PrivateName),
}

/// A class field recorded on the constructor, initialized per instance.
#[derive(Debug, Clone)]
pub struct ClassField {
    /// Where the field lands.
    pub key: ClassFieldKey,
    /// The compiled initializer thunk, if the field has an initializer.
    pub initializer: Option<JsObject>,
}

impl Finalize for ClassField {}

// SAFETY: the initializer thunk is the only cell edge.
unsafe impl Trace for ClassField {
    custom_trace!(this, mark, {
        if let Some(initializer) = &this.initializer {
            mark(initializer);
        }
    });
}

/// The data of a compiled (non-native) function.
#[derive(Debug, Clone)]
pub struct OrdinaryFunction {
    /// The compiled code.
    pub code: Gc<CodeBlock>,
    /// The closed-over environment.
    pub environment: Environment,
    /// The closed-over private environment.
    pub private_environment: Option<Gc<PrivateEnvironment>>,
    /// `[[HomeObject]]` for `super` references.
    pub home_object: Option<JsObject>,
    /// Base or derived, for class constructors.
    pub constructor_kind: ConstructorKind,
    /// Instance fields this constructor installs.
    pub fields: Vec<ClassField>,
    /// Instance private methods this constructor installs.
    pub private_methods: Vec<(PrivateName, PrivateElement)>,
}

impl Finalize for OrdinaryFunction {}

// SAFETY: code, environments, home object, fields and private methods are
// edges.
unsafe impl Trace for OrdinaryFunction {
    custom_trace!(this, mark, {
        mark(&this.code);
        mark(&this.environment);
        if let Some(private_environment) = &this.private_environment {
            mark(private_environment);
        }
        if let Some(home_object) = &this.home_object {
            mark(home_object);
        }
        mark(&this.fields);
        for (_, element) in &this.private_methods {
            mark(element);
        }
    });
}

/// The kind of a function object.
pub enum FunctionKind {
    /// A Rust function.
    Native {
        /// The implementation.
        function: NativeFunctionPointer,
        /// Whether `new` is allowed; native constructors receive
        /// `new.target` as their `this` argument.
        constructor: bool,
    },
    /// A compiled function.
    Ordinary(OrdinaryFunction),
    /// One of the paired resolving functions of a promise.
    PromiseResolving {
        /// The promise to settle.
        promise: JsObject,
        /// The shared already-resolved latch of the pair.
        already: std::rc::Rc<std::cell::Cell<bool>>,
        /// `true` for the reject half.
        reject: bool,
    },
}

impl std::fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native { .. } => f.write_str("FunctionKind::Native"),
            Self::Ordinary(_) => f.write_str("FunctionKind::Ordinary"),
            Self::PromiseResolving { .. } => f.write_str("FunctionKind::PromiseResolving"),
        }
    }
}

/// The function data carried by a function object.
#[derive(Debug)]
pub struct Function {
    pub(crate) kind: FunctionKind,
}

impl Function {
    /// Whether this function supports `[[Construct]]`.
    pub fn is_constructor(&self) -> bool {
        match &self.kind {
            FunctionKind::Native { constructor, .. } => *constructor,
            FunctionKind::Ordinary(ordinary) => {
                let flags = ordinary.code.flags;
                !flags.intersects(
                    CodeBlockFlags::ARROW
                        | CodeBlockFlags::METHOD
                        | CodeBlockFlags::GENERATOR
                        | CodeBlockFlags::ASYNC,
                )
            }
            FunctionKind::PromiseResolving { .. } => false,
        }
    }

    /// The compiled data, if this is a compiled function.
    pub fn as_ordinary(&self) -> Option<&OrdinaryFunction> {
        match &self.kind {
            FunctionKind::Ordinary(ordinary) => Some(ordinary),
            _ => None,
        }
    }

    pub(crate) fn as_ordinary_mut(&mut self) -> Option<&mut OrdinaryFunction> {
        match &mut self.kind {
            FunctionKind::Ordinary(ordinary) => Some(ordinary),
            _ => None,
        }
    }
}

impl Finalize for Function {}

// SAFETY: each kind marks its edges.
unsafe impl Trace for Function {
    custom_trace!(this, mark, {
        match &this.kind {
            FunctionKind::Native { .. } => {}
            FunctionKind::Ordinary(ordinary) => mark(ordinary),
            FunctionKind::PromiseResolving { promise, .. } => mark(promise),
        }
    });
}

/// `[[Call]]` dispatch for every function kind.
pub(crate) fn call_function(
    obj: &JsObject,
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    enum Dispatch {
        Native(NativeFunctionPointer),
        Resolving(JsObject, std::rc::Rc<std::cell::Cell<bool>>, bool),
        Ordinary(OrdinaryFunction),
    }

    let dispatch = {
        let object = obj.borrow();
        let function = object
            .as_function()
            .expect("call vtable installed on a non-function");
        match &function.kind {
            FunctionKind::Native { function, .. } => Dispatch::Native(*function),
            FunctionKind::PromiseResolving {
                promise,
                already,
                reject,
            } => Dispatch::Resolving(promise.clone(), already.clone(), *reject),
            FunctionKind::Ordinary(ordinary) => Dispatch::Ordinary(ordinary.clone()),
        }
    };

    match dispatch {
        Dispatch::Native(function) => {
            let _guard = context.enter_call()?;
            let result = function(this, args, context);
            context.exit_call();
            result
        }
        Dispatch::Resolving(promise, already, reject) => {
            crate::builtins::promise::resolving_function(
                &promise,
                &already,
                reject,
                args.first().cloned().unwrap_or_default(),
                context,
            )
        }
        Dispatch::Ordinary(ordinary) => {
            let flags = ordinary.code.flags;
            if flags.contains(CodeBlockFlags::CLASS_CONSTRUCTOR) {
                return Err(JsNativeError::typ()
                    .with_message("class constructor cannot be invoked without 'new'")
                    .into());
            }
            if flags.contains(CodeBlockFlags::GENERATOR) {
                if flags.contains(CodeBlockFlags::ASYNC) {
                    return crate::builtins::async_generator::create(
                        obj, &ordinary, this, args, context,
                    );
                }
                return crate::builtins::generator::create(obj, &ordinary, this, args, context);
            }
            if flags.contains(CodeBlockFlags::ASYNC) {
                return crate::builtins::async_function::call(obj, &ordinary, this, args, context);
            }
            let env = prepare_function_environment(obj, &ordinary, this, None, None, context)?;
            let (record, _frame) = invoke_with_env(obj, &ordinary, env, args, context)?;
            match record {
                CompletionRecord::Normal(value) => Ok(value),
                CompletionRecord::Throw(err) => Err(err),
                _ => Err(JsNativeError::typ()
                    .with_message("function suspended outside a coroutine")
                    .into()),
            }
        }
    }
}

/// `[[Construct]]` dispatch.
pub(crate) fn construct_function(
    obj: &JsObject,
    args: &[JsValue],
    new_target: &JsObject,
    context: &mut Context,
) -> JsResult<JsObject> {
    enum Dispatch {
        Native(NativeFunctionPointer),
        Ordinary(OrdinaryFunction),
    }

    let dispatch = {
        let object = obj.borrow();
        let function = object
            .as_function()
            .expect("construct vtable installed on a non-function");
        match &function.kind {
            FunctionKind::Native { function, .. } => Dispatch::Native(*function),
            FunctionKind::Ordinary(ordinary) => Dispatch::Ordinary(ordinary.clone()),
            FunctionKind::PromiseResolving { .. } => {
                return Err(JsNativeError::typ()
                    .with_message("not a constructor")
                    .into())
            }
        }
    };
    let ordinary = match dispatch {
        Dispatch::Native(function) => {
            // Native constructors receive new.target as `this`.
            let result = function(&new_target.clone().into(), args, context)?;
            return match result {
                JsValue::Object(result) => Ok(result),
                _ => Err(JsNativeError::typ()
                    .with_message("native constructor did not return an object")
                    .into()),
            };
        }
        Dispatch::Ordinary(ordinary) => ordinary,
    };

    let flags = ordinary.code.flags;
    let derived = ordinary.constructor_kind == ConstructorKind::Derived;

    // Synthesized default constructors have no body to run.
    if flags.contains(CodeBlockFlags::DEFAULT_CONSTRUCTOR) {
        let this = if derived {
            let parent = obj.prototype().ok_or_else(|| {
                JsNativeError::typ().with_message("super constructor is not a constructor")
            })?;
            if !parent.is_constructor() {
                return Err(JsNativeError::typ()
                    .with_message("super constructor is not a constructor")
                    .into());
            }
            parent.construct(args, Some(new_target), context)?
        } else {
            ordinary_create_from_constructor(new_target, context)?
        };
        initialize_instance_elements(&this, obj, context)?;
        return Ok(this);
    }

    if derived {
        // `this` stays uninitialized until `super()` binds it.
        let env = prepare_function_environment(
            obj,
            &ordinary,
            &JsValue::undefined(),
            Some(new_target.clone()),
            None,
            context,
        )?;
        let env_record = match &env {
            Environment::Declarative(decl) => decl.clone(),
            Environment::Object(_) => unreachable!("function scopes are declarative"),
        };
        let (record, _frame) = invoke_with_env(obj, &ordinary, env, args, context)?;
        match record {
            CompletionRecord::Normal(value) => match value {
                JsValue::Object(result) => Ok(result),
                JsValue::Undefined => {
                    let slots = env_record
                        .as_function_slots()
                        .expect("constructor scope has function slots")
                        .borrow();
                    if !slots.this_initialized {
                        return Err(JsNativeError::reference()
                            .with_message("derived constructor returned without calling super")
                            .into());
                    }
                    match slots.this.clone() {
                        Some(JsValue::Object(this)) => Ok(this),
                        _ => Err(JsNativeError::typ()
                            .with_message("bound 'this' is not an object")
                            .into()),
                    }
                }
                _ => Err(JsNativeError::typ()
                    .with_message("derived constructor returned a non-object")
                    .into()),
            },
            CompletionRecord::Throw(err) => Err(err),
            _ => Err(JsNativeError::typ()
                .with_message("constructor suspended unexpectedly")
                .into()),
        }
    } else {
        let this = ordinary_create_from_constructor(new_target, context)?;
        initialize_instance_elements(&this, obj, context)?;
        let env = prepare_function_environment(
            obj,
            &ordinary,
            &this.clone().into(),
            Some(new_target.clone()),
            None,
            context,
        )?;
        let (record, _frame) = invoke_with_env(obj, &ordinary, env, args, context)?;
        match record {
            CompletionRecord::Normal(JsValue::Object(result)) => Ok(result),
            CompletionRecord::Normal(_) => Ok(this),
            CompletionRecord::Throw(err) => Err(err),
            _ => Err(JsNativeError::typ()
                .with_message("constructor suspended unexpectedly")
                .into()),
        }
    }
}

/// `OrdinaryCreateFromConstructor ( constructor, "%Object.prototype%" )`
fn ordinary_create_from_constructor(
    new_target: &JsObject,
    context: &mut Context,
) -> JsResult<JsObject> {
    let proto = new_target.get("prototype", context)?;
    let proto = match proto {
        JsValue::Object(proto) => proto,
        _ => context.intrinsics().object_prototype(),
    };
    Ok(JsObject::from_proto_and_data(
        Some(proto),
        ObjectData::ordinary(),
        context,
    ))
}

/// Builds the activation environment for a compiled function.
pub(crate) fn prepare_function_environment(
    obj: &JsObject,
    ordinary: &OrdinaryFunction,
    this: &JsValue,
    new_target: Option<JsObject>,
    bound_this_override: Option<JsValue>,
    context: &mut Context,
) -> JsResult<Environment> {
    let code = &ordinary.code;
    let shape = code.scopes.first().cloned().unwrap_or_default();
    let flags = code.flags;

    if flags.contains(CodeBlockFlags::ARROW) {
        // Arrows have no own `this`: a plain lexical scope over the closure.
        return Ok(Environment::Declarative(DeclarativeEnvironment::new(
            DeclarativeKind::Lexical,
            shape,
            Some(ordinary.environment.clone()),
            context,
        )));
    }

    let uninitialized_this = flags.contains(CodeBlockFlags::DERIVED_CONSTRUCTOR);
    let slots = if uninitialized_this {
        FunctionSlots::uninitialized(obj.clone(), new_target)
    } else if let Some(this) = bound_this_override {
        FunctionSlots::bound(this, obj.clone(), new_target)
    } else {
        // OrdinaryCallBindThis.
        let this = if flags.contains(CodeBlockFlags::STRICT) || flags.contains(CodeBlockFlags::MODULE)
        {
            this.clone()
        } else if this.is_null_or_undefined() {
            context.global_object().into()
        } else {
            this.to_object(context)?.into()
        };
        FunctionSlots::bound(this, obj.clone(), new_target)
    };

    Ok(Environment::Declarative(DeclarativeEnvironment::new(
        DeclarativeKind::Function(GcRefCell::new(slots)),
        shape,
        Some(ordinary.environment.clone()),
        context,
    )))
}

/// Pushes a frame for `code` over `env` and runs it to completion or
/// suspension. The frame is popped and returned either way.
pub(crate) fn invoke_with_env(
    obj: &JsObject,
    ordinary: &OrdinaryFunction,
    env: Environment,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<(CompletionRecord, Box<CallFrame>)> {
    let _guard = context.enter_call()?;
    context.maybe_collect();
    let frame = CallFrame::new(
        ordinary.code.clone(),
        Some(obj.clone()),
        env.clone(),
        env,
        ordinary.private_environment.clone(),
        args.to_vec(),
    );
    context.vm.push_frame(frame);
    let record = crate::vm::run(context);
    let frame = context.vm.pop_frame();
    context.exit_call();
    Ok((record, frame))
}

/// `InitializeInstanceElements ( O, constructor )`
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-initializeinstanceelements
pub(crate) fn initialize_instance_elements(
    this: &JsObject,
    constructor: &JsObject,
    context: &mut Context,
) -> JsResult<()> {
    let (methods, fields) = {
        let object = constructor.borrow();
        let Some(ordinary) = object.as_function().and_then(Function::as_ordinary) else {
            return Ok(());
        };
        (ordinary.private_methods.clone(), ordinary.fields.clone())
    };

    for (name, element) in methods {
        this.install_private_element(name, element)?;
    }
    for field in fields {
        let value = match &field.initializer {
            Some(initializer) => initializer.call(&this.clone().into(), &[], context)?,
            None => JsValue::undefined(),
        };
        match field.key {
            ClassFieldKey::Property(key) => {
                this.create_data_property_or_throw(key, value, context)?;
            }
            ClassFieldKey::Private(name) => {
                this.install_private_element(name, PrivateElement::Field(value))?;
            }
        }
    }
    Ok(())
}

/// Instantiates the compiled function `code` closing over the current
/// frame's environments (the `CreateFunction` opcode).
pub(crate) fn make_function(
    code: Gc<CodeBlock>,
    environment: Environment,
    private_environment: Option<Gc<PrivateEnvironment>>,
    context: &mut Context,
) -> JsObject {
    let flags = code.flags;
    let name = code.name.clone();
    let length = code.length;
    let function = Function {
        kind: FunctionKind::Ordinary(OrdinaryFunction {
            code,
            environment,
            private_environment,
            home_object: None,
            constructor_kind: if flags.contains(CodeBlockFlags::DERIVED_CONSTRUCTOR) {
                ConstructorKind::Derived
            } else {
                ConstructorKind::Base
            },
            fields: Vec::new(),
            private_methods: Vec::new(),
        }),
    };

    let proto = context.intrinsics().function_prototype();
    let object = JsObject::from_proto_and_data(Some(proto), ObjectData::function(function), context);
    define_function_metadata(&object, &name, length, context);

    // Constructables get a fresh `prototype` object; generators get theirs
    // from %GeneratorPrototype% without a constructor backlink.
    if flags.contains(CodeBlockFlags::GENERATOR) {
        let proto_parent = if flags.contains(CodeBlockFlags::ASYNC) {
            context.intrinsics().async_generator_prototype()
        } else {
            context.intrinsics().generator_prototype()
        };
        let prototype =
            JsObject::from_proto_and_data(Some(proto_parent), ObjectData::ordinary(), context);
        object
            .borrow_mut()
            .properties_mut()
            .insert(
                &PropertyKey::from("prototype"),
                PropertyDescriptor::builder()
                    .value(prototype)
                    .writable(true)
                    .enumerable(false)
                    .configurable(false)
                    .build(),
            );
    } else if object.is_constructor() {
        let prototype = JsObject::with_object_proto(context);
        prototype.borrow_mut().properties_mut().insert(
            &PropertyKey::from("constructor"),
            PropertyDescriptor::builder()
                .value(object.clone())
                .writable(true)
                .enumerable(false)
                .configurable(true)
                .build(),
        );
        object.borrow_mut().properties_mut().insert(
            &PropertyKey::from("prototype"),
            PropertyDescriptor::builder()
                .value(prototype)
                .writable(true)
                .enumerable(false)
                .configurable(false)
                .build(),
        );
    }
    object
}

pub(crate) fn define_function_metadata(
    object: &JsObject,
    name: &JsString,
    length: u32,
    _context: &mut Context,
) {
    let mut borrow = object.borrow_mut();
    let properties = borrow.properties_mut();
    properties.insert(
        &PropertyKey::from("name"),
        PropertyDescriptor::builder()
            .value(name.clone())
            .writable(false)
            .enumerable(false)
            .configurable(true)
            .build(),
    );
    properties.insert(
        &PropertyKey::from("length"),
        PropertyDescriptor::builder()
            .value(length as i32)
            .writable(false)
            .enumerable(false)
            .configurable(true)
            .build(),
    );
}

/// Creates a native function object.
pub fn native_function(
    function: NativeFunctionPointer,
    name: &str,
    length: u32,
    context: &mut Context,
) -> JsObject {
    let proto = context.intrinsics().function_prototype();
    let object = JsObject::from_proto_and_data(
        Some(proto),
        ObjectData::function(Function {
            kind: FunctionKind::Native {
                function,
                constructor: false,
            },
        }),
        context,
    );
    define_function_metadata(&object, &JsString::from(name), length, context);
    object
}

/// Creates a native constructor object.
pub fn native_constructor(
    function: NativeFunctionPointer,
    name: &str,
    length: u32,
    context: &mut Context,
) -> JsObject {
    let proto = context.intrinsics().function_prototype();
    let object = JsObject::from_proto_and_data(
        Some(proto),
        ObjectData::function(Function {
            kind: FunctionKind::Native {
                function,
                constructor: true,
            },
        }),
        context,
    );
    define_function_metadata(&object, &JsString::from(name), length, context);
    object
}

/// `Function.prototype.call ( thisArg, ...args )`
fn function_prototype_call(
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let Some(func) = this.as_callable() else {
        return Err(JsNativeError::typ()
            .with_message("Function.prototype.call called on a non-callable")
            .into());
    };
    let this_arg = args.first().cloned().unwrap_or_default();
    func.clone().call(&this_arg, args.get(1..).unwrap_or(&[]), context)
}

/// `Function.prototype.apply ( thisArg, argArray )`
fn function_prototype_apply(
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let Some(func) = this.as_callable() else {
        return Err(JsNativeError::typ()
            .with_message("Function.prototype.apply called on a non-callable")
            .into());
    };
    let func = func.clone();
    let this_arg = args.first().cloned().unwrap_or_default();
    let arg_array = args.get(1).cloned().unwrap_or_default();
    if arg_array.is_null_or_undefined() {
        return func.call(&this_arg, &[], context);
    }
    let Some(arg_obj) = arg_array.as_object().cloned() else {
        return Err(JsNativeError::typ()
            .with_message("second argument to apply must be an array-like")
            .into());
    };
    let len = arg_obj.length_of_array_like(context)?;
    let mut list = Vec::with_capacity(len as usize);
    for i in 0..len {
        list.push(arg_obj.get(PropertyKey::Index(i as u32), context)?);
    }
    func.call(&this_arg, &list, context)
}

/// `Function.prototype.bind ( thisArg, ...args )`
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-function.prototype.bind
fn function_prototype_bind(
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let Some(target) = this.as_callable() else {
        return Err(JsNativeError::typ()
            .with_message("Function.prototype.bind called on a non-callable")
            .into());
    };
    let target = target.clone();
    let bound_this = args.first().cloned().unwrap_or_default();
    let bound_args = args.get(1..).unwrap_or(&[]).to_vec();

    let proto = target.__get_prototype_of__(context)?;
    let constructor = target.is_constructor();
    let bound = JsObject::from_proto_and_data(
        proto,
        ObjectData::bound_function(
            BoundFunction {
                target: target.clone(),
                this: bound_this,
                args: bound_args,
            },
            constructor,
        ),
        context,
    );

    // `length` and `name` derive from the target.
    let target_len = target.get("length", context)?;
    let length = target_len
        .as_number()
        .map_or(0.0, |n| (n - args.len().saturating_sub(1) as f64).max(0.0));
    let name = target.get("name", context)?;
    let name = match name {
        JsValue::String(s) => s,
        _ => JsString::empty(),
    };
    define_function_metadata(
        &bound,
        &JsString::from(format!("bound {name}")),
        length as u32,
        context,
    );
    Ok(bound.into())
}

/// Wires `Function.prototype` and its methods into the realm.
pub(crate) fn init(context: &mut Context) {
    let function_prototype = context.intrinsics().function_prototype();
    BuiltInBuilder::new(&function_prototype, context)
        .method(function_prototype_call, "call", 1)
        .method(function_prototype_apply, "apply", 2)
        .method(function_prototype_bind, "bind", 1);
}
