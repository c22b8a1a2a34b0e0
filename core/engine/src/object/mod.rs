//! The object shell and its kinds.
//!
//! Every object is the same shell: a property table, a prototype slot, an
//! extensibility flag, a private-element table and a kind. The kind carries
//! the exotic data (array, proxy, bound function, …) and selects the static
//! [`InternalObjectMethods`] vtable the meta-object protocol dispatches
//! through.

pub mod for_in_iterator;
pub mod internal_methods;
pub mod operations;
pub mod private;
pub mod property_map;

pub use private::{PrivateElement, PrivateName};
pub use property_map::PropertyMap;

use kestrel_gc::{custom_trace, Finalize, Gc, GcRef, GcRefMut, GcRefCell, Trace};
use thin_vec::ThinVec;

use crate::builtins::array::ArrayIterator;
use crate::builtins::async_generator::AsyncGenerator;
use crate::builtins::function::{arguments::MappedArguments, Function};
use crate::builtins::generator::Generator;
use crate::builtins::iterable::AsyncFromSyncIterator;
use crate::builtins::promise::Promise;
use crate::context::Context;
use crate::error::JsNativeErrorKind;
use crate::module::Module;
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::string::JsString;
use crate::value::JsValue;

use self::for_in_iterator::ForInIterator;
use self::internal_methods::InternalObjectMethods;

/// The prototype slot of an object: an object or `null`.
pub type JsPrototype = Option<JsObject>;

/// A handle to a heap-allocated object.
#[derive(Clone)]
pub struct JsObject {
    inner: Gc<GcRefCell<Object>>,
}

/// The data of an object.
pub struct Object {
    /// The kind-specific data and operations of the object.
    pub(crate) data: ObjectData,
    properties: PropertyMap,
    prototype: JsPrototype,
    extensible: bool,
    pub(crate) private_elements: ThinVec<(PrivateName, PrivateElement)>,
    /// Bumped on every shape-affecting mutation; the interpreter's inline
    /// caches use it as a cheap validity witness.
    pub(crate) generation: u64,
}

/// Kind plus vtable, assembled by the `ObjectData` constructors below.
pub struct ObjectData {
    pub(crate) kind: ObjectKind,
    pub(crate) internal_methods: &'static InternalObjectMethods,
}

/// The kind of an object, including any exotic data.
pub enum ObjectKind {
    /// An ordinary object.
    Ordinary,
    /// An `Array` exotic object.
    Array,
    /// An unmapped arguments object.
    Arguments,
    /// A mapped arguments object, re-routing indices through a function
    /// environment.
    MappedArguments(MappedArguments),
    /// A function (ordinary, native or one of the coroutine flavors).
    Function(Function),
    /// A bound function exotic object.
    BoundFunction(BoundFunction),
    /// A proxy exotic object.
    Proxy(Proxy),
    /// A `String` exotic object.
    StringExotic(JsString),
    /// A wrapper around a non-string primitive.
    BoxedPrimitive(JsValue),
    /// An integer-indexed (typed-array view) exotic object.
    IntegerIndexed(IntegerIndexed),
    /// A module namespace exotic object.
    ModuleNamespace(ModuleNamespace),
    /// The backing object of a `for..in` enumeration.
    ForInIterator(ForInIterator),
    /// An array iterator.
    ArrayIterator(ArrayIterator),
    /// A generator object.
    Generator(Generator),
    /// An async generator object.
    AsyncGenerator(AsyncGenerator),
    /// A promise.
    Promise(Promise),
    /// The async-from-sync iterator wrapper used by `for await`.
    AsyncFromSyncIterator(AsyncFromSyncIterator),
    /// An error object.
    Error(JsNativeErrorKind),
    /// A host object carrying opaque native data.
    Native(NativeObject),
}

/// The `[[BoundTargetFunction]]`, `[[BoundThis]]` and `[[BoundArguments]]`
/// slots of a bound function exotic object.
#[derive(Debug, Clone)]
pub struct BoundFunction {
    pub(crate) target: JsObject,
    pub(crate) this: JsValue,
    pub(crate) args: Vec<JsValue>,
}

/// The `[[ProxyTarget]]` and `[[ProxyHandler]]` slots of a proxy.
///
/// Both are `None` after revocation.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub(crate) target: Option<JsObject>,
    pub(crate) handler: Option<JsObject>,
    pub(crate) call: bool,
    pub(crate) construct: bool,
}

impl Proxy {
    /// The target/handler pair, or a `TypeError` if the proxy was revoked.
    pub(crate) fn try_data(&self) -> crate::JsResult<(JsObject, JsObject)> {
        match (&self.target, &self.handler) {
            (Some(target), Some(handler)) => Ok((target.clone(), handler.clone())),
            _ => Err(crate::error::JsNativeError::typ()
                .with_message("proxy has been revoked")
                .into()),
        }
    }
}

/// The element storage of an integer-indexed exotic object.
#[derive(Debug, Clone, Default)]
pub struct IntegerIndexed {
    pub(crate) elements: Vec<f64>,
}

/// The module and sorted export list of a module namespace object.
#[derive(Clone)]
pub struct ModuleNamespace {
    pub(crate) module: Module,
    pub(crate) exports: Vec<JsString>,
}

/// Opaque host data attached to a native object: a type token and a data
/// payload with its own trace hook.
pub struct NativeObject {
    pub(crate) tag: usize,
    pub(crate) data: Box<dyn HostData>,
}

/// Data a host can attach to a native object.
///
/// The `Trace` supertrait is the scan hook; `Finalize` (via `Trace`) is the
/// free hook.
pub trait HostData: Trace + std::any::Any {
    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn std::any::Any;
    /// Mutable upcast for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

impl<T: Trace + std::any::Any> HostData for T {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl Finalize for Box<dyn HostData> {}

// SAFETY: forwards to the boxed data's own trace.
unsafe impl Trace for Box<dyn HostData> {
    fn trace(&self, tracer: &mut kestrel_gc::Tracer) {
        (**self).trace(tracer);
    }
}

impl ObjectData {
    /// An ordinary object.
    pub fn ordinary() -> Self {
        Self {
            kind: ObjectKind::Ordinary,
            internal_methods: &internal_methods::ORDINARY_INTERNAL_METHODS,
        }
    }

    /// An array exotic object.
    pub fn array() -> Self {
        Self {
            kind: ObjectKind::Array,
            internal_methods: &internal_methods::array::ARRAY_EXOTIC_INTERNAL_METHODS,
        }
    }

    /// An unmapped arguments object.
    pub fn arguments() -> Self {
        Self {
            kind: ObjectKind::Arguments,
            internal_methods: &internal_methods::ORDINARY_INTERNAL_METHODS,
        }
    }

    /// A mapped arguments object.
    pub fn mapped_arguments(map: MappedArguments) -> Self {
        Self {
            kind: ObjectKind::MappedArguments(map),
            internal_methods: &internal_methods::arguments::MAPPED_ARGUMENTS_INTERNAL_METHODS,
        }
    }

    /// A function.
    pub fn function(function: Function) -> Self {
        let constructor = function.is_constructor();
        Self {
            kind: ObjectKind::Function(function),
            internal_methods: if constructor {
                &internal_methods::function::CONSTRUCTOR_INTERNAL_METHODS
            } else {
                &internal_methods::function::FUNCTION_INTERNAL_METHODS
            },
        }
    }

    /// A bound function.
    pub fn bound_function(bound: BoundFunction, constructor: bool) -> Self {
        Self {
            kind: ObjectKind::BoundFunction(bound),
            internal_methods: if constructor {
                &internal_methods::bound_function::BOUND_CONSTRUCTOR_INTERNAL_METHODS
            } else {
                &internal_methods::bound_function::BOUND_FUNCTION_INTERNAL_METHODS
            },
        }
    }

    /// A proxy.
    pub fn proxy(proxy: Proxy) -> Self {
        Self {
            internal_methods: if proxy.construct {
                &internal_methods::proxy::PROXY_CONSTRUCT_INTERNAL_METHODS
            } else if proxy.call {
                &internal_methods::proxy::PROXY_CALL_INTERNAL_METHODS
            } else {
                &internal_methods::proxy::PROXY_INTERNAL_METHODS
            },
            kind: ObjectKind::Proxy(proxy),
        }
    }

    /// A `String` exotic object.
    pub fn string_exotic(string: JsString) -> Self {
        Self {
            kind: ObjectKind::StringExotic(string),
            internal_methods: &internal_methods::string::STRING_EXOTIC_INTERNAL_METHODS,
        }
    }

    /// A boxed primitive.
    pub fn boxed_primitive(value: JsValue) -> Self {
        Self {
            kind: ObjectKind::BoxedPrimitive(value),
            internal_methods: &internal_methods::ORDINARY_INTERNAL_METHODS,
        }
    }

    /// An integer-indexed exotic object.
    pub fn integer_indexed(data: IntegerIndexed) -> Self {
        Self {
            kind: ObjectKind::IntegerIndexed(data),
            internal_methods:
                &internal_methods::integer_indexed::INTEGER_INDEXED_INTERNAL_METHODS,
        }
    }

    /// A module namespace exotic object.
    pub fn module_namespace(namespace: ModuleNamespace) -> Self {
        Self {
            kind: ObjectKind::ModuleNamespace(namespace),
            internal_methods:
                &internal_methods::module_namespace::MODULE_NAMESPACE_INTERNAL_METHODS,
        }
    }

    /// A for-in iterator backing object.
    pub fn for_in_iterator(iterator: ForInIterator) -> Self {
        Self {
            kind: ObjectKind::ForInIterator(iterator),
            internal_methods: &internal_methods::ORDINARY_INTERNAL_METHODS,
        }
    }

    /// An array iterator.
    pub fn array_iterator(iterator: ArrayIterator) -> Self {
        Self {
            kind: ObjectKind::ArrayIterator(iterator),
            internal_methods: &internal_methods::ORDINARY_INTERNAL_METHODS,
        }
    }

    /// A generator object.
    pub fn generator(generator: Generator) -> Self {
        Self {
            kind: ObjectKind::Generator(generator),
            internal_methods: &internal_methods::ORDINARY_INTERNAL_METHODS,
        }
    }

    /// An async generator object.
    pub fn async_generator(generator: AsyncGenerator) -> Self {
        Self {
            kind: ObjectKind::AsyncGenerator(generator),
            internal_methods: &internal_methods::ORDINARY_INTERNAL_METHODS,
        }
    }

    /// A promise object.
    pub fn promise(promise: Promise) -> Self {
        Self {
            kind: ObjectKind::Promise(promise),
            internal_methods: &internal_methods::ORDINARY_INTERNAL_METHODS,
        }
    }

    /// An async-from-sync iterator object.
    pub fn async_from_sync_iterator(iterator: AsyncFromSyncIterator) -> Self {
        Self {
            kind: ObjectKind::AsyncFromSyncIterator(iterator),
            internal_methods: &internal_methods::ORDINARY_INTERNAL_METHODS,
        }
    }

    /// An error object.
    pub fn error(kind: JsNativeErrorKind) -> Self {
        Self {
            kind: ObjectKind::Error(kind),
            internal_methods: &internal_methods::ORDINARY_INTERNAL_METHODS,
        }
    }

    /// A host object with native data.
    pub fn native(native: NativeObject) -> Self {
        Self {
            kind: ObjectKind::Native(native),
            internal_methods: &internal_methods::ORDINARY_INTERNAL_METHODS,
        }
    }
}

impl Object {
    fn new(data: ObjectData, prototype: JsPrototype) -> Self {
        Self {
            data,
            properties: PropertyMap::default(),
            prototype,
            extensible: true,
            private_elements: ThinVec::new(),
            generation: 0,
        }
    }

    /// The property table of the object.
    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub(crate) fn properties_mut(&mut self) -> &mut PropertyMap {
        self.generation += 1;
        &mut self.properties
    }

    /// The prototype of the object.
    pub fn prototype(&self) -> &JsPrototype {
        &self.prototype
    }

    pub(crate) fn set_prototype(&mut self, prototype: JsPrototype) {
        self.generation += 1;
        self.prototype = prototype;
    }

    /// The extensibility flag.
    pub fn extensible(&self) -> bool {
        self.extensible
    }

    pub(crate) fn set_extensible(&mut self, extensible: bool) {
        self.extensible = extensible;
    }

    /// The function data, if this object is a function.
    pub fn as_function(&self) -> Option<&Function> {
        match &self.data.kind {
            ObjectKind::Function(function) => Some(function),
            _ => None,
        }
    }

    pub(crate) fn as_function_mut(&mut self) -> Option<&mut Function> {
        match &mut self.data.kind {
            ObjectKind::Function(function) => Some(function),
            _ => None,
        }
    }

    /// The promise data, if this object is a promise.
    pub fn as_promise(&self) -> Option<&Promise> {
        match &self.data.kind {
            ObjectKind::Promise(promise) => Some(promise),
            _ => None,
        }
    }

    pub(crate) fn as_promise_mut(&mut self) -> Option<&mut Promise> {
        match &mut self.data.kind {
            ObjectKind::Promise(promise) => Some(promise),
            _ => None,
        }
    }

    pub(crate) fn as_generator_mut(&mut self) -> Option<&mut Generator> {
        match &mut self.data.kind {
            ObjectKind::Generator(generator) => Some(generator),
            _ => None,
        }
    }

    pub(crate) fn as_async_generator_mut(&mut self) -> Option<&mut AsyncGenerator> {
        match &mut self.data.kind {
            ObjectKind::AsyncGenerator(generator) => Some(generator),
            _ => None,
        }
    }

    /// Returns `true` if this object is an array exotic object.
    pub fn is_array(&self) -> bool {
        matches!(self.data.kind, ObjectKind::Array)
    }

    /// The native-object data, if this is a host object.
    pub fn as_native(&self) -> Option<&NativeObject> {
        match &self.data.kind {
            ObjectKind::Native(native) => Some(native),
            _ => None,
        }
    }

    pub(crate) fn as_native_mut(&mut self) -> Option<&mut NativeObject> {
        match &mut self.data.kind {
            ObjectKind::Native(native) => Some(native),
            _ => None,
        }
    }
}

impl JsObject {
    /// Creates a new object from a prototype and kind data.
    pub fn from_proto_and_data(
        prototype: JsPrototype,
        data: ObjectData,
        context: &mut Context,
    ) -> Self {
        Self::alloc_raw(context.heap(), prototype, data)
    }

    /// Allocation path used while bootstrapping a realm, before a `Context`
    /// exists.
    pub(crate) fn alloc_raw(
        heap: &mut kestrel_gc::Heap,
        prototype: JsPrototype,
        data: ObjectData,
    ) -> Self {
        Self {
            inner: heap.alloc(GcRefCell::new(Object::new(data, prototype))),
        }
    }

    /// Creates a new ordinary object with the realm's `%Object.prototype%`.
    pub fn with_object_proto(context: &mut Context) -> Self {
        let proto = context.intrinsics().object_prototype();
        Self::from_proto_and_data(Some(proto), ObjectData::ordinary(), context)
    }

    /// Creates a new ordinary object with a `null` prototype.
    pub fn with_null_proto(context: &mut Context) -> Self {
        Self::from_proto_and_data(None, ObjectData::ordinary(), context)
    }

    /// Immutably borrows the object.
    ///
    /// # Panics
    ///
    /// Panics if the object is currently mutably borrowed.
    #[track_caller]
    pub fn borrow(&self) -> GcRef<'_, Object> {
        self.inner.borrow()
    }

    /// Mutably borrows the object.
    ///
    /// # Panics
    ///
    /// Panics if the object is currently borrowed.
    #[track_caller]
    pub fn borrow_mut(&self) -> GcRefMut<'_, Object> {
        self.inner.borrow_mut()
    }

    /// Returns `true` if both handles point at the same object.
    #[inline]
    pub fn equals(lhs: &Self, rhs: &Self) -> bool {
        Gc::ptr_eq(&lhs.inner, &rhs.inner)
    }

    /// A stable address-based identity for inline caches.
    pub(crate) fn addr(&self) -> usize {
        self.inner.addr()
    }

    /// Returns `true` if the object has a `[[Call]]` internal method.
    pub fn is_callable(&self) -> bool {
        self.borrow().data.internal_methods.__call__.is_some()
    }

    /// Returns `true` if the object has a `[[Construct]]` internal method.
    pub fn is_constructor(&self) -> bool {
        self.borrow().data.internal_methods.__construct__.is_some()
    }

    /// The prototype of the object, read without the meta-object protocol.
    pub fn prototype(&self) -> JsPrototype {
        self.borrow().prototype.clone()
    }

    /// The host data tag, or `None` when the object is not a native object.
    ///
    /// This is the downcast pattern for embedders: compare the returned tag
    /// with the one the object was created with before touching the data.
    pub fn get_tag(&self) -> Option<usize> {
        self.borrow().as_native().map(|native| native.tag)
    }
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JsObject({:p})", self.inner.addr() as *const u8)
    }
}

impl Finalize for JsObject {}

// SAFETY: the handle's single edge is the object cell.
unsafe impl Trace for JsObject {
    custom_trace!(this, mark, {
        mark(&this.inner);
    });
}

impl Finalize for Object {}

// SAFETY: all owned values, the property table, the prototype and the
// private elements are traced.
unsafe impl Trace for Object {
    custom_trace!(this, mark, {
        mark(&this.data.kind);
        mark(&this.properties);
        if let Some(proto) = &this.prototype {
            mark(proto);
        }
        for (_, element) in &this.private_elements {
            mark(element);
        }
    });
}

impl Finalize for ObjectKind {}

// SAFETY: every kind marks its own edges.
unsafe impl Trace for ObjectKind {
    custom_trace!(this, mark, {
        match this {
            ObjectKind::Ordinary
            | ObjectKind::Array
            | ObjectKind::Arguments
            | ObjectKind::StringExotic(_)
            | ObjectKind::Error(_) => {}
            ObjectKind::MappedArguments(map) => mark(map),
            ObjectKind::Function(function) => mark(function),
            ObjectKind::BoundFunction(bound) => {
                mark(&bound.target);
                mark(&bound.this);
                mark(&bound.args);
            }
            ObjectKind::Proxy(proxy) => {
                if let Some(target) = &proxy.target {
                    mark(target);
                }
                if let Some(handler) = &proxy.handler {
                    mark(handler);
                }
            }
            ObjectKind::BoxedPrimitive(value) => mark(value),
            ObjectKind::IntegerIndexed(_) => {}
            ObjectKind::ModuleNamespace(namespace) => mark(&namespace.module),
            ObjectKind::ForInIterator(iterator) => mark(iterator),
            ObjectKind::ArrayIterator(iterator) => mark(iterator),
            ObjectKind::Generator(generator) => mark(generator),
            ObjectKind::AsyncGenerator(generator) => mark(generator),
            ObjectKind::Promise(promise) => mark(promise),
            ObjectKind::AsyncFromSyncIterator(iterator) => mark(iterator),
            ObjectKind::Native(native) => mark(&native.data),
        }
    });
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("extensible", &self.extensible)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Creates the `String` exotic wrapper for [`JsValue::to_object`].
pub(crate) fn string_wrapper(string: JsString, context: &mut Context) -> JsObject {
    let proto = context.intrinsics().object_prototype();
    let len = string.len();
    let object =
        JsObject::from_proto_and_data(Some(proto), ObjectData::string_exotic(string), context);
    object.borrow_mut().properties_mut().insert(
        &PropertyKey::from("length"),
        PropertyDescriptor::builder()
            .value(len as i32)
            .writable(false)
            .enumerable(false)
            .configurable(false)
            .build(),
    );
    object
}

/// Creates the wrapper object for non-string primitives.
pub(crate) fn primitive_wrapper(value: JsValue, context: &mut Context) -> JsObject {
    let proto = context.intrinsics().object_prototype();
    JsObject::from_proto_and_data(Some(proto), ObjectData::boxed_primitive(value), context)
}
