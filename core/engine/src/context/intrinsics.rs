//! The intrinsic objects of a realm.

use kestrel_gc::{custom_trace, Finalize, Heap, Trace};

use crate::error::JsNativeErrorKind;
use crate::object::{JsObject, ObjectData};

/// Every built-in object the engine core dispatches through.
///
/// The objects are allocated bare during realm bootstrap and populated with
/// their methods by [`crate::builtins::initialize`] once a context exists.
#[derive(Debug, Clone)]
pub struct Intrinsics {
    pub(crate) object_prototype: JsObject,
    pub(crate) function_prototype: JsObject,
    pub(crate) array_prototype: JsObject,
    pub(crate) iterator_prototype: JsObject,
    pub(crate) array_iterator_prototype: JsObject,
    pub(crate) generator_prototype: JsObject,
    pub(crate) async_generator_prototype: JsObject,
    pub(crate) async_from_sync_iterator_prototype: JsObject,
    pub(crate) promise_prototype: JsObject,
    pub(crate) error_prototypes: ErrorIntrinsics,
    pub(crate) eval_function: std::rc::Rc<std::cell::OnceCell<JsObject>>,
}

/// One object per native error kind.
#[derive(Debug, Clone)]
pub struct ErrorIntrinsics {
    pub(crate) error: JsObject,
    pub(crate) type_error: JsObject,
    pub(crate) range_error: JsObject,
    pub(crate) reference_error: JsObject,
    pub(crate) syntax_error: JsObject,
    pub(crate) uri_error: JsObject,
}

impl ErrorIntrinsics {
    /// The object for `kind`.
    pub fn get(&self, kind: JsNativeErrorKind) -> JsObject {
        match kind {
            JsNativeErrorKind::Error => self.error.clone(),
            JsNativeErrorKind::Type => self.type_error.clone(),
            JsNativeErrorKind::Range => self.range_error.clone(),
            JsNativeErrorKind::Reference => self.reference_error.clone(),
            JsNativeErrorKind::Syntax => self.syntax_error.clone(),
            JsNativeErrorKind::Uri => self.uri_error.clone(),
        }
    }
}

impl Intrinsics {
    /// Allocates the bare intrinsic objects with their prototype chains
    /// wired up.
    pub(crate) fn allocate(heap: &mut Heap) -> Self {
        let object_prototype = JsObject::alloc_raw(heap, None, ObjectData::ordinary());
        let plain =
            |heap: &mut Heap| JsObject::alloc_raw(heap, Some(object_prototype.clone()), ObjectData::ordinary());

        let function_prototype = plain(heap);
        let array_prototype = plain(heap);
        let iterator_prototype = plain(heap);
        let array_iterator_prototype =
            JsObject::alloc_raw(heap, Some(iterator_prototype.clone()), ObjectData::ordinary());
        let generator_prototype =
            JsObject::alloc_raw(heap, Some(iterator_prototype.clone()), ObjectData::ordinary());
        let async_generator_prototype = plain(heap);
        let async_from_sync_iterator_prototype = plain(heap);
        let promise_prototype = plain(heap);

        let error = plain(heap);
        let error_prototypes = ErrorIntrinsics {
            type_error: JsObject::alloc_raw(heap, Some(error.clone()), ObjectData::ordinary()),
            range_error: JsObject::alloc_raw(heap, Some(error.clone()), ObjectData::ordinary()),
            reference_error: JsObject::alloc_raw(heap, Some(error.clone()), ObjectData::ordinary()),
            syntax_error: JsObject::alloc_raw(heap, Some(error.clone()), ObjectData::ordinary()),
            uri_error: JsObject::alloc_raw(heap, Some(error.clone()), ObjectData::ordinary()),
            error,
        };

        Self {
            object_prototype,
            function_prototype,
            array_prototype,
            iterator_prototype,
            array_iterator_prototype,
            generator_prototype,
            async_generator_prototype,
            async_from_sync_iterator_prototype,
            promise_prototype,
            error_prototypes,
            eval_function: std::rc::Rc::new(std::cell::OnceCell::new()),
        }
    }

    /// `%Object.prototype%`
    pub fn object_prototype(&self) -> JsObject {
        self.object_prototype.clone()
    }

    /// `%Function.prototype%`
    pub fn function_prototype(&self) -> JsObject {
        self.function_prototype.clone()
    }

    /// `%Array.prototype%`
    pub fn array_prototype(&self) -> JsObject {
        self.array_prototype.clone()
    }

    /// `%IteratorPrototype%`
    pub fn iterator_prototype(&self) -> JsObject {
        self.iterator_prototype.clone()
    }

    /// `%GeneratorPrototype%`
    pub fn generator_prototype(&self) -> JsObject {
        self.generator_prototype.clone()
    }

    /// `%AsyncGeneratorPrototype%`
    pub fn async_generator_prototype(&self) -> JsObject {
        self.async_generator_prototype.clone()
    }

    /// `%Promise.prototype%`
    pub fn promise_prototype(&self) -> JsObject {
        self.promise_prototype.clone()
    }

    /// `%eval%`, used for the direct-eval identity check.
    pub fn eval_function(&self) -> Option<JsObject> {
        self.eval_function.get().cloned()
    }

    /// The prototype for error objects of `kind`.
    pub fn error_prototype(&self, kind: JsNativeErrorKind) -> JsObject {
        self.error_prototypes.get(kind)
    }
}

impl Finalize for Intrinsics {}

// SAFETY: every intrinsic object is marked.
unsafe impl Trace for Intrinsics {
    custom_trace!(this, mark, {
        mark(&this.object_prototype);
        mark(&this.function_prototype);
        mark(&this.array_prototype);
        mark(&this.iterator_prototype);
        mark(&this.array_iterator_prototype);
        mark(&this.generator_prototype);
        mark(&this.async_generator_prototype);
        mark(&this.async_from_sync_iterator_prototype);
        mark(&this.promise_prototype);
        let errors = &this.error_prototypes;
        mark(&errors.error);
        mark(&errors.type_error);
        mark(&errors.range_error);
        mark(&errors.reference_error);
        mark(&errors.syntax_error);
        mark(&errors.uri_error);
        if let Some(eval) = this.eval_function.get() {
            mark(eval);
        }
    });
}
