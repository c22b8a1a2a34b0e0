//! The `Promise` built-in and the reaction machinery behind `await`.

use std::cell::Cell;
use std::rc::Rc;

use kestrel_gc::{custom_trace, Finalize, Gc, GcRefCell, Trace};

use super::BuiltInBuilder;
use crate::builtins::async_function::AsyncTask;
use crate::builtins::function::{Function, FunctionKind};
use crate::context::Context;
use crate::error::{JsError, JsNativeError};
use crate::job::Job;
use crate::module::Module;
use crate::object::{JsObject, ObjectData};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::value::JsValue;
use crate::JsResult;

/// The current state of a [`Promise`].
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    /// The promise hasn't been settled.
    Pending,
    /// The promise was fulfilled with a success value.
    Fulfilled(JsValue),
    /// The promise was rejected with a failure reason.
    Rejected(JsValue),
}

/// The internal representation of a `Promise` object.
#[derive(Debug)]
pub struct Promise {
    state: PromiseState,
    fulfill_reactions: Vec<ReactionRecord>,
    reject_reactions: Vec<ReactionRecord>,
    handled: bool,
}

impl Promise {
    /// The state of the promise.
    pub fn state(&self) -> &PromiseState {
        &self.state
    }
}

impl Finalize for Promise {}

// SAFETY: the settled value and every queued reaction are edges.
unsafe impl Trace for Promise {
    custom_trace!(this, mark, {
        match &this.state {
            PromiseState::Fulfilled(value) | PromiseState::Rejected(value) => mark(value),
            PromiseState::Pending => {}
        }
        mark(&this.fulfill_reactions);
        mark(&this.reject_reactions);
    });
}

/// Whether a reaction handles fulfillment or rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReactionType {
    Fulfill,
    Reject,
}

/// The handler of a reaction: a script callback or one of the engine's
/// internal continuations.
#[derive(Debug, Clone)]
pub(crate) enum ReactionHandler {
    /// A script function.
    Callback(JsObject),
    /// Resume a suspended async function.
    Await(Gc<GcRefCell<AsyncTask>>),
    /// Resume a suspended async generator.
    AsyncGeneratorAwait(JsObject),
    /// Repackage an async-from-sync iterator step.
    AsyncFromSyncUnwrap {
        /// The `done` flag remembered from the sync step.
        done: bool,
    },
    /// Continue module evaluation after an async dependency settles.
    Module(Module),
}

impl Finalize for ReactionHandler {}

// SAFETY: each variant marks its continuation state.
unsafe impl Trace for ReactionHandler {
    custom_trace!(this, mark, {
        match this {
            ReactionHandler::Callback(callback) => mark(callback),
            ReactionHandler::Await(task) => mark(task),
            ReactionHandler::AsyncGeneratorAwait(generator) => mark(generator),
            ReactionHandler::AsyncFromSyncUnwrap { .. } => {}
            ReactionHandler::Module(module) => mark(module),
        }
    });
}

/// The internal `PromiseReaction` record.
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-promisereaction-records
#[derive(Debug, Clone)]
pub(crate) struct ReactionRecord {
    pub(crate) capability: Option<PromiseCapability>,
    pub(crate) reaction_type: ReactionType,
    pub(crate) handler: Option<ReactionHandler>,
}

impl Finalize for ReactionRecord {}

// SAFETY: capability and handler are the edges.
unsafe impl Trace for ReactionRecord {
    custom_trace!(this, mark, {
        if let Some(capability) = &this.capability {
            mark(capability);
        }
        if let Some(handler) = &this.handler {
            mark(handler);
        }
    });
}

/// The internal `PromiseCapability` record.
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-promisecapability-records
#[derive(Debug, Clone)]
pub struct PromiseCapability {
    promise: JsObject,
    resolve: JsObject,
    reject: JsObject,
}

impl PromiseCapability {
    /// Creates a capability over a fresh intrinsic promise.
    pub fn new_intrinsic(context: &mut Context) -> Self {
        let promise = promise_create(context);
        let (resolve, reject) = create_resolving_functions(&promise, context);
        Self {
            promise,
            resolve,
            reject,
        }
    }

    /// The promise of the capability.
    pub fn promise(&self) -> &JsObject {
        &self.promise
    }

    /// Resolves the capability's promise.
    pub fn resolve_with(&self, value: JsValue, context: &mut Context) -> JsResult<()> {
        self.resolve
            .call(&JsValue::undefined(), &[value], context)?;
        Ok(())
    }

    /// Rejects the capability's promise.
    pub fn reject_with(&self, reason: JsValue, context: &mut Context) -> JsResult<()> {
        self.reject
            .call(&JsValue::undefined(), &[reason], context)?;
        Ok(())
    }

    /// Rejects with the opaque form of an engine error.
    pub fn reject_with_error(&self, error: &JsError, context: &mut Context) -> JsResult<()> {
        let reason = error.to_opaque(context);
        self.reject_with(reason, context)
    }
}

impl Finalize for PromiseCapability {}

// SAFETY: the promise and both settle functions are edges.
unsafe impl Trace for PromiseCapability {
    custom_trace!(this, mark, {
        mark(&this.promise);
        mark(&this.resolve);
        mark(&this.reject);
    });
}

/// Allocates a pending intrinsic promise.
pub fn promise_create(context: &mut Context) -> JsObject {
    let proto = context.intrinsics().promise_prototype();
    JsObject::from_proto_and_data(
        Some(proto),
        ObjectData::promise(Promise {
            state: PromiseState::Pending,
            fulfill_reactions: Vec::new(),
            reject_reactions: Vec::new(),
            handled: false,
        }),
        context,
    )
}

/// `CreateResolvingFunctions ( promise )`
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-createresolvingfunctions
pub(crate) fn create_resolving_functions(
    promise: &JsObject,
    context: &mut Context,
) -> (JsObject, JsObject) {
    let already = Rc::new(Cell::new(false));
    let proto = context.intrinsics().function_prototype();
    let mut make = |reject: bool, context: &mut Context| {
        let object = JsObject::from_proto_and_data(
            Some(proto.clone()),
            ObjectData::function(Function {
                kind: FunctionKind::PromiseResolving {
                    promise: promise.clone(),
                    already: already.clone(),
                    reject,
                },
            }),
            context,
        );
        crate::builtins::function::define_function_metadata(
            &object,
            &crate::string::JsString::empty(),
            1,
            context,
        );
        object
    };
    let resolve = make(false, context);
    let reject = make(true, context);
    (resolve, reject)
}

/// The behavior of both resolving functions.
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-promise-resolve-functions
pub(crate) fn resolving_function(
    promise: &JsObject,
    already: &Rc<Cell<bool>>,
    reject: bool,
    value: JsValue,
    context: &mut Context,
) -> JsResult<JsValue> {
    // 1. A settled pair goes inert.
    if already.get() {
        return Ok(JsValue::undefined());
    }
    already.set(true);

    if reject {
        reject_promise(promise, value, context);
        return Ok(JsValue::undefined());
    }

    // 7. Resolving a promise with itself is a TypeError rejection.
    if value
        .as_object()
        .is_some_and(|obj| JsObject::equals(obj, promise))
    {
        let reason = JsNativeError::typ()
            .with_message("cannot resolve a promise with itself")
            .to_opaque(context);
        reject_promise(promise, reason.into(), context);
        return Ok(JsValue::undefined());
    }

    // 8..9. Non-objects fulfill directly.
    let Some(object) = value.as_object().cloned() else {
        fulfill_promise(promise, value, context);
        return Ok(JsValue::undefined());
    };

    // 10..12. A thenable defers through a job; anything else fulfills.
    let then = match object.get("then", context) {
        Ok(then) => then,
        Err(err) => {
            let reason = err.to_opaque(context);
            reject_promise(promise, reason, context);
            return Ok(JsValue::undefined());
        }
    };
    match then.as_callable() {
        Some(then_callable) => {
            context.jobs.enqueue(Job::PromiseResolveThenable {
                promise: promise.clone(),
                thenable: value,
                then: then_callable.clone(),
            });
        }
        None => fulfill_promise(promise, value, context),
    }
    Ok(JsValue::undefined())
}

/// `FulfillPromise ( promise, value )`
pub(crate) fn fulfill_promise(promise: &JsObject, value: JsValue, context: &mut Context) {
    let reactions = {
        let mut borrow = promise.borrow_mut();
        let data = borrow.as_promise_mut().expect("resolving a non-promise");
        debug_assert!(data.state == PromiseState::Pending, "promise settled twice");
        data.state = PromiseState::Fulfilled(value.clone());
        data.reject_reactions.clear();
        std::mem::take(&mut data.fulfill_reactions)
    };
    trigger_promise_reactions(reactions, value, context);
}

/// `RejectPromise ( promise, reason )`
pub(crate) fn reject_promise(promise: &JsObject, reason: JsValue, context: &mut Context) {
    let (reactions, handled) = {
        let mut borrow = promise.borrow_mut();
        let data = borrow.as_promise_mut().expect("rejecting a non-promise");
        debug_assert!(data.state == PromiseState::Pending, "promise settled twice");
        data.state = PromiseState::Rejected(reason.clone());
        data.fulfill_reactions.clear();
        (std::mem::take(&mut data.reject_reactions), data.handled)
    };
    if !handled {
        context.jobs.track_rejection(promise.clone());
    }
    trigger_promise_reactions(reactions, reason, context);
}

/// `TriggerPromiseReactions ( reactions, argument )`
fn trigger_promise_reactions(
    reactions: Vec<ReactionRecord>,
    argument: JsValue,
    context: &mut Context,
) {
    for record in reactions {
        context.jobs.enqueue(Job::PromiseReaction {
            record,
            argument: argument.clone(),
        });
    }
}

/// `PerformPromiseThen ( promise, onFulfilled, onRejected, resultCapability )`
///
/// Reactions attached to an already settled promise still defer through the
/// job queue; nothing here runs handlers synchronously.
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-performpromisethen
pub(crate) fn perform_promise_then(
    promise: &JsObject,
    on_fulfilled: Option<ReactionHandler>,
    on_rejected: Option<ReactionHandler>,
    capability: Option<PromiseCapability>,
    context: &mut Context,
) {
    let fulfill_reaction = ReactionRecord {
        capability: capability.clone(),
        reaction_type: ReactionType::Fulfill,
        handler: on_fulfilled,
    };
    let reject_reaction = ReactionRecord {
        capability,
        reaction_type: ReactionType::Reject,
        handler: on_rejected,
    };

    let settled = {
        let mut borrow = promise.borrow_mut();
        let data = borrow.as_promise_mut().expect("then on a non-promise");
        match data.state.clone() {
            PromiseState::Pending => {
                data.fulfill_reactions.push(fulfill_reaction);
                data.reject_reactions.push(reject_reaction);
                data.handled = true;
                None
            }
            PromiseState::Fulfilled(value) => {
                data.handled = true;
                Some((fulfill_reaction, value))
            }
            PromiseState::Rejected(reason) => {
                data.handled = true;
                Some((reject_reaction, reason))
            }
        }
    };

    context.jobs.untrack_rejection(promise);
    if let Some((record, argument)) = settled {
        context.jobs.enqueue(Job::PromiseReaction { record, argument });
    }
}

/// `PromiseResolve ( C, x )` against the intrinsic constructor.
pub(crate) fn promise_resolve(value: JsValue, context: &mut Context) -> JsResult<JsObject> {
    if let Some(object) = value.as_object() {
        if object.borrow().as_promise().is_some() {
            return Ok(object.clone());
        }
    }
    let capability = PromiseCapability::new_intrinsic(context);
    capability.resolve_with(value, context)?;
    Ok(capability.promise().clone())
}

/// Runs one queued promise reaction job.
pub(crate) fn run_reaction_job(
    record: ReactionRecord,
    argument: JsValue,
    context: &mut Context,
) -> JsResult<()> {
    let handler_result: JsResult<JsValue> = match &record.handler {
        None => match record.reaction_type {
            ReactionType::Fulfill => Ok(argument.clone()),
            ReactionType::Reject => Err(JsError::from_opaque(argument.clone())),
        },
        Some(ReactionHandler::Callback(callback)) => {
            callback.call(&JsValue::undefined(), &[argument.clone()], context)
        }
        Some(ReactionHandler::Await(task)) => {
            let kind = match record.reaction_type {
                ReactionType::Fulfill => crate::vm::ResumeKind::Normal,
                ReactionType::Reject => crate::vm::ResumeKind::Throw,
            };
            crate::builtins::async_function::resume(task.clone(), kind, argument, context)?;
            return Ok(());
        }
        Some(ReactionHandler::AsyncGeneratorAwait(generator)) => {
            let kind = match record.reaction_type {
                ReactionType::Fulfill => crate::vm::ResumeKind::Normal,
                ReactionType::Reject => crate::vm::ResumeKind::Throw,
            };
            crate::builtins::async_generator::resume_await(generator, kind, argument, context)?;
            return Ok(());
        }
        Some(ReactionHandler::AsyncFromSyncUnwrap { done }) => {
            crate::builtins::iterable::AsyncFromSyncIterator::unwrap(*done, argument.clone(), context)
        }
        Some(ReactionHandler::Module(module)) => {
            match record.reaction_type {
                ReactionType::Fulfill => module.async_execution_fulfilled(context)?,
                ReactionType::Reject => {
                    module.async_execution_rejected(JsError::from_opaque(argument.clone()), context);
                }
            }
            return Ok(());
        }
    };

    match record.capability {
        None => {
            // Handlers without a capability must not fail.
            if let Err(err) = handler_result {
                log::error!("unhandled error in a promise reaction: {err}");
            }
            Ok(())
        }
        Some(capability) => match handler_result {
            Ok(value) => capability.resolve_with(value, context),
            Err(err) => capability.reject_with_error(&err, context),
        },
    }
}

/// Runs one queued resolve-thenable job.
pub(crate) fn run_resolve_thenable_job(
    promise: JsObject,
    thenable: JsValue,
    then: JsObject,
    context: &mut Context,
) -> JsResult<()> {
    let (resolve, reject) = create_resolving_functions(&promise, context);
    let result = then.call(
        &thenable,
        &[resolve.clone().into(), reject.clone().into()],
        context,
    );
    if let Err(err) = result {
        let reason = err.to_opaque(context);
        reject.call(&JsValue::undefined(), &[reason], context)?;
    }
    Ok(())
}

// ==================== Script-facing surface ====================

/// `Promise ( executor )`
fn promise_constructor(
    _new_target: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let Some(executor) = args.first().and_then(JsValue::as_callable).cloned() else {
        return Err(JsNativeError::typ()
            .with_message("Promise executor is not callable")
            .into());
    };
    let promise = promise_create(context);
    let (resolve, reject) = create_resolving_functions(&promise, context);
    let result = executor.call(
        &JsValue::undefined(),
        &[resolve.into(), reject.clone().into()],
        context,
    );
    if let Err(err) = result {
        let reason = err.to_opaque(context);
        reject.call(&JsValue::undefined(), &[reason], context)?;
    }
    Ok(promise.into())
}

/// `Promise.resolve ( x )`
fn promise_static_resolve(
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    Ok(promise_resolve(args.first().cloned().unwrap_or_default(), context)?.into())
}

/// `Promise.reject ( r )`
fn promise_static_reject(
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let capability = PromiseCapability::new_intrinsic(context);
    capability.reject_with(args.first().cloned().unwrap_or_default(), context)?;
    Ok(capability.promise().clone().into())
}

/// `Promise.prototype.then ( onFulfilled, onRejected )`
fn promise_prototype_then(
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let Some(promise) = this.as_object().filter(|o| o.borrow().as_promise().is_some()) else {
        return Err(JsNativeError::typ()
            .with_message("Promise.prototype.then called on a non-promise")
            .into());
    };
    let promise = promise.clone();
    let capability = PromiseCapability::new_intrinsic(context);
    let on_fulfilled = args
        .first()
        .and_then(JsValue::as_callable)
        .cloned()
        .map(ReactionHandler::Callback);
    let on_rejected = args
        .get(1)
        .and_then(JsValue::as_callable)
        .cloned()
        .map(ReactionHandler::Callback);
    perform_promise_then(
        &promise,
        on_fulfilled,
        on_rejected,
        Some(capability.clone()),
        context,
    );
    Ok(capability.promise().clone().into())
}

/// `Promise.prototype.catch ( onRejected )`
fn promise_prototype_catch(
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let args = [JsValue::undefined(), args.first().cloned().unwrap_or_default()];
    promise_prototype_then(this, &args, context)
}

/// Wires `Promise` into the realm.
pub(crate) fn init(context: &mut Context) {
    let prototype = context.intrinsics().promise_prototype();
    BuiltInBuilder::new(&prototype, context)
        .method(promise_prototype_then, "then", 2)
        .method(promise_prototype_catch, "catch", 1);

    let constructor = crate::builtins::function::native_constructor(
        promise_constructor,
        "Promise",
        1,
        context,
    );
    BuiltInBuilder::new(&constructor, context)
        .method(promise_static_resolve, "resolve", 1)
        .method(promise_static_reject, "reject", 1);
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
    super::define_global("Promise", constructor, context);
}
