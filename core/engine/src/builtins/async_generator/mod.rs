//! Async generator objects: the generator protocol with every settlement
//! deferred through promises, and a request queue serializing resumptions.

use std::collections::VecDeque;

use kestrel_gc::{custom_trace, Finalize, Trace};

use super::BuiltInBuilder;
use crate::builtins::function::{
    invoke_with_env, prepare_function_environment, OrdinaryFunction,
};
use crate::builtins::iterable::create_iter_result_object;
use crate::builtins::promise::{
    perform_promise_then, promise_resolve, PromiseCapability, ReactionHandler,
};
use crate::context::Context;
use crate::error::JsError;
use crate::error::JsNativeError;
use crate::object::{JsObject, ObjectData};
use crate::symbol::JsSymbol;
use crate::value::JsValue;
use crate::vm::{CallFrame, CompletionRecord, Resume, ResumeKind};
use crate::JsResult;

/// A queued `next`/`return`/`throw` request.
#[derive(Debug)]
pub struct AsyncGeneratorRequest {
    kind: ResumeKind,
    value: JsValue,
    capability: PromiseCapability,
}

impl Finalize for AsyncGeneratorRequest {}

// SAFETY: the sent value and the result capability are edges.
unsafe impl Trace for AsyncGeneratorRequest {
    custom_trace!(this, mark, {
        mark(&this.value);
        mark(&this.capability);
    });
}

/// The coarse state of an async generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AsyncGeneratorState {
    /// Suspended after the prologue.
    #[default]
    SuspendedStart,
    /// Suspended at a `yield`.
    SuspendedYield,
    /// Running or awaiting.
    Executing,
    /// Finished.
    Completed,
}

/// The internal representation of an async generator object.
#[derive(Debug, Default)]
pub struct AsyncGenerator {
    pub(crate) state: AsyncGeneratorState,
    frame: Option<Box<CallFrame>>,
    queue: VecDeque<AsyncGeneratorRequest>,
}

impl Finalize for AsyncGenerator {}

// SAFETY: the parked frame and every queued request are edges.
unsafe impl Trace for AsyncGenerator {
    custom_trace!(this, mark, {
        if let Some(frame) = &this.frame {
            mark(&**frame);
        }
        for request in &this.queue {
            mark(request);
        }
    });
}

/// Calling an async generator function.
pub(crate) fn create(
    function_obj: &JsObject,
    ordinary: &OrdinaryFunction,
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let env = prepare_function_environment(function_obj, ordinary, this, None, None, context)?;
    let (record, frame) = invoke_with_env(function_obj, ordinary, env, args, context)?;
    match record {
        CompletionRecord::GeneratorStart => {}
        CompletionRecord::Throw(err) => return Err(err),
        _ => {
            return Err(JsNativeError::typ()
                .with_message("async generator body completed before suspending")
                .into())
        }
    }

    let proto = match function_obj.get("prototype", context)? {
        JsValue::Object(proto) => proto,
        _ => context.intrinsics().async_generator_prototype(),
    };
    let generator = JsObject::from_proto_and_data(
        Some(proto),
        ObjectData::async_generator(AsyncGenerator {
            state: AsyncGeneratorState::SuspendedStart,
            frame: Some(frame),
            queue: VecDeque::new(),
        }),
        context,
    );
    Ok(generator.into())
}

/// `AsyncGeneratorEnqueue ( generator, completion )`
fn enqueue(
    this: &JsValue,
    kind: ResumeKind,
    value: JsValue,
    context: &mut Context,
) -> JsResult<JsValue> {
    let capability = PromiseCapability::new_intrinsic(context);

    let Some(generator_obj) = this.as_object().cloned() else {
        capability.reject_with_error(
            &JsNativeError::typ()
                .with_message("async generator method called on a non-object")
                .into(),
            context,
        )?;
        return Ok(capability.promise().clone().into());
    };
    {
        let mut borrow = generator_obj.borrow_mut();
        let Some(generator) = borrow.as_async_generator_mut() else {
            drop(borrow);
            capability.reject_with_error(
                &JsNativeError::typ()
                    .with_message("async generator method called on the wrong object")
                    .into(),
                context,
            )?;
            return Ok(capability.promise().clone().into());
        };
        generator.queue.push_back(AsyncGeneratorRequest {
            kind,
            value,
            capability: capability.clone(),
        });
    }

    drain(&generator_obj, context)?;
    Ok(capability.promise().clone().into())
}

/// Pumps queued requests while the generator is suspended.
fn drain(generator_obj: &JsObject, context: &mut Context) -> JsResult<()> {
    loop {
        // Pull the next request only when resumable.
        let next = {
            let mut borrow = generator_obj.borrow_mut();
            let generator = borrow
                .as_async_generator_mut()
                .expect("drain called on an async generator");
            match generator.state {
                AsyncGeneratorState::Executing => return Ok(()),
                AsyncGeneratorState::Completed => {
                    let request = generator.queue.pop_front();
                    drop(borrow);
                    match request {
                        None => return Ok(()),
                        Some(request) => {
                            settle_completed_request(request, context)?;
                            continue;
                        }
                    }
                }
                AsyncGeneratorState::SuspendedStart | AsyncGeneratorState::SuspendedYield => {
                    if generator.queue.is_empty() {
                        return Ok(());
                    }
                    let fresh = generator.state == AsyncGeneratorState::SuspendedStart;
                    generator.state = AsyncGeneratorState::Executing;
                    let frame = generator.frame.take().expect("suspended without a frame");
                    let request = generator.queue.front().expect("checked non-empty");
                    (frame, request.kind, request.value.clone(), fresh)
                }
            }
        };
        let (mut frame, kind, value, fresh) = next;

        // Abrupt resumption of a fresh generator closes it without running.
        if fresh && kind != ResumeKind::Normal {
            let request = pop_request(generator_obj);
            set_state(generator_obj, AsyncGeneratorState::Completed, None);
            if let Some(request) = request {
                match kind {
                    ResumeKind::Return => {
                        let result = create_iter_result_object(request.value, true, context);
                        request.capability.resolve_with(result, context)?;
                    }
                    _ => request.capability.reject_with(request.value, context)?,
                }
            }
            continue;
        }

        if !fresh {
            frame.resume = Some(Resume { kind, value });
        }
        context.vm.push_frame(*frame);
        let record = crate::vm::run(context);
        let frame = context.vm.pop_frame();
        if !handle_completion(generator_obj, record, frame, context)? {
            return Ok(());
        }
    }
}

/// Applies one run segment's completion. Returns `false` when the drive
/// loop must stop (an `await` is pending).
fn handle_completion(
    generator_obj: &JsObject,
    record: CompletionRecord,
    frame: Box<CallFrame>,
    context: &mut Context,
) -> JsResult<bool> {
    match record {
        CompletionRecord::Await(value) => {
            set_state(generator_obj, AsyncGeneratorState::Executing, Some(frame));
            let promise = promise_resolve(value, context)?;
            perform_promise_then(
                &promise,
                Some(ReactionHandler::AsyncGeneratorAwait(generator_obj.clone())),
                Some(ReactionHandler::AsyncGeneratorAwait(generator_obj.clone())),
                None,
                context,
            );
            Ok(false)
        }
        CompletionRecord::Yield(value) => {
            set_state(
                generator_obj,
                AsyncGeneratorState::SuspendedYield,
                Some(frame),
            );
            if let Some(request) = pop_request(generator_obj) {
                let result = create_iter_result_object(value, false, context);
                request.capability.resolve_with(result, context)?;
            }
            Ok(true)
        }
        CompletionRecord::Normal(value) => {
            set_state(generator_obj, AsyncGeneratorState::Completed, None);
            if let Some(request) = pop_request(generator_obj) {
                let result = create_iter_result_object(value, true, context);
                request.capability.resolve_with(result, context)?;
            }
            Ok(true)
        }
        CompletionRecord::Throw(err) => {
            set_state(generator_obj, AsyncGeneratorState::Completed, None);
            if let Some(request) = pop_request(generator_obj) {
                request.capability.reject_with_error(&err, context)?;
            }
            Ok(true)
        }
        CompletionRecord::GeneratorStart => Err(JsNativeError::typ()
            .with_message("async generator restarted unexpectedly")
            .into()),
    }
}

/// Continues the generator once an awaited promise settles.
pub(crate) fn resume_await(
    generator_obj: &JsObject,
    kind: ResumeKind,
    value: JsValue,
    context: &mut Context,
) -> JsResult<()> {
    let frame = {
        let mut borrow = generator_obj.borrow_mut();
        let Some(generator) = borrow.as_async_generator_mut() else {
            return Err(JsNativeError::typ()
                .with_message("await resumed on a non async generator")
                .into());
        };
        generator.frame.take()
    };
    let Some(mut frame) = frame else {
        return Err(JsNativeError::typ()
            .with_message("async generator resumed twice")
            .into());
    };
    frame.resume = Some(Resume { kind, value });
    context.vm.push_frame(*frame);
    let record = crate::vm::run(context);
    let frame = context.vm.pop_frame();
    if handle_completion(generator_obj, record, frame, context)? {
        drain(generator_obj, context)?;
    }
    Ok(())
}

fn settle_completed_request(
    request: AsyncGeneratorRequest,
    context: &mut Context,
) -> JsResult<()> {
    match request.kind {
        ResumeKind::Normal => {
            let result = create_iter_result_object(JsValue::undefined(), true, context);
            request.capability.resolve_with(result, context)
        }
        ResumeKind::Return => {
            let result = create_iter_result_object(request.value, true, context);
            request.capability.resolve_with(result, context)
        }
        ResumeKind::Throw => request
            .capability
            .reject_with_error(&JsError::from_opaque(request.value), context),
    }
}

fn pop_request(generator_obj: &JsObject) -> Option<AsyncGeneratorRequest> {
    generator_obj
        .borrow_mut()
        .as_async_generator_mut()
        .and_then(|generator| generator.queue.pop_front())
}

fn set_state(generator_obj: &JsObject, state: AsyncGeneratorState, frame: Option<Box<CallFrame>>) {
    if let Some(generator) = generator_obj.borrow_mut().as_async_generator_mut() {
        generator.state = state;
        generator.frame = frame;
    }
}

/// `AsyncGenerator.prototype.next ( value )`
fn async_generator_next(
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    enqueue(
        this,
        ResumeKind::Normal,
        args.first().cloned().unwrap_or_default(),
        context,
    )
}

/// `AsyncGenerator.prototype.return ( value )`
fn async_generator_return(
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    enqueue(
        this,
        ResumeKind::Return,
        args.first().cloned().unwrap_or_default(),
        context,
    )
}

/// `AsyncGenerator.prototype.throw ( exception )`
fn async_generator_throw(
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    enqueue(
        this,
        ResumeKind::Throw,
        args.first().cloned().unwrap_or_default(),
        context,
    )
}

/// Wires `%AsyncGeneratorPrototype%` into the realm.
pub(crate) fn init(context: &mut Context) {
    let prototype = context.intrinsics().async_generator_prototype();
    BuiltInBuilder::new(&prototype, context)
        .method(async_generator_next, "next", 1)
        .method(async_generator_return, "return", 1)
        .method(async_generator_throw, "throw", 1);

    fn identity(this: &JsValue, _: &[JsValue], _: &mut Context) -> JsResult<JsValue> {
        Ok(this.clone())
    }
    let prototype = context.intrinsics().async_generator_prototype();
    BuiltInBuilder::new(&prototype, context).symbol_method(
        identity,
        JsSymbol::async_iterator(),
        "[Symbol.asyncIterator]",
        0,
    );
}
