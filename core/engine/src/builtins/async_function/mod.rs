//! Async functions: promise-backed coroutines.
//!
//! An async call runs synchronously until its first `await`, then detaches
//! the frame into an [`AsyncTask`] and returns the pending promise; promise
//! reactions reinstall the frame through the job queue.

use kestrel_gc::{custom_trace, Finalize, Gc, GcRefCell, Trace};

use crate::builtins::function::{
    invoke_with_env, prepare_function_environment, OrdinaryFunction,
};
use crate::builtins::promise::{
    perform_promise_then, promise_resolve, PromiseCapability, ReactionHandler,
};
use crate::context::Context;
use crate::error::JsNativeError;
use crate::object::JsObject;
use crate::value::JsValue;
use crate::vm::{CallFrame, CompletionRecord, Resume, ResumeKind};
use crate::JsResult;

/// The suspension state of one async function invocation.
#[derive(Debug)]
pub struct AsyncTask {
    frame: Option<Box<CallFrame>>,
    capability: PromiseCapability,
}

impl Finalize for AsyncTask {}

// SAFETY: the parked frame and the result capability are edges.
unsafe impl Trace for AsyncTask {
    custom_trace!(this, mark, {
        if let Some(frame) = &this.frame {
            mark(&**frame);
        }
        mark(&this.capability);
    });
}

/// `[[Call]]` of an async function.
pub(crate) fn call(
    function_obj: &JsObject,
    ordinary: &OrdinaryFunction,
    this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let capability = PromiseCapability::new_intrinsic(context);

    let env = prepare_function_environment(function_obj, ordinary, this, None, None, context)?;
    let (record, frame) = invoke_with_env(function_obj, ordinary, env, args, context)?;

    let task = context.heap().alloc(GcRefCell::new(AsyncTask {
        frame: None,
        capability: capability.clone(),
    }));
    step(&task, record, frame, context)?;
    Ok(capability.promise().clone().into())
}

/// Handles one run segment's completion: park on `await`, settle on
/// return/throw.
fn step(
    task: &Gc<GcRefCell<AsyncTask>>,
    record: CompletionRecord,
    frame: Box<CallFrame>,
    context: &mut Context,
) -> JsResult<()> {
    let capability = task.borrow().capability.clone();
    match record {
        CompletionRecord::Await(value) => {
            task.borrow_mut().frame = Some(frame);
            let promise = promise_resolve(value, context)?;
            perform_promise_then(
                &promise,
                Some(ReactionHandler::Await(task.clone())),
                Some(ReactionHandler::Await(task.clone())),
                None,
                context,
            );
            Ok(())
        }
        CompletionRecord::Normal(value) => capability.resolve_with(value, context),
        CompletionRecord::Throw(err) => capability.reject_with_error(&err, context),
        _ => Err(JsNativeError::typ()
            .with_message("async function suspended through a foreign protocol")
            .into()),
    }
}

/// Drives a caller-built frame (a module body with top-level `await`)
/// through the async machinery, settling `capability` when the body
/// completes.
pub(crate) fn drive_frame(
    frame: CallFrame,
    capability: PromiseCapability,
    context: &mut Context,
) -> JsResult<()> {
    context.vm.push_frame(frame);
    let record = crate::vm::run(context);
    let frame = context.vm.pop_frame();
    let task = context.heap().alloc(GcRefCell::new(AsyncTask {
        frame: None,
        capability,
    }));
    step(&task, record, frame, context)
}

/// Resumes a parked async function from a settled `await`.
pub(crate) fn resume(
    task: Gc<GcRefCell<AsyncTask>>,
    kind: ResumeKind,
    value: JsValue,
    context: &mut Context,
) -> JsResult<()> {
    let Some(mut frame) = task.borrow_mut().frame.take() else {
        return Err(JsNativeError::typ()
            .with_message("async task resumed twice")
            .into());
    };
    frame.resume = Some(Resume { kind, value });

    context.vm.push_frame(*frame);
    let record = crate::vm::run(context);
    let frame = context.vm.pop_frame();
    step(&task, record, frame, context)
}
