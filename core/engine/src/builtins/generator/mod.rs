//! Generator objects: heap-resident suspended frames resumed by
//! `next`/`return`/`throw`.

use kestrel_gc::{custom_trace, Finalize, Trace};

use super::BuiltInBuilder;
use crate::builtins::function::{
    invoke_with_env, prepare_function_environment, OrdinaryFunction,
};
use crate::builtins::iterable::create_iter_result_object;
use crate::context::Context;
use crate::error::{JsError, JsNativeError};
use crate::object::{JsObject, ObjectData};
use crate::value::JsValue;
use crate::vm::{CallFrame, CompletionRecord, Resume, ResumeKind};
use crate::JsResult;

/// Indicates the state of a generator.
#[derive(Debug, Default)]
pub enum GeneratorState {
    /// Suspended right after the prologue, before the first `next`.
    SuspendedStart {
        /// The saved activation.
        frame: Box<CallFrame>,
    },
    /// Suspended at a `yield`.
    SuspendedYield {
        /// The saved activation.
        frame: Box<CallFrame>,
    },
    /// Currently running; re-entry is a `TypeError`.
    Executing,
    /// Ran to completion (or was closed).
    #[default]
    Completed,
}

impl Finalize for GeneratorState {}

// SAFETY: a suspended frame holds strong references to all its registers
// and state; tracing it keeps them alive exactly like an active frame.
unsafe impl Trace for GeneratorState {
    custom_trace!(this, mark, {
        match this {
            GeneratorState::SuspendedStart { frame }
            | GeneratorState::SuspendedYield { frame } => mark(&**frame),
            GeneratorState::Executing | GeneratorState::Completed => {}
        }
    });
}

/// The internal representation of a `Generator` object.
#[derive(Debug, Default)]
pub struct Generator {
    /// The `[[GeneratorState]]` internal slot.
    pub(crate) state: GeneratorState,
}

impl Finalize for Generator {}

// SAFETY: delegates to the state.
unsafe impl Trace for Generator {
    custom_trace!(this, mark, {
        mark(&this.state);
    });
}

/// Calling a generator function: run the prologue, capture the frame,
/// hand back a fresh generator object.
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
                .with_message("generator body completed before suspending")
                .into())
        }
    }

    let proto = match function_obj.get("prototype", context)? {
        JsValue::Object(proto) => proto,
        _ => context.intrinsics().generator_prototype(),
    };
    let generator = JsObject::from_proto_and_data(
        Some(proto),
        ObjectData::generator(Generator {
            state: GeneratorState::SuspendedStart { frame },
        }),
        context,
    );
    Ok(generator.into())
}

/// `GeneratorResume` / `GeneratorResumeAbrupt`
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-generatorresume
pub(crate) fn resume(
    this: &JsValue,
    kind: ResumeKind,
    value: JsValue,
    context: &mut Context,
) -> JsResult<JsValue> {
    let Some(generator_obj) = this.as_object().cloned() else {
        return Err(JsNativeError::typ()
            .with_message("generator method called on a non-generator")
            .into());
    };

    let state = {
        let mut borrow = generator_obj.borrow_mut();
        let Some(generator) = borrow.as_generator_mut() else {
            return Err(JsNativeError::typ()
                .with_message("generator method called on a non-generator")
                .into());
        };
        std::mem::replace(&mut generator.state, GeneratorState::Executing)
    };

    let frame = match state {
        GeneratorState::Executing => {
            return Err(JsNativeError::typ()
                .with_message("generator is already running")
                .into());
        }
        GeneratorState::Completed => {
            set_state(&generator_obj, GeneratorState::Completed);
            return match kind {
                ResumeKind::Normal | ResumeKind::Return => {
                    Ok(create_iter_result_object(value, true, context))
                }
                ResumeKind::Throw => Err(JsError::from_opaque(value)),
            };
        }
        GeneratorState::SuspendedStart { frame } => {
            // Abrupt resumes close a fresh generator without running it.
            if kind != ResumeKind::Normal {
                set_state(&generator_obj, GeneratorState::Completed);
                return match kind {
                    ResumeKind::Return => Ok(create_iter_result_object(value, true, context)),
                    _ => Err(JsError::from_opaque(value)),
                };
            }
            frame
        }
        GeneratorState::SuspendedYield { mut frame } => {
            frame.resume = Some(Resume { kind, value });
            frame
        }
    };
    // A fresh generator resumes with no value to deliver; the frame simply
    // continues past its prologue.

    context.vm.push_frame(*frame);
    let record = crate::vm::run(context);
    let frame = context.vm.pop_frame();

    match record {
        CompletionRecord::Yield(value) => {
            set_state(&generator_obj, GeneratorState::SuspendedYield { frame });
            Ok(create_iter_result_object(value, false, context))
        }
        CompletionRecord::Normal(value) => {
            set_state(&generator_obj, GeneratorState::Completed);
            Ok(create_iter_result_object(value, true, context))
        }
        CompletionRecord::Throw(err) => {
            set_state(&generator_obj, GeneratorState::Completed);
            Err(err)
        }
        _ => {
            set_state(&generator_obj, GeneratorState::Completed);
            Err(JsNativeError::typ()
                .with_message("generator suspended through a foreign protocol")
                .into())
        }
    }
}

fn set_state(generator_obj: &JsObject, state: GeneratorState) {
    if let Some(generator) = generator_obj.borrow_mut().as_generator_mut() {
        generator.state = state;
    }
}

/// `Generator.prototype.next ( value )`
fn generator_next(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    resume(
        this,
        ResumeKind::Normal,
        args.first().cloned().unwrap_or_default(),
        context,
    )
}

/// `Generator.prototype.return ( value )`
fn generator_return(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    resume(
        this,
        ResumeKind::Return,
        args.first().cloned().unwrap_or_default(),
        context,
    )
}

/// `Generator.prototype.throw ( exception )`
fn generator_throw(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    resume(
        this,
        ResumeKind::Throw,
        args.first().cloned().unwrap_or_default(),
        context,
    )
}

/// Wires `%GeneratorPrototype%` into the realm.
pub(crate) fn init(context: &mut Context) {
    let prototype = context.intrinsics().generator_prototype();
    BuiltInBuilder::new(&prototype, context)
        .method(generator_next, "next", 1)
        .method(generator_return, "return", 1)
        .method(generator_throw, "throw", 1);
}
