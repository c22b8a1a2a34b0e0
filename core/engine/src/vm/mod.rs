//! The register-based interpreter.
//!
//! One [`CallFrame`] per activation; nested calls recurse through
//! [`JsObject::call`], while coroutines suspend by returning a
//! [`CompletionRecord`] from [`run`] with their frame left on the stack for
//! the driver to detach. Exceptions are values: every handler returns
//! `JsResult`, and the loop owns the single unwind path that walks the state
//! stack toward the innermost `try`.

mod call_frame;
mod code_block;
mod opcode;

pub use call_frame::{CallFrame, CallKind, Deferred, Resume, ResumeKind, StateFrame};
pub use code_block::{
    BindingRef, CodeBlock, CodeBlockFlags, PropertyRef, MAX_CODE_SIZE, MAX_REGISTERS,
};
pub use opcode::{InvalidOpcodeError, Opcode};

pub(crate) use opcode::{class_element_flags, NO_INDEX, NO_LABEL};

use kestrel_gc::{custom_trace, Finalize, Gc, Trace};

use crate::builtins::function::{ClassField, ClassFieldKey};
use crate::builtins::iterable::{get_iterator, iterate_to_list, IteratorHint};
use crate::context::Context;
use crate::environments::{
    BindingLocator, DeclarativeEnvironment, DeclarativeKind, Environment, PrivateEnvironment,
};
use crate::error::{JsError, JsNativeError};
use crate::object::for_in_iterator::ForInIterator;
use crate::object::{JsObject, PrivateElement, PrivateName};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::string::JsString;
use crate::value::JsValue;
use crate::JsResult;

/// How one [`run`] invocation of the top frame ended.
#[derive(Debug)]
pub enum CompletionRecord {
    /// The function returned (or fell off its end).
    Normal(JsValue),
    /// An uncaught exception left the frame.
    Throw(JsError),
    /// A generator yielded.
    Yield(JsValue),
    /// An async frame awaits the value.
    Await(JsValue),
    /// A coroutine finished its prologue and suspends fresh.
    GeneratorStart,
}

/// The interpreter state owned by a context.
#[derive(Debug, Default)]
pub struct Vm {
    frames: Vec<CallFrame>,
    pub(crate) pending_error: Option<JsError>,
}

impl Vm {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_frame(&mut self, frame: CallFrame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop_frame(&mut self) -> Box<CallFrame> {
        Box::new(self.frames.pop().expect("call stack underflow"))
    }

    pub(crate) fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active call frame")
    }

    pub(crate) fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active call frame")
    }

    /// Renders the active context chain for error objects.
    pub(crate) fn capture_stack_trace(&self, header: &str) -> JsString {
        let mut trace = String::from(header);
        for frame in self.frames.iter().rev() {
            trace.push_str("\n    at ");
            if frame.code.name.is_empty() {
                trace.push_str("<anonymous>");
            } else {
                trace.push_str(&frame.code.name);
            }
            if let Some(line) = frame.code.line_at(frame.pc as u32) {
                trace.push_str(&format!(" (line {line})"));
            }
        }
        JsString::from(trace)
    }
}

impl Finalize for Vm {}

// SAFETY: every active frame roots its registers and state.
unsafe impl Trace for Vm {
    custom_trace!(this, mark, {
        mark(&this.frames);
        if let Some(err) = &this.pending_error {
            mark(err);
        }
    });
}

/// What a handler tells the dispatch loop to do next.
enum Control {
    Continue,
    Return(JsValue),
    Suspend(CompletionRecord),
}

/// Compiles and runs a script's top-level code.
pub(crate) fn execute_script(code: Gc<CodeBlock>, context: &mut Context) -> JsResult<JsValue> {
    let env = context.realm().global_environment();
    match execute_with_env(code, env, None, context) {
        CompletionRecord::Normal(value) => Ok(value),
        CompletionRecord::Throw(err) => Err(err),
        _ => Err(JsNativeError::typ()
            .with_message("script suspended at top level")
            .into()),
    }
}

/// Runs `code` in `env`; the caller interprets suspensions.
pub(crate) fn execute_with_env(
    code: Gc<CodeBlock>,
    env: Environment,
    private_env: Option<Gc<PrivateEnvironment>>,
    context: &mut Context,
) -> CompletionRecord {
    let frame = CallFrame::new(code, None, env.clone(), env, private_env, Vec::new());
    context.vm.push_frame(frame);
    let record = run(context);
    context.vm.pop_frame();
    record
}

/// Runs the top frame until it returns, throws out, or suspends.
pub(crate) fn run(context: &mut Context) -> CompletionRecord {
    // Deliver a pending resume into the suspended frame.
    if let Some(resume) = context.vm.frame_mut().resume.take() {
        match resume.kind {
            ResumeKind::Normal => {
                let target = context.vm.frame().resume_register;
                if let Some(target) = target {
                    context.vm.frame_mut().registers[target as usize] = resume.value;
                }
            }
            ResumeKind::Throw => {
                let err = JsError::from_opaque(resume.value);
                if !unwind(context, err) {
                    let err = context
                        .vm
                        .pending_error
                        .take()
                        .expect("unwind parks the error");
                    return CompletionRecord::Throw(err);
                }
            }
            ResumeKind::Return => match deliver_return(context, resume.value) {
                Ok(Some(value)) => return CompletionRecord::Normal(value),
                Ok(None) => {}
                Err(err) => {
                    if !unwind(context, err) {
                        let err = context
                            .vm
                            .pending_error
                            .take()
                            .expect("unwind parks the error");
                        return CompletionRecord::Throw(err);
                    }
                }
            },
        }
    }

    loop {
        if context.vm.frame().pc >= context.vm.frame().code.code.len() {
            // Fell off the end: implicit `return undefined`.
            return CompletionRecord::Normal(JsValue::undefined());
        }
        match execute_instruction(context) {
            Ok(Control::Continue) => {}
            Ok(Control::Return(value)) => return CompletionRecord::Normal(value),
            Ok(Control::Suspend(record)) => return record,
            Err(err) => {
                if !unwind(context, err) {
                    let err = context
                        .vm
                        .pending_error
                        .take()
                        .expect("unwind parks the error");
                    return CompletionRecord::Throw(err);
                }
            }
        }
    }
}

// ==================== operand decoding ====================

fn read_u8(context: &mut Context) -> u8 {
    let frame = context.vm.frame_mut();
    let value = frame.code.read::<u8>(frame.pc);
    frame.pc += 1;
    value
}

fn read_i8(context: &mut Context) -> i8 {
    let frame = context.vm.frame_mut();
    let value = frame.code.read::<i8>(frame.pc);
    frame.pc += 1;
    value
}

fn read_u16(context: &mut Context) -> u16 {
    let frame = context.vm.frame_mut();
    let value = frame.code.read::<u16>(frame.pc);
    frame.pc += 2;
    value
}

fn read_i16(context: &mut Context) -> i16 {
    let frame = context.vm.frame_mut();
    let value = frame.code.read::<i16>(frame.pc);
    frame.pc += 2;
    value
}

fn read_i32(context: &mut Context) -> i32 {
    let frame = context.vm.frame_mut();
    let value = frame.code.read::<i32>(frame.pc);
    frame.pc += 4;
    value
}

fn read_f64(context: &mut Context) -> f64 {
    let frame = context.vm.frame_mut();
    let value = frame.code.read::<f64>(frame.pc);
    frame.pc += 8;
    value
}

/// Reads a label operand and converts it to an absolute offset, measured
/// from the end of the instruction (the current pc after decoding).
fn read_label(context: &mut Context) -> Option<usize> {
    let label = read_i16(context);
    if label == NO_LABEL {
        return None;
    }
    let pc = context.vm.frame().pc;
    Some((pc as i64 + i64::from(label)) as usize)
}

fn reg(context: &Context, index: u8) -> JsValue {
    context.vm.frame().registers[index as usize].clone()
}

fn set_reg(context: &mut Context, index: u8, value: JsValue) {
    context.vm.frame_mut().registers[index as usize] = value;
}

// ==================== the dispatch loop body ====================

#[allow(clippy::too_many_lines)]
fn execute_instruction(context: &mut Context) -> JsResult<Control> {
    let opcode = {
        let frame = context.vm.frame_mut();
        let opcode = Opcode::try_from(frame.code.code[frame.pc])
            .expect("compiler emits valid opcodes");
        frame.pc += 1;
        opcode
    };

    macro_rules! bin_op {
        ($op:ident) => {{
            let dst = read_u8(context);
            let lhs = read_u8(context);
            let rhs = read_u8(context);
            let lhs = reg(context, lhs);
            let rhs = reg(context, rhs);
            let value = lhs.$op(&rhs, context)?;
            set_reg(context, dst, value);
        }};
    }

    macro_rules! cmp_op {
        ($op:ident) => {{
            let dst = read_u8(context);
            let lhs = read_u8(context);
            let rhs = read_u8(context);
            let lhs = reg(context, lhs);
            let rhs = reg(context, rhs);
            let value = lhs.$op(&rhs, context)?;
            set_reg(context, dst, JsValue::from(value));
        }};
    }

    match opcode {
        Opcode::Nop => {}
        Opcode::Move => {
            let dst = read_u8(context);
            let src = read_u8(context);
            let value = reg(context, src);
            set_reg(context, dst, value);
        }
        Opcode::LoadUndefined => {
            let dst = read_u8(context);
            set_reg(context, dst, JsValue::undefined());
        }
        Opcode::LoadNull => {
            let dst = read_u8(context);
            set_reg(context, dst, JsValue::null());
        }
        Opcode::LoadTrue => {
            let dst = read_u8(context);
            set_reg(context, dst, JsValue::from(true));
        }
        Opcode::LoadFalse => {
            let dst = read_u8(context);
            set_reg(context, dst, JsValue::from(false));
        }
        Opcode::LoadZero => {
            let dst = read_u8(context);
            set_reg(context, dst, JsValue::from(0));
        }
        Opcode::LoadOne => {
            let dst = read_u8(context);
            set_reg(context, dst, JsValue::from(1));
        }
        Opcode::LoadInt8 => {
            let dst = read_u8(context);
            let value = read_i8(context);
            set_reg(context, dst, JsValue::from(i32::from(value)));
        }
        Opcode::LoadInt32 => {
            let dst = read_u8(context);
            let value = read_i32(context);
            set_reg(context, dst, JsValue::from(value));
        }
        Opcode::LoadRational => {
            let dst = read_u8(context);
            let value = read_f64(context);
            set_reg(context, dst, JsValue::Rational(value));
        }
        Opcode::LoadConstant => {
            let dst = read_u8(context);
            let index = read_u16(context);
            let value = context.vm.frame().code.literals[index as usize].clone();
            set_reg(context, dst, value);
        }
        Opcode::LoadThis => {
            let dst = read_u8(context);
            let env = context.vm.frame().lex_env.clone();
            let this = env.get_this_binding(context)?;
            set_reg(context, dst, this);
        }
        Opcode::LoadNewTarget => {
            let dst = read_u8(context);
            let new_target = context
                .vm
                .frame()
                .lex_env
                .function_slots()
                .and_then(|env| {
                    env.as_function_slots()
                        .and_then(|slots| slots.borrow().new_target.clone())
                });
            set_reg(
                context,
                dst,
                new_target.map_or(JsValue::undefined(), JsValue::from),
            );
        }
        Opcode::CreateFunction => {
            let dst = read_u8(context);
            let index = read_u16(context);
            let frame = context.vm.frame();
            let code = frame.code.functions[index as usize].clone();
            let env = frame.lex_env.clone();
            let private_env = frame.private_env.clone();
            let function = crate::builtins::function::make_function(code, env, private_env, context);
            set_reg(context, dst, function.into());
        }
        Opcode::NewObject => {
            let dst = read_u8(context);
            let object = JsObject::with_object_proto(context);
            set_reg(context, dst, object.into());
        }
        Opcode::NewArray => {
            let dst = read_u8(context);
            let array = crate::builtins::array::array_create(0, context)?;
            set_reg(context, dst, array.into());
        }
        Opcode::GetArgument => {
            let dst = read_u8(context);
            let index = read_u8(context);
            let value = context
                .vm
                .frame()
                .arguments
                .get(index as usize)
                .cloned()
                .unwrap_or_default();
            set_reg(context, dst, value);
        }
        Opcode::RestArguments => {
            let dst = read_u8(context);
            let index = read_u8(context);
            let rest: Vec<JsValue> = context
                .vm
                .frame()
                .arguments
                .get(index as usize..)
                .map(<[JsValue]>::to_vec)
                .unwrap_or_default();
            let array = crate::builtins::array::create_array_from_list(rest, context);
            set_reg(context, dst, array.into());
        }
        Opcode::CreateUnmappedArguments => {
            let dst = read_u8(context);
            let args = context.vm.frame().arguments.clone();
            let object = crate::builtins::function::arguments::create_unmapped(&args, context);
            set_reg(context, dst, object.into());
        }
        Opcode::CreateMappedArguments => {
            let dst = read_u8(context);
            let count = read_u8(context);
            let args = context.vm.frame().arguments.clone();
            let env = match &context.vm.frame().var_env {
                Environment::Declarative(env) => env.clone(),
                Environment::Object(_) => unreachable!("function scopes are declarative"),
            };
            let object = crate::builtins::function::arguments::create_mapped(
                &args,
                count as usize,
                env,
                context,
            );
            set_reg(context, dst, object.into());
        }

        // ==================== bindings ====================
        Opcode::ResolveBinding => {
            let index = read_u16(context);
            resolve_binding(context, index)?;
        }
        Opcode::GetName => {
            let dst = read_u8(context);
            let index = read_u16(context);
            let value = match resolve_binding(context, index)? {
                Some((env, slot, name)) => env.get_slot(slot, &name)?,
                None => {
                    let name = binding_name(context, index);
                    let env = context.vm.frame().lex_env.clone();
                    env.get_binding_value(&name, context)?
                }
            };
            set_reg(context, dst, value);
        }
        Opcode::GetNameOrUndefined => {
            let dst = read_u8(context);
            let index = read_u16(context);
            let name = binding_name(context, index);
            let env = context.vm.frame().lex_env.clone();
            let value = env.get_binding_value_or_undefined(&name, context)?;
            set_reg(context, dst, value);
        }
        Opcode::SetName => {
            let src = read_u8(context);
            let index = read_u16(context);
            let value = reg(context, src);
            match resolve_binding(context, index)? {
                Some((env, slot, name)) => env.set_slot(slot, value, &name)?,
                None => {
                    let name = binding_name(context, index);
                    let strict = context
                        .vm
                        .frame()
                        .code
                        .flags
                        .contains(CodeBlockFlags::STRICT);
                    let env = context.vm.frame().lex_env.clone();
                    env.set_mutable_binding(&name, value, strict, context)?;
                }
            }
        }
        Opcode::InitName => {
            let src = read_u8(context);
            let index = read_u16(context);
            let value = reg(context, src);
            match resolve_binding(context, index)? {
                Some((env, slot, _)) => env.initialize_slot(slot, value),
                None => {
                    let name = binding_name(context, index);
                    let env = context.vm.frame().lex_env.clone();
                    env.initialize_binding(&name, value, context)?;
                }
            }
        }
        Opcode::DeleteName => {
            let dst = read_u8(context);
            let index = read_u16(context);
            let name = binding_name(context, index);
            let env = context.vm.frame().lex_env.clone();
            let deleted = env.delete_binding(&name, context)?;
            set_reg(context, dst, JsValue::from(deleted));
        }

        // ==================== properties ====================
        Opcode::GetPropertyByName => {
            let dst = read_u8(context);
            let object = read_u8(context);
            let slot = read_u16(context);
            let receiver = reg(context, object);
            let value = get_property_cached(context, &receiver, slot)?;
            set_reg(context, dst, value);
        }
        Opcode::SetPropertyByName => {
            let object = read_u8(context);
            let src = read_u8(context);
            let slot = read_u16(context);
            let receiver = reg(context, object);
            let value = reg(context, src);
            let name = property_name(context, slot);
            let strict = context
                .vm
                .frame()
                .code
                .flags
                .contains(CodeBlockFlags::STRICT);
            let obj = receiver.to_object(context)?;
            obj.set(PropertyKey::from(name), value, strict, context)?;
        }
        Opcode::DefineOwnPropertyByName => {
            let object = read_u8(context);
            let src = read_u8(context);
            let slot = read_u16(context);
            let receiver = reg(context, object);
            let value = reg(context, src);
            let name = property_name(context, slot);
            let obj = receiver
                .as_object()
                .cloned()
                .expect("literals build on fresh objects");
            obj.create_data_property_or_throw(PropertyKey::from(name), value, context)?;
        }
        Opcode::GetPropertyByValue => {
            let dst = read_u8(context);
            let object = read_u8(context);
            let key = read_u8(context);
            let receiver = reg(context, object);
            let key = reg(context, key).to_property_key(context)?;
            let obj = receiver.to_object(context)?;
            let value = obj.__get__(&key, &receiver, context)?;
            set_reg(context, dst, value);
        }
        Opcode::SetPropertyByValue => {
            let object = read_u8(context);
            let key = read_u8(context);
            let src = read_u8(context);
            let receiver = reg(context, object);
            let key = reg(context, key).to_property_key(context)?;
            let value = reg(context, src);
            let strict = context
                .vm
                .frame()
                .code
                .flags
                .contains(CodeBlockFlags::STRICT);
            let obj = receiver.to_object(context)?;
            obj.set(key, value, strict, context)?;
        }
        Opcode::DefineOwnPropertyByValue => {
            let object = read_u8(context);
            let key = read_u8(context);
            let src = read_u8(context);
            let receiver = reg(context, object);
            let key = reg(context, key).to_property_key(context)?;
            let value = reg(context, src);
            let obj = receiver
                .as_object()
                .cloned()
                .expect("literals build on fresh objects");
            obj.create_data_property_or_throw(key, value, context)?;
        }
        Opcode::DefineGetterByName | Opcode::DefineSetterByName => {
            let object = read_u8(context);
            let function = read_u8(context);
            let slot = read_u16(context);
            let receiver = reg(context, object);
            let function = reg(context, function);
            let name = property_name(context, slot);
            define_accessor(
                context,
                &receiver,
                PropertyKey::from(name),
                function,
                opcode == Opcode::DefineGetterByName,
                true,
            )?;
        }
        Opcode::DefineGetterByValue | Opcode::DefineSetterByValue => {
            let object = read_u8(context);
            let key = read_u8(context);
            let function = read_u8(context);
            let receiver = reg(context, object);
            let key = reg(context, key).to_property_key(context)?;
            let function = reg(context, function);
            define_accessor(
                context,
                &receiver,
                key,
                function,
                opcode == Opcode::DefineGetterByValue,
                true,
            )?;
        }
        Opcode::DeletePropertyByName => {
            let dst = read_u8(context);
            let object = read_u8(context);
            let slot = read_u16(context);
            let receiver = reg(context, object);
            let name = property_name(context, slot);
            let obj = receiver.to_object(context)?;
            let deleted = obj.__delete__(&PropertyKey::from(name), context)?;
            let strict = context
                .vm
                .frame()
                .code
                .flags
                .contains(CodeBlockFlags::STRICT);
            if strict && !deleted {
                return Err(JsNativeError::typ()
                    .with_message("cannot delete property in strict mode")
                    .into());
            }
            set_reg(context, dst, JsValue::from(deleted));
        }
        Opcode::DeletePropertyByValue => {
            let dst = read_u8(context);
            let object = read_u8(context);
            let key = read_u8(context);
            let receiver = reg(context, object);
            let key = reg(context, key).to_property_key(context)?;
            let obj = receiver.to_object(context)?;
            let deleted = obj.__delete__(&key, context)?;
            set_reg(context, dst, JsValue::from(deleted));
        }
        Opcode::CopyDataProperties => {
            let target = read_u8(context);
            let src = read_u8(context);
            let target = reg(context, target)
                .as_object()
                .cloned()
                .expect("spread targets are fresh objects");
            let source = reg(context, src);
            target.copy_data_properties(&source, &[], context)?;
        }
        Opcode::GetPropertyOfSuperByName => {
            let dst = read_u8(context);
            let slot = read_u16(context);
            let name = property_name(context, slot);
            let value = super_property_get(context, PropertyKey::from(name))?;
            set_reg(context, dst, value);
        }
        Opcode::GetPropertyOfSuperByValue => {
            let dst = read_u8(context);
            let key = read_u8(context);
            let key = reg(context, key).to_property_key(context)?;
            let value = super_property_get(context, key)?;
            set_reg(context, dst, value);
        }
        Opcode::SetPropertyOfSuperByName => {
            let src = read_u8(context);
            let slot = read_u16(context);
            let value = reg(context, src);
            let name = property_name(context, slot);
            super_property_set(context, PropertyKey::from(name), value)?;
        }
        Opcode::GetPrivateField => {
            let dst = read_u8(context);
            let object = read_u8(context);
            let index = read_u16(context);
            let name = resolve_private_name(context, index)?;
            let receiver = reg(context, object);
            let Some(obj) = receiver.as_object() else {
                return Err(JsNativeError::typ()
                    .with_message("cannot read private member from a non-object")
                    .into());
            };
            let value = obj.clone().private_get(&name, context)?;
            set_reg(context, dst, value);
        }
        Opcode::SetPrivateField => {
            let object = read_u8(context);
            let src = read_u8(context);
            let index = read_u16(context);
            let name = resolve_private_name(context, index)?;
            let receiver = reg(context, object);
            let value = reg(context, src);
            let Some(obj) = receiver.as_object() else {
                return Err(JsNativeError::typ()
                    .with_message("cannot write private member to a non-object")
                    .into());
            };
            obj.clone().private_set(&name, value, context)?;
        }
        Opcode::HasPrivateField => {
            let dst = read_u8(context);
            let object = read_u8(context);
            let index = read_u16(context);
            let name = resolve_private_name(context, index)?;
            let receiver = reg(context, object);
            let Some(obj) = receiver.as_object() else {
                return Err(JsNativeError::typ()
                    .with_message("right-hand side of 'in' is not an object")
                    .into());
            };
            let has = obj.has_private_element(&name);
            set_reg(context, dst, JsValue::from(has));
        }
        Opcode::SetHomeObject => {
            let function = read_u8(context);
            let object = read_u8(context);
            let function = reg(context, function);
            let object = reg(context, object);
            if let (Some(function), Some(object)) = (function.as_object(), object.as_object()) {
                if let Some(ordinary) = function
                    .borrow_mut()
                    .as_function_mut()
                    .and_then(crate::builtins::function::Function::as_ordinary_mut)
                {
                    ordinary.home_object = Some(object.clone());
                }
            }
        }

        // ==================== arithmetic & logic ====================
        Opcode::Add => bin_op!(add),
        Opcode::Sub => bin_op!(sub),
        Opcode::Mul => bin_op!(mul),
        Opcode::Div => bin_op!(div),
        Opcode::Mod => bin_op!(rem),
        Opcode::Pow => bin_op!(pow),
        Opcode::ShiftLeft => bin_op!(shl),
        Opcode::ShiftRight => bin_op!(shr),
        Opcode::UnsignedShiftRight => bin_op!(ushr),
        Opcode::BitAnd => bin_op!(bitand),
        Opcode::BitOr => bin_op!(bitor),
        Opcode::BitXor => bin_op!(bitxor),
        Opcode::Eq => cmp_op!(equals),
        Opcode::NotEq => {
            let dst = read_u8(context);
            let lhs = read_u8(context);
            let rhs = read_u8(context);
            let lhs = reg(context, lhs);
            let rhs = reg(context, rhs);
            let value = !lhs.equals(&rhs, context)?;
            set_reg(context, dst, JsValue::from(value));
        }
        Opcode::StrictEq => {
            let dst = read_u8(context);
            let lhs = read_u8(context);
            let rhs = read_u8(context);
            let value = reg(context, lhs).strict_equals(&reg(context, rhs));
            set_reg(context, dst, JsValue::from(value));
        }
        Opcode::StrictNotEq => {
            let dst = read_u8(context);
            let lhs = read_u8(context);
            let rhs = read_u8(context);
            let value = !reg(context, lhs).strict_equals(&reg(context, rhs));
            set_reg(context, dst, JsValue::from(value));
        }
        Opcode::GreaterThan => cmp_op!(gt),
        Opcode::GreaterThanOrEq => cmp_op!(ge),
        Opcode::LessThan => cmp_op!(lt),
        Opcode::LessThanOrEq => cmp_op!(le),
        Opcode::InstanceOf => cmp_op!(instance_of),
        Opcode::In => {
            let dst = read_u8(context);
            let key = read_u8(context);
            let object = read_u8(context);
            let rhs = reg(context, object);
            let Some(obj) = rhs.as_object().cloned() else {
                return Err(JsNativeError::typ()
                    .with_message(format!(
                        "right-hand side of 'in' should be an object, got {}",
                        rhs.type_of()
                    ))
                    .into());
            };
            let key = reg(context, key).to_property_key(context)?;
            let has = obj.has_property(key, context)?;
            set_reg(context, dst, JsValue::from(has));
        }
        Opcode::BitNot => {
            let dst = read_u8(context);
            let src = read_u8(context);
            let value = reg(context, src).bitnot(context)?;
            set_reg(context, dst, value);
        }
        Opcode::Neg => {
            let dst = read_u8(context);
            let src = read_u8(context);
            let value = reg(context, src).neg(context)?;
            set_reg(context, dst, value);
        }
        Opcode::Pos => {
            let dst = read_u8(context);
            let src = read_u8(context);
            let value = reg(context, src).to_number(context)?;
            set_reg(context, dst, JsValue::from(value));
        }
        Opcode::LogicalNot => {
            let dst = read_u8(context);
            let src = read_u8(context);
            let value = !reg(context, src).to_boolean();
            set_reg(context, dst, JsValue::from(value));
        }
        Opcode::TypeOf => {
            let dst = read_u8(context);
            let src = read_u8(context);
            let value = reg(context, src).type_of();
            set_reg(context, dst, JsValue::from(value));
        }
        Opcode::ToString => {
            let dst = read_u8(context);
            let src = read_u8(context);
            let value = reg(context, src).to_string(context)?;
            set_reg(context, dst, JsValue::from(value));
        }
        Opcode::Inc | Opcode::Dec => {
            let dst = read_u8(context);
            let src = read_u8(context);
            let numeric = reg(context, src).to_numeric(context)?;
            let one = JsValue::from(1);
            let value = if opcode == Opcode::Inc {
                match &numeric {
                    JsValue::BigInt(b) => JsValue::BigInt(crate::bigint::JsBigInt::add(
                        b,
                        &crate::bigint::JsBigInt::new(1),
                    )),
                    _ => numeric.add(&one, context)?,
                }
            } else {
                match &numeric {
                    JsValue::BigInt(b) => JsValue::BigInt(crate::bigint::JsBigInt::sub(
                        b,
                        &crate::bigint::JsBigInt::new(1),
                    )),
                    _ => numeric.sub(&one, context)?,
                }
            };
            set_reg(context, dst, value);
        }

        // ==================== control flow ====================
        Opcode::Jump => {
            let target = read_label(context).expect("jump labels are never absent");
            context.vm.frame_mut().pc = target;
        }
        Opcode::JumpIfTrue => {
            let cond = read_u8(context);
            let target = read_label(context).expect("jump labels are never absent");
            if reg(context, cond).to_boolean() {
                context.vm.frame_mut().pc = target;
            }
        }
        Opcode::JumpIfFalse => {
            let cond = read_u8(context);
            let target = read_label(context).expect("jump labels are never absent");
            if !reg(context, cond).to_boolean() {
                context.vm.frame_mut().pc = target;
            }
        }
        Opcode::JumpIfNullOrUndefined => {
            let value = read_u8(context);
            let target = read_label(context).expect("jump labels are never absent");
            if reg(context, value).is_null_or_undefined() {
                context.vm.frame_mut().pc = target;
            }
        }
        Opcode::JumpIfNotUndefined => {
            let value = read_u8(context);
            let target = read_label(context).expect("jump labels are never absent");
            if !reg(context, value).is_undefined() {
                context.vm.frame_mut().pc = target;
            }
        }

        // ==================== the call family ====================
        Opcode::PushCall => {
            let func = read_u8(context);
            let this = read_u8(context);
            let func = reg(context, func);
            let this = reg(context, this);
            context.vm.frame_mut().state.push(StateFrame::CallBuilder {
                func,
                this,
                args: Vec::new(),
                kind: CallKind::Call,
            });
        }
        Opcode::PushNew => {
            let func = read_u8(context);
            let func = reg(context, func);
            context.vm.frame_mut().state.push(StateFrame::CallBuilder {
                func,
                this: JsValue::undefined(),
                args: Vec::new(),
                kind: CallKind::New,
            });
        }
        Opcode::PushSuperCall => {
            context.vm.frame_mut().state.push(StateFrame::CallBuilder {
                func: JsValue::undefined(),
                this: JsValue::undefined(),
                args: Vec::new(),
                kind: CallKind::SuperCall,
            });
        }
        Opcode::PushArg => {
            let src = read_u8(context);
            let value = reg(context, src);
            let Some(StateFrame::CallBuilder { args, .. }) = context.vm.frame_mut().state.last_mut()
            else {
                unreachable!("argument pushed without an open call builder");
            };
            args.push(value);
        }
        Opcode::PushSpreadArg => {
            let src = read_u8(context);
            let value = reg(context, src);
            let spread = iterate_to_list(&value, context)?;
            let Some(StateFrame::CallBuilder { args, .. }) = context.vm.frame_mut().state.last_mut()
            else {
                unreachable!("argument pushed without an open call builder");
            };
            args.extend(spread);
        }
        Opcode::Call => {
            let dst = read_u8(context);
            let (func, this, args, _) = pop_call_builder(context);
            let Some(callee) = func.as_callable() else {
                return Err(JsNativeError::typ()
                    .with_message(format!("{} is not a function", func.display()))
                    .into());
            };
            let result = callee.clone().call(&this, &args, context)?;
            set_reg(context, dst, result);
        }
        Opcode::TailCall => {
            let (func, this, args, _) = pop_call_builder(context);
            let Some(callee) = func.as_callable().cloned() else {
                return Err(JsNativeError::typ()
                    .with_message(format!("{} is not a function", func.display()))
                    .into());
            };
            // Reuse the frame only for plain compiled callees; everything
            // else degrades to call-and-return.
            let reusable = {
                let borrow = callee.borrow();
                borrow
                    .as_function()
                    .and_then(crate::builtins::function::Function::as_ordinary)
                    .map(|ordinary| ordinary.clone())
                    .filter(|ordinary| {
                        !ordinary.code.flags.intersects(
                            CodeBlockFlags::GENERATOR
                                | CodeBlockFlags::ASYNC
                                | CodeBlockFlags::CLASS_CONSTRUCTOR,
                        )
                    })
            };
            match reusable {
                Some(ordinary) => {
                    let env = crate::builtins::function::prepare_function_environment(
                        &callee, &ordinary, &this, None, None, context,
                    )?;
                    let frame = context.vm.frame_mut();
                    debug_assert!(frame.state.is_empty(), "tail call with live state frames");
                    frame.code = ordinary.code.clone();
                    frame.function = Some(callee);
                    frame.pc = 0;
                    frame.registers =
                        vec![JsValue::undefined(); ordinary.code.register_count as usize];
                    frame.state.clear();
                    frame.lex_env = env.clone();
                    frame.var_env = env;
                    frame.private_env = ordinary.private_environment.clone();
                    frame.arguments = args;
                }
                None => {
                    let result = callee.call(&this, &args, context)?;
                    return Ok(Control::Return(result));
                }
            }
        }
        Opcode::New => {
            let dst = read_u8(context);
            let (func, _, args, _) = pop_call_builder(context);
            let Some(constructor) = func.as_object().filter(|o| o.is_constructor()) else {
                return Err(JsNativeError::typ()
                    .with_message(format!("{} is not a constructor", func.display()))
                    .into());
            };
            let result = constructor.clone().construct(&args, None, context)?;
            set_reg(context, dst, result.into());
        }
        Opcode::SuperCall => {
            let dst = read_u8(context);
            let (_, _, args, _) = pop_call_builder(context);
            let result = super_call(context, args)?;
            set_reg(context, dst, result.into());
        }
        Opcode::Eval | Opcode::TailEval => {
            let dst = if opcode == Opcode::Eval {
                Some(read_u8(context))
            } else {
                None
            };
            let (func, this, args, _) = pop_call_builder(context);
            let direct = func
                .as_object()
                .zip(context.intrinsics().eval_function())
                .is_some_and(|(f, eval)| JsObject::equals(f, &eval));
            let result = if direct {
                perform_eval(args.first().cloned().unwrap_or_default(), true, context)?
            } else {
                let Some(callee) = func.as_callable() else {
                    return Err(JsNativeError::typ()
                        .with_message("eval target is not callable")
                        .into());
                };
                callee.clone().call(&this, &args, context)?
            };
            match dst {
                Some(dst) => set_reg(context, dst, result),
                None => return Ok(Control::Return(result)),
            }
        }

        // ==================== state stack ====================
        Opcode::PushLexEnv => {
            let index = read_u16(context);
            let frame = context.vm.frame();
            let shape = frame.code.scopes[index as usize].clone();
            let saved = frame.lex_env.clone();
            let env = DeclarativeEnvironment::new(
                DeclarativeKind::Lexical,
                shape,
                Some(saved.clone()),
                context,
            );
            let frame = context.vm.frame_mut();
            frame.state.push(StateFrame::LexEnv { saved });
            frame.lex_env = Environment::Declarative(env);
        }
        Opcode::NextLexEnv => {
            let current = match &context.vm.frame().lex_env {
                Environment::Declarative(env) => env.clone(),
                Environment::Object(_) => {
                    unreachable!("per-iteration scopes are declarative")
                }
            };
            let copy = current.copy_activation(context);
            context.vm.frame_mut().lex_env = Environment::Declarative(copy);
        }
        Opcode::PushWithEnv => {
            let object = read_u8(context);
            let object = reg(context, object).to_object(context)?;
            let saved = context.vm.frame().lex_env.clone();
            let env = Environment::push_object(object, saved.clone(), context);
            let frame = context.vm.frame_mut();
            frame.state.push(StateFrame::WithEnv { saved });
            frame.lex_env = env;
        }
        Opcode::PushTry => {
            let catch_offset = read_label(context);
            let finally_offset = read_label(context);
            let frame = context.vm.frame_mut();
            let depth = frame.state.len();
            frame.state.push(StateFrame::Try {
                catch_offset,
                finally_offset,
                depth,
                entered_catch: false,
                entered_finally: false,
                deferred: Deferred::None,
            });
        }
        Opcode::PushIterator => {
            let src = read_u8(context);
            let value = reg(context, src);
            let record = get_iterator(&value, IteratorHint::Sync, context)?;
            context
                .vm
                .frame_mut()
                .state
                .push(StateFrame::Iterator { record, done: false });
        }
        Opcode::PushAsyncIterator => {
            let src = read_u8(context);
            let value = reg(context, src);
            let record = get_iterator(&value, IteratorHint::Async, context)?;
            context
                .vm
                .frame_mut()
                .state
                .push(StateFrame::AsyncIterator { record, done: false });
        }
        Opcode::PushEnumerator => {
            let src = read_u8(context);
            let value = reg(context, src);
            let iterator = ForInIterator::new(value);
            context
                .vm
                .frame_mut()
                .state
                .push(StateFrame::Enumerator { iterator });
        }
        Opcode::ForStep => {
            let dst = read_u8(context);
            let exit = read_label(context).expect("loop exits are never absent");
            let record = match context.vm.frame().state.last() {
                Some(StateFrame::Iterator { record, .. }) => record.clone(),
                _ => unreachable!("for-step without an open iterator"),
            };
            let step = record.step(context);
            match step {
                Ok(Some(value)) => set_reg(context, dst, value),
                Ok(None) => {
                    mark_iterator_done(context);
                    context.vm.frame_mut().pc = exit;
                }
                Err(err) => {
                    mark_iterator_done(context);
                    return Err(err);
                }
            }
        }
        Opcode::EnumStep => {
            let dst = read_u8(context);
            let exit = read_label(context).expect("loop exits are never absent");
            let mut iterator = match context.vm.frame_mut().state.last_mut() {
                Some(StateFrame::Enumerator { iterator }) => iterator.clone(),
                _ => unreachable!("enum-step without an open enumeration"),
            };
            let next = iterator.step(context)?;
            if let Some(StateFrame::Enumerator { iterator: slot }) =
                context.vm.frame_mut().state.last_mut()
            {
                *slot = iterator;
            }
            match next {
                Some(key) => set_reg(context, dst, JsValue::from(key)),
                None => context.vm.frame_mut().pc = exit,
            }
        }
        Opcode::AsyncForStep => {
            let dst = read_u8(context);
            let record = match context.vm.frame().state.last() {
                Some(StateFrame::AsyncIterator { record, .. }) => record.clone(),
                _ => unreachable!("async for-step without an open iterator"),
            };
            // The raw `next()` result is what gets awaited.
            let next_method = record.clone();
            let result = next_method.next_raw(context)?;
            let frame = context.vm.frame_mut();
            frame.resume_register = Some(dst);
            return Ok(Control::Suspend(CompletionRecord::Await(result)));
        }
        Opcode::AsyncForStepResume => {
            let dst = read_u8(context);
            let src = read_u8(context);
            let exit = read_label(context).expect("loop exits are never absent");
            let result = reg(context, src);
            let (value, done) =
                crate::builtins::iterable::unpack_iter_result(&result, context)?;
            if done {
                mark_iterator_done(context);
                context.vm.frame_mut().pc = exit;
            } else {
                set_reg(context, dst, value);
            }
        }
        Opcode::PushNewArray => {
            let dst = read_u8(context);
            let array = crate::builtins::array::array_create(0, context)?;
            set_reg(context, dst, array.clone().into());
            context
                .vm
                .frame_mut()
                .state
                .push(StateFrame::ArrayBuilder { array, next_index: 0 });
        }
        Opcode::AddArrayElement => {
            let src = read_u8(context);
            let value = reg(context, src);
            let (array, index) = match context.vm.frame_mut().state.last_mut() {
                Some(StateFrame::ArrayBuilder { array, next_index }) => {
                    let index = *next_index;
                    *next_index += 1;
                    (array.clone(), index)
                }
                _ => unreachable!("array element without an open builder"),
            };
            array.create_data_property_or_throw(
                PropertyKey::Index(index as u32),
                value,
                context,
            )?;
        }
        Opcode::AddArraySpread => {
            let src = read_u8(context);
            let value = reg(context, src);
            let spread = iterate_to_list(&value, context)?;
            for element in spread {
                let (array, index) = match context.vm.frame_mut().state.last_mut() {
                    Some(StateFrame::ArrayBuilder { array, next_index }) => {
                        let index = *next_index;
                        *next_index += 1;
                        (array.clone(), index)
                    }
                    _ => unreachable!("array spread without an open builder"),
                };
                array.create_data_property_or_throw(
                    PropertyKey::Index(index as u32),
                    element,
                    context,
                )?;
            }
        }
        Opcode::PushArrayPattern => {
            let src = read_u8(context);
            let value = reg(context, src);
            let record = get_iterator(&value, IteratorHint::Sync, context)?;
            context
                .vm
                .frame_mut()
                .state
                .push(StateFrame::ArrayPattern { record, done: false });
        }
        Opcode::PatternNext => {
            let dst = read_u8(context);
            let (record, done) = match context.vm.frame().state.last() {
                Some(StateFrame::ArrayPattern { record, done }) => (record.clone(), *done),
                _ => unreachable!("pattern step without an open pattern"),
            };
            let value = if done {
                JsValue::undefined()
            } else {
                match record.step(context) {
                    Ok(Some(value)) => value,
                    Ok(None) => {
                        mark_pattern_done(context);
                        JsValue::undefined()
                    }
                    Err(err) => {
                        mark_pattern_done(context);
                        return Err(err);
                    }
                }
            };
            set_reg(context, dst, value);
        }
        Opcode::PatternRest => {
            let dst = read_u8(context);
            let (record, done) = match context.vm.frame().state.last() {
                Some(StateFrame::ArrayPattern { record, done }) => (record.clone(), *done),
                _ => unreachable!("pattern rest without an open pattern"),
            };
            let mut rest = Vec::new();
            if !done {
                loop {
                    match record.step(context) {
                        Ok(Some(value)) => rest.push(value),
                        Ok(None) => {
                            mark_pattern_done(context);
                            break;
                        }
                        Err(err) => {
                            mark_pattern_done(context);
                            return Err(err);
                        }
                    }
                }
            }
            let array = crate::builtins::array::create_array_from_list(rest, context);
            set_reg(context, dst, array.into());
        }
        Opcode::PushObjectPattern => {
            let src = read_u8(context);
            let value = reg(context, src);
            value.require_object_coercible()?;
            context.vm.frame_mut().state.push(StateFrame::ObjectPattern {
                source: value,
                seen: Vec::new(),
            });
        }
        Opcode::PatternGetByName => {
            let dst = read_u8(context);
            let slot = read_u16(context);
            let name = property_name(context, slot);
            let key = PropertyKey::from(name);
            let value = object_pattern_get(context, key)?;
            set_reg(context, dst, value);
        }
        Opcode::PatternGetByValue => {
            let dst = read_u8(context);
            let key = read_u8(context);
            let key = reg(context, key).to_property_key(context)?;
            let value = object_pattern_get(context, key)?;
            set_reg(context, dst, value);
        }
        Opcode::PatternRestObject => {
            let dst = read_u8(context);
            let (source, seen) = match context.vm.frame().state.last() {
                Some(StateFrame::ObjectPattern { source, seen }) => {
                    (source.clone(), seen.clone())
                }
                _ => unreachable!("pattern rest without an open pattern"),
            };
            let rest = JsObject::with_object_proto(context);
            rest.copy_data_properties(&source, &seen, context)?;
            set_reg(context, dst, rest.into());
        }
        Opcode::PushPrivateEnv => {
            let index = read_u16(context);
            let frame = context.vm.frame();
            let descriptions = frame.code.private_scopes[index as usize].clone();
            let saved = frame.private_env.clone();
            let env = PrivateEnvironment::new(&descriptions, saved.clone(), context);
            let frame = context.vm.frame_mut();
            frame.state.push(StateFrame::PrivateEnv { saved });
            frame.private_env = Some(env);
        }
        Opcode::PopPrivateEnv => {
            let popped = context.vm.frame_mut().state.pop();
            match popped {
                Some(StateFrame::PrivateEnv { saved }) => {
                    context.vm.frame_mut().private_env = saved;
                }
                _ => unreachable!("private scope imbalance"),
            }
        }
        Opcode::PopState => {
            let popped = context
                .vm
                .frame_mut()
                .state
                .pop()
                .expect("state stack underflow");
            cleanup_state_frame(context, popped, false)?;
        }

        // ==================== exceptions ====================
        Opcode::Throw => {
            let src = read_u8(context);
            let value = reg(context, src);
            return Err(JsError::from_opaque(value));
        }
        Opcode::CatchError => {
            let dst = read_u8(context);
            let err = context
                .vm
                .pending_error
                .take()
                .expect("catch without a pending exception");
            let value = err.to_opaque(context);
            set_reg(context, dst, value);
        }
        Opcode::TryEnd => {
            let frame = context.vm.frame_mut();
            match frame.state.last_mut() {
                Some(StateFrame::Try {
                    finally_offset: Some(finally),
                    entered_finally,
                    entered_catch,
                    deferred,
                    ..
                }) if !*entered_finally => {
                    *entered_finally = true;
                    *entered_catch = true;
                    *deferred = Deferred::None;
                    let finally = *finally;
                    frame.pc = finally;
                }
                Some(StateFrame::Try { .. }) => {
                    frame.state.pop();
                }
                _ => unreachable!("try-end without an open try"),
            }
        }
        Opcode::FinallyEnd => {
            let popped = context
                .vm
                .frame_mut()
                .state
                .pop()
                .expect("finally-end without an open try");
            let StateFrame::Try { deferred, .. } = popped else {
                unreachable!("finally-end without an open try");
            };
            match deferred {
                Deferred::None => {}
                Deferred::Error(err) => return Err(err),
                Deferred::Return(value) => {
                    if let Some(value) = deliver_return(context, value)? {
                        return Ok(Control::Return(value));
                    }
                }
                Deferred::Jump { target, depth } => {
                    deliver_jump(context, target, depth)?;
                }
            }
        }
        Opcode::FinallyJump => {
            let target = read_label(context).expect("finally jumps carry a target");
            let depth = read_u16(context) as usize;
            deliver_jump(context, target, depth)?;
        }

        // ==================== coroutines ====================
        Opcode::GeneratorStart => {
            context.vm.frame_mut().resume_register = None;
            return Ok(Control::Suspend(CompletionRecord::GeneratorStart));
        }
        Opcode::Yield => {
            let dst = read_u8(context);
            let src = read_u8(context);
            let value = reg(context, src);
            context.vm.frame_mut().resume_register = Some(dst);
            return Ok(Control::Suspend(CompletionRecord::Yield(value)));
        }
        Opcode::Await => {
            let dst = read_u8(context);
            let src = read_u8(context);
            let value = reg(context, src);
            context.vm.frame_mut().resume_register = Some(dst);
            return Ok(Control::Suspend(CompletionRecord::Await(value)));
        }

        // ==================== classes ====================
        Opcode::CreateClass => {
            let ctor = read_u8(context);
            let proto = read_u8(context);
            let index = read_u16(context);
            let (ctor_obj, proto_obj) = create_class(context, index, None)?;
            set_reg(context, ctor, ctor_obj.into());
            set_reg(context, proto, proto_obj.into());
        }
        Opcode::CreateDerivedClass => {
            let ctor = read_u8(context);
            let proto = read_u8(context);
            let superclass = read_u8(context);
            let index = read_u16(context);
            let superclass = reg(context, superclass);
            let (ctor_obj, proto_obj) = create_class(context, index, Some(superclass))?;
            set_reg(context, ctor, ctor_obj.into());
            set_reg(context, proto, proto_obj.into());
        }
        Opcode::DefineClassMethod | Opcode::DefineClassGetter | Opcode::DefineClassSetter => {
            let target = read_u8(context);
            let function = read_u8(context);
            let key = read_u8(context);
            let target = reg(context, target)
                .as_object()
                .cloned()
                .expect("class elements target fresh objects");
            let function = reg(context, function);
            let key = reg(context, key).to_property_key(context)?;
            if let Some(function_obj) = function.as_object() {
                if let Some(ordinary) = function_obj
                    .borrow_mut()
                    .as_function_mut()
                    .and_then(crate::builtins::function::Function::as_ordinary_mut)
                {
                    ordinary.home_object = Some(target.clone());
                }
            }
            match opcode {
                Opcode::DefineClassMethod => {
                    target.define_property_or_throw(
                        key,
                        PropertyDescriptor::builder()
                            .value(function)
                            .writable(true)
                            .enumerable(false)
                            .configurable(true)
                            .build(),
                        context,
                    )?;
                }
                Opcode::DefineClassGetter => {
                    define_accessor(context, &target.clone().into(), key, function, true, false)?;
                }
                _ => {
                    define_accessor(context, &target.clone().into(), key, function, false, false)?;
                }
            }
        }
        Opcode::ClassField => {
            let ctor = read_u8(context);
            let flags = read_u8(context);
            let key = read_u8(context);
            let function = read_u8(context);
            let ctor = reg(context, ctor)
                .as_object()
                .cloned()
                .expect("class fields target the constructor");
            let key = reg(context, key).to_property_key(context)?;
            let initializer = reg(context, function).as_object().cloned();
            if flags & class_element_flags::STATIC != 0 {
                let value = match &initializer {
                    Some(init) => init.call(&ctor.clone().into(), &[], context)?,
                    None => JsValue::undefined(),
                };
                ctor.create_data_property_or_throw(key, value, context)?;
            } else if let Some(ordinary) = ctor
                .borrow_mut()
                .as_function_mut()
                .and_then(crate::builtins::function::Function::as_ordinary_mut)
            {
                ordinary.fields.push(ClassField {
                    key: ClassFieldKey::Property(key),
                    initializer,
                });
            }
        }
        Opcode::ClassPrivateField => {
            let ctor = read_u8(context);
            let flags = read_u8(context);
            let function = read_u8(context);
            let index = read_u16(context);
            let ctor = reg(context, ctor)
                .as_object()
                .cloned()
                .expect("class fields target the constructor");
            let name = resolve_private_name(context, index)?;
            let initializer = reg(context, function).as_object().cloned();
            if flags & class_element_flags::STATIC != 0 {
                let value = match &initializer {
                    Some(init) => init.call(&ctor.clone().into(), &[], context)?,
                    None => JsValue::undefined(),
                };
                ctor.install_private_element(name, PrivateElement::Field(value))?;
            } else if let Some(ordinary) = ctor
                .borrow_mut()
                .as_function_mut()
                .and_then(crate::builtins::function::Function::as_ordinary_mut)
            {
                ordinary.fields.push(ClassField {
                    key: ClassFieldKey::Private(name),
                    initializer,
                });
            }
        }
        Opcode::ClassPrivateMethod => {
            let ctor = read_u8(context);
            let flags = read_u8(context);
            let function = read_u8(context);
            let index = read_u16(context);
            let ctor = reg(context, ctor)
                .as_object()
                .cloned()
                .expect("class methods target the constructor");
            let name = resolve_private_name(context, index)?;
            let method = reg(context, function)
                .as_object()
                .cloned()
                .expect("class methods are function objects");
            let element = if flags & class_element_flags::GETTER != 0 {
                PrivateElement::Accessor {
                    getter: Some(method),
                    setter: None,
                }
            } else if flags & class_element_flags::SETTER != 0 {
                PrivateElement::Accessor {
                    getter: None,
                    setter: Some(method),
                }
            } else {
                PrivateElement::Method(method)
            };
            if flags & class_element_flags::STATIC != 0 {
                ctor.install_private_element(name, element)?;
            } else if let Some(ordinary) = ctor
                .borrow_mut()
                .as_function_mut()
                .and_then(crate::builtins::function::Function::as_ordinary_mut)
            {
                merge_private_method(&mut ordinary.private_methods, name, element);
            }
        }
        Opcode::ClassStaticBlock => {
            let ctor = read_u8(context);
            let function = read_u8(context);
            let ctor = reg(context, ctor);
            let block = reg(context, function)
                .as_object()
                .cloned()
                .expect("static blocks are function objects");
            block.call(&ctor, &[], context)?;
        }

        Opcode::Return => {
            let src = read_u8(context);
            let value = reg(context, src);
            if let Some(value) = deliver_return(context, value)? {
                return Ok(Control::Return(value));
            }
        }
        Opcode::Debugger => {
            log::debug!(
                "debugger statement at pc {} in '{}'",
                context.vm.frame().pc,
                context.vm.frame().code.name
            );
        }
    }

    Ok(Control::Continue)
}

// ==================== helpers ====================

fn pop_call_builder(context: &mut Context) -> (JsValue, JsValue, Vec<JsValue>, CallKind) {
    match context.vm.frame_mut().state.pop() {
        Some(StateFrame::CallBuilder {
            func,
            this,
            args,
            kind,
        }) => (func, this, args, kind),
        _ => unreachable!("call without an open builder"),
    }
}

fn binding_name(context: &Context, index: u16) -> JsString {
    context.vm.frame().code.bindings[index as usize].name.clone()
}

fn property_name(context: &Context, slot: u16) -> JsString {
    context.vm.frame().code.property_refs[slot as usize]
        .name
        .clone()
}

/// Resolves a binding reference through its cache.
///
/// `Some((env, slot, name))` is the slot-addressed fast path; `None` sends
/// the caller down the dynamic resolution path.
fn resolve_binding(
    context: &mut Context,
    index: u16,
) -> JsResult<Option<(Gc<DeclarativeEnvironment>, u32, JsString)>> {
    let (name, cached, uncacheable) = {
        let bref = &context.vm.frame().code.bindings[index as usize];
        (bref.name.clone(), bref.cache.get(), bref.uncacheable.get())
    };

    if !uncacheable {
        if let Some((depth, slot)) = cached {
            let env = env_at_depth(&context.vm.frame().lex_env, depth);
            return Ok(Some((env, slot, name)));
        }
    }

    let lex_env = context.vm.frame().lex_env.clone();
    match lex_env.resolve(&name, context)? {
        BindingLocator::Slot {
            env,
            depth,
            slot,
            cacheable,
        } => {
            let bref = &context.vm.frame().code.bindings[index as usize];
            if cacheable {
                bref.cache.set(Some((depth, slot)));
            } else {
                bref.uncacheable.set(true);
            }
            Ok(Some((env, slot, name)))
        }
        _ => {
            let bref = &context.vm.frame().code.bindings[index as usize];
            bref.uncacheable.set(true);
            Ok(None)
        }
    }
}

fn env_at_depth(env: &Environment, depth: u16) -> Gc<DeclarativeEnvironment> {
    let mut cursor = env.clone();
    for _ in 0..depth {
        cursor = cursor.outer().expect("cached binding depth in range");
    }
    match cursor {
        Environment::Declarative(env) => env,
        Environment::Object(_) => unreachable!("cached bindings are declarative"),
    }
}

/// `GetPropertyByName` through the inline cache.
fn get_property_cached(
    context: &mut Context,
    receiver: &JsValue,
    slot: u16,
) -> JsResult<JsValue> {
    if let Some(object) = receiver.as_object() {
        let pref = &context.vm.frame().code.property_refs[slot as usize];
        if let Some((addr, generation, string_slot)) = pref.cache.get() {
            if object.addr() == addr {
                let borrow = object.borrow();
                if borrow.generation == generation {
                    if let Some((_, desc)) = borrow
                        .properties()
                        .string_slot_entry(string_slot as usize)
                    {
                        if desc.is_data_descriptor() {
                            return Ok(desc.expect_value());
                        }
                    }
                }
            }
        }
    }

    let name = property_name(context, slot);
    let key = PropertyKey::from(name.clone());
    let obj = receiver.to_object(context)?;
    let value = obj.__get__(&key, receiver, context)?;

    // Refill: own string-keyed data properties of ordinary-shaped objects.
    if let (Some(object), PropertyKey::String(string)) = (receiver.as_object(), &key) {
        let borrow = object.borrow();
        let ordinary = std::ptr::eq(
            borrow.data.internal_methods,
            &crate::object::internal_methods::ORDINARY_INTERNAL_METHODS,
        );
        if ordinary {
            if let Some(string_slot) = borrow.properties().string_slot(string) {
                let cacheable = borrow
                    .properties()
                    .get(&key)
                    .is_some_and(PropertyDescriptor::is_data_descriptor);
                if cacheable {
                    context.vm.frame().code.property_refs[slot as usize].cache.set(Some((
                        object.addr(),
                        borrow.generation,
                        string_slot as u32,
                    )));
                }
            }
        }
    }
    Ok(value)
}

fn define_accessor(
    context: &mut Context,
    receiver: &JsValue,
    key: PropertyKey,
    function: JsValue,
    getter: bool,
    enumerable: bool,
) -> JsResult<()> {
    let obj = receiver
        .as_object()
        .cloned()
        .expect("accessors are defined on fresh objects");
    let mut builder = PropertyDescriptor::builder()
        .enumerable(enumerable)
        .configurable(true);
    if getter {
        builder = builder.get(function);
    } else {
        builder = builder.set(function);
    }
    obj.define_property_or_throw(key, builder.build(), context)
}

fn super_home_base(context: &mut Context) -> JsResult<(JsValue, JsObject)> {
    let this = {
        let env = context.vm.frame().lex_env.clone();
        env.get_this_binding(context)?
    };
    let home = context
        .vm
        .frame()
        .function
        .as_ref()
        .and_then(|f| {
            f.borrow()
                .as_function()
                .and_then(crate::builtins::function::Function::as_ordinary)
                .and_then(|o| o.home_object.clone())
        })
        .ok_or_else(|| {
            JsNativeError::syntax().with_message("'super' outside of a method")
        })?;
    Ok((this, home))
}

fn super_property_get(context: &mut Context, key: PropertyKey) -> JsResult<JsValue> {
    let (this, home) = super_home_base(context)?;
    let base = home.__get_prototype_of__(context)?;
    match base {
        Some(base) => base.__get__(&key, &this, context),
        None => Ok(JsValue::undefined()),
    }
}

fn super_property_set(context: &mut Context, key: PropertyKey, value: JsValue) -> JsResult<()> {
    let (this, home) = super_home_base(context)?;
    let base = home.__get_prototype_of__(context)?;
    if let Some(base) = base {
        base.__set__(key, value, this, context)?;
    }
    Ok(())
}

/// `SuperCall` runtime semantics: construct the parent, bind `this`, run
/// the derived class's own instance elements.
fn super_call(context: &mut Context, args: Vec<JsValue>) -> JsResult<JsObject> {
    let active_fn = context
        .vm
        .frame()
        .function
        .clone()
        .ok_or_else(|| JsNativeError::syntax().with_message("'super' outside of a constructor"))?;
    let parent = active_fn
        .__get_prototype_of__(context)?
        .filter(JsObject::is_constructor)
        .ok_or_else(|| {
            JsNativeError::typ().with_message("super constructor is not a constructor")
        })?;

    let slots_env = context
        .vm
        .frame()
        .lex_env
        .function_slots()
        .ok_or_else(|| JsNativeError::syntax().with_message("'super' outside of a constructor"))?;
    let new_target = slots_env
        .as_function_slots()
        .and_then(|slots| slots.borrow().new_target.clone())
        .unwrap_or_else(|| active_fn.clone());

    let result = parent.construct(&args, Some(&new_target), context)?;

    slots_env
        .as_function_slots()
        .expect("constructor scopes have function slots")
        .borrow_mut()
        .bind_this(result.clone().into())?;

    crate::builtins::function::initialize_instance_elements(&result, &active_fn, context)?;
    Ok(result)
}

/// `ClassDefinitionEvaluation`, the object-wiring half.
fn create_class(
    context: &mut Context,
    index: u16,
    superclass: Option<JsValue>,
) -> JsResult<(JsObject, JsObject)> {
    let (proto_parent, ctor_parent) = match &superclass {
        None => (
            Some(context.intrinsics().object_prototype()),
            context.intrinsics().function_prototype(),
        ),
        Some(JsValue::Null) => (None, context.intrinsics().function_prototype()),
        Some(JsValue::Object(parent)) if parent.is_constructor() => {
            let proto = parent.get("prototype", context)?;
            let proto = match proto {
                JsValue::Object(proto) => Some(proto),
                JsValue::Null => None,
                _ => {
                    return Err(JsNativeError::typ()
                        .with_message("class prototype must be an object or null")
                        .into())
                }
            };
            (proto, parent.clone())
        }
        Some(_) => {
            return Err(JsNativeError::typ()
                .with_message("class extends value is not a constructor")
                .into())
        }
    };

    let proto_obj = JsObject::from_proto_and_data(
        proto_parent,
        crate::object::ObjectData::ordinary(),
        context,
    );

    let (code, env, private_env) = {
        let frame = context.vm.frame();
        (
            frame.code.functions[index as usize].clone(),
            frame.lex_env.clone(),
            frame.private_env.clone(),
        )
    };
    let ctor_obj = crate::builtins::function::make_function(code, env, private_env, context);
    ctor_obj.__set_prototype_of__(Some(ctor_parent), context)?;
    if let Some(ordinary) = ctor_obj
        .borrow_mut()
        .as_function_mut()
        .and_then(crate::builtins::function::Function::as_ordinary_mut)
    {
        ordinary.home_object = Some(proto_obj.clone());
    }

    {
        let mut borrow = ctor_obj.borrow_mut();
        borrow.properties_mut().insert(
            &PropertyKey::from("prototype"),
            PropertyDescriptor::builder()
                .value(proto_obj.clone())
                .writable(false)
                .enumerable(false)
                .configurable(false)
                .build(),
        );
    }
    {
        let mut borrow = proto_obj.borrow_mut();
        borrow.properties_mut().insert(
            &PropertyKey::from("constructor"),
            PropertyDescriptor::builder()
                .value(ctor_obj.clone())
                .writable(true)
                .enumerable(false)
                .configurable(true)
                .build(),
        );
    }
    Ok((ctor_obj, proto_obj))
}

fn merge_private_method(
    methods: &mut Vec<(PrivateName, PrivateElement)>,
    name: PrivateName,
    element: PrivateElement,
) {
    if let Some((_, existing)) = methods.iter_mut().find(|(n, _)| *n == name) {
        if let (
            PrivateElement::Accessor { getter, setter },
            PrivateElement::Accessor {
                getter: new_getter,
                setter: new_setter,
            },
        ) = (existing, &element)
        {
            if getter.is_none() {
                *getter = new_getter.clone();
            }
            if setter.is_none() {
                *setter = new_setter.clone();
            }
            return;
        }
    }
    methods.push((name, element));
}

fn resolve_private_name(context: &mut Context, index: u16) -> JsResult<PrivateName> {
    let description = context.vm.frame().code.private_names[index as usize].clone();
    let private_env = context.vm.frame().private_env.clone().ok_or_else(|| {
        JsNativeError::syntax()
            .with_message(format!("private name #{description} outside of a class"))
    })?;
    PrivateEnvironment::resolve(&private_env, &description).ok_or_else(|| {
        JsNativeError::syntax()
            .with_message(format!(
                "private name #{description} must be declared in an enclosing class"
            ))
            .into()
    })
}

fn object_pattern_get(context: &mut Context, key: PropertyKey) -> JsResult<JsValue> {
    let source = match context.vm.frame_mut().state.last_mut() {
        Some(StateFrame::ObjectPattern { source, seen }) => {
            seen.push(key.clone());
            source.clone()
        }
        _ => unreachable!("pattern read without an open pattern"),
    };
    let obj = source.to_object(context)?;
    obj.__get__(&key, &source, context)
}

fn mark_iterator_done(context: &mut Context) {
    if let Some(
        StateFrame::Iterator { done, .. } | StateFrame::AsyncIterator { done, .. },
    ) = context.vm.frame_mut().state.last_mut()
    {
        *done = true;
    }
}

fn mark_pattern_done(context: &mut Context) {
    if let Some(StateFrame::ArrayPattern { done, .. }) =
        context.vm.frame_mut().state.last_mut()
    {
        *done = true;
    }
}

/// Runs the exit protocol of a popped state frame.
fn cleanup_state_frame(
    context: &mut Context,
    frame: StateFrame,
    pending_error: bool,
) -> JsResult<()> {
    match frame {
        StateFrame::LexEnv { saved } | StateFrame::WithEnv { saved } => {
            context.vm.frame_mut().lex_env = saved;
            Ok(())
        }
        StateFrame::PrivateEnv { saved } => {
            context.vm.frame_mut().private_env = saved;
            Ok(())
        }
        StateFrame::Iterator { record, done }
        | StateFrame::AsyncIterator { record, done }
        | StateFrame::ArrayPattern { record, done } => {
            if !done {
                record.close(pending_error, context)?;
            }
            Ok(())
        }
        StateFrame::Try { .. }
        | StateFrame::Enumerator { .. }
        | StateFrame::CallBuilder { .. }
        | StateFrame::ArrayBuilder { .. }
        | StateFrame::ObjectPattern { .. } => Ok(()),
    }
}

/// Routes a `return` through any pending `finally` blocks.
///
/// `Ok(Some(value))` means the frame really returns now; `Ok(None)` means
/// control detoured into a finally block.
fn deliver_return(context: &mut Context, value: JsValue) -> JsResult<Option<JsValue>> {
    loop {
        let action = {
            let frame = context.vm.frame_mut();
            match frame.state.last_mut() {
                None => return Ok(Some(value)),
                Some(StateFrame::Try {
                    finally_offset: Some(finally),
                    entered_finally,
                    entered_catch,
                    deferred,
                    ..
                }) if !*entered_finally => {
                    *entered_finally = true;
                    *entered_catch = true;
                    *deferred = Deferred::Return(value);
                    frame.pc = *finally;
                    return Ok(None);
                }
                Some(_) => frame.state.pop().expect("just observed"),
            }
        };
        cleanup_state_frame(context, action, false)?;
    }
}

/// Routes a break/continue jump through any pending `finally` blocks down
/// to its target state depth.
fn deliver_jump(context: &mut Context, target: usize, depth: usize) -> JsResult<()> {
    loop {
        let action = {
            let frame = context.vm.frame_mut();
            if frame.state.len() <= depth {
                frame.pc = target;
                return Ok(());
            }
            match frame.state.last_mut() {
                Some(StateFrame::Try {
                    finally_offset: Some(finally),
                    entered_finally,
                    entered_catch,
                    deferred,
                    ..
                }) if !*entered_finally => {
                    *entered_finally = true;
                    *entered_catch = true;
                    *deferred = Deferred::Jump { target, depth };
                    frame.pc = *finally;
                    return Ok(());
                }
                _ => frame.state.pop().expect("depth checked"),
            }
        };
        cleanup_state_frame(context, action, false)?;
    }
}

/// Unwinds the state stack toward a handler. Returns `false` when the frame
/// has none and the error must propagate to the caller; the error is parked
/// in the vm's pending slot either way it is consumed.
fn unwind(context: &mut Context, err: JsError) -> bool {
    loop {
        let action = {
            let frame = context.vm.frame_mut();
            match frame.state.last_mut() {
                None => {
                    context.vm.pending_error = Some(err);
                    return false;
                }
                Some(StateFrame::Try {
                    catch_offset: Some(catch),
                    entered_catch,
                    depth,
                    ..
                }) if !*entered_catch => {
                    *entered_catch = true;
                    let catch = *catch;
                    let depth = *depth;
                    // The catch body runs at the try's entry depth, with the
                    // try frame still on the stack for its finally.
                    debug_assert!(frame.state.len() == depth + 1);
                    frame.pc = catch;
                    context.vm.pending_error = Some(err);
                    return true;
                }
                Some(StateFrame::Try {
                    finally_offset: Some(finally),
                    entered_finally,
                    entered_catch,
                    deferred,
                    ..
                }) if !*entered_finally => {
                    *entered_finally = true;
                    *entered_catch = true;
                    *deferred = Deferred::Error(err);
                    frame.pc = *finally;
                    return true;
                }
                Some(_) => frame.state.pop().expect("just observed"),
            }
        };
        let _ = cleanup_state_frame(context, action, true);
    }
}

/// The runtime half of `eval`: direct calls resolve through the caller's
/// scope via the host-installed evaluator.
pub(crate) fn perform_eval(
    source: JsValue,
    direct: bool,
    context: &mut Context,
) -> JsResult<JsValue> {
    let JsValue::String(source) = source else {
        // Non-string arguments pass through untouched.
        return Ok(source);
    };
    let strict = context
        .vm
        .frames
        .last()
        .is_some_and(|frame| frame.code.flags.contains(CodeBlockFlags::STRICT));
    match context.eval_hook {
        Some(hook) => hook(context, &source, direct, strict),
        None => Err(JsNativeError::typ()
            .with_message("eval requires a host-installed evaluator")
            .into()),
    }
}
