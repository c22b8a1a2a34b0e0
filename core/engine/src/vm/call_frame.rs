//! Call frames and the per-frame state stack.

use kestrel_gc::{custom_trace, Finalize, Gc, Trace};

use crate::builtins::iterable::IteratorRecord;
use crate::environments::{Environment, PrivateEnvironment};
use crate::error::JsError;
use crate::object::for_in_iterator::ForInIterator;
use crate::object::JsObject;
use crate::property::PropertyKey;
use crate::value::JsValue;
use crate::vm::CodeBlock;

/// How a suspended frame is being resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumeKind {
    /// `next(v)` / a settled `await`.
    #[default]
    Normal,
    /// `throw(e)` / a rejected `await`.
    Throw,
    /// `return(v)`.
    Return,
}

/// What kind of call a call builder accumulates arguments for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// A plain call.
    Call,
    /// `new`.
    New,
    /// `super(...)`.
    SuperCall,
    /// A (possibly direct) `eval` call.
    Eval,
}

/// A deferred completion parked while a `finally` block runs.
#[derive(Debug, Default)]
pub enum Deferred {
    /// Nothing pending; fall through after the finally block.
    #[default]
    None,
    /// Re-raise after the finally block.
    Error(JsError),
    /// Return after the finally block.
    Return(JsValue),
    /// Jump (break/continue) after the finally block.
    Jump {
        /// Absolute bytecode target.
        target: usize,
        /// State-stack depth at the target.
        depth: usize,
    },
}

/// One structured-operation frame on the state stack.
#[derive(Debug)]
pub enum StateFrame {
    /// A lexical scope; restores the saved environment on pop.
    LexEnv {
        /// The environment to restore.
        saved: Environment,
    },
    /// A `with` scope.
    WithEnv {
        /// The environment to restore.
        saved: Environment,
    },
    /// A private-name scope.
    PrivateEnv {
        /// The private environment to restore.
        saved: Option<Gc<PrivateEnvironment>>,
    },
    /// A `try` region.
    Try {
        /// Absolute offset of the catch handler, if any.
        catch_offset: Option<usize>,
        /// Absolute offset of the finally block, if any.
        finally_offset: Option<usize>,
        /// State-stack depth just below this frame.
        depth: usize,
        /// The catch handler has been entered; a second throw skips it.
        entered_catch: bool,
        /// The finally block has been entered.
        entered_finally: bool,
        /// Completion parked while the finally block runs.
        deferred: Deferred,
    },
    /// A `for..of` (or abbreviated spread/destructuring) iteration.
    Iterator {
        /// The iterator record.
        record: IteratorRecord,
        /// The iterator reported done; popping must not call `return`.
        done: bool,
    },
    /// A `for await..of` iteration.
    AsyncIterator {
        /// The iterator record.
        record: IteratorRecord,
        /// The iterator reported done.
        done: bool,
    },
    /// A `for..in` enumeration.
    Enumerator {
        /// The enumeration state.
        iterator: ForInIterator,
    },
    /// An argument accumulation for a pending call.
    CallBuilder {
        /// The callee (unused for `super()`).
        func: JsValue,
        /// The `this` argument.
        this: JsValue,
        /// Accumulated arguments.
        args: Vec<JsValue>,
        /// The call family member being built.
        kind: CallKind,
    },
    /// An array literal under construction.
    ArrayBuilder {
        /// The array being filled.
        array: JsObject,
        /// The next index to write.
        next_index: u64,
    },
    /// An array destructuring in progress.
    ArrayPattern {
        /// The source iterator.
        record: IteratorRecord,
        /// The iterator reported done; further elements read `undefined`.
        done: bool,
    },
    /// An object destructuring in progress.
    ObjectPattern {
        /// The source value.
        source: JsValue,
        /// Keys already read, excluded from the rest object.
        seen: Vec<PropertyKey>,
    },
}

impl Finalize for StateFrame {}

// SAFETY: every variant marks its held values.
unsafe impl Trace for StateFrame {
    custom_trace!(this, mark, {
        match this {
            StateFrame::LexEnv { saved } | StateFrame::WithEnv { saved } => mark(saved),
            StateFrame::PrivateEnv { saved } => {
                if let Some(saved) = saved {
                    mark(saved);
                }
            }
            StateFrame::Try { deferred, .. } => match deferred {
                Deferred::Error(err) => mark(err),
                Deferred::Return(value) => mark(value),
                Deferred::None | Deferred::Jump { .. } => {}
            },
            StateFrame::Iterator { record, .. } | StateFrame::AsyncIterator { record, .. } => {
                mark(record);
            }
            StateFrame::Enumerator { iterator } => mark(iterator),
            StateFrame::CallBuilder {
                func, this, args, ..
            } => {
                mark(func);
                mark(this);
                mark(args);
            }
            StateFrame::ArrayBuilder { array, .. } => mark(array),
            StateFrame::ArrayPattern { record, .. } => mark(record),
            StateFrame::ObjectPattern { source, .. } => mark(source),
        }
    });
}

/// A call frame: one function activation.
#[derive(Debug)]
pub struct CallFrame {
    /// The compiled function being executed.
    pub code: Gc<CodeBlock>,
    /// The function object, absent for scripts and modules.
    pub function: Option<JsObject>,
    /// The instruction pointer.
    pub pc: usize,
    /// The register file.
    pub registers: Vec<JsValue>,
    /// The state stack for structured operations.
    pub state: Vec<StateFrame>,
    /// The current lexical environment.
    pub lex_env: Environment,
    /// The variable environment (function scope).
    pub var_env: Environment,
    /// The current private environment.
    pub private_env: Option<Gc<PrivateEnvironment>>,
    /// The arguments of this invocation.
    pub arguments: Vec<JsValue>,
    /// Pending resume state for suspended frames.
    pub resume: Option<Resume>,
    /// The register a pending `Yield`/`Await` writes its resume value to;
    /// `None` right after the prologue suspension.
    pub resume_register: Option<u8>,
}

/// The payload installed on a frame before resuming it.
#[derive(Debug)]
pub struct Resume {
    /// How the frame is resumed.
    pub kind: ResumeKind,
    /// The value sent in.
    pub value: JsValue,
}

impl CallFrame {
    /// Creates a frame ready to run `code`.
    pub fn new(
        code: Gc<CodeBlock>,
        function: Option<JsObject>,
        lex_env: Environment,
        var_env: Environment,
        private_env: Option<Gc<PrivateEnvironment>>,
        arguments: Vec<JsValue>,
    ) -> Self {
        let registers = vec![JsValue::undefined(); code.register_count as usize];
        Self {
            code,
            function,
            pc: 0,
            registers,
            state: Vec::new(),
            lex_env,
            var_env,
            private_env,
            arguments,
            resume: None,
            resume_register: None,
        }
    }
}

impl Finalize for CallFrame {}

// SAFETY: code, function, registers, state frames, environments and
// arguments are all live edges of a (possibly suspended) activation.
unsafe impl Trace for CallFrame {
    custom_trace!(this, mark, {
        mark(&this.code);
        if let Some(function) = &this.function {
            mark(function);
        }
        mark(&this.registers);
        mark(&this.state);
        mark(&this.lex_env);
        mark(&this.var_env);
        if let Some(private_env) = &this.private_env {
            mark(private_env);
        }
        mark(&this.arguments);
        if let Some(resume) = &this.resume {
            mark(&resume.value);
        }
    });
}
