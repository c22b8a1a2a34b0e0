//! The compiled representation of a function.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use kestrel_gc::{custom_trace, Finalize, Gc, Trace};

use crate::environments::ScopeShape;
use crate::string::JsString;
use crate::value::JsValue;
use crate::vm::opcode::{Opcode, NO_LABEL};

/// The bytecode of one function segment may not exceed 64 KiB; labels are
/// 16-bit offsets.
pub const MAX_CODE_SIZE: usize = u16::MAX as usize + 1;

/// The register file of one function is capped at 256; register operands
/// are bytes.
pub const MAX_REGISTERS: usize = 256;

bitflags! {
    /// Static properties of a compiled function.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CodeBlockFlags: u16 {
        /// Strict mode code.
        const STRICT = 0b0000_0000_0001;
        /// An `async` function.
        const ASYNC = 0b0000_0000_0010;
        /// A generator.
        const GENERATOR = 0b0000_0000_0100;
        /// An arrow function: no own `this`, no `arguments`.
        const ARROW = 0b0000_0000_1000;
        /// A class constructor.
        const CLASS_CONSTRUCTOR = 0b0000_0001_0000;
        /// A derived class constructor (`this` starts uninitialized).
        const DERIVED_CONSTRUCTOR = 0b0000_0010_0000;
        /// A method shorthand (not constructable).
        const METHOD = 0b0000_0100_0000;
        /// A synthesized default constructor with no bytecode body.
        const DEFAULT_CONSTRUCTOR = 0b0000_1000_0000;
        /// The top level of a module.
        const MODULE = 0b0001_0000_0000;
        /// The parameters are simple, allowing a mapped arguments object.
        const SIMPLE_PARAMETERS = 0b0010_0000_0000;
    }
}

/// A binding reference: a name plus the scope-resolution cache filled in by
/// the interpreter on first execution.
#[derive(Debug)]
pub struct BindingRef {
    /// The referenced name.
    pub name: JsString,
    /// `(environment hops, slot)` once resolved.
    pub(crate) cache: Cell<Option<(u16, u32)>>,
    /// Set when the reference resolved through a scope that can acquire
    /// bindings dynamically; such references re-resolve every time.
    pub(crate) uncacheable: Cell<bool>,
}

impl BindingRef {
    /// A fresh, unresolved reference.
    pub fn new(name: JsString) -> Self {
        Self {
            name,
            cache: Cell::new(None),
            uncacheable: Cell::new(false),
        }
    }
}

/// A property reference: an interned name plus the inline cache the
/// interpreter fills with the last seen receiver shape.
#[derive(Debug)]
pub struct PropertyRef {
    /// The accessed name.
    pub name: JsString,
    /// `(object identity, object generation, string-table slot)`.
    pub(crate) cache: Cell<Option<(usize, u64, u32)>>,
}

impl PropertyRef {
    /// A fresh, cold reference.
    pub fn new(name: JsString) -> Self {
        Self {
            name,
            cache: Cell::new(None),
        }
    }
}

/// The compiled representation of a function: bytecode plus its side
/// tables.
pub struct CodeBlock {
    /// Name of this function.
    pub name: JsString,
    /// The number of declared parameters.
    pub length: u32,
    /// Static flags.
    pub flags: CodeBlockFlags,
    /// The register file size this function needs.
    pub register_count: u16,
    /// Bytecode.
    pub code: Vec<u8>,
    /// Literal values (strings, non-immediate numbers, bigints).
    pub literals: Vec<JsValue>,
    /// Binding references, indexed by the binding opcodes.
    pub bindings: Vec<BindingRef>,
    /// Property references, indexed by the property opcodes.
    pub property_refs: Vec<PropertyRef>,
    /// Scope shapes, indexed by `PushLexEnv` and function entry.
    pub scopes: Vec<Rc<ScopeShape>>,
    /// Private-name scopes, indexed by `PushPrivateEnv`.
    pub private_scopes: Vec<Vec<JsString>>,
    /// Private-name references, indexed by the private opcodes; each entry
    /// is the description looked up in the private environment chain.
    pub private_names: Vec<JsString>,
    /// Functions declared inside this function.
    pub functions: Vec<Gc<CodeBlock>>,
    /// Strictly increasing `(bytecode offset, line)` pairs.
    pub line_info: Vec<(u32, u32)>,
}

impl CodeBlock {
    /// The source line active at `offset`, from the line-info table.
    pub fn line_at(&self, offset: u32) -> Option<u32> {
        match self.line_info.binary_search_by_key(&offset, |&(o, _)| o) {
            Ok(i) => Some(self.line_info[i].1),
            Err(0) => None,
            Err(i) => Some(self.line_info[i - 1].1),
        }
    }

    /// Reads a value of type `T` from the bytecode at `offset`.
    #[track_caller]
    pub(crate) fn read<T: Readable>(&self, offset: usize) -> T {
        assert!(offset + std::mem::size_of::<T>() <= self.code.len());
        // SAFETY: bounds checked above; `Readable` types tolerate unaligned
        // reads.
        unsafe {
            self.code
                .as_ptr()
                .add(offset)
                .cast::<T>()
                .read_unaligned()
        }
    }

    /// Renders one instruction and returns the offset of the next.
    fn disassemble_at(&self, offset: usize, out: &mut String) -> usize {
        use fmt::Write;

        let opcode = Opcode::try_from(self.code[offset]).expect("compiler emitted valid opcodes");
        let mut pc = offset + 1;
        let _ = write!(out, "{offset:05}  {:<24}", opcode.as_str());

        // Operand rendering keyed by layout rather than per-opcode.
        match opcode {
            Opcode::LoadInt8 => {
                let dst = self.read::<u8>(pc);
                let value = self.read::<i8>(pc + 1);
                let _ = write!(out, "r{dst}, {value}");
            }
            Opcode::LoadInt32 => {
                let dst = self.read::<u8>(pc);
                let value = self.read::<i32>(pc + 1);
                let _ = write!(out, "r{dst}, {value}");
            }
            Opcode::LoadRational => {
                let dst = self.read::<u8>(pc);
                let value = self.read::<f64>(pc + 1);
                let _ = write!(out, "r{dst}, {}", ryu_js::Buffer::new().format(value));
            }
            Opcode::LoadConstant => {
                let dst = self.read::<u8>(pc);
                let index = self.read::<u16>(pc + 1);
                let _ = write!(
                    out,
                    "r{dst}, {index:04}: {}",
                    self.literals[index as usize].display()
                );
            }
            Opcode::CreateFunction => {
                let dst = self.read::<u8>(pc);
                let index = self.read::<u16>(pc + 1);
                let _ = write!(
                    out,
                    "r{dst}, {index:04}: '{}'",
                    self.functions[index as usize].name
                );
            }
            Opcode::GetName
            | Opcode::GetNameOrUndefined
            | Opcode::SetName
            | Opcode::InitName
            | Opcode::DeleteName => {
                let reg = self.read::<u8>(pc);
                let index = self.read::<u16>(pc + 1);
                let _ = write!(
                    out,
                    "r{reg}, {index:04}: '{}'",
                    self.bindings[index as usize].name
                );
            }
            Opcode::ResolveBinding => {
                let index = self.read::<u16>(pc);
                let _ = write!(out, "{index:04}: '{}'", self.bindings[index as usize].name);
            }
            Opcode::GetPropertyByName
            | Opcode::SetPropertyByName
            | Opcode::DefineOwnPropertyByName
            | Opcode::DefineGetterByName
            | Opcode::DefineSetterByName
            | Opcode::DeletePropertyByName => {
                let a = self.read::<u8>(pc);
                let b = self.read::<u8>(pc + 1);
                let slot = self.read::<u16>(pc + 2);
                let _ = write!(
                    out,
                    "r{a}, r{b}, {slot:04}: '{}'",
                    self.property_refs[slot as usize].name
                );
            }
            Opcode::Jump => {
                let label = self.read::<i16>(pc);
                let target = (pc + 2) as i64 + i64::from(label);
                let _ = write!(out, "-> {target:05}");
            }
            Opcode::JumpIfTrue
            | Opcode::JumpIfFalse
            | Opcode::JumpIfNullOrUndefined
            | Opcode::JumpIfNotUndefined
            | Opcode::ForStep
            | Opcode::EnumStep => {
                let reg = self.read::<u8>(pc);
                let label = self.read::<i16>(pc + 1);
                let target = (pc + 3) as i64 + i64::from(label);
                let _ = write!(out, "r{reg} -> {target:05}");
            }
            Opcode::PushTry => {
                let catch = self.read::<i16>(pc);
                let finally = self.read::<i16>(pc + 2);
                let show = |label: i16, operand_end: i64| {
                    if label == NO_LABEL {
                        "-".to_string()
                    } else {
                        format!("{:05}", operand_end + i64::from(label))
                    }
                };
                let _ = write!(
                    out,
                    "catch {} finally {}",
                    show(catch, (pc + 2) as i64),
                    show(finally, (pc + 4) as i64)
                );
            }
            _ => {
                // Generic layouts: registers and small immediates, printed
                // positionally.
                for i in 0..opcode.operand_size() {
                    if i > 0 {
                        let _ = write!(out, ", ");
                    }
                    let _ = write!(out, "{}", self.read::<u8>(pc + i));
                }
            }
        }
        pc += opcode.operand_size();
        out.push('\n');
        pc
    }
}

/// This represents whether a value can be read from [`CodeBlock`] code.
///
/// # Safety
///
/// Implementors must be plain-old-data: any bit pattern is a valid value
/// and the type has no drop glue.
pub(crate) unsafe trait Readable {}

// SAFETY: plain integers and floats.
unsafe impl Readable for u8 {}
// SAFETY: plain integers and floats.
unsafe impl Readable for i8 {}
// SAFETY: plain integers and floats.
unsafe impl Readable for u16 {}
// SAFETY: plain integers and floats.
unsafe impl Readable for i16 {}
// SAFETY: plain integers and floats.
unsafe impl Readable for u32 {}
// SAFETY: plain integers and floats.
unsafe impl Readable for i32 {}
// SAFETY: plain integers and floats.
unsafe impl Readable for f64 {}

impl fmt::Display for CodeBlock {
    /// The disassembly listing of the function and its inner functions.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "function '{}' ({} params, {} registers, {} bytes)",
            self.name,
            self.length,
            self.register_count,
            self.code.len()
        )?;
        let mut out = String::new();
        let mut pc = 0;
        while pc < self.code.len() {
            pc = self.disassemble_at(pc, &mut out);
        }
        f.write_str(&out)?;
        for function in &self.functions {
            writeln!(f)?;
            fmt::Display::fmt(&**function, f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CodeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeBlock")
            .field("name", &self.name)
            .field("length", &self.length)
            .field("flags", &self.flags)
            .field("register_count", &self.register_count)
            .field("code_len", &self.code.len())
            .finish_non_exhaustive()
    }
}

impl Finalize for CodeBlock {}

// SAFETY: inner functions are the only cell edges; literals never hold
// objects.
unsafe impl Trace for CodeBlock {
    custom_trace!(this, mark, {
        for function in &this.functions {
            mark(function);
        }
    });
}
