//! Kestrel is an embeddable ECMAScript engine core.
//!
//! The crate contains the pieces that define the language's runtime
//! semantics: the value and object model, lexical environments, a bytecode
//! compiler over a host-supplied AST, a register-based interpreter with
//! cooperative suspension, and the promise/job/module machinery that drives
//! `async`/`await` and module graphs.
//!
//! What it deliberately does *not* contain: a lexer or parser (hosts build
//! [`ast`] nodes directly), a regular expression engine, or the bulk of the
//! standard library. The built-in objects that ship are exactly the ones the
//! core semantics need: `Object`, `Function`, `Array`, the error
//! constructors, iterators, generators and `Promise`.
//!
//! # Example
//!
//! ```
//! use kestrel_engine::{ast, Context, JsValue};
//!
//! let mut context = Context::default();
//! // 6 * 7
//! let script = ast::Script::new(vec![ast::Expression::binary(
//!     ast::BinaryOp::Mul,
//!     ast::Expression::from(6),
//!     ast::Expression::from(7),
//! )
//! .into()]);
//! let value = context.eval_script(&script).unwrap();
//! assert_eq!(value, JsValue::from(42));
//! ```

pub mod ast;
pub mod bigint;
pub mod builtins;
pub mod bytecompiler;
pub mod context;
pub mod environments;
pub mod error;
pub mod job;
pub mod module;
pub mod object;
pub mod property;
pub mod realm;
pub mod string;
pub mod symbol;
pub mod value;
pub mod vm;

pub use crate::{
    bigint::JsBigInt,
    context::Context,
    error::{JsError, JsNativeError, JsNativeErrorKind},
    module::Module,
    object::JsObject,
    string::JsString,
    symbol::JsSymbol,
    value::JsValue,
};

/// The result of a fallible engine operation.
///
/// An `Err` means an exception value is in flight; the caller either
/// propagates it with `?` or handles it the way a `try`/`catch` frame would.
pub type JsResult<T> = Result<T, JsError>;

#[cfg(test)]
mod tests;
