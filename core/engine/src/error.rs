//! Error types thrown and propagated by the engine.
//!
//! Every fallible operation returns [`JsResult`][crate::JsResult]; the `Err`
//! arm carries a [`JsError`], which is either an *opaque* error (an arbitrary
//! thrown `JsValue`) or a *native* error (a kind plus a message, created by
//! engine code before any error object exists). Native errors are turned
//! into real error objects lazily with [`JsError::to_opaque`].

use std::fmt::{self, Display};

use kestrel_gc::{custom_trace, Finalize, Trace};

use crate::context::Context;
use crate::object::JsObject;
use crate::value::JsValue;

/// The error type returned by all engine operations.
#[derive(Debug, Clone)]
pub struct JsError {
    inner: Repr,
}

#[derive(Debug, Clone)]
enum Repr {
    Native(JsNativeError),
    Opaque(JsValue),
}

impl JsError {
    /// Creates an error from a thrown value.
    pub fn from_opaque(value: JsValue) -> Self {
        Self {
            inner: Repr::Opaque(value),
        }
    }

    /// Converts the error into the value observable by `catch` clauses.
    ///
    /// Native errors materialize an error object on first conversion.
    pub fn to_opaque(&self, context: &mut Context) -> JsValue {
        match &self.inner {
            Repr::Native(native) => native.to_opaque(context).into(),
            Repr::Opaque(value) => value.clone(),
        }
    }

    /// The native error, if this is one.
    pub fn as_native(&self) -> Option<&JsNativeError> {
        match &self.inner {
            Repr::Native(native) => Some(native),
            Repr::Opaque(_) => None,
        }
    }

    /// The thrown value, if this is an opaque error.
    pub fn as_opaque(&self) -> Option<&JsValue> {
        match &self.inner {
            Repr::Opaque(value) => Some(value),
            Repr::Native(_) => None,
        }
    }
}

impl From<JsNativeError> for JsError {
    fn from(native: JsNativeError) -> Self {
        Self {
            inner: Repr::Native(native),
        }
    }
}

impl Display for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Repr::Native(native) => Display::fmt(native, f),
            Repr::Opaque(value) => write!(f, "uncaught exception: {}", value.display()),
        }
    }
}

impl std::error::Error for JsError {}

impl Finalize for JsError {}

// SAFETY: the only edge is the opaque thrown value.
unsafe impl Trace for JsError {
    custom_trace!(this, mark, {
        match &this.inner {
            Repr::Opaque(value) => mark(value),
            Repr::Native(_) => {}
        }
    });
}

/// An error created by engine code, before any error object exists.
#[derive(Debug, Clone)]
pub struct JsNativeError {
    /// The kind of the error.
    pub kind: JsNativeErrorKind,
    message: Box<str>,
}

/// The kind of a native error, mirroring the standard error constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsNativeErrorKind {
    /// A plain `Error`.
    Error,
    /// `SyntaxError`: parse or compile failure.
    Syntax,
    /// `ReferenceError`: unresolvable or uninitialized binding.
    Reference,
    /// `TypeError`: an operation applied to a value of the wrong type.
    Type,
    /// `RangeError`: a numeric value outside its legal range.
    Range,
    /// `URIError`: a URI codec failure.
    Uri,
}

impl JsNativeError {
    /// Creates a plain `Error`.
    #[must_use]
    pub fn error() -> Self {
        Self::with_kind(JsNativeErrorKind::Error)
    }

    /// Creates a `SyntaxError`.
    #[must_use]
    pub fn syntax() -> Self {
        Self::with_kind(JsNativeErrorKind::Syntax)
    }

    /// Creates a `ReferenceError`.
    #[must_use]
    pub fn reference() -> Self {
        Self::with_kind(JsNativeErrorKind::Reference)
    }

    /// Creates a `TypeError`.
    #[must_use]
    pub fn typ() -> Self {
        Self::with_kind(JsNativeErrorKind::Type)
    }

    /// Creates a `RangeError`.
    #[must_use]
    pub fn range() -> Self {
        Self::with_kind(JsNativeErrorKind::Range)
    }

    /// Creates a `URIError`.
    #[must_use]
    pub fn uri() -> Self {
        Self::with_kind(JsNativeErrorKind::Uri)
    }

    fn with_kind(kind: JsNativeErrorKind) -> Self {
        Self {
            kind,
            message: "".into(),
        }
    }

    /// Sets the message of the error.
    #[must_use]
    pub fn with_message<S: Into<Box<str>>>(mut self, message: S) -> Self {
        self.message = message.into();
        self
    }

    /// The message of the error.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Builds the error object for this native error.
    pub fn to_opaque(&self, context: &mut Context) -> JsObject {
        crate::builtins::error::create_error_object(self.kind, &self.message, context)
    }
}

impl Display for JsNativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl Display for JsNativeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "Error"),
            Self::Syntax => write!(f, "SyntaxError"),
            Self::Reference => write!(f, "ReferenceError"),
            Self::Type => write!(f, "TypeError"),
            Self::Range => write!(f, "RangeError"),
            Self::Uri => write!(f, "URIError"),
        }
    }
}
