//! The universal value type and its abstract operations.

mod display;
mod equality;
mod operations;

pub use display::ValueDisplay;

use kestrel_gc::{custom_trace, Finalize, Trace};

use crate::bigint::JsBigInt;
use crate::context::Context;
use crate::error::JsNativeError;
use crate::object::JsObject;
use crate::property::PropertyKey;
use crate::string::JsString;
use crate::symbol::JsSymbol;
use crate::JsResult;

/// A tagged ECMAScript value.
///
/// Numbers are split into an `i32` fast path and the general `f64` case, so
/// hot-path integer arithmetic never allocates. Strings, symbols and big
/// integers are reference counted; only objects live on the GC heap.
#[derive(Debug, Clone, Default)]
pub enum JsValue {
    /// `undefined`.
    #[default]
    Undefined,
    /// `null`.
    Null,
    /// A boolean.
    Boolean(bool),
    /// A number that fits an `i32`.
    Integer(i32),
    /// Any other IEEE-754 double.
    Rational(f64),
    /// A string.
    String(JsString),
    /// A symbol.
    Symbol(JsSymbol),
    /// A big integer.
    BigInt(JsBigInt),
    /// An object.
    Object(JsObject),
}

static_assertions::const_assert!(std::mem::size_of::<JsValue>() <= 16);

/// The hint passed to `ToPrimitive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredType {
    /// No preference.
    Default,
    /// Prefer a string result.
    String,
    /// Prefer a number result.
    Number,
}

impl JsValue {
    /// The `undefined` value.
    #[inline]
    pub const fn undefined() -> Self {
        Self::Undefined
    }

    /// The `null` value.
    #[inline]
    pub const fn null() -> Self {
        Self::Null
    }

    /// The `NaN` value.
    #[inline]
    pub const fn nan() -> Self {
        Self::Rational(f64::NAN)
    }

    /// Creates a value from anything convertible.
    pub fn new<T: Into<Self>>(value: T) -> Self {
        value.into()
    }

    /// Returns `true` for `undefined`.
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Returns `true` for `null`.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` for `null` or `undefined`.
    #[inline]
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Self::Null | Self::Undefined)
    }

    /// Returns `true` for objects.
    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// The object, if this value is one.
    #[inline]
    pub fn as_object(&self) -> Option<&JsObject> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The string, if this value is one.
    #[inline]
    pub fn as_string(&self) -> Option<&JsString> {
        match self {
            Self::String(string) => Some(string),
            _ => None,
        }
    }

    /// The number, if this value is one.
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(integer) => Some(f64::from(*integer)),
            Self::Rational(rational) => Some(*rational),
            _ => None,
        }
    }

    /// Returns `true` if the value is a callable object.
    pub fn is_callable(&self) -> bool {
        self.as_object().is_some_and(JsObject::is_callable)
    }

    /// The callable object, if the value is one.
    pub fn as_callable(&self) -> Option<&JsObject> {
        self.as_object().filter(|o| o.is_callable())
    }

    /// `typeof` semantics.
    pub fn type_of(&self) -> JsString {
        JsString::from(match self {
            Self::Undefined => "undefined",
            Self::Null => "object",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) | Self::Rational(_) => "number",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::BigInt(_) => "bigint",
            Self::Object(object) => {
                if object.is_callable() {
                    "function"
                } else {
                    "object"
                }
            }
        })
    }

    /// `ToBoolean ( argument )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-toboolean
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Boolean(boolean) => *boolean,
            Self::Integer(integer) => *integer != 0,
            Self::Rational(rational) => *rational != 0.0 && !rational.is_nan(),
            Self::String(string) => !string.is_empty(),
            Self::BigInt(bigint) => !bigint.is_zero(),
            Self::Symbol(_) | Self::Object(_) => true,
        }
    }

    /// `ToNumber ( argument )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-tonumber
    pub fn to_number(&self, context: &mut Context) -> JsResult<f64> {
        match self {
            Self::Undefined => Ok(f64::NAN),
            Self::Null => Ok(0.0),
            Self::Boolean(true) => Ok(1.0),
            Self::Boolean(false) => Ok(0.0),
            Self::Integer(integer) => Ok(f64::from(*integer)),
            Self::Rational(rational) => Ok(*rational),
            Self::String(string) => Ok(string_to_number(string)),
            Self::Symbol(_) => Err(JsNativeError::typ()
                .with_message("cannot convert a Symbol to a number")
                .into()),
            Self::BigInt(_) => Err(JsNativeError::typ()
                .with_message("cannot convert a BigInt to a number")
                .into()),
            Self::Object(_) => {
                let primitive = self.to_primitive(context, PreferredType::Number)?;
                primitive.to_number(context)
            }
        }
    }

    /// `ToNumeric ( value )`: like `ToNumber` but lets `BigInt` through.
    pub fn to_numeric(&self, context: &mut Context) -> JsResult<JsValue> {
        let primitive = self.to_primitive(context, PreferredType::Number)?;
        if let Self::BigInt(_) = primitive {
            return Ok(primitive);
        }
        Ok(Self::Rational(primitive.to_number(context)?))
    }

    /// `ToInt32 ( argument )`
    pub fn to_i32(&self, context: &mut Context) -> JsResult<i32> {
        if let Self::Integer(integer) = self {
            return Ok(*integer);
        }
        let number = self.to_number(context)?;
        Ok(f64_to_int32(number))
    }

    /// `ToUint32 ( argument )`
    pub fn to_u32(&self, context: &mut Context) -> JsResult<u32> {
        if let Self::Integer(integer) = self {
            if *integer >= 0 {
                return Ok(*integer as u32);
            }
        }
        let number = self.to_number(context)?;
        Ok(f64_to_int32(number) as u32)
    }

    /// `ToLength ( argument )`
    pub fn to_length(&self, context: &mut Context) -> JsResult<u64> {
        let len = self.to_number(context)?;
        if len.is_nan() || len <= 0.0 {
            return Ok(0);
        }
        Ok(len.min(2f64.powi(53) - 1.0) as u64)
    }

    /// `ToPrimitive ( input [ , preferredType ] )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-toprimitive
    pub fn to_primitive(
        &self,
        context: &mut Context,
        preferred_type: PreferredType,
    ) -> JsResult<JsValue> {
        let Some(object) = self.as_object() else {
            return Ok(self.clone());
        };

        // 1. If input is an Object, check for a @@toPrimitive method first.
        let exotic = object.get_method(JsSymbol::to_primitive(), context)?;
        if let Some(exotic) = exotic {
            let hint = match preferred_type {
                PreferredType::Default => "default",
                PreferredType::String => "string",
                PreferredType::Number => "number",
            };
            let result = exotic.call(self, &[JsValue::from(JsString::from(hint))], context)?;
            if result.is_object() {
                return Err(JsNativeError::typ()
                    .with_message("Symbol.toPrimitive returned an object")
                    .into());
            }
            return Ok(result);
        }

        // 2. OrdinaryToPrimitive: valueOf/toString in hint order.
        let method_names: [&str; 2] = if preferred_type == PreferredType::String {
            ["toString", "valueOf"]
        } else {
            ["valueOf", "toString"]
        };
        for name in method_names {
            let method = object.get(PropertyKey::from(name), context)?;
            if let Some(method) = method.as_callable() {
                let result = method.clone().call(self, &[], context)?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        Err(JsNativeError::typ()
            .with_message("cannot convert object to primitive value")
            .into())
    }

    /// `ToString ( argument )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-tostring
    pub fn to_string(&self, context: &mut Context) -> JsResult<JsString> {
        match self {
            Self::Undefined => Ok(JsString::from("undefined")),
            Self::Null => Ok(JsString::from("null")),
            Self::Boolean(true) => Ok(JsString::from("true")),
            Self::Boolean(false) => Ok(JsString::from("false")),
            Self::Integer(integer) => Ok(JsString::from(integer.to_string())),
            Self::Rational(rational) => Ok(number_to_string(*rational)),
            Self::String(string) => Ok(string.clone()),
            Self::Symbol(_) => Err(JsNativeError::typ()
                .with_message("cannot convert a Symbol to a string")
                .into()),
            Self::BigInt(bigint) => Ok(JsString::from(bigint.to_string())),
            Self::Object(_) => {
                let primitive = self.to_primitive(context, PreferredType::String)?;
                primitive.to_string(context)
            }
        }
    }

    /// `ToPropertyKey ( argument )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-topropertykey
    pub fn to_property_key(&self, context: &mut Context) -> JsResult<PropertyKey> {
        match self {
            // Fast path for integer keys.
            Self::Integer(integer) if *integer >= 0 => Ok(PropertyKey::Index(*integer as u32)),
            Self::Symbol(symbol) => Ok(PropertyKey::Symbol(symbol.clone())),
            Self::String(string) => Ok(PropertyKey::from(string.clone())),
            _ => {
                let primitive = self.to_primitive(context, PreferredType::String)?;
                if let Self::Symbol(symbol) = primitive {
                    return Ok(PropertyKey::Symbol(symbol));
                }
                Ok(PropertyKey::from(primitive.to_string(context)?))
            }
        }
    }

    /// `ToObject ( argument )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-toobject
    pub fn to_object(&self, context: &mut Context) -> JsResult<JsObject> {
        match self {
            Self::Undefined | Self::Null => Err(JsNativeError::typ()
                .with_message("cannot convert 'null' or 'undefined' to object")
                .into()),
            Self::Object(object) => Ok(object.clone()),
            Self::String(string) => Ok(crate::object::string_wrapper(string.clone(), context)),
            _ => Ok(crate::object::primitive_wrapper(self.clone(), context)),
        }
    }

    /// `RequireObjectCoercible ( argument )`
    pub fn require_object_coercible(&self) -> JsResult<&Self> {
        if self.is_null_or_undefined() {
            return Err(JsNativeError::typ()
                .with_message("cannot destructure 'null' or 'undefined'")
                .into());
        }
        Ok(self)
    }

    /// Shows a human readable rendering of the value.
    pub fn display(&self) -> ValueDisplay<'_> {
        ValueDisplay { value: self }
    }
}

/// `StringToNumber` per the numeric literal grammar.
fn string_to_number(string: &JsString) -> f64 {
    let trimmed = string.as_str().trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    if let Some(oct) = trimmed
        .strip_prefix("0o")
        .or_else(|| trimmed.strip_prefix("0O"))
    {
        return u64::from_str_radix(oct, 8).map_or(f64::NAN, |n| n as f64);
    }
    if let Some(bin) = trimmed
        .strip_prefix("0b")
        .or_else(|| trimmed.strip_prefix("0B"))
    {
        return u64::from_str_radix(bin, 2).map_or(f64::NAN, |n| n as f64);
    }
    match fast_float2::parse::<f64, _>(trimmed) {
        Ok(number) => number,
        Err(_) => f64::NAN,
    }
}

/// `Number::toString` for the double `value`.
pub(crate) fn number_to_string(value: f64) -> JsString {
    let mut buffer = ryu_js::Buffer::new();
    JsString::from(buffer.format(value))
}

/// `ToInt32` over a finished double.
pub(crate) fn f64_to_int32(number: f64) -> i32 {
    if !number.is_finite() {
        return 0;
    }
    let number = number.trunc();
    let modulus = number.rem_euclid(4_294_967_296.0);
    if modulus >= 2_147_483_648.0 {
        (modulus - 4_294_967_296.0) as i32
    } else {
        modulus as i32
    }
}

impl From<bool> for JsValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for JsValue {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for JsValue {
    fn from(value: u32) -> Self {
        i32::try_from(value).map_or(Self::Rational(f64::from(value)), Self::Integer)
    }
}

impl From<f64> for JsValue {
    fn from(value: f64) -> Self {
        // Keep integral doubles on the fast path when they fit and don't
        // erase the sign of negative zero.
        if value.fract() == 0.0 && !(value == 0.0 && value.is_sign_negative()) {
            if let Ok(integer) = i32::try_from(value as i64) {
                if (integer as f64).to_bits() == value.to_bits() {
                    return Self::Integer(integer);
                }
            }
        }
        Self::Rational(value)
    }
}

impl From<JsString> for JsValue {
    fn from(value: JsString) -> Self {
        Self::String(value)
    }
}

impl From<&str> for JsValue {
    fn from(value: &str) -> Self {
        Self::String(JsString::from(value))
    }
}

impl From<JsSymbol> for JsValue {
    fn from(value: JsSymbol) -> Self {
        Self::Symbol(value)
    }
}

impl From<JsBigInt> for JsValue {
    fn from(value: JsBigInt) -> Self {
        Self::BigInt(value)
    }
}

impl From<JsObject> for JsValue {
    fn from(value: JsObject) -> Self {
        Self::Object(value)
    }
}

impl Finalize for JsValue {}

// SAFETY: the object variant is the only one holding a cell handle.
unsafe impl Trace for JsValue {
    custom_trace!(this, mark, {
        if let JsValue::Object(object) = this {
            mark(object);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_boolean_matrix() {
        assert!(!JsValue::undefined().to_boolean());
        assert!(!JsValue::null().to_boolean());
        assert!(!JsValue::from(0).to_boolean());
        assert!(!JsValue::nan().to_boolean());
        assert!(!JsValue::from("").to_boolean());
        assert!(JsValue::from(1).to_boolean());
        assert!(JsValue::from("x").to_boolean());
    }

    #[test]
    fn number_string_round_trip() {
        for value in [0.5, 1.0, -1.5, 123456.789, 1e21, 5e-7] {
            let s = number_to_string(value);
            assert_eq!(string_to_number(&s), value, "{s}");
        }
    }

    #[test]
    fn int32_wrapping() {
        assert_eq!(f64_to_int32(4_294_967_296.0), 0);
        assert_eq!(f64_to_int32(2_147_483_648.0), -2_147_483_648);
        assert_eq!(f64_to_int32(-1.0), -1);
        assert_eq!(f64_to_int32(f64::NAN), 0);
    }
}
