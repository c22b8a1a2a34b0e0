//! Human readable rendering of values for diagnostics.

use std::fmt::{self, Display};

use super::JsValue;

/// Wrapper implementing [`Display`] for a value without running script code.
///
/// Object contents are not walked; anything that would require calling
/// `toString` is summarized instead.
#[derive(Debug)]
pub struct ValueDisplay<'a> {
    pub(super) value: &'a JsValue,
}

impl Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            JsValue::Undefined => write!(f, "undefined"),
            JsValue::Null => write!(f, "null"),
            JsValue::Boolean(boolean) => write!(f, "{boolean}"),
            JsValue::Integer(integer) => write!(f, "{integer}"),
            JsValue::Rational(rational) => write!(f, "{}", super::number_to_string(*rational)),
            JsValue::String(string) => write!(f, "\"{string}\""),
            JsValue::Symbol(symbol) => write!(f, "{symbol}"),
            JsValue::BigInt(bigint) => write!(f, "{bigint}n"),
            JsValue::Object(object) => {
                if object.is_callable() {
                    write!(f, "[function]")
                } else {
                    write!(f, "[object]")
                }
            }
        }
    }
}
