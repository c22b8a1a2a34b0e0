//! Value equality: strict, abstract (loose) and `SameValue` variants.

use super::JsValue;
use crate::context::Context;
use crate::JsResult;

impl JsValue {
    /// `IsStrictlyEqual ( x, y )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-isstrictlyequal
    pub fn strict_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Boolean(x), Self::Boolean(y)) => x == y,
            (Self::String(x), Self::String(y)) => x == y,
            (Self::Symbol(x), Self::Symbol(y)) => x == y,
            (Self::BigInt(x), Self::BigInt(y)) => x == y,
            (Self::Object(x), Self::Object(y)) => JsValue::object_eq(x, y),
            _ => match (self.as_number(), other.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    fn object_eq(x: &crate::object::JsObject, y: &crate::object::JsObject) -> bool {
        crate::object::JsObject::equals(x, y)
    }

    /// `IsLooselyEqual ( x, y )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-islooselyequal
    pub fn equals(&self, other: &Self, context: &mut Context) -> JsResult<bool> {
        // 1. Same type: strict equality.
        if self.same_type_as(other) {
            return Ok(self.strict_equals(other));
        }

        match (self, other) {
            // null == undefined.
            (Self::Null, Self::Undefined) | (Self::Undefined, Self::Null) => Ok(true),

            // Number == String: compare numerically.
            (Self::Integer(_) | Self::Rational(_), Self::String(_))
            | (Self::String(_), Self::Integer(_) | Self::Rational(_)) => {
                let x = self.to_number(context)?;
                let y = other.to_number(context)?;
                Ok(x == y)
            }

            // BigInt == String/Number.
            (Self::BigInt(x), _) if other.as_number().is_some() => {
                Ok(x.equal_to_f64(other.as_number().unwrap_or(f64::NAN)))
            }
            (_, Self::BigInt(y)) if self.as_number().is_some() => {
                Ok(y.equal_to_f64(self.as_number().unwrap_or(f64::NAN)))
            }
            (Self::BigInt(x), Self::String(y)) => Ok(y
                .as_str()
                .trim()
                .parse::<num_bigint::BigInt>()
                .is_ok_and(|parsed| parsed == **x)),
            (Self::String(x), Self::BigInt(y)) => Ok(x
                .as_str()
                .trim()
                .parse::<num_bigint::BigInt>()
                .is_ok_and(|parsed| parsed == **y)),

            // Boolean operands convert to numbers.
            (Self::Boolean(_), _) => {
                let as_number = Self::from(self.to_number(context)?);
                as_number.equals(other, context)
            }
            (_, Self::Boolean(_)) => {
                let as_number = Self::from(other.to_number(context)?);
                self.equals(&as_number, context)
            }

            // Object operands convert to primitives.
            (Self::Object(_), _) => {
                let primitive = self.to_primitive(context, super::PreferredType::Default)?;
                primitive.equals(other, context)
            }
            (_, Self::Object(_)) => {
                let primitive = other.to_primitive(context, super::PreferredType::Default)?;
                self.equals(&primitive, context)
            }

            _ => Ok(false),
        }
    }

    fn same_type_as(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Undefined, Self::Undefined)
                | (Self::Null, Self::Null)
                | (Self::Boolean(_), Self::Boolean(_))
                | (
                    Self::Integer(_) | Self::Rational(_),
                    Self::Integer(_) | Self::Rational(_)
                )
                | (Self::String(_), Self::String(_))
                | (Self::Symbol(_), Self::Symbol(_))
                | (Self::BigInt(_), Self::BigInt(_))
                | (Self::Object(_), Self::Object(_))
        )
    }

    /// `SameValue ( x, y )`: like strict equality, except `NaN` equals
    /// itself and `+0` differs from `-0`.
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-samevalue
    pub fn same_value(&self, other: &Self) -> bool {
        if let (Some(x), Some(y)) = (self.as_number(), other.as_number()) {
            if !self.same_type_as(other) {
                return false;
            }
            if x.is_nan() && y.is_nan() {
                return true;
            }
            return x.to_bits() == y.to_bits();
        }
        self.strict_equals(other)
    }

    /// `SameValueZero ( x, y )`: like `SameValue` but `+0` equals `-0`.
    pub fn same_value_zero(&self, other: &Self) -> bool {
        if let (Some(x), Some(y)) = (self.as_number(), other.as_number()) {
            if x.is_nan() && y.is_nan() {
                return true;
            }
            return x == y;
        }
        self.strict_equals(other)
    }
}

impl PartialEq for JsValue {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}
