//! Binary and unary operations on values, used by the interpreter's
//! arithmetic handlers.

use super::{JsValue, PreferredType};
use crate::bigint::JsBigInt;
use crate::context::Context;
use crate::error::JsNativeError;
use crate::JsResult;

/// Outcome of the abstract relational comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AbstractRelation {
    True,
    False,
    Undefined,
}

impl JsValue {
    /// The `+` operator: numeric addition or string concatenation.
    pub fn add(&self, other: &Self, context: &mut Context) -> JsResult<JsValue> {
        // Fast paths avoid ToPrimitive entirely.
        match (self, other) {
            (Self::Integer(x), Self::Integer(y)) => {
                return Ok(match x.checked_add(*y) {
                    Some(sum) => Self::Integer(sum),
                    None => Self::Rational(f64::from(*x) + f64::from(*y)),
                })
            }
            (Self::String(x), Self::String(y)) => return Ok(Self::String(x.concat(y))),
            _ => {}
        }

        let lhs = self.to_primitive(context, PreferredType::Default)?;
        let rhs = other.to_primitive(context, PreferredType::Default)?;

        match (&lhs, &rhs) {
            (Self::String(_), _) | (_, Self::String(_)) => {
                let x = lhs.to_string(context)?;
                let y = rhs.to_string(context)?;
                Ok(Self::String(x.concat(&y)))
            }
            (Self::BigInt(x), Self::BigInt(y)) => Ok(Self::BigInt(JsBigInt::add(x, y))),
            (Self::BigInt(_), _) | (_, Self::BigInt(_)) => Err(JsNativeError::typ()
                .with_message("cannot mix BigInt and other types in addition")
                .into()),
            _ => Ok(Self::from(
                lhs.to_number(context)? + rhs.to_number(context)?,
            )),
        }
    }

    /// The `-` operator.
    pub fn sub(&self, other: &Self, context: &mut Context) -> JsResult<JsValue> {
        if let (Self::Integer(x), Self::Integer(y)) = (self, other) {
            if let Some(difference) = x.checked_sub(*y) {
                return Ok(Self::Integer(difference));
            }
        }
        self.numeric_op(other, context, "subtraction", JsBigInt::sub, |x, y| x - y)
    }

    /// The `*` operator.
    pub fn mul(&self, other: &Self, context: &mut Context) -> JsResult<JsValue> {
        if let (Self::Integer(x), Self::Integer(y)) = (self, other) {
            if let Some(product) = x.checked_mul(*y) {
                return Ok(Self::Integer(product));
            }
        }
        self.numeric_op(other, context, "multiplication", JsBigInt::mul, |x, y| {
            x * y
        })
    }

    /// The `/` operator.
    pub fn div(&self, other: &Self, context: &mut Context) -> JsResult<JsValue> {
        self.numeric_fallible_op(other, context, "division", JsBigInt::div, |x, y| x / y)
    }

    /// The `%` operator.
    pub fn rem(&self, other: &Self, context: &mut Context) -> JsResult<JsValue> {
        self.numeric_fallible_op(other, context, "remainder", JsBigInt::rem, |x, y| {
            // IEEE remainder keeps the dividend's sign.
            if y == 0.0 {
                f64::NAN
            } else {
                x % y
            }
        })
    }

    /// The `**` operator.
    pub fn pow(&self, other: &Self, context: &mut Context) -> JsResult<JsValue> {
        self.numeric_fallible_op(other, context, "exponentiation", JsBigInt::pow, f64::powf)
    }

    /// The `<<` operator.
    pub fn shl(&self, other: &Self, context: &mut Context) -> JsResult<JsValue> {
        self.int_op_or_bigint(other, context, JsBigInt::shl, |x, y| x.wrapping_shl(y))
    }

    /// The `>>` operator.
    pub fn shr(&self, other: &Self, context: &mut Context) -> JsResult<JsValue> {
        self.int_op_or_bigint(other, context, JsBigInt::shr, |x, y| x.wrapping_shr(y))
    }

    /// The `>>>` operator.
    pub fn ushr(&self, other: &Self, context: &mut Context) -> JsResult<JsValue> {
        let lhs = self.to_numeric(context)?;
        let rhs = other.to_numeric(context)?;
        if matches!(&lhs, Self::BigInt(_)) || matches!(&rhs, Self::BigInt(_)) {
            return Err(JsNativeError::typ()
                .with_message("BigInt has no unsigned right shift")
                .into());
        }
        let x = lhs.to_u32(context)?;
        let shift = rhs.to_u32(context)? % 32;
        Ok(Self::from(x.wrapping_shr(shift)))
    }

    /// The `&` operator.
    pub fn bitand(&self, other: &Self, context: &mut Context) -> JsResult<JsValue> {
        self.int_op_or_bigint_infallible(other, context, JsBigInt::bitand, |x, y| x & y)
    }

    /// The `|` operator.
    pub fn bitor(&self, other: &Self, context: &mut Context) -> JsResult<JsValue> {
        self.int_op_or_bigint_infallible(other, context, JsBigInt::bitor, |x, y| x | y)
    }

    /// The `^` operator.
    pub fn bitxor(&self, other: &Self, context: &mut Context) -> JsResult<JsValue> {
        self.int_op_or_bigint_infallible(other, context, JsBigInt::bitxor, |x, y| x ^ y)
    }

    /// The unary `-` operator.
    pub fn neg(&self, context: &mut Context) -> JsResult<JsValue> {
        match self.to_numeric(context)? {
            Self::BigInt(x) => Ok(Self::BigInt(JsBigInt::neg(&x))),
            value => Ok(Self::Rational(-value.to_number(context)?)),
        }
    }

    /// The unary `~` operator.
    pub fn bitnot(&self, context: &mut Context) -> JsResult<JsValue> {
        match self.to_numeric(context)? {
            Self::BigInt(x) => Ok(Self::BigInt(JsBigInt::not(&x))),
            value => Ok(Self::from(!value.to_i32(context)?)),
        }
    }

    /// The `<` operator.
    pub fn lt(&self, other: &Self, context: &mut Context) -> JsResult<bool> {
        Ok(self.abstract_relation(other, true, context)? == AbstractRelation::True)
    }

    /// The `<=` operator.
    pub fn le(&self, other: &Self, context: &mut Context) -> JsResult<bool> {
        Ok(other.abstract_relation(self, false, context)? == AbstractRelation::False)
    }

    /// The `>` operator.
    pub fn gt(&self, other: &Self, context: &mut Context) -> JsResult<bool> {
        Ok(other.abstract_relation(self, false, context)? == AbstractRelation::True)
    }

    /// The `>=` operator.
    pub fn ge(&self, other: &Self, context: &mut Context) -> JsResult<bool> {
        Ok(self.abstract_relation(other, true, context)? == AbstractRelation::False)
    }

    /// `IsLessThan ( x, y, leftFirst )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-islessthan
    pub(crate) fn abstract_relation(
        &self,
        other: &Self,
        left_first: bool,
        context: &mut Context,
    ) -> JsResult<AbstractRelation> {
        let (px, py) = if left_first {
            let px = self.to_primitive(context, PreferredType::Number)?;
            let py = other.to_primitive(context, PreferredType::Number)?;
            (px, py)
        } else {
            let py = other.to_primitive(context, PreferredType::Number)?;
            let px = self.to_primitive(context, PreferredType::Number)?;
            (px, py)
        };

        if let (Self::String(x), Self::String(y)) = (&px, &py) {
            return Ok(if x.as_str() < y.as_str() {
                AbstractRelation::True
            } else {
                AbstractRelation::False
            });
        }
        if let (Self::BigInt(x), Self::BigInt(y)) = (&px, &py) {
            return Ok(if x < y {
                AbstractRelation::True
            } else {
                AbstractRelation::False
            });
        }

        let nx = px.to_number(context)?;
        let ny = py.to_number(context)?;
        Ok(if nx.is_nan() || ny.is_nan() {
            AbstractRelation::Undefined
        } else if nx < ny {
            AbstractRelation::True
        } else {
            AbstractRelation::False
        })
    }

    /// The `instanceof` operator.
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-instanceofoperator
    pub fn instance_of(&self, target: &Self, context: &mut Context) -> JsResult<bool> {
        let Some(target_obj) = target.as_object() else {
            return Err(JsNativeError::typ()
                .with_message("right-hand side of 'instanceof' is not an object")
                .into());
        };
        if let Some(method) =
            target_obj.get_method(crate::symbol::JsSymbol::has_instance(), context)?
        {
            let result = method.call(target, &[self.clone()], context)?;
            return Ok(result.to_boolean());
        }
        if !target_obj.is_callable() {
            return Err(JsNativeError::typ()
                .with_message("right-hand side of 'instanceof' is not callable")
                .into());
        }
        target_obj.clone().ordinary_has_instance(self, context)
    }

    fn numeric_op(
        &self,
        other: &Self,
        context: &mut Context,
        op_name: &str,
        bigint_op: fn(&JsBigInt, &JsBigInt) -> JsBigInt,
        number_op: fn(f64, f64) -> f64,
    ) -> JsResult<JsValue> {
        let lhs = self.to_numeric(context)?;
        let rhs = other.to_numeric(context)?;
        match (&lhs, &rhs) {
            (Self::BigInt(x), Self::BigInt(y)) => Ok(Self::BigInt(bigint_op(x, y))),
            (Self::BigInt(_), _) | (_, Self::BigInt(_)) => Err(JsNativeError::typ()
                .with_message(format!("cannot mix BigInt and other types in {op_name}"))
                .into()),
            _ => Ok(Self::from(number_op(
                lhs.to_number(context)?,
                rhs.to_number(context)?,
            ))),
        }
    }

    fn numeric_fallible_op(
        &self,
        other: &Self,
        context: &mut Context,
        op_name: &str,
        bigint_op: fn(&JsBigInt, &JsBigInt) -> JsResult<JsBigInt>,
        number_op: fn(f64, f64) -> f64,
    ) -> JsResult<JsValue> {
        let lhs = self.to_numeric(context)?;
        let rhs = other.to_numeric(context)?;
        match (&lhs, &rhs) {
            (Self::BigInt(x), Self::BigInt(y)) => Ok(Self::BigInt(bigint_op(x, y)?)),
            (Self::BigInt(_), _) | (_, Self::BigInt(_)) => Err(JsNativeError::typ()
                .with_message(format!("cannot mix BigInt and other types in {op_name}"))
                .into()),
            _ => Ok(Self::from(number_op(
                lhs.to_number(context)?,
                rhs.to_number(context)?,
            ))),
        }
    }

    fn int_op_or_bigint(
        &self,
        other: &Self,
        context: &mut Context,
        bigint_op: fn(&JsBigInt, &JsBigInt) -> JsResult<JsBigInt>,
        int_op: fn(i32, u32) -> i32,
    ) -> JsResult<JsValue> {
        let lhs = self.to_numeric(context)?;
        let rhs = other.to_numeric(context)?;
        match (&lhs, &rhs) {
            (Self::BigInt(x), Self::BigInt(y)) => Ok(Self::BigInt(bigint_op(x, y)?)),
            (Self::BigInt(_), _) | (_, Self::BigInt(_)) => Err(JsNativeError::typ()
                .with_message("cannot mix BigInt and other types in shifts")
                .into()),
            _ => {
                let x = lhs.to_i32(context)?;
                let shift = rhs.to_u32(context)? % 32;
                Ok(Self::from(int_op(x, shift)))
            }
        }
    }

    fn int_op_or_bigint_infallible(
        &self,
        other: &Self,
        context: &mut Context,
        bigint_op: fn(&JsBigInt, &JsBigInt) -> JsBigInt,
        int_op: fn(i32, i32) -> i32,
    ) -> JsResult<JsValue> {
        let lhs = self.to_numeric(context)?;
        let rhs = other.to_numeric(context)?;
        match (&lhs, &rhs) {
            (Self::BigInt(x), Self::BigInt(y)) => Ok(Self::BigInt(bigint_op(x, y))),
            (Self::BigInt(_), _) | (_, Self::BigInt(_)) => Err(JsNativeError::typ()
                .with_message("cannot mix BigInt and other types in bitwise operations")
                .into()),
            _ => {
                let x = lhs.to_i32(context)?;
                let y = rhs.to_i32(context)?;
                Ok(Self::from(int_op(x, y)))
            }
        }
    }
}
