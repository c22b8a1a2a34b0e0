//! Arbitrary precision integers, the `BigInt` primitive.

use std::fmt::{self, Display};
use std::ops::Deref;
use std::rc::Rc;

use kestrel_gc::{empty_trace, Finalize, Trace};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::error::JsNativeError;
use crate::JsResult;

/// An immutable ECMAScript `BigInt` value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JsBigInt {
    inner: Rc<BigInt>,
}

impl JsBigInt {
    /// Creates a `BigInt` from any type convertible into a [`BigInt`].
    pub fn new<T: Into<BigInt>>(value: T) -> Self {
        Self {
            inner: Rc::new(value.into()),
        }
    }

    /// The zero value.
    pub fn zero() -> Self {
        Self::new(BigInt::zero())
    }

    /// Returns `true` if the value is zero.
    pub fn is_zero(&self) -> bool {
        self.inner.is_zero()
    }

    /// Converts to an `f64`, possibly losing precision.
    pub fn to_f64(&self) -> f64 {
        self.inner.to_f64().unwrap_or(f64::NAN)
    }

    /// Addition.
    pub fn add(x: &Self, y: &Self) -> Self {
        Self::new(&*x.inner + &*y.inner)
    }

    /// Subtraction.
    pub fn sub(x: &Self, y: &Self) -> Self {
        Self::new(&*x.inner - &*y.inner)
    }

    /// Multiplication.
    pub fn mul(x: &Self, y: &Self) -> Self {
        Self::new(&*x.inner * &*y.inner)
    }

    /// Division, truncating toward zero. Division by zero throws a
    /// `RangeError`.
    pub fn div(x: &Self, y: &Self) -> JsResult<Self> {
        if y.is_zero() {
            return Err(JsNativeError::range()
                .with_message("BigInt division by zero")
                .into());
        }
        Ok(Self::new(&*x.inner / &*y.inner))
    }

    /// Remainder. Division by zero throws a `RangeError`.
    pub fn rem(x: &Self, y: &Self) -> JsResult<Self> {
        if y.is_zero() {
            return Err(JsNativeError::range()
                .with_message("BigInt division by zero")
                .into());
        }
        Ok(Self::new(&*x.inner % &*y.inner))
    }

    /// Exponentiation. Negative exponents throw a `RangeError`.
    pub fn pow(x: &Self, y: &Self) -> JsResult<Self> {
        if y.inner.is_negative() {
            return Err(JsNativeError::range()
                .with_message("BigInt negative exponent")
                .into());
        }
        let exp = y.inner.to_u32().ok_or_else(|| {
            JsNativeError::range().with_message("BigInt exponent is too large")
        })?;
        Ok(Self::new(x.inner.pow(exp)))
    }

    /// Negation.
    pub fn neg(x: &Self) -> Self {
        Self::new(-&*x.inner)
    }

    /// Bitwise not.
    pub fn not(x: &Self) -> Self {
        Self::new(!&*x.inner)
    }

    /// Bitwise and.
    pub fn bitand(x: &Self, y: &Self) -> Self {
        Self::new(&*x.inner & &*y.inner)
    }

    /// Bitwise or.
    pub fn bitor(x: &Self, y: &Self) -> Self {
        Self::new(&*x.inner | &*y.inner)
    }

    /// Bitwise xor.
    pub fn bitxor(x: &Self, y: &Self) -> Self {
        Self::new(&*x.inner ^ &*y.inner)
    }

    /// Left shift. Oversized shifts throw a `RangeError`.
    pub fn shl(x: &Self, y: &Self) -> JsResult<Self> {
        let shift = y
            .inner
            .to_i64()
            .ok_or_else(|| JsNativeError::range().with_message("BigInt shift out of range"))?;
        if shift >= 0 {
            let shift = u32::try_from(shift).map_err(|_| {
                JsNativeError::range().with_message("BigInt shift out of range")
            })?;
            Ok(Self::new(&*x.inner << shift))
        } else {
            Self::shr(x, &Self::neg(y))
        }
    }

    /// Signed right shift.
    pub fn shr(x: &Self, y: &Self) -> JsResult<Self> {
        let shift = y
            .inner
            .to_i64()
            .ok_or_else(|| JsNativeError::range().with_message("BigInt shift out of range"))?;
        if shift >= 0 {
            let shift = u32::try_from(shift).map_err(|_| {
                JsNativeError::range().with_message("BigInt shift out of range")
            })?;
            Ok(Self::new(&*x.inner >> shift))
        } else {
            Self::shl(x, &Self::neg(y))
        }
    }

    /// Equality with an `f64`, per the abstract `==` rules.
    pub fn equal_to_f64(&self, other: f64) -> bool {
        if !other.is_finite() || other.fract() != 0.0 {
            return false;
        }
        num_traits::FromPrimitive::from_f64(other).is_some_and(|b: BigInt| b == *self.inner)
    }
}

impl Deref for JsBigInt {
    type Target = BigInt;

    fn deref(&self) -> &BigInt {
        &self.inner
    }
}

impl From<i64> for JsBigInt {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl Display for JsBigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl Finalize for JsBigInt {}

// SAFETY: big integers are reference counted outside the GC heap and hold
// no cell handles.
unsafe impl Trace for JsBigInt {
    empty_trace!();
}
