use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

/// The kinds of values an expression can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupportedValueType {
    /// 64-bit integers and doubles
    Numeric,
    /// `true` or `false`
    Boolean,
    /// UTF-8 text
    String,
    /// Raw bytes
    ByteArray,
    /// Not determined (yet)
    Unknown,
}

impl Display for SupportedValueType {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        let name = match self {
            Self::Numeric => "numeric",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::ByteArray => "bytearray",
            Self::Unknown => "unknown",
        };
        fmt.write_str(name)
    }
}

/// A numeric value, either integral or floating point.
///
/// Arithmetic between two numbers picks the lowest representation able to hold
/// the exact result: integers stay integers until an operation overflows or has
/// no exact integral result, at which point the result is promoted to `f64`.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    /// A 64-bit signed integer
    Integer(i64),
    /// A double precision float
    Float(f64),
}

impl Number {
    /// The value as a float, whatever the representation
    pub fn as_f64(self) -> f64 {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Integer(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    /// The value as an integer, if it is integral and in range
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(i),
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(f) if f.fract() == 0.0 && f >= -9.223_372_036_854_776e18 && f < 9.223_372_036_854_776e18 => {
                Some(f as i64)
            }
            Self::Float(_) => None,
        }
    }

    /// Check if the value is stored as an integer
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Integer(_))
    }

    /// Force the floating point representation
    pub fn to_float(self) -> Self {
        Self::Float(self.as_f64())
    }

    /// Integer addition falls back to floats on overflow
    pub fn add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a
                .checked_add(b)
                .map_or_else(|| Self::Float(self.as_f64() + other.as_f64()), Self::Integer),
            _ => Self::Float(self.as_f64() + other.as_f64()),
        }
    }

    /// Like [`Number::add`]
    pub fn subtract(self, other: Self) -> Self {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a
                .checked_sub(b)
                .map_or_else(|| Self::Float(self.as_f64() - other.as_f64()), Self::Integer),
            _ => Self::Float(self.as_f64() - other.as_f64()),
        }
    }

    /// Like [`Number::add`]
    pub fn multiply(self, other: Self) -> Self {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a
                .checked_mul(b)
                .map_or_else(|| Self::Float(self.as_f64() * other.as_f64()), Self::Integer),
            _ => Self::Float(self.as_f64() * other.as_f64()),
        }
    }

    /// Division stays integral only when it is exact.
    pub fn divide(self, other: Self) -> Self {
        if let (Self::Integer(a), Self::Integer(b)) = (self, other) {
            if b != 0 && a.checked_rem(b) == Some(0) {
                if let Some(quotient) = a.checked_div(b) {
                    return Self::Integer(quotient);
                }
            }
        }
        Self::Float(self.as_f64() / other.as_f64())
    }

    /// Integer modulo by zero is an error, float modulo gives `NaN`
    pub fn modulo(self, other: Self) -> Result<Self> {
        match (self, other) {
            (Self::Integer(_), Self::Integer(0)) => {
                Err(Error::Evaluation("integer modulo by zero".into()))
            }
            (Self::Integer(a), Self::Integer(b)) => Ok(Self::Integer(a.checked_rem(b).unwrap_or(0))),
            _ => Ok(Self::Float(self.as_f64() % other.as_f64())),
        }
    }

    /// Integer power with a non-negative exponent stays integral when it fits
    pub fn power(self, other: Self) -> Self {
        if let (Self::Integer(base), Self::Integer(exponent)) = (self, other) {
            if let Ok(exponent) = u32::try_from(exponent) {
                if let Some(result) = base.checked_pow(exponent) {
                    return Self::Integer(result);
                }
            }
        }
        Self::Float(self.as_f64().powf(other.as_f64()))
    }

    /// Integer negation falls back to floats on overflow
    pub fn negate(self) -> Self {
        match self {
            Self::Integer(i) => i
                .checked_neg()
                .map_or_else(|| Self::Float(-self.as_f64()), Self::Integer),
            Self::Float(f) => Self::Float(-f),
        }
    }

    fn integral(self, operation: &str) -> Result<i64> {
        self.as_i64().ok_or_else(|| {
            Error::Evaluation(format!("{} requires integral operands, got {}", operation, self))
        })
    }

    fn shift_amount(self) -> Result<u32> {
        let amount = self.integral("shift")?;
        u32::try_from(amount)
            .ok()
            .filter(|amount| *amount < 64)
            .ok_or_else(|| Error::Evaluation(format!("shift amount {} out of range", amount)))
    }

    /// Shift an integral value left by 0 to 63 bits
    pub fn shift_left(self, amount: Self) -> Result<Self> {
        let value = self.integral("shift")?;
        Ok(Self::Integer(value.wrapping_shl(amount.shift_amount()?)))
    }

    /// Arithmetic shift right by 0 to 63 bits
    pub fn shift_right(self, amount: Self) -> Result<Self> {
        let value = self.integral("shift")?;
        Ok(Self::Integer(value.wrapping_shr(amount.shift_amount()?)))
    }

    /// Bitwise and of integral values
    pub fn and(self, other: Self) -> Result<Self> {
        Ok(Self::Integer(self.integral("and")? & other.integral("and")?))
    }

    /// Bitwise or of integral values
    pub fn or(self, other: Self) -> Result<Self> {
        Ok(Self::Integer(self.integral("or")? | other.integral("or")?))
    }

    /// Bitwise exclusive or of integral values
    pub fn xor(self, other: Self) -> Result<Self> {
        Ok(Self::Integer(self.integral("xor")? ^ other.integral("xor")?))
    }

    /// Bitwise complement of an integral value
    pub fn not(self) -> Result<Self> {
        Ok(Self::Integer(!self.integral("not")?))
    }

    /// Total-enough ordering: integers compare exactly, anything involving a
    /// float compares as `f64`.
    pub fn compare(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(&b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.compare(*other) == Some(Ordering::Equal)
    }
}

impl Display for Number {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(fmt, "{}", i),
            Self::Float(f) => write!(fmt, "{}", f),
        }
    }
}

/// A value flowing through a compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An integer or float
    Numeric(Number),
    /// A boolean
    Boolean(bool),
    /// A string
    String(String),
    /// A byte array
    ByteArray(Vec<u8>),
}

impl Value {
    /// The type of this value
    pub fn value_type(&self) -> SupportedValueType {
        match self {
            Self::Numeric(_) => SupportedValueType::Numeric,
            Self::Boolean(_) => SupportedValueType::Boolean,
            Self::String(_) => SupportedValueType::String,
            Self::ByteArray(_) => SupportedValueType::ByteArray,
        }
    }

    /// Get `Some(number)` for numeric values
    pub fn as_number(&self) -> Option<Number> {
        if let Self::Numeric(number) = *self {
            Some(number)
        } else {
            None
        }
    }

    /// Get the value as a float, for numeric values
    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(Number::as_f64)
    }

    /// Get the value as an integer, for integral numeric values
    pub fn as_i64(&self) -> Option<i64> {
        self.as_number().and_then(Number::as_i64)
    }

    /// Get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        if let Self::Boolean(value) = *self {
            Some(value)
        } else {
            None
        }
    }

    /// Get the value as a string slice
    pub fn as_str(&self) -> Option<&str> {
        if let Self::String(ref value) = *self {
            Some(value)
        } else {
            None
        }
    }

    /// Get the value as raw bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Self::ByteArray(ref value) = *self {
            Some(value)
        } else {
            None
        }
    }

    pub(crate) fn expect_number(&self, context: &str) -> Result<Number> {
        self.as_number().ok_or_else(|| {
            Error::Evaluation(format!("{} expects a numeric value, got {}", context, self.value_type()))
        })
    }

    pub(crate) fn expect_bool(&self, context: &str) -> Result<bool> {
        self.as_bool().ok_or_else(|| {
            Error::Evaluation(format!("{} expects a boolean value, got {}", context, self.value_type()))
        })
    }

    pub(crate) fn expect_str(&self, context: &str) -> Result<&str> {
        self.as_str().ok_or_else(|| {
            Error::Evaluation(format!("{} expects a string value, got {}", context, self.value_type()))
        })
    }

    pub(crate) fn expect_bytes(&self, context: &str) -> Result<&[u8]> {
        self.as_bytes().ok_or_else(|| {
            Error::Evaluation(format!("{} expects a byte array, got {}", context, self.value_type()))
        })
    }
}

impl Display for Value {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        match self {
            Self::Numeric(number) => write!(fmt, "{}", number),
            Self::Boolean(value) => write!(fmt, "{}", value),
            Self::String(value) => fmt.write_str(value),
            Self::ByteArray(bytes) => {
                fmt.write_str("0x")?;
                for byte in bytes {
                    write!(fmt, "{:02X}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Numeric(Number::Integer(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Numeric(Number::Integer(i64::from(value)))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Numeric(Number::Float(value))
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        Self::Numeric(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::ByteArray(value)
    }
}
