//! Runtime semantics of the operators, shared by constant folding and by the
//! compiled closures.

use crate::error::{Error, Result};
use crate::format::Formatters;
use crate::token::{Op, UnaryOp};
use crate::tolerance::Tolerance;
use crate::value::{Number, Value};
use std::cmp::Ordering;

/// Evaluation settings that operators may depend on
#[derive(Debug, Clone, Copy)]
pub(crate) struct OperatorContext<'a> {
    pub tolerance: Option<&'a Tolerance>,
    pub formatters: &'a Formatters,
}

pub(crate) fn unary(op: UnaryOp, operand: Value) -> Result<Value> {
    match (op, operand) {
        (UnaryOp::Negate, Value::Numeric(number)) => Ok(Value::Numeric(number.negate())),
        (UnaryOp::Not, Value::Boolean(value)) => Ok(Value::Boolean(!value)),
        (UnaryOp::Not, Value::Numeric(number)) => Ok(Value::Numeric(number.not()?)),
        (UnaryOp::Not, Value::ByteArray(bytes)) => {
            Ok(Value::ByteArray(bytes.into_iter().map(|b| !b).collect()))
        }
        (op, operand) => Err(Error::Evaluation(format!(
            "{:?} cannot be applied to {}",
            op,
            operand.value_type()
        ))),
    }
}

fn mismatch(op: Op, left: &Value, right: &Value) -> Error {
    Error::Evaluation(format!(
        "'{}' cannot be applied to {} and {}",
        op.symbol(),
        left.value_type(),
        right.value_type()
    ))
}

fn bytewise(left: &[u8], right: &[u8], op: Op, combine: fn(u8, u8) -> u8) -> Result<Value> {
    if left.len() != right.len() {
        return Err(Error::Evaluation(format!(
            "'{}' requires byte arrays of equal length, got {} and {}",
            op.symbol(),
            left.len(),
            right.len()
        )));
    }
    Ok(Value::ByteArray(
        left.iter().zip(right).map(|(l, r)| combine(*l, *r)).collect(),
    ))
}

fn compare_numbers(left: Number, right: Number, context: OperatorContext) -> Option<Ordering> {
    match context.tolerance {
        Some(tolerance) => tolerance.position(left, right),
        None => left.compare(right),
    }
}

fn ordering(op: Op, left: &Value, right: &Value, context: OperatorContext) -> Result<Option<Ordering>> {
    match (left, right) {
        (Value::Numeric(l), Value::Numeric(r)) => Ok(compare_numbers(*l, *r, context)),
        (Value::String(l), Value::String(r)) => Ok(Some(l.cmp(r))),
        _ if op == Op::Equals || op == Op::DoesNotEqual => {
            if left.value_type() == right.value_type() {
                Ok(Some(if left == right {
                    Ordering::Equal
                } else {
                    Ordering::Less
                }))
            } else {
                Err(mismatch(op, left, right))
            }
        }
        _ => Err(mismatch(op, left, right)),
    }
}

pub(crate) fn binary(op: Op, left: Value, right: Value, context: OperatorContext) -> Result<Value> {
    if op.is_comparison() {
        let position = ordering(op, &left, &right, context)?;
        let result = match op {
            Op::Equals => position == Some(Ordering::Equal),
            Op::DoesNotEqual => position != Some(Ordering::Equal),
            Op::GreaterThan => position == Some(Ordering::Greater),
            Op::GreaterThanOrEqual => matches!(position, Some(Ordering::Greater | Ordering::Equal)),
            Op::LessThan => position == Some(Ordering::Less),
            Op::LessThanOrEqual => matches!(position, Some(Ordering::Less | Ordering::Equal)),
            _ => unreachable!("not a comparison"),
        };
        return Ok(Value::Boolean(result));
    }

    match (op, left, right) {
        (Op::Add, Value::Numeric(l), Value::Numeric(r)) => Ok(Value::Numeric(l.add(r))),
        (Op::Add, Value::ByteArray(mut l), Value::ByteArray(r)) => {
            l.extend_from_slice(&r);
            Ok(Value::ByteArray(l))
        }
        (Op::Add, l, r) if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) => {
            let mut text = context.formatters.format(&l);
            text.push_str(&context.formatters.format(&r));
            Ok(Value::String(text))
        }
        (Op::Subtract, Value::Numeric(l), Value::Numeric(r)) => Ok(Value::Numeric(l.subtract(r))),
        (Op::Multiply, Value::Numeric(l), Value::Numeric(r)) => Ok(Value::Numeric(l.multiply(r))),
        (Op::Divide, Value::Numeric(l), Value::Numeric(r)) => Ok(Value::Numeric(l.divide(r))),
        (Op::Modulo, Value::Numeric(l), Value::Numeric(r)) => Ok(Value::Numeric(l.modulo(r)?)),
        (Op::Power, Value::Numeric(l), Value::Numeric(r)) => Ok(Value::Numeric(l.power(r))),
        (Op::LeftShift, Value::Numeric(l), Value::Numeric(r)) => Ok(Value::Numeric(l.shift_left(r)?)),
        (Op::RightShift, Value::Numeric(l), Value::Numeric(r)) => {
            Ok(Value::Numeric(l.shift_right(r)?))
        }
        (Op::And, Value::Boolean(l), Value::Boolean(r)) => Ok(Value::Boolean(l && r)),
        (Op::Or, Value::Boolean(l), Value::Boolean(r)) => Ok(Value::Boolean(l || r)),
        (Op::Xor, Value::Boolean(l), Value::Boolean(r)) => Ok(Value::Boolean(l ^ r)),
        (Op::And, Value::Numeric(l), Value::Numeric(r)) => Ok(Value::Numeric(l.and(r)?)),
        (Op::Or, Value::Numeric(l), Value::Numeric(r)) => Ok(Value::Numeric(l.or(r)?)),
        (Op::Xor, Value::Numeric(l), Value::Numeric(r)) => Ok(Value::Numeric(l.xor(r)?)),
        (Op::And, Value::ByteArray(l), Value::ByteArray(r)) => bytewise(&l, &r, op, |a, b| a & b),
        (Op::Or, Value::ByteArray(l), Value::ByteArray(r)) => bytewise(&l, &r, op, |a, b| a | b),
        (Op::Xor, Value::ByteArray(l), Value::ByteArray(r)) => bytewise(&l, &r, op, |a, b| a ^ b),
        (op, l, r) => Err(mismatch(op, &l, &r)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn apply(op: Op, left: Value, right: Value, tolerance: Option<&Tolerance>) -> Result<Value> {
        let formatters = Formatters::default();
        binary(
            op,
            left,
            right,
            OperatorContext {
                tolerance,
                formatters: &formatters,
            },
        )
    }

    #[test_case(Op::Add, Value::from("a"), Value::from(1) => Ok(Value::from("a1")) ; "string concatenation formats")]
    #[test_case(Op::Add, Value::from(vec![1]), Value::from(vec![2]) => Ok(Value::from(vec![1, 2])) ; "byte concatenation")]
    #[test_case(Op::Xor, Value::from(true), Value::from(true) => Ok(Value::from(false)) ; "boolean xor")]
    #[test_case(Op::And, Value::from(6), Value::from(3) => Ok(Value::from(2)) ; "bitwise and")]
    #[test_case(Op::LessThan, Value::from("abc"), Value::from("abd") => Ok(Value::from(true)) ; "string ordering")]
    #[test_case(Op::Equals, Value::from(true), Value::from(true) => Ok(Value::from(true)) ; "boolean equality")]
    #[test_case(Op::Subtract, Value::from("a"), Value::from(1) => Err(Error::Evaluation("'-' cannot be applied to string and numeric".into())) ; "subtracting strings")]
    fn operators(op: Op, left: Value, right: Value) -> Result<Value> {
        apply(op, left, right, None)
    }

    #[test]
    fn tolerance_only_applies_to_comparisons() {
        let tolerance = Tolerance::range(-1.0, 1.0);
        let ge = |l: i64, r: i64, t| apply(Op::GreaterThanOrEqual, Value::from(l), Value::from(r), t);
        assert_eq!(ge(5, 4, Some(&tolerance)), Ok(Value::from(true)));
        assert_eq!(ge(5, 6, Some(&tolerance)), Ok(Value::from(true)));
        assert_eq!(ge(5, 6, None), Ok(Value::from(false)));
        assert_eq!(
            apply(Op::Add, Value::from(5), Value::from(6), Some(&tolerance)),
            Ok(Value::from(11))
        );
    }

    #[test]
    fn unary_operators() {
        assert_eq!(unary(UnaryOp::Negate, Value::from(2)), Ok(Value::from(-2)));
        assert_eq!(unary(UnaryOp::Not, Value::from(false)), Ok(Value::from(true)));
        assert_eq!(
            unary(UnaryOp::Not, Value::from(vec![0x0f])),
            Ok(Value::from(vec![0xf0]))
        );
        assert!(unary(UnaryOp::Negate, Value::from("a")).is_err());
    }
}
