//! Constant folding with the virtual machine's arithmetic semantics.
//!
//! Every function returns `None` when the operands do not have the expected types or when the
//! real machine would throw instead of producing a value (integer division by zero). Callers
//! map `None` to an unresolved result of the right size.

use std::{
    cmp::Ordering,
    ops::{Add, Div, Mul, Rem, Sub},
};

use crate::{
    analysis::ConstValue,
    model::{BinaryOp, CompareOp, Narrow, ValueType},
};

/// Folds a binary operation on operands of computational type `ty`.
///
/// Shift distances are always `int` and are masked to the width of the shifted value.
#[must_use]
pub fn binary(
    ty: ValueType,
    op: BinaryOp,
    lhs: &ConstValue,
    rhs: &ConstValue,
) -> Option<ConstValue> {
    match (ty, lhs, rhs) {
        (ValueType::Int, ConstValue::Int(a), ConstValue::Int(b)) => {
            int_op(op, *a, *b).map(ConstValue::Int)
        }
        (ValueType::Long, ConstValue::Long(a), ConstValue::Int(b)) if op.is_shift() => {
            long_shift(op, *a, *b).map(ConstValue::Long)
        }
        (ValueType::Long, ConstValue::Long(a), ConstValue::Long(b)) if !op.is_shift() => {
            long_op(op, *a, *b).map(ConstValue::Long)
        }
        (ValueType::Float, ConstValue::Float(a), ConstValue::Float(b)) => {
            float_op(op, *a, *b).map(ConstValue::Float)
        }
        (ValueType::Double, ConstValue::Double(a), ConstValue::Double(b)) => {
            float_op(op, *a, *b).map(ConstValue::Double)
        }
        _ => None,
    }
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn int_op(op: BinaryOp, a: i32, b: i32) -> Option<i32> {
    Some(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        BinaryOp::Rem => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        BinaryOp::Shl => a.wrapping_shl((b & 0x1f) as u32),
        BinaryOp::Shr => a >> (b & 0x1f),
        BinaryOp::Ushr => ((a as u32) >> (b & 0x1f)) as i32,
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
    })
}

fn long_op(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        BinaryOp::Rem => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr => return None,
    })
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn long_shift(op: BinaryOp, a: i64, distance: i32) -> Option<i64> {
    let distance = (distance & 0x3f) as u32;
    match op {
        BinaryOp::Shl => Some(a.wrapping_shl(distance)),
        BinaryOp::Shr => Some(a >> distance),
        BinaryOp::Ushr => Some(((a as u64) >> distance) as i64),
        _ => None,
    }
}

fn float_op<T>(op: BinaryOp, a: T, b: T) -> Option<T>
where
    T: Add<Output = T> + Sub<Output = T> + Mul<Output = T> + Div<Output = T> + Rem<Output = T>,
{
    match op {
        BinaryOp::Add => Some(a + b),
        BinaryOp::Sub => Some(a - b),
        BinaryOp::Mul => Some(a * b),
        BinaryOp::Div => Some(a / b),
        BinaryOp::Rem => Some(a % b),
        _ => None,
    }
}

/// Folds a negation.
#[must_use]
pub fn negate(ty: ValueType, value: &ConstValue) -> Option<ConstValue> {
    match (ty, value) {
        (ValueType::Int, ConstValue::Int(v)) => Some(ConstValue::Int(v.wrapping_neg())),
        (ValueType::Long, ConstValue::Long(v)) => Some(ConstValue::Long(v.wrapping_neg())),
        (ValueType::Float, ConstValue::Float(v)) => Some(ConstValue::Float(-v)),
        (ValueType::Double, ConstValue::Double(v)) => Some(ConstValue::Double(-v)),
        _ => None,
    }
}

/// Folds a primitive conversion.
///
/// Floating point to integer conversions saturate and map `NaN` to zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn convert(from: ValueType, to: ValueType, value: &ConstValue) -> Option<ConstValue> {
    let converted = match (from, value) {
        (ValueType::Int, ConstValue::Int(v)) => match to {
            ValueType::Long => ConstValue::Long(i64::from(*v)),
            ValueType::Float => ConstValue::Float(*v as f32),
            ValueType::Double => ConstValue::Double(f64::from(*v)),
            _ => return None,
        },
        (ValueType::Long, ConstValue::Long(v)) => match to {
            ValueType::Int => ConstValue::Int(*v as i32),
            ValueType::Float => ConstValue::Float(*v as f32),
            ValueType::Double => ConstValue::Double(*v as f64),
            _ => return None,
        },
        (ValueType::Float, ConstValue::Float(v)) => match to {
            ValueType::Int => ConstValue::Int(*v as i32),
            ValueType::Long => ConstValue::Long(*v as i64),
            ValueType::Double => ConstValue::Double(f64::from(*v)),
            _ => return None,
        },
        (ValueType::Double, ConstValue::Double(v)) => match to {
            ValueType::Int => ConstValue::Int(*v as i32),
            ValueType::Long => ConstValue::Long(*v as i64),
            ValueType::Float => ConstValue::Float(*v as f32),
            _ => return None,
        },
        _ => return None,
    };
    Some(converted)
}

/// Folds the truncation of an `int` to `byte`, `char` or `short`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn narrow(to: Narrow, value: &ConstValue) -> Option<ConstValue> {
    let v = value.as_int()?;
    Some(ConstValue::Int(match to {
        Narrow::Byte => i32::from(v as i8),
        Narrow::Char => i32::from(v as u16),
        Narrow::Short => i32::from(v as i16),
    }))
}

/// Folds a three-way comparison into -1, 0 or 1.
///
/// `fcmpl`/`dcmpl` yield -1 and `fcmpg`/`dcmpg` yield 1 when either operand is `NaN`.
#[must_use]
pub fn compare(op: CompareOp, lhs: &ConstValue, rhs: &ConstValue) -> Option<ConstValue> {
    let ordering = match (op, lhs, rhs) {
        (CompareOp::Lcmp, ConstValue::Long(a), ConstValue::Long(b)) => Some(a.cmp(b)),
        (CompareOp::Fcmpl | CompareOp::Fcmpg, ConstValue::Float(a), ConstValue::Float(b)) => {
            a.partial_cmp(b)
        }
        (CompareOp::Dcmpl | CompareOp::Dcmpg, ConstValue::Double(a), ConstValue::Double(b)) => {
            a.partial_cmp(b)
        }
        _ => return None,
    };
    let result = match ordering {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
        None if matches!(op, CompareOp::Fcmpg | CompareOp::Dcmpg) => 1,
        None => -1,
    };
    Some(ConstValue::Int(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i32) -> ConstValue {
        ConstValue::Int(v)
    }

    #[test]
    fn test_int_arithmetic_wraps() {
        assert_eq!(
            binary(ValueType::Int, BinaryOp::Add, &int(i32::MAX), &int(1)),
            Some(int(i32::MIN))
        );
        assert_eq!(
            binary(ValueType::Int, BinaryOp::Div, &int(i32::MIN), &int(-1)),
            Some(int(i32::MIN))
        );
        assert_eq!(
            binary(ValueType::Int, BinaryOp::Rem, &int(i32::MIN), &int(-1)),
            Some(int(0))
        );
        assert_eq!(binary(ValueType::Int, BinaryOp::Rem, &int(-7), &int(3)), Some(int(-1)));
    }

    #[test]
    fn test_division_by_zero_does_not_fold() {
        assert_eq!(binary(ValueType::Int, BinaryOp::Div, &int(1), &int(0)), None);
        assert_eq!(binary(ValueType::Int, BinaryOp::Rem, &int(1), &int(0)), None);
        assert_eq!(
            binary(
                ValueType::Long,
                BinaryOp::Div,
                &ConstValue::Long(1),
                &ConstValue::Long(0)
            ),
            None
        );
        assert!(matches!(
            binary(
                ValueType::Double,
                BinaryOp::Div,
                &ConstValue::Double(1.0),
                &ConstValue::Double(0.0)
            ),
            Some(ConstValue::Double(v)) if v.is_infinite()
        ));
    }

    #[test]
    fn test_shifts_mask_distance() {
        assert_eq!(binary(ValueType::Int, BinaryOp::Shl, &int(1), &int(33)), Some(int(2)));
        assert_eq!(binary(ValueType::Int, BinaryOp::Ushr, &int(-1), &int(28)), Some(int(15)));
        assert_eq!(binary(ValueType::Int, BinaryOp::Shr, &int(-16), &int(2)), Some(int(-4)));
        assert_eq!(
            binary(ValueType::Long, BinaryOp::Shl, &ConstValue::Long(1), &int(65)),
            Some(ConstValue::Long(2))
        );
        // Long shifts take an int distance
        assert_eq!(
            binary(
                ValueType::Long,
                BinaryOp::Shl,
                &ConstValue::Long(1),
                &ConstValue::Long(1)
            ),
            None
        );
    }

    #[test]
    fn test_mismatched_operands() {
        assert_eq!(
            binary(ValueType::Int, BinaryOp::Add, &int(1), &ConstValue::Null),
            None
        );
        assert_eq!(
            binary(
                ValueType::Float,
                BinaryOp::Xor,
                &ConstValue::Float(1.0),
                &ConstValue::Float(1.0)
            ),
            None
        );
    }

    #[test]
    fn test_conversions() {
        assert_eq!(
            convert(ValueType::Long, ValueType::Int, &ConstValue::Long(0x1_0000_0005)),
            Some(int(5))
        );
        assert_eq!(
            convert(ValueType::Float, ValueType::Int, &ConstValue::Float(f32::NAN)),
            Some(int(0))
        );
        assert_eq!(
            convert(ValueType::Double, ValueType::Int, &ConstValue::Double(1e20)),
            Some(int(i32::MAX))
        );
        assert_eq!(
            convert(ValueType::Int, ValueType::Double, &int(3)),
            Some(ConstValue::Double(3.0))
        );
        assert_eq!(convert(ValueType::Int, ValueType::Int, &int(3)), None);
    }

    #[test]
    fn test_narrowing() {
        assert_eq!(narrow(Narrow::Byte, &int(0x1ff)), Some(int(-1)));
        assert_eq!(narrow(Narrow::Char, &int(-1)), Some(int(0xffff)));
        assert_eq!(narrow(Narrow::Short, &int(0x18000)), Some(int(-32768)));
    }

    #[test]
    fn test_compare_nan_handling() {
        let nan = ConstValue::Float(f32::NAN);
        let one = ConstValue::Float(1.0);
        assert_eq!(compare(CompareOp::Fcmpl, &nan, &one), Some(int(-1)));
        assert_eq!(compare(CompareOp::Fcmpg, &nan, &one), Some(int(1)));
        assert_eq!(
            compare(CompareOp::Lcmp, &ConstValue::Long(2), &ConstValue::Long(9)),
            Some(int(-1))
        );
        assert_eq!(
            compare(CompareOp::Dcmpg, &ConstValue::Double(2.0), &ConstValue::Double(2.0)),
            Some(int(0))
        );
    }

    #[test]
    fn test_negate() {
        assert_eq!(negate(ValueType::Int, &int(i32::MIN)), Some(int(i32::MIN)));
        assert_eq!(
            negate(ValueType::Double, &ConstValue::Double(2.5)),
            Some(ConstValue::Double(-2.5))
        );
        assert_eq!(negate(ValueType::Long, &int(1)), None);
    }
}
