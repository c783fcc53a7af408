//! Semantics of the built-in operators and conversions on non-null
//! primitive values. Lifting over `null` is handled by the caller.

use std::{cmp::Ordering, fmt, sync::Arc};

use num::{
    traits::{
        CheckedNeg, CheckedRem, WrappingAdd, WrappingMul, WrappingNeg, WrappingShl, WrappingShr,
        WrappingSub,
    },
    CheckedAdd, CheckedDiv, CheckedMul, CheckedSub, Float, PrimInt,
};

use crate::{
    ast::{BinOpKind, Fault, FloatKind, IntKind, TyKind, UnOpKind, Value},
    error::EvalError,
};

/// The integer operations needed for the built-in operators.
trait Int:
    PrimInt
    + WrappingAdd
    + WrappingSub
    + WrappingMul
    + WrappingNeg
    + WrappingShl
    + WrappingShr
    + CheckedAdd
    + CheckedSub
    + CheckedMul
    + CheckedDiv
    + CheckedRem
    + CheckedNeg
{
}

impl<T> Int for T where
    T: PrimInt
        + WrappingAdd
        + WrappingSub
        + WrappingMul
        + WrappingNeg
        + WrappingShl
        + WrappingShr
        + CheckedAdd
        + CheckedSub
        + CheckedMul
        + CheckedDiv
        + CheckedRem
        + CheckedNeg
{
}

fn overflow() -> EvalError {
    EvalError::Fault(Fault::overflow())
}

fn mismatch(op: impl fmt::Debug, operands: &[&Value]) -> EvalError {
    let operands: Vec<String> = operands.iter().map(|value| value.to_string()).collect();
    EvalError::TypeMismatch(format!("{:?} applied to {}", op, operands.join(", ")))
}

/// Apply a generic function to a pair of integers of the same width.
macro_rules! int_pair {
    ($lhs:expr, $rhs:expr, |$a:ident, $b:ident| $body:expr) => {
        match ($lhs, $rhs) {
            (Value::I8($a), Value::I8($b)) => Some($body.map(Value::I8)),
            (Value::U8($a), Value::U8($b)) => Some($body.map(Value::U8)),
            (Value::I16($a), Value::I16($b)) => Some($body.map(Value::I16)),
            (Value::U16($a), Value::U16($b)) => Some($body.map(Value::U16)),
            (Value::I32($a), Value::I32($b)) => Some($body.map(Value::I32)),
            (Value::U32($a), Value::U32($b)) => Some($body.map(Value::U32)),
            (Value::I64($a), Value::I64($b)) => Some($body.map(Value::I64)),
            (Value::U64($a), Value::U64($b)) => Some($body.map(Value::U64)),
            _ => None,
        }
    };
}

/// Apply a generic function to a single integer.
macro_rules! int_single {
    ($operand:expr, |$a:ident| $body:expr) => {
        match $operand {
            Value::I8($a) => Some($body.map(Value::I8)),
            Value::U8($a) => Some($body.map(Value::U8)),
            Value::I16($a) => Some($body.map(Value::I16)),
            Value::U16($a) => Some($body.map(Value::U16)),
            Value::I32($a) => Some($body.map(Value::I32)),
            Value::U32($a) => Some($body.map(Value::U32)),
            Value::I64($a) => Some($body.map(Value::I64)),
            Value::U64($a) => Some($body.map(Value::U64)),
            _ => None,
        }
    };
}

fn int_arith<T: Int>(kind: BinOpKind, a: T, b: T) -> Result<T, EvalError> {
    Ok(match kind {
        BinOpKind::Add => a.wrapping_add(&b),
        BinOpKind::AddChecked => a.checked_add(&b).ok_or_else(overflow)?,
        BinOpKind::Sub => a.wrapping_sub(&b),
        BinOpKind::SubChecked => a.checked_sub(&b).ok_or_else(overflow)?,
        BinOpKind::Mul => a.wrapping_mul(&b),
        BinOpKind::MulChecked => a.checked_mul(&b).ok_or_else(overflow)?,
        BinOpKind::Div | BinOpKind::Rem if b.is_zero() => {
            return Err(Fault::divide_by_zero().into())
        }
        // `MIN / -1` and `MIN % -1` do not fit
        BinOpKind::Div => a.checked_div(&b).ok_or_else(overflow)?,
        BinOpKind::Rem => a.checked_rem(&b).ok_or_else(overflow)?,
        BinOpKind::BitAnd => a & b,
        BinOpKind::BitOr => a | b,
        BinOpKind::BitXor => a ^ b,
        kind => return Err(EvalError::TypeMismatch(format!("{:?} on integers", kind))),
    })
}

fn int_shift<T: Int>(kind: BinOpKind, a: T, count: u32) -> Result<T, EvalError> {
    let mask = (std::mem::size_of::<T>() * 8 - 1) as u32;
    match kind {
        BinOpKind::Shl => Ok(a.wrapping_shl(count & mask)),
        _ => Ok(a.wrapping_shr(count & mask)),
    }
}

fn int_unary<T: Int>(kind: UnOpKind, a: T) -> Result<T, EvalError> {
    Ok(match kind {
        UnOpKind::Negate => a.wrapping_neg(),
        UnOpKind::NegateChecked => a.checked_neg().ok_or_else(overflow)?,
        UnOpKind::UnaryPlus => a,
        UnOpKind::Not | UnOpKind::OnesComplement => !a,
        UnOpKind::Increment => a.wrapping_add(&T::one()),
        UnOpKind::Decrement => a.wrapping_sub(&T::one()),
        kind => return Err(EvalError::TypeMismatch(format!("{:?} on integers", kind))),
    })
}

fn float_arith<F: Float>(kind: BinOpKind, a: F, b: F) -> Result<F, EvalError> {
    Ok(match kind {
        BinOpKind::Add | BinOpKind::AddChecked => a + b,
        BinOpKind::Sub | BinOpKind::SubChecked => a - b,
        BinOpKind::Mul | BinOpKind::MulChecked => a * b,
        BinOpKind::Div => a / b,
        BinOpKind::Rem => a % b,
        kind => return Err(EvalError::TypeMismatch(format!("{:?} on floats", kind))),
    })
}

fn float_unary<F: Float>(kind: UnOpKind, a: F) -> Result<F, EvalError> {
    Ok(match kind {
        UnOpKind::Negate | UnOpKind::NegateChecked => -a,
        UnOpKind::UnaryPlus => a,
        UnOpKind::Increment => a + F::one(),
        UnOpKind::Decrement => a - F::one(),
        kind => return Err(EvalError::TypeMismatch(format!("{:?} on floats", kind))),
    })
}

/// Runtime equality: IEEE equality for floats, identity for arrays and
/// objects, value equality for strings.
pub fn runtime_eq(lhs: &Value, rhs: &Value) -> Result<bool, EvalError> {
    Ok(match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Char(a), Value::Char(b)) => a == b,
        (Value::F32(a), Value::F32(b)) => a == b,
        (Value::F64(a), Value::F64(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
        (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
        (Value::Fault(a), Value::Fault(b)) => a == b,
        (lhs, rhs) => match (lhs.as_int(), rhs.as_int()) {
            (Some((ka, a)), Some((kb, b))) if ka == kb => a == b,
            _ => return Err(mismatch(BinOpKind::Eq, &[lhs, rhs])),
        },
    })
}

/// Ordering of numbers and characters. `None` if a float operand is NaN.
fn compare(lhs: &Value, rhs: &Value) -> Result<Option<Ordering>, EvalError> {
    Ok(match (lhs, rhs) {
        (Value::F32(a), Value::F32(b)) => a.partial_cmp(b),
        (Value::F64(a), Value::F64(b)) => a.partial_cmp(b),
        (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
        (lhs, rhs) => match (lhs.as_int(), rhs.as_int()) {
            (Some((ka, a)), Some((kb, b))) if ka == kb => Some(a.cmp(&b)),
            _ => return Err(mismatch(BinOpKind::Lt, &[lhs, rhs])),
        },
    })
}

fn array_index(array: &Value, index: &Value) -> Result<Value, EvalError> {
    let elements = match array {
        Value::Null => return Err(Fault::null_reference().into()),
        Value::Array(elements) => elements,
        _ => return Err(mismatch(BinOpKind::ArrayIndex, &[array, index])),
    };
    let (_, index) = index
        .as_int()
        .ok_or_else(|| mismatch(BinOpKind::ArrayIndex, &[array, index]))?;
    usize::try_from(index)
        .ok()
        .and_then(|index| elements.get(index))
        .cloned()
        .ok_or_else(|| Fault::index_out_of_range().into())
}

fn shift(kind: BinOpKind, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    let (_, count) = rhs.as_int().ok_or_else(|| mismatch(kind, &[lhs, rhs]))?;
    // only the low bits of the count are used
    let count = count as u32;
    int_single!(lhs, |a| int_shift(kind, *a, count))
        .unwrap_or_else(|| Err(mismatch(kind, &[lhs, rhs])))
}

/// Apply a built-in binary operator to two non-null operands. Reference
/// equality also accepts `null` operands.
pub fn eval_binary(kind: BinOpKind, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    match kind {
        BinOpKind::Eq => return runtime_eq(lhs, rhs).map(Value::Bool),
        BinOpKind::Ne => return runtime_eq(lhs, rhs).map(|eq| Value::Bool(!eq)),
        BinOpKind::Lt | BinOpKind::Le | BinOpKind::Gt | BinOpKind::Ge => {
            let res = match compare(lhs, rhs)? {
                None => false,
                Some(ord) => match kind {
                    BinOpKind::Lt => ord == Ordering::Less,
                    BinOpKind::Le => ord != Ordering::Greater,
                    BinOpKind::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                },
            };
            return Ok(Value::Bool(res));
        }
        BinOpKind::Shl | BinOpKind::Shr => return shift(kind, lhs, rhs),
        BinOpKind::ArrayIndex => return array_index(lhs, rhs),
        BinOpKind::Coalesce => {
            return Ok(if lhs.is_null() { rhs } else { lhs }.clone());
        }
        _ => {}
    }
    match (lhs, rhs) {
        (Value::Bool(a), Value::Bool(b)) => match kind {
            BinOpKind::BitAnd | BinOpKind::AndAlso => Ok(Value::Bool(a & b)),
            BinOpKind::BitOr | BinOpKind::OrElse => Ok(Value::Bool(a | b)),
            BinOpKind::BitXor => Ok(Value::Bool(a ^ b)),
            _ => Err(mismatch(kind, &[lhs, rhs])),
        },
        (Value::F32(a), Value::F32(b)) => float_arith(kind, *a, *b).map(Value::F32),
        (Value::F64(a), Value::F64(b)) => float_arith(kind, *a, *b).map(Value::F64),
        (lhs, rhs) => int_pair!(lhs, rhs, |a, b| int_arith(kind, *a, *b))
            .unwrap_or_else(|| Err(mismatch(kind, &[lhs, rhs]))),
    }
}

/// Apply a built-in unary operator to a non-null operand.
pub fn eval_unary(kind: UnOpKind, operand: &Value) -> Result<Value, EvalError> {
    match (kind, operand) {
        (UnOpKind::ArrayLength, Value::Null) => Err(Fault::null_reference().into()),
        (UnOpKind::ArrayLength, Value::Array(elements)) => {
            Ok(Value::I32(i32::try_from(elements.len()).unwrap_or(i32::MAX)))
        }
        (UnOpKind::Not | UnOpKind::IsFalse, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnOpKind::IsTrue, Value::Bool(b)) => Ok(Value::Bool(*b)),
        (kind, Value::F32(a)) => float_unary(kind, *a).map(Value::F32),
        (kind, Value::F64(a)) => float_unary(kind, *a).map(Value::F64),
        (kind, operand) => int_single!(operand, |a| int_unary(kind, *a))
            .unwrap_or_else(|| Err(mismatch(kind, &[operand]))),
    }
}

/// Truncate an integer to the given width, as unchecked conversions do.
fn wrap_int(kind: IntKind, value: i128) -> Value {
    match kind {
        IntKind::I8 => Value::I8(value as i8),
        IntKind::U8 => Value::U8(value as u8),
        IntKind::I16 => Value::I16(value as i16),
        IntKind::U16 => Value::U16(value as u16),
        IntKind::I32 => Value::I32(value as i32),
        IntKind::U32 => Value::U32(value as u32),
        IntKind::I64 => Value::I64(value as i64),
        IntKind::U64 => Value::U64(value as u64),
    }
}

fn float_to_int(value: f64, kind: IntKind, checked: bool) -> Result<Value, EvalError> {
    let truncated = value.trunc();
    if checked {
        // the exclusive upper bound is a power of two and exact as a float
        let in_range =
            truncated >= kind.min() as f64 && truncated < (kind.max() + 1) as f64;
        if !in_range {
            return Err(overflow());
        }
        return Value::from_int(kind, truncated as i128).ok_or_else(overflow);
    }
    // saturate, and map NaN to zero
    let value = if truncated.is_nan() {
        0
    } else {
        (truncated as i128).clamp(kind.min(), kind.max())
    };
    Ok(wrap_int(kind, value))
}

fn to_int(value: &Value, kind: IntKind, checked: bool) -> Result<Value, EvalError> {
    let value = match value {
        Value::Char(c) => u32::from(*c).into(),
        Value::F32(_) | Value::F64(_) => {
            let float = value.as_float().unwrap_or(f64::NAN);
            return float_to_int(float, kind, checked);
        }
        value => match value.as_int() {
            Some((_, value)) => value,
            None => return Err(mismatch("Convert", &[value])),
        },
    };
    if checked {
        Value::from_int(kind, value).ok_or_else(overflow)
    } else {
        Ok(wrap_int(kind, value))
    }
}

fn to_float(value: &Value, kind: FloatKind) -> Result<Value, EvalError> {
    let float = match value {
        Value::F32(_) | Value::F64(_) => value.as_float().unwrap_or(f64::NAN),
        Value::Char(c) => u32::from(*c).into(),
        value => match value.as_int() {
            Some((_, value)) => value as f64,
            None => return Err(mismatch("Convert", &[value])),
        },
    };
    Ok(match (kind, value) {
        // i128 -> f32 rounds once, going through f64 could round twice
        (FloatKind::F32, value) => match value.as_int() {
            Some((_, int)) => Value::F32(int as f32),
            None => Value::F32(float as f32),
        },
        (FloatKind::F64, _) => Value::F64(float),
    })
}

fn to_char(value: &Value, checked: bool) -> Result<Value, EvalError> {
    let code = match value {
        Value::Char(c) => return Ok(Value::Char(*c)),
        value => match value.as_int() {
            Some((_, code)) => code,
            None => return Err(mismatch("Convert", &[value])),
        },
    };
    let code = if checked {
        u16::try_from(code).map_err(|_| overflow())?
    } else {
        code as u16
    };
    char::from_u32(code.into())
        .map(Value::Char)
        .ok_or_else(|| Fault::invalid_cast().into())
}

/// Built-in conversion of `value` (of static type `from`) to `to`.
pub fn eval_convert(
    value: &Value,
    from: &TyKind,
    to: &TyKind,
    checked: bool,
) -> Result<Value, EvalError> {
    if value.is_null() {
        return if to.admits_null() {
            Ok(Value::Null)
        } else if from.is_nullable() {
            // reading the value of an empty nullable
            Err(Fault::invalid_operation().into())
        } else {
            Err(Fault::null_reference().into())
        };
    }
    match to.non_nullable() {
        TyKind::Void => Ok(Value::Unit),
        TyKind::Int(kind) => to_int(value, *kind, checked),
        TyKind::Float(kind) => to_float(value, *kind),
        TyKind::Char => to_char(value, checked),
        target if value.conforms_to(target) => Ok(value.clone()),
        target if !target.is_value_type() => Err(Fault::invalid_cast().into()),
        _ => Err(mismatch("Convert", &[value])),
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn fault(kind: fn() -> Fault) -> Result<Value, EvalError> {
        Err(EvalError::Fault(kind()))
    }

    #[test]
    fn wrapping_and_checked_arithmetic() {
        let max = Value::I32(i32::MAX);
        let one = Value::I32(1);
        assert_eq!(eval_binary(BinOpKind::Add, &max, &one), Ok(Value::I32(i32::MIN)));
        assert_eq!(eval_binary(BinOpKind::AddChecked, &max, &one), fault(Fault::overflow));
        assert_eq!(
            eval_binary(BinOpKind::SubChecked, &Value::U8(0), &Value::U8(1)),
            fault(Fault::overflow)
        );
        assert_eq!(
            eval_binary(BinOpKind::Mul, &Value::U16(300), &Value::U16(300)),
            Ok(Value::U16(24464))
        );
    }

    #[test]
    fn division() {
        let zero = Value::I64(0);
        let min = Value::I64(i64::MIN);
        let minus_one = Value::I64(-1);
        assert_eq!(eval_binary(BinOpKind::Div, &min, &zero), fault(Fault::divide_by_zero));
        assert_eq!(eval_binary(BinOpKind::Rem, &min, &zero), fault(Fault::divide_by_zero));
        assert_eq!(eval_binary(BinOpKind::Div, &min, &minus_one), fault(Fault::overflow));
        assert_eq!(eval_binary(BinOpKind::Rem, &min, &minus_one), fault(Fault::overflow));
        assert_eq!(
            eval_binary(BinOpKind::Rem, &Value::I32(-7), &Value::I32(2)),
            Ok(Value::I32(-1))
        );
        let res = eval_binary(BinOpKind::Div, &Value::F64(1.0), &Value::F64(0.0));
        assert_eq!(res, Ok(Value::F64(f64::INFINITY)));
    }

    #[test]
    fn shifts_mask_the_count() {
        assert_eq!(
            eval_binary(BinOpKind::Shl, &Value::I32(1), &Value::I32(33)),
            Ok(Value::I32(2))
        );
        assert_eq!(
            eval_binary(BinOpKind::Shr, &Value::I8(-128), &Value::I32(1)),
            Ok(Value::I8(-64))
        );
        assert_eq!(
            eval_binary(BinOpKind::Shr, &Value::U64(1 << 63), &Value::I32(-1)),
            Ok(Value::U64(1))
        );
    }

    #[test]
    fn unary_boundaries() {
        for kind in IntKind::ALL {
            let min = Value::from_int(kind, kind.min()).unwrap();
            let max = Value::from_int(kind, kind.max()).unwrap();
            assert_eq!(eval_unary(UnOpKind::Increment, &max), Ok(min.clone()));
            assert_eq!(eval_unary(UnOpKind::Decrement, &min), Ok(max.clone()));
            if kind.is_signed() {
                assert_eq!(eval_unary(UnOpKind::Negate, &min), Ok(min.clone()));
                assert_eq!(eval_unary(UnOpKind::NegateChecked, &min), fault(Fault::overflow));
            } else {
                let zero = Value::from_int(kind, 0).unwrap();
                assert_eq!(eval_unary(UnOpKind::NegateChecked, &zero), Ok(zero.clone()));
                assert_eq!(eval_unary(UnOpKind::NegateChecked, &max), fault(Fault::overflow));
            }
        }
        assert_eq!(eval_unary(UnOpKind::Not, &Value::U8(0x0f)), Ok(Value::U8(0xf0)));
        assert_eq!(eval_unary(UnOpKind::Not, &Value::Bool(true)), Ok(Value::Bool(false)));
    }

    #[test]
    fn comparisons() {
        let nan = Value::F64(f64::NAN);
        assert_eq!(eval_binary(BinOpKind::Eq, &nan, &nan), Ok(Value::Bool(false)));
        assert_eq!(eval_binary(BinOpKind::Ge, &nan, &nan), Ok(Value::Bool(false)));
        assert_eq!(
            eval_binary(BinOpKind::Le, &Value::U64(u64::MAX), &Value::U64(0)),
            Ok(Value::Bool(false))
        );
        assert_eq!(
            eval_binary(BinOpKind::Eq, &Value::str("a"), &Value::Null),
            Ok(Value::Bool(false))
        );
        assert!(eval_binary(BinOpKind::Eq, &Value::I32(1), &Value::I64(1)).is_err());
    }

    #[test]
    fn array_access() {
        let array = Value::array([Value::I32(2), Value::I32(3), Value::I32(5)]);
        let at = |index: i32| eval_binary(BinOpKind::ArrayIndex, &array, &Value::I32(index));
        assert_eq!(at(1), Ok(Value::I32(3)));
        assert_eq!(at(3), fault(Fault::index_out_of_range));
        assert_eq!(at(-1), fault(Fault::index_out_of_range));
        assert_eq!(
            eval_binary(BinOpKind::ArrayIndex, &Value::Null, &Value::I32(0)),
            fault(Fault::null_reference)
        );
        assert_eq!(eval_unary(UnOpKind::ArrayLength, &array), Ok(Value::I32(3)));
    }

    #[test]
    fn conversions() {
        let int = TyKind::Int(IntKind::I32);
        let byte = TyKind::Int(IntKind::U8);
        let convert = |value: Value, to: &TyKind, checked| eval_convert(&value, &int, to, checked);
        assert_eq!(convert(Value::I32(300), &byte, false), Ok(Value::U8(44)));
        assert_eq!(convert(Value::I32(300), &byte, true), fault(Fault::overflow));
        assert_eq!(convert(Value::I32(-1), &byte, false), Ok(Value::U8(255)));

        let float = TyKind::Float(FloatKind::F64);
        let from_float = |value: f64, checked| eval_convert(&Value::F64(value), &float, &int, checked);
        assert_eq!(from_float(-2.9, false), Ok(Value::I32(-2)));
        assert_eq!(from_float(1e10, false), Ok(Value::I32(i32::MAX)));
        assert_eq!(from_float(f64::NAN, false), Ok(Value::I32(0)));
        assert_eq!(from_float(f64::NAN, true), fault(Fault::overflow));
        assert_eq!(from_float(2147483647.5, true), Ok(Value::I32(i32::MAX)));
        assert_eq!(from_float(2147483648.0, true), fault(Fault::overflow));

        let int_opt = TyKind::nullable(int.clone());
        assert_eq!(eval_convert(&Value::Null, &int_opt, &int, false), fault(Fault::invalid_operation));
        assert_eq!(
            eval_convert(&Value::Null, &int_opt, &TyKind::nullable(TyKind::Int(IntKind::I64)), false),
            Ok(Value::Null)
        );
        assert_eq!(
            eval_convert(&Value::I32(7), &int, &int_opt, false),
            Ok(Value::I32(7))
        );
        assert_eq!(
            eval_convert(&Value::str("x"), &TyKind::Str, &TyKind::class("Other"), false),
            fault(Fault::invalid_cast)
        );
    }
}
