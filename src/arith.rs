//! Per-family arithmetic.
//!
//! Each family has a table of operators indexed by [`ArithOp`]. Operands are
//! widened into the family's native type before the operator runs and the
//! result is boxed back as the family's canonical value.

use std::cmp::Ordering;

use crate::error::VmError;
use crate::value::{Value, ValueType};

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    Mod = 4,
}

/// Numeric family an arithmetic opcode operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Char,
    Int,
    Double,
}

type CharOp = fn(u16, u16) -> Option<u16>;
type IntOp = fn(i32, i32) -> Option<i32>;
type DoubleOp = fn(f64, f64) -> f64;

// `None` means division by zero.
const CHAR_OPS: [CharOp; 5] = [char_add, char_sub, char_mul, char_div, char_rem];
const INT_OPS: [IntOp; 5] = [int_add, int_sub, int_mul, int_div, int_rem];
const DOUBLE_OPS: [DoubleOp; 5] = [double_add, double_sub, double_mul, double_div, double_rem];

fn char_add(a: u16, b: u16) -> Option<u16> {
    Some(a.wrapping_add(b))
}

fn char_sub(a: u16, b: u16) -> Option<u16> {
    Some(a.wrapping_sub(b))
}

fn char_mul(a: u16, b: u16) -> Option<u16> {
    Some(a.wrapping_mul(b))
}

fn char_div(a: u16, b: u16) -> Option<u16> {
    a.checked_div(b)
}

fn char_rem(a: u16, b: u16) -> Option<u16> {
    a.checked_rem(b)
}

fn int_add(a: i32, b: i32) -> Option<i32> {
    Some(a.wrapping_add(b))
}

fn int_sub(a: i32, b: i32) -> Option<i32> {
    Some(a.wrapping_sub(b))
}

fn int_mul(a: i32, b: i32) -> Option<i32> {
    Some(a.wrapping_mul(b))
}

// i32::MIN / -1 wraps instead of trapping.
fn int_div(a: i32, b: i32) -> Option<i32> {
    (b != 0).then(|| a.wrapping_div(b))
}

fn int_rem(a: i32, b: i32) -> Option<i32> {
    (b != 0).then(|| a.wrapping_rem(b))
}

fn double_add(a: f64, b: f64) -> f64 {
    a + b
}

fn double_sub(a: f64, b: f64) -> f64 {
    a - b
}

fn double_mul(a: f64, b: f64) -> f64 {
    a * b
}

fn double_div(a: f64, b: f64) -> f64 {
    a / b
}

fn double_rem(a: f64, b: f64) -> f64 {
    a % b
}

impl Family {
    /// Type an operand must be usable as.
    pub fn required(self) -> ValueType {
        match self {
            Family::Char => ValueType::Char,
            Family::Int => ValueType::Int,
            Family::Double => ValueType::Double,
        }
    }

    /// Apply `op` to two values already checked against this family.
    ///
    /// A value that does not actually fit the family (its declared type lied)
    /// is reported as a type mismatch.
    pub fn apply(self, op: ArithOp, lhs: &Value, rhs: &Value) -> Result<Value, VmError> {
        let idx = op as usize;
        match self {
            Family::Char => {
                let (a, b) = (self.unbox(lhs, Value::as_char)?, self.unbox(rhs, Value::as_char)?);
                CHAR_OPS[idx](a, b)
                    .map(Value::Char)
                    .ok_or(VmError::DivisionByZero)
            }
            Family::Int => {
                let (a, b) = (self.unbox(lhs, Value::as_int)?, self.unbox(rhs, Value::as_int)?);
                INT_OPS[idx](a, b)
                    .map(Value::Int)
                    .ok_or(VmError::DivisionByZero)
            }
            Family::Double => {
                let (a, b) = (
                    self.unbox(lhs, Value::as_double)?,
                    self.unbox(rhs, Value::as_double)?,
                );
                Ok(Value::Double(DOUBLE_OPS[idx](a, b)))
            }
        }
    }

    fn unbox<T>(self, value: &Value, view: fn(&Value) -> Option<T>) -> Result<T, VmError> {
        view(value).ok_or(VmError::TypeMismatch {
            expected: self.required(),
            found: value.value_type(),
        })
    }
}

/// Three-way comparison used by `CMP`: -1, 0 or 1.
///
/// Numbers compare across families (as integers when neither side is a
/// DOUBLE). Booleans order `false < true`, strings compare lexicographically.
/// NaN compares as unequal (1). Other pairings cannot be compared.
pub fn compare(lhs: &Value, rhs: &Value) -> Result<i32, VmError> {
    for value in [lhs, rhs] {
        if !value.value_type().is_concrete() {
            return Err(VmError::InvalidType(value.value_type()));
        }
    }
    let ordering = match (lhs, rhs) {
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ if lhs.value_type().is_numeric() && rhs.value_type().is_numeric() => {
            match (lhs.as_int(), rhs.as_int()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => lhs
                    .as_double()
                    .zip(rhs.as_double())
                    .and_then(|(a, b)| a.partial_cmp(&b)),
            }
        }
        _ => {
            return Err(VmError::TypeMismatch {
                expected: lhs.value_type(),
                found: rhs.value_type(),
            });
        }
    };
    Ok(match ordering {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) | None => 1,
    })
}
