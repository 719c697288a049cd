use std::rc::Rc;

use super::value::Value;

/// `===`: primitives by value (`NaN !== NaN`, `0 === -0`), everything
/// else by identity.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        _ => same_reference_or_primitive(a, b),
    }
}

/// `Object.is`: like `===` except `NaN` equals itself and `+0` differs
/// from `-0`.
pub fn object_is(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x.is_nan() && y.is_nan() {
                true
            } else {
                x == y && x.is_sign_negative() == y.is_sign_negative()
            }
        }
        _ => same_reference_or_primitive(a, b),
    }
}

/// Structural equality used by `toEqual` and `toHaveProperty`.
///
/// Arrays compare element-wise, plain objects by key set and values;
/// every other pairing falls back to `Object.is`.
pub fn deep_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            Rc::ptr_eq(x, y) || (x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| deep_equals(l, r)))
        }
        (Value::Object(x), Value::Object(y)) if x.is_plain() && y.is_plain() => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            if x.entries.len() != y.entries.len() {
                return false;
            }
            x.entries.iter().all(|(key, left)| match y.get(key) {
                Some(right) => deep_equals(left, right),
                None => false,
            })
        }
        _ => object_is(a, b),
    }
}

fn same_reference_or_primitive(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::BigInt(x), Value::BigInt(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Symbol(x), Value::Symbol(y)) => Rc::ptr_eq(x, y),
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::RegExp(x), Value::RegExp(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}
