//! Value-level semantics of operators, functions and casts.
//!
//! These are the primitives a compiled scalar program calls into. NULL
//! handling follows SQL: NULL propagates through arithmetic and comparisons,
//! AND/OR use three-valued logic.

use crate::access::{DataType, Value};
use crate::expression::{BinaryOperator, ExpressionError, ExpressionResult, Function, UnaryOperator};
use std::cmp::Ordering;

/// Evaluate a binary operation
pub fn evaluate_binary_op(op: BinaryOperator, left: Value, right: Value) -> ExpressionResult<Value> {
    match op {
        BinaryOperator::And => return logical_and(left, right),
        BinaryOperator::Or => return logical_or(left, right),
        _ => {}
    }

    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    match op {
        BinaryOperator::Add
        | BinaryOperator::Sub
        | BinaryOperator::Mul
        | BinaryOperator::Div
        | BinaryOperator::Mod => arithmetic(op, &left, &right),

        BinaryOperator::Eq => compare_values(op, &left, &right, |c| c == Ordering::Equal),
        BinaryOperator::Ne => compare_values(op, &left, &right, |c| c != Ordering::Equal),
        BinaryOperator::Lt => compare_values(op, &left, &right, |c| c == Ordering::Less),
        BinaryOperator::Le => compare_values(op, &left, &right, |c| c != Ordering::Greater),
        BinaryOperator::Gt => compare_values(op, &left, &right, |c| c == Ordering::Greater),
        BinaryOperator::Ge => compare_values(op, &left, &right, |c| c != Ordering::Less),

        BinaryOperator::Concat => match (&left, &right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            _ => Err(invalid_operands(op, &left, &right)),
        },

        BinaryOperator::Like => match (&left, &right) {
            (Value::String(s), Value::String(pattern)) => {
                let s: Vec<char> = s.chars().collect();
                let pattern: Vec<char> = pattern.chars().collect();
                Ok(Value::Boolean(like_match(&s, &pattern)))
            }
            _ => Err(invalid_operands(op, &left, &right)),
        },

        BinaryOperator::And | BinaryOperator::Or => unreachable!("handled above"),
    }
}

fn invalid_operands(op: BinaryOperator, left: &Value, right: &Value) -> ExpressionError {
    ExpressionError::InvalidOperandTypes {
        operator: op.as_str().to_string(),
        left_type: left.data_type(),
        right_type: right.data_type(),
    }
}

fn as_bool(op: BinaryOperator, value: &Value, other: &Value) -> ExpressionResult<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        _ => Err(invalid_operands(op, value, other)),
    }
}

/// NULL AND false = false, NULL AND true = NULL
fn logical_and(left: Value, right: Value) -> ExpressionResult<Value> {
    let l = as_bool(BinaryOperator::And, &left, &right)?;
    let r = as_bool(BinaryOperator::And, &right, &left)?;
    Ok(match (l, r) {
        (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
        (Some(true), Some(true)) => Value::Boolean(true),
        _ => Value::Null,
    })
}

/// NULL OR true = true, NULL OR false = NULL
fn logical_or(left: Value, right: Value) -> ExpressionResult<Value> {
    let l = as_bool(BinaryOperator::Or, &left, &right)?;
    let r = as_bool(BinaryOperator::Or, &right, &left)?;
    Ok(match (l, r) {
        (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
        (Some(false), Some(false)) => Value::Boolean(false),
        _ => Value::Null,
    })
}

fn arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> ExpressionResult<Value> {
    let overflow = || ExpressionError::Overflow {
        operator: op.as_str().to_string(),
    };

    match (left, right) {
        (Value::Int32(a), Value::Int32(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinaryOperator::Add => a.checked_add(b),
                BinaryOperator::Sub => a.checked_sub(b),
                BinaryOperator::Mul => a.checked_mul(b),
                BinaryOperator::Div if b == 0 => return Err(ExpressionError::DivisionByZero),
                BinaryOperator::Div => a.checked_div(b),
                BinaryOperator::Mod if b == 0 => return Err(ExpressionError::DivisionByZero),
                BinaryOperator::Mod => a.checked_rem(b),
                _ => None,
            };
            result.map(Value::Int32).ok_or_else(overflow)
        }
        (Value::Float64(_), _) | (_, Value::Float64(_)) => {
            let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                return Err(invalid_operands(op, left, right));
            };
            let result = match op {
                BinaryOperator::Add => a + b,
                BinaryOperator::Sub => a - b,
                BinaryOperator::Mul => a * b,
                BinaryOperator::Div if b == 0.0 => return Err(ExpressionError::DivisionByZero),
                BinaryOperator::Div => a / b,
                BinaryOperator::Mod if b == 0.0 => return Err(ExpressionError::DivisionByZero),
                _ => a % b,
            };
            Ok(Value::Float64(result))
        }
        _ => {
            let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) else {
                return Err(invalid_operands(op, left, right));
            };
            let result = match op {
                BinaryOperator::Add => a.checked_add(b),
                BinaryOperator::Sub => a.checked_sub(b),
                BinaryOperator::Mul => a.checked_mul(b),
                BinaryOperator::Div if b == 0 => return Err(ExpressionError::DivisionByZero),
                BinaryOperator::Div => a.checked_div(b),
                BinaryOperator::Mod if b == 0 => return Err(ExpressionError::DivisionByZero),
                BinaryOperator::Mod => a.checked_rem(b),
                _ => None,
            };
            result.map(Value::Int64).ok_or_else(overflow)
        }
    }
}

/// Compare two non-NULL values and apply a comparison function
fn compare_values<F>(op: BinaryOperator, left: &Value, right: &Value, cmp_fn: F) -> ExpressionResult<Value>
where
    F: FnOnce(Ordering) -> bool,
{
    match left.sql_cmp(right) {
        Some(ordering) => Ok(Value::Boolean(cmp_fn(ordering))),
        None => Err(invalid_operands(op, left, right)),
    }
}

/// SQL LIKE with `%` (any run) and `_` (any single character)
fn like_match(s: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => s.is_empty(),
        Some(('%', rest)) => (0..=s.len()).any(|skip| like_match(&s[skip..], rest)),
        Some(('_', rest)) => !s.is_empty() && like_match(&s[1..], rest),
        Some((c, rest)) => s.first() == Some(c) && like_match(&s[1..], rest),
    }
}

/// Evaluate a unary operation
pub fn evaluate_unary_op(op: UnaryOperator, operand: Value) -> ExpressionResult<Value> {
    let invalid = |operand: &Value| ExpressionError::InvalidOperandTypes {
        operator: op.as_str().to_string(),
        left_type: operand.data_type(),
        right_type: None,
    };

    match op {
        UnaryOperator::Not => match operand {
            Value::Null => Ok(Value::Null),
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            other => Err(invalid(&other)),
        },

        UnaryOperator::IsNull => Ok(Value::Boolean(operand.is_null())),

        UnaryOperator::IsNotNull => Ok(Value::Boolean(!operand.is_null())),

        UnaryOperator::Plus => match operand {
            Value::Null | Value::Int32(_) | Value::Int64(_) | Value::Float64(_) => Ok(operand),
            other => Err(invalid(&other)),
        },

        UnaryOperator::Minus => match operand {
            Value::Null => Ok(Value::Null),
            Value::Int32(n) => n.checked_neg().map(Value::Int32).ok_or(ExpressionError::Overflow {
                operator: "-".to_string(),
            }),
            Value::Int64(n) => n.checked_neg().map(Value::Int64).ok_or(ExpressionError::Overflow {
                operator: "-".to_string(),
            }),
            Value::Float64(x) => Ok(Value::Float64(-x)),
            other => Err(invalid(&other)),
        },
    }
}

/// Evaluate a built-in function over already evaluated arguments
pub fn evaluate_function(function: Function, mut args: Vec<Value>) -> ExpressionResult<Value> {
    if function == Function::Coalesce {
        return Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null));
    }
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }

    let wrong_type = |v: &Value| ExpressionError::InvalidOperandTypes {
        operator: function.name().to_string(),
        left_type: v.data_type(),
        right_type: None,
    };

    match function {
        Function::Upper | Function::Lower | Function::CharLength => {
            match args.swap_remove(0) {
                Value::String(s) => Ok(match function {
                    Function::Upper => Value::String(s.to_uppercase()),
                    Function::Lower => Value::String(s.to_lowercase()),
                    _ => Value::Int32(s.chars().count() as i32),
                }),
                other => Err(wrong_type(&other)),
            }
        }

        Function::Substring => {
            let s = match &args[0] {
                Value::String(s) => s,
                other => return Err(wrong_type(other)),
            };
            let start = args[1].as_i64().ok_or_else(|| wrong_type(&args[1]))?;
            let length = match args.get(2) {
                Some(v) => Some(v.as_i64().ok_or_else(|| wrong_type(v))?),
                None => None,
            };
            Ok(Value::String(substring(s, start, length)))
        }

        Function::Abs => match &args[0] {
            Value::Int32(n) => n.checked_abs().map(Value::Int32).ok_or(ExpressionError::Overflow {
                operator: "ABS".to_string(),
            }),
            Value::Int64(n) => n.checked_abs().map(Value::Int64).ok_or(ExpressionError::Overflow {
                operator: "ABS".to_string(),
            }),
            Value::Float64(x) => Ok(Value::Float64(x.abs())),
            other => Err(wrong_type(other)),
        },

        Function::Coalesce => unreachable!("handled above"),
    }
}

/// SQL SUBSTRING: 1-based start, positions before the string count against length
fn substring(s: &str, start: i64, length: Option<i64>) -> String {
    let end = match length {
        Some(len) if len < 0 => return String::new(),
        Some(len) => Some(start.saturating_add(len)),
        None => None,
    };
    let from = start.max(1);
    s.chars()
        .enumerate()
        .map(|(i, c)| (i as i64 + 1, c))
        .filter(|(pos, _)| *pos >= from && end.map_or(true, |end| *pos < end))
        .map(|(_, c)| c)
        .collect()
}

/// CAST a value to `target`; NULL casts to NULL
pub fn cast_value(value: Value, target: DataType) -> ExpressionResult<Value> {
    let failed = |value: &Value| ExpressionError::CastFailed {
        value: value.to_string(),
        target,
    };

    if value.is_null() || value.data_type() == Some(target) {
        return Ok(value);
    }

    match target {
        DataType::Varchar => Ok(Value::String(value.to_string())),
        DataType::Boolean => match &value {
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                _ => Err(failed(&value)),
            },
            _ => Err(failed(&value)),
        },
        DataType::Int32 => match &value {
            Value::String(s) => s.trim().parse().map(Value::Int32).map_err(|_| failed(&value)),
            Value::Float64(x) if x.is_finite() && *x >= i32::MIN as f64 && *x <= i32::MAX as f64 => {
                Ok(Value::Int32(x.trunc() as i32))
            }
            _ => value
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .map(Value::Int32)
                .ok_or_else(|| failed(&value)),
        },
        DataType::Int64 => match &value {
            Value::String(s) => s.trim().parse().map(Value::Int64).map_err(|_| failed(&value)),
            Value::Float64(x) if x.is_finite() && *x >= i64::MIN as f64 && *x <= i64::MAX as f64 => {
                Ok(Value::Int64(x.trunc() as i64))
            }
            _ => value.as_i64().map(Value::Int64).ok_or_else(|| failed(&value)),
        },
        DataType::Float64 => match &value {
            Value::String(s) => s.trim().parse().map(Value::Float64).map_err(|_| failed(&value)),
            _ => value.as_f64().map(Value::Float64).ok_or_else(|| failed(&value)),
        },
    }
}

/// `needle [NOT] IN (list)` with SQL NULL semantics
pub fn evaluate_in_list(needle: Value, list: &[Value], negated: bool) -> ExpressionResult<Value> {
    if needle.is_null() {
        return Ok(Value::Null);
    }
    let mut saw_null = false;
    for item in list {
        match evaluate_binary_op(BinaryOperator::Eq, needle.clone(), item.clone())? {
            Value::Boolean(true) => return Ok(Value::Boolean(!negated)),
            Value::Null => saw_null = true,
            _ => {}
        }
    }
    if saw_null {
        Ok(Value::Null)
    } else {
        Ok(Value::Boolean(negated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: BinaryOperator, l: impl Into<Value>, r: impl Into<Value>) -> ExpressionResult<Value> {
        evaluate_binary_op(op, l.into(), r.into())
    }

    #[test]
    fn test_arithmetic_operations() {
        assert_eq!(bin(BinaryOperator::Add, 10, 5).unwrap(), Value::Int32(15));
        assert_eq!(bin(BinaryOperator::Sub, 10, 5).unwrap(), Value::Int32(5));
        assert_eq!(bin(BinaryOperator::Mul, 4, 3).unwrap(), Value::Int32(12));
        assert_eq!(bin(BinaryOperator::Div, 10, 3).unwrap(), Value::Int32(3));
        assert_eq!(bin(BinaryOperator::Mod, 10, 3).unwrap(), Value::Int32(1));
        assert_eq!(bin(BinaryOperator::Add, 1, 2i64).unwrap(), Value::Int64(3));
        assert_eq!(bin(BinaryOperator::Mul, 2, 1.5).unwrap(), Value::Float64(3.0));

        assert_eq!(
            bin(BinaryOperator::Div, 10, 0),
            Err(ExpressionError::DivisionByZero)
        );
        assert!(matches!(
            bin(BinaryOperator::Add, i32::MAX, 1),
            Err(ExpressionError::Overflow { .. })
        ));
        assert!(matches!(
            bin(BinaryOperator::Add, 10, "5"),
            Err(ExpressionError::InvalidOperandTypes { .. })
        ));
    }

    #[test]
    fn test_comparison_operations() {
        assert_eq!(bin(BinaryOperator::Eq, 5, 5).unwrap(), Value::Boolean(true));
        assert_eq!(bin(BinaryOperator::Ne, 5, 3).unwrap(), Value::Boolean(true));
        assert_eq!(bin(BinaryOperator::Lt, 3, 5).unwrap(), Value::Boolean(true));
        assert_eq!(bin(BinaryOperator::Ge, 5, 5).unwrap(), Value::Boolean(true));
        assert_eq!(bin(BinaryOperator::Le, 6, 5).unwrap(), Value::Boolean(false));
        assert_eq!(bin(BinaryOperator::Lt, "abc", "def").unwrap(), Value::Boolean(true));
        assert_eq!(bin(BinaryOperator::Eq, 2, 2i64).unwrap(), Value::Boolean(true));
        assert!(bin(BinaryOperator::Eq, 2, "2").is_err());
    }

    #[test]
    fn test_null_semantics() {
        assert_eq!(bin(BinaryOperator::Add, Value::Null, 5).unwrap(), Value::Null);
        assert_eq!(bin(BinaryOperator::Eq, Value::Null, 5).unwrap(), Value::Null);
        assert_eq!(
            bin(BinaryOperator::And, false, Value::Null).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(bin(BinaryOperator::And, true, Value::Null).unwrap(), Value::Null);
        assert_eq!(
            bin(BinaryOperator::Or, Value::Null, true).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(bin(BinaryOperator::Or, false, Value::Null).unwrap(), Value::Null);
        assert!(bin(BinaryOperator::And, 1, true).is_err());
    }

    #[test]
    fn test_string_operations() {
        assert_eq!(
            bin(BinaryOperator::Concat, "Hello", " World").unwrap(),
            Value::String("Hello World".to_string())
        );
        assert_eq!(bin(BinaryOperator::Like, "hello", "h%o").unwrap(), Value::Boolean(true));
        assert_eq!(bin(BinaryOperator::Like, "hello", "h_llo").unwrap(), Value::Boolean(true));
        assert_eq!(bin(BinaryOperator::Like, "hello", "h_lo").unwrap(), Value::Boolean(false));
        assert_eq!(bin(BinaryOperator::Like, "", "%").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_unary_operations() {
        assert_eq!(
            evaluate_unary_op(UnaryOperator::Not, Value::Boolean(true)).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            evaluate_unary_op(UnaryOperator::Minus, Value::Int32(42)).unwrap(),
            Value::Int32(-42)
        );
        assert_eq!(
            evaluate_unary_op(UnaryOperator::Minus, Value::Null).unwrap(),
            Value::Null
        );
        assert_eq!(
            evaluate_unary_op(UnaryOperator::IsNull, Value::Null).unwrap(),
            Value::Boolean(true)
        );
        assert!(evaluate_unary_op(UnaryOperator::Not, Value::Int32(1)).is_err());
    }

    #[test]
    fn test_functions() {
        let s = |v: &str| Value::String(v.to_string());
        assert_eq!(evaluate_function(Function::Upper, vec![s("abc")]).unwrap(), s("ABC"));
        assert_eq!(
            evaluate_function(Function::Substring, vec![s("hello"), Value::Int32(2), Value::Int32(3)])
                .unwrap(),
            s("ell")
        );
        assert_eq!(
            evaluate_function(Function::Substring, vec![s("hello"), Value::Int32(0), Value::Int32(2)])
                .unwrap(),
            s("h")
        );
        assert_eq!(
            evaluate_function(Function::Substring, vec![s("hello"), Value::Int32(4)]).unwrap(),
            s("lo")
        );
        assert_eq!(
            evaluate_function(Function::CharLength, vec![s("héllo")]).unwrap(),
            Value::Int32(5)
        );
        assert_eq!(
            evaluate_function(Function::Coalesce, vec![Value::Null, Value::Int32(3)]).unwrap(),
            Value::Int32(3)
        );
        assert_eq!(
            evaluate_function(Function::Upper, vec![Value::Null]).unwrap(),
            Value::Null
        );
        assert!(evaluate_function(Function::Upper, vec![Value::Int32(1)]).is_err());
    }

    #[test]
    fn test_casts() {
        assert_eq!(
            cast_value(Value::String(" 42 ".into()), DataType::Int32).unwrap(),
            Value::Int32(42)
        );
        assert_eq!(
            cast_value(Value::Int32(7), DataType::Varchar).unwrap(),
            Value::String("7".into())
        );
        assert_eq!(
            cast_value(Value::Float64(2.9), DataType::Int64).unwrap(),
            Value::Int64(2)
        );
        assert_eq!(cast_value(Value::Null, DataType::Int32).unwrap(), Value::Null);
        assert!(matches!(
            cast_value(Value::String("abc".into()), DataType::Int32),
            Err(ExpressionError::CastFailed { .. })
        ));
        assert!(cast_value(Value::Int64(i64::MAX), DataType::Int32).is_err());
    }

    #[test]
    fn test_in_list() {
        let list = vec![Value::Int32(1), Value::Int32(2)];
        assert_eq!(
            evaluate_in_list(Value::Int32(2), &list, false).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            evaluate_in_list(Value::Int32(3), &list, true).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            evaluate_in_list(Value::Int32(3), &[Value::Int32(1), Value::Null], false).unwrap(),
            Value::Null
        );
        assert_eq!(evaluate_in_list(Value::Null, &list, false).unwrap(), Value::Null);
    }
}
