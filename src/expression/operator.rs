//! Operator and function definitions for expressions.

use crate::access::DataType;
use std::fmt;

/// Binary operators supported in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,

    // String operators
    Concat,
    Like,
}

impl BinaryOperator {
    /// Get the output type of this operator given input types
    pub fn output_type(&self, left: DataType, right: DataType) -> Option<DataType> {
        match self {
            BinaryOperator::Add
            | BinaryOperator::Sub
            | BinaryOperator::Mul
            | BinaryOperator::Div
            | BinaryOperator::Mod => numeric_result(left, right),

            BinaryOperator::Eq
            | BinaryOperator::Ne
            | BinaryOperator::Lt
            | BinaryOperator::Le
            | BinaryOperator::Gt
            | BinaryOperator::Ge => {
                if left == right || (left.is_numeric() && right.is_numeric()) {
                    Some(DataType::Boolean)
                } else {
                    None
                }
            }

            BinaryOperator::And | BinaryOperator::Or => match (left, right) {
                (DataType::Boolean, DataType::Boolean) => Some(DataType::Boolean),
                _ => None,
            },

            BinaryOperator::Concat => match (left, right) {
                (DataType::Varchar, DataType::Varchar) => Some(DataType::Varchar),
                _ => None,
            },

            BinaryOperator::Like => match (left, right) {
                (DataType::Varchar, DataType::Varchar) => Some(DataType::Boolean),
                _ => None,
            },
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge
        )
    }

    /// Get the display string for this operator
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Eq => "=",
            BinaryOperator::Ne => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Concat => "||",
            BinaryOperator::Like => "LIKE",
        }
    }
}

/// Widest numeric type of two operands
fn numeric_result(left: DataType, right: DataType) -> Option<DataType> {
    match (left, right) {
        (DataType::Float64, r) if r.is_numeric() => Some(DataType::Float64),
        (l, DataType::Float64) if l.is_numeric() => Some(DataType::Float64),
        (DataType::Int64, r) if r.is_numeric() => Some(DataType::Int64),
        (l, DataType::Int64) if l.is_numeric() => Some(DataType::Int64),
        (DataType::Int32, DataType::Int32) => Some(DataType::Int32),
        _ => None,
    }
}

/// Unary operators supported in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    // Logical
    Not,

    // NULL checks
    IsNull,
    IsNotNull,

    // Arithmetic
    Plus,
    Minus,
}

impl UnaryOperator {
    /// Get the output type of this operator given input type
    pub fn output_type(&self, operand: DataType) -> Option<DataType> {
        match self {
            UnaryOperator::Not => match operand {
                DataType::Boolean => Some(DataType::Boolean),
                _ => None,
            },

            // NULL checks always return boolean regardless of input type
            UnaryOperator::IsNull | UnaryOperator::IsNotNull => Some(DataType::Boolean),

            UnaryOperator::Plus | UnaryOperator::Minus => {
                if operand.is_numeric() {
                    Some(operand)
                } else {
                    None
                }
            }
        }
    }

    /// Get the display string for this operator
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "NOT",
            UnaryOperator::IsNull => "IS NULL",
            UnaryOperator::IsNotNull => "IS NOT NULL",
            UnaryOperator::Plus => "+",
            UnaryOperator::Minus => "-",
        }
    }

    /// Whether the operator is written after its operand
    pub fn is_postfix(&self) -> bool {
        matches!(self, UnaryOperator::IsNull | UnaryOperator::IsNotNull)
    }
}

/// Built-in scalar functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Upper,
    Lower,
    /// SUBSTRING(s, start, length), 1-based
    Substring,
    CharLength,
    Abs,
    /// Variadic: first non-NULL argument
    Coalesce,
}

impl Function {
    /// Resolve a function by its SQL name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Function> {
        match name.to_ascii_uppercase().as_str() {
            "UPPER" => Some(Function::Upper),
            "LOWER" => Some(Function::Lower),
            "SUBSTRING" | "SUBSTR" => Some(Function::Substring),
            "CHAR_LENGTH" | "CHARACTER_LENGTH" | "LENGTH" => Some(Function::CharLength),
            "ABS" => Some(Function::Abs),
            "COALESCE" => Some(Function::Coalesce),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Upper => "UPPER",
            Function::Lower => "LOWER",
            Function::Substring => "SUBSTRING",
            Function::CharLength => "CHAR_LENGTH",
            Function::Abs => "ABS",
            Function::Coalesce => "COALESCE",
        }
    }

    /// Accepted argument counts, `None` as upper bound for variadic functions
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::Upper | Function::Lower | Function::CharLength | Function::Abs => {
                (1, Some(1))
            }
            Function::Substring => (2, Some(3)),
            Function::Coalesce => (1, None),
        }
    }

    pub fn output_type(&self, args: &[Option<DataType>]) -> Option<DataType> {
        match self {
            Function::Upper | Function::Lower | Function::Substring => Some(DataType::Varchar),
            Function::CharLength => Some(DataType::Int32),
            Function::Abs => args.first().copied().flatten(),
            Function::Coalesce => args.iter().find_map(|t| *t),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_operator_output_types() {
        assert_eq!(
            BinaryOperator::Add.output_type(DataType::Int32, DataType::Int32),
            Some(DataType::Int32)
        );
        assert_eq!(
            BinaryOperator::Mul.output_type(DataType::Int32, DataType::Int64),
            Some(DataType::Int64)
        );
        assert_eq!(
            BinaryOperator::Div.output_type(DataType::Float64, DataType::Int32),
            Some(DataType::Float64)
        );
        assert_eq!(
            BinaryOperator::Add.output_type(DataType::Int32, DataType::Varchar),
            None
        );
        assert_eq!(
            BinaryOperator::Lt.output_type(DataType::Int32, DataType::Float64),
            Some(DataType::Boolean)
        );
        assert_eq!(
            BinaryOperator::Eq.output_type(DataType::Boolean, DataType::Varchar),
            None
        );
        assert_eq!(
            BinaryOperator::Like.output_type(DataType::Varchar, DataType::Varchar),
            Some(DataType::Boolean)
        );
    }

    #[test]
    fn test_unary_operator_output_types() {
        assert_eq!(
            UnaryOperator::Not.output_type(DataType::Boolean),
            Some(DataType::Boolean)
        );
        assert_eq!(UnaryOperator::Not.output_type(DataType::Int32), None);
        assert_eq!(
            UnaryOperator::IsNull.output_type(DataType::Varchar),
            Some(DataType::Boolean)
        );
        assert_eq!(
            UnaryOperator::Minus.output_type(DataType::Float64),
            Some(DataType::Float64)
        );
    }

    #[test]
    fn test_function_lookup() {
        assert_eq!(Function::from_name("upper"), Some(Function::Upper));
        assert_eq!(Function::from_name("SUBSTR"), Some(Function::Substring));
        assert_eq!(Function::from_name("nope"), None);
        assert_eq!(Function::Substring.arity(), (2, Some(3)));
        assert_eq!(Function::Coalesce.arity(), (1, None));
    }
}
