//! Error types for expression compilation and evaluation.

use crate::access::DataType;
use std::fmt;

/// Errors raised while lowering an expression or evaluating a compiled one
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// Invalid operand types for operator
    InvalidOperandTypes {
        operator: String,
        left_type: Option<DataType>,
        right_type: Option<DataType>,
    },

    /// Column index out of bounds for the input row
    ColumnIndexOutOfBounds { index: usize, tuple_size: usize },

    /// Division by zero
    DivisionByZero,

    /// Integer arithmetic overflowed
    Overflow { operator: String },

    /// Invalid function name
    UnknownFunction { name: String },

    /// Wrong number of function arguments
    FunctionArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    /// A value could not be converted to the target type
    CastFailed { value: String, target: DataType },

    /// A predicate produced something other than a boolean
    NotBoolean { actual: Option<DataType> },

    /// No value bound for a dynamic parameter
    UnboundParameter { index: usize },

    /// The lowered program failed verification
    InvalidProgram { reason: String },

    /// Generic evaluation error
    EvaluationError { message: String },
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionError::InvalidOperandTypes {
                operator,
                left_type,
                right_type,
            } => {
                write!(
                    f,
                    "Invalid operand types for operator {}: left={:?}, right={:?}",
                    operator, left_type, right_type
                )
            }

            ExpressionError::ColumnIndexOutOfBounds { index, tuple_size } => {
                write!(
                    f,
                    "Column index {} out of bounds for tuple with {} columns",
                    index, tuple_size
                )
            }

            ExpressionError::DivisionByZero => write!(f, "Division by zero"),

            ExpressionError::Overflow { operator } => {
                write!(f, "Integer overflow in operator {}", operator)
            }

            ExpressionError::UnknownFunction { name } => {
                write!(f, "Unknown function: {}", name)
            }

            ExpressionError::FunctionArgumentCount {
                function,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Function {} expects {} arguments, got {}",
                    function, expected, actual
                )
            }

            ExpressionError::CastFailed { value, target } => {
                write!(f, "Cannot cast '{}' to {}", value, target)
            }

            ExpressionError::NotBoolean { actual } => {
                write!(f, "Predicate must produce BOOLEAN, got {:?}", actual)
            }

            ExpressionError::UnboundParameter { index } => {
                write!(f, "No value bound for parameter ?{}", index)
            }

            ExpressionError::InvalidProgram { reason } => {
                write!(f, "Invalid scalar program: {}", reason)
            }

            ExpressionError::EvaluationError { message } => {
                write!(f, "Expression evaluation error: {}", message)
            }
        }
    }
}

impl std::error::Error for ExpressionError {}

/// Result type for expression operations
pub type ExpressionResult<T> = Result<T, ExpressionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExpressionError::InvalidOperandTypes {
            operator: "+".to_string(),
            left_type: Some(DataType::Int32),
            right_type: Some(DataType::Varchar),
        };
        assert_eq!(
            err.to_string(),
            "Invalid operand types for operator +: left=Some(Int32), right=Some(Varchar)"
        );

        let err = ExpressionError::ColumnIndexOutOfBounds {
            index: 5,
            tuple_size: 3,
        };
        assert_eq!(
            err.to_string(),
            "Column index 5 out of bounds for tuple with 3 columns"
        );

        assert_eq!(ExpressionError::DivisionByZero.to_string(), "Division by zero");

        let err = ExpressionError::UnknownFunction {
            name: "foo".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown function: foo");

        let err = ExpressionError::FunctionArgumentCount {
            function: "SUBSTRING".to_string(),
            expected: "2..3".to_string(),
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "Function SUBSTRING expects 2..3 arguments, got 1"
        );

        let err = ExpressionError::CastFailed {
            value: "abc".to_string(),
            target: DataType::Int32,
        };
        assert_eq!(err.to_string(), "Cannot cast 'abc' to INTEGER");
    }
}
