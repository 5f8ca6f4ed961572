//! Execution engine error types.

use crate::expression::ExpressionError;
use thiserror::Error;

/// Named failures raised while compiling or running an operator graph.
///
/// Operators return `anyhow::Result`; callers recover these with
/// `downcast_ref::<ExecutionError>()`.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("No operator registered for algebra node kind {kind}")]
    UnsupportedNode { kind: String },

    #[error("Table '{table}' rejected filter {filter} that it was never offered")]
    InventedFilter { table: String, filter: String },

    #[error("Table '{table}' exposes no scan capability")]
    NoTableCapability { table: String },

    #[error("Table not found: {name}")]
    TableNotFound { name: String },

    #[error("Table '{table}' produced a row of width {actual}, expected {expected}")]
    RowWidthMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("Filter on table '{table}' references column {column} but the table has {field_count} columns")]
    FilterColumnOutOfRange {
        table: String,
        column: usize,
        field_count: usize,
    },

    #[error("Projection negotiation with table '{table}' did not settle after {rounds} rounds")]
    NegotiationDidNotConverge { table: String, rounds: usize },

    #[error("Failed to compile {name}: {source}")]
    ScalarCompilation {
        name: String,
        #[source]
        source: ExpressionError,
    },

    #[error("Operator {operator} cannot be rewound")]
    NotRestartable { operator: String },

    #[error("Operator {operator} was pulled before init")]
    NotInitialized { operator: String },

    #[error("Invalid plan: {message}")]
    InvalidPlan { message: String },
}

/// Result type for typed execution failures.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = ExecutionError::InventedFilter {
            table: "t".to_string(),
            filter: "($0 > 1)".to_string(),
        }
        .into();

        assert_eq!(
            err.to_string(),
            "Table 't' rejected filter ($0 > 1) that it was never offered"
        );
        assert!(matches!(
            err.downcast_ref::<ExecutionError>(),
            Some(ExecutionError::InventedFilter { .. })
        ));
    }

    #[test]
    fn test_compilation_keeps_cause() {
        let err = ExecutionError::ScalarCompilation {
            name: "Scalar_3".to_string(),
            source: ExpressionError::DivisionByZero,
        };
        let cause = std::error::Error::source(&err).map(|e| e.to_string());
        assert_eq!(cause.as_deref(), Some("Division by zero"));
    }
}
