//! Row expressions and their compiled form.
//!
//! This module provides:
//! - Expression IR representation
//! - Scalar evaluation primitives (operators, functions, casts)
//! - A two-phase compiler from expression lists to callable [`Scalar`]s

pub mod compiler;
pub mod error;
pub mod eval;
pub mod expr;
pub mod operator;
pub mod program;
pub mod scalar;

pub use compiler::{
    CompiledScalar, DiagnosticsSink, MemoryDiagnostics, ScalarCompiler, ScalarCompilerConfig,
};
pub use error::{ExpressionError, ExpressionResult};
pub use expr::{ColumnRef, Expression, Literal};
pub use operator::{BinaryOperator, Function, UnaryOperator};
pub use program::{Instruction, Program};
pub use scalar::{Context, Scalar};
