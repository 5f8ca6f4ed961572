pub mod access;
pub mod algebra;
pub mod catalog;
pub mod error;
pub mod expression;
pub mod interpreter;
pub mod operator;
pub mod table;

pub use access::{ColumnInfo, DataType, Row, RowBuilder, Value};
pub use algebra::AlgNode;
pub use catalog::{DataContext, Schema};
pub use error::{ExecutionError, ExecutionResult};
pub use interpreter::{Interpreter, InterpreterConfig};
pub use table::Table;
