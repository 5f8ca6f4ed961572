//! The callable contract of compiled expressions.

use crate::access::{Row, Value};
use crate::catalog::DataContext;
use crate::expression::{ExpressionError, ExpressionResult};
use std::sync::Arc;

/// Per-row evaluation cell handed to every [`Scalar`] call.
///
/// An operator owns one `Context` per compiled scalar and overwrites the
/// current row in place for each input row; it is never shared between
/// operators.
pub struct Context {
    values: Vec<Value>,
    data_context: Arc<DataContext>,
}

impl Context {
    pub fn new(data_context: Arc<DataContext>) -> Self {
        Self {
            values: Vec::new(),
            data_context,
        }
    }

    /// Make `row` the current row, taking ownership of its values.
    pub fn set_row(&mut self, row: Row) {
        self.values = row.into_values();
    }

    /// Give the current row back, leaving the context empty.
    pub fn take_row(&mut self) -> Row {
        Row::of(std::mem::take(&mut self.values))
    }

    /// Copy `values` into the current row, reusing its allocation.
    pub fn set_values(&mut self, values: &[Value]) {
        self.values.clear();
        self.values.extend_from_slice(values);
    }

    /// Copy the concatenation of two value slices in, as a join does.
    pub fn set_joined(&mut self, left: &[Value], right: &[Value]) {
        self.values.clear();
        self.values.extend_from_slice(left);
        self.values.extend_from_slice(right);
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn data_context(&self) -> &DataContext {
        &self.data_context
    }
}

/// A compiled expression list, evaluated one row at a time.
///
/// Implementations are pure: repeated calls against the same context state
/// produce the same outputs, and the context is not retained past the call.
pub trait Scalar {
    /// Evaluate every expression, writing output `i` into `results[i]`.
    fn execute_into(&self, context: &Context, results: &mut [Value]) -> ExpressionResult<()>;

    /// Number of values written by [`Scalar::execute_into`]
    fn output_count(&self) -> usize;

    /// Evaluate the first expression only.
    fn execute(&self, context: &Context) -> ExpressionResult<Value> {
        let mut scratch = [Value::Null];
        self.execute_into(context, &mut scratch)?;
        Ok(std::mem::take(&mut scratch[0]))
    }

    /// Evaluate as a filter condition. NULL counts as false.
    fn execute_predicate(&self, context: &Context) -> ExpressionResult<bool> {
        match self.execute(context)? {
            Value::Boolean(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(ExpressionError::NotBoolean {
                actual: other.data_type(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-written scalar echoing column 0 into every output
    struct Echo(usize);

    impl Scalar for Echo {
        fn execute_into(&self, context: &Context, results: &mut [Value]) -> ExpressionResult<()> {
            for slot in results.iter_mut().take(self.0) {
                *slot = context.values()[0].clone();
            }
            Ok(())
        }

        fn output_count(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn test_context_round_trips_row() {
        let mut context = Context::new(Arc::new(DataContext::empty()));
        let row = Row::of(vec![Value::Int32(1), Value::Int32(2)]);
        let ptr = row.values().as_ptr();

        context.set_row(row);
        assert_eq!(context.values().len(), 2);
        let back = context.take_row();
        assert_eq!(back.values().as_ptr(), ptr);
        assert!(context.values().is_empty());
    }

    #[test]
    fn test_single_output_delegates_to_primary_form() {
        let mut context = Context::new(Arc::new(DataContext::empty()));
        context.set_values(&[Value::String("x".into())]);

        let echo = Echo(3);
        assert_eq!(echo.execute(&context).unwrap(), Value::String("x".into()));

        let mut out = vec![Value::Null; 3];
        echo.execute_into(&context, &mut out).unwrap();
        assert!(out.iter().all(|v| *v == Value::String("x".into())));
    }

    #[test]
    fn test_predicate_treats_null_as_false() {
        let mut context = Context::new(Arc::new(DataContext::empty()));
        let echo = Echo(1);

        context.set_values(&[Value::Null]);
        assert!(!echo.execute_predicate(&context).unwrap());

        context.set_values(&[Value::Boolean(true)]);
        assert!(echo.execute_predicate(&context).unwrap());

        context.set_values(&[Value::Int32(1)]);
        assert!(matches!(
            echo.execute_predicate(&context),
            Err(ExpressionError::NotBoolean { .. })
        ));
    }
}
