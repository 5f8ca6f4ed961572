//! Filter operator.
//!
//! Passes through the child's rows for which the compiled condition is TRUE.
//! NULL counts as false.

use crate::access::{ColumnInfo, Row};
use crate::catalog::DataContext;
use crate::expression::{Context, Scalar};
use crate::operator::{not_initialized, Operator};
use anyhow::Result;
use std::sync::Arc;

pub struct FilterOperator {
    child: Box<dyn Operator>,
    condition: Box<dyn Scalar>,
    context: Context,
    output_schema: Vec<ColumnInfo>,
    initialized: bool,
}

impl FilterOperator {
    pub fn new(
        child: Box<dyn Operator>,
        condition: Box<dyn Scalar>,
        data_context: Arc<DataContext>,
    ) -> Self {
        let output_schema = child.output_schema().to_vec();
        Self {
            child,
            condition,
            context: Context::new(data_context),
            output_schema,
            initialized: false,
        }
    }
}

impl Operator for FilterOperator {
    fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.child.init()?;
        self.initialized = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.initialized {
            return Err(not_initialized(self.name()));
        }

        while let Some(row) = self.child.next()? {
            self.context.set_row(row);
            let keep = self.condition.execute_predicate(&self.context)?;
            if keep {
                return Ok(Some(self.context.take_row()));
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> &[ColumnInfo] {
        &self.output_schema
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn rewind(&mut self) -> Result<()> {
        self.child.rewind()
    }

    fn name(&self) -> &'static str {
        "Filter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Value;
    use crate::expression::{Expression, ScalarCompiler, ScalarCompilerConfig};
    use crate::operator::testing::{drain, ints, MockOperator};

    fn filter(child: Box<dyn Operator>, condition: Expression) -> FilterOperator {
        let scalar = ScalarCompiler::new(ScalarCompilerConfig::default())
            .compile(&[condition], child.output_schema())
            .unwrap();
        FilterOperator::new(child, scalar, Arc::new(DataContext::empty()))
    }

    #[test]
    fn test_filter_keeps_matching_rows() -> Result<()> {
        let child = MockOperator::ints(&[&[1, 10], &[2, 20], &[3, 30]]);
        let mut op = filter(
            child,
            Expression::gt(Expression::column(0), Expression::literal(1)),
        );
        assert_eq!(drain(&mut op)?, ints(&[&[2, 20], &[3, 30]]));

        op.rewind()?;
        assert_eq!(op.next()?.map(Row::into_values), Some(ints(&[&[2, 20]])[0].clone()));
        Ok(())
    }

    #[test]
    fn test_null_condition_drops_row() -> Result<()> {
        let child = Box::new(MockOperator::new(
            vec![ColumnInfo::new("a", crate::access::DataType::Int32)],
            vec![vec![Value::Null], vec![Value::Int32(5)]],
        ));
        let mut op = filter(
            child,
            Expression::gt(Expression::column(0), Expression::literal(1)),
        );
        assert_eq!(drain(&mut op)?, vec![vec![Value::Int32(5)]]);
        Ok(())
    }

    #[test]
    fn test_next_before_init_fails() {
        let mut op = filter(MockOperator::ints(&[&[1]]), Expression::literal(true));
        assert!(op.next().is_err());
    }
}
