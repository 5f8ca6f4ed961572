//! Projection operator.
//!
//! Evaluates one compiled multi-output scalar per input row and builds the
//! output row in place with a reused [`RowBuilder`].

use crate::access::{ColumnInfo, Row, RowBuilder};
use crate::catalog::DataContext;
use crate::expression::{Context, Scalar};
use crate::operator::{not_initialized, Operator};
use anyhow::Result;
use std::sync::Arc;

pub struct ProjectOperator {
    child: Box<dyn Operator>,
    projection: Box<dyn Scalar>,
    context: Context,
    builder: RowBuilder,
    output_schema: Vec<ColumnInfo>,
    initialized: bool,
}

impl ProjectOperator {
    pub fn new(
        child: Box<dyn Operator>,
        projection: Box<dyn Scalar>,
        output_schema: Vec<ColumnInfo>,
        data_context: Arc<DataContext>,
    ) -> Self {
        let builder = RowBuilder::new(projection.output_count());
        Self {
            child,
            projection,
            context: Context::new(data_context),
            builder,
            output_schema,
            initialized: false,
        }
    }
}

impl Operator for ProjectOperator {
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

        let Some(row) = self.child.next()? else {
            return Ok(None);
        };
        self.context.set_row(row);
        self.builder.reset();
        self.projection
            .execute_into(&self.context, self.builder.values_mut())?;
        Ok(Some(self.builder.build()))
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
        "Project"
    }
}
