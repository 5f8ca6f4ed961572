//! Sort operator.
//!
//! With a non-empty collation it materializes the child's rows and sorts
//! them (stable, so ties keep input order). `offset` and `fetch` are applied
//! on the way out; with an empty collation the operator streams and only
//! applies them.

use crate::access::{ColumnInfo, Row};
use crate::algebra::SortKey;
use crate::operator::{compare_rows, not_initialized, Operator};
use anyhow::Result;

pub struct SortOperator {
    child: Box<dyn Operator>,
    collation: Vec<SortKey>,
    offset: usize,
    fetch: Option<usize>,
    output_schema: Vec<ColumnInfo>,
    /// Sorted rows, present once the child has been drained
    sorted: Option<std::vec::IntoIter<Row>>,
    /// Rows skipped or emitted so far
    consumed: usize,
    initialized: bool,
}

impl SortOperator {
    pub fn new(
        child: Box<dyn Operator>,
        collation: Vec<SortKey>,
        offset: Option<usize>,
        fetch: Option<usize>,
    ) -> Self {
        let output_schema = child.output_schema().to_vec();
        Self {
            child,
            collation,
            offset: offset.unwrap_or(0),
            fetch,
            output_schema,
            sorted: None,
            consumed: 0,
            initialized: false,
        }
    }

    fn pull(&mut self) -> Result<Option<Row>> {
        if self.collation.is_empty() {
            return self.child.next();
        }
        if self.sorted.is_none() {
            let mut rows = Vec::new();
            while let Some(row) = self.child.next()? {
                rows.push(row);
            }
            let collation = &self.collation;
            rows.sort_by(|a, b| compare_rows(a.values(), b.values(), collation));
            self.sorted = Some(rows.into_iter());
        }
        Ok(self.sorted.as_mut().and_then(Iterator::next))
    }
}

impl Operator for SortOperator {
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

        while self.consumed < self.offset {
            if self.pull()?.is_none() {
                return Ok(None);
            }
            self.consumed += 1;
        }
        if let Some(fetch) = self.fetch {
            if self.consumed >= self.offset + fetch {
                return Ok(None);
            }
        }
        let row = self.pull()?;
        if row.is_some() {
            self.consumed += 1;
        }
        Ok(row)
    }

    fn output_schema(&self) -> &[ColumnInfo] {
        &self.output_schema
    }

    fn close(&mut self) -> Result<()> {
        self.sorted = None;
        self.child.close()
    }

    fn rewind(&mut self) -> Result<()> {
        self.sorted = None;
        self.consumed = 0;
        self.child.rewind()
    }

    fn name(&self) -> &'static str {
        "Sort"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, Value};
    use crate::algebra::NullOrder;
    use crate::operator::testing::{drain, ints, MockOperator};

    #[test]
    fn test_multi_key_sort() -> Result<()> {
        let child = MockOperator::ints(&[&[2, 1], &[1, 5], &[2, 3], &[1, 4]]);
        let mut op = SortOperator::new(child, vec![SortKey::asc(0), SortKey::desc(1)], None, None);
        assert_eq!(
            drain(&mut op)?,
            ints(&[&[1, 5], &[1, 4], &[2, 3], &[2, 1]])
        );
        Ok(())
    }

    #[test]
    fn test_offset_and_fetch() -> Result<()> {
        let child = MockOperator::ints(&[&[5], &[3], &[1], &[4], &[2]]);
        let mut op = SortOperator::new(child, vec![SortKey::asc(0)], Some(1), Some(2));
        assert_eq!(drain(&mut op)?, ints(&[&[2], &[3]]));

        op.rewind()?;
        assert_eq!(drain(&mut op)?, ints(&[&[2], &[3]]));
        Ok(())
    }

    #[test]
    fn test_limit_without_collation_streams() -> Result<()> {
        let child = MockOperator::ints(&[&[5], &[3], &[1]]);
        let mut op = SortOperator::new(child, vec![], None, Some(2));
        assert_eq!(drain(&mut op)?, ints(&[&[5], &[3]]));
        Ok(())
    }

    #[test]
    fn test_null_placement() -> Result<()> {
        let child = Box::new(MockOperator::new(
            vec![ColumnInfo::new("x", DataType::Int32)],
            vec![vec![Value::Int32(2)], vec![Value::Null], vec![Value::Int32(1)]],
        ));
        let mut op = SortOperator::new(
            child,
            vec![SortKey::asc(0).nulls(NullOrder::First)],
            None,
            None,
        );
        assert_eq!(
            drain(&mut op)?,
            vec![vec![Value::Null], vec![Value::Int32(1)], vec![Value::Int32(2)]]
        );
        Ok(())
    }
}
