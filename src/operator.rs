//! Pull-based operators.
//!
//! Each operator produces rows one at a time via `next()`, pulling from its
//! children on demand. Sort, join, set-difference and aggregate operators
//! materialize one or more inputs before yielding their first row.

use crate::access::{ColumnInfo, Row, Value};
use crate::algebra::{NullOrder, SortDirection, SortKey};
use crate::error::ExecutionError;
use anyhow::Result;
use std::cmp::Ordering;

pub mod aggregate;
pub mod filter;
pub mod join;
pub mod project;
pub mod set_op;
pub mod sort;
pub mod table_scan;
pub mod values;
pub mod window;

pub use aggregate::AggregateOperator;
pub use filter::FilterOperator;
pub use join::NestedLoopJoinOperator;
pub use project::ProjectOperator;
pub use set_op::SetOpOperator;
pub use sort::SortOperator;
pub use table_scan::{ScanTier, TableScanOperator};
pub use values::ValuesOperator;
pub use window::WindowOperator;

/// Trait for all operators of a compiled plan
pub trait Operator {
    /// Prepare for pulling. Must be called before `next()`; calling it again
    /// is a no-op.
    fn init(&mut self) -> Result<()>;

    /// Get the next row, or `None` at end of sequence.
    fn next(&mut self) -> Result<Option<Row>>;

    /// Get the output schema of this operator
    fn output_schema(&self) -> &[ColumnInfo];

    /// Release every resource held by this operator and its children.
    /// Closing twice is harmless.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Restart the row sequence from the beginning.
    fn rewind(&mut self) -> Result<()> {
        Err(ExecutionError::NotRestartable {
            operator: self.name().to_string(),
        }
        .into())
    }

    fn name(&self) -> &'static str;
}

pub(crate) fn not_initialized(operator: &str) -> anyhow::Error {
    ExecutionError::NotInitialized {
        operator: operator.to_string(),
    }
    .into()
}

/// Close every child, reporting the first failure after all were tried.
pub(crate) fn close_all(children: &mut [Box<dyn Operator>]) -> Result<()> {
    let mut first_error = None;
    for child in children.iter_mut() {
        if let Err(e) = child.close() {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Order two non-NULL values, promoting between numeric types.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    a.sql_cmp(b).unwrap_or_else(|| a.cmp(b))
}

/// Compare two rows under a collation.
pub(crate) fn compare_rows(a: &[Value], b: &[Value], collation: &[SortKey]) -> Ordering {
    for key in collation {
        let (va, vb) = (&a[key.column], &b[key.column]);
        let ordering = match (va.is_null(), vb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match key.nulls {
                NullOrder::First => Ordering::Less,
                NullOrder::Last => Ordering::Greater,
            },
            (false, true) => match key.nulls {
                NullOrder::First => Ordering::Greater,
                NullOrder::Last => Ordering::Less,
            },
            (false, false) => match key.direction {
                SortDirection::Ascending => compare_values(va, vb),
                SortDirection::Descending => compare_values(va, vb).reverse(),
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers shared by operator unit tests.

    use super::*;
    use crate::access::DataType;

    /// Operator replaying a fixed list of rows
    pub struct MockOperator {
        rows: Vec<Row>,
        schema: Vec<ColumnInfo>,
        position: usize,
        pub closed: usize,
    }

    impl MockOperator {
        pub fn new(schema: Vec<ColumnInfo>, rows: Vec<Vec<Value>>) -> Self {
            Self {
                rows: rows.into_iter().map(Row::of).collect(),
                schema,
                position: 0,
                closed: 0,
            }
        }

        /// Integer-only input with columns c0, c1, ...
        pub fn ints(rows: &[&[i32]]) -> Box<dyn Operator> {
            let width = rows.first().map_or(0, |r| r.len());
            let schema = (0..width)
                .map(|i| ColumnInfo::new(format!("c{}", i), DataType::Int32))
                .collect();
            Box::new(Self::new(
                schema,
                rows.iter()
                    .map(|r| r.iter().map(|&v| Value::Int32(v)).collect())
                    .collect(),
            ))
        }
    }

    impl Operator for MockOperator {
        fn init(&mut self) -> Result<()> {
            Ok(())
        }

        fn next(&mut self) -> Result<Option<Row>> {
            let row = self.rows.get(self.position).cloned();
            self.position += 1;
            Ok(row)
        }

        fn output_schema(&self) -> &[ColumnInfo] {
            &self.schema
        }

        fn close(&mut self) -> Result<()> {
            self.closed += 1;
            Ok(())
        }

        fn rewind(&mut self) -> Result<()> {
            self.position = 0;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "Mock"
        }
    }

    pub fn drain(operator: &mut dyn Operator) -> Result<Vec<Vec<Value>>> {
        operator.init()?;
        let mut rows = Vec::new();
        while let Some(row) = operator.next()? {
            rows.push(row.into_values());
        }
        Ok(rows)
    }

    pub fn ints(rows: &[&[i32]]) -> Vec<Vec<Value>> {
        rows.iter()
            .map(|r| r.iter().map(|&v| Value::Int32(v)).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_rows_with_nulls_and_direction() {
        let a = [Value::Int32(1), Value::Null];
        let b = [Value::Int32(1), Value::Int32(5)];

        let asc = [SortKey::asc(0), SortKey::asc(1)];
        assert_eq!(compare_rows(&a, &b, &asc), Ordering::Greater);

        let desc = [SortKey::asc(0), SortKey::desc(1)];
        assert_eq!(compare_rows(&a, &b, &desc), Ordering::Less);

        let mixed = [Value::Int64(2)];
        let small = [Value::Int32(1)];
        assert_eq!(compare_rows(&mixed, &small, &[SortKey::asc(0)]), Ordering::Greater);
    }
}
