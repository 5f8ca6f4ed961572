//! Table capability tiers.
//!
//! A table advertises what it can do by returning `Some` from one or more of
//! the `as_*` views on [`Table`]. The table-scan operator checks them in
//! declaration order and uses the first one present.

pub mod memory;
pub mod object;

pub use memory::MemoryTable;
pub use object::{FieldAccessor, FieldSource, ObjectStream, ObjectTable};

use crate::access::{ColumnInfo, Row};
use crate::catalog::DataContext;
use crate::expression::Expression;
use anyhow::Result;

/// Rows produced by a table. Dropping the stream releases whatever cursor
/// the table opened for it.
pub type RowStream = Box<dyn Iterator<Item = Result<Row>>>;

/// A table that can apply filters and emit only selected columns.
///
/// On entry `filters` holds every filter offered, expressed over the table's
/// full column list. On return it must hold the filters the table did not
/// guarantee to enforce; the engine re-checks those. Rows have exactly
/// `projects.len()` values, column `i` being table column `projects[i]`.
pub trait ProjectableFilterableTable {
    fn scan(
        &self,
        context: &DataContext,
        filters: &mut Vec<Expression>,
        projects: &[usize],
    ) -> Result<RowStream>;
}

/// A table that can apply filters but always emits every column.
pub trait FilterableTable {
    fn scan(&self, context: &DataContext, filters: &mut Vec<Expression>) -> Result<RowStream>;
}

/// A table that can only produce all of its rows.
pub trait ScannableTable {
    fn scan(&self, context: &DataContext) -> Result<RowStream>;
}

/// A table backed by an already materialized row sequence.
pub trait RowSequenceTable {
    fn rows(&self) -> Result<RowStream>;
}

/// A table of arbitrary objects, read through a declared field list.
pub trait QueryableObjectTable {
    /// Field names in the order values are produced
    fn field_names(&self) -> Vec<String>;

    fn objects(&self, context: &DataContext) -> Result<ObjectStream>;
}

pub trait Table {
    fn name(&self) -> &str;

    fn columns(&self) -> &[ColumnInfo];

    fn column_count(&self) -> usize {
        self.columns().len()
    }

    fn as_project_filterable(&self) -> Option<&dyn ProjectableFilterableTable> {
        None
    }

    fn as_filterable(&self) -> Option<&dyn FilterableTable> {
        None
    }

    fn as_scannable(&self) -> Option<&dyn ScannableTable> {
        None
    }

    fn as_row_sequence(&self) -> Option<&dyn RowSequenceTable> {
        None
    }

    fn as_object_source(&self) -> Option<&dyn QueryableObjectTable> {
        None
    }
}
