use crate::access::{ColumnInfo, Row};
use crate::catalog::DataContext;
use crate::table::{RowSequenceTable, RowStream, ScannableTable, Table};
use anyhow::Result;
use std::sync::Arc;

/// In-memory table: scan-only, and also exposes its rows as a sequence.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    name: String,
    columns: Vec<ColumnInfo>,
    rows: Arc<Vec<Row>>,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Arc::new(rows),
        }
    }

    pub fn data(&self) -> &[Row] {
        &self.rows
    }

    fn stream(&self) -> RowStream {
        let rows = Arc::clone(&self.rows);
        Box::new((0..rows.len()).map(move |i| Ok(rows[i].clone())))
    }
}

impl Table for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn as_scannable(&self) -> Option<&dyn ScannableTable> {
        Some(self)
    }

    fn as_row_sequence(&self) -> Option<&dyn RowSequenceTable> {
        Some(self)
    }
}

impl ScannableTable for MemoryTable {
    fn scan(&self, _context: &DataContext) -> Result<RowStream> {
        Ok(self.stream())
    }
}

impl RowSequenceTable for MemoryTable {
    fn rows(&self) -> Result<RowStream> {
        Ok(self.stream())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, Value};

    #[test]
    fn test_scan_yields_rows_in_order() -> Result<()> {
        let table = MemoryTable::new(
            "t",
            vec![ColumnInfo::new("id", DataType::Int32)],
            vec![
                Row::of(vec![Value::Int32(1)]),
                Row::of(vec![Value::Int32(2)]),
            ],
        );

        let scanned: Vec<Row> = table.scan(&DataContext::empty())?.collect::<Result<_>>()?;
        assert_eq!(scanned, table.data());
        assert!(table.as_project_filterable().is_none());
        assert!(table.as_filterable().is_none());
        Ok(())
    }
}
