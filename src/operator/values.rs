use crate::access::{ColumnInfo, Row, Value};
use crate::operator::{not_initialized, Operator};
use anyhow::Result;

/// Emits a fixed list of literal tuples.
pub struct ValuesOperator {
    rows: Vec<Row>,
    output_schema: Vec<ColumnInfo>,
    position: usize,
    initialized: bool,
}

impl ValuesOperator {
    pub fn new(output_schema: Vec<ColumnInfo>, tuples: Vec<Vec<Value>>) -> Self {
        Self {
            rows: tuples.into_iter().map(Row::of).collect(),
            output_schema,
            position: 0,
            initialized: false,
        }
    }
}

impl Operator for ValuesOperator {
    fn init(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.initialized {
            return Err(not_initialized(self.name()));
        }
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }

    fn output_schema(&self) -> &[ColumnInfo] {
        &self.output_schema
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Values"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::DataType;
    use crate::operator::testing::drain;

    #[test]
    fn test_values_replay_after_rewind() -> Result<()> {
        let mut op = ValuesOperator::new(
            vec![ColumnInfo::new("x", DataType::Int32)],
            vec![vec![Value::Int32(1)], vec![Value::Int32(2)]],
        );
        let first = drain(&mut op)?;
        op.rewind()?;
        let second = drain(&mut op)?;
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        Ok(())
    }
}
