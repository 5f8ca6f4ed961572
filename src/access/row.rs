use crate::access::Value;
use std::fmt;

/// A fixed-width tuple of values, the unit of data flow between operators.
///
/// Equality and hashing are value based over all columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Adopt `values` as the row's backing storage without copying.
    pub fn of(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Build a row from a defensive copy of `values`.
    pub fn as_copy(values: &[Value]) -> Self {
        Self {
            values: values.to_vec(),
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// A fresh row holding the columns at `indices`, in that order.
    pub fn project(&self, indices: &[usize]) -> Row {
        Row::of(indices.iter().map(|&i| self.values[i].clone()).collect())
    }

    /// Concatenate two rows, as a join does.
    pub fn concat(left: &[Value], right: &[Value]) -> Row {
        let mut values = Vec::with_capacity(left.len() + right.len());
        values.extend_from_slice(left);
        values.extend_from_slice(right);
        Row::of(values)
    }

    /// A row of `width` NULLs.
    pub fn nulls(width: usize) -> Row {
        Row::of(vec![Value::Null; width])
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::of(values)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", value)?;
        }
        f.write_str("]")
    }
}

/// Incremental, in-place row construction.
///
/// `build()` hands the current backing array to the new row. A following
/// `reset()` allocates a fresh array; otherwise `reset()` null-fills the
/// existing one.
#[derive(Debug)]
pub struct RowBuilder {
    size: usize,
    values: Vec<Value>,
}

impl RowBuilder {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            values: vec![Value::Null; size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Set the value at `index`.
    ///
    /// Panics if `index` is outside the builder's width, or if called after
    /// `build()` without a `reset()`.
    pub fn set(&mut self, index: usize, value: Value) {
        self.values[index] = value;
    }

    /// Mutable view over the slots, for scalars that write all outputs at once.
    pub fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }

    pub fn build(&mut self) -> Row {
        Row::of(std::mem::take(&mut self.values))
    }

    pub fn reset(&mut self) {
        if self.values.len() == self.size {
            self.values.fill(Value::Null);
        } else {
            self.values = vec![Value::Null; self.size];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_copy_is_defensive() {
        let mut values = vec![Value::Int32(1), Value::String("a".into())];
        let row = Row::as_copy(&values);
        values[0] = Value::Int32(99);

        assert_eq!(row.values()[0], Value::Int32(1));
        assert_eq!(Row::as_copy(&values), Row::as_copy(&values));
    }

    #[test]
    fn test_of_adopts_backing_array() {
        let values = vec![Value::Int32(1), Value::Int32(2)];
        let ptr = values.as_ptr();
        let row = Row::of(values);

        assert_eq!(row.values().as_ptr(), ptr);
    }

    #[test]
    fn test_builder_never_aliases_built_rows() {
        let mut builder = RowBuilder::new(2);
        builder.set(0, Value::Int32(1));
        builder.set(1, Value::Int32(2));
        let first = builder.build();

        builder.reset();
        builder.set(0, Value::Int32(3));
        let second = builder.build();

        assert_eq!(first, Row::of(vec![Value::Int32(1), Value::Int32(2)]));
        assert_eq!(second, Row::of(vec![Value::Int32(3), Value::Null]));
    }

    #[test]
    fn test_builder_reset_reuses_unbuilt_array() {
        let mut builder = RowBuilder::new(3);
        builder.set(2, Value::Boolean(true));
        let ptr = builder.values_mut().as_ptr();

        builder.reset();
        assert_eq!(builder.values_mut().as_ptr(), ptr);
        assert!(builder.values_mut().iter().all(Value::is_null));
    }

    #[test]
    fn test_project_and_concat() {
        let row = Row::of(vec![Value::Int32(10), Value::Int32(20), Value::Int32(30)]);
        assert_eq!(
            row.project(&[2, 0]),
            Row::of(vec![Value::Int32(30), Value::Int32(10)])
        );

        let joined = Row::concat(row.values(), &[Value::Null]);
        assert_eq!(joined.len(), 4);
        assert_eq!(format!("{}", joined), "[10, 20, 30, NULL]");
    }
}
