use crate::access::{ColumnInfo, DataType, Value};
use crate::catalog::DataContext;
use crate::table::{QueryableObjectTable, Table};
use anyhow::Result;
use std::fmt;
use std::sync::Arc;

/// One object as seen by the scan: its fields in declaration order.
pub trait FieldSource {
    fn field_count(&self) -> usize;

    fn field(&self, index: usize) -> Value;
}

pub type ObjectStream = Box<dyn Iterator<Item = Result<Box<dyn FieldSource>>>>;

/// A statically declared column of an object table.
pub struct FieldAccessor<T> {
    pub name: String,
    pub data_type: DataType,
    pub get: fn(&T) -> Value,
}

impl<T> FieldAccessor<T> {
    pub fn new(name: impl Into<String>, data_type: DataType, get: fn(&T) -> Value) -> Self {
        Self {
            name: name.into(),
            data_type,
            get,
        }
    }
}

impl<T> Clone for FieldAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            data_type: self.data_type,
            get: self.get,
        }
    }
}

impl<T> fmt::Debug for FieldAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .finish()
    }
}

/// A table over plain Rust values, read through a field accessor list.
pub struct ObjectTable<T> {
    name: String,
    columns: Vec<ColumnInfo>,
    fields: Arc<Vec<FieldAccessor<T>>>,
    objects: Arc<Vec<T>>,
}

impl<T: 'static> ObjectTable<T> {
    pub fn new(name: impl Into<String>, fields: Vec<FieldAccessor<T>>, objects: Vec<T>) -> Self {
        let columns = fields
            .iter()
            .map(|f| ColumnInfo::new(f.name.clone(), f.data_type))
            .collect();
        Self {
            name: name.into(),
            columns,
            fields: Arc::new(fields),
            objects: Arc::new(objects),
        }
    }
}

struct BoundObject<T> {
    fields: Arc<Vec<FieldAccessor<T>>>,
    objects: Arc<Vec<T>>,
    index: usize,
}

impl<T> FieldSource for BoundObject<T> {
    fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn field(&self, index: usize) -> Value {
        match self.fields.get(index) {
            Some(accessor) => (accessor.get)(&self.objects[self.index]),
            None => Value::Null,
        }
    }
}

impl<T: 'static> Table for ObjectTable<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn as_object_source(&self) -> Option<&dyn QueryableObjectTable> {
        Some(self)
    }
}

impl<T: 'static> QueryableObjectTable for ObjectTable<T> {
    fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    fn objects(&self, _context: &DataContext) -> Result<ObjectStream> {
        let fields = Arc::clone(&self.fields);
        let objects = Arc::clone(&self.objects);
        Ok(Box::new((0..objects.len()).map(move |index| {
            Ok(Box::new(BoundObject {
                fields: Arc::clone(&fields),
                objects: Arc::clone(&objects),
                index,
            }) as Box<dyn FieldSource>)
        })))
    }
}
