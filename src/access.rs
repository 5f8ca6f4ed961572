//! Data model shared by every layer of the engine.
//!
//! - **Value**: dynamically typed column value
//! - **DataType**: the type tag of a value
//! - **Row**: immutable fixed-width tuple of values
//! - **RowBuilder**: incremental row construction reused across a batch loop

pub mod row;
pub mod value;

pub use row::{Row, RowBuilder};
pub use value::{DataType, Value};

/// Name and type of one column of a row shape
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_info_creation() {
        let col = ColumnInfo::new("id", DataType::Int32);
        assert_eq!(col.name, "id");
        assert_eq!(col.data_type, DataType::Int32);

        let col2 = ColumnInfo::new(String::from("name"), DataType::Varchar);
        assert_eq!(col2.name, "name");
        assert_eq!(col2.data_type, DataType::Varchar);
    }
}
