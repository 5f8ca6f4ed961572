//! Root schema and the execution-time data context.

use crate::access::Value;
use crate::table::Table;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name -> table mapping that scan nodes are resolved against.
#[derive(Default, Clone)]
pub struct Schema {
    tables: HashMap<String, Arc<dyn Table>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table under its own name, replacing any previous entry.
    pub fn add_table(&mut self, table: Arc<dyn Table>) -> Option<Arc<dyn Table>> {
        self.tables.insert(table.name().to_string(), table)
    }

    pub fn with_table(mut self, table: Arc<dyn Table>) -> Self {
        self.add_table(table);
        self
    }

    pub fn table(&self, name: &str) -> Option<Arc<dyn Table>> {
        self.tables.get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("tables", &self.table_names())
            .finish()
    }
}

/// Bindings visible to a query while it runs: the root schema and the
/// values of positional parameters.
#[derive(Debug, Default, Clone)]
pub struct DataContext {
    root: Arc<Schema>,
    parameters: Vec<Value>,
}

impl DataContext {
    pub fn new(root: Schema) -> Self {
        Self {
            root: Arc::new(root),
            parameters: Vec::new(),
        }
    }

    /// A context with no tables and no parameters
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_parameters(mut self, parameters: Vec<Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn parameter(&self, index: usize) -> Option<&Value> {
        self.parameters.get(index)
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    pub fn root_schema(&self) -> &Schema {
        &self.root
    }

    pub fn table(&self, name: &str) -> Option<Arc<dyn Table>> {
        self.root.table(name)
    }
}
