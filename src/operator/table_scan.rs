//! Table scan operator and capability negotiation.
//!
//! A scan carries candidate filters (over the table's full column list) and
//! an optional candidate projection. The operator asks the table, through
//! the first capability tier it exposes, to take over as much of that work
//! as it can, and evaluates whatever the table hands back:
//!
//! 1. project + filter: the table receives both and reports the filters it
//!    did not enforce. If those filters reference columns the projection
//!    lacks, the projection is widened and the request re-issued until it
//!    settles. Extra columns are trimmed again before rows leave the scan.
//! 2. filter only: the table reports the filters it did not enforce.
//! 3. scan only, 4. row sequence, 5. object source: the engine applies
//!    every filter and the projection itself.
//!
//! A table that reports a filter it was never offered is rejected with
//! [`ExecutionError::InventedFilter`].

use crate::access::{ColumnInfo, Row, RowBuilder};
use crate::catalog::DataContext;
use crate::error::ExecutionError;
use crate::expression::{Context, Expression, Scalar, ScalarCompiler};
use crate::operator::{not_initialized, Operator};
use crate::table::{RowStream, Table};
use anyhow::Result;
use log::{debug, trace};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Capability tier a scan settled on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTier {
    ProjectFilter,
    Filter,
    Scan,
    RowSequence,
    Objects,
}

impl fmt::Display for ScanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanTier::ProjectFilter => "project+filter",
            ScanTier::Filter => "filter",
            ScanTier::Scan => "scan",
            ScanTier::RowSequence => "row sequence",
            ScanTier::Objects => "objects",
        };
        f.write_str(name)
    }
}

/// Engine-side filter over the rows the table returns
struct Residual {
    condition: Box<dyn Scalar>,
    context: Context,
}

/// Outcome of one negotiation: the open row stream and the work left to do
struct OpenScan {
    rows: RowStream,
    /// Width every row coming from the table must have
    width: usize,
    residual: Option<Residual>,
    /// Trailing re-projection applied after the residual filter
    reproject: Option<Vec<usize>>,
}

pub struct TableScanOperator {
    table: Arc<dyn Table>,
    filters: Vec<Expression>,
    projects: Option<Vec<usize>>,
    data_context: Arc<DataContext>,
    compiler: Rc<ScalarCompiler>,
    max_rounds: Option<usize>,
    output_schema: Vec<ColumnInfo>,
    tier: ScanTier,
    /// Projection finally requested from a project+filter table
    requested: Option<Vec<usize>>,
    rounds: usize,
    open: Option<OpenScan>,
    initialized: bool,
}

impl TableScanOperator {
    /// Negotiate with `table` and open its row stream.
    ///
    /// `max_rounds` caps the projection widening loop; by default it is one
    /// more than the table's column count.
    pub fn create(
        table: Arc<dyn Table>,
        filters: Vec<Expression>,
        projects: Option<Vec<usize>>,
        data_context: Arc<DataContext>,
        compiler: Rc<ScalarCompiler>,
        max_rounds: Option<usize>,
    ) -> Result<Self> {
        let field_count = table.column_count();
        for filter in &filters {
            let mut columns = BTreeSet::new();
            filter.referenced_columns(&mut columns);
            if let Some(&column) = columns.iter().find(|&&c| c >= field_count) {
                return Err(ExecutionError::FilterColumnOutOfRange {
                    table: table.name().to_string(),
                    column,
                    field_count,
                }
                .into());
            }
        }
        if let Some(&column) = projects.iter().flatten().find(|&&c| c >= field_count) {
            return Err(ExecutionError::InvalidPlan {
                message: format!(
                    "scan of '{}' projects column {} of {}",
                    table.name(),
                    column,
                    field_count
                ),
            }
            .into());
        }

        let columns = table.columns();
        let output_schema = match &projects {
            Some(projects) => projects.iter().map(|&i| columns[i].clone()).collect(),
            None => columns.to_vec(),
        };

        let mut operator = Self {
            table,
            filters,
            projects,
            data_context,
            compiler,
            max_rounds,
            output_schema,
            tier: ScanTier::Scan,
            requested: None,
            rounds: 0,
            open: None,
            initialized: false,
        };
        operator.open = Some(operator.negotiate()?);
        Ok(operator)
    }

    pub fn tier(&self) -> ScanTier {
        self.tier
    }

    /// The projection the table was finally asked for (project+filter tier)
    pub fn requested_projection(&self) -> Option<&[usize]> {
        self.requested.as_deref()
    }

    /// Scan requests issued during the last negotiation
    pub fn negotiation_rounds(&self) -> usize {
        self.rounds
    }

    fn table_name(&self) -> String {
        self.table.name().to_string()
    }

    fn desired_projection(&self) -> Vec<usize> {
        match &self.projects {
            Some(projects) => projects.clone(),
            None => (0..self.table.column_count()).collect(),
        }
    }

    /// Every filter in `rejected` must have been offered.
    fn check_rejected(&self, rejected: &[Expression]) -> Result<()> {
        match rejected.iter().find(|f| !self.filters.contains(f)) {
            Some(invented) => Err(ExecutionError::InventedFilter {
                table: self.table_name(),
                filter: invented.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }

    fn negotiate(&mut self) -> Result<OpenScan> {
        let table = Arc::clone(&self.table);
        let field_count = table.column_count();
        self.requested = None;
        self.rounds = 0;

        if let Some(capable) = table.as_project_filterable() {
            self.tier = ScanTier::ProjectFilter;
            let desired = self.desired_projection();
            let mut request = desired.clone();
            let max_rounds = self.max_rounds.unwrap_or(field_count + 1);

            while self.rounds < max_rounds {
                self.rounds += 1;
                let mut rejected = self.filters.clone();
                let rows = capable.scan(&self.data_context, &mut rejected, &request)?;
                self.check_rejected(&rejected)?;

                let mut referenced = BTreeSet::new();
                for filter in &rejected {
                    filter.referenced_columns(&mut referenced);
                }
                let missing: Vec<usize> = referenced
                    .into_iter()
                    .filter(|c| !request.contains(c))
                    .collect();

                if missing.is_empty() {
                    debug!(
                        "scan of '{}' settled after {} round(s): projection {:?}, {} residual filter(s)",
                        table.name(),
                        self.rounds,
                        request,
                        rejected.len()
                    );
                    // Rejected filters reference table columns; rows are laid
                    // out by `request`.
                    let position: HashMap<usize, usize> = request
                        .iter()
                        .enumerate()
                        .rev()
                        .map(|(pos, &column)| (column, pos))
                        .collect();
                    let residual = rejected
                        .iter()
                        .map(|f| f.remap_columns(&|c| position.get(&c).copied().unwrap_or(c)))
                        .collect();
                    let row_schema: Vec<ColumnInfo> = request
                        .iter()
                        .map(|&c| table.columns()[c].clone())
                        .collect();
                    let reproject: Option<Vec<usize>> =
                        (request.len() != desired.len()).then(|| (0..desired.len()).collect());
                    let width = request.len();
                    self.requested = Some(request);
                    return Ok(OpenScan {
                        rows,
                        width,
                        residual: self.compile_residual(residual, &row_schema)?,
                        reproject,
                    });
                }

                debug!(
                    "scan of '{}' round {}: residual filters need columns {:?}, widening projection",
                    table.name(),
                    self.rounds,
                    missing
                );
                drop(rows);
                request.extend(missing);
            }

            return Err(ExecutionError::NegotiationDidNotConverge {
                table: table.name().to_string(),
                rounds: self.rounds,
            }
            .into());
        }

        let (tier, rows, residual) = if let Some(capable) = table.as_filterable() {
            let mut rejected = self.filters.clone();
            let rows = capable.scan(&self.data_context, &mut rejected)?;
            self.check_rejected(&rejected)?;
            (ScanTier::Filter, rows, rejected)
        } else if let Some(capable) = table.as_scannable() {
            (ScanTier::Scan, capable.scan(&self.data_context)?, self.filters.clone())
        } else if let Some(capable) = table.as_row_sequence() {
            (ScanTier::RowSequence, capable.rows()?, self.filters.clone())
        } else if let Some(capable) = table.as_object_source() {
            let objects = capable.objects(&self.data_context)?;
            let mut builder = RowBuilder::new(capable.field_names().len());
            let rows: RowStream = Box::new(objects.map(move |object| {
                let object = object?;
                builder.reset();
                for i in 0..object.field_count().min(builder.size()) {
                    builder.set(i, object.field(i));
                }
                Ok(builder.build())
            }));
            (ScanTier::Objects, rows, self.filters.clone())
        } else {
            return Err(ExecutionError::NoTableCapability {
                table: table.name().to_string(),
            }
            .into());
        };

        self.tier = tier;
        self.rounds = 1;
        debug!(
            "scan of '{}' uses {} tier with {} residual filter(s)",
            table.name(),
            tier,
            residual.len()
        );
        let reproject = self
            .projects
            .clone()
            .filter(|p| !p.iter().copied().eq(0..field_count));
        Ok(OpenScan {
            rows,
            width: field_count,
            residual: self.compile_residual(residual, table.columns())?,
            reproject,
        })
    }

    fn compile_residual(
        &self,
        filters: Vec<Expression>,
        row_schema: &[ColumnInfo],
    ) -> Result<Option<Residual>> {
        let Some(condition) = Expression::and_all(filters) else {
            return Ok(None);
        };
        trace!("residual filter for '{}': {}", self.table.name(), condition);
        let condition = self.compiler.compile(&[condition], row_schema)?;
        Ok(Some(Residual {
            condition,
            context: Context::new(Arc::clone(&self.data_context)),
        }))
    }
}

impl Operator for TableScanOperator {
    fn init(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.initialized {
            return Err(not_initialized(self.name()));
        }
        let Some(open) = self.open.as_mut() else {
            return Ok(None);
        };

        while let Some(row) = open.rows.next().transpose()? {
            if row.len() != open.width {
                return Err(ExecutionError::RowWidthMismatch {
                    table: self.table.name().to_string(),
                    expected: open.width,
                    actual: row.len(),
                }
                .into());
            }

            let row = match open.residual.as_mut() {
                Some(Residual { condition, context }) => {
                    context.set_row(row);
                    if !condition.execute_predicate(context)? {
                        continue;
                    }
                    context.take_row()
                }
                None => row,
            };

            return Ok(Some(match &open.reproject {
                Some(indices) => row.project(indices),
                None => row,
            }));
        }
        Ok(None)
    }

    fn output_schema(&self) -> &[ColumnInfo] {
        &self.output_schema
    }

    fn close(&mut self) -> Result<()> {
        if self.open.take().is_some() {
            debug!("closed scan of '{}'", self.table.name());
        }
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        self.open = None;
        self.open = Some(self.negotiate()?);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "TableScan"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, Value};
    use crate::expression::ScalarCompilerConfig;
    use crate::table::{
        FieldAccessor, FilterableTable, MemoryTable, ObjectTable, ProjectableFilterableTable,
    };
    use std::cell::RefCell;

    fn columns() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("id", DataType::Int32),
            ColumnInfo::new("name", DataType::Varchar),
            ColumnInfo::new("score", DataType::Int32),
        ]
    }

    fn rows() -> Vec<Row> {
        vec![
            Row::of(vec![Value::Int32(1), Value::from("a"), Value::Int32(10)]),
            Row::of(vec![Value::Int32(2), Value::from("b"), Value::Int32(20)]),
            Row::of(vec![Value::Int32(3), Value::from("c"), Value::Int32(30)]),
        ]
    }

    fn open(table: Arc<dyn Table>, filters: Vec<Expression>, projects: Option<Vec<usize>>) -> Result<TableScanOperator> {
        TableScanOperator::create(
            table,
            filters,
            projects,
            Arc::new(DataContext::empty()),
            Rc::new(ScalarCompiler::new(ScalarCompilerConfig::default())),
            None,
        )
    }

    fn drain(op: &mut TableScanOperator) -> Result<Vec<Row>> {
        op.init()?;
        let mut out = Vec::new();
        while let Some(row) = op.next()? {
            out.push(row);
        }
        Ok(out)
    }

    /// Project+filter table that enforces nothing and records each request
    struct Lazy {
        columns: Vec<ColumnInfo>,
        rows: Vec<Row>,
        requests: RefCell<Vec<Vec<usize>>>,
    }

    impl Table for Lazy {
        fn name(&self) -> &str {
            "lazy"
        }
        fn columns(&self) -> &[ColumnInfo] {
            &self.columns
        }
        fn as_project_filterable(&self) -> Option<&dyn ProjectableFilterableTable> {
            Some(self)
        }
        fn as_scannable(&self) -> Option<&dyn crate::table::ScannableTable> {
            panic!("lower tiers must not be consulted")
        }
    }

    impl ProjectableFilterableTable for Lazy {
        fn scan(
            &self,
            _context: &DataContext,
            _filters: &mut Vec<Expression>,
            projects: &[usize],
        ) -> Result<RowStream> {
            self.requests.borrow_mut().push(projects.to_vec());
            let rows: Vec<Row> = self.rows.iter().map(|r| r.project(projects)).collect();
            Ok(Box::new(rows.into_iter().map(Ok)))
        }
    }

    #[test]
    fn test_projection_widens_for_rejected_filter() -> Result<()> {
        let table = Arc::new(Lazy {
            columns: columns(),
            rows: rows(),
            requests: RefCell::new(Vec::new()),
        });
        let filter = Expression::gt(Expression::column(2), Expression::literal(15));
        let mut op = open(table.clone(), vec![filter], Some(vec![1, 0]))?;

        assert_eq!(op.tier(), ScanTier::ProjectFilter);
        assert_eq!(op.requested_projection(), Some(&[1, 0, 2][..]));
        assert_eq!(op.negotiation_rounds(), 2);
        assert_eq!(*table.requests.borrow(), vec![vec![1, 0], vec![1, 0, 2]]);

        let out = drain(&mut op)?;
        assert_eq!(
            out,
            vec![
                Row::of(vec![Value::from("b"), Value::Int32(2)]),
                Row::of(vec![Value::from("c"), Value::Int32(3)]),
            ]
        );
        Ok(())
    }

    /// Filterable table that claims it could not apply a filter it never got
    struct Liar;

    impl Table for Liar {
        fn name(&self) -> &str {
            "liar"
        }
        fn columns(&self) -> &[ColumnInfo] {
            &[]
        }
        fn as_filterable(&self) -> Option<&dyn FilterableTable> {
            Some(self)
        }
    }

    impl FilterableTable for Liar {
        fn scan(&self, _context: &DataContext, filters: &mut Vec<Expression>) -> Result<RowStream> {
            filters.push(Expression::literal(false));
            Ok(Box::new(std::iter::empty()))
        }
    }

    #[test]
    fn test_invented_filter_is_rejected() {
        let err = open(Arc::new(Liar), vec![], None).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ExecutionError>(),
            Some(ExecutionError::InventedFilter { .. })
        ));
    }

    #[test]
    fn test_scan_only_applies_filter_and_projection() -> Result<()> {
        let table = Arc::new(MemoryTable::new("m", columns(), rows()));
        let filter = Expression::gt(Expression::column(0), Expression::literal(1));
        let mut op = open(table, vec![filter], Some(vec![2]))?;

        assert_eq!(op.tier(), ScanTier::Scan);
        assert_eq!(
            drain(&mut op)?,
            vec![Row::of(vec![Value::Int32(20)]), Row::of(vec![Value::Int32(30)])]
        );

        op.rewind()?;
        assert_eq!(drain(&mut op)?.len(), 2);
        op.close()?;
        assert_eq!(op.next()?, None);
        Ok(())
    }

    #[test]
    fn test_object_tier_builds_rows_from_accessors() -> Result<()> {
        let table = Arc::new(ObjectTable::new(
            "pairs",
            vec![
                FieldAccessor::new("k", DataType::Int32, |p: &(i32, &'static str)| p.0.into()),
                FieldAccessor::new("v", DataType::Varchar, |p: &(i32, &'static str)| p.1.into()),
            ],
            vec![(1, "x"), (2, "y")],
        ));
        let filter = Expression::eq(Expression::column(1), Expression::literal("y"));
        let mut op = open(table, vec![filter], None)?;

        assert_eq!(op.tier(), ScanTier::Objects);
        assert_eq!(
            drain(&mut op)?,
            vec![Row::of(vec![Value::Int32(2), Value::from("y")])]
        );
        Ok(())
    }

    #[test]
    fn test_filter_column_out_of_range() {
        let table = Arc::new(MemoryTable::new("m", columns(), rows()));
        let filter = Expression::is_null(Expression::column(7));
        let err = open(table, vec![filter], None).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ExecutionError>(),
            Some(ExecutionError::FilterColumnOutOfRange { column: 7, field_count: 3, .. })
        ));
    }
}
