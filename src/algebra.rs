//! Relational algebra tree consumed by the interpreter.
//!
//! The tree arrives already optimized with resolved types. Every node knows
//! its dispatch key ([`AlgKind`]), its inputs and its output row shape.

use crate::access::{ColumnInfo, DataType, Value};
use crate::expression::Expression;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Dispatch key of an algebra node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgKind {
    Scan,
    Filter,
    Project,
    Values,
    Sort,
    Union,
    Intersect,
    Minus,
    Join,
    Window,
    Aggregate,
    /// Node kinds contributed from outside the crate
    Extension(&'static str),
}

impl fmt::Display for AlgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgKind::Extension(name) => write!(f, "{}", name),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Table metadata carried by a scan node
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableRef {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrder {
    First,
    Last,
}

/// One key of a collation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: usize,
    pub direction: SortDirection,
    pub nulls: NullOrder,
}

impl SortKey {
    /// Ascending, NULLs last
    pub fn asc(column: usize) -> Self {
        Self {
            column,
            direction: SortDirection::Ascending,
            nulls: NullOrder::Last,
        }
    }

    /// Descending, NULLs first
    pub fn desc(column: usize) -> Self {
        Self {
            column,
            direction: SortDirection::Descending,
            nulls: NullOrder::First,
        }
    }

    pub fn nulls(mut self, nulls: NullOrder) -> Self {
        self.nulls = nulls;
        self
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${} {} NULLS {}",
            self.column,
            match self.direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            },
            match self.nulls {
                NullOrder::First => "FIRST",
                NullOrder::Last => "LAST",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    /// Left rows with at least one match, left columns only
    Semi,
    /// Left rows with no match, left columns only
    Anti,
}

impl JoinType {
    /// Whether the output carries the right input's columns
    pub fn projects_right(&self) -> bool {
        !matches!(self, JoinType::Semi | JoinType::Anti)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    Intersect,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

/// An aggregate call over input column indices. `COUNT` with no arguments
/// counts rows.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub function: AggregateFunction,
    pub args: Vec<usize>,
    pub distinct: bool,
    pub name: String,
}

impl AggregateCall {
    pub fn new(function: AggregateFunction, args: Vec<usize>, name: impl Into<String>) -> Self {
        Self {
            function,
            args,
            distinct: false,
            name: name.into(),
        }
    }

    pub fn count_star(name: impl Into<String>) -> Self {
        Self::new(AggregateFunction::Count, vec![], name)
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn output_type(&self, input: &[ColumnInfo]) -> DataType {
        let arg_type = self
            .args
            .first()
            .and_then(|&i| input.get(i))
            .map(|c| c.data_type);
        match self.function {
            AggregateFunction::Count => DataType::Int64,
            AggregateFunction::Avg => DataType::Float64,
            AggregateFunction::Sum => match arg_type {
                Some(DataType::Float64) => DataType::Float64,
                _ => DataType::Int64,
            },
            AggregateFunction::Min | AggregateFunction::Max => {
                arg_type.unwrap_or(DataType::Int64)
            }
        }
    }
}

impl fmt::Display for AggregateCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = if self.args.is_empty() {
            "*".to_string()
        } else {
            self.args
                .iter()
                .map(|a| format!("${}", a))
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(
            f,
            "{:?}({}{}) AS {}",
            self.function,
            if self.distinct { "DISTINCT " } else { "" },
            args,
            self.name
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFunction {
    RowNumber,
    Rank,
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

/// Which rows of the partition a window aggregate sees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFrame {
    /// Every row of the partition
    Partition,
    /// From the partition start to the current row (and its peers)
    Running,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowCall {
    pub function: WindowFunction,
    pub arg: Option<usize>,
    pub frame: WindowFrame,
    pub name: String,
}

impl WindowCall {
    pub fn new(
        function: WindowFunction,
        arg: Option<usize>,
        frame: WindowFrame,
        name: impl Into<String>,
    ) -> Self {
        Self {
            function,
            arg,
            frame,
            name: name.into(),
        }
    }

    pub fn output_type(&self, input: &[ColumnInfo]) -> DataType {
        let arg_type = self.arg.and_then(|i| input.get(i)).map(|c| c.data_type);
        match self.function {
            WindowFunction::RowNumber | WindowFunction::Rank | WindowFunction::Count => {
                DataType::Int64
            }
            WindowFunction::Avg => DataType::Float64,
            WindowFunction::Sum => match arg_type {
                Some(DataType::Float64) => DataType::Float64,
                _ => DataType::Int64,
            },
            WindowFunction::Min | WindowFunction::Max => arg_type.unwrap_or(DataType::Int64),
        }
    }
}

/// A node kind defined outside this crate. Its operator is supplied by
/// registering a factory for `AlgKind::Extension(kind_name)`.
pub trait ExtensionNode: fmt::Debug {
    fn kind_name(&self) -> &'static str;

    fn inputs(&self) -> Vec<&AlgNode>;

    fn schema(&self) -> Vec<ColumnInfo>;

    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone)]
pub enum AlgNode {
    /// Table scan with candidate filters (over the table's columns) and an
    /// optional candidate projection
    Scan {
        table: TableRef,
        filters: Vec<Expression>,
        projects: Option<Vec<usize>>,
    },

    Filter {
        input: Box<AlgNode>,
        condition: Expression,
    },

    Project {
        input: Box<AlgNode>,
        exprs: Vec<Expression>,
        columns: Vec<ColumnInfo>,
    },

    Values {
        columns: Vec<ColumnInfo>,
        tuples: Vec<Vec<Value>>,
    },

    Sort {
        input: Box<AlgNode>,
        collation: Vec<SortKey>,
        offset: Option<usize>,
        fetch: Option<usize>,
    },

    SetOp {
        kind: SetOpKind,
        all: bool,
        inputs: Vec<AlgNode>,
    },

    Join {
        left: Box<AlgNode>,
        right: Box<AlgNode>,
        join_type: JoinType,
        /// Evaluated over left columns followed by right columns
        condition: Expression,
    },

    Window {
        input: Box<AlgNode>,
        partition_by: Vec<usize>,
        order_by: Vec<SortKey>,
        calls: Vec<WindowCall>,
    },

    Aggregate {
        input: Box<AlgNode>,
        group_by: Vec<usize>,
        calls: Vec<AggregateCall>,
    },

    Extension(Arc<dyn ExtensionNode>),
}

impl AlgNode {
    pub fn scan(table: TableRef) -> Self {
        AlgNode::Scan {
            table,
            filters: Vec::new(),
            projects: None,
        }
    }

    pub fn filter(input: AlgNode, condition: Expression) -> Self {
        AlgNode::Filter {
            input: Box::new(input),
            condition,
        }
    }

    /// Project with output names; types are inferred from the input shape.
    pub fn project(input: AlgNode, exprs: Vec<(Expression, &str)>) -> Self {
        let input_types: Vec<DataType> = input.schema().iter().map(|c| c.data_type).collect();
        let columns = exprs
            .iter()
            .map(|(expr, name)| {
                ColumnInfo::new(
                    *name,
                    expr.output_type(&input_types).unwrap_or(DataType::Varchar),
                )
            })
            .collect();
        AlgNode::Project {
            input: Box::new(input),
            exprs: exprs.into_iter().map(|(expr, _)| expr).collect(),
            columns,
        }
    }

    pub fn values(columns: Vec<ColumnInfo>, tuples: Vec<Vec<Value>>) -> Self {
        AlgNode::Values { columns, tuples }
    }

    pub fn sort(input: AlgNode, collation: Vec<SortKey>) -> Self {
        AlgNode::Sort {
            input: Box::new(input),
            collation,
            offset: None,
            fetch: None,
        }
    }

    pub fn limit(input: AlgNode, offset: Option<usize>, fetch: Option<usize>) -> Self {
        AlgNode::Sort {
            input: Box::new(input),
            collation: Vec::new(),
            offset,
            fetch,
        }
    }

    pub fn set_op(kind: SetOpKind, all: bool, inputs: Vec<AlgNode>) -> Self {
        AlgNode::SetOp { kind, all, inputs }
    }

    pub fn join(left: AlgNode, right: AlgNode, join_type: JoinType, condition: Expression) -> Self {
        AlgNode::Join {
            left: Box::new(left),
            right: Box::new(right),
            join_type,
            condition,
        }
    }

    pub fn aggregate(input: AlgNode, group_by: Vec<usize>, calls: Vec<AggregateCall>) -> Self {
        AlgNode::Aggregate {
            input: Box::new(input),
            group_by,
            calls,
        }
    }

    pub fn window(
        input: AlgNode,
        partition_by: Vec<usize>,
        order_by: Vec<SortKey>,
        calls: Vec<WindowCall>,
    ) -> Self {
        AlgNode::Window {
            input: Box::new(input),
            partition_by,
            order_by,
            calls,
        }
    }

    pub fn kind(&self) -> AlgKind {
        match self {
            AlgNode::Scan { .. } => AlgKind::Scan,
            AlgNode::Filter { .. } => AlgKind::Filter,
            AlgNode::Project { .. } => AlgKind::Project,
            AlgNode::Values { .. } => AlgKind::Values,
            AlgNode::Sort { .. } => AlgKind::Sort,
            AlgNode::SetOp { kind, .. } => match kind {
                SetOpKind::Union => AlgKind::Union,
                SetOpKind::Intersect => AlgKind::Intersect,
                SetOpKind::Minus => AlgKind::Minus,
            },
            AlgNode::Join { .. } => AlgKind::Join,
            AlgNode::Window { .. } => AlgKind::Window,
            AlgNode::Aggregate { .. } => AlgKind::Aggregate,
            AlgNode::Extension(node) => AlgKind::Extension(node.kind_name()),
        }
    }

    pub fn inputs(&self) -> Vec<&AlgNode> {
        match self {
            AlgNode::Scan { .. } | AlgNode::Values { .. } => Vec::new(),
            AlgNode::Filter { input, .. }
            | AlgNode::Project { input, .. }
            | AlgNode::Sort { input, .. }
            | AlgNode::Window { input, .. }
            | AlgNode::Aggregate { input, .. } => vec![input.as_ref()],
            AlgNode::SetOp { inputs, .. } => inputs.iter().collect(),
            AlgNode::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            AlgNode::Extension(node) => node.inputs(),
        }
    }

    /// Output row shape
    pub fn schema(&self) -> Vec<ColumnInfo> {
        match self {
            AlgNode::Scan {
                table, projects, ..
            } => match projects {
                Some(projects) => projects
                    .iter()
                    .filter_map(|&i| table.columns.get(i).cloned())
                    .collect(),
                None => table.columns.clone(),
            },
            AlgNode::Filter { input, .. } | AlgNode::Sort { input, .. } => input.schema(),
            AlgNode::Project { columns, .. } | AlgNode::Values { columns, .. } => columns.clone(),
            AlgNode::SetOp { inputs, .. } => {
                inputs.first().map(AlgNode::schema).unwrap_or_default()
            }
            AlgNode::Join {
                left,
                right,
                join_type,
                ..
            } => {
                let mut columns = left.schema();
                if join_type.projects_right() {
                    columns.extend(right.schema());
                }
                columns
            }
            AlgNode::Window { input, calls, .. } => {
                let mut columns = input.schema();
                let extra: Vec<ColumnInfo> = calls
                    .iter()
                    .map(|c| ColumnInfo::new(c.name.clone(), c.output_type(&columns)))
                    .collect();
                columns.extend(extra);
                columns
            }
            AlgNode::Aggregate {
                input,
                group_by,
                calls,
            } => {
                let input_columns = input.schema();
                let mut columns: Vec<ColumnInfo> = group_by
                    .iter()
                    .filter_map(|&i| input_columns.get(i).cloned())
                    .collect();
                columns.extend(
                    calls
                        .iter()
                        .map(|c| ColumnInfo::new(c.name.clone(), c.output_type(&input_columns))),
                );
                columns
            }
            AlgNode::Extension(node) => node.schema(),
        }
    }

    /// Indented, one-node-per-line rendering of the tree
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(0, &mut out);
        out
    }

    fn explain_into(&self, indent_level: usize, out: &mut String) {
        let indent = "  ".repeat(indent_level);
        let line = match self {
            AlgNode::Scan {
                table,
                filters,
                projects,
            } => {
                let mut line = format!("Scan: {}", table.name);
                if !filters.is_empty() {
                    line.push_str(&format!(" filters=[{}]", join_display(filters)));
                }
                if let Some(projects) = projects {
                    line.push_str(&format!(" projects={:?}", projects));
                }
                line
            }
            AlgNode::Filter { condition, .. } => format!("Filter: {}", condition),
            AlgNode::Project { exprs, columns, .. } => {
                let items = exprs
                    .iter()
                    .zip(columns)
                    .map(|(e, c)| format!("{} AS {}", e, c.name))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Project: {}", items)
            }
            AlgNode::Values { tuples, .. } => format!("Values: {} rows", tuples.len()),
            AlgNode::Sort {
                collation,
                offset,
                fetch,
                ..
            } => {
                let mut line = format!("Sort: [{}]", join_display(collation));
                if let Some(offset) = offset {
                    line.push_str(&format!(" offset={}", offset));
                }
                if let Some(fetch) = fetch {
                    line.push_str(&format!(" fetch={}", fetch));
                }
                line
            }
            AlgNode::SetOp { kind, all, .. } => {
                format!("{:?}{}", kind, if *all { " ALL" } else { "" })
            }
            AlgNode::Join {
                join_type,
                condition,
                ..
            } => format!("Join: {:?} ON {}", join_type, condition),
            AlgNode::Window {
                partition_by,
                order_by,
                calls,
                ..
            } => format!(
                "Window: partition={:?} order=[{}] calls=[{}]",
                partition_by,
                join_display(order_by),
                calls
                    .iter()
                    .map(|c| format!("{:?} AS {}", c.function, c.name))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            AlgNode::Aggregate {
                group_by, calls, ..
            } => format!(
                "Aggregate: group={:?} calls=[{}]",
                group_by,
                join_display(calls)
            ),
            AlgNode::Extension(node) => format!("{}: {:?}", node.kind_name(), node),
        };
        out.push_str(&indent);
        out.push_str(&line);
        out.push('\n');
        for input in self.inputs() {
            input.explain_into(indent_level + 1, out);
        }
    }
}

fn join_display<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> TableRef {
        TableRef::new(
            "people",
            vec![
                ColumnInfo::new("id", DataType::Int32),
                ColumnInfo::new("name", DataType::Varchar),
                ColumnInfo::new("age", DataType::Int32),
            ],
        )
    }

    #[test]
    fn test_schema_follows_operators() {
        let scan = AlgNode::Scan {
            table: people(),
            filters: vec![],
            projects: Some(vec![2, 0]),
        };
        let names: Vec<String> = scan.schema().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["age", "id"]);

        let agg = AlgNode::aggregate(
            AlgNode::scan(people()),
            vec![1],
            vec![
                AggregateCall::count_star("n"),
                AggregateCall::new(AggregateFunction::Avg, vec![2], "avg_age"),
            ],
        );
        let schema = agg.schema();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema[1].data_type, DataType::Int64);
        assert_eq!(schema[2].data_type, DataType::Float64);

        let semi = AlgNode::join(
            AlgNode::scan(people()),
            AlgNode::scan(people()),
            JoinType::Semi,
            Expression::literal(true),
        );
        assert_eq!(semi.schema().len(), 3);
        assert_eq!(semi.kind(), AlgKind::Join);
    }

    #[test]
    fn test_project_infers_types() {
        let project = AlgNode::project(
            AlgNode::scan(people()),
            vec![
                (Expression::column(1), "name"),
                (
                    Expression::add_expr(Expression::column(2), Expression::literal(1i64)),
                    "next_age",
                ),
            ],
        );
        let schema = project.schema();
        assert_eq!(schema[0].data_type, DataType::Varchar);
        assert_eq!(schema[1].data_type, DataType::Int64);
    }

    #[test]
    fn test_explain_indents_children() {
        let plan = AlgNode::sort(
            AlgNode::filter(
                AlgNode::scan(people()),
                Expression::gt(Expression::column(0), Expression::literal(1)),
            ),
            vec![SortKey::desc(0)],
        );
        assert_eq!(
            plan.explain(),
            "Sort: [$0 DESC NULLS FIRST]\n  Filter: ($0 > 1)\n    Scan: people\n"
        );
    }
}
