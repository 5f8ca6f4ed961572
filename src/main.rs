//! rowpull demo - runs a small query against a table exposing one capability tier

use anyhow::Result;
use clap::{Parser as ClapParser, ValueEnum};
use log::info;
use rowpull::algebra::{SortKey, TableRef};
use rowpull::expression::{BinaryOperator, Expression};
use rowpull::table::{
    FieldAccessor, FilterableTable, ObjectTable, ProjectableFilterableTable, RowSequenceTable,
    RowStream, ScannableTable,
};
use rowpull::{
    AlgNode, ColumnInfo, DataContext, DataType, Interpreter, InterpreterConfig, Row, Schema,
    Table, Value,
};
use std::sync::Arc;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Tier {
    ProjectFilter,
    Filter,
    Scan,
    Rows,
    Objects,
}

/// Run `SELECT id, name FROM items WHERE id > THRESHOLD ORDER BY id DESC`
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of rows in the demo table
    #[arg(short, long, default_value = "10")]
    rows: i32,

    /// Capability tier the demo table exposes
    #[arg(short, long, value_enum, default_value = "project-filter")]
    tier: Tier,

    /// Lower bound (exclusive) on id
    #[arg(short = 'w', long, default_value = "5")]
    threshold: i32,

    /// Enable debug logging and scalar listings
    #[arg(short, long)]
    debug: bool,
}

struct Item {
    id: i32,
    name: String,
    score: i32,
}

fn items(count: i32) -> Vec<Item> {
    (1..=count)
        .map(|id| Item {
            id,
            name: format!("item-{}", id),
            score: (id * 37) % 100,
        })
        .collect()
}

fn columns() -> Vec<ColumnInfo> {
    vec![
        ColumnInfo::new("id", DataType::Int32),
        ColumnInfo::new("name", DataType::Varchar),
        ColumnInfo::new("score", DataType::Int32),
    ]
}

/// A table that exposes exactly one of the row-producing tiers.
struct DemoTable {
    tier: Tier,
    columns: Vec<ColumnInfo>,
    rows: Arc<Vec<Row>>,
}

impl DemoTable {
    fn new(tier: Tier, items: &[Item]) -> Self {
        let rows = items
            .iter()
            .map(|item| {
                Row::of(vec![
                    Value::Int32(item.id),
                    Value::String(item.name.clone()),
                    Value::Int32(item.score),
                ])
            })
            .collect();
        Self {
            tier,
            columns: columns(),
            rows: Arc::new(rows),
        }
    }

    /// Remove the filters of the form `$c > <integer>` and return them.
    fn take_lower_bounds(filters: &mut Vec<Expression>) -> Vec<(usize, i64)> {
        let mut bounds = Vec::new();
        filters.retain(|filter| match lower_bound(filter) {
            Some(bound) => {
                bounds.push(bound);
                false
            }
            None => true,
        });
        bounds
    }

    fn stream(&self, bounds: Vec<(usize, i64)>, projects: Option<Vec<usize>>) -> RowStream {
        let rows = Arc::clone(&self.rows);
        Box::new(
            (0..rows.len())
                .filter(move |&i| {
                    bounds.iter().all(|&(c, bound)| {
                        rows[i].get(c).and_then(Value::as_i64).map_or(false, |v| v > bound)
                    })
                })
                .map({
                    let rows = Arc::clone(&self.rows);
                    move |i| {
                        Ok(match &projects {
                            Some(p) => rows[i].project(p),
                            None => rows[i].clone(),
                        })
                    }
                }),
        )
    }
}

fn lower_bound(filter: &Expression) -> Option<(usize, i64)> {
    match filter {
        Expression::BinaryOp {
            op: BinaryOperator::Gt,
            left,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (Expression::ColumnRef(col), Expression::Literal(lit)) => {
                lit.value.as_i64().map(|v| (col.index, v))
            }
            _ => None,
        },
        _ => None,
    }
}

impl Table for DemoTable {
    fn name(&self) -> &str {
        "items"
    }

    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn as_project_filterable(&self) -> Option<&dyn ProjectableFilterableTable> {
        if matches!(self.tier, Tier::ProjectFilter) {
            Some(self)
        } else {
            None
        }
    }

    fn as_filterable(&self) -> Option<&dyn FilterableTable> {
        if matches!(self.tier, Tier::Filter) {
            Some(self)
        } else {
            None
        }
    }

    fn as_scannable(&self) -> Option<&dyn ScannableTable> {
        if matches!(self.tier, Tier::Scan) {
            Some(self)
        } else {
            None
        }
    }

    fn as_row_sequence(&self) -> Option<&dyn RowSequenceTable> {
        if matches!(self.tier, Tier::Rows) {
            Some(self)
        } else {
            None
        }
    }
}

impl ProjectableFilterableTable for DemoTable {
    fn scan(
        &self,
        _context: &DataContext,
        filters: &mut Vec<Expression>,
        projects: &[usize],
    ) -> Result<RowStream> {
        let bounds = Self::take_lower_bounds(filters);
        info!(
            "items: accepted {} filter(s), projecting {:?}",
            bounds.len(),
            projects
        );
        Ok(self.stream(bounds, Some(projects.to_vec())))
    }
}

impl FilterableTable for DemoTable {
    fn scan(&self, _context: &DataContext, filters: &mut Vec<Expression>) -> Result<RowStream> {
        let bounds = Self::take_lower_bounds(filters);
        info!("items: accepted {} filter(s)", bounds.len());
        Ok(self.stream(bounds, None))
    }
}

impl ScannableTable for DemoTable {
    fn scan(&self, _context: &DataContext) -> Result<RowStream> {
        Ok(self.stream(Vec::new(), None))
    }
}

impl RowSequenceTable for DemoTable {
    fn rows(&self) -> Result<RowStream> {
        Ok(self.stream(Vec::new(), None))
    }
}

fn object_table(items: Vec<Item>) -> ObjectTable<Item> {
    ObjectTable::new(
        "items",
        vec![
            FieldAccessor::new("id", DataType::Int32, |i: &Item| Value::Int32(i.id)),
            FieldAccessor::new("name", DataType::Varchar, |i: &Item| {
                Value::String(i.name.clone())
            }),
            FieldAccessor::new("score", DataType::Int32, |i: &Item| Value::Int32(i.score)),
        ],
        items,
    )
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let data = items(args.rows);
    let table: Arc<dyn Table> = match args.tier {
        Tier::Objects => Arc::new(object_table(data)),
        tier => Arc::new(DemoTable::new(tier, &data)),
    };
    let data_context = Arc::new(DataContext::new(Schema::new().with_table(table)));

    let plan = AlgNode::sort(
        AlgNode::project(
            AlgNode::filter(
                AlgNode::scan(TableRef::new("items", columns())),
                Expression::gt(Expression::column(0), Expression::literal(args.threshold)),
            ),
            vec![(Expression::column(0), "id"), (Expression::column(1), "name")],
        ),
        vec![SortKey::desc(0)],
    );
    println!("{}", plan.explain());

    let config = InterpreterConfig {
        debug: args.debug,
        ..InterpreterConfig::default()
    };
    let interpreter = Interpreter::with_config(&plan, data_context, config)?;
    let header: Vec<&str> = interpreter
        .output_schema()
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    println!("{}", header.join(" | "));

    let mut count = 0;
    for row in interpreter {
        let row = row?;
        let cells: Vec<String> = row.iter().map(Value::to_string).collect();
        println!("{}", cells.join(" | "));
        count += 1;
    }
    println!("({} rows)", count);
    Ok(())
}
