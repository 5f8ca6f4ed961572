//! Scan pushdown rewrite.
//!
//! Folds a `Filter` sitting directly on a `Scan` into the scan's candidate
//! filters, and a `Project` of plain column references sitting directly on
//! a `Scan` into the scan's candidate projection. Nothing is decided about
//! access paths; the table scan still negotiates what the table accepts.

use crate::algebra::AlgNode;
use crate::expression::Expression;
use std::collections::BTreeSet;

/// Rewrite `node` bottom-up.
pub fn push_down(node: AlgNode) -> AlgNode {
    match node {
        AlgNode::Filter { input, condition } => match push_down(*input) {
            AlgNode::Scan {
                table,
                mut filters,
                projects,
            } if within_scan_output(&condition, projects.as_deref()) => {
                // The condition sees the scan's output; filters see table columns
                let to_table = |c: usize| match &projects {
                    Some(p) => p[c],
                    None => c,
                };
                filters.extend(
                    condition
                        .split_conjunction()
                        .into_iter()
                        .map(|f| f.remap_columns(&to_table)),
                );
                AlgNode::Scan {
                    table,
                    filters,
                    projects,
                }
            }
            input => AlgNode::Filter {
                input: Box::new(input),
                condition,
            },
        },

        AlgNode::Project {
            input,
            exprs,
            columns,
        } => match push_down(*input) {
            AlgNode::Scan {
                table,
                filters,
                projects,
            } if merges_into_scan(&exprs, &columns, &table.columns, projects.as_deref()) => {
                let projects = exprs
                    .iter()
                    .filter_map(column_index)
                    .map(|c| projects.as_ref().map_or(c, |p| p[c]))
                    .collect();
                AlgNode::Scan {
                    table,
                    filters,
                    projects: Some(projects),
                }
            }
            input => AlgNode::Project {
                input: Box::new(input),
                exprs,
                columns,
            },
        },

        AlgNode::Sort {
            input,
            collation,
            offset,
            fetch,
        } => AlgNode::Sort {
            input: Box::new(push_down(*input)),
            collation,
            offset,
            fetch,
        },
        AlgNode::SetOp { kind, all, inputs } => AlgNode::SetOp {
            kind,
            all,
            inputs: inputs.into_iter().map(push_down).collect(),
        },
        AlgNode::Join {
            left,
            right,
            join_type,
            condition,
        } => AlgNode::Join {
            left: Box::new(push_down(*left)),
            right: Box::new(push_down(*right)),
            join_type,
            condition,
        },
        AlgNode::Window {
            input,
            partition_by,
            order_by,
            calls,
        } => AlgNode::Window {
            input: Box::new(push_down(*input)),
            partition_by,
            order_by,
            calls,
        },
        AlgNode::Aggregate {
            input,
            group_by,
            calls,
        } => AlgNode::Aggregate {
            input: Box::new(push_down(*input)),
            group_by,
            calls,
        },
        leaf @ (AlgNode::Scan { .. } | AlgNode::Values { .. } | AlgNode::Extension(_)) => leaf,
    }
}

fn column_index(expr: &Expression) -> Option<usize> {
    match expr {
        Expression::ColumnRef(col) => Some(col.index),
        _ => None,
    }
}

/// A condition folds into a scan only if every column it reads is one the
/// scan outputs. Anything else is left for the scalar compiler to reject.
fn within_scan_output(condition: &Expression, projects: Option<&[usize]>) -> bool {
    let Some(p) = projects else {
        return true;
    };
    let mut used = BTreeSet::new();
    condition.referenced_columns(&mut used);
    used.iter().all(|&c| c < p.len())
}

/// A projection folds into a scan when every item is a column reference
/// that keeps the table column's name.
fn merges_into_scan(
    exprs: &[Expression],
    columns: &[crate::access::ColumnInfo],
    table_columns: &[crate::access::ColumnInfo],
    projects: Option<&[usize]>,
) -> bool {
    if exprs.len() != columns.len() {
        return false;
    }
    exprs.iter().zip(columns).all(|(expr, column)| {
        let Some(c) = column_index(expr) else {
            return false;
        };
        let table_column = match projects {
            Some(p) => p.get(c).copied(),
            None => Some(c),
        };
        table_column
            .and_then(|t| table_columns.get(t))
            .map_or(false, |t| t.name == column.name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ColumnInfo, DataType};
    use crate::algebra::{SortKey, TableRef};

    fn table() -> TableRef {
        TableRef::new(
            "t",
            vec![
                ColumnInfo::new("id", DataType::Int32),
                ColumnInfo::new("name", DataType::Varchar),
                ColumnInfo::new("age", DataType::Int32),
            ],
        )
    }

    #[test]
    fn test_filter_and_project_fold_into_scan() {
        let plan = AlgNode::sort(
            AlgNode::filter(
                AlgNode::project(
                    AlgNode::scan(table()),
                    vec![(Expression::column(2), "age"), (Expression::column(0), "id")],
                ),
                Expression::and(
                    Expression::gt(Expression::column(0), Expression::literal(18)),
                    Expression::is_not_null(Expression::column(1)),
                ),
            ),
            vec![SortKey::asc(0)],
        );

        let AlgNode::Sort { input, .. } = push_down(plan) else {
            panic!("sort must stay on top");
        };
        let AlgNode::Scan {
            filters, projects, ..
        } = *input
        else {
            panic!("filter and project should have folded into the scan");
        };
        assert_eq!(projects, Some(vec![2, 0]));
        assert_eq!(
            filters,
            vec![
                Expression::gt(Expression::column(2), Expression::literal(18)),
                Expression::is_not_null(Expression::column(0)),
            ]
        );
    }

    #[test]
    fn test_computed_projection_stays() {
        let plan = AlgNode::project(
            AlgNode::scan(table()),
            vec![(
                Expression::add_expr(Expression::column(2), Expression::literal(1)),
                "next",
            )],
        );
        assert!(matches!(push_down(plan), AlgNode::Project { .. }));
    }

    #[test]
    fn test_filter_past_projected_width_stays() {
        let plan = AlgNode::filter(
            AlgNode::project(AlgNode::scan(table()), vec![(Expression::column(0), "id")]),
            Expression::gt(Expression::column(1), Expression::literal(5)),
        );
        let AlgNode::Filter { input, .. } = push_down(plan) else {
            panic!("filter on a column the scan does not output must stay");
        };
        assert!(matches!(
            *input,
            AlgNode::Scan {
                projects: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_project_with_more_items_than_columns_stays() {
        let plan = AlgNode::Project {
            input: Box::new(AlgNode::scan(table())),
            exprs: vec![Expression::column(0), Expression::column(7)],
            columns: vec![ColumnInfo::new("id", DataType::Int32)],
        };
        assert!(matches!(push_down(plan), AlgNode::Project { .. }));
    }

    #[test]
    fn test_renamed_column_stays() {
        let plan = AlgNode::project(AlgNode::scan(table()), vec![(Expression::column(0), "key")]);
        assert!(matches!(push_down(plan), AlgNode::Project { .. }));
    }
}
