//! Algebra tree to operator graph translation.
//!
//! Translation is table driven: an [`OperatorRegistry`] maps each
//! [`AlgKind`] to a factory receiving the node and its already compiled
//! children. Supporting a new node kind means registering one more factory.

use crate::access::ColumnInfo;
use crate::algebra::{AlgKind, AlgNode};
use crate::catalog::DataContext;
use crate::error::ExecutionError;
use crate::expression::{Expression, Scalar, ScalarCompiler};
use crate::interpreter::InterpreterConfig;
use crate::operator::{
    AggregateOperator, FilterOperator, NestedLoopJoinOperator, Operator, ProjectOperator,
    SetOpOperator, SortOperator, TableScanOperator, ValuesOperator, WindowOperator,
};
use anyhow::Result;
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// State threaded through one tree walk
pub struct CompileContext {
    data_context: Arc<DataContext>,
    scalars: Rc<ScalarCompiler>,
    config: InterpreterConfig,
}

impl CompileContext {
    pub fn new(
        data_context: Arc<DataContext>,
        scalars: ScalarCompiler,
        config: InterpreterConfig,
    ) -> Self {
        Self {
            data_context,
            scalars: Rc::new(scalars),
            config,
        }
    }

    pub fn data_context(&self) -> &Arc<DataContext> {
        &self.data_context
    }

    pub fn scalar_compiler(&self) -> &Rc<ScalarCompiler> {
        &self.scalars
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Compile expressions evaluated against rows shaped like `input`.
    pub fn compile_scalar(
        &self,
        expressions: &[Expression],
        input: &[ColumnInfo],
    ) -> Result<Box<dyn Scalar>> {
        Ok(self.scalars.compile(expressions, input)?)
    }
}

/// Builds the operator for one node from its compiled children
pub type OperatorFactory =
    fn(&CompileContext, &AlgNode, Vec<Box<dyn Operator>>) -> Result<Box<dyn Operator>>;

#[derive(Clone)]
pub struct OperatorRegistry {
    factories: HashMap<AlgKind, OperatorFactory>,
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::core()
    }
}

impl OperatorRegistry {
    /// A registry with no entries
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Factories for every built-in node kind
    pub fn core() -> Self {
        let mut registry = Self::empty();
        registry.register(AlgKind::Scan, scan);
        registry.register(AlgKind::Filter, filter);
        registry.register(AlgKind::Project, project);
        registry.register(AlgKind::Values, values);
        registry.register(AlgKind::Sort, sort);
        registry.register(AlgKind::Union, set_op);
        registry.register(AlgKind::Intersect, set_op);
        registry.register(AlgKind::Minus, set_op);
        registry.register(AlgKind::Join, join);
        registry.register(AlgKind::Window, window);
        registry.register(AlgKind::Aggregate, aggregate);
        registry
    }

    /// Add or replace the factory for `kind`.
    pub fn register(&mut self, kind: AlgKind, factory: OperatorFactory) -> Option<OperatorFactory> {
        self.factories.insert(kind, factory)
    }

    pub fn without(mut self, kind: AlgKind) -> Self {
        self.factories.remove(&kind);
        self
    }

    pub fn supports(&self, kind: AlgKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Compile `node` and its inputs, children first.
    pub fn compile(&self, node: &AlgNode, context: &CompileContext) -> Result<Box<dyn Operator>> {
        let kind = node.kind();
        let factory = *self
            .factories
            .get(&kind)
            .ok_or_else(|| ExecutionError::UnsupportedNode {
                kind: kind.to_string(),
            })?;

        let children = node
            .inputs()
            .into_iter()
            .map(|input| self.compile(input, context))
            .collect::<Result<Vec<_>>>()?;
        let operator = factory(context, node, children)?;
        debug!("compiled {} into {}", kind, operator.name());
        Ok(operator)
    }
}

fn mismatch(node: &AlgNode, expected: &str) -> anyhow::Error {
    ExecutionError::InvalidPlan {
        message: format!("{} factory received a {} node", expected, node.kind()),
    }
    .into()
}

fn single(mut children: Vec<Box<dyn Operator>>, node: &AlgNode) -> Result<Box<dyn Operator>> {
    match (children.pop(), children.is_empty()) {
        (Some(child), true) => Ok(child),
        _ => Err(ExecutionError::InvalidPlan {
            message: format!("{} expects exactly one input", node.kind()),
        }
        .into()),
    }
}

/// Reject column references a node makes past its input's width.
fn check_columns(
    node: &AlgNode,
    width: usize,
    columns: impl IntoIterator<Item = usize>,
) -> Result<()> {
    match columns.into_iter().find(|&i| i >= width) {
        Some(column) => Err(ExecutionError::InvalidPlan {
            message: format!("{} references column {} of {}", node.kind(), column, width),
        }
        .into()),
        None => Ok(()),
    }
}

fn scan(
    context: &CompileContext,
    node: &AlgNode,
    _children: Vec<Box<dyn Operator>>,
) -> Result<Box<dyn Operator>> {
    let AlgNode::Scan {
        table,
        filters,
        projects,
    } = node
    else {
        return Err(mismatch(node, "Scan"));
    };

    let resolved = context
        .data_context()
        .table(&table.name)
        .ok_or_else(|| ExecutionError::TableNotFound {
            name: table.name.clone(),
        })?;
    if resolved.column_count() != table.columns.len() {
        return Err(ExecutionError::InvalidPlan {
            message: format!(
                "scan of '{}' expects {} columns, table has {}",
                table.name,
                table.columns.len(),
                resolved.column_count()
            ),
        }
        .into());
    }

    Ok(Box::new(TableScanOperator::create(
        resolved,
        filters.clone(),
        projects.clone(),
        Arc::clone(context.data_context()),
        Rc::clone(context.scalar_compiler()),
        context.config().max_negotiation_rounds,
    )?))
}

fn filter(
    context: &CompileContext,
    node: &AlgNode,
    children: Vec<Box<dyn Operator>>,
) -> Result<Box<dyn Operator>> {
    let AlgNode::Filter { condition, .. } = node else {
        return Err(mismatch(node, "Filter"));
    };
    let child = single(children, node)?;
    let condition = context.compile_scalar(std::slice::from_ref(condition), child.output_schema())?;
    Ok(Box::new(FilterOperator::new(
        child,
        condition,
        Arc::clone(context.data_context()),
    )))
}

fn project(
    context: &CompileContext,
    node: &AlgNode,
    children: Vec<Box<dyn Operator>>,
) -> Result<Box<dyn Operator>> {
    let AlgNode::Project { exprs, columns, .. } = node else {
        return Err(mismatch(node, "Project"));
    };
    let child = single(children, node)?;
    let projection = context.compile_scalar(exprs, child.output_schema())?;
    Ok(Box::new(ProjectOperator::new(
        child,
        projection,
        columns.clone(),
        Arc::clone(context.data_context()),
    )))
}

fn values(
    _context: &CompileContext,
    node: &AlgNode,
    _children: Vec<Box<dyn Operator>>,
) -> Result<Box<dyn Operator>> {
    let AlgNode::Values { columns, tuples } = node else {
        return Err(mismatch(node, "Values"));
    };
    if let Some(bad) = tuples.iter().find(|t| t.len() != columns.len()) {
        return Err(ExecutionError::InvalidPlan {
            message: format!(
                "VALUES tuple of width {} in a {}-column relation",
                bad.len(),
                columns.len()
            ),
        }
        .into());
    }
    Ok(Box::new(ValuesOperator::new(columns.clone(), tuples.clone())))
}

fn sort(
    _context: &CompileContext,
    node: &AlgNode,
    children: Vec<Box<dyn Operator>>,
) -> Result<Box<dyn Operator>> {
    let AlgNode::Sort {
        collation,
        offset,
        fetch,
        ..
    } = node
    else {
        return Err(mismatch(node, "Sort"));
    };
    let child = single(children, node)?;
    check_columns(
        node,
        child.output_schema().len(),
        collation.iter().map(|k| k.column),
    )?;
    Ok(Box::new(SortOperator::new(
        child,
        collation.clone(),
        *offset,
        *fetch,
    )))
}

fn set_op(
    _context: &CompileContext,
    node: &AlgNode,
    children: Vec<Box<dyn Operator>>,
) -> Result<Box<dyn Operator>> {
    let AlgNode::SetOp { kind, all, .. } = node else {
        return Err(mismatch(node, "SetOp"));
    };
    if children.is_empty() {
        return Err(ExecutionError::InvalidPlan {
            message: format!("{} without inputs", node.kind()),
        }
        .into());
    }
    Ok(Box::new(SetOpOperator::new(*kind, *all, children)))
}

fn join(
    context: &CompileContext,
    node: &AlgNode,
    children: Vec<Box<dyn Operator>>,
) -> Result<Box<dyn Operator>> {
    let AlgNode::Join {
        join_type,
        condition,
        ..
    } = node
    else {
        return Err(mismatch(node, "Join"));
    };
    let [left, right]: [Box<dyn Operator>; 2] =
        children.try_into().map_err(|_| ExecutionError::InvalidPlan {
            message: "Join expects exactly two inputs".to_string(),
        })?;

    let mut combined = left.output_schema().to_vec();
    combined.extend_from_slice(right.output_schema());
    let condition = context.compile_scalar(std::slice::from_ref(condition), &combined)?;
    Ok(Box::new(NestedLoopJoinOperator::new(
        left,
        right,
        *join_type,
        condition,
        Arc::clone(context.data_context()),
    )))
}

fn window(
    _context: &CompileContext,
    node: &AlgNode,
    children: Vec<Box<dyn Operator>>,
) -> Result<Box<dyn Operator>> {
    let AlgNode::Window {
        partition_by,
        order_by,
        calls,
        ..
    } = node
    else {
        return Err(mismatch(node, "Window"));
    };
    let child = single(children, node)?;
    check_columns(
        node,
        child.output_schema().len(),
        partition_by
            .iter()
            .copied()
            .chain(order_by.iter().map(|k| k.column))
            .chain(calls.iter().filter_map(|c| c.arg)),
    )?;
    Ok(Box::new(WindowOperator::new(
        child,
        partition_by.clone(),
        order_by.clone(),
        calls.clone(),
    )))
}

fn aggregate(
    _context: &CompileContext,
    node: &AlgNode,
    children: Vec<Box<dyn Operator>>,
) -> Result<Box<dyn Operator>> {
    let AlgNode::Aggregate {
        group_by, calls, ..
    } = node
    else {
        return Err(mismatch(node, "Aggregate"));
    };
    let child = single(children, node)?;
    check_columns(
        node,
        child.output_schema().len(),
        group_by
            .iter()
            .chain(calls.iter().flat_map(|c| c.args.iter()))
            .copied(),
    )?;
    Ok(Box::new(AggregateOperator::new(
        child,
        group_by.clone(),
        calls.clone(),
    )))
}
