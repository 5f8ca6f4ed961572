//! Expression IR definitions.
//!
//! Expressions are evaluated against an input row: a [`ColumnRef`] names a
//! position in that row, a dynamic parameter names a positional binding of the
//! execution-time data context, everything else is a literal or a call.

use crate::access::{DataType, Value};
use crate::expression::operator::{BinaryOperator, Function, UnaryOperator};
use std::collections::BTreeSet;
use std::fmt;

/// Column reference in an expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Column index in the input row (0-based)
    pub index: usize,
    /// Optional column name for debugging/display
    pub name: Option<String>,
}

impl ColumnRef {
    pub fn new(index: usize) -> Self {
        Self { index, name: None }
    }

    pub fn with_name(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: Some(name.into()),
        }
    }
}

/// Literal value in an expression
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: Value,
}

impl Literal {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn null() -> Self {
        Self { value: Value::Null }
    }
}

/// Expression tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Literal constant value
    Literal(Literal),

    /// Reference to a column of the input row
    ColumnRef(ColumnRef),

    /// Positional parameter bound at execution time (`?0`, `?1`, ...)
    DynamicParam(usize),

    /// Binary operation
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },

    /// Named function call, resolved when the expression is compiled
    FunctionCall { name: String, args: Vec<Expression> },

    /// Searched CASE expression
    Case {
        conditions: Vec<(Expression, Expression)>,
        else_result: Option<Box<Expression>>,
    },

    /// IN list
    In {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },

    /// BETWEEN, inclusive on both ends
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
        negated: bool,
    },

    /// CAST(expr AS type)
    Cast {
        expr: Box<Expression>,
        data_type: DataType,
    },
}

impl Expression {
    /// Create a literal expression
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(Literal::new(value.into()))
    }

    pub fn null() -> Self {
        Expression::Literal(Literal::null())
    }

    /// Create a column reference expression
    pub fn column(index: usize) -> Self {
        Expression::ColumnRef(ColumnRef::new(index))
    }

    /// Create a column reference with name
    pub fn column_with_name(index: usize, name: impl Into<String>) -> Self {
        Expression::ColumnRef(ColumnRef::with_name(index, name))
    }

    pub fn param(index: usize) -> Self {
        Expression::DynamicParam(index)
    }

    /// Create a binary operation expression
    pub fn binary_op(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Create a unary operation expression
    pub fn unary_op(op: UnaryOperator, operand: Expression) -> Self {
        Expression::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::FunctionCall {
            name: name.into(),
            args,
        }
    }

    pub fn cast(expr: Expression, data_type: DataType) -> Self {
        Expression::Cast {
            expr: Box::new(expr),
            data_type,
        }
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::And, left, right)
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Or, left, right)
    }

    pub fn not_expr(operand: Expression) -> Self {
        Self::unary_op(UnaryOperator::Not, operand)
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Eq, left, right)
    }

    pub fn ne(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Ne, left, right)
    }

    pub fn lt(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Lt, left, right)
    }

    pub fn le(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Le, left, right)
    }

    pub fn gt(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Gt, left, right)
    }

    pub fn ge(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Ge, left, right)
    }

    pub fn add_expr(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Add, left, right)
    }

    pub fn sub_expr(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Sub, left, right)
    }

    pub fn mul_expr(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Mul, left, right)
    }

    pub fn div_expr(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Div, left, right)
    }

    pub fn is_null(operand: Expression) -> Self {
        Self::unary_op(UnaryOperator::IsNull, operand)
    }

    pub fn is_not_null(operand: Expression) -> Self {
        Self::unary_op(UnaryOperator::IsNotNull, operand)
    }

    /// Fold a list of predicates into one conjunction; `None` when empty.
    pub fn and_all(predicates: Vec<Expression>) -> Option<Expression> {
        predicates.into_iter().reduce(Expression::and)
    }

    /// Split nested ANDs into their conjuncts, left to right.
    pub fn split_conjunction(self) -> Vec<Expression> {
        let mut out = Vec::new();
        self.collect_conjuncts(&mut out);
        out
    }

    fn collect_conjuncts(self, out: &mut Vec<Expression>) {
        match self {
            Expression::BinaryOp {
                op: BinaryOperator::And,
                left,
                right,
            } => {
                left.collect_conjuncts(out);
                right.collect_conjuncts(out);
            }
            other => out.push(other),
        }
    }

    /// Check if this expression is a constant (contains no column references)
    pub fn is_constant(&self) -> bool {
        let mut columns = BTreeSet::new();
        self.referenced_columns(&mut columns);
        columns.is_empty()
    }

    /// Collect every input column this expression reads.
    pub fn referenced_columns(&self, out: &mut BTreeSet<usize>) {
        self.for_each_child(|child| child.referenced_columns(out));
        if let Expression::ColumnRef(col) = self {
            out.insert(col.index);
        }
    }

    /// Rewrite every column reference through `mapping`.
    pub fn remap_columns(&self, mapping: &dyn Fn(usize) -> usize) -> Expression {
        let remap = |e: &Expression| e.remap_columns(mapping);
        match self {
            Expression::Literal(_) | Expression::DynamicParam(_) => self.clone(),
            Expression::ColumnRef(col) => Expression::ColumnRef(ColumnRef {
                index: mapping(col.index),
                name: col.name.clone(),
            }),
            Expression::BinaryOp { op, left, right } => {
                Expression::binary_op(*op, remap(left), remap(right))
            }
            Expression::UnaryOp { op, operand } => Expression::unary_op(*op, remap(operand)),
            Expression::FunctionCall { name, args } => Expression::FunctionCall {
                name: name.clone(),
                args: args.iter().map(remap).collect(),
            },
            Expression::Case {
                conditions,
                else_result,
            } => Expression::Case {
                conditions: conditions
                    .iter()
                    .map(|(c, r)| (remap(c), remap(r)))
                    .collect(),
                else_result: else_result.as_ref().map(|e| Box::new(remap(e))),
            },
            Expression::In {
                expr,
                list,
                negated,
            } => Expression::In {
                expr: Box::new(remap(expr)),
                list: list.iter().map(remap).collect(),
                negated: *negated,
            },
            Expression::Between {
                expr,
                low,
                high,
                negated,
            } => Expression::Between {
                expr: Box::new(remap(expr)),
                low: Box::new(remap(low)),
                high: Box::new(remap(high)),
                negated: *negated,
            },
            Expression::Cast { expr, data_type } => Expression::cast(remap(expr), *data_type),
        }
    }

    fn for_each_child<'a>(&'a self, mut f: impl FnMut(&'a Expression)) {
        match self {
            Expression::Literal(_) | Expression::ColumnRef(_) | Expression::DynamicParam(_) => {}
            Expression::BinaryOp { left, right, .. } => {
                f(left);
                f(right);
            }
            Expression::UnaryOp { operand, .. } => f(operand),
            Expression::FunctionCall { args, .. } => args.iter().for_each(f),
            Expression::Case {
                conditions,
                else_result,
            } => {
                for (cond, result) in conditions {
                    f(cond);
                    f(result);
                }
                if let Some(e) = else_result {
                    f(e);
                }
            }
            Expression::In { expr, list, .. } => {
                f(expr);
                list.iter().for_each(f);
            }
            Expression::Between {
                expr, low, high, ..
            } => {
                f(expr);
                f(low);
                f(high);
            }
            Expression::Cast { expr, .. } => f(expr),
        }
    }

    /// Get the expected output type of this expression (if it can be determined statically)
    pub fn output_type(&self, input_schema: &[DataType]) -> Option<DataType> {
        match self {
            Expression::Literal(lit) => lit.value.data_type(),
            Expression::ColumnRef(col) => input_schema.get(col.index).copied(),
            Expression::DynamicParam(_) => None,
            Expression::BinaryOp { op, left, right } => {
                let left_type = left.output_type(input_schema)?;
                let right_type = right.output_type(input_schema)?;
                op.output_type(left_type, right_type)
            }
            Expression::UnaryOp { op, operand } => {
                let operand_type = operand.output_type(input_schema)?;
                op.output_type(operand_type)
            }
            Expression::FunctionCall { name, args } => {
                let function = Function::from_name(name)?;
                let arg_types: Vec<_> = args.iter().map(|a| a.output_type(input_schema)).collect();
                function.output_type(&arg_types)
            }
            Expression::Case {
                conditions,
                else_result,
            } => conditions
                .iter()
                .map(|(_, result)| result)
                .chain(else_result.as_deref())
                .find_map(|e| e.output_type(input_schema)),
            Expression::In { .. } | Expression::Between { .. } => Some(DataType::Boolean),
            Expression::Cast { data_type, .. } => Some(*data_type),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(lit) => match &lit.value {
                Value::String(s) => write!(f, "'{}'", s),
                v => write!(f, "{}", v),
            },
            Expression::ColumnRef(col) => match &col.name {
                Some(name) => write!(f, "{}", name),
                None => write!(f, "${}", col.index),
            },
            Expression::DynamicParam(i) => write!(f, "?{}", i),
            Expression::BinaryOp { op, left, right } => {
                write!(f, "({} {} {})", left, op.as_str(), right)
            }
            Expression::UnaryOp { op, operand } if op.is_postfix() => {
                write!(f, "({} {})", operand, op.as_str())
            }
            Expression::UnaryOp { op, operand } => write!(f, "({} {})", op.as_str(), operand),
            Expression::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expression::Case {
                conditions,
                else_result,
            } => {
                f.write_str("CASE")?;
                for (cond, result) in conditions {
                    write!(f, " WHEN {} THEN {}", cond, result)?;
                }
                if let Some(e) = else_result {
                    write!(f, " ELSE {}", e)?;
                }
                f.write_str(" END")
            }
            Expression::In {
                expr,
                list,
                negated,
            } => {
                write!(f, "({} {}IN (", expr, if *negated { "NOT " } else { "" })?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("))")
            }
            Expression::Between {
                expr,
                low,
                high,
                negated,
            } => write!(
                f,
                "({} {}BETWEEN {} AND {})",
                expr,
                if *negated { "NOT " } else { "" },
                low,
                high
            ),
            Expression::Cast { expr, data_type } => write!(f, "CAST({} AS {})", expr, data_type),
        }
    }
}
