//! Nested loop join operator.
//!
//! The right input is materialized on the first pull; the left input is
//! streamed. For each left row the condition is evaluated against every
//! right row over the concatenated values (left columns first). Unmatched
//! rows of outer sides are padded with NULLs.

use crate::access::{ColumnInfo, Row};
use crate::algebra::JoinType;
use crate::catalog::DataContext;
use crate::expression::{Context, Scalar};
use crate::operator::{close_all, not_initialized, Operator};
use anyhow::Result;
use log::trace;
use std::sync::Arc;

pub struct NestedLoopJoinOperator {
    children: [Box<dyn Operator>; 2],
    join_type: JoinType,
    condition: Box<dyn Scalar>,
    context: Context,
    output_schema: Vec<ColumnInfo>,
    left_width: usize,
    right_width: usize,
    /// Materialized right input
    right_rows: Option<Vec<Row>>,
    /// Right rows matched by at least one left row (RIGHT/FULL only)
    right_matched: Vec<bool>,
    current_left: Option<Row>,
    left_matched: bool,
    right_position: usize,
    left_done: bool,
    unmatched_position: usize,
    initialized: bool,
}

impl NestedLoopJoinOperator {
    pub fn new(
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        join_type: JoinType,
        condition: Box<dyn Scalar>,
        data_context: Arc<DataContext>,
    ) -> Self {
        let left_width = left.output_schema().len();
        let right_width = right.output_schema().len();
        let mut output_schema = left.output_schema().to_vec();
        if join_type.projects_right() {
            output_schema.extend_from_slice(right.output_schema());
        }
        Self {
            children: [left, right],
            join_type,
            condition,
            context: Context::new(data_context),
            output_schema,
            left_width,
            right_width,
            right_rows: None,
            right_matched: Vec::new(),
            current_left: None,
            left_matched: false,
            right_position: 0,
            left_done: false,
            unmatched_position: 0,
            initialized: false,
        }
    }

    fn materialize_right(&mut self) -> Result<()> {
        if self.right_rows.is_some() {
            return Ok(());
        }
        let mut rows = Vec::new();
        while let Some(row) = self.children[1].next()? {
            rows.push(row);
        }
        trace!("join materialized {} right rows", rows.len());
        self.right_matched = vec![false; rows.len()];
        self.right_rows = Some(rows);
        Ok(())
    }

    fn reset_state(&mut self) {
        self.right_rows = None;
        self.right_matched.clear();
        self.current_left = None;
        self.left_matched = false;
        self.right_position = 0;
        self.left_done = false;
        self.unmatched_position = 0;
    }
}

impl Operator for NestedLoopJoinOperator {
    fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        for child in self.children.iter_mut() {
            child.init()?;
        }
        self.initialized = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.initialized {
            return Err(not_initialized(self.name()));
        }
        self.materialize_right()?;
        let Some(right_rows) = self.right_rows.as_ref() else {
            return Ok(None);
        };

        while !self.left_done {
            if self.current_left.is_none() {
                match self.children[0].next()? {
                    Some(row) => {
                        self.current_left = Some(row);
                        self.left_matched = false;
                        self.right_position = 0;
                    }
                    None => {
                        self.left_done = true;
                        break;
                    }
                }
            }

            if let Some(left) = self.current_left.as_ref() {
                while self.right_position < right_rows.len() {
                    let i = self.right_position;
                    self.right_position += 1;
                    let right = &right_rows[i];
                    self.context.set_joined(left.values(), right.values());
                    if !self.condition.execute_predicate(&self.context)? {
                        continue;
                    }
                    self.left_matched = true;
                    match self.join_type {
                        JoinType::Semi => {
                            self.right_position = right_rows.len();
                            break;
                        }
                        JoinType::Anti => {
                            self.right_position = right_rows.len();
                            break;
                        }
                        _ => {
                            self.right_matched[i] = true;
                            return Ok(Some(Row::concat(left.values(), right.values())));
                        }
                    }
                }
            }

            // Right side exhausted for the current left row
            let Some(left) = self.current_left.take() else {
                continue;
            };
            match self.join_type {
                JoinType::Semi if self.left_matched => return Ok(Some(left)),
                JoinType::Anti if !self.left_matched => return Ok(Some(left)),
                JoinType::Left | JoinType::Full if !self.left_matched => {
                    return Ok(Some(Row::concat(
                        left.values(),
                        Row::nulls(self.right_width).values(),
                    )));
                }
                _ => {}
            }
        }

        if matches!(self.join_type, JoinType::Right | JoinType::Full) {
            while self.unmatched_position < right_rows.len() {
                let i = self.unmatched_position;
                self.unmatched_position += 1;
                if !self.right_matched[i] {
                    return Ok(Some(Row::concat(
                        Row::nulls(self.left_width).values(),
                        right_rows[i].values(),
                    )));
                }
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> &[ColumnInfo] {
        &self.output_schema
    }

    fn close(&mut self) -> Result<()> {
        self.reset_state();
        close_all(&mut self.children)
    }

    fn rewind(&mut self) -> Result<()> {
        self.reset_state();
        for child in self.children.iter_mut() {
            child.rewind()?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "NestedLoopJoin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Value;
    use crate::expression::{Expression, ScalarCompiler, ScalarCompilerConfig};
    use crate::operator::testing::{drain, MockOperator};

    fn join(join_type: JoinType) -> NestedLoopJoinOperator {
        let left = MockOperator::ints(&[&[1, 10], &[2, 20], &[3, 30]]);
        let right = MockOperator::ints(&[&[2, 200], &[3, 300], &[3, 301], &[4, 400]]);
        let mut schema = left.output_schema().to_vec();
        schema.extend_from_slice(right.output_schema());
        let condition = ScalarCompiler::new(ScalarCompilerConfig::default())
            .compile(
                &[Expression::eq(Expression::column(0), Expression::column(2))],
                &schema,
            )
            .unwrap();
        NestedLoopJoinOperator::new(left, right, join_type, condition, Arc::new(DataContext::empty()))
    }

    fn v(values: &[Option<i32>]) -> Vec<Value> {
        values.iter().map(|v| Value::from(*v)).collect()
    }

    #[test]
    fn test_inner_join() -> Result<()> {
        let rows = drain(&mut join(JoinType::Inner))?;
        assert_eq!(
            rows,
            vec![
                v(&[Some(2), Some(20), Some(2), Some(200)]),
                v(&[Some(3), Some(30), Some(3), Some(300)]),
                v(&[Some(3), Some(30), Some(3), Some(301)]),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_left_and_full_pad_with_nulls() -> Result<()> {
        let left = drain(&mut join(JoinType::Left))?;
        assert_eq!(left.len(), 4);
        assert_eq!(left[0], v(&[Some(1), Some(10), None, None]));

        let full = drain(&mut join(JoinType::Full))?;
        assert_eq!(full.len(), 5);
        assert_eq!(full[4], v(&[None, None, Some(4), Some(400)]));

        let right = drain(&mut join(JoinType::Right))?;
        assert_eq!(right.len(), 4);
        assert_eq!(right.last(), Some(&v(&[None, None, Some(4), Some(400)])));
        Ok(())
    }

    #[test]
    fn test_semi_and_anti() -> Result<()> {
        let mut semi = join(JoinType::Semi);
        assert_eq!(semi.output_schema().len(), 2);
        assert_eq!(
            drain(&mut semi)?,
            vec![v(&[Some(2), Some(20)]), v(&[Some(3), Some(30)])]
        );

        let anti = drain(&mut join(JoinType::Anti))?;
        assert_eq!(anti, vec![v(&[Some(1), Some(10)])]);
        Ok(())
    }

    #[test]
    fn test_rewind_replays() -> Result<()> {
        let mut op = join(JoinType::Inner);
        let first = drain(&mut op)?;
        op.rewind()?;
        assert_eq!(drain(&mut op)?, first);
        Ok(())
    }
}
