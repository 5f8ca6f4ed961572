//! Hash aggregation operator for GROUP BY and aggregate functions.
//!
//! Supports:
//! - Multiple grouping columns
//! - COUNT(*), COUNT, SUM, AVG, MIN, MAX, each optionally DISTINCT
//! - SQL NULL handling (NULL arguments are ignored)
//!
//! Groups are emitted in the order their first row arrived. Aggregating an
//! empty input without grouping columns yields exactly one row.

use crate::access::{ColumnInfo, Row, Value};
use crate::algebra::{AggregateCall, AggregateFunction};
use crate::expression::ExpressionError;
use crate::operator::{compare_values, not_initialized, Operator};
use anyhow::Result;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Running state of one aggregate, also used by window frames
#[derive(Debug, Clone)]
pub(crate) struct Accumulator {
    function: AggregateFunction,
    count: i64,
    int_sum: Option<i64>,
    float_sum: Option<f64>,
    extreme: Option<Value>,
    seen: Option<HashSet<Value>>,
}

impl Accumulator {
    pub(crate) fn new(function: AggregateFunction, distinct: bool) -> Self {
        Self {
            function,
            count: 0,
            int_sum: None,
            float_sum: None,
            extreme: None,
            seen: distinct.then(HashSet::new),
        }
    }

    /// Count a row for COUNT(*)
    pub(crate) fn add_row(&mut self) {
        self.count += 1;
    }

    pub(crate) fn add(&mut self, value: &Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        if let Some(seen) = self.seen.as_mut() {
            if !seen.insert(value.clone()) {
                return Ok(());
            }
        }
        self.count += 1;

        match self.function {
            AggregateFunction::Count => {}
            AggregateFunction::Sum | AggregateFunction::Avg => match value {
                Value::Int32(_) | Value::Int64(_) => {
                    let n = value.as_i64().unwrap_or_default();
                    let sum = self.int_sum.unwrap_or(0).checked_add(n).ok_or_else(|| {
                        ExpressionError::Overflow {
                            operator: "SUM".to_string(),
                        }
                    })?;
                    self.int_sum = Some(sum);
                }
                Value::Float64(f) => self.float_sum = Some(self.float_sum.unwrap_or(0.0) + f),
                other => {
                    return Err(ExpressionError::InvalidOperandTypes {
                        operator: "SUM".to_string(),
                        left_type: other.data_type(),
                        right_type: None,
                    }
                    .into())
                }
            },
            AggregateFunction::Min | AggregateFunction::Max => {
                let wanted = if self.function == AggregateFunction::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let replace = match &self.extreme {
                    None => true,
                    Some(current) => compare_values(value, current) == wanted,
                };
                if replace {
                    self.extreme = Some(value.clone());
                }
            }
        }
        Ok(())
    }

    pub(crate) fn result(&self) -> Value {
        match self.function {
            AggregateFunction::Count => Value::Int64(self.count),
            AggregateFunction::Sum => match (self.int_sum, self.float_sum) {
                (None, None) => Value::Null,
                (Some(i), None) => Value::Int64(i),
                (i, Some(f)) => Value::Float64(f + i.unwrap_or(0) as f64),
            },
            AggregateFunction::Avg => {
                if self.count == 0 {
                    Value::Null
                } else {
                    let total =
                        self.int_sum.unwrap_or(0) as f64 + self.float_sum.unwrap_or(0.0);
                    Value::Float64(total / self.count as f64)
                }
            }
            AggregateFunction::Min | AggregateFunction::Max => {
                self.extreme.clone().unwrap_or(Value::Null)
            }
        }
    }
}

/// Feed one input row into the accumulator of `call`.
pub(crate) fn accumulate(acc: &mut Accumulator, call_args: &[usize], row: &[Value]) -> Result<()> {
    match call_args.first() {
        None => {
            acc.add_row();
            Ok(())
        }
        Some(&column) => acc.add(&row[column]),
    }
}

pub struct AggregateOperator {
    child: Box<dyn Operator>,
    group_by: Vec<usize>,
    calls: Vec<AggregateCall>,
    output_schema: Vec<ColumnInfo>,
    /// Finished output rows, present once the input has been consumed
    results: Option<std::vec::IntoIter<Row>>,
    initialized: bool,
}

impl AggregateOperator {
    pub fn new(child: Box<dyn Operator>, group_by: Vec<usize>, calls: Vec<AggregateCall>) -> Self {
        let input = child.output_schema();
        let mut output_schema: Vec<ColumnInfo> =
            group_by.iter().filter_map(|&i| input.get(i).cloned()).collect();
        output_schema.extend(
            calls
                .iter()
                .map(|c| ColumnInfo::new(c.name.clone(), c.output_type(input))),
        );
        Self {
            child,
            group_by,
            calls,
            output_schema,
            results: None,
            initialized: false,
        }
    }

    fn consume_input(&mut self) -> Result<Vec<Row>> {
        let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, Vec<Accumulator>)> = Vec::new();
        let fresh = |calls: &[AggregateCall]| -> Vec<Accumulator> {
            calls
                .iter()
                .map(|c| Accumulator::new(c.function, c.distinct))
                .collect()
        };

        while let Some(row) = self.child.next()? {
            let values = row.values();
            let key: Vec<Value> = self.group_by.iter().map(|&i| values[i].clone()).collect();
            let slot = match index.get(&key) {
                Some(&slot) => slot,
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, fresh(&self.calls)));
                    groups.len() - 1
                }
            };
            let accumulators = &mut groups[slot].1;
            for (acc, call) in accumulators.iter_mut().zip(&self.calls) {
                accumulate(acc, &call.args, values)?;
            }
        }

        if groups.is_empty() && self.group_by.is_empty() {
            groups.push((Vec::new(), fresh(&self.calls)));
        }

        Ok(groups
            .into_iter()
            .map(|(mut key, accumulators)| {
                key.extend(accumulators.iter().map(Accumulator::result));
                Row::of(key)
            })
            .collect())
    }
}

impl Operator for AggregateOperator {
    fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.child.init()?;
        self.initialized = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.initialized {
            return Err(not_initialized(self.name()));
        }
        if self.results.is_none() {
            let rows = self.consume_input()?;
            self.results = Some(rows.into_iter());
        }
        Ok(self.results.as_mut().and_then(Iterator::next))
    }

    fn output_schema(&self) -> &[ColumnInfo] {
        &self.output_schema
    }

    fn close(&mut self) -> Result<()> {
        self.results = None;
        self.child.close()
    }

    fn rewind(&mut self) -> Result<()> {
        self.results = None;
        self.child.rewind()
    }

    fn name(&self) -> &'static str {
        "Aggregate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::testing::{drain, MockOperator};

    #[test]
    fn test_group_by_first_appearance_order() -> Result<()> {
        let child = MockOperator::ints(&[&[2, 10], &[1, 5], &[2, 30], &[1, 7], &[3, 1]]);
        let mut op = AggregateOperator::new(
            child,
            vec![0],
            vec![
                AggregateCall::count_star("n"),
                AggregateCall::new(AggregateFunction::Sum, vec![1], "total"),
                AggregateCall::new(AggregateFunction::Max, vec![1], "top"),
                AggregateCall::new(AggregateFunction::Avg, vec![1], "mean"),
            ],
        );

        let rows = drain(&mut op)?;
        assert_eq!(
            rows[0],
            vec![
                Value::Int32(2),
                Value::Int64(2),
                Value::Int64(40),
                Value::Int32(30),
                Value::Float64(20.0),
            ]
        );
        assert_eq!(rows[1][0], Value::Int32(1));
        assert_eq!(rows[2][0], Value::Int32(3));
        Ok(())
    }

    #[test]
    fn test_empty_input_without_groups_yields_one_row() -> Result<()> {
        let child = MockOperator::ints(&[]);
        let mut op = AggregateOperator::new(
            child,
            vec![],
            vec![
                AggregateCall::count_star("n"),
                AggregateCall::new(AggregateFunction::Sum, vec![0], "s"),
            ],
        );
        assert_eq!(drain(&mut op)?, vec![vec![Value::Int64(0), Value::Null]]);
        Ok(())
    }

    #[test]
    fn test_empty_input_with_groups_yields_nothing() -> Result<()> {
        let child = MockOperator::ints(&[]);
        let mut op = AggregateOperator::new(child, vec![0], vec![AggregateCall::count_star("n")]);
        assert!(drain(&mut op)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_distinct_and_nulls() -> Result<()> {
        let child = Box::new(MockOperator::new(
            vec![ColumnInfo::new("x", crate::access::DataType::Int32)],
            vec![
                vec![Value::Int32(1)],
                vec![Value::Int32(1)],
                vec![Value::Null],
                vec![Value::Int32(2)],
            ],
        ));
        let mut op = AggregateOperator::new(
            child,
            vec![],
            vec![
                AggregateCall::new(AggregateFunction::Count, vec![0], "c"),
                AggregateCall::new(AggregateFunction::Count, vec![0], "cd").distinct(),
                AggregateCall::new(AggregateFunction::Sum, vec![0], "sd").distinct(),
                AggregateCall::count_star("all"),
            ],
        );
        assert_eq!(
            drain(&mut op)?,
            vec![vec![
                Value::Int64(3),
                Value::Int64(2),
                Value::Int64(3),
                Value::Int64(4),
            ]]
        );
        Ok(())
    }
}
