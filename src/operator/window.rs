//! Window operator.
//!
//! Materializes its input, orders it by the partition keys followed by the
//! window's ORDER BY, and appends one column per window call. Aggregate
//! calls see either the whole partition or a running frame from the
//! partition start through the current row's last peer.

use crate::access::{ColumnInfo, Row, Value};
use crate::algebra::{AggregateFunction, SortKey, WindowCall, WindowFrame, WindowFunction};
use crate::operator::aggregate::{accumulate, Accumulator};
use crate::operator::{compare_rows, not_initialized, Operator};
use anyhow::Result;
use std::cmp::Ordering;

pub struct WindowOperator {
    child: Box<dyn Operator>,
    partition_by: Vec<usize>,
    order_by: Vec<SortKey>,
    calls: Vec<WindowCall>,
    output_schema: Vec<ColumnInfo>,
    results: Option<std::vec::IntoIter<Row>>,
    initialized: bool,
}

fn aggregate_of(function: WindowFunction) -> Option<AggregateFunction> {
    match function {
        WindowFunction::RowNumber | WindowFunction::Rank => None,
        WindowFunction::Count => Some(AggregateFunction::Count),
        WindowFunction::Sum => Some(AggregateFunction::Sum),
        WindowFunction::Min => Some(AggregateFunction::Min),
        WindowFunction::Max => Some(AggregateFunction::Max),
        WindowFunction::Avg => Some(AggregateFunction::Avg),
    }
}

impl WindowOperator {
    pub fn new(
        child: Box<dyn Operator>,
        partition_by: Vec<usize>,
        order_by: Vec<SortKey>,
        calls: Vec<WindowCall>,
    ) -> Self {
        let mut output_schema = child.output_schema().to_vec();
        let extra: Vec<ColumnInfo> = calls
            .iter()
            .map(|c| ColumnInfo::new(c.name.clone(), c.output_type(&output_schema)))
            .collect();
        output_schema.extend(extra);
        Self {
            child,
            partition_by,
            order_by,
            calls,
            output_schema,
            results: None,
            initialized: false,
        }
    }

    fn compute(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.child.next()? {
            rows.push(row.into_values());
        }

        let mut collation: Vec<SortKey> =
            self.partition_by.iter().map(|&c| SortKey::asc(c)).collect();
        collation.extend(self.order_by.iter().copied());
        rows.sort_by(|a, b| compare_rows(a, b, &collation));

        let mut output = Vec::with_capacity(rows.len());
        let mut start = 0;
        while start < rows.len() {
            let end = (start..rows.len())
                .find(|&i| !self.same_partition(&rows[start], &rows[i]))
                .unwrap_or(rows.len());
            let extra = self.evaluate_partition(&rows[start..end])?;
            for (values, mut appended) in rows[start..end].iter().zip(extra) {
                let mut out = values.clone();
                out.append(&mut appended);
                output.push(Row::of(out));
            }
            start = end;
        }
        Ok(output)
    }

    fn same_partition(&self, a: &[Value], b: &[Value]) -> bool {
        self.partition_by.iter().all(|&c| a[c] == b[c])
    }

    /// Window values for each row of one sorted partition
    fn evaluate_partition(&self, partition: &[Vec<Value>]) -> Result<Vec<Vec<Value>>> {
        let mut results = vec![Vec::with_capacity(self.calls.len()); partition.len()];

        // Peer groups: runs of rows equal under the window ORDER BY
        let mut peers = Vec::new();
        let mut group_start = 0;
        for i in 1..=partition.len() {
            let boundary = i == partition.len()
                || compare_rows(&partition[group_start], &partition[i], &self.order_by)
                    != Ordering::Equal;
            if boundary {
                peers.push(group_start..i);
                group_start = i;
            }
        }

        for call in &self.calls {
            let args: Vec<usize> = call.arg.into_iter().collect();
            match aggregate_of(call.function) {
                None => {
                    for group in &peers {
                        for i in group.clone() {
                            let value = match call.function {
                                WindowFunction::RowNumber => i as i64 + 1,
                                _ => group.start as i64 + 1,
                            };
                            results[i].push(Value::Int64(value));
                        }
                    }
                }
                Some(function) => {
                    let mut acc = Accumulator::new(function, false);
                    match call.frame {
                        WindowFrame::Partition => {
                            for row in partition {
                                accumulate(&mut acc, &args, row)?;
                            }
                            let value = acc.result();
                            for out in results.iter_mut() {
                                out.push(value.clone());
                            }
                        }
                        WindowFrame::Running => {
                            for group in &peers {
                                for row in &partition[group.clone()] {
                                    accumulate(&mut acc, &args, row)?;
                                }
                                let value = acc.result();
                                for out in &mut results[group.clone()] {
                                    out.push(value.clone());
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(results)
    }
}

impl Operator for WindowOperator {
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
            let rows = self.compute()?;
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
        "Window"
    }
}
