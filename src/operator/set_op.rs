//! UNION, INTERSECT and MINUS over any number of inputs.
//!
//! UNION streams its inputs in order (deduplicating unless ALL). INTERSECT
//! and MINUS materialize every input but the first as multiset counts and
//! stream the first input against them.

use crate::access::{ColumnInfo, Row};
use crate::algebra::SetOpKind;
use crate::operator::{close_all, not_initialized, Operator};
use anyhow::Result;
use std::collections::{HashMap, HashSet};

pub struct SetOpOperator {
    kind: SetOpKind,
    all: bool,
    children: Vec<Box<dyn Operator>>,
    output_schema: Vec<ColumnInfo>,
    /// Input currently being streamed (UNION)
    current: usize,
    /// Rows already emitted (distinct variants)
    emitted: HashSet<Row>,
    /// Per other input, remaining multiplicity of each row
    counts: Option<Vec<HashMap<Row, usize>>>,
    initialized: bool,
}

impl SetOpOperator {
    pub fn new(kind: SetOpKind, all: bool, children: Vec<Box<dyn Operator>>) -> Self {
        let output_schema = children
            .first()
            .map(|c| c.output_schema().to_vec())
            .unwrap_or_default();
        Self {
            kind,
            all,
            children,
            output_schema,
            current: 0,
            emitted: HashSet::new(),
            counts: None,
            initialized: false,
        }
    }

    fn next_union(&mut self) -> Result<Option<Row>> {
        while let Some(child) = self.children.get_mut(self.current) {
            match child.next()? {
                Some(row) => {
                    if self.all || self.emitted.insert(row.clone()) {
                        return Ok(Some(row));
                    }
                }
                None => self.current += 1,
            }
        }
        Ok(None)
    }

    fn materialize_counts(&mut self) -> Result<()> {
        if self.counts.is_some() {
            return Ok(());
        }
        let mut counts = Vec::with_capacity(self.children.len().saturating_sub(1));
        for child in self.children.iter_mut().skip(1) {
            let mut multiset: HashMap<Row, usize> = HashMap::new();
            while let Some(row) = child.next()? {
                *multiset.entry(row).or_insert(0) += 1;
            }
            counts.push(multiset);
        }
        self.counts = Some(counts);
        Ok(())
    }

    fn next_difference(&mut self) -> Result<Option<Row>> {
        self.materialize_counts()?;
        let Some(first) = self.children.first_mut() else {
            return Ok(None);
        };
        let Some(counts) = self.counts.as_mut() else {
            return Ok(None);
        };

        while let Some(row) = first.next()? {
            let keep = match self.kind {
                SetOpKind::Intersect => {
                    let present = counts.iter().all(|c| c.get(&row).map_or(false, |n| *n > 0));
                    if present && self.all {
                        for multiset in counts.iter_mut() {
                            if let Some(n) = multiset.get_mut(&row) {
                                *n -= 1;
                            }
                        }
                    }
                    present
                }
                SetOpKind::Minus => {
                    let matched = counts
                        .iter_mut()
                        .find_map(|c| c.get_mut(&row).filter(|n| **n > 0));
                    match matched {
                        Some(n) if self.all => {
                            *n -= 1;
                            false
                        }
                        Some(_) => false,
                        None => true,
                    }
                }
                SetOpKind::Union => true,
            };
            if keep && (self.all || self.emitted.insert(row.clone())) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }
}

impl Operator for SetOpOperator {
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
        match self.kind {
            SetOpKind::Union => self.next_union(),
            SetOpKind::Intersect | SetOpKind::Minus => self.next_difference(),
        }
    }

    fn output_schema(&self) -> &[ColumnInfo] {
        &self.output_schema
    }

    fn close(&mut self) -> Result<()> {
        self.emitted.clear();
        self.counts = None;
        close_all(&mut self.children)
    }

    fn rewind(&mut self) -> Result<()> {
        self.current = 0;
        self.emitted.clear();
        self.counts = None;
        for child in self.children.iter_mut() {
            child.rewind()?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        match self.kind {
            SetOpKind::Union => "Union",
            SetOpKind::Intersect => "Intersect",
            SetOpKind::Minus => "Minus",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::testing::{drain, ints, MockOperator};

    fn op(kind: SetOpKind, all: bool) -> SetOpOperator {
        SetOpOperator::new(
            kind,
            all,
            vec![
                MockOperator::ints(&[&[1], &[2], &[2], &[3], &[3]]),
                MockOperator::ints(&[&[2], &[3], &[4]]),
            ],
        )
    }

    #[test]
    fn test_union() -> Result<()> {
        assert_eq!(
            drain(&mut op(SetOpKind::Union, true))?,
            ints(&[&[1], &[2], &[2], &[3], &[3], &[2], &[3], &[4]])
        );
        assert_eq!(
            drain(&mut op(SetOpKind::Union, false))?,
            ints(&[&[1], &[2], &[3], &[4]])
        );
        Ok(())
    }

    #[test]
    fn test_intersect() -> Result<()> {
        assert_eq!(drain(&mut op(SetOpKind::Intersect, false))?, ints(&[&[2], &[3]]));
        assert_eq!(drain(&mut op(SetOpKind::Intersect, true))?, ints(&[&[2], &[3]]));
        Ok(())
    }

    #[test]
    fn test_minus() -> Result<()> {
        assert_eq!(drain(&mut op(SetOpKind::Minus, false))?, ints(&[&[1]]));
        assert_eq!(
            drain(&mut op(SetOpKind::Minus, true))?,
            ints(&[&[1], &[2], &[3]])
        );
        Ok(())
    }

    #[test]
    fn test_rewind_resets_dedup_state() -> Result<()> {
        let mut union = op(SetOpKind::Union, false);
        let first = drain(&mut union)?;
        union.rewind()?;
        assert_eq!(drain(&mut union)?, first);
        Ok(())
    }
}
