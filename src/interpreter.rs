//! Interpreter: compiles an algebra tree and exposes its rows as a pull
//! sequence.
//!
//! ```text
//! AlgNode --(pushdown)--> AlgNode --(OperatorRegistry)--> operator graph
//!                                                          |
//!                        caller <-- Interpreter::next_row -+
//! ```
//!
//! Scalar expressions are compiled once, while the operator graph is built;
//! table scans negotiate with their tables at the same time. The graph is
//! closed when the sequence ends, fails, or the interpreter is dropped.

pub mod compiler;
pub mod pushdown;

pub use compiler::{CompileContext, OperatorFactory, OperatorRegistry};
pub use pushdown::push_down;

use crate::access::{ColumnInfo, Row, Value};
use crate::algebra::AlgNode;
use crate::catalog::DataContext;
use crate::expression::{DiagnosticsSink, ScalarCompiler, ScalarCompilerConfig};
use crate::operator::Operator;
use anyhow::Result;
use log::{debug, warn};
use std::sync::Arc;

/// Interpreter options
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Log compiled scalar listings and hand them to the diagnostics sink
    pub debug: bool,
    /// Fold filters and plain projections into scans before compiling
    pub push_down: bool,
    /// Cap on projection negotiation rounds per scan (default: column count + 1)
    pub max_negotiation_rounds: Option<usize>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            debug: false,
            push_down: true,
            max_negotiation_rounds: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Exhausted,
    Closed,
}

pub struct Interpreter {
    root: Box<dyn Operator>,
    output_schema: Vec<ColumnInfo>,
    state: State,
}

/// Collects the optional pieces of an interpreter before compiling
pub struct InterpreterBuilder {
    data_context: Arc<DataContext>,
    config: InterpreterConfig,
    registry: OperatorRegistry,
    diagnostics: Option<Arc<dyn DiagnosticsSink>>,
}

impl InterpreterBuilder {
    pub fn config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: OperatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn compile(self, plan: &AlgNode) -> Result<Interpreter> {
        let rewritten;
        let plan = if self.config.push_down {
            rewritten = push_down(plan.clone());
            &rewritten
        } else {
            plan
        };
        debug!("compiling plan:\n{}", plan.explain());

        let mut scalars = ScalarCompiler::new(ScalarCompilerConfig {
            debug: self.config.debug,
        });
        if let Some(sink) = self.diagnostics {
            scalars = scalars.with_diagnostics(sink);
        }
        let context = CompileContext::new(self.data_context, scalars, self.config);
        let mut root = self.registry.compile(plan, &context)?;
        if let Err(e) = root.init() {
            if let Err(close_error) = root.close() {
                warn!("failed to close operators after init error: {}", close_error);
            }
            return Err(e);
        }

        Ok(Interpreter {
            output_schema: root.output_schema().to_vec(),
            root,
            state: State::Open,
        })
    }
}

impl Interpreter {
    pub fn builder(data_context: Arc<DataContext>) -> InterpreterBuilder {
        InterpreterBuilder {
            data_context,
            config: InterpreterConfig::default(),
            registry: OperatorRegistry::core(),
            diagnostics: None,
        }
    }

    /// Compile `plan` with the default configuration and operator set.
    pub fn new(plan: &AlgNode, data_context: Arc<DataContext>) -> Result<Self> {
        Self::builder(data_context).compile(plan)
    }

    pub fn with_config(
        plan: &AlgNode,
        data_context: Arc<DataContext>,
        config: InterpreterConfig,
    ) -> Result<Self> {
        Self::builder(data_context).config(config).compile(plan)
    }

    pub fn output_schema(&self) -> &[ColumnInfo] {
        &self.output_schema
    }

    /// Pull the next row. The operator graph is closed as soon as the
    /// sequence ends or an error is raised.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        if self.state != State::Open {
            return Ok(None);
        }
        match self.root.next() {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.state = State::Exhausted;
                self.close()?;
                Ok(None)
            }
            Err(e) => {
                if let Err(close_error) = self.close() {
                    warn!("failed to close operators after error: {}", close_error);
                }
                Err(e)
            }
        }
    }

    /// Restart the sequence. Fails with `NotRestartable` if any operator
    /// in the graph cannot be rewound.
    pub fn reset(&mut self) -> Result<()> {
        self.root.rewind()?;
        self.state = State::Open;
        Ok(())
    }

    /// Release every resource held by the operator graph.
    pub fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }
        self.state = State::Closed;
        debug!("closing interpreter");
        self.root.close()
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }
}

impl Iterator for Interpreter {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().map(|row| row.map(Row::into_values)).transpose()
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close interpreter: {}", e);
        }
    }
}
