//! Expression compiler: expression IR in, callable [`Scalar`] out.
//!
//! Compilation runs in two phases. Lowering flattens each expression into
//! stack-machine instructions ending in a store to its output slot.
//! Materialization verifies the resulting program and wraps it into a
//! [`CompiledScalar`]. Nothing is cached between calls: every `compile`
//! lowers and verifies afresh, and the caller reuses the result for every
//! row of its query.

use crate::access::{ColumnInfo, Value};
use crate::error::ExecutionError;
use crate::expression::program::{Instruction, Program};
use crate::expression::scalar::{Context, Scalar};
use crate::expression::{Expression, ExpressionError, ExpressionResult, Function};
use log::debug;
use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::sync::Arc;

/// Options for the expression compiler
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarCompilerConfig {
    /// Log every compiled program listing and hand it to the diagnostics sink
    pub debug: bool,
}

/// Receives the listing of each compiled scalar when debugging is on
pub trait DiagnosticsSink: Send + Sync {
    fn register(&self, name: &str, listing: &str);
}

/// A diagnostics sink that keeps every listing in memory
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    entries: Mutex<Vec<(String, String)>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered (name, listing) pairs in registration order
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().clone()
    }
}

impl DiagnosticsSink for MemoryDiagnostics {
    fn register(&self, name: &str, listing: &str) {
        self.entries.lock().push((name.to_string(), listing.to_string()));
    }
}

pub struct ScalarCompiler {
    config: ScalarCompilerConfig,
    diagnostics: Option<Arc<dyn DiagnosticsSink>>,
    compiled: Cell<usize>,
}

impl ScalarCompiler {
    pub fn new(config: ScalarCompilerConfig) -> Self {
        Self {
            config,
            diagnostics: None,
            compiled: Cell::new(0),
        }
    }

    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Number of scalars compiled so far
    pub fn compiled_count(&self) -> usize {
        self.compiled.get()
    }

    /// Compile `expressions`, evaluated against rows shaped like `input_schema`.
    ///
    /// A filter passes a single expression; a projection passes one per
    /// output column.
    pub fn compile(
        &self,
        expressions: &[Expression],
        input_schema: &[ColumnInfo],
    ) -> Result<Box<dyn Scalar>, ExecutionError> {
        let ordinal = self.compiled.get();
        self.compiled.set(ordinal + 1);
        let name = format!("Scalar_{}", ordinal);

        let program = lower(expressions, input_schema.len())
            .map_err(|source| ExecutionError::ScalarCompilation {
                name: name.clone(),
                source,
            })?;

        if self.config.debug {
            let listing = program.to_string();
            debug!("compiled {}:\n{}", name, listing);
            if let Some(sink) = &self.diagnostics {
                sink.register(&name, &listing);
            }
        }

        Ok(Box::new(CompiledScalar::new(name, program)))
    }
}

/// Phase one: expression trees to a verified program.
fn lower(expressions: &[Expression], input_width: usize) -> ExpressionResult<Program> {
    let mut lowering = Lowering {
        instructions: Vec::new(),
        constants: Vec::new(),
        input_width,
    };
    for (slot, expression) in expressions.iter().enumerate() {
        lowering.expression(expression)?;
        lowering.emit(Instruction::Store(slot));
    }
    Program::verify(
        lowering.instructions,
        lowering.constants,
        expressions.len(),
        input_width,
    )
}

struct Lowering {
    instructions: Vec<Instruction>,
    constants: Vec<Value>,
    input_width: usize,
}

impl Lowering {
    fn emit(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    fn constant(&mut self, value: &Value) {
        let index = match self.constants.iter().position(|c| c == value) {
            Some(index) => index,
            None => {
                self.constants.push(value.clone());
                self.constants.len() - 1
            }
        };
        self.emit(Instruction::LoadConst(index));
    }

    /// Point the jump at `at` to the next instruction to be emitted.
    fn patch(&mut self, at: usize) {
        let target = self.instructions.len();
        match &mut self.instructions[at] {
            Instruction::Jump(t) | Instruction::JumpUnlessTrue(t) => *t = target,
            _ => {}
        }
    }

    fn expression(&mut self, expr: &Expression) -> ExpressionResult<()> {
        match expr {
            Expression::Literal(lit) => self.constant(&lit.value),

            Expression::ColumnRef(col) => {
                if col.index >= self.input_width {
                    return Err(ExpressionError::ColumnIndexOutOfBounds {
                        index: col.index,
                        tuple_size: self.input_width,
                    });
                }
                self.emit(Instruction::LoadInput(col.index));
            }

            Expression::DynamicParam(index) => {
                self.emit(Instruction::LoadParam(*index));
            }

            Expression::BinaryOp { op, left, right } => {
                self.expression(left)?;
                self.expression(right)?;
                self.emit(Instruction::Binary(*op));
            }

            Expression::UnaryOp { op, operand } => {
                self.expression(operand)?;
                self.emit(Instruction::Unary(*op));
            }

            Expression::FunctionCall { name, args } => {
                let function = Function::from_name(name)
                    .ok_or_else(|| ExpressionError::UnknownFunction { name: name.clone() })?;
                let (min, max) = function.arity();
                if args.len() < min || max.map_or(false, |max| args.len() > max) {
                    return Err(ExpressionError::FunctionArgumentCount {
                        function: function.name().to_string(),
                        expected: match max {
                            Some(max) if max == min => min.to_string(),
                            Some(max) => format!("{}..{}", min, max),
                            None => format!("at least {}", min),
                        },
                        actual: args.len(),
                    });
                }
                for arg in args {
                    self.expression(arg)?;
                }
                self.emit(Instruction::Call {
                    function,
                    argc: args.len(),
                });
            }

            Expression::Case {
                conditions,
                else_result,
            } => {
                let mut exits = Vec::with_capacity(conditions.len());
                for (condition, result) in conditions {
                    self.expression(condition)?;
                    let skip = self.emit(Instruction::JumpUnlessTrue(0));
                    self.expression(result)?;
                    exits.push(self.emit(Instruction::Jump(0)));
                    self.patch(skip);
                }
                match else_result {
                    Some(e) => self.expression(e)?,
                    None => self.constant(&Value::Null),
                }
                for exit in exits {
                    self.patch(exit);
                }
            }

            Expression::In {
                expr,
                list,
                negated,
            } => {
                self.expression(expr)?;
                for item in list {
                    self.expression(item)?;
                }
                self.emit(Instruction::InList {
                    len: list.len(),
                    negated: *negated,
                });
            }

            Expression::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let lowered = Expression::and(
                    Expression::ge((**expr).clone(), (**low).clone()),
                    Expression::le((**expr).clone(), (**high).clone()),
                );
                self.expression(&lowered)?;
                if *negated {
                    self.emit(Instruction::Unary(crate::expression::UnaryOperator::Not));
                }
            }

            Expression::Cast { expr, data_type } => {
                self.expression(expr)?;
                self.emit(Instruction::Cast(*data_type));
            }
        }
        Ok(())
    }
}

/// Phase two: a verified program bound into the [`Scalar`] contract.
pub struct CompiledScalar {
    name: String,
    program: Program,
    stack: RefCell<Vec<Value>>,
}

impl CompiledScalar {
    fn new(name: String, program: Program) -> Self {
        let stack = RefCell::new(Vec::with_capacity(program.max_stack()));
        Self {
            name,
            program,
            stack,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Program {
        &self.program
    }
}

impl Scalar for CompiledScalar {
    fn execute_into(&self, context: &Context, results: &mut [Value]) -> ExpressionResult<()> {
        match self.stack.try_borrow_mut() {
            Ok(mut stack) => self.program.run(context, &mut stack, results),
            Err(_) => {
                let mut stack = Vec::with_capacity(self.program.max_stack());
                self.program.run(context, &mut stack, results)
            }
        }
    }

    fn output_count(&self) -> usize {
        self.program.outputs()
    }
}
