//! Stack-machine form of a lowered expression list.
//!
//! Lowering turns expression trees into a flat instruction sequence over an
//! operand stack. Each top-level expression ends in a `Store` into its output
//! slot. Jumps only go forward, which keeps verification a single pass.

use crate::access::{DataType, Value};
use crate::expression::eval::{
    cast_value, evaluate_binary_op, evaluate_function, evaluate_in_list, evaluate_unary_op,
};
use crate::expression::scalar::Context;
use crate::expression::{
    BinaryOperator, ExpressionError, ExpressionResult, Function, UnaryOperator,
};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Push `context.values[i]`
    LoadInput(usize),
    /// Push `constants[i]`
    LoadConst(usize),
    /// Push the data context's positional parameter `i`
    LoadParam(usize),
    Binary(BinaryOperator),
    Unary(UnaryOperator),
    Call { function: Function, argc: usize },
    Cast(DataType),
    /// Pop `len` list items and the needle beneath them
    InList { len: usize, negated: bool },
    /// Pop a condition; continue at the target unless it is TRUE
    JumpUnlessTrue(usize),
    Jump(usize),
    /// Pop into output slot `i`
    Store(usize),
}

impl Instruction {
    /// (values popped, values pushed)
    fn stack_effect(&self) -> (usize, usize) {
        match self {
            Instruction::LoadInput(_) | Instruction::LoadConst(_) | Instruction::LoadParam(_) => {
                (0, 1)
            }
            Instruction::Binary(_) => (2, 1),
            Instruction::Unary(_) | Instruction::Cast(_) => (1, 1),
            Instruction::Call { argc, .. } => (*argc, 1),
            Instruction::InList { len, .. } => (len + 1, 1),
            Instruction::JumpUnlessTrue(_) => (1, 0),
            Instruction::Jump(_) => (0, 0),
            Instruction::Store(_) => (1, 0),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::LoadInput(i) => write!(f, "load_input  {}", i),
            Instruction::LoadConst(i) => write!(f, "load_const  #{}", i),
            Instruction::LoadParam(i) => write!(f, "load_param  ?{}", i),
            Instruction::Binary(op) => write!(f, "binary      {}", op.as_str()),
            Instruction::Unary(op) => write!(f, "unary       {}", op.as_str()),
            Instruction::Call { function, argc } => write!(f, "call        {}/{}", function, argc),
            Instruction::Cast(t) => write!(f, "cast        {}", t),
            Instruction::InList { len, negated } => {
                write!(f, "in_list     {}{}", len, if *negated { " negated" } else { "" })
            }
            Instruction::JumpUnlessTrue(target) => write!(f, "jump_unless @{}", target),
            Instruction::Jump(target) => write!(f, "jump        @{}", target),
            Instruction::Store(slot) => write!(f, "store       out[{}]", slot),
        }
    }
}

/// A verified instruction sequence plus its constant pool
#[derive(Debug, Clone)]
pub struct Program {
    instructions: Vec<Instruction>,
    constants: Vec<Value>,
    outputs: usize,
    input_width: usize,
    max_stack: usize,
}

impl Program {
    /// Check stack discipline, jump targets and output slots.
    pub fn verify(
        instructions: Vec<Instruction>,
        constants: Vec<Value>,
        outputs: usize,
        input_width: usize,
    ) -> ExpressionResult<Program> {
        let invalid = |reason: String| ExpressionError::InvalidProgram { reason };
        let len = instructions.len();
        // Expected depth at each jump target (index `len` is the exit)
        let mut depth_at: Vec<Option<usize>> = vec![None; len + 1];
        let mut stored = vec![false; outputs];
        let mut depth = Some(0usize);
        let mut max_stack = 0;

        for (pc, instruction) in instructions.iter().enumerate() {
            depth = match (depth, depth_at[pc]) {
                (Some(d), Some(expected)) if d != expected => {
                    return Err(invalid(format!(
                        "stack depth {} at @{} disagrees with jump depth {}",
                        d, pc, expected
                    )))
                }
                (Some(d), _) => Some(d),
                (None, expected) => expected,
            };
            let Some(current) = depth else {
                return Err(invalid(format!("unreachable instruction at @{}", pc)));
            };

            let (pops, pushes) = instruction.stack_effect();
            if current < pops {
                return Err(invalid(format!("stack underflow at @{} ({})", pc, instruction)));
            }
            let next = current - pops + pushes;
            max_stack = max_stack.max(next);

            match instruction {
                Instruction::LoadInput(i) if *i >= input_width => {
                    return Err(ExpressionError::ColumnIndexOutOfBounds {
                        index: *i,
                        tuple_size: input_width,
                    })
                }
                Instruction::LoadConst(i) if *i >= constants.len() => {
                    return Err(invalid(format!("constant #{} does not exist", i)))
                }
                Instruction::Store(slot) => {
                    if *slot >= outputs {
                        return Err(invalid(format!("output slot {} out of range", slot)));
                    }
                    if std::mem::replace(&mut stored[*slot], true) {
                        return Err(invalid(format!("output slot {} stored twice", slot)));
                    }
                }
                Instruction::Jump(target) | Instruction::JumpUnlessTrue(target) => {
                    if *target <= pc || *target > len {
                        return Err(invalid(format!("bad jump target @{} at @{}", target, pc)));
                    }
                    match depth_at[*target] {
                        Some(expected) if expected != next => {
                            return Err(invalid(format!(
                                "jump to @{} with depth {}, expected {}",
                                target, next, expected
                            )))
                        }
                        _ => depth_at[*target] = Some(next),
                    }
                }
                _ => {}
            }

            depth = match instruction {
                Instruction::Jump(_) => None,
                _ => Some(next),
            };
        }

        let exit_depth = match (depth, depth_at[len]) {
            (Some(d), Some(expected)) if d != expected => {
                return Err(invalid(format!(
                    "fall-through depth {} disagrees with jump depth {} at exit",
                    d, expected
                )))
            }
            (Some(d), _) => Some(d),
            (None, expected) => expected,
        };
        if exit_depth != Some(0) {
            return Err(invalid(format!(
                "program exits with stack depth {:?}",
                exit_depth
            )));
        }
        if let Some(slot) = stored.iter().position(|s| !s) {
            return Err(invalid(format!("output slot {} never stored", slot)));
        }

        Ok(Program {
            instructions,
            constants,
            outputs,
            input_width,
            max_stack,
        })
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Execute against the context's current row.
    pub fn run(
        &self,
        context: &Context,
        stack: &mut Vec<Value>,
        results: &mut [Value],
    ) -> ExpressionResult<()> {
        stack.clear();
        let input = context.values();
        let mut pc = 0;

        while let Some(instruction) = self.instructions.get(pc) {
            pc += 1;
            match instruction {
                Instruction::LoadInput(i) => {
                    let value = input.get(*i).ok_or(ExpressionError::ColumnIndexOutOfBounds {
                        index: *i,
                        tuple_size: input.len(),
                    })?;
                    stack.push(value.clone());
                }
                Instruction::LoadConst(i) => stack.push(self.constants[*i].clone()),
                Instruction::LoadParam(i) => {
                    let value = context
                        .data_context()
                        .parameter(*i)
                        .ok_or(ExpressionError::UnboundParameter { index: *i })?;
                    stack.push(value.clone());
                }
                Instruction::Binary(op) => {
                    let right = pop(stack)?;
                    let left = pop(stack)?;
                    stack.push(evaluate_binary_op(*op, left, right)?);
                }
                Instruction::Unary(op) => {
                    let operand = pop(stack)?;
                    stack.push(evaluate_unary_op(*op, operand)?);
                }
                Instruction::Call { function, argc } => {
                    let args = split_top(stack, *argc)?;
                    stack.push(evaluate_function(*function, args)?);
                }
                Instruction::Cast(target) => {
                    let value = pop(stack)?;
                    stack.push(cast_value(value, *target)?);
                }
                Instruction::InList { len, negated } => {
                    let list = split_top(stack, *len)?;
                    let needle = pop(stack)?;
                    stack.push(evaluate_in_list(needle, &list, *negated)?);
                }
                Instruction::JumpUnlessTrue(target) => {
                    if pop(stack)? != Value::Boolean(true) {
                        pc = *target;
                    }
                }
                Instruction::Jump(target) => pc = *target,
                Instruction::Store(slot) => {
                    let value = pop(stack)?;
                    if let Some(out) = results.get_mut(*slot) {
                        *out = value;
                    }
                }
            }
        }
        Ok(())
    }
}

fn pop(stack: &mut Vec<Value>) -> ExpressionResult<Value> {
    stack.pop().ok_or_else(|| ExpressionError::InvalidProgram {
        reason: "operand stack underflow".to_string(),
    })
}

fn split_top(stack: &mut Vec<Value>, count: usize) -> ExpressionResult<Vec<Value>> {
    let at = stack
        .len()
        .checked_sub(count)
        .ok_or_else(|| ExpressionError::InvalidProgram {
            reason: "operand stack underflow".to_string(),
        })?;
    Ok(stack.split_off(at))
}

/// Textual listing, used as the diagnostic form of a compiled scalar
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "; inputs={} outputs={} max_stack={}",
            self.input_width, self.outputs, self.max_stack
        )?;
        for (i, constant) in self.constants.iter().enumerate() {
            writeln!(f, "#{} = {:?}", i, constant)?;
        }
        for (pc, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "@{:<4} {}", pc, instruction)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataContext;
    use std::sync::Arc;

    fn context(values: &[Value]) -> Context {
        let mut context = Context::new(Arc::new(DataContext::empty()));
        context.set_values(values);
        context
    }

    #[test]
    fn test_verify_and_run_straight_line() {
        let program = Program::verify(
            vec![
                Instruction::LoadInput(0),
                Instruction::LoadConst(0),
                Instruction::Binary(BinaryOperator::Add),
                Instruction::Store(0),
                Instruction::LoadInput(1),
                Instruction::Store(1),
            ],
            vec![Value::Int32(5)],
            2,
            2,
        )
        .unwrap();
        assert_eq!(program.max_stack(), 2);

        let mut stack = Vec::new();
        let mut out = vec![Value::Null; 2];
        program
            .run(&context(&[Value::Int32(1), Value::Int32(9)]), &mut stack, &mut out)
            .unwrap();
        assert_eq!(out, vec![Value::Int32(6), Value::Int32(9)]);
    }

    #[test]
    fn test_verify_rejects_bad_programs() {
        let underflow = Program::verify(vec![Instruction::Store(0)], vec![], 1, 0);
        assert!(matches!(underflow, Err(ExpressionError::InvalidProgram { .. })));

        let leftover = Program::verify(
            vec![Instruction::LoadConst(0), Instruction::LoadConst(0), Instruction::Store(0)],
            vec![Value::Null],
            1,
            0,
        );
        assert!(matches!(leftover, Err(ExpressionError::InvalidProgram { .. })));

        let missing_store = Program::verify(vec![], vec![], 1, 0);
        assert!(matches!(missing_store, Err(ExpressionError::InvalidProgram { .. })));

        let backwards = Program::verify(
            vec![Instruction::Jump(0)],
            vec![],
            0,
            0,
        );
        assert!(matches!(backwards, Err(ExpressionError::InvalidProgram { .. })));

        let out_of_range = Program::verify(
            vec![Instruction::LoadInput(3), Instruction::Store(0)],
            vec![],
            1,
            2,
        );
        assert!(matches!(
            out_of_range,
            Err(ExpressionError::ColumnIndexOutOfBounds { index: 3, tuple_size: 2 })
        ));
    }

    #[test]
    fn test_conditional_jumps() {
        // CASE WHEN $0 THEN 'yes' ELSE 'no' END
        let program = Program::verify(
            vec![
                Instruction::LoadInput(0),
                Instruction::JumpUnlessTrue(4),
                Instruction::LoadConst(0),
                Instruction::Jump(5),
                Instruction::LoadConst(1),
                Instruction::Store(0),
            ],
            vec![Value::from("yes"), Value::from("no")],
            1,
            1,
        )
        .unwrap();

        let mut stack = Vec::new();
        let mut out = vec![Value::Null];
        program
            .run(&context(&[Value::Boolean(true)]), &mut stack, &mut out)
            .unwrap();
        assert_eq!(out[0], Value::from("yes"));
        program
            .run(&context(&[Value::Null]), &mut stack, &mut out)
            .unwrap();
        assert_eq!(out[0], Value::from("no"));
    }

    #[test]
    fn test_listing() {
        let program = Program::verify(
            vec![Instruction::LoadInput(0), Instruction::Store(0)],
            vec![],
            1,
            1,
        )
        .unwrap();
        let listing = program.to_string();
        assert!(listing.contains("load_input  0"));
        assert!(listing.contains("store       out[0]"));
    }
}
