//! Bytecode compiler: lowers the AST to a flat instruction stream.
//!
//! The compiler walks the AST exactly once, emitting into the current
//! compilation scope. Function literals push a fresh scope (and an enclosed
//! symbol table); leaving the scope yields the finished instruction stream
//! for the function's constant. Jump targets use a placeholder/patch
//! approach: jumps are emitted with a dummy operand and rewritten in place
//! once the real target offset is known.
//!
//! Two peephole rewrites keep expression semantics value-producing: the
//! trailing `Pop` of an `if` arm is removed so the arm leaves its value on
//! the stack, and the trailing `Pop` of a function body becomes
//! `ReturnValue` so the body's last expression is the implicit return.

use std::mem;
use std::rc::Rc;

use crate::ast::{BlockStatement, Expression, InfixOperator, PrefixOperator, Program, Statement};
use crate::builtins::BUILTINS;
use crate::code::{self, Instructions, Op};
use crate::error::{Error, Result};
use crate::symbols::{Symbol, SymbolScope, SymbolTable};
use crate::value::{CompiledFunction, Value};

/// Jump operand emitted before the target offset is known. Always patched
/// via [`Compiler::change_operand`] before the stream is finished.
const PLACEHOLDER_TARGET: usize = 0xffff;

/// The compiled unit handed to the VM: the main instruction stream plus the
/// constant pool it references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

/// Opcode and byte offset of an instruction already written to a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EmittedInstruction {
    opcode: Op,
    position: usize,
}

/// One function body under compilation: its instruction stream and the
/// bookkeeping the peephole rewrites need.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// Compiles a [`Program`] into a [`Bytecode`] unit.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    /// Scope stack; index 0 is the main scope.
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    /// A fresh compiler with the builtin registry pre-defined at its fixed
    /// indices.
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }

        Self {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// A compiler seeded with the symbol table and constant pool of a
    /// previous compilation, so an interactive session accumulates
    /// definitions across inputs. Global and builtin indices stay stable.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        let mut compiler = Self::new();
        compiler.symbol_table = symbol_table;
        compiler.constants = constants;
        compiler
    }

    /// Hand the symbol table and constant pool back for the next
    /// [`Compiler::new_with_state`] in the session.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbol_table, self.constants)
    }

    /// Compile a program into the current (main) scope.
    pub fn compile(&mut self, program: &Program) -> Result<()> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    /// The finished unit: the main scope's instructions plus the constant
    /// pool.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current_instructions().clone(),
            constants: self.constants.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn compile_statement(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::Let { name, value } => {
                // Defined before the value compiles, so a function literal
                // bound by this let can resolve its own name recursively.
                let symbol = self.symbol_table.define(name);
                self.compile_expression(value)?;
                if symbol.scope == SymbolScope::Global {
                    self.emit(Op::SetGlobal, &[symbol.index]);
                } else {
                    self.emit(Op::SetLocal, &[symbol.index]);
                }
            }
            Statement::Return(value) => {
                self.compile_expression(value)?;
                self.emit(Op::ReturnValue, &[]);
            }
            Statement::Expression(expression) => {
                self.compile_expression(expression)?;
                self.emit(Op::Pop, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<()> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn compile_expression(&mut self, expression: &Expression) -> Result<()> {
        match expression {
            Expression::IntegerLiteral(value) => {
                let index = self.add_constant(Value::Integer(*value));
                self.emit(Op::Constant, &[index]);
            }
            Expression::BooleanLiteral(value) => {
                self.emit(if *value { Op::True } else { Op::False }, &[]);
            }
            Expression::StringLiteral(value) => {
                let index = self.add_constant(Value::Str(Rc::from(value.as_str())));
                self.emit(Op::Constant, &[index]);
            }
            Expression::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| Error::UndefinedVariable(name.clone()))?;
                self.load_symbol(&symbol);
            }
            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator {
                    PrefixOperator::Neg => self.emit(Op::Minus, &[]),
                    PrefixOperator::Not => self.emit(Op::Bang, &[]),
                };
            }
            Expression::Infix {
                operator,
                left,
                right,
            } => self.compile_infix(*operator, left, right)?,
            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref())?,
            Expression::Function { parameters, body } => {
                self.compile_function(parameters, body)?;
            }
            Expression::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Op::Call, &[arguments.len()]);
            }
            Expression::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Op::Array, &[elements.len()]);
            }
            Expression::Hash(pairs) => {
                // The literal is unordered; sorting keys by their rendered
                // form makes the emitted bytecode canonical.
                let mut pairs: Vec<&(Expression, Expression)> = pairs.iter().collect();
                pairs.sort_by_cached_key(|pair| pair.0.to_string());

                for pair in &pairs {
                    self.compile_expression(&pair.0)?;
                    self.compile_expression(&pair.1)?;
                }
                self.emit(Op::Hash, &[pairs.len() * 2]);
            }
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Op::Index, &[]);
            }
        }
        Ok(())
    }

    fn compile_infix(
        &mut self,
        operator: InfixOperator,
        left: &Expression,
        right: &Expression,
    ) -> Result<()> {
        // `a < b` compiles as `b > a`; there is no dedicated less-than
        // opcode.
        if operator == InfixOperator::Lt {
            self.compile_expression(right)?;
            self.compile_expression(left)?;
            self.emit(Op::GreaterThan, &[]);
            return Ok(());
        }

        self.compile_expression(left)?;
        self.compile_expression(right)?;
        match operator {
            InfixOperator::Add => self.emit(Op::Add, &[]),
            InfixOperator::Sub => self.emit(Op::Sub, &[]),
            InfixOperator::Mul => self.emit(Op::Mul, &[]),
            InfixOperator::Div => self.emit(Op::Div, &[]),
            InfixOperator::Eq => self.emit(Op::Equal, &[]),
            InfixOperator::NotEq => self.emit(Op::NotEqual, &[]),
            InfixOperator::Gt => self.emit(Op::GreaterThan, &[]),
            InfixOperator::Lt => unreachable!("handled above"),
        };
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expression,
        consequence: &BlockStatement,
        alternative: Option<&BlockStatement>,
    ) -> Result<()> {
        self.compile_expression(condition)?;

        let jump_not_truthy_pos = self.emit(Op::JumpNotTruthy, &[PLACEHOLDER_TARGET]);

        self.compile_block(consequence)?;
        if self.last_instruction_is(Op::Pop) {
            self.remove_last_pop();
        }

        let jump_pos = self.emit(Op::Jump, &[PLACEHOLDER_TARGET]);

        let after_consequence = self.current_instructions().len();
        self.change_operand(jump_not_truthy_pos, after_consequence);

        match alternative {
            None => {
                self.emit(Op::Null, &[]);
            }
            Some(alternative) => {
                self.compile_block(alternative)?;
                if self.last_instruction_is(Op::Pop) {
                    self.remove_last_pop();
                }
            }
        }

        let after_alternative = self.current_instructions().len();
        self.change_operand(jump_pos, after_alternative);

        Ok(())
    }

    fn compile_function(&mut self, parameters: &[String], body: &BlockStatement) -> Result<()> {
        self.enter_scope();

        for parameter in parameters {
            self.symbol_table.define(parameter);
        }

        self.compile_block(body)?;

        if self.last_instruction_is(Op::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(Op::ReturnValue) {
            self.emit(Op::Return, &[]);
        }

        let free_symbols = self.symbol_table.free_symbols.clone();
        let num_locals = self.symbol_table.num_definitions;
        let instructions = self.leave_scope();

        // Materialize the captures: load each free symbol's original
        // binding, in capture order, from the enclosing scope.
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let function = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: parameters.len(),
        };
        let index = self.add_constant(Value::Function(Rc::new(function)));
        self.emit(Op::Closure, &[index, free_symbols.len()]);

        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Op::GetLocal, &[symbol.index]),
            SymbolScope::Free => self.emit(Op::GetFree, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Op::GetBuiltin, &[symbol.index]),
        };
    }

    // -----------------------------------------------------------------------
    // Emission helpers
    // -----------------------------------------------------------------------

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Encode and append an instruction to the current scope. Returns the
    /// byte offset the instruction starts at.
    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let instruction = code::make(op, operands);
        let position = self.add_instruction(&instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn add_instruction(&mut self, instruction: &[u8]) -> usize {
        let scope = self.current_scope_mut();
        let position = scope.instructions.len();
        scope.instructions.extend_from_slice(instruction);
        position
    }

    fn set_last_instruction(&mut self, opcode: Op, position: usize) {
        let scope = self.current_scope_mut();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, opcode: Op) -> bool {
        self.current_scope()
            .last_instruction
            .is_some_and(|last| last.opcode == opcode)
    }

    /// Truncate the stream to drop the last instruction (always a `Pop`)
    /// and restore the previous-instruction bookkeeping.
    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        let last = scope
            .last_instruction
            .expect("remove_last_pop with no emitted instruction");
        scope.instructions.truncate(last.position);
        scope.last_instruction = scope.previous_instruction;
    }

    fn replace_last_pop_with_return(&mut self) {
        let position = self
            .current_scope()
            .last_instruction
            .expect("replace_last_pop_with_return with no emitted instruction")
            .position;

        let new_instruction = code::make(Op::ReturnValue, &[]);
        self.replace_instruction(position, &new_instruction);

        if let Some(last) = &mut self.current_scope_mut().last_instruction {
            last.opcode = Op::ReturnValue;
        }
    }

    /// Overwrite the instruction starting at `position` in place. Only used
    /// for same-width rewrites, so the surrounding stream stays intact.
    fn replace_instruction(&mut self, position: usize, new_instruction: &[u8]) {
        let instructions = &mut self.current_scope_mut().instructions;
        instructions[position..position + new_instruction.len()].copy_from_slice(new_instruction);
    }

    /// Re-encode the instruction at `position` with a new operand. This is
    /// how jump placeholders get patched to real offsets.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let opcode = Op::try_from(self.current_instructions()[position])
            .expect("change_operand called off an instruction boundary");
        let new_instruction = code::make(opcode, &[operand]);
        self.replace_instruction(position, &new_instruction);
    }

    // -----------------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------------

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().expect("scope stack is never empty")
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("scope stack is never empty")
    }

    fn current_instructions(&self) -> &Instructions {
        &self.current_scope().instructions
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("leave_scope without enter_scope");
        let table = mem::take(&mut self.symbol_table);
        self.symbol_table = table.into_outer().unwrap_or_default();
        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
