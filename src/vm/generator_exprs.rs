//! Expression lowering.

use std::rc::Rc;

use crate::ast::{
    Argument, BinaryOp, DeclKind, Expr, ExprKind, FunctionLiteral, LogicalOp, TemplateSegment, UnaryOp,
};
use crate::error::CompileError;
use crate::span::Span;
use crate::types::TypeRepr;

use super::capture;
use super::chunk::{Constant, ParamInfo};
use super::generator::{CaptureBinding, CompileResult, FunctionType, Generator, VariableAccess};
use super::opcode::Op;

impl Generator {
    /// Compile an expression; its value is left on the stack.
    pub fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        let span = expr.span;
        let line = span.line;
        match &expr.kind {
            ExprKind::Number(n) => {
                self.emit_constant(Constant::Number(*n), span)?;
            }
            ExprKind::StringLiteral(s) => {
                self.emit_constant(Constant::String(s.clone()), span)?;
            }
            ExprKind::Template(segments) => {
                self.compile_template(segments, span)?;
            }
            ExprKind::BoolLiteral(b) => {
                self.emit(if *b { Op::True } else { Op::False }, line);
            }
            ExprKind::Null => {
                self.emit(Op::Null, line);
            }
            ExprKind::Variable(name) => {
                self.compile_variable_get(name, span)?;
            }
            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit_binary_op(*operator, line);
            }
            ExprKind::Unary { operator, operand } => {
                self.compile_expr(operand)?;
                match operator {
                    UnaryOp::Negate => self.emit(Op::Negate, line),
                    UnaryOp::Not => self.emit(Op::Not, line),
                };
            }
            ExprKind::Logical {
                left,
                operator,
                right,
            } => {
                self.compile_expr(left)?;
                let jump = match operator {
                    LogicalOp::And => Op::JumpIfFalseNoPop(0),
                    LogicalOp::Or => Op::JumpIfTrueNoPop(0),
                    LogicalOp::Nullish => Op::JumpIfNotNull(0),
                    LogicalOp::ErrorCoalesce => Op::JumpIfNotError(0),
                };
                let jump = self.emit(jump, line);
                self.emit(Op::Pop, line);
                self.compile_expr(right)?;
                self.patch_jump(jump);
            }
            ExprKind::Grouping(inner) => {
                self.compile_expr(inner)?;
            }
            ExprKind::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(condition)?;
                let else_jump = self.emit(Op::JumpIfFalse(0), line);
                self.compile_expr(then_branch)?;
                let end_jump = self.emit(Op::Jump(0), line);
                self.patch_jump(else_jump);
                self.compile_expr(else_branch)?;
                self.patch_jump(end_jump);
            }
            ExprKind::Assign { target, value } => {
                self.compile_assign(target, value, span)?;
            }
            ExprKind::CompoundAssign {
                target,
                operator,
                value,
            } => {
                self.compile_compound_assign(target, *operator, value, span)?;
            }
            ExprKind::Call { callee, arguments } => {
                self.compile_call(callee, arguments, span)?;
            }
            ExprKind::Member { object, name } => {
                self.compile_expr(object)?;
                let idx = self.add_string_constant(name, span)?;
                self.emit(Op::GetProperty(idx), line);
            }
            ExprKind::Index { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.emit(Op::GetIndex, line);
            }
            ExprKind::List(elements) => {
                for element in elements {
                    self.compile_expr(element)?;
                }
                let count = u16::try_from(elements.len())
                    .map_err(|_| CompileError::new("Too many list elements", span))?;
                self.emit(Op::List(count), line);
            }
            ExprKind::Object(fields) => {
                for (key, value) in fields {
                    self.emit_constant(Constant::String(key.clone()), span)?;
                    self.compile_expr(value)?;
                }
                let count = u16::try_from(fields.len())
                    .map_err(|_| CompileError::new("Too many object fields", span))?;
                self.emit(Op::Object(count), line);
            }
            ExprKind::Function(func) => {
                self.compile_function_literal(func, span)?;
            }
        }
        Ok(())
    }

    pub fn compile_variable_get(&mut self, name: &str, span: Span) -> CompileResult<()> {
        match self.resolve_variable(name) {
            VariableAccess::Local(slot) => {
                self.emit(Op::GetLocal(slot), span.line);
            }
            VariableAccess::Global(name) => {
                let idx = self.add_string_constant(&name, span)?;
                self.emit(Op::GetGlobal(idx), span.line);
            }
        }
        Ok(())
    }

    pub fn emit_binary_op(&mut self, op: BinaryOp, line: usize) {
        let op = match op {
            BinaryOp::Add => Op::Add,
            BinaryOp::Subtract => Op::Subtract,
            BinaryOp::Multiply => Op::Multiply,
            BinaryOp::Divide => Op::Divide,
            BinaryOp::Modulo => Op::Modulo,
            BinaryOp::Power => Op::Power,
            BinaryOp::Equal => Op::Equal,
            BinaryOp::NotEqual => Op::NotEqual,
            BinaryOp::Less => Op::Less,
            BinaryOp::LessEqual => Op::LessEqual,
            BinaryOp::Greater => Op::Greater,
            BinaryOp::GreaterEqual => Op::GreaterEqual,
        };
        self.emit(op, line);
    }

    fn compile_template(&mut self, segments: &[TemplateSegment], span: Span) -> CompileResult<()> {
        if segments.is_empty() {
            return self.emit_constant(Constant::String(String::new()), span);
        }
        for segment in segments {
            match segment {
                TemplateSegment::Text(text) => {
                    self.emit_constant(Constant::String(text.clone()), span)?;
                }
                TemplateSegment::Expr(expr) => {
                    self.compile_expr(expr)?;
                }
            }
        }
        let count = u16::try_from(segments.len())
            .map_err(|_| CompileError::new("Template string too long", span))?;
        self.emit(Op::BuildString(count), span.line);
        Ok(())
    }

    /// Slot of a local the target names, refusing constants.
    fn assignable_slot(&self, name: &str, span: Span) -> CompileResult<Option<u16>> {
        match self.resolve_local(name) {
            Some(slot) if self.locals[slot as usize].kind.is_const() => {
                Err(CompileError::ConstAssignment(name.to_string(), span))
            }
            other => Ok(other),
        }
    }

    fn compile_assign(&mut self, target: &Expr, value: &Expr, span: Span) -> CompileResult<()> {
        let line = span.line;
        match &target.kind {
            ExprKind::Variable(name) => {
                let slot = self.assignable_slot(name, target.span)?;
                self.compile_expr(value)?;
                self.check_assignment(name, value);
                match slot {
                    Some(slot) => {
                        self.emit(Op::SetLocal(slot), line);
                    }
                    None => {
                        let idx = self.add_string_constant(name, span)?;
                        self.emit(Op::SetGlobal(idx), line);
                    }
                }
            }
            ExprKind::Member { object, name } => {
                self.compile_expr(object)?;
                self.compile_expr(value)?;
                let idx = self.add_string_constant(name, span)?;
                self.emit(Op::SetProperty(idx), line);
            }
            ExprKind::Index { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.compile_expr(value)?;
                self.emit(Op::SetIndex, line);
            }
            _ => return Err(CompileError::new("Invalid assignment target", target.span)),
        }
        Ok(())
    }

    fn compile_compound_assign(
        &mut self,
        target: &Expr,
        op: BinaryOp,
        value: &Expr,
        span: Span,
    ) -> CompileResult<()> {
        let line = span.line;
        match &target.kind {
            ExprKind::Variable(name) => match self.assignable_slot(name, target.span)? {
                Some(slot) => {
                    self.compile_expr(value)?;
                    self.emit(Op::UpdateLocal(slot, op), line);
                }
                None => {
                    let idx = self.add_string_constant(name, span)?;
                    self.emit(Op::GetGlobal(idx), line);
                    self.compile_expr(value)?;
                    self.emit_binary_op(op, line);
                    self.emit(Op::SetGlobal(idx), line);
                }
            },
            ExprKind::Member { object, name } => {
                let idx = self.add_string_constant(name, span)?;
                self.compile_expr(object)?;
                self.emit(Op::Dup, line);
                self.emit(Op::GetProperty(idx), line);
                self.compile_expr(value)?;
                self.emit_binary_op(op, line);
                self.emit(Op::SetProperty(idx), line);
            }
            ExprKind::Index { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.emit(Op::Dup2, line);
                self.emit(Op::GetIndex, line);
                self.compile_expr(value)?;
                self.emit_binary_op(op, line);
                self.emit(Op::SetIndex, line);
            }
            _ => return Err(CompileError::new("Invalid assignment target", target.span)),
        }
        Ok(())
    }

    fn compile_call(&mut self, callee: &Expr, arguments: &[Argument], span: Span) -> CompileResult<()> {
        self.check_call_arguments(callee, arguments);

        if let ExprKind::Member { object, name } = &callee.kind {
            // Receiver stays beneath the arguments
            self.compile_expr(object)?;
            let (argc, names) = self.compile_arguments(arguments, span)?;
            let name = self.add_string_constant(name, span)?;
            self.emit(Op::Invoke { name, argc, names }, span.line);
            return Ok(());
        }

        self.compile_expr(callee)?;
        let (argc, names) = self.compile_arguments(arguments, span)?;
        self.emit(Op::Call { argc, names }, span.line);
        Ok(())
    }

    /// Push positional then named argument values. Returns the total count
    /// and the constant listing the named arguments' names.
    fn compile_arguments(&mut self, arguments: &[Argument], span: Span) -> CompileResult<(u8, Option<u16>)> {
        let argc = u8::try_from(arguments.len())
            .map_err(|_| CompileError::new("Too many arguments (max 255)", span))?;

        let mut names = Vec::new();
        for arg in arguments {
            match arg {
                Argument::Positional(expr) => self.compile_expr(expr)?,
                Argument::Named(named) => {
                    self.compile_expr(&named.value)?;
                    names.push(named.name.clone());
                }
            }
        }

        let names = if names.is_empty() {
            None
        } else {
            Some(self.add_constant(Constant::Names(Rc::from(names)), span)?)
        };
        Ok((argc, names))
    }

    fn compile_function_literal(&mut self, func: &FunctionLiteral, span: Span) -> CompileResult<()> {
        let line = span.line;

        // Defaults are evaluated in the defining scope
        let mut defaults = 0u8;
        for param in &func.params {
            if let Some(default) = &param.default_value {
                self.compile_expr(default)?;
                defaults = defaults
                    .checked_add(1)
                    .ok_or_else(|| CompileError::new("Too many default parameters", span))?;
            }
        }

        let mut params = Vec::with_capacity(func.params.len());
        for param in &func.params {
            params.push(ParamInfo {
                name: param.name.clone(),
                has_default: param.default_value.is_some(),
                is_rest: param.is_rest,
                ty: param
                    .type_annotation
                    .as_ref()
                    .map(TypeRepr::from_annotation)
                    .transpose()?,
            });
        }
        let return_type = func
            .return_type
            .as_ref()
            .map(TypeRepr::from_annotation)
            .transpose()?;

        let captures: Vec<_> = capture::free_identifiers(func)
            .into_iter()
            .filter_map(|name| self.capture_source(&name).map(|source| (name, source)))
            .collect();

        let is_coroutine = capture::contains_yield(&func.body);
        let function_type = if is_coroutine {
            FunctionType::Coroutine
        } else {
            FunctionType::Function
        };

        self.start_function(function_type, func.name.clone().unwrap_or_default());
        self.proto.params = params;
        self.proto.return_type = return_type;
        self.proto.is_coroutine = is_coroutine;

        let result = self.compile_function_body(func, captures, span);
        let proto = self.finish_function();
        result?;

        let idx = self.add_constant(Constant::Function(Rc::new(proto)), span)?;
        self.emit(Op::Closure { proto: idx, defaults }, line);
        Ok(())
    }

    fn compile_function_body(
        &mut self,
        func: &FunctionLiteral,
        captures: Vec<(String, CaptureBinding)>,
        span: Span,
    ) -> CompileResult<()> {
        let params = self.proto.params.clone();
        for param in &params {
            self.add_local(&param.name, DeclKind::Let, param.ty.clone(), None, span)?;
        }
        for (name, (source, kind, ty, sig)) in captures {
            self.add_capture(&name, source, kind, ty, sig);
        }
        self.compile_body(&func.body, span.line)
    }
}
