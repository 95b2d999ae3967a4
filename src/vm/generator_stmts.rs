//! Statement lowering: control flow, loops and imports.

use crate::ast::{DeclKind, Expr, ImportBinding, ImportDecl, Stmt, StmtKind};
use crate::error::CompileError;
use crate::span::Span;

use super::generator::{CompileResult, FunctionType, Generator};
use super::opcode::Op;

impl Generator {
    /// Compile a statement. The stack is left as it was, plus one slot for
    /// every local the statement declares.
    pub fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        let line = stmt.span.line;
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expr(expr)?;
                self.emit(Op::Pop, line);
            }
            StmtKind::Declaration(decl) => {
                let global = self.scope_depth == 0;
                self.compile_declaration(decl, stmt.span)?;
                if global {
                    self.emit(Op::Pop, line);
                }
            }
            StmtKind::Block(stmts) => {
                self.begin_scope();
                let result = stmts.iter().try_for_each(|s| self.compile_stmt(s));
                self.end_scope(line);
                result?;
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_if(condition, then_branch, else_branch.as_deref(), line)?;
            }
            StmtKind::While { condition, body } => {
                self.compile_while(condition, body, line)?;
            }
            StmtKind::For {
                iterable,
                value,
                index,
                body,
            } => {
                self.compile_for(iterable, value.as_deref(), index.as_deref(), body, stmt.span)?;
            }
            StmtKind::Loop {
                init,
                condition,
                step,
                body,
            } => {
                self.begin_scope();
                let result =
                    self.compile_loop(init.as_deref(), condition.as_ref(), step.as_ref(), body, line);
                self.end_scope(line);
                result?;
            }
            StmtKind::Break(depth) => {
                self.check_loop_depth("break", *depth, stmt.span)?;
                self.emit(Op::Break(*depth as u8), line);
            }
            StmtKind::Continue(depth) => {
                self.check_loop_depth("continue", *depth, stmt.span)?;
                self.emit(Op::Continue(*depth as u8), line);
            }
            StmtKind::Return(expr) => {
                match expr {
                    Some(expr) => {
                        self.compile_expr(expr)?;
                        self.check_return_type(expr);
                    }
                    None => {
                        self.emit(Op::Null, line);
                    }
                }
                self.emit(Op::Return, line);
            }
            StmtKind::Yield(expr) => {
                if self.function_type != FunctionType::Coroutine {
                    return Err(CompileError::new("'yield' outside of a function", stmt.span));
                }
                match expr {
                    Some(expr) => self.compile_expr(expr)?,
                    None => {
                        self.emit(Op::Null, line);
                    }
                }
                self.emit(Op::Yield, line);
            }
            StmtKind::Import(decl) => {
                self.compile_import(decl, stmt.span)?;
            }
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
        line: usize,
    ) -> CompileResult<()> {
        self.compile_expr(condition)?;
        let then_jump = self.emit(Op::JumpIfFalse(0), line);

        self.compile_stmt(then_branch)?;

        if let Some(else_stmt) = else_branch {
            let else_jump = self.emit(Op::Jump(0), line);
            self.patch_jump(then_jump);
            self.compile_stmt(else_stmt)?;
            self.patch_jump(else_jump);
        } else {
            self.patch_jump(then_jump);
        }
        Ok(())
    }

    /// Compile a loop body one level deeper in the loop nesting.
    fn compile_loop_body(&mut self, body: &Stmt) -> CompileResult<()> {
        self.loop_depth += 1;
        let result = self.compile_stmt(body);
        self.loop_depth -= 1;
        result
    }

    fn compile_while(&mut self, condition: &Expr, body: &Stmt, line: usize) -> CompileResult<()> {
        let enter = self.emit(
            Op::LoopEnter {
                continue_at: 0,
                exit_at: 0,
            },
            line,
        );
        let loop_start = self.current_offset();

        self.compile_expr(condition)?;
        let exit_jump = self.emit(Op::JumpIfFalse(0), line);

        self.compile_loop_body(body)?;
        self.emit(Op::Jump(loop_start as u32), line);

        self.patch_jump(exit_jump);
        let exit = self.current_offset();
        self.proto.chunk.patch_loop(enter, loop_start, exit);
        self.emit(Op::LoopExit, line);
        Ok(())
    }

    fn compile_for(
        &mut self,
        iterable: &Expr,
        value: Option<&str>,
        index: Option<&str>,
        body: &Stmt,
        span: Span,
    ) -> CompileResult<()> {
        let line = span.line;
        self.begin_scope();
        let result = self.compile_for_inner(iterable, value, index, body, span);
        self.end_scope(line);
        result
    }

    fn compile_for_inner(
        &mut self,
        iterable: &Expr,
        value: Option<&str>,
        index: Option<&str>,
        body: &Stmt,
        span: Span,
    ) -> CompileResult<()> {
        let line = span.line;

        // Binding slots sit beneath the iterable, but the iterable is
        // compiled before they come into scope.
        for _ in value.iter().chain(index.iter()) {
            self.emit(Op::Null, line);
        }
        self.compile_expr(iterable)?;

        let value_slot = match value {
            Some(name) => Some(self.add_local(name, DeclKind::Let, None, None, span)?),
            None => None,
        };
        let index_slot = match index {
            Some(name) => Some(self.add_local(name, DeclKind::Let, None, None, span)?),
            None => None,
        };

        let init = self.emit(
            Op::ForInit {
                continue_at: 0,
                exit_at: 0,
            },
            line,
        );
        let next = self.emit(
            Op::ForNext {
                value: value_slot,
                index: index_slot,
                exit: 0,
            },
            line,
        );

        self.compile_loop_body(body)?;
        self.emit(Op::Jump(next as u32), line);

        self.patch_jump(next);
        let exit = self.current_offset();
        self.proto.chunk.patch_loop(init, next, exit);
        self.emit(Op::LoopExit, line);
        Ok(())
    }

    fn compile_loop(
        &mut self,
        init: Option<&Stmt>,
        condition: Option<&Expr>,
        step: Option<&Expr>,
        body: &Stmt,
        line: usize,
    ) -> CompileResult<()> {
        if let Some(init) = init {
            self.compile_stmt(init)?;
        }

        let enter = self.emit(
            Op::LoopEnter {
                continue_at: 0,
                exit_at: 0,
            },
            line,
        );
        let loop_start = self.current_offset();

        let exit_jump = match condition {
            Some(condition) => {
                self.compile_expr(condition)?;
                Some(self.emit(Op::JumpIfFalse(0), line))
            }
            None => None,
        };

        self.compile_loop_body(body)?;

        let step_at = self.current_offset();
        if let Some(step) = step {
            self.compile_expr(step)?;
            self.emit(Op::Pop, line);
        }
        self.emit(Op::Jump(loop_start as u32), line);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
        }
        let exit = self.current_offset();
        self.proto.chunk.patch_loop(enter, step_at, exit);
        self.emit(Op::LoopExit, line);
        Ok(())
    }

    fn compile_import(&mut self, decl: &ImportDecl, span: Span) -> CompileResult<()> {
        let line = span.line;
        self.compile_expr(&decl.path)?;
        self.emit(Op::Import, line);

        match &decl.binding {
            ImportBinding::Module(name) => {
                if self.scope_depth == 0 {
                    self.define_global(name, DeclKind::Let, None, None, span)?;
                    self.emit(Op::Pop, line);
                } else {
                    self.bind_local_name(name, DeclKind::Let, None, None, span)?;
                }
            }
            ImportBinding::Names(names) if self.scope_depth == 0 => {
                for (name, name_span) in names {
                    let idx = self.add_string_constant(name, *name_span)?;
                    self.emit(Op::Dup, line);
                    self.emit(Op::ImportName(idx), line);
                    self.define_global(name, DeclKind::Let, None, None, *name_span)?;
                    self.emit(Op::Pop, line);
                }
                self.emit(Op::Pop, line);
            }
            ImportBinding::Names(names) => {
                let module = self.add_hidden_local(span)?;
                for (name, name_span) in names {
                    let idx = self.add_string_constant(name, *name_span)?;
                    self.emit(Op::GetLocal(module), line);
                    self.emit(Op::ImportName(idx), line);
                    self.bind_local_name(name, DeclKind::Let, None, None, *name_span)?;
                }
            }
        }
        Ok(())
    }
}
