//! Declarations and destructuring patterns.

use std::rc::Rc;

use crate::ast::{DeclKind, Declaration, ExprKind, Pattern};
use crate::error::CompileError;
use crate::span::Span;
use crate::types::TypeRepr;

use super::generator::{CompileResult, FunctionSig, Generator, GlobalInfo};
use super::opcode::Op;

impl Generator {
    /// Compile a declaration. At module level the initializer value is left
    /// on the stack; inside a scope every bound name occupies a new slot.
    pub fn compile_declaration(&mut self, decl: &Declaration, span: Span) -> CompileResult<()> {
        let line = span.line;
        let annotated = decl
            .type_annotation
            .as_ref()
            .map(TypeRepr::from_annotation)
            .transpose()?;

        let mut sig = None;
        let ty = match &decl.initializer {
            Some(init) => {
                self.compile_expr(init)?;
                if let Some(expected) = &annotated {
                    self.check_declaration(expected, init);
                }
                if let ExprKind::Function(func) = &init.kind {
                    sig = Some(self.function_sig(func)?);
                }
                match annotated {
                    Some(ty) => Some(ty),
                    // A constant keeps the type of its initializer
                    None if decl.kind.is_const() => {
                        Some(self.infer_expr_type(init)).filter(|ty| !ty.is_any())
                    }
                    None => None,
                }
            }
            None => {
                if decl.kind.is_const() {
                    return Err(CompileError::new("Missing initializer for constant", span));
                }
                self.emit(Op::Null, line);
                annotated
            }
        };

        match &decl.pattern {
            Pattern::Identifier(name) if self.scope_depth == 0 => {
                self.define_global(name, decl.kind, ty, sig, span)
            }
            Pattern::Identifier(name) => self.bind_local_name(name, decl.kind, ty, sig, span),
            pattern if self.scope_depth == 0 => self.destructure_global(pattern, decl.kind, span),
            pattern => {
                let source = self.add_hidden_local(span)?;
                self.destructure_local(pattern, source, decl.kind, span)
            }
        }
    }

    /// Declare a module symbol from the value on top of the stack, which
    /// stays there.
    pub fn define_global(
        &mut self,
        name: &str,
        kind: DeclKind,
        ty: Option<TypeRepr>,
        sig: Option<Rc<FunctionSig>>,
        span: Span,
    ) -> CompileResult<()> {
        let idx = self.add_string_constant(name, span)?;
        self.emit(Op::DefineGlobal(idx, kind), span.line);

        // A rejected redeclaration keeps the original binding at runtime
        let replaces = self
            .globals
            .get(name)
            .map_or(true, |existing| existing.kind.can_redeclare() && kind.can_redeclare());
        if replaces {
            self.globals.insert(name.to_string(), GlobalInfo { kind, ty, sig });
        }
        Ok(())
    }

    /// Bind the value on top of the stack to a local name: a fresh slot, or
    /// the existing one when `let` redeclares a `let` of the same scope.
    pub fn bind_local_name(
        &mut self,
        name: &str,
        kind: DeclKind,
        ty: Option<TypeRepr>,
        sig: Option<Rc<FunctionSig>>,
        span: Span,
    ) -> CompileResult<()> {
        if let Some(slot) = self.local_in_current_scope(name) {
            let existing = &mut self.locals[slot as usize];
            if !(existing.kind.can_redeclare() && kind.can_redeclare()) {
                return Err(CompileError::Redeclaration(name.to_string(), span));
            }
            existing.ty = ty;
            existing.sig = sig;
            self.emit(Op::SetLocal(slot), span.line);
            self.emit(Op::Pop, span.line);
            return Ok(());
        }
        self.add_local(name, kind, ty, sig, span)?;
        Ok(())
    }

    /// Bind the parts of the source on top of the stack to module symbols.
    /// The source stays on the stack.
    fn destructure_global(&mut self, pattern: &Pattern, kind: DeclKind, span: Span) -> CompileResult<()> {
        let line = span.line;
        match pattern {
            Pattern::Identifier(name) => self.define_global(name, kind, None, None, span),
            Pattern::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.emit(Op::Dup, line);
                    self.emit_destructure(i, items, span)?;
                    self.destructure_global(item, kind, span)?;
                    self.emit(Op::Pop, line);
                }
                Ok(())
            }
            Pattern::Object(fields) => {
                for (key, item) in fields {
                    let idx = self.add_string_constant(key, span)?;
                    self.emit(Op::Dup, line);
                    self.emit(Op::GetProperty(idx), line);
                    self.destructure_global(item, kind, span)?;
                    self.emit(Op::Pop, line);
                }
                Ok(())
            }
        }
    }

    /// Bind the parts of the source held in `source` to new slots.
    fn destructure_local(
        &mut self,
        pattern: &Pattern,
        source: u16,
        kind: DeclKind,
        span: Span,
    ) -> CompileResult<()> {
        let line = span.line;
        match pattern {
            Pattern::Identifier(name) => {
                self.emit(Op::GetLocal(source), line);
                self.bind_local_name(name, kind, None, None, span)
            }
            Pattern::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.emit(Op::GetLocal(source), line);
                    self.emit_destructure(i, items, span)?;
                    self.bind_local_pattern(item, kind, span)?;
                }
                Ok(())
            }
            Pattern::Object(fields) => {
                for (key, item) in fields {
                    let idx = self.add_string_constant(key, span)?;
                    self.emit(Op::GetLocal(source), line);
                    self.emit(Op::GetProperty(idx), line);
                    self.bind_local_pattern(item, kind, span)?;
                }
                Ok(())
            }
        }
    }

    fn bind_local_pattern(&mut self, pattern: &Pattern, kind: DeclKind, span: Span) -> CompileResult<()> {
        match pattern {
            Pattern::Identifier(name) => self.bind_local_name(name, kind, None, None, span),
            nested => {
                let source = self.add_hidden_local(span)?;
                self.destructure_local(nested, source, kind, span)
            }
        }
    }

    /// Element `i` of a list pattern; a trailing name takes the remainder.
    fn emit_destructure(&mut self, i: usize, items: &[Pattern], span: Span) -> CompileResult<()> {
        let index = u16::try_from(i).map_err(|_| CompileError::new("Pattern too long", span))?;
        let last = i + 1 == items.len() && matches!(items[i], Pattern::Identifier(_));
        self.emit(Op::Destructure { index, last }, span.line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use crate::vm::chunk::CompiledModule;
    use crate::vm::generator::Generator;
    use crate::vm::opcode::Op;

    fn compile(source: &str) -> Result<CompiledModule, crate::error::Diagnostics> {
        let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
        let program = Parser::new(tokens).parse().expect("parser error");
        Generator::generate(&program, None)
    }

    #[test]
    fn test_list_pattern_marks_rest() {
        let module = compile("let [a, b, c] = [1, 2, 3, 4]").unwrap();
        let code = &module.main.chunk.code;
        assert!(code.contains(&Op::Destructure { index: 0, last: false }));
        assert!(code.contains(&Op::Destructure { index: 2, last: true }));
    }

    #[test]
    fn test_local_pattern_uses_hidden_source_slot() {
        let module = compile("if (true) { let {x, y} = {x: 1, y: 2}; x }").unwrap();
        let code = &module.main.chunk.code;
        // slot 1 is the hidden source, x and y follow
        assert_eq!(code.iter().filter(|op| **op == Op::GetLocal(1)).count(), 2);
        assert!(code.contains(&Op::PopN(3)));
    }

    #[test]
    fn test_const_over_parameter_is_rejected() {
        assert!(compile("let f = (a) => { const a = 1; a }").is_err());
        assert!(compile("let f = (a) => { let a = 1; a }").is_ok());
    }
}
