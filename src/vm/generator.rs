//! AST-to-bytecode generator.
//!
//! Single pass over the tree. Locals (parameters, captures and block
//! bindings) become frame slots; top-level bindings become module symbols
//! looked up by name. Type annotations drive a best-effort inline check whose
//! mismatches are collected as diagnostics.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::debug;

use crate::ast::{DeclKind, Program, Stmt, StmtKind};
use crate::error::{CompileError, Diagnostics};
use crate::span::Span;
use crate::types::TypeRepr;

use super::chunk::{CaptureSource, CompiledModule, Constant, FunctionProto, SlotName};
use super::opcode::Op;

/// Result type for generation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Parameter and return types of a function literal the generator has seen.
#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub params: Vec<(String, Option<TypeRepr>, bool)>,
    pub return_type: Option<TypeRepr>,
}

/// Origin, binding kind and known types of a captured name.
pub type CaptureBinding = (CaptureSource, DeclKind, Option<TypeRepr>, Option<Rc<FunctionSig>>);

/// A local slot tracked during generation.
#[derive(Debug, Clone)]
pub struct Local {
    pub name: String,
    pub depth: i32,
    pub kind: DeclKind,
    /// Declared type, if annotated.
    pub ty: Option<TypeRepr>,
    pub sig: Option<Rc<FunctionSig>>,
    /// Copied in from the defining scope; a declaration shadows it.
    pub is_capture: bool,
    /// First instruction at which the slot holds its value.
    pub start: usize,
}

/// A top-level binding seen so far in the compilation unit.
#[derive(Debug, Clone)]
pub struct GlobalInfo {
    pub kind: DeclKind,
    pub ty: Option<TypeRepr>,
    pub sig: Option<Rc<FunctionSig>>,
}

/// Tracks what kind of function is being compiled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FunctionType {
    Script,
    Function,
    Coroutine,
}

/// How a variable is accessed at runtime.
#[derive(Debug, Clone)]
pub enum VariableAccess {
    Local(u16),
    Global(String),
}

/// The generator: lowers a program into bytecode.
pub struct Generator {
    /// The function prototype being built.
    pub proto: FunctionProto,
    /// Local slots in scope; index is the slot number.
    pub locals: Vec<Local>,
    /// Current scope depth (0 = module level).
    pub scope_depth: i32,
    /// Enclosing generator (for nested function literals).
    pub enclosing: Option<Box<Generator>>,
    pub function_type: FunctionType,
    /// Number of loops enclosing the current position in this function.
    pub loop_depth: usize,
    /// Module-level bindings declared so far (script generator only).
    pub globals: HashMap<String, GlobalInfo>,
    pub diagnostics: Vec<CompileError>,
    pub type_check: bool,
    pub source_path: Option<Rc<PathBuf>>,
}

impl Generator {
    pub fn new(function_type: FunctionType, name: String, source_path: Option<Rc<PathBuf>>) -> Self {
        let mut generator = Self {
            proto: FunctionProto::new(name.clone(), source_path.clone()),
            locals: Vec::new(),
            scope_depth: 0,
            enclosing: None,
            function_type,
            loop_depth: 0,
            globals: HashMap::new(),
            diagnostics: Vec::new(),
            type_check: true,
            source_path,
        };

        // Slot 0 holds the running closure, named after the function so
        // that it can call itself.
        generator.locals.push(Local {
            name,
            depth: 0,
            kind: DeclKind::Const,
            ty: None,
            sig: None,
            is_capture: false,
            start: 0,
        });

        generator
    }

    /// Compile a full program with type diagnostics enabled.
    pub fn generate(program: &Program, source_path: Option<PathBuf>) -> Result<CompiledModule, Diagnostics> {
        Self::generate_with(program, source_path, true)
    }

    pub fn generate_with(
        program: &Program,
        source_path: Option<PathBuf>,
        type_check: bool,
    ) -> Result<CompiledModule, Diagnostics> {
        let mut generator = Generator::new(FunctionType::Script, String::new(), source_path.map(Rc::new));
        generator.type_check = type_check;
        generator.compile_program(&program.statements);

        if !generator.diagnostics.is_empty() {
            debug!(errors = generator.diagnostics.len(), "compilation failed");
            return Err(Diagnostics(generator.diagnostics));
        }

        generator.close_slots();
        let proto = generator.proto;
        debug!(
            instructions = proto.chunk.len(),
            constants = proto.chunk.constants.len(),
            "compiled module"
        );
        Ok(CompiledModule {
            main: Rc::new(proto),
        })
    }

    /// Compile top-level statements. A statement that fails is reported and
    /// skipped so later statements are still checked.
    fn compile_program(&mut self, statements: &[Stmt]) {
        let count = statements.len();
        for (i, stmt) in statements.iter().enumerate() {
            let locals = self.locals.len();
            let result = if i + 1 == count {
                self.compile_tail(stmt)
            } else {
                self.compile_stmt(stmt)
            };
            if let Err(err) = result {
                self.diagnostics.push(err);
                self.locals.truncate(locals);
                self.scope_depth = 0;
                self.loop_depth = 0;
            }
        }
        if count == 0 {
            self.emit(Op::Null, 0);
            self.emit(Op::Return, 0);
        }
    }

    /// Compile the statements of a function body; the last one supplies the
    /// implicit return value.
    pub fn compile_body(&mut self, statements: &[Stmt], line: usize) -> CompileResult<()> {
        let Some((last, rest)) = statements.split_last() else {
            self.emit(Op::Null, line);
            self.emit(Op::Return, line);
            return Ok(());
        };
        for stmt in rest {
            self.compile_stmt(stmt)?;
        }
        self.compile_tail(last)
    }

    /// Compile a final statement so its value is returned.
    fn compile_tail(&mut self, stmt: &Stmt) -> CompileResult<()> {
        let line = stmt.span.line;
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expr(expr)?;
                self.check_return_type(expr);
                self.emit(Op::Return, line);
            }
            StmtKind::Declaration(decl) if self.scope_depth == 0 => {
                self.compile_declaration(decl, stmt.span)?;
                self.emit(Op::Return, line);
            }
            StmtKind::Declaration(decl) => {
                self.compile_declaration(decl, stmt.span)?;
                match decl.pattern.names().as_slice() {
                    [name] if matches!(decl.pattern, crate::ast::Pattern::Identifier(_)) => {
                        self.compile_variable_get(name, stmt.span)?;
                    }
                    _ => {
                        self.emit(Op::Null, line);
                    }
                }
                self.emit(Op::Return, line);
            }
            _ => {
                self.compile_stmt(stmt)?;
                self.emit(Op::Null, line);
                self.emit(Op::Return, line);
            }
        }
        Ok(())
    }

    // --- Chunk helpers ---

    pub fn emit(&mut self, op: Op, line: usize) -> usize {
        self.proto.chunk.emit(op, line)
    }

    pub fn current_offset(&self) -> usize {
        self.proto.chunk.len()
    }

    pub fn patch_jump(&mut self, offset: usize) {
        self.proto.chunk.patch_jump(offset);
    }

    pub fn add_constant(&mut self, constant: Constant, span: Span) -> CompileResult<u16> {
        let idx = self.proto.chunk.add_constant(constant);
        u16::try_from(idx).map_err(|_| CompileError::new("Too many constants in one function", span))
    }

    pub fn add_string_constant(&mut self, s: &str, span: Span) -> CompileResult<u16> {
        self.add_constant(Constant::String(s.to_string()), span)
    }

    pub fn emit_constant(&mut self, constant: Constant, span: Span) -> CompileResult<()> {
        let idx = self.add_constant(constant, span)?;
        self.emit(Op::Constant(idx), span.line);
        Ok(())
    }

    /// Record a type diagnostic without aborting the statement.
    pub fn report(&mut self, err: CompileError) {
        if self.type_check {
            self.diagnostics.push(err);
        }
    }

    // --- Scope management ---

    pub fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    pub fn end_scope(&mut self, line: usize) {
        self.scope_depth -= 1;
        let mut popped = 0u16;
        while let Some(local) = self.locals.last() {
            if local.depth <= self.scope_depth {
                break;
            }
            self.name_slot(self.locals.len() - 1);
            self.locals.pop();
            popped += 1;
        }
        if popped > 0 {
            self.emit(Op::PopN(popped), line);
        }
    }

    // --- Local variables ---

    /// Register the value on top of the stack as a new slot.
    pub fn add_local(
        &mut self,
        name: &str,
        kind: DeclKind,
        ty: Option<TypeRepr>,
        sig: Option<Rc<FunctionSig>>,
        span: Span,
    ) -> CompileResult<u16> {
        let slot = u16::try_from(self.locals.len())
            .map_err(|_| CompileError::new("Too many local variables in one function", span))?;
        self.locals.push(Local {
            name: name.to_string(),
            depth: self.scope_depth,
            kind,
            ty,
            sig,
            is_capture: false,
            start: self.current_offset(),
        });
        Ok(slot)
    }

    /// Record the name and live range of `slot`, which goes out of scope at
    /// the current offset.
    fn name_slot(&mut self, slot: usize) {
        let end = self.current_offset();
        let Some(local) = self.locals.get(slot) else {
            return;
        };
        if local.name.is_empty() {
            return;
        }
        self.proto.slot_names.push(SlotName {
            name: local.name.clone(),
            slot: slot as u16,
            is_const: local.kind.is_const(),
            start: local.start,
            end,
        });
    }

    /// Name every slot still in scope at the end of the function.
    fn close_slots(&mut self) {
        for slot in 0..self.locals.len() {
            self.name_slot(slot);
        }
    }

    /// Hidden slot for an intermediate value (destructuring sources, loop
    /// bindings that are not named).
    pub fn add_hidden_local(&mut self, span: Span) -> CompileResult<u16> {
        self.add_local("", DeclKind::Const, None, None, span)
    }

    /// A binding of the same name declared in the current scope.
    pub fn local_in_current_scope(&self, name: &str) -> Option<u16> {
        for (i, local) in self.locals.iter().enumerate().rev() {
            if local.depth < self.scope_depth {
                break;
            }
            if local.name == name && !local.is_capture {
                return Some(i as u16);
            }
        }
        None
    }

    pub fn resolve_local(&self, name: &str) -> Option<u16> {
        if name.is_empty() {
            return None;
        }
        self.locals
            .iter()
            .rposition(|local| local.name == name)
            .map(|i| i as u16)
    }

    pub fn resolve_variable(&self, name: &str) -> VariableAccess {
        match self.resolve_local(name) {
            Some(slot) => VariableAccess::Local(slot),
            None => VariableAccess::Global(name.to_string()),
        }
    }

    /// The module-level bindings of this compilation unit.
    pub fn script_globals(&self) -> &HashMap<String, GlobalInfo> {
        match &self.enclosing {
            Some(enclosing) => enclosing.script_globals(),
            None => &self.globals,
        }
    }

    // --- Function compilation ---

    /// Start compiling a nested function: the current generator becomes the
    /// enclosing one.
    pub fn start_function(&mut self, function_type: FunctionType, name: String) {
        let mut nested = Generator::new(function_type, name, self.source_path.clone());
        nested.type_check = self.type_check;
        nested.diagnostics = std::mem::take(&mut self.diagnostics);
        // Parameters, captures and the body's own bindings share one scope
        nested.scope_depth = 1;

        let old = std::mem::replace(self, nested);
        self.enclosing = Some(Box::new(old));
    }

    /// Finish the current function, returning its proto and restoring the
    /// enclosing generator.
    pub fn finish_function(&mut self) -> FunctionProto {
        self.close_slots();
        let source_path = self.source_path.clone();
        let proto = std::mem::replace(&mut self.proto, FunctionProto::new(String::new(), source_path));
        let diagnostics = std::mem::take(&mut self.diagnostics);

        if let Some(enclosing) = self.enclosing.take() {
            *self = *enclosing;
        }
        self.diagnostics.extend(diagnostics);

        proto
    }

    /// Where a name referenced by a nested literal comes from, if it is
    /// visible from this generator.
    pub fn capture_source(&self, name: &str) -> Option<CaptureBinding> {
        if let Some(slot) = self.resolve_local(name) {
            let local = &self.locals[slot as usize];
            return Some((
                CaptureSource::Local(slot),
                local.kind,
                local.ty.clone(),
                local.sig.clone(),
            ));
        }
        self.script_globals().get(name).map(|info| {
            (
                CaptureSource::Global(name.to_string()),
                info.kind,
                info.ty.clone(),
                info.sig.clone(),
            )
        })
    }

    /// Declare a capture slot in the function being compiled.
    pub fn add_capture(
        &mut self,
        name: &str,
        source: CaptureSource,
        kind: DeclKind,
        ty: Option<TypeRepr>,
        sig: Option<Rc<FunctionSig>>,
    ) {
        self.proto.captures.push((name.to_string(), source));
        self.locals.push(Local {
            name: name.to_string(),
            depth: self.scope_depth,
            kind,
            ty,
            sig,
            is_capture: true,
            start: self.current_offset(),
        });
    }

    // --- Loop bookkeeping ---

    pub fn check_loop_depth(&self, keyword: &str, depth: usize, span: Span) -> CompileResult<()> {
        if depth == 0 || depth > self.loop_depth {
            return Err(CompileError::new(
                format!(
                    "Cannot {} {} loop(s): only {} enclosing",
                    keyword, depth, self.loop_depth
                ),
                span,
            ));
        }
        if depth > u8::MAX as usize {
            return Err(CompileError::new(format!("{} depth too large", keyword), span));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use crate::vm::chunk::CaptureSource;

    fn compile(source: &str) -> Result<CompiledModule, Diagnostics> {
        let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
        let program = Parser::new(tokens).parse().expect("parser error");
        Generator::generate(&program, None)
    }

    fn first_function(module: &CompiledModule) -> Rc<FunctionProto> {
        module
            .main
            .chunk
            .constants
            .iter()
            .find_map(|c| match c {
                Constant::Function(p) => Some(p.clone()),
                _ => None,
            })
            .expect("no function constant")
    }

    #[test]
    fn test_top_level_declarations_are_globals() {
        let module = compile("let x = 2 + 3").unwrap();
        assert!(module
            .main
            .chunk
            .code
            .iter()
            .any(|op| matches!(op, Op::DefineGlobal(_, DeclKind::Let))));
    }

    #[test]
    fn test_block_locals_use_slots() {
        let module = compile("if (true) { let a = 1; a + 1 }").unwrap();
        let code = &module.main.chunk.code;
        assert!(code.iter().any(|op| matches!(op, Op::GetLocal(1))));
        assert!(code.iter().any(|op| matches!(op, Op::PopN(1))));
    }

    #[test]
    fn test_captures_are_selective() {
        let module = compile("let y = 1\nlet unused = 2\nlet f = () => y").unwrap();
        let proto = first_function(&module);
        assert_eq!(proto.captures, vec![("y".to_string(), CaptureSource::Global("y".to_string()))]);
    }

    #[test]
    fn test_self_reference_uses_slot_zero() {
        let module = compile("let fact = (n) => n <= 1 ? 1 : n * fact(n - 1)").unwrap();
        let proto = first_function(&module);
        assert!(proto.captures.is_empty());
        assert!(proto.chunk.code.iter().any(|op| matches!(op, Op::GetLocal(0))));
    }

    #[test]
    fn test_yield_marks_coroutine() {
        let module = compile("let gen = () => { yield 1; yield 2 }").unwrap();
        assert!(first_function(&module).is_coroutine);
        assert!(compile("yield 1").is_err());
    }

    #[test]
    fn test_const_local_assignment_is_rejected() {
        let err = compile("if (true) { const a = 1; a = 2 }").unwrap_err();
        assert!(matches!(err.0[0], CompileError::ConstAssignment(..)));
    }

    #[test]
    fn test_local_redeclaration_rules() {
        assert!(compile("if (true) { let a = 1; let a = 2 }").is_ok());
        assert!(compile("if (true) { var a = 1; var a = 2 }").is_err());
        assert!(compile("if (true) { let a = 1; { const a = 2 } }").is_ok());
    }

    #[test]
    fn test_break_outside_loop_is_rejected() {
        assert!(compile("break").is_err());
        assert!(compile("while (true) { break(2) }").is_err());
        assert!(compile("while (true) { while (true) { break(2) } }").is_ok());
    }

    #[test]
    fn test_diagnostics_are_collected() {
        let err = compile("let a :: number = \"x\"\nlet b :: string = 1").unwrap_err();
        assert_eq!(err.0.len(), 2);
    }

    #[test]
    fn test_slot_names_cover_their_scope() {
        let module = compile("let f = (a) => {\n  if (a) {\n    let b = 1\n    b + 1\n  }\n  let c = 2\n  a + c\n}").unwrap();
        let proto = first_function(&module);
        let range = |name: &str| {
            let entry = proto.slot_names.iter().find(|s| s.name == name).expect("unnamed slot");
            (entry.slot, entry.start, entry.end)
        };

        let (a_slot, a_start, a_end) = range("a");
        let (_, b_start, b_end) = range("b");
        let (_, c_start, _) = range("c");
        assert_eq!(a_slot, 1);
        assert_eq!(a_start, 0);
        assert_eq!(a_end, proto.chunk.len());
        assert!(b_start < b_end && b_end <= c_start);

        let names = |offset: usize| -> Vec<String> {
            proto.slots_at(offset).iter().map(|s| s.name.clone()).collect()
        };
        assert!(names(b_start).contains(&"b".to_string()));
        assert!(!names(c_start).contains(&"b".to_string()));
        assert!(names(c_start).contains(&"c".to_string()));
    }
}
