//! Lumo: a small dynamically-typed scripting language with closures,
//! coroutines, destructuring and structural runtime types.
//!
//! This is the library root that exports all modules.
//!
//! # Pipeline
//!
//! Source text goes through the [`lexer`], the [`parser`] and the bytecode
//! [`vm::Generator`], then runs on the stack [`Vm`]. Each stage is pure and
//! reentrant, so `eval` and `import` reuse [`compile`] directly.

// Allow some clippy lints that are stylistic and not critical
#![allow(clippy::module_inception)]
#![allow(clippy::result_large_err)]
#![allow(clippy::type_complexity)]
#![allow(clippy::new_without_default)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::too_many_arguments)]

pub mod ast;
pub mod error;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod runtime;
pub mod span;
pub mod types;
pub mod vm;

use std::path::Path;

use tracing::debug;

pub use error::LumoError;
pub use runtime::Value;
pub use vm::Vm;

/// Options controlling how a program is compiled and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Report compile-time type diagnostics.
    pub type_check: bool,
    /// Print the bytecode listing before running.
    pub disassemble: bool,
    /// Keep `print` output in the VM instead of writing to stdout.
    pub capture_output: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            type_check: true,
            disassemble: false,
            capture_output: false,
        }
    }
}

/// Run a Lumo program from source code and return its final value.
pub fn run(source: &str) -> Result<Value, LumoError> {
    run_with_options(source, None, &RunOptions::default()).map(|(value, _)| value)
}

/// Run a Lumo program from a file. Imports resolve relative to its directory.
pub fn run_file(path: &Path, options: &RunOptions) -> Result<Value, LumoError> {
    let source = std::fs::read_to_string(path)?;
    run_with_options(&source, Some(path), options).map(|(value, _)| value)
}

/// Run a Lumo program with full control over execution options. Returns the
/// final value and the VM it ran on, so captured output can be read back.
pub fn run_with_options(
    source: &str,
    source_path: Option<&Path>,
    options: &RunOptions,
) -> Result<(Value, Vm), LumoError> {
    let module = compile_with(source, source_path, options.type_check)?;

    if options.disassemble {
        println!("{}", vm::disassemble(&module.main));
        println!("---");
    }

    let mut vm = Vm::new();
    if options.capture_output {
        vm.capture_output();
    }
    let value = vm.execute(&module)?;
    Ok((value, vm))
}

/// Parse source code into an AST without executing.
pub fn parse(source: &str) -> Result<ast::Program, LumoError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens).parse()?;
    Ok(program)
}

/// Compile source code to bytecode with type diagnostics enabled.
pub fn compile(source: &str, source_path: Option<&Path>) -> Result<vm::CompiledModule, LumoError> {
    compile_with(source, source_path, true)
}

/// Compile source code to bytecode, optionally skipping type diagnostics.
pub fn compile_with(
    source: &str,
    source_path: Option<&Path>,
    type_check: bool,
) -> Result<vm::CompiledModule, LumoError> {
    let program = parse(source)?;
    debug!(statements = program.statements.len(), "parsed");
    let module = vm::Generator::generate_with(&program, source_path.map(Path::to_path_buf), type_check)?;
    Ok(module)
}

/// Compile source code and render its bytecode listing.
pub fn disassemble(source: &str) -> Result<String, LumoError> {
    let module = compile(source, None)?;
    Ok(vm::disassemble(&module.main))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_run_returns_final_value() {
        assert_eq!(run("let x = 2 + 3").unwrap(), Value::Number(5.0));
        assert_eq!(run("let x = 2 + 3").unwrap(), run("let x = 2 + 3").unwrap());
    }

    #[test]
    fn test_pipeline_errors_are_classified() {
        assert!(matches!(run("let s = \"open"), Err(LumoError::Lexer(_))));
        assert!(matches!(run("let = 1"), Err(LumoError::Parser(_))));
        assert!(matches!(
            run("let n :: number = \"text\""),
            Err(LumoError::Compile(_))
        ));
        assert!(matches!(run("for (5, v) { }"), Err(LumoError::Runtime(_))));
    }

    #[test]
    fn test_type_check_can_be_disabled() {
        let options = RunOptions {
            type_check: false,
            ..RunOptions::default()
        };
        let (value, _) = run_with_options("let n :: number = \"text\"\nn", None, &options).unwrap();
        assert_eq!(value, Value::string("text"));
    }

    #[test]
    fn test_captured_output() {
        let options = RunOptions {
            capture_output: true,
            ..RunOptions::default()
        };
        let (_, vm) = run_with_options("print(\"a\", 1)\nprint([1, 2])", None, &options).unwrap();
        assert_eq!(vm.output(), &["a 1".to_string(), "[1, 2]".to_string()]);
    }

    #[test]
    fn test_run_file_resolves_imports() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.lm"), "let double = (n) => n * 2").unwrap();
        let main = dir.path().join("main.lm");
        std::fs::write(&main, "import { double } from \"./lib.lm\"\ndouble(21)").unwrap();
        assert_eq!(run_file(&main, &RunOptions::default()).unwrap(), Value::Number(42.0));
        assert!(matches!(
            run_file(&dir.path().join("missing.lm"), &RunOptions::default()),
            Err(LumoError::Io(_))
        ));
    }

    #[test]
    fn test_disassemble_source() {
        let listing = disassemble("1 + 2").unwrap();
        assert!(listing.contains("ADD"));
        assert!(listing.contains("RETURN"));
    }
}
