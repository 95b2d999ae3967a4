//! Module loading for `import`, and `eval`.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::{LumoError, RuntimeError};
use crate::runtime::symbols::{Symbol, SymbolTable};
use crate::runtime::value::{field_map, ErrorValue, FieldMap, Value};
use crate::span::Span;

use super::vm::Vm;

impl Vm {
    /// Load the module an `import` names and return its exports object.
    /// Resolution and compile failures give error values.
    pub(crate) fn import_module(&mut self, path: &Value, span: Span) -> Result<Value, RuntimeError> {
        let Value::String(import_path) = path else {
            return Ok(Value::error(format!(
                "Import path must be a string, got {}",
                path.type_name()
            )));
        };

        let from = self.current_source_path();
        let resolved = match self.modules.resolve_path(import_path, from.as_deref().map(PathBuf::as_path)) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(line = span.line, error = %err, "import failed");
                return Ok(Value::error(err.to_string()));
            }
        };

        if let Some(exports) = self.modules.cached(&resolved) {
            debug!(path = %resolved.display(), "module cache hit");
            return Ok(exports);
        }

        if let Err(err) = self.modules.enter(&resolved) {
            warn!(line = span.line, error = %err, "import failed");
            return Ok(Value::error(err.to_string()));
        }
        match self.load_module(&resolved) {
            Ok(exports) if !exports.is_error() => {
                self.modules.leave(&resolved, Some(exports.clone()));
                Ok(exports)
            }
            Ok(failure) => {
                self.modules.leave(&resolved, None);
                Ok(failure)
            }
            Err(err) => {
                self.modules.leave(&resolved, None);
                Err(err)
            }
        }
    }

    fn load_module(&mut self, path: &Path) -> Result<Value, RuntimeError> {
        let source = match self.modules.read_source(path) {
            Ok(source) => source,
            Err(err) => return Ok(Value::error(err.to_string())),
        };
        let module = match crate::compile(&source, Some(path)) {
            Ok(module) => module,
            Err(err) => return Ok(pipeline_error(&err)),
        };

        debug!(path = %path.display(), "loading module");
        let table = Rc::new(RefCell::new(SymbolTable::new()));
        self.run_module(&module, table.clone())?;
        let exports = table.borrow().exports();
        Ok(Value::object(exports))
    }

    /// Compile and run `code`. Without `env` it shares the caller's module
    /// table and sees the caller's locals, writing assignments to them back
    /// into their slots; with `env` it runs in a fresh table seeded from its
    /// fields.
    pub fn eval_source(&mut self, code: &str, env: Option<&FieldMap>) -> Result<Value, RuntimeError> {
        let path = self.current_source_path();
        let module = match crate::compile(code, path.as_deref().map(PathBuf::as_path)) {
            Ok(module) => module,
            Err(err) => return Ok(pipeline_error(&err)),
        };

        if let Some(fields) = env {
            debug!(isolated = true, "eval");
            let globals = Rc::new(RefCell::new(SymbolTable::from_fields(fields)));
            return self.run_module(&module, globals);
        }

        let globals = self.current_globals();
        let (stack_base, bound) = self.bind_caller_slots(&globals);
        debug!(isolated = false, locals = bound.len(), "eval");
        let result = self.run_module(&module, globals.clone());

        let mut table = globals.borrow_mut();
        for binding in bound {
            let value = table.unbind_temporary(&binding.name, binding.hidden);
            if result.is_err() || binding.is_const {
                continue;
            }
            if let (Some(value), Some(slot)) = (value, self.stack.get_mut(stack_base + binding.slot as usize)) {
                *slot = value;
            }
        }
        result
    }

    /// Bind the calling frame's live locals into `globals` for an `eval`.
    fn bind_caller_slots(&self, globals: &Rc<RefCell<SymbolTable>>) -> (usize, Vec<BoundSlot>) {
        let Some(frame) = self.frames.last() else {
            return (0, Vec::new());
        };
        // ip already points past the call
        let offset = frame.ip.saturating_sub(1);
        let mut table = globals.borrow_mut();
        let bound = frame
            .closure
            .proto
            .slots_at(offset)
            .into_iter()
            .filter_map(|entry| {
                let value = self.stack.get(frame.stack_base + entry.slot as usize)?.clone();
                Some(BoundSlot {
                    name: entry.name.clone(),
                    slot: entry.slot,
                    is_const: entry.is_const,
                    hidden: table.bind_temporary(&entry.name, value, entry.is_const),
                })
            })
            .collect();
        (frame.stack_base, bound)
    }

    fn current_source_path(&self) -> Option<Rc<PathBuf>> {
        self.frames
            .last()
            .and_then(|frame| frame.closure.proto.source_path.clone())
    }
}

/// A caller local visible to `eval` while it runs.
struct BoundSlot {
    name: String,
    slot: u16,
    is_const: bool,
    hidden: Option<Symbol>,
}

/// Error value describing a failed compile, with its location when known.
fn pipeline_error(err: &LumoError) -> Value {
    let mut properties = field_map();
    if let Some(span) = err.span() {
        properties.insert("line".to_string(), Value::Number(span.line as f64));
        properties.insert("column".to_string(), Value::Number(span.column as f64));
    }
    Value::Error(Rc::new(ErrorValue::with_properties(err.to_string(), properties)))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use crate::runtime::value::Value;
    use crate::vm::Vm;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn run_file(path: &Path) -> (Value, Vec<String>) {
        let source = fs::read_to_string(path).unwrap();
        let module = crate::compile(&source, Some(path)).unwrap();
        let mut vm = Vm::new();
        vm.capture_output();
        let value = vm.execute(&module).unwrap();
        (value, vm.output().to_vec())
    }

    #[test]
    fn test_whole_and_named_imports() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("util.lm"),
            "let add = (a, b) => a + b\nconst scale = 10\n",
        )
        .unwrap();
        let main = dir.path().join("main.lm");
        fs::write(
            &main,
            "import util from \"./util\"\nimport { add, scale } from \"./util.lm\"\nutil.add(1, 2) + add(scale, 1)",
        )
        .unwrap();

        let (value, _) = run_file(&main);
        assert_eq!(value, Value::Number(14.0));
    }

    #[test]
    fn test_module_runs_once() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("noisy.lm"), "print(\"loaded\")\nlet n = 1").unwrap();
        let main = dir.path().join("main.lm");
        fs::write(
            &main,
            "import a from \"./noisy\"\nimport b from \"./noisy\"\na.n + b.n",
        )
        .unwrap();

        let (value, output) = run_file(&main);
        assert_eq!(value, Value::Number(2.0));
        assert_eq!(output, vec!["loaded".to_string()]);
    }

    #[test]
    fn test_module_functions_see_their_own_module() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("labels.lm"),
            "let read = () => label\nlet label = \"labels\"\n",
        )
        .unwrap();
        let main = dir.path().join("main.lm");
        fs::write(&main, "let label = \"main\"\nimport { read } from \"./labels\"\nread()").unwrap();

        let (value, _) = run_file(&main);
        assert_eq!(value, Value::string("labels"));
    }

    #[test]
    fn test_import_failures_are_error_values() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.lm"), "import b from \"./b\"\nlet fromB = b\n").unwrap();
        fs::write(dir.path().join("b.lm"), "import a from \"./a\"\nlet fromA = a\n").unwrap();
        fs::write(dir.path().join("broken.lm"), "let = 1").unwrap();
        let main = dir.path().join("main.lm");
        fs::write(
            &main,
            r#"import a from "./a"
import missing from "./missing"
import broken from "./broken"
import { nope } from "./a"
[isError(a.fromB.fromA), isError(missing), isError(broken), isError(nope)]"#,
        )
        .unwrap();

        let (value, _) = run_file(&main);
        assert_eq!(value.to_string(), "[true, true, true, true]");
    }

    #[test]
    fn test_executing_a_loading_script_keeps_it_loading() {
        let dir = tempdir().unwrap();
        let main = dir.path().join("main.lm");
        fs::write(&main, "let x = 1\nx + 1").unwrap();
        let path = crate::module::canonicalize(&main).unwrap();
        let module = crate::compile("let x = 1\nx + 1", Some(&main)).unwrap();

        let mut vm = Vm::new();
        vm.modules.enter(&path).unwrap();
        assert_eq!(vm.execute(&module).unwrap(), Value::Number(2.0));
        // The outer load still owns the path
        assert!(vm.modules.enter(&path).is_err());
        vm.modules.leave(&path, None);
        assert!(vm.modules.enter(&path).is_ok());
    }

    #[test]
    fn test_eval_shares_module_table() {
        let module = crate::compile("let x = 2\neval(\"x = x * 21\")\nx", None).unwrap();
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap(), Value::Number(42.0));
    }

    #[test]
    fn test_eval_sees_the_calling_function_locals() {
        let module = crate::compile("let f = (a) => eval(\"a + 1\")\nf(2)", None).unwrap();
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn test_eval_assignments_reach_local_slots() {
        let source = "let g = 10\n\
            let f = (a) => {\n\
              let b = a * 2\n\
              eval(\"b = b + g\\na = 0\")\n\
              [a, b]\n\
            }\n\
            [f(1), isError(eval(\"a\"))]";
        let module = crate::compile(source, None).unwrap();
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap().to_string(), "[[0, 12], true]");
    }

    #[test]
    fn test_eval_leaves_shadowed_globals_alone() {
        let source = "let a = \"global\"\n\
            const f = () => {\n\
              const a = \"local\"\n\
              let r = eval(\"a\")\n\
              [r, isError(eval(\"a = 1\"))]\n\
            }\n\
            [f(), a]";
        let module = crate::compile(source, None).unwrap();
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap().to_string(), "[[\"local\", true], \"global\"]");
    }

    #[test]
    fn test_locals_out_of_scope_are_not_visible() {
        let source = "let f = () => {\n\
              if (true) { let inner = 1 }\n\
              isError(eval(\"inner\"))\n\
            }\n\
            f()";
        let module = crate::compile(source, None).unwrap();
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_eval_with_env_is_isolated() {
        let source = "let x = 1\nlet r = eval(\"x = x + y\\nx\", {x: 5, y: 2})\n[r, x]";
        let module = crate::compile(source, None).unwrap();
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap().to_string(), "[7, 1]");
    }

    #[test]
    fn test_eval_compile_failure_is_an_error_value() {
        let module = crate::compile("let r = eval(\"let = \")\nisError(r)", None).unwrap();
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap(), Value::Bool(true));
    }
}
