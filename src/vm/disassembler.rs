//! Bytecode disassembler for debug output.

use super::chunk::{CaptureSource, Chunk, Constant, FunctionProto};
use super::opcode::Op;

/// Disassemble a function prototype, and every function nested in it, to a
/// human-readable string.
pub fn disassemble(proto: &FunctionProto) -> String {
    let name = if proto.name.is_empty() {
        "<script>"
    } else {
        &proto.name
    };
    disassemble_function(proto, name)
}

fn disassemble_function(proto: &FunctionProto, name: &str) -> String {
    let mut out = String::new();
    let kind = if proto.is_coroutine { " coroutine" } else { "" };
    out.push_str(&format!(
        "== {}{} (params={}, captures={}) ==\n",
        name,
        kind,
        proto.params.len(),
        proto.captures.len()
    ));
    for (i, (capture, source)) in proto.captures.iter().enumerate() {
        let from = match source {
            CaptureSource::Local(slot) => format!("local {}", slot),
            CaptureSource::Global(name) => format!("global {}", name),
        };
        out.push_str(&format!(
            "     capture {} -> slot {} ({})\n",
            capture,
            1 + proto.params.len() + i,
            from
        ));
    }
    disassemble_chunk(&proto.chunk, &mut out);

    // Recursively disassemble nested functions
    for constant in &proto.chunk.constants {
        if let Constant::Function(nested) = constant {
            out.push('\n');
            out.push_str(&disassemble_function(nested, nested.display_name()));
        }
    }
    out
}

fn disassemble_chunk(chunk: &Chunk, out: &mut String) {
    for (offset, op) in chunk.code.iter().enumerate() {
        let line = chunk.lines.get(offset).copied().unwrap_or(0);
        let line_str = if offset > 0 && chunk.lines.get(offset - 1).copied() == Some(line) {
            "   |".to_string()
        } else {
            format!("{:4}", line)
        };
        out.push_str(&format!("{:04} {} ", offset, line_str));
        disassemble_op(op, chunk, out);
        out.push('\n');
    }
}

fn disassemble_op(op: &Op, chunk: &Chunk, out: &mut String) {
    match op {
        Op::Constant(idx) => {
            let val = chunk.constants.get(*idx as usize);
            out.push_str(&format!("CONSTANT     {:>5} ({})", idx, format_constant(val)));
        }
        Op::Null => out.push_str("NULL"),
        Op::True => out.push_str("TRUE"),
        Op::False => out.push_str("FALSE"),
        Op::Pop => out.push_str("POP"),
        Op::PopN(n) => out.push_str(&format!("POP_N        {:>5}", n)),
        Op::Dup => out.push_str("DUP"),
        Op::Dup2 => out.push_str("DUP2"),
        Op::GetLocal(slot) => out.push_str(&format!("GET_LOCAL    {:>5}", slot)),
        Op::SetLocal(slot) => out.push_str(&format!("SET_LOCAL    {:>5}", slot)),
        Op::UpdateLocal(slot, op) => {
            out.push_str(&format!("UPDATE_LOCAL {:>5} ({}=)", slot, op));
        }
        Op::GetGlobal(idx) => {
            let name = constant_string(chunk, *idx);
            out.push_str(&format!("GET_GLOBAL   {:>5} ({})", idx, name));
        }
        Op::SetGlobal(idx) => {
            let name = constant_string(chunk, *idx);
            out.push_str(&format!("SET_GLOBAL   {:>5} ({})", idx, name));
        }
        Op::DefineGlobal(idx, kind) => {
            let name = constant_string(chunk, *idx);
            out.push_str(&format!("DEF_GLOBAL   {:>5} ({} {})", idx, kind, name));
        }
        Op::Add => out.push_str("ADD"),
        Op::Subtract => out.push_str("SUBTRACT"),
        Op::Multiply => out.push_str("MULTIPLY"),
        Op::Divide => out.push_str("DIVIDE"),
        Op::Modulo => out.push_str("MODULO"),
        Op::Power => out.push_str("POWER"),
        Op::Negate => out.push_str("NEGATE"),
        Op::Equal => out.push_str("EQUAL"),
        Op::NotEqual => out.push_str("NOT_EQUAL"),
        Op::Less => out.push_str("LESS"),
        Op::LessEqual => out.push_str("LESS_EQUAL"),
        Op::Greater => out.push_str("GREATER"),
        Op::GreaterEqual => out.push_str("GREATER_EQUAL"),
        Op::Not => out.push_str("NOT"),
        Op::Jump(target) => out.push_str(&format!("JUMP         {:>5}", target)),
        Op::JumpIfFalse(target) => out.push_str(&format!("JUMP_IF_FALSE {:>4}", target)),
        Op::JumpIfFalseNoPop(target) => {
            out.push_str(&format!("JUMP_FALSE_NP {:>4}", target));
        }
        Op::JumpIfTrueNoPop(target) => {
            out.push_str(&format!("JUMP_TRUE_NP  {:>4}", target));
        }
        Op::JumpIfNotNull(target) => out.push_str(&format!("JUMP_NOT_NULL {:>4}", target)),
        Op::JumpIfNotError(target) => out.push_str(&format!("JUMP_NOT_ERR {:>5}", target)),
        Op::LoopEnter {
            continue_at,
            exit_at,
        } => out.push_str(&format!("LOOP_ENTER   c:{} x:{}", continue_at, exit_at)),
        Op::LoopExit => out.push_str("LOOP_EXIT"),
        Op::ForInit {
            continue_at,
            exit_at,
        } => out.push_str(&format!("FOR_INIT     c:{} x:{}", continue_at, exit_at)),
        Op::ForNext { value, index, exit } => {
            let slot = |s: &Option<u16>| s.map_or("-".to_string(), |s| s.to_string());
            out.push_str(&format!(
                "FOR_NEXT     v:{} i:{} x:{}",
                slot(value),
                slot(index),
                exit
            ));
        }
        Op::Break(depth) => out.push_str(&format!("BREAK        {:>5}", depth)),
        Op::Continue(depth) => out.push_str(&format!("CONTINUE     {:>5}", depth)),
        Op::Closure { proto, defaults } => {
            let val = chunk.constants.get(*proto as usize);
            out.push_str(&format!(
                "CLOSURE      {:>5} ({}) defaults={}",
                proto,
                format_constant(val),
                defaults
            ));
        }
        Op::Call { argc, names } => {
            out.push_str(&format!("CALL         {:>5}{}", argc, format_names(chunk, *names)));
        }
        Op::Invoke { name, argc, names } => {
            let method = constant_string(chunk, *name);
            out.push_str(&format!(
                "INVOKE       {:>5} ({}){}",
                argc,
                method,
                format_names(chunk, *names)
            ));
        }
        Op::Return => out.push_str("RETURN"),
        Op::Yield => out.push_str("YIELD"),
        Op::List(n) => out.push_str(&format!("LIST         {:>5}", n)),
        Op::Object(n) => out.push_str(&format!("OBJECT       {:>5}", n)),
        Op::GetProperty(idx) => {
            let name = constant_string(chunk, *idx);
            out.push_str(&format!("GET_PROPERTY {:>5} ({})", idx, name));
        }
        Op::SetProperty(idx) => {
            let name = constant_string(chunk, *idx);
            out.push_str(&format!("SET_PROPERTY {:>5} ({})", idx, name));
        }
        Op::GetIndex => out.push_str("GET_INDEX"),
        Op::SetIndex => out.push_str("SET_INDEX"),
        Op::Destructure { index, last } => {
            let rest = if *last { " rest" } else { "" };
            out.push_str(&format!("DESTRUCTURE  {:>5}{}", index, rest));
        }
        Op::BuildString(n) => out.push_str(&format!("BUILD_STRING {:>5}", n)),
        Op::Import => out.push_str("IMPORT"),
        Op::ImportName(idx) => {
            let name = constant_string(chunk, *idx);
            out.push_str(&format!("IMPORT_NAME  {:>5} ({})", idx, name));
        }
    }
}

fn constant_string(chunk: &Chunk, idx: u16) -> String {
    match chunk.constants.get(idx as usize) {
        Some(Constant::String(s)) => s.clone(),
        _ => format!("?{}", idx),
    }
}

fn format_names(chunk: &Chunk, names: Option<u16>) -> String {
    match names.and_then(|idx| chunk.constants.get(idx as usize)) {
        Some(Constant::Names(names)) => format!(" named [{}]", names.join(", ")),
        _ => String::new(),
    }
}

fn format_constant(val: Option<&Constant>) -> String {
    match val {
        Some(Constant::Number(n)) => crate::runtime::value::format_number(*n),
        Some(Constant::String(s)) => format!("{:?}", s),
        Some(Constant::Function(f)) => format!("<fn {}>", f.display_name()),
        Some(Constant::Names(names)) => format!("[{}]", names.join(", ")),
        None => "???".to_string(),
    }
}
