//! Output template resolution
//!
//! Templates produced by the unroller contain literal text plus placeholders:
//!
//! | Placeholder | Meaning                                  |
//! |-------------|------------------------------------------|
//! | `{name}`    | value of a visible variable              |
//! | `{*name}`   | value `name` points to                   |
//! | `{**name}`  | two levels of indirection                |
//! | `{@k}`      | k-th argument expression of the step     |
//!
//! Any placeholder may end in `:c` (character) or `:x` (hex). `{{` and `}}`
//! are literal braces. A placeholder that cannot be resolved is copied
//! through unchanged.

use crate::memory::value::SymbolicValue;
use crate::memory::Memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Plain,
    Char,
    Hex,
}

/// Expand `template` against `memory` and the evaluated `arguments`
pub fn resolve(template: &str, memory: &Memory, arguments: &[SymbolicValue]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(position) = rest.find(['{', '}']) {
        out.push_str(&rest[..position]);
        let tail = &rest[position..];
        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }
        match tail.find('}') {
            Some(close) => {
                let inner = &tail[1..close];
                match resolve_placeholder(inner, memory, arguments) {
                    Some(text) => out.push_str(&text),
                    None => out.push_str(&tail[..=close]),
                }
                rest = &tail[close + 1..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_placeholder(inner: &str, memory: &Memory, arguments: &[SymbolicValue]) -> Option<String> {
    let (key, format) = match inner.rsplit_once(':') {
        Some((key, "c")) => (key, Format::Char),
        Some((key, "x")) => (key, Format::Hex),
        _ => (inner, Format::Plain),
    };

    let value = if let Some(index) = key.strip_prefix('@') {
        arguments.get(index.parse::<usize>().ok()?)?.clone()
    } else if let Some(name) = key.strip_prefix("**") {
        let pointer = lookup(memory, name)?;
        let middle = memory.dereference(&pointer)?;
        memory.dereference(&middle)?
    } else if let Some(name) = key.strip_prefix('*') {
        let pointer = lookup(memory, name)?;
        memory.dereference(&pointer)?
    } else {
        lookup(memory, key)?
    };
    Some(render(&value, format))
}

fn lookup(memory: &Memory, name: &str) -> Option<SymbolicValue> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return None;
    }
    memory.variable(name).cloned()
}

fn render(value: &SymbolicValue, format: Format) -> String {
    match (format, value) {
        (Format::Char, _) => value.as_char_text(),
        (Format::Hex, SymbolicValue::Number { value }) => format!("{:x}", value),
        (_, SymbolicValue::RawString { text }) => text.clone(),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::CType;
    use pretty_assertions::assert_eq;

    fn memory() -> Memory {
        let mut memory = Memory::new();
        memory.stack.push_frame("main");
        memory.declare("x", SymbolicValue::number(42), CType::scalar("int"), 4);
        memory.declare("p", SymbolicValue::variable_ref("x"), CType::pointer_to("int", 1), 8);
        memory.declare("pp", SymbolicValue::variable_ref("p"), CType::pointer_to("int", 2), 16);
        memory.declare("c", SymbolicValue::number(65), CType::scalar("char"), 24);
        memory
    }

    #[test]
    fn test_placeholders() {
        let memory = memory();
        let args = [SymbolicValue::number(7)];
        assert_eq!(
            resolve("x={x} *p={*p} **pp={**pp} arg={@0}\n", &memory, &args),
            "x=42 *p=42 **pp=42 arg=7\n"
        );
    }

    #[test]
    fn test_formats_and_escapes() {
        let memory = memory();
        assert_eq!(resolve("{c:c}{x:x} {{}}", &memory, &[]), "A2a {}");
    }

    #[test]
    fn test_unresolved_is_left_untouched() {
        let memory = memory();
        assert_eq!(
            resolve("{missing} {*x} {@3} {not a name}", &memory, &[]),
            "{missing} {*x} {@3} {not a name}"
        );
    }
}
