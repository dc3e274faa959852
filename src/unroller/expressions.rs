// Lowering syntax expressions into structural expressions

use super::declarations::zero_expr;
use super::Unroller;
use crate::memory::types::CType;
use crate::memory::value::SymbolicValue;
use crate::parser::{NodeKind, SyntaxNode};
use crate::trace::{BinaryOp, Expr, StepKind, UnaryOp};
use tracing::{debug, trace, warn};

/// Parse a C integer literal: decimal, hex, octal or binary with an optional
/// `u`/`l` suffix
pub(crate) fn parse_int_literal(text: &str) -> Option<i64> {
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
    let lower = digits.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = lower.strip_prefix("0b") {
        return i64::from_str_radix(bin, 2).ok();
    }
    if lower.len() > 1 && lower.starts_with('0') && lower.chars().all(|c| c.is_ascii_digit()) {
        return i64::from_str_radix(&lower[1..], 8).ok();
    }
    if let Ok(value) = lower.parse::<i64>() {
        return Some(value);
    }
    // floating literals truncate
    lower
        .trim_end_matches('f')
        .parse::<f64>()
        .ok()
        .map(|value| value as i64)
}

/// Read one escape sequence after a backslash
fn read_escape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<char> {
    let escaped = chars.next()?;
    let c = match escaped {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        'a' => '\x07',
        'b' => '\x08',
        'f' => '\x0c',
        'v' => '\x0b',
        'x' => {
            let mut value = 0u32;
            while let Some(digit) = chars.peek().and_then(|c| c.to_digit(16)) {
                value = value * 16 + digit;
                chars.next();
            }
            char::from_u32(value).unwrap_or('?')
        }
        other => other,
    };
    Some(c)
}

/// Decode the text of a string literal, merging adjacent literals
pub(crate) fn unescape_string(text: &str) -> String {
    let mut out = String::new();
    let mut chars = text.chars().peekable();
    let mut inside = false;
    while let Some(c) = chars.next() {
        match (inside, c) {
            (false, '"') => inside = true,
            (false, _) => {}
            (true, '"') => inside = false,
            (true, '\\') => {
                if let Some(escaped) = read_escape(&mut chars) {
                    out.push(escaped);
                }
            }
            (true, c) => out.push(c),
        }
    }
    out
}

/// Code of a character literal such as `'a'` or `'\n'`
pub(crate) fn decode_char_literal(text: &str) -> Option<i64> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut chars = inner.chars().peekable();
    let c = match chars.next()? {
        '\\' => read_escape(&mut chars)?,
        c => c,
    };
    Some(c as i64)
}

/// Called function's name with any `std::` qualifier removed
pub(crate) fn callee_name<N: SyntaxNode>(call: &N) -> Option<String> {
    let function = call.child_by_field("function")?;
    let text = function.text();
    Some(text.strip_prefix("std::").unwrap_or(text).to_string())
}

/// Arguments of a call in order
pub(crate) fn call_arguments<N: SyntaxNode>(call: &N) -> Vec<&N> {
    call.child_by_field("arguments")
        .map(|args| args.children().collect())
        .unwrap_or_default()
}

fn is_allocator(name: &str) -> bool {
    matches!(name, "malloc" | "calloc" | "realloc")
}

impl<'a, N: SyntaxNode> Unroller<'a, N> {
    /// Lower an expression, emitting steps for any side effects it contains
    pub(crate) fn lower_expr(&mut self, node: &'a N) -> Expr {
        let text = node.text();
        match node.node_kind() {
            NodeKind::NumberLiteral => parse_int_literal(text)
                .map(Expr::number)
                .unwrap_or_else(|| Expr::opaque(text)),
            NodeKind::CharLiteral => decode_char_literal(text)
                .map(Expr::number)
                .unwrap_or_else(|| Expr::opaque(text)),
            NodeKind::StringLiteral => Expr::Str {
                text: unescape_string(text),
            },
            NodeKind::True => Expr::number(1),
            NodeKind::False => Expr::number(0),
            NodeKind::Null => Expr::Null,
            NodeKind::Identifier => Expr::var(text.strip_prefix("std::").unwrap_or(text)),
            NodeKind::ParenthesizedExpression => match node.child_at(0) {
                Some(inner) => self.lower_expr(inner),
                None => Expr::opaque(text),
            },
            NodeKind::PointerExpression => {
                let operator = node.child_by_field("operator").map(|op| op.text());
                let Some(argument) = node.child_by_field("argument") else {
                    return Expr::opaque(text);
                };
                let argument = self.lower_expr(argument);
                match operator {
                    Some("*") => Expr::deref(self.decay(argument)),
                    Some("&") => Expr::addr_of(argument),
                    _ => Expr::opaque(text),
                }
            }
            NodeKind::UnaryExpression => {
                let op = node
                    .child_by_field("operator")
                    .and_then(|op| UnaryOp::from_symbol(op.text()));
                match (op, node.child_by_field("argument")) {
                    (Some(op), Some(argument)) => Expr::Unary {
                        op,
                        operand: Box::new(self.lower_expr(argument)),
                    },
                    _ => Expr::opaque(text),
                }
            }
            NodeKind::BinaryExpression => {
                if self.is_stream_output(node) {
                    self.unroll_stream_output(node);
                    return Expr::number(0);
                }
                self.lower_binary(node)
            }
            NodeKind::AssignmentExpression => self.unroll_assignment(node),
            NodeKind::UpdateExpression => self.unroll_update(node),
            NodeKind::CallExpression => self.lower_call(node),
            NodeKind::SubscriptExpression => {
                match (node.child_by_field("argument"), node.child_by_field("index")) {
                    (Some(base), Some(index)) => {
                        let base = self.lower_expr(base);
                        let index = self.lower_expr(index);
                        Expr::index(base, index)
                    }
                    _ => Expr::opaque(text),
                }
            }
            NodeKind::FieldExpression => {
                match (node.child_by_field("argument"), node.child_by_field("field")) {
                    (Some(base), Some(field)) => Expr::Field {
                        base: Box::new(self.lower_expr(base)),
                        field: field.text().to_string(),
                        arrow: node
                            .child_by_field("operator")
                            .is_some_and(|op| op.text() == "->"),
                    },
                    _ => Expr::opaque(text),
                }
            }
            NodeKind::ConditionalExpression => {
                match (
                    node.child_by_field("condition"),
                    node.child_by_field("consequence"),
                    node.child_by_field("alternative"),
                ) {
                    (Some(condition), Some(then), Some(otherwise)) => Expr::Conditional {
                        condition: Box::new(self.lower_expr(condition)),
                        then: Box::new(self.lower_expr(then)),
                        otherwise: Box::new(self.lower_expr(otherwise)),
                    },
                    _ => Expr::opaque(text),
                }
            }
            NodeKind::CastExpression => self.lower_value(node, None),
            NodeKind::SizeofExpression => Expr::number(self.size_of(node) as i64),
            NodeKind::NewExpression => self.lower_new(node),
            NodeKind::DeleteExpression => Expr::number(0),
            NodeKind::CommaExpression => {
                if let Some(left) = node.child_by_field("left") {
                    self.unroll_effect(left);
                }
                match node.child_by_field("right") {
                    Some(right) => self.lower_expr(right),
                    None => Expr::opaque(text),
                }
            }
            NodeKind::InitializerList => Expr::List {
                elements: node.children().map(|child| self.lower_expr(child)).collect(),
            },
            _ => {
                trace!(kind = node.kind(), "expression left as text");
                Expr::opaque(text)
            }
        }
    }

    fn lower_binary(&mut self, node: &'a N) -> Expr {
        let op = node
            .child_by_field("operator")
            .and_then(|op| BinaryOp::from_symbol(op.text()));
        let (Some(op), Some(left), Some(right)) = (
            op,
            node.child_by_field("left"),
            node.child_by_field("right"),
        ) else {
            return Expr::opaque(node.text());
        };
        let left = self.lower_expr(left);
        let right = self.lower_expr(right);
        if matches!(op, BinaryOp::Add | BinaryOp::Sub) || op.is_comparison() {
            let left = self.decay(left);
            let right = self.decay(right);
            return Expr::binary(op, left, right);
        }
        Expr::binary(op, left, right)
    }

    /// Lower a value stored into something of type `declared`.
    ///
    /// Casts and declared pointer types tell allocations what they allocate;
    /// arrays stored into pointers decay to their first element.
    pub(crate) fn lower_value(&mut self, node: &'a N, declared: Option<&CType>) -> Expr {
        match node.node_kind() {
            NodeKind::CastExpression => {
                let cast = node
                    .child_by_field("type")
                    .map(|ty| CType::parse(ty.text()));
                match node.child_by_field("value") {
                    Some(value) => self.lower_value(value, cast.as_ref().or(declared)),
                    None => Expr::opaque(node.text()),
                }
            }
            NodeKind::ParenthesizedExpression => match node.child_at(0) {
                Some(inner) => self.lower_value(inner, declared),
                None => Expr::opaque(node.text()),
            },
            NodeKind::CallExpression
                if callee_name(node).is_some_and(|name| is_allocator(&name)) =>
            {
                let pointee = declared.filter(|ty| ty.is_pointer()).map(CType::element);
                self.lower_allocation(node, pointee)
            }
            _ => {
                let expr = self.lower_expr(node);
                if declared.is_some_and(CType::is_pointer) {
                    self.decay(expr)
                } else {
                    expr
                }
            }
        }
    }

    /// An array name used as a value means its first element
    pub(crate) fn decay(&self, expr: Expr) -> Expr {
        let is_array = expr
            .as_var()
            .and_then(|name| self.analysis.binding_type(name))
            .is_some_and(CType::is_array);
        if is_array {
            Expr::addr_of(Expr::index(expr, Expr::number(0)))
        } else {
            expr
        }
    }

    fn lower_call(&mut self, node: &'a N) -> Expr {
        let Some(name) = callee_name(node) else {
            return Expr::opaque(node.text());
        };
        if super::output::is_output_function(&name) {
            self.unroll_output_call(&name, node);
            return Expr::number(0);
        }
        if is_allocator(&name) {
            return self.lower_allocation(node, None);
        }
        if name == "free" {
            return Expr::number(0);
        }
        if let Some(result) = self.unroll_call(node, None) {
            return result;
        }
        debug!(function = %name, "call left as text");
        Expr::opaque(node.text())
    }

    /// `sizeof(type)` or `sizeof expr`
    fn size_of(&mut self, node: &'a N) -> usize {
        if let Some(ty) = node.child_by_field("type") {
            return CType::parse(ty.text()).size(&self.records);
        }
        let Some(mut value) = node.child_by_field("value") else {
            return 4;
        };
        while value.node_kind() == NodeKind::ParenthesizedExpression {
            match value.child_at(0) {
                Some(inner) => value = inner,
                None => break,
            }
        }
        match value.node_kind() {
            NodeKind::Identifier => self
                .analysis
                .binding_type(value.text())
                .map(|ty| ty.size(&self.records))
                .unwrap_or(4),
            NodeKind::PointerExpression | NodeKind::SubscriptExpression => {
                let base = value
                    .child_by_field("argument")
                    .filter(|arg| arg.node_kind() == NodeKind::Identifier)
                    .and_then(|arg| self.analysis.binding_type(arg.text()));
                base.map(|ty| ty.element().size(&self.records)).unwrap_or(4)
            }
            _ => 4,
        }
    }

    /// `new T`, `new T(v)`, `new T[n]`, `new T{...}`
    fn lower_new(&mut self, node: &'a N) -> Expr {
        let mut ty = node
            .child_by_field("type")
            .map(|t| CType::parse(t.text()))
            .unwrap_or_else(|| CType::scalar("int"));
        if let Some(size) = node.child_by_field("size") {
            let size = self.lower_expr(size);
            let count = self
                .analysis
                .evaluate(&size)
                .as_number()
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(0);
            ty.dims = vec![count];
            if ty.clamp_dims() {
                warn!(requested = count, "new[] length truncated");
            }
        }

        let source = if let Some(init) = node.child_by_field("initializer") {
            Some(self.lower_initializer(init, &ty))
        } else if let Some(arguments) = node.child_by_field("arguments") {
            let args: Vec<&'a N> = arguments.children().collect();
            match (self.records.get(&ty.base).cloned(), args.as_slice()) {
                (_, []) => Some(zero_expr(&ty, &self.records)),
                (Some(layout), _) if ty.pointer_depth == 0 => {
                    let mut values = args.iter().copied();
                    let fields = layout
                        .fields
                        .iter()
                        .map(|field| {
                            let expr = match values.next() {
                                Some(value) => self.lower_value(value, Some(&field.declared_type)),
                                None => zero_expr(&field.declared_type, &self.records),
                            };
                            (field.name.clone(), expr)
                        })
                        .collect();
                    Some(Expr::Record { fields })
                }
                (_, [value, ..]) => Some(self.lower_value(*value, Some(&ty))),
            }
        } else {
            None
        };
        self.allocate(ty, source, node)
    }

    /// `malloc(bytes)`, `calloc(n, size)`, `realloc(p, bytes)`
    fn lower_allocation(&mut self, node: &'a N, pointee: Option<CType>) -> Expr {
        let name = callee_name(node).unwrap_or_default();
        let element = pointee.unwrap_or_else(|| CType::scalar("int"));
        let args: Vec<Expr> = call_arguments(node)
            .into_iter()
            .map(|arg| self.lower_expr(arg))
            .collect();
        let number = |expr: Option<&Expr>| {
            expr.and_then(|e| self.analysis.evaluate(e).as_number())
        };
        let bytes = match name.as_str() {
            "calloc" => number(args.first())
                .zip(number(args.get(1)))
                .map(|(count, size)| count.saturating_mul(size)),
            "realloc" => number(args.get(1)),
            _ => number(args.first()),
        };
        let element_size = element.size(&self.records).max(1) as i64;
        let count = bytes
            .map(|b| b / element_size)
            .and_then(|count| usize::try_from(count).ok())
            .unwrap_or(1);

        let ty = if count > 1 {
            let mut ty = CType {
                dims: vec![count],
                ..element
            };
            if ty.clamp_dims() {
                warn!(function = %name, requested = count, "allocation length truncated");
            }
            ty
        } else {
            element
        };
        if name == "realloc" {
            if let Some(moved) = self.reallocated_contents(args.first(), &ty) {
                return self.allocate_value(ty, None, moved, node);
            }
        }
        let source = (name == "calloc").then(|| zero_expr(&ty, &self.records));
        self.allocate(ty, source, node)
    }

    /// Contents of the block `realloc` moves from, cut or padded to `ty`
    fn reallocated_contents(&self, old: Option<&Expr>, ty: &CType) -> Option<SymbolicValue> {
        let SymbolicValue::HeapAddress { token } = self.analysis.evaluate(old?) else {
            return None;
        };
        let previous = self.analysis.memory().heap.value(token)?.clone();
        let fresh = ty.default_value(&self.records);
        let moved = match (previous, fresh) {
            (SymbolicValue::Array { elements: mut kept }, SymbolicValue::Array { elements }) => {
                let kept_len = kept.len().min(elements.len());
                kept.truncate(kept_len);
                kept.extend(elements.into_iter().skip(kept_len));
                SymbolicValue::Array { elements: kept }
            }
            (SymbolicValue::Array { elements: kept }, fresh) => {
                kept.into_iter().next().unwrap_or(fresh)
            }
            (previous, SymbolicValue::Array { mut elements }) => {
                if let Some(first) = elements.first_mut() {
                    *first = previous;
                }
                SymbolicValue::Array { elements }
            }
            (previous, _) => previous,
        };
        Some(moved)
    }

    /// Emit an `AllocateHeap` step and return the new cell's address
    fn allocate(&mut self, ty: CType, source: Option<Expr>, node: &'a N) -> Expr {
        let value = match &source {
            Some(source) => self.analysis.evaluate(source),
            None => ty.default_value(&self.records),
        };
        self.allocate_value(ty, source, value, node)
    }

    fn allocate_value(
        &mut self,
        ty: CType,
        source: Option<Expr>,
        value: SymbolicValue,
        node: &'a N,
    ) -> Expr {
        let token = self.allocator.allocate_heap(ty.size(&self.records));
        debug!(token, ty = %ty, "heap allocation");
        self.analysis.allocate(token, ty.clone(), value.clone());
        self.emit_at(
            StepKind::AllocateHeap {
                token,
                declared_type: ty,
                value: value.detached(),
                source,
            },
            node,
        );
        Expr::HeapAddress { token }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_MATERIALIZED_ELEMENTS;
    use crate::parser::parse;
    use crate::unroller::unroll;

    #[test]
    fn test_integer_literals() {
        assert_eq!(parse_int_literal("42"), Some(42));
        assert_eq!(parse_int_literal("0x1F"), Some(31));
        assert_eq!(parse_int_literal("017"), Some(15));
        assert_eq!(parse_int_literal("10UL"), Some(10));
        assert_eq!(parse_int_literal("0"), Some(0));
        assert_eq!(parse_int_literal("3.75"), Some(3));
    }

    #[test]
    fn test_string_and_char_literals() {
        assert_eq!(unescape_string("\"a\\tb\\n\""), "a\tb\n");
        assert_eq!(unescape_string("\"ab\" \"cd\""), "abcd");
        assert_eq!(decode_char_literal("'A'"), Some(65));
        assert_eq!(decode_char_literal("'\\n'"), Some(10));
        assert_eq!(decode_char_literal("'\\0'"), Some(0));
    }

    fn allocations(source: &str) -> Vec<(String, SymbolicValue)> {
        let root = parse(source).unwrap();
        unroll(&root)
            .iter()
            .filter_map(|step| match &step.kind {
                StepKind::AllocateHeap {
                    declared_type,
                    value,
                    ..
                } => Some((declared_type.to_string(), value.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_new_scalar_and_array() {
        let found = allocations(
            "int main() {\n    int *p = new int(42);\n    int *q = new int[3];\n    return 0;\n}\n",
        );
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], ("int".to_string(), SymbolicValue::number(42)));
        assert_eq!(found[1].0, "int[3]");
        assert_eq!(found[1].1.to_string(), "[0, 0, 0]");
    }

    #[test]
    fn test_malloc_uses_declared_pointee() {
        let found = allocations(
            "int main() {\n    int *arr = (int*)malloc(4 * sizeof(int));\n    char *c = malloc(1);\n    return 0;\n}\n",
        );
        assert_eq!(found[0].0, "int[4]");
        assert_eq!(found[1].0, "char");
    }

    #[test]
    fn test_realloc_keeps_old_contents() {
        let found = allocations(
            "int main() {\n    int *p = malloc(sizeof(int));\n    *p = 7;\n    int *q = realloc(p, 3 * sizeof(int));\n    int *r = realloc(q, 2 * sizeof(int));\n    return 0;\n}\n",
        );
        assert_eq!(found.len(), 3);
        assert_eq!(found[1].0, "int[3]");
        assert_eq!(found[1].1.to_string(), "[7, 0, 0]");
        assert_eq!(found[2].0, "int[2]");
        assert_eq!(found[2].1.to_string(), "[7, 0]");
    }

    #[test]
    fn test_oversized_allocations_are_truncated() {
        let found = allocations(
            "int main() {\n    int *p = new int[1000000000000];\n    int *q = malloc(4000000000000);\n    int *r = malloc(-8);\n    return 0;\n}\n",
        );
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].0, format!("int[{}]", MAX_MATERIALIZED_ELEMENTS));
        assert_eq!(found[1].0, format!("int[{}]", MAX_MATERIALIZED_ELEMENTS));
        assert_eq!(found[2].0, "int");
    }

    #[test]
    fn test_pointer_arithmetic_on_array_decays() {
        let root = parse(
            "int main() {\n    int arr[3] = {1, 2, 3};\n    int *p = arr + 1;\n    return *p;\n}\n",
        )
        .unwrap();
        let trace = unroll(&root);
        let returned = trace.iter().find_map(|step| match &step.kind {
            StepKind::Return { value, .. } => Some(value.clone()),
            _ => None,
        });
        assert_eq!(returned, Some(SymbolicValue::number(2)));
    }
}
