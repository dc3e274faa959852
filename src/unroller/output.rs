// Console output: printf-family calls and `cout <<` chains become LogOutput
// steps whose templates the executor resolves against live memory.

use super::expressions::{call_arguments, decode_char_literal, unescape_string};
use super::Unroller;
use crate::parser::{NodeKind, SyntaxNode};
use crate::trace::{Expr, StepKind};
use tracing::trace;

pub(crate) fn is_output_function(name: &str) -> bool {
    matches!(name, "printf" | "puts" | "putchar" | "fprintf")
}

/// Escape literal text so it survives template resolution
fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// One `%` conversion in a format string
#[derive(Debug, PartialEq)]
enum FormatPiece {
    Literal(String),
    /// Conversion character plus whether a `*` width consumes an argument
    Conversion { spec: char, star_args: usize },
}

fn parse_format(format: &str) -> Vec<FormatPiece> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            literal.push('%');
            continue;
        }
        let mut star_args = 0;
        let mut spec = None;
        for next in chars.by_ref() {
            match next {
                '*' => star_args += 1,
                '-' | '+' | ' ' | '#' | '.' | '0'..='9' | 'h' | 'l' | 'L' | 'z' | 'j' | 't' => {}
                other => {
                    spec = Some(other);
                    break;
                }
            }
        }
        if !literal.is_empty() {
            pieces.push(FormatPiece::Literal(std::mem::take(&mut literal)));
        }
        if let Some(spec) = spec {
            pieces.push(FormatPiece::Conversion { spec, star_args });
        }
    }
    if !literal.is_empty() {
        pieces.push(FormatPiece::Literal(literal));
    }
    pieces
}

impl<'a, N: SyntaxNode> Unroller<'a, N> {
    pub(crate) fn unroll_output_call(&mut self, name: &str, node: &'a N) {
        let mut args = call_arguments(node).into_iter();
        if name == "fprintf" {
            // stream argument
            args.next();
        }
        let mut template = String::new();
        let mut arguments = Vec::new();

        match name {
            "puts" => {
                if let Some(arg) = args.next() {
                    template.push_str(&self.placeholder(arg, 's', &mut arguments));
                }
                template.push('\n');
            }
            "putchar" => {
                if let Some(arg) = args.next() {
                    template.push_str(&self.placeholder(arg, 'c', &mut arguments));
                }
            }
            _ => {
                let Some(format) = args.next() else {
                    return;
                };
                if format.node_kind() != NodeKind::StringLiteral {
                    template.push_str(&self.placeholder(format, 's', &mut arguments));
                } else {
                    for piece in parse_format(&unescape_string(format.text())) {
                        match piece {
                            FormatPiece::Literal(text) => template.push_str(&escape_braces(&text)),
                            FormatPiece::Conversion { spec, star_args } => {
                                for _ in 0..star_args {
                                    args.next();
                                }
                                match args.next() {
                                    Some(arg) => template
                                        .push_str(&self.placeholder(arg, spec, &mut arguments)),
                                    None => template.push_str(&format!("%{}", spec)),
                                }
                            }
                        }
                    }
                }
            }
        }

        trace!(template = %template, "output template");
        self.emit_at(
            StepKind::LogOutput {
                template,
                arguments,
            },
            node,
        );
    }

    /// Template text for one output argument under conversion `spec`
    fn placeholder(&mut self, arg: &'a N, spec: char, arguments: &mut Vec<Expr>) -> String {
        let suffix = match spec {
            'c' => ":c",
            'x' | 'X' => ":x",
            _ => "",
        };
        match arg.node_kind() {
            NodeKind::StringLiteral if spec == 's' => escape_braces(&unescape_string(arg.text())),
            NodeKind::CharLiteral if spec == 'c' => decode_char_literal(arg.text())
                .and_then(|code| u8::try_from(code).ok())
                .map(|byte| escape_braces(&(byte as char).to_string()))
                .unwrap_or_default(),
            NodeKind::Identifier => format!("{{{}{}}}", arg.text(), suffix),
            NodeKind::PointerExpression if is_deref_of_identifier(arg) => {
                let mut stars = String::new();
                let mut inner = arg;
                while inner.node_kind() == NodeKind::PointerExpression {
                    stars.push('*');
                    match inner.child_by_field("argument") {
                        Some(next) => inner = next,
                        None => break,
                    }
                }
                format!("{{{}{}{}}}", stars, inner.text(), suffix)
            }
            _ => {
                let expr = self.lower_expr(arg);
                let index = arguments.len();
                arguments.push(expr);
                format!("{{@{}{}}}", index, suffix)
            }
        }
    }

    /// `std::cout << ...` chains
    pub(crate) fn is_stream_output(&self, node: &'a N) -> bool {
        stream_operands(node)
            .first()
            .is_some_and(|first| matches!(first.text(), "cout" | "std::cout" | "cerr" | "std::cerr"))
    }

    pub(crate) fn unroll_stream_output(&mut self, node: &'a N) {
        let operands = stream_operands(node);
        let mut template = String::new();
        let mut arguments = Vec::new();
        for operand in operands.into_iter().skip(1) {
            match operand.node_kind() {
                NodeKind::Identifier if matches!(operand.text(), "endl" | "std::endl") => {
                    template.push('\n')
                }
                NodeKind::StringLiteral => {
                    template.push_str(&escape_braces(&unescape_string(operand.text())))
                }
                NodeKind::CharLiteral => {
                    template.push_str(&self.placeholder(operand, 'c', &mut arguments))
                }
                NodeKind::NumberLiteral => template.push_str(operand.text()),
                _ => template.push_str(&self.placeholder(operand, 'd', &mut arguments)),
            }
        }
        trace!(template = %template, "stream output template");
        self.emit_at(
            StepKind::LogOutput {
                template,
                arguments,
            },
            node,
        );
    }
}

/// Whether a pointer expression is `*name`, `**name`, ...
fn is_deref_of_identifier<N: SyntaxNode>(node: &N) -> bool {
    match node.node_kind() {
        NodeKind::PointerExpression => {
            node.child_by_field("operator").is_some_and(|op| op.text() == "*")
                && node
                    .child_by_field("argument")
                    .is_some_and(is_deref_of_identifier)
        }
        NodeKind::Identifier => true,
        _ => false,
    }
}

/// Flatten a left-nested `a << b << c` chain into `[a, b, c]`
fn stream_operands<N: SyntaxNode>(node: &N) -> Vec<&N> {
    let is_shift = node.node_kind() == NodeKind::BinaryExpression
        && node
            .child_by_field("operator")
            .is_some_and(|op| op.text() == "<<");
    if !is_shift {
        return vec![node];
    }
    let mut operands = match node.child_by_field("left") {
        Some(left) => stream_operands(left),
        None => Vec::new(),
    };
    if let Some(right) = node.child_by_field("right") {
        operands.push(right);
    }
    operands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::trace::Trace;
    use crate::unroller::unroll;

    fn outputs(trace: &Trace) -> Vec<(String, Vec<Expr>)> {
        trace
            .iter()
            .filter_map(|step| match &step.kind {
                StepKind::LogOutput {
                    template,
                    arguments,
                } => Some((template.clone(), arguments.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(
            parse_format("x=%d%%\n"),
            vec![
                FormatPiece::Literal("x=".to_string()),
                FormatPiece::Conversion {
                    spec: 'd',
                    star_args: 0
                },
                FormatPiece::Literal("%\n".to_string()),
            ]
        );
        assert_eq!(
            parse_format("%-*ld"),
            vec![FormatPiece::Conversion {
                spec: 'd',
                star_args: 1
            }]
        );
    }

    #[test]
    fn test_printf_templates() {
        let root = parse(
            "int main() {\n    int x = 3;\n    int *p = &x;\n    printf(\"x=%d *p=%d sum=%d {}\\n\", x, *p, x + 1);\n    return 0;\n}\n",
        )
        .unwrap();
        let found = outputs(&unroll(&root));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "x={x} *p={*p} sum={@0} {{}}\n");
        assert_eq!(found[0].1.len(), 1);
    }

    #[test]
    fn test_puts_and_putchar() {
        let root = parse("int main() {\n    puts(\"hi\");\n    putchar('A');\n    char c = 'b';\n    putchar(c);\n}\n").unwrap();
        let found = outputs(&unroll(&root));
        let templates: Vec<&str> = found.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(templates, vec!["hi\n", "A", "{c:c}"]);
    }

    #[test]
    fn test_cout_chain() {
        let root = parse(
            "using namespace std;\nint main() {\n    int n = 4;\n    cout << \"n = \" << n << endl;\n    std::cout << n * 2 << '!' << std::endl;\n}\n",
        )
        .unwrap();
        let found = outputs(&unroll(&root));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, "n = {n}\n");
        assert_eq!(found[1].0, "{@0}!\n");
    }
}
