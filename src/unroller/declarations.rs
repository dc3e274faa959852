// Declarations, declarators and struct layouts

use super::Unroller;
use crate::memory::types::{CType, FieldLayout, RecordLayout, RecordTable};
use crate::memory::value::SymbolicValue;
use crate::parser::{NodeKind, SyntaxNode};
use crate::trace::{Expr, ReturnTarget, StepKind};
use std::ptr;
use tracing::{debug, trace, warn};

/// Name of a function definition or prototype
pub(crate) fn function_name<N: SyntaxNode>(node: &N) -> Option<String> {
    let mut declarator = node.child_by_field("declarator")?;
    while declarator.node_kind() == NodeKind::PointerDeclarator {
        declarator = declarator.child_by_field("declarator")?;
    }
    if declarator.node_kind() != NodeKind::FunctionDeclarator {
        return None;
    }
    declarator
        .child_by_field("declarator")
        .map(|name| name.text().to_string())
}

/// A `declaration` that only declares a function
pub(crate) fn is_prototype<N: SyntaxNode>(node: &N) -> bool {
    function_name(node).is_some()
}

/// Children of a declaration other than its `type` field
pub(crate) fn declarators<N: SyntaxNode>(node: &N) -> impl Iterator<Item = &N> {
    let type_node = node.child_by_field("type");
    node.children()
        .filter(move |child| !type_node.is_some_and(|t| ptr::eq(*child, t)))
}

/// Zero initializer expression for a type, used to pad initializer lists
pub(crate) fn zero_expr(ty: &CType, records: &RecordTable) -> Expr {
    if let Some(len) = ty.dims.first() {
        let element = ty.element();
        return Expr::List {
            elements: (0..*len).map(|_| zero_expr(&element, records)).collect(),
        };
    }
    if ty.pointer_depth > 0 {
        return Expr::Null;
    }
    match records.get(&ty.base) {
        Some(layout) => Expr::Record {
            fields: layout
                .fields
                .iter()
                .map(|field| (field.name.clone(), zero_expr(&field.declared_type, records)))
                .collect(),
        },
        None => Expr::number(0),
    }
}

impl<'a, N: SyntaxNode> Unroller<'a, N> {
    /// Register a struct layout
    pub(crate) fn collect_record(&mut self, node: &'a N) {
        let Some(name) = node.child_by_field("name") else {
            return;
        };
        let mut fields = Vec::new();
        if let Some(body) = node.child_by_field("body") {
            for field in body.children() {
                let base = field
                    .child_by_field("type")
                    .map(|t| t.text().to_string())
                    .unwrap_or_default();
                for declarator in declarators(field) {
                    if let Some((field_name, declared_type)) =
                        self.declared_type(&base, declarator)
                    {
                        fields.push(FieldLayout {
                            name: field_name,
                            declared_type,
                        });
                    }
                }
            }
        }
        debug!(record = name.text(), fields = fields.len(), "registered struct layout");
        self.records.insert(
            name.text().to_string(),
            RecordLayout {
                name: name.text().to_string(),
                fields,
            },
        );
    }

    /// Name and type introduced by a declarator. Array sizes that cannot be
    /// determined are left as 0 for the initializer to fill in.
    pub(crate) fn declared_type(&mut self, base: &str, declarator: &'a N) -> Option<(String, CType)> {
        match declarator.node_kind() {
            NodeKind::Identifier => Some((declarator.text().to_string(), CType::parse(base))),
            NodeKind::InitDeclarator => {
                self.declared_type(base, declarator.child_by_field("declarator")?)
            }
            NodeKind::PointerDeclarator => {
                let (name, mut ty) =
                    self.declared_type(base, declarator.child_by_field("declarator")?)?;
                ty.pointer_depth += 1;
                Some((name, ty))
            }
            NodeKind::ArrayDeclarator => {
                let (name, mut ty) =
                    self.declared_type(base, declarator.child_by_field("declarator")?)?;
                let size = match declarator.child_by_field("size") {
                    Some(size) => {
                        let size = self.lower_expr(size);
                        self.analysis
                            .evaluate(&size)
                            .as_number()
                            .and_then(|n| usize::try_from(n).ok())
                            .unwrap_or(0)
                    }
                    None => 0,
                };
                ty.dims.push(size);
                if ty.clamp_dims() {
                    warn!(name = %name, dims = ?ty.dims, "array length truncated");
                }
                Some((name, ty))
            }
            _ => None,
        }
    }

    pub(crate) fn unroll_declaration(&mut self, node: &'a N) {
        let base = node
            .child_by_field("type")
            .map(|t| t.text().to_string())
            .unwrap_or_default();

        for child in declarators(node) {
            let (declarator, init) = match child.node_kind() {
                NodeKind::InitDeclarator => {
                    (child.child_by_field("declarator"), child.child_by_field("value"))
                }
                _ => (Some(child), None),
            };
            let Some(declarator) = declarator else {
                continue;
            };
            let Some((name, ty)) = self.declared_type(&base, declarator) else {
                trace!(text = child.text(), "skipping declarator");
                continue;
            };
            self.declare_variable(name, ty, init, child);
        }
    }

    fn declare_variable(&mut self, name: String, mut ty: CType, init: Option<&'a N>, node: &'a N) {
        let Some(init) = init else {
            let value = ty.default_value(&self.records);
            self.analysis.declare(&name, value.clone(), ty.clone());
            self.emit_at(
                StepKind::BindVariable {
                    name,
                    declared: Some(ty),
                    value,
                    source: None,
                },
                node,
            );
            return;
        };

        if ty.is_array() && ty.dims[0] == 0 {
            ty.dims[0] = match init.node_kind() {
                NodeKind::InitializerList => init.named_child_count(),
                NodeKind::StringLiteral => super::expressions::unescape_string(init.text())
                    .chars()
                    .count()
                    + 1,
                _ => 0,
            };
            ty.clamp_dims();
        }

        if init.node_kind() == NodeKind::CallExpression && !ty.is_array() {
            let target = ReturnTarget {
                name: name.clone(),
                declared: Some(ty.clone()),
            };
            if let Some(result) = self.unroll_call(init, Some(target)) {
                let value = self.analysis.evaluate(&result);
                self.analysis.declare(&name, value, ty);
                return;
            }
        }

        let source = if ty.is_array() && init.node_kind() == NodeKind::StringLiteral {
            Expr::Str {
                text: super::expressions::unescape_string(init.text()),
            }
        } else {
            self.lower_initializer(init, &ty)
        };
        let value = self.analysis.evaluate(&source);
        // unresolved array initializers still get the declared shape
        let value = if ty.is_array()
            && !value.is_resolved()
            && init.node_kind() != NodeKind::StringLiteral
        {
            ty.default_value(&self.records)
        } else {
            value
        };
        self.analysis.declare(&name, value.clone(), ty.clone());
        self.emit_at(
            StepKind::BindVariable {
                name,
                declared: Some(ty),
                value: value.detached(),
                source: Some(source),
            },
            node,
        );
    }

    /// Lower an initializer against the declared type, padding short lists
    pub(crate) fn lower_initializer(&mut self, node: &'a N, ty: &CType) -> Expr {
        if node.node_kind() != NodeKind::InitializerList {
            return self.lower_value(node, Some(ty));
        }

        if let Some(len) = ty.dims.first().copied() {
            let element = ty.element();
            let mut elements: Vec<Expr> = node
                .children()
                .take(len)
                .map(|child| self.lower_initializer(child, &element))
                .collect();
            while elements.len() < len {
                elements.push(zero_expr(&element, &self.records));
            }
            return Expr::List { elements };
        }

        if let Some(layout) = self.records.get(&ty.base).cloned() {
            if ty.pointer_depth == 0 {
                let mut values = node.children();
                let fields = layout
                    .fields
                    .iter()
                    .map(|field| {
                        let expr = match values.next() {
                            Some(value) => self.lower_initializer(value, &field.declared_type),
                            None => zero_expr(&field.declared_type, &self.records),
                        };
                        (field.name.clone(), expr)
                    })
                    .collect();
                return Expr::Record { fields };
            }
        }

        match node.child_at(0) {
            Some(first) => self.lower_value(first, Some(ty)),
            None => zero_expr(ty, &self.records),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_MATERIALIZED_ELEMENTS;
    use crate::parser::parse;
    use crate::trace::Trace;
    use crate::unroller::unroll;

    fn binding_steps(trace: &Trace) -> Vec<(String, Option<CType>, SymbolicValue)> {
        trace
            .iter()
            .filter_map(|step| match &step.kind {
                StepKind::BindVariable {
                    name,
                    declared,
                    value,
                    ..
                } => Some((name.clone(), declared.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_array_initializer_is_padded() {
        let root = parse("int main() {\n    int arr[4] = {1, 2};\n}\n").unwrap();
        let trace = unroll(&root);
        let bindings = binding_steps(&trace);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].2.to_string(), "[1, 2, 0, 0]");
        assert_eq!(bindings[0].1.as_ref().map(|t| t.to_string()), Some("int[4]".to_string()));
    }

    #[test]
    fn test_array_size_from_initializer() {
        let root = parse("int main() {\n    int arr[] = {7, 8, 9};\n    char s[] = \"hi\";\n}\n").unwrap();
        let trace = unroll(&root);
        let bindings = binding_steps(&trace);
        assert_eq!(bindings[0].1.as_ref().map(|t| t.dims.clone()), Some(vec![3]));
        assert_eq!(bindings[1].1.as_ref().map(|t| t.dims.clone()), Some(vec![3]));
        assert_eq!(bindings[1].2, SymbolicValue::raw("hi"));
    }

    #[test]
    fn test_struct_initializer() {
        let root = parse(
            "struct Point {\n    int x;\n    int y;\n};\nint main() {\n    struct Point p = {3};\n}\n",
        )
        .unwrap();
        let trace = unroll(&root);
        assert_eq!(trace.records().get("Point").map(|r| r.fields.len()), Some(2));
        let bindings = binding_steps(&trace);
        assert_eq!(bindings[0].2.to_string(), "{x: 3, y: 0}");
    }

    #[test]
    fn test_uninitialized_declaration() {
        let root = parse("int main() {\n    int x;\n    int *p, q = 2;\n}\n").unwrap();
        let trace = unroll(&root);
        let bindings = binding_steps(&trace);
        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[0].2, SymbolicValue::Uninitialized);
        assert_eq!(bindings[1].1, Some(CType::pointer_to("int", 1)));
        assert_eq!(bindings[2].2, SymbolicValue::number(2));
    }

    #[test]
    fn test_huge_array_is_truncated() {
        let root = parse(
            "int main() {\n    int big[1000000000000000000];\n    int grid[100000][100000];\n}\n",
        )
        .unwrap();
        let trace = unroll(&root);
        let bindings = binding_steps(&trace);
        assert_eq!(bindings.len(), 2);
        let big = bindings[0].1.clone().unwrap();
        assert_eq!(big.dims, vec![MAX_MATERIALIZED_ELEMENTS]);
        assert!(matches!(
            &bindings[0].2,
            SymbolicValue::Array { elements } if elements.len() == MAX_MATERIALIZED_ELEMENTS
        ));
        let grid = bindings[1].1.clone().unwrap();
        assert_eq!(grid.element_count(), Some(MAX_MATERIALIZED_ELEMENTS));
    }

    #[test]
    fn test_prototype_is_not_a_global() {
        let root = parse("int helper(int x);\nint main() {\n    return 0;\n}\n").unwrap();
        let trace = unroll(&root);
        assert!(binding_steps(&trace).is_empty());
        assert!(is_prototype(root.child_at(0).unwrap()));
    }
}
