//! Generic syntax tree and the node inspection interface
//!
//! The unroller never sees parser internals. It walks any tree implementing
//! [`SyntaxNode`]: a node kind string, its source text, a line span, named
//! field lookup and positional children. [`Node`] is the implementation
//! produced by this crate's own parser.
//!
//! Kinds are interpreted through [`NodeKind`], a closed enum over the small
//! vocabulary the unroller understands. Anything else maps to
//! [`NodeKind::Unsupported`] so unhandled constructs are an explicit case.

use serde::Serialize;

/// Source location information for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Line range covered by a node (1-based, inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
}

/// Read-only view over a parsed syntax tree.
///
/// Only named children are exposed; punctuation never appears as a child.
pub trait SyntaxNode {
    fn kind(&self) -> &str;
    fn text(&self) -> &str;
    fn span(&self) -> Span;
    fn child_by_field(&self, name: &str) -> Option<&Self>;
    fn child_at(&self, index: usize) -> Option<&Self>;
    fn named_child_count(&self) -> usize;

    /// Parsed form of [`SyntaxNode::kind`].
    fn node_kind(&self) -> NodeKind {
        NodeKind::from_kind(self.kind())
    }

    /// Iterate the named children in order.
    fn children(&self) -> NodeChildren<'_, Self>
    where
        Self: Sized,
    {
        NodeChildren {
            node: self,
            index: 0,
        }
    }
}

/// Iterator over the named children of a [`SyntaxNode`]
pub struct NodeChildren<'a, N> {
    node: &'a N,
    index: usize,
}

impl<'a, N: SyntaxNode> Iterator for NodeChildren<'a, N> {
    type Item = &'a N;

    fn next(&mut self) -> Option<Self::Item> {
        let child = self.node.child_at(self.index)?;
        self.index += 1;
        Some(child)
    }
}

/// Closed vocabulary of node kinds the unroller dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    TranslationUnit,
    FunctionDefinition,
    FunctionDeclarator,
    ParameterList,
    ParameterDeclaration,
    StructSpecifier,
    FieldDeclarationList,
    FieldDeclaration,
    Declaration,
    InitDeclarator,
    PointerDeclarator,
    ArrayDeclarator,
    InitializerList,
    TypeDescriptor,
    PrimitiveType,
    TypeIdentifier,

    CompoundStatement,
    ExpressionStatement,
    IfStatement,
    SwitchStatement,
    CaseStatement,
    WhileStatement,
    DoStatement,
    ForStatement,
    ReturnStatement,
    BreakStatement,
    ContinueStatement,
    UsingDeclaration,

    AssignmentExpression,
    UpdateExpression,
    BinaryExpression,
    UnaryExpression,
    PointerExpression,
    CallExpression,
    ArgumentList,
    SubscriptExpression,
    FieldExpression,
    NewExpression,
    DeleteExpression,
    SizeofExpression,
    CastExpression,
    ConditionalExpression,
    ParenthesizedExpression,
    CommaExpression,

    Identifier,
    FieldIdentifier,
    NumberLiteral,
    StringLiteral,
    CharLiteral,
    True,
    False,
    Null,
    Operator,

    Unsupported,
}

impl NodeKind {
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "translation_unit" => NodeKind::TranslationUnit,
            "function_definition" => NodeKind::FunctionDefinition,
            "function_declarator" => NodeKind::FunctionDeclarator,
            "parameter_list" => NodeKind::ParameterList,
            "parameter_declaration" => NodeKind::ParameterDeclaration,
            "struct_specifier" => NodeKind::StructSpecifier,
            "field_declaration_list" => NodeKind::FieldDeclarationList,
            "field_declaration" => NodeKind::FieldDeclaration,
            "declaration" => NodeKind::Declaration,
            "init_declarator" => NodeKind::InitDeclarator,
            "pointer_declarator" => NodeKind::PointerDeclarator,
            "array_declarator" => NodeKind::ArrayDeclarator,
            "initializer_list" => NodeKind::InitializerList,
            "type_descriptor" => NodeKind::TypeDescriptor,
            "primitive_type" => NodeKind::PrimitiveType,
            "type_identifier" => NodeKind::TypeIdentifier,
            "compound_statement" => NodeKind::CompoundStatement,
            "expression_statement" => NodeKind::ExpressionStatement,
            "if_statement" => NodeKind::IfStatement,
            "switch_statement" => NodeKind::SwitchStatement,
            "case_statement" => NodeKind::CaseStatement,
            "while_statement" => NodeKind::WhileStatement,
            "do_statement" => NodeKind::DoStatement,
            "for_statement" => NodeKind::ForStatement,
            "return_statement" => NodeKind::ReturnStatement,
            "break_statement" => NodeKind::BreakStatement,
            "continue_statement" => NodeKind::ContinueStatement,
            "using_declaration" => NodeKind::UsingDeclaration,
            "assignment_expression" => NodeKind::AssignmentExpression,
            "update_expression" => NodeKind::UpdateExpression,
            "binary_expression" => NodeKind::BinaryExpression,
            "unary_expression" => NodeKind::UnaryExpression,
            "pointer_expression" => NodeKind::PointerExpression,
            "call_expression" => NodeKind::CallExpression,
            "argument_list" => NodeKind::ArgumentList,
            "subscript_expression" => NodeKind::SubscriptExpression,
            "field_expression" => NodeKind::FieldExpression,
            "new_expression" => NodeKind::NewExpression,
            "delete_expression" => NodeKind::DeleteExpression,
            "sizeof_expression" => NodeKind::SizeofExpression,
            "cast_expression" => NodeKind::CastExpression,
            "conditional_expression" => NodeKind::ConditionalExpression,
            "parenthesized_expression" => NodeKind::ParenthesizedExpression,
            "comma_expression" => NodeKind::CommaExpression,
            "identifier" | "qualified_identifier" => NodeKind::Identifier,
            "field_identifier" => NodeKind::FieldIdentifier,
            "number_literal" => NodeKind::NumberLiteral,
            "string_literal" => NodeKind::StringLiteral,
            "char_literal" => NodeKind::CharLiteral,
            "true" => NodeKind::True,
            "false" => NodeKind::False,
            "null" | "nullptr" => NodeKind::Null,
            "operator" => NodeKind::Operator,
            _ => NodeKind::Unsupported,
        }
    }
}

/// Owned syntax tree node produced by [`crate::parser::parser::Parser`]
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    kind: &'static str,
    text: String,
    span: Span,
    fields: Vec<(&'static str, usize)>,
    children: Vec<Node>,
}

impl Node {
    pub fn new(kind: &'static str, text: impl Into<String>, span: Span) -> Self {
        Node {
            kind,
            text: text.into(),
            span,
            fields: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Append an unnamed child
    pub fn push(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Append a child reachable through `field`
    pub fn push_field(&mut self, field: &'static str, child: Node) {
        self.fields.push((field, self.children.len()));
        self.children.push(child);
    }

    pub fn with_field(mut self, field: &'static str, child: Node) -> Self {
        self.push_field(field, child);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.push(child);
        self
    }
}

impl SyntaxNode for Node {
    fn kind(&self) -> &str {
        self.kind
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn span(&self) -> Span {
        self.span
    }

    fn child_by_field(&self, name: &str) -> Option<&Self> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .and_then(|(_, index)| self.children.get(*index))
    }

    fn child_at(&self, index: usize) -> Option<&Self> {
        self.children.get(index)
    }

    fn named_child_count(&self) -> usize {
        self.children.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_lookup_and_children() {
        let span = Span {
            start_line: 1,
            end_line: 1,
        };
        let node = Node::new("binary_expression", "a + 1", span)
            .with_field("left", Node::new("identifier", "a", span))
            .with_field("operator", Node::new("operator", "+", span))
            .with_field("right", Node::new("number_literal", "1", span));

        assert_eq!(node.node_kind(), NodeKind::BinaryExpression);
        assert_eq!(node.named_child_count(), 3);
        assert_eq!(node.child_by_field("right").map(|n| n.text()), Some("1"));
        assert!(node.child_by_field("missing").is_none());
        let kinds: Vec<&str> = node.children().map(|c| c.kind()).collect();
        assert_eq!(kinds, ["identifier", "operator", "number_literal"]);
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        assert_eq!(NodeKind::from_kind("lambda_expression"), NodeKind::Unsupported);
        assert_eq!(NodeKind::from_kind("nullptr"), NodeKind::Null);
    }
}
