//! Recursive descent parser for the C subset
//!
//! Builds [`Node`] trees whose kinds and field names follow the vocabulary in
//! [`NodeKind`]. Binary operators use precedence climbing, one method per
//! precedence level.

use crate::parser::lexer::{LexError, Lexer, Token, TokenKind};
use crate::parser::node::{Node, SourceLocation, Span, SyntaxNode};
use rustc_hash::FxHashSet;
use thiserror::Error;

/// Parser error type
#[derive(Debug, Clone, Error)]
#[error("Parse error at line {}, column {}: {message}", .location.line, .location.column)]
pub struct ParseError {
    pub message: String,
    pub location: SourceLocation,
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError {
            message: err.message,
            location: err.location,
        }
    }
}

/// Recursive descent parser for C subset
pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    position: usize,
    /// Struct names seen so far; lets `Node* p;` parse as a declaration
    type_names: FxHashSet<String>,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Result<Self, ParseError> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self {
            source,
            tokens,
            position: 0,
            type_names: FxHashSet::default(),
        })
    }

    /// Parse the entire program into a `translation_unit` node
    pub fn parse_program(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        let mut items = Vec::new();

        while !self.is_at_end() {
            items.push(self.parse_top_level()?);
        }

        let mut unit = self.finish("translation_unit", start);
        for item in items {
            unit.push(item);
        }
        Ok(unit)
    }

    fn parse_top_level(&mut self) -> Result<Node, ParseError> {
        if self.check(&TokenKind::Using) {
            return self.parse_using();
        }

        if self.check(&TokenKind::Struct)
            && matches!(self.peek_at(1), TokenKind::Ident(_))
            && self.peek_at(2) == &TokenKind::LBrace
        {
            return self.parse_struct_definition();
        }

        let start = self.position;
        let type_node = self.parse_type()?;
        let declarator_start = self.position;
        let declarator = self.parse_declarator()?;

        if self.check(&TokenKind::LParen) {
            return self.parse_function_rest(start, type_node, declarator);
        }

        self.parse_declaration_rest(start, type_node, declarator_start, declarator)
    }

    fn parse_using(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        while !self.check(&TokenKind::Semicolon) && !self.is_at_end() {
            self.advance();
        }
        self.expect_token(&TokenKind::Semicolon, "Expected ';' after using declaration")?;
        Ok(self.finish("using_declaration", start))
    }

    /// Parse struct definition: struct Name { fields };
    fn parse_struct_definition(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        self.advance(); // 'struct'
        let name = self.expect_identifier("type_identifier")?;
        self.type_names.insert(name.text().to_string());

        let body_start = self.position;
        self.expect_token(&TokenKind::LBrace, "Expected '{' after struct name")?;

        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let field_start = self.position;
            let field_type = self.parse_type()?;
            let mut declarators = vec![self.parse_declarator()?];
            while self.match_token(&TokenKind::Comma) {
                declarators.push(self.parse_declarator()?);
            }
            self.expect_token(&TokenKind::Semicolon, "Expected ';' after struct field")?;

            let mut field = self.finish("field_declaration", field_start);
            field.push_field("type", field_type);
            for declarator in declarators {
                field.push_field("declarator", declarator);
            }
            fields.push(field);
        }

        self.expect_token(&TokenKind::RBrace, "Expected '}' after struct fields")?;
        let mut body = self.finish("field_declaration_list", body_start);
        for field in fields {
            body.push(field);
        }
        self.expect_token(&TokenKind::Semicolon, "Expected ';' after struct definition")?;

        Ok(self
            .finish("struct_specifier", start)
            .with_field("name", name)
            .with_field("body", body))
    }

    fn parse_function_rest(
        &mut self,
        start: usize,
        type_node: Node,
        declarator: Node,
    ) -> Result<Node, ParseError> {
        // Return-type stars were folded into the declarator; peel them so the
        // function declarator wraps the bare name.
        let (name, pointer_depth) = Self::peel_pointers(declarator);

        let params_start = self.position;
        self.expect_token(&TokenKind::LParen, "Expected '(' after function name")?;
        let params = self.parse_parameter_list()?;
        self.expect_token(&TokenKind::RParen, "Expected ')' after parameters")?;

        let mut parameters = self.finish("parameter_list", params_start);
        for param in params {
            parameters.push(param);
        }

        let mut function_declarator = self
            .finish("function_declarator", start)
            .with_field("declarator", name)
            .with_field("parameters", parameters);
        for _ in 0..pointer_depth {
            function_declarator = self
                .finish("pointer_declarator", start)
                .with_field("declarator", function_declarator);
        }

        if self.match_token(&TokenKind::Semicolon) {
            // Prototype only
            return Ok(self
                .finish("declaration", start)
                .with_field("type", type_node)
                .with_field("declarator", function_declarator));
        }

        let body = self.parse_compound_statement()?;

        Ok(self
            .finish("function_definition", start)
            .with_field("type", type_node)
            .with_field("declarator", function_declarator)
            .with_field("body", body))
    }

    fn peel_pointers(mut declarator: Node) -> (Node, usize) {
        let mut depth = 0;
        while declarator.kind() == "pointer_declarator" {
            match declarator.child_by_field("declarator") {
                Some(inner) => {
                    let inner = inner.clone();
                    declarator = inner;
                    depth += 1;
                }
                None => break,
            }
        }
        (declarator, depth)
    }

    fn parse_parameter_list(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut params = Vec::new();

        if self.check(&TokenKind::RParen) {
            return Ok(params);
        }

        // (void) means no parameters
        if self.check(&TokenKind::Void) && self.peek_at(1) == &TokenKind::RParen {
            self.advance();
            return Ok(params);
        }

        loop {
            let start = self.position;
            let param_type = self.parse_type()?;
            let declarator = self.parse_declarator()?;
            params.push(
                self.finish("parameter_declaration", start)
                    .with_field("type", param_type)
                    .with_field("declarator", declarator),
            );

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        Ok(params)
    }

    /// Parse a base type: `[const] int`, `unsigned long`, `struct Name`, `Name`
    fn parse_type(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        while self.match_token(&TokenKind::Const) {}

        if self.match_token(&TokenKind::Struct) {
            let name = self.expect_identifier("type_identifier")?;
            while self.match_token(&TokenKind::Const) {}
            return Ok(Node::new("type_identifier", name.text().to_string(), self.span_from(start)));
        }

        if let TokenKind::Ident(name) = self.peek().clone() {
            if self.type_names.contains(&name) {
                self.advance();
                while self.match_token(&TokenKind::Const) {}
                return Ok(Node::new("type_identifier", name, self.span_from(start)));
            }
        }

        let mut words = Vec::new();
        loop {
            let word = match self.peek() {
                TokenKind::Int => "int",
                TokenKind::Char => "char",
                TokenKind::Void => "void",
                TokenKind::Bool => "bool",
                TokenKind::Long => "long",
                TokenKind::Short => "short",
                TokenKind::Unsigned => "unsigned",
                TokenKind::Const => {
                    self.advance();
                    continue;
                }
                _ => break,
            };
            words.push(word);
            self.advance();
        }

        if words.is_empty() {
            return Err(ParseError {
                message: format!("Expected type, found {}", self.peek()),
                location: self.current_location(),
            });
        }

        Ok(Node::new("primitive_type", words.join(" "), self.span_from(start)))
    }

    /// Parse a declarator: `*`s, a name, then `[size]` suffixes
    fn parse_declarator(&mut self) -> Result<Node, ParseError> {
        let start = self.position;

        if self.match_token(&TokenKind::Star) {
            while self.match_token(&TokenKind::Const) {}
            let inner = self.parse_declarator()?;
            return Ok(self
                .finish("pointer_declarator", start)
                .with_field("declarator", inner));
        }

        let mut declarator = self.expect_identifier("identifier")?;

        while self.check(&TokenKind::LBracket) {
            self.advance();
            let size = if self.check(&TokenKind::RBracket) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect_token(&TokenKind::RBracket, "Expected ']' after array size")?;

            let mut array = self
                .finish("array_declarator", start)
                .with_field("declarator", declarator);
            if let Some(size) = size {
                array.push_field("size", size);
            }
            declarator = array;
        }

        Ok(declarator)
    }

    fn parse_declaration_rest(
        &mut self,
        start: usize,
        type_node: Node,
        first_start: usize,
        first: Node,
    ) -> Result<Node, ParseError> {
        let mut declarators = vec![self.parse_init_declarator(first_start, first)?];

        while self.match_token(&TokenKind::Comma) {
            let decl_start = self.position;
            let declarator = self.parse_declarator()?;
            declarators.push(self.parse_init_declarator(decl_start, declarator)?);
        }

        self.expect_token(&TokenKind::Semicolon, "Expected ';' after variable declaration")?;

        let mut declaration = self
            .finish("declaration", start)
            .with_field("type", type_node);
        for declarator in declarators {
            declaration.push(declarator);
        }
        Ok(declaration)
    }

    fn parse_init_declarator(&mut self, start: usize, declarator: Node) -> Result<Node, ParseError> {
        if !self.match_token(&TokenKind::Eq) {
            return Ok(declarator);
        }

        let value = if self.check(&TokenKind::LBrace) {
            self.parse_initializer_list()?
        } else {
            self.parse_assignment()?
        };

        Ok(self
            .finish("init_declarator", start)
            .with_field("declarator", declarator)
            .with_field("value", value))
    }

    fn parse_initializer_list(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        self.expect_token(&TokenKind::LBrace, "Expected '{' to start initializer list")?;

        let mut elements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.check(&TokenKind::LBrace) {
                elements.push(self.parse_initializer_list()?);
            } else {
                elements.push(self.parse_assignment()?);
            }
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        self.expect_token(&TokenKind::RBrace, "Expected '}' after initializer list")?;
        let mut list = self.finish("initializer_list", start);
        for element in elements {
            list.push(element);
        }
        Ok(list)
    }

    fn parse_compound_statement(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        self.expect_token(&TokenKind::LBrace, "Expected '{' to start block")?;

        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }

        self.expect_token(&TokenKind::RBrace, "Expected '}' after block")?;
        let mut block = self.finish("compound_statement", start);
        for statement in statements {
            block.push(statement);
        }
        Ok(block)
    }

    /// Parse a statement
    fn parse_statement(&mut self) -> Result<Node, ParseError> {
        let start = self.position;

        match self.peek().clone() {
            TokenKind::LBrace => self.parse_compound_statement(),
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect_token(&TokenKind::Semicolon, "Expected ';' after return")?;
                let mut node = self.finish("return_statement", start);
                if let Some(value) = value {
                    node.push(value);
                }
                Ok(node)
            }
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => {
                self.advance();
                let condition = self.parse_condition("while")?;
                let body = self.parse_statement()?;
                Ok(self
                    .finish("while_statement", start)
                    .with_field("condition", condition)
                    .with_field("body", body))
            }
            TokenKind::Do => {
                self.advance();
                let body = self.parse_statement()?;
                self.expect_token(&TokenKind::While, "Expected 'while' after do body")?;
                let condition = self.parse_condition("while")?;
                self.expect_token(&TokenKind::Semicolon, "Expected ';' after do-while")?;
                Ok(self
                    .finish("do_statement", start)
                    .with_field("body", body)
                    .with_field("condition", condition))
            }
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Switch => self.parse_switch_statement(),
            TokenKind::Break => {
                self.advance();
                self.expect_token(&TokenKind::Semicolon, "Expected ';' after 'break'")?;
                Ok(self.finish("break_statement", start))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect_token(&TokenKind::Semicolon, "Expected ';' after 'continue'")?;
                Ok(self.finish("continue_statement", start))
            }
            TokenKind::Using => self.parse_using(),
            _ if self.is_declaration_start() => {
                let type_node = self.parse_type()?;
                let declarator_start = self.position;
                let declarator = self.parse_declarator()?;
                self.parse_declaration_rest(start, type_node, declarator_start, declarator)
            }
            _ => {
                let expr = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect_token(&TokenKind::Semicolon, "Expected ';' after expression")?;
                let mut node = self.finish("expression_statement", start);
                if let Some(expr) = expr {
                    node.push(expr);
                }
                Ok(node)
            }
        }
    }

    fn parse_condition(&mut self, keyword: &str) -> Result<Node, ParseError> {
        self.expect_token(&TokenKind::LParen, &format!("Expected '(' after '{}'", keyword))?;
        let condition = self.parse_expression()?;
        self.expect_token(&TokenKind::RParen, &format!("Expected ')' after {} condition", keyword))?;
        Ok(condition)
    }

    fn parse_if_statement(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        self.advance(); // 'if'

        let condition = self.parse_condition("if")?;
        let consequence = self.parse_statement()?;
        let alternative = if self.match_token(&TokenKind::Else) {
            Some(self.parse_statement()?)
        } else {
            None
        };

        let mut node = self
            .finish("if_statement", start)
            .with_field("condition", condition)
            .with_field("consequence", consequence);
        if let Some(alternative) = alternative {
            node.push_field("alternative", alternative);
        }
        Ok(node)
    }

    fn parse_for_statement(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        self.advance(); // 'for'
        self.expect_token(&TokenKind::LParen, "Expected '(' after 'for'")?;

        let initializer = if self.match_token(&TokenKind::Semicolon) {
            None
        } else if self.is_declaration_start() {
            let decl_start = self.position;
            let type_node = self.parse_type()?;
            let declarator_start = self.position;
            let declarator = self.parse_declarator()?;
            // Consumes the ';'
            Some(self.parse_declaration_rest(
                decl_start,
                type_node,
                declarator_start,
                declarator,
            )?)
        } else {
            let expr = self.parse_expression()?;
            self.expect_token(&TokenKind::Semicolon, "Expected ';' after for init")?;
            Some(expr)
        };

        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_token(&TokenKind::Semicolon, "Expected ';' after for condition")?;

        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_token(&TokenKind::RParen, "Expected ')' after for clauses")?;

        let body = self.parse_statement()?;

        let mut node = self.finish("for_statement", start);
        if let Some(initializer) = initializer {
            node.push_field("initializer", initializer);
        }
        if let Some(condition) = condition {
            node.push_field("condition", condition);
        }
        if let Some(update) = update {
            node.push_field("update", update);
        }
        node.push_field("body", body);
        Ok(node)
    }

    fn parse_switch_statement(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        self.advance(); // 'switch'

        let condition = self.parse_condition("switch")?;

        let body_start = self.position;
        self.expect_token(&TokenKind::LBrace, "Expected '{' before switch body")?;

        let mut cases = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let case_start = self.position;
            let value = if self.match_token(&TokenKind::Case) {
                let value = self.parse_ternary()?;
                self.expect_token(&TokenKind::Colon, "Expected ':' after case value")?;
                Some(value)
            } else if self.match_token(&TokenKind::Default) {
                self.expect_token(&TokenKind::Colon, "Expected ':' after 'default'")?;
                None
            } else {
                return Err(ParseError {
                    message: "Expected 'case' or 'default' in switch body".to_string(),
                    location: self.current_location(),
                });
            };

            let mut statements = Vec::new();
            while !self.check(&TokenKind::Case)
                && !self.check(&TokenKind::Default)
                && !self.check(&TokenKind::RBrace)
                && !self.is_at_end()
            {
                statements.push(self.parse_statement()?);
            }

            let mut case = self.finish("case_statement", case_start);
            if let Some(value) = value {
                case.push_field("value", value);
            }
            for statement in statements {
                case.push(statement);
            }
            cases.push(case);
        }

        self.expect_token(&TokenKind::RBrace, "Expected '}' after switch body")?;
        let mut body = self.finish("compound_statement", body_start);
        for case in cases {
            body.push(case);
        }

        Ok(self
            .finish("switch_statement", start)
            .with_field("condition", condition)
            .with_field("body", body))
    }

    /// Parse expression (top-level entry point, includes the comma operator)
    fn parse_expression(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        let mut left = self.parse_assignment()?;

        while self.match_token(&TokenKind::Comma) {
            let right = self.parse_assignment()?;
            left = self
                .finish("comma_expression", start)
                .with_field("left", left)
                .with_field("right", right);
        }

        Ok(left)
    }

    /// Parse assignment (right-associative)
    fn parse_assignment(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        let left = self.parse_ternary()?;

        let is_assign = matches!(
            self.peek(),
            TokenKind::Eq
                | TokenKind::PlusEq
                | TokenKind::MinusEq
                | TokenKind::StarEq
                | TokenKind::SlashEq
                | TokenKind::PercentEq
        );

        if is_assign {
            let operator = self.operator_node();
            let right = if self.check(&TokenKind::LBrace) {
                self.parse_initializer_list()?
            } else {
                self.parse_assignment()?
            };
            return Ok(self
                .finish("assignment_expression", start)
                .with_field("left", left)
                .with_field("operator", operator)
                .with_field("right", right));
        }

        Ok(left)
    }

    /// Parse ternary: condition ? true_expr : false_expr
    fn parse_ternary(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        let condition = self.parse_binary(0)?;

        if self.match_token(&TokenKind::Question) {
            let consequence = self.parse_expression()?;
            self.expect_token(&TokenKind::Colon, "Expected ':' in ternary expression")?;
            let alternative = self.parse_ternary()?;
            return Ok(self
                .finish("conditional_expression", start)
                .with_field("condition", condition)
                .with_field("consequence", consequence)
                .with_field("alternative", alternative));
        }

        Ok(condition)
    }

    /// Binding power of a binary operator token (higher binds tighter)
    fn binary_precedence(kind: &TokenKind) -> Option<u8> {
        let precedence = match kind {
            TokenKind::OrOr => 1,
            TokenKind::AndAnd => 2,
            TokenKind::Pipe => 3,
            TokenKind::Caret => 4,
            TokenKind::Amp => 5,
            TokenKind::EqEq | TokenKind::NotEq => 6,
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => 7,
            TokenKind::LtLt | TokenKind::GtGt => 8,
            TokenKind::Plus | TokenKind::Minus => 9,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 10,
            _ => return None,
        };
        Some(precedence)
    }

    /// Precedence climbing over all left-associative binary levels
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Node, ParseError> {
        let start = self.position;
        let mut left = self.parse_unary()?;

        while let Some(precedence) = Self::binary_precedence(self.peek()) {
            if precedence <= min_precedence {
                break;
            }
            let operator = self.operator_node();
            let right = self.parse_binary(precedence)?;
            left = self
                .finish("binary_expression", start)
                .with_field("left", left)
                .with_field("operator", operator)
                .with_field("right", right);
        }

        Ok(left)
    }

    /// Parse unary (! ~ - + & * ++ -- sizeof new delete) and casts
    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        let start = self.position;

        match self.peek().clone() {
            TokenKind::Bang | TokenKind::Tilde | TokenKind::Minus | TokenKind::Plus => {
                let operator = self.operator_node();
                let argument = self.parse_unary()?;
                Ok(self
                    .finish("unary_expression", start)
                    .with_field("operator", operator)
                    .with_field("argument", argument))
            }
            TokenKind::Star | TokenKind::Amp => {
                let operator = self.operator_node();
                let argument = self.parse_unary()?;
                Ok(self
                    .finish("pointer_expression", start)
                    .with_field("operator", operator)
                    .with_field("argument", argument))
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let operator = self.operator_node();
                let argument = self.parse_unary()?;
                Ok(self
                    .finish("update_expression", start)
                    .with_field("operator", operator)
                    .with_field("argument", argument))
            }
            TokenKind::Sizeof => self.parse_sizeof(),
            TokenKind::New => self.parse_new(),
            TokenKind::Delete => {
                self.advance();
                if self.check(&TokenKind::LBracket) && self.peek_at(1) == &TokenKind::RBracket {
                    self.advance();
                    self.advance();
                }
                let argument = self.parse_unary()?;
                Ok(self
                    .finish("delete_expression", start)
                    .with_field("argument", argument))
            }
            TokenKind::LParen if self.is_cast_start() => {
                self.advance();
                let type_descriptor = self.parse_type_descriptor()?;
                self.expect_token(&TokenKind::RParen, "Expected ')' after cast type")?;
                let value = self.parse_unary()?;
                Ok(self
                    .finish("cast_expression", start)
                    .with_field("type", type_descriptor)
                    .with_field("value", value))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_sizeof(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        self.advance(); // 'sizeof'

        if self.check(&TokenKind::LParen) && self.is_type_start_at(1) {
            self.advance();
            let type_descriptor = self.parse_type_descriptor()?;
            self.expect_token(&TokenKind::RParen, "Expected ')' after sizeof type")?;
            return Ok(self
                .finish("sizeof_expression", start)
                .with_field("type", type_descriptor));
        }

        let value = self.parse_unary()?;
        Ok(self
            .finish("sizeof_expression", start)
            .with_field("value", value))
    }

    /// `new T`, `new T(args)`, `new T[n]`, `new T{...}`
    fn parse_new(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        self.advance(); // 'new'

        let type_node = self.parse_type()?;
        let mut arguments = None;
        let mut size = None;

        if self.check(&TokenKind::LParen) {
            let args_start = self.position;
            self.advance();
            let args = self.parse_argument_list()?;
            self.expect_token(&TokenKind::RParen, "Expected ')' after new arguments")?;
            let mut list = self.finish("argument_list", args_start);
            for arg in args {
                list.push(arg);
            }
            arguments = Some(list);
        } else if self.match_token(&TokenKind::LBracket) {
            size = Some(self.parse_expression()?);
            self.expect_token(&TokenKind::RBracket, "Expected ']' after new array size")?;
        }

        let initializer = if self.check(&TokenKind::LBrace) {
            Some(self.parse_initializer_list()?)
        } else {
            None
        };

        let mut node = self
            .finish("new_expression", start)
            .with_field("type", type_node);
        if let Some(arguments) = arguments {
            node.push_field("arguments", arguments);
        }
        if let Some(size) = size {
            node.push_field("size", size);
        }
        if let Some(initializer) = initializer {
            node.push_field("initializer", initializer);
        }
        Ok(node)
    }

    /// Type inside parentheses for casts and sizeof: `int*`, `struct P`
    fn parse_type_descriptor(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        let base = self.parse_type()?;
        while self.match_token(&TokenKind::Star) {}
        Ok(self
            .finish("type_descriptor", start)
            .with_field("type", base))
    }

    /// Parse postfix (++ -- [] . -> ())
    fn parse_postfix(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek() {
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let operator = self.operator_node();
                    expr = self
                        .finish("update_expression", start)
                        .with_field("argument", expr)
                        .with_field("operator", operator);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect_token(&TokenKind::RBracket, "Expected ']' after array index")?;
                    expr = self
                        .finish("subscript_expression", start)
                        .with_field("argument", expr)
                        .with_field("index", index);
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    let operator = self.operator_node();
                    let field = self.expect_identifier("field_identifier")?;
                    expr = self
                        .finish("field_expression", start)
                        .with_field("argument", expr)
                        .with_field("operator", operator)
                        .with_field("field", field);
                }
                TokenKind::LParen => {
                    let loc = self.current_location();
                    if expr.kind() != "identifier" && expr.kind() != "qualified_identifier" {
                        return Err(ParseError {
                            message: "Function call must be on identifier".to_string(),
                            location: loc,
                        });
                    }

                    let args_start = self.position;
                    self.advance();
                    let args = self.parse_argument_list()?;
                    self.expect_token(&TokenKind::RParen, "Expected ')' after function arguments")?;
                    let mut arguments = self.finish("argument_list", args_start);
                    for arg in args {
                        arguments.push(arg);
                    }
                    expr = self
                        .finish("call_expression", start)
                        .with_field("function", expr)
                        .with_field("arguments", arguments);
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_argument_list(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut args = Vec::new();

        if self.check(&TokenKind::RParen) {
            return Ok(args);
        }

        loop {
            args.push(self.parse_assignment()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        Ok(args)
    }

    /// Parse primary (literals, identifiers, parenthesized expressions)
    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        let start = self.position;
        let loc = self.current_location();

        match self.peek().clone() {
            TokenKind::IntLiteral(_) => {
                self.advance();
                Ok(self.finish("number_literal", start))
            }
            TokenKind::CharLiteral(_) => {
                self.advance();
                Ok(self.finish("char_literal", start))
            }
            TokenKind::StringLiteral(_) => {
                // Adjacent literals concatenate, text keeps every piece
                self.advance();
                while matches!(self.peek(), TokenKind::StringLiteral(_)) {
                    self.advance();
                }
                Ok(self.finish("string_literal", start))
            }
            TokenKind::Null => {
                self.advance();
                Ok(self.finish("null", start))
            }
            TokenKind::True => {
                self.advance();
                Ok(self.finish("true", start))
            }
            TokenKind::False => {
                self.advance();
                Ok(self.finish("false", start))
            }
            TokenKind::Ident(_) => {
                self.advance();
                if self.check(&TokenKind::ColonColon) {
                    while self.match_token(&TokenKind::ColonColon) {
                        self.expect_identifier("identifier")?;
                    }
                    return Ok(self.finish("qualified_identifier", start));
                }
                Ok(self.finish("identifier", start))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect_token(&TokenKind::RParen, "Expected ')' after expression")?;
                Ok(self
                    .finish("parenthesized_expression", start)
                    .with_child(inner))
            }
            _ => Err(ParseError {
                message: format!("Unexpected token: {}", self.peek()),
                location: loc,
            }),
        }
    }

    // ===== Helper methods =====

    /// Declarations start with a type keyword or a known struct name that is
    /// followed by a declarator.
    fn is_declaration_start(&self) -> bool {
        if self.peek().is_type_keyword() {
            return true;
        }
        match self.peek() {
            TokenKind::Ident(name) if self.type_names.contains(name) => {
                matches!(self.peek_at(1), TokenKind::Ident(_) | TokenKind::Star)
            }
            _ => false,
        }
    }

    fn is_type_start_at(&self, offset: usize) -> bool {
        match self.peek_at(offset) {
            TokenKind::Ident(name) => self.type_names.contains(name),
            kind => kind.is_type_keyword(),
        }
    }

    /// `(` type `*`... `)` followed by something castable
    fn is_cast_start(&self) -> bool {
        if !self.is_type_start_at(1) {
            return false;
        }
        let mut offset = 2;
        while self.peek_at(offset).is_type_keyword() || self.peek_at(offset) == &TokenKind::Star {
            offset += 1;
        }
        self.peek_at(offset) == &TokenKind::RParen
    }

    /// Consume the current token as an `operator` node
    fn operator_node(&mut self) -> Node {
        let start = self.position;
        self.advance();
        self.finish("operator", start)
    }

    fn expect_identifier(&mut self, kind: &'static str) -> Result<Node, ParseError> {
        if matches!(self.peek(), TokenKind::Ident(_)) {
            let start = self.position;
            self.advance();
            Ok(self.finish(kind, start))
        } else {
            Err(ParseError {
                message: format!("Expected identifier, found {}", self.peek()),
                location: self.current_location(),
            })
        }
    }

    /// Node of `kind` covering tokens from `start` to the last consumed token
    fn finish(&self, kind: &'static str, start: usize) -> Node {
        Node::new(kind, self.text_from(start), self.span_from(start))
    }

    fn text_from(&self, start: usize) -> String {
        if self.position == start {
            return String::new();
        }
        let first = &self.tokens[start];
        let last = &self.tokens[self.position - 1];
        self.source[first.start..last.end].to_string()
    }

    fn span_from(&self, start: usize) -> Span {
        let start_line = self.tokens[start].location.line;
        let end_line = if self.position > start {
            self.tokens[self.position - 1].location.line
        } else {
            start_line
        };
        Span {
            start_line,
            end_line,
        }
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.position].kind
    }

    fn peek_at(&self, n: usize) -> &TokenKind {
        let index = (self.position + n).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn current_location(&self) -> SourceLocation {
        self.tokens[self.position].location
    }

    fn expect_token(&mut self, kind: &TokenKind, message: &str) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError {
                message: format!("{}, found {}", message, self.peek()),
                location: self.current_location(),
            })
        }
    }
}

/// Parse source text into a syntax tree
pub fn parse(source: &str) -> Result<Node, ParseError> {
    Parser::new(source)?.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::node::{NodeKind, SyntaxNode};

    fn first_statement(body: &str) -> Node {
        let source = format!("int main() {{ {} }}", body);
        let unit = parse(&source).unwrap();
        let main = unit.child_at(0).unwrap().clone();
        main.child_by_field("body").unwrap().child_at(0).unwrap().clone()
    }

    #[test]
    fn test_parse_simple_function() {
        let unit = parse("int main() { return 0; }").unwrap();

        assert_eq!(unit.node_kind(), NodeKind::TranslationUnit);
        let main = unit.child_at(0).unwrap();
        assert_eq!(main.node_kind(), NodeKind::FunctionDefinition);
        let declarator = main.child_by_field("declarator").unwrap();
        assert_eq!(declarator.child_by_field("declarator").unwrap().text(), "main");
        let body = main.child_by_field("body").unwrap();
        assert_eq!(body.named_child_count(), 1);
        assert_eq!(body.child_at(0).unwrap().node_kind(), NodeKind::ReturnStatement);
    }

    #[test]
    fn test_precedence() {
        let stmt = first_statement("x = 1 + 2 * 3;");
        let assign = stmt.child_at(0).unwrap();
        let right = assign.child_by_field("right").unwrap();
        assert_eq!(right.child_by_field("operator").unwrap().text(), "+");
        assert_eq!(right.child_by_field("right").unwrap().text(), "2 * 3");
    }

    #[test]
    fn test_pointer_declaration_with_new() {
        let stmt = first_statement("int* ptr = new int(42);");
        assert_eq!(stmt.node_kind(), NodeKind::Declaration);
        assert_eq!(stmt.child_by_field("type").unwrap().text(), "int");

        let init = stmt.child_at(1).unwrap();
        assert_eq!(init.node_kind(), NodeKind::InitDeclarator);
        assert_eq!(init.text(), "* ptr = new int(42)");
        let declarator = init.child_by_field("declarator").unwrap();
        assert_eq!(declarator.node_kind(), NodeKind::PointerDeclarator);
        let value = init.child_by_field("value").unwrap();
        assert_eq!(value.node_kind(), NodeKind::NewExpression);
        assert_eq!(value.text(), "new int(42)");
        assert_eq!(
            value.child_by_field("arguments").unwrap().child_at(0).unwrap().text(),
            "42"
        );
    }

    #[test]
    fn test_array_declaration_with_initializer() {
        let stmt = first_statement("int arr[3] = {1, 2, 3};");
        let init = stmt.child_at(1).unwrap();
        let declarator = init.child_by_field("declarator").unwrap();
        assert_eq!(declarator.node_kind(), NodeKind::ArrayDeclarator);
        assert_eq!(declarator.child_by_field("size").unwrap().text(), "3");
        let value = init.child_by_field("value").unwrap();
        assert_eq!(value.node_kind(), NodeKind::InitializerList);
        assert_eq!(value.named_child_count(), 3);
    }

    #[test]
    fn test_if_else_and_switch_shapes() {
        let stmt = first_statement("if (x > 0) { y = 1; } else y = 2;");
        assert_eq!(stmt.child_by_field("condition").unwrap().text(), "x > 0");
        assert_eq!(
            stmt.child_by_field("alternative").unwrap().node_kind(),
            NodeKind::ExpressionStatement
        );

        let switch = first_statement("switch (x) { case 1: y = 1; break; default: y = 0; }");
        let body = switch.child_by_field("body").unwrap();
        assert_eq!(body.named_child_count(), 2);
        let case = body.child_at(0).unwrap();
        assert_eq!(case.child_by_field("value").unwrap().text(), "1");
        assert_eq!(case.named_child_count(), 3);
        assert!(body.child_at(1).unwrap().child_by_field("value").is_none());
    }

    #[test]
    fn test_struct_names_become_types() {
        let source = "struct Node { int val; Node* next; };\nint main() { Node* n = new Node; n->val = 3; }";
        let unit = parse(source).unwrap();
        let strukt = unit.child_at(0).unwrap();
        assert_eq!(strukt.node_kind(), NodeKind::StructSpecifier);
        assert_eq!(strukt.child_by_field("name").unwrap().text(), "Node");

        let main = unit.child_at(1).unwrap();
        let body = main.child_by_field("body").unwrap();
        let decl = body.child_at(0).unwrap();
        assert_eq!(decl.node_kind(), NodeKind::Declaration);
        let store = body.child_at(1).unwrap().child_at(0).unwrap();
        assert_eq!(store.node_kind(), NodeKind::AssignmentExpression);
        assert_eq!(
            store.child_by_field("left").unwrap().node_kind(),
            NodeKind::FieldExpression
        );
    }

    #[test]
    fn test_spans_track_lines() {
        let unit = parse("int main() {\n  int x = 1;\n  return x;\n}").unwrap();
        let main = unit.child_at(0).unwrap();
        assert_eq!(main.span().start_line, 1);
        assert_eq!(main.span().end_line, 4);
        let ret = main.child_by_field("body").unwrap().child_at(1).unwrap();
        assert_eq!(ret.span().start_line, 3);
    }

    #[test]
    fn test_parse_error_reports_location() {
        let err = parse("int main() { int x = ; }").unwrap_err();
        assert_eq!(err.location.line, 1);
        assert!(err.message.contains("Unexpected token"));
    }
}
