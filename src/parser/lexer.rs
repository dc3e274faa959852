//! Lexer (tokenizer) for C source code
//!
//! Converts raw source text into a flat [`Token`] stream consumed by the parser.
//! `#include` and other preprocessor directives are silently skipped rather than
//! parsed, matching the no-preprocessor policy. Every token records its byte
//! range so syntax nodes can hand back their exact source text.

use super::node::SourceLocation;
use std::fmt;
use thiserror::Error;

/// All token kinds produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    IntLiteral(i64),
    CharLiteral(i64),
    StringLiteral(String),

    Ident(String),

    // Type keywords
    Int,
    Char,
    Void,
    Bool,
    Long,
    Short,
    Unsigned,
    Struct,
    Const,

    // Statement keywords
    If,
    Else,
    While,
    Do,
    For,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Sizeof,
    New,
    Delete,
    Using,
    Namespace,

    // Constants
    Null,
    True,
    False,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Comparison
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    AndAnd,
    OrOr,
    Bang,

    // Bitwise
    Amp,
    Pipe,
    Caret,
    Tilde,
    LtLt,
    GtGt,

    // Assignment
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,

    PlusPlus,
    MinusMinus,

    Dot,
    Arrow,
    ColonColon,

    Question,
    Colon,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,

    Eof,
}

impl TokenKind {
    /// Whether this token starts a type specifier.
    pub fn is_type_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Int
                | TokenKind::Char
                | TokenKind::Void
                | TokenKind::Bool
                | TokenKind::Long
                | TokenKind::Short
                | TokenKind::Unsigned
                | TokenKind::Struct
                | TokenKind::Const
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::IntLiteral(n) => write!(f, "int literal {}", n),
            TokenKind::CharLiteral(c) => write!(f, "char literal {}", c),
            TokenKind::StringLiteral(s) => write!(f, "string literal \"{}\"", s),
            TokenKind::Ident(s) => write!(f, "identifier '{}'", s),
            TokenKind::Eof => write!(f, "end of file"),
            other => write!(f, "'{}'", other.symbol()),
        }
    }
}

impl TokenKind {
    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Int => "int",
            TokenKind::Char => "char",
            TokenKind::Void => "void",
            TokenKind::Bool => "bool",
            TokenKind::Long => "long",
            TokenKind::Short => "short",
            TokenKind::Unsigned => "unsigned",
            TokenKind::Struct => "struct",
            TokenKind::Const => "const",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Do => "do",
            TokenKind::For => "for",
            TokenKind::Switch => "switch",
            TokenKind::Case => "case",
            TokenKind::Default => "default",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Return => "return",
            TokenKind::Sizeof => "sizeof",
            TokenKind::New => "new",
            TokenKind::Delete => "delete",
            TokenKind::Using => "using",
            TokenKind::Namespace => "namespace",
            TokenKind::Null => "NULL",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Bang => "!",
            TokenKind::Amp => "&",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            TokenKind::LtLt => "<<",
            TokenKind::GtGt => ">>",
            TokenKind::Eq => "=",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::PercentEq => "%=",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::Dot => ".",
            TokenKind::Arrow => "->",
            TokenKind::ColonColon => "::",
            TokenKind::Question => "?",
            TokenKind::Colon => ":",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::IntLiteral(_)
            | TokenKind::CharLiteral(_)
            | TokenKind::StringLiteral(_)
            | TokenKind::Ident(_)
            | TokenKind::Eof => "",
        }
    }
}

/// A token with its position and byte range in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
    pub start: usize,
    pub end: usize,
}

/// Lexer error type
#[derive(Debug, Clone, Error)]
#[error("Lexer error at line {}, column {}: {message}", .location.line, .location.column)]
pub struct LexError {
    pub message: String,
    pub location: SourceLocation,
}

/// Lexer for C source code
pub struct Lexer<'src> {
    source: &'src str,
    input: Vec<(usize, char)>,
    position: usize,
    line: usize,
    column: usize,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source string.
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            input: source.char_indices().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments()?;

            if self.is_at_end() {
                let offset = self.source.len();
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    location: self.current_location(),
                    start: offset,
                    end: offset,
                });
                break;
            }

            if self.peek() == Some('#') {
                self.skip_line();
                continue;
            }

            let location = self.current_location();
            let start = self.byte_offset();
            let kind = self.next_token(location)?;
            tokens.push(Token {
                kind,
                location,
                start,
                end: self.byte_offset(),
            });
        }

        Ok(tokens)
    }

    fn next_token(&mut self, loc: SourceLocation) -> Result<TokenKind, LexError> {
        let ch = self.advance().ok_or_else(|| LexError {
            message: "Unexpected end of file".to_string(),
            location: loc,
        })?;

        let kind = match ch {
            '"' => self.string_literal(loc)?,
            '\'' => self.char_literal(loc)?,
            '0'..='9' => self.number_literal(ch, loc)?,
            'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(ch),

            '+' => self.one_of(&[('+', TokenKind::PlusPlus), ('=', TokenKind::PlusEq)], TokenKind::Plus),
            '-' => self.one_of(
                &[
                    ('-', TokenKind::MinusMinus),
                    ('=', TokenKind::MinusEq),
                    ('>', TokenKind::Arrow),
                ],
                TokenKind::Minus,
            ),
            '*' => self.one_of(&[('=', TokenKind::StarEq)], TokenKind::Star),
            '/' => self.one_of(&[('=', TokenKind::SlashEq)], TokenKind::Slash),
            '%' => self.one_of(&[('=', TokenKind::PercentEq)], TokenKind::Percent),
            '=' => self.one_of(&[('=', TokenKind::EqEq)], TokenKind::Eq),
            '!' => self.one_of(&[('=', TokenKind::NotEq)], TokenKind::Bang),
            '<' => self.one_of(&[('=', TokenKind::Le), ('<', TokenKind::LtLt)], TokenKind::Lt),
            '>' => self.one_of(&[('=', TokenKind::Ge), ('>', TokenKind::GtGt)], TokenKind::Gt),
            '&' => self.one_of(&[('&', TokenKind::AndAnd)], TokenKind::Amp),
            '|' => self.one_of(&[('|', TokenKind::OrOr)], TokenKind::Pipe),
            ':' => self.one_of(&[(':', TokenKind::ColonColon)], TokenKind::Colon),
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '.' => TokenKind::Dot,
            '?' => TokenKind::Question,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,

            _ => {
                return Err(LexError {
                    message: format!("Unexpected character: '{}'", ch),
                    location: loc,
                });
            }
        };

        Ok(kind)
    }

    /// Consume one follow-up character if it completes a longer operator.
    fn one_of(&mut self, options: &[(char, TokenKind)], fallback: TokenKind) -> TokenKind {
        if let Some(next) = self.peek() {
            if let Some((_, kind)) = options.iter().find(|(c, _)| *c == next) {
                self.advance();
                return kind.clone();
            }
        }
        fallback
    }

    fn escape(&mut self, loc: SourceLocation) -> Result<char, LexError> {
        let escaped = self.advance().ok_or_else(|| LexError {
            message: "Unexpected end of file in escape sequence".to_string(),
            location: loc,
        })?;

        match escaped {
            'n' => Ok('\n'),
            't' => Ok('\t'),
            'r' => Ok('\r'),
            '\\' => Ok('\\'),
            '"' => Ok('"'),
            '\'' => Ok('\''),
            '0' => Ok('\0'),
            _ => Err(LexError {
                message: format!("Unknown escape sequence: \\{}", escaped),
                location: self.current_location(),
            }),
        }
    }

    fn string_literal(&mut self, loc: SourceLocation) -> Result<TokenKind, LexError> {
        let mut string = String::new();

        while let Some(ch) = self.peek() {
            if ch == '"' {
                self.advance();
                return Ok(TokenKind::StringLiteral(string));
            }

            if ch == '\n' {
                break;
            }

            self.advance();
            if ch == '\\' {
                string.push(self.escape(loc)?);
            } else {
                string.push(ch);
            }
        }

        Err(LexError {
            message: "Unterminated string literal".to_string(),
            location: loc,
        })
    }

    fn char_literal(&mut self, loc: SourceLocation) -> Result<TokenKind, LexError> {
        let ch = self.advance().ok_or_else(|| LexError {
            message: "Unexpected end of file in character literal".to_string(),
            location: loc,
        })?;

        let value = if ch == '\\' { self.escape(loc)? } else { ch };

        if self.advance() != Some('\'') {
            return Err(LexError {
                message: "Expected closing quote in character literal".to_string(),
                location: self.current_location(),
            });
        }

        Ok(TokenKind::CharLiteral(value as i64))
    }

    /// Integers only; `0x` prefixes and `L`/`U` suffixes are accepted.
    fn number_literal(&mut self, first_digit: char, loc: SourceLocation) -> Result<TokenKind, LexError> {
        let mut num_str = String::new();
        num_str.push(first_digit);

        let hex = first_digit == '0' && matches!(self.peek(), Some('x') | Some('X'));
        if hex {
            self.advance();
            num_str.clear();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_hexdigit() && (hex || ch.is_ascii_digit()) {
                num_str.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        while matches!(self.peek(), Some('l') | Some('L') | Some('u') | Some('U')) {
            self.advance();
        }

        let radix = if hex { 16 } else { 10 };
        let value = i64::from_str_radix(&num_str, radix).map_err(|_| LexError {
            message: format!("Invalid integer literal: {}", num_str),
            location: loc,
        })?;

        Ok(TokenKind::IntLiteral(value))
    }

    fn identifier_or_keyword(&mut self, first_char: char) -> TokenKind {
        let mut ident = String::new();
        ident.push(first_char);

        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "int" => TokenKind::Int,
            "char" => TokenKind::Char,
            "void" => TokenKind::Void,
            "bool" => TokenKind::Bool,
            "long" => TokenKind::Long,
            "short" => TokenKind::Short,
            "unsigned" => TokenKind::Unsigned,
            "struct" => TokenKind::Struct,
            "const" => TokenKind::Const,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "for" => TokenKind::For,
            "switch" => TokenKind::Switch,
            "case" => TokenKind::Case,
            "default" => TokenKind::Default,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "return" => TokenKind::Return,
            "sizeof" => TokenKind::Sizeof,
            "new" => TokenKind::New,
            "delete" => TokenKind::Delete,
            "using" => TokenKind::Using,
            "namespace" => TokenKind::Namespace,
            "NULL" | "nullptr" => TokenKind::Null,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Ident(ident),
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') | Some('\n') => {
                    self.advance();
                }
                Some('/') if self.peek_ahead(1) == Some('/') => self.skip_line(),
                Some('/') if self.peek_ahead(1) == Some('*') => self.skip_block_comment()?,
                _ => break,
            }
        }
        Ok(())
    }

    /// Skip to the end of the line (line comments and preprocessor directives)
    fn skip_line(&mut self) {
        while let Some(ch) = self.advance() {
            if ch == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let start_loc = self.current_location();
        self.advance();
        self.advance();

        while !self.is_at_end() {
            if self.peek() == Some('*') && self.peek_ahead(1) == Some('/') {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }

        Err(LexError {
            message: "Unterminated block comment".to_string(),
            location: start_loc,
        })
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).map(|(_, c)| *c)
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.input.get(self.position + n).map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        let (_, ch) = *self.input.get(self.position)?;
        self.position += 1;

        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        Some(ch)
    }

    fn byte_offset(&self) -> usize {
        self.input
            .get(self.position)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.source.len())
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }
}
