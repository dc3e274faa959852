//! C source code parser
//!
//! This module transforms C source text into a generic syntax tree:
//! - [`lexer`]: Tokenization (source text → tokens)
//! - [`parser`]: Parsing (tokens → [`node::Node`] trees)
//! - [`node`]: The [`node::SyntaxNode`] inspection interface and node kinds
//!
//! # Supported C Subset
//!
//! - Types: `int`, `char`, `bool`, `short`, `long`, `unsigned`, `void`,
//!   structs, pointers, arrays
//! - Statements: declarations, assignments, `if`, `while`, `do`, `for`,
//!   `switch`, `break`, `continue`, `return`
//! - Expressions: arithmetic, logical, bitwise, ternary, calls, `sizeof`,
//!   casts, `new`/`delete`, `std::cout` chains
//! - No preprocessor (directive lines are skipped)
//!
//! Nodes expose kind strings, source text and named fields in the same shape a
//! tree-sitter C/C++ grammar would, so the unroller can be driven by any
//! parser that implements [`node::SyntaxNode`].

pub mod lexer;
pub mod node;
pub mod parser;

pub use node::{Node, NodeKind, SourceLocation, Span, SyntaxNode};
pub use parser::{parse, ParseError};
