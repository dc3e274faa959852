//! # Introduction
//!
//! tracetty turns a C program into a linear trace of memory effects and
//! replays that trace step by step, forward and backward, in a terminal UI
//! built with [ratatui](https://docs.rs/ratatui).
//!
//! ## Pipeline
//!
//! ```text
//! Source → Parser → Syntax tree → Unroller → Trace → Executor → Effect sink → TUI
//! ```
//!
//! 1. [`parser`] tokenises the source and builds a generic syntax tree behind
//!    the [`parser::SyntaxNode`] trait.
//! 2. [`unroller`] walks the tree once, inlining calls and unrolling loops up
//!    to configurable ceilings, and emits a [`trace::Trace`] of
//!    [`trace::ExecutionStep`]s. Conditional steps carry branch tags.
//! 3. [`executor`] replays the trace against live [`memory::Memory`]. It
//!    decides branches from runtime values, suppresses steps on untaken
//!    paths, and reports each change to an [`executor::EffectSink`].
//! 4. [`memory`] holds the symbolic value model shared by both phases:
//!    [`memory::value::SymbolicValue`], scopes, heap cells and mock
//!    addresses.
//! 5. [`snapshot`] provides [`snapshot::VisualState`], the sink the UI
//!    renders, and its [`snapshot::MockTerminal`] for program output.
//! 6. [`ui`] is the ratatui front end; not part of the stable library API.
//!
//! ## Supported C subset
//!
//! Types: `int`, `char`, `bool`, `short`, `long`, `void`, structs, pointers,
//! fixed-size arrays.
//! Control flow: `if/else`, `while`, `for`, `do-while`, `switch/case`,
//! `break`, `continue`, `return`.
//! Built-ins: `printf`, `puts`, `putchar`, `cout <<`, `malloc`, `calloc`,
//! `realloc`, `free`, `new`, `delete`, `sizeof`.

pub mod constants;
pub mod executor;
pub mod memory;
pub mod parser;
pub mod snapshot;
pub mod trace;
pub mod ui;
pub mod unroller;
