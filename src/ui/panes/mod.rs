//! TUI pane rendering modules
//!
//! - [`source`]: source code with the current line highlighted
//! - [`stack`]: call frames and their variables
//! - [`heap`]: heap cells
//! - [`terminal`]: program output
//! - [`status`]: status bar with keybindings and run state
//! - `utils`: value formatting and aggregate rendering shared by the panes
//!
//! Each pane exports a `render_*` function plus any scroll state it keeps
//! between frames. All of them read from [`VisualState`](crate::snapshot::VisualState)
//! and never from the executor's memory.

mod utils;

pub mod heap;
pub mod source;
pub mod stack;
pub mod status;
pub mod terminal;

pub use heap::{render_heap_pane, HeapScrollState};
pub use source::{render_source_pane, SourceScrollState};
pub use stack::{render_stack_pane, StackScrollState};
pub use status::{render_status_bar, StatusRenderData};
pub use terminal::render_terminal_pane;
