//! Terminal user interface built on [ratatui](https://github.com/ratatui-org/ratatui).
//!
//! - **[`app`]**: application state, keyboard handling, pane focus and timed
//!   playback
//! - **[`panes`]**: stateless render functions for each pane (source, stack,
//!   heap, terminal, status bar)
//! - **[`theme`]**: the color palette
//!
//! Construct an [`App`] from an [`Executor`] driving a
//! [`VisualState`](crate::snapshot::VisualState) and call [`App::run`].
//!
//! [`Executor`]: crate::executor::Executor
//! [`App::run`]: app::App::run

pub mod app;
pub mod panes;
pub mod theme;

pub use app::App;
