//! Main TUI application state and logic

use super::panes::{
    render_heap_pane, render_source_pane, render_stack_pane, render_status_bar,
    render_terminal_pane, HeapScrollState, SourceScrollState, StackScrollState, StatusRenderData,
};
use crate::executor::{Executor, Playback, PlaybackState, RunStatus};
use crate::snapshot::VisualState;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    Frame, Terminal,
};
use std::io;
use std::time::{Duration, Instant};
use tracing::info;

/// Which pane is currently focused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Source,
    Stack,
    Heap,
    Terminal,
}

impl FocusedPane {
    /// Clockwise: source -> terminal -> stack -> heap
    pub fn next(self) -> Self {
        match self {
            FocusedPane::Source => FocusedPane::Terminal,
            FocusedPane::Terminal => FocusedPane::Stack,
            FocusedPane::Stack => FocusedPane::Heap,
            FocusedPane::Heap => FocusedPane::Source,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            FocusedPane::Source => FocusedPane::Heap,
            FocusedPane::Terminal => FocusedPane::Source,
            FocusedPane::Stack => FocusedPane::Terminal,
            FocusedPane::Heap => FocusedPane::Stack,
        }
    }
}

/// The main application state
pub struct App {
    pub executor: Executor<VisualState>,
    pub playback: Playback,
    pub source_code: String,
    pub focused_pane: FocusedPane,

    pub source_scroll: SourceScrollState,
    pub stack_scroll: StackScrollState,
    pub heap_scroll: HeapScrollState,
    /// `usize::MAX` follows the newest output
    pub terminal_scroll: usize,

    pub should_quit: bool,
    pub status_message: String,
}

impl App {
    pub fn new(executor: Executor<VisualState>, source_code: String, delay: Duration) -> Self {
        App {
            executor,
            playback: Playback::new(delay),
            source_code,
            focused_pane: FocusedPane::Source,
            source_scroll: SourceScrollState::new(),
            stack_scroll: StackScrollState::default(),
            heap_scroll: HeapScrollState::default(),
            terminal_scroll: usize::MAX,
            should_quit: false,
            status_message: String::from("Ready!"),
        }
    }

    /// Run the event loop until the user quits
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }

            self.tick(Instant::now());

            // short poll so playback keeps moving between key presses
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code, Instant::now());
                    }
                }
            }
        }

        Ok(())
    }

    /// Advance playback if it is due
    pub fn tick(&mut self, now: Instant) {
        if self.playback.tick(now, &mut self.executor) {
            self.status_message = "Playing...".to_string();
            self.terminal_scroll = usize::MAX;
        } else if self.playback.state() == PlaybackState::Finished
            && self.executor.status() == RunStatus::Finished
            && self.status_message == "Playing..."
        {
            info!("playback complete");
            self.status_message = "Playback complete".to_string();
        }
    }

    fn render(&mut self, frame: &mut Frame) {
        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(frame.area());

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(main_chunks[0]);

        // left: source over terminal, right: stack over heap
        let left_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
            .split(columns[0]);
        let right_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(columns[1]);

        let state = self.executor.sink();
        let records = self.executor.trace().records();

        render_source_pane(
            frame,
            left_rows[0],
            &self.source_code,
            self.executor.current_line(),
            self.focused_pane == FocusedPane::Source,
            &mut self.source_scroll,
        );
        render_terminal_pane(
            frame,
            left_rows[1],
            state.terminal(),
            self.focused_pane == FocusedPane::Terminal,
            &mut self.terminal_scroll,
        );
        render_stack_pane(
            frame,
            right_rows[0],
            state.frames(),
            records,
            self.focused_pane == FocusedPane::Stack,
            &mut self.stack_scroll,
        );
        render_heap_pane(
            frame,
            right_rows[1],
            state.heap(),
            records,
            self.focused_pane == FocusedPane::Heap,
            &mut self.heap_scroll,
        );
        render_status_bar(
            frame,
            main_chunks[1],
            StatusRenderData {
                message: &self.status_message,
                applied: self.executor.applied().len(),
                position: self.executor.position(),
                total_steps: self.executor.len(),
                status: state.status(),
            },
        );
    }

    /// Handle one key press
    pub fn handle_key(&mut self, code: KeyCode, now: Instant) {
        match code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.should_quit = true;
            }
            KeyCode::Char(c @ '1'..='9') => {
                self.stop_playback();
                let n = c.to_digit(10).unwrap_or(1);
                let mut stepped = 0;
                for _ in 0..n {
                    if !self.executor.step_forward() {
                        break;
                    }
                    stepped += 1;
                }
                self.after_manual_step();
                self.status_message = format!("Stepped forward {} step(s)", stepped);
            }
            KeyCode::Tab => {
                self.focused_pane = self.focused_pane.next();
            }
            KeyCode::BackTab => {
                self.focused_pane = self.focused_pane.prev();
            }
            KeyCode::Right => {
                self.stop_playback();
                self.status_message = if self.executor.step_forward() {
                    "Stepped forward".to_string()
                } else {
                    "Already at the end".to_string()
                };
                self.after_manual_step();
            }
            KeyCode::Left => {
                self.stop_playback();
                self.status_message = if self.executor.step_backward() {
                    "Stepped backward".to_string()
                } else {
                    "Already at the start".to_string()
                };
                self.after_manual_step();
            }
            KeyCode::Up => self.scroll(-1),
            KeyCode::Down => self.scroll(1),
            KeyCode::Char(' ') => {
                self.playback.rearm();
                self.playback.toggle(now, &mut self.executor);
                self.status_message = match self.playback.state() {
                    PlaybackState::Playing => "Playing...",
                    PlaybackState::Finished => "Nothing left to play",
                    _ => "Paused",
                }
                .to_string();
            }
            KeyCode::Char('c') | KeyCode::Char('C') => {
                if self.playback.is_playing() {
                    self.playback.cancel(&mut self.executor);
                    self.status_message = "Playback cancelled".to_string();
                }
            }
            KeyCode::Enter => {
                self.stop_playback();
                self.executor.run_to_completion();
                self.terminal_scroll = usize::MAX;
                self.status_message = "Jumped to end".to_string();
            }
            KeyCode::Backspace => {
                self.stop_playback();
                self.executor.seek(0);
                self.playback.rearm();
                self.terminal_scroll = usize::MAX;
                self.status_message = "Jumped to start".to_string();
            }
            _ => {}
        }
    }

    /// Manual stepping pauses any running playback
    fn stop_playback(&mut self) {
        self.playback.pause(&mut self.executor);
    }

    fn after_manual_step(&mut self) {
        self.playback.rearm();
        if !self.executor.is_finished() {
            self.executor.set_status(RunStatus::Stepping);
        }
        self.terminal_scroll = usize::MAX;
    }

    fn scroll(&mut self, delta: isize) {
        let apply = |value: usize| value.saturating_add_signed(delta);
        match self.focused_pane {
            FocusedPane::Source => {
                // scrolling down moves the current line up
                if let Some(row) = self.source_scroll.target_line_row {
                    self.source_scroll.target_line_row = Some(row.saturating_add_signed(-delta));
                }
            }
            FocusedPane::Stack => self.stack_scroll.offset = apply(self.stack_scroll.offset),
            FocusedPane::Heap => self.heap_scroll.offset = apply(self.heap_scroll.offset),
            FocusedPane::Terminal => self.terminal_scroll = apply(self.terminal_scroll),
        }
    }
}
