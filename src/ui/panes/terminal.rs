//! Program output pane

use crate::snapshot::MockTerminal;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Padding, Paragraph},
    Frame,
};
use std::ops::Range;

/// Lines of `total` shown in a pane `height` rows tall. `offset` is clamped
/// in place; `usize::MAX` follows the newest output.
fn output_window(total: usize, height: usize, offset: &mut usize) -> Range<usize> {
    let height = height.max(1);
    *offset = (*offset).min(total.saturating_sub(height));
    *offset..total.min(*offset + height)
}

fn pane_title(terminal: &MockTerminal, lines: usize) -> String {
    let open = if terminal.has_open_line() { ", open" } else { "" };
    match lines {
        0 => " Terminal Output ".to_string(),
        1 => format!(" Terminal Output (1 line{}) ", open),
        n => format!(" Terminal Output ({} lines{}) ", n, open),
    }
}

/// Render what the program has printed so far. An unterminated last line
/// gets a cursor mark.
pub fn render_terminal_pane(
    frame: &mut Frame,
    area: Rect,
    terminal: &MockTerminal,
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let lines = terminal.get_output();
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };
    let block = Block::default()
        .title(pane_title(terminal, lines.len()))
        .borders(Borders::ALL)
        .border_style(border_style)
        .padding(Padding::new(1, 0, 0, 0));

    if lines.is_empty() {
        *scroll_offset = 0;
        let placeholder = Paragraph::new("(no output)")
            .block(block)
            .style(Style::default().fg(DEFAULT_THEME.comment));
        frame.render_widget(placeholder, area);
        return;
    }

    let window = output_window(
        lines.len(),
        area.height.saturating_sub(2) as usize,
        scroll_offset,
    );
    let last = lines.len() - 1;
    let open = terminal.has_open_line();
    let text: Vec<Line> = lines[window.clone()]
        .iter()
        .zip(window)
        .map(|(line, index)| {
            let mut spans = vec![Span::styled(
                line.clone(),
                Style::default().fg(DEFAULT_THEME.fg),
            )];
            if open && index == last {
                spans.push(Span::styled("▏", Style::default().fg(DEFAULT_THEME.primary)));
            }
            Line::from(spans)
        })
        .collect();
    frame.render_widget(Paragraph::new(text).block(block), area);
}
