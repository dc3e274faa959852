//! Status bar rendering with keybindings and run state

use crate::executor::RunStatus;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

/// What the status bar shows
pub struct StatusRenderData<'a> {
    pub message: &'a str,
    /// Steps applied so far
    pub applied: usize,
    /// Trace index of the next step
    pub position: usize,
    pub total_steps: usize,
    pub status: RunStatus,
}

/// Render the status bar at the bottom
pub fn render_status_bar(frame: &mut Frame, area: Rect, data: StatusRenderData) {
    let layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let bar_style = Style::default().bg(DEFAULT_THEME.current_line_bg);
    let left_spans = vec![
        Span::styled(
            format!(" Step {}/{} ", data.position, data.total_steps),
            Style::default()
                .bg(DEFAULT_THEME.primary)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" {} applied ", data.applied),
            bar_style.fg(DEFAULT_THEME.comment),
        ),
        Span::styled(" | ", bar_style.fg(DEFAULT_THEME.comment)),
        Span::styled(format!(" {} ", data.message), bar_style.fg(DEFAULT_THEME.fg)),
    ];
    frame.render_widget(
        Paragraph::new(Line::from(left_spans))
            .style(bar_style)
            .alignment(Alignment::Left),
        layout[0],
    );

    let key_style = Style::default().bg(DEFAULT_THEME.comment).fg(Color::Black);
    let desc_style = bar_style.fg(DEFAULT_THEME.fg);
    let sep_style = bar_style.fg(DEFAULT_THEME.comment);

    let mut right_spans = Vec::new();
    for (i, (key, desc)) in [
        ("←/→", "step"),
        ("⎵", "play"),
        ("c", "cancel"),
        ("↵ / ⌫", "end/start"),
        ("q", "quit"),
    ]
    .into_iter()
    .enumerate()
    {
        if i > 0 {
            right_spans.push(Span::styled("│", sep_style));
            right_spans.push(Span::styled(" ", desc_style));
        }
        right_spans.push(Span::styled(format!(" {} ", key), key_style));
        right_spans.push(Span::styled(format!(" {} ", desc), desc_style));
    }

    let badge = match data.status {
        RunStatus::Playing => Some((" ▶ PLAYING ", DEFAULT_THEME.secondary)),
        RunStatus::Paused => Some((" ⏸ PAUSED ", DEFAULT_THEME.primary)),
        RunStatus::Cancelled => Some((" ■ CANCELLED ", DEFAULT_THEME.error)),
        RunStatus::Finished => Some((" END ", DEFAULT_THEME.error)),
        RunStatus::Idle => Some((" START ", DEFAULT_THEME.success)),
        RunStatus::Stepping => None,
    };
    if let Some((text, color)) = badge {
        right_spans.push(Span::styled("│", sep_style));
        right_spans.push(Span::styled(
            text,
            Style::default()
                .bg(color)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        ));
    }

    frame.render_widget(
        Paragraph::new(Line::from(right_spans))
            .style(bar_style)
            .alignment(Alignment::Right),
        layout[1],
    );
}
