//! Source code pane rendering with syntax highlighting
//!
//! Shows the traced program with the line of the most recently applied step
//! highlighted. Highlighting uses a small character tokenizer rather than
//! the real lexer so that unparsable fragments still render.

use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// Syntax highlighting for one line of C/C++
fn highlight_source_code(line: &str) -> Line<'static> {
    let mut spans = Vec::new();
    let mut current_word = String::new();

    // Simple tokenizer
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        // Handle comments
        if c == '/' && i + 1 < chars.len() && chars[i + 1] == '/' {
            if !current_word.is_empty() {
                spans.push(Span::raw(current_word.clone()));
                current_word.clear();
            }
            spans.push(Span::styled(
                chars[i..].iter().collect::<String>(),
                Style::default().fg(DEFAULT_THEME.comment),
            ));
            break;
        }

        // Handle strings
        if c == '"' {
            if !current_word.is_empty() {
                spans.push(Span::raw(current_word.clone()));
                current_word.clear();
            }
            let mut end = i + 1;
            while end < chars.len() && chars[end] != '"' {
                if chars[end] == '\\' {
                    end += 2;
                } else {
                    end += 1;
                }
            }
            end = (end + 1).min(chars.len());
            spans.push(Span::styled(
                chars[i..end].iter().collect::<String>(),
                Style::default().fg(DEFAULT_THEME.string), // Strings
            ));
            i = end;
            continue;
        }

        // Handle non-alphanumeric (delimiters)
        if !c.is_alphanumeric() && c != '_' {
            if !current_word.is_empty() {
                let is_func = c == '(';
                let style = get_keyword_style(&current_word, is_func);
                spans.push(Span::styled(current_word.clone(), style));
                current_word.clear();
            }

            // Color some operators/delimiters
            let style = match c {
                '{' | '}' | '(' | ')' | '[' | ']' => Style::default().fg(DEFAULT_THEME.primary), // Brackets
                ';' => Style::default().fg(DEFAULT_THEME.fg), // Semicolons
                ',' => Style::default().fg(DEFAULT_THEME.fg),
                '.' => Style::default().fg(DEFAULT_THEME.fg),
                '+' | '-' | '*' | '/' | '=' | '&' | '|' | '!' | '<' | '>' => {
                    Style::default().fg(DEFAULT_THEME.fg)
                } // Operators
                _ => Style::default(),
            };

            spans.push(Span::styled(c.to_string(), style));
            i += 1;
            continue;
        }

        current_word.push(c);
        i += 1;
    }

    if !current_word.is_empty() {
        let style = get_keyword_style(&current_word, false);
        spans.push(Span::styled(current_word, style));
    }

    Line::from(spans)
}

fn get_keyword_style(word: &str, is_function: bool) -> Style {
    match word {
        "int" | "char" | "void" | "bool" | "float" | "double" | "long" | "short" | "unsigned"
        | "signed" | "size_t" | "auto" => {
            Style::default().fg(DEFAULT_THEME.type_name) // Types
        }
        "struct" | "return" | "if" | "else" | "while" | "for" | "do" | "switch" | "case"
        | "default" | "break" | "continue" | "sizeof" | "new" | "delete" | "using"
        | "namespace" | "const" | "typedef" => {
            Style::default()
                .fg(DEFAULT_THEME.keyword)
                .add_modifier(Modifier::BOLD) // Keywords
        }
        "NULL" | "nullptr" | "true" | "false" => Style::default().fg(DEFAULT_THEME.number),
        _ => {
            if is_function {
                Style::default().fg(DEFAULT_THEME.function)
            } else {
                Style::default().fg(DEFAULT_THEME.fg) // Variables/Identifiers
            }
        }
    }
}

/// Scroll state for the source pane
pub struct SourceScrollState {
    pub offset: usize,
    /// Row the current line is pinned to; set on first render
    pub target_line_row: Option<usize>,
}

impl SourceScrollState {
    pub fn new() -> Self {
        SourceScrollState {
            offset: 0,
            target_line_row: None,
        }
    }
}

impl Default for SourceScrollState {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the source code pane. `current_line` is `None` before the first
/// step.
pub fn render_source_pane(
    frame: &mut Frame,
    area: Rect,
    source_code: &str,
    current_line: Option<usize>,
    is_focused: bool,
    scroll_state: &mut SourceScrollState,
) {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };

    let block = Block::default()
        .title(" Source Code ")
        .borders(Borders::ALL)
        .border_style(border_style);

    let lines: Vec<&str> = source_code.lines().collect();
    let total_lines = lines.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize;

    let target_row = scroll_state
        .target_line_row
        .unwrap_or(visible_height / 2)
        .min(visible_height.saturating_sub(1));
    scroll_state.target_line_row = Some(target_row);

    // keep the current line at the pinned row
    if let Some(line) = current_line.filter(|line| (1..=total_lines).contains(line)) {
        scroll_state.offset = (line - 1).saturating_sub(target_row);
        let max_scroll = total_lines.saturating_sub(visible_height);
        scroll_state.offset = scroll_state.offset.min(max_scroll);
    }

    let visible_lines: Vec<Line> = lines
        .iter()
        .enumerate()
        .skip(scroll_state.offset)
        .take(visible_height)
        .map(|(idx, line)| {
            let line_num = idx + 1;
            let is_current = Some(line_num) == current_line;

            let (marker, num_style) = if is_current {
                (
                    "▶",
                    Style::default()
                        .fg(DEFAULT_THEME.secondary)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                (" ", Style::default().fg(DEFAULT_THEME.comment))
            };

            let mut content_line = highlight_source_code(line);
            if is_current {
                let current = Style::default().bg(DEFAULT_THEME.current_line_bg);
                for span in &mut content_line.spans {
                    span.style = span.style.patch(current);
                }
            }

            let mut spans = vec![Span::styled(format!("{}{:4} ", marker, line_num), num_style)];
            spans.extend(content_line.spans);
            Line::from(spans)
        })
        .collect();

    let paragraph = Paragraph::new(visible_lines).block(block);
    frame.render_widget(paragraph, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    #[test]
    fn test_highlight_keeps_text() {
        let source = "    int x = f(2); // note";
        assert_eq!(text(&highlight_source_code(source)), source);
    }

    #[test]
    fn test_keyword_styles() {
        assert_eq!(
            get_keyword_style("int", false),
            Style::default().fg(DEFAULT_THEME.type_name)
        );
        assert_eq!(
            get_keyword_style("square", true),
            Style::default().fg(DEFAULT_THEME.function)
        );
    }
}
