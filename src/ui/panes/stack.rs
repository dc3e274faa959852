//! Stack pane rendering with call frames and their variables
//!
//! Frames are listed outermost first. Each frame shows a header with its
//! function name followed by its variables in declaration order: address,
//! name, value and the declared type aligned to the right edge. Arrays and
//! structs expand into one row per element or field.

use super::utils::{
    aligned_line, format_type_annotation, format_value_styled, render_array_elements,
    render_record_fields,
};
use crate::constants::GLOBAL_FRAME;
use crate::memory::types::RecordTable;
use crate::memory::value::SymbolicValue;
use crate::snapshot::VisualFrame;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};

/// Scroll state for the stack pane
#[derive(Debug, Default)]
pub struct StackScrollState {
    pub offset: usize,
    pub prev_item_count: usize,
}

/// Render the stack pane
pub fn render_stack_pane(
    frame: &mut Frame,
    area: Rect,
    frames: &[VisualFrame],
    records: &RecordTable,
    is_focused: bool,
    scroll_state: &mut StackScrollState,
) {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };

    let block = Block::default()
        .title(" Call Stack ")
        .borders(Borders::ALL)
        .border_style(border_style);

    let content_width = area.width.saturating_sub(2) as usize;
    let all_items = stack_items(frames, records, content_width);

    let total_items = all_items.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize;

    // follow new variables unless the user scrolled away
    if total_items > scroll_state.prev_item_count && total_items > visible_height {
        scroll_state.offset = total_items - visible_height;
    }
    scroll_state.prev_item_count = total_items;
    scroll_state.offset = scroll_state
        .offset
        .min(total_items.saturating_sub(visible_height));

    let visible_items: Vec<ListItem> = all_items
        .into_iter()
        .skip(scroll_state.offset)
        .take(visible_height)
        .collect();

    frame.render_widget(List::new(visible_items).block(block), area);
}

fn stack_items(
    frames: &[VisualFrame],
    records: &RecordTable,
    content_width: usize,
) -> Vec<ListItem<'static>> {
    let mut all_items = Vec::new();
    if frames.is_empty() {
        all_items.push(ListItem::new("(empty)").style(Style::default().fg(DEFAULT_THEME.comment)));
        return all_items;
    }

    for (depth, stack_frame) in frames.iter().enumerate() {
        let name_style = if stack_frame.function_name == GLOBAL_FRAME {
            Style::default().fg(DEFAULT_THEME.muted_function)
        } else {
            Style::default()
                .fg(DEFAULT_THEME.function)
                .add_modifier(Modifier::BOLD)
        };
        let title = if stack_frame.function_name == GLOBAL_FRAME {
            stack_frame.function_name.clone()
        } else {
            format!("{}()", stack_frame.function_name)
        };
        all_items.push(ListItem::new(Line::from(vec![
            Span::styled("▸ ", Style::default().fg(DEFAULT_THEME.secondary)),
            Span::styled(
                format!("Frame {} ", depth),
                Style::default().fg(DEFAULT_THEME.comment),
            ),
            Span::styled("│ ", Style::default().fg(DEFAULT_THEME.comment)),
            Span::styled(title, name_style),
        ])));

        if stack_frame.variables.is_empty() {
            all_items.push(
                ListItem::new("  (no locals)").style(Style::default().fg(DEFAULT_THEME.comment)),
            );
        }

        for variable in &stack_frame.variables {
            let mut spans = vec![
                Span::styled(
                    format!("{:#010x} ", variable.address),
                    Style::default().fg(DEFAULT_THEME.comment),
                ),
                Span::styled(
                    variable.name.clone(),
                    Style::default().fg(DEFAULT_THEME.fg),
                ),
                Span::styled(": ", Style::default().fg(DEFAULT_THEME.fg)),
            ];
            let type_str = format_type_annotation(&variable.declared_type, records);

            match &variable.value {
                SymbolicValue::Array { elements } if variable.declared_type.is_array() => {
                    all_items.push(ListItem::new(aligned_line(spans, type_str, content_width)));
                    render_array_elements(
                        &mut all_items,
                        elements,
                        &variable.declared_type,
                        variable.address,
                        1,
                        records,
                        content_width,
                    );
                }
                SymbolicValue::Record { fields } => {
                    all_items.push(ListItem::new(aligned_line(spans, type_str, content_width)));
                    render_record_fields(
                        &mut all_items,
                        fields,
                        &variable.declared_type,
                        variable.address,
                        1,
                        records,
                        content_width,
                    );
                }
                value => {
                    spans.extend(format_value_styled(value, &variable.declared_type, 0));
                    all_items.push(ListItem::new(aligned_line(spans, type_str, content_width)));
                }
            }
        }
    }
    all_items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::CType;
    use crate::snapshot::VisualVariable;

    #[test]
    fn test_items_per_frame_and_variable() {
        let frames = vec![VisualFrame {
            function_name: "main".to_string(),
            variables: vec![
                VisualVariable {
                    name: "x".to_string(),
                    value: SymbolicValue::number(1),
                    declared_type: CType::scalar("int"),
                    address: 4,
                },
                VisualVariable {
                    name: "arr".to_string(),
                    value: SymbolicValue::Array {
                        elements: vec![SymbolicValue::number(1), SymbolicValue::number(2)],
                    },
                    declared_type: CType {
                        base: "int".to_string(),
                        pointer_depth: 0,
                        dims: vec![2],
                    },
                    address: 8,
                },
            ],
        }];
        let items = stack_items(&frames, &RecordTable::default(), 40);
        // header, x, arr header, two elements
        assert_eq!(items.len(), 5);
    }

    #[test]
    fn test_empty_stack() {
        assert_eq!(stack_items(&[], &RecordTable::default(), 40).len(), 1);
    }
}
