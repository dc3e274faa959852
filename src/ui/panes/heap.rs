//! Heap pane rendering
//!
//! Lists heap cells in allocation order. Scalars take one row; arrays and
//! structs expand into one row per element or field with computed addresses.

use super::utils::{format_value_styled, render_array_elements, render_record_fields};
use crate::memory::types::{CType, RecordTable};
use crate::memory::value::SymbolicValue;
use crate::snapshot::VisualHeapCell;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};

/// Scroll state for the heap pane
#[derive(Debug, Default)]
pub struct HeapScrollState {
    pub offset: usize,
    pub prev_item_count: usize,
}

/// Render the heap pane
pub fn render_heap_pane(
    frame: &mut Frame,
    area: Rect,
    cells: &[VisualHeapCell],
    records: &RecordTable,
    is_focused: bool,
    scroll_state: &mut HeapScrollState,
) {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };

    let block = Block::default()
        .title(format!(" Heap ({} cells) ", cells.len()))
        .borders(Borders::ALL)
        .border_style(border_style);

    let content_width = area.width.saturating_sub(2) as usize;
    let all_items = heap_items(cells, records, content_width);

    let total_items = all_items.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize;
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

fn heap_items(
    cells: &[VisualHeapCell],
    records: &RecordTable,
    content_width: usize,
) -> Vec<ListItem<'static>> {
    let mut all_items = Vec::new();
    if cells.is_empty() {
        all_items.push(
            ListItem::new("(no allocations)").style(Style::default().fg(DEFAULT_THEME.comment)),
        );
        return all_items;
    }

    // cells carry no declared type; elements are shown as plain ints
    let untyped = CType::scalar("int");
    for cell in cells {
        let header = vec![
            Span::styled(
                format!("{:#010x} ", cell.address),
                Style::default()
                    .fg(DEFAULT_THEME.secondary)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled("│ ", Style::default().fg(DEFAULT_THEME.comment)),
        ];
        match &cell.value {
            SymbolicValue::Array { elements } => {
                let mut spans = header;
                spans.push(Span::styled(
                    format!("[{}]", elements.len()),
                    Style::default().fg(DEFAULT_THEME.comment),
                ));
                all_items.push(ListItem::new(Line::from(spans)));
                let array_type = CType {
                    dims: vec![elements.len()],
                    ..untyped.clone()
                };
                render_array_elements(
                    &mut all_items,
                    elements,
                    &array_type,
                    cell.address,
                    1,
                    records,
                    content_width,
                );
            }
            SymbolicValue::Record { fields } => {
                all_items.push(ListItem::new(Line::from(header)));
                // the record's layout is looked up by its field names
                let layout_name = records
                    .values()
                    .find(|layout| {
                        layout.fields.len() == fields.len()
                            && layout
                                .fields
                                .iter()
                                .zip(fields)
                                .all(|(layout_field, (name, _))| layout_field.name == *name)
                    })
                    .map(|layout| layout.name.clone())
                    .unwrap_or_default();
                render_record_fields(
                    &mut all_items,
                    fields,
                    &CType::scalar(layout_name),
                    cell.address,
                    1,
                    records,
                    content_width,
                );
            }
            value => {
                let mut spans = header;
                spans.extend(format_value_styled(value, &untyped, 0));
                all_items.push(ListItem::new(Line::from(spans)));
            }
        }
    }
    all_items
}
