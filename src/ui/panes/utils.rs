//! Shared helpers for pane rendering
//!
//! - **Value formatting**: [`SymbolicValue`] to styled spans
//! - **Type annotations**: right-aligned declared types
//! - **Aggregates**: nested array elements and struct fields, one row each,
//!   with mock addresses computed from the fixed type sizes

use crate::constants::ARRAY_ELEMENT_SIZE;
use crate::memory::types::{CType, RecordTable};
use crate::memory::value::SymbolicValue;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::ListItem,
};

/// Width of a `0x........ ` address column
const ADDRESS_WIDTH: usize = 11;

/// Format a value with styled spans
pub(super) fn format_value_styled(
    value: &SymbolicValue,
    declared_type: &CType,
    depth: usize,
) -> Vec<Span<'static>> {
    match value {
        SymbolicValue::Number { value } if is_char(declared_type) => {
            let text = match u8::try_from(*value) {
                Ok(byte) if byte.is_ascii_graphic() || byte == b' ' => {
                    format!("'{}'", byte as char)
                }
                Ok(byte) => format!("'\\x{:02x}'", byte),
                Err(_) => value.to_string(),
            };
            vec![Span::styled(text, Style::default().fg(DEFAULT_THEME.string))]
        }
        SymbolicValue::Number { value } => vec![Span::styled(
            value.to_string(),
            Style::default().fg(DEFAULT_THEME.number),
        )],
        SymbolicValue::RawString { text } if is_char(declared_type) => vec![Span::styled(
            format!("\"{}\"", text.escape_default()),
            Style::default().fg(DEFAULT_THEME.string),
        )],
        SymbolicValue::RawString { text } => vec![Span::styled(
            text.clone(),
            Style::default()
                .fg(DEFAULT_THEME.comment)
                .add_modifier(Modifier::ITALIC),
        )],
        SymbolicValue::VariableRef { .. }
        | SymbolicValue::ArrayElementRef { .. }
        | SymbolicValue::HeapAddress { .. } => vec![Span::styled(
            value.to_string(),
            Style::default().fg(DEFAULT_THEME.secondary),
        )],
        SymbolicValue::PendingArithmetic { .. } => vec![Span::styled(
            value.to_string(),
            Style::default().fg(DEFAULT_THEME.comment),
        )],
        SymbolicValue::Null => vec![Span::styled(
            "NULL",
            Style::default().fg(DEFAULT_THEME.number),
        )],
        SymbolicValue::Uninitialized => vec![Span::styled(
            "[uninit]",
            Style::default()
                .fg(DEFAULT_THEME.error)
                .add_modifier(Modifier::DIM),
        )],
        SymbolicValue::Array { .. } | SymbolicValue::Record { .. } => {
            if depth > 1 {
                return vec![Span::styled(
                    "[...]",
                    Style::default().fg(DEFAULT_THEME.comment),
                )];
            }
            highlight_value_string(&value.to_string())
        }
    }
}

fn is_char(declared_type: &CType) -> bool {
    declared_type.base == "char" && declared_type.pointer_depth == 0
}

pub(super) fn format_type_annotation(declared_type: &CType, records: &RecordTable) -> String {
    if records.contains_key(&declared_type.base) {
        format!("struct {}", declared_type)
    } else {
        declared_type.to_string()
    }
}

/// `left` followed by the type pushed to the right edge
pub(super) fn aligned_line(
    mut spans: Vec<Span<'static>>,
    type_str: String,
    content_width: usize,
) -> Line<'static> {
    if !type_str.is_empty() {
        let used: usize = spans.iter().map(|span| span.content.chars().count()).sum();
        let padding = content_width.saturating_sub(used + type_str.chars().count());
        spans.push(Span::raw(" ".repeat(padding.max(1))));
        spans.push(Span::styled(
            type_str,
            Style::default().fg(DEFAULT_THEME.type_name),
        ));
    }
    Line::from(spans)
}

fn address_span(address: u64) -> Span<'static> {
    Span::styled(
        format!("{:#010x} ", address),
        Style::default().fg(DEFAULT_THEME.comment),
    )
}

/// Render array elements recursively, one row per element
pub(super) fn render_array_elements(
    all_items: &mut Vec<ListItem<'static>>,
    elements: &[SymbolicValue],
    array_type: &CType,
    base_address: u64,
    indent_level: usize,
    records: &RecordTable,
    content_width: usize,
) {
    let elem_type = array_type.element();
    let elem_size = if elem_type.dims.is_empty() {
        ARRAY_ELEMENT_SIZE
    } else {
        elem_type.size(records)
    } as u64;

    for (idx, elem_value) in elements.iter().enumerate() {
        let elem_address = base_address + idx as u64 * elem_size;
        let mut spans = vec![
            address_span(elem_address),
            Span::raw("  ".repeat(indent_level)),
            Span::styled(format!("[{}]: ", idx), Style::default().fg(DEFAULT_THEME.fg)),
        ];
        let type_str = format_type_annotation(&elem_type, records);

        match elem_value {
            SymbolicValue::Array { elements: nested } => {
                all_items.push(ListItem::new(aligned_line(spans, type_str, content_width)));
                render_array_elements(
                    all_items,
                    nested,
                    &elem_type,
                    elem_address,
                    indent_level + 1,
                    records,
                    content_width,
                );
            }
            SymbolicValue::Record { fields } => {
                all_items.push(ListItem::new(aligned_line(spans, type_str, content_width)));
                render_record_fields(
                    all_items,
                    fields,
                    &elem_type,
                    elem_address,
                    indent_level + 1,
                    records,
                    content_width,
                );
            }
            _ => {
                spans.extend(format_value_styled(elem_value, &elem_type, 1));
                all_items.push(ListItem::new(aligned_line(spans, type_str, content_width)));
            }
        }
    }
}

/// Render struct fields recursively, one row per field
pub(super) fn render_record_fields(
    all_items: &mut Vec<ListItem<'static>>,
    fields: &[(String, SymbolicValue)],
    record_type: &CType,
    base_address: u64,
    indent_level: usize,
    records: &RecordTable,
    content_width: usize,
) {
    let layout = records.get(&record_type.base);
    let mut offset = 0u64;

    for (name, field_value) in fields {
        let field_type = layout
            .and_then(|layout| layout.fields.iter().find(|field| field.name == *name))
            .map(|field| field.declared_type.clone())
            .unwrap_or_else(|| CType::scalar("?"));
        let field_address = base_address + offset;
        offset += field_type.size(records) as u64;

        let mut spans = vec![
            address_span(field_address),
            Span::raw("  ".repeat(indent_level)),
            Span::styled(format!(".{}: ", name), Style::default().fg(DEFAULT_THEME.fg)),
        ];
        let type_str = format_type_annotation(&field_type, records);

        match field_value {
            SymbolicValue::Array { elements } => {
                all_items.push(ListItem::new(aligned_line(spans, type_str, content_width)));
                render_array_elements(
                    all_items,
                    elements,
                    &field_type,
                    field_address,
                    indent_level + 1,
                    records,
                    content_width,
                );
            }
            SymbolicValue::Record { fields: nested } => {
                all_items.push(ListItem::new(aligned_line(spans, type_str, content_width)));
                render_record_fields(
                    all_items,
                    nested,
                    &field_type,
                    field_address,
                    indent_level + 1,
                    records,
                    content_width,
                );
            }
            _ => {
                spans.extend(format_value_styled(field_value, &field_type, 1));
                all_items.push(ListItem::new(aligned_line(spans, type_str, content_width)));
            }
        }
    }
}

/// Highlight a value string (simple lexer)
fn highlight_value_string(s: &str) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    let mut current_token = String::new();

    for c in s.chars() {
        if matches!(c, '[' | ']' | '{' | '}' | ',' | ':' | ' ') {
            if !current_token.is_empty() {
                spans.push(style_token(&current_token));
                current_token.clear();
            }
            spans.push(Span::styled(
                c.to_string(),
                Style::default().fg(DEFAULT_THEME.fg),
            ));
            continue;
        }
        current_token.push(c);
    }

    if !current_token.is_empty() {
        spans.push(style_token(&current_token));
    }

    spans
}

fn style_token(token: &str) -> Span<'static> {
    let color = if token == "NULL" {
        DEFAULT_THEME.number
    } else if token.starts_with("0x") || token.starts_with('&') {
        DEFAULT_THEME.secondary
    } else if token.chars().all(|c| c.is_ascii_digit() || c == '-') {
        DEFAULT_THEME.number
    } else {
        DEFAULT_THEME.fg
    };
    Span::styled(token.to_string(), Style::default().fg(color))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_array(len: usize) -> CType {
        CType {
            base: "int".to_string(),
            pointer_depth: 0,
            dims: vec![len],
        }
    }

    fn text(spans: &[Span]) -> String {
        spans.iter().map(|span| span.content.as_ref()).collect()
    }

    #[test]
    fn test_char_values_render_quoted() {
        let char_type = CType::scalar("char");
        assert_eq!(
            text(&format_value_styled(&SymbolicValue::number(65), &char_type, 0)),
            "'A'"
        );
        assert_eq!(
            text(&format_value_styled(&SymbolicValue::number(10), &char_type, 0)),
            "'\\x0a'"
        );
    }

    #[test]
    fn test_nested_aggregates_collapse() {
        let array = SymbolicValue::Array {
            elements: vec![SymbolicValue::number(1), SymbolicValue::number(2)],
        };
        let ty = int_array(2);
        assert_eq!(text(&format_value_styled(&array, &ty, 0)), "[1, 2]");
        assert_eq!(text(&format_value_styled(&array, &ty, 2)), "[...]");
    }

    #[test]
    fn test_array_rows_use_element_size() {
        let mut items = Vec::new();
        let elements = vec![SymbolicValue::number(7), SymbolicValue::number(8)];
        render_array_elements(
            &mut items,
            &elements,
            &int_array(2),
            0x10,
            0,
            &RecordTable::default(),
            40,
        );
        assert_eq!(items.len(), 2);
    }
}
