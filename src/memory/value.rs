//! Symbolic value representation
//!
//! This module defines [`SymbolicValue`], the value stored in every stack
//! binding and heap cell. Pointers are never byte addresses: they name the
//! location they refer to, so a store through a pointer can be resolved by
//! lookup instead of address arithmetic.
//!
//! # Value Forms
//!
//! - [`SymbolicValue::Number`]: integer scalar (chars and bools included)
//! - [`SymbolicValue::RawString`]: string literal, or the source text of an
//!   expression that could not be evaluated
//! - [`SymbolicValue::VariableRef`]: `&x`
//! - [`SymbolicValue::ArrayElementRef`]: `&arr[i]`, also what an array decays to
//! - [`SymbolicValue::HeapAddress`]: pointer to a heap cell
//! - [`SymbolicValue::PendingArithmetic`]: `base ± offset` whose base was not
//!   known yet; resolved against the current value of `base` when used
//! - [`SymbolicValue::Array`] / [`SymbolicValue::Record`]: aggregates

use serde::Serialize;
use std::fmt;

/// Heap cell identity; doubles as its mock address
pub type HeapToken = u64;

/// Identity of one activation on the scope stack
pub type ScopeId = usize;

/// Direction of a deferred pointer offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add,
    Sub,
}

impl ArithOp {
    pub fn apply(self, base: i64, offset: i64) -> i64 {
        match self {
            ArithOp::Add => base.wrapping_add(offset),
            ArithOp::Sub => base.wrapping_sub(offset),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
        }
    }
}

/// Values held by bindings and heap cells
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SymbolicValue {
    Number {
        value: i64,
    },
    RawString {
        text: String,
    },
    /// `scope` pins the referent to one activation once known at runtime
    VariableRef {
        name: String,
        scope: Option<ScopeId>,
    },
    ArrayElementRef {
        array: String,
        index: i64,
        scope: Option<ScopeId>,
    },
    HeapAddress {
        token: HeapToken,
    },
    PendingArithmetic {
        base: String,
        op: ArithOp,
        offset: i64,
    },
    Array {
        elements: Vec<SymbolicValue>,
    },
    Record {
        fields: Vec<(String, SymbolicValue)>,
    },
    Null,
    #[default]
    Uninitialized,
}

impl SymbolicValue {
    pub fn number(value: i64) -> Self {
        SymbolicValue::Number { value }
    }

    pub fn raw(text: impl Into<String>) -> Self {
        SymbolicValue::RawString { text: text.into() }
    }

    pub fn variable_ref(name: impl Into<String>) -> Self {
        SymbolicValue::VariableRef {
            name: name.into(),
            scope: None,
        }
    }

    pub fn element_ref(array: impl Into<String>, index: i64) -> Self {
        SymbolicValue::ArrayElementRef {
            array: array.into(),
            index,
            scope: None,
        }
    }

    pub fn heap(token: HeapToken) -> Self {
        SymbolicValue::HeapAddress { token }
    }

    /// Marker for a value analysis could not determine
    pub fn unknown() -> Self {
        SymbolicValue::raw("?")
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            SymbolicValue::Number { value } => Some(*value),
            _ => None,
        }
    }

    /// Truth value in a condition, `None` when undecidable
    pub fn truthiness(&self) -> Option<bool> {
        match self {
            SymbolicValue::Number { value } => Some(*value != 0),
            SymbolicValue::Null => Some(false),
            SymbolicValue::VariableRef { .. }
            | SymbolicValue::ArrayElementRef { .. }
            | SymbolicValue::HeapAddress { .. } => Some(true),
            _ => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(
            self,
            SymbolicValue::VariableRef { .. }
                | SymbolicValue::ArrayElementRef { .. }
                | SymbolicValue::HeapAddress { .. }
                | SymbolicValue::PendingArithmetic { .. }
                | SymbolicValue::Null
        )
    }

    /// Whether evaluation produced something better than source text
    pub fn is_resolved(&self) -> bool {
        !matches!(
            self,
            SymbolicValue::RawString { .. } | SymbolicValue::Uninitialized
        )
    }

    /// Copy with every activation pin removed, so the value can be resolved by
    /// name in any replay.
    pub fn detached(&self) -> SymbolicValue {
        match self {
            SymbolicValue::VariableRef { name, .. } => SymbolicValue::variable_ref(name.clone()),
            SymbolicValue::ArrayElementRef { array, index, .. } => {
                SymbolicValue::element_ref(array.clone(), *index)
            }
            SymbolicValue::Array { elements } => SymbolicValue::Array {
                elements: elements.iter().map(SymbolicValue::detached).collect(),
            },
            SymbolicValue::Record { fields } => SymbolicValue::Record {
                fields: fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.detached()))
                    .collect(),
            },
            other => other.clone(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&SymbolicValue> {
        match self {
            SymbolicValue::Record { fields } => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn element(&self, index: i64) -> Option<&SymbolicValue> {
        match self {
            SymbolicValue::Array { elements } => {
                usize::try_from(index).ok().and_then(|i| elements.get(i))
            }
            _ => None,
        }
    }

    /// Merge one field, turning a non-record into a record if needed
    pub fn set_field(&mut self, name: &str, value: SymbolicValue) {
        if !matches!(self, SymbolicValue::Record { .. }) {
            *self = SymbolicValue::Record { fields: Vec::new() };
        }
        if let SymbolicValue::Record { fields } = self {
            match fields.iter_mut().find(|(field, _)| field == name) {
                Some((_, slot)) => *slot = value,
                None => fields.push((name.to_string(), value)),
            }
        }
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut SymbolicValue> {
        match self {
            SymbolicValue::Record { fields } => fields
                .iter_mut()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, index: i64) -> Option<&mut SymbolicValue> {
        match self {
            SymbolicValue::Array { elements } => {
                usize::try_from(index).ok().and_then(move |i| elements.get_mut(i))
            }
            _ => None,
        }
    }

    /// Render for `%c` conversions
    pub fn as_char_text(&self) -> String {
        match self {
            SymbolicValue::Number { value } => u8::try_from(*value)
                .map(|b| (b as char).to_string())
                .unwrap_or_else(|_| value.to_string()),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for SymbolicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolicValue::Number { value } => write!(f, "{}", value),
            SymbolicValue::RawString { text } => write!(f, "{}", text),
            SymbolicValue::VariableRef { name, .. } => write!(f, "&{}", name),
            SymbolicValue::ArrayElementRef { array, index, .. } => {
                write!(f, "&{}[{}]", array, index)
            }
            SymbolicValue::HeapAddress { token } => write!(f, "{:#010x}", token),
            SymbolicValue::PendingArithmetic { base, op, offset } => {
                write!(f, "{} {} {}", base, op.symbol(), offset)
            }
            SymbolicValue::Array { elements } => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            SymbolicValue::Record { fields } => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, "}}")
            }
            SymbolicValue::Null => write!(f, "NULL"),
            SymbolicValue::Uninitialized => write!(f, "?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_forms() {
        assert_eq!(SymbolicValue::variable_ref("x").to_string(), "&x");
        assert_eq!(SymbolicValue::element_ref("arr", 1).to_string(), "&arr[1]");
        assert_eq!(SymbolicValue::heap(0x1000_0000).to_string(), "0x10000000");
        let array = SymbolicValue::Array {
            elements: vec![
                SymbolicValue::number(1),
                SymbolicValue::number(2),
                SymbolicValue::number(3),
            ],
        };
        assert_eq!(array.to_string(), "[1, 2, 3]");
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(SymbolicValue::number(0).truthiness(), Some(false));
        assert_eq!(SymbolicValue::Null.truthiness(), Some(false));
        assert_eq!(SymbolicValue::heap(0x1000_0000).truthiness(), Some(true));
        assert_eq!(SymbolicValue::unknown().truthiness(), None);
    }

    #[test]
    fn test_set_field_merges() {
        let mut record = SymbolicValue::Record {
            fields: vec![("x".to_string(), SymbolicValue::number(1))],
        };
        record.set_field("y", SymbolicValue::number(2));
        record.set_field("x", SymbolicValue::number(5));
        assert_eq!(record.to_string(), "{x: 5, y: 2}");
    }

    #[test]
    fn test_detached_drops_scope_pins() {
        let pinned = SymbolicValue::VariableRef {
            name: "x".to_string(),
            scope: Some(3),
        };
        assert_eq!(pinned.detached(), SymbolicValue::variable_ref("x"));
    }
}
