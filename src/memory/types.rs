//! Declared types and record layouts
//!
//! Types are only used for display, sizing and default values. Nothing is
//! type checked.

use super::value::SymbolicValue;
use crate::constants::{ARRAY_ELEMENT_SIZE, MAX_MATERIALIZED_ELEMENTS, POINTER_SIZE};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;

/// A declared C type: base name, pointer depth, array dimensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CType {
    pub base: String,
    pub pointer_depth: usize,
    /// Outermost dimension first
    pub dims: Vec<usize>,
}

impl CType {
    pub fn scalar(base: impl Into<String>) -> Self {
        CType {
            base: base.into(),
            pointer_depth: 0,
            dims: Vec::new(),
        }
    }

    pub fn pointer_to(base: impl Into<String>, depth: usize) -> Self {
        CType {
            base: base.into(),
            pointer_depth: depth,
            dims: Vec::new(),
        }
    }

    /// Parse type text such as `int*`, `struct Node *`, `const char*`
    pub fn parse(text: &str) -> Self {
        let pointer_depth = text.chars().filter(|c| *c == '*').count();
        let base = text
            .replace('*', " ")
            .split_whitespace()
            .filter(|word| *word != "struct" && *word != "const")
            .collect::<Vec<_>>()
            .join(" ");
        CType {
            base,
            pointer_depth,
            dims: Vec::new(),
        }
    }

    pub fn is_pointer(&self) -> bool {
        self.dims.is_empty() && self.pointer_depth > 0
    }

    pub fn is_array(&self) -> bool {
        !self.dims.is_empty()
    }

    /// Type of one element of an array, or the pointee of a pointer
    pub fn element(&self) -> CType {
        if let Some((_, rest)) = self.dims.split_first() {
            return CType {
                base: self.base.clone(),
                pointer_depth: self.pointer_depth,
                dims: rest.to_vec(),
            };
        }
        CType {
            base: self.base.clone(),
            pointer_depth: self.pointer_depth.saturating_sub(1),
            dims: Vec::new(),
        }
    }

    /// Array parameters are pointers
    pub fn decayed(&self) -> CType {
        match self.dims.split_first() {
            Some((_, rest)) if rest.is_empty() => {
                CType::pointer_to(self.base.clone(), self.pointer_depth + 1)
            }
            _ => self.clone(),
        }
    }

    /// Size in bytes; arrays use the fixed element size
    pub fn size(&self, records: &RecordTable) -> usize {
        if !self.dims.is_empty() {
            return self
                .dims
                .iter()
                .fold(1usize, |total, dim| total.saturating_mul(*dim))
                .saturating_mul(ARRAY_ELEMENT_SIZE);
        }
        if self.pointer_depth > 0 {
            return POINTER_SIZE;
        }
        base_size(&self.base, records)
    }

    /// Number of scalar slots an array of this type holds, if it fits
    pub fn element_count(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |total, dim| total.checked_mul(*dim))
    }

    /// Shrink the dimensions so at most `MAX_MATERIALIZED_ELEMENTS` slots are
    /// materialized. Returns true when a dimension was cut.
    pub fn clamp_dims(&mut self) -> bool {
        let mut budget = MAX_MATERIALIZED_ELEMENTS;
        let mut truncated = false;
        for dim in self.dims.iter_mut() {
            let allowed = budget.max(1);
            if *dim > allowed {
                *dim = allowed;
                truncated = true;
            }
            budget /= (*dim).max(1);
        }
        truncated
    }

    /// Value of a declaration without an initializer
    pub fn default_value(&self, records: &RecordTable) -> SymbolicValue {
        if self
            .element_count()
            .map_or(true, |count| count > MAX_MATERIALIZED_ELEMENTS)
        {
            return SymbolicValue::unknown();
        }
        if let Some((len, _)) = self.dims.split_first() {
            let element = self.element();
            return SymbolicValue::Array {
                elements: (0..*len).map(|_| element.zero_value(records)).collect(),
            };
        }
        if self.pointer_depth > 0 {
            return SymbolicValue::Uninitialized;
        }
        match records.get(&self.base) {
            Some(layout) => layout.default_value(records, false),
            None => SymbolicValue::Uninitialized,
        }
    }

    /// Value used to fill array slots and `calloc` memory
    pub fn zero_value(&self, records: &RecordTable) -> SymbolicValue {
        if !self.dims.is_empty() {
            return self.default_value(records);
        }
        if self.pointer_depth > 0 {
            return SymbolicValue::Null;
        }
        match records.get(&self.base) {
            Some(layout) => layout.default_value(records, true),
            None => SymbolicValue::number(0),
        }
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for _ in 0..self.pointer_depth {
            write!(f, "*")?;
        }
        for dim in &self.dims {
            write!(f, "[{}]", dim)?;
        }
        Ok(())
    }
}

/// Byte size of a non-pointer, non-array type
pub fn base_size(base: &str, records: &RecordTable) -> usize {
    if let Some(layout) = records.get(base) {
        return layout
            .fields
            .iter()
            .map(|field| field.declared_type.size(records))
            .sum();
    }
    let words: Vec<&str> = base.split_whitespace().collect();
    if words.contains(&"char") || words.contains(&"bool") || words.contains(&"void") {
        1
    } else if words.contains(&"short") {
        2
    } else if words.contains(&"long") {
        8
    } else {
        4
    }
}

/// A struct field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldLayout {
    pub name: String,
    pub declared_type: CType,
}

/// A struct definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordLayout {
    pub name: String,
    pub fields: Vec<FieldLayout>,
}

impl RecordLayout {
    fn default_value(&self, records: &RecordTable, zeroed: bool) -> SymbolicValue {
        SymbolicValue::Record {
            fields: self
                .fields
                .iter()
                .map(|field| {
                    let value = if zeroed {
                        field.declared_type.zero_value(records)
                    } else {
                        field.declared_type.default_value(records)
                    };
                    (field.name.clone(), value)
                })
                .collect(),
        }
    }
}

/// Struct name -> layout
pub type RecordTable = FxHashMap<String, RecordLayout>;
