//! Symbolic memory model
//!
//! This module provides the memory abstractions used both speculatively by
//! the unroller and authoritatively by the executor:
//! - [`value`]: [`SymbolicValue`], the tagged value stored everywhere
//! - [`types`]: declared types, struct layouts and sizes
//! - [`stack`]: per-activation scopes
//! - [`heap`]: heap cells keyed by token
//! - [`address`]: deterministic mock address generation
//!
//! [`Memory`] ties a scope stack and a heap together and knows how to
//! evaluate structural expressions and resolve assignable places.
//!
//! # Type Sizes
//!
//! Sizes are fixed and platform independent: `char`/`bool` 1, `short` 2,
//! `int` 4, `long` 8, pointers 8, structs the sum of their fields (no
//! padding), arrays `len * 4`.

pub mod address;
mod eval;
pub mod heap;
mod place;
pub mod stack;
pub mod types;
pub mod value;

pub use place::{PathSegment, Place, PlaceRoot};

use crate::trace::StepIndex;
use heap::Heap;
use rustc_hash::FxHashMap;
use stack::{Binding, ScopeStack};
use types::CType;
use value::{ScopeId, SymbolicValue};

/// Scope stack, heap and captured call results
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Memory {
    pub stack: ScopeStack,
    pub heap: Heap,
    call_results: FxHashMap<StepIndex, SymbolicValue>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` in the innermost scope; returns the frame index
    pub fn declare(
        &mut self,
        name: &str,
        value: SymbolicValue,
        declared_type: CType,
        address: u64,
    ) -> Option<usize> {
        let index = self.stack.depth().checked_sub(1)?;
        let frame = self.stack.current_frame_mut()?;
        frame.bind(
            name.to_string(),
            Binding {
                value,
                declared_type,
                address,
            },
        );
        Some(index)
    }

    /// Value of a visible variable
    pub fn variable(&self, name: &str) -> Option<&SymbolicValue> {
        self.stack.visible(name).map(|binding| &binding.value)
    }

    /// Value of the variable a pointer names
    pub fn referent(&self, name: &str, scope: Option<ScopeId>) -> Option<&SymbolicValue> {
        let index = self.stack.referent_index(name, scope)?;
        self.stack.binding_at(index, name).map(|binding| &binding.value)
    }

    pub fn record_call_result(&mut self, call_id: StepIndex, value: SymbolicValue) {
        self.call_results.insert(call_id, value);
    }

    pub fn call_result(&self, call_id: StepIndex) -> Option<&SymbolicValue> {
        self.call_results.get(&call_id)
    }

    /// Merge another speculative state into this one; any binding or heap
    /// cell the two disagree on becomes unknown.
    pub fn join(&mut self, other: &Memory) {
        let depth = self.stack.depth().min(other.stack.depth());
        for index in 0..depth {
            let theirs = &other.stack.frames()[index];
            let names: Vec<String> = self.stack.frames()[index]
                .bindings()
                .map(|(name, _)| name.to_string())
                .collect();
            for name in names {
                let differs = match theirs.get(&name) {
                    Some(other_binding) => self
                        .stack
                        .binding_at(index, &name)
                        .is_some_and(|mine| mine.value != other_binding.value),
                    None => false,
                };
                if differs {
                    if let Some(binding) = self.stack.binding_at_mut(index, &name) {
                        binding.value = SymbolicValue::unknown();
                    }
                }
            }
            if let Some(frame) = self.stack.frame_mut(index) {
                for (name, binding) in theirs.bindings() {
                    if frame.get(name).is_none() {
                        frame.bind(name.to_string(), binding.clone());
                    }
                }
            }
        }

        for cell in other.heap.cells() {
            match self.heap.get_mut(cell.address) {
                Some(mine) if mine.value != cell.value => mine.value = SymbolicValue::unknown(),
                Some(_) => {}
                None => self.heap.insert(cell.clone()),
            }
        }

        for (call_id, value) in &other.call_results {
            self.call_results
                .entry(*call_id)
                .or_insert_with(|| value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::heap::HeapCell;

    #[test]
    fn test_join_marks_disagreement_unknown() {
        let mut then_state = Memory::new();
        then_state.stack.push_frame("main");
        then_state.declare("x", SymbolicValue::number(1), CType::scalar("int"), 0);
        then_state.declare("y", SymbolicValue::number(5), CType::scalar("int"), 0);

        let mut else_state = then_state.clone();
        else_state.declare("x", SymbolicValue::number(2), CType::scalar("int"), 0);
        else_state.heap.insert(HeapCell {
            address: 0x1000_0000,
            declared_type: CType::scalar("int"),
            value: SymbolicValue::number(9),
        });

        then_state.join(&else_state);
        assert_eq!(then_state.variable("x"), Some(&SymbolicValue::unknown()));
        assert_eq!(then_state.variable("y"), Some(&SymbolicValue::number(5)));
        assert_eq!(then_state.heap.len(), 1);
    }
}
