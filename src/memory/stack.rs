//! Scope stack
//!
//! - [`Scope`]: one function activation's bindings, in declaration order
//! - [`ScopeStack`]: the activations, innermost last
//!
//! # Visibility
//!
//! A name resolves in the innermost scope, then in the bottom
//! [`GLOBAL_FRAME`] scope if one exists. Callers' scopes are never visible to
//! a callee by name; they are only reachable through pointers, which record
//! the [`ScopeId`] of their referent.

use super::types::CType;
use super::value::{ScopeId, SymbolicValue};
use crate::constants::GLOBAL_FRAME;
use rustc_hash::FxHashMap;

/// A variable binding
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub value: SymbolicValue,
    pub declared_type: CType,
    pub address: u64,
}

/// One activation's bindings
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub id: ScopeId,
    pub function_name: String,
    bindings: FxHashMap<String, Binding>,
    insertion_order: Vec<String>,
}

impl Scope {
    pub fn new(id: ScopeId, function_name: String) -> Self {
        Scope {
            id,
            function_name,
            bindings: FxHashMap::default(),
            insertion_order: Vec::new(),
        }
    }

    /// Bind or rebind `name`
    pub fn bind(&mut self, name: String, binding: Binding) {
        if !self.bindings.contains_key(&name) {
            self.insertion_order.push(name.clone());
        }
        self.bindings.insert(name, binding);
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Binding> {
        self.bindings.get_mut(name)
    }

    /// Bindings in declaration order
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.insertion_order
            .iter()
            .filter_map(|name| self.bindings.get(name).map(|b| (name.as_str(), b)))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn is_global(&self) -> bool {
        self.function_name == GLOBAL_FRAME
    }
}

/// The activation stack
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScopeStack {
    frames: Vec<Scope>,
    next_id: ScopeId,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new scope and return its id
    pub fn push_frame(&mut self, function_name: impl Into<String>) -> ScopeId {
        let id = self.next_id;
        self.next_id += 1;
        self.frames.push(Scope::new(id, function_name.into()));
        id
    }

    pub fn pop_frame(&mut self) -> Option<Scope> {
        self.frames.pop()
    }

    pub fn current_frame(&self) -> Option<&Scope> {
        self.frames.last()
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut Scope> {
        self.frames.last_mut()
    }

    /// All frames, outermost first
    pub fn frames(&self) -> &[Scope] {
        &self.frames
    }

    pub fn frame_mut(&mut self, index: usize) -> Option<&mut Scope> {
        self.frames.get_mut(index)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index of the frame `name` resolves to from the innermost scope
    pub fn visible_index(&self, name: &str) -> Option<usize> {
        let top = self.frames.len().checked_sub(1)?;
        if self.frames[top].get(name).is_some() {
            return Some(top);
        }
        match self.frames.first() {
            Some(global) if top > 0 && global.is_global() && global.get(name).is_some() => Some(0),
            _ => None,
        }
    }

    pub fn visible(&self, name: &str) -> Option<&Binding> {
        self.visible_index(name)
            .and_then(|index| self.frames[index].get(name))
    }

    /// Frame index of a pointer's referent.
    ///
    /// A pinned scope must still be live. Unpinned references fall back from
    /// normal visibility to the nearest enclosing frame that binds `name`.
    pub fn referent_index(&self, name: &str, scope: Option<ScopeId>) -> Option<usize> {
        match scope {
            Some(id) => self
                .frames
                .iter()
                .position(|frame| frame.id == id)
                .filter(|index| self.frames[*index].get(name).is_some()),
            None => self.visible_index(name).or_else(|| {
                self.frames
                    .iter()
                    .rposition(|frame| frame.get(name).is_some())
            }),
        }
    }

    pub fn binding_at(&self, index: usize, name: &str) -> Option<&Binding> {
        self.frames.get(index).and_then(|frame| frame.get(name))
    }

    pub fn binding_at_mut(&mut self, index: usize, name: &str) -> Option<&mut Binding> {
        self.frames.get_mut(index).and_then(|frame| frame.get_mut(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_binding(value: i64, address: u64) -> Binding {
        Binding {
            value: SymbolicValue::number(value),
            declared_type: CType::scalar("int"),
            address,
        }
    }

    #[test]
    fn test_callee_cannot_see_caller() {
        let mut stack = ScopeStack::new();
        stack.push_frame("main");
        stack
            .current_frame_mut()
            .unwrap()
            .bind("x".to_string(), int_binding(1, 4));
        stack.push_frame("helper");

        assert!(stack.visible("x").is_none());
        // Pointers may still reach it
        assert_eq!(stack.referent_index("x", None), Some(0));
        assert_eq!(stack.referent_index("x", Some(0)), Some(0));
        assert_eq!(stack.referent_index("x", Some(1)), None);
    }

    #[test]
    fn test_globals_visible_everywhere() {
        let mut stack = ScopeStack::new();
        stack.push_frame(GLOBAL_FRAME);
        stack
            .current_frame_mut()
            .unwrap()
            .bind("g".to_string(), int_binding(7, 4));
        stack.push_frame("main");
        stack.push_frame("helper");

        assert_eq!(stack.visible("g").map(|b| b.address), Some(4));
    }

    #[test]
    fn test_rebinding_keeps_order() {
        let mut scope = Scope::new(0, "main".to_string());
        scope.bind("a".to_string(), int_binding(1, 4));
        scope.bind("b".to_string(), int_binding(2, 8));
        scope.bind("a".to_string(), int_binding(3, 4));

        let names: Vec<&str> = scope.bindings().map(|(name, _)| name).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(scope.get("a").unwrap().value, SymbolicValue::number(3));
    }

    #[test]
    fn test_scope_ids_are_not_reused() {
        let mut stack = ScopeStack::new();
        let first = stack.push_frame("main");
        stack.pop_frame();
        let second = stack.push_frame("main");
        assert_ne!(first, second);
    }
}
