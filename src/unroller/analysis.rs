//! Speculative memory used while unrolling
//!
//! Analysis tracks what the program would probably hold at each point so
//! loop conditions can be predicted and steps can carry fallback values.
//! Branches that cannot be predicted are explored from a snapshot and their
//! results joined; disagreeing values degrade to unknown.
//!
//! A state can be marked unreachable: the path it describes cannot run given
//! what analysis knows. Steps are still emitted along such a path, but its
//! values never leak into a join.

use crate::memory::types::CType;
use crate::memory::value::{HeapToken, SymbolicValue};
use crate::memory::heap::HeapCell;
use crate::memory::Memory;
use crate::trace::{Expr, StepIndex};
use tracing::trace;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisState {
    memory: Memory,
    /// Join of every reachable `return` seen in the current activation
    return_value: Option<SymbolicValue>,
    /// Set once analysis proves this path cannot run
    unreachable: bool,
}

impl AnalysisState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn push_frame(&mut self, function: &str) {
        self.memory.stack.push_frame(function);
    }

    pub fn pop_frame(&mut self) {
        self.memory.stack.pop_frame();
    }

    pub fn declare(&mut self, name: &str, value: SymbolicValue, declared_type: CType) {
        self.memory.declare(name, value, declared_type, 0);
    }

    /// Predicted value of an expression
    pub fn evaluate(&self, expr: &Expr) -> SymbolicValue {
        self.memory.evaluate(expr)
    }

    /// Write through an lvalue; unresolvable targets are ignored
    pub fn assign(&mut self, target: &Expr, value: SymbolicValue) {
        let written = self
            .memory
            .place_of(target)
            .and_then(|place| self.memory.write_place(&place, value));
        if written.is_none() {
            trace!(target = %target, "analysis could not resolve assignment target");
        }
    }

    pub fn binding_type(&self, name: &str) -> Option<&CType> {
        self.memory
            .stack
            .visible(name)
            .map(|binding| &binding.declared_type)
    }

    pub fn allocate(&mut self, token: HeapToken, declared_type: CType, value: SymbolicValue) {
        self.memory.heap.insert(HeapCell {
            address: token,
            declared_type,
            value,
        });
    }

    pub fn record_call_result(&mut self, call_id: StepIndex, value: SymbolicValue) {
        self.memory.record_call_result(call_id, value);
    }

    /// Record a possible return value; differing returns join to unknown
    pub fn set_return(&mut self, value: SymbolicValue) {
        self.return_value = join_returns(self.return_value.take(), Some(&value));
    }

    /// Keep the return values of another path without taking its memory
    pub fn merge_return(&mut self, other: &AnalysisState) {
        self.return_value = join_returns(self.return_value.take(), other.return_value.as_ref());
    }

    pub fn take_return(&mut self) -> Option<SymbolicValue> {
        self.return_value.take()
    }

    pub fn snapshot(&self) -> AnalysisState {
        self.clone()
    }

    pub fn restore(&mut self, snapshot: AnalysisState) {
        *self = snapshot;
    }

    pub fn is_unreachable(&self) -> bool {
        self.unreachable
    }

    pub fn set_unreachable(&mut self, unreachable: bool) {
        self.unreachable = unreachable;
    }

    /// Merge the outcome of another possible path into this one.
    ///
    /// Memory of an unreachable path contributes nothing. Return values were
    /// only ever recorded on reachable paths, so they always merge.
    pub fn join(&mut self, other: &AnalysisState) {
        if self.unreachable && !other.unreachable {
            let returns = self.return_value.take();
            *self = other.clone();
            self.return_value = join_returns(returns, other.return_value.as_ref());
            return;
        }
        if !other.unreachable {
            self.memory.join(&other.memory);
        }
        self.merge_return(other);
    }
}

/// Fold `state` into an optional accumulator of joined states
pub(crate) fn join_into(joined: &mut Option<AnalysisState>, state: AnalysisState) {
    match joined {
        Some(joined) => joined.join(&state),
        None => *joined = Some(state),
    }
}

fn join_returns(mine: Option<SymbolicValue>, theirs: Option<&SymbolicValue>) -> Option<SymbolicValue> {
    match (mine, theirs) {
        (None, None) => None,
        (Some(value), None) => Some(value),
        (None, Some(value)) => Some(value.clone()),
        (Some(mine), Some(theirs)) if &mine == theirs => Some(mine),
        _ => Some(SymbolicValue::unknown()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_restore() {
        let mut state = AnalysisState::new();
        state.push_frame("main");
        state.declare("x", SymbolicValue::number(1), CType::scalar("int"));
        let saved = state.snapshot();
        state.assign(&Expr::var("x"), SymbolicValue::number(7));
        assert_eq!(state.evaluate(&Expr::var("x")), SymbolicValue::number(7));
        state.restore(saved);
        assert_eq!(state.evaluate(&Expr::var("x")), SymbolicValue::number(1));
    }

    #[test]
    fn test_join_of_returns() {
        let mut left = AnalysisState::new();
        let mut right = AnalysisState::new();
        left.set_return(SymbolicValue::number(1));
        right.set_return(SymbolicValue::number(2));
        left.join(&right);
        assert_eq!(left.take_return(), Some(SymbolicValue::unknown()));
    }

    #[test]
    fn test_unreachable_path_does_not_join() {
        let mut reachable = AnalysisState::new();
        reachable.push_frame("main");
        reachable.declare("i", SymbolicValue::number(0), CType::scalar("int"));
        let mut dead = reachable.snapshot();
        dead.assign(&Expr::var("i"), SymbolicValue::number(10));
        dead.set_unreachable(true);

        let mut joined = dead.snapshot();
        joined.join(&reachable);
        assert!(!joined.is_unreachable());
        assert_eq!(joined.evaluate(&Expr::var("i")), SymbolicValue::number(0));

        reachable.join(&dead);
        assert_eq!(reachable.evaluate(&Expr::var("i")), SymbolicValue::number(0));
    }

    #[test]
    fn test_assign_to_missing_variable_is_ignored() {
        let mut state = AnalysisState::new();
        state.push_frame("main");
        state.assign(&Expr::var("ghost"), SymbolicValue::number(3));
        assert_eq!(state.evaluate(&Expr::var("ghost")), SymbolicValue::raw("ghost"));
    }
}
