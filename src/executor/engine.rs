//! The trace executor
//!
//! An [`Executor`] owns the authoritative [`Memory`] of one run and walks a
//! [`Trace`] step by step. For every step it decides whether the step is
//! live, then applies it and reports the resulting changes to its
//! [`EffectSink`].
//!
//! # Liveness
//!
//! A step is skipped when
//! - a taken `return`, `break` or `continue` is still unwinding (see
//!   [`Suppression`]), or
//! - one of its branch tags names a decision that was not made or selected a
//!   different label.
//!
//! Decision steps (`Branch`, `LoopCheck`) evaluate their condition against
//! live memory when applied, so the path actually taken is the runtime one
//! even where the unroller could only guess.
//!
//! # Stepping backward
//!
//! Memory is never rolled back. Moving backward or seeking resets the
//! executor and the sink and replays from step zero, which reproduces the
//! same state because every run is deterministic.

use super::branches::{Decisions, Suppression};
use super::sink::{EffectSink, RunStatus};
use super::template;
use crate::memory::address::AddressAllocator;
use crate::memory::heap::{Heap, HeapCell};
use crate::memory::stack::ScopeStack;
use crate::memory::types::CType;
use crate::memory::value::SymbolicValue;
use crate::memory::{Memory, PlaceRoot};
use crate::trace::{
    BinaryOp, BranchKind, BranchLabel, Expr, ExecutionStep, ReturnTarget, StepIndex, StepKind,
    Trace,
};
use tracing::{debug, trace};

/// Copy of the live memory at the current position
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub stack: ScopeStack,
    pub heap: Heap,
}

/// Replays a trace against live memory
pub struct Executor<S: EffectSink> {
    trace: Trace,
    sink: S,
    memory: Memory,
    allocator: AddressAllocator,
    decisions: Decisions,
    suppression: Option<Suppression>,
    /// Activation ids of the pushed frames, innermost last
    activations: Vec<StepIndex>,
    /// Caller-side argument values of the most recent call
    arguments: Vec<SymbolicValue>,
    return_value: Option<SymbolicValue>,
    /// Next step index to consider
    cursor: StepIndex,
    /// Indices of the steps applied so far
    applied: Vec<StepIndex>,
    status: RunStatus,
}

impl<S: EffectSink> Executor<S> {
    pub fn new(trace: Trace, sink: S) -> Self {
        let mut executor = Executor {
            trace,
            sink,
            memory: Memory::new(),
            allocator: AddressAllocator::new(),
            decisions: Decisions::new(),
            suppression: None,
            activations: Vec::new(),
            arguments: Vec::new(),
            return_value: None,
            cursor: 0,
            applied: Vec::new(),
            status: RunStatus::Idle,
        };
        executor.reset();
        executor
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn set_status(&mut self, status: RunStatus) {
        self.status = status;
        self.sink.set_status(status);
    }

    /// Index of the next step to consider
    pub fn position(&self) -> StepIndex {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.trace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trace.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.trace.len()
    }

    /// Steps applied so far, in order
    pub fn applied(&self) -> &[StepIndex] {
        &self.applied
    }

    /// The most recently applied step
    pub fn current_step(&self) -> Option<&ExecutionStep> {
        self.applied.last().and_then(|&index| self.trace.get(index))
    }

    /// Source line of the most recently applied step
    pub fn current_line(&self) -> Option<usize> {
        self.current_step().map(|step| step.line)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            stack: self.memory.stack.clone(),
            heap: self.memory.heap.clone(),
        }
    }

    /// Return to the state before step zero
    pub fn reset(&mut self) {
        self.memory = Memory::new();
        self.allocator = AddressAllocator::new();
        self.decisions.clear();
        self.suppression = None;
        self.activations.clear();
        self.arguments.clear();
        self.return_value = None;
        self.cursor = 0;
        self.applied.clear();
        self.sink.reset();
        self.set_status(RunStatus::Idle);
    }

    /// Apply the next live step; returns `false` once the trace is exhausted
    pub fn step_forward(&mut self) -> bool {
        while self.cursor < self.trace.len() {
            let index = self.cursor;
            self.cursor += 1;
            if self.process(index) {
                return true;
            }
        }
        if self.status != RunStatus::Finished {
            self.set_status(RunStatus::Finished);
        }
        false
    }

    /// Undo the most recently applied step by replaying everything before it
    pub fn step_backward(&mut self) -> bool {
        let Some(target) = self.applied.len().checked_sub(1) else {
            return false;
        };
        let status = self.status;
        self.reset();
        while self.applied.len() < target {
            if !self.step_forward() {
                break;
            }
        }
        self.restore_status(status);
        true
    }

    /// Reset and process every step with an index below `index`
    pub fn seek(&mut self, index: StepIndex) {
        let status = self.status;
        self.reset();
        let end = index.min(self.trace.len());
        while self.cursor < end {
            let next = self.cursor;
            self.cursor += 1;
            self.process(next);
        }
        if self.is_finished() {
            self.set_status(RunStatus::Finished);
        } else {
            self.restore_status(status);
        }
    }

    /// Apply every remaining live step
    pub fn run_to_completion(&mut self) {
        while self.step_forward() {}
    }

    fn restore_status(&mut self, status: RunStatus) {
        let status = match status {
            RunStatus::Finished => RunStatus::Stepping,
            other => other,
        };
        if status != RunStatus::Idle {
            self.set_status(status);
        }
    }

    /// Apply step `index` if it is live
    fn process(&mut self, index: StepIndex) -> bool {
        let trace = self.trace.clone();
        let Some(step) = trace.get(index) else {
            return false;
        };

        if let Some(suppression) = self.suppression {
            if !suppression.ends_at(&step.kind) {
                trace!(index, ?suppression, "step suppressed by jump");
                return false;
            }
            self.suppression = None;
        }
        if !self.decisions.allows(&step.tags) {
            trace!(index, "step on an untaken branch");
            return false;
        }

        trace!(index, line = step.line, step = %step.describe(), "apply");
        self.apply(index, &step.kind);
        self.applied.push(index);
        true
    }

    fn apply(&mut self, index: StepIndex, kind: &StepKind) {
        match kind {
            StepKind::FramePush {
                function,
                activation,
            } => self.push_frame(function, *activation),
            StepKind::FramePop { .. } => self.pop_frame(),
            StepKind::BindVariable {
                name,
                declared,
                value,
                source,
            } => {
                let value = self.runtime_value(value, source.as_ref());
                match declared {
                    Some(ty) => self.declare(name, ty, value),
                    None => self.store(&Expr::var(name.clone()), value),
                }
            }
            StepKind::CallEnter {
                function,
                call_id,
                arguments,
                values,
            } => {
                self.arguments = arguments
                    .iter()
                    .enumerate()
                    .map(|(position, argument)| {
                        self.runtime_value(
                            values.get(position).unwrap_or(&SymbolicValue::Uninitialized),
                            Some(argument),
                        )
                    })
                    .collect();
                self.return_value = None;
                self.push_frame(function, *call_id);
            }
            StepKind::ParamBind {
                name,
                declared,
                position,
                value,
            } => {
                let value = match self.arguments.get(*position) {
                    Some(argument) if argument.is_resolved() || !value.is_resolved() => {
                        argument.clone()
                    }
                    _ => value.clone(),
                };
                self.declare(name, declared, value);
            }
            StepKind::CallReturn {
                call_id, target, ..
            } => self.finish_call(*call_id, target.as_ref()),
            StepKind::AllocateHeap {
                token,
                declared_type,
                value,
                source,
            } => {
                let value = self.runtime_value(value, source.as_ref());
                self.memory.heap.insert(HeapCell {
                    address: *token,
                    declared_type: declared_type.clone(),
                    value: value.clone(),
                });
                self.sink.allocate_heap(*token, &value);
            }
            StepKind::SetField {
                base,
                through_pointer,
                field,
                value,
                source,
            } => {
                let value = self.runtime_value(value, source.as_ref());
                let target = Expr::Field {
                    base: Box::new(base.clone()),
                    field: field.clone(),
                    arrow: *through_pointer,
                };
                self.store(&target, value);
            }
            StepKind::DerefStore {
                pointer,
                value,
                source,
            } => {
                let value = self.runtime_value(value, source.as_ref());
                self.store(&Expr::deref(pointer.clone()), value);
            }
            StepKind::ArrayStore {
                array,
                index: element,
                value,
                source,
            } => {
                let value = self.runtime_value(value, source.as_ref());
                self.store(&Expr::index(array.clone(), element.clone()), value);
            }
            StepKind::PointerStep { target, delta } => {
                let stepped = self.memory.evaluate(&Expr::binary(
                    BinaryOp::Add,
                    Expr::var(target.clone()),
                    Expr::number(*delta),
                ));
                self.store(&Expr::var(target.clone()), stepped);
            }
            StepKind::Branch {
                kind,
                condition,
                cases,
                has_default,
            } => {
                let value = self.memory.evaluate(condition);
                let label = match kind {
                    BranchKind::If => match value.truthiness() {
                        Some(true) => Some(BranchLabel::Then),
                        _ => Some(BranchLabel::Else),
                    },
                    BranchKind::Switch => match value.as_number() {
                        Some(n) if cases.contains(&n) => Some(BranchLabel::Case(n)),
                        _ if *has_default => Some(BranchLabel::CaseDefault),
                        _ => None,
                    },
                };
                debug!(index, %value, ?label, "branch decided");
                self.decisions.record(index, label);
            }
            StepKind::LoopCheck { condition, .. } => {
                let value = self.memory.evaluate(condition);
                let label = (value.truthiness() == Some(true)).then_some(BranchLabel::Iterate);
                debug!(index, %value, iterate = label.is_some(), "loop check");
                self.decisions.record(index, label);
            }
            StepKind::Break { target } => {
                self.suppression = Some(Suppression::Break { target: *target })
            }
            StepKind::Continue { target } => {
                self.suppression = Some(Suppression::Continue { target: *target })
            }
            StepKind::Return {
                activation,
                value,
                source,
            } => {
                self.return_value = Some(self.runtime_value(value, source.as_ref()));
                self.suppression = Some(Suppression::Return {
                    activation: *activation,
                });
            }
            StepKind::LogOutput {
                template: text,
                arguments,
            } => {
                let values: Vec<SymbolicValue> = arguments
                    .iter()
                    .map(|argument| self.memory.evaluate(argument))
                    .collect();
                let output = template::resolve(text, &self.memory, &values);
                self.sink.log_output(&output);
            }
            StepKind::LoopEnter { .. }
            | StepKind::LoopExit { .. }
            | StepKind::LoopEnd { .. }
            | StepKind::SwitchEnd { .. } => {}
        }
    }

    /// Runtime value of `source`, or the unroller's value when only that one
    /// is resolved
    fn runtime_value(&self, value: &SymbolicValue, source: Option<&Expr>) -> SymbolicValue {
        let Some(source) = source else {
            return value.clone();
        };
        let runtime = self.memory.evaluate(source);
        if !runtime.is_resolved() && value.is_resolved() {
            value.clone()
        } else {
            runtime
        }
    }

    fn push_frame(&mut self, function: &str, activation: StepIndex) {
        self.memory.stack.push_frame(function);
        self.activations.push(activation);
        self.sink.push_frame(function);
    }

    fn pop_frame(&mut self) {
        if self.memory.stack.pop_frame().is_none() {
            debug!("pop with no frame on the stack");
            return;
        }
        self.activations.pop();
        self.sink.pop_frame();
    }

    /// Bind `name` in the innermost frame. A name already bound there keeps
    /// its address and type.
    fn declare(&mut self, name: &str, declared: &CType, value: SymbolicValue) {
        let existing = self
            .memory
            .stack
            .current_frame()
            .and_then(|frame| frame.get(name))
            .map(|binding| (binding.address, binding.declared_type.clone()));
        let (address, ty) = match existing {
            Some(existing) => existing,
            None => (
                self.allocator.allocate_stack(declared.size(self.trace.records())),
                declared.clone(),
            ),
        };
        if self
            .memory
            .declare(name, value.clone(), ty.clone(), address)
            .is_none()
        {
            debug!(name, "declaration with no frame on the stack");
            return;
        }
        self.sink.set_variable(name, &value, &ty, address);
    }

    /// Write through an lvalue and report the changed root
    fn store(&mut self, target: &Expr, value: SymbolicValue) {
        let Some(place) = self.memory.place_of(target) else {
            debug!(%target, "store target does not resolve");
            return;
        };
        if self.memory.write_place(&place, value).is_none() {
            debug!(%target, "store through place failed");
            return;
        }
        self.notify(&place.root);
    }

    fn notify(&mut self, root: &PlaceRoot) {
        match root {
            PlaceRoot::Binding { frame, name } => {
                if let Some(binding) = self.memory.stack.binding_at(*frame, name) {
                    self.sink.set_variable(
                        name,
                        &binding.value,
                        &binding.declared_type,
                        binding.address,
                    );
                }
            }
            PlaceRoot::Heap { token } => {
                if let Some(value) = self.memory.heap.value(*token) {
                    self.sink.update_heap(*token, value);
                }
            }
        }
    }

    /// Pop the callee and hand its return value to the caller
    fn finish_call(&mut self, call_id: StepIndex, target: Option<&ReturnTarget>) {
        let result = self
            .return_value
            .take()
            .unwrap_or(SymbolicValue::Uninitialized);
        if self.activations.last() == Some(&call_id) {
            self.pop_frame();
        } else {
            debug!(call_id, "call return does not match the innermost activation");
        }
        self.memory.record_call_result(call_id, result.clone());

        if let Some(target) = target {
            match &target.declared {
                Some(ty) => self.declare(&target.name, ty, result),
                None => self.store(&Expr::var(target.name.clone()), result),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::sink::{Effect, RecordingSink};
    use crate::parser::parse;
    use crate::unroller::unroll;
    use pretty_assertions::assert_eq;

    fn executor(source: &str) -> Executor<RecordingSink> {
        let root = parse(source).unwrap();
        Executor::new(unroll(&root), RecordingSink::new())
    }

    fn run(source: &str) -> Executor<RecordingSink> {
        let mut executor = executor(source);
        executor.run_to_completion();
        executor
    }

    #[test]
    fn test_sequential_bindings() {
        let executor = run("int main() {\n    int a = 2;\n    int b = a * 3;\n    printf(\"%d\\n\", b);\n    return 0;\n}\n");
        assert_eq!(executor.sink().output(), "6\n");
        assert_eq!(executor.status(), RunStatus::Finished);
        assert!(executor.snapshot().stack.is_empty());
    }

    #[test]
    fn test_fresh_addresses_per_declaration() {
        let executor = run("int main() {\n    int a = 1;\n    long b = 2;\n    int c = 3;\n    a = 4;\n}\n");
        let addresses: Vec<(String, u64)> = executor
            .sink()
            .since_reset()
            .iter()
            .filter_map(|effect| match effect {
                Effect::SetVariable { name, address, .. } => Some((name.clone(), *address)),
                _ => None,
            })
            .collect();
        assert_eq!(
            addresses,
            vec![
                ("a".to_string(), 4),
                ("b".to_string(), 8),
                ("c".to_string(), 16),
                ("a".to_string(), 4),
            ]
        );
    }

    #[test]
    fn test_untaken_branch_is_suppressed() {
        let executor = run("int main() {\n    int x = 5;\n    if (x > 10) {\n        printf(\"big\\n\");\n    } else {\n        printf(\"small\\n\");\n    }\n    return 0;\n}\n");
        assert_eq!(executor.sink().output(), "small\n");
    }

    #[test]
    fn test_loop_runs_actual_iterations() {
        let executor = run("int main() {\n    int i = 0;\n    while (i < 3) {\n        printf(\"%d\", i);\n        i++;\n    }\n    printf(\"\\n\");\n    return 0;\n}\n");
        assert_eq!(executor.sink().output(), "012\n");
    }

    #[test]
    fn test_return_value_reaches_caller() {
        let executor = run("int square(int n) {\n    return n * n;\n}\nint main() {\n    int s = square(4);\n    printf(\"%d\\n\", s);\n    return 0;\n}\n");
        assert_eq!(executor.sink().output(), "16\n");
    }

    #[test]
    fn test_early_return_skips_rest_of_callee() {
        let executor = run("int sign(int n) {\n    if (n < 0) {\n        return -1;\n    }\n    printf(\"positive\\n\");\n    return 1;\n}\nint main() {\n    int a = sign(-3);\n    printf(\"%d\\n\", a);\n    return 0;\n}\n");
        assert_eq!(executor.sink().output(), "-1\n");
    }

    #[test]
    fn test_break_skips_to_loop_end() {
        let executor = run("int main() {\n    for (int i = 0; i < 5; i++) {\n        if (i == 2) {\n            break;\n        }\n        printf(\"%d\", i);\n    }\n    printf(\"|\\n\");\n    return 0;\n}\n");
        assert_eq!(executor.sink().output(), "01|\n");
    }

    #[test]
    fn test_continue_skips_to_iteration_exit() {
        let executor = run("int main() {\n    for (int i = 0; i < 4; i++) {\n        if (i % 2 == 0) {\n            continue;\n        }\n        printf(\"%d\", i);\n    }\n    printf(\"\\n\");\n    return 0;\n}\n");
        assert_eq!(executor.sink().output(), "13\n");
    }

    #[test]
    fn test_write_through_pointer_updates_referent() {
        let executor = run("void bump(int *p) {\n    *p = *p + 1;\n}\nint main() {\n    int x = 1;\n    bump(&x);\n    printf(\"%d\\n\", x);\n    return 0;\n}\n");
        assert_eq!(executor.sink().output(), "2\n");
    }

    #[test]
    fn test_heap_allocation_effects() {
        let executor = run("int main() {\n    int *p = malloc(sizeof(int));\n    *p = 9;\n    return 0;\n}\n");
        let heap_effects: Vec<&Effect> = executor
            .sink()
            .since_reset()
            .iter()
            .filter(|effect| {
                matches!(effect, Effect::AllocateHeap { .. } | Effect::UpdateHeap { .. })
            })
            .collect();
        assert_eq!(heap_effects.len(), 2);
        assert!(matches!(
            heap_effects[1],
            Effect::UpdateHeap {
                value: SymbolicValue::Number { value: 9 },
                ..
            }
        ));
    }

    #[test]
    fn test_step_backward_matches_seek() {
        let source = "int main() {\n    int x = 1;\n    x = x + 1;\n    x = x * 5;\n    return x;\n}\n";
        let mut stepped = executor(source);
        for _ in 0..4 {
            stepped.step_forward();
        }
        stepped.step_backward();
        let mut sought = executor(source);
        sought.seek(stepped.position());
        assert_eq!(stepped.snapshot(), sought.snapshot());
        assert_eq!(stepped.applied(), sought.applied());
    }

    #[test]
    fn test_step_backward_at_start() {
        let mut executor = executor("int main() {\n    return 0;\n}\n");
        assert!(!executor.step_backward());
        assert_eq!(executor.position(), 0);
    }

    #[test]
    fn test_current_line_follows_applied_steps() {
        let mut executor = executor("int main() {\n    int x = 1;\n    x = 2;\n    return x;\n}\n");
        assert_eq!(executor.current_line(), None);
        executor.step_forward();
        executor.step_forward();
        assert_eq!(executor.current_line(), Some(2));
        executor.step_forward();
        assert_eq!(executor.current_line(), Some(3));
    }
}
