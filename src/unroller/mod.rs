//! Static unrolling of a syntax tree into a linear step trace
//!
//! This module provides the compile phase:
//! - [`analysis`]: speculative memory used to predict values while unrolling
//! - `statements`, `loops`, `declarations`, `expressions`, `calls`, `output`:
//!   `impl Unroller` blocks, one per construct family
//!
//! # Unrolling Model
//!
//! Every statement becomes zero or more [`ExecutionStep`]s. Both arms of a
//! conditional are emitted, each tagged with the [`BranchTag`] of the
//! decision that selects it; the executor later decides which tags are live.
//! Loops are emitted iteration by iteration up to
//! [`UnrollLimits::max_loop_iterations`], calls are inlined up to
//! [`UnrollLimits::max_call_depth`].
//!
//! The speculative [`AnalysisState`] only guides how far to unroll and
//! supplies fallback values. It never decides what the executor applies, and
//! a confident prediction never drops the code that follows a conditional:
//! that code is emitted on an unreachable analysis path instead, where calls
//! are left opaque.

pub mod analysis;
mod calls;
mod declarations;
mod expressions;
mod loops;
mod output;
mod statements;

pub use analysis::AnalysisState;

use crate::constants::{DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_LOOP_ITERATIONS, GLOBAL_FRAME};
use crate::memory::address::AddressAllocator;
use crate::memory::types::RecordTable;
use crate::parser::{NodeKind, SyntaxNode};
use crate::trace::{BlockId, BranchTag, ExecutionStep, StepIndex, StepKind, Trace};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Ceilings that keep unrolling finite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnrollLimits {
    pub max_loop_iterations: usize,
    pub max_call_depth: usize,
}

impl Default for UnrollLimits {
    fn default() -> Self {
        UnrollLimits {
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// How a statement sequence ended during unrolling.
///
/// Variants are ordered by how much of the enclosing code they skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Flow {
    Normal,
    Continue,
    Break,
    Return,
}

impl Flow {
    /// Combined flow of two paths that both leave the sequence
    pub(crate) fn either(self, other: Flow) -> Flow {
        self.min(other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JumpScope {
    Loop,
    Switch,
}

/// An enclosing loop or switch that `break`/`continue` can target
#[derive(Debug, Clone)]
pub(crate) struct JumpContext {
    pub scope: JumpScope,
    pub id: BlockId,
    /// Tag stack depth when the construct's body started
    pub tag_depth: usize,
    /// Analysis states at each `break` that targets this construct
    pub breaks: Option<AnalysisState>,
    /// Analysis states at each `continue` that targets this loop
    pub continues: Option<AnalysisState>,
}

impl JumpContext {
    pub(crate) fn new(scope: JumpScope, id: BlockId, tag_depth: usize) -> Self {
        JumpContext {
            scope,
            id,
            tag_depth,
            breaks: None,
            continues: None,
        }
    }
}

/// Unroll a whole program with the default limits
pub fn unroll<N: SyntaxNode>(root: &N) -> Trace {
    unroll_with_limits(root, UnrollLimits::default())
}

pub fn unroll_with_limits<N: SyntaxNode>(root: &N, limits: UnrollLimits) -> Trace {
    let mut unroller = Unroller::new(limits);
    unroller.unroll_program(root);
    debug!(steps = unroller.steps.len(), "unrolling finished");
    Trace::new(unroller.steps, unroller.records)
}

/// Compile-phase state
pub(crate) struct Unroller<'a, N: SyntaxNode> {
    pub(crate) limits: UnrollLimits,
    pub(crate) functions: FxHashMap<String, &'a N>,
    pub(crate) records: RecordTable,
    pub(crate) steps: Vec<ExecutionStep>,
    /// Branch tags attached to every emitted step
    pub(crate) tags: Vec<BranchTag>,
    pub(crate) analysis: AnalysisState,
    pub(crate) allocator: AddressAllocator,
    /// `FramePush`/`CallEnter` indices of the active frames
    pub(crate) activations: Vec<StepIndex>,
    pub(crate) jumps: Vec<JumpContext>,
    pub(crate) call_depth: usize,
    next_block: BlockId,
}

impl<'a, N: SyntaxNode> Unroller<'a, N> {
    pub(crate) fn new(limits: UnrollLimits) -> Self {
        Unroller {
            limits,
            functions: FxHashMap::default(),
            records: RecordTable::default(),
            steps: Vec::new(),
            tags: Vec::new(),
            analysis: AnalysisState::new(),
            allocator: AddressAllocator::new(),
            activations: Vec::new(),
            jumps: Vec::new(),
            call_depth: 0,
            next_block: 0,
        }
    }

    /// Append a step tagged with the current branch context
    pub(crate) fn emit(&mut self, kind: StepKind, line: usize) -> StepIndex {
        let index = self.steps.len();
        self.steps.push(ExecutionStep {
            kind,
            line,
            tags: self.tags.clone(),
        });
        index
    }

    pub(crate) fn emit_at(&mut self, kind: StepKind, node: &N) -> StepIndex {
        self.emit(kind, node.span().start_line)
    }

    pub(crate) fn next_block_id(&mut self) -> BlockId {
        let id = self.next_block;
        self.next_block += 1;
        id
    }

    /// Open an activation frame; returns its `FramePush` index
    pub(crate) fn enter_frame(&mut self, function: &str, line: usize) -> StepIndex {
        let activation = self.steps.len();
        self.emit(
            StepKind::FramePush {
                function: function.to_string(),
                activation,
            },
            line,
        );
        self.analysis.push_frame(function);
        self.activations.push(activation);
        activation
    }

    pub(crate) fn leave_frame(&mut self, function: &str, activation: StepIndex, line: usize) {
        self.activations.pop();
        self.analysis.pop_frame();
        self.emit(
            StepKind::FramePop {
                function: function.to_string(),
                activation,
            },
            line,
        );
    }

    fn unroll_program(&mut self, root: &'a N) {
        let mut globals = Vec::new();
        for child in root.children() {
            match child.node_kind() {
                NodeKind::FunctionDefinition => {
                    if let Some(name) = declarations::function_name(child) {
                        self.functions.insert(name, child);
                    }
                }
                NodeKind::StructSpecifier => self.collect_record(child),
                NodeKind::Declaration if !declarations::is_prototype(child) => globals.push(child),
                _ => {}
            }
        }

        let span = root.span();
        match self.functions.get("main").copied() {
            Some(main) => {
                let global_frame = if globals.is_empty() {
                    None
                } else {
                    Some(self.enter_frame(GLOBAL_FRAME, span.start_line))
                };
                for global in globals {
                    self.unroll_declaration(global);
                }
                self.unroll_main(main);
                if let Some(activation) = global_frame {
                    self.leave_frame(GLOBAL_FRAME, activation, span.end_line);
                }
            }
            None => {
                debug!("no main function, unrolling top-level statements");
                let activation = self.enter_frame(GLOBAL_FRAME, span.start_line);
                for child in root.children() {
                    if matches!(
                        child.node_kind(),
                        NodeKind::FunctionDefinition | NodeKind::StructSpecifier
                    ) {
                        continue;
                    }
                    if self.unroll_statement(child) == Flow::Return {
                        break;
                    }
                }
                self.tags.clear();
                self.leave_frame(GLOBAL_FRAME, activation, span.end_line);
            }
        }
    }

    fn unroll_main(&mut self, main: &'a N) {
        let span = main.span();
        let activation = self.enter_frame("main", span.start_line);
        if let Some(body) = main.child_by_field("body") {
            self.unroll_statement(body);
        }
        self.leave_frame("main", activation, span.end_line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::trace::{BranchLabel, Expr};
    use crate::memory::value::SymbolicValue;

    pub(crate) fn unroll_source(source: &str) -> Trace {
        let root = parse(source).expect("source should parse");
        unroll(&root)
    }

    fn kinds(trace: &Trace) -> Vec<String> {
        trace
            .iter()
            .map(|step| match &step.kind {
                StepKind::FramePush { .. } => "push",
                StepKind::FramePop { .. } => "pop",
                StepKind::BindVariable { .. } => "bind",
                StepKind::CallEnter { .. } => "call",
                StepKind::ParamBind { .. } => "param",
                StepKind::CallReturn { .. } => "call-return",
                StepKind::AllocateHeap { .. } => "alloc",
                StepKind::SetField { .. } => "field",
                StepKind::DerefStore { .. } => "deref",
                StepKind::ArrayStore { .. } => "store",
                StepKind::PointerStep { .. } => "step",
                StepKind::Branch { .. } => "branch",
                StepKind::LoopCheck { .. } => "check",
                StepKind::LoopEnter { .. } => "enter",
                StepKind::LoopExit { .. } => "exit",
                StepKind::LoopEnd { .. } => "loop-end",
                StepKind::SwitchEnd { .. } => "switch-end",
                StepKind::Break { .. } => "break",
                StepKind::Continue { .. } => "continue",
                StepKind::Return { .. } => "return",
                StepKind::LogOutput { .. } => "log",
            })
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_main_frame_brackets_body() {
        let trace = unroll_source("int main() {\n    int x = 5;\n    return 0;\n}\n");
        assert_eq!(kinds(&trace), vec!["push", "bind", "return", "pop"]);
        assert_eq!(trace.get(1).map(|s| s.line), Some(2));
        match &trace.get(3).map(|s| &s.kind) {
            Some(StepKind::FramePop { activation, .. }) => assert_eq!(*activation, 0),
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_globals_get_their_own_frame() {
        let trace = unroll_source("int counter = 3;\nint main() {\n    return counter;\n}\n");
        assert_eq!(
            kinds(&trace),
            vec!["push", "bind", "push", "return", "pop", "pop"]
        );
        match &trace.get(0).map(|s| &s.kind) {
            Some(StepKind::FramePush { function, .. }) => assert_eq!(function, GLOBAL_FRAME),
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_without_main_scans_top_level() {
        let trace = unroll_source("int a = 1;\nint b = a + 1;\n");
        assert_eq!(kinds(&trace), vec!["push", "bind", "bind", "pop"]);
        match &trace.get(2).map(|s| &s.kind) {
            Some(StepKind::BindVariable { value, .. }) => {
                assert_eq!(value, &SymbolicValue::number(2))
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_if_else_tags_both_arms() {
        let trace = unroll_source(
            "int main() {\n    int x = 5;\n    if (x > 3) {\n        x = 1;\n    } else {\n        x = 2;\n    }\n    return x;\n}\n",
        );
        assert_eq!(
            kinds(&trace),
            vec!["push", "bind", "branch", "bind", "bind", "return", "pop"]
        );
        let then_step = &trace.steps()[3];
        let else_step = &trace.steps()[4];
        assert_eq!(
            then_step.tags,
            vec![BranchTag {
                owner: 2,
                label: BranchLabel::Then
            }]
        );
        assert_eq!(
            else_step.tags,
            vec![BranchTag {
                owner: 2,
                label: BranchLabel::Else
            }]
        );
        // x > 3 is predicted true, so analysis follows the then arm
        match &trace.steps()[5].kind {
            StepKind::Return { value, .. } => assert_eq!(value, &SymbolicValue::number(1)),
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_loop_stops_when_condition_is_false() {
        let trace = unroll_source(
            "int main() {\n    int i = 0;\n    while (i < 2) {\n        i++;\n    }\n    return i;\n}\n",
        );
        assert_eq!(
            kinds(&trace),
            vec![
                "push", "bind", "check", "enter", "step", "exit", "check", "enter", "step",
                "exit", "check", "loop-end", "return", "pop"
            ]
        );
        let second_body = &trace.steps()[8];
        assert_eq!(
            second_body.tags,
            vec![
                BranchTag {
                    owner: 2,
                    label: BranchLabel::Iterate
                },
                BranchTag {
                    owner: 6,
                    label: BranchLabel::Iterate
                }
            ]
        );
    }

    #[test]
    fn test_loop_ceiling_emits_final_check() {
        let root = parse("int main() {\n    int i = 0;\n    while (1) {\n        i++;\n    }\n}\n")
            .expect("source should parse");
        let trace = unroll_with_limits(
            &root,
            UnrollLimits {
                max_loop_iterations: 3,
                max_call_depth: 4,
            },
        );
        let checks = trace
            .iter()
            .filter(|step| matches!(step.kind, StepKind::LoopCheck { .. }))
            .count();
        assert_eq!(checks, 4);
        let bodies = trace
            .iter()
            .filter(|step| matches!(step.kind, StepKind::LoopEnter { .. }))
            .count();
        assert_eq!(bodies, 3);
    }

    #[test]
    fn test_call_sequence_with_target() {
        let trace = unroll_source(
            "int add(int a, int b) {\n    return a + b;\n}\nint main() {\n    int r = add(2, 3);\n    return r;\n}\n",
        );
        assert_eq!(
            kinds(&trace),
            vec!["push", "call", "param", "param", "return", "call-return", "return", "pop"]
        );
        match &trace.steps()[5].kind {
            StepKind::CallReturn {
                call_id, target, ..
            } => {
                assert_eq!(*call_id, 1);
                assert_eq!(target.as_ref().map(|t| t.name.as_str()), Some("r"));
            }
            other => panic!("unexpected step {:?}", other),
        }
        match &trace.steps()[6].kind {
            StepKind::Return { value, .. } => assert_eq!(value, &SymbolicValue::number(5)),
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_undefined_call_is_opaque() {
        let trace = unroll_source("int main() {\n    int r = mystery(1);\n    return r;\n}\n");
        assert_eq!(kinds(&trace), vec!["push", "bind", "return", "pop"]);
        match &trace.steps()[1].kind {
            StepKind::BindVariable { source, value, .. } => {
                assert_eq!(source, &Some(Expr::opaque("mystery(1)")));
                assert_eq!(value, &SymbolicValue::raw("mystery(1)"));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_recursion_depth_ceiling() {
        let root = parse(
            "int f(int n) {\n    return f(n + 1);\n}\nint main() {\n    f(0);\n    return 0;\n}\n",
        )
        .expect("source should parse");
        let trace = unroll_with_limits(
            &root,
            UnrollLimits {
                max_loop_iterations: 10,
                max_call_depth: 3,
            },
        );
        let calls = trace
            .iter()
            .filter(|step| matches!(step.kind, StepKind::CallEnter { .. }))
            .count();
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_unconditional_break_is_not_emitted() {
        let trace = unroll_source(
            "int main() {\n    while (1) {\n        break;\n    }\n    return 0;\n}\n",
        );
        assert!(!kinds(&trace).contains(&"break".to_string()));
        assert_eq!(
            kinds(&trace),
            vec!["push", "check", "enter", "loop-end", "return", "pop"]
        );
    }

    #[test]
    fn test_conditional_break_is_emitted() {
        let trace = unroll_source(
            "int main() {\n    int i = 0;\n    while (i < 5) {\n        if (i == 1) {\n            break;\n        }\n        i++;\n    }\n    return i;\n}\n",
        );
        let breaks: Vec<&ExecutionStep> = trace
            .iter()
            .filter(|step| matches!(step.kind, StepKind::Break { .. }))
            .collect();
        assert_eq!(breaks.len(), 2);
        assert_eq!(breaks[0].tags.len(), 2);
    }

    #[test]
    fn test_code_after_predicted_return_is_still_emitted() {
        let trace = unroll_source(
            "int main() {\n    int x = 1;\n    if (x == 1) {\n        return 0;\n    }\n    printf(\"after\\n\");\n    return 1;\n}\n",
        );
        assert_eq!(
            kinds(&trace),
            vec!["push", "bind", "branch", "return", "log", "return", "pop"]
        );
        assert_eq!(
            trace.steps()[4].tags,
            vec![BranchTag {
                owner: 2,
                label: BranchLabel::Else
            }]
        );
    }

    #[test]
    fn test_calls_on_unreachable_paths_stay_opaque() {
        let trace = unroll_source(
            "int fact(int n) {\n    if (n <= 1) {\n        return 1;\n    }\n    return n * fact(n - 1);\n}\nint main() {\n    int f = fact(3);\n    return f;\n}\n",
        );
        let calls = trace
            .iter()
            .filter(|step| matches!(step.kind, StepKind::CallEnter { .. }))
            .count();
        assert_eq!(calls, 3);
        match trace.steps().iter().rev().find_map(|step| match &step.kind {
            StepKind::Return { value, .. } => Some(value.clone()),
            _ => None,
        }) {
            Some(value) => assert_eq!(value, SymbolicValue::number(6)),
            None => panic!("main should return"),
        }
    }
}
