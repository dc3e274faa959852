//! Loop unrolling (`while`, `do-while`, `for`).
//!
//! Each iteration is emitted as `LoopCheck`, then `LoopEnter`, the body,
//! `LoopExit` and the `for` update. Everything after a check is tagged with
//! that check's iterate label, so a false condition at runtime suppresses the
//! rest of the loop in one go. Unrolling stops when analysis proves the
//! condition false or the iteration ceiling is reached; the check that would
//! have continued is still emitted so the executor can decide it.
//!
//! After the loop, analysis continues from the join of every state the loop
//! may stop in: each check it cannot decide, the final check and each
//! `break`.

use super::analysis::{join_into, AnalysisState};
use super::{Flow, JumpContext, JumpScope, Unroller};
use crate::parser::{NodeKind, SyntaxNode};
use crate::trace::{BlockId, BranchLabel, BranchTag, Expr, StepKind};
use tracing::debug;

/// The parts of a loop statement
struct LoopShape<'a, N> {
    condition: Option<&'a N>,
    body: Option<&'a N>,
    update: Option<&'a N>,
    /// `do { } while` runs its first body unchecked
    check_first: bool,
}

impl<'a, N: SyntaxNode> Unroller<'a, N> {
    pub(crate) fn unroll_while(&mut self, node: &'a N) -> Flow {
        self.unroll_loop(
            node,
            LoopShape {
                condition: node.child_by_field("condition"),
                body: node.child_by_field("body"),
                update: None,
                check_first: true,
            },
        )
    }

    pub(crate) fn unroll_do(&mut self, node: &'a N) -> Flow {
        self.unroll_loop(
            node,
            LoopShape {
                condition: node.child_by_field("condition"),
                body: node.child_by_field("body"),
                update: None,
                check_first: false,
            },
        )
    }

    pub(crate) fn unroll_for(&mut self, node: &'a N) -> Flow {
        if let Some(initializer) = node.child_by_field("initializer") {
            match initializer.node_kind() {
                NodeKind::Declaration => self.unroll_declaration(initializer),
                _ => self.unroll_effect(initializer),
            }
        }
        self.unroll_loop(
            node,
            LoopShape {
                condition: node.child_by_field("condition"),
                body: node.child_by_field("body"),
                update: node.child_by_field("update"),
                check_first: true,
            },
        )
    }

    fn unroll_loop(&mut self, node: &'a N, shape: LoopShape<'a, N>) -> Flow {
        let loop_id = self.next_block_id();
        let line = node.span().start_line;
        let base_depth = self.tags.len();
        // every state in which the loop may stop at runtime
        let mut exits: Option<AnalysisState> = None;
        let mut returned = false;
        let mut iteration = 0;

        if !shape.check_first {
            let (flow, breaks) = self.unroll_iteration(loop_id, iteration, &shape, line);
            if let Some(breaks) = breaks {
                join_into(&mut exits, breaks);
            }
            match flow {
                Flow::Break => return self.finish_loop(loop_id, base_depth, line, exits, false),
                Flow::Return => return self.finish_loop(loop_id, base_depth, line, exits, true),
                _ => iteration += 1,
            }
        }

        loop {
            let condition = match shape.condition {
                Some(condition) => self.lower_expr(condition),
                None => Expr::number(1),
            };
            let predicted = self.analysis.evaluate(&condition).truthiness();
            let check = self.emit(
                StepKind::LoopCheck {
                    loop_id,
                    iteration,
                    condition,
                },
                shape.condition.map_or(line, |c| c.span().start_line),
            );
            if predicted == Some(false) {
                debug!(loop_id, iteration, "loop condition predicted false");
                join_into(&mut exits, self.analysis.snapshot());
                break;
            }
            if self.analysis.is_unreachable() {
                debug!(loop_id, iteration, "loop check cannot be reached");
                break;
            }
            if iteration >= self.limits.max_loop_iterations {
                debug!(loop_id, iteration, "loop iteration ceiling reached");
                join_into(&mut exits, self.analysis.snapshot());
                break;
            }
            if predicted.is_none() {
                join_into(&mut exits, self.analysis.snapshot());
            }

            self.tags.push(BranchTag {
                owner: check,
                label: BranchLabel::Iterate,
            });
            let (flow, breaks) = self.unroll_iteration(loop_id, iteration, &shape, line);
            if let Some(breaks) = breaks {
                join_into(&mut exits, breaks);
            }
            iteration += 1;
            match flow {
                Flow::Break => break,
                Flow::Return => {
                    returned = true;
                    break;
                }
                _ => {}
            }
        }

        self.finish_loop(loop_id, base_depth, line, exits, returned)
    }

    /// Body and update of one iteration, with the states of any `break`s
    /// that left it
    fn unroll_iteration(
        &mut self,
        loop_id: BlockId,
        iteration: usize,
        shape: &LoopShape<'a, N>,
        line: usize,
    ) -> (Flow, Option<AnalysisState>) {
        self.emit(StepKind::LoopEnter { loop_id, iteration }, line);
        let depth = self.tags.len();
        self.jumps
            .push(JumpContext::new(JumpScope::Loop, loop_id, depth));
        let flow = match shape.body {
            Some(body) => self.unroll_statement(body),
            None => Flow::Normal,
        };
        self.tags.truncate(depth);
        let Some(context) = self.jumps.pop() else {
            return (flow, None);
        };
        if matches!(flow, Flow::Break | Flow::Return) {
            return (flow, context.breaks);
        }

        // `continue` paths rejoin before the exit step
        match (flow, context.continues) {
            (Flow::Continue, Some(continues)) => self.analysis.restore(continues),
            (_, Some(continues)) => self.analysis.join(&continues),
            (_, None) => {}
        }
        self.emit(StepKind::LoopExit { loop_id, iteration }, line);
        if let Some(update) = shape.update {
            self.unroll_effect(update);
        }
        (Flow::Normal, context.breaks)
    }

    /// Emit the join step and continue from every state the loop may end in.
    /// The loop only counts as returning when no such state exists.
    fn finish_loop(
        &mut self,
        loop_id: BlockId,
        base_depth: usize,
        line: usize,
        exits: Option<AnalysisState>,
        returned: bool,
    ) -> Flow {
        self.tags.truncate(base_depth);
        self.emit(StepKind::LoopEnd { loop_id }, line);
        match exits {
            Some(mut state) => {
                if returned {
                    state.merge_return(&self.analysis);
                }
                self.analysis.restore(state);
                Flow::Normal
            }
            None if returned => Flow::Return,
            None => Flow::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse;
    use crate::trace::{BranchLabel, BranchTag, StepKind};
    use crate::unroller::{unroll, unroll_with_limits, UnrollLimits};

    #[test]
    fn test_for_loop_runs_update_after_exit() {
        let root = parse(
            "int main() {\n    int sum = 0;\n    for (int i = 0; i < 3; i++) {\n        sum += i;\n    }\n    return sum;\n}\n",
        )
        .unwrap();
        let trace = unroll(&root);
        let enters = trace
            .iter()
            .filter(|step| matches!(step.kind, StepKind::LoopEnter { .. }))
            .count();
        assert_eq!(enters, 3);
        let exit = trace
            .iter()
            .position(|step| matches!(step.kind, StepKind::LoopExit { iteration: 0, .. }))
            .unwrap();
        assert!(matches!(trace.steps()[exit + 1].kind, StepKind::PointerStep { .. }));
        let returned = trace.iter().find_map(|step| match &step.kind {
            StepKind::Return { value, .. } => Some(value.to_string()),
            _ => None,
        });
        assert_eq!(returned.as_deref(), Some("3"));
    }

    #[test]
    fn test_do_while_first_body_is_unchecked() {
        let root = parse(
            "int main() {\n    int n = 0;\n    do {\n        n++;\n    } while (n < 0);\n    return n;\n}\n",
        )
        .unwrap();
        let trace = unroll(&root);
        let first_loop_step = trace
            .iter()
            .find(|step| {
                matches!(
                    step.kind,
                    StepKind::LoopEnter { .. } | StepKind::LoopCheck { .. }
                )
            })
            .unwrap();
        assert!(matches!(first_loop_step.kind, StepKind::LoopEnter { iteration: 0, .. }));
        let checks = trace
            .iter()
            .filter(|step| matches!(step.kind, StepKind::LoopCheck { .. }))
            .count();
        assert_eq!(checks, 1);
    }

    #[test]
    fn test_unknown_condition_unrolls_to_ceiling() {
        let root = parse(
            "int main() {\n    int n = mystery();\n    while (n > 0) {\n        n--;\n    }\n    return 0;\n}\n",
        )
        .unwrap();
        let trace = unroll_with_limits(
            &root,
            UnrollLimits {
                max_loop_iterations: 5,
                max_call_depth: 4,
            },
        );
        let enters = trace
            .iter()
            .filter(|step| matches!(step.kind, StepKind::LoopEnter { .. }))
            .count();
        assert_eq!(enters, 5);
    }

    #[test]
    fn test_continue_in_nested_if_is_emitted() {
        let root = parse(
            "int main() {\n    int odd = 0;\n    for (int i = 0; i < 4; i++) {\n        if (i % 2 == 0) {\n            continue;\n        }\n        odd++;\n    }\n    return odd;\n}\n",
        )
        .unwrap();
        let trace = unroll(&root);
        let continues = trace
            .iter()
            .filter(|step| matches!(step.kind, StepKind::Continue { .. }))
            .count();
        assert_eq!(continues, 4);
    }

    #[test]
    fn test_undecided_loop_forgets_counter() {
        let root = parse(
            "int main() {\n    int n = rand() % 5;\n    int i = 0;\n    while (i < n) {\n        i++;\n    }\n    if (i == 10) {\n        return 0;\n    }\n    printf(\"done %d\\n\", i);\n    return 1;\n}\n",
        )
        .unwrap();
        let trace = unroll(&root);
        let branch = trace
            .iter()
            .position(|step| matches!(step.kind, StepKind::Branch { .. }))
            .unwrap();
        let logs: Vec<_> = trace
            .iter()
            .filter(|step| matches!(step.kind, StepKind::LogOutput { .. }))
            .collect();
        assert_eq!(logs.len(), 1);
        assert_eq!(
            logs[0].tags,
            vec![BranchTag {
                owner: branch,
                label: BranchLabel::Else
            }]
        );
    }

    #[test]
    fn test_break_state_flows_past_loop() {
        let root = parse(
            "int main() {\n    int i = 0;\n    while (i < 8) {\n        if (i == 3) {\n            break;\n        }\n        i++;\n    }\n    return i;\n}\n",
        )
        .unwrap();
        let trace = unroll(&root);
        let returned = trace.iter().find_map(|step| match &step.kind {
            StepKind::Return { value, .. } => Some(value.to_string()),
            _ => None,
        });
        assert_eq!(returned.as_deref(), Some("3"));
        // iterations after the predicted break are never reached
        let enters = trace
            .iter()
            .filter(|step| matches!(step.kind, StepKind::LoopEnter { .. }))
            .count();
        assert_eq!(enters, 4);
    }
}
