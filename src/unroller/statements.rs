// Statement dispatch, conditionals, jumps and assignments

use super::analysis::join_into;
use super::{Flow, JumpContext, JumpScope, Unroller};
use crate::memory::value::SymbolicValue;
use crate::parser::{NodeKind, SyntaxNode};
use crate::trace::{BinaryOp, BranchKind, BranchLabel, BranchTag, Expr, ReturnTarget, StepKind};
use std::ptr;
use tracing::{debug, trace};

impl<'a, N: SyntaxNode> Unroller<'a, N> {
    pub(crate) fn unroll_statement(&mut self, node: &'a N) -> Flow {
        match node.node_kind() {
            NodeKind::CompoundStatement => self.unroll_block(node),
            NodeKind::Declaration => {
                self.unroll_declaration(node);
                Flow::Normal
            }
            NodeKind::ExpressionStatement => {
                if let Some(expr) = node.child_at(0) {
                    self.unroll_effect(expr);
                }
                Flow::Normal
            }
            NodeKind::IfStatement => self.unroll_if(node),
            NodeKind::SwitchStatement => self.unroll_switch(node),
            NodeKind::WhileStatement => self.unroll_while(node),
            NodeKind::DoStatement => self.unroll_do(node),
            NodeKind::ForStatement => self.unroll_for(node),
            NodeKind::ReturnStatement => self.unroll_return(node),
            NodeKind::BreakStatement => self.unroll_jump(node, Flow::Break),
            NodeKind::ContinueStatement => self.unroll_jump(node, Flow::Continue),
            NodeKind::UsingDeclaration
            | NodeKind::StructSpecifier
            | NodeKind::FunctionDefinition => Flow::Normal,
            kind if is_expression(kind) => {
                self.unroll_effect(node);
                Flow::Normal
            }
            _ => {
                trace!(kind = node.kind(), "descending into unsupported statement");
                self.unroll_block(node)
            }
        }
    }

    /// Unroll statements in order until one leaves the sequence.
    /// Fall-through tags pushed by conditionals end with the sequence.
    pub(crate) fn unroll_block(&mut self, node: &'a N) -> Flow {
        let depth = self.tags.len();
        let mut flow = Flow::Normal;
        for child in node.children() {
            flow = self.unroll_statement(child);
            if flow != Flow::Normal {
                break;
            }
        }
        self.tags.truncate(depth);
        flow
    }

    /// Unroll an expression evaluated only for its side effects
    pub(crate) fn unroll_effect(&mut self, node: &'a N) {
        match node.node_kind() {
            NodeKind::AssignmentExpression => {
                self.unroll_assignment(node);
            }
            NodeKind::UpdateExpression => {
                self.unroll_update(node);
            }
            NodeKind::CommaExpression => {
                for side in ["left", "right"] {
                    if let Some(child) = node.child_by_field(side) {
                        self.unroll_effect(child);
                    }
                }
            }
            NodeKind::ParenthesizedExpression => {
                if let Some(inner) = node.child_at(0) {
                    self.unroll_effect(inner);
                }
            }
            _ => {
                self.lower_expr(node);
            }
        }
    }

    fn unroll_if(&mut self, node: &'a N) -> Flow {
        let condition = match node.child_by_field("condition") {
            Some(condition) => self.lower_expr(condition),
            None => Expr::number(0),
        };
        let predicted = self.analysis.evaluate(&condition).truthiness();
        let owner = self.emit_at(
            StepKind::Branch {
                kind: BranchKind::If,
                condition,
                cases: Vec::new(),
                has_default: false,
            },
            node,
        );
        debug!(owner, ?predicted, "if branch");

        let before = self.analysis.snapshot();
        let then_flow = self.unroll_arm(
            owner,
            BranchLabel::Then,
            node.child_by_field("consequence"),
            predicted == Some(false),
        );
        let then_state = self.analysis.snapshot();

        self.analysis.restore(before);
        let else_flow = self.unroll_arm(
            owner,
            BranchLabel::Else,
            node.child_by_field("alternative"),
            predicted == Some(true),
        );
        let else_state = self.analysis.snapshot();

        match (then_flow, else_flow) {
            (Flow::Normal, Flow::Normal) => {
                self.analysis.join(&then_state);
                Flow::Normal
            }
            // code after the statement runs only through the arm that falls through
            (leaving, Flow::Normal) => {
                trace!(owner, ?leaving, "then arm leaves, tagging the rest as else");
                self.analysis.merge_return(&then_state);
                self.tags.push(BranchTag {
                    owner,
                    label: BranchLabel::Else,
                });
                Flow::Normal
            }
            (Flow::Normal, leaving) => {
                trace!(owner, ?leaving, "else arm leaves, tagging the rest as then");
                self.analysis.restore(then_state);
                self.analysis.merge_return(&else_state);
                self.tags.push(BranchTag {
                    owner,
                    label: BranchLabel::Then,
                });
                Flow::Normal
            }
            (then_flow, else_flow) => {
                self.analysis.join(&then_state);
                then_flow.either(else_flow)
            }
        }
    }

    /// One tagged arm of a conditional. An arm analysis rules out is still
    /// emitted, on an unreachable path.
    fn unroll_arm(
        &mut self,
        owner: usize,
        label: BranchLabel,
        arm: Option<&'a N>,
        ruled_out: bool,
    ) -> Flow {
        if ruled_out {
            self.analysis.set_unreachable(true);
        }
        let Some(arm) = arm else {
            return Flow::Normal;
        };
        let depth = self.tags.len();
        self.tags.push(BranchTag { owner, label });
        let flow = self.unroll_statement(arm);
        self.tags.truncate(depth);
        flow
    }

    fn unroll_switch(&mut self, node: &'a N) -> Flow {
        let discriminant = match node.child_by_field("condition") {
            Some(condition) => self.lower_expr(condition),
            None => Expr::number(0),
        };
        let predicted = self.analysis.evaluate(&discriminant).as_number();

        let mut cases = Vec::new();
        if let Some(body) = node.child_by_field("body") {
            for case in body.children() {
                if case.node_kind() != NodeKind::CaseStatement {
                    continue;
                }
                let label = match case.child_by_field("value") {
                    Some(value) => {
                        let value = self.lower_expr(value);
                        match self.analysis.evaluate(&value).as_number() {
                            Some(n) => BranchLabel::Case(n),
                            None => {
                                debug!(case = case.text(), "skipping non-constant case label");
                                continue;
                            }
                        }
                    }
                    None => BranchLabel::CaseDefault,
                };
                cases.push((label, case));
            }
        }
        let values: Vec<i64> = cases
            .iter()
            .filter_map(|(label, _)| match label {
                BranchLabel::Case(n) => Some(*n),
                _ => None,
            })
            .collect();
        let has_default = cases.iter().any(|(label, _)| *label == BranchLabel::CaseDefault);

        let owner = self.emit_at(
            StepKind::Branch {
                kind: BranchKind::Switch,
                condition: discriminant,
                cases: values,
                has_default,
            },
            node,
        );
        let switch_id = self.next_block_id();
        debug!(owner, switch_id, ?predicted, "switch branch");

        let chosen = predicted.map(|value| {
            cases
                .iter()
                .position(|(label, _)| *label == BranchLabel::Case(value))
                .or_else(|| {
                    cases
                        .iter()
                        .position(|(label, _)| *label == BranchLabel::CaseDefault)
                })
        });

        let before = self.analysis.snapshot();
        // states that reach the end of the switch, and states that leave it otherwise
        let mut exits = None;
        let mut left = None;
        let mut leaving = None;
        if !has_default && !matches!(chosen, Some(Some(_))) {
            join_into(&mut exits, before.clone());
        }

        for start in 0..cases.len() {
            self.analysis.restore(before.clone());
            if chosen.is_some_and(|chosen| chosen != Some(start)) {
                self.analysis.set_unreachable(true);
            }
            let depth = self.tags.len();
            self.tags.push(BranchTag {
                owner,
                label: cases[start].0,
            });
            self.jumps
                .push(JumpContext::new(JumpScope::Switch, switch_id, self.tags.len()));

            // fall through into later cases until something leaves
            let mut flow = Flow::Normal;
            'cases: for (_, case) in &cases[start..] {
                for statement in case_body(*case) {
                    flow = self.unroll_statement(statement);
                    if flow != Flow::Normal {
                        break 'cases;
                    }
                }
            }

            let context = self.jumps.pop();
            self.tags.truncate(depth);
            match flow {
                Flow::Normal => join_into(&mut exits, self.analysis.snapshot()),
                Flow::Break => {}
                other => {
                    join_into(&mut left, self.analysis.snapshot());
                    leaving = Some(leaving.map_or(other, |flow: Flow| flow.either(other)));
                }
            }
            if let Some(breaks) = context.and_then(|context| context.breaks) {
                join_into(&mut exits, breaks);
            }
        }

        self.emit(StepKind::SwitchEnd { switch_id }, node.span().end_line);
        match exits {
            Some(mut state) => {
                if let Some(left) = &left {
                    state.merge_return(left);
                }
                self.analysis.restore(state);
                Flow::Normal
            }
            None => {
                if let Some(left) = left {
                    self.analysis.restore(left);
                }
                leaving.unwrap_or(Flow::Normal)
            }
        }
    }

    fn unroll_return(&mut self, node: &'a N) -> Flow {
        let (value, source) = match node.child_at(0) {
            Some(expr) => {
                let expr = self.lower_value(expr, None);
                (self.analysis.evaluate(&expr), Some(expr))
            }
            None => (SymbolicValue::Uninitialized, None),
        };
        let activation = self.activations.last().copied().unwrap_or_default();
        if !self.analysis.is_unreachable() {
            self.analysis.set_return(value.clone());
        }
        self.emit_at(
            StepKind::Return {
                activation,
                value: value.detached(),
                source,
            },
            node,
        );
        Flow::Return
    }

    /// `break` / `continue`. Only conditional jumps need a step: an
    /// unconditional one just ends unrolling of the enclosing construct.
    fn unroll_jump(&mut self, node: &'a N, flow: Flow) -> Flow {
        let state = self.analysis.snapshot();
        let context = match flow {
            Flow::Continue => self
                .jumps
                .iter_mut()
                .rev()
                .find(|context| context.scope == JumpScope::Loop),
            _ => self.jumps.last_mut(),
        };
        let Some(context) = context else {
            debug!(line = node.span().start_line, "jump outside of any loop or switch");
            return Flow::Normal;
        };
        let (target, conditional) = (context.id, self.tags.len() > context.tag_depth);
        match flow {
            Flow::Continue => join_into(&mut context.continues, state),
            _ => join_into(&mut context.breaks, state),
        }
        if conditional {
            let kind = match flow {
                Flow::Continue => StepKind::Continue { target },
                _ => StepKind::Break { target },
            };
            self.emit_at(kind, node);
        }
        flow
    }

    /// `target = value` or `target op= value`; returns the lvalue
    pub(crate) fn unroll_assignment(&mut self, node: &'a N) -> Expr {
        let (Some(left), Some(right)) = (node.child_by_field("left"), node.child_by_field("right"))
        else {
            return Expr::opaque(node.text());
        };
        let operator = node
            .child_by_field("operator")
            .map(|op| op.text())
            .unwrap_or("=");
        let target = self.lower_expr(left);
        let compound = BinaryOp::from_compound(operator);

        if compound.is_none() && right.node_kind() == NodeKind::CallExpression {
            if let Some(name) = target.as_var() {
                let return_target = ReturnTarget {
                    name: name.to_string(),
                    declared: None,
                };
                if let Some(result) = self.unroll_call(right, Some(return_target)) {
                    let value = self.analysis.evaluate(&result);
                    self.analysis.assign(&target, value);
                    return target;
                }
            }
        }

        let declared = target
            .as_var()
            .and_then(|name| self.analysis.binding_type(name))
            .cloned();
        let rhs = self.lower_value(right, declared.as_ref());
        let source = match compound {
            Some(op) => Expr::binary(op, target.clone(), rhs),
            None => rhs,
        };
        self.store(&target, source, node);
        target
    }

    /// `x++`, `--x`, `p->count++`. Yields the value the expression has.
    pub(crate) fn unroll_update(&mut self, node: &'a N) -> Expr {
        let Some(argument) = node.child_by_field("argument") else {
            return Expr::opaque(node.text());
        };
        let operator = node
            .child_by_field("operator")
            .map(|op| op.text())
            .unwrap_or("++");
        let prefix = node.text().starts_with(operator);
        let (delta, op, undo) = if operator == "--" {
            (-1, BinaryOp::Sub, BinaryOp::Add)
        } else {
            (1, BinaryOp::Add, BinaryOp::Sub)
        };

        let target = self.lower_expr(argument);
        let stepped = Expr::binary(op, target.clone(), Expr::number(1));
        match target.as_var() {
            Some(name) => {
                let value = self.analysis.evaluate(&stepped);
                self.emit_at(
                    StepKind::PointerStep {
                        target: name.to_string(),
                        delta,
                    },
                    node,
                );
                self.analysis.assign(&target, value);
            }
            None => self.store(&target, stepped, node),
        }

        if prefix {
            target
        } else {
            Expr::binary(undo, target, Expr::number(1))
        }
    }

    /// Emit the store step matching the shape of `target`
    fn store(&mut self, target: &Expr, source: Expr, node: &'a N) {
        let value = self.analysis.evaluate(&source);
        let kind = match target {
            Expr::Var { name } => StepKind::BindVariable {
                name: name.clone(),
                declared: None,
                value: value.detached(),
                source: Some(source),
            },
            Expr::Deref { pointer } => StepKind::DerefStore {
                pointer: (**pointer).clone(),
                value: value.detached(),
                source: Some(source),
            },
            Expr::Index { base, index } => StepKind::ArrayStore {
                array: (**base).clone(),
                index: (**index).clone(),
                value: value.detached(),
                source: Some(source),
            },
            Expr::Field { base, field, arrow } => StepKind::SetField {
                base: (**base).clone(),
                through_pointer: *arrow,
                field: field.clone(),
                value: value.detached(),
                source: Some(source),
            },
            other => {
                debug!(target = %other, "unsupported assignment target");
                return;
            }
        };
        self.emit_at(kind, node);
        self.analysis.assign(target, value);
    }
}

/// Statements of a case clause, without its label
fn case_body<N: SyntaxNode>(case: &N) -> impl Iterator<Item = &N> {
    let label = case.child_by_field("value");
    case.children()
        .filter(move |child| !label.is_some_and(|l| ptr::eq(*child, l)))
}

fn is_expression(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::AssignmentExpression
            | NodeKind::UpdateExpression
            | NodeKind::CallExpression
            | NodeKind::BinaryExpression
            | NodeKind::CommaExpression
            | NodeKind::ParenthesizedExpression
    )
}

#[cfg(test)]
mod tests {
    use crate::memory::value::SymbolicValue;
    use crate::parser::parse;
    use crate::trace::{BranchLabel, Expr, StepKind, Trace};
    use crate::unroller::unroll;

    fn unroll_source(source: &str) -> Trace {
        unroll(&parse(source).unwrap())
    }

    #[test]
    fn test_assignment_shapes() {
        let trace = unroll_source(
            "struct P {\n    int v;\n};\nint main() {\n    int a[2] = {0, 0};\n    int x = 1;\n    int *p = &x;\n    struct P s;\n    *p = 5;\n    a[1] = 3;\n    s.v = 2;\n    x += 4;\n    return x;\n}\n",
        );
        let stores: Vec<&StepKind> = trace
            .iter()
            .map(|step| &step.kind)
            .filter(|kind| {
                matches!(
                    kind,
                    StepKind::DerefStore { .. }
                        | StepKind::ArrayStore { .. }
                        | StepKind::SetField { .. }
                        | StepKind::BindVariable { declared: None, .. }
                )
            })
            .collect();
        assert_eq!(stores.len(), 4);
        assert!(matches!(stores[0], StepKind::DerefStore { pointer: Expr::Var { .. }, .. }));
        assert!(matches!(stores[1], StepKind::ArrayStore { .. }));
        assert!(matches!(stores[2], StepKind::SetField { through_pointer: false, .. }));
        match stores[3] {
            StepKind::BindVariable { value, source, .. } => {
                assert_eq!(value, &SymbolicValue::number(9));
                assert!(matches!(source, Some(Expr::Binary { .. })));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_postfix_in_expression_uses_old_value() {
        let trace = unroll_source(
            "int main() {\n    int i = 3;\n    int j = i++;\n    return j;\n}\n",
        );
        let returned = trace.iter().find_map(|step| match &step.kind {
            StepKind::Return { value, .. } => Some(value.clone()),
            _ => None,
        });
        assert_eq!(returned, Some(SymbolicValue::number(3)));
    }

    #[test]
    fn test_switch_cases_are_tagged() {
        let trace = unroll_source(
            "int main() {\n    int x = 2;\n    int y = 0;\n    switch (x) {\n        case 1:\n            y = 10;\n            break;\n        case 2:\n            y = 20;\n            break;\n        default:\n            y = 30;\n    }\n    return y;\n}\n",
        );
        let branch = trace
            .iter()
            .position(|step| matches!(step.kind, StepKind::Branch { .. }))
            .unwrap();
        match &trace.steps()[branch].kind {
            StepKind::Branch {
                cases, has_default, ..
            } => {
                assert_eq!(cases, &vec![1, 2]);
                assert!(*has_default);
            }
            other => panic!("unexpected step {:?}", other),
        }
        let labels: Vec<BranchLabel> = trace
            .iter()
            .filter(|step| matches!(step.kind, StepKind::BindVariable { declared: None, .. }))
            .map(|step| step.tags[0].label)
            .collect();
        assert_eq!(
            labels,
            vec![
                BranchLabel::Case(1),
                BranchLabel::Case(2),
                BranchLabel::CaseDefault
            ]
        );
        let returned = trace.iter().find_map(|step| match &step.kind {
            StepKind::Return { value, .. } => Some(value.clone()),
            _ => None,
        });
        assert_eq!(returned, Some(SymbolicValue::number(20)));
        // breaks at the top of a case are implied by the case structure
        assert!(!trace.iter().any(|step| matches!(step.kind, StepKind::Break { .. })));
    }

    #[test]
    fn test_switch_fallthrough_repeats_later_cases() {
        let trace = unroll_source(
            "int main() {\n    int x = 1;\n    int y = 0;\n    switch (x) {\n        case 1:\n            y += 1;\n        case 2:\n            y += 2;\n    }\n    return y;\n}\n",
        );
        let updates = trace
            .iter()
            .filter(|step| matches!(step.kind, StepKind::BindVariable { declared: None, .. }))
            .count();
        // case 1 runs both bodies, case 2 only its own
        assert_eq!(updates, 3);
        let returned = trace.iter().find_map(|step| match &step.kind {
            StepKind::Return { value, .. } => Some(value.clone()),
            _ => None,
        });
        assert_eq!(returned, Some(SymbolicValue::number(3)));
    }
}
