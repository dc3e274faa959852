// Inlining calls to user-defined functions

use super::declarations::declarators;
use super::expressions::{call_arguments, callee_name};
use super::Unroller;
use crate::memory::value::SymbolicValue;
use crate::parser::{NodeKind, SyntaxNode};
use crate::trace::{Expr, ReturnTarget, StepKind};
use std::mem;
use tracing::debug;

/// Formal parameters of a function definition
fn parameters<N: SyntaxNode>(definition: &N) -> Vec<&N> {
    let mut declarator = definition.child_by_field("declarator");
    while let Some(node) = declarator {
        if node.node_kind() == NodeKind::FunctionDeclarator {
            return node
                .child_by_field("parameters")
                .map(|params| params.children().collect())
                .unwrap_or_default();
        }
        declarator = node.child_by_field("declarator");
    }
    Vec::new()
}

impl<'a, N: SyntaxNode> Unroller<'a, N> {
    /// Inline a call to a defined function.
    ///
    /// Returns `None` without emitting anything when the callee is not
    /// defined, the call depth ceiling is reached or analysis has ruled the
    /// call site out; the caller then treats the call as opaque text.
    pub(crate) fn unroll_call(&mut self, node: &'a N, target: Option<ReturnTarget>) -> Option<Expr> {
        let function = callee_name(node)?;
        let definition = *self.functions.get(&function)?;
        if self.call_depth >= self.limits.max_call_depth {
            debug!(function = %function, depth = self.call_depth, "call depth ceiling reached");
            return None;
        }
        if self.analysis.is_unreachable() {
            debug!(function = %function, "call on an unreachable path left opaque");
            return None;
        }

        let arguments: Vec<Expr> = call_arguments(node)
            .into_iter()
            .map(|arg| {
                let arg = self.lower_expr(arg);
                self.decay(arg)
            })
            .collect();
        let values: Vec<SymbolicValue> = arguments
            .iter()
            .map(|arg| self.analysis.evaluate(arg))
            .collect();

        let call_id = self.steps.len();
        self.emit_at(
            StepKind::CallEnter {
                function: function.clone(),
                call_id,
                arguments: arguments.clone(),
                values: values.iter().map(SymbolicValue::detached).collect(),
            },
            node,
        );
        debug!(function = %function, call_id, depth = self.call_depth + 1, "inlining call");

        let caller_return = self.analysis.take_return();
        let caller_jumps = mem::take(&mut self.jumps);
        self.analysis.push_frame(&function);
        self.activations.push(call_id);
        self.call_depth += 1;

        for (position, param) in parameters(definition).into_iter().enumerate() {
            // missing arguments leave the parameter unbound
            let Some(value) = values.get(position) else {
                break;
            };
            let base = param
                .child_by_field("type")
                .map(|t| t.text().to_string())
                .unwrap_or_default();
            let Some(declarator) = declarators(param).next() else {
                continue;
            };
            let Some((name, declared)) = self.declared_type(&base, declarator) else {
                continue;
            };
            let declared = declared.decayed();
            self.analysis.declare(&name, value.clone(), declared.clone());
            self.emit(
                StepKind::ParamBind {
                    name,
                    declared,
                    position,
                    value: value.detached(),
                },
                param.span().start_line,
            );
        }

        if let Some(body) = definition.child_by_field("body") {
            self.unroll_statement(body);
        }

        let result = self
            .analysis
            .take_return()
            .unwrap_or_else(SymbolicValue::unknown);
        self.call_depth -= 1;
        self.activations.pop();
        self.analysis.pop_frame();
        // the call site was reachable, whatever the callee's last path was
        self.analysis.set_unreachable(false);
        self.jumps = caller_jumps;
        if let Some(value) = caller_return {
            self.analysis.set_return(value);
        }

        self.analysis.record_call_result(call_id, result);
        self.emit_at(
            StepKind::CallReturn {
                function,
                call_id,
                target,
            },
            node,
        );
        Some(Expr::CallResult { call_id })
    }
}
