//! Execution step records

use super::expr::Expr;
use super::StepIndex;
use crate::memory::types::CType;
use crate::memory::value::{HeapToken, SymbolicValue};
use serde::Serialize;
use std::fmt;

/// Identity of one unrolled loop or switch instance, the target of
/// `break`/`continue`
pub type BlockId = usize;

/// Branch a tagged step belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchLabel {
    Then,
    Else,
    Case(i64),
    CaseDefault,
    Iterate,
}

impl fmt::Display for BranchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchLabel::Then => write!(f, "then"),
            BranchLabel::Else => write!(f, "else"),
            BranchLabel::Case(value) => write!(f, "case-{}", value),
            BranchLabel::CaseDefault => write!(f, "case-default"),
            BranchLabel::Iterate => write!(f, "iterate"),
        }
    }
}

/// Marks a step live only when decision `owner` selected `label`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BranchTag {
    pub owner: StepIndex,
    pub label: BranchLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    If,
    Switch,
}

/// Variable a call's return value is written into
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnTarget {
    pub name: String,
    /// Present when the call initializes a new declaration
    pub declared: Option<CType>,
}

/// What a step does
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepKind {
    FramePush {
        function: String,
        activation: StepIndex,
    },
    FramePop {
        function: String,
        activation: StepIndex,
    },
    /// Declaration when `declared` is set, plain assignment otherwise
    BindVariable {
        name: String,
        declared: Option<CType>,
        value: SymbolicValue,
        source: Option<Expr>,
    },
    CallEnter {
        function: String,
        call_id: StepIndex,
        arguments: Vec<Expr>,
        values: Vec<SymbolicValue>,
    },
    ParamBind {
        name: String,
        declared: CType,
        position: usize,
        value: SymbolicValue,
    },
    CallReturn {
        function: String,
        call_id: StepIndex,
        target: Option<ReturnTarget>,
    },
    AllocateHeap {
        token: HeapToken,
        declared_type: CType,
        value: SymbolicValue,
        source: Option<Expr>,
    },
    /// `base.field = v`, or `base->field = v` when `through_pointer`
    SetField {
        base: Expr,
        through_pointer: bool,
        field: String,
        value: SymbolicValue,
        source: Option<Expr>,
    },
    /// `*pointer = v`, one level of indirection
    DerefStore {
        pointer: Expr,
        value: SymbolicValue,
        source: Option<Expr>,
    },
    ArrayStore {
        array: Expr,
        index: Expr,
        value: SymbolicValue,
        source: Option<Expr>,
    },
    /// `target++` / `target--`
    PointerStep {
        target: String,
        delta: i64,
    },
    Branch {
        kind: BranchKind,
        condition: Expr,
        /// Switch case values present in the source
        cases: Vec<i64>,
        has_default: bool,
    },
    LoopCheck {
        loop_id: BlockId,
        iteration: usize,
        condition: Expr,
    },
    LoopEnter {
        loop_id: BlockId,
        iteration: usize,
    },
    LoopExit {
        loop_id: BlockId,
        iteration: usize,
    },
    LoopEnd {
        loop_id: BlockId,
    },
    SwitchEnd {
        switch_id: BlockId,
    },
    Break {
        target: BlockId,
    },
    Continue {
        target: BlockId,
    },
    Return {
        activation: StepIndex,
        value: SymbolicValue,
        source: Option<Expr>,
    },
    LogOutput {
        template: String,
        arguments: Vec<Expr>,
    },
}

/// One replayable unit of the trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionStep {
    pub kind: StepKind,
    /// 1-based source line
    pub line: usize,
    pub tags: Vec<BranchTag>,
}

impl ExecutionStep {
    /// Short human readable description for listings and the status bar
    pub fn describe(&self) -> String {
        match &self.kind {
            StepKind::FramePush { function, .. } => format!("enter {}", function),
            StepKind::FramePop { function, .. } => format!("leave {}", function),
            StepKind::BindVariable {
                name,
                declared: Some(ty),
                value,
                ..
            } => format!("declare {} {} = {}", ty, name, value),
            StepKind::BindVariable { name, value, .. } => format!("{} = {}", name, value),
            StepKind::CallEnter {
                function, values, ..
            } => {
                let args: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                format!("call {}({})", function, args.join(", "))
            }
            StepKind::ParamBind {
                name,
                declared,
                value,
                ..
            } => format!("param {} {} = {}", declared, name, value),
            StepKind::CallReturn {
                function,
                target: Some(target),
                ..
            } => format!("{} = return of {}", target.name, function),
            StepKind::CallReturn { function, .. } => format!("return from {}", function),
            StepKind::AllocateHeap {
                token,
                declared_type,
                value,
                ..
            } => format!("allocate {} at {:#010x} = {}", declared_type, token, value),
            StepKind::SetField {
                base,
                through_pointer,
                field,
                value,
                ..
            } => format!(
                "{}{}{} = {}",
                base,
                if *through_pointer { "->" } else { "." },
                field,
                value
            ),
            StepKind::DerefStore { pointer, value, .. } => format!("*{} = {}", pointer, value),
            StepKind::ArrayStore {
                array,
                index,
                value,
                ..
            } => format!("{}[{}] = {}", array, index, value),
            StepKind::PointerStep { target, delta } => {
                format!("{}{}", target, if *delta > 0 { "++" } else { "--" })
            }
            StepKind::Branch {
                kind: BranchKind::If,
                condition,
                ..
            } => format!("if {}", condition),
            StepKind::Branch { condition, .. } => format!("switch {}", condition),
            StepKind::LoopCheck {
                iteration,
                condition,
                ..
            } => format!("loop check #{}: {}", iteration, condition),
            StepKind::LoopEnter { iteration, .. } => format!("iteration #{}", iteration),
            StepKind::LoopExit { iteration, .. } => format!("end of iteration #{}", iteration),
            StepKind::LoopEnd { .. } => "loop done".to_string(),
            StepKind::SwitchEnd { .. } => "switch done".to_string(),
            StepKind::Break { .. } => "break".to_string(),
            StepKind::Continue { .. } => "continue".to_string(),
            StepKind::Return { value, .. } => format!("return {}", value),
            StepKind::LogOutput { template, .. } => format!("output {:?}", template),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_display() {
        assert_eq!(BranchLabel::Case(3).to_string(), "case-3");
        assert_eq!(BranchLabel::CaseDefault.to_string(), "case-default");
        assert_eq!(BranchLabel::Iterate.to_string(), "iterate");
    }

    #[test]
    fn test_describe() {
        let step = ExecutionStep {
            kind: StepKind::BindVariable {
                name: "ptr".to_string(),
                declared: Some(CType::pointer_to("int", 1)),
                value: SymbolicValue::variable_ref("x"),
                source: None,
            },
            line: 3,
            tags: Vec::new(),
        };
        assert_eq!(step.describe(), "declare int* ptr = &x");
    }
}
