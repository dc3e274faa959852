//! The linear step trace shared by the unroller and executor
//!
//! - [`step`]: [`ExecutionStep`] records, their kinds and branch tags
//! - [`expr`]: structural expressions carried inside step payloads
//!
//! A [`Trace`] is produced once per syntax tree and never mutated afterwards.
//! Cloning is cheap; the executor and the UI share one step list.

pub mod expr;
pub mod step;

pub use expr::{BinaryOp, Expr, UnaryOp};
pub use step::{BlockId, BranchKind, BranchLabel, BranchTag, ExecutionStep, ReturnTarget, StepKind};

use crate::memory::types::RecordTable;
use std::sync::Arc;

/// Position of a step in its trace
pub type StepIndex = usize;

/// Immutable step list plus the struct layouts its types refer to
#[derive(Debug, Clone)]
pub struct Trace {
    steps: Arc<[ExecutionStep]>,
    records: Arc<RecordTable>,
}

impl Trace {
    pub fn new(steps: Vec<ExecutionStep>, records: RecordTable) -> Self {
        Trace {
            steps: steps.into(),
            records: Arc::new(records),
        }
    }

    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    pub fn get(&self, index: StepIndex) -> Option<&ExecutionStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn records(&self) -> &RecordTable {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionStep> {
        self.steps.iter()
    }
}
