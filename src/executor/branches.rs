// Runtime branch decisions and jump suppression

use crate::trace::{BlockId, BranchLabel, BranchTag, StepIndex, StepKind};
use rustc_hash::FxHashMap;

/// Label selected by each applied decision step. `None` means the decision
/// was made and selected nothing (false loop check, unmatched switch).
#[derive(Debug, Clone, Default)]
pub struct Decisions {
    selected: FxHashMap<StepIndex, Option<BranchLabel>>,
}

impl Decisions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the first decision for `owner`; later ones are ignored
    pub fn record(&mut self, owner: StepIndex, label: Option<BranchLabel>) {
        self.selected.entry(owner).or_insert(label);
    }

    pub fn selected(&self, owner: StepIndex) -> Option<Option<BranchLabel>> {
        self.selected.get(&owner).copied()
    }

    /// A tag is satisfied only when its owner was decided with its label
    pub fn satisfies(&self, tag: &BranchTag) -> bool {
        self.selected(tag.owner) == Some(Some(tag.label))
    }

    pub fn allows(&self, tags: &[BranchTag]) -> bool {
        tags.iter().all(|tag| self.satisfies(tag))
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }
}

/// Steps skipped after a taken `return`, `break` or `continue`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// Until the activation's frame is popped
    Return { activation: StepIndex },
    /// Until the loop or switch ends
    Break { target: BlockId },
    /// Until the current iteration's exit
    Continue { target: BlockId },
}

impl Suppression {
    /// Whether `kind` is the step where normal execution resumes
    pub fn ends_at(&self, kind: &StepKind) -> bool {
        match (self, kind) {
            (Suppression::Return { activation }, StepKind::FramePop { activation: popped, .. }) => {
                activation == popped
            }
            (Suppression::Return { activation }, StepKind::CallReturn { call_id, .. }) => {
                activation == call_id
            }
            (Suppression::Break { target }, StepKind::LoopEnd { loop_id }) => target == loop_id,
            (Suppression::Break { target }, StepKind::SwitchEnd { switch_id }) => {
                target == switch_id
            }
            (Suppression::Continue { target }, StepKind::LoopExit { loop_id, .. }) => {
                target == loop_id
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undecided_owner_suppresses() {
        let mut decisions = Decisions::new();
        let tag = BranchTag {
            owner: 3,
            label: BranchLabel::Then,
        };
        assert!(!decisions.allows(&[tag]));
        decisions.record(3, Some(BranchLabel::Else));
        assert!(!decisions.allows(&[tag]));
        assert!(decisions.allows(&[]));
    }

    #[test]
    fn test_first_decision_wins() {
        let mut decisions = Decisions::new();
        decisions.record(1, Some(BranchLabel::Iterate));
        decisions.record(1, None);
        assert_eq!(decisions.selected(1), Some(Some(BranchLabel::Iterate)));
    }

    #[test]
    fn test_continue_ends_at_its_loop_exit() {
        let suppression = Suppression::Continue { target: 2 };
        assert!(!suppression.ends_at(&StepKind::LoopExit {
            loop_id: 1,
            iteration: 0
        }));
        assert!(suppression.ends_at(&StepKind::LoopExit {
            loop_id: 2,
            iteration: 4
        }));
        assert!(!suppression.ends_at(&StepKind::LoopEnd { loop_id: 2 }));
    }
}
