//! Effect notifications sent by the executor
//!
//! The executor mutates its own [`Memory`](crate::memory::Memory) and reports
//! every primitive change to an [`EffectSink`]. Sinks are fire-and-forget:
//! they cannot fail or influence execution.

use crate::memory::types::CType;
use crate::memory::value::{HeapToken, SymbolicValue};
use serde::Serialize;
use std::fmt;

/// Coarse state of a run, shown in the status bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Stepping,
    Playing,
    Paused,
    Finished,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunStatus::Idle => "idle",
            RunStatus::Stepping => "stepping",
            RunStatus::Playing => "playing",
            RunStatus::Paused => "paused",
            RunStatus::Finished => "finished",
            RunStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", text)
    }
}

/// Receiver of primitive state changes
pub trait EffectSink {
    /// Forget everything; a replay from step zero follows
    fn reset(&mut self);
    fn set_status(&mut self, status: RunStatus);
    fn push_frame(&mut self, name: &str);
    fn pop_frame(&mut self);
    /// A binding was created or changed. `address` identifies the binding
    /// across frames.
    fn set_variable(&mut self, name: &str, value: &SymbolicValue, declared_type: &CType, address: u64);
    fn allocate_heap(&mut self, address: HeapToken, value: &SymbolicValue);
    fn update_heap(&mut self, address: HeapToken, value: &SymbolicValue);
    fn log_output(&mut self, text: &str);
}

/// One recorded notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    Reset,
    Status {
        status: RunStatus,
    },
    PushFrame {
        name: String,
    },
    PopFrame,
    SetVariable {
        name: String,
        value: SymbolicValue,
        declared_type: CType,
        address: u64,
    },
    AllocateHeap {
        address: HeapToken,
        value: SymbolicValue,
    },
    UpdateHeap {
        address: HeapToken,
        value: SymbolicValue,
    },
    LogOutput {
        text: String,
    },
}

/// Sink that keeps every notification in order
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    effects: Vec<Effect>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Effects since the most recent reset
    pub fn since_reset(&self) -> &[Effect] {
        let start = self
            .effects
            .iter()
            .rposition(|effect| *effect == Effect::Reset)
            .map_or(0, |index| index + 1);
        &self.effects[start..]
    }

    /// Console text produced since the most recent reset
    pub fn output(&self) -> String {
        self.since_reset()
            .iter()
            .filter_map(|effect| match effect {
                Effect::LogOutput { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }
}

impl EffectSink for RecordingSink {
    fn reset(&mut self) {
        self.effects.push(Effect::Reset);
    }

    fn set_status(&mut self, status: RunStatus) {
        self.effects.push(Effect::Status { status });
    }

    fn push_frame(&mut self, name: &str) {
        self.effects.push(Effect::PushFrame {
            name: name.to_string(),
        });
    }

    fn pop_frame(&mut self) {
        self.effects.push(Effect::PopFrame);
    }

    fn set_variable(&mut self, name: &str, value: &SymbolicValue, declared_type: &CType, address: u64) {
        self.effects.push(Effect::SetVariable {
            name: name.to_string(),
            value: value.clone(),
            declared_type: declared_type.clone(),
            address,
        });
    }

    fn allocate_heap(&mut self, address: HeapToken, value: &SymbolicValue) {
        self.effects.push(Effect::AllocateHeap {
            address,
            value: value.clone(),
        });
    }

    fn update_heap(&mut self, address: HeapToken, value: &SymbolicValue) {
        self.effects.push(Effect::UpdateHeap {
            address,
            value: value.clone(),
        });
    }

    fn log_output(&mut self, text: &str) {
        self.effects.push(Effect::LogOutput {
            text: text.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_since_reset() {
        let mut sink = RecordingSink::new();
        sink.log_output("old\n");
        sink.reset();
        sink.log_output("a");
        sink.push_frame("main");
        sink.log_output("b\n");
        assert_eq!(sink.output(), "ab\n");
        assert_eq!(sink.since_reset().len(), 3);
    }
}
