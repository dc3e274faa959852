// View state rebuilt from executor effects

use crate::executor::sink::{EffectSink, RunStatus};
use crate::memory::types::CType;
use crate::memory::value::{HeapToken, SymbolicValue};
use tracing::debug;

/// Mock terminal for capturing program output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockTerminal {
    text: String,
}

impl MockTerminal {
    pub fn new() -> Self {
        MockTerminal {
            text: String::new(),
        }
    }

    /// Print without implicit newline
    pub fn print(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Everything printed so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True when the last printed line has not been terminated yet
    pub fn has_open_line(&self) -> bool {
        !self.text.is_empty() && !self.text.ends_with('\n')
    }

    /// Output split into display lines
    pub fn get_output(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.text.split('\n').map(str::to_string).collect();
        // text that ended with a newline leaves an empty last piece
        if lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        lines
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualVariable {
    pub name: String,
    pub value: SymbolicValue,
    pub declared_type: CType,
    pub address: u64,
}

/// One call frame as displayed
#[derive(Debug, Clone, PartialEq)]
pub struct VisualFrame {
    pub function_name: String,
    /// Declaration order
    pub variables: Vec<VisualVariable>,
}

impl VisualFrame {
    fn new(function_name: &str) -> Self {
        VisualFrame {
            function_name: function_name.to_string(),
            variables: Vec::new(),
        }
    }

    pub fn variable(&self, name: &str) -> Option<&VisualVariable> {
        self.variables.iter().find(|variable| variable.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualHeapCell {
    pub address: HeapToken,
    pub value: SymbolicValue,
}

/// What the panes render: frames, heap cells, console output and run status
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualState {
    frames: Vec<VisualFrame>,
    heap: Vec<VisualHeapCell>,
    terminal: MockTerminal,
    status: RunStatus,
}

impl VisualState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames, outermost first
    pub fn frames(&self) -> &[VisualFrame] {
        &self.frames
    }

    /// Heap cells in allocation order
    pub fn heap(&self) -> &[VisualHeapCell] {
        &self.heap
    }

    pub fn terminal(&self) -> &MockTerminal {
        &self.terminal
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Innermost binding of `name` across all frames
    pub fn variable(&self, name: &str) -> Option<&VisualVariable> {
        self.frames.iter().rev().find_map(|frame| frame.variable(name))
    }

    pub fn heap_cell(&self, address: HeapToken) -> Option<&VisualHeapCell> {
        self.heap.iter().find(|cell| cell.address == address)
    }
}

impl EffectSink for VisualState {
    fn reset(&mut self) {
        *self = VisualState::default();
    }

    fn set_status(&mut self, status: RunStatus) {
        self.status = status;
    }

    fn push_frame(&mut self, name: &str) {
        self.frames.push(VisualFrame::new(name));
    }

    fn pop_frame(&mut self) {
        self.frames.pop();
    }

    fn set_variable(&mut self, name: &str, value: &SymbolicValue, declared_type: &CType, address: u64) {
        // the owning frame is the one already holding this address
        let existing = self.frames.iter_mut().rev().find_map(|frame| {
            frame
                .variables
                .iter_mut()
                .find(|variable| variable.address == address && variable.name == name)
        });
        if let Some(variable) = existing {
            variable.value = value.clone();
            variable.declared_type = declared_type.clone();
            return;
        }
        match self.frames.last_mut() {
            Some(frame) => frame.variables.push(VisualVariable {
                name: name.to_string(),
                value: value.clone(),
                declared_type: declared_type.clone(),
                address,
            }),
            None => debug!(name, "variable set with no visible frame"),
        }
    }

    fn allocate_heap(&mut self, address: HeapToken, value: &SymbolicValue) {
        match self.heap.iter_mut().find(|cell| cell.address == address) {
            Some(cell) => cell.value = value.clone(),
            None => self.heap.push(VisualHeapCell {
                address,
                value: value.clone(),
            }),
        }
    }

    fn update_heap(&mut self, address: HeapToken, value: &SymbolicValue) {
        match self.heap.iter_mut().find(|cell| cell.address == address) {
            Some(cell) => cell.value = value.clone(),
            None => {
                debug!(address, "update of unknown heap cell");
                self.allocate_heap(address, value);
            }
        }
    }

    fn log_output(&mut self, text: &str) {
        self.terminal.print(text);
    }
}
