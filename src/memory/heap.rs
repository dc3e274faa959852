//! Heap model
//!
//! Cells are keyed by their [`HeapToken`]. There is no deallocation: `free`
//! and `delete` are accepted by the unroller but leave cells in place.

use super::types::CType;
use super::value::{HeapToken, SymbolicValue};
use rustc_hash::FxHashMap;

/// An allocated heap cell
#[derive(Debug, Clone, PartialEq)]
pub struct HeapCell {
    pub address: HeapToken,
    pub declared_type: CType,
    pub value: SymbolicValue,
}

/// The heap
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Heap {
    cells: FxHashMap<HeapToken, HeapCell>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cell: HeapCell) {
        self.cells.insert(cell.address, cell);
    }

    pub fn get(&self, address: HeapToken) -> Option<&HeapCell> {
        self.cells.get(&address)
    }

    pub fn get_mut(&mut self, address: HeapToken) -> Option<&mut HeapCell> {
        self.cells.get_mut(&address)
    }

    pub fn value(&self, address: HeapToken) -> Option<&SymbolicValue> {
        self.cells.get(&address).map(|cell| &cell.value)
    }

    /// Replace a cell's whole value; `false` if no such cell
    pub fn update(&mut self, address: HeapToken, value: SymbolicValue) -> bool {
        match self.cells.get_mut(&address) {
            Some(cell) => {
                cell.value = value;
                true
            }
            None => false,
        }
    }

    /// Merge a single field into a cell's record value
    pub fn set_field(&mut self, address: HeapToken, field: &str, value: SymbolicValue) -> bool {
        match self.cells.get_mut(&address) {
            Some(cell) => {
                cell.value.set_field(field, value);
                true
            }
            None => false,
        }
    }

    /// Cells ordered by address
    pub fn cells(&self) -> Vec<&HeapCell> {
        let mut cells: Vec<&HeapCell> = self.cells.values().collect();
        cells.sort_by_key(|cell| cell.address);
        cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_and_set_field() {
        let mut heap = Heap::new();
        heap.insert(HeapCell {
            address: 0x1000_0000,
            declared_type: CType::scalar("int"),
            value: SymbolicValue::number(42),
        });

        assert!(heap.update(0x1000_0000, SymbolicValue::number(100)));
        assert_eq!(heap.value(0x1000_0000), Some(&SymbolicValue::number(100)));
        assert!(!heap.update(0x2000_0000, SymbolicValue::number(1)));

        heap.insert(HeapCell {
            address: 0x1000_0004,
            declared_type: CType::scalar("Node"),
            value: SymbolicValue::Uninitialized,
        });
        assert!(heap.set_field(0x1000_0004, "val", SymbolicValue::number(3)));
        assert_eq!(
            heap.value(0x1000_0004).and_then(|v| v.field("val")),
            Some(&SymbolicValue::number(3))
        );
    }

    #[test]
    fn test_cells_sorted_by_address() {
        let mut heap = Heap::new();
        for address in [0x1000_0008, 0x1000_0000, 0x1000_0004] {
            heap.insert(HeapCell {
                address,
                declared_type: CType::scalar("int"),
                value: SymbolicValue::number(0),
            });
        }
        let addresses: Vec<u64> = heap.cells().iter().map(|c| c.address).collect();
        assert_eq!(addresses, [0x1000_0000, 0x1000_0004, 0x1000_0008]);
    }
}
