//! Mock address generation
//!
//! Stack and heap use disjoint numeric ranges so the UI can tell them apart
//! at a glance. The allocator is a plain value: a fresh one always yields the
//! same sequence, which keeps replays reproducible.

use super::value::HeapToken;
use crate::constants::{HEAP_ADDRESS_START, STACK_ADDRESS_START};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressAllocator {
    next_stack: u64,
    next_heap: u64,
}

impl AddressAllocator {
    pub fn new() -> Self {
        AddressAllocator {
            next_stack: STACK_ADDRESS_START,
            next_heap: HEAP_ADDRESS_START,
        }
    }

    /// Reserve `size` bytes of stack and return the start address
    pub fn allocate_stack(&mut self, size: usize) -> u64 {
        let address = self.next_stack;
        self.next_stack += size.max(1) as u64;
        address
    }

    /// Reserve `size` bytes of heap and return the cell's token
    pub fn allocate_heap(&mut self, size: usize) -> HeapToken {
        let token = self.next_heap;
        self.next_heap += size.max(1) as u64;
        token
    }
}

impl Default for AddressAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_are_disjoint_and_monotonic() {
        let mut allocator = AddressAllocator::new();
        assert_eq!(allocator.allocate_stack(4), 0x4);
        assert_eq!(allocator.allocate_stack(8), 0x8);
        assert_eq!(allocator.allocate_stack(1), 0x10);
        assert_eq!(allocator.allocate_heap(4), 0x1000_0000);
        assert_eq!(allocator.allocate_heap(12), 0x1000_0004);
        assert_eq!(allocator.allocate_heap(0), 0x1000_0010);
    }

    #[test]
    fn test_fresh_allocators_agree() {
        let mut a = AddressAllocator::new();
        let mut b = AddressAllocator::new();
        let first: Vec<u64> = (0..5).map(|i| a.allocate_stack(i)).collect();
        let second: Vec<u64> = (0..5).map(|i| b.allocate_stack(i)).collect();
        assert_eq!(first, second);
    }
}
