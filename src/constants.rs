// Defaults shared by the unroller, executor and UI

/// Starting address for heap allocations
/// Heap addresses start at 0x10000000 to clearly distinguish them from stack addresses
pub const HEAP_ADDRESS_START: u64 = 0x1000_0000;

/// Starting address for stack variable addresses
pub const STACK_ADDRESS_START: u64 = 0x0000_0004;

/// Name of the frame that holds file-scope declarations
pub const GLOBAL_FRAME: &str = "<global>";

/// Iterations unrolled per loop before the trace is truncated
pub const DEFAULT_MAX_LOOP_ITERATIONS: usize = 10;

/// Nested call depth unrolled before further calls are dropped
pub const DEFAULT_MAX_CALL_DEPTH: usize = 20;

/// Element size used by `sizeof` on declared arrays
pub const ARRAY_ELEMENT_SIZE: usize = 4;

/// Pointer width in bytes
pub const POINTER_SIZE: usize = 8;

/// Delay between steps during autoplay
pub const DEFAULT_PLAYBACK_DELAY_MS: u64 = 500;

/// Largest number of array elements the unroller materializes; longer
/// arrays are truncated to this length
pub const MAX_MATERIALIZED_ELEMENTS: usize = 4096;
