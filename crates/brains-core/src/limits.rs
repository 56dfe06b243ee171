//! Machine limits.

/// Length of one data memory segment (tape), in cells.
pub const DMEM: usize = 65536;

/// Mask for data pointer arithmetic; `DMEM` is a power of two.
pub const DMASK: usize = DMEM - 1;

/// Capacity of instruction memory, in words.
pub const IMEM: usize = 1 << 24;

/// Call stack capacity, in pending return addresses.
pub const STACKSIZE: usize = 1024;

/// Number of procedure table slots (`0-9`, `A-Z`, `a-z`).
pub const NUM_PROCS: usize = 62;

/// Scheduling quantum used when none is given on the command line.
pub const DEFAULT_QUANTUM: i32 = 10;
