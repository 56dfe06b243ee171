//! Core types for the brains language.
//!
//! This crate provides the foundational types shared by the compiler and
//! the runtime:
//! - The packed instruction word and its field accessors
//! - Machine limits (tape size, instruction memory, call stack depth)
//! - Procedure identifier mapping

pub mod ident;
pub mod limits;
pub mod word;

// Re-export commonly used items at crate root
pub use ident::proc_slot;
pub use limits::{DEFAULT_QUANTUM, DMASK, DMEM, IMEM, NUM_PROCS, STACKSIZE};
pub use word::{make_op, opcode, payload, Word, OPCODE_MASK, PAYLOAD_SHIFT};
