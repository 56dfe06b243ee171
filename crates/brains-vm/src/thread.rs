//! Thread control blocks.

use brains_core::NUM_PROCS;

use crate::process::Pid;
use crate::segment::SegmentId;
use crate::stack::CallStack;

/// Handle to a thread control block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tid(pub(crate) usize);

/// One runnable execution context.
///
/// The procedure table is thread-local: spawn and fork copy it by value,
/// so a rebinding in one thread is invisible to its siblings.
#[derive(Clone, Debug)]
pub struct Tcb {
    /// Owning process.
    pub pcb: Pid,
    /// Procedure bindings: instruction address of the word after each
    /// `:X` header, or unbound.
    pub procs: [Option<usize>; NUM_PROCS],
    /// Program counter (index into instruction memory).
    pub pc: usize,
    /// Data pointer (index into the current segment, kept masked).
    pub dp: usize,
    /// Current memory segment: the process's own memory, or its parent
    /// memory after an odd number of `~`.
    pub seg: SegmentId,
    /// Pending procedure return addresses.
    pub stack: CallStack,
}
