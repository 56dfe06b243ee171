//! Process control blocks.

use std::collections::VecDeque;

use crate::segment::SegmentId;
use crate::thread::Tid;

/// Handle to a process control block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pid(pub(crate) usize);

/// One process: a ready queue of its threads and two memory references.
#[derive(Debug)]
pub struct Pcb {
    /// The parent's private memory, or the system segment for big-bang
    /// processes. `None` means `~` is a no-op for this process's threads.
    pub parent: Option<SegmentId>,
    /// This process's own private memory.
    pub dmem: SegmentId,
    /// Runnable threads, oldest first. Only used under process-fair
    /// scheduling; the thread-fair scheduler keeps one global queue.
    pub ready: VecDeque<Tid>,
    /// Count of live threads referencing this process.
    pub threads: usize,
}

impl Pcb {
    pub fn new(parent: Option<SegmentId>, dmem: SegmentId) -> Self {
        Self {
            parent,
            dmem,
            ready: VecDeque::new(),
            threads: 0,
        }
    }
}
