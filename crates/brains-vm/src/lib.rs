//! Cooperative green-thread runtime for the brains language.
//!
//! This crate executes compiled instruction memory. It owns:
//! - Data memory segments (system, private, parent views)
//! - Process and thread control blocks and their queues
//! - The two schedulers (process-fair and thread-fair)
//! - The dispatcher and the semaphore sleep/wake machinery
//!
//! Compilation lives upstream; the runtime takes finished instruction
//! words plus the big-bang entry points and runs to quiescence:
//!
//! ```no_run
//! use brains_vm::{Config, Interp};
//!
//! let code = vec![/* compiled words */];
//! let mut interp = Interp::new(code, &[0], Config::default());
//! interp.run(&mut std::io::empty(), &mut std::io::sink());
//! ```
//!
//! Scheduling is single-threaded and cooperative: exactly one thread
//! executes at a time, so each instruction is trivially atomic. The
//! `infanticide` cargo feature flips the default reaping discipline to
//! kill all descendants of a dying process.

mod dispatch;
mod interp;
mod process;
mod rng;
mod sched;
mod segment;
mod stack;
mod thread;

// Re-export public types
pub use dispatch::QuantumOutcome;
pub use interp::{Config, Interp};
pub use process::{Pcb, Pid};
pub use rng::Rng;
pub use sched::Policy;
pub use segment::{SegmentArena, SegmentId};
pub use stack::{CallStack, StackError};
pub use thread::{Tcb, Tid};
