//! brains: an interpreter for a concurrent tape-machine language.
//!
//! The language extends the classic eight-operator tape machine with
//! procedures (`:X` … `;`), until-loops (`{ }`), if-else (`( | )`),
//! break/continue (`'` and `` ` ``), cooperative threads (`&`, `*`),
//! forked processes with private and shared memory (`%`, `~`, `@`), and
//! counting semaphores (`^`, `_`).
//!
//! # Architecture
//!
//! ```text
//! Source → Filter → Compiler → Instruction words → Scheduler ⇄ Dispatcher
//!            ↑          ↑              ↑                ↑
//!        source.rs  compile.rs    brains-core       brains-vm
//! ```
//!
//! The compiler makes one pass over the filtered source and emits packed
//! instruction words with pre-resolved jump displacements; the runtime
//! schedules green threads over processes cooperatively until every
//! thread has died or the system has deadlocked.
//!
//! # Example
//!
//! ```
//! use brains::Session;
//!
//! let mut out = Vec::new();
//! Session::new()
//!     .run(b"++[>+++<-]>.", std::io::empty(), &mut out)
//!     .unwrap();
//! assert_eq!(out, vec![6]);
//! ```

pub mod compile;
pub mod error;
pub mod session;
pub mod source;

// Re-export commonly used types at crate root
pub use brains_vm::{Config, Interp, Policy};
pub use compile::{compile, CompileError, CompiledFile};
pub use error::LoadError;
pub use session::Session;
pub use source::SourceFilter;
