//! Error types for the driver.

use std::path::PathBuf;

use thiserror::Error;

use crate::compile::CompileError;

/// Errors that can occur when running a source file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?}: code not syntactically correct")]
    Compile {
        path: PathBuf,
        #[source]
        source: CompileError,
    },
}
