//! Per-file driver.
//!
//! A [`Session`] holds the scheduling configuration and runs source
//! files one after another. Every file gets a fresh interpreter context
//! (zeroed system memory, empty queues); program input comes from the
//! file itself when it embeds input after `!`, otherwise from the
//! caller-supplied stream.

use std::fs;
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::Path;

use brains_vm::{Config, Interp};

use crate::compile::{compile, CompileError};
use crate::error::LoadError;

/// Driver for compiling and running brains programs.
pub struct Session {
    config: Config,
}

impl Session {
    /// Create a session with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a session with custom configuration.
    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Compile and run one source buffer to quiescence.
    ///
    /// `input` feeds `,` unless the source embeds its own input after
    /// `!`. Output from `.` and `#` goes to `output`, which is flushed
    /// before returning.
    pub fn run<R: Read, W: Write>(
        &self,
        source: &[u8],
        input: R,
        output: W,
    ) -> Result<(), CompileError> {
        let compiled = compile(source)?;
        tracing::debug!(
            words = compiled.code.len() as u64,
            segments = compiled.entries.len() as u64,
            "compiled"
        );
        let mut interp = Interp::new(compiled.code, &compiled.entries, self.config.clone());
        let mut output = output;
        match compiled.input {
            Some(bytes) => {
                let mut embedded = Cursor::new(bytes);
                interp.run(&mut embedded, &mut output);
            }
            None => {
                let mut input = input;
                interp.run(&mut input, &mut output);
            }
        }
        let _ = output.flush();
        Ok(())
    }

    /// Run one source file against the process's standard streams.
    pub fn run_file(&self, path: &Path) -> Result<(), LoadError> {
        let source = fs::read(path).map_err(|e| LoadError::Open {
            path: path.to_owned(),
            source: e,
        })?;
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.run(&source, stdin.lock(), BufWriter::new(stdout.lock()))
            .map_err(|e| LoadError::Compile {
                path: path.to_owned(),
                source: e,
            })
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
