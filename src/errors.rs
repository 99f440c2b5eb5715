//! Error types for the Corefile generator.
//!
//! This module defines the errors a regeneration pass can fail with, plus the
//! diagnostic produced by the block parser.

use std::{io, path::PathBuf};
use thiserror::Error;

/// A syntax problem found while parsing one fragment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{file}:{line} - Error during parsing: {message}")]
pub struct ParseError {
    /// Name of the fragment the error was found in.
    pub file: String,

    /// Source line of the offending token (1-based, 0 when unknown).
    pub line: usize,

    /// Human-readable description of the problem.
    pub message: String,
}

impl ParseError {
    pub fn new(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

/// Represents errors that can occur while generating the configuration.
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// The input or output directory could not be accessed.
    #[error("error reading directory {}: {source}", .path.display())]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A matched fragment file could not be read.
    #[error("error reading file {name}: {source}")]
    FragmentRead {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A fragment violates the block grammar.
    #[error("error building server config for file {}: {}", .0.file, .0)]
    Parse(#[from] ParseError),

    /// The output file could not be written.
    #[error("error writing output file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The directory watcher could not be created or attached.
    #[error("Watch error: {0}")]
    Watch(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
