//! Corefile Generator Library
//!
//! This library turns a directory of custom CoreDNS server block fragments
//! into one consolidated configuration file. Listening keys are normalized to
//! the canonical DNS port and every block gets the configured bind statement.

// Define modules
pub mod errors;
pub mod config;
pub mod lexer;
pub mod parser;
pub mod filter;
pub mod render;
pub mod pipeline;
pub mod watcher;

// Re-export commonly used items
pub use errors::{GeneratorError, ParseError};
pub use config::GeneratorConfig;
pub use pipeline::{build_config, build_config_counted, regenerate, Fragment, PassSummary};
pub use watcher::{DirectoryWatcher, Regenerator};
