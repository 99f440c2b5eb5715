//! Configuration for the Corefile generator.
//!
//! The three operator settings are read once at startup from command line
//! flags, falling back to environment variables and then to defaults.

use std::{fs, path::PathBuf};
use clap::Parser;

use crate::errors::GeneratorError;

/// Default directory containing the custom fragments.
pub const DEFAULT_INPUT_DIR: &str = "/etc/custom";

/// Default directory the generated file is written to.
pub const DEFAULT_OUTPUT_DIR: &str = "/etc/generated-config";

/// Default bind statement injected into every block.
pub const DEFAULT_BIND_STATEMENT: &str = "bind 169.254.20.10 10.255.128.10";

/// Generator configuration.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    author,
    version,
    about = "Watches custom CoreDNS server blocks and regenerates a consolidated config file",
    long_about = None
)]
pub struct GeneratorConfig {
    /// Path to the input directory containing custom CoreDNS configuration files
    #[arg(
        long = "input-dir",
        alias = "inputDir",
        env = "COREFILE_INPUT_DIR",
        default_value = DEFAULT_INPUT_DIR
    )]
    pub input_dir: PathBuf,

    /// Path to the output directory where to write the CoreDNS config file to
    #[arg(
        long = "output-dir",
        alias = "outputDir",
        env = "COREFILE_OUTPUT_DIR",
        default_value = DEFAULT_OUTPUT_DIR
    )]
    pub output_dir: PathBuf,

    /// Bind statement to insert
    #[arg(long = "bind", env = "COREFILE_BIND", default_value = DEFAULT_BIND_STATEMENT)]
    pub bind_statement: String,
}

impl GeneratorConfig {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, bind_statement: impl Into<String>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            bind_statement: bind_statement.into(),
        }
    }

    /// Reject an output directory that is also the watched input directory.
    ///
    /// The generated file carries the fragment suffix, so writing it into the
    /// input directory would trigger the next pass forever. The bind
    /// statement is opaque and not checked.
    ///
    /// # Returns
    /// A `Result` indicating whether the configuration is usable.
    pub fn validate(&self) -> Result<(), GeneratorError> {
        let same_dir = match (fs::canonicalize(&self.input_dir), fs::canonicalize(&self.output_dir)) {
            (Ok(input), Ok(output)) => input == output,
            _ => self.input_dir == self.output_dir,
        };
        if same_dir {
            return Err(GeneratorError::Config(format!(
                "input and output directory must differ, both are {}",
                self.input_dir.display()
            )));
        }
        Ok(())
    }
}
