//! CLI module for coindex
//!
//! Provides command-line interface for:
//! - test: Load and validate the corpus
//! - build: Write the produced document
//! - print: Produced document to stdout
//! - counts: Entity counts per collection
//! - upsert: Create-if-absent record writes

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{build, counts, print, run, run_command, test, upsert};
pub use errors::{CliError, CliErrorCode, CliResult};
