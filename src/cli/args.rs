//! CLI argument definitions using clap
//!
//! Commands:
//! - coindex test --config <path>
//! - coindex build --config <path> [--out <dir>]
//! - coindex print --config <path> [--collection <name>]
//! - coindex counts --config <path>
//! - coindex upsert --config <path> <collection> <id> --record <file> [--parent <collection>/<id>]...

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::observability::Severity;

/// coindex - validate and compile a crypto-asset record corpus
#[derive(Parser, Debug)]
#[command(name = "coindex")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Minimum log severity: trace, info, warn, error, fatal
    #[arg(long, global = true, default_value = "info")]
    pub log_level: Severity,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate every record, exit non-zero on any violation
    Test {
        /// Path to configuration file
        #[arg(long, default_value = "./coindex.json")]
        config: PathBuf,
    },

    /// Validate, then write the produced document to <out>/data.json
    Build {
        /// Path to configuration file
        #[arg(long, default_value = "./coindex.json")]
        config: PathBuf,

        /// Output directory, overrides `output_dir` from the config
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print the produced document to stdout
    Print {
        /// Path to configuration file
        #[arg(long, default_value = "./coindex.json")]
        config: PathBuf,

        /// Print a single root collection only
        #[arg(long)]
        collection: Option<String>,
    },

    /// Print entity counts per collection
    Counts {
        /// Path to configuration file
        #[arg(long, default_value = "./coindex.json")]
        config: PathBuf,
    },

    /// Create a record unless it already exists
    Upsert {
        /// Path to configuration file
        #[arg(long, default_value = "./coindex.json")]
        config: PathBuf,

        /// Target collection, e.g. `assets`
        collection: String,

        /// Identifier, becomes the directory name
        id: String,

        /// YAML or JSON file holding the record, `-` for stdin
        #[arg(long)]
        record: PathBuf,

        /// Ancestor entity as `<collection>/<id>`, outermost first
        #[arg(long = "parent")]
        parents: Vec<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
