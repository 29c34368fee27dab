//! Command-line surface: thin wrappers over library entry points.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "prism", version, about = "Generic HTTP data-source connector")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert one OpenAPI document to a catalog JSON file.
    Convert {
        /// Path of the OpenAPI document.
        file: PathBuf,
        /// Output path; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Document format: oas3, oas2 or native.
        #[arg(long, default_value = "oas3")]
        spec: String,
        /// Prefix applied to operation and type names.
        #[arg(long)]
        prefix: Option<String>,
        /// Prefix trimmed from paths before deriving operation names.
        #[arg(long)]
        trim_prefix: Option<String>,
        /// Prefix for generated environment variable names.
        #[arg(long)]
        env_prefix: Option<String>,
        /// Fail on any accumulated conversion error.
        #[arg(long)]
        strict: bool,
    },
    /// Re-run conversion for every schema file in a config directory and
    /// refresh the catalog cache.
    Update {
        /// Directory containing config.{json,yaml,yml}.
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Convert a JSON document to YAML.
    Json2yaml {
        file: PathBuf,
        /// Output path; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
