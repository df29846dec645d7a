//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// OpenAPI Toolkit - call OpenAPI operations as agent tools, with human approval
#[derive(Parser, Debug)]
#[command(name = "openapi-toolkit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "OPENAPI_TOOLKIT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "warn",
        env = "OPENAPI_TOOLKIT_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "OPENAPI_TOOLKIT_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print namespaced tool descriptors of every configured client as JSON
    Tools {
        /// Only print tool names
        #[arg(long)]
        names_only: bool,
    },

    /// List operations of every configured client
    Operations,

    /// Translate a single document without a config file
    Inspect {
        /// Path to `OpenAPI` document (YAML or JSON)
        #[arg(required = true)]
        document: PathBuf,
    },

    /// Invoke a namespaced operation (`<client>__<operationId>`)
    Call {
        /// Namespaced operation id
        #[arg(required = true)]
        operation: String,

        /// JSON arguments (`{"path": {...}, "query": {...}, "body": ...}`)
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Tool-call id to pause under
        #[arg(long, default_value = "cli-call")]
        tool_call_id: String,

        /// Approve the call right away if it pauses
        #[arg(long)]
        approve: bool,
    },
}
