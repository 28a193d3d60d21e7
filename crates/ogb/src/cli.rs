use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use ogb_jobs::{JobKind, JobStatus};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// Usage or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Runtime failure exit code
pub const EXIT_RUNTIME: i32 = 3;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// Usage or configuration error (exit code 2)
    #[error("Configuration error: {message}")]
    #[diagnostic(code(ogb::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// A job or external tool failed (exit code 3)
    #[error("Job error: {message}")]
    #[diagnostic(code(ogb::cli::job))]
    Job {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Other unexpected error (exit code 3)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(ogb::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new job error
    #[must_use]
    pub fn job(message: impl Into<String>) -> Self {
        Self::Job {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new other error with help text
    #[must_use]
    pub fn other_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<ogb_cache::Error> for CliError {
    fn from(err: ogb_cache::Error) -> Self {
        match err {
            ogb_cache::Error::Configuration { message } => Self::config(message),
            ogb_cache::Error::Unhashable { .. } => Self::config(err.to_string()),
            ogb_cache::Error::ComputationFailed { .. } => Self::job(err.to_string()),
            ogb_cache::Error::CorruptEntry { .. } => Self::other_with_help(
                err.to_string(),
                "Remove the entry with `ogb cache clear <function>`",
            ),
            ogb_cache::Error::Io {
                ref source,
                ref path,
                ref operation,
            } => {
                let path_str = path
                    .as_ref()
                    .map_or(String::new(), |p| format!(" on {}", p.display()));
                Self::other_with_help(
                    format!("I/O {operation} failed{path_str}: {source}"),
                    "Check file permissions and ensure the path exists",
                )
            }
            ogb_cache::Error::AlreadyExists { .. } | ogb_cache::Error::Serialization { .. } => {
                Self::other(err.to_string())
            }
        }
    }
}

impl From<ogb_jobs::Error> for CliError {
    fn from(err: ogb_jobs::Error) -> Self {
        match err {
            ogb_jobs::Error::Configuration { message } => Self::config(message),
            ogb_jobs::Error::InvalidSubject { .. } | ogb_jobs::Error::NotFound { .. } => {
                Self::config(err.to_string())
            }
            ogb_jobs::Error::UnknownGenome { .. } => Self::config_with_help(
                err.to_string(),
                "Check the [genomes] section of the configuration",
            ),
            ogb_jobs::Error::Conflict { .. } => Self::config_with_help(
                err.to_string(),
                "Pass --ignore-conflicts to skip existing records",
            ),
            ogb_jobs::Error::Cache(inner) => inner.into(),
            ogb_jobs::Error::ToolInvocationFailed { .. }
            | ogb_jobs::Error::StaleTransition { .. } => Self::job(err.to_string()),
            ogb_jobs::Error::Io { .. } | ogb_jobs::Error::Serialization { .. } => {
                Self::other(err.to_string())
            }
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Job { .. } | CliError::Other { .. } => EXIT_RUNTIME,
    }
}

/// Render error appropriately based on JSON flag
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let envelope = ErrorEnvelope::new(serde_json::json!({
            "code": match err {
                CliError::Config { .. } => "config",
                CliError::Job { .. } => "job",
                CliError::Other { .. } => "other",
            },
            "message": err.to_string()
        }));

        match serde_json::to_string(&envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Administer the OpenGenomeBrowser cache and background jobs.
#[derive(Parser, Debug)]
#[command(name = "ogb")]
#[command(about = "Administer the OpenGenomeBrowser cache and background jobs")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub log_level: crate::tracing::LogLevel,

    /// Log line format.
    #[arg(
        long,
        global = true,
        help = "Set log format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: crate::tracing::TracingFormat,

    /// Emit JSON envelopes on stdout.
    #[arg(long, global = true, help = "Emit JSON envelopes on stdout")]
    pub json: bool,

    /// Settings file.
    #[arg(
        short = 'c',
        long,
        global = true,
        env = "OGB_CONFIG",
        help = "Path to the settings file (default: ./ogb.toml if present)"
    )]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// On-disk result cache.
    #[command(about = "Inspect and prune the on-disk result cache")]
    Cache {
        /// The cache subcommand.
        #[command(subcommand)]
        subcommand: CacheCommands,
    },
    /// Background jobs.
    #[command(about = "Create, inspect and maintain background jobs")]
    Jobs {
        /// The jobs subcommand.
        #[command(subcommand)]
        subcommand: JobsCommands,
    },
    /// Dot plot of two assemblies.
    #[command(about = "Compute a dot plot of two assemblies (memoized)")]
    Dotplot {
        /// Reference assembly, relative to the configured folder structure.
        #[arg(help = "Reference assembly FASTA")]
        reference: String,
        /// Query assembly, relative to the configured folder structure.
        #[arg(help = "Query assembly FASTA")]
        query: String,
        /// nucmer `--mincluster`.
        #[arg(long, default_value_t = 65, help = "Minimum cluster length for nucmer")]
        mincluster: u32,
    },
    /// External tools.
    #[command(about = "Check the configured external tools")]
    Tools {
        /// The tools subcommand.
        #[command(subcommand)]
        subcommand: ToolsCommands,
    },
}

/// Cache subcommands.
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Entry counts and sizes per function.
    #[command(about = "Show entry counts and sizes per cached function")]
    Stats,
    /// Entries of one function.
    #[command(about = "List the entries of one cached function, newest first")]
    List {
        /// Function identifier, e.g. `ogb_jobs.tools.dotplot.calculate_dotplot`.
        #[arg(help = "Function identifier")]
        function: String,
    },
    /// Apply the eviction bound to every function.
    #[command(about = "Evict the oldest entries of every cached function")]
    Prune {
        /// Entries kept per function; the configured value when unset.
        #[arg(long, help = "Entries kept per function")]
        max_entries: Option<usize>,
    },
    /// Delete one function directory.
    #[command(about = "Delete every entry of one cached function")]
    Clear {
        /// Function identifier.
        #[arg(help = "Function identifier")]
        function: String,
    },
}

/// Job subcommands.
#[derive(Subcommand, Debug)]
pub enum JobsCommands {
    /// Similarity of two genomes.
    #[command(about = "Get or start the similarity of two genomes")]
    Similarity {
        /// First genome identifier.
        first: String,
        /// Second genome identifier.
        second: String,
        /// Pairwise job kind.
        #[arg(long, default_value = "ani", value_parser = parse_kind)]
        kind: JobKind,
        /// Wait for the job to finish before printing.
        #[arg(long)]
        wait: bool,
    },
    /// Core-genome dendrogram of a genome set.
    #[command(about = "Get or start the core-genome dendrogram of a genome set")]
    Dendrogram {
        /// Genome identifiers (at least two).
        #[arg(required = true, num_args = 2..)]
        genomes: Vec<String>,
        /// Wait for the job to finish before printing.
        #[arg(long)]
        wait: bool,
    },
    /// Records of one kind.
    #[command(about = "List job records")]
    Status {
        /// Job kind.
        #[arg(long, value_parser = parse_kind)]
        kind: JobKind,
        /// Only records in this status (R, D or F).
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,
    },
    /// Recompute records.
    #[command(about = "Reset jobs to RUNNING and recompute them")]
    Reload {
        /// Job kind.
        #[arg(long, value_parser = parse_kind)]
        kind: JobKind,
        /// Subjects: `first:second` for pairs, comma-separated identifiers for sets.
        #[arg(required = true)]
        subjects: Vec<String>,
    },
    /// Delete records in one status.
    #[command(about = "Delete all jobs of one kind in one status")]
    Purge {
        /// Job kind.
        #[arg(long, value_parser = parse_kind)]
        kind: JobKind,
        /// Status to delete (R or F).
        #[arg(long, value_parser = parse_status)]
        status: JobStatus,
    },
    /// Export similarities.
    #[command(about = "Write finished similarities to a new tab-separated file")]
    Backup {
        /// Output file; must not exist.
        file: PathBuf,
        /// Pairwise job kind.
        #[arg(long, default_value = "ani", value_parser = parse_kind)]
        kind: JobKind,
    },
    /// Import similarities.
    #[command(about = "Load similarities from a tab-separated file")]
    Import {
        /// Input file written by `ogb jobs backup`.
        file: PathBuf,
        /// Pairwise job kind.
        #[arg(long, default_value = "ani", value_parser = parse_kind)]
        kind: JobKind,
        /// Skip records that already exist instead of failing.
        #[arg(long)]
        ignore_conflicts: bool,
    },
    /// All-against-all similarity progress.
    #[command(about = "Start missing similarities of a genome set and report progress")]
    Matrix {
        /// Genome identifiers.
        #[arg(required = true, num_args = 2..)]
        genomes: Vec<String>,
        /// Pairwise job kind.
        #[arg(long, default_value = "ani", value_parser = parse_kind)]
        kind: JobKind,
        /// Wait for every pair before reporting.
        #[arg(long)]
        wait: bool,
    },
}

/// Tool subcommands.
#[derive(Subcommand, Debug)]
pub enum ToolsCommands {
    /// Run each tool's presence check.
    #[command(about = "Verify that the configured tools are installed")]
    Check,
}

fn parse_kind(s: &str) -> Result<JobKind, String> {
    s.parse().map_err(|e: ogb_jobs::Error| e.to_string())
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    s.parse().map_err(|e: ogb_jobs::Error| e.to_string())
}

/// Parse the process arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
