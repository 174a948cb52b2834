//! Library half of the `dbmon` binary.
//!
//! The argument types, command runners and output writer live here so
//! they can be exercised from tests without spawning the binary.

pub mod commands;
pub mod output;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use dbmon_core::models::parse_tag_filter;
use dbmon_core::{DbMonError, LogFormat, ReportFormat};

/// Command line of the `dbmon` binary.
#[derive(Debug, Parser)]
#[command(name = "dbmon")]
#[command(about = "Database monitoring configuration pipeline")]
#[command(version)]
#[command(long_about = "
dbmon - Resolve database monitoring configuration for the agent

Reads legacy, enhanced or discovered database descriptors, applies defaults,
resolves credentials and writes one canonical document for the MySQL and
PostgreSQL integrations.

SECURITY FEATURES:
- Resolved passwords are never logged
- Output files are written atomically with owner-only permissions
- Dry runs mask passwords unless --show-secrets is given

CREDENTIAL SOURCES:
- plain            (password in the document)
- env_var          (password_env names the variable)
- aws_secrets_manager
- aws_ssm_parameter

EXAMPLES:
  dbmon transform databases.yml --output /etc/newrelic-infra/databases.yml
  dbmon transform legacy.yml enhanced.yml --dry-run
  dbmon validate databases.yml --offline --fix
  dbmon discover --region us-east-1 --instances instances.json --output discovered.yml
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Produce the canonical configuration document
    Transform(TransformArgs),
    /// Check input documents and report issues
    Validate(ValidateArgs),
    /// Turn RDS/Aurora descriptions into an input document
    Discover(DiscoverArgs),
}

#[derive(Debug, Args)]
pub struct TransformArgs {
    /// Input documents, processed in order
    #[arg(required = true, value_name = "INPUT", help = "Input documents (YAML or JSON)")]
    pub inputs: Vec<PathBuf>,

    /// Output file path
    #[arg(
        short,
        long,
        required_unless_present = "dry_run",
        help = "Output file path (.json for JSON, anything else for YAML)"
    )]
    pub output: Option<PathBuf>,

    /// Default region for secret lookups
    #[arg(long, env = "AWS_REGION", help = "Region for secret lookups that do not set one")]
    pub region: Option<String>,

    /// Print instead of writing
    #[arg(long, help = "Print the document to stdout instead of writing it")]
    pub dry_run: bool,

    /// Show passwords in dry-run output
    #[arg(long, requires = "dry_run", help = "Do not mask passwords in dry-run output")]
    pub show_secrets: bool,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Input documents, processed in order
    #[arg(required = true, value_name = "INPUT", help = "Input documents (YAML or JSON)")]
    pub inputs: Vec<PathBuf>,

    /// Write a remediation script
    #[arg(long, help = "Write shell commands for fixable issues")]
    pub fix: bool,

    /// Remediation script path
    #[arg(long, default_value = "fix-credentials.sh", help = "Where --fix writes the script")]
    pub fix_output: PathBuf,

    /// Skip credential resolution
    #[arg(long, help = "Do not contact environment or secret stores")]
    pub offline: bool,

    /// Report format
    #[arg(long, default_value = "text", help = "Report format (text or json)")]
    pub format: ReportFormat,

    /// Default region for secret lookups
    #[arg(long, env = "AWS_REGION", help = "Region for secret lookups that do not set one")]
    pub region: Option<String>,
}

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Region the descriptions were taken from
    #[arg(long, env = "AWS_REGION", help = "Region the descriptions belong to")]
    pub region: String,

    /// `aws rds describe-db-instances` output
    #[arg(long, value_name = "FILE", help = "JSON output of aws rds describe-db-instances")]
    pub instances: Option<PathBuf>,

    /// `aws rds describe-db-clusters` output
    #[arg(long, value_name = "FILE", help = "JSON output of aws rds describe-db-clusters")]
    pub clusters: Option<PathBuf>,

    /// Input document whose `discovery` block scopes the run
    #[arg(
        long,
        value_name = "FILE",
        help = "Input document whose discovery block supplies regions and tag filters"
    )]
    pub config: Option<PathBuf>,

    /// Tag filters, all of which must match
    #[arg(
        long = "tag-filter",
        value_name = "KEY=VALUE",
        value_parser = parse_tag_filter,
        help = "Only include resources carrying this tag (repeatable, overrides --config, default monitor=newrelic)"
    )]
    pub tag_filters: Vec<(String, String)>,

    /// Output file path
    #[arg(short, long, help = "Output file path (stdout when omitted)")]
    pub output: Option<PathBuf>,
}

impl DiscoverArgs {
    /// Filters as a map; duplicates keep the last value.
    pub fn filters(&self) -> BTreeMap<String, String> {
        self.tag_filters.iter().cloned().collect()
    }
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all log output except errors")]
    pub quiet: bool,

    /// Log line format
    #[arg(
        long,
        global = true,
        env = "DBMON_LOG_FORMAT",
        default_value = "text",
        help = "Log format on stderr (text or json)"
    )]
    pub log_format: LogFormat,
}

/// How a successful command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// No error-severity issues
    Clean,
    /// At least one error-severity issue was reported
    IssuesFound,
}

impl RunStatus {
    pub fn from_errors(has_errors: bool) -> Self {
        if has_errors {
            Self::IssuesFound
        } else {
            Self::Clean
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::IssuesFound => 1,
        }
    }
}

impl From<RunStatus> for ExitCode {
    fn from(status: RunStatus) -> Self {
        Self::from(status.code())
    }
}

/// Exit code for a failed run: 1 for bad input documents, 2 otherwise.
pub fn failure_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<DbMonError>() {
        Some(err) if err.is_schema_failure() => 1,
        _ => 2,
    }
}
