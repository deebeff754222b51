use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "querygate",
    about = "Read-only SQL gateway for Databricks SQL warehouses"
)]
pub struct Cli {
    /// Path to settings file (TOML)
    #[arg(short = 'c', long, global = true, env = "QUERYGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Credentials file, tried before the default locations
    #[arg(short = 'e', long = "env-file", global = true, env = "QUERYGATE_ENV_FILE")]
    pub env_file: Option<PathBuf>,

    /// Emit diagnostics to stderr
    #[arg(short = 'v', long, global = true, env = "QUERYGATE_VERBOSE")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a read-only query
    Query(QueryArgs),

    /// Check that a trivial query round-trips
    #[command(name = "test-connection")]
    TestConnection,

    /// Classify a statement locally without executing it
    Validate(SqlInput),
}

#[derive(Args, Debug)]
pub struct SqlInput {
    /// SQL query text
    pub sql: Option<String>,

    /// Read SQL from file
    #[arg(short = 'f', long = "file", conflicts_with = "sql")]
    pub sql_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[command(flatten)]
    pub input: SqlInput,

    /// Label used in diagnostics
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Query timeout in seconds (default: 30)
    #[arg(short = 't', long, env = "QUERYGATE_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Convert text cells to numbers and booleans by declared column type
    #[arg(long)]
    pub coerce: bool,

    /// Write results to file instead of stdout
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}
