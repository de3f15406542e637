use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::loader::Module;
use crate::core::range::Range;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
}

#[derive(Parser)]
#[command(name = "rsetup")]
#[command(
    about = "Validate, load and import the CSV reference tables of a relief or health deployment"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without executing
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List required tables missing from a data directory
    Check(CheckArgs),

    /// Load a module's tables and print row counts, a table, or a row
    Load(LoadArgs),

    /// Copy a data directory into a profile snapshot and load it
    Import(ImportArgs),

    /// List profiles
    Profiles(ProfilesArgs),

    /// Group the numbers of a range CSV into ranges
    Ranges(RangesArgs),

    /// Initialize a rsetup.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// Data directory to check
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Deployment module (defaults to the configured module)
    #[arg(short, long, value_enum)]
    pub module: Option<Module>,
}

#[derive(Debug, Parser)]
pub struct LoadArgs {
    /// Data directory to load
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Deployment module (defaults to the configured module)
    #[arg(short, long, value_enum)]
    pub module: Option<Module>,

    /// Print the rows of this table file (e.g. individuals.csv)
    #[arg(short, long)]
    pub table: Option<String>,

    /// Print only the row with this id (requires --table)
    #[arg(long, requires = "table")]
    pub id: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Parser)]
pub struct ImportArgs {
    /// Directory exported from the sync server
    pub dir: PathBuf,

    /// Target profile (defaults to the configured profile)
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Deployment module (defaults to the configured module)
    #[arg(short, long, value_enum)]
    pub module: Option<Module>,
}

#[derive(Debug, Args)]
pub struct ProfilesArgs {
    /// Create this profile before listing
    #[arg(long, value_name = "NAME")]
    pub create: Option<String>,
}

#[derive(Debug, Parser)]
pub struct RangesArgs {
    /// Headerless CSV with one number per line
    pub input: PathBuf,

    /// Extra range to merge (format: MIN-MAX or N), repeatable
    #[arg(long, value_name = "RANGE")]
    pub add: Vec<Range>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
