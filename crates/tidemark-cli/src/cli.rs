use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tidemark",
    about = "Tidemark -- inspect and maintain incremental crawl state",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Storage config file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Snapshot file, overrides the path from --config
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Summarize the stored crawl state
    Stats,
    /// List known identifiers
    Ids(IdsArgs),
    /// Show properties and relations of one identifier
    Show(ShowArgs),
    /// Print the aggregation subtree below an identifier
    Tree(TreeArgs),
    /// Remove an identifier and everything it aggregates
    Remove(RemoveArgs),
    /// Crawl a directory, recording new, changed and deleted entries
    Scan(ScanArgs),
    /// Delete all stored crawl state
    Clear,
    /// Print the effective storage config as TOML
    Config,
}

#[derive(Args)]
pub struct IdsArgs {
    /// Only identifiers starting with this prefix
    #[arg(long)]
    pub prefix: Option<String>,
    /// Only identifiers without an aggregating parent
    #[arg(long)]
    pub roots: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    pub id: String,
}

#[derive(Args)]
pub struct TreeArgs {
    pub id: String,
    /// Stop descending below this depth
    #[arg(long)]
    pub depth: Option<usize>,
}

#[derive(Args)]
pub struct RemoveArgs {
    pub id: String,
}

#[derive(Args)]
pub struct ScanArgs {
    pub dir: PathBuf,
    /// Record a BLAKE3 content hash for every file
    #[arg(long)]
    pub hash: bool,
    /// Skip folders whose modification date is unchanged
    #[arg(long)]
    pub trust_folder_dates: bool,
    /// List what would be removed without saving anything
    #[arg(long)]
    pub dry_run: bool,
}
