use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stockpile")]
#[command(about = "Inventory totals across game-save snapshots")]
#[command(version)]
pub struct Cli {
    /// Database file (overrides the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ingest decoded save documents (files or directories of *.json)
    Ingest(IngestArgs),

    /// Current per-resource totals
    Totals(TotalsArgs),

    /// Save roots and their active flags
    #[command(subcommand)]
    Roots(RootsCommand),

    /// Inspect, delete and compare snapshots
    #[command(subcommand)]
    Snapshots(SnapshotsCommand),

    /// Capture, import or show baselines
    #[command(subcommand)]
    Baseline(BaselineCommand),

    /// Maintain the incremental ledger
    #[command(subcommand)]
    Ledger(LedgerCommand),

    /// Compare snapshot totals with baseline+ledger totals
    Reconcile(ReconcileArgs),
}

#[derive(Args)]
pub struct OutputArgs {
    /// Output as JSON instead of a table
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct IngestArgs {
    /// Decoder documents or directories containing them
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args)]
pub struct TotalsArgs {
    /// Scope: character, base, storage, frigate, corvette, ship, vehicles
    #[arg(long)]
    pub scope: Option<String>,

    /// One save root instead of all active roots
    #[arg(long)]
    pub root: Option<String>,

    /// Include technology rows
    #[arg(long, default_value_t = false)]
    pub tech: bool,

    /// Most recently changed resources first
    #[arg(long, default_value_t = false)]
    pub recent: bool,

    /// Use baseline+ledger totals instead of snapshots
    #[arg(long, default_value_t = false, conflicts_with_all = ["scope", "root", "recent"])]
    pub ledger: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Subcommand)]
pub enum RootsCommand {
    /// List known roots
    List(OutputArgs),

    /// Include a root in combined totals
    Activate { root: String },

    /// Exclude a root from combined totals
    Deactivate { root: String },

    /// Set the display name of a root (omit the name to clear it)
    Rename { root: String, name: Option<String> },
}

#[derive(Subcommand)]
pub enum SnapshotsCommand {
    /// List snapshots, newest first
    List {
        #[arg(long)]
        root: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Delete a snapshot and its item rows
    Delete { id: i64 },

    /// Compare two snapshots (defaults to the two most recent)
    Diff(DiffArgs),
}

#[derive(Args)]
pub struct DiffArgs {
    /// Starting snapshot ID for comparison
    #[arg(long, requires = "to")]
    pub from: Option<i64>,

    /// Ending snapshot ID for comparison
    #[arg(long, requires = "from")]
    pub to: Option<i64>,

    /// Pick the two most recent snapshots of this root
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub root: Option<String>,

    #[arg(long)]
    pub scope: Option<String>,

    #[arg(long, default_value_t = false)]
    pub tech: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Subcommand)]
pub enum BaselineCommand {
    /// Capture the latest snapshot of every active root as a baseline
    Capture(OutputArgs),

    /// Import a decoder document directly as a baseline
    Import { path: PathBuf },

    /// Show a baseline capture: latest, oldest, or a timestamp
    Show {
        #[arg(default_value = "latest")]
        pick: String,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Subcommand)]
pub enum LedgerCommand {
    /// Derive deltas from snapshots ingested since the baseline
    Sync {
        /// Session gap, e.g. "10m" (overrides the config file)
        #[arg(long)]
        gap: Option<String>,
    },

    /// Append a delta by hand
    Record(RecordArgs),
}

#[derive(Args)]
pub struct RecordArgs {
    pub resource: String,

    #[arg(allow_hyphen_values = true)]
    pub delta: i64,

    #[arg(long, default_value = "Unknown")]
    pub kind: String,

    #[arg(long, default_value = "UNKNOWN")]
    pub owner: String,

    #[arg(long, default_value = "general")]
    pub inventory: String,

    #[arg(long)]
    pub root: Option<String>,

    /// Applied time (unix seconds or "YYYY-MM-DD HH:MM:SS"), defaults to now
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Args)]
pub struct ReconcileArgs {
    #[arg(long, default_value_t = false)]
    pub tech: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}
