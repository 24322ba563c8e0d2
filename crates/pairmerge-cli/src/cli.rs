use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "pairmerge",
    about = "Merge two sorted lists with two cooperating workers",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one worker against a partner over files or TCP
    Worker(WorkerArgs),
    /// Merge two input files with both workers in this process
    Merge(MergeArgs),
    /// Decode one wire line
    Decode(DecodeArgs),
}

#[derive(Args)]
pub struct WorkerArgs {
    /// This worker's id
    #[arg(long)]
    pub id: Option<String>,
    /// The partner's id
    #[arg(long)]
    pub partner: Option<String>,
    /// Input file of whitespace-separated integers
    #[arg(long)]
    pub input: PathBuf,
    /// Worker configuration file (TOML); flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// File the partner appends to
    #[arg(long, requires = "outbox", conflicts_with_all = ["listen", "connect"])]
    pub inbox: Option<PathBuf>,
    /// File this worker appends to
    #[arg(long, requires = "inbox")]
    pub outbox: Option<PathBuf>,
    /// Accept the partner's TCP connection on this address
    #[arg(long, conflicts_with = "connect")]
    pub listen: Option<String>,
    /// Connect to the partner at this address
    #[arg(long)]
    pub connect: Option<String>,
    /// Append merged values to this file instead of printing them
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Emit first when heads are equal
    #[arg(long, conflicts_with = "defer")]
    pub priority: bool,
    /// Let the partner emit first when heads are equal
    #[arg(long)]
    pub defer: bool,
    #[arg(long)]
    pub stall_timeout_ms: Option<u64>,
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,
    /// Checkpoint file; progress is saved after every step and resumed from on restart
    #[arg(long)]
    pub state: Option<PathBuf>,
}

#[derive(Args)]
pub struct MergeArgs {
    pub left: PathBuf,
    pub right: PathBuf,
}

#[derive(Args)]
pub struct DecodeArgs {
    pub line: String,
}
