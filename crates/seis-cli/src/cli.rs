use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "seis",
    about = "Seismic working cache: multi-analyst event and detection review",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Workspace configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a JSON script of analyst steps against a fresh workspace
    Replay(ReplayArgs),
    /// Re-phase a detection, undo, redo and commit it across two sessions
    Demo(DemoArgs),
    /// Print the effective workspace configuration
    Config,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Path to the script file
    pub script: PathBuf,
}

#[derive(Args)]
pub struct DemoArgs {
    /// Phase the detection starts with
    #[arg(long, default_value = "P")]
    pub from: String,
    /// Phase the analyst changes it to
    #[arg(long, default_value = "S")]
    pub to: String,
    /// Station the detection was made on
    #[arg(long, default_value = "ASAR")]
    pub station: String,
}
