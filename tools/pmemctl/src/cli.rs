//! Command-line interface definitions for pmemctl.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Management CLI for persistent-memory DIMMs with a record/playback
/// session layer.
#[derive(Parser)]
#[command(name = "pmemctl", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Suppress informational output; show only errors and results.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable verbose output with session diagnostics.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Start a record or playback session.
    Start(StartArgs),
    /// Stop the active session and return to normal mode.
    Stop(StopArgs),
    /// Show platform, DIMM, or session information.
    Show(ShowArgs),
    /// Write the active session to an image file.
    Dump(DumpArgs),
    /// Load a session image file for playback.
    Load(LoadArgs),
    /// Issue a raw firmware command to a DIMM.
    Passthru(PassthruArgs),
}

/// Session kind accepted by `start --session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SessionKind {
    /// Record every transaction of subsequent invocations.
    Record,
    /// Replay the loaded session, auto-executing every recorded command.
    Playback,
    /// Replay the loaded session one manually issued command at a time.
    PlaybackManual,
}

/// Arguments for the `start` subcommand.
#[derive(Parser)]
pub struct StartArgs {
    /// Session kind to start.
    #[arg(long, value_enum)]
    pub session: SessionKind,

    /// Tag id to start playback from (default 0).
    #[arg(long)]
    pub tag: Option<u32>,

    /// Discard an existing session without prompting.
    #[arg(long, short = 'f')]
    pub force: bool,
}

/// Arguments for the `stop` subcommand.
#[derive(Parser)]
pub struct StopArgs {
    /// Stop the active session.
    #[arg(long)]
    pub session: bool,
}

/// ACPI table selector for `show --acpi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AcpiTable {
    /// The NVDIMM Firmware Interface Table.
    Nfit,
    /// The Platform Configuration Attribute Table.
    Pcat,
    /// The Platform Memory Topology Table.
    Pmtt,
}

/// Arguments for the `show` subcommand.
#[derive(Parser)]
pub struct ShowArgs {
    /// List the tags of the loaded session.
    #[arg(long)]
    pub session: bool,

    /// Show the DIMM inventory.
    #[arg(long)]
    pub dimm: bool,

    /// Show a parsed ACPI table.
    #[arg(long, value_enum)]
    pub acpi: Option<AcpiTable>,

    /// Decode and validate a Platform Configuration Data blob.
    #[arg(long)]
    pub pcd: Option<PathBuf>,
}

/// Arguments for the `dump` subcommand.
#[derive(Parser)]
pub struct DumpArgs {
    /// Dump the active session.
    #[arg(long)]
    pub session: bool,

    /// Destination file for the session image.
    #[arg(long, short = 'd')]
    pub destination: PathBuf,
}

/// Arguments for the `load` subcommand.
#[derive(Parser)]
pub struct LoadArgs {
    /// Load a session image.
    #[arg(long)]
    pub session: bool,

    /// Source file containing the session image.
    #[arg(long, short = 's')]
    pub source: PathBuf,
}

/// Arguments for the `passthru` subcommand.
#[derive(Parser)]
pub struct PassthruArgs {
    /// Target DIMM id.
    #[arg(long)]
    pub dimm: u32,

    /// Firmware opcode.
    #[arg(long)]
    pub opcode: u8,

    /// Firmware sub-opcode.
    #[arg(long, default_value = "0")]
    pub subopcode: u8,

    /// Small input payload as hex bytes (e.g. `00ff10`).
    #[arg(long)]
    pub payload: Option<String>,
}
