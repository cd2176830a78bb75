//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "risu")]
#[command(about = "ppc64le differential instruction testing: snapshot layout and offline diagnosis")]
#[command(version)]
pub struct Cli {
    /// Show metrics summary after execution
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the snapshot wire layout of this build
    Layout,
    /// Classify a trapping instruction word
    Decode {
        /// Instruction word in hex (e.g. 0x00005af1)
        #[arg(value_name = "INSN")]
        insn: String,
    },
    /// Compare recorded master and apprentice snapshots and report
    Check {
        /// Master snapshot file
        #[arg(value_name = "MASTER")]
        master: PathBuf,

        /// Apprentice snapshot file
        #[arg(value_name = "APPRENTICE")]
        apprentice: PathBuf,

        /// Master scratch block contents
        #[arg(long, requires = "apprentice_mem")]
        master_mem: Option<PathBuf>,

        /// Apprentice scratch block contents
        #[arg(long, requires = "master_mem")]
        apprentice_mem: Option<PathBuf>,
    },
}

impl Cli {
    /// Default tracing directive for the chosen verbosity.
    pub const fn log_directive(&self) -> &'static str {
        if self.verbose {
            "risu=debug"
        } else if self.silent {
            "risu=error"
        } else {
            "risu=info"
        }
    }
}
