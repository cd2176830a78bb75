//! Command implementations.
//!
//! Each submodule handles one CLI command.

mod check;
mod decode;
mod layout;

use crate::cli::{Cli, Commands};

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Layout => layout::cmd_layout(),
        Commands::Decode { insn } => decode::cmd_decode(insn),
        Commands::Check {
            master,
            apprentice,
            master_mem,
            apprentice_mem,
        } => check::cmd_check(
            master,
            apprentice,
            master_mem.as_deref().zip(apprentice_mem.as_deref()),
        ),
    }
}
