//! Check command.

use std::path::Path;

use risu::record::{load_memblock, load_snapshot};
use risu::{ComparisonSession, MatchStatus, Result};
use tracing::{error, info};

use crate::cli::EXIT_FAILURE;
use crate::terminal;

/// Handle the `check` command.
pub fn cmd_check(master: &Path, apprentice: &Path, memory: Option<(&Path, &Path)>) -> i32 {
    let session = match load_session(master, apprentice, memory) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "failed to load snapshots");
            return EXIT_FAILURE;
        }
    };

    match risu::report(&session, &mut std::io::stderr().lock()) {
        Ok(MatchStatus::Match) => {
            terminal::success("snapshots match");
            MatchStatus::Match.exit_code()
        }
        Ok(MatchStatus::Fail) => {
            terminal::error("snapshots differ");
            terminal::dim(&format!("master:     {}", master.display()));
            terminal::dim(&format!("apprentice: {}", apprentice.display()));
            MatchStatus::Fail.exit_code()
        }
        Err(e) => {
            error!(error = %e, "failed to write report");
            EXIT_FAILURE
        }
    }
}

fn load_session(
    master: &Path,
    apprentice: &Path,
    memory: Option<(&Path, &Path)>,
) -> Result<ComparisonSession> {
    let mut session =
        ComparisonSession::from_snapshots(load_snapshot(master)?, load_snapshot(apprentice)?);
    if let Some((master_mem, apprentice_mem)) = memory {
        session.set_memory(&load_memblock(master_mem)?, &load_memblock(apprentice_mem)?)?;
        info!("scratch blocks loaded");
    }
    Ok(session)
}
