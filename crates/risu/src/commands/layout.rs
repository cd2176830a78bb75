//! Layout command.

use risu::{MEMBLOCKLEN, SNAPSHOT_SIZE};
use risu_state::WIRE_LAYOUT;

use crate::cli::EXIT_SUCCESS;
use crate::terminal;

/// Handle the `layout` command.
pub fn cmd_layout() -> i32 {
    terminal::header("snapshot wire layout");
    for (field, offset, size) in WIRE_LAYOUT {
        println!("  {field:<14} offset {offset:>5}  size {size:>4}");
    }
    println!("  {:<14} {SNAPSHOT_SIZE:>12}", "total");
    println!("  {:<14} {MEMBLOCKLEN:>12}", "memblock");
    EXIT_SUCCESS
}
