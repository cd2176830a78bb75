//! Snapshot and scratch block files.
//!
//! Files hold the exact wire bytes, so a snapshot captured on one host can be
//! diagnosed offline with `risu check`.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use risu_state::{MEMBLOCKLEN, RegisterSnapshot, SNAPSHOT_SIZE};
use tracing::debug;

use crate::error::{Error, Result};

/// Write a snapshot's wire bytes to `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn save_snapshot(path: impl AsRef<Path>, snapshot: &RegisterSnapshot) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(snapshot.as_bytes())?;
    writer.flush()?;
    debug!(path = %path.display(), "snapshot saved");
    Ok(())
}

/// Read a snapshot from `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not exactly one
/// snapshot long.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<RegisterSnapshot> {
    let bytes = read_all(path.as_ref())?;
    RegisterSnapshot::from_bytes(&bytes).ok_or(Error::SnapshotSize {
        expected: SNAPSHOT_SIZE,
        actual: bytes.len(),
    })
}

/// Read scratch block contents from `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not `MEMBLOCKLEN` bytes.
pub fn load_memblock(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let bytes = read_all(path.as_ref())?;
    if bytes.len() != MEMBLOCKLEN {
        return Err(Error::MemBlockSize {
            expected: MEMBLOCKLEN,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

fn read_all(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    debug!(path = %path.display(), len = bytes.len(), "loaded");
    Ok(bytes)
}
