use thiserror::Error;

use crate::transport::TransportError;

/// Comparison engine errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("COMPAREMEM before any SETMEMBLOCK")]
    NoMemBlock,
    #[error("Invalid verdict byte 0x{0:x}")]
    InvalidVerdict(u8),
    #[error("Snapshot is {actual} bytes, expected {expected}")]
    SnapshotSize { expected: usize, actual: usize },
    #[error("Scratch block is {actual} bytes, expected {expected}")]
    MemBlockSize { expected: usize, actual: usize },
    #[error("Invalid instruction word: {0}")]
    InvalidInsn(String),
}

pub type Result<T> = std::result::Result<T, Error>;
