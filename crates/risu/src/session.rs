//! Comparison state owned by the apprentice for the length of a run.
//!
//! Written by every handled trap and read once by the reporter at shutdown.
//! Everything that grows is allocated up front in [`ComparisonSession::new`]
//! so that trap handling never allocates.

use risu_state::{MEMBLOCKLEN, MemBlock, RegisterSnapshot};

use crate::error::{Error, Result};

/// Per-session trap counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapStats {
    /// Traps handled.
    pub traps: u64,
    /// Register snapshot exchanges.
    pub compares: u64,
    /// Scratch block exchanges.
    pub mem_compares: u64,
    /// Vector registers corrected after a tolerated divergence.
    pub tolerated: u64,
    /// Traps that ended in a mismatch verdict.
    pub mismatches: u64,
}

/// Comparison state of the responder side.
pub struct ComparisonSession {
    image_base: u64,
    /// Most recent local capture.
    pub(crate) baseline: RegisterSnapshot,
    /// Most recent snapshot received from the master.
    pub(crate) peer: RegisterSnapshot,
    /// Sticky: a transport exchange failed at some point.
    pub(crate) packet_mismatch: bool,
    /// Sticky: at least one COMPAREMEM was handled.
    pub(crate) memory_exercised: bool,
    /// Sticky: a COMPAREMEM arrived before any usable SETMEMBLOCK.
    pub(crate) memblock_missing: bool,
    pub(crate) memblock: MemBlock,
    /// Local scratch contents at the last COMPAREMEM.
    pub(crate) local_memblock: Box<[u8]>,
    /// Master scratch contents received at the last COMPAREMEM.
    pub(crate) peer_memblock: Box<[u8]>,
    pub(crate) stats: TrapStats,
}

impl ComparisonSession {
    /// Start a session for a process whose image is loaded at `image_base`.
    #[must_use]
    pub fn new(image_base: u64) -> Self {
        Self {
            image_base,
            baseline: RegisterSnapshot::new(),
            peer: RegisterSnapshot::new(),
            packet_mismatch: false,
            memory_exercised: false,
            memblock_missing: false,
            memblock: MemBlock::new(),
            local_memblock: vec![0u8; MEMBLOCKLEN].into_boxed_slice(),
            peer_memblock: vec![0u8; MEMBLOCKLEN].into_boxed_slice(),
            stats: TrapStats::default(),
        }
    }

    /// Rebuild a finished session from recorded snapshots, for offline reports.
    #[must_use]
    pub fn from_snapshots(master: RegisterSnapshot, apprentice: RegisterSnapshot) -> Self {
        let mut session = Self::new(0);
        session.peer = master;
        session.baseline = apprentice;
        session
    }

    /// Attach recorded scratch block contents, marking memory as exercised.
    ///
    /// # Errors
    ///
    /// Returns an error if either block is not `MEMBLOCKLEN` bytes long.
    pub fn set_memory(&mut self, master: &[u8], apprentice: &[u8]) -> Result<()> {
        for block in [master, apprentice] {
            if block.len() != MEMBLOCKLEN {
                return Err(Error::MemBlockSize {
                    expected: MEMBLOCKLEN,
                    actual: block.len(),
                });
            }
        }
        self.peer_memblock.copy_from_slice(master);
        self.local_memblock.copy_from_slice(apprentice);
        self.memory_exercised = true;
        Ok(())
    }

    #[must_use]
    pub const fn image_base(&self) -> u64 {
        self.image_base
    }

    /// Most recent local capture.
    #[must_use]
    pub const fn baseline(&self) -> &RegisterSnapshot {
        &self.baseline
    }

    /// Most recent snapshot received from the master.
    #[must_use]
    pub const fn peer(&self) -> &RegisterSnapshot {
        &self.peer
    }

    #[must_use]
    pub const fn packet_mismatch(&self) -> bool {
        self.packet_mismatch
    }

    #[must_use]
    pub const fn memory_exercised(&self) -> bool {
        self.memory_exercised
    }

    #[must_use]
    pub const fn memblock_missing(&self) -> bool {
        self.memblock_missing
    }

    /// Active scratch block of this side.
    #[must_use]
    pub const fn memblock(&self) -> MemBlock {
        self.memblock
    }

    #[must_use]
    pub fn local_memblock(&self) -> &[u8] {
        &self.local_memblock
    }

    #[must_use]
    pub fn peer_memblock(&self) -> &[u8] {
        &self.peer_memblock
    }

    /// Whether the last compared scratch blocks are identical.
    #[must_use]
    pub fn memory_matches(&self) -> bool {
        self.local_memblock == self.peer_memblock
    }

    /// Whether the scratch memory checks passed, or were never exercised.
    ///
    /// A COMPAREMEM without a local block fails for the rest of the session,
    /// whatever the stale copies hold.
    #[must_use]
    pub fn memory_ok(&self) -> bool {
        !self.memory_exercised || (!self.memblock_missing && self.memory_matches())
    }

    #[must_use]
    pub const fn stats(&self) -> TrapStats {
        self.stats
    }
}
