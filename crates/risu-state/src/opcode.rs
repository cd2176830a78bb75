//! Pseudo-opcode decoding.
//!
//! Trapping instructions carry a 4-bit control value in their low bits. The
//! remaining bits must match [`RISU_KEY`]; anything else is an ordinary
//! instruction and is treated as a compare point.

/// Fixed pattern of the non-opcode bits of a keyed trap instruction.
pub const RISU_KEY: u32 = 0x0000_5af0;

/// Opcode bits.
pub const OP_MASK: u32 = 0xf;

/// Control operation requested by a trap.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Ordinary per-instruction checkpoint.
    Compare = 0,
    /// Final checkpoint of a successful test sequence.
    TestEnd = 1,
    /// r0 holds the address of this side's scratch block.
    SetMemBlock = 2,
    /// Translate the offset in r0 into an address inside the scratch block.
    GetMemBlock = 3,
    /// Compare scratch block contents with the peer.
    CompareMem = 4,
}

impl Opcode {
    /// Classify a faulting instruction word.
    ///
    /// Unkeyed words and keyed words with an unassigned opcode fall back to
    /// `Compare`.
    #[must_use]
    pub const fn classify(insn: u32) -> Self {
        if insn & !OP_MASK != RISU_KEY {
            return Self::Compare;
        }
        match Self::from_raw(insn & OP_MASK) {
            Some(op) => op,
            None => Self::Compare,
        }
    }

    /// Opcode for a raw 4-bit value.
    #[must_use]
    pub const fn from_raw(op: u32) -> Option<Self> {
        match op {
            0 => Some(Self::Compare),
            1 => Some(Self::TestEnd),
            2 => Some(Self::SetMemBlock),
            3 => Some(Self::GetMemBlock),
            4 => Some(Self::CompareMem),
            _ => None,
        }
    }

    /// Trapping instruction word that requests this opcode.
    #[must_use]
    pub const fn encode(self) -> u32 {
        RISU_KEY | self as u32
    }

    /// Whether this opcode exchanges a full register snapshot.
    #[must_use]
    pub const fn is_register_compare(self) -> bool {
        matches!(self, Self::Compare | Self::TestEnd)
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Compare => "compare",
            Self::TestEnd => "testend",
            Self::SetMemBlock => "setmemblock",
            Self::GetMemBlock => "getmemblock",
            Self::CompareMem => "comparemem",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_keyed() {
        assert_eq!(Opcode::classify(0x0000_5af0), Opcode::Compare);
        assert_eq!(Opcode::classify(0x0000_5af1), Opcode::TestEnd);
        assert_eq!(Opcode::classify(0x0000_5af2), Opcode::SetMemBlock);
        assert_eq!(Opcode::classify(0x0000_5af3), Opcode::GetMemBlock);
        assert_eq!(Opcode::classify(0x0000_5af4), Opcode::CompareMem);
    }

    #[test]
    fn test_classify_unassigned_falls_back() {
        assert_eq!(Opcode::classify(0x0000_5af5), Opcode::Compare);
        assert_eq!(Opcode::classify(0x0000_5aff), Opcode::Compare);
    }

    #[test]
    fn test_classify_unkeyed() {
        // addi r3, r3, 1
        assert_eq!(Opcode::classify(0x3863_0001), Opcode::Compare);
        // Key bits shifted by one nibble
        assert_eq!(Opcode::classify(0x0005_af01), Opcode::Compare);
        assert_eq!(Opcode::classify(0x1000_5af1), Opcode::Compare);
    }

    #[test]
    fn test_encode_classify() {
        for op in [
            Opcode::Compare,
            Opcode::TestEnd,
            Opcode::SetMemBlock,
            Opcode::GetMemBlock,
            Opcode::CompareMem,
        ] {
            assert_eq!(Opcode::classify(op.encode()), op);
        }
    }

    #[test]
    fn test_register_compare_family() {
        assert!(Opcode::Compare.is_register_compare());
        assert!(Opcode::TestEnd.is_register_compare());
        assert!(!Opcode::CompareMem.is_register_compare());
        assert!(!Opcode::SetMemBlock.is_register_compare());
    }
}
