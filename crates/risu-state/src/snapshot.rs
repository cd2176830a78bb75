//! Register snapshot struct.
//!
//! The snapshot is sent whole over the wire and is not self-describing, so the
//! layout must be identical on both sides. It mirrors the Linux ppc64le
//! `gregset_t`, `fpregset_t` and `vrregset_t` types.

use std::mem::{offset_of, size_of};

/// Number of general register slots (`gregset_t`).
pub const NGREG: usize = 48;

/// Number of general-purpose registers (r0..r31).
pub const NGPR: usize = 32;

/// Number of floating-point slots (f0..f31 followed by FPSCR).
pub const NFPREG: usize = 33;

/// Number of vector registers.
pub const NVRREG: usize = 32;

/// Next instruction pointer.
pub const PT_NIP: usize = 32;
/// Machine state register.
pub const PT_MSR: usize = 33;
/// Original r3 of a syscall.
pub const PT_ORIG_R3: usize = 34;
/// Count register.
pub const PT_CTR: usize = 35;
/// Link register.
pub const PT_LNK: usize = 36;
/// Fixed-point exception register.
pub const PT_XER: usize = 37;
/// Condition register.
pub const PT_CCR: usize = 38;
/// Legacy multiply-quotient slot (SOFTE on 64-bit kernels).
pub const PT_MQ: usize = 39;
/// Trap cause.
pub const PT_TRAP: usize = 40;
/// Data address register (fault address).
pub const PT_DAR: usize = 41;
/// Data storage interrupt status register.
pub const PT_DSISR: usize = 42;
/// Syscall result.
pub const PT_RESULT: usize = 43;
/// Data stream control register.
pub const PT_DSCR: usize = 44;

/// FPSCR slot in the floating-point set.
pub const PT_FPSCR: usize = 32;

/// Summary-overflow bit of the condition register slot.
pub const CR_SO: u64 = 0x10;

/// Stack pointer (r1) and thread pointer (r13) legitimately differ between
/// environments and never take part in equality.
pub const EXCLUDED_GPRS: [usize; 2] = [1, 13];

/// General register set.
pub type GregSet = [u64; NGREG];

/// Floating-point register set.
pub type FpregSet = [f64; NFPREG];

/// One 128-bit vector register as four 32-bit words.
pub type VectorReg = [u32; 4];

/// Vector status and control register slot.
///
/// The word sits first on little-endian targets; the slot is 16 bytes wide.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Vscr {
    /// VSCR value.
    pub word: u32,
    _pad: [u32; 3],
}

impl Vscr {
    #[must_use]
    pub const fn new(word: u32) -> Self {
        Self { word, _pad: [0; 3] }
    }
}

/// Vector register set.
///
/// # Layout
///
/// ```text
/// offset 0:     vrregs[32][4]
/// offset 512:   vscr (16 bytes)
/// offset 528:   vrsave
/// offset 532:   _pad[3]
/// size 544, 16-byte aligned
/// ```
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VrRegSet {
    /// Vector registers vr0..vr31.
    pub vrregs: [VectorReg; NVRREG],
    /// Vector status and control register.
    pub vscr: Vscr,
    /// VRSAVE.
    pub vrsave: u32,
    _pad: [u32; 3],
}

impl VrRegSet {
    /// Create a zeroed vector register set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vrregs: [[0; 4]; NVRREG],
            vscr: Vscr::new(0),
            vrsave: 0,
            _pad: [0; 3],
        }
    }
}

impl Default for VrRegSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Architectural register state captured at one trap.
///
/// # Layout
///
/// ```text
/// offset 0:     faulting_insn (u32)
/// offset 4:     prev_insn (u32)
/// offset 8:     nip (u64, relative to the image base)
/// offset 16:    prev_addr (u64)
/// offset 24:    gregs[48]
/// offset 408:   fpregs[33]
/// offset 672:   vrregs (16-byte aligned)
/// size 1216
/// ```
///
/// There is no implicit padding, so every byte of the struct is initialized
/// and the byte views below are sound.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RegisterSnapshot {
    /// Instruction word at the trap address; carries the pseudo-opcode.
    pub faulting_insn: u32,
    /// Previously trapped instruction, filled in by the driver.
    pub prev_insn: u32,
    /// Trap address minus the image base.
    pub nip: u64,
    /// Address of the previously trapped instruction, filled in by the driver.
    pub prev_addr: u64,
    /// General registers and control slots.
    pub gregs: GregSet,
    /// Floating-point registers and FPSCR.
    pub fpregs: FpregSet,
    /// Vector registers, VSCR and VRSAVE.
    pub vrregs: VrRegSet,
}

/// Size of a snapshot on the wire.
pub const SNAPSHOT_SIZE: usize = size_of::<RegisterSnapshot>();

const _: () = assert!(SNAPSHOT_SIZE == 1216);

/// Wire layout of a snapshot as `(field, offset, size)`.
///
/// Both sides of a run must agree on this table; printing it on each host is
/// the quickest way to confirm matched builds.
pub const WIRE_LAYOUT: [(&str, usize, usize); 7] = [
    ("faulting_insn", offset_of!(RegisterSnapshot, faulting_insn), size_of::<u32>()),
    ("prev_insn", offset_of!(RegisterSnapshot, prev_insn), size_of::<u32>()),
    ("nip", offset_of!(RegisterSnapshot, nip), size_of::<u64>()),
    ("prev_addr", offset_of!(RegisterSnapshot, prev_addr), size_of::<u64>()),
    ("gregs", offset_of!(RegisterSnapshot, gregs), size_of::<GregSet>()),
    ("fpregs", offset_of!(RegisterSnapshot, fpregs), size_of::<FpregSet>()),
    ("vrregs", offset_of!(RegisterSnapshot, vrregs), size_of::<VrRegSet>()),
];

impl RegisterSnapshot {
    /// Create a zeroed snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            faulting_insn: 0,
            prev_insn: 0,
            nip: 0,
            prev_addr: 0,
            gregs: [0; NGREG],
            fpregs: [0.0; NFPREG],
            vrregs: VrRegSet::new(),
        }
    }

    /// Reset every slot to zero.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Fixed-point exception register.
    #[must_use]
    pub const fn xer(&self) -> u64 {
        self.gregs[PT_XER]
    }

    /// Condition register.
    #[must_use]
    pub const fn ccr(&self) -> u64 {
        self.gregs[PT_CCR]
    }

    /// Whether the summary-overflow bit is raised in the condition register.
    #[must_use]
    pub const fn summary_overflow(&self) -> bool {
        self.ccr() & CR_SO != 0
    }

    /// Raw FPSCR bits.
    #[must_use]
    pub const fn fpscr_bits(&self) -> u64 {
        self.fpregs[PT_FPSCR].to_bits()
    }

    /// View the snapshot as its wire bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8] {
        // SAFETY: repr(C) with no implicit padding, so all SNAPSHOT_SIZE bytes
        // are initialized.
        unsafe { std::slice::from_raw_parts(std::ptr::from_ref(self).cast::<u8>(), SNAPSHOT_SIZE) }
    }

    /// Mutable wire view, used to receive a snapshot in place.
    #[must_use]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; every bit pattern is a valid u32/u64/f64.
        unsafe {
            std::slice::from_raw_parts_mut(std::ptr::from_mut(self).cast::<u8>(), SNAPSHOT_SIZE)
        }
    }

    /// Decode a snapshot from its wire bytes.
    ///
    /// Returns `None` if `bytes` is not exactly [`SNAPSHOT_SIZE`] long.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SNAPSHOT_SIZE {
            return None;
        }
        let mut snapshot = Self::new();
        snapshot.as_bytes_mut().copy_from_slice(bytes);
        Some(snapshot)
    }
}

impl Default for RegisterSnapshot {
    fn default() -> Self {
        Self::new()
    }
}
