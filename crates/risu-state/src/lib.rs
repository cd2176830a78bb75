//! ppc64le register state for differential instruction testing.
//!
//! This crate provides the `RegisterSnapshot` struct with a layout that is sent
//! byte-for-byte between the master and the apprentice, plus the routines that
//! fill it from a trapped execution context.
//!
//! # Interrupt-context safety
//!
//! Everything reachable from [`capture`], [`Opcode::classify`] and the
//! [`TrapContext`] implementations runs inside a synchronous signal handler.
//! These paths must stay allocation-free, lock-free and silent (no logging),
//! and only perform fixed-size copies. Keep new code here to that rule.
//!
//! ```ignore
//! use risu_state::{Opcode, UContext, capture};
//!
//! // Inside a SIGILL handler:
//! let ctx = unsafe { UContext::from_raw(uc) };
//! let snapshot = capture(ctx, image_base);
//! match Opcode::classify(snapshot.faulting_insn) { /* ... */ }
//! ```

mod capture;
mod context;
mod memblock;
mod opcode;
mod snapshot;

pub use capture::{capture, capture_into};
pub use context::{RegisterFile, TrapContext, UContext};
pub use memblock::{GUARD_SIZE, MEMBLOCKLEN, MemBlock, MemoryError, ScratchRegion};
pub use opcode::{OP_MASK, Opcode, RISU_KEY};
pub use snapshot::{
    CR_SO, EXCLUDED_GPRS, FpregSet, GregSet, NFPREG, NGPR, NGREG, NVRREG, PT_CCR, PT_CTR, PT_DAR,
    PT_DSCR, PT_DSISR, PT_FPSCR, PT_LNK, PT_MQ, PT_MSR, PT_NIP, PT_ORIG_R3, PT_RESULT, PT_TRAP,
    PT_XER, RegisterSnapshot, SNAPSHOT_SIZE, VectorReg, Vscr, VrRegSet, WIRE_LAYOUT,
};
