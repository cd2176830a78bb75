//! Snapshot equality under ppc64le tolerance rules.
//!
//! Comparison rules:
//! - r0..r31 must match exactly, except r1 and r13.
//! - XER must match exactly.
//! - Of the condition register only the summary-overflow bit is compared.
//! - f0..f31 compare as doubles; two NaNs are equal whatever their payload.
//! - vr0..vr31 must match lane for lane. In live mode a vector mismatch is
//!   tolerated when the baseline has summary-overflow raised, since the vector
//!   result is then architecturally undefined. The peer's value is handed back
//!   as a correction so both sides continue from the same state.
//!
//! Everything here is allocation-free and safe to call from a trap handler.

use risu_state::{
    CR_SO, EXCLUDED_GPRS, NGPR, NVRREG, PT_FPSCR, RegisterSnapshot, TrapContext, VectorReg,
};

/// Floating-point registers f0..f31; FPSCR is not compared.
pub const NFPR: usize = PT_FPSCR;

/// Comparison mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Mid-run comparison with a live context to correct.
    Live,
    /// Post-run comparison; no tolerance recovery.
    Final,
}

/// Vector registers to overwrite in the live context with the peer's values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Corrections {
    vr_mask: u32,
}

impl Corrections {
    #[must_use]
    pub const fn none() -> Self {
        Self { vr_mask: 0 }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.vr_mask == 0
    }

    /// Number of vector registers to correct.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.vr_mask.count_ones()
    }

    #[must_use]
    pub const fn contains(&self, vr: usize) -> bool {
        vr < NVRREG && self.vr_mask & (1 << vr) != 0
    }

    const fn insert(&mut self, vr: usize) {
        self.vr_mask |= 1 << vr;
    }

    /// Indices of the vector registers to correct.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..NVRREG).filter(|&vr| self.contains(vr))
    }

    /// Write the peer's vector values into the live context.
    pub fn apply<C: TrapContext + ?Sized>(&self, peer: &RegisterSnapshot, ctx: &mut C) {
        for vr in self.iter() {
            ctx.set_vr(vr, peer.vrregs.vrregs[vr]);
        }
    }
}

/// Result of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Whether the snapshots count as the same state.
    pub equal: bool,
    /// Tolerated vector divergences to apply to the live context.
    pub corrections: Corrections,
}

impl Outcome {
    const MISMATCH: Self = Self {
        equal: false,
        corrections: Corrections::none(),
    };
}

/// Whether general register `idx` takes part in equality.
#[must_use]
pub const fn gpr_compared(idx: usize) -> bool {
    idx != EXCLUDED_GPRS[0] && idx != EXCLUDED_GPRS[1]
}

/// Floating-point slot equality with NaN equivalence.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn fp_equal(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

/// Lane-by-lane vector register equality.
#[must_use]
pub fn vr_equal(a: &VectorReg, b: &VectorReg) -> bool {
    a == b
}

/// Compare a local capture against the peer's snapshot.
///
/// The summary-overflow gate for vector tolerance is read from `baseline`.
/// Short-circuits on the first real mismatch.
#[must_use]
pub fn compare(baseline: &RegisterSnapshot, peer: &RegisterSnapshot, mode: Mode) -> Outcome {
    for i in 0..NGPR {
        if gpr_compared(i) && baseline.gregs[i] != peer.gregs[i] {
            return Outcome::MISMATCH;
        }
    }

    if baseline.xer() != peer.xer() {
        return Outcome::MISMATCH;
    }

    if baseline.ccr() & CR_SO != peer.ccr() & CR_SO {
        return Outcome::MISMATCH;
    }

    for i in 0..NFPR {
        if !fp_equal(baseline.fpregs[i], peer.fpregs[i]) {
            return Outcome::MISMATCH;
        }
    }

    let tolerate = mode == Mode::Live && baseline.summary_overflow();
    let mut corrections = Corrections::none();
    for i in 0..NVRREG {
        if !vr_equal(&baseline.vrregs.vrregs[i], &peer.vrregs.vrregs[i]) {
            if !tolerate {
                return Outcome::MISMATCH;
            }
            corrections.insert(i);
        }
    }

    Outcome {
        equal: true,
        corrections,
    }
}

/// Equality with the live context as an optional side channel.
///
/// With a context this is a live comparison and tolerated vector divergences
/// are written into it; without one it is a final comparison.
pub fn equal<C: TrapContext + ?Sized>(
    baseline: &RegisterSnapshot,
    peer: &RegisterSnapshot,
    ctx: Option<&mut C>,
) -> bool {
    match ctx {
        Some(ctx) => {
            let outcome = compare(baseline, peer, Mode::Live);
            if outcome.equal {
                outcome.corrections.apply(peer, ctx);
            }
            outcome.equal
        }
        None => compare(baseline, peer, Mode::Final).equal,
    }
}

/// Final-mode equality.
#[must_use]
pub fn regs_equal(baseline: &RegisterSnapshot, peer: &RegisterSnapshot) -> bool {
    compare(baseline, peer, Mode::Final).equal
}
