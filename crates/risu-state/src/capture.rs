//! Snapshot capture from a trapped context.
//!
//! Runs inside the trap handler: fixed-size copies only.

use crate::context::TrapContext;
use crate::snapshot::RegisterSnapshot;

/// Capture the register state of `ctx` into a fresh snapshot.
///
/// `nip` is stored relative to `image_base` so that two processes loaded at
/// different addresses stay comparable. The previous-instruction fields are
/// left zero for the driver to fill in.
#[must_use]
pub fn capture<C: TrapContext + ?Sized>(ctx: &C, image_base: u64) -> RegisterSnapshot {
    let mut snapshot = RegisterSnapshot::new();
    capture_into(&mut snapshot, ctx, image_base);
    snapshot
}

/// Capture into an existing snapshot, overwriting every slot.
pub fn capture_into<C: TrapContext + ?Sized>(
    snapshot: &mut RegisterSnapshot,
    ctx: &C,
    image_base: u64,
) {
    snapshot.clear();
    snapshot.faulting_insn = ctx.fetch_insn();
    snapshot.nip = ctx.pc().wrapping_sub(image_base);
    snapshot.gregs = *ctx.gregs();
    snapshot.fpregs = *ctx.fpregs();
    // Field by field so the frame's padding words never reach the wire.
    snapshot.vrregs.vrregs = ctx.vrregs().vrregs;
    snapshot.vrregs.vscr.word = ctx.vrregs().vscr.word;
    snapshot.vrregs.vrsave = ctx.vrregs().vrsave;
}
