//! Per-trap protocol handlers for the master and apprentice roles.
//!
//! Each trap runs capture, opcode classification and then either a transport
//! exchange or a local context mutation:
//!
//! | opcode        | master                      | apprentice                           |
//! |---------------|-----------------------------|--------------------------------------|
//! | compare       | send snapshot, read verdict | receive snapshot, compare, send verdict |
//! | testend       | same as compare             | same, `End` on a match               |
//! | setmemblock   | adopt r0 as scratch base    | adopt r0 as scratch base             |
//! | getmemblock   | r0 = r0 + scratch base      | r0 = r0 + scratch base               |
//! | comparemem    | send scratch, read verdict  | receive scratch, compare, send verdict |
//!
//! Both sides must classify the same opcode at the same position; there is no
//! resynchronisation, so a disagreement shows up later as a transport failure
//! or an unrelated-looking mismatch.
//!
//! `handle_trap` runs inside the trap handler: no allocation, no locks, no
//! logging.

use risu_state::{MemBlock, Opcode, RegisterSnapshot, TrapContext, capture, capture_into};

use crate::compare::{Mode, compare};
use crate::error::{Error, Result};
use crate::session::ComparisonSession;
use crate::transport::Transport;

/// Per-trap decision returned to the driver and sent to the master.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Resume past the trap.
    Continue = 0,
    /// Test sequence finished with matching state.
    End = 1,
    /// Stop and run the reporter.
    Mismatch = 2,
}

impl Verdict {
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Continue),
            1 => Some(Self::End),
            2 => Some(Self::Mismatch),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Metadata about the previously trapped instruction.
///
/// Set by the driver and stamped into the next capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Previous {
    insn: u32,
    addr: u64,
}

impl Previous {
    const fn stamp(self, snapshot: &mut RegisterSnapshot) {
        snapshot.prev_insn = self.insn;
        snapshot.prev_addr = self.addr;
    }
}

/// Initiator side: sends its state and obeys the apprentice's verdict.
pub struct Master<T> {
    transport: T,
    image_base: u64,
    memblock: MemBlock,
    previous: Previous,
}

impl<T: Transport> Master<T> {
    pub const fn new(transport: T, image_base: u64) -> Self {
        Self {
            transport,
            image_base,
            memblock: MemBlock::new(),
            previous: Previous { insn: 0, addr: 0 },
        }
    }

    /// Active scratch block of this side.
    pub const fn memblock(&self) -> MemBlock {
        self.memblock
    }

    /// Record the previously trapped instruction for the next snapshot.
    pub const fn set_previous(&mut self, insn: u32, addr: u64) {
        self.previous = Previous { insn, addr };
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Handle one trap.
    ///
    /// Returns the apprentice's verdict for exchanges and `Continue` for the
    /// local scratch-block operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails, the apprentice answers with an
    /// unknown verdict byte, or COMPAREMEM arrives before SETMEMBLOCK.
    ///
    /// # Safety
    ///
    /// Any scratch base announced through SETMEMBLOCK must point at
    /// `MEMBLOCKLEN` readable bytes for the rest of the run.
    pub unsafe fn handle_trap<C: TrapContext + ?Sized>(&mut self, ctx: &mut C) -> Result<Verdict> {
        let mut snapshot = capture(ctx, self.image_base);
        self.previous.stamp(&mut snapshot);

        match Opcode::classify(snapshot.faulting_insn) {
            Opcode::Compare | Opcode::TestEnd => {
                self.transport.send(snapshot.as_bytes())?;
                self.read_verdict()
            }
            Opcode::SetMemBlock => {
                self.memblock.set_base(snapshot.gregs[0]);
                Ok(Verdict::Continue)
            }
            Opcode::GetMemBlock => {
                ctx.set_greg(0, self.memblock.translate(snapshot.gregs[0]));
                Ok(Verdict::Continue)
            }
            Opcode::CompareMem => {
                // SAFETY: the caller guarantees the announced base.
                let contents = unsafe { self.memblock.contents() }.ok_or(Error::NoMemBlock)?;
                self.transport.send(contents)?;
                self.read_verdict()
            }
        }
    }

    fn read_verdict(&mut self) -> Result<Verdict> {
        let byte = self.transport.receive_byte()?;
        Verdict::from_byte(byte).ok_or(Error::InvalidVerdict(byte))
    }
}

/// Responder side: compares against the master and decides the verdict.
pub struct Apprentice<T> {
    transport: T,
    session: ComparisonSession,
    previous: Previous,
}

impl<T: Transport> Apprentice<T> {
    pub const fn new(transport: T, session: ComparisonSession) -> Self {
        Self {
            transport,
            session,
            previous: Previous { insn: 0, addr: 0 },
        }
    }

    pub const fn session(&self) -> &ComparisonSession {
        &self.session
    }

    /// Finish the run, handing the session to the reporter.
    pub fn into_session(self) -> ComparisonSession {
        self.session
    }

    /// Record the previously trapped instruction for the next snapshot.
    pub const fn set_previous(&mut self, insn: u32, addr: u64) {
        self.previous = Previous { insn, addr };
    }

    /// Handle one trap and return the verdict for the driver.
    ///
    /// Transport failures are folded into `Mismatch` and latch the session's
    /// packet-mismatch flag.
    ///
    /// # Safety
    ///
    /// Any scratch base announced through SETMEMBLOCK must point at
    /// `MEMBLOCKLEN` readable bytes for the rest of the run.
    pub unsafe fn handle_trap<C: TrapContext + ?Sized>(&mut self, ctx: &mut C) -> Verdict {
        self.session.stats.traps += 1;
        let image_base = self.session.image_base();
        capture_into(&mut self.session.baseline, ctx, image_base);
        self.previous.stamp(&mut self.session.baseline);

        let r0 = self.session.baseline.gregs[0];
        let op = Opcode::classify(self.session.baseline.faulting_insn);
        let verdict = match op {
            Opcode::Compare | Opcode::TestEnd => self.exchange_registers(ctx, op),
            Opcode::SetMemBlock => {
                self.session.memblock.set_base(r0);
                return Verdict::Continue;
            }
            Opcode::GetMemBlock => {
                ctx.set_greg(0, self.session.memblock.translate(r0));
                return Verdict::Continue;
            }
            // SAFETY: forwarded from the caller.
            Opcode::CompareMem => unsafe { self.exchange_memory() },
        };
        self.respond(verdict)
    }

    fn exchange_registers<C: TrapContext + ?Sized>(&mut self, ctx: &mut C, op: Opcode) -> Verdict {
        let session = &mut self.session;
        session.stats.compares += 1;

        if self.transport.receive(session.peer.as_bytes_mut()).is_err() {
            session.packet_mismatch = true;
            return Verdict::Mismatch;
        }

        let outcome = compare(&session.baseline, &session.peer, Mode::Live);
        if !outcome.equal {
            return Verdict::Mismatch;
        }
        outcome.corrections.apply(&session.peer, ctx);
        session.stats.tolerated += u64::from(outcome.corrections.len());

        if op == Opcode::TestEnd {
            Verdict::End
        } else {
            Verdict::Continue
        }
    }

    unsafe fn exchange_memory(&mut self) -> Verdict {
        let session = &mut self.session;
        session.memory_exercised = true;
        session.stats.mem_compares += 1;

        if self.transport.receive(&mut session.peer_memblock).is_err() {
            session.packet_mismatch = true;
            return Verdict::Mismatch;
        }

        // SAFETY: the caller guarantees the announced base.
        let Some(live) = (unsafe { session.memblock.contents() }) else {
            session.memblock_missing = true;
            return Verdict::Mismatch;
        };
        session.local_memblock.copy_from_slice(live);

        if session.memory_matches() {
            Verdict::Continue
        } else {
            Verdict::Mismatch
        }
    }

    fn respond(&mut self, verdict: Verdict) -> Verdict {
        let verdict = if self.transport.send_byte(verdict.as_byte()).is_err() {
            self.session.packet_mismatch = true;
            Verdict::Mismatch
        } else {
            verdict
        };
        if verdict == Verdict::Mismatch {
            self.session.stats.mismatches += 1;
        }
        verdict
    }
}
