//! Lock-step driver shared by the integration tests.
//!
//! Each side runs on its own thread with its own scratch region and image
//! base, handing a scripted sequence of trap contexts to its handler the way
//! a `SIGILL` handler would.

#![allow(dead_code)]

use std::os::unix::net::UnixStream;
use std::thread;

use risu::{
    Apprentice, ComparisonSession, Master, RegisterFile, ScratchRegion, StreamTransport,
    TrapContext, Verdict,
};

pub const MASTER_BASE: u64 = 0x1000_0000;
pub const APPRENTICE_BASE: u64 = 0x7fff_8000_0000;

/// One trap of a scripted test image, relative to the image base.
#[derive(Clone)]
pub struct Trap {
    pub offset: u64,
    pub insn: u32,
    pub setup: fn(&mut RegisterFile),
}

impl Trap {
    pub fn new(offset: u64, insn: u32) -> Self {
        Self {
            offset,
            insn,
            setup: |_| {},
        }
    }

    pub fn with(offset: u64, insn: u32, setup: fn(&mut RegisterFile)) -> Self {
        Self {
            offset,
            insn,
            setup,
        }
    }
}

/// Script for one side of a run.
#[derive(Clone, Default)]
pub struct Side {
    pub traps: Vec<Trap>,
    /// Initial scratch contents, copied to the start of the region.
    pub memory: Vec<u8>,
    /// Extra register tweaks applied after the per-trap setup.
    pub tweak: Option<fn(&mut RegisterFile)>,
}

impl Side {
    pub fn new(traps: Vec<Trap>) -> Self {
        Self {
            traps,
            ..Self::default()
        }
    }

    pub fn with_memory(mut self, memory: Vec<u8>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_tweak(mut self, tweak: fn(&mut RegisterFile)) -> Self {
        self.tweak = Some(tweak);
        self
    }

    /// Build the live context for trap `i`; r0 of SETMEMBLOCK gets the region.
    fn context(&self, i: usize, base: u64, region: &ScratchRegion) -> RegisterFile {
        let trap = &self.traps[i];
        let mut ctx = RegisterFile::at(base + trap.offset, trap.insn);
        (trap.setup)(&mut ctx);
        if let Some(tweak) = self.tweak {
            tweak(&mut ctx);
        }
        if risu::Opcode::classify(trap.insn) == risu::Opcode::SetMemBlock {
            ctx.gregs[0] = region.addr();
        }
        ctx
    }
}

/// What one side saw.
pub struct Trace {
    pub verdicts: Vec<Verdict>,
    /// Contexts after their trap was handled.
    pub contexts: Vec<RegisterFile>,
    pub region_addr: u64,
}

fn new_region(memory: &[u8]) -> ScratchRegion {
    let mut region = ScratchRegion::new().expect("scratch allocation");
    region.as_mut_slice()[..memory.len()].copy_from_slice(memory);
    region
}

pub fn run_master(stream: UnixStream, side: &Side) -> Trace {
    let region = new_region(&side.memory);
    let mut master = Master::new(StreamTransport::new(stream), MASTER_BASE);
    let mut trace = Trace {
        verdicts: Vec::new(),
        contexts: Vec::new(),
        region_addr: region.addr(),
    };

    for i in 0..side.traps.len() {
        let mut ctx = side.context(i, MASTER_BASE, &region);
        // SAFETY: `region` outlives the handler.
        let verdict = match unsafe { master.handle_trap(&mut ctx) } {
            Ok(verdict) => verdict,
            Err(_) => break,
        };
        master.set_previous(ctx.insn, ctx.pc());
        trace.verdicts.push(verdict);
        trace.contexts.push(ctx);
        if verdict != Verdict::Continue {
            break;
        }
    }
    trace
}

pub fn run_apprentice(stream: UnixStream, side: &Side) -> (Trace, ComparisonSession) {
    let region = new_region(&side.memory);
    let mut apprentice = Apprentice::new(
        StreamTransport::new(stream),
        ComparisonSession::new(APPRENTICE_BASE),
    );
    let mut trace = Trace {
        verdicts: Vec::new(),
        contexts: Vec::new(),
        region_addr: region.addr(),
    };

    for i in 0..side.traps.len() {
        let mut ctx = side.context(i, APPRENTICE_BASE, &region);
        // SAFETY: `region` outlives the handler.
        let verdict = unsafe { apprentice.handle_trap(&mut ctx) };
        apprentice.set_previous(ctx.insn, ctx.pc());
        trace.verdicts.push(verdict);
        trace.contexts.push(ctx);
        if verdict != Verdict::Continue {
            break;
        }
    }
    (trace, apprentice.into_session())
}

/// Run both sides in lock-step over a socket pair.
pub fn lockstep(master: Side, apprentice: Side) -> (Trace, Trace, ComparisonSession) {
    let (m, a) = UnixStream::pair().expect("socket pair");
    let handle = thread::spawn(move || run_master(m, &master));
    let (apprentice_trace, session) = run_apprentice(a, &apprentice);
    let master_trace = handle.join().expect("master thread");
    (master_trace, apprentice_trace, session)
}

/// Reporter output as a string.
pub fn report_text(session: &ComparisonSession) -> (risu::MatchStatus, String) {
    let mut out = Vec::new();
    let status = risu::report(session, &mut out).expect("write to vec");
    (status, String::from_utf8(out).expect("utf8 report"))
}

/// Deterministic register contents shared by both sides.
pub fn populate(ctx: &mut RegisterFile) {
    for i in 2..32 {
        if i != 13 {
            ctx.gregs[i] = 0x0123_4567_0000_0000 | u64::try_from(i).unwrap();
        }
    }
    for (i, reg) in ctx.fpregs.iter_mut().take(32).enumerate() {
        *reg = f64::from(u32::try_from(i).unwrap()).mul_add(1.5, -7.0);
    }
    for (i, reg) in ctx.vrregs.vrregs.iter_mut().enumerate() {
        let i = u32::try_from(i).unwrap();
        *reg = [i, i ^ 0xffff, i << 20, 0xa5a5_0000 | i];
    }
}

