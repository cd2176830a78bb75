//! Post-run diagnostics.
//!
//! Runs once after the trap handler has unwound, so it may allocate, log and
//! record metrics. Register dumps print every slot at full precision: integers
//! in hex, doubles in shortest round-trip exponent form, FPSCR as raw bits.

use std::io::{self, Write};

use console::style;
use tracing::{info, warn};

use risu_state::{
    EXCLUDED_GPRS, NVRREG, PT_CCR, PT_CTR, PT_DAR, PT_DSCR, PT_DSISR, PT_LNK, PT_MQ, PT_MSR,
    PT_NIP, PT_ORIG_R3, PT_RESULT, PT_TRAP, PT_XER, RegisterSnapshot,
};

use crate::compare::{Mode, NFPR, compare, fp_equal, vr_equal};
use crate::session::ComparisonSession;

/// Final status of a session.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Match = 0,
    Fail = 1,
}

impl MatchStatus {
    /// Process exit code for this status.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::Fail => "fail",
        }
    }
}

/// Named control slots of the general register set, in dump order.
const CONTROL_SLOTS: [(&str, usize); 13] = [
    ("nip", PT_NIP),
    ("msr", PT_MSR),
    ("orig r3", PT_ORIG_R3),
    ("ctr", PT_CTR),
    ("lnk", PT_LNK),
    ("xer", PT_XER),
    ("ccr", PT_CCR),
    ("mq", PT_MQ),
    ("trap", PT_TRAP),
    ("dar", PT_DAR),
    ("dsisr", PT_DSISR),
    ("result", PT_RESULT),
    ("dscr", PT_DSCR),
];

/// Diagnose the last state of a finished session.
///
/// Writes the verdict narrative to `out` and returns whether the session
/// ended in a match. Only the output stream can fail.
///
/// # Errors
///
/// Returns an error if writing to `out` fails.
pub fn report<W: Write + ?Sized>(session: &ComparisonSession, out: &mut W) -> io::Result<MatchStatus> {
    writeln!(out, "match status...")?;

    if session.packet_mismatch() {
        writeln!(out, "packet mismatch (probably disagreement about UNDEF on load/store)")?;
        writeln!(out, "apprentice reginfo:")?;
        dump(session.baseline(), false, out)?;
    }

    let regs_ok = compare(session.baseline(), session.peer(), Mode::Final).equal;
    if !regs_ok {
        writeln!(out, "mismatch on regs!")?;
    }
    let mem_ok = session.memory_ok();
    if !mem_ok {
        writeln!(out, "mismatch on memory!")?;
    }

    let status = if regs_ok && mem_ok {
        writeln!(out, "match!")?;
        MatchStatus::Match
    } else {
        writeln!(out, "master reginfo:")?;
        dump(session.peer(), true, out)?;
        writeln!(out, "apprentice reginfo:")?;
        dump(session.baseline(), false, out)?;
        dump_mismatch(session.peer(), session.baseline(), out)?;
        MatchStatus::Fail
    };

    let stats = session.stats();
    match status {
        MatchStatus::Match => info!(
            traps = stats.traps,
            compares = stats.compares,
            mem_compares = stats.mem_compares,
            tolerated = stats.tolerated,
            "session matched"
        ),
        MatchStatus::Fail => warn!(
            traps = stats.traps,
            packet_mismatch = session.packet_mismatch(),
            regs_ok,
            mem_ok,
            nip = session.baseline().nip,
            "session failed"
        ),
    }
    crate::metrics::record_session(&stats, status);

    Ok(status)
}

/// Print every slot of a snapshot.
///
/// With `with_header` the trap metadata (faulting and previous instruction,
/// previous address, relative nip) is printed first, highlighted.
///
/// # Errors
///
/// Returns an error if writing to `out` fails.
pub fn dump<W: Write + ?Sized>(
    snapshot: &RegisterSnapshot,
    with_header: bool,
    out: &mut W,
) -> io::Result<()> {
    if with_header {
        let hl = |value: String| style(value).bold().white().on_red();
        writeln!(out, "  faulting insn {}", hl(format!("0x{:x}", snapshot.faulting_insn)))?;
        writeln!(out, "  prev insn     {}", hl(format!("0x{:x}", snapshot.prev_insn)))?;
        writeln!(out, "  prev addr     {}", hl(format!("0x{:x}", snapshot.prev_addr)))?;
        writeln!(out, "  nip           {}", hl(format!("0x{:x}", snapshot.nip)))?;
        writeln!(out)?;
    }

    for i in 0..16 {
        writeln!(
            out,
            "\tr{:2}: {:16x}\tr{:2}: {:16x}",
            i,
            snapshot.gregs[i],
            i + 16,
            snapshot.gregs[i + 16]
        )?;
    }
    writeln!(out)?;

    for (name, slot) in CONTROL_SLOTS {
        writeln!(out, "\t{name:<7}: {:16x}", snapshot.gregs[slot])?;
    }
    writeln!(out)?;

    for i in 0..16 {
        writeln!(
            out,
            "\tf{:2}: {:e}\tf{:2}: {:e}",
            i,
            snapshot.fpregs[i],
            i + 16,
            snapshot.fpregs[i + 16]
        )?;
    }
    writeln!(out, "\tfpscr: {:016x}", snapshot.fpscr_bits())?;
    writeln!(out)?;

    for (i, vr) in snapshot.vrregs.vrregs.iter().enumerate() {
        writeln!(out, "vr{i:02}: {:8x}, {:8x}, {:8x}, {:8x}", vr[0], vr[1], vr[2], vr[3])?;
    }
    writeln!(out, "vscr  : {:8x}", snapshot.vrregs.vscr.word)?;
    writeln!(out, "vrsave: {:8x}", snapshot.vrregs.vrsave)?;
    Ok(())
}

/// Enumerate every individual difference between two snapshots.
///
/// Unlike the comparator, the condition register is compared in full here.
///
/// # Errors
///
/// Returns an error if writing to `out` fails.
pub fn dump_mismatch<W: Write + ?Sized>(
    master: &RegisterSnapshot,
    apprentice: &RegisterSnapshot,
    out: &mut W,
) -> io::Result<()> {
    for i in 0..32 {
        if EXCLUDED_GPRS.contains(&i) {
            continue;
        }
        if master.gregs[i] != apprentice.gregs[i] {
            writeln!(out, "Mismatch: Register r{i}")?;
            writeln!(
                out,
                "master: [{:x}] - apprentice: [{:x}]",
                master.gregs[i], apprentice.gregs[i]
            )?;
        }
    }

    if master.xer() != apprentice.xer() {
        writeln!(out, "Mismatch: XER")?;
        writeln!(out, "m: [{:x}] != a: [{:x}]", master.xer(), apprentice.xer())?;
    }

    if master.ccr() != apprentice.ccr() {
        writeln!(out, "Mismatch: Cond. Register")?;
        writeln!(out, "m: [{:x}] != a: [{:x}]", master.ccr(), apprentice.ccr())?;
    }

    for i in 0..NFPR {
        if !fp_equal(master.fpregs[i], apprentice.fpregs[i]) {
            writeln!(out, "Mismatch: Register f{i}")?;
            writeln!(
                out,
                "m: [{:e}] != a: [{:e}]",
                master.fpregs[i], apprentice.fpregs[i]
            )?;
        }
    }

    for i in 0..NVRREG {
        let (m, a) = (&master.vrregs.vrregs[i], &apprentice.vrregs.vrregs[i]);
        if !vr_equal(m, a) {
            writeln!(out, "Mismatch: Register vr{i}")?;
            writeln!(
                out,
                "m: [{:x}, {:x}, {:x}, {:x}] != a: [{:x}, {:x}, {:x}, {:x}]",
                m[0], m[1], m[2], m[3], a[0], a[1], a[2], a[3]
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use risu_state::{CR_SO, MEMBLOCKLEN, Opcode, PT_FPSCR, RegisterFile, Vscr, capture};

    fn render<F: FnOnce(&mut Vec<u8>) -> io::Result<()>>(f: F) -> String {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn sample() -> RegisterSnapshot {
        let mut snapshot = RegisterSnapshot::new();
        snapshot.faulting_insn = 0x0000_5af1;
        snapshot.prev_insn = 0x7c00_0214;
        snapshot.prev_addr = 0x1000_0ff8;
        snapshot.nip = 0xffc;
        for (i, reg) in snapshot.gregs.iter_mut().enumerate() {
            *reg = 0xabcd_0000_0000_0000 | u64::try_from(i).unwrap();
        }
        snapshot.fpregs[7] = -0.1;
        snapshot.fpregs[PT_FPSCR] = f64::from_bits(0x8200_0000);
        snapshot.vrregs.vrregs[31] = [0xdead_beef, 1, 2, 3];
        snapshot.vrregs.vscr = Vscr::new(0x0001_0000);
        snapshot.vrregs.vrsave = 0xffff_0000;
        snapshot
    }

    #[test]
    fn test_match_status_exit_codes() {
        assert_eq!(MatchStatus::Match.exit_code(), 0);
        assert_eq!(MatchStatus::Fail.exit_code(), 1);
    }

    #[test]
    fn test_identical_session_matches() {
        let session = ComparisonSession::from_snapshots(sample(), sample());
        let mut out = Vec::new();
        let status = report(&session, &mut out).unwrap();
        assert_eq!(status, MatchStatus::Match);
        assert_eq!(String::from_utf8(out).unwrap(), "match status...\nmatch!\n");
    }

    #[test]
    fn test_register_mismatch_reported() {
        let master = sample();
        let mut apprentice = master;
        apprentice.gregs[5] = 0x42;
        let session = ComparisonSession::from_snapshots(master, apprentice);

        let mut out = Vec::new();
        assert_eq!(report(&session, &mut out).unwrap(), MatchStatus::Fail);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("mismatch on regs!"));
        assert!(!text.contains("mismatch on memory!"));
        assert!(text.contains("master reginfo:"));
        assert!(text.contains("apprentice reginfo:"));
        assert!(text.contains("faulting insn"));
        assert!(text.contains("Mismatch: Register r5\nmaster: [abcd000000000005] - apprentice: [42]\n"));
        assert!(!text.contains("packet mismatch"));
    }

    #[test]
    fn test_memory_mismatch_reported() {
        let mut session = ComparisonSession::from_snapshots(sample(), sample());
        let master = vec![0u8; MEMBLOCKLEN];
        let mut apprentice = master.clone();
        apprentice[17] = 1;
        session.set_memory(&master, &apprentice).unwrap();

        let mut out = Vec::new();
        assert_eq!(report(&session, &mut out).unwrap(), MatchStatus::Fail);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("mismatch on memory!"));
        assert!(!text.contains("mismatch on regs!"));
    }

    #[test]
    fn test_unexercised_memory_ignored() {
        let session = ComparisonSession::from_snapshots(sample(), sample());
        assert!(!session.memory_exercised());
        let mut out = Vec::new();
        assert_eq!(report(&session, &mut out).unwrap(), MatchStatus::Match);
    }

    #[test]
    fn test_packet_mismatch_branch() {
        let mut session = ComparisonSession::from_snapshots(sample(), sample());
        session.packet_mismatch = true;
        let mut out = Vec::new();
        // Snapshots still agree, so the status is decided by the data checks.
        assert_eq!(report(&session, &mut out).unwrap(), MatchStatus::Match);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(
            "match status...\npacket mismatch (probably disagreement about UNDEF on load/store)\napprentice reginfo:\n"
        ));
        assert!(text.ends_with("match!\n"));
    }

    #[test]
    fn test_dump_prints_every_field() {
        let snapshot = sample();
        let text = render(|out| dump(&snapshot, true, out));

        assert!(text.contains("0x5af1"));
        assert!(text.contains("0x7c000214"));
        assert!(text.contains("0x10000ff8"));
        assert!(text.contains("0xffc"));
        for i in 0..32 {
            assert!(text.contains(&format!("r{i:2}: {:16x}", snapshot.gregs[i])));
        }
        for (name, slot) in CONTROL_SLOTS {
            assert!(text.contains(&format!("{name:<7}: {:16x}", snapshot.gregs[slot])));
        }
        assert!(text.contains("f 7: -1e-1"));
        assert!(text.contains("fpscr: 0000000082000000"));
        assert!(text.contains("vr31: deadbeef,        1,        2,        3"));
        assert!(text.contains("vscr  :    10000"));
        assert!(text.contains("vrsave: ffff0000"));
    }

    #[test]
    fn test_dump_fp_values_round_trip() {
        let mut snapshot = RegisterSnapshot::new();
        snapshot.fpregs[3] = 1.0 / 3.0;
        snapshot.fpregs[19] = f64::MIN_POSITIVE;
        let text = render(|out| dump(&snapshot, false, out));

        let parse = |label: &str| -> f64 {
            let start = text.find(label).unwrap() + label.len();
            let rest = &text[start..];
            let end = rest.find(['\t', '\n']).unwrap();
            rest[..end].parse().unwrap()
        };
        assert_eq!(parse("f 3: ").to_bits(), (1.0f64 / 3.0).to_bits());
        assert_eq!(parse("f19: ").to_bits(), f64::MIN_POSITIVE.to_bits());
    }

    /// Split a dump into `(label, value)` fields such as `("r 5", "   7")`.
    fn fields(text: &str) -> Vec<(&str, &str)> {
        text.lines()
            .flat_map(|line| line.split('\t'))
            .filter_map(|field| field.split_once(": "))
            .collect()
    }

    #[test]
    fn test_captured_state_survives_dump() {
        let mut ctx = RegisterFile::at(0x1000_0040, Opcode::Compare.encode());
        for (i, reg) in ctx.gregs.iter_mut().take(32).enumerate() {
            *reg = 0x8000_0000_0000_0000 | (u64::try_from(i).unwrap() << 40) | 0xfeed;
        }
        for (i, reg) in ctx.fpregs.iter_mut().take(32).enumerate() {
            let i = f64::from(u32::try_from(i).unwrap());
            *reg = (i - 15.5) / 7.0 * 10f64.powf(i * 9.0 - 140.0);
        }
        ctx.fpregs[30] = -0.0;
        ctx.fpregs[31] = f64::MAX;
        for (i, reg) in ctx.vrregs.vrregs.iter_mut().enumerate() {
            let i = u32::try_from(i).unwrap();
            *reg = [i, 0xffff_fff0 | i, i << 24, 0x0bad_f00d ^ i];
        }
        let snapshot = capture(&ctx, 0x1000_0000);
        let text = render(|out| dump(&snapshot, true, out));

        let mut gprs = [None; 32];
        let mut fprs = [None; 32];
        for (label, value) in fields(&text) {
            let (kind, index) = label.split_at(1);
            let Ok(index) = index.trim().parse::<usize>() else {
                continue;
            };
            match kind {
                "r" => gprs[index] = Some(u64::from_str_radix(value.trim(), 16).unwrap()),
                "f" => fprs[index] = Some(value.trim().parse::<f64>().unwrap()),
                _ => {}
            }
        }
        for i in 0..32 {
            assert_eq!(gprs[i], Some(ctx.gregs[i]), "r{i}");
            assert_eq!(fprs[i].map(f64::to_bits), Some(ctx.fpregs[i].to_bits()), "f{i}");
        }

        let mut vrs = 0;
        for line in text.lines() {
            let Some((label, lanes)) = line.strip_prefix("vr").and_then(|l| l.split_once(": ")) else {
                continue;
            };
            let Ok(index) = label.parse::<usize>() else {
                continue;
            };
            let lanes: Vec<u32> = lanes
                .split(',')
                .map(|lane| u32::from_str_radix(lane.trim(), 16).unwrap())
                .collect();
            assert_eq!(lanes, ctx.vrregs.vrregs[index], "vr{index}");
            vrs += 1;
        }
        assert_eq!(vrs, NVRREG);
    }

    #[test]
    fn test_dump_without_header() {
        let text = render(|out| dump(&sample(), false, out));
        assert!(!text.contains("faulting insn"));
        assert!(text.starts_with("\tr 0: "));
    }

    #[test]
    fn test_dump_mismatch_enumerates_differences() {
        let master = sample();
        let mut apprentice = master;
        apprentice.gregs[1] = 0;
        apprentice.gregs[13] = 0;
        apprentice.gregs[PT_XER] = 0x2000_0000;
        apprentice.gregs[PT_CCR] = master.gregs[PT_CCR] ^ 0x8000_0000;
        apprentice.fpregs[2] = 4.5;
        apprentice.vrregs.vrregs[9] = [1, 2, 3, 4];

        let text = render(|out| dump_mismatch(&master, &apprentice, out));
        assert!(!text.contains("Register r1\n"));
        assert!(!text.contains("Register r13\n"));
        assert!(text.contains("Mismatch: XER\n"));
        // Full register here, not just the summary-overflow bit.
        assert!(text.contains("Mismatch: Cond. Register\n"));
        assert!(text.contains("Mismatch: Register f2\nm: [0e0] != a: [4.5e0]\n"));
        assert!(text.contains("Mismatch: Register vr9\nm: [0, 0, 0, 0] != a: [1, 2, 3, 4]\n"));
        assert_eq!(text.matches("Mismatch:").count(), 4);
    }

    #[test]
    fn test_dump_mismatch_skips_nan_pairs() {
        let mut master = RegisterSnapshot::new();
        master.fpregs[4] = f64::NAN;
        master.gregs[PT_CCR] = CR_SO;
        let mut apprentice = master;
        apprentice.fpregs[4] = f64::from_bits(0x7ff8_0000_0000_0042);

        let text = render(|out| dump_mismatch(&master, &apprentice, out));
        assert!(text.is_empty());
    }
}
