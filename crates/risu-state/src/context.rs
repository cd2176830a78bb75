//! Execution contexts a trap can be captured from.
//!
//! `UContext` mirrors the Linux ppc64le signal frame so a `SIGILL` handler can
//! read and patch the interrupted thread's registers in place. `RegisterFile`
//! is an owned register file for emulators that keep their own state.

use std::ffi::c_void;

use crate::snapshot::{FpregSet, GregSet, NFPREG, NGREG, PT_NIP, VectorReg, VrRegSet};

/// Register access at a trap.
///
/// Implementations are used from signal handlers and must not allocate,
/// lock or log.
pub trait TrapContext {
    /// General registers and control slots.
    fn gregs(&self) -> &GregSet;

    /// Floating-point registers and FPSCR.
    fn fpregs(&self) -> &FpregSet;

    /// Vector registers, VSCR and VRSAVE.
    fn vrregs(&self) -> &VrRegSet;

    /// Fetch the 32-bit instruction word at the trapping PC.
    fn fetch_insn(&self) -> u32;

    /// Overwrite one general register slot.
    fn set_greg(&mut self, idx: usize, value: u64);

    /// Overwrite one vector register.
    fn set_vr(&mut self, idx: usize, value: VectorReg);

    /// Program counter at the trap.
    fn pc(&self) -> u64 {
        self.gregs()[PT_NIP]
    }

    /// Step over the trapping instruction.
    fn advance_pc(&mut self) {
        let pc = self.pc();
        self.set_greg(PT_NIP, pc.wrapping_add(4));
    }
}

/// `stack_t`.
#[repr(C)]
#[allow(dead_code)]
struct SignalStack {
    ss_sp: *mut c_void,
    ss_flags: i32,
    ss_size: usize,
}

/// Kernel `sigcontext` for 64-bit PowerPC.
///
/// # Layout
///
/// ```text
/// offset 0:     _unused[4]
/// offset 32:    signal (i32)
/// offset 36:    _pad0 (i32)
/// offset 40:    handler
/// offset 48:    oldmask
/// offset 56:    regs (*pt_regs, aliases gp_regs)
/// offset 64:    gp_regs[48]
/// offset 448:   fp_regs[33]
/// offset 712:   v_regs (*vrregset, points into vmx_reserve)
/// offset 720:   vmx_reserve[101]
/// ```
#[repr(C)]
#[allow(dead_code)]
struct MContext {
    _unused: [u64; 4],
    signal: i32,
    _pad0: i32,
    handler: u64,
    oldmask: u64,
    regs: *mut u64,
    gp_regs: GregSet,
    fp_regs: FpregSet,
    v_regs: *mut VrRegSet,
    vmx_reserve: [i64; 101],
}

/// Linux ppc64le `ucontext_t` as delivered to an `SA_SIGINFO` handler.
///
/// The kernel sigmask is 64 bits wide followed by 15 reserved words, which
/// matches glibc's 1024-bit `sigset_t`.
#[repr(C)]
#[allow(dead_code)]
pub struct UContext {
    uc_flags: u64,
    uc_link: *mut UContext,
    uc_stack: SignalStack,
    uc_sigmask: [u64; 16],
    uc_mcontext: MContext,
}

impl UContext {
    /// Borrow the signal frame passed as the third handler argument.
    ///
    /// # Safety
    ///
    /// `uc` must be the `ucontext_t` pointer the kernel handed to a running
    /// ppc64le signal handler, its `v_regs` pointer must be valid, and the
    /// returned borrow must not outlive the handler invocation.
    #[must_use]
    pub unsafe fn from_raw<'a>(uc: *mut c_void) -> &'a mut Self {
        unsafe { &mut *uc.cast::<Self>() }
    }
}

impl TrapContext for UContext {
    fn gregs(&self) -> &GregSet {
        &self.uc_mcontext.gp_regs
    }

    fn fpregs(&self) -> &FpregSet {
        &self.uc_mcontext.fp_regs
    }

    fn vrregs(&self) -> &VrRegSet {
        // SAFETY: guaranteed valid by the `from_raw` contract.
        unsafe { &*self.uc_mcontext.v_regs }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn fetch_insn(&self) -> u32 {
        // SAFETY: the kernel reported this PC as the faulting instruction, so
        // four bytes of text are mapped there.
        unsafe { std::ptr::with_exposed_provenance::<u32>(self.pc() as usize).read() }
    }

    fn set_greg(&mut self, idx: usize, value: u64) {
        self.uc_mcontext.gp_regs[idx] = value;
    }

    fn set_vr(&mut self, idx: usize, value: VectorReg) {
        // SAFETY: guaranteed valid by the `from_raw` contract.
        unsafe { (*self.uc_mcontext.v_regs).vrregs[idx] = value };
    }
}

/// Owned register file with an explicit instruction word.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    /// Instruction word at `gregs[PT_NIP]`.
    pub insn: u32,
    pub gregs: GregSet,
    pub fpregs: FpregSet,
    pub vrregs: VrRegSet,
}

impl RegisterFile {
    /// Create a zeroed register file.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            insn: 0,
            gregs: [0; NGREG],
            fpregs: [0.0; NFPREG],
            vrregs: VrRegSet::new(),
        }
    }

    /// Create a zeroed register file trapping on `insn` at `pc`.
    #[must_use]
    pub const fn at(pc: u64, insn: u32) -> Self {
        let mut file = Self::new();
        file.insn = insn;
        file.gregs[PT_NIP] = pc;
        file
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl TrapContext for RegisterFile {
    fn gregs(&self) -> &GregSet {
        &self.gregs
    }

    fn fpregs(&self) -> &FpregSet {
        &self.fpregs
    }

    fn vrregs(&self) -> &VrRegSet {
        &self.vrregs
    }

    fn fetch_insn(&self) -> u32 {
        self.insn
    }

    fn set_greg(&mut self, idx: usize, value: u64) {
        self.gregs[idx] = value;
    }

    fn set_vr(&mut self, idx: usize, value: VectorReg) {
        self.vrregs.vrregs[idx] = value;
    }
}
