//! risu - lock-step differential instruction testing for ppc64le
//!
//! A master and an apprentice run the same test image and trap on keyed
//! illegal instructions. At each trap the master sends its register snapshot
//! (or scratch memory) and the apprentice compares it against its own state,
//! answering with a [`Verdict`]. When a run stops, [`report`] diagnoses the
//! last compared state.
//!
//! # Example
//!
//! ```ignore
//! use risu::{Apprentice, ComparisonSession, StreamTransport, Verdict};
//!
//! let transport = StreamTransport::new(stream);
//! let mut apprentice = Apprentice::new(transport, ComparisonSession::new(image_base));
//!
//! // From the SIGILL handler:
//! match unsafe { apprentice.handle_trap(ctx) } {
//!     Verdict::Continue => ctx.advance_pc(),
//!     Verdict::End | Verdict::Mismatch => { /* stop, then report */ }
//! }
//!
//! let status = risu::report(&apprentice.into_session(), &mut std::io::stderr())?;
//! ```

// Re-export the register model
pub use risu_state::{
    CR_SO, MEMBLOCKLEN, MemBlock, NFPREG, NGPR, NGREG, NVRREG, Opcode, RegisterFile,
    RegisterSnapshot, SNAPSHOT_SIZE, ScratchRegion, TrapContext, UContext, capture, capture_into,
};

pub mod compare;
mod error;
mod handler;
pub mod metrics;
pub mod record;
mod report;
mod session;
mod transport;

pub use compare::{Corrections, Mode, Outcome, equal, regs_equal};
pub use error::{Error, Result};
pub use handler::{Apprentice, Master, Verdict};
pub use report::{MatchStatus, dump, dump_mismatch, report};
pub use session::{ComparisonSession, TrapStats};
pub use transport::{StreamTransport, Transport, TransportError};
