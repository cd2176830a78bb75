//! Scratch memory block shared by convention between master and apprentice.
//!
//! Each side owns its own `MEMBLOCKLEN`-byte buffer at its own address; the
//! test image announces the address with `SETMEMBLOCK` and only the contents
//! are compared.

use nix::sys::mman::{MapFlags, ProtFlags, mmap_anonymous, mprotect, munmap};
use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use thiserror::Error;

/// Length of the scratch block in bytes.
pub const MEMBLOCKLEN: usize = 8192;

/// Guard page size around a [`ScratchRegion`].
pub const GUARD_SIZE: usize = 1 << 14;

/// Active scratch block base for the current side.
///
/// A zero base means no `SETMEMBLOCK` has been seen yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemBlock {
    base: u64,
}

impl MemBlock {
    #[must_use]
    pub const fn new() -> Self {
        Self { base: 0 }
    }

    /// Base address, if one has been announced.
    #[must_use]
    pub const fn base(&self) -> Option<u64> {
        if self.base == 0 { None } else { Some(self.base) }
    }

    /// Adopt a new base, replacing any previous one.
    pub const fn set_base(&mut self, base: u64) {
        self.base = base;
    }

    /// Absolute address of a side-relative offset.
    #[must_use]
    pub const fn translate(&self, offset: u64) -> u64 {
        offset.wrapping_add(self.base)
    }

    /// Borrow the live block contents.
    ///
    /// Returns `None` if no base has been announced.
    ///
    /// # Safety
    ///
    /// The announced base must point at `MEMBLOCKLEN` readable bytes that stay
    /// mapped for the lifetime of the returned slice.
    #[must_use]
    pub unsafe fn contents<'a>(&self) -> Option<&'a [u8]> {
        let base = usize::try_from(self.base().unwrap_or(0)).ok()?;
        let ptr = std::ptr::with_exposed_provenance::<u8>(base);
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts(ptr, MEMBLOCKLEN) })
    }
}

/// Scratch allocation error.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("mmap failed: {0}")]
    MmapFailed(#[from] nix::Error),

    #[error("invalid scratch size: {0}")]
    InvalidSize(usize),
}

/// Page-backed scratch buffer with guard pages on each side.
///
/// Allocates `[GUARD][MEMORY][GUARD]` with the guards protected as
/// `PROT_NONE`, so a test image that runs off either end of its scratch block
/// faults instead of corrupting neighbouring state.
pub struct ScratchRegion {
    /// Start of the whole mapping, including the first guard.
    region: NonNull<c_void>,
    /// Total size including both guards.
    total_size: usize,
    /// Usable size.
    size: usize,
}

impl ScratchRegion {
    /// Allocate a zeroed region of `MEMBLOCKLEN` usable bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if mmap fails.
    pub fn new() -> Result<Self, MemoryError> {
        Self::with_size(MEMBLOCKLEN)
    }

    /// Allocate a zeroed region of `size` usable bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero or mmap fails.
    pub fn with_size(size: usize) -> Result<Self, MemoryError> {
        if size == 0 {
            return Err(MemoryError::InvalidSize(size));
        }

        let total_size = size
            .checked_add(2 * GUARD_SIZE)
            .ok_or(MemoryError::InvalidSize(size))?;
        let total_size_nz = NonZeroUsize::new(total_size).ok_or(MemoryError::InvalidSize(size))?;

        // Map everything inaccessible, then open up the middle.
        let region = unsafe {
            mmap_anonymous(
                None,
                total_size_nz,
                ProtFlags::PROT_NONE,
                MapFlags::MAP_PRIVATE | MapFlags::MAP_NORESERVE,
            )?
        };

        let usable = unsafe {
            NonNull::new_unchecked(region.as_ptr().cast::<u8>().add(GUARD_SIZE).cast::<c_void>())
        };
        if let Err(e) = unsafe {
            mprotect(usable, size, ProtFlags::PROT_READ | ProtFlags::PROT_WRITE)
        } {
            unsafe {
                let _ = munmap(region, total_size);
            }
            return Err(e.into());
        }

        Ok(Self {
            region,
            total_size,
            size,
        })
    }

    /// Pointer to the usable memory.
    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        unsafe { self.region.as_ptr().cast::<u8>().add(GUARD_SIZE) }
    }

    /// Address of the usable memory, as a test image would pass it in r0.
    #[must_use]
    pub fn addr(&self) -> u64 {
        self.as_ptr().expose_provenance() as u64
    }

    /// Usable size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub const fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.size) }
    }

    pub const fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.as_ptr(), self.size) }
    }
}

impl Drop for ScratchRegion {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.region, self.total_size);
        }
    }
}

// ScratchRegion is Send but not Sync (contains raw pointer)
unsafe impl Send for ScratchRegion {}
