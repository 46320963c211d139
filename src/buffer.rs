//! Page-aligned test buffers.
//!
//! [`LockedBuffer`] is the production allocation: an anonymous private
//! mapping pinned with `mlock` so the pages under test stay resident.
//! [`AlignedBuffer`] is the portable variant used on hosts without a
//! Unix mapping layer and throughout the test suite.

use std::fmt;
use std::io;
use std::ops::{Deref, DerefMut};

/// Alignment of every buffer handed to the sweep kernel. A page boundary
/// satisfies the widest SIMD word with room to spare.
pub const BUFFER_ALIGN: usize = 4096;

#[derive(Debug)]
pub enum BufferError {
    /// The requested size was zero.
    ZeroSize,
    /// The mapping syscall failed.
    Map(io::Error),
    /// The aligned allocation failed.
    Alloc { size: usize },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::ZeroSize => write!(f, "test buffer size must be nonzero"),
            BufferError::Map(err) => write!(f, "mmap failed: {err}"),
            BufferError::Alloc { size } => {
                write!(f, "failed to allocate {size} aligned bytes")
            }
        }
    }
}

impl std::error::Error for BufferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BufferError::Map(err) => Some(err),
            _ => None,
        }
    }
}

/// An anonymous page-aligned mapping, pinned with `mlock` when the
/// system permits it.
#[cfg(unix)]
pub struct LockedBuffer {
    ptr: *mut u8,
    len: usize,
    locked: bool,
}

// SAFETY: the buffer owns its mapping exclusively; sending the handle
// moves that ownership with it.
#[cfg(unix)]
unsafe impl Send for LockedBuffer {}
#[cfg(unix)]
unsafe impl Sync for LockedBuffer {}

#[cfg(unix)]
impl LockedBuffer {
    pub fn new(len: usize) -> Result<Self, BufferError> {
        if len == 0 {
            return Err(BufferError::ZeroSize);
        }
        // SAFETY: anonymous private mapping; the result is checked for
        // MAP_FAILED before use.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(BufferError::Map(io::Error::last_os_error()));
        }
        // Pinning is best effort: RLIMIT_MEMLOCK commonly forbids large
        // locks and the sweeps still work against swappable pages.
        // SAFETY: ptr/len describe the mapping created above.
        let locked = unsafe { libc::mlock(ptr, len) } == 0;
        Ok(LockedBuffer {
            ptr: ptr as *mut u8,
            len,
            locked,
        })
    }

    /// Whether `mlock` succeeded; purely informational.
    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

#[cfg(unix)]
impl Deref for LockedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: the mapping is live for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

#[cfg(unix)]
impl DerefMut for LockedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

#[cfg(unix)]
impl Drop for LockedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr/len came from mmap in new() and are unmapped once.
        unsafe {
            if self.locked {
                libc::munlock(self.ptr as *const libc::c_void, self.len);
            }
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

/// A zero-initialized allocation with page alignment, without residency
/// guarantees.
pub struct AlignedBuffer {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: exclusive ownership of the allocation, as for LockedBuffer.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    pub fn new(len: usize) -> Result<Self, BufferError> {
        if len == 0 {
            return Err(BufferError::ZeroSize);
        }
        let layout = std::alloc::Layout::from_size_align(len, BUFFER_ALIGN)
            .map_err(|_| BufferError::Alloc { size: len })?;
        // SAFETY: layout has nonzero size.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(BufferError::Alloc { size: len });
        }
        Ok(AlignedBuffer { ptr, len })
    }

    /// Matches the [`LockedBuffer`] interface; this variant never locks.
    pub fn is_locked(&self) -> bool {
        false
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: the allocation is live for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        let layout = std::alloc::Layout::from_size_align(self.len, BUFFER_ALIGN)
            .expect("layout was validated in new()");
        // SAFETY: ptr was returned by alloc_zeroed with this layout.
        unsafe { std::alloc::dealloc(self.ptr, layout) };
    }
}
