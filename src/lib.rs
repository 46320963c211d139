//! ramscan library
//!
//! A pattern-based DRAM diagnostic engine: a page-aligned buffer is split
//! into one stripe per logical CPU and exercised with wide non-temporal
//! write/verify sweeps, counting every mismatching byte into a shared
//! atomic counter.

pub mod battery;   // Test procedures (march, inversions, addressing, ...)
pub mod buffer;    // Page-aligned test buffers (locked and portable)
pub mod dispatch;  // Per-tier bindings: one named callable per test
pub mod hardware;  // Host probing: CPUID tier, CPU count, SMBIOS speed
pub mod simd;      // SIMD word primitives, patterns, pattern RNG
pub mod sweep;     // Parallel block-sweep kernel and test context

// Re-export the main types
pub use dispatch::{Battery, BatteryEntry, TestFn};
pub use hardware::InstructionSet;
pub use simd::{Lane, Pattern, PatternRng, Scalar};
#[cfg(target_arch = "x86_64")]
pub use simd::{Avx2, Avx512};
pub use sweep::{Direction, TestContext};

/// Probe the host and bind the widest battery it supports.
///
/// Returns `None` on SSE-only hosts; callers that still want to sweep can
/// fall back to [`dispatch::scalar_battery`].
pub fn native_battery() -> Option<Battery> {
    dispatch::battery(hardware::instruction_set())
}
