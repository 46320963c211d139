// Host platform discovery
//
// Everything the sweep kernel needs to know about the machine it runs on:
// the widest usable instruction-set tier, the logical CPU budget, and a
// best-effort DRAM speed reading for display.

#[cfg(target_arch = "x86_64")]
mod cpuid;
pub mod smbios;

use std::fmt;
use std::num::NonZeroUsize;
use std::thread;

pub use smbios::{ram_speed, SpeedField};

/// Instruction-set tiers the engine distinguishes.
///
/// AVX512 requires both the Foundation and the Byte-and-Word extensions;
/// the SSE tier exists so the dispatcher can decline it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionSet {
    Sse,
    Avx2,
    Avx512,
}

impl fmt::Display for InstructionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstructionSet::Sse => write!(f, "sse"),
            InstructionSet::Avx2 => write!(f, "avx2"),
            InstructionSet::Avx512 => write!(f, "avx512"),
        }
    }
}

/// Report the widest tier the processor advertises.
#[cfg(target_arch = "x86_64")]
pub fn instruction_set() -> InstructionSet {
    cpuid::instruction_set()
}

#[cfg(not(target_arch = "x86_64"))]
pub fn instruction_set() -> InstructionSet {
    InstructionSet::Sse
}

/// True on processor steppings known to misbehave under memory testing
/// (family 6, model 0x97). Advisory only.
#[cfg(target_arch = "x86_64")]
pub fn has_memory_test_erratum() -> bool {
    cpuid::has_memory_test_erratum()
}

#[cfg(not(target_arch = "x86_64"))]
pub fn has_memory_test_erratum() -> bool {
    false
}

/// Logical CPUs available to this process.
///
/// Takes both the scheduler affinity mask and the cooperative worker pool
/// into account: when the pool is narrower than the mask allows, the
/// affinity count wins and the caller's context builds its pool that wide;
/// otherwise the pool size stands. Never returns zero.
pub fn cpu_count() -> usize {
    let affinity = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    let pool = rayon::current_num_threads();
    if pool < affinity { affinity } else { pool }
}
