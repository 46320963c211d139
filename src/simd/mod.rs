// SIMD word primitives
//
// The sweep kernel is generic over a `Lane`: the capability set one
// SIMD width must provide. That set is a broadcast-pattern non-temporal
// store, an aligned verify-load producing a per-byte mismatch mask, and
// the diagnostic line format for that tier. The 256-bit and 512-bit lanes
// are structurally identical instantiations; the scalar lane is the
// reference used when no vector tier is available.

mod pattern;
pub mod rng;

#[cfg(target_arch = "x86_64")]
mod avx2;
#[cfg(target_arch = "x86_64")]
mod avx512;
mod scalar;

pub use pattern::{Pattern, MAX_WIDTH};
pub use rng::PatternRng;
pub use scalar::Scalar;
#[cfg(target_arch = "x86_64")]
pub use {avx2::Avx2, avx512::Avx512};

/// One SIMD width and its memory primitives.
///
/// # Safety contract
/// The unsafe methods require `dst`/`src` to be [`Lane::WIDTH`]-aligned
/// and valid for `WIDTH` bytes, and [`Lane::available`] to have returned
/// true on this host.
pub trait Lane: Copy + Send + Sync + 'static {
    /// Word width in bytes.
    const WIDTH: usize;
    /// Short name used in reports and assertions.
    const NAME: &'static str;

    /// Whether this host can execute the lane's instructions.
    fn available() -> bool;

    /// Aligned non-temporal store of the pattern's leading `WIDTH` bytes.
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn store_nt(dst: *mut u8, pattern: &Pattern);

    /// Aligned load and byte-wise compare against the pattern. Bit `i` of
    /// the result is set iff byte `i` differs.
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn verify(src: *const u8, pattern: &Pattern) -> u64;

    /// Emit the tier's diagnostic line for a mismatching word.
    fn report(offset: usize, mask: u64);
}

/// Diagnostic line of the narrow tiers.
pub(crate) fn narrow_report(offset: usize) -> String {
    format!("errors detected at offset 0x{offset:016x}")
}

/// Diagnostic line of the 512-bit tier, with the per-byte mismatch mask.
pub(crate) fn wide_report(count: u64, offset: usize, mask: u64) -> String {
    format!("{count} errors detected at offset 0x{offset:016x} [error mask: 0x{mask:016x}]")
}

/// Retire all outstanding stores, non-temporal ones included, before any
/// later load. Every write phase ends with this fence.
#[cfg(target_arch = "x86_64")]
pub fn store_fence() {
    // SAFETY: SFENCE is part of the x86_64 baseline.
    unsafe { std::arch::x86_64::_mm_sfence() }
}

#[cfg(not(target_arch = "x86_64"))]
pub fn store_fence() {
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
}

/// Serialize outstanding loads; the wide tier issues this between its
/// verify-load and the compare.
#[cfg(target_arch = "x86_64")]
pub fn load_fence() {
    // SAFETY: LFENCE is part of the x86_64 baseline.
    unsafe { std::arch::x86_64::_mm_lfence() }
}

#[cfg(not(target_arch = "x86_64"))]
pub fn load_fence() {
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
}

/// Evict the cache line holding `line`; pair with [`store_fence`] to push
/// freshly computed data out toward DRAM.
#[cfg(target_arch = "x86_64")]
pub fn flush_cache_line(line: *const u8) {
    if has_clflushopt() {
        // SAFETY: support checked on the line above.
        unsafe { flush_line_opt(line) }
    } else {
        // SAFETY: CLFLUSH is part of the x86_64 baseline.
        unsafe { std::arch::x86_64::_mm_clflush(line) }
    }
}

#[cfg(not(target_arch = "x86_64"))]
pub fn flush_cache_line(_line: *const u8) {}

// CLFLUSHOPT support: CPUID leaf 7 sub-leaf 0, EBX bit 23. Probed via raw
// CPUID instead of `is_x86_feature_detected!` because this toolchain's
// target-feature table does not recognize "clflushopt" as a stable name.
#[cfg(target_arch = "x86_64")]
fn has_clflushopt() -> bool {
    const BIT_CLFLUSHOPT: u32 = 1 << 23;
    // SAFETY: CPUID leaf 7 is unprivileged and present on every x86_64 CPU;
    // it reads as zero (not a fault) where the leaf is unsupported.
    let ebx = unsafe { std::arch::x86_64::__cpuid_count(0x07, 0) }.ebx;
    ebx & BIT_CLFLUSHOPT != 0
}

// Issued via inline asm rather than `_mm_clflushopt`/`#[target_feature(enable
// = "clflushopt")]` for the same reason as `has_clflushopt` above: this
// toolchain rejects "clflushopt" as a valid target feature name even though
// the instruction itself is only ever reached after `has_clflushopt` returns
// true.
#[cfg(target_arch = "x86_64")]
unsafe fn flush_line_opt(line: *const u8) {
    // SAFETY: the caller verified CLFLUSHOPT support; `line` is a valid
    // pointer per this function's (inherited) safety contract.
    unsafe {
        std::arch::asm!("clflushopt [{0}]", in(reg) line, options(nostack, preserves_flags));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_report_format() {
        assert_eq!(
            narrow_report(0x1234),
            "errors detected at offset 0x0000000000001234"
        );
    }

    #[test]
    fn wide_report_format() {
        assert_eq!(
            wide_report(3, 0x40, 0x0000_0000_0000_0E00),
            "3 errors detected at offset 0x0000000000000040 [error mask: 0x0000000000000e00]"
        );
    }

    #[test]
    fn fences_are_callable() {
        store_fence();
        load_fence();
        let byte = 0u8;
        flush_cache_line(&byte);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn vector_lane_widths() {
        assert_eq!(Avx2::WIDTH, 32);
        assert_eq!(Avx512::WIDTH, 64);
        assert_eq!(Scalar::WIDTH, 32);
    }
}
