// 512-bit lane. Same shape as the 256-bit lane; the verify path issues
// a load fence between the load and the compare so the comparison is
// never satisfied from a stale speculative load.

use std::arch::x86_64::*;

use super::{wide_report, Lane, Pattern};

#[derive(Debug, Clone, Copy)]
pub struct Avx512;

impl Lane for Avx512 {
    const WIDTH: usize = 64;
    const NAME: &'static str = "avx512";

    fn available() -> bool {
        is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512bw")
    }

    #[inline]
    unsafe fn store_nt(dst: *mut u8, pattern: &Pattern) {
        // SAFETY: forwarded from the trait contract; availability was
        // checked by the caller.
        unsafe { store_nt_512(dst, pattern) }
    }

    #[inline]
    unsafe fn verify(src: *const u8, pattern: &Pattern) -> u64 {
        // SAFETY: as above.
        unsafe { mismatch_mask_512(src, pattern) }
    }

    fn report(offset: usize, mask: u64) {
        eprintln!("{}", wide_report(u64::from(mask.count_ones()), offset, mask));
    }
}

#[target_feature(enable = "avx512f,avx512bw")]
unsafe fn store_nt_512(dst: *mut u8, pattern: &Pattern) {
    // SAFETY: pattern is 64-byte aligned by construction; dst is 64-byte
    // aligned per the Lane contract.
    unsafe {
        let value = _mm512_load_si512(pattern.as_ptr() as *const _);
        _mm512_stream_si512(dst as *mut _, value);
    }
}

#[target_feature(enable = "avx512f,avx512bw")]
unsafe fn mismatch_mask_512(src: *const u8, pattern: &Pattern) -> u64 {
    // SAFETY: both pointers are 64-byte aligned per the Lane contract.
    unsafe {
        let expected = _mm512_load_si512(pattern.as_ptr() as *const _);
        let actual = _mm512_load_si512(src as *const _);
        super::load_fence();
        _mm512_cmpneq_epi8_mask(expected, actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(64))]
    struct Cell([u8; 64]);

    #[test]
    fn store_and_verify_roundtrip() {
        if !Avx512::available() {
            eprintln!("skipping: no AVX-512 on this host");
            return;
        }
        let mut cell = Cell([0u8; 64]);
        let pattern = Pattern::splat_u64(0xDEAD_BEEF_0BAD_F00D);
        // SAFETY: cell is 64-byte aligned and 64 bytes long.
        unsafe {
            Avx512::store_nt(cell.0.as_mut_ptr(), &pattern);
            super::super::store_fence();
            assert_eq!(Avx512::verify(cell.0.as_ptr(), &pattern), 0);
            assert_eq!(Avx512::verify(cell.0.as_ptr(), &!pattern), u64::MAX);
        }
    }

    #[test]
    fn mismatch_mask_flags_exact_bytes() {
        if !Avx512::available() {
            eprintln!("skipping: no AVX-512 on this host");
            return;
        }
        let mut cell = Cell([0u8; 64]);
        let pattern = Pattern::zero();
        cell.0[0] = 0xFF;
        cell.0[63] = 0x01;
        // SAFETY: cell is 64-byte aligned and 64 bytes long.
        let mask = unsafe { Avx512::verify(cell.0.as_ptr(), &pattern) };
        assert_eq!(mask, 1 | (1 << 63));
    }
}
