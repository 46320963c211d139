// Scalar reference lane: the sweep semantics without vector
// instructions. Serves as the fallback for the declined SSE tier and
// lets the kernel and battery run on any host, test machines included.
// Volatile accesses keep the compiler from collapsing the write/read
// pairs the battery depends on.

use std::ptr;

use super::{narrow_report, Lane, Pattern};

#[derive(Debug, Clone, Copy)]
pub struct Scalar;

impl Lane for Scalar {
    const WIDTH: usize = 32;
    const NAME: &'static str = "scalar";

    fn available() -> bool {
        true
    }

    unsafe fn store_nt(dst: *mut u8, pattern: &Pattern) {
        let bytes = pattern.as_bytes();
        for (i, &byte) in bytes.iter().take(Self::WIDTH).enumerate() {
            // SAFETY: dst is valid for WIDTH bytes per the Lane contract.
            unsafe { ptr::write_volatile(dst.add(i), byte) };
        }
    }

    unsafe fn verify(src: *const u8, pattern: &Pattern) -> u64 {
        let expected = pattern.as_bytes();
        let mut mask = 0u64;
        for (i, &want) in expected.iter().take(Self::WIDTH).enumerate() {
            // SAFETY: src is valid for WIDTH bytes per the Lane contract.
            let got = unsafe { ptr::read_volatile(src.add(i)) };
            if got != want {
                mask |= 1 << i;
            }
        }
        mask
    }

    fn report(offset: usize, _mask: u64) {
        eprintln!("{}", narrow_report(offset));
    }
}
