//! Compute/store-path stress.
//!
//! The buffer is zeroed, then each stripe is treated as a chain of
//! consecutive 64x64 single-precision tiles: every tile is the product
//! of the two tiles before it (alpha=1, beta=0, row-major). Since the
//! inputs are zero the products must stay zero; each computed tile is
//! flushed line by line and fenced so the writeback path is exercised
//! under compute load. Residual nonzero bytes point at the store or
//! eviction path.

#[cfg(feature = "sgemm")]
use crate::simd::{self, Lane, Pattern};
#[cfg(feature = "sgemm")]
use crate::sweep::Direction;

use crate::sweep::TestContext;

#[cfg(feature = "sgemm")]
const TILE_DIM: usize = 64;
#[cfg(feature = "sgemm")]
const TILE_BYTES: usize = TILE_DIM * TILE_DIM * size_of::<f32>();

#[cfg(feature = "sgemm")]
pub fn sgemm<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    let zeroes = Pattern::zero();
    ctx.set_all::<L>(mem, Direction::Down, &zeroes);

    for _ in 0..32 {
        ctx.for_each_stripe(mem, |_, stripe| {
            let mut offset = 2 * TILE_BYTES;
            while offset + TILE_BYTES <= stripe.len() {
                multiply_preceding_tiles(stripe, offset);
                for line in (0..TILE_BYTES).step_by(64) {
                    simd::flush_cache_line(stripe[offset + line..].as_ptr());
                }
                simd::store_fence();
                offset += TILE_BYTES;
            }
        });
    }

    ctx.get_all::<L>(mem, Direction::Up, &zeroes);
}

/// C <- A * B over the three consecutive tiles ending at `offset`.
#[cfg(feature = "sgemm")]
fn multiply_preceding_tiles(stripe: &mut [u8], offset: usize) {
    let window = &mut stripe[offset - 2 * TILE_BYTES..offset + TILE_BYTES];
    let (inputs, output) = window.split_at_mut(2 * TILE_BYTES);
    let a = inputs.as_ptr() as *const f32;
    let b = inputs[TILE_BYTES..].as_ptr() as *const f32;
    let c = output.as_mut_ptr() as *mut f32;
    // SAFETY: the window spans three whole tiles inside one stripe; a and
    // b are read-only, c is exclusively borrowed, and all three are
    // 4-byte aligned because tiles start at multiples of TILE_BYTES in a
    // page-aligned buffer.
    unsafe {
        matrixmultiply::sgemm(
            TILE_DIM,
            TILE_DIM,
            TILE_DIM,
            1.0,
            a,
            TILE_DIM as isize,
            1,
            b,
            TILE_DIM as isize,
            1,
            0.0,
            c,
            TILE_DIM as isize,
            1,
        );
    }
}

/// Without a linked GEMM the stress test is a no-op.
#[cfg(not(feature = "sgemm"))]
pub fn sgemm<L: crate::simd::Lane>(_ctx: &TestContext, _mem: &mut [u8]) {}
