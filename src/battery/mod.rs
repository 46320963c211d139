//! The pattern test battery.
//!
//! Every procedure takes the run context and the buffer and is generic
//! over the SIMD lane; the dispatcher instantiates each one per tier.
//! Writes are always paired with a read phase of the same pattern, and
//! the patterns target distinct fault classes: stuck-at bits, coupling
//! between neighbors, address decoding, data-pattern sensitivity, and
//! the compute/store path.

mod sgemm;

pub use sgemm::sgemm;

use crate::simd::{Lane, Pattern};
use crate::sweep::{Direction, TestContext};

/// Six broadcast bytes, written and verified in both sweep orders.
pub fn basic_tests<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    const PATTERNS: [u8; 6] = [0x00, 0xFF, 0x0F, 0xF0, 0x55, 0xAA];
    for byte in PATTERNS {
        let pattern = Pattern::splat_u8(byte);
        ctx.set_all::<L>(mem, Direction::Up, &pattern);
        ctx.get_all::<L>(mem, Direction::Up, &pattern);
        ctx.set_all::<L>(mem, Direction::Down, &pattern);
        ctx.get_all::<L>(mem, Direction::Down, &pattern);
    }
}

/// Two passes of an X-march: transition reads and complement writes in
/// both orders, in the March C- family.
pub fn march<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    let ones = Pattern::splat_u8(0xFF);
    let zeroes = Pattern::splat_u8(0x00);
    for _ in 0..2 {
        ctx.set_all::<L>(mem, Direction::Down, &zeroes);
        ctx.sweep::<L>(mem, Direction::Up, |offset, cell| {
            ctx.get_cell::<L>(offset, cell, &zeroes);
            ctx.set_cell::<L>(cell, &ones);
            ctx.get_cell::<L>(offset, cell, &ones);
            ctx.set_cell::<L>(cell, &zeroes);
            ctx.get_cell::<L>(offset, cell, &zeroes);
            ctx.set_cell::<L>(cell, &ones);
        });
        ctx.sweep::<L>(mem, Direction::Up, |offset, cell| {
            ctx.get_cell::<L>(offset, cell, &ones);
            ctx.set_cell::<L>(cell, &zeroes);
            ctx.set_cell::<L>(cell, &ones);
        });
        ctx.sweep::<L>(mem, Direction::Down, |offset, cell| {
            ctx.get_cell::<L>(offset, cell, &ones);
            ctx.set_cell::<L>(cell, &zeroes);
            ctx.set_cell::<L>(cell, &ones);
            ctx.set_cell::<L>(cell, &zeroes);
        });
        ctx.sweep::<L>(mem, Direction::Down, |offset, cell| {
            ctx.get_cell::<L>(offset, cell, &zeroes);
            ctx.set_cell::<L>(cell, &ones);
            ctx.set_cell::<L>(cell, &zeroes);
        });
    }
}

/// Sixteen rounds of a fresh random word and its inverse.
pub fn random_inversions<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    for _ in 0..16 {
        let pattern = ctx.next_pattern();
        ctx.set_all::<L>(mem, Direction::Up, &pattern);
        ctx.get_all::<L>(mem, Direction::Up, &pattern);
        let inverse = !pattern;
        ctx.set_all::<L>(mem, Direction::Up, &inverse);
        ctx.get_all::<L>(mem, Direction::Up, &inverse);
    }
}

/// Shift applied to the broadcast seed element between rounds. The
/// 64-bit variants walk a bit through each 64-bit lane of the periodic
/// seed; the 16-bit variant drives the saturation walks.
#[derive(Debug, Clone, Copy)]
enum ElementShift {
    Left64,
    Right64,
    Right16,
}

impl ElementShift {
    fn pattern(self, seed: u64, round: u32) -> Pattern {
        match self {
            ElementShift::Left64 => Pattern::splat_u64(seed << round),
            ElementShift::Right64 => Pattern::splat_u64(seed >> round),
            ElementShift::Right16 => Pattern::splat_u16((seed as u16) >> round),
        }
    }
}

fn moving_inversions<L: Lane>(
    ctx: &TestContext,
    mem: &mut [u8],
    rounds: u32,
    shift: ElementShift,
    seed: u64,
) {
    for round in 0..rounds {
        let pattern = shift.pattern(seed, round);
        ctx.set_all::<L>(mem, Direction::Up, &pattern);
        ctx.get_all::<L>(mem, Direction::Up, &pattern);
        let inverse = !pattern;
        ctx.set_all::<L>(mem, Direction::Up, &inverse);
        ctx.get_all::<L>(mem, Direction::Up, &inverse);
    }
}

/// A single set bit walking left through each 64-bit element.
pub fn moving_inversions_left_64<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    moving_inversions::<L>(ctx, mem, 64, ElementShift::Left64, 0x0000_0000_0000_0001);
}

/// The 32-bit top bit walking right; the 64-bit lane shift walks both
/// halves of the periodic seed at once.
pub fn moving_inversions_right_32<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    moving_inversions::<L>(ctx, mem, 32, ElementShift::Right64, 0x8000_0000_8000_0000);
}

pub fn moving_inversions_left_16<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    moving_inversions::<L>(ctx, mem, 16, ElementShift::Left64, 0x0001_0001_0001_0001);
}

pub fn moving_inversions_right_8<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    moving_inversions::<L>(ctx, mem, 8, ElementShift::Right64, 0x8080_8080_8080_8080);
}

/// A nibble pattern so the 4-round walk exercises both nibbles of every
/// byte simultaneously.
pub fn moving_inversions_left_4<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    moving_inversions::<L>(ctx, mem, 4, ElementShift::Left64, 0x1111_1111_1111_1111);
}

fn moving_saturations<L: Lane>(ctx: &TestContext, mem: &mut [u8], rounds: u32, seed: u16) {
    let zeroes = Pattern::splat_u8(0x00);
    let ones = Pattern::splat_u8(0xFF);
    for round in 0..rounds {
        let pattern = ElementShift::Right16.pattern(u64::from(seed), round);
        ctx.set_all::<L>(mem, Direction::Up, &pattern);
        ctx.get_all::<L>(mem, Direction::Up, &pattern);
        ctx.set_all::<L>(mem, Direction::Up, &zeroes);
        ctx.get_all::<L>(mem, Direction::Up, &zeroes);
        ctx.set_all::<L>(mem, Direction::Up, &pattern);
        ctx.get_all::<L>(mem, Direction::Up, &pattern);
        ctx.set_all::<L>(mem, Direction::Up, &ones);
        ctx.get_all::<L>(mem, Direction::Up, &ones);
    }
}

/// The 16-bit top bit walking right, with all-zero and all-one
/// interludes between pattern states to stress decay.
pub fn moving_saturations_right_16<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    moving_saturations::<L>(ctx, mem, 16, 0x8000);
}

/// Eight rounds on the 0x0001 seed through the same 16-bit shift; the
/// pattern saturates to zero after the first round and the interludes
/// carry the stress.
pub fn moving_saturations_left_8<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    moving_saturations::<L>(ctx, mem, 8, 0x0001);
}

/// Sixteen rounds of address-as-data in both sweep orders: each cell
/// stores its own offset plus per-lane byte increments, so a decoder
/// fault lands the datum in a cell that disagrees with it.
pub fn addressing<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    for _ in 0..16 {
        ctx.sweep::<L>(mem, Direction::Up, |offset, cell| {
            ctx.set_cell::<L>(cell, &Pattern::block_index(offset));
        });
        ctx.sweep::<L>(mem, Direction::Up, |offset, cell| {
            ctx.get_cell::<L>(offset, cell, &Pattern::block_index(offset));
        });
        ctx.sweep::<L>(mem, Direction::Down, |offset, cell| {
            ctx.set_cell::<L>(cell, &Pattern::block_index(offset));
        });
        ctx.sweep::<L>(mem, Direction::Down, |offset, cell| {
            ctx.get_cell::<L>(offset, cell, &Pattern::block_index(offset));
        });
    }
}

/// A single 1 bit walking through all 64 positions, with inverses.
pub fn walking_1<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    for bit in 0..64 {
        let pattern = Pattern::splat_u64(1u64 << bit);
        ctx.set_all::<L>(mem, Direction::Up, &pattern);
        ctx.get_all::<L>(mem, Direction::Up, &pattern);
        let inverse = !pattern;
        ctx.set_all::<L>(mem, Direction::Up, &inverse);
        ctx.get_all::<L>(mem, Direction::Up, &inverse);
    }
}

/// A single 0 bit walking through all 64 positions, with inverses.
pub fn walking_0<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    for bit in 0..64 {
        let pattern = Pattern::splat_u64(!(1u64 << bit));
        ctx.set_all::<L>(mem, Direction::Up, &pattern);
        ctx.get_all::<L>(mem, Direction::Up, &pattern);
        let inverse = !pattern;
        ctx.set_all::<L>(mem, Direction::Up, &inverse);
        ctx.get_all::<L>(mem, Direction::Up, &inverse);
    }
}

/// 0x55/0xAA alternating per word along the buffer, then the inverted
/// lattice, to provoke coupling between adjacent cells.
pub fn checkerboard<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    let lattice = [Pattern::splat_u8(0x55), Pattern::splat_u8(0xAA)];
    for phase in 0..2 {
        ctx.sweep::<L>(mem, Direction::Up, |offset, cell| {
            ctx.set_cell::<L>(cell, &lattice[(offset / L::WIDTH + phase) % 2]);
        });
        ctx.sweep::<L>(mem, Direction::Up, |offset, cell| {
            ctx.get_cell::<L>(offset, cell, &lattice[(offset / L::WIDTH + phase) % 2]);
        });
    }
}

/// Address-derived data with varying Hamming distance between neighbor
/// cells: the offset itself, its inverse descending, then offset XOR
/// shifted-offset for shifts 1..16.
pub fn address_line_test<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    ctx.sweep::<L>(mem, Direction::Up, |offset, cell| {
        ctx.set_cell::<L>(cell, &Pattern::splat_u64(offset as u64));
    });
    ctx.sweep::<L>(mem, Direction::Up, |offset, cell| {
        ctx.get_cell::<L>(offset, cell, &Pattern::splat_u64(offset as u64));
    });

    ctx.sweep::<L>(mem, Direction::Down, |offset, cell| {
        ctx.set_cell::<L>(cell, &Pattern::splat_u64(!(offset as u64)));
    });
    ctx.sweep::<L>(mem, Direction::Down, |offset, cell| {
        ctx.get_cell::<L>(offset, cell, &Pattern::splat_u64(!(offset as u64)));
    });

    let mut shift = 1;
    while shift <= 16 {
        ctx.sweep::<L>(mem, Direction::Up, |offset, cell| {
            let datum = (offset as u64) ^ ((offset as u64) << shift);
            ctx.set_cell::<L>(cell, &Pattern::splat_u64(datum));
        });
        ctx.sweep::<L>(mem, Direction::Up, |offset, cell| {
            let datum = (offset as u64) ^ ((offset as u64) << shift);
            ctx.get_cell::<L>(offset, cell, &Pattern::splat_u64(datum));
        });
        shift <<= 1;
    }
}

/// Thirty-four byte patterns and their complements, each applied in both
/// sweep orders: zeros, ones, halves, alternations, and every one-hot /
/// one-cold byte.
pub fn anti_patterns<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    const PATTERNS: [u8; 34] = [
        0x00, 0xFF, 0x0F, 0xF0, 0x55, 0xAA, 0x33, 0xCC, 0x11, 0xEE, 0x22, 0xDD, 0x44, 0xBB, 0x66,
        0x99, 0x77, 0x88, 0x01, 0xFE, 0x02, 0xFD, 0x04, 0xFB, 0x08, 0xF7, 0x10, 0xEF, 0x20, 0xDF,
        0x40, 0xBF, 0x80, 0x7F,
    ];
    for byte in PATTERNS {
        let pattern = Pattern::splat_u8(byte);
        let anti = !pattern;

        ctx.set_all::<L>(mem, Direction::Up, &pattern);
        ctx.get_all::<L>(mem, Direction::Up, &pattern);
        ctx.set_all::<L>(mem, Direction::Up, &anti);
        ctx.get_all::<L>(mem, Direction::Up, &anti);

        ctx.set_all::<L>(mem, Direction::Down, &pattern);
        ctx.get_all::<L>(mem, Direction::Down, &pattern);
        ctx.set_all::<L>(mem, Direction::Down, &anti);
        ctx.get_all::<L>(mem, Direction::Down, &anti);
    }
}

/// All-ones with one byte, 16-bit word, or 32-bit dword masked out per
/// 64-bit element, plus the inverses.
pub fn inverse_data_patterns<L: Lane>(ctx: &TestContext, mem: &mut [u8]) {
    for byte_idx in 0..8 {
        masked_inversion::<L>(ctx, mem, 0xFFu64 << (byte_idx * 8));
    }
    for word_idx in 0..4 {
        masked_inversion::<L>(ctx, mem, 0xFFFFu64 << (word_idx * 16));
    }
    for dword_idx in 0..2 {
        masked_inversion::<L>(ctx, mem, 0xFFFF_FFFFu64 << (dword_idx * 32));
    }
}

fn masked_inversion<L: Lane>(ctx: &TestContext, mem: &mut [u8], mask: u64) {
    let pattern = Pattern::splat_u64(!mask);
    ctx.set_all::<L>(mem, Direction::Up, &pattern);
    ctx.get_all::<L>(mem, Direction::Up, &pattern);
    let inverse = !pattern;
    ctx.set_all::<L>(mem, Direction::Up, &inverse);
    ctx.get_all::<L>(mem, Direction::Up, &inverse);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifted_patterns_match_their_element_widths() {
        // Walking left through 64-bit elements.
        let p = ElementShift::Left64.pattern(1, 5);
        assert_eq!(p, Pattern::splat_u64(1 << 5));

        // The periodic 8-bit seed keeps its periodicity under the 64-bit
        // shift for every round the battery uses.
        for round in 0..8 {
            let p = ElementShift::Right64.pattern(0x8080_8080_8080_8080, round);
            assert_eq!(p, Pattern::splat_u8(0x80 >> round));
        }

        // 16-bit saturation walk.
        let p = ElementShift::Right16.pattern(0x8000, 15);
        assert_eq!(p, Pattern::splat_u16(0x0001));
        let p = ElementShift::Right16.pattern(0x0001, 1);
        assert_eq!(p, Pattern::zero());
    }

    #[test]
    fn periodic_seeds_stay_periodic_under_64bit_shifts() {
        for round in 0..16 {
            let p = ElementShift::Left64.pattern(0x0001_0001_0001_0001, round);
            assert_eq!(p, Pattern::splat_u16(1 << round));
        }
        for round in 0..32 {
            let p = ElementShift::Right64.pattern(0x8000_0000_8000_0000, round);
            assert_eq!(p, Pattern::splat_u32(0x8000_0000 >> round));
        }
        for round in 0..4 {
            let p = ElementShift::Left64.pattern(0x1111_1111_1111_1111, round);
            assert_eq!(p, Pattern::splat_u8(0x11 << round));
        }
    }
}
