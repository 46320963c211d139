//! Parallel block-sweep kernel.
//!
//! The buffer is split into one equal stripe per logical CPU and each
//! stripe is walked by exactly one worker, visiting aligned SIMD-width
//! cells in ascending or descending address order. Workers never
//! synchronize during a sweep; the only shared mutable state is the
//! atomic error counter, and every stripe ends with a store fence so
//! non-temporal stores have retired before the next phase reads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rayon::prelude::*;

use crate::simd::{self, Lane, Pattern, PatternRng};

/// Address order of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Everything a test run shares: the worker count, the caller's error
/// counter, the worker pool, and the pattern generator. Built once per
/// run; immutable afterwards (the RNG is drawn only between sweeps,
/// never inside the parallel region).
pub struct TestContext<'a> {
    cpus: usize,
    errors: &'a AtomicU64,
    pool: rayon::ThreadPool,
    rng: Mutex<PatternRng>,
}

impl<'a> TestContext<'a> {
    /// Build a context with one worker per stripe.
    ///
    /// # Panics
    /// Panics when `cpus` is zero.
    pub fn new(
        cpus: usize,
        errors: &'a AtomicU64,
        rng: PatternRng,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        assert!(cpus >= 1, "at least one worker is required");
        let pool = rayon::ThreadPoolBuilder::new().num_threads(cpus).build()?;
        Ok(TestContext {
            cpus,
            errors,
            pool,
            rng: Mutex::new(rng),
        })
    }

    pub fn cpus(&self) -> usize {
        self.cpus
    }

    /// Draw one SIMD-wide random pattern. Called from the test driver
    /// only, outside the parallel region.
    pub fn next_pattern(&self) -> Pattern {
        self.rng.lock().expect("pattern rng mutex poisoned").next_pattern()
    }

    /// Run `body` once per stripe, in parallel, one worker each. Each
    /// stripe task ends with a store fence so its non-temporal stores
    /// have retired by the time the sweep returns.
    pub fn for_each_stripe(&self, mem: &mut [u8], body: impl Fn(usize, &mut [u8]) + Sync) {
        assert!(!mem.is_empty(), "test buffer must be nonempty");
        assert_eq!(
            mem.len() % self.cpus,
            0,
            "buffer size {} does not divide into {} stripes",
            mem.len(),
            self.cpus
        );
        let stripe = mem.len() / self.cpus;
        self.pool.install(|| {
            mem.par_chunks_exact_mut(stripe)
                .enumerate()
                .for_each(|(index, chunk)| {
                    body(index, chunk);
                    simd::store_fence();
                });
        });
    }

    /// Sweep every aligned `L::WIDTH`-byte cell of the buffer, calling
    /// `body(offset, cell)` with the cell's offset from the buffer base.
    /// Stripes run in parallel; cells within a stripe run strictly in
    /// `direction` order.
    ///
    /// # Panics
    /// Panics when the lane is unsupported on this host, when the buffer
    /// is not aligned to `L::WIDTH`, or when its size does not divide
    /// into whole words across all stripes.
    pub fn sweep<L: Lane>(
        &self,
        mem: &mut [u8],
        direction: Direction,
        body: impl Fn(usize, &mut [u8]) + Sync,
    ) {
        assert!(L::available(), "{} lane unsupported on this host", L::NAME);
        assert_eq!(
            mem.as_ptr() as usize % L::WIDTH,
            0,
            "buffer is not {}-byte aligned",
            L::WIDTH
        );
        assert_eq!(
            mem.len() % (self.cpus * L::WIDTH),
            0,
            "buffer size {} is not a multiple of cpus ({}) x word width ({})",
            mem.len(),
            self.cpus,
            L::WIDTH
        );
        let stripe = mem.len() / self.cpus;
        let slots = stripe / L::WIDTH;
        self.for_each_stripe(mem, |index, chunk| {
            let base = index * stripe;
            match direction {
                Direction::Up => {
                    for slot in 0..slots {
                        let offset = slot * L::WIDTH;
                        body(base + offset, &mut chunk[offset..offset + L::WIDTH]);
                    }
                }
                Direction::Down => {
                    for slot in (0..slots).rev() {
                        let offset = slot * L::WIDTH;
                        body(base + offset, &mut chunk[offset..offset + L::WIDTH]);
                    }
                }
            }
        });
    }

    /// Write `pattern` to every cell.
    pub fn set_all<L: Lane>(&self, mem: &mut [u8], direction: Direction, pattern: &Pattern) {
        self.sweep::<L>(mem, direction, |_, cell| self.set_cell::<L>(cell, pattern));
    }

    /// Verify every cell against `pattern`, counting and reporting
    /// mismatches.
    pub fn get_all<L: Lane>(&self, mem: &mut [u8], direction: Direction, pattern: &Pattern) {
        self.sweep::<L>(mem, direction, |offset, cell| {
            self.get_cell::<L>(offset, cell, pattern)
        });
    }

    /// Single-cell store, for sweep bodies that mix reads and writes.
    pub fn set_cell<L: Lane>(&self, cell: &mut [u8], pattern: &Pattern) {
        debug_assert_eq!(cell.len(), L::WIDTH);
        // SAFETY: the kernel hands out aligned WIDTH-byte cells and
        // sweep() checked lane availability.
        unsafe { L::store_nt(cell.as_mut_ptr(), pattern) }
    }

    /// Single-cell verify, for sweep bodies that mix reads and writes.
    pub fn get_cell<L: Lane>(&self, offset: usize, cell: &[u8], pattern: &Pattern) {
        debug_assert_eq!(cell.len(), L::WIDTH);
        // SAFETY: as for set_cell.
        let mask = unsafe { L::verify(cell.as_ptr(), pattern) };
        if mask != 0 {
            self.record_mismatch::<L>(offset, mask);
        }
    }

    #[cold]
    fn record_mismatch<L: Lane>(&self, offset: usize, mask: u64) {
        self.errors
            .fetch_add(u64::from(mask.count_ones()), Ordering::Relaxed);
        L::report(offset, mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AlignedBuffer;
    use crate::simd::Scalar;

    const CPUS: usize = 4;
    const SIZE: usize = 16 * 1024;

    fn context(errors: &AtomicU64) -> TestContext<'_> {
        TestContext::new(CPUS, errors, PatternRng::from_seeds(3, 5)).unwrap()
    }

    #[test]
    fn up_sweep_touches_every_slot_in_order() {
        let errors = AtomicU64::new(0);
        let ctx = context(&errors);
        let mut buf = AlignedBuffer::new(SIZE).unwrap();
        let seen = Mutex::new(Vec::new());
        ctx.sweep::<Scalar>(&mut buf, Direction::Up, |offset, cell| {
            assert_eq!(cell.len(), Scalar::WIDTH);
            assert_eq!(offset % Scalar::WIDTH, 0);
            assert!(offset < SIZE);
            seen.lock().unwrap().push(offset);
        });
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), SIZE / Scalar::WIDTH);

        // Each stripe's subsequence is strictly ascending.
        let stripe = SIZE / CPUS;
        for i in 0..CPUS {
            let offsets: Vec<_> = seen.iter().copied().filter(|o| o / stripe == i).collect();
            assert_eq!(offsets.len(), stripe / Scalar::WIDTH);
            assert!(offsets.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(offsets[0], i * stripe);
            assert_eq!(*offsets.last().unwrap(), (i + 1) * stripe - Scalar::WIDTH);
        }
    }

    #[test]
    fn down_sweep_descends_within_each_stripe() {
        let errors = AtomicU64::new(0);
        let ctx = context(&errors);
        let mut buf = AlignedBuffer::new(SIZE).unwrap();
        let seen = Mutex::new(Vec::new());
        ctx.sweep::<Scalar>(&mut buf, Direction::Down, |offset, _| {
            seen.lock().unwrap().push(offset);
        });
        let seen = seen.into_inner().unwrap();
        let stripe = SIZE / CPUS;
        for i in 0..CPUS {
            let offsets: Vec<_> = seen.iter().copied().filter(|o| o / stripe == i).collect();
            assert!(offsets.windows(2).all(|w| w[0] > w[1]));
        }
    }

    #[test]
    fn stripes_partition_the_buffer() {
        let errors = AtomicU64::new(0);
        let ctx = context(&errors);
        let mut buf = AlignedBuffer::new(SIZE).unwrap();
        let seen = Mutex::new(Vec::new());
        ctx.sweep::<Scalar>(&mut buf, Direction::Up, |offset, _| {
            seen.lock().unwrap().push(offset);
        });
        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        let expected: Vec<_> = (0..SIZE / Scalar::WIDTH).map(|s| s * Scalar::WIDTH).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn set_then_get_is_clean() {
        let errors = AtomicU64::new(0);
        let ctx = context(&errors);
        let mut buf = AlignedBuffer::new(SIZE).unwrap();
        let pattern = Pattern::splat_u8(0x6C);
        ctx.set_all::<Scalar>(&mut buf, Direction::Up, &pattern);
        assert!(buf.iter().all(|&b| b == 0x6C));
        ctx.get_all::<Scalar>(&mut buf, Direction::Up, &pattern);
        assert_eq!(errors.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn down_write_covers_the_whole_buffer() {
        let errors = AtomicU64::new(0);
        let ctx = context(&errors);
        let mut buf = AlignedBuffer::new(SIZE).unwrap();
        let pattern = Pattern::splat_u8(0x93);
        ctx.set_all::<Scalar>(&mut buf, Direction::Down, &pattern);
        assert!(buf.iter().all(|&b| b == 0x93));
    }

    #[test]
    fn mismatches_count_differing_bytes() {
        let errors = AtomicU64::new(0);
        let ctx = context(&errors);
        let mut buf = AlignedBuffer::new(SIZE).unwrap();
        ctx.set_all::<Scalar>(&mut buf, Direction::Up, &Pattern::zero());
        buf[100] = 0xFF;
        buf[101] = 0x0F;
        ctx.get_all::<Scalar>(&mut buf, Direction::Up, &Pattern::zero());
        assert_eq!(errors.load(Ordering::Relaxed), 2);
    }

    #[test]
    #[should_panic(expected = "is not a multiple")]
    fn indivisible_buffer_is_rejected() {
        let errors = AtomicU64::new(0);
        let ctx = context(&errors);
        // Half a word short of a whole stripe set for 4 workers.
        let mut buf = AlignedBuffer::new(2 * CPUS * Scalar::WIDTH).unwrap();
        let len = buf.len() - Scalar::WIDTH;
        ctx.sweep::<Scalar>(&mut buf[..len], Direction::Up, |_, _| {});
    }

    #[test]
    #[should_panic(expected = "aligned")]
    fn misaligned_buffer_is_rejected() {
        let errors = AtomicU64::new(0);
        let ctx = context(&errors);
        let mut buf = AlignedBuffer::new(4096).unwrap();
        let window = &mut buf[8..8 + CPUS * Scalar::WIDTH];
        ctx.sweep::<Scalar>(window, Direction::Up, |_, _| {});
    }

    #[test]
    #[should_panic(expected = "at least one worker")]
    fn zero_workers_are_rejected() {
        let errors = AtomicU64::new(0);
        let _ = TestContext::new(0, &errors, PatternRng::from_seeds(1, 1));
    }

    #[test]
    fn random_patterns_come_from_the_context() {
        let errors = AtomicU64::new(0);
        let ctx = context(&errors);
        assert_ne!(ctx.next_pattern(), ctx.next_pattern());
    }
}
