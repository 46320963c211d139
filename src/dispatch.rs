//! Per-tier battery bindings.
//!
//! Each procedure in [`crate::battery`] is generic over the SIMD lane;
//! this module instantiates the whole battery once per tier and exposes
//! one named callable per test. The SSE tier is declined; callers that
//! still want to sweep can take the scalar reference battery.

use crate::battery;
use crate::hardware::InstructionSet;
use crate::simd::{Lane, Scalar};
use crate::sweep::TestContext;

#[cfg(target_arch = "x86_64")]
use crate::simd::{Avx2, Avx512};

/// A battery procedure bound to one lane.
pub type TestFn = fn(&TestContext, &mut [u8]);

pub struct BatteryEntry {
    pub name: &'static str,
    pub run: TestFn,
}

/// The full test battery bound to one SIMD width.
pub struct Battery {
    /// Lane name, e.g. "avx2".
    pub lane: &'static str,
    /// Word width in bytes.
    pub width: usize,
    entries: Vec<BatteryEntry>,
}

impl Battery {
    pub fn entries(&self) -> &[BatteryEntry] {
        &self.entries
    }

    /// Look up a single test by name.
    pub fn get(&self, name: &str) -> Option<&BatteryEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }
}

fn entries_for<L: Lane>() -> Vec<BatteryEntry> {
    vec![
        BatteryEntry { name: "basic_tests", run: battery::basic_tests::<L> },
        BatteryEntry { name: "march", run: battery::march::<L> },
        BatteryEntry { name: "random_inversions", run: battery::random_inversions::<L> },
        BatteryEntry { name: "moving_inversions_left_64", run: battery::moving_inversions_left_64::<L> },
        BatteryEntry { name: "moving_inversions_right_32", run: battery::moving_inversions_right_32::<L> },
        BatteryEntry { name: "moving_inversions_left_16", run: battery::moving_inversions_left_16::<L> },
        BatteryEntry { name: "moving_inversions_right_8", run: battery::moving_inversions_right_8::<L> },
        BatteryEntry { name: "moving_inversions_left_4", run: battery::moving_inversions_left_4::<L> },
        BatteryEntry { name: "moving_saturations_right_16", run: battery::moving_saturations_right_16::<L> },
        BatteryEntry { name: "moving_saturations_left_8", run: battery::moving_saturations_left_8::<L> },
        BatteryEntry { name: "addressing", run: battery::addressing::<L> },
        BatteryEntry { name: "walking_1", run: battery::walking_1::<L> },
        BatteryEntry { name: "walking_0", run: battery::walking_0::<L> },
        BatteryEntry { name: "checkerboard", run: battery::checkerboard::<L> },
        BatteryEntry { name: "address_line_test", run: battery::address_line_test::<L> },
        BatteryEntry { name: "anti_patterns", run: battery::anti_patterns::<L> },
        BatteryEntry { name: "inverse_data_patterns", run: battery::inverse_data_patterns::<L> },
        BatteryEntry { name: "sgemm", run: battery::sgemm::<L> },
    ]
}

/// The battery for a probed tier, or `None` when the tier has no vector
/// binding. A tier the OS leaves disabled degrades to the next one down.
#[cfg(target_arch = "x86_64")]
pub fn battery(set: InstructionSet) -> Option<Battery> {
    match set {
        InstructionSet::Avx512 if Avx512::available() => Some(Battery {
            lane: Avx512::NAME,
            width: Avx512::WIDTH,
            entries: entries_for::<Avx512>(),
        }),
        InstructionSet::Avx512 | InstructionSet::Avx2 if Avx2::available() => Some(Battery {
            lane: Avx2::NAME,
            width: Avx2::WIDTH,
            entries: entries_for::<Avx2>(),
        }),
        _ => None,
    }
}

#[cfg(not(target_arch = "x86_64"))]
pub fn battery(_set: InstructionSet) -> Option<Battery> {
    None
}

/// The scalar reference battery; runs on any host.
pub fn scalar_battery() -> Battery {
    Battery {
        lane: Scalar::NAME,
        width: Scalar::WIDTH,
        entries: entries_for::<Scalar>(),
    }
}
