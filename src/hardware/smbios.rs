//! DRAM speed from SMBIOS type-17 (Memory Device) records.
//!
//! Linux exposes the raw records under `/sys/firmware/dmi/entries/17-*/raw`.
//! Only the two 16-bit little-endian speed fields are consumed; every
//! failure mode (no sysfs, unreadable record, all-zero speeds) silently
//! yields 0 and the caller treats the value as display-only.

use std::fs;
use std::path::PathBuf;

/// Which of the two type-17 speed fields to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedField {
    /// Speed as currently measured, offset 0x15.
    Measured,
    /// Configured (clocked) speed, offset 0x20.
    Configured,
}

impl SpeedField {
    fn offset(self) -> usize {
        match self {
            SpeedField::Measured => 0x15,
            SpeedField::Configured => 0x20,
        }
    }
}

/// Speed in MT/s from the first type-17 record with a nonzero field,
/// or 0 when no source is available.
pub fn ram_speed(field: SpeedField) -> u64 {
    for path in memory_device_records() {
        if let Ok(raw) = fs::read(&path) {
            if let Some(speed) = record_speed(&raw, field) {
                return u64::from(speed);
            }
        }
    }
    0
}

/// Decode one speed field out of a raw type-17 record. `None` when the
/// record is truncated or the field reads zero.
fn record_speed(raw: &[u8], field: SpeedField) -> Option<u16> {
    let offset = field.offset();
    let bytes = raw.get(offset..offset + 2)?;
    let speed = u16::from_le_bytes([bytes[0], bytes[1]]);
    if speed == 0 { None } else { Some(speed) }
}

#[cfg(target_os = "linux")]
fn memory_device_records() -> Vec<PathBuf> {
    const ENTRIES: &str = "/sys/firmware/dmi/entries";
    let Ok(dir) = fs::read_dir(ENTRIES) else {
        return Vec::new();
    };
    let mut records: Vec<PathBuf> = dir
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with("17-"))
        })
        .map(|entry| entry.path().join("raw"))
        .collect();
    records.sort();
    records
}

#[cfg(not(target_os = "linux"))]
fn memory_device_records() -> Vec<PathBuf> {
    Vec::new()
}
