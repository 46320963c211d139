use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgMatches, Command};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use ramscan::hardware::{self, SpeedField};
use ramscan::simd::PatternRng;
use ramscan::sweep::TestContext;
use ramscan::{dispatch, Battery};

#[cfg(unix)]
use ramscan::buffer::LockedBuffer as TestBuffer;
#[cfg(not(unix))]
use ramscan::buffer::AlignedBuffer as TestBuffer;

#[derive(Debug, Serialize)]
struct Report {
    instruction_set: String,
    lane: &'static str,
    word_width: usize,
    cpus: usize,
    buffer_bytes: usize,
    ram_speed_mts: u64,
    configured_speed_mts: u64,
    memory_test_erratum: bool,
    tests: Vec<TestOutcome>,
    total_errors: u64,
}

#[derive(Debug, Serialize)]
struct TestOutcome {
    name: &'static str,
    errors: u64,
    millis: u128,
}

fn main() {
    let matches = Command::new("ramscan")
        .version("0.1.0")
        .about("Pattern-based DRAM diagnostic: wide non-temporal sweeps over a pinned buffer")
        .subcommand(
            Command::new("run")
                .about("Allocate a buffer and run the test battery")
                .arg(
                    Arg::new("size")
                        .short('s')
                        .long("size")
                        .help("Buffer size in binary units, e.g. 512MiB or 2G")
                        .default_value("256MiB"),
                )
                .arg(
                    Arg::new("tests")
                        .short('t')
                        .long("tests")
                        .help("Comma-separated test names (default: the whole battery)"),
                )
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .help("Report format")
                        .value_parser(["human", "json"])
                        .default_value("human"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Also write the JSON report to a file"),
                )
                .arg(
                    Arg::new("scalar")
                        .long("scalar")
                        .help("Force the scalar reference sweeps instead of the vector tier")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("probe").about("Print host capabilities and exit"))
        .subcommand(Command::new("list").about("List the test names in battery order"))
        .get_matches();

    let result = match matches.subcommand() {
        Some(("run", sub_matches)) => handle_run(sub_matches),
        Some(("probe", _)) => handle_probe(),
        Some(("list", _)) => handle_list(),
        _ => {
            eprintln!("Use --help for usage information");
            std::process::exit(2);
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(2);
        }
    }
}

fn handle_probe() -> Result<i32> {
    let set = hardware::instruction_set();
    println!("instruction set:  {set}");
    println!("logical cpus:     {}", hardware::cpu_count());
    print_speed("ram speed:", hardware::ram_speed(SpeedField::Measured));
    print_speed("configured:", hardware::ram_speed(SpeedField::Configured));
    if hardware::has_memory_test_erratum() {
        eprintln!("warning: this processor model is known to give unreliable memory-test results");
    }
    Ok(0)
}

fn print_speed(label: &str, speed: u64) {
    match speed {
        0 => println!("{label:<18}unknown"),
        mts => println!("{label:<18}{mts} MT/s"),
    }
}

fn handle_list() -> Result<i32> {
    for entry in dispatch::scalar_battery().entries() {
        println!("{}", entry.name);
    }
    Ok(0)
}

fn handle_run(matches: &ArgMatches) -> Result<i32> {
    let requested = parse_size(
        matches
            .get_one::<String>("size")
            .expect("size has a default value"),
    )?;
    let format = matches
        .get_one::<String>("format")
        .expect("format has a default value");

    let set = hardware::instruction_set();
    let cpus = hardware::cpu_count();
    let battery = select_battery(matches.get_flag("scalar"), set)?;
    let selected = selected_tests(matches, &battery)?;

    if hardware::has_memory_test_erratum() {
        eprintln!("warning: this processor model is known to give unreliable memory-test results");
    }

    // Whole stripes of whole words only.
    let granule = cpus * battery.width;
    let size = requested - requested % granule;
    if size == 0 {
        return Err(anyhow!(
            "buffer of {requested} bytes is smaller than one {granule}-byte granule ({cpus} cpus x {}-byte words)",
            battery.width
        ));
    }

    let mut buffer = TestBuffer::new(size)
        .with_context(|| format!("allocating a {size}-byte test buffer"))?;
    if !buffer.is_locked() {
        eprintln!("warning: could not lock {size} bytes; pages may swap during the run");
    }

    let errors = AtomicU64::new(0);
    let ctx = TestContext::new(cpus, &errors, pattern_rng())
        .context("building the sweep worker pool")?;

    if format == "human" {
        println!("ramscan: {} lane, {cpus} cpus, {size} bytes", battery.lane);
    }

    let mut outcomes = Vec::new();
    for entry in battery.entries() {
        if let Some(ref names) = selected {
            if !names.contains(entry.name) {
                continue;
            }
        }
        let before = errors.load(Ordering::Relaxed);
        let start = Instant::now();
        (entry.run)(&ctx, &mut buffer);
        let millis = start.elapsed().as_millis();
        let delta = errors.load(Ordering::Relaxed) - before;
        if format == "human" {
            let verdict = if delta == 0 { "ok" } else { "FAILED" };
            println!("{:<28} {:>8} ms  {verdict} ({delta} errors)", entry.name, millis);
        }
        outcomes.push(TestOutcome { name: entry.name, errors: delta, millis });
    }

    let total_errors = errors.load(Ordering::Relaxed);
    let report = Report {
        instruction_set: set.to_string(),
        lane: battery.lane,
        word_width: battery.width,
        cpus,
        buffer_bytes: size,
        ram_speed_mts: hardware::ram_speed(SpeedField::Measured),
        configured_speed_mts: hardware::ram_speed(SpeedField::Configured),
        memory_test_erratum: hardware::has_memory_test_erratum(),
        tests: outcomes,
        total_errors,
    };

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            println!("{}", "=".repeat(48));
            if total_errors == 0 {
                println!("PASS: no errors detected");
            } else {
                println!("FAIL: {total_errors} byte errors detected");
            }
        }
    }

    if let Some(path) = matches.get_one::<String>("output") {
        fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing report to {path}"))?;
    }

    Ok(if total_errors == 0 { 0 } else { 1 })
}

fn select_battery(scalar: bool, set: hardware::InstructionSet) -> Result<Battery> {
    if scalar {
        return Ok(dispatch::scalar_battery());
    }
    dispatch::battery(set).ok_or_else(|| {
        anyhow!("no vector tier on this host ({set}); rerun with --scalar for the reference sweeps")
    })
}

fn selected_tests(
    matches: &ArgMatches,
    battery: &Battery,
) -> Result<Option<BTreeSet<String>>> {
    let Some(list) = matches.get_one::<String>("tests") else {
        return Ok(None);
    };
    let names: BTreeSet<String> = list
        .split(',')
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    if names.is_empty() {
        return Err(anyhow!("--tests selected nothing"));
    }
    for name in &names {
        if battery.get(name).is_none() {
            return Err(anyhow!(
                "unknown test '{name}'; see `ramscan list` for the battery"
            ));
        }
    }
    Ok(Some(names))
}

fn pattern_rng() -> PatternRng {
    #[cfg(target_arch = "x86_64")]
    {
        PatternRng::from_hardware()
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        // No on-die entropy source to draw from; fixed seeds keep the
        // scalar reference battery usable.
        PatternRng::from_seeds(0x9E37_79B9_7F4A_7C15, 0xD1B5_4A32_D192_ED03)
    }
}

/// Parse a human byte size: a decimal count with an optional binary
/// K/M/G/T prefix ("512MiB", "2G", "1048576").
fn parse_size(input: &str) -> Result<usize> {
    let pattern = Regex::new(r"(?i)^\s*([0-9]+)\s*(?:([kmgt])i?b?|b)?\s*$")
        .expect("size regex is valid");
    let caps = pattern
        .captures(input)
        .ok_or_else(|| anyhow!("unrecognized size '{input}'; try 512MiB, 2G or 1073741824"))?;
    let value: usize = caps[1]
        .parse()
        .map_err(|_| anyhow!("size '{input}' does not fit in this machine's address space"))?;
    let shift = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        None => 0,
        Some(unit) => match unit.as_str() {
            "k" => 10,
            "m" => 20,
            "g" => 30,
            "t" => 40,
            _ => unreachable!("regex only admits kmgt"),
        },
    };
    value
        .checked_mul(1usize << shift)
        .ok_or_else(|| anyhow!("size '{input}' does not fit in this machine's address space"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_byte_counts() {
        assert_eq!(parse_size("1048576").unwrap(), 1 << 20);
        assert_eq!(parse_size("4096B").unwrap(), 4096);
    }

    #[test]
    fn parses_binary_units() {
        assert_eq!(parse_size("1KiB").unwrap(), 1024);
        assert_eq!(parse_size("512MiB").unwrap(), 512 << 20);
        assert_eq!(parse_size("2G").unwrap(), 2 << 30);
        assert_eq!(parse_size("1T").unwrap(), 1 << 40);
        assert_eq!(parse_size(" 16 mb ").unwrap(), 16 << 20);
    }

    #[test]
    fn rejects_garbage_sizes() {
        assert!(parse_size("lots").is_err());
        assert!(parse_size("12QiB").is_err());
        assert!(parse_size("").is_err());
        assert!(parse_size("-1G").is_err());
    }

    #[test]
    fn rejects_overflowing_sizes() {
        assert!(parse_size("99999999999999999999T").is_err());
    }
}
