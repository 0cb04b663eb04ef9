//! Integration tests for the pmemctl session workflow.
//!
//! These tests invoke the pmemctl binary as a subprocess against fixture
//! ACPI tables in a temp directory. They are marked `#[ignore]` because
//! they require the binary to be pre-built.
//!
//! Run with: `cargo test --test integration -- --ignored`

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

/// Locate the compiled pmemctl binary.
///
/// `cargo test` places the test binary under `target/debug/deps/`; the
/// main binary lives one level up at `target/debug/pmemctl`.
fn pmemctl_binary() -> PathBuf {
    let mut path = std::env::current_exe().expect("could not determine test binary path");
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("pmemctl");
    path
}

/// A scratch environment with its own state and ACPI fixture directories.
struct Scratch {
    state_dir: PathBuf,
    acpi_dir: PathBuf,
}

impl Scratch {
    fn new(name: &str) -> Self {
        let base = std::env::temp_dir().join(format!("pmemctl-it-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&base);
        let state_dir = base.join("state");
        let acpi_dir = base.join("acpi");
        fs::create_dir_all(&state_dir).unwrap();
        fs::create_dir_all(&acpi_dir).unwrap();
        fs::write(acpi_dir.join("NFIT"), build_minimal_nfit()).unwrap();
        Self {
            state_dir,
            acpi_dir,
        }
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(pmemctl_binary())
            .args(args)
            .env("PMEMCTL_STATE_DIR", &self.state_dir)
            .env("PMEMCTL_ACPI_DIR", &self.acpi_dir)
            .env("PMEMCTL_SMBIOS_DIR", self.acpi_dir.join("no-smbios"))
            .output()
            .expect("failed to execute pmemctl")
    }

    fn run_ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "pmemctl {args:?} failed:\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }
}

/// A syntactically valid NFIT with one SPA range, one region mapping, and
/// one control region.
fn build_minimal_nfit() -> Vec<u8> {
    let mut t = Vec::new();
    t.extend_from_slice(b"NFIT");
    t.extend_from_slice(&0u32.to_le_bytes()); // length, fixed up below
    t.push(1);
    t.push(0); // checksum, fixed up below
    t.extend_from_slice(b"PMEMC ");
    t.extend_from_slice(b"PMEMCTL ");
    t.extend_from_slice(&2u32.to_le_bytes());
    t.extend_from_slice(&1u32.to_le_bytes());
    t.extend_from_slice(&1u32.to_le_bytes());
    t.extend_from_slice(&[0u8; 4]); // reserved

    // SPA range (type 0, 56 bytes).
    t.extend_from_slice(&0u16.to_le_bytes());
    t.extend_from_slice(&56u16.to_le_bytes());
    t.extend_from_slice(&1u16.to_le_bytes()); // index
    t.extend_from_slice(&0u16.to_le_bytes()); // flags
    t.extend_from_slice(&[0u8; 4]);
    t.extend_from_slice(&0u32.to_le_bytes()); // proximity domain
    t.extend_from_slice(&[0xAB; 16]); // type guid
    t.extend_from_slice(&0x1000_0000u64.to_le_bytes()); // base
    t.extend_from_slice(&0x4000_0000u64.to_le_bytes()); // length
    t.extend_from_slice(&0u64.to_le_bytes()); // attributes

    // Region mapping (type 1, 48 bytes).
    t.extend_from_slice(&1u16.to_le_bytes());
    t.extend_from_slice(&48u16.to_le_bytes());
    t.extend_from_slice(&0x0001u32.to_le_bytes()); // device handle
    t.extend_from_slice(&0x1001u16.to_le_bytes()); // physical id
    t.extend_from_slice(&0u16.to_le_bytes()); // region id
    t.extend_from_slice(&1u16.to_le_bytes()); // spa index
    t.extend_from_slice(&1u16.to_le_bytes()); // control region index
    t.extend_from_slice(&0x4000_0000u64.to_le_bytes()); // region size
    t.extend_from_slice(&0u64.to_le_bytes()); // region offset
    t.extend_from_slice(&0u64.to_le_bytes()); // dpa base
    t.extend_from_slice(&1u16.to_le_bytes()); // interleave index
    t.extend_from_slice(&1u16.to_le_bytes()); // ways
    t.extend_from_slice(&0u16.to_le_bytes()); // state flags
    t.extend_from_slice(&[0u8; 2]);

    // Control region (type 4, 80 bytes).
    t.extend_from_slice(&4u16.to_le_bytes());
    t.extend_from_slice(&80u16.to_le_bytes());
    t.extend_from_slice(&1u16.to_le_bytes()); // index
    t.extend_from_slice(&0x8980u16.to_le_bytes()); // vendor id
    t.extend_from_slice(&0x5141u16.to_le_bytes()); // device id
    t.extend_from_slice(&2u16.to_le_bytes()); // revision
    t.extend_from_slice(&0x8980u16.to_le_bytes());
    t.extend_from_slice(&0x097Au16.to_le_bytes());
    t.extend_from_slice(&0u16.to_le_bytes());
    t.push(1); // valid fields
    t.push(0x02); // manufacturing location
    t.extend_from_slice(&0x2132u16.to_le_bytes()); // manufacturing date
    t.extend_from_slice(&[0u8; 2]);
    t.extend_from_slice(&0x1234_5678u32.to_le_bytes()); // serial
    t.extend_from_slice(&0x0301u16.to_le_bytes()); // interface code
    t.extend_from_slice(&0u16.to_le_bytes()); // block windows
    t.resize(t.len() + 48, 0); // window geometry + reserved

    let length = t.len() as u32;
    t[4..8].copy_from_slice(&length.to_le_bytes());
    let sum: u8 = t.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    t[9] = 0u8.wrapping_sub(sum);
    t
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn record_then_show_session_lists_tag_zero() {
    let scratch = Scratch::new("record-show");

    scratch.run_ok(&["start", "--session", "record", "--force"]);
    scratch.run_ok(&["show", "--dimm"]);

    let listing = scratch.run_ok(&["show", "--session"]);
    assert!(listing.contains("0  show --dimm"), "listing:\n{listing}");
}

#[test]
#[ignore]
fn playback_replays_the_recorded_command() {
    let scratch = Scratch::new("playback");

    scratch.run_ok(&["start", "--session", "record", "--force"]);
    let recorded = scratch.run_ok(&["show", "--dimm"]);

    // Replace the live table with garbage: playback must not touch it.
    fs::write(scratch.acpi_dir.join("NFIT"), b"garbage").unwrap();

    let replayed = scratch.run_ok(&["start", "--session", "playback", "--tag", "0"]);
    assert!(
        replayed.contains(recorded.trim()),
        "replayed output:\n{replayed}\nrecorded output:\n{recorded}",
    );
}

#[test]
#[ignore]
fn dump_and_load_round_trip() {
    let scratch = Scratch::new("dump-load");

    scratch.run_ok(&["start", "--session", "record", "--force"]);
    scratch.run_ok(&["show", "--dimm"]);

    let image = scratch.state_dir.join("exported.pbr");
    let image_arg = image.to_str().unwrap();
    scratch.run_ok(&["dump", "--session", "--destination", image_arg]);

    scratch.run_ok(&["stop", "--session"]);
    scratch.run_ok(&["load", "--session", "--source", image_arg]);

    let listing = scratch.run_ok(&["show", "--session"]);
    assert!(listing.contains("show --dimm"), "listing:\n{listing}");
}

#[test]
#[ignore]
fn playback_without_a_session_fails() {
    let scratch = Scratch::new("no-session");
    let output = scratch.run(&["start", "--session", "playback"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no session loaded"), "stderr:\n{stderr}");
}
