//! Live platform data sources: ACPI tables, the SMBIOS stream, and the
//! firmware-passthrough transport.
//!
//! These are the collaborators the session layer wraps. On Linux the
//! tables come from sysfs; `PMEMCTL_ACPI_DIR` / `PMEMCTL_SMBIOS_DIR`
//! redirect them to a fixture directory for tests and for platforms
//! without sysfs. A real DDRT/SMBUS passthrough transport needs a kernel
//! driver this tool does not ship, so the live transport reports every
//! command as unsupported --- an outcome that records and replays like any
//! other.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use pmem_pbr::{PassThruRequest, PassThruResponse, TableKind};

/// Default sysfs directory exposing raw ACPI tables.
const ACPI_TABLES_DIR: &str = "/sys/firmware/acpi/tables";
/// Default sysfs directory exposing the SMBIOS entry point and stream.
const SMBIOS_TABLES_DIR: &str = "/sys/firmware/dmi/tables";

/// `EFI_UNSUPPORTED` with the error bit set, as a 64-bit status.
pub const STATUS_UNSUPPORTED: u64 = 0x8000_0000_0000_0003;

/// Source of raw ACPI tables.
pub struct AcpiTableSource {
    dir: PathBuf,
}

impl AcpiTableSource {
    /// Resolves the table directory from the environment or sysfs.
    #[must_use]
    pub fn new() -> Self {
        let dir = std::env::var_os("PMEMCTL_ACPI_DIR")
            .map_or_else(|| PathBuf::from(ACPI_TABLES_DIR), PathBuf::from);
        Self { dir }
    }

    /// Reads the raw bytes of the table for `kind`.
    ///
    /// # Errors
    ///
    /// Fails when the platform does not expose the table.
    pub fn read(&self, kind: TableKind) -> Result<Vec<u8>> {
        let path = self.dir.join(kind.name());
        fs::read(&path).with_context(|| {
            format!("no {} table available at {}", kind.name(), path.display())
        })
    }
}

impl Default for AcpiTableSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Source of the raw SMBIOS structure stream and entry-point version.
pub struct SmbiosSource {
    dir: PathBuf,
}

impl SmbiosSource {
    /// Resolves the SMBIOS directory from the environment or sysfs.
    #[must_use]
    pub fn new() -> Self {
        let dir = std::env::var_os("PMEMCTL_SMBIOS_DIR")
            .map_or_else(|| PathBuf::from(SMBIOS_TABLES_DIR), PathBuf::from);
        Self { dir }
    }

    /// Reads the structure stream and its `(major, minor)` version.
    ///
    /// # Errors
    ///
    /// Fails when the platform does not expose SMBIOS data or the entry
    /// point is unrecognizable.
    pub fn read(&self) -> Result<(Vec<u8>, u8, u8)> {
        let stream_path = self.dir.join("DMI");
        let stream = fs::read(&stream_path)
            .with_context(|| format!("no SMBIOS stream available at {}", stream_path.display()))?;

        let entry_path = self.dir.join("smbios_entry_point");
        let entry = fs::read(&entry_path)
            .with_context(|| format!("no SMBIOS entry point at {}", entry_path.display()))?;

        let (major, minor) = parse_entry_point_version(&entry)
            .context("unrecognized SMBIOS entry point anchor")?;
        Ok((stream, major, minor))
    }
}

impl Default for SmbiosSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts the SMBIOS version from a 32-bit (`_SM_`) or 64-bit (`_SM3_`)
/// entry point.
fn parse_entry_point_version(entry: &[u8]) -> Option<(u8, u8)> {
    if entry.starts_with(b"_SM3_") {
        Some((*entry.get(7)?, *entry.get(8)?))
    } else if entry.starts_with(b"_SM_") {
        Some((*entry.get(6)?, *entry.get(7)?))
    } else {
        None
    }
}

/// The firmware-passthrough transport boundary.
///
/// The session layer calls this in normal and record modes; in playback
/// mode it is bypassed entirely and the recorded response is served
/// instead.
pub trait FwTransport {
    /// Sends one firmware command and returns the transport outcome.
    ///
    /// Transport-level failures are part of the outcome (`return_code`),
    /// not `Err`: they are recorded and replayed verbatim. `Err` is
    /// reserved for invariant violations in the transport itself.
    ///
    /// # Errors
    ///
    /// Implementation-defined; the stub transport never fails.
    fn send(&mut self, request: &PassThruRequest) -> Result<PassThruResponse>;
}

/// The live transport of this build: reports every command unsupported.
pub struct NullTransport;

impl FwTransport for NullTransport {
    fn send(&mut self, request: &PassThruRequest) -> Result<PassThruResponse> {
        Ok(PassThruResponse {
            duration_ms: 0,
            return_code: STATUS_UNSUPPORTED,
            dimm_id: request.dimm_id,
            status: 0,
            output: Vec::new(),
            large_output: Vec::new(),
        })
    }
}
