//! `pmem-acpi` --- a standalone, `no_std` decoder for the ACPI tables that
//! describe persistent-memory DIMMs: NFIT, PCAT, and PMTT.
//!
//! The crate turns raw table bytes (as read from `/sys/firmware/acpi/tables`,
//! a UEFI configuration table, or a recorded session) into owned, typed,
//! navigable decompositions. All sub-table chains are walked with explicit
//! bounds checks: a zero or oversized sub-table length is reported as
//! [`AcpiError::MalformedTable`] instead of looping or reading out of range.
//!
//! # Usage
//!
//! ```ignore
//! let nfit = pmem_acpi::parse_nfit(&bytes)?;
//! for region in &nfit.regions {
//!     // ...
//! }
//! ```

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

pub mod header;
pub mod nfit;
pub mod pcat;
pub mod pmtt;
pub mod uid;

pub use header::{TableHeader, checksum, is_checksum_valid};
pub use nfit::{NFIT_SIGNATURE, ParsedNfit, parse_nfit};
pub use pcat::{PCAT_SIGNATURE, ParsedPcat, parse_pcat};
pub use pmtt::{PMTT_SIGNATURE, Pmtt, PmttNode};
pub use uid::DimmUniqueIdentifier;

use core::fmt;

/// Errors that can occur while decoding an ACPI table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcpiError {
    /// The table signature did not match the expected value.
    InvalidSignature,
    /// The buffer was shorter than the table header or its declared length.
    TruncatedData,
    /// A sub-table declared a zero length or a length extending past the
    /// end of the table.
    MalformedTable,
    /// The PCAT sub-table chain contained a discriminator outside the known
    /// set. PCAT governs configuration application, so unknown records abort
    /// the walk instead of being skipped.
    UnrecognizedPcatType(u16),
}

impl fmt::Display for AcpiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSignature => write!(f, "table signature mismatch"),
            Self::TruncatedData => write!(f, "table data is truncated"),
            Self::MalformedTable => {
                write!(f, "malformed table: sub-table length is zero or out of bounds")
            }
            Self::UnrecognizedPcatType(ty) => {
                write!(f, "unrecognized PCAT sub-table type {ty}")
            }
        }
    }
}

impl core::error::Error for AcpiError {}
