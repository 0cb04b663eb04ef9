//! `pmem-pcd` --- Platform Configuration Data decoding, validation, and
//! Config-Input generation.
//!
//! The PCD lives in a DIMM-resident OEM partition and consists of a
//! Configuration Header (`DMHD`) locating three chained tables: the
//! Current Config (`CCUR`), the Config Input (`CIN_`) written by
//! management software, and the Config Output (`COUT`) written back by the
//! BIOS. Each of the three carries an embedded list of PCAT-style records
//! (partition-size change, interleave information, config-management
//! attributes).
//!
//! Unlike the display-oriented ACPI parsers, PCD validation is strict:
//! these tables gate destructive configuration writes, so a signature,
//! length, checksum, or revision problem rejects the table outright.

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

pub mod checksum;
pub mod generate;
pub mod order;
pub mod tables;
pub mod validate;

pub use checksum::{generate_checksum, is_checksum_valid};
pub use generate::{
    GoalConfig, GoalDimm, GoalRegion, ManagementAttributes, generate_config_input,
};
pub use order::{DimmPlacement, compare_dimm_order, compare_dimm_order_6way};
pub use tables::{
    ConfigInput, ConfigOutput, ConfigurationHeader, CurrentConfig, IdentificationInfo, PcdRecord,
    parse_config_input, parse_config_output, parse_configuration_header, parse_current_config,
};
pub use validate::{
    HeaderKind, is_config_input_header_valid, is_config_output_header_valid,
    is_current_config_header_valid, validate_header,
};

use core::fmt;

/// Configuration Header table signature.
pub const CONFIGURATION_HEADER_SIGNATURE: &[u8; 4] = b"DMHD";
/// Current Config table signature.
pub const CURRENT_CONFIG_SIGNATURE: &[u8; 4] = b"CCUR";
/// Config Input table signature.
pub const CONFIG_INPUT_SIGNATURE: &[u8; 4] = b"CIN_";
/// Config Output table signature.
pub const CONFIG_OUTPUT_SIGNATURE: &[u8; 4] = b"COUT";

/// Oldest supported table revision.
pub const REVISION_1: u8 = 1;
/// Current table revision; changes the DIMM identification layout.
pub const REVISION_2: u8 = 2;

/// PCAT-style record type 3: config management attributes extension.
pub const RECORD_CONFIG_MANAGEMENT_ATTRIBUTES_TYPE: u16 = 3;
/// PCAT-style record type 4: partition size change.
pub const RECORD_PARTITION_SIZE_CHANGE_TYPE: u16 = 4;
/// PCAT-style record type 5: interleave information.
pub const RECORD_INTERLEAVE_INFORMATION_TYPE: u16 = 5;

/// Offset of the one-byte checksum field within an ACPI-style header.
pub const CHECKSUM_OFFSET: usize = 9;

/// Returns `previous.wrapping_add(1)`.
///
/// The BIOS copies the Config-Input sequence number into the Config Output
/// once a request is processed; the next request must use the successor.
/// Wrapping `u32::MAX` back to 0 is accepted, not an error.
#[must_use]
pub fn next_sequence_number(previous: u32) -> u32 {
    previous.wrapping_add(1)
}

/// Errors that can occur while decoding or validating PCD tables.
///
/// All of these are device-error class: the data on the DIMM cannot be
/// trusted and the higher-level operation must be aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcdError {
    /// The table signature did not match the expected value.
    InvalidSignature,
    /// The declared length exceeds the OEM partition size.
    LengthExceedsPartition,
    /// The byte sum over the declared length was not zero.
    InvalidChecksum,
    /// The table revision is outside {1, 2}.
    InvalidRevision(u8),
    /// The buffer is shorter than a header or a declared region.
    Truncated,
    /// An embedded record declared a zero length or a length out of
    /// bounds.
    MalformedRecord,
}

impl fmt::Display for PcdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSignature => write!(f, "PCD table signature mismatch"),
            Self::LengthExceedsPartition => {
                write!(f, "PCD table length exceeds the OEM partition size")
            }
            Self::InvalidChecksum => write!(f, "PCD table checksum is invalid"),
            Self::InvalidRevision(rev) => write!(f, "unsupported PCD table revision {rev}"),
            Self::Truncated => write!(f, "PCD data is truncated"),
            Self::MalformedRecord => {
                write!(f, "malformed PCD record: length is zero or out of bounds")
            }
        }
    }
}

impl core::error::Error for PcdError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_number_increments() {
        assert_eq!(next_sequence_number(0), 1);
        assert_eq!(next_sequence_number(41), 42);
    }

    #[test]
    fn sequence_number_wraps_at_max() {
        assert_eq!(next_sequence_number(u32::MAX), 0);
    }
}
