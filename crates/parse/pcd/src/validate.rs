//! Strict header validation for the DIMM-resident config tables.
//!
//! Validation gates destructive configuration writes, so there is no
//! partial trust: signature, declared length against the OEM partition
//! size, checksum, and revision must all hold, and the first failing
//! condition is the one reported.

use pmem_acpi::header::TableHeader;

use crate::{
    CONFIG_INPUT_SIGNATURE, CONFIG_OUTPUT_SIGNATURE, CURRENT_CONFIG_SIGNATURE, PcdError,
    REVISION_1, REVISION_2,
};

/// Which of the three config tables a header claims to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// The `CCUR` Current Config table.
    CurrentConfig,
    /// The `CIN_` Config Input table.
    ConfigInput,
    /// The `COUT` Config Output table.
    ConfigOutput,
}

impl HeaderKind {
    /// The signature this kind of table must carry.
    #[must_use]
    pub fn signature(self) -> &'static [u8; 4] {
        match self {
            Self::CurrentConfig => CURRENT_CONFIG_SIGNATURE,
            Self::ConfigInput => CONFIG_INPUT_SIGNATURE,
            Self::ConfigOutput => CONFIG_OUTPUT_SIGNATURE,
        }
    }
}

/// Validates a config table header against the partition it was read
/// from.
///
/// Checks, in order: signature, declared length against
/// `max_partition_size` (and the buffer), checksum over the declared
/// length, revision ∈ {1, 2}.
///
/// # Errors
///
/// Returns the first failing condition as a [`PcdError`].
pub fn validate_header(
    kind: HeaderKind,
    data: &[u8],
    max_partition_size: u32,
) -> Result<(), PcdError> {
    let header = TableHeader::read(data).ok_or(PcdError::Truncated)?;

    if &header.signature != kind.signature() {
        return Err(PcdError::InvalidSignature);
    }
    if header.length > max_partition_size {
        return Err(PcdError::LengthExceedsPartition);
    }
    let length = header.length as usize;
    if length < TableHeader::SIZE || length > data.len() {
        return Err(PcdError::Truncated);
    }
    if !crate::is_checksum_valid(&data[..length]) {
        return Err(PcdError::InvalidChecksum);
    }
    if header.revision != REVISION_1 && header.revision != REVISION_2 {
        return Err(PcdError::InvalidRevision(header.revision));
    }

    Ok(())
}

/// Whether a `CCUR` header passes full validation.
#[must_use]
pub fn is_current_config_header_valid(data: &[u8], max_partition_size: u32) -> bool {
    validate_header(HeaderKind::CurrentConfig, data, max_partition_size).is_ok()
}

/// Whether a `CIN_` header passes full validation.
#[must_use]
pub fn is_config_input_header_valid(data: &[u8], max_partition_size: u32) -> bool {
    validate_header(HeaderKind::ConfigInput, data, max_partition_size).is_ok()
}

/// Whether a `COUT` header passes full validation.
#[must_use]
pub fn is_config_output_header_valid(data: &[u8], max_partition_size: u32) -> bool {
    validate_header(HeaderKind::ConfigOutput, data, max_partition_size).is_ok()
}
