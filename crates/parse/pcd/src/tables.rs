//! Decoders for the four chained PCD tables and their embedded records.

use alloc::string::String;
use alloc::vec::Vec;

use pmem_acpi::header::TableHeader;
use pmem_acpi::uid::DimmUniqueIdentifier;
use pmem_binparse::FromBytes;

use crate::{
    CONFIG_INPUT_SIGNATURE, CONFIG_OUTPUT_SIGNATURE, CONFIGURATION_HEADER_SIGNATURE,
    CURRENT_CONFIG_SIGNATURE, PcdError, RECORD_CONFIG_MANAGEMENT_ATTRIBUTES_TYPE,
    RECORD_INTERLEAVE_INFORMATION_TYPE, RECORD_PARTITION_SIZE_CHANGE_TYPE, REVISION_1, REVISION_2,
};

/// Size of the legacy part-number field in revision-1 identification
/// records.
pub const PART_NUMBER_SIZE: usize = 20;

/// Wire size of one DIMM identification record (both revisions).
pub const IDENTIFICATION_INFO_SIZE: usize = 48;

/// Fixed body size of an interleave-information record before its
/// identification list.
pub const INTERLEAVE_INFORMATION_FIXED_SIZE: usize = 24;

/// The `DMHD` Configuration Header: locates the three config tables inside
/// the OEM partition.
#[derive(Debug, Clone)]
pub struct ConfigurationHeader {
    /// The ACPI-style header (`DMHD`).
    pub header: TableHeader,
    /// Size in bytes of the Current Config area; zero means absent.
    pub current_config_size: u32,
    /// Offset of the Current Config area from the partition start.
    pub current_config_offset: u32,
    /// Size in bytes of the Config Input area; zero means absent.
    pub config_input_size: u32,
    /// Offset of the Config Input area from the partition start.
    pub config_input_offset: u32,
    /// Size in bytes of the Config Output area; zero means absent.
    pub config_output_size: u32,
    /// Offset of the Config Output area from the partition start.
    pub config_output_offset: u32,
}

impl ConfigurationHeader {
    /// Wire size of the configuration header.
    pub const SIZE: usize = TableHeader::SIZE + 24;

    /// Borrows the Current Config bytes out of the partition blob, if
    /// present.
    #[must_use]
    pub fn current_config_slice<'a>(&self, partition: &'a [u8]) -> Option<&'a [u8]> {
        region_slice(partition, self.current_config_offset, self.current_config_size)
    }

    /// Borrows the Config Input bytes out of the partition blob, if
    /// present.
    #[must_use]
    pub fn config_input_slice<'a>(&self, partition: &'a [u8]) -> Option<&'a [u8]> {
        region_slice(partition, self.config_input_offset, self.config_input_size)
    }

    /// Borrows the Config Output bytes out of the partition blob, if
    /// present.
    #[must_use]
    pub fn config_output_slice<'a>(&self, partition: &'a [u8]) -> Option<&'a [u8]> {
        region_slice(partition, self.config_output_offset, self.config_output_size)
    }
}

fn region_slice(partition: &[u8], offset: u32, size: u32) -> Option<&[u8]> {
    if size == 0 {
        return None;
    }
    let start = offset as usize;
    let end = start.checked_add(size as usize)?;
    partition.get(start..end)
}

/// Parse and validate a `DMHD` Configuration Header from the start of an
/// OEM partition blob.
///
/// # Errors
///
/// Returns a [`PcdError`] if the header is truncated, mis-signed, fails
/// its checksum, carries an unsupported revision, or locates a region
/// outside the partition.
pub fn parse_configuration_header(partition: &[u8]) -> Result<ConfigurationHeader, PcdError> {
    let header = TableHeader::read(partition).ok_or(PcdError::Truncated)?;

    if &header.signature != CONFIGURATION_HEADER_SIGNATURE {
        return Err(PcdError::InvalidSignature);
    }
    let length = header.length as usize;
    if length < ConfigurationHeader::SIZE || length > partition.len() {
        return Err(PcdError::Truncated);
    }
    if !crate::is_checksum_valid(&partition[..length]) {
        return Err(PcdError::InvalidChecksum);
    }
    if header.revision != REVISION_1 && header.revision != REVISION_2 {
        return Err(PcdError::InvalidRevision(header.revision));
    }

    let read = || {
        Some(ConfigurationHeader {
            header,
            current_config_size: u32::read_at(partition, 36)?,
            current_config_offset: u32::read_at(partition, 40)?,
            config_input_size: u32::read_at(partition, 44)?,
            config_input_offset: u32::read_at(partition, 48)?,
            config_output_size: u32::read_at(partition, 52)?,
            config_output_offset: u32::read_at(partition, 56)?,
        })
    };
    let parsed = read().ok_or(PcdError::Truncated)?;

    // Every referenced region must lie inside the partition.
    for (offset, size) in [
        (parsed.current_config_offset, parsed.current_config_size),
        (parsed.config_input_offset, parsed.config_input_size),
        (parsed.config_output_offset, parsed.config_output_size),
    ] {
        if size != 0 && region_slice(partition, offset, size).is_none() {
            return Err(PcdError::Truncated);
        }
    }

    Ok(parsed)
}

/// A DIMM identification record within an interleave-information record.
///
/// The wire layout depends on the parent table's revision: revision 1
/// identifies a DIMM by legacy manufacturer id, serial number, and part
/// number; revision 2 by the 9-byte unique identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentificationInfo {
    /// Revision-1 legacy identification.
    Legacy {
        /// JEDEC manufacturer id.
        manufacturer_id: u16,
        /// Module serial number.
        serial_number: u32,
        /// Fixed-width ASCII part number, NUL-padded.
        part_number: String,
        /// Offset of this DIMM's contribution from the partition base.
        partition_offset: u64,
        /// Bytes this DIMM contributes to the interleave set.
        pm_partition_size: u64,
    },
    /// Revision-2 identification by unique identifier.
    Uid {
        /// The DIMM's unique identifier.
        uid: DimmUniqueIdentifier,
        /// Offset of this DIMM's contribution from the partition base.
        partition_offset: u64,
        /// Bytes this DIMM contributes to the interleave set.
        pm_partition_size: u64,
    },
}

impl IdentificationInfo {
    /// Bytes this DIMM contributes to the interleave set.
    #[must_use]
    pub fn pm_partition_size(&self) -> u64 {
        match self {
            Self::Legacy {
                pm_partition_size, ..
            }
            | Self::Uid {
                pm_partition_size, ..
            } => *pm_partition_size,
        }
    }
}

/// One embedded PCAT-style record of a config table.
#[derive(Debug, Clone)]
pub enum PcdRecord {
    /// Type 4: partition size change request/result.
    PartitionSizeChange {
        /// Status code; meaningful only in the Config Output.
        status: u32,
        /// Requested/resulting persistent partition size in bytes.
        pm_partition_size: u64,
    },
    /// Type 5: interleave set description.
    InterleaveInformation {
        /// Logical index, identical on every DIMM of the set.
        interleave_set_index: u16,
        /// Memory type (1 = 2LM volatile, 2 = App Direct persistent).
        memory_type: u8,
        /// Channel interleave size selector.
        format_channel: u8,
        /// Memory-controller interleave size selector.
        format_imc: u8,
        /// Number of ways in the set.
        format_ways: u16,
        /// Mirror enable request/result.
        mirror_enable: u8,
        /// Status code; meaningful only in the Config Output.
        status: u8,
        /// One entry per DIMM participating in the set.
        dimms: Vec<IdentificationInfo>,
    },
    /// Type 3: config management attributes extension.
    ConfigManagementAttributes {
        /// Vendor that defines the GUID data format.
        vendor_id: u16,
        /// Format GUID of the attached data.
        guid: [u8; 16],
        /// Vendor-specific data.
        guid_data: Vec<u8>,
    },
}

/// The `CCUR` Current Config table.
#[derive(Debug, Clone)]
pub struct CurrentConfig {
    /// The ACPI-style header (`CCUR`).
    pub header: TableHeader,
    /// BIOS configuration status code for this DIMM.
    pub config_status: u16,
    /// 2LM bytes from this DIMM mapped into the SPA.
    pub volatile_memory_size_into_spa: u64,
    /// Persistent bytes from this DIMM mapped into the SPA.
    pub persistent_memory_size_into_spa: u64,
    /// Embedded records describing the applied configuration.
    pub records: Vec<PcdRecord>,
}

/// The `CIN_` Config Input table.
#[derive(Debug, Clone)]
pub struct ConfigInput {
    /// The ACPI-style header (`CIN_`).
    pub header: TableHeader,
    /// Request sequence number; the BIOS echoes it into the Config Output.
    pub sequence_number: u32,
    /// Embedded records describing the requested configuration.
    pub records: Vec<PcdRecord>,
}

/// The `COUT` Config Output table.
#[derive(Debug, Clone)]
pub struct ConfigOutput {
    /// The ACPI-style header (`COUT`).
    pub header: TableHeader,
    /// Copy of the processed Config Input sequence number.
    pub sequence_number: u32,
    /// BIOS validation status for the processed input.
    pub validation_status: u8,
    /// Embedded records carrying per-request results.
    pub records: Vec<PcdRecord>,
}

/// Parse a `CCUR` Current Config table. Records start at offset 56.
///
/// # Errors
///
/// Returns a [`PcdError`] on a header or record-chain problem.
pub fn parse_current_config(data: &[u8]) -> Result<CurrentConfig, PcdError> {
    let header = parse_table_header(data, CURRENT_CONFIG_SIGNATURE)?;

    let read = || {
        Some((
            u16::read_at(data, 36)?,
            u64::read_at(data, 40)?,
            u64::read_at(data, 48)?,
        ))
    };
    let (config_status, volatile, persistent) = read().ok_or(PcdError::Truncated)?;

    Ok(CurrentConfig {
        config_status,
        volatile_memory_size_into_spa: volatile,
        persistent_memory_size_into_spa: persistent,
        records: parse_records(data, 56, header.length as usize, header.revision)?,
        header,
    })
}

/// Parse a `CIN_` Config Input table. Records start at offset 48.
///
/// # Errors
///
/// Returns a [`PcdError`] on a header or record-chain problem.
pub fn parse_config_input(data: &[u8]) -> Result<ConfigInput, PcdError> {
    let header = parse_table_header(data, CONFIG_INPUT_SIGNATURE)?;
    let sequence_number = u32::read_at(data, 36).ok_or(PcdError::Truncated)?;

    Ok(ConfigInput {
        sequence_number,
        records: parse_records(data, 48, header.length as usize, header.revision)?,
        header,
    })
}

/// Parse a `COUT` Config Output table. Records start at offset 48.
///
/// # Errors
///
/// Returns a [`PcdError`] on a header or record-chain problem.
pub fn parse_config_output(data: &[u8]) -> Result<ConfigOutput, PcdError> {
    let header = parse_table_header(data, CONFIG_OUTPUT_SIGNATURE)?;

    let read = || Some((u32::read_at(data, 36)?, u8::read_at(data, 40)?));
    let (sequence_number, validation_status) = read().ok_or(PcdError::Truncated)?;

    Ok(ConfigOutput {
        sequence_number,
        validation_status,
        records: parse_records(data, 48, header.length as usize, header.revision)?,
        header,
    })
}

/// Shared header handling for the three config tables: signature, bounds,
/// and revision. Checksum enforcement lives in [`crate::validate`], which
/// callers run before trusting a table; parsing itself only needs the
/// structure to be sound.
fn parse_table_header(data: &[u8], signature: &[u8; 4]) -> Result<TableHeader, PcdError> {
    let header = TableHeader::read(data).ok_or(PcdError::Truncated)?;

    if &header.signature != signature {
        return Err(PcdError::InvalidSignature);
    }
    let length = header.length as usize;
    if length < TableHeader::SIZE || length > data.len() {
        return Err(PcdError::Truncated);
    }
    if header.revision != REVISION_1 && header.revision != REVISION_2 {
        return Err(PcdError::InvalidRevision(header.revision));
    }

    Ok(header)
}

/// Walks the embedded record chain of a config table.
///
/// Same guarded advance as the ACPI sub-table walks: a zero or
/// out-of-bounds record length is a typed error, never a hang.
fn parse_records(
    data: &[u8],
    start: usize,
    total: usize,
    revision: u8,
) -> Result<Vec<PcdRecord>, PcdError> {
    let mut records = Vec::new();
    let mut offset = start;

    if total < start {
        return Err(PcdError::Truncated);
    }

    while offset < total {
        let ty = u16::read_at(data, offset).ok_or(PcdError::MalformedRecord)?;
        let length = u16::read_at(data, offset + 2).ok_or(PcdError::MalformedRecord)? as usize;

        if length < 4 || offset + length > total {
            return Err(PcdError::MalformedRecord);
        }

        let record = &data[offset..offset + length];
        match ty {
            RECORD_PARTITION_SIZE_CHANGE_TYPE => {
                records.push(decode_partition_size_change(record)?);
            }
            RECORD_INTERLEAVE_INFORMATION_TYPE => {
                records.push(decode_interleave_information(record, revision)?);
            }
            RECORD_CONFIG_MANAGEMENT_ATTRIBUTES_TYPE => {
                records.push(decode_management_attributes(record)?);
            }
            // Unknown record types in DIMM-resident data are not skippable:
            // the chain drives configuration decisions.
            _ => return Err(PcdError::MalformedRecord),
        }

        offset += length;
    }

    Ok(records)
}

fn decode_partition_size_change(record: &[u8]) -> Result<PcdRecord, PcdError> {
    let read = || {
        Some(PcdRecord::PartitionSizeChange {
            status: u32::read_at(record, 4)?,
            pm_partition_size: u64::read_at(record, 8)?,
        })
    };
    read().ok_or(PcdError::MalformedRecord)
}

fn decode_interleave_information(record: &[u8], revision: u8) -> Result<PcdRecord, PcdError> {
    let read = || {
        Some((
            u16::read_at(record, 4)?,
            u8::read_at(record, 6)?,
            u8::read_at(record, 7)?,
            u8::read_at(record, 8)?,
            u8::read_at(record, 9)?,
            u16::read_at(record, 10)?,
            u8::read_at(record, 12)?,
            u8::read_at(record, 13)?,
        ))
    };
    let (
        interleave_set_index,
        dimm_count,
        memory_type,
        format_channel,
        format_imc,
        format_ways,
        mirror_enable,
        status,
    ) = read().ok_or(PcdError::MalformedRecord)?;

    let mut dimms = Vec::with_capacity(dimm_count as usize);
    for i in 0..dimm_count as usize {
        let entry_offset = INTERLEAVE_INFORMATION_FIXED_SIZE + i * IDENTIFICATION_INFO_SIZE;
        let entry = record
            .get(entry_offset..entry_offset + IDENTIFICATION_INFO_SIZE)
            .ok_or(PcdError::MalformedRecord)?;
        dimms.push(decode_identification_info(entry, revision)?);
    }

    Ok(PcdRecord::InterleaveInformation {
        interleave_set_index,
        memory_type,
        format_channel,
        format_imc,
        format_ways,
        mirror_enable,
        status,
        dimms,
    })
}

fn decode_identification_info(entry: &[u8], revision: u8) -> Result<IdentificationInfo, PcdError> {
    let read = || {
        Some(if revision == REVISION_1 {
            let part_number_raw = <[u8; PART_NUMBER_SIZE]>::read_at(entry, 6)?;
            let part_number = part_number_raw
                .iter()
                .take_while(|&&b| b != 0)
                .map(|&b| b as char)
                .collect();
            IdentificationInfo::Legacy {
                manufacturer_id: u16::read_at(entry, 0)?,
                serial_number: u32::read_at(entry, 2)?,
                part_number,
                partition_offset: u64::read_at(entry, 32)?,
                pm_partition_size: u64::read_at(entry, 40)?,
            }
        } else {
            IdentificationInfo::Uid {
                uid: DimmUniqueIdentifier {
                    manufacturer_id: u16::read_at(entry, 0)?,
                    manufacturing_location: u8::read_at(entry, 2)?,
                    manufacturing_date: u16::read_at(entry, 3)?,
                    serial_number: u32::read_at(entry, 5)?,
                },
                partition_offset: u64::read_at(entry, 32)?,
                pm_partition_size: u64::read_at(entry, 40)?,
            }
        })
    };
    read().ok_or(PcdError::MalformedRecord)
}

fn decode_management_attributes(record: &[u8]) -> Result<PcdRecord, PcdError> {
    let vendor_id = u16::read_at(record, 6).ok_or(PcdError::MalformedRecord)?;
    let guid = <[u8; 16]>::read_at(record, 8).ok_or(PcdError::MalformedRecord)?;
    let guid_data = record.get(24..).ok_or(PcdError::MalformedRecord)?;

    Ok(PcdRecord::ConfigManagementAttributes {
        vendor_id,
        guid,
        guid_data: guid_data.into(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::generate::tests::build_test_config_input;
    use alloc::vec::Vec;

    // ---- Builder helpers ----------------------------------------------------

    pub(crate) fn push_table_header(t: &mut Vec<u8>, signature: &[u8; 4], revision: u8) {
        t.extend_from_slice(signature);
        t.extend_from_slice(&0u32.to_le_bytes()); // length, fixed up later
        t.push(revision);
        t.push(0); // checksum
        t.extend_from_slice(b"INTEL ");
        t.extend_from_slice(b"PURLEY  ");
        t.extend_from_slice(&2u32.to_le_bytes());
        t.extend_from_slice(&u32::from_le_bytes(*b"INTL").to_le_bytes());
        t.extend_from_slice(&1u32.to_le_bytes());
    }

    pub(crate) fn finish_pcd_table(t: &mut Vec<u8>) {
        let length = t.len() as u32;
        t[4..8].copy_from_slice(&length.to_le_bytes());
        crate::generate_checksum(t, crate::CHECKSUM_OFFSET);
    }

    fn build_current_config(revision: u8) -> Vec<u8> {
        let mut t = Vec::new();
        push_table_header(&mut t, CURRENT_CONFIG_SIGNATURE, revision);
        t.extend_from_slice(&1u16.to_le_bytes()); // configured successfully
        t.extend_from_slice(&[0u8; 2]);
        t.extend_from_slice(&0u64.to_le_bytes()); // volatile mapped
        t.extend_from_slice(&(256u64 << 30).to_le_bytes()); // persistent mapped

        // Partition size change record.
        t.extend_from_slice(&RECORD_PARTITION_SIZE_CHANGE_TYPE.to_le_bytes());
        t.extend_from_slice(&16u16.to_le_bytes());
        t.extend_from_slice(&1u32.to_le_bytes());
        t.extend_from_slice(&(256u64 << 30).to_le_bytes());

        finish_pcd_table(&mut t);
        t
    }

    fn build_configuration_header(
        current: &[u8],
        input: &[u8],
        output: &[u8],
    ) -> Vec<u8> {
        let mut t = Vec::new();
        push_table_header(&mut t, CONFIGURATION_HEADER_SIGNATURE, REVISION_2);

        let current_offset = ConfigurationHeader::SIZE as u32;
        let input_offset = current_offset + current.len() as u32;
        let output_offset = input_offset + input.len() as u32;

        t.extend_from_slice(&(current.len() as u32).to_le_bytes());
        t.extend_from_slice(&current_offset.to_le_bytes());
        t.extend_from_slice(&(input.len() as u32).to_le_bytes());
        t.extend_from_slice(&input_offset.to_le_bytes());
        t.extend_from_slice(&(output.len() as u32).to_le_bytes());
        t.extend_from_slice(&output_offset.to_le_bytes());

        // Length and checksum cover the header only, not the regions.
        finish_pcd_table(&mut t);

        t.extend_from_slice(current);
        t.extend_from_slice(input);
        t.extend_from_slice(output);
        t
    }

    // ---- Configuration header tests -----------------------------------------

    #[test]
    fn configuration_header_locates_regions() {
        let current = build_current_config(REVISION_2);
        let partition = build_configuration_header(&current, &[], &[]);

        let header = parse_configuration_header(&partition).unwrap();
        assert_eq!(header.current_config_size as usize, current.len());
        assert_eq!(header.config_input_size, 0);

        let slice = header.current_config_slice(&partition).unwrap();
        assert_eq!(slice, &current[..]);
        assert!(header.config_input_slice(&partition).is_none());
    }

    #[test]
    fn configuration_header_rejects_bad_signature() {
        let mut partition = build_configuration_header(&[], &[], &[]);
        partition[0..4].copy_from_slice(b"XXXX");
        assert_eq!(
            parse_configuration_header(&partition).unwrap_err(),
            PcdError::InvalidSignature
        );
    }

    #[test]
    fn configuration_header_rejects_region_past_end() {
        let current = build_current_config(REVISION_2);
        let mut partition = build_configuration_header(&current, &[], &[]);
        // Declare the current-config region larger than the blob.
        let size = (current.len() + 100) as u32;
        partition[36..40].copy_from_slice(&size.to_le_bytes());
        crate::generate_checksum(&mut partition[..ConfigurationHeader::SIZE], crate::CHECKSUM_OFFSET);
        assert_eq!(
            parse_configuration_header(&partition).unwrap_err(),
            PcdError::Truncated
        );
    }

    #[test]
    fn configuration_header_rejects_bad_revision() {
        let mut partition = build_configuration_header(&[], &[], &[]);
        partition[8] = 7;
        crate::generate_checksum(&mut partition[..ConfigurationHeader::SIZE], crate::CHECKSUM_OFFSET);
        assert_eq!(
            parse_configuration_header(&partition).unwrap_err(),
            PcdError::InvalidRevision(7)
        );
    }

    // ---- Current config tests -----------------------------------------------

    #[test]
    fn current_config_decodes_body_and_records() {
        let t = build_current_config(REVISION_2);
        let ccur = parse_current_config(&t).unwrap();
        assert_eq!(ccur.config_status, 1);
        assert_eq!(ccur.persistent_memory_size_into_spa, 256u64 << 30);
        assert_eq!(ccur.records.len(), 1);
        assert!(matches!(
            ccur.records[0],
            PcdRecord::PartitionSizeChange {
                status: 1,
                pm_partition_size,
            } if pm_partition_size == 256u64 << 30
        ));
    }

    #[test]
    fn zero_length_record_is_malformed() {
        let mut t = Vec::new();
        push_table_header(&mut t, CURRENT_CONFIG_SIGNATURE, REVISION_2);
        t.extend_from_slice(&[0u8; 20]); // body
        t.extend_from_slice(&RECORD_PARTITION_SIZE_CHANGE_TYPE.to_le_bytes());
        t.extend_from_slice(&0u16.to_le_bytes()); // zero length
        t.extend_from_slice(&[0u8; 12]);
        finish_pcd_table(&mut t);
        assert_eq!(parse_current_config(&t).unwrap_err(), PcdError::MalformedRecord);
    }

    #[test]
    fn unknown_record_type_is_malformed() {
        let mut t = Vec::new();
        push_table_header(&mut t, CURRENT_CONFIG_SIGNATURE, REVISION_2);
        t.extend_from_slice(&[0u8; 20]); // body
        t.extend_from_slice(&0x22u16.to_le_bytes());
        t.extend_from_slice(&8u16.to_le_bytes());
        t.extend_from_slice(&[0u8; 4]);
        finish_pcd_table(&mut t);
        assert_eq!(parse_current_config(&t).unwrap_err(), PcdError::MalformedRecord);
    }

    // ---- Config input round trip --------------------------------------------

    #[test]
    fn generated_config_input_parses_back() {
        let (t, goal) = build_test_config_input(REVISION_2, 6);
        let cin = parse_config_input(&t).unwrap();
        assert_eq!(cin.sequence_number, 8);

        let interleave = cin
            .records
            .iter()
            .find_map(|r| match r {
                PcdRecord::InterleaveInformation { dimms, format_ways, .. } => {
                    Some((dimms, *format_ways))
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(interleave.1, 6);
        assert_eq!(interleave.0.len(), goal.regions[0].dimms.len());
    }
}
