//! Config-Input (`CIN_`) table generation.
//!
//! Builds the blob management software writes back to a DIMM's OEM
//! partition to request a new configuration: a partition-size change, one
//! interleave-information record per goal region with its DIMM list in
//! BIOS order, and an optional management-attributes extension. The result
//! always re-validates: correct signature, declared length, and a checksum
//! summing the table to zero.

use alloc::string::String;
use alloc::vec::Vec;

use pmem_acpi::header::TableHeader;
use pmem_acpi::uid::DimmUniqueIdentifier;

use crate::order::{DimmPlacement, compare_dimm_order, compare_dimm_order_6way};
use crate::tables::{
    IDENTIFICATION_INFO_SIZE, INTERLEAVE_INFORMATION_FIXED_SIZE, PART_NUMBER_SIZE,
};
use crate::{
    CHECKSUM_OFFSET, CONFIG_INPUT_SIGNATURE, RECORD_CONFIG_MANAGEMENT_ATTRIBUTES_TYPE,
    RECORD_INTERLEAVE_INFORMATION_TYPE, RECORD_PARTITION_SIZE_CHANGE_TYPE, REVISION_1,
    next_sequence_number,
};

/// OEM id stamped into generated tables.
const OEM_ID: &[u8; 6] = b"INTEL ";
/// OEM table id stamped into generated tables.
const OEM_TABLE_ID: &[u8; 8] = b"PURLEY  ";
/// Creator id stamped into generated tables.
const CREATOR_ID: &[u8; 4] = b"INTL";

/// One DIMM participating in a goal region.
#[derive(Debug, Clone)]
pub struct GoalDimm {
    /// The DIMM's unique identifier.
    pub uid: DimmUniqueIdentifier,
    /// Part number, used by revision-1 identification records.
    pub part_number: String,
    /// Channel/controller coordinates deciding the interleave order.
    pub placement: DimmPlacement,
    /// Offset of this DIMM's contribution from the partition base.
    pub partition_offset: u64,
    /// Bytes this DIMM contributes to the interleave set.
    pub pm_partition_size: u64,
}

/// One requested interleave set.
#[derive(Debug, Clone)]
pub struct GoalRegion {
    /// Logical index, identical on every DIMM of the set.
    pub interleave_set_index: u16,
    /// Memory type (2 = App Direct persistent).
    pub memory_type: u8,
    /// Channel interleave size selector from the PCAT format list.
    pub format_channel: u8,
    /// Memory-controller interleave size selector.
    pub format_imc: u8,
    /// Number of ways in the set.
    pub ways: u16,
    /// Request mirroring for the set.
    pub mirror_enable: bool,
    /// The participating DIMMs, in any order; generation sorts them.
    pub dimms: Vec<GoalDimm>,
}

/// An optional vendor extension appended to the generated input.
#[derive(Debug, Clone)]
pub struct ManagementAttributes {
    /// Vendor that defines the GUID data format.
    pub vendor_id: u16,
    /// Format GUID of the attached data.
    pub guid: [u8; 16],
    /// Vendor-specific data; padded to an 8-byte multiple on the wire.
    pub guid_data: Vec<u8>,
}

/// A complete configuration goal for one DIMM.
#[derive(Debug, Clone)]
pub struct GoalConfig {
    /// Table revision to generate (1 or 2); selects the DIMM
    /// identification layout.
    pub revision: u8,
    /// Requested persistent partition size in bytes.
    pub pm_partition_size: u64,
    /// Requested interleave sets this DIMM participates in.
    pub regions: Vec<GoalRegion>,
    /// Optional management-attributes extension.
    pub management_attributes: Option<ManagementAttributes>,
}

/// Builds a `CIN_` Config Input table for `goal`.
///
/// The sequence number is the successor of `last_output_sequence` (the
/// wrap of `u32::MAX` to 0 is accepted). DIMMs within each region are
/// sorted with [`compare_dimm_order`], or [`compare_dimm_order_6way`] for
/// 6-way sets, before their identification records are emitted.
#[must_use]
pub fn generate_config_input(goal: &GoalConfig, last_output_sequence: u32) -> Vec<u8> {
    let mut t = Vec::new();

    // ACPI-style header; length and checksum are fixed up at the end.
    t.extend_from_slice(CONFIG_INPUT_SIGNATURE);
    t.extend_from_slice(&0u32.to_le_bytes());
    t.push(goal.revision);
    t.push(0);
    t.extend_from_slice(OEM_ID);
    t.extend_from_slice(OEM_TABLE_ID);
    t.extend_from_slice(&2u32.to_le_bytes());
    t.extend_from_slice(CREATOR_ID);
    t.extend_from_slice(&1u32.to_le_bytes());

    t.extend_from_slice(&next_sequence_number(last_output_sequence).to_le_bytes());
    t.extend_from_slice(&[0u8; 8]);

    emit_partition_size_change(&mut t, goal.pm_partition_size);

    for region in &goal.regions {
        emit_interleave_information(&mut t, region, goal.revision);
    }

    if let Some(attributes) = &goal.management_attributes {
        emit_management_attributes(&mut t, attributes);
    }

    let length = t.len() as u32;
    t[4..8].copy_from_slice(&length.to_le_bytes());
    crate::generate_checksum(&mut t, CHECKSUM_OFFSET);
    t
}

fn emit_partition_size_change(t: &mut Vec<u8>, pm_partition_size: u64) {
    t.extend_from_slice(&RECORD_PARTITION_SIZE_CHANGE_TYPE.to_le_bytes());
    t.extend_from_slice(&16u16.to_le_bytes());
    t.extend_from_slice(&0u32.to_le_bytes()); // status, reserved on input
    t.extend_from_slice(&pm_partition_size.to_le_bytes());
}

fn emit_interleave_information(t: &mut Vec<u8>, region: &GoalRegion, revision: u8) {
    let mut dimms: Vec<&GoalDimm> = region.dimms.iter().collect();
    if region.ways == 6 {
        dimms.sort_by(|a, b| compare_dimm_order_6way(&a.placement, &b.placement));
    } else {
        dimms.sort_by(|a, b| compare_dimm_order(&a.placement, &b.placement));
    }

    let length = INTERLEAVE_INFORMATION_FIXED_SIZE + dimms.len() * IDENTIFICATION_INFO_SIZE;

    t.extend_from_slice(&RECORD_INTERLEAVE_INFORMATION_TYPE.to_le_bytes());
    t.extend_from_slice(&(length as u16).to_le_bytes());
    t.extend_from_slice(&region.interleave_set_index.to_le_bytes());
    t.push(dimms.len() as u8);
    t.push(region.memory_type);
    t.push(region.format_channel);
    t.push(region.format_imc);
    t.extend_from_slice(&region.ways.to_le_bytes());
    t.push(u8::from(region.mirror_enable));
    t.push(0); // status, reserved on input
    t.push(0); // memory spare
    t.extend_from_slice(&[0u8; 9]);

    for dimm in dimms {
        emit_identification_info(t, dimm, revision);
    }
}

fn emit_identification_info(t: &mut Vec<u8>, dimm: &GoalDimm, revision: u8) {
    if revision == REVISION_1 {
        t.extend_from_slice(&dimm.uid.manufacturer_id.to_le_bytes());
        t.extend_from_slice(&dimm.uid.serial_number.to_le_bytes());
        let mut part_number = [0u8; PART_NUMBER_SIZE];
        for (dst, src) in part_number.iter_mut().zip(dimm.part_number.bytes()) {
            *dst = src;
        }
        t.extend_from_slice(&part_number);
        t.extend_from_slice(&[0u8; 6]);
    } else {
        t.extend_from_slice(&dimm.uid.manufacturer_id.to_le_bytes());
        t.push(dimm.uid.manufacturing_location);
        t.extend_from_slice(&dimm.uid.manufacturing_date.to_le_bytes());
        t.extend_from_slice(&dimm.uid.serial_number.to_le_bytes());
        t.extend_from_slice(&[0u8; 23]);
    }
    t.extend_from_slice(&dimm.partition_offset.to_le_bytes());
    t.extend_from_slice(&dimm.pm_partition_size.to_le_bytes());
}

fn emit_management_attributes(t: &mut Vec<u8>, attributes: &ManagementAttributes) {
    let padded_len = attributes.guid_data.len().next_multiple_of(8);
    let length = 24 + padded_len;

    t.extend_from_slice(&RECORD_CONFIG_MANAGEMENT_ATTRIBUTES_TYPE.to_le_bytes());
    t.extend_from_slice(&(length as u16).to_le_bytes());
    t.extend_from_slice(&[0u8; 2]); // reserved
    t.extend_from_slice(&attributes.vendor_id.to_le_bytes());
    t.extend_from_slice(&attributes.guid);
    t.extend_from_slice(&attributes.guid_data);
    t.resize(t.len() + padded_len - attributes.guid_data.len(), 0);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tables::{IdentificationInfo, PcdRecord, parse_config_input};
    use crate::{REVISION_2, is_checksum_valid};
    use alloc::string::ToString;
    use alloc::vec;

    fn goal_dimm(channel: u16, controller: u16, serial: u32) -> GoalDimm {
        GoalDimm {
            uid: DimmUniqueIdentifier {
                manufacturer_id: 0x8980,
                manufacturing_location: 0x02,
                manufacturing_date: 0x2132,
                serial_number: serial,
            },
            part_number: "PW-128-X".to_string(),
            placement: DimmPlacement {
                channel,
                controller,
            },
            partition_offset: 0,
            pm_partition_size: 128u64 << 30,
        }
    }

    /// Builds a config input for an N-way region with scrambled DIMM
    /// order. Returns the table bytes and the goal it encodes.
    pub(crate) fn build_test_config_input(revision: u8, ways: u16) -> (Vec<u8>, GoalConfig) {
        let dimms = match ways {
            6 => vec![
                goal_dimm(2, 1, 6),
                goal_dimm(0, 1, 4),
                goal_dimm(1, 0, 5),
                goal_dimm(0, 0, 1),
                goal_dimm(2, 0, 3),
                goal_dimm(1, 1, 2),
            ],
            _ => vec![goal_dimm(1, 0, 2), goal_dimm(0, 0, 1)],
        };

        let goal = GoalConfig {
            revision,
            pm_partition_size: 128u64 << 30,
            regions: vec![GoalRegion {
                interleave_set_index: 1,
                memory_type: 2,
                format_channel: 0x01,
                format_imc: 0x01,
                ways,
                mirror_enable: false,
                dimms,
            }],
            management_attributes: None,
        };

        (generate_config_input(&goal, 7), goal)
    }

    #[test]
    fn generated_table_checksums_to_zero() {
        let (t, _) = build_test_config_input(REVISION_2, 2);
        assert!(is_checksum_valid(&t));
    }

    #[test]
    fn sequence_number_is_successor_of_output() {
        let (t, _) = build_test_config_input(REVISION_2, 2);
        let cin = parse_config_input(&t).unwrap();
        assert_eq!(cin.sequence_number, 8);
    }

    #[test]
    fn wrapped_sequence_number_is_accepted() {
        let goal = build_test_config_input(REVISION_2, 2).1;
        let t = generate_config_input(&goal, u32::MAX);
        assert_eq!(parse_config_input(&t).unwrap().sequence_number, 0);
    }

    #[test]
    fn dimms_are_sorted_by_standard_order() {
        let (t, _) = build_test_config_input(REVISION_2, 2);
        let cin = parse_config_input(&t).unwrap();
        let serials = interleave_serials(&cin.records);
        // (0,0) sorts before (1,0).
        assert_eq!(serials, &[1, 2]);
    }

    #[test]
    fn six_way_region_uses_parity_order() {
        let (t, _) = build_test_config_input(REVISION_2, 6);
        let cin = parse_config_input(&t).unwrap();
        let serials = interleave_serials(&cin.records);
        // [CH0,iMC0] [CH1,iMC1] [CH2,iMC0] [CH0,iMC1] [CH1,iMC0] [CH2,iMC1]
        assert_eq!(serials, &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn revision_1_emits_legacy_identification() {
        let (t, _) = build_test_config_input(REVISION_1, 2);
        let cin = parse_config_input(&t).unwrap();
        let dimms = interleave_dimms(&cin.records);
        assert!(matches!(
            &dimms[0],
            IdentificationInfo::Legacy { part_number, .. } if part_number == "PW-128-X"
        ));
    }

    #[test]
    fn management_attributes_are_appended_and_padded() {
        let mut goal = build_test_config_input(REVISION_2, 2).1;
        goal.management_attributes = Some(ManagementAttributes {
            vendor_id: 0x8086,
            guid: [0x5A; 16],
            guid_data: vec![1, 2, 3], // padded to 8
        });
        let t = generate_config_input(&goal, 7);
        assert!(is_checksum_valid(&t));

        let cin = parse_config_input(&t).unwrap();
        let attrs = cin
            .records
            .iter()
            .find_map(|r| match r {
                PcdRecord::ConfigManagementAttributes {
                    vendor_id,
                    guid_data,
                    ..
                } => Some((*vendor_id, guid_data.len())),
                _ => None,
            })
            .unwrap();
        assert_eq!(attrs, (0x8086, 8));
    }

    fn interleave_dimms(records: &[PcdRecord]) -> &[IdentificationInfo] {
        records
            .iter()
            .find_map(|r| match r {
                PcdRecord::InterleaveInformation { dimms, .. } => Some(dimms.as_slice()),
                _ => None,
            })
            .unwrap()
    }

    fn interleave_serials(records: &[PcdRecord]) -> Vec<u32> {
        interleave_dimms(records)
            .iter()
            .map(|d| match d {
                IdentificationInfo::Uid { uid, .. } => uid.serial_number,
                IdentificationInfo::Legacy { serial_number, .. } => *serial_number,
            })
            .collect()
    }
}
