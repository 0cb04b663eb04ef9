//! NVDIMM Firmware Interface Table (NFIT) parsing.
//!
//! The NFIT describes persistent-memory regions, their interleaving, and
//! the control/data windows of each NVDIMM. The table body is a chain of
//! variable-length sub-tables, each starting with a `{type: u16,
//! length: u16}` discriminator. Eight sub-table types are decoded; unknown
//! types are skipped by their declared length, since newer platforms may
//! append record types this tool does not consume.

use alloc::vec::Vec;

use pmem_binparse::FromBytes;

use crate::AcpiError;
use crate::header::TableHeader;

/// NFIT table signature.
pub const NFIT_SIGNATURE: &[u8; 4] = b"NFIT";

/// Offset of the first sub-table: 36-byte header plus 4 reserved bytes.
const SUBTABLES_OFFSET: usize = TableHeader::SIZE + 4;

/// Sub-table type 0: System Physical Address range.
pub const NFIT_SPA_RANGE_TYPE: u16 = 0;
/// Sub-table type 1: NVDIMM region mapping.
pub const NFIT_NVDIMM_REGION_TYPE: u16 = 1;
/// Sub-table type 2: interleave description.
pub const NFIT_INTERLEAVE_TYPE: u16 = 2;
/// Sub-table type 3: SMBIOS management information.
pub const NFIT_SMBIOS_MGMT_INFO_TYPE: u16 = 3;
/// Sub-table type 4: NVDIMM control region.
pub const NFIT_CONTROL_REGION_TYPE: u16 = 4;
/// Sub-table type 5: block data window region.
pub const NFIT_BW_DATA_WINDOW_REGION_TYPE: u16 = 5;
/// Sub-table type 6: flush hint addresses.
pub const NFIT_FLUSH_HINT_TYPE: u16 = 6;
/// Sub-table type 7: platform capabilities.
pub const NFIT_PLATFORM_CAPABILITIES_TYPE: u16 = 7;

/// NFIT device handle: packed DIMM topology coordinates.
///
/// Exposed as explicit shift/mask accessors over the raw `u32` rather than
/// a bitfield layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u32);

impl DeviceHandle {
    /// DIMM number within the memory channel (bits 0..4).
    #[must_use]
    pub fn dimm_number(self) -> u8 {
        (self.0 & 0xF) as u8
    }

    /// Memory channel within the memory controller (bits 4..8).
    #[must_use]
    pub fn mem_channel(self) -> u8 {
        ((self.0 >> 4) & 0xF) as u8
    }

    /// Memory controller within the socket (bits 8..12).
    #[must_use]
    pub fn mem_controller(self) -> u8 {
        ((self.0 >> 8) & 0xF) as u8
    }

    /// Socket within the node (bits 12..16).
    #[must_use]
    pub fn socket(self) -> u8 {
        ((self.0 >> 12) & 0xF) as u8
    }

    /// Node controller id (bits 16..28).
    #[must_use]
    pub fn node_controller(self) -> u16 {
        ((self.0 >> 16) & 0xFFF) as u16
    }
}

/// Type 0: System Physical Address range descriptor.
#[derive(Debug, Clone)]
pub struct SpaRange {
    /// Index other sub-tables use to refer to this range.
    pub spa_range_index: u16,
    /// Range flags (bit 0: control region for hot add, bit 1: proximity
    /// domain valid).
    pub flags: u16,
    /// NUMA proximity domain of the range.
    pub proximity_domain: u32,
    /// GUID identifying the address range type (persistent memory, control
    /// region, block data window, ...).
    pub address_range_type_guid: [u8; 16],
    /// Base system physical address.
    pub base: u64,
    /// Length of the range in bytes.
    pub length: u64,
    /// Memory mapping attributes of the range.
    pub memory_mapping_attributes: u64,
}

/// Type 1: NVDIMM region mapping.
#[derive(Debug, Clone)]
pub struct NvDimmRegion {
    /// Handle of the NVDIMM this region lives on.
    pub device_handle: DeviceHandle,
    /// SMBIOS physical device handle of the NVDIMM.
    pub physical_id: u16,
    /// Region id, unique within the NVDIMM.
    pub region_id: u16,
    /// Index of the SPA range this region maps into.
    pub spa_range_index: u16,
    /// Index of the control region describing this NVDIMM.
    pub control_region_index: u16,
    /// Size of the region in bytes.
    pub region_size: u64,
    /// Offset of the region within the SPA range.
    pub region_offset: u64,
    /// Base device physical address of the region.
    pub physical_address_region_base: u64,
    /// Index of the interleave description for this region.
    pub interleave_index: u16,
    /// Number of NVDIMMs interleaved in the SPA range.
    pub interleave_ways: u16,
    /// NVDIMM state flags (save/restore/flush failure, armed, smart events).
    pub state_flags: u16,
}

/// Type 2: interleave description.
#[derive(Debug, Clone)]
pub struct Interleave {
    /// Index other sub-tables use to refer to this description.
    pub interleave_index: u16,
    /// Interleave line size in bytes.
    pub line_size: u32,
    /// Line offsets, one per line described.
    pub line_offsets: Vec<u32>,
}

/// Type 3: SMBIOS management information, an opaque pass-through blob.
#[derive(Debug, Clone)]
pub struct SmbiosMgmtInfo {
    /// Raw SMBIOS management data.
    pub data: Vec<u8>,
}

/// Type 4: NVDIMM control region.
#[derive(Debug, Clone)]
pub struct ControlRegion {
    /// Index other sub-tables use to refer to this control region.
    pub control_region_index: u16,
    /// JEDEC vendor id of the NVDIMM.
    pub vendor_id: u16,
    /// Device id of the NVDIMM.
    pub device_id: u16,
    /// Revision id of the NVDIMM.
    pub revision_id: u16,
    /// Subsystem vendor id.
    pub subsystem_vendor_id: u16,
    /// Subsystem device id.
    pub subsystem_device_id: u16,
    /// Subsystem revision id.
    pub subsystem_revision_id: u16,
    /// Which of the manufacturing fields below are valid (bit 0).
    pub valid_fields: u8,
    /// Manufacturing location of the NVDIMM.
    pub manufacturing_location: u8,
    /// Manufacturing date (year/week) of the NVDIMM.
    pub manufacturing_date: u16,
    /// Serial number of the NVDIMM.
    pub serial_number: u32,
    /// Region format interface code.
    pub region_format_interface_code: u16,
    /// Number of block control windows.
    pub block_control_window_count: u16,
}

/// Type 5: block data window region.
#[derive(Debug, Clone)]
pub struct BwRegion {
    /// Index of the control region this data window belongs to.
    pub control_region_index: u16,
    /// Number of block data windows.
    pub block_data_window_count: u16,
    /// Starting logical offset of the first window.
    pub window_start_offset: u64,
    /// Size of a block data window in bytes.
    pub window_size: u64,
    /// Capacity accessible through the windows.
    pub accessible_capacity: u64,
    /// First accessible byte of that capacity.
    pub accessible_capacity_base: u64,
}

/// Type 6: flush hint addresses for an NVDIMM.
#[derive(Debug, Clone)]
pub struct FlushHint {
    /// Handle of the NVDIMM the hints apply to.
    pub device_handle: DeviceHandle,
    /// Flush hint addresses.
    pub addresses: Vec<u64>,
}

/// Type 7: platform capabilities.
#[derive(Debug, Clone)]
pub struct PlatformCapabilities {
    /// Highest bit index valid in [`PlatformCapabilities::capabilities`].
    pub highest_valid_capability: u8,
    /// Capability bits (bit 0: CPU cache flush to persistence, bit 1:
    /// memory controller flush to persistence, bit 2: mirroring).
    pub capabilities: u32,
}

/// Owned, typed decomposition of an NFIT table.
///
/// Each decoded sub-table is pushed into the `Vec` matching its type, in
/// table order. Dropping the struct releases everything.
#[derive(Debug, Default)]
pub struct ParsedNfit {
    /// The validated ACPI header of the source table.
    pub header: Option<TableHeader>,
    /// Type 0 sub-tables.
    pub spa_ranges: Vec<SpaRange>,
    /// Type 1 sub-tables.
    pub regions: Vec<NvDimmRegion>,
    /// Type 2 sub-tables.
    pub interleaves: Vec<Interleave>,
    /// Type 3 sub-tables.
    pub smbios_tables: Vec<SmbiosMgmtInfo>,
    /// Type 4 sub-tables.
    pub control_regions: Vec<ControlRegion>,
    /// Type 5 sub-tables.
    pub bw_regions: Vec<BwRegion>,
    /// Type 6 sub-tables.
    pub flush_hints: Vec<FlushHint>,
    /// Type 7 sub-tables.
    pub platform_capabilities: Vec<PlatformCapabilities>,
}

impl ParsedNfit {
    /// Finds the control region a region mapping refers to.
    #[must_use]
    pub fn control_region_for(&self, region: &NvDimmRegion) -> Option<&ControlRegion> {
        self.control_regions
            .iter()
            .find(|c| c.control_region_index == region.control_region_index)
    }

    /// Finds the flush hint sub-table for an NVDIMM region's device handle.
    #[must_use]
    pub fn flush_hint_for(&self, region: &NvDimmRegion) -> Option<&FlushHint> {
        self.flush_hints
            .iter()
            .find(|h| h.device_handle == region.device_handle)
    }
}

/// Reads the `{type, length}` discriminator at `offset` and bounds-checks
/// the declared length against the table end.
///
/// Shared by the NFIT and PCAT walks: a zero length would loop forever and
/// an oversized one would read past the table, so both are rejected before
/// the length is trusted.
pub(crate) fn read_sub_table(
    data: &[u8],
    offset: usize,
    total: usize,
) -> Result<(u16, usize), AcpiError> {
    let ty = u16::read_at(data, offset).ok_or(AcpiError::MalformedTable)?;
    let length = u16::read_at(data, offset + 2).ok_or(AcpiError::MalformedTable)? as usize;

    if length < 4 || offset + length > total {
        return Err(AcpiError::MalformedTable);
    }

    Ok((ty, length))
}

/// Parse an NFIT table from raw bytes.
///
/// The checksum is deliberately not enforced: the NFIT is parsed for
/// inventory/display and platforms with a stale checksum still carry usable
/// topology. Structural problems are still hard errors.
///
/// # Errors
///
/// Returns [`AcpiError::InvalidSignature`] or [`AcpiError::TruncatedData`]
/// for a bad header, and [`AcpiError::MalformedTable`] if any sub-table
/// declares a zero length, a length below the discriminator size, or a
/// length extending past the declared table end.
pub fn parse_nfit(data: &[u8]) -> Result<ParsedNfit, AcpiError> {
    let header = TableHeader::parse(data, NFIT_SIGNATURE)?;
    let total = header.length as usize;

    if total < SUBTABLES_OFFSET {
        return Err(AcpiError::TruncatedData);
    }

    let mut parsed = ParsedNfit {
        header: Some(header),
        ..ParsedNfit::default()
    };

    let mut offset = SUBTABLES_OFFSET;
    while offset < total {
        let (ty, length) = read_sub_table(data, offset, total)?;
        let sub = &data[offset..offset + length];

        match ty {
            NFIT_SPA_RANGE_TYPE => parsed.spa_ranges.push(decode_spa_range(sub)?),
            NFIT_NVDIMM_REGION_TYPE => parsed.regions.push(decode_region(sub)?),
            NFIT_INTERLEAVE_TYPE => parsed.interleaves.push(decode_interleave(sub)?),
            NFIT_SMBIOS_MGMT_INFO_TYPE => parsed.smbios_tables.push(decode_smbios(sub)?),
            NFIT_CONTROL_REGION_TYPE => parsed.control_regions.push(decode_control_region(sub)?),
            NFIT_BW_DATA_WINDOW_REGION_TYPE => parsed.bw_regions.push(decode_bw_region(sub)?),
            NFIT_FLUSH_HINT_TYPE => parsed.flush_hints.push(decode_flush_hint(sub)?),
            NFIT_PLATFORM_CAPABILITIES_TYPE => {
                parsed.platform_capabilities.push(decode_platform_capabilities(sub)?);
            }
            _ => {}
        }

        offset += length;
    }

    Ok(parsed)
}

fn decode_spa_range(sub: &[u8]) -> Result<SpaRange, AcpiError> {
    let read = || {
        Some(SpaRange {
            spa_range_index: u16::read_at(sub, 4)?,
            flags: u16::read_at(sub, 6)?,
            proximity_domain: u32::read_at(sub, 12)?,
            address_range_type_guid: <[u8; 16]>::read_at(sub, 16)?,
            base: u64::read_at(sub, 32)?,
            length: u64::read_at(sub, 40)?,
            memory_mapping_attributes: u64::read_at(sub, 48)?,
        })
    };
    read().ok_or(AcpiError::MalformedTable)
}

fn decode_region(sub: &[u8]) -> Result<NvDimmRegion, AcpiError> {
    let read = || {
        Some(NvDimmRegion {
            device_handle: DeviceHandle(u32::read_at(sub, 4)?),
            physical_id: u16::read_at(sub, 8)?,
            region_id: u16::read_at(sub, 10)?,
            spa_range_index: u16::read_at(sub, 12)?,
            control_region_index: u16::read_at(sub, 14)?,
            region_size: u64::read_at(sub, 16)?,
            region_offset: u64::read_at(sub, 24)?,
            physical_address_region_base: u64::read_at(sub, 32)?,
            interleave_index: u16::read_at(sub, 40)?,
            interleave_ways: u16::read_at(sub, 42)?,
            state_flags: u16::read_at(sub, 44)?,
        })
    };
    read().ok_or(AcpiError::MalformedTable)
}

fn decode_interleave(sub: &[u8]) -> Result<Interleave, AcpiError> {
    let interleave_index = u16::read_at(sub, 4).ok_or(AcpiError::MalformedTable)?;
    let line_count = u32::read_at(sub, 8).ok_or(AcpiError::MalformedTable)? as usize;
    let line_size = u32::read_at(sub, 12).ok_or(AcpiError::MalformedTable)?;

    let mut line_offsets = Vec::with_capacity(line_count);
    for i in 0..line_count {
        line_offsets.push(u32::read_at(sub, 16 + i * 4).ok_or(AcpiError::MalformedTable)?);
    }

    Ok(Interleave {
        interleave_index,
        line_size,
        line_offsets,
    })
}

fn decode_smbios(sub: &[u8]) -> Result<SmbiosMgmtInfo, AcpiError> {
    let data = sub.get(8..).ok_or(AcpiError::MalformedTable)?;
    Ok(SmbiosMgmtInfo { data: data.into() })
}

fn decode_control_region(sub: &[u8]) -> Result<ControlRegion, AcpiError> {
    let read = || {
        Some(ControlRegion {
            control_region_index: u16::read_at(sub, 4)?,
            vendor_id: u16::read_at(sub, 6)?,
            device_id: u16::read_at(sub, 8)?,
            revision_id: u16::read_at(sub, 10)?,
            subsystem_vendor_id: u16::read_at(sub, 12)?,
            subsystem_device_id: u16::read_at(sub, 14)?,
            subsystem_revision_id: u16::read_at(sub, 16)?,
            valid_fields: u8::read_at(sub, 18)?,
            manufacturing_location: u8::read_at(sub, 19)?,
            manufacturing_date: u16::read_at(sub, 20)?,
            serial_number: u32::read_at(sub, 24)?,
            region_format_interface_code: u16::read_at(sub, 28)?,
            block_control_window_count: u16::read_at(sub, 30)?,
        })
    };
    read().ok_or(AcpiError::MalformedTable)
}

fn decode_bw_region(sub: &[u8]) -> Result<BwRegion, AcpiError> {
    let read = || {
        Some(BwRegion {
            control_region_index: u16::read_at(sub, 4)?,
            block_data_window_count: u16::read_at(sub, 6)?,
            window_start_offset: u64::read_at(sub, 8)?,
            window_size: u64::read_at(sub, 16)?,
            accessible_capacity: u64::read_at(sub, 24)?,
            accessible_capacity_base: u64::read_at(sub, 32)?,
        })
    };
    read().ok_or(AcpiError::MalformedTable)
}

fn decode_flush_hint(sub: &[u8]) -> Result<FlushHint, AcpiError> {
    let device_handle = DeviceHandle(u32::read_at(sub, 4).ok_or(AcpiError::MalformedTable)?);
    let count = u16::read_at(sub, 8).ok_or(AcpiError::MalformedTable)? as usize;

    let mut addresses = Vec::with_capacity(count);
    for i in 0..count {
        addresses.push(u64::read_at(sub, 16 + i * 8).ok_or(AcpiError::MalformedTable)?);
    }

    Ok(FlushHint {
        device_handle,
        addresses,
    })
}

fn decode_platform_capabilities(sub: &[u8]) -> Result<PlatformCapabilities, AcpiError> {
    let read = || {
        Some(PlatformCapabilities {
            highest_valid_capability: u8::read_at(sub, 4)?,
            capabilities: u32::read_at(sub, 8)?,
        })
    };
    read().ok_or(AcpiError::MalformedTable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    // ---- NFIT builder helpers -----------------------------------------------

    fn push_header(t: &mut Vec<u8>, signature: &[u8; 4]) {
        t.extend_from_slice(signature);
        t.extend_from_slice(&0u32.to_le_bytes()); // length, fixed up later
        t.push(1); // revision
        t.push(0); // checksum
        t.extend_from_slice(b"PMEMC ");
        t.extend_from_slice(b"PMEMCTL ");
        t.extend_from_slice(&2u32.to_le_bytes());
        t.extend_from_slice(&0x4C54_4E49u32.to_le_bytes());
        t.extend_from_slice(&1u32.to_le_bytes());
        t.extend_from_slice(&[0u8; 4]); // reserved
    }

    fn finish_table(t: &mut Vec<u8>) {
        let length = t.len() as u32;
        t[4..8].copy_from_slice(&length.to_le_bytes());
        let sum = crate::header::checksum(t);
        t[9] = 0u8.wrapping_sub(sum);
    }

    /// Emits a sub-table with the given type and body (body excludes the
    /// 4-byte discriminator).
    fn emit_sub(t: &mut Vec<u8>, ty: u16, body: &[u8]) {
        t.extend_from_slice(&ty.to_le_bytes());
        t.extend_from_slice(&((body.len() + 4) as u16).to_le_bytes());
        t.extend_from_slice(body);
    }

    fn spa_range_body(index: u16, base: u64, length: u64) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&index.to_le_bytes());
        b.extend_from_slice(&2u16.to_le_bytes()); // flags: proximity valid
        b.extend_from_slice(&[0u8; 4]); // reserved
        b.extend_from_slice(&0u32.to_le_bytes()); // proximity domain
        b.extend_from_slice(&[0xAB; 16]); // range type guid
        b.extend_from_slice(&base.to_le_bytes());
        b.extend_from_slice(&length.to_le_bytes());
        b.extend_from_slice(&0u64.to_le_bytes()); // mapping attributes
        b
    }

    fn region_body(handle: u32, physical_id: u16, size: u64) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&handle.to_le_bytes());
        b.extend_from_slice(&physical_id.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes()); // region id
        b.extend_from_slice(&1u16.to_le_bytes()); // spa range index
        b.extend_from_slice(&1u16.to_le_bytes()); // control region index
        b.extend_from_slice(&size.to_le_bytes());
        b.extend_from_slice(&0u64.to_le_bytes()); // region offset
        b.extend_from_slice(&0u64.to_le_bytes()); // dpa base
        b.extend_from_slice(&1u16.to_le_bytes()); // interleave index
        b.extend_from_slice(&2u16.to_le_bytes()); // interleave ways
        b.extend_from_slice(&0u16.to_le_bytes()); // state flags
        b.extend_from_slice(&[0u8; 2]); // reserved
        b
    }

    fn control_region_body(index: u16, serial: u32) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&index.to_le_bytes());
        b.extend_from_slice(&0x8089u16.to_le_bytes()); // vendor id
        b.extend_from_slice(&0x5141u16.to_le_bytes()); // device id
        b.extend_from_slice(&2u16.to_le_bytes()); // revision id
        b.extend_from_slice(&0x8089u16.to_le_bytes()); // subsystem vendor
        b.extend_from_slice(&0x097Au16.to_le_bytes()); // subsystem device
        b.extend_from_slice(&0u16.to_le_bytes()); // subsystem revision
        b.push(1); // valid fields
        b.push(0x20); // manufacturing location
        b.extend_from_slice(&0x2132u16.to_le_bytes()); // manufacturing date
        b.extend_from_slice(&[0u8; 2]); // reserved
        b.extend_from_slice(&serial.to_le_bytes());
        b.extend_from_slice(&0x0301u16.to_le_bytes()); // interface code
        b.extend_from_slice(&0u16.to_le_bytes()); // block control windows
        b.resize(76, 0); // trailing window geometry + reserved
        b
    }

    fn build_nfit() -> Vec<u8> {
        let mut t = Vec::new();
        push_header(&mut t, NFIT_SIGNATURE);
        emit_sub(&mut t, NFIT_SPA_RANGE_TYPE, &spa_range_body(1, 0x1000_0000, 0x4000_0000));
        emit_sub(&mut t, NFIT_NVDIMM_REGION_TYPE, &region_body(0x0001, 0x1001, 0x2000_0000));
        emit_sub(&mut t, NFIT_NVDIMM_REGION_TYPE, &region_body(0x0101, 0x1002, 0x2000_0000));
        emit_sub(&mut t, NFIT_CONTROL_REGION_TYPE, &control_region_body(1, 0x1234_5678));
        finish_table(&mut t);
        t
    }

    // ---- Walk tests ---------------------------------------------------------

    #[test]
    fn parse_visits_every_sub_table() {
        let nfit = parse_nfit(&build_nfit()).unwrap();
        assert_eq!(nfit.spa_ranges.len(), 1);
        assert_eq!(nfit.regions.len(), 2);
        assert_eq!(nfit.control_regions.len(), 1);
        assert_eq!(nfit.interleaves.len(), 0);
    }

    #[test]
    fn decoded_fields_match() {
        let nfit = parse_nfit(&build_nfit()).unwrap();
        assert_eq!(nfit.spa_ranges[0].base, 0x1000_0000);
        assert_eq!(nfit.regions[0].physical_id, 0x1001);
        assert_eq!(nfit.regions[1].device_handle.mem_channel(), 0);
        assert_eq!(nfit.regions[1].device_handle.mem_controller(), 1);
        assert_eq!(nfit.control_regions[0].serial_number, 0x1234_5678);
    }

    #[test]
    fn zero_length_sub_table_is_malformed() {
        let mut t = Vec::new();
        push_header(&mut t, NFIT_SIGNATURE);
        // Discriminator with length 0: an unguarded walk would never advance.
        t.extend_from_slice(&NFIT_SPA_RANGE_TYPE.to_le_bytes());
        t.extend_from_slice(&0u16.to_le_bytes());
        finish_table(&mut t);
        assert_eq!(parse_nfit(&t).unwrap_err(), AcpiError::MalformedTable);
    }

    #[test]
    fn oversized_sub_table_is_malformed() {
        let mut t = Vec::new();
        push_header(&mut t, NFIT_SIGNATURE);
        // Declares 100 bytes but the table ends right after the discriminator.
        t.extend_from_slice(&NFIT_SPA_RANGE_TYPE.to_le_bytes());
        t.extend_from_slice(&100u16.to_le_bytes());
        finish_table(&mut t);
        assert_eq!(parse_nfit(&t).unwrap_err(), AcpiError::MalformedTable);
    }

    #[test]
    fn unknown_sub_table_type_is_skipped() {
        let mut t = Vec::new();
        push_header(&mut t, NFIT_SIGNATURE);
        emit_sub(&mut t, 0x7FFF, &[0u8; 12]);
        emit_sub(&mut t, NFIT_SPA_RANGE_TYPE, &spa_range_body(1, 0, 0x1000));
        finish_table(&mut t);
        let nfit = parse_nfit(&t).unwrap();
        assert_eq!(nfit.spa_ranges.len(), 1);
    }

    #[test]
    fn invalid_checksum_is_tolerated() {
        let mut t = build_nfit();
        t[9] = t[9].wrapping_add(1);
        assert!(parse_nfit(&t).is_ok());
    }

    #[test]
    fn wrong_signature_is_rejected() {
        let mut t = build_nfit();
        t[0..4].copy_from_slice(b"FOOB");
        assert_eq!(parse_nfit(&t).unwrap_err(), AcpiError::InvalidSignature);
    }

    #[test]
    fn control_region_lookup() {
        let nfit = parse_nfit(&build_nfit()).unwrap();
        let ctrl = nfit.control_region_for(&nfit.regions[0]).unwrap();
        assert_eq!(ctrl.control_region_index, 1);
        assert!(nfit.flush_hint_for(&nfit.regions[0]).is_none());
    }

    #[test]
    fn interleave_line_offsets() {
        let mut body = Vec::new();
        body.extend_from_slice(&3u16.to_le_bytes()); // interleave index
        body.extend_from_slice(&[0u8; 2]);
        body.extend_from_slice(&2u32.to_le_bytes()); // line count
        body.extend_from_slice(&256u32.to_le_bytes()); // line size
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&4096u32.to_le_bytes());

        let mut t = Vec::new();
        push_header(&mut t, NFIT_SIGNATURE);
        emit_sub(&mut t, NFIT_INTERLEAVE_TYPE, &body);
        finish_table(&mut t);

        let nfit = parse_nfit(&t).unwrap();
        assert_eq!(nfit.interleaves[0].interleave_index, 3);
        assert_eq!(nfit.interleaves[0].line_offsets, &[0, 4096]);
    }
}
