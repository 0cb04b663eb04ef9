//! DIMM inventory built from the NFIT and SMBIOS.
//!
//! Each NVDIMM appears in the NFIT as one or more region mappings sharing
//! a device handle, plus a control region carrying the manufacturing
//! identity. The SMBIOS Memory Device structure with the matching
//! physical id contributes the slot locator and part number when
//! available; its absence only degrades the listing.

use std::collections::BTreeMap;

use pmem_acpi::nfit::{DeviceHandle, ParsedNfit};
use pmem_acpi::uid::DimmUniqueIdentifier;
use pmem_smbios::MemoryDevice;

use crate::verbose::dprintln;

/// One row of the DIMM inventory.
#[derive(Debug, Clone)]
pub struct DimmEntry {
    /// NFIT device handle (topology coordinates).
    pub handle: DeviceHandle,
    /// SMBIOS physical device id.
    pub physical_id: u16,
    /// Canonical DIMM UID string, when a control region identifies the
    /// DIMM.
    pub uid: Option<String>,
    /// JEDEC vendor id from the control region.
    pub vendor_id: Option<u16>,
    /// Total bytes mapped from this DIMM across its regions.
    pub capacity: u64,
    /// Highest interleave ways over this DIMM's regions.
    pub interleave_ways: u16,
    /// Slot locator from SMBIOS, when present.
    pub locator: Option<String>,
    /// Part number from SMBIOS, when present.
    pub part_number: Option<String>,
}

/// Builds the inventory from a parsed NFIT and optional SMBIOS memory
/// devices.
#[must_use]
pub fn build_inventory(nfit: &ParsedNfit, smbios: &[MemoryDevice]) -> Vec<DimmEntry> {
    let mut by_handle: BTreeMap<u32, DimmEntry> = BTreeMap::new();

    for region in &nfit.regions {
        let entry = by_handle
            .entry(region.device_handle.0)
            .or_insert_with(|| DimmEntry {
                handle: region.device_handle,
                physical_id: region.physical_id,
                uid: None,
                vendor_id: None,
                capacity: 0,
                interleave_ways: 0,
                locator: None,
                part_number: None,
            });

        entry.capacity += region.region_size;
        entry.interleave_ways = entry.interleave_ways.max(region.interleave_ways);

        if entry.uid.is_none() {
            if let Some(ctrl) = nfit.control_region_for(region) {
                entry.vendor_id = Some(ctrl.vendor_id);
                entry.uid = Some(DimmUniqueIdentifier::from(ctrl).to_uid_string());
            }
        }
    }

    for entry in by_handle.values_mut() {
        if let Some(device) = smbios.iter().find(|d| d.handle == entry.physical_id) {
            entry.locator.clone_from(&device.device_locator);
            entry.part_number.clone_from(&device.part_number);
        }
    }

    by_handle.into_values().collect()
}

/// Prints the inventory as one block of key-value lines per DIMM.
pub fn print_inventory(entries: &[DimmEntry]) {
    if entries.is_empty() {
        dprintln!("No persistent-memory DIMMs found.");
        return;
    }

    for entry in entries {
        println!(
            "DimmHandle=0x{:08x} Socket={} Imc={} Channel={} Slot={}",
            entry.handle.0,
            entry.handle.socket(),
            entry.handle.mem_controller(),
            entry.handle.mem_channel(),
            entry.handle.dimm_number(),
        );
        println!("  PhysicalId=0x{:04x}", entry.physical_id);
        if let Some(uid) = &entry.uid {
            println!("  DimmUid={uid}");
        }
        if let Some(vendor_id) = entry.vendor_id {
            println!("  VendorId=0x{vendor_id:04x}");
        }
        println!("  Capacity={} B", entry.capacity);
        println!("  InterleaveWays={}", entry.interleave_ways);
        if let Some(locator) = &entry.locator {
            println!("  DeviceLocator={locator}");
        }
        if let Some(part_number) = &entry.part_number {
            println!("  PartNumber={part_number}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmem_acpi::nfit::{ControlRegion, NvDimmRegion};

    fn region(handle: u32, physical_id: u16, size: u64, ctrl_index: u16) -> NvDimmRegion {
        NvDimmRegion {
            device_handle: DeviceHandle(handle),
            physical_id,
            region_id: 0,
            spa_range_index: 1,
            control_region_index: ctrl_index,
            region_size: size,
            region_offset: 0,
            physical_address_region_base: 0,
            interleave_index: 1,
            interleave_ways: 2,
            state_flags: 0,
        }
    }

    fn control_region(index: u16, serial: u32) -> ControlRegion {
        ControlRegion {
            control_region_index: index,
            vendor_id: 0x8980,
            device_id: 0x5141,
            revision_id: 2,
            subsystem_vendor_id: 0x8980,
            subsystem_device_id: 0x097A,
            subsystem_revision_id: 0,
            valid_fields: 1,
            manufacturing_location: 0x02,
            manufacturing_date: 0x2132,
            serial_number: serial,
            region_format_interface_code: 0x0301,
            block_control_window_count: 0,
        }
    }

    #[test]
    fn regions_aggregate_per_device_handle() {
        let mut nfit = ParsedNfit::default();
        nfit.regions.push(region(0x0001, 0x1001, 64 << 30, 1));
        nfit.regions.push(region(0x0001, 0x1001, 64 << 30, 1));
        nfit.regions.push(region(0x0101, 0x1002, 128 << 30, 2));
        nfit.control_regions.push(control_region(1, 0x1111));
        nfit.control_regions.push(control_region(2, 0x2222));

        let inventory = build_inventory(&nfit, &[]);
        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory[0].capacity, 128 << 30);
        assert_eq!(inventory[1].capacity, 128 << 30);
        assert_eq!(inventory[0].uid.as_deref(), Some("8089-02-2132-00001111"));
    }

    #[test]
    fn smbios_match_contributes_locator() {
        let mut nfit = ParsedNfit::default();
        nfit.regions.push(region(0x0001, 0x1100, 64 << 30, 1));
        nfit.control_regions.push(control_region(1, 0x1111));

        let devices = [MemoryDevice {
            handle: 0x1100,
            size_mib: Some(65536),
            memory_type: 0x1F,
            device_locator: Some("DIMM_A0".into()),
            bank_locator: None,
            manufacturer: None,
            serial_number: None,
            part_number: Some("PW-128-X".into()),
        }];

        let inventory = build_inventory(&nfit, &devices);
        assert_eq!(inventory[0].locator.as_deref(), Some("DIMM_A0"));
        assert_eq!(inventory[0].part_number.as_deref(), Some("PW-128-X"));
    }

    #[test]
    fn missing_control_region_degrades_to_no_uid() {
        let mut nfit = ParsedNfit::default();
        nfit.regions.push(region(0x0001, 0x1001, 64 << 30, 9));

        let inventory = build_inventory(&nfit, &[]);
        assert_eq!(inventory[0].uid, None);
        assert_eq!(inventory[0].capacity, 64 << 30);
    }
}
