//! Platform Configuration Attribute Table (PCAT) parsing.
//!
//! The PCAT describes the memory configurations the platform BIOS is able
//! to apply: capability bits, supported interleave formats, the runtime
//! validation interface, and per-socket SKU limits. Unlike the NFIT walk,
//! an unknown sub-table discriminator aborts the parse: PCAT contents drive
//! configuration application, so records must never be silently skipped.

use alloc::vec::Vec;

use pmem_binparse::FromBytes;

use crate::AcpiError;
use crate::header::TableHeader;
use crate::nfit::read_sub_table;

/// PCAT table signature.
pub const PCAT_SIGNATURE: &[u8; 4] = b"PCAT";

/// Offset of the first sub-table: 36-byte header plus 4 reserved bytes.
const SUBTABLES_OFFSET: usize = TableHeader::SIZE + 4;

/// Sub-table type 0: platform capability information.
pub const PCAT_PLATFORM_CAPABILITY_INFO_TYPE: u16 = 0;
/// Sub-table type 1: memory interleave capability information.
pub const PCAT_INTERLEAVE_CAPABILITY_INFO_TYPE: u16 = 1;
/// Sub-table type 2: runtime configuration-input validation interface.
pub const PCAT_RUNTIME_INTERFACE_TYPE: u16 = 2;
/// Sub-table type 3: configuration management attributes extension.
pub const PCAT_CONFIG_MANAGEMENT_ATTRIBUTES_TYPE: u16 = 3;
/// Sub-table type 6: socket SKU information.
pub const PCAT_SOCKET_SKU_INFO_TYPE: u16 = 6;

/// Type 0: platform capability information.
#[derive(Debug, Clone)]
pub struct PlatformCapabilityInfo {
    /// Bit 0: BIOS allows configuration change through management software.
    pub mgmt_sw_config_input_support: u8,
    /// Supported memory mode bits (see accessors).
    pub memory_mode_capabilities: u8,
    /// Memory mode selected in BIOS setup (see accessors).
    pub current_memory_mode: u8,
    /// Persistent memory RAS capability bits.
    pub persistent_memory_ras_capability: u8,
}

impl PlatformCapabilityInfo {
    /// BIOS supports 1LM mode.
    #[must_use]
    pub fn supports_1lm(&self) -> bool {
        self.memory_mode_capabilities & 0x01 != 0
    }

    /// BIOS supports 2LM (memory) mode.
    #[must_use]
    pub fn supports_2lm(&self) -> bool {
        self.memory_mode_capabilities & 0x02 != 0
    }

    /// BIOS supports App Direct persistent mode.
    #[must_use]
    pub fn supports_app_direct(&self) -> bool {
        self.memory_mode_capabilities & 0x04 != 0
    }

    /// Current volatile memory mode (bits 0..2 of the current-mode byte).
    #[must_use]
    pub fn current_volatile_mode(&self) -> u8 {
        self.current_memory_mode & 0x03
    }

    /// Allowed persistent memory mode (bits 2..4).
    #[must_use]
    pub fn persistent_mode(&self) -> u8 {
        (self.current_memory_mode >> 2) & 0x03
    }

    /// Allowed volatile memory mode (bits 4..6).
    #[must_use]
    pub fn allowed_volatile_mode(&self) -> u8 {
        (self.current_memory_mode >> 4) & 0x03
    }
}

/// One entry of the interleave format list carried by
/// [`MemoryInterleaveCapabilityInfo`].
///
/// Accessors mask the packed `u32` explicitly instead of relying on a
/// bitfield layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterleaveFormat(pub u32);

impl InterleaveFormat {
    /// Channel interleave size selector (bits 0..8).
    #[must_use]
    pub fn channel_interleave_size(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Memory-controller interleave size selector (bits 8..16).
    #[must_use]
    pub fn imc_interleave_size(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Number of channel ways (bits 16..25).
    #[must_use]
    pub fn channel_ways(self) -> u16 {
        ((self.0 >> 16) & 0x1FF) as u16
    }

    /// Whether the BIOS recommends this format (bit 31).
    #[must_use]
    pub fn recommended(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }
}

/// Type 1: memory interleave capability information.
#[derive(Debug, Clone)]
pub struct MemoryInterleaveCapabilityInfo {
    /// Memory mode these formats apply to (0 = 1LM, 1 = 2LM, 3 = App
    /// Direct, 4 = App Direct cached).
    pub memory_mode: u8,
    /// Interleave alignment size as a power of two (2^n bytes).
    pub interleave_alignment_size: u16,
    /// BIOS-supported interleave formats for this mode.
    pub formats: Vec<InterleaveFormat>,
}

/// Type 2: runtime configuration-input validation interface.
///
/// Describes the trigger register the OS writes to ask the BIOS to
/// validate a new configuration input, and the status location to poll.
#[derive(Debug, Clone)]
pub struct RuntimeInterfaceValidation {
    /// Address space of the trigger register (1 = system I/O).
    pub address_space_id: u8,
    /// Size of the trigger register in bits.
    pub bit_width: u8,
    /// Bit offset of the trigger register at the address.
    pub bit_offset: u8,
    /// Access size of the trigger register (1 = byte .. 4 = qword).
    pub access_size: u8,
    /// Trigger register address in the given address space.
    pub address: u64,
    /// Trigger operation (0 = read, 1 = write).
    pub trigger_operation_type: u8,
    /// Value to write when the trigger operation is a write.
    pub trigger_value: u64,
    /// Bits to preserve on the trigger write.
    pub trigger_mask: u64,
    /// Raw GAS structure for the status location.
    pub status_gas: [u8; 12],
    /// Status operation (3 = read memory).
    pub status_operation_type: u8,
    /// Mask applied to the status read.
    pub status_mask: u64,
}

/// Type 3: configuration management attributes extension.
#[derive(Debug, Clone)]
pub struct ConfigManagementAttributes {
    /// Vendor that defines the GUID data format.
    pub vendor_id: u16,
    /// Format GUID of the attached data.
    pub guid: [u8; 16],
    /// Vendor-specific data.
    pub guid_data: Vec<u8>,
}

/// Type 6: socket SKU information.
#[derive(Debug, Clone)]
pub struct SocketSkuInfo {
    /// Socket the limits apply to.
    pub socket_id: u16,
    /// Die within the socket.
    pub die_id: u16,
    /// Total bytes the CPU SKU allows to be mapped into the SPA.
    pub mapped_memory_size_limit: u64,
    /// Total bytes currently mapped into the SPA.
    pub total_memory_size_mapped: u64,
    /// Bytes used as near-memory cache.
    pub caching_memory_size: u64,
}

/// Owned, typed decomposition of a PCAT table.
#[derive(Debug, Default)]
pub struct ParsedPcat {
    /// The validated ACPI header of the source table.
    pub header: Option<TableHeader>,
    /// Type 0 sub-tables.
    pub capabilities: Vec<PlatformCapabilityInfo>,
    /// Type 1 sub-tables.
    pub interleave_capabilities: Vec<MemoryInterleaveCapabilityInfo>,
    /// Type 2 sub-tables.
    pub runtime_interfaces: Vec<RuntimeInterfaceValidation>,
    /// Type 3 sub-tables.
    pub management_attributes: Vec<ConfigManagementAttributes>,
    /// Type 6 sub-tables.
    pub socket_skus: Vec<SocketSkuInfo>,
}

/// Parse a PCAT table from raw bytes.
///
/// The checksum is tolerated like the NFIT's (display callers may warn via
/// [`crate::is_checksum_valid`]), but unknown record types are not.
///
/// # Errors
///
/// Returns [`AcpiError::InvalidSignature`] / [`AcpiError::TruncatedData`]
/// for a bad header, [`AcpiError::MalformedTable`] for a corrupt sub-table
/// length, and [`AcpiError::UnrecognizedPcatType`] if the chain contains a
/// discriminator outside {0, 1, 2, 3, 6}.
pub fn parse_pcat(data: &[u8]) -> Result<ParsedPcat, AcpiError> {
    let header = TableHeader::parse(data, PCAT_SIGNATURE)?;
    let total = header.length as usize;

    if total < SUBTABLES_OFFSET {
        return Err(AcpiError::TruncatedData);
    }

    let mut parsed = ParsedPcat {
        header: Some(header),
        ..ParsedPcat::default()
    };

    let mut offset = SUBTABLES_OFFSET;
    while offset < total {
        let (ty, length) = read_sub_table(data, offset, total)?;
        let sub = &data[offset..offset + length];

        match ty {
            PCAT_PLATFORM_CAPABILITY_INFO_TYPE => {
                parsed.capabilities.push(decode_capability_info(sub)?);
            }
            PCAT_INTERLEAVE_CAPABILITY_INFO_TYPE => {
                parsed.interleave_capabilities.push(decode_interleave_capability(sub)?);
            }
            PCAT_RUNTIME_INTERFACE_TYPE => {
                parsed.runtime_interfaces.push(decode_runtime_interface(sub)?);
            }
            PCAT_CONFIG_MANAGEMENT_ATTRIBUTES_TYPE => {
                parsed.management_attributes.push(decode_management_attributes(sub)?);
            }
            PCAT_SOCKET_SKU_INFO_TYPE => {
                parsed.socket_skus.push(decode_socket_sku(sub)?);
            }
            other => return Err(AcpiError::UnrecognizedPcatType(other)),
        }

        offset += length;
    }

    Ok(parsed)
}

fn decode_capability_info(sub: &[u8]) -> Result<PlatformCapabilityInfo, AcpiError> {
    let read = || {
        Some(PlatformCapabilityInfo {
            mgmt_sw_config_input_support: u8::read_at(sub, 4)?,
            memory_mode_capabilities: u8::read_at(sub, 5)?,
            current_memory_mode: u8::read_at(sub, 6)?,
            persistent_memory_ras_capability: u8::read_at(sub, 7)?,
        })
    };
    read().ok_or(AcpiError::MalformedTable)
}

fn decode_interleave_capability(sub: &[u8]) -> Result<MemoryInterleaveCapabilityInfo, AcpiError> {
    let memory_mode = u8::read_at(sub, 4).ok_or(AcpiError::MalformedTable)?;
    let interleave_alignment_size = u16::read_at(sub, 8).ok_or(AcpiError::MalformedTable)?;
    let format_count = u16::read_at(sub, 10).ok_or(AcpiError::MalformedTable)? as usize;

    let mut formats = Vec::with_capacity(format_count);
    for i in 0..format_count {
        let raw = u32::read_at(sub, 12 + i * 4).ok_or(AcpiError::MalformedTable)?;
        formats.push(InterleaveFormat(raw));
    }

    Ok(MemoryInterleaveCapabilityInfo {
        memory_mode,
        interleave_alignment_size,
        formats,
    })
}

fn decode_runtime_interface(sub: &[u8]) -> Result<RuntimeInterfaceValidation, AcpiError> {
    let read = || {
        Some(RuntimeInterfaceValidation {
            address_space_id: u8::read_at(sub, 4)?,
            bit_width: u8::read_at(sub, 5)?,
            bit_offset: u8::read_at(sub, 6)?,
            access_size: u8::read_at(sub, 7)?,
            address: u64::read_at(sub, 8)?,
            trigger_operation_type: u8::read_at(sub, 16)?,
            trigger_value: u64::read_at(sub, 24)?,
            trigger_mask: u64::read_at(sub, 32)?,
            status_gas: <[u8; 12]>::read_at(sub, 40)?,
            status_operation_type: u8::read_at(sub, 52)?,
            status_mask: u64::read_at(sub, 56)?,
        })
    };
    read().ok_or(AcpiError::MalformedTable)
}

fn decode_management_attributes(sub: &[u8]) -> Result<ConfigManagementAttributes, AcpiError> {
    let vendor_id = u16::read_at(sub, 6).ok_or(AcpiError::MalformedTable)?;
    let guid = <[u8; 16]>::read_at(sub, 8).ok_or(AcpiError::MalformedTable)?;
    let guid_data = sub.get(24..).ok_or(AcpiError::MalformedTable)?;

    Ok(ConfigManagementAttributes {
        vendor_id,
        guid,
        guid_data: guid_data.into(),
    })
}

fn decode_socket_sku(sub: &[u8]) -> Result<SocketSkuInfo, AcpiError> {
    let read = || {
        Some(SocketSkuInfo {
            socket_id: u16::read_at(sub, 4)?,
            die_id: u16::read_at(sub, 6)?,
            mapped_memory_size_limit: u64::read_at(sub, 8)?,
            total_memory_size_mapped: u64::read_at(sub, 16)?,
            caching_memory_size: u64::read_at(sub, 24)?,
        })
    };
    read().ok_or(AcpiError::MalformedTable)
}
