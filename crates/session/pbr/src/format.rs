//! On-disk layout of the PBR session image.
//!
//! The format is bit-exact with existing recorded session files:
//!
//! ```text
//! PbrHeader {
//!     signature: u32 = 'PBRH',
//!     partition_table: [PartitionEntry; 100],   // 16 bytes each
//!     sw_version:  [u8; 25],                    // ASCII, NUL-padded
//!     os_version:  [u8; 100],
//!     os_name:     [u8; 100],
//!     description: [u8; 1024],
//! }
//! PartitionEntry { signature, size, offset, logical_data_count: u32 }
//! LogicalDataItem { signature: u32 = 'PBLD', size, logical_index: u32, data[size] }
//! Tag { signature: u32 = 'PBTI', tag_signature, tag_id, tag_size,
//!       partition_info_count: u32 }
//!     followed by count x { partition_signature, partition_offset: u32 }
//!     followed by NUL-terminated name and description strings
//! ```

use alloc::string::String;
use alloc::vec::Vec;

/// Builds a partition/item signature from its 4-byte ASCII tag.
#[must_use]
pub const fn sig(tag: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*tag)
}

/// Main header signature (`PBRH`).
pub const HEADER_SIG: u32 = sig(b"PBRH");
/// Logical data item signature (`PBLD`).
pub const LOGICAL_DATA_SIG: u32 = sig(b"PBLD");
/// Tag record signature (`PBTI`); also the tag partition's signature.
pub const TAG_SIG: u32 = sig(b"PBTI");
/// An empty partition-table slot.
pub const INVALID_SIG: u32 = 0;

/// Capacity of the partition table.
pub const MAX_PARTITIONS: usize = 100;
/// Maximum length of a tag name or description, terminator included.
pub const MAX_TAG_NAME: usize = 256;
/// Sentinel for "no tag selected".
pub const INVALID_TAG_ID: u32 = 0xFFFF_FFFF;
/// Over-allocation factor applied when a partition grows, amortizing
/// reallocation across many appends.
pub const PARTITION_GROW_MULTIPLIER: usize = 10;

/// Fixed width of the recording software version string.
pub const SW_VERSION_MAX: usize = 25;
/// Fixed width of the recording OS version string.
pub const OS_VERSION_MAX: usize = 100;
/// Fixed width of the recording OS name string.
pub const OS_NAME_MAX: usize = 100;
/// Fixed width of the session description string.
pub const DESCRIPTION_MAX: usize = 1024;

/// Size of one partition-table entry.
pub const PARTITION_ENTRY_SIZE: usize = 16;
/// Offset of the partition table within the header.
pub const PARTITION_TABLE_OFFSET: usize = 4;
/// Total size of the main header.
pub const HEADER_SIZE: usize = PARTITION_TABLE_OFFSET
    + MAX_PARTITIONS * PARTITION_ENTRY_SIZE
    + SW_VERSION_MAX
    + OS_VERSION_MAX
    + OS_NAME_MAX
    + DESCRIPTION_MAX;

/// Size of a logical data item's frame before its payload.
pub const LOGICAL_ITEM_HEADER_SIZE: usize = 12;
/// Size of a tag record before its partition-info list.
pub const TAG_HEADER_SIZE: usize = 20;
/// Size of one tag partition-info entry.
pub const TAG_PARTITION_INFO_SIZE: usize = 8;

/// Appends `s` as a NUL-padded fixed-width ASCII field, truncating to
/// `width - 1` bytes so the field always terminates.
pub fn write_fixed_str(out: &mut Vec<u8>, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let take = bytes.len().min(width - 1);
    out.extend_from_slice(&bytes[..take]);
    out.resize(out.len() + width - take, 0);
}

/// Reads a NUL-padded fixed-width field back into a string.
#[must_use]
pub fn read_fixed_str(field: &[u8]) -> String {
    field
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect()
}
