//! `pmem-smbios` --- a standalone, `no_std` SMBIOS structure-stream walker.
//!
//! SMBIOS data is a flat stream of structures, each a `{type: u8,
//! length: u8, handle: u16}` header plus a formatted area of `length`
//! bytes, followed by a set of NUL-terminated strings terminated by a
//! double NUL. This crate walks the stream zero-copy from a `&[u8]` and
//! decodes the Memory Device (type 17) structures the DIMM inventory
//! consumes.
//!
//! # Usage
//!
//! ```ignore
//! let smbios = SmbiosTable::parse(&bytes, 3, 2)?;
//! for device in smbios.memory_devices()? {
//!     // ...
//! }
//! ```

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use pmem_binparse::FromBytes;

/// Structure type 17: Memory Device.
pub const MEMORY_DEVICE_TYPE: u8 = 17;
/// Structure type 127: end of table.
pub const END_OF_TABLE_TYPE: u8 = 127;

/// Errors that can occur while walking an SMBIOS stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmbiosError {
    /// A structure header or string-set extended past the end of the
    /// stream, or a header declared a length below the 4-byte minimum.
    Truncated,
}

impl fmt::Display for SmbiosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "SMBIOS structure stream is truncated"),
        }
    }
}

impl core::error::Error for SmbiosError {}

/// A parsed SMBIOS structure table with its entry-point version.
pub struct SmbiosTable<'a> {
    /// SMBIOS specification major version from the entry point.
    pub major_version: u8,
    /// SMBIOS specification minor version from the entry point.
    pub minor_version: u8,
    data: &'a [u8],
}

impl<'a> SmbiosTable<'a> {
    /// Wrap a raw structure stream with its advertised version.
    #[must_use]
    pub fn new(data: &'a [u8], major_version: u8, minor_version: u8) -> Self {
        Self {
            major_version,
            minor_version,
            data,
        }
    }

    /// Returns an iterator over the structures in the stream.
    ///
    /// The iterator ends at the type-127 end-of-table structure or at the
    /// end of the data, and yields `Err(Truncated)` once if a structure
    /// runs past the stream.
    #[must_use]
    pub fn structures(&self) -> StructureIter<'a> {
        StructureIter {
            data: self.data,
            offset: 0,
            done: false,
        }
    }

    /// Decodes every Memory Device (type 17) structure in the stream.
    ///
    /// # Errors
    ///
    /// Returns [`SmbiosError::Truncated`] if the stream is corrupt.
    pub fn memory_devices(&self) -> Result<Vec<MemoryDevice>, SmbiosError> {
        let mut devices = Vec::new();
        for structure in self.structures() {
            let structure = structure?;
            if structure.structure_type == MEMORY_DEVICE_TYPE {
                if let Some(device) = MemoryDevice::decode(&structure) {
                    devices.push(device);
                }
            }
        }
        Ok(devices)
    }

    /// Raw length of the structure stream in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the structure stream is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One SMBIOS structure: header fields, formatted area, and string-set.
#[derive(Debug)]
pub struct SmbiosStructure<'a> {
    /// Structure type discriminator.
    pub structure_type: u8,
    /// Handle other structures use to refer to this one.
    pub handle: u16,
    /// The formatted area, including the 4-byte header.
    pub formatted: &'a [u8],
    /// The raw string-set bytes (without the final terminator).
    strings: &'a [u8],
}

impl SmbiosStructure<'_> {
    /// Look up a string by its 1-based index; index 0 means "no string".
    #[must_use]
    pub fn string(&self, index: u8) -> Option<&str> {
        if index == 0 {
            return None;
        }
        self.strings
            .split(|&b| b == 0)
            .nth(index as usize - 1)
            .filter(|s| !s.is_empty())
            .and_then(|s| core::str::from_utf8(s).ok())
    }

    /// Read a byte from the formatted area.
    #[must_use]
    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        u8::read_at(self.formatted, offset)
    }

    /// Read a little-endian word from the formatted area.
    #[must_use]
    pub fn word_at(&self, offset: usize) -> Option<u16> {
        u16::read_at(self.formatted, offset)
    }

    /// Read a little-endian dword from the formatted area.
    #[must_use]
    pub fn dword_at(&self, offset: usize) -> Option<u32> {
        u32::read_at(self.formatted, offset)
    }
}

/// Iterator over the structures of an SMBIOS stream.
pub struct StructureIter<'a> {
    data: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> Iterator for StructureIter<'a> {
    type Item = Result<SmbiosStructure<'a>, SmbiosError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset + 4 > self.data.len() {
            return None;
        }

        let structure_type = self.data[self.offset];
        let length = self.data[self.offset + 1] as usize;
        let handle = u16::read_at(self.data, self.offset + 2).unwrap_or(0);

        if length < 4 || self.offset + length > self.data.len() {
            self.done = true;
            return Some(Err(SmbiosError::Truncated));
        }

        let formatted = &self.data[self.offset..self.offset + length];

        // The string-set ends at the first double NUL after the formatted
        // area. An empty set is encoded as two NULs directly.
        let strings_start = self.offset + length;
        let mut end = strings_start;
        loop {
            if end + 2 > self.data.len() {
                self.done = true;
                return Some(Err(SmbiosError::Truncated));
            }
            if self.data[end] == 0 && self.data[end + 1] == 0 {
                break;
            }
            end += 1;
        }

        let strings = &self.data[strings_start..end];
        self.offset = end + 2;

        if structure_type == END_OF_TABLE_TYPE {
            self.done = true;
        }

        Some(Ok(SmbiosStructure {
            structure_type,
            handle,
            formatted,
            strings,
        }))
    }
}

/// Special type-17 size value: the real size is in the extended-size field.
const SIZE_IN_EXTENDED_FIELD: u16 = 0x7FFF;

/// Decoded SMBIOS Memory Device (type 17) structure.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    /// Handle of this structure.
    pub handle: u16,
    /// Size of the device in MiB; `None` when no module is installed.
    pub size_mib: Option<u64>,
    /// Memory type code (0x1A = DDR4, 0x18 = DDR3, ...).
    pub memory_type: u8,
    /// Silkscreen locator of the slot.
    pub device_locator: Option<String>,
    /// Bank locator of the slot.
    pub bank_locator: Option<String>,
    /// Module manufacturer string.
    pub manufacturer: Option<String>,
    /// Module serial number string.
    pub serial_number: Option<String>,
    /// Module part number string.
    pub part_number: Option<String>,
}

impl MemoryDevice {
    /// Decode a type-17 structure; `None` if the formatted area is shorter
    /// than the SMBIOS 2.3 baseline fields.
    #[must_use]
    pub fn decode(s: &SmbiosStructure<'_>) -> Option<Self> {
        let raw_size = s.word_at(0x0C)?;

        // Size field: 0 = not installed, 0xFFFF = unknown, bit 15 set =
        // size in KiB, 0x7FFF = use the 32-bit extended size at 0x1C.
        let size_mib = match raw_size {
            0 | 0xFFFF => None,
            SIZE_IN_EXTENDED_FIELD => {
                s.dword_at(0x1C).map(|ext| u64::from(ext & 0x7FFF_FFFF))
            }
            size if size & 0x8000 != 0 => Some(u64::from(size & 0x7FFF) / 1024),
            size => Some(u64::from(size)),
        };

        let owned = |idx: Option<u8>| -> Option<String> {
            idx.and_then(|i| s.string(i)).map(String::from)
        };

        Some(Self {
            handle: s.handle,
            size_mib,
            memory_type: s.byte_at(0x12)?,
            device_locator: owned(s.byte_at(0x10)),
            bank_locator: owned(s.byte_at(0x11)),
            manufacturer: owned(s.byte_at(0x17)),
            serial_number: owned(s.byte_at(0x18)),
            part_number: owned(s.byte_at(0x1A)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    // ---- Stream builder helpers ---------------------------------------------

    /// Emits one structure with the given formatted tail (after the 4-byte
    /// header) and string-set.
    fn emit_structure(v: &mut Vec<u8>, ty: u8, handle: u16, tail: &[u8], strings: &[&str]) {
        v.push(ty);
        v.push((tail.len() + 4) as u8);
        v.extend_from_slice(&handle.to_le_bytes());
        v.extend_from_slice(tail);
        if strings.is_empty() {
            v.extend_from_slice(&[0, 0]);
        } else {
            for s in strings {
                v.extend_from_slice(s.as_bytes());
                v.push(0);
            }
            v.push(0);
        }
    }

    /// A minimal type-17 formatted tail (offsets 4..0x22) with the given
    /// raw size word and string indices.
    fn memory_device_tail(raw_size: u16) -> Vec<u8> {
        let mut tail = vec![0u8; 0x22 - 4];
        tail[0x0C - 4..0x0C - 2].copy_from_slice(&raw_size.to_le_bytes());
        tail[0x10 - 4] = 1; // device locator -> string 1
        tail[0x11 - 4] = 2; // bank locator -> string 2
        tail[0x12 - 4] = 0x1F; // memory type: logical non-volatile
        tail[0x17 - 4] = 3; // manufacturer -> string 3
        tail[0x18 - 4] = 4; // serial -> string 4
        tail[0x1A - 4] = 5; // part number -> string 5
        tail
    }

    fn build_stream() -> Vec<u8> {
        let mut v = Vec::new();
        emit_structure(&mut v, 0, 0x0000, &[0u8; 8], &["VendorBios", "1.2.3"]);
        emit_structure(
            &mut v,
            MEMORY_DEVICE_TYPE,
            0x1100,
            &memory_device_tail(0x4000), // 16384 MiB
            &["DIMM_A0", "NODE 0", "PmemWorks", "SN12345678", "PW-128-X"],
        );
        emit_structure(&mut v, END_OF_TABLE_TYPE, 0xFEFF, &[], &[]);
        v
    }

    // ---- Tests --------------------------------------------------------------

    #[test]
    fn walk_visits_every_structure() {
        let stream = build_stream();
        let table = SmbiosTable::new(&stream, 3, 2);
        let types: Vec<u8> = table
            .structures()
            .map(|s| s.unwrap().structure_type)
            .collect();
        assert_eq!(types, &[0, MEMORY_DEVICE_TYPE, END_OF_TABLE_TYPE]);
    }

    #[test]
    fn string_lookup_is_one_based() {
        let stream = build_stream();
        let table = SmbiosTable::new(&stream, 3, 2);
        let first = table.structures().next().unwrap().unwrap();
        assert_eq!(first.string(1), Some("VendorBios"));
        assert_eq!(first.string(2), Some("1.2.3"));
        assert_eq!(first.string(0), None);
        assert_eq!(first.string(3), None);
    }

    #[test]
    fn memory_device_decode() {
        let stream = build_stream();
        let table = SmbiosTable::new(&stream, 3, 2);
        let devices = table.memory_devices().unwrap();
        assert_eq!(devices.len(), 1);

        let d = &devices[0];
        assert_eq!(d.handle, 0x1100);
        assert_eq!(d.size_mib, Some(16384));
        assert_eq!(d.device_locator.as_deref(), Some("DIMM_A0"));
        assert_eq!(d.manufacturer.as_deref(), Some("PmemWorks"));
        assert_eq!(d.serial_number.as_deref(), Some("SN12345678"));
        assert_eq!(d.part_number.as_deref(), Some("PW-128-X"));
    }

    #[test]
    fn empty_slot_has_no_size() {
        let mut v = Vec::new();
        emit_structure(
            &mut v,
            MEMORY_DEVICE_TYPE,
            0x1101,
            &memory_device_tail(0),
            &["DIMM_B0", "NODE 0"],
        );
        let table = SmbiosTable::new(&v, 3, 2);
        let devices = table.memory_devices().unwrap();
        assert_eq!(devices[0].size_mib, None);
    }

    #[test]
    fn extended_size_field() {
        let mut tail = memory_device_tail(SIZE_IN_EXTENDED_FIELD);
        tail[0x1C - 4..0x20 - 4].copy_from_slice(&262_144u32.to_le_bytes()); // 256 GiB
        let mut v = Vec::new();
        emit_structure(&mut v, MEMORY_DEVICE_TYPE, 0x1102, &tail, &["DIMM_C0"]);
        let table = SmbiosTable::new(&v, 3, 2);
        let devices = table.memory_devices().unwrap();
        assert_eq!(devices[0].size_mib, Some(262_144));
    }

    #[test]
    fn truncated_structure_is_reported() {
        let mut stream = build_stream();
        // Drop the final terminator byte: the last structure's string-set
        // never reaches its double NUL.
        stream.truncate(stream.len() - 1);
        let table = SmbiosTable::new(&stream, 3, 2);
        let last = table.structures().last().unwrap();
        assert_eq!(last.unwrap_err(), SmbiosError::Truncated);
    }

    #[test]
    fn walk_stops_at_end_of_table_marker() {
        let mut stream = build_stream();
        // Garbage after the type-127 structure must not be walked.
        stream.extend_from_slice(&[0xAA; 16]);
        let table = SmbiosTable::new(&stream, 3, 2);
        assert_eq!(table.structures().count(), 3);
    }
}
