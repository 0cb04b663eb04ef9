//! Platform Memory Topology Table (PMTT) parsing.
//!
//! The PMTT describes the physical memory topology as a tree of aggregator
//! devices: sockets containing memory controllers containing modules. The
//! tree is stored flat: each node is an 8-byte common header followed by a
//! type-specific body, and an enabled node's children follow it directly,
//! counted inside the parent's declared length. The walk is lazy --- nodes
//! are yielded in document order instead of being materialized, since most
//! callers only scan for modules.

use pmem_binparse::FromBytes;

use crate::AcpiError;
use crate::header::TableHeader;

/// PMTT table signature.
pub const PMTT_SIGNATURE: &[u8; 4] = b"PMTT";

/// Offset of the first node: 36-byte header plus 4 reserved bytes.
const NODES_OFFSET: usize = TableHeader::SIZE + 4;

/// Size of the common node header.
const COMMON_HEADER_LEN: usize = 8;

/// Node type 0: socket.
pub const PMTT_SOCKET_TYPE: u8 = 0;
/// Node type 1: memory controller.
pub const PMTT_MEM_CONTROLLER_TYPE: u8 = 1;
/// Node type 2: module (DIMM).
pub const PMTT_MODULE_TYPE: u8 = 2;
/// Node type 0xFF: vendor-specific, skipped by declared length.
pub const PMTT_VENDOR_SPECIFIC_TYPE: u8 = 0xFF;

/// Module flag bit 2: the module is a persistent-memory DCPMM rather than
/// DDR.
const MODULE_PERSISTENT_FLAG: u16 = 1 << 2;

/// A single node of the PMTT topology tree, in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmttNode {
    /// A socket aggregator.
    Socket {
        /// Socket identifier.
        socket_id: u16,
        /// Raw node flags; zero means the socket is disabled and its
        /// subtree was skipped.
        flags: u16,
    },
    /// A memory controller aggregator.
    MemController {
        /// Typical read latency in nanoseconds.
        read_latency: u32,
        /// Typical write latency in nanoseconds.
        write_latency: u32,
        /// Typical read bandwidth in MB/s.
        read_bandwidth: u32,
        /// Typical write bandwidth in MB/s.
        write_bandwidth: u32,
        /// Optimal access unit in bytes.
        optimal_access_unit: u16,
        /// Optimal access alignment in bytes.
        optimal_access_alignment: u16,
        /// Raw node flags; zero means disabled.
        flags: u16,
    },
    /// A memory module (DIMM).
    Module {
        /// SMBIOS physical component identifier.
        physical_component_id: u16,
        /// Size of the module in MiB; zero means the slot is unpopulated.
        size: u32,
        /// SMBIOS handle of the module's Memory Device structure.
        smbios_handle: u32,
        /// Raw node flags.
        flags: u16,
    },
}

impl PmttNode {
    /// Whether this node is enabled (disabled sockets and controllers have
    /// their subtrees skipped by the walk).
    #[must_use]
    pub fn enabled(&self) -> bool {
        match self {
            Self::Socket { flags, .. }
            | Self::MemController { flags, .. }
            | Self::Module { flags, .. } => *flags != 0,
        }
    }

    /// Whether a module node is a persistent-memory DCPMM (flag bit 2).
    /// Always `false` for non-module nodes.
    #[must_use]
    pub fn is_persistent_module(&self) -> bool {
        matches!(self, Self::Module { flags, .. } if flags & MODULE_PERSISTENT_FLAG != 0)
    }
}

/// Parsed Platform Memory Topology Table.
///
/// Borrows the raw table bytes; nodes are decoded on demand by
/// [`Pmtt::nodes`].
pub struct Pmtt<'a> {
    /// The validated ACPI header of the source table.
    pub header: TableHeader,
    body: &'a [u8],
}

impl<'a> Pmtt<'a> {
    /// Parse a PMTT table from raw bytes.
    ///
    /// Only the header is validated here; node-level problems surface as
    /// [`AcpiError::MalformedTable`] items from the [`Pmtt::nodes`]
    /// iterator. The checksum is tolerated (display parsing; callers may
    /// warn via [`crate::is_checksum_valid`]).
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::InvalidSignature`] or
    /// [`AcpiError::TruncatedData`] if the header is unusable.
    pub fn parse(data: &'a [u8]) -> Result<Self, AcpiError> {
        let header = TableHeader::parse(data, PMTT_SIGNATURE)?;
        let total = header.length as usize;

        if total < NODES_OFFSET {
            return Err(AcpiError::TruncatedData);
        }

        Ok(Self {
            header,
            body: &data[NODES_OFFSET..total],
        })
    }

    /// Returns an iterator over the topology nodes in document order.
    ///
    /// Disabled sockets and memory controllers are yielded themselves, but
    /// their subtrees are skipped, mirroring how the BIOS lays them out.
    #[must_use]
    pub fn nodes(&self) -> PmttNodeIter<'a> {
        PmttNodeIter {
            data: self.body,
            offset: 0,
            failed: false,
        }
    }
}

/// Iterator over PMTT topology nodes.
///
/// Yields `Err(MalformedTable)` once and then ends if a node declares a
/// zero length or a length extending past the table end.
pub struct PmttNodeIter<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl Iterator for PmttNodeIter<'_> {
    type Item = Result<PmttNode, AcpiError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        let fail = |iter: &mut Self| {
            iter.failed = true;
            Some(Err(AcpiError::MalformedTable))
        };

        let Some(node_type) = u8::read_at(self.data, self.offset) else {
            return fail(self);
        };
        let Some(length) = u16::read_at(self.data, self.offset + 2) else {
            return fail(self);
        };
        let Some(flags) = u16::read_at(self.data, self.offset + 4) else {
            return fail(self);
        };
        let length = length as usize;

        if length < COMMON_HEADER_LEN || self.offset + length > self.data.len() {
            return fail(self);
        }

        let body = self.offset + COMMON_HEADER_LEN;
        let enabled = flags != 0;

        match node_type {
            PMTT_SOCKET_TYPE => {
                let Some(socket_id) = u16::read_at(self.data, body) else {
                    return fail(self);
                };
                // An enabled socket's controllers follow it directly; a
                // disabled one is skipped wholesale by its length.
                self.offset += if enabled {
                    COMMON_HEADER_LEN + 4
                } else {
                    length
                };
                Some(Ok(PmttNode::Socket { socket_id, flags }))
            }
            PMTT_MEM_CONTROLLER_TYPE => {
                let node = || {
                    Some(PmttNode::MemController {
                        read_latency: u32::read_at(self.data, body)?,
                        write_latency: u32::read_at(self.data, body + 4)?,
                        read_bandwidth: u32::read_at(self.data, body + 8)?,
                        write_bandwidth: u32::read_at(self.data, body + 12)?,
                        optimal_access_unit: u16::read_at(self.data, body + 16)?,
                        optimal_access_alignment: u16::read_at(self.data, body + 18)?,
                        flags,
                    })
                };
                let Some(node) = node() else {
                    return fail(self);
                };
                self.offset += if enabled {
                    COMMON_HEADER_LEN + 24
                } else {
                    length
                };
                Some(Ok(node))
            }
            PMTT_MODULE_TYPE => {
                let node = || {
                    Some(PmttNode::Module {
                        physical_component_id: u16::read_at(self.data, body)?,
                        size: u32::read_at(self.data, body + 4)?,
                        smbios_handle: u32::read_at(self.data, body + 8)?,
                        flags,
                    })
                };
                let Some(node) = node() else {
                    return fail(self);
                };
                self.offset += COMMON_HEADER_LEN + 12;
                Some(Ok(node))
            }
            _ => {
                // Vendor-specific and unknown aggregators are opaque: skip
                // the whole record and keep walking.
                self.offset += length;
                self.next()
            }
        }
    }
}
