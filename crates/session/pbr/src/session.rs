//! The session container: mode state plus per-category partitions of
//! framed logical data items.

use alloc::string::String;
use alloc::vec::Vec;

use pmem_binparse::FromBytes;

use crate::PbrError;
use crate::format::{
    self, DESCRIPTION_MAX, HEADER_SIG, HEADER_SIZE, INVALID_SIG, LOGICAL_DATA_SIG,
    LOGICAL_ITEM_HEADER_SIZE, MAX_PARTITIONS, OS_NAME_MAX, OS_VERSION_MAX, PARTITION_ENTRY_SIZE,
    PARTITION_GROW_MULTIPLIER, PARTITION_TABLE_OFFSET, SW_VERSION_MAX,
};

/// Session mode. Every data-consuming call site consults this to decide
/// between doing real work, recording it, or replaying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Live operation, nothing recorded or replayed.
    #[default]
    Normal,
    /// Live operation with every transaction captured into the container.
    Record,
    /// Transactions are served from the container instead of hardware.
    Playback,
}

/// How to address a logical data item within a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadIndex {
    /// Read the item at the partition's replay cursor and advance it
    /// (playback consumption).
    Next,
    /// Random-access read of the item with this logical index; the cursor
    /// does not move.
    At(u32),
}

/// One data partition: a growable buffer of framed logical items.
#[derive(Debug)]
struct Partition {
    signature: u32,
    /// Allocated buffer, slack zero-filled; its length is the partition
    /// size recorded in the image.
    data: Vec<u8>,
    logical_data_count: u32,
    /// Write position while recording, replay cursor during playback.
    current_offset: usize,
}

impl Partition {
    fn item_at_cursor(&self) -> Result<(usize, usize), PbrError> {
        let sig = u32::read_at(&self.data, self.current_offset);
        if sig != Some(LOGICAL_DATA_SIG) {
            return Err(PbrError::ReplayDataExhausted);
        }
        let size = u32::read_at(&self.data, self.current_offset + 4)
            .ok_or(PbrError::ReplayDataExhausted)? as usize;
        let payload = self.current_offset + LOGICAL_ITEM_HEADER_SIZE;
        if payload + size > self.data.len() {
            return Err(PbrError::ReplayDataExhausted);
        }
        Ok((payload, size))
    }
}

/// Summary of one partition, as recorded in the partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionInfo {
    /// The partition's category signature.
    pub signature: u32,
    /// Allocated size in bytes.
    pub size: u32,
    /// Number of logical data items stored.
    pub logical_data_count: u32,
    /// Current replay/record cursor.
    pub current_offset: u32,
}

/// An owned PBR session: mode, header strings, and data partitions.
#[derive(Debug, Default)]
pub struct Session {
    mode: Mode,
    /// Version of the software that recorded the session.
    pub sw_version: String,
    /// Version of the OS the session was recorded on.
    pub os_version: String,
    /// Name of the OS the session was recorded on.
    pub os_name: String,
    /// Free-form description of the session.
    pub description: String,
    partitions: Vec<Partition>,
}

impl Session {
    /// Creates a fresh, empty session container.
    ///
    /// This is the "start a new recording" reset point: any prior content
    /// is for the caller to discard by dropping the old handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Changes the session mode.
    ///
    /// Entering [`Mode::Normal`] discards all partitions. Entering
    /// [`Mode::Playback`] requires a loaded (non-empty) container.
    ///
    /// # Errors
    ///
    /// Returns [`PbrError::SessionNotReady`] if playback is requested with
    /// an empty container.
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), PbrError> {
        match mode {
            Mode::Playback if self.partitions.is_empty() => {
                return Err(PbrError::SessionNotReady);
            }
            Mode::Normal => {
                self.partitions.clear();
            }
            _ => {}
        }
        self.mode = mode;
        Ok(())
    }

    /// Whether any partition holds data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Appends a logical data item to the partition with `signature`,
    /// creating the partition on first use.
    ///
    /// Returns the item's logical index (0-based, monotonic per
    /// partition). The partition's count and cursor only advance after the
    /// item is fully written, so a failed append never corrupts the
    /// container.
    ///
    /// # Errors
    ///
    /// Returns [`PbrError::OutOfPartitions`] when a new partition would
    /// exceed [`MAX_PARTITIONS`].
    pub fn append(&mut self, signature: u32, data: &[u8]) -> Result<u32, PbrError> {
        let needed = LOGICAL_ITEM_HEADER_SIZE + data.len();
        let index = self.find_or_create_partition(signature, needed * PARTITION_GROW_MULTIPLIER)?;
        let partition = &mut self.partitions[index];

        if partition.current_offset + needed > partition.data.len() {
            let grown = partition.data.len() + needed * PARTITION_GROW_MULTIPLIER;
            partition.data.resize(grown, 0);
        }

        let logical_index = partition.logical_data_count;
        write_item_frame(partition, data, logical_index);
        partition.logical_data_count += 1;
        partition.current_offset += needed;
        Ok(logical_index)
    }

    /// Stores `data` as the only item of the partition with `signature`,
    /// replacing any previous content.
    ///
    /// Used for per-session snapshots (ACPI/SMBIOS tables) that are
    /// captured once and read back by index 0.
    ///
    /// # Errors
    ///
    /// Returns [`PbrError::OutOfPartitions`] when a new partition would
    /// exceed [`MAX_PARTITIONS`].
    pub fn append_singleton(&mut self, signature: u32, data: &[u8]) -> Result<(), PbrError> {
        let needed = LOGICAL_ITEM_HEADER_SIZE + data.len();
        let index = self.find_or_create_partition(signature, needed)?;
        let partition = &mut self.partitions[index];

        partition.data.clear();
        partition.data.resize(needed, 0);
        partition.current_offset = 0;
        write_item_frame(partition, data, 0);
        partition.logical_data_count = 1;
        partition.current_offset = needed;
        Ok(())
    }

    /// Reads a logical data item from the partition with `signature`.
    ///
    /// # Errors
    ///
    /// Returns [`PbrError::ReplayDataExhausted`] if the partition does not
    /// exist, the cursor has passed the last recorded item, or the indexed
    /// item does not exist --- all of which mean the recording and the
    /// replay have diverged.
    pub fn read(&mut self, signature: u32, index: ReadIndex) -> Result<Vec<u8>, PbrError> {
        let partition = self
            .partitions
            .iter_mut()
            .find(|p| p.signature == signature)
            .ok_or(PbrError::ReplayDataExhausted)?;

        match index {
            ReadIndex::Next => {
                let (payload, size) = partition.item_at_cursor()?;
                let item = partition.data[payload..payload + size].to_vec();
                partition.current_offset = payload + size;
                Ok(item)
            }
            ReadIndex::At(wanted) => {
                let mut offset = 0usize;
                loop {
                    let sig = u32::read_at(&partition.data, offset);
                    if sig != Some(LOGICAL_DATA_SIG) {
                        return Err(PbrError::ReplayDataExhausted);
                    }
                    let size = u32::read_at(&partition.data, offset + 4)
                        .ok_or(PbrError::ReplayDataExhausted)? as usize;
                    let logical_index = u32::read_at(&partition.data, offset + 8)
                        .ok_or(PbrError::ReplayDataExhausted)?;
                    let payload = offset + LOGICAL_ITEM_HEADER_SIZE;
                    if payload + size > partition.data.len() {
                        return Err(PbrError::ReplayDataExhausted);
                    }
                    if logical_index == wanted {
                        return Ok(partition.data[payload..payload + size].to_vec());
                    }
                    offset = payload + size;
                }
            }
        }
    }

    /// Summary of the partition with `signature`, if it exists.
    #[must_use]
    pub fn partition_info(&self, signature: u32) -> Option<PartitionInfo> {
        self.partitions
            .iter()
            .find(|p| p.signature == signature)
            .map(partition_info)
    }

    /// Summaries of every partition, in table order.
    #[must_use]
    pub fn partition_infos(&self) -> Vec<PartitionInfo> {
        self.partitions.iter().map(partition_info).collect()
    }

    /// Sets the replay cursor of the partition with `signature`. Cursors
    /// of partitions absent from a tag reset to 0; see
    /// [`Session::reset_to_tag`](crate::tag).
    pub(crate) fn set_cursor(&mut self, signature: u32, offset: u32) {
        if let Some(partition) = self.partitions.iter_mut().find(|p| p.signature == signature) {
            partition.current_offset = offset as usize;
        }
    }

    /// Resets every partition's replay cursor to the start.
    pub fn reset_cursors(&mut self) {
        for partition in &mut self.partitions {
            partition.current_offset = 0;
        }
    }

    /// Stitches the session into a single contiguous image: header,
    /// partition table with monotonically packed offsets, then every
    /// partition's buffer.
    #[must_use]
    pub fn compose(&self) -> Vec<u8> {
        let total: usize = HEADER_SIZE + self.partitions.iter().map(|p| p.data.len()).sum::<usize>();
        let mut image = Vec::with_capacity(total);

        image.extend_from_slice(&HEADER_SIG.to_le_bytes());

        let mut offset = HEADER_SIZE;
        for partition in &self.partitions {
            image.extend_from_slice(&partition.signature.to_le_bytes());
            image.extend_from_slice(&(partition.data.len() as u32).to_le_bytes());
            image.extend_from_slice(&(offset as u32).to_le_bytes());
            image.extend_from_slice(&partition.logical_data_count.to_le_bytes());
            offset += partition.data.len();
        }
        // Unused partition-table slots stay zeroed.
        image.resize(PARTITION_TABLE_OFFSET + MAX_PARTITIONS * PARTITION_ENTRY_SIZE, 0);

        format::write_fixed_str(&mut image, &self.sw_version, SW_VERSION_MAX);
        format::write_fixed_str(&mut image, &self.os_version, OS_VERSION_MAX);
        format::write_fixed_str(&mut image, &self.os_name, OS_NAME_MAX);
        format::write_fixed_str(&mut image, &self.description, DESCRIPTION_MAX);
        debug_assert_eq!(image.len(), HEADER_SIZE);

        for partition in &self.partitions {
            image.extend_from_slice(&partition.data);
        }
        image
    }

    /// Decomposes a previously composed image into a session.
    ///
    /// The session comes back in [`Mode::Normal`] with every cursor at 0.
    ///
    /// # Errors
    ///
    /// Returns [`PbrError::InvalidImage`] if the header signature is
    /// missing or a partition entry points outside the image.
    pub fn open(image: &[u8]) -> Result<Self, PbrError> {
        if image.len() < HEADER_SIZE || u32::read_at(image, 0) != Some(HEADER_SIG) {
            return Err(PbrError::InvalidImage);
        }

        let mut session = Session::new();

        for slot in 0..MAX_PARTITIONS {
            let entry = PARTITION_TABLE_OFFSET + slot * PARTITION_ENTRY_SIZE;
            let signature = u32::read_at(image, entry).ok_or(PbrError::InvalidImage)?;
            if signature == INVALID_SIG {
                continue;
            }
            let size = u32::read_at(image, entry + 4).ok_or(PbrError::InvalidImage)? as usize;
            let offset = u32::read_at(image, entry + 8).ok_or(PbrError::InvalidImage)? as usize;
            let logical_data_count =
                u32::read_at(image, entry + 12).ok_or(PbrError::InvalidImage)?;

            let end = offset.checked_add(size).ok_or(PbrError::InvalidImage)?;
            let data = image.get(offset..end).ok_or(PbrError::InvalidImage)?;

            session.partitions.push(Partition {
                signature,
                data: data.to_vec(),
                logical_data_count,
                current_offset: 0,
            });
        }

        let strings = &image[PARTITION_TABLE_OFFSET + MAX_PARTITIONS * PARTITION_ENTRY_SIZE..];
        session.sw_version = format::read_fixed_str(&strings[..SW_VERSION_MAX]);
        let strings = &strings[SW_VERSION_MAX..];
        session.os_version = format::read_fixed_str(&strings[..OS_VERSION_MAX]);
        let strings = &strings[OS_VERSION_MAX..];
        session.os_name = format::read_fixed_str(&strings[..OS_NAME_MAX]);
        let strings = &strings[OS_NAME_MAX..];
        session.description = format::read_fixed_str(&strings[..DESCRIPTION_MAX]);

        Ok(session)
    }

    fn find_or_create_partition(
        &mut self,
        signature: u32,
        initial_size: usize,
    ) -> Result<usize, PbrError> {
        if let Some(index) = self.partitions.iter().position(|p| p.signature == signature) {
            return Ok(index);
        }
        if self.partitions.len() >= MAX_PARTITIONS {
            return Err(PbrError::OutOfPartitions);
        }
        let mut data = Vec::new();
        data.resize(initial_size, 0);
        self.partitions.push(Partition {
            signature,
            data,
            logical_data_count: 0,
            current_offset: 0,
        });
        Ok(self.partitions.len() - 1)
    }
}

fn partition_info(partition: &Partition) -> PartitionInfo {
    PartitionInfo {
        signature: partition.signature,
        size: partition.data.len() as u32,
        logical_data_count: partition.logical_data_count,
        current_offset: partition.current_offset as u32,
    }
}

/// Writes one framed item at the partition's cursor. The caller advances
/// the count and cursor afterwards (all-or-nothing ordering).
fn write_item_frame(partition: &mut Partition, data: &[u8], logical_index: u32) {
    let offset = partition.current_offset;
    partition.data[offset..offset + 4].copy_from_slice(&LOGICAL_DATA_SIG.to_le_bytes());
    partition.data[offset + 4..offset + 8].copy_from_slice(&(data.len() as u32).to_le_bytes());
    partition.data[offset + 8..offset + 12].copy_from_slice(&logical_index.to_le_bytes());
    partition.data[offset + 12..offset + 12 + data.len()].copy_from_slice(data);
}
