//! The tag log: one checkpoint per recorded CLI invocation.
//!
//! A tag captures the literal CLI argument string that produced it and
//! every partition's replay cursor at the moment the command started, i.e.
//! before any of the command's data landed. Resetting the session to a tag
//! restores those cursors, so reading forward replays exactly what the
//! command originally consumed. Tag ids equal insertion order; replay must
//! proceed in strictly increasing id order, since each tag's offsets
//! assume all earlier tags already replayed.

use alloc::string::String;
use alloc::vec::Vec;

use pmem_binparse::FromBytes;

use crate::PbrError;
use crate::format::{
    MAX_TAG_NAME, TAG_HEADER_SIZE, TAG_PARTITION_INFO_SIZE, TAG_SIG, read_fixed_str,
};
use crate::session::{Mode, ReadIndex, Session};

/// A decoded tag record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    /// Category signature of the tag (e.g. the CLI-invocation signature).
    pub signature: u32,
    /// Unique, monotonically assigned tag id.
    pub id: u32,
    /// The literal CLI argument string that produced the tag.
    pub name: String,
    /// Human-readable description of the tag.
    pub description: String,
    /// Every partition's `(signature, cursor)` at the moment the tag was
    /// set.
    pub partitions: Vec<(u32, u32)>,
}

impl Session {
    /// Appends a tag capturing the current cursors of every partition.
    ///
    /// Outside [`Mode::Record`] this is a no-op returning `None`, so call
    /// sites do not need to check the mode themselves.
    ///
    /// # Errors
    ///
    /// Returns [`PbrError::TagNameTooLong`] if `name` or `description`
    /// exceeds the fixed wire budget, or [`PbrError::OutOfPartitions`] if
    /// the tag partition cannot be created.
    pub fn set_tag(
        &mut self,
        signature: u32,
        name: &str,
        description: &str,
    ) -> Result<Option<u32>, PbrError> {
        if self.mode() != Mode::Record {
            return Ok(None);
        }
        if name.len() + 1 > MAX_TAG_NAME || description.len() + 1 > MAX_TAG_NAME {
            return Err(PbrError::TagNameTooLong);
        }

        // Cursor snapshot first: the tag must record the pre-command state
        // of every data partition.
        let partitions = self.partition_infos();
        let tag_size = TAG_HEADER_SIZE
            + partitions.len() * TAG_PARTITION_INFO_SIZE
            + name.len()
            + 1
            + description.len()
            + 1;

        // The tag id is the logical index the item will receive.
        let id = self
            .partition_info(TAG_SIG)
            .map_or(0, |p| p.logical_data_count);

        let mut tag = Vec::with_capacity(tag_size);
        tag.extend_from_slice(&TAG_SIG.to_le_bytes());
        tag.extend_from_slice(&signature.to_le_bytes());
        tag.extend_from_slice(&id.to_le_bytes());
        tag.extend_from_slice(&(tag_size as u32).to_le_bytes());
        tag.extend_from_slice(&(partitions.len() as u32).to_le_bytes());
        for info in &partitions {
            tag.extend_from_slice(&info.signature.to_le_bytes());
            tag.extend_from_slice(&info.current_offset.to_le_bytes());
        }
        tag.extend_from_slice(name.as_bytes());
        tag.push(0);
        tag.extend_from_slice(description.as_bytes());
        tag.push(0);

        let assigned = self.append(TAG_SIG, &tag)?;
        debug_assert_eq!(assigned, id);
        Ok(Some(assigned))
    }

    /// Number of tags in the tag log.
    #[must_use]
    pub fn tag_count(&self) -> u32 {
        self.partition_info(TAG_SIG)
            .map_or(0, |p| p.logical_data_count)
    }

    /// Fetches and decodes the tag with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`PbrError::TagNotFound`] if no such tag exists or its
    /// record is corrupt.
    pub fn get_tag(&mut self, id: u32) -> Result<TagInfo, PbrError> {
        let raw = self
            .read(TAG_SIG, ReadIndex::At(id))
            .map_err(|_| PbrError::TagNotFound)?;
        decode_tag(&raw).ok_or(PbrError::TagNotFound)
    }

    /// Restores every partition's replay cursor from the tag with `id`.
    ///
    /// Partitions that did not exist when the tag was set reset to 0, so a
    /// subsequent replay begins exactly where the recorded command did.
    ///
    /// # Errors
    ///
    /// Returns [`PbrError::TagNotFound`] if no such tag exists.
    pub fn reset_to_tag(&mut self, id: u32) -> Result<(), PbrError> {
        let tag = self.get_tag(id)?;
        self.reset_cursors();
        for (signature, offset) in tag.partitions {
            self.set_cursor(signature, offset);
        }
        Ok(())
    }
}

fn decode_tag(raw: &[u8]) -> Option<TagInfo> {
    if u32::read_at(raw, 0)? != TAG_SIG {
        return None;
    }
    let signature = u32::read_at(raw, 4)?;
    let id = u32::read_at(raw, 8)?;
    let partition_count = u32::read_at(raw, 16)? as usize;

    let mut partitions = Vec::with_capacity(partition_count);
    for i in 0..partition_count {
        let entry = TAG_HEADER_SIZE + i * TAG_PARTITION_INFO_SIZE;
        partitions.push((u32::read_at(raw, entry)?, u32::read_at(raw, entry + 4)?));
    }

    let strings = raw.get(TAG_HEADER_SIZE + partition_count * TAG_PARTITION_INFO_SIZE..)?;
    let name = read_fixed_str(strings);
    let strings = strings.get(name.len() + 1..)?;
    let description = read_fixed_str(strings);

    Some(TagInfo {
        signature,
        id,
        name,
        description,
        partitions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::sig;
    use alloc::string::ToString;
    use alloc::vec;

    const CLI_SIG: u32 = sig(b"TCLI");
    const DATA_SIG: u32 = sig(b"TSTD");
    const AUX_SIG: u32 = sig(b"TAUX");

    fn recording_session() -> Session {
        let mut s = Session::new();
        // A session buffer exists once any partition does; seed the tag
        // partition by entering record mode and letting set_tag create it.
        s.set_mode(Mode::Record).unwrap();
        s
    }

    #[test]
    fn set_tag_outside_record_mode_is_a_no_op() {
        let mut s = Session::new();
        assert_eq!(s.set_tag(CLI_SIG, "show --dimm", "cli").unwrap(), None);
        assert_eq!(s.tag_count(), 0);
    }

    #[test]
    fn tag_ids_are_monotonic_insertion_order() {
        let mut s = recording_session();
        for i in 0..4u32 {
            let id = s.set_tag(CLI_SIG, "show --dimm", "cli").unwrap().unwrap();
            assert_eq!(id, i);
        }
        assert_eq!(s.tag_count(), 4);
    }

    #[test]
    fn get_tag_returns_the_recorded_name() {
        let mut s = recording_session();
        s.set_tag(CLI_SIG, "show --dimm", "cli command").unwrap();
        let tag = s.get_tag(0).unwrap();
        assert_eq!(tag.name, "show --dimm");
        assert_eq!(tag.description, "cli command");
        assert_eq!(tag.signature, CLI_SIG);
        assert_eq!(tag.id, 0);
    }

    #[test]
    fn missing_tag_is_not_found() {
        let mut s = recording_session();
        s.set_tag(CLI_SIG, "show --dimm", "cli").unwrap();
        assert_eq!(s.get_tag(7), Err(PbrError::TagNotFound));
    }

    #[test]
    fn overlong_name_is_rejected() {
        let mut s = recording_session();
        let long = "x".repeat(MAX_TAG_NAME);
        assert_eq!(
            s.set_tag(CLI_SIG, &long, "cli"),
            Err(PbrError::TagNameTooLong)
        );
    }

    #[test]
    fn tag_captures_pre_command_cursors() {
        let mut s = recording_session();
        s.append(DATA_SIG, b"cmd0-data").unwrap();

        let data_cursor = s.partition_info(DATA_SIG).unwrap().current_offset;
        s.set_tag(CLI_SIG, "show --dimm", "cli").unwrap();

        let tag = s.get_tag(0).unwrap();
        let recorded = tag
            .partitions
            .iter()
            .find(|(signature, _)| *signature == DATA_SIG)
            .unwrap();
        assert_eq!(recorded.1, data_cursor);
    }

    #[test]
    fn reset_replays_each_command_byte_identically() {
        // Record three commands, each appending distinct data to two
        // partitions, with a tag before each.
        let mut s = recording_session();
        let payloads: Vec<(Vec<u8>, Vec<u8>)> = (0..3u8)
            .map(|i| (vec![i; 16], vec![i ^ 0xFF; 8]))
            .collect();

        for (main, aux) in &payloads {
            s.set_tag(CLI_SIG, "cmd", "cli").unwrap();
            s.append(DATA_SIG, main).unwrap();
            s.append(AUX_SIG, aux).unwrap();
        }

        // Resetting to any tag must reproduce that command's recorded
        // data, byte for byte, from every partition.
        for (tag_id, (main, aux)) in payloads.iter().enumerate() {
            s.reset_to_tag(tag_id as u32).unwrap();
            assert_eq!(&s.read(DATA_SIG, ReadIndex::Next).unwrap(), main);
            assert_eq!(&s.read(AUX_SIG, ReadIndex::Next).unwrap(), aux);
        }

        // And replaying tags in order after a reset walks the whole log.
        s.reset_to_tag(0).unwrap();
        for (main, _) in &payloads {
            assert_eq!(&s.read(DATA_SIG, ReadIndex::Next).unwrap(), main);
        }
    }

    #[test]
    fn reset_survives_compose_open() {
        let mut s = recording_session();
        s.set_tag(CLI_SIG, "show --dimm", "cli").unwrap();
        s.append(DATA_SIG, b"recorded-bytes").unwrap();
        s.set_tag(CLI_SIG, "show --acpi nfit", "cli").unwrap();
        s.append(DATA_SIG, b"second-cmd").unwrap();

        let image = s.compose();
        let mut reopened = Session::open(&image).unwrap();
        assert_eq!(reopened.tag_count(), 2);
        assert_eq!(reopened.get_tag(1).unwrap().name, "show --acpi nfit");

        reopened.reset_to_tag(1).unwrap();
        assert_eq!(
            reopened.read(DATA_SIG, ReadIndex::Next).unwrap(),
            b"second-cmd".to_vec()
        );
    }

    #[test]
    fn tag_name_string_is_the_cli_argument_line() {
        // The recorded name is what an automated playback driver feeds
        // back into the command parser, verbatim.
        let mut s = recording_session();
        s.set_tag(CLI_SIG, "show --session", "cli").unwrap();
        assert_eq!(s.get_tag(0).unwrap().name, "show --session".to_string());
    }
}
