//! `pmem-pbr` --- the playback/record (PBR) session container and engine.
//!
//! A PBR session captures every firmware-passthrough transaction and
//! platform-table snapshot a sequence of CLI invocations consumed, into a
//! binary container that can be saved, reloaded, and deterministically
//! replayed without the original hardware. The container is a header with
//! a fixed-capacity partition table plus one growable partition per data
//! category; each partition holds a sequence of length-prefixed,
//! signature-tagged logical data items. A tag log records, once per CLI
//! invocation, the literal argument string and every partition's replay
//! cursor, so replay can restore the exact pre-command state.
//!
//! There is no global context: a [`Session`] is an explicit owned handle
//! threaded through every call, which keeps sessions testable and allows
//! several to coexist. The CLI persists one session per state directory
//! across invocations.
//!
//! # Usage
//!
//! ```ignore
//! let mut session = Session::new();
//! session.set_mode(Mode::Record)?;
//! let tag = session.set_tag(dcpmm::CLI_SIG, "show --dimm", "cli command")?;
//! session.record_table(TableKind::Nfit, &nfit_bytes)?;
//! let image = session.compose();
//! ```

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

pub mod dcpmm;
pub mod format;
pub mod session;
pub mod tag;

pub use dcpmm::{PassThruRequest, PassThruResponse, SmbiosSnapshot, TableKind};
pub use format::{INVALID_TAG_ID, MAX_PARTITIONS, MAX_TAG_NAME, PARTITION_GROW_MULTIPLIER};
pub use session::{Mode, PartitionInfo, ReadIndex, Session};
pub use tag::TagInfo;

use core::fmt;

/// Errors that can occur in the PBR container or session engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PbrError {
    /// Playback was requested but no session buffer is loaded.
    SessionNotReady,
    /// The partition table is full (`MAX_PARTITIONS`).
    OutOfPartitions,
    /// A playback read was requested past the recorded logical-item count
    /// of a partition: the recording and the replay have diverged.
    ReplayDataExhausted,
    /// The loaded image does not carry a PBR header, or a partition entry
    /// points outside the image.
    InvalidImage,
    /// No tag with the requested id exists in the tag log.
    TagNotFound,
    /// A tag name or description exceeds `MAX_TAG_NAME` bytes.
    TagNameTooLong,
    /// A replayed passthrough transaction does not match the recorded
    /// request (opcode/sub-opcode divergence).
    RecordMismatch,
}

impl fmt::Display for PbrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotReady => write!(f, "no session buffer is loaded"),
            Self::OutOfPartitions => {
                write!(f, "partition table is full ({MAX_PARTITIONS} partitions)")
            }
            Self::ReplayDataExhausted => {
                write!(f, "no more recorded data in this partition to replay")
            }
            Self::InvalidImage => write!(f, "buffer is not a valid PBR session image"),
            Self::TagNotFound => write!(f, "no such session tag"),
            Self::TagNameTooLong => {
                write!(f, "tag name or description exceeds {MAX_TAG_NAME} bytes")
            }
            Self::RecordMismatch => {
                write!(f, "replayed transaction does not match the recorded request")
            }
        }
    }
}

impl core::error::Error for PbrError {}
