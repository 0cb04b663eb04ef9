//! DCPMM-specific record layer on top of the generic container.
//!
//! Maps each data category to its partition signature and frames the two
//! record kinds the DIMM stack produces: platform-table snapshots
//! (captured once per session) and firmware-passthrough transactions
//! (one logical item per call, request and response framed together).

use alloc::vec::Vec;

use pmem_binparse::FromBytes;

use crate::PbrError;
use crate::format::sig;
use crate::session::{Mode, ReadIndex, Session};

/// Partition signature for CLI invocation tags (`PBDC`).
pub const CLI_SIG: u32 = sig(b"PBDC");
/// Partition signature for passthrough transactions (`PBCL`).
pub const PASS_THRU_SIG: u32 = sig(b"PBCL");
/// Partition signature for driver initialization markers (`PBDI`).
pub const DRIVER_INIT_SIG: u32 = sig(b"PBDI");
/// Partition signature for the SMBIOS snapshot (`PBSM`).
pub const SMBIOS_SIG: u32 = sig(b"PBSM");
/// Partition signature for the NFIT snapshot (`PBNF`).
pub const NFIT_SIG: u32 = sig(b"PBNF");
/// Partition signature for the PCAT snapshot (`PBPC`).
pub const PCAT_SIG: u32 = sig(b"PBPC");
/// Partition signature for the PMTT snapshot (`PBPM`).
pub const PMTT_SIG: u32 = sig(b"PBPM");

/// Tag name marking a driver (re)initialization boundary. A session replay
/// cannot execute this automatically and halts for manual action.
pub const DRIVER_INIT_TAG_NAME: &str = "driver init";

/// The ACPI table snapshot categories a session records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// The SMBIOS structure stream (wrapped in [`SmbiosSnapshot`]).
    Smbios,
    /// The ACPI NFIT table.
    Nfit,
    /// The ACPI PCAT table.
    Pcat,
    /// The ACPI PMTT table.
    Pmtt,
}

impl TableKind {
    /// The partition signature this table kind is stored under.
    #[must_use]
    pub fn signature(self) -> u32 {
        match self {
            Self::Smbios => SMBIOS_SIG,
            Self::Nfit => NFIT_SIG,
            Self::Pcat => PCAT_SIG,
            Self::Pmtt => PMTT_SIG,
        }
    }

    /// Display name of the table kind.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Smbios => "SMBIOS",
            Self::Nfit => "NFIT",
            Self::Pcat => "PCAT",
            Self::Pmtt => "PMTT",
        }
    }
}

/// A recorded SMBIOS stream with its entry-point version.
///
/// Wire layout: `{size: u32, minor: u8, major: u8, table[size]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbiosSnapshot {
    /// SMBIOS major version.
    pub major: u8,
    /// SMBIOS minor version.
    pub minor: u8,
    /// The raw structure stream.
    pub data: Vec<u8>,
}

impl SmbiosSnapshot {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + self.data.len());
        out.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        out.push(self.minor);
        out.push(self.major);
        out.extend_from_slice(&self.data);
        out
    }

    fn decode(raw: &[u8]) -> Option<Self> {
        let size = u32::read_at(raw, 0)? as usize;
        let minor = u8::read_at(raw, 4)?;
        let major = u8::read_at(raw, 5)?;
        let data = raw.get(6..6 + size)?;
        Some(Self {
            major,
            minor,
            data: data.to_vec(),
        })
    }
}

/// A firmware-passthrough request as issued to the transport.
///
/// Wire layout: `{duration_ms: u64, dimm_id: u32, opcode: u8,
/// sub_opcode: u8, input_size: u32, large_input_size: u32, input[],
/// large_input[]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassThruRequest {
    /// Wall-clock duration of the transport call in milliseconds.
    pub duration_ms: u64,
    /// Target DIMM id.
    pub dimm_id: u32,
    /// Firmware opcode.
    pub opcode: u8,
    /// Firmware sub-opcode.
    pub sub_opcode: u8,
    /// Small input payload.
    pub input: Vec<u8>,
    /// Large input payload.
    pub large_input: Vec<u8>,
}

/// A firmware-passthrough response as returned by the transport.
///
/// Wire layout: `{duration_ms: u64, return_code: u64, dimm_id: u32,
/// output_size: u32, large_output_size: u32, status: u8, output[],
/// large_output[]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassThruResponse {
    /// Wall-clock duration of the transport call in milliseconds.
    pub duration_ms: u64,
    /// Return code of the transport layer; replayed verbatim, including
    /// failures.
    pub return_code: u64,
    /// Target DIMM id.
    pub dimm_id: u32,
    /// Firmware status code.
    pub status: u8,
    /// Small output payload.
    pub output: Vec<u8>,
    /// Large output payload.
    pub large_output: Vec<u8>,
}

const REQUEST_HEADER_SIZE: usize = 22;
const RESPONSE_HEADER_SIZE: usize = 29;

fn encode_transaction(request: &PassThruRequest, response: &PassThruResponse) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        REQUEST_HEADER_SIZE
            + request.input.len()
            + request.large_input.len()
            + RESPONSE_HEADER_SIZE
            + response.output.len()
            + response.large_output.len(),
    );

    out.extend_from_slice(&request.duration_ms.to_le_bytes());
    out.extend_from_slice(&request.dimm_id.to_le_bytes());
    out.push(request.opcode);
    out.push(request.sub_opcode);
    out.extend_from_slice(&(request.input.len() as u32).to_le_bytes());
    out.extend_from_slice(&(request.large_input.len() as u32).to_le_bytes());
    out.extend_from_slice(&request.input);
    out.extend_from_slice(&request.large_input);

    out.extend_from_slice(&response.duration_ms.to_le_bytes());
    out.extend_from_slice(&response.return_code.to_le_bytes());
    out.extend_from_slice(&response.dimm_id.to_le_bytes());
    out.extend_from_slice(&(response.output.len() as u32).to_le_bytes());
    out.extend_from_slice(&(response.large_output.len() as u32).to_le_bytes());
    out.push(response.status);
    out.extend_from_slice(&response.output);
    out.extend_from_slice(&response.large_output);

    out
}

fn decode_transaction(raw: &[u8]) -> Option<(PassThruRequest, PassThruResponse)> {
    let input_size = u32::read_at(raw, 14)? as usize;
    let large_input_size = u32::read_at(raw, 18)? as usize;

    let request = PassThruRequest {
        duration_ms: u64::read_at(raw, 0)?,
        dimm_id: u32::read_at(raw, 8)?,
        opcode: u8::read_at(raw, 12)?,
        sub_opcode: u8::read_at(raw, 13)?,
        input: raw
            .get(REQUEST_HEADER_SIZE..REQUEST_HEADER_SIZE + input_size)?
            .to_vec(),
        large_input: raw
            .get(REQUEST_HEADER_SIZE + input_size..REQUEST_HEADER_SIZE + input_size + large_input_size)?
            .to_vec(),
    };

    let resp_at = REQUEST_HEADER_SIZE + input_size + large_input_size;
    let output_size = u32::read_at(raw, resp_at + 20)? as usize;
    let large_output_size = u32::read_at(raw, resp_at + 24)? as usize;
    let payload_at = resp_at + RESPONSE_HEADER_SIZE;

    let response = PassThruResponse {
        duration_ms: u64::read_at(raw, resp_at)?,
        return_code: u64::read_at(raw, resp_at + 8)?,
        dimm_id: u32::read_at(raw, resp_at + 16)?,
        status: u8::read_at(raw, resp_at + 28)?,
        output: raw.get(payload_at..payload_at + output_size)?.to_vec(),
        large_output: raw
            .get(payload_at + output_size..payload_at + output_size + large_output_size)?
            .to_vec(),
    };

    Some((request, response))
}

impl Session {
    /// Captures a platform table snapshot. A no-op outside record mode, so
    /// table call sites record unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`PbrError::OutOfPartitions`] if the snapshot partition
    /// cannot be created.
    pub fn record_table(&mut self, kind: TableKind, table: &[u8]) -> Result<(), PbrError> {
        if self.mode() != Mode::Record {
            return Ok(());
        }
        self.append_singleton(kind.signature(), table)
    }

    /// Serves a recorded platform table snapshot during playback.
    ///
    /// Returns `Ok(None)` outside playback mode (the caller should read
    /// the live table).
    ///
    /// # Errors
    ///
    /// Returns [`PbrError::ReplayDataExhausted`] if playback is active but
    /// this table was never recorded.
    pub fn fetch_table(&mut self, kind: TableKind) -> Result<Option<Vec<u8>>, PbrError> {
        if self.mode() != Mode::Playback {
            return Ok(None);
        }
        self.read(kind.signature(), ReadIndex::At(0)).map(Some)
    }

    /// Captures the SMBIOS stream with its entry-point version. A no-op
    /// outside record mode.
    ///
    /// # Errors
    ///
    /// Returns [`PbrError::OutOfPartitions`] if the snapshot partition
    /// cannot be created.
    pub fn record_smbios(&mut self, snapshot: &SmbiosSnapshot) -> Result<(), PbrError> {
        if self.mode() != Mode::Record {
            return Ok(());
        }
        self.append_singleton(SMBIOS_SIG, &snapshot.encode())
    }

    /// Serves the recorded SMBIOS snapshot during playback; `Ok(None)`
    /// outside playback mode.
    ///
    /// # Errors
    ///
    /// Returns [`PbrError::ReplayDataExhausted`] if playback is active but
    /// no SMBIOS stream was recorded, or [`PbrError::InvalidImage`] if the
    /// record is corrupt.
    pub fn fetch_smbios(&mut self) -> Result<Option<SmbiosSnapshot>, PbrError> {
        if self.mode() != Mode::Playback {
            return Ok(None);
        }
        let raw = self.read(SMBIOS_SIG, ReadIndex::At(0))?;
        SmbiosSnapshot::decode(&raw)
            .map(Some)
            .ok_or(PbrError::InvalidImage)
    }

    /// Records one passthrough transaction (request and response framed
    /// together). A no-op outside record mode.
    ///
    /// # Errors
    ///
    /// Returns [`PbrError::OutOfPartitions`] if the passthrough partition
    /// cannot be created.
    pub fn record_passthru(
        &mut self,
        request: &PassThruRequest,
        response: &PassThruResponse,
    ) -> Result<(), PbrError> {
        if self.mode() != Mode::Record {
            return Ok(());
        }
        self.append(PASS_THRU_SIG, &encode_transaction(request, response))
            .map(|_| ())
    }

    /// Replays the next recorded passthrough transaction in place of a
    /// live transport call.
    ///
    /// The recorded request must match `expected` on opcode and
    /// sub-opcode; the recorded response is returned verbatim, non-success
    /// return codes included.
    ///
    /// # Errors
    ///
    /// Returns [`PbrError::SessionNotReady`] outside playback mode,
    /// [`PbrError::ReplayDataExhausted`] when the recording has no more
    /// transactions, and [`PbrError::RecordMismatch`] when the replayed
    /// call diverges from the recorded one.
    pub fn replay_passthru(
        &mut self,
        expected: &PassThruRequest,
    ) -> Result<PassThruResponse, PbrError> {
        if self.mode() != Mode::Playback {
            return Err(PbrError::SessionNotReady);
        }
        let raw = self.read(PASS_THRU_SIG, ReadIndex::Next)?;
        let (request, response) = decode_transaction(&raw).ok_or(PbrError::InvalidImage)?;

        if request.opcode != expected.opcode || request.sub_opcode != expected.sub_opcode {
            return Err(PbrError::RecordMismatch);
        }
        Ok(response)
    }
}
