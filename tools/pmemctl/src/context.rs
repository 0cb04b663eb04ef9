//! The per-invocation session context.
//!
//! Binds together the persisted [`SessionState`], the PBR [`Session`]
//! container, and the live platform sources. Every data-consuming command
//! funnels its table and passthrough accesses through here so the
//! record/playback decision lives in exactly one place:
//!
//! - **Normal**: read live sources, record nothing.
//! - **Record**: read live sources, snapshot them into the container, and
//!   tag the invocation.
//! - **Playback**: serve everything from the container; the live sources
//!   and transport are never touched.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use pmem_pbr::{
    Mode, PassThruRequest, PassThruResponse, Session, SmbiosSnapshot, TableKind, dcpmm,
};

use crate::platform::{AcpiTableSource, FwTransport, NullTransport, SmbiosSource};
use crate::state::{self, PersistedMode, SessionState};
use crate::verbose::vprintln;

/// Description written into every recorded session image.
const SESSION_DESCRIPTION: &str = "pmemctl persistent-memory session recording";

/// The state a single CLI invocation runs against.
pub struct SessionContext {
    /// The PBR session container.
    pub session: Session,
    /// The persisted cross-invocation state.
    pub state: SessionState,
    state_dir: PathBuf,
    acpi: AcpiTableSource,
    smbios: SmbiosSource,
    transport: NullTransport,
}

impl SessionContext {
    /// Loads the persisted state and session image from `state_dir` and
    /// restores the session mode and replay cursors.
    ///
    /// # Errors
    ///
    /// Fails on unreadable state, a corrupt session image, or a playback
    /// state without a loaded session.
    pub fn load(state_dir: PathBuf) -> Result<Self> {
        let state = SessionState::load(&state_dir)?;

        let session = match state::read_session_image(&state_dir)? {
            Some(image) => {
                Session::open(&image).context("persisted session image is corrupt")?
            }
            None => Session::new(),
        };

        let mut ctx = Self {
            session,
            state,
            state_dir,
            acpi: AcpiTableSource::new(),
            smbios: SmbiosSource::new(),
            transport: NullTransport,
        };

        match ctx.state.mode {
            PersistedMode::Normal => {}
            PersistedMode::Record => {
                ctx.session
                    .set_mode(Mode::Record)
                    .context("could not resume recording")?;
            }
            PersistedMode::Playback => {
                ctx.session
                    .set_mode(Mode::Playback)
                    .map_err(|e| anyhow::anyhow!("{e}"))
                    .context("could not resume playback")?;
                // Restore every partition's cursor to the pending tag, so
                // this invocation replays exactly where the session left
                // off.
                if ctx.state.tag_id < ctx.session.tag_count() {
                    ctx.session
                        .reset_to_tag(ctx.state.tag_id)
                        .map_err(|e| anyhow::anyhow!("failed to reset session: {e}"))?;
                }
            }
        }

        Ok(ctx)
    }

    /// Begins a fresh recording session, discarding any prior content.
    pub fn start_recording(&mut self) {
        let mut session = Session::new();
        session.sw_version = format!("pmemctl {}", env!("CARGO_PKG_VERSION"));
        session.os_name = std::env::consts::OS.into();
        session.os_version = std::env::consts::ARCH.into();
        session.description = SESSION_DESCRIPTION.into();
        // A fresh container can always enter record mode.
        session.set_mode(Mode::Record).expect("fresh container");

        self.session = session;
        self.state = SessionState {
            mode: PersistedMode::Record,
            tag_id: 0,
        };
    }

    /// Persists the session image and state.
    ///
    /// # Errors
    ///
    /// Fails if the state directory cannot be written.
    pub fn save(&self) -> Result<()> {
        if !self.session.is_empty() {
            state::write_session_image(&self.state_dir, &self.session.compose())?;
        }
        self.state.save(&self.state_dir)
    }

    /// Drops the session and resets the persisted state to normal mode.
    ///
    /// # Errors
    ///
    /// Fails if the persisted files cannot be removed.
    pub fn discard(&mut self) -> Result<()> {
        self.session = Session::new();
        self.state = SessionState::default();
        state::clear(&self.state_dir)
    }

    /// Runs one data-consuming command body with session bookkeeping: in
    /// record mode the invocation line is tagged before the body runs; in
    /// playback mode the cursors are positioned at the pending tag first
    /// and the tag id advances afterwards, whether or not the body
    /// succeeded.
    ///
    /// # Errors
    ///
    /// Propagates the body's error.
    pub fn run_data_command(
        &mut self,
        invocation: &str,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        match self.session.mode() {
            Mode::Record => {
                self.session
                    .set_tag(dcpmm::CLI_SIG, invocation, "cli command")
                    .map_err(|e| anyhow::anyhow!("failed to tag invocation: {e}"))?;
                vprintln!("recorded tag {} for '{invocation}'", self.session.tag_count() - 1);
            }
            Mode::Playback => {
                if self.state.tag_id < self.session.tag_count() {
                    self.session
                        .reset_to_tag(self.state.tag_id)
                        .map_err(|e| anyhow::anyhow!("failed to reset session: {e}"))?;
                }
            }
            Mode::Normal => {}
        }

        let result = body(self);

        if self.session.mode() == Mode::Playback {
            self.state.tag_id += 1;
        }
        result
    }

    /// Fetches an ACPI table honoring the session mode: recorded bytes in
    /// playback, live bytes (snapshotted when recording) otherwise.
    ///
    /// # Errors
    ///
    /// Fails when the table is unavailable live, or was never recorded in
    /// a playback session.
    pub fn acquire_table(&mut self, kind: TableKind) -> Result<Vec<u8>> {
        if let Some(recorded) = self
            .session
            .fetch_table(kind)
            .map_err(|e| anyhow::anyhow!("cannot replay {} table: {e}", kind.name()))?
        {
            vprintln!("{} table served from session recording", kind.name());
            return Ok(recorded);
        }

        let table = self.acpi.read(kind)?;
        self.session
            .record_table(kind, &table)
            .map_err(|e| anyhow::anyhow!("failed to record {} table: {e}", kind.name()))?;
        Ok(table)
    }

    /// Fetches the SMBIOS stream honoring the session mode.
    ///
    /// # Errors
    ///
    /// Fails when SMBIOS data is unavailable live, or was never recorded
    /// in a playback session.
    pub fn acquire_smbios(&mut self) -> Result<SmbiosSnapshot> {
        if let Some(recorded) = self
            .session
            .fetch_smbios()
            .map_err(|e| anyhow::anyhow!("cannot replay SMBIOS stream: {e}"))?
        {
            vprintln!("SMBIOS stream served from session recording");
            return Ok(recorded);
        }

        let (data, major, minor) = self.smbios.read()?;
        let snapshot = SmbiosSnapshot { major, minor, data };
        self.session
            .record_smbios(&snapshot)
            .map_err(|e| anyhow::anyhow!("failed to record SMBIOS stream: {e}"))?;
        Ok(snapshot)
    }

    /// Issues a firmware command honoring the session mode: replayed from
    /// the recording in playback, sent through the live transport (and
    /// recorded) otherwise.
    ///
    /// # Errors
    ///
    /// Fails when playback data is exhausted or diverges from the request.
    pub fn passthru(&mut self, request: &PassThruRequest) -> Result<PassThruResponse> {
        if self.session.mode() == Mode::Playback {
            return self
                .session
                .replay_passthru(request)
                .map_err(|e| anyhow::anyhow!("cannot replay passthrough command: {e}"));
        }

        let response = self.transport.send(request)?;
        self.session
            .record_passthru(request, &response)
            .map_err(|e| anyhow::anyhow!("failed to record passthrough command: {e}"))?;
        Ok(response)
    }

    /// Requires a loaded session for playback.
    ///
    /// # Errors
    ///
    /// Fails with the session-not-ready message when no image is loaded.
    pub fn require_loaded_session(&self) -> Result<()> {
        if self.session.is_empty() {
            bail!("no session loaded; record or load one first");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn temp_state_dir(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("pmemctl-ctx-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    /// Writes fixture ACPI tables and points the source env vars at them.
    fn fixture_acpi_dir(name: &str, nfit: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pmemctl-acpi-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("NFIT"), nfit).unwrap();
        dir
    }

    /// Serializes tests that redirect the ACPI source through the
    /// environment.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn with_acpi_dir<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { std::env::set_var("PMEMCTL_ACPI_DIR", dir) };
        let result = f();
        unsafe { std::env::remove_var("PMEMCTL_ACPI_DIR") };
        result
    }

    #[test]
    fn record_then_playback_serves_recorded_table() {
        let state_dir = temp_state_dir("record-playback");
        let acpi_dir = fixture_acpi_dir("record-playback", b"fake-nfit-bytes");

        with_acpi_dir(&acpi_dir, || {
            // Record an NFIT access.
            let mut ctx = SessionContext::load(state_dir.clone()).unwrap();
            ctx.start_recording();
            ctx.run_data_command("show --acpi nfit", |ctx| {
                let table = ctx.acquire_table(TableKind::Nfit)?;
                assert_eq!(table, b"fake-nfit-bytes");
                Ok(())
            })
            .unwrap();
            ctx.save().unwrap();

            // Re-open in playback; the recorded bytes come back even with
            // the live table changed.
            fs::write(acpi_dir.join("NFIT"), b"DIFFERENT").unwrap();

            let mut ctx = SessionContext::load(state_dir.clone()).unwrap();
            ctx.state.mode = PersistedMode::Playback;
            ctx.state.tag_id = 0;
            ctx.session.set_mode(Mode::Playback).unwrap();

            ctx.run_data_command("show --acpi nfit", |ctx| {
                let table = ctx.acquire_table(TableKind::Nfit)?;
                assert_eq!(table, b"fake-nfit-bytes");
                Ok(())
            })
            .unwrap();
            assert_eq!(ctx.state.tag_id, 1);
        });

        fs::remove_dir_all(&state_dir).ok();
        fs::remove_dir_all(&acpi_dir).ok();
    }

    #[test]
    fn recording_survives_process_restart() {
        let state_dir = temp_state_dir("restart");
        let acpi_dir = fixture_acpi_dir("restart", b"nfit-1");

        with_acpi_dir(&acpi_dir, || {
            let mut ctx = SessionContext::load(state_dir.clone()).unwrap();
            ctx.start_recording();
            ctx.run_data_command("show --acpi nfit", |ctx| {
                ctx.acquire_table(TableKind::Nfit).map(|_| ())
            })
            .unwrap();
            ctx.save().unwrap();

            // A second "process" resumes the same recording and appends.
            let mut ctx = SessionContext::load(state_dir.clone()).unwrap();
            assert_eq!(ctx.session.mode(), Mode::Record);
            ctx.run_data_command("show --acpi nfit", |ctx| {
                ctx.acquire_table(TableKind::Nfit).map(|_| ())
            })
            .unwrap();
            ctx.save().unwrap();

            let ctx = SessionContext::load(state_dir.clone()).unwrap();
            assert_eq!(ctx.session.tag_count(), 2);
        });

        fs::remove_dir_all(&state_dir).ok();
        fs::remove_dir_all(&acpi_dir).ok();
    }

    #[test]
    fn passthru_records_and_replays_unsupported_outcome() {
        let state_dir = temp_state_dir("passthru");
        let request = PassThruRequest {
            duration_ms: 0,
            dimm_id: 1,
            opcode: 0x08,
            sub_opcode: 0x00,
            input: Vec::new(),
            large_input: Vec::new(),
        };

        let mut ctx = SessionContext::load(state_dir.clone()).unwrap();
        ctx.start_recording();
        let live = ctx.passthru(&request).unwrap();
        assert_eq!(live.return_code, crate::platform::STATUS_UNSUPPORTED);
        ctx.save().unwrap();

        let mut ctx = SessionContext::load(state_dir.clone()).unwrap();
        ctx.session.set_mode(Mode::Playback).unwrap();
        ctx.session.reset_cursors();
        let replayed = ctx.passthru(&request).unwrap();
        assert_eq!(replayed.return_code, crate::platform::STATUS_UNSUPPORTED);

        fs::remove_dir_all(&state_dir).ok();
    }
}
