//! Cross-invocation session state.
//!
//! Each CLI invocation is a complete process run, but a record or playback
//! session spans many of them. The mode and current tag id persist as a
//! small JSON file in the state directory; the session container itself
//! persists next to it as a composed PBR image.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// State filename within the state directory.
const STATE_FILE: &str = "state.json";
/// Session image filename within the state directory.
const SESSION_IMAGE_FILE: &str = "session.pbr";

/// Persisted session mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistedMode {
    /// No session active.
    #[default]
    Normal,
    /// Recording across invocations.
    Record,
    /// Replaying across invocations.
    Playback,
}

/// The state carried between CLI invocations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// Active session mode.
    pub mode: PersistedMode,
    /// Tag id the next playback step resumes from.
    #[serde(default)]
    pub tag_id: u32,
}

impl SessionState {
    /// Loads the state from `dir`, defaulting to normal mode when no state
    /// file exists yet.
    ///
    /// # Errors
    ///
    /// Fails only on an unreadable or corrupt state file.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(STATE_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("could not read session state from {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("corrupt session state in {}", path.display()))
    }

    /// Writes the state to `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Fails if the directory or file cannot be written.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("could not create state directory {}", dir.display()))?;
        let path = dir.join(STATE_FILE);
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&path, data)
            .with_context(|| format!("could not write session state to {}", path.display()))
    }
}

/// Resolves the state directory: `PMEMCTL_STATE_DIR`, or `.pmemctl` in the
/// user's home directory.
///
/// # Errors
///
/// Fails when neither the override nor a home directory is available.
pub fn state_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("PMEMCTL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".pmemctl"))
        .context("no home directory; set PMEMCTL_STATE_DIR")
}

/// Path of the session image within the state directory.
#[must_use]
pub fn session_image_path(dir: &Path) -> PathBuf {
    dir.join(SESSION_IMAGE_FILE)
}

/// Reads the persisted session image, if one exists.
///
/// # Errors
///
/// Fails on an unreadable image file.
pub fn read_session_image(dir: &Path) -> Result<Option<Vec<u8>>> {
    let path = session_image_path(dir);
    if !path.exists() {
        return Ok(None);
    }
    fs::read(&path)
        .map(Some)
        .with_context(|| format!("could not read session image {}", path.display()))
}

/// Writes the session image into the state directory.
///
/// # Errors
///
/// Fails if the directory or file cannot be written.
pub fn write_session_image(dir: &Path, image: &[u8]) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("could not create state directory {}", dir.display()))?;
    let path = session_image_path(dir);
    fs::write(&path, image)
        .with_context(|| format!("could not write session image {}", path.display()))
}

/// Removes the persisted session image and state.
///
/// # Errors
///
/// Fails if an existing file cannot be removed.
pub fn clear(dir: &Path) -> Result<()> {
    for file in [STATE_FILE, SESSION_IMAGE_FILE] {
        let path = dir.join(file);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("could not remove {}", path.display()))?;
        }
    }
    Ok(())
}
