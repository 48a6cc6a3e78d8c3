//! Mute-state persistence across reboots.
//!
//! The session state machine writes the mute flag through [`MuteStore`] on
//! every effective MUTE/UNMUTE transition and the pipeline builder reads it
//! back exactly once at bring-up, so a device that was muted when it lost
//! power boots muted.
//!
//! [`FileMuteStore`] keeps the flag in a small TOML file under the user
//! config directory; tests and embedders with their own storage inject a
//! different implementation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// PersistError
// ---------------------------------------------------------------------------

/// Errors from the persistent mute store.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ---------------------------------------------------------------------------
// MuteStore trait
// ---------------------------------------------------------------------------

/// Storage boundary for the boot mute flag.
pub trait MuteStore: Send + Sync {
    /// Read the persisted flag.  A missing record loads as unmuted.
    fn load_mute_state(&self) -> Result<bool, PersistError>;

    /// Persist the flag.
    fn save_mute_state(&self, muted: bool) -> Result<(), PersistError>;
}

// ---------------------------------------------------------------------------
// FileMuteStore
// ---------------------------------------------------------------------------

/// On-disk persisted state.  A struct rather than a bare bool so the file
/// can grow more fields without a format break.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    mic_muted: bool,
}

/// TOML-file-backed [`MuteStore`].
///
/// # Example
///
/// ```rust,no_run
/// use voicegate::persist::{FileMuteStore, MuteStore};
///
/// let store = FileMuteStore::default_location();
/// store.save_mute_state(true).unwrap();
/// assert!(store.load_mute_state().unwrap());
/// ```
pub struct FileMuteStore {
    path: PathBuf,
}

impl FileMuteStore {
    /// Store state at an explicit `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store state at the platform default location
    /// (`<config dir>/voicegate/state.toml`).
    pub fn default_location() -> Self {
        Self::new(crate::config::AppPaths::new().state_file)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MuteStore for FileMuteStore {
    fn load_mute_state(&self) -> Result<bool, PersistError> {
        if !self.path.exists() {
            return Ok(false);
        }
        let text = std::fs::read_to_string(&self.path)?;
        let state: PersistedState = toml::from_str(&text)?;
        Ok(state.mic_muted)
    }

    fn save_mute_state(&self, muted: bool) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(&PersistedState { mic_muted: muted })?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
