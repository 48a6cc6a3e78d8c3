//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//!   Windows: %APPDATA%\voicegate\
//!   macOS:   ~/Library/Application Support/voicegate/
//!   Linux:   ~/.config/voicegate/
//!
//! `settings.toml` holds the pipeline configuration, `state.toml` the
//! persisted mute flag.

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml` and `state.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Full path to `state.toml` (persisted mute flag).
    pub state_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voicegate";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path (should be extremely rare in practice).
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let state_file = config_dir.join("state.toml");

        Self {
            config_dir,
            settings_file,
            state_file,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
