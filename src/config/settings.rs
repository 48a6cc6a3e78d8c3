//! Pipeline settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across
//! threads.  Defaults mirror the reference hardware pipeline: 20 ms chunks,
//! 4 KiB rings, 16 kHz mono detection format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::AppPaths;

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Capture-side geometry: what the hardware delivers and how it is chunked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Native sample rate delivered by the capture driver, in Hz.
    pub source_rate: u32,
    /// Interleaved channels delivered by the capture driver.
    pub channels: u16,
    /// Duration of one resampler input chunk, in milliseconds.
    pub chunk_ms: u32,
    /// Capacity of each ring buffer (raw and resampled), in bytes.
    pub ring_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            source_rate: 48_000,
            channels: 2,
            chunk_ms: 20,
            ring_capacity: 4 * 1024,
        }
    }
}

impl AudioConfig {
    /// Bytes in one native-rate input chunk (16-bit samples, all channels).
    pub fn chunk_bytes(&self) -> usize {
        (self.source_rate as usize * self.chunk_ms as usize / 1000) * self.channels as usize * 2
    }
}

// ---------------------------------------------------------------------------
// WakeConfig
// ---------------------------------------------------------------------------

/// Wake-word watcher behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakeConfig {
    /// Debounce window for repeated triggers, in milliseconds.
    ///
    /// Two positive detections closer together than this are treated as the
    /// same utterance re-triggering and collapse to one event.  The default
    /// equals one 20 ms detection chunk.
    pub debounce_ms: u64,
    /// Idle cadence while detection is disabled, in milliseconds.
    pub drain_interval_ms: u64,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 20,
            drain_interval_ms: 100,
        }
    }
}

impl WakeConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Session state machine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Bytes pulled from the resampled ring per GET_AUDIO iteration.
    pub pull_chunk_bytes: usize,
    /// How long one GET_AUDIO pull may wait for data before a zero-length
    /// read is treated as end of stream, in milliseconds.
    pub pull_timeout_ms: u64,
    /// Pacing interval while the resampler discards muted input, in
    /// milliseconds.
    pub mute_idle_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pull_chunk_bytes: 320,
            pull_timeout_ms: 1000,
            mute_idle_ms: 200,
        }
    }
}

impl SessionConfig {
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }

    pub fn mute_idle(&self) -> Duration {
        Duration::from_millis(self.mute_idle_ms)
    }
}

// ---------------------------------------------------------------------------
// PowerConfig
// ---------------------------------------------------------------------------

/// Optional low-power policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerConfig {
    /// Whether the idle timer runs at all.
    pub enabled: bool,
    /// Quiet seconds after the last playback before low power is requested.
    pub idle_secs: u64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            idle_secs: 10,
        }
    }
}

impl PowerConfig {
    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Top-level configuration for the capture pipeline.
///
/// # Example
///
/// ```rust
/// use voicegate::config::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.audio.chunk_ms, 20);
/// assert_eq!(config.wake.debounce_ms, 20);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub wake: WakeConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub power: PowerConfig,
}

impl PipelineConfig {
    /// Load configuration from the default settings file.
    ///
    /// A missing file yields the defaults (first run); a malformed file is
    /// an error so a typo never silently reverts the device to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("parsing settings from {}", path.display()))?;
        Ok(config)
    }

    /// Write configuration to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let text = toml::to_string_pretty(self).context("serializing settings")?;
        std::fs::write(path, text)
            .with_context(|| format!("writing settings to {}", path.display()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
