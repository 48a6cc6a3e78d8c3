//! voicegate — wake-word-gated microphone capture pipeline.
//!
//! The library turns a raw capture device into a pull-style 16 kHz mono
//! voice stream gated by a wake-word detector and a small session state
//! machine:
//!
//! ```text
//! CaptureDriver ─▶ raw ring ─▶ resampler ─▶ resampled ring ─┬▶ wake watcher
//!                                                           └▶ session pull
//! ```
//!
//! Audio stays in the rings until either the wake watcher (idle) or the
//! session pull loop (streaming) consumes it; the `STOPPED`/`STREAMING`/
//! `MUTED` state machine decides which, and persists the mute flag across
//! restarts.
//!
//! Entry points:
//!
//! * [`pipeline::PipelineBuilder`] — assemble and start the pipeline.
//! * [`pipeline::session::SessionHandle`] — control a running pipeline.
//! * [`pipeline::session::VoiceClient`] — the upstream assistant boundary.
//! * [`wake::WakeWordDetector`] / [`audio::CaptureDriver`] — the hardware
//!   and detector seams.

pub mod audio;
pub mod config;
pub mod persist;
pub mod pipeline;
pub mod wake;

pub use pipeline::session::{SessionHandle, SessionState, TriggerKind, VoiceClient};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineError};
