//! Microphone capture behind an injectable driver trait.
//!
//! The pipeline never talks to audio hardware directly.  It hands the
//! driver a [`CaptureSink`] (backed by the raw capture ring) and expects the
//! driver to push raw little-endian `i16` PCM bytes into it from its own
//! callback context.  [`CpalCaptureDriver`] is the production implementation
//! on top of `cpal`; tests inject a scripted driver instead.

use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::buffer::ByteRing;

/// Upper bound on how long the capture callback may wait for ring space.
///
/// Generous enough to ride out a momentarily slow resampler, short enough
/// that the hardware callback always completes in bounded time.
const SINK_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// CaptureSink
// ---------------------------------------------------------------------------

/// Producer handle into the raw capture ring.
///
/// Cheap to clone.  [`push`](Self::push) applies backpressure with a bounded
/// timeout rather than blocking the hardware callback indefinitely; bytes
/// that do not fit before the deadline are dropped at the boundary (the
/// ring itself never loses accepted data).
#[derive(Clone)]
pub struct CaptureSink {
    ring: Arc<ByteRing>,
}

impl CaptureSink {
    pub(crate) fn new(ring: Arc<ByteRing>) -> Self {
        Self { ring }
    }

    /// Push raw PCM bytes; returns how many were accepted.
    pub fn push(&self, bytes: &[u8]) -> usize {
        self.ring.write(bytes, Some(SINK_WRITE_TIMEOUT))
    }
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors raised while bringing up or running a capture driver.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("no capture sink installed — call set_sink before start")]
    NoSink,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// CaptureDriver trait
// ---------------------------------------------------------------------------

/// Interface the pipeline uses to control the capture hardware.
///
/// Injected at pipeline construction so board/backend selection is a
/// runtime decision.  The driver delivers audio through the sink installed
/// with [`set_sink`](Self::set_sink); that producer callback must never
/// block beyond the sink's own bounded timeout and must never panic.
pub trait CaptureDriver {
    /// Install the sink the driver will push PCM bytes into.
    fn set_sink(&mut self, sink: CaptureSink);

    /// Start delivering audio.  An error here is fatal to pipeline bring-up.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Stop delivering audio.  Idempotent.
    fn stop(&mut self);

    /// Native sample rate of the delivered stream in Hz.
    fn sample_rate(&self) -> u32;

    /// Number of interleaved channels in the delivered stream.
    fn channels(&self) -> u16;
}

// ---------------------------------------------------------------------------
// CpalCaptureDriver
// ---------------------------------------------------------------------------

/// Production capture driver on top of the system default input device.
///
/// The cpal callback converts `f32` samples to little-endian `i16` bytes
/// and pushes them through the sink.  Send errors never reach the audio
/// thread; an overfull ring simply sheds the excess at the boundary.
pub struct CpalCaptureDriver {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_rate: u32,
    channels: u16,
    sink: Option<CaptureSink>,
    stream: Option<cpal::Stream>,
}

impl CpalCaptureDriver {
    /// Open the system default input device and query its preferred stream
    /// configuration.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        log::info!("capture: default input device at {sample_rate} Hz, {channels} ch");

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
            sink: None,
            stream: None,
        })
    }
}

impl CaptureDriver for CpalCaptureDriver {
    fn set_sink(&mut self, sink: CaptureSink) {
        self.sink = Some(sink);
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let sink = self.sink.clone().ok_or(CaptureError::NoSink)?;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mut bytes = Vec::with_capacity(data.len() * 2);
                for &s in data {
                    let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    bytes.extend_from_slice(&v.to_le_bytes());
                }
                let pushed = sink.push(&bytes);
                if pushed < bytes.len() {
                    log::warn!(
                        "capture: ring full, shed {} of {} bytes",
                        bytes.len() - pushed,
                        bytes.len()
                    );
                }
            },
            |err: cpal::StreamError| {
                log::error!("capture: cpal stream error: {err}");
            },
            None, // no timeout
        )?;

        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the stream stops the underlying hardware stream.
        self.stream = None;
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
