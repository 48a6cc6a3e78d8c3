//! Pipeline assembly: wiring, shared control flags, bring-up and teardown.
//!
//! [`PipelineBuilder`] connects the stages around the two ring buffers:
//!
//! ```text
//! CaptureDriver ─▶ raw ring ─▶ Resampler ─▶ resampled ring ─┬▶ WakeWordWatcher
//!                  (thread)                                 └▶ SessionStateMachine
//! ```
//!
//! The resampler and watcher run on OS threads (blocking ring I/O); the
//! session state machine and the optional power policy run as tokio tasks.
//! Teardown is close-driven: closing the raw ring cascades end-of-stream
//! through the resampler into the resampled ring, which retires the
//! watcher and any in-flight streaming pull.

pub mod power;
pub mod resampler;
pub mod session;
pub mod watcher;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::audio::{
    ByteRing, CaptureDriver, CaptureError, CaptureSink, ResampleContext, ResampleError,
};
use crate::config::PipelineConfig;
use crate::persist::{FileMuteStore, MuteStore};
use crate::wake::{WakeWordDetector, DETECT_SAMPLE_RATE};

use power::{PowerDriver, PowerPolicy};
use resampler::Resampler;
use session::{SessionHandle, SessionState, SessionStateMachine, VoiceClient};
use watcher::WakeWordWatcher;

/// Depth of the bounded session event queue.
pub const EVENT_QUEUE_DEPTH: usize = 10;

// ---------------------------------------------------------------------------
// ControlFlags
// ---------------------------------------------------------------------------

/// Cross-thread control state shared by every stage.
///
/// Only the session state machine writes these; the resampler and watcher
/// read them once per pass.  Wake-word detection is armed exactly when the
/// pipeline is idle: not streaming and not muted.
pub struct ControlFlags {
    capture_enabled: AtomicBool,
    mic_muted: AtomicBool,
}

impl ControlFlags {
    pub fn new(muted: bool) -> Self {
        Self {
            capture_enabled: AtomicBool::new(false),
            mic_muted: AtomicBool::new(muted),
        }
    }

    /// True while a dialog turn is streaming audio upstream.
    pub fn capture_enabled(&self) -> bool {
        self.capture_enabled.load(Ordering::SeqCst)
    }

    pub fn set_capture_enabled(&self, enabled: bool) {
        self.capture_enabled.store(enabled, Ordering::SeqCst);
    }

    /// True while the mic is muted.
    pub fn mic_muted(&self) -> bool {
        self.mic_muted.load(Ordering::SeqCst)
    }

    pub fn set_mic_muted(&self, muted: bool) {
        self.mic_muted.store(muted, Ordering::SeqCst);
    }

    /// Wake-word detection runs only while idle-but-armed.
    pub fn detect_enabled(&self) -> bool {
        !self.capture_enabled() && !self.mic_muted()
    }
}

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Fatal bring-up and control errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("capture driver failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("wake-word detector wants {actual} Hz, pipeline delivers {expected} Hz")]
    DetectorRate { expected: u32, actual: u32 },

    #[error("detector chunk of {chunk_bytes} bytes exceeds ring capacity {capacity}")]
    DetectorChunkTooLarge { chunk_bytes: usize, capacity: usize },

    #[error("invalid resampler geometry: {0}")]
    Resample(#[from] ResampleError),

    #[error("session event queue is closed")]
    EventQueueClosed,
}

// ---------------------------------------------------------------------------
// PipelineBuilder
// ---------------------------------------------------------------------------

/// Assembles and starts a capture pipeline.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voicegate::audio::CpalCaptureDriver;
/// use voicegate::config::PipelineConfig;
/// use voicegate::pipeline::PipelineBuilder;
/// use voicegate::pipeline::session::{TriggerKind, VoiceClient};
/// use voicegate::wake::EnergyDetector;
///
/// struct Client;
/// impl VoiceClient for Client {
///     fn begin_dialog(&self, _: TriggerKind) -> bool { true }
///     fn on_audio_chunk(&self, _: &[u8]) {}
/// }
///
/// # async fn run() -> anyhow::Result<()> {
/// let driver = CpalCaptureDriver::new()?;
/// let detector = EnergyDetector::new(0.02, 320, 3)?;
/// let pipeline = PipelineBuilder::new(Box::new(driver), Box::new(detector), Arc::new(Client))
///     .config(PipelineConfig::load()?)
///     .start()?;
/// # let _ = pipeline;
/// # Ok(())
/// # }
/// ```
pub struct PipelineBuilder {
    config: PipelineConfig,
    driver: Box<dyn CaptureDriver>,
    detector: Box<dyn WakeWordDetector>,
    client: Arc<dyn VoiceClient>,
    store: Arc<dyn MuteStore>,
    power_driver: Option<Arc<dyn PowerDriver>>,
}

impl PipelineBuilder {
    /// Start from defaults: default config, mute state under the platform
    /// config directory, no power policy.
    pub fn new(
        driver: Box<dyn CaptureDriver>,
        detector: Box<dyn WakeWordDetector>,
        client: Arc<dyn VoiceClient>,
    ) -> Self {
        Self {
            config: PipelineConfig::default(),
            driver,
            detector,
            client,
            store: Arc::new(FileMuteStore::default_location()),
            power_driver: None,
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the mute-state storage (tests, embedders with NV storage).
    pub fn mute_store(mut self, store: Arc<dyn MuteStore>) -> Self {
        self.store = store;
        self
    }

    /// Install the hardware hooks behind the power policy.  The policy
    /// itself only runs when the `[power]` config section enables it.
    pub fn power_driver(mut self, driver: Arc<dyn PowerDriver>) -> Self {
        self.power_driver = Some(driver);
        self
    }

    /// Validate geometry, start capture and spawn all stages.
    ///
    /// Must be called from within a tokio runtime.  Detector or capture
    /// problems are fatal here, before any audio flows.
    pub fn start(mut self) -> Result<Pipeline, PipelineError> {
        let config = self.config;

        // Fatal-first validation: a detector that cannot consume what the
        // pipeline produces must fail bring-up, not limp at runtime.
        if self.detector.sample_rate() != DETECT_SAMPLE_RATE {
            return Err(PipelineError::DetectorRate {
                expected: DETECT_SAMPLE_RATE,
                actual: self.detector.sample_rate(),
            });
        }
        let chunk_bytes = self.detector.chunk_samples() * 2;
        if chunk_bytes > config.audio.ring_capacity {
            return Err(PipelineError::DetectorChunkTooLarge {
                chunk_bytes,
                capacity: config.audio.ring_capacity,
            });
        }

        let source_rate = self.driver.sample_rate();
        let channels = self.driver.channels();
        if source_rate != config.audio.source_rate || channels != config.audio.channels {
            log::warn!(
                "pipeline: device delivers {source_rate} Hz/{channels} ch, \
                 config expected {} Hz/{} ch",
                config.audio.source_rate,
                config.audio.channels
            );
        }
        let context = ResampleContext::new(source_rate, DETECT_SAMPLE_RATE, channels)?;
        let raw_chunk_bytes =
            (source_rate as usize * config.audio.chunk_ms as usize / 1000) * channels as usize * 2;

        // A corrupt or missing boot record must never block bring-up.
        let boot_muted = self.store.load_mute_state().unwrap_or_else(|e| {
            log::warn!("pipeline: failed to load mute state, assuming unmuted: {e}");
            false
        });
        let initial = if boot_muted {
            log::info!("pipeline: booting muted (persisted)");
            SessionState::Muted
        } else {
            SessionState::Stopped
        };

        let flags = Arc::new(ControlFlags::new(boot_muted));
        let raw = Arc::new(ByteRing::new(config.audio.ring_capacity));
        let resampled = Arc::new(ByteRing::new(config.audio.ring_capacity));
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

        let power = match (&self.power_driver, config.power.enabled) {
            (Some(driver), true) => Some(PowerPolicy::spawn(
                Arc::clone(driver),
                config.power.idle(),
                events_tx.clone(),
            )),
            (None, true) => {
                log::warn!("pipeline: [power] enabled but no power driver installed");
                None
            }
            _ => None,
        };

        let (machine, handle) = SessionStateMachine::new(
            initial,
            events_rx,
            events_tx.clone(),
            Arc::clone(&resampled),
            Arc::clone(&flags),
            Arc::clone(&self.client),
            Arc::clone(&self.store),
            power.clone(),
            config.session.clone(),
        );

        let resampler_thread = Resampler::new(
            Arc::clone(&raw),
            Arc::clone(&resampled),
            Arc::clone(&flags),
            context,
            channels,
            raw_chunk_bytes,
            config.session.mute_idle(),
        )
        .spawn();

        let watcher_thread = WakeWordWatcher::new(
            Arc::clone(&resampled),
            Arc::clone(&flags),
            self.detector,
            events_tx,
            config.wake.clone(),
        )
        .spawn();

        // Last: open the hardware tap.  Fatal if the device will not start.
        self.driver.set_sink(CaptureSink::new(Arc::clone(&raw)));
        self.driver.start()?;

        let session_task = tokio::spawn(machine.run());
        log::info!("pipeline: started ({source_rate} Hz/{channels} ch → 16 kHz mono)");

        Ok(Pipeline {
            handle,
            raw,
            driver: self.driver,
            power,
            resampler_thread: Some(resampler_thread),
            watcher_thread: Some(watcher_thread),
            session_task,
        })
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A running pipeline.  Dropping it without [`shutdown`](Self::shutdown)
/// leaks the stage threads until process exit.
pub struct Pipeline {
    handle: SessionHandle,
    raw: Arc<ByteRing>,
    driver: Box<dyn CaptureDriver>,
    power: Option<Arc<PowerPolicy>>,
    resampler_thread: Option<thread::JoinHandle<()>>,
    watcher_thread: Option<thread::JoinHandle<()>>,
    session_task: JoinHandle<SessionState>,
}

impl Pipeline {
    /// Control handle for the session state machine.  Cloneable.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Notify the power policy that speaker playback is starting.  No-op
    /// when the policy is disabled.
    pub fn playback_starting(&self) {
        if let Some(power) = &self.power {
            power.playback_starting();
        }
    }

    /// Orderly teardown: stop the hardware, drain the stages, retire the
    /// session task.  Returns the final session state.
    pub async fn shutdown(mut self) -> SessionState {
        log::info!("pipeline: shutting down");
        self.driver.stop();

        // Close-driven cascade: raw → resampler exits → resampled closes →
        // watcher and any in-flight pull retire.
        self.raw.close();
        let _ = self.handle.shutdown().await;

        let final_state = match self.session_task.await {
            Ok(state) => state,
            Err(e) => {
                log::error!("pipeline: session task failed: {e}");
                SessionState::Stopped
            }
        };

        for handle in [self.resampler_thread.take(), self.watcher_thread.take()]
            .into_iter()
            .flatten()
        {
            if handle.join().is_err() {
                log::error!("pipeline: stage thread panicked during shutdown");
            }
        }

        log::info!("pipeline: stopped in {}", final_state.label());
        final_state
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
