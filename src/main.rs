//! Demo entry point — voicegate capture pipeline on the default mic.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`PipelineConfig`] from disk (returns default on first run).
//! 3. Open the default input device ([`CpalCaptureDriver`]).
//! 4. Build the energy wake trigger ([`EnergyDetector`]).
//! 5. Assemble and start the pipeline ([`PipelineBuilder`]).
//! 6. Block on Ctrl-C, then tear the pipeline down.
//!
//! The upstream "assistant" is a logger: dialog opens and streamed chunk
//! counts go to the log so the pipeline can be exercised without a cloud
//! backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use voicegate::audio::CpalCaptureDriver;
use voicegate::config::PipelineConfig;
use voicegate::wake::EnergyDetector;
use voicegate::{PipelineBuilder, TriggerKind, VoiceClient};

// ---------------------------------------------------------------------------
// LoggingClient — stand-in for a real assistant backend
// ---------------------------------------------------------------------------

/// Accepts every dialog and counts the audio it receives.
struct LoggingClient {
    chunks: AtomicUsize,
    bytes: AtomicUsize,
}

impl LoggingClient {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            chunks: AtomicUsize::new(0),
            bytes: AtomicUsize::new(0),
        })
    }
}

impl VoiceClient for LoggingClient {
    fn begin_dialog(&self, trigger: TriggerKind) -> bool {
        log::info!("client: dialog opened by {trigger:?}");
        true
    }

    fn on_audio_chunk(&self, chunk: &[u8]) {
        let chunks = self.chunks.fetch_add(1, Ordering::Relaxed) + 1;
        let bytes = self.bytes.fetch_add(chunk.len(), Ordering::Relaxed) + chunk.len();
        if chunks % 50 == 0 {
            log::info!("client: {chunks} chunks ({bytes} bytes) streamed so far");
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

/// Detector tuning for the demo: 20 ms chunks at 16 kHz, three loud chunks
/// in a row open a dialog.
const ENERGY_THRESHOLD: f32 = 0.05;
const DETECT_CHUNK_SAMPLES: usize = 320;
const DETECT_RUN_LENGTH: u32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voicegate starting up");

    // 2. Configuration
    let config = PipelineConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        PipelineConfig::default()
    });

    // 3. Capture device
    let driver = CpalCaptureDriver::new()?;

    // 4. Wake trigger
    let detector = EnergyDetector::new(ENERGY_THRESHOLD, DETECT_CHUNK_SAMPLES, DETECT_RUN_LENGTH)?;

    // 5. Pipeline
    let client = LoggingClient::new();
    let pipeline = PipelineBuilder::new(
        Box::new(driver),
        Box::new(detector),
        Arc::clone(&client) as Arc<dyn VoiceClient>,
    )
    .config(config)
    .start()?;

    log::info!(
        "voicegate running in {} — speak loudly to trigger, Ctrl-C to exit",
        pipeline.handle().state().label()
    );

    // 6. Wait for Ctrl-C, then tear down
    tokio::signal::ctrl_c().await?;
    let final_state = pipeline.shutdown().await;

    log::info!(
        "voicegate stopped in {} after {} chunks / {} bytes",
        final_state.label(),
        client.chunks.load(Ordering::Relaxed),
        client.bytes.load(Ordering::Relaxed)
    );
    Ok(())
}
