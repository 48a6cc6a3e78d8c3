//! Resampler stage: raw capture ring → 16 kHz mono detection ring.
//!
//! Runs on its own OS thread because both ends are blocking ring-buffer
//! I/O.  Each pass moves exactly one native-rate chunk (20 ms by default):
//! decode little-endian i16, rate-convert, downmix to mono, write the
//! result into the resampled ring.  While the mic is muted the chunk is
//! discarded and the thread sleeps a pacing interval instead of spinning
//! on silence.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::audio::{
    bytes_to_samples, downmix_to_mono, samples_to_bytes, ByteRing, ResampleContext,
};

use super::ControlFlags;

/// One step of the loop, split out for tests.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    /// A chunk was converted and forwarded.
    Forwarded,
    /// The mic is muted; the chunk was discarded.
    Discarded,
    /// The raw ring closed; the loop is done.
    Closed,
}

/// Owns the conversion context and the two ring endpoints.
pub(crate) struct Resampler {
    raw: Arc<ByteRing>,
    resampled: Arc<ByteRing>,
    flags: Arc<ControlFlags>,
    context: ResampleContext,
    channels: u16,
    chunk_bytes: usize,
    mute_idle: Duration,
}

impl Resampler {
    pub(crate) fn new(
        raw: Arc<ByteRing>,
        resampled: Arc<ByteRing>,
        flags: Arc<ControlFlags>,
        context: ResampleContext,
        channels: u16,
        chunk_bytes: usize,
        mute_idle: Duration,
    ) -> Self {
        Self {
            raw,
            resampled,
            flags,
            context,
            channels,
            chunk_bytes,
            mute_idle,
        }
    }

    /// Spawn the stage thread.  It exits when the raw ring closes.
    pub(crate) fn spawn(mut self) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name("resampler".into())
            .spawn(move || {
                log::debug!("resampler: thread started");
                loop {
                    match self.step() {
                        Step::Forwarded => {}
                        Step::Discarded => thread::sleep(self.mute_idle),
                        Step::Closed => break,
                    }
                }
                // Propagate end-of-stream to the consumer side.
                self.resampled.close();
                log::debug!("resampler: raw ring closed, thread exiting");
            })
            .unwrap_or_else(|e| panic!("failed to spawn resampler thread: {e}"))
    }

    fn step(&mut self) -> Step {
        let mut chunk = vec![0u8; self.chunk_bytes];
        let n = self.raw.read(&mut chunk, None);
        if n == 0 {
            return Step::Closed;
        }
        chunk.truncate(n);

        if self.flags.mic_muted() {
            // Conversion state is stale after a gap; restart clean on unmute.
            self.context.reset();
            return Step::Discarded;
        }

        let samples = bytes_to_samples(&chunk);
        let mut converted = Vec::new();
        self.context.process(&samples, &mut converted);

        let mono = if self.channels > 1 {
            downmix_to_mono(&converted, self.channels)
        } else {
            converted
        };

        if !mono.is_empty() {
            self.resampled.write(&samples_to_bytes(&mono), None);
        }
        Step::Forwarded
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
