//! Wake-word watcher: scans the detection ring while the pipeline is idle.
//!
//! Runs on its own OS thread, consuming the 16 kHz mono ring in
//! detector-sized chunks.  Detection only runs while the session is
//! idle-but-armed (`!capture_enabled && !mic_muted`); while streaming the
//! session pull loop owns the ring, and while muted the watcher drains and
//! discards so stale audio never greets the unmute.
//!
//! Back-to-back positives within the debounce window collapse to a single
//! [`SessionEvent::WakeWord`] — a trigger phrase spanning two adjacent
//! chunks is one utterance, not two.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::audio::{bytes_to_samples, ByteRing};
use crate::config::WakeConfig;
use crate::wake::WakeWordDetector;

use super::session::SessionEvent;
use super::ControlFlags;

/// One pass of the watcher loop, split out for tests.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    /// Detection ran and reported the wake word; an event was sent.
    Triggered,
    /// Detection ran and reported the wake word inside the debounce window;
    /// no event was sent.
    Debounced,
    /// Detection ran on one chunk without a match (or the ring was quiet).
    Quiet,
    /// Detection is disabled; the pass idled (and drained while muted).
    Idle,
    /// The ring closed; the loop is done.
    Closed,
}

pub(crate) struct WakeWordWatcher {
    ring: Arc<ByteRing>,
    flags: Arc<ControlFlags>,
    detector: Box<dyn WakeWordDetector>,
    events: mpsc::Sender<SessionEvent>,
    config: WakeConfig,
    last_trigger: Option<Instant>,
}

impl WakeWordWatcher {
    pub(crate) fn new(
        ring: Arc<ByteRing>,
        flags: Arc<ControlFlags>,
        detector: Box<dyn WakeWordDetector>,
        events: mpsc::Sender<SessionEvent>,
        config: WakeConfig,
    ) -> Self {
        Self {
            ring,
            flags,
            detector,
            events,
            config,
            last_trigger: None,
        }
    }

    /// Spawn the watcher thread.  It exits when the ring closes.
    pub(crate) fn spawn(mut self) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name("wake-watcher".into())
            .spawn(move || {
                log::debug!("watcher: thread started");
                loop {
                    match self.step() {
                        Step::Idle => thread::sleep(self.config.drain_interval()),
                        Step::Closed => break,
                        Step::Triggered | Step::Debounced | Step::Quiet => {}
                    }
                }
                log::debug!("watcher: ring closed, thread exiting");
            })
            .unwrap_or_else(|e| panic!("failed to spawn watcher thread: {e}"))
    }

    fn step(&mut self) -> Step {
        if self.ring.is_closed() && self.ring.is_empty() {
            return Step::Closed;
        }

        if !self.flags.detect_enabled() {
            if self.flags.mic_muted() {
                self.drain();
            }
            // While streaming, the session pull loop is the consumer; just
            // stay out of the way.
            return Step::Idle;
        }

        let chunk_bytes = self.detector.chunk_samples() * 2;
        let mut buf = vec![0u8; chunk_bytes];
        let n = self.ring.read(&mut buf, Some(self.config.drain_interval()));
        if n < chunk_bytes {
            // Timeout or close mid-chunk; re-check flags on the next pass.
            return Step::Quiet;
        }

        let samples = bytes_to_samples(&buf);
        if !self.detector.detect(&samples) {
            return Step::Quiet;
        }

        if self
            .last_trigger
            .is_some_and(|t| t.elapsed() < self.config.debounce())
        {
            self.last_trigger = Some(Instant::now());
            log::debug!("watcher: wake word re-trigger suppressed");
            return Step::Debounced;
        }

        self.last_trigger = Some(Instant::now());
        log::info!("watcher: wake word detected");
        if self.events.blocking_send(SessionEvent::WakeWord).is_err() {
            log::warn!("watcher: event queue closed, dropping wake event");
        }
        Step::Triggered
    }

    /// Throw away whatever is buffered without blocking.
    fn drain(&self) {
        self.ring.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::samples_to_bytes;

    /// Scripted detector: pops one verdict per chunk, `false` when empty.
    struct ScriptedDetector {
        verdicts: Vec<bool>,
        calls: usize,
    }

    impl ScriptedDetector {
        fn new(verdicts: &[bool]) -> Box<Self> {
            Box::new(Self {
                verdicts: verdicts.to_vec(),
                calls: 0,
            })
        }
    }

    impl WakeWordDetector for ScriptedDetector {
        fn sample_rate(&self) -> u32 {
            16_000
        }

        fn chunk_samples(&self) -> usize {
            320
        }

        fn detect(&mut self, _chunk: &[i16]) -> bool {
            let verdict = self.verdicts.get(self.calls).copied().unwrap_or(false);
            self.calls += 1;
            verdict
        }
    }

    struct Harness {
        watcher: WakeWordWatcher,
        ring: Arc<ByteRing>,
        flags: Arc<ControlFlags>,
        events: mpsc::Receiver<SessionEvent>,
    }

    fn harness(verdicts: &[bool], debounce_ms: u64) -> Harness {
        let ring = Arc::new(ByteRing::new(16 * 1024));
        let flags = Arc::new(ControlFlags::new(false));
        let (tx, rx) = mpsc::channel(10);
        let config = WakeConfig {
            debounce_ms,
            drain_interval_ms: 20,
        };
        let watcher = WakeWordWatcher::new(
            Arc::clone(&ring),
            Arc::clone(&flags),
            ScriptedDetector::new(verdicts),
            tx,
            config,
        );
        Harness {
            watcher,
            ring,
            flags,
            events: rx,
        }
    }

    fn push_chunk(ring: &ByteRing) {
        ring.write(&samples_to_bytes(&[100i16; 320]), None);
    }

    #[test]
    fn detection_sends_one_wake_event() {
        let mut h = harness(&[true], 20);
        push_chunk(&h.ring);

        assert_eq!(h.watcher.step(), Step::Triggered);
        assert_eq!(h.events.try_recv().unwrap(), SessionEvent::WakeWord);
    }

    #[test]
    fn quiet_audio_sends_nothing() {
        let mut h = harness(&[false, false], 20);
        push_chunk(&h.ring);
        push_chunk(&h.ring);

        assert_eq!(h.watcher.step(), Step::Quiet);
        assert_eq!(h.watcher.step(), Step::Quiet);
        assert!(h.events.try_recv().is_err());
    }

    /// Two positives back to back collapse into a single event.
    #[test]
    fn retrigger_inside_debounce_window_is_suppressed() {
        let mut h = harness(&[true, true], 10_000);
        push_chunk(&h.ring);
        push_chunk(&h.ring);

        assert_eq!(h.watcher.step(), Step::Triggered);
        assert_eq!(h.watcher.step(), Step::Debounced);

        assert_eq!(h.events.try_recv().unwrap(), SessionEvent::WakeWord);
        assert!(h.events.try_recv().is_err());
    }

    /// With a zero debounce window every positive is a fresh utterance.
    #[test]
    fn zero_debounce_passes_every_trigger() {
        let mut h = harness(&[true, true], 0);
        push_chunk(&h.ring);
        push_chunk(&h.ring);

        assert_eq!(h.watcher.step(), Step::Triggered);
        assert_eq!(h.watcher.step(), Step::Triggered);
    }

    /// While streaming the watcher idles and leaves the ring alone.
    #[test]
    fn streaming_leaves_the_ring_to_the_session() {
        let mut h = harness(&[true], 20);
        h.flags.set_capture_enabled(true);
        push_chunk(&h.ring);

        assert_eq!(h.watcher.step(), Step::Idle);
        assert_eq!(h.ring.len(), 640);
        assert!(h.events.try_recv().is_err());
    }

    /// While muted the watcher discards buffered audio.
    #[test]
    fn muted_drains_stale_audio() {
        let mut h = harness(&[true], 20);
        h.flags.set_mic_muted(true);
        push_chunk(&h.ring);
        push_chunk(&h.ring);

        assert_eq!(h.watcher.step(), Step::Idle);
        assert!(h.ring.is_empty());
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn partial_chunk_is_quiet_not_a_trigger() {
        let mut h = harness(&[true], 20);
        // Half a detector chunk only.
        h.ring.write(&samples_to_bytes(&[100i16; 160]), None);
        assert_eq!(h.watcher.step(), Step::Quiet);
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn closed_and_drained_ring_stops_the_loop() {
        let mut h = harness(&[], 20);
        h.ring.close();
        assert_eq!(h.watcher.step(), Step::Closed);
    }

    /// Buffered audio is still scanned after close before the loop exits.
    #[test]
    fn scans_remaining_audio_before_exit() {
        let mut h = harness(&[true], 20);
        push_chunk(&h.ring);
        h.ring.close();

        assert_eq!(h.watcher.step(), Step::Triggered);
        assert_eq!(h.watcher.step(), Step::Closed);
    }
}
