//! Session state machine — the single consumer of the pipeline event queue.
//!
//! [`SessionStateMachine`] owns the `STOPPED`/`STREAMING`/`MUTED` state and
//! every legal transition.  All control paths (wake-word trigger, tap
//! button, upstream speech start/stop, mute toggle, power policy) funnel
//! through one bounded FIFO queue, so transitions are serialized by
//! construction: the machine processes exactly one [`SessionEvent`] at a
//! time.
//!
//! # The GET_AUDIO pull loop
//!
//! While `STREAMING`, the machine pulls one fixed chunk from the resampled
//! ring, forwards it to the upstream client, and re-enqueues `GetAudio` to
//! itself.  That self-transition turns the push-style hardware stream into
//! a pull-style delivery without an extra thread, and a STOP-class event
//! interleaves naturally between iterations.  A zero-length pull ends the
//! dialog turn: the machine returns to `STOPPED` and detection re-arms.
//!
//! ```text
//!          WakeWord/TapToTalk (dialog accepted), StartMic
//!   STOPPED ────────────────────────────────────────────▶ STREAMING ─┐
//!      ▲                 TapToTalk / StopMic / zero read             │ GetAudio
//!      └─────────────────────────────────────────────────────────────┘ (self)
//!      ▲ Unmute                                       Mute │
//!      └───────────────────────── MUTED ◀──────────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::audio::ByteRing;
use crate::config::SessionConfig;
use crate::persist::MuteStore;

use super::power::PowerPolicy;
use super::ControlFlags;

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// Commands accepted by the session state machine.
///
/// Events are copied by value into the bounded queue (depth
/// [`EVENT_QUEUE_DEPTH`](super::EVENT_QUEUE_DEPTH)) and processed in FIFO
/// order.  Any event not legal in the current state is logged and dropped
/// without a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The wake-word watcher detected the trigger phrase.
    WakeWord,
    /// User pressed the talk button: starts a dialog when stopped, ends the
    /// turn when already streaming.
    TapToTalk,
    /// Upstream client wants the mic open for a multi-turn continuation;
    /// capture starts unconditionally, with no dialog negotiation.
    StartMic,
    /// Upstream client is done listening.
    StopMic,
    /// One iteration of the streaming pull loop.
    GetAudio,
    /// Disable capture and detection until `Unmute`.
    Mute,
    /// Leave the muted state (back to idle-but-armed).
    Unmute,
    /// The power policy's idle timer expired.
    PowerSave,
    /// Exit the event loop (library teardown only).
    Shutdown,
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The three capture states.
///
/// Invariant: capture is enabled if and only if the state is `Streaming`,
/// and the mic is muted if and only if the state is `Muted`.  `Stopped`
/// means idle-but-armed — wake-word detection keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Idle; wake-word detection armed.  Initial state.
    #[default]
    Stopped,
    /// A dialog turn is open; audio flows to the upstream client.
    Streaming,
    /// Mic muted; everything but `Unmute`/`PowerSave` is ignored.
    Muted,
}

impl SessionState {
    /// A short human-readable label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Stopped => "STOPPED",
            SessionState::Streaming => "STREAMING",
            SessionState::Muted => "MUTED",
        }
    }
}

// ---------------------------------------------------------------------------
// TriggerKind / VoiceClient
// ---------------------------------------------------------------------------

/// Why a dialog turn is being opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// The wake word was detected in the audio stream.
    WakeWord,
    /// The user pressed the talk button.
    Tap,
}

/// Upstream voice-assistant client boundary.
///
/// Implementations must be `Send + Sync`; both callbacks are invoked from
/// the state machine task and should return promptly.
pub trait VoiceClient: Send + Sync {
    /// Ask the client to open a dialog turn.  Returning `false` refuses the
    /// dialog and the machine stays stopped.
    fn begin_dialog(&self, trigger: TriggerKind) -> bool;

    /// Deliver one chunk of 16 kHz mono PCM bytes for the current turn.
    fn on_audio_chunk(&self, chunk: &[u8]);
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Cloneable front door to the running state machine.
///
/// Every method enqueues one event; the machine applies its transition
/// table when the event is dequeued, so an ill-timed call is harmless (the
/// event is logged and dropped).
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Report a wake-word trigger (normally sent by the watcher task).
    pub async fn wake_word(&self) -> Result<(), super::PipelineError> {
        self.send(SessionEvent::WakeWord).await
    }

    /// Report a talk-button press.
    pub async fn tap_to_talk(&self) -> Result<(), super::PipelineError> {
        self.send(SessionEvent::TapToTalk).await
    }

    /// Open the mic for a multi-turn continuation.
    pub async fn start_mic(&self) -> Result<(), super::PipelineError> {
        self.send(SessionEvent::StartMic).await
    }

    /// Close the mic.
    pub async fn stop_mic(&self) -> Result<(), super::PipelineError> {
        self.send(SessionEvent::StopMic).await
    }

    /// Mute or unmute the mic.  The new state is persisted by the machine
    /// when the transition takes effect.
    pub async fn set_mute(&self, muted: bool) -> Result<(), super::PipelineError> {
        self.send(if muted {
            SessionEvent::Mute
        } else {
            SessionEvent::Unmute
        })
        .await
    }

    /// Ask the event loop to exit.
    pub async fn shutdown(&self) -> Result<(), super::PipelineError> {
        self.send(SessionEvent::Shutdown).await
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch channel for state transitions (e.g. `wait_for(Stopped)`).
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    async fn send(&self, event: SessionEvent) -> Result<(), super::PipelineError> {
        self.events
            .send(event)
            .await
            .map_err(|_| super::PipelineError::EventQueueClosed)
    }
}

// ---------------------------------------------------------------------------
// SessionStateMachine
// ---------------------------------------------------------------------------

/// Single-consumer dispatcher of the bounded event queue.
///
/// Constructed by the pipeline builder; [`run`](Self::run) is spawned as a
/// tokio task and returns the final state when a [`SessionEvent::Shutdown`]
/// arrives or every sender is gone.
pub struct SessionStateMachine {
    state: SessionState,
    events_rx: mpsc::Receiver<SessionEvent>,
    /// Sender kept for the GET_AUDIO self-transition.
    events_tx: mpsc::Sender<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
    resampled: Arc<ByteRing>,
    flags: Arc<ControlFlags>,
    client: Arc<dyn VoiceClient>,
    store: Arc<dyn MuteStore>,
    power: Option<Arc<PowerPolicy>>,
    config: SessionConfig,
}

impl SessionStateMachine {
    /// Build a machine starting in `initial` state.
    ///
    /// `initial` is `Muted` when the persisted boot flag says so, otherwise
    /// `Stopped`; the caller seeds `flags` to match before any producer
    /// task starts.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        initial: SessionState,
        events_rx: mpsc::Receiver<SessionEvent>,
        events_tx: mpsc::Sender<SessionEvent>,
        resampled: Arc<ByteRing>,
        flags: Arc<ControlFlags>,
        client: Arc<dyn VoiceClient>,
        store: Arc<dyn MuteStore>,
        power: Option<Arc<PowerPolicy>>,
        config: SessionConfig,
    ) -> (Self, SessionHandle) {
        let (state_tx, state_rx) = watch::channel(initial);
        let handle = SessionHandle {
            events: events_tx.clone(),
            state_rx,
        };
        let machine = Self {
            state: initial,
            events_rx,
            events_tx,
            state_tx,
            resampled,
            flags,
            client,
            store,
            power,
            config,
        };
        (machine, handle)
    }

    /// Process events until shutdown; returns the final state.
    pub async fn run(mut self) -> SessionState {
        log::info!("session: starting in {}", self.state.label());
        while let Some(event) = self.events_rx.recv().await {
            if event == SessionEvent::Shutdown {
                log::info!("session: shutdown requested in {}", self.state.label());
                break;
            }
            match self.state {
                SessionState::Stopped => self.on_stopped(event).await,
                SessionState::Streaming => self.on_streaming(event).await,
                SessionState::Muted => self.on_muted(event),
            }
        }
        self.state
    }

    // -----------------------------------------------------------------------
    // Per-state dispatch
    // -----------------------------------------------------------------------

    async fn on_stopped(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::WakeWord => self.open_dialog(TriggerKind::WakeWord).await,
            SessionEvent::TapToTalk => self.open_dialog(TriggerKind::Tap).await,
            SessionEvent::StartMic => {
                // Multi-turn continuation: no dialog negotiation.
                log::info!("session: opening mic for multi-turn conversation");
                self.start_streaming();
                self.enqueue_get_audio().await;
            }
            SessionEvent::Mute => self.mute_mic(),
            SessionEvent::PowerSave => {
                if let Some(power) = &self.power {
                    power.on_power_save(false);
                }
            }
            other => self.ignore(other),
        }
    }

    async fn on_streaming(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::GetAudio => self.pull_one_chunk().await,
            SessionEvent::TapToTalk | SessionEvent::StopMic => {
                log::info!("session: {event:?} ends the dialog turn");
                self.stop_streaming();
            }
            SessionEvent::Mute => self.mute_mic(),
            other => self.ignore(other),
        }
    }

    fn on_muted(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Unmute => self.unmute_mic(),
            SessionEvent::PowerSave => {
                if let Some(power) = &self.power {
                    power.on_power_save(true);
                }
            }
            other => self.ignore(other),
        }
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Negotiate a new dialog turn with the upstream client.
    async fn open_dialog(&mut self, trigger: TriggerKind) {
        if let Some(power) = &self.power {
            power.dialog_starting();
        }
        if self.client.begin_dialog(trigger) {
            log::info!("session: dialog opened ({trigger:?})");
            self.start_streaming();
            self.enqueue_get_audio().await;
        } else {
            log::warn!("session: client refused dialog ({trigger:?}), staying stopped");
            if let Some(power) = &self.power {
                power.dialog_refused();
            }
        }
    }

    /// One iteration of the streaming pull loop.
    async fn pull_one_chunk(&mut self) {
        let ring = Arc::clone(&self.resampled);
        let chunk_bytes = self.config.pull_chunk_bytes;
        let timeout = self.config.pull_timeout();

        let pulled = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; chunk_bytes];
            let n = ring.read(&mut buf, Some(timeout));
            buf.truncate(n);
            buf
        })
        .await;

        match pulled {
            Ok(chunk) if !chunk.is_empty() => {
                self.client.on_audio_chunk(&chunk);
                self.enqueue_get_audio().await;
            }
            Ok(_) => {
                // Zero-length read: upstream stream ended or stalled past
                // the pull timeout.  Recover by ending the turn.
                log::info!("session: audio stream ended, stopping capture");
                self.stop_streaming();
            }
            Err(e) => {
                log::error!("session: audio pull task failed: {e}");
                self.stop_streaming();
            }
        }
    }

    fn start_streaming(&mut self) {
        self.flags.set_capture_enabled(true);
        self.set_state(SessionState::Streaming);
    }

    fn stop_streaming(&mut self) {
        self.flags.set_capture_enabled(false);
        self.set_state(SessionState::Stopped);
    }

    fn mute_mic(&mut self) {
        self.flags.set_capture_enabled(false);
        self.flags.set_mic_muted(true);
        self.persist_mute(true);
        self.set_state(SessionState::Muted);
    }

    fn unmute_mic(&mut self) {
        self.flags.set_mic_muted(false);
        self.persist_mute(false);
        self.set_state(SessionState::Stopped);
    }

    fn persist_mute(&self, muted: bool) {
        // Storage failures are logged, never surfaced: losing the boot flag
        // must not take down a live capture session.
        if let Err(e) = self.store.save_mute_state(muted) {
            log::warn!("session: failed to persist mute={muted}: {e}");
        }
    }

    async fn enqueue_get_audio(&self) {
        if self.events_tx.send(SessionEvent::GetAudio).await.is_err() {
            log::error!("session: event queue closed while streaming");
        }
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            log::debug!("session: {} → {}", self.state.label(), next.label());
        }
        self.state = next;
        let _ = self.state_tx.send(next);
    }

    fn ignore(&self, event: SessionEvent) {
        log::info!(
            "session: event {event:?} unsupported in {} state",
            self.state.label()
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::PersistError;
    use crate::pipeline::EVENT_QUEUE_DEPTH;
    use std::sync::Mutex;
    use std::time::Duration;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Records every callback; `accept` controls dialog negotiation.
    struct RecordingClient {
        accept: bool,
        opens: Mutex<Vec<TriggerKind>>,
        chunks: Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingClient {
        fn new(accept: bool) -> Arc<Self> {
            Arc::new(Self {
                accept,
                opens: Mutex::new(Vec::new()),
                chunks: Mutex::new(Vec::new()),
            })
        }

        fn opens(&self) -> Vec<TriggerKind> {
            self.opens.lock().unwrap().clone()
        }

        fn chunk_count(&self) -> usize {
            self.chunks.lock().unwrap().len()
        }
    }

    impl VoiceClient for RecordingClient {
        fn begin_dialog(&self, trigger: TriggerKind) -> bool {
            self.opens.lock().unwrap().push(trigger);
            self.accept
        }

        fn on_audio_chunk(&self, chunk: &[u8]) {
            self.chunks.lock().unwrap().push(chunk.to_vec());
        }
    }

    /// In-memory mute store that records every save.
    struct MemStore {
        saved: Mutex<Vec<bool>>,
    }

    impl MemStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                saved: Mutex::new(Vec::new()),
            })
        }

        fn saves(&self) -> Vec<bool> {
            self.saved.lock().unwrap().clone()
        }
    }

    impl MuteStore for MemStore {
        fn load_mute_state(&self) -> Result<bool, PersistError> {
            Ok(self.saved.lock().unwrap().last().copied().unwrap_or(false))
        }

        fn save_mute_state(&self, muted: bool) -> Result<(), PersistError> {
            self.saved.lock().unwrap().push(muted);
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Harness
    // -----------------------------------------------------------------------

    struct Harness {
        machine: SessionStateMachine,
        handle: SessionHandle,
        client: Arc<RecordingClient>,
        store: Arc<MemStore>,
        flags: Arc<ControlFlags>,
        ring: Arc<ByteRing>,
    }

    fn harness(initial: SessionState, accept: bool) -> Harness {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let ring = Arc::new(ByteRing::new(4096));
        let flags = Arc::new(ControlFlags::new(initial == SessionState::Muted));
        let client = RecordingClient::new(accept);
        let store = MemStore::new();

        let config = SessionConfig {
            pull_chunk_bytes: 320,
            pull_timeout_ms: 50, // keep the zero-read path fast in tests
            mute_idle_ms: 10,
        };

        let (machine, handle) = SessionStateMachine::new(
            initial,
            rx,
            tx,
            Arc::clone(&ring),
            Arc::clone(&flags),
            client.clone() as Arc<dyn VoiceClient>,
            store.clone() as Arc<dyn MuteStore>,
            None,
            config,
        );

        Harness {
            machine,
            handle,
            client,
            store,
            flags,
            ring,
        }
    }

    /// Wait until the watch channel reports `target`.
    async fn wait_for_state(rx: &mut watch::Receiver<SessionState>, target: SessionState) {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == target))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
    }

    // -----------------------------------------------------------------------
    // Transition table
    // -----------------------------------------------------------------------

    /// MUTE twice in a row: one save, state stays MUTED, flags unchanged.
    #[tokio::test]
    async fn mute_is_idempotent() {
        let h = harness(SessionState::Stopped, true);
        h.handle.set_mute(true).await.unwrap();
        h.handle.set_mute(true).await.unwrap();
        h.handle.shutdown().await.unwrap();

        let final_state = h.machine.run().await;
        assert_eq!(final_state, SessionState::Muted);
        assert!(h.flags.mic_muted());
        assert!(!h.flags.capture_enabled());
        // The second MUTE was illegal in MUTED and caused no second save.
        assert_eq!(h.store.saves(), vec![true]);
    }

    /// STOP_MIC while already stopped: logged, dropped, nothing changes.
    #[tokio::test]
    async fn stop_mic_in_stopped_is_a_no_op() {
        let h = harness(SessionState::Stopped, true);
        h.handle.stop_mic().await.unwrap();
        h.handle.shutdown().await.unwrap();

        let final_state = h.machine.run().await;
        assert_eq!(final_state, SessionState::Stopped);
        assert!(!h.flags.capture_enabled());
        assert!(!h.flags.mic_muted());
        assert!(h.store.saves().is_empty());
        assert_eq!(h.client.chunk_count(), 0);
    }

    /// N buffered chunks then end-of-stream: exactly N deliveries, then
    /// STOPPED.
    #[tokio::test]
    async fn pull_loop_delivers_all_chunks_then_stops() {
        let h = harness(SessionState::Stopped, true);

        // Three full pull chunks, then close the ring (end of stream).
        h.ring.write(&vec![7u8; 320 * 3], None);
        h.ring.close();

        let mut states = h.handle.state_watch();
        let handle = h.handle.clone();
        let task = tokio::spawn(h.machine.run());

        handle.start_mic().await.unwrap();
        wait_for_state(&mut states, SessionState::Streaming).await;
        wait_for_state(&mut states, SessionState::Stopped).await;
        handle.shutdown().await.unwrap();

        assert_eq!(task.await.unwrap(), SessionState::Stopped);
        assert_eq!(h.client.chunk_count(), 3);
        assert!(!h.flags.capture_enabled());
        // StartMic never negotiates a dialog.
        assert!(h.client.opens().is_empty());
    }

    /// A pull that times out with no data is a transient stream error:
    /// recover to STOPPED, never crash.
    #[tokio::test]
    async fn pull_timeout_ends_the_turn() {
        let h = harness(SessionState::Stopped, true);
        // Ring left empty and open: the pull must hit its timeout.

        let mut states = h.handle.state_watch();
        let handle = h.handle.clone();
        let task = tokio::spawn(h.machine.run());

        handle.start_mic().await.unwrap();
        wait_for_state(&mut states, SessionState::Streaming).await;
        wait_for_state(&mut states, SessionState::Stopped).await;
        handle.shutdown().await.unwrap();

        assert_eq!(task.await.unwrap(), SessionState::Stopped);
        assert_eq!(h.client.chunk_count(), 0);
    }

    /// WAKE_WORD in STOPPED opens a dialog and enters the pull loop.
    #[tokio::test]
    async fn wake_word_opens_dialog_and_streams() {
        let h = harness(SessionState::Stopped, true);
        h.ring.write(&vec![1u8; 320], None);
        h.ring.close();

        let mut states = h.handle.state_watch();
        let handle = h.handle.clone();
        let task = tokio::spawn(h.machine.run());

        handle.wake_word().await.unwrap();
        wait_for_state(&mut states, SessionState::Streaming).await;
        wait_for_state(&mut states, SessionState::Stopped).await;
        handle.shutdown().await.unwrap();

        assert_eq!(task.await.unwrap(), SessionState::Stopped);
        assert_eq!(h.client.opens(), vec![TriggerKind::WakeWord]);
        assert_eq!(h.client.chunk_count(), 1);
    }

    /// A refused dialog keeps the machine stopped and pulls nothing.
    #[tokio::test]
    async fn refused_dialog_stays_stopped() {
        let h = harness(SessionState::Stopped, false);
        h.handle.tap_to_talk().await.unwrap();
        h.handle.shutdown().await.unwrap();

        let final_state = h.machine.run().await;
        assert_eq!(final_state, SessionState::Stopped);
        assert_eq!(h.client.opens(), vec![TriggerKind::Tap]);
        assert_eq!(h.client.chunk_count(), 0);
        assert!(!h.flags.capture_enabled());
    }

    /// TAP_TO_TALK while streaming ends the turn.
    #[tokio::test]
    async fn tap_to_talk_while_streaming_stops() {
        let h = harness(SessionState::Stopped, true);
        h.ring.write(&vec![1u8; 3200], None);

        // Queue order: StartMic → TapToTalk → Shutdown.  The GetAudio that
        // StartMic enqueues lands behind TapToTalk, so the turn ends before
        // any chunk is pulled.
        h.handle.start_mic().await.unwrap();
        h.handle.tap_to_talk().await.unwrap();
        h.handle.shutdown().await.unwrap();

        let final_state = h.machine.run().await;
        assert_eq!(final_state, SessionState::Stopped);
        assert_eq!(h.client.chunk_count(), 0);
        assert!(!h.flags.capture_enabled());
    }

    /// MUTE while streaming stops capture and persists the flag.
    #[tokio::test]
    async fn mute_while_streaming_goes_muted() {
        let h = harness(SessionState::Stopped, true);
        h.ring.write(&vec![1u8; 3200], None);

        h.handle.start_mic().await.unwrap();
        h.handle.set_mute(true).await.unwrap();
        h.handle.shutdown().await.unwrap();

        let final_state = h.machine.run().await;
        assert_eq!(final_state, SessionState::Muted);
        assert!(h.flags.mic_muted());
        assert!(!h.flags.capture_enabled());
        assert_eq!(h.store.saves(), vec![true]);
    }

    /// Booting muted: concurrent wake events are ignored per the MUTED row.
    #[tokio::test]
    async fn boot_muted_ignores_wake_word() {
        let h = harness(SessionState::Muted, true);
        assert!(h.flags.mic_muted());

        h.handle.wake_word().await.unwrap();
        h.handle.tap_to_talk().await.unwrap();
        h.handle.start_mic().await.unwrap();
        h.handle.shutdown().await.unwrap();

        let final_state = h.machine.run().await;
        assert_eq!(final_state, SessionState::Muted);
        assert!(h.client.opens().is_empty());
        assert_eq!(h.client.chunk_count(), 0);
        assert!(!h.flags.capture_enabled());
    }

    /// UNMUTE returns to idle-but-armed and persists the flag.
    #[tokio::test]
    async fn unmute_returns_to_stopped() {
        let h = harness(SessionState::Muted, true);
        h.handle.set_mute(false).await.unwrap();
        h.handle.shutdown().await.unwrap();

        let final_state = h.machine.run().await;
        assert_eq!(final_state, SessionState::Stopped);
        assert!(!h.flags.mic_muted());
        assert_eq!(h.store.saves(), vec![false]);
    }

    /// The handle reports state through the watch channel.
    #[tokio::test]
    async fn handle_observes_state_transitions() {
        let h = harness(SessionState::Stopped, true);
        assert_eq!(h.handle.state(), SessionState::Stopped);

        let mut states = h.handle.state_watch();
        let handle = h.handle.clone();
        let task = tokio::spawn(h.machine.run());

        handle.set_mute(true).await.unwrap();
        wait_for_state(&mut states, SessionState::Muted).await;
        assert_eq!(handle.state(), SessionState::Muted);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
