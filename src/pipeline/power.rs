//! Optional low-power policy.
//!
//! A single-shot idle timer watches playback activity: every call to
//! [`PowerPolicy::playback_starting`] pushes the deadline back, and when
//! the quiet period elapses the policy raises [`SessionEvent::PowerSave`]
//! on the session queue.  The state machine decides what that means in its
//! current state (enter low power when stopped, skip the codec work when
//! muted, ignore it while streaming).
//!
//! Leaving low power is driven by playback too: the first playback after
//! boot performs a one-time clock reconfiguration, and any playback that
//! follows a low-power period re-initializes echo cancellation before the
//! speaker opens.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::session::SessionEvent;

// ---------------------------------------------------------------------------
// PowerDriver
// ---------------------------------------------------------------------------

/// Hardware hooks behind the power policy.
///
/// The library only decides *when*; implementations own the actual codec
/// and clock plumbing.  All hooks are called from the policy timer task or
/// the session task and should not block for long.
pub trait PowerDriver: Send + Sync {
    /// Put the capture front end into its low-power mode.
    fn enter_low_power(&self);

    /// Re-initialize echo cancellation after a low-power period.
    fn aec_init(&self);

    /// One-time clock/pin reconfiguration on the first playback after boot.
    fn request_clock_switch(&self);
}

// ---------------------------------------------------------------------------
// PowerPolicy
// ---------------------------------------------------------------------------

/// Idle-timer power policy.  Created by the pipeline builder when the
/// `[power]` config section is enabled.
pub struct PowerPolicy {
    driver: Arc<dyn PowerDriver>,
    /// Nudges the timer task; each message resets the deadline.
    reset_tx: mpsc::Sender<()>,
    /// Set while a low-power period is pending AEC repair at next playback.
    aec_pending: AtomicBool,
    /// Cleared by the first playback after boot.
    first_playback: AtomicBool,
}

impl PowerPolicy {
    /// Spawn the timer task and return the shared policy.
    ///
    /// The timer starts unarmed; the first [`playback_starting`]
    /// (Self::playback_starting) call arms it.
    pub(crate) fn spawn(
        driver: Arc<dyn PowerDriver>,
        idle: Duration,
        events: mpsc::Sender<SessionEvent>,
    ) -> Arc<Self> {
        let (reset_tx, reset_rx) = mpsc::channel::<()>(4);
        tokio::spawn(timer_task(idle, reset_rx, events));
        Arc::new(Self {
            driver,
            reset_tx,
            aec_pending: AtomicBool::new(true),
            first_playback: AtomicBool::new(true),
        })
    }

    /// Note playback activity: wake the hardware if needed and push the
    /// idle deadline back.
    pub fn playback_starting(&self) {
        if self.first_playback.swap(false, Ordering::SeqCst) {
            log::info!("power: first playback, switching audio clocks");
            self.driver.request_clock_switch();
        }
        if self.aec_pending.swap(false, Ordering::SeqCst) {
            log::info!("power: re-initializing AEC after low-power period");
            self.driver.aec_init();
        }
        // try_send: a full nudge channel already has a pending reset.
        let _ = self.reset_tx.try_send(());
    }

    /// Session accepted a dialog; the hardware is demonstrably awake, so no
    /// AEC repair is owed at the next playback.
    pub(crate) fn dialog_starting(&self) {
        self.aec_pending.store(false, Ordering::SeqCst);
    }

    /// Dialog was refused; restore the pending repair.
    pub(crate) fn dialog_refused(&self) {
        self.aec_pending.store(true, Ordering::SeqCst);
    }

    /// The session observed the idle expiry in a state where low power is
    /// legal.  `muted` skips the codec call (the front end is already off).
    pub(crate) fn on_power_save(&self, muted: bool) {
        if !muted {
            log::info!("power: entering low-power capture mode");
            self.driver.enter_low_power();
        } else {
            log::info!("power: idle while muted, codec already quiesced");
        }
        self.aec_pending.store(true, Ordering::SeqCst);
        self.first_playback.store(true, Ordering::SeqCst);
    }
}

/// Single-shot timer: armed by a nudge, fires once per quiet period.
async fn timer_task(
    idle: Duration,
    mut reset_rx: mpsc::Receiver<()>,
    events: mpsc::Sender<SessionEvent>,
) {
    let mut armed = false;
    loop {
        if armed {
            tokio::select! {
                _ = tokio::time::sleep(idle) => {
                    armed = false;
                    if events.send(SessionEvent::PowerSave).await.is_err() {
                        return;
                    }
                }
                nudge = reset_rx.recv() => {
                    if nudge.is_none() {
                        return;
                    }
                    // Deadline pushed back; loop re-enters the sleep.
                }
            }
        } else {
            match reset_rx.recv().await {
                Some(()) => armed = true,
                None => return,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
