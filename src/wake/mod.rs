//! Wake-word detection seam.
//!
//! The neural wake-word engine is an external collaborator: the pipeline
//! only needs [`WakeWordDetector`] — a chunk-at-a-time `detect` call plus
//! the two accessors it uses to size the resampled stream and its reads.
//!
//! [`EnergyDetector`] is the built-in implementation: an RMS-energy trigger
//! that fires after a run of consecutive loud chunks.  It is a deliberately
//! simple stand-in with the same interface shape as a neural engine, and it
//! is what the demo binary wires up.

use thiserror::Error;

/// Sample rate every detector in this pipeline consumes, in Hz.
pub const DETECT_SAMPLE_RATE: u32 = 16_000;

// ---------------------------------------------------------------------------
// WakeWordDetector trait
// ---------------------------------------------------------------------------

/// Chunk-oriented wake-word detector.
///
/// The watcher task owns its detector exclusively, so `detect` may keep
/// internal state behind `&mut self`.  Implementations must be `Send` to
/// cross onto the watcher thread.
///
/// # Contract
///
/// * `chunk_samples()` is the exact number of 16-bit mono samples every
///   `detect` call receives.
/// * `sample_rate()` is the rate those samples are delivered at.
/// * `detect` returns `true` on a positive trigger for this chunk.
pub trait WakeWordDetector: Send {
    /// Sample rate the detector expects, in Hz.
    fn sample_rate(&self) -> u32;

    /// Number of samples per `detect` call.
    fn chunk_samples(&self) -> usize;

    /// Run detection over one chunk.
    fn detect(&mut self, chunk: &[i16]) -> bool;
}

// ---------------------------------------------------------------------------
// DetectorError
// ---------------------------------------------------------------------------

/// Detector construction failures.
///
/// These are fatal: a pipeline without a working detector cannot be
/// brought up, so they surface from the builder before any task starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    #[error("detector chunk size must be > 0")]
    ZeroChunk,

    #[error("energy threshold must be in (0, 1], got {0}")]
    BadThreshold(f32),

    #[error("consecutive-chunk count must be > 0")]
    ZeroRun,
}

// ---------------------------------------------------------------------------
// EnergyDetector
// ---------------------------------------------------------------------------

/// RMS-energy wake trigger.
///
/// A chunk is "loud" when its RMS amplitude (normalized to `[0, 1]`)
/// exceeds the threshold; `run_length` consecutive loud chunks fire a
/// trigger and reset the run.
///
/// # Example
///
/// ```rust
/// use voicegate::wake::{EnergyDetector, WakeWordDetector};
///
/// let mut det = EnergyDetector::new(0.05, 320, 2).unwrap();
/// let loud = vec![8000i16; 320];
///
/// assert!(!det.detect(&loud)); // first loud chunk arms the run
/// assert!(det.detect(&loud));  // second one triggers
/// ```
#[derive(Debug)]
pub struct EnergyDetector {
    threshold: f32,
    chunk_samples: usize,
    run_length: u32,
    loud_run: u32,
}

impl EnergyDetector {
    /// Create a detector firing after `run_length` consecutive chunks whose
    /// normalized RMS exceeds `threshold`.
    pub fn new(threshold: f32, chunk_samples: usize, run_length: u32) -> Result<Self, DetectorError> {
        if chunk_samples == 0 {
            return Err(DetectorError::ZeroChunk);
        }
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(DetectorError::BadThreshold(threshold));
        }
        if run_length == 0 {
            return Err(DetectorError::ZeroRun);
        }
        Ok(Self {
            threshold,
            chunk_samples,
            run_length,
            loud_run: 0,
        })
    }

    /// Normalized RMS amplitude of `chunk` in `[0, 1]`.
    fn rms(chunk: &[i16]) -> f32 {
        if chunk.is_empty() {
            return 0.0;
        }
        let mean_sq: f64 = chunk
            .iter()
            .map(|&s| {
                let v = s as f64 / i16::MAX as f64;
                v * v
            })
            .sum::<f64>()
            / chunk.len() as f64;
        mean_sq.sqrt() as f32
    }
}

impl WakeWordDetector for EnergyDetector {
    fn sample_rate(&self) -> u32 {
        DETECT_SAMPLE_RATE
    }

    fn chunk_samples(&self) -> usize {
        self.chunk_samples
    }

    fn detect(&mut self, chunk: &[i16]) -> bool {
        if Self::rms(chunk) > self.threshold {
            self.loud_run += 1;
            if self.loud_run >= self.run_length {
                self.loud_run = 0;
                return true;
            }
        } else {
            self.loud_run = 0;
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
