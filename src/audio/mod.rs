//! Audio plumbing — blocking ring buffers, capture drivers, resampling.
//!
//! # Data flow
//!
//! ```text
//! hardware → CaptureSink → ByteRing (raw) → ResampleContext/downmix
//!          → ByteRing (resampled, 16 kHz mono) → wake watcher / session pull
//! ```

pub mod buffer;
pub mod capture;
pub mod resample;

pub use buffer::ByteRing;
pub use capture::{CaptureDriver, CaptureError, CaptureSink, CpalCaptureDriver};
pub use resample::{
    bytes_to_samples, downmix_to_mono, samples_to_bytes, ResampleContext, ResampleError,
};
