//! Sample-rate conversion and channel downmix for 16-bit PCM.
//!
//! The wake-word detector consumes **16 kHz mono `i16`** audio.  Native
//! capture hardware usually delivers something else (48 kHz stereo is
//! common), so the resampler task converts every chunk in two steps:
//!
//! 1. [`ResampleContext::process`] — rate conversion, interleaved frames.
//! 2. [`downmix_to_mono`] — average all channels, applied *after* the rate
//!    conversion.
//!
//! [`ResampleContext`] carries its interpolation phase and the previous
//! input frame across calls, so feeding a stream in 20 ms chunks produces
//! bit-identical output to feeding it in one piece.  That determinism is
//! what the pipeline's tests are built on.

// ---------------------------------------------------------------------------
// ResampleContext
// ---------------------------------------------------------------------------

/// Stateful linear-interpolation resampler over interleaved `i16` frames.
///
/// One instance belongs to exactly one stream; it is mutated only by the
/// resampler task and never shared.
///
/// # Example
///
/// ```rust
/// use voicegate::audio::ResampleContext;
///
/// // 48 kHz mono → 16 kHz mono: 480 samples (10 ms) become 160.
/// let mut ctx = ResampleContext::new(48_000, 16_000, 1).unwrap();
/// let input = vec![0i16; 480];
/// let mut out = Vec::new();
/// ctx.process(&input, &mut out);
/// assert_eq!(out.len(), 160);
/// assert!(out.iter().all(|&s| s == 0));
/// ```
#[derive(Debug)]
pub struct ResampleContext {
    src_rate: u32,
    dst_rate: u32,
    channels: u16,
    /// Fractional read position, in source frames, relative to the start of
    /// the *next* input chunk.  Negative positions fall into `prev_frame`.
    pos: f64,
    /// Last frame of the previous chunk, for interpolation across the seam.
    prev_frame: Option<Vec<i16>>,
}

/// Parameter error raised by [`ResampleContext::new`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResampleError {
    #[error("sample rates must be non-zero (src={src}, dst={dst})")]
    ZeroRate { src: u32, dst: u32 },

    #[error("channel count must be non-zero")]
    ZeroChannels,
}

impl ResampleContext {
    /// Create a context converting `src_rate` Hz to `dst_rate` Hz with
    /// `channels` interleaved channels.
    pub fn new(src_rate: u32, dst_rate: u32, channels: u16) -> Result<Self, ResampleError> {
        if src_rate == 0 || dst_rate == 0 {
            return Err(ResampleError::ZeroRate {
                src: src_rate,
                dst: dst_rate,
            });
        }
        if channels == 0 {
            return Err(ResampleError::ZeroChannels);
        }
        Ok(Self {
            src_rate,
            dst_rate,
            channels,
            pos: 0.0,
            prev_frame: None,
        })
    }

    /// Source sample rate in Hz.
    pub fn src_rate(&self) -> u32 {
        self.src_rate
    }

    /// Target sample rate in Hz.
    pub fn dst_rate(&self) -> u32 {
        self.dst_rate
    }

    /// Number of interleaved channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Drop all carried phase state, as if the stream had just started.
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.prev_frame = None;
    }

    /// Convert `input` (interleaved, `channels` wide) and append the
    /// converted frames to `out`.
    ///
    /// Identity conversions are passed through untouched.  `input` length
    /// must be a whole number of frames; a trailing partial frame is
    /// ignored.
    pub fn process(&mut self, input: &[i16], out: &mut Vec<i16>) {
        let ch = self.channels as usize;
        let frames = input.len() / ch;
        if frames == 0 {
            return;
        }

        if self.src_rate == self.dst_rate {
            out.extend_from_slice(&input[..frames * ch]);
            return;
        }

        // Source frames advance by `step` per output frame.
        let step = self.src_rate as f64 / self.dst_rate as f64;

        let frame_at = |idx: isize, c: usize| -> i16 {
            if idx < 0 {
                match &self.prev_frame {
                    Some(f) => f[c],
                    None => input[c], // stream start: clamp to first frame
                }
            } else {
                input[idx as usize * ch + c]
            }
        };

        // Emit every output frame whose interpolation window lies within
        // [prev_frame, last input frame].
        while self.pos <= (frames - 1) as f64 {
            let base = self.pos.floor();
            let frac = self.pos - base;
            let i0 = base as isize;
            let i1 = i0 + 1;

            for c in 0..ch {
                let a = frame_at(i0, c) as f64;
                let b = if i1 as usize >= frames {
                    a // clamp at the chunk edge; next call re-reads via prev_frame
                } else {
                    frame_at(i1, c) as f64
                };
                let v = a + (b - a) * frac;
                out.push(v.round() as i16);
            }
            self.pos += step;
        }

        // Carry the seam: remember the last input frame and rebase the
        // position so it is relative to the next chunk.
        self.prev_frame = Some(input[(frames - 1) * ch..frames * ch].to_vec());
        self.pos -= frames as f64;
    }
}

// ---------------------------------------------------------------------------
// downmix_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging channels.
///
/// The output length is `samples.len() / channels`.  Mono input is returned
/// as an owned copy (fast path, no arithmetic); `channels == 0` yields an
/// empty vector.
///
/// # Example
///
/// ```rust
/// use voicegate::audio::downmix_to_mono;
///
/// let stereo = vec![100i16, -100, 40, -40]; // L R L R
/// let mono = downmix_to_mono(&stereo, 2);
/// assert_eq!(mono, vec![0, 0]);
/// ```
pub fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / n as i32) as i16
                })
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// PCM byte helpers
// ---------------------------------------------------------------------------

/// Reinterpret little-endian PCM bytes as `i16` samples.
///
/// A trailing odd byte is ignored.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Serialize `i16` samples as little-endian PCM bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
