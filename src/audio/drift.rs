//! Audio clock drift correction
//!
//! The sound card clock and the wall clock run at slightly different
//! rates. Once per received audio timestamp the corrector compares how far
//! wall time and audio presentation time advanced since a baseline, and
//! turns the difference into a small, clamped resampler compensation.
//! Passthrough audio bypasses the resampler, so AC-3 bursts get their size
//! nudged by a few sample words instead.

use crate::audio::ResampleCompensator;
use crate::utils::config::{AudioConfig, DriftCorrection};
use crate::utils::error::Result;
use std::time::Instant;

/// Audio timestamps must advance this far past the baseline (~111 ms)
/// before drift is measured
pub const DRIFT_MIN_SPAN_TICKS: i64 = 10_000;

/// Measured drift beyond this (~11 ms) is a discontinuity, not drift
pub const DRIFT_RESET_TICKS: i64 = 1_000;

/// Correction clamp, in tenths of a sample
pub const MAX_CORRECTION: i32 = 20_000;

/// Corrections below this are spread over a tenth of the measured span
const SMALL_CORRECTION: i32 = 2_000;

/// Bound on the per-burst passthrough size adjustment
pub const MAX_BURST_ADJUST_BYTES: i32 = 64;

/// Compressed audio formats forwarded to an external receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughCodec {
    Ac3,
    Eac3,
    Dts,
}

/// Resampler compensation derived from one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compensation {
    /// Clamped correction in tenths of a sample
    pub correction: i32,

    /// Samples to add (positive) or remove (negative)
    pub sample_delta: i32,

    /// Samples over which the delta is spread
    pub distance: i32,
}

/// What one audio timestamp did to the corrector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftUpdate {
    /// Correction is disabled, or no output delay is known yet
    Skipped,

    /// A new baseline was recorded
    Baseline,

    /// Not enough audio since the baseline to measure
    Collecting,

    /// The measured drift was a discontinuity; the baseline was reset
    Reset { drift: i64 },

    /// A new compensation was derived
    Corrected(Compensation),
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    at: Instant,
    pts: i64,
    delay: i64,
}

/// Clamped correction for `drift` ticks of accumulated drift
///
/// Positive drift means wall time ran ahead of the audio clock, so output
/// must shrink and the correction is negative.
pub fn correction_for_drift(drift: i64, sample_rate: u32) -> i32 {
    let corr = (10 * sample_rate as i128 * drift as i128) / 90_000;
    (-corr).clamp(-(MAX_CORRECTION as i128), MAX_CORRECTION as i128) as i32
}

/// Drift corrector for one audio output
#[derive(Debug, Clone)]
pub struct DriftCorrector {
    mode: DriftCorrection,
    sample_rate: u32,
    channels: u16,
    baseline: Option<Baseline>,
    drift: i64,
    correction: i32,
    burst_frac: i64,
}

impl DriftCorrector {
    /// Create a corrector for the given output format
    pub fn new(mode: DriftCorrection, sample_rate: u32, channels: u16) -> Self {
        Self {
            mode,
            sample_rate,
            channels,
            baseline: None,
            drift: 0,
            correction: 0,
            burst_frac: 0,
        }
    }

    /// Create a corrector from the audio configuration
    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(config.drift_correction, config.sample_rate, config.channels)
    }

    /// Drift accumulated over all measured intervals, in ticks
    pub fn drift(&self) -> i64 {
        self.drift
    }

    /// Current clamped correction, in tenths of a sample
    pub fn correction(&self) -> i32 {
        self.correction
    }

    /// Forget the baseline (audio clock reset, seek)
    pub fn reset(&mut self) {
        self.baseline = None;
        self.drift = 0;
        self.correction = 0;
        self.burst_frac = 0;
    }

    /// Fold one audio timestamp into the measurement
    ///
    /// `now` is the wall time the timestamp was received, `pts` the audio
    /// presentation time and `delay` the current audio output delay, both
    /// in ticks. Every measurement covers only the interval since the
    /// previous one and becomes the next baseline; the correction follows
    /// the drift summed over all intervals.
    pub fn update(&mut self, now: Instant, pts: i64, delay: i64) -> DriftUpdate {
        if self.mode == DriftCorrection::None || delay == 0 {
            return DriftUpdate::Skipped;
        }

        let base = match self.baseline {
            Some(base) => base,
            None => {
                self.baseline = Some(Baseline { at: now, pts, delay });
                return DriftUpdate::Baseline;
            }
        };

        let pts_span = pts - base.pts;
        if pts_span < 0 {
            log::debug!("Audio pts went back by {} ticks, new drift baseline", -pts_span);
            self.baseline = Some(Baseline { at: now, pts, delay });
            return DriftUpdate::Baseline;
        }
        if pts_span < DRIFT_MIN_SPAN_TICKS {
            return DriftUpdate::Collecting;
        }

        let elapsed = now.saturating_duration_since(base.at).as_nanos() as i64 * 90 / 1_000_000;
        let drift = elapsed - pts_span + delay - base.delay;
        self.baseline = Some(Baseline { at: now, pts, delay });

        if drift.abs() > DRIFT_RESET_TICKS {
            log::warn!(
                "Audio drift {} ticks over {} ticks is a discontinuity, resetting",
                drift,
                pts_span
            );
            return DriftUpdate::Reset { drift };
        }

        self.drift = self.drift.saturating_add(drift);
        self.correction = correction_for_drift(self.drift, self.sample_rate);

        let span_samples = pts_span * self.sample_rate as i64 / 90_000;
        let distance = if self.correction.abs() < SMALL_CORRECTION {
            span_samples / 10
        } else {
            span_samples
        };

        let compensation = Compensation {
            correction: self.correction,
            sample_delta: self.correction / 10,
            distance: distance.clamp(1, i32::MAX as i64) as i32,
        };
        log::debug!(
            "Audio drift {} ticks ({} accumulated), correction {} over {} samples",
            drift,
            self.drift,
            compensation.correction,
            compensation.distance
        );
        DriftUpdate::Corrected(compensation)
    }

    /// Feed a compensation into the resampler, if PCM correction is enabled
    pub fn apply(&self, compensation: &Compensation, resampler: &mut dyn ResampleCompensator) -> Result<()> {
        if !self.mode.corrects_pcm() {
            return Ok(());
        }
        resampler.set_compensation(compensation.sample_delta, compensation.distance)
    }

    /// Byte adjustment for the next passthrough burst of `burst_len` bytes
    ///
    /// Only AC-3 bursts are adjusted. The fraction of a sample word that
    /// does not fit into this burst carries over to the next one.
    pub fn burst_adjust(&mut self, codec: PassthroughCodec, burst_len: usize) -> i32 {
        if codec != PassthroughCodec::Ac3 || !self.mode.corrects_passthrough() {
            return 0;
        }

        let denom = 10 * self.sample_rate as i64 * 100;
        let acc = self.burst_frac + self.correction as i64 * burst_len as i64;
        let words = acc / denom;
        self.burst_frac = acc % denom;

        // A sample word is 16 bits per channel.
        let bytes = words * 2 * self.channels as i64;
        bytes.clamp(-(MAX_BURST_ADJUST_BYTES as i64), MAX_BURST_ADJUST_BYTES as i64) as i32
    }
}
