//! Audio side of A/V sync
//!
//! Audio output itself is owned by the embedding application. This module
//! defines what the sync engine needs from it, a shared atomic audio clock
//! that implements those needs, and the drift corrector that keeps the
//! audio resampler (or passthrough burst size) locked to wall time.

mod clock;
mod drift;

pub use clock::SharedAudioClock;
pub use drift::{
    correction_for_drift, Compensation, DriftCorrector, DriftUpdate, PassthroughCodec,
    DRIFT_MIN_SPAN_TICKS, DRIFT_RESET_TICKS, MAX_BURST_ADJUST_BYTES, MAX_CORRECTION,
};

use crate::utils::error::Result;

/// Audio subsystem as seen by the sync engine
///
/// All times are 90 kHz ticks.
pub trait AudioSubsystem: Send + Sync {
    /// Presentation time of the audio currently being played, if known
    fn clock(&self) -> Option<i64>;

    /// Delay between the audio clock and the speaker
    fn output_delay(&self) -> i64;

    /// Ask the audio path to insert `ms` milliseconds of extra output delay
    ///
    /// Used when video is behind but too few frames are buffered to drop one.
    fn request_output_delay(&self, ms: u32);

    /// The video clock of a stream became known
    ///
    /// Called once per stream, from the producer context.
    fn notify_video_clock_established(&self, pts: i64);
}

/// Resampler sample-rate compensation input
pub trait ResampleCompensator {
    /// Stretch (positive) or shrink (negative) the output by `sample_delta`
    /// samples, spread over `distance` samples
    fn set_compensation(&mut self, sample_delta: i32, distance: i32) -> Result<()>;
}
