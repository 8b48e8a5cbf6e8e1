//! Lock-free audio clock shared between the audio and display contexts

use crate::audio::AudioSubsystem;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

const NO_PTS: i64 = i64::MIN;

/// Audio clock fed by the audio output path
///
/// The audio context stores the presentation time of what it is playing;
/// the sync engine reads it every display tick. Output delay requests are
/// collected here until the audio path picks them up.
pub struct SharedAudioClock {
    pts: AtomicI64,
    output_delay: AtomicI64,
    requested_delay_ms: AtomicU32,
    delay_requests: AtomicU64,
    video_start: AtomicI64,
}

impl SharedAudioClock {
    /// Create a clock with no known time
    pub fn new() -> Self {
        Self {
            pts: AtomicI64::new(NO_PTS),
            output_delay: AtomicI64::new(0),
            requested_delay_ms: AtomicU32::new(0),
            delay_requests: AtomicU64::new(0),
            video_start: AtomicI64::new(NO_PTS),
        }
    }

    /// Set the presentation time of the audio being played
    pub fn set_pts(&self, pts: i64) {
        self.pts.store(pts, Ordering::Release);
    }

    /// Move the clock forward by `ticks`; no-op while unknown
    pub fn advance(&self, ticks: i64) {
        let _ = self
            .pts
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pts| {
                (pts != NO_PTS).then(|| pts + ticks)
            });
    }

    /// Set the delay between the clock and the speaker
    pub fn set_output_delay(&self, ticks: i64) {
        self.output_delay.store(ticks, Ordering::Relaxed);
    }

    /// Take the pending output delay request, in milliseconds
    ///
    /// Several requests made between two calls collapse into the largest.
    pub fn take_requested_delay(&self) -> Option<u32> {
        match self.requested_delay_ms.swap(0, Ordering::AcqRel) {
            0 => None,
            ms => Some(ms),
        }
    }

    /// Number of output delay requests received so far
    pub fn delay_requests(&self) -> u64 {
        self.delay_requests.load(Ordering::Relaxed)
    }

    /// First video timestamp reported by the display side
    pub fn video_start(&self) -> Option<i64> {
        match self.video_start.load(Ordering::Acquire) {
            NO_PTS => None,
            pts => Some(pts),
        }
    }

    /// Forget the current time (seek, channel change)
    pub fn reset(&self) {
        self.pts.store(NO_PTS, Ordering::Release);
        self.video_start.store(NO_PTS, Ordering::Release);
        self.requested_delay_ms.store(0, Ordering::Release);
    }
}

impl Default for SharedAudioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSubsystem for SharedAudioClock {
    fn clock(&self) -> Option<i64> {
        match self.pts.load(Ordering::Acquire) {
            NO_PTS => None,
            pts => Some(pts),
        }
    }

    fn output_delay(&self) -> i64 {
        self.output_delay.load(Ordering::Relaxed)
    }

    fn request_output_delay(&self, ms: u32) {
        log::debug!("Audio output delay of {} ms requested", ms);
        self.delay_requests.fetch_add(1, Ordering::Relaxed);
        self.requested_delay_ms.fetch_max(ms, Ordering::AcqRel);
    }

    fn notify_video_clock_established(&self, pts: i64) {
        log::info!("Video clock established at {}", pts);
        self.video_start.store(pts, Ordering::Release);
    }
}
