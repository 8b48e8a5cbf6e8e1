//! Video presentation clock
//!
//! The producer updates the clock from each accepted frame; the consumer
//! reads it every display tick. Decoders report zero, duplicated or briefly
//! out-of-order timestamps after a seek or channel change, so a small
//! backward step is absorbed instead of adopted.

use crate::decoder::DecodedFrame;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Backward steps (real minus provisional, in ticks) treated as normal
/// reordering or field spacing: about -40 ms to -6.7 ms.
pub const PTS_REORDER_WINDOW: RangeInclusive<i64> = -40 * 90..=-600;

/// Frame duration assumed when the stream reports no frame rate (50 Hz)
pub const DEFAULT_FRAME_TICKS: i64 = 20 * 90;

const NO_PTS: i64 = i64::MIN;

/// Nominal duration of one decoded frame in 90 kHz ticks
///
/// Interlaced frames advance the clock by half the progressive duration.
pub fn nominal_frame_ticks(frame_rate: Option<(u32, u32)>, interlaced: bool) -> i64 {
    let progressive = match frame_rate {
        Some((num, den)) if num > 0 && den > 0 => 90_000 * den as i64 / num as i64,
        _ => DEFAULT_FRAME_TICKS,
    };
    if interlaced {
        progressive / 2
    } else {
        progressive
    }
}

/// Outcome of filtering one frame's timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtsFilter {
    /// New clock value, `None` while no timestamp has been seen
    pub pts: Option<i64>,

    /// This frame established the clock
    pub established: bool,

    /// The frame's timestamp fell in the reorder window and was ignored
    pub reordered: bool,
}

/// Advance `prev` by one frame and reconcile it with the frame's timestamp
pub fn filter_pts(prev: Option<i64>, nominal: i64, pts: Option<i64>, dts: Option<i64>) -> PtsFilter {
    let provisional = prev.map(|p| p + nominal);

    // A zero pts is what some decoders report when they have none.
    let real = match pts {
        Some(p) if p != 0 => Some(p),
        _ => dts.or(pts),
    };

    match (provisional, real) {
        (Some(provisional), Some(real)) => {
            if PTS_REORDER_WINDOW.contains(&(real - provisional)) {
                PtsFilter { pts: Some(provisional), established: false, reordered: true }
            } else {
                PtsFilter { pts: Some(real), established: false, reordered: false }
            }
        }
        (None, Some(real)) => PtsFilter { pts: Some(real), established: true, reordered: false },
        (provisional, None) => PtsFilter { pts: provisional, established: false, reordered: false },
    }
}

/// Presentation clock of the most recently queued frame
pub struct VideoClock {
    pts: AtomicI64,
    frame_ticks: AtomicI64,
    established: AtomicBool,
}

impl VideoClock {
    /// Create a clock with no known time
    pub fn new() -> Self {
        Self {
            pts: AtomicI64::new(NO_PTS),
            frame_ticks: AtomicI64::new(DEFAULT_FRAME_TICKS),
            established: AtomicBool::new(false),
        }
    }

    /// Producer side: fold a frame into the clock
    ///
    /// Returns the timestamp if this frame established the clock, which
    /// happens once per stream (or once after [`reset`](Self::reset)).
    pub fn update(&self, frame: &DecodedFrame, nominal: i64) -> Option<i64> {
        self.frame_ticks.store(nominal, Ordering::Relaxed);

        let filtered = filter_pts(self.pts(), nominal, frame.pts, frame.dts);
        if filtered.reordered {
            log::debug!(
                "Video pts {:?} inside reorder window, keeping {:?}",
                frame.pts,
                filtered.pts
            );
        }

        if let Some(pts) = filtered.pts {
            self.pts.store(pts, Ordering::Release);
            if !self.established.swap(true, Ordering::AcqRel) {
                return Some(pts);
            }
        }
        None
    }

    /// Timestamp of the most recently queued frame
    pub fn pts(&self) -> Option<i64> {
        match self.pts.load(Ordering::Acquire) {
            NO_PTS => None,
            pts => Some(pts),
        }
    }

    /// Nominal duration of the most recent frame (a field when interlaced)
    pub fn frame_ticks(&self) -> i64 {
        self.frame_ticks.load(Ordering::Relaxed)
    }

    /// Forget the current time (seek, channel change)
    pub fn reset(&self) {
        self.pts.store(NO_PTS, Ordering::Release);
        self.established.store(false, Ordering::Release);
    }
}

impl Default for VideoClock {
    fn default() -> Self {
        Self::new()
    }
}
