//! Per-decoder sync state and statistics
//!
//! `SyncState` is owned by the display context; `FrameCounters` are
//! touched from both the producer and the display context and so are
//! plain atomics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Budget of back-to-back duplicates allowed while video is far ahead
pub const SPEEDUP_BUDGET: u32 = 2;

/// Lifecycle of a stream as seen by the display loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    /// Decoding normally
    Decoding,

    /// Teardown requested; counting down ticks without new input
    Draining {
        /// Ticks without input left before the stream counts as drained
        ticks_left: u32,

        /// Ticks since draining started
        elapsed: u32,
    },

    /// No more input will arrive
    Drained,
}

impl StreamPhase {
    /// Whether teardown has been requested
    pub fn is_closing(&self) -> bool {
        !matches!(self, Self::Decoding)
    }

    /// Whether the stream is fully drained
    pub fn is_drained(&self) -> bool {
        matches!(self, Self::Drained)
    }
}

/// Display-side state of one decoder
#[derive(Debug, Clone)]
pub struct SyncState {
    /// Whether the stream is interlaced
    pub interlaced: bool,

    /// Field of the current interlaced frame being shown (0 or 1)
    pub surface_field: u8,

    /// Whether the surface at the ring read position has been painted
    pub shown: bool,

    /// Ticks each picture is shown in trick mode, 0 for normal playback
    pub trick_speed: u32,

    /// Repeats left before the next trick-mode advance
    pub trick_counter: u32,

    /// Closing/draining state
    pub phase: StreamPhase,

    /// Ticks that advance without evaluating the clocks
    pub hold_ticks: u32,

    /// Remaining back-to-back duplicates while video is far ahead
    pub speedup: u32,

    /// Clock difference seen on the last evaluated tick
    pub last_diff: Option<i64>,

    /// Producer frame counter seen on the last tick
    pub last_frame_counter: u64,

    /// Underruns seen, for rate-limited logging
    pub underruns: u64,
}

impl SyncState {
    /// State of a freshly opened stream
    pub fn new() -> Self {
        Self {
            interlaced: false,
            surface_field: 0,
            shown: false,
            trick_speed: 0,
            trick_counter: 0,
            phase: StreamPhase::Decoding,
            hold_ticks: 0,
            speedup: SPEEDUP_BUDGET,
            last_diff: None,
            last_frame_counter: 0,
            underruns: 0,
        }
    }

    /// Return to the start-of-stream state, keeping trick speed
    ///
    /// The picture on screen stays there, so `shown` is kept too.
    pub fn reset_start(&mut self) {
        self.surface_field = 0;
        self.trick_counter = 0;
        self.phase = StreamPhase::Decoding;
        self.hold_ticks = 0;
        self.speedup = SPEEDUP_BUDGET;
        self.last_diff = None;
    }

    /// Advance the closing countdown by one tick
    ///
    /// `new_input` is whether the producer delivered a frame since the
    /// previous tick; only ticks without input count down.
    pub fn tick_phase(&mut self, new_input: bool) {
        if let StreamPhase::Draining { ticks_left, elapsed } = self.phase {
            let ticks_left = if new_input { ticks_left } else { ticks_left.saturating_sub(1) };
            self.phase = if ticks_left == 0 {
                log::info!("Stream drained after {} ticks", elapsed + 1);
                StreamPhase::Drained
            } else {
                StreamPhase::Draining {
                    ticks_left,
                    elapsed: elapsed + 1,
                }
            };
        }
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic frame counters of one decoder
#[derive(Debug, Default)]
pub struct FrameCounters {
    displayed: AtomicU64,
    duped: AtomicU64,
    dropped: AtomicU64,
    frame_counter: AtomicU64,
    rejected: AtomicU64,
}

impl FrameCounters {
    pub fn inc_displayed(&self) -> u64 {
        self.displayed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_duped(&self) {
        self.duped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frame_counter(&self) -> u64 {
        self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn displayed(&self) -> u64 {
        self.displayed.load(Ordering::Relaxed)
    }

    pub fn duped(&self) -> u64 {
        self.duped.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Statistics snapshot of one decoder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStats {
    /// Display ticks painted
    pub frames_displayed: u64,

    /// Ticks that repeated the current picture
    pub frames_duped: u64,

    /// Pictures skipped to catch up with audio
    pub frames_dropped: u64,

    /// Frames delivered by the decoder
    pub frame_counter: u64,

    /// Frames rejected because the ring was full
    pub frames_rejected: u64,

    /// Current ring fill
    pub ring_filled: usize,

    /// Surfaces in use in the pool
    pub surfaces_used: usize,

    /// Video minus audio on the last evaluated tick, in ticks
    pub last_diff: Option<i64>,

    /// Current video clock, in ticks
    pub video_clock: Option<i64>,

    /// Stream lifecycle
    pub phase: StreamPhase,
}
