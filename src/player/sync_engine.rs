//! Per-tick display decision
//!
//! Every display tick the engine compares the video clock of the picture on
//! screen with the audio clock and decides whether to show the next picture,
//! repeat the current one, or skip one. All clock values are 90 kHz ticks.

use crate::player::state::{SyncState, SPEEDUP_BUDGET};

/// A clock gap beyond this (~5 s) is a desync event, not something to correct
pub const DESYNC_TICKS: i64 = 5000 * 90;

/// Video ahead by more than this (~11 ms) is duplicated under the speedup budget
pub const DUPE_LARGE_TICKS: i64 = 1000;

/// Video ahead by more than this (~2.8 ms) is duplicated once
pub const DUPE_SMALL_TICKS: i64 = 250;

/// Video behind by more than this (~11 ms) drops a picture
pub const DROP_TICKS: i64 = -1000;

/// Audio may lead video by this much and still take a pulldown repeat
pub const PULLDOWN_SLACK_TICKS: i64 = 25 * 90;

/// Every this many displayed fields one is repeated for 50 to 60 Hz pulldown
pub const PULLDOWN_PERIOD: u64 = 6;

/// Why the current picture is shown again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatReason {
    /// 50 to 60 Hz field repetition
    Pulldown,

    /// Trick-speed stepping
    TrickSpeed,

    /// Video is ahead of audio
    VideoAhead,
}

/// What the display does this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Show the next picture (or field)
    Advance,

    /// Show the current picture again
    Repeat(RepeatReason),

    /// Skip a picture, then show the next one
    DropAndAdvance,
}

/// Clocks and buffer state sampled at the start of a tick
#[derive(Debug, Clone, Copy)]
pub struct SyncInputs {
    /// Video clock of the picture on screen, compensated for queue depth
    pub video_clock: Option<i64>,

    /// Audio clock
    pub audio_clock: Option<i64>,

    /// Configured inter-stream delay added to the audio clock
    pub audio_delay: i64,

    /// Ring fill
    pub filled: usize,

    /// Whether this decoder syncs to audio
    pub sync_to_audio: bool,

    /// Whether 50 to 60 Hz pulldown is enabled
    pub pulldown: bool,

    /// Ticks displayed so far
    pub frames_displayed: u64,
}

/// Outcome of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Display action
    pub action: Action,

    /// Output delay the audio path should insert, in milliseconds
    pub audio_delay_ms: Option<u32>,

    /// Video minus audio, when both clocks were compared
    pub diff: Option<i64>,
}

impl Decision {
    fn new(action: Action) -> Self {
        Self {
            action,
            audio_delay_ms: None,
            diff: None,
        }
    }
}

/// Ring fill needed before a picture may be dropped
pub fn drop_threshold(interlaced: bool) -> usize {
    if interlaced {
        4
    } else {
        2
    }
}

/// Display pacer of one decoder
#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    state: SyncState,
}

impl SyncEngine {
    /// Create an engine in the start-of-stream state
    pub fn new() -> Self {
        Self {
            state: SyncState::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Mutable state, for stream control entry points
    pub fn state_mut(&mut self) -> &mut SyncState {
        &mut self.state
    }

    /// Decide what to display this tick
    pub fn decide(&mut self, inputs: &SyncInputs) -> Decision {
        let state = &mut self.state;

        if inputs.pulldown && inputs.sync_to_audio && inputs.frames_displayed % PULLDOWN_PERIOD == 0 {
            if let (Some(video), Some(audio)) = (inputs.video_clock, inputs.audio_clock) {
                if audio + inputs.audio_delay <= video + PULLDOWN_SLACK_TICKS {
                    return Decision::new(Action::Repeat(RepeatReason::Pulldown));
                }
            }
        }

        if state.trick_speed > 0 {
            if state.trick_counter > 0 {
                state.trick_counter -= 1;
                return Decision::new(Action::Repeat(RepeatReason::TrickSpeed));
            }
            state.trick_counter = state.trick_speed - 1;
            return Decision::new(Action::Advance);
        }

        if !inputs.sync_to_audio {
            return Decision::new(Action::Advance);
        }

        if state.hold_ticks > 0 {
            state.hold_ticks -= 1;
            return Decision::new(Action::Advance);
        }

        let (video, audio) = match (inputs.video_clock, inputs.audio_clock) {
            (Some(video), Some(audio)) => (video, audio),
            _ => return Decision::new(Action::Advance),
        };

        let diff = video - audio - inputs.audio_delay;
        state.last_diff = Some(diff);

        let mut decision = Decision::new(Action::Advance);
        decision.diff = Some(diff);

        if diff.abs() > DESYNC_TICKS {
            log::warn!("Video {} ms off audio, not correcting", diff / 90);
        } else if diff > DUPE_LARGE_TICKS {
            // at most SPEEDUP_BUDGET duplicates in a row, then one forced advance
            state.speedup = state.speedup.saturating_sub(1);
            if state.speedup == 0 {
                state.hold_ticks = 1;
            }
            decision.action = Action::Repeat(RepeatReason::VideoAhead);
        } else if diff > DUPE_SMALL_TICKS {
            state.hold_ticks = 1;
            decision.action = Action::Repeat(RepeatReason::VideoAhead);
        } else if diff < DROP_TICKS {
            state.hold_ticks = 1;
            if inputs.filled > drop_threshold(state.interlaced) {
                decision.action = Action::DropAndAdvance;
            } else {
                decision.audio_delay_ms = Some((-diff / 90) as u32);
            }
        } else {
            state.speedup = SPEEDUP_BUDGET;
        }

        log::debug!("Sync diff {} ticks, filled {}: {:?}", diff, inputs.filled, decision.action);
        decision
    }
}
