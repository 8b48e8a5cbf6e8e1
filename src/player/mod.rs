//! Per-decoder video stream for surfsync
//!
//! A `VideoStream` owns everything one decoder instance needs between the
//! decode backend and the display: the surface pool, the ring of decoded
//! surfaces, the video clock and the sync engine. The producer context
//! calls [`VideoStream::on_decoded_frame`]; the display context calls
//! [`VideoStream::on_display_tick`] at the display rate. Stream control
//! entry points may be called from any context.

mod registry;
mod state;
mod sync_engine;

pub use registry::{DecoderId, DecoderRegistry};
pub use state::{FrameCounters, StreamPhase, SyncState, SyncStats, SPEEDUP_BUDGET};
pub use sync_engine::{
    drop_threshold, Action, Decision, RepeatReason, SyncEngine, SyncInputs, DESYNC_TICKS,
    DROP_TICKS, DUPE_LARGE_TICKS, DUPE_SMALL_TICKS, PULLDOWN_PERIOD, PULLDOWN_SLACK_TICKS,
};

use crate::audio::AudioSubsystem;
use crate::decoder::{
    nominal_frame_ticks, CodecParams, DecodeBackend, DecodedFrame, EnqueueOutcome, FrameSink,
    InputAction, InputPolicy, SurfaceHandle, SurfaceId, SurfacePool, SurfaceRing, SurfaceSource,
    VideoClock,
};
use crate::renderer::{PaintSource, Rect, Renderer};
use crate::utils::config::{Config, SyncConfig};
use crate::utils::error::{Result, SyncError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Underruns between two underrun warnings
const UNDERRUN_LOG_INTERVAL: u64 = 50;

/// What one display tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Display action taken
    pub action: Action,

    /// Surface painted, `None` when a black picture was painted
    pub surface: Option<SurfaceId>,

    /// Video minus audio, when the clocks were compared
    pub diff: Option<i64>,

    /// Ring fill after the tick
    pub filled: usize,
}

/// One decoder instance from surface allocation to display
pub struct VideoStream {
    params: CodecParams,
    pool: SurfacePool,
    ring: SurfaceRing,
    clock: VideoClock,
    audio: Arc<dyn AudioSubsystem>,
    engine: Mutex<SyncEngine>,
    counters: FrameCounters,
    interlaced: AtomicBool,
    sync_to_audio: AtomicBool,
    config: SyncConfig,
}

impl VideoStream {
    /// Open a stream: allocate its surfaces and empty ring
    ///
    /// The pool holds as many surfaces as the codec reports it needs, or
    /// the configured default. Surface allocation failure fails the open.
    pub fn open(
        backend: Arc<dyn DecodeBackend>,
        params: CodecParams,
        audio: Arc<dyn AudioSubsystem>,
        config: &Config,
    ) -> Result<Self> {
        if config.video.ring_capacity == 0 {
            return Err(SyncError::InvalidInput("Ring capacity must be non-zero".to_string()));
        }

        let pool_capacity = params.surfaces_required.unwrap_or(config.video.pool_capacity);
        let pool = SurfacePool::open(backend, &params, pool_capacity)?;

        log::info!(
            "Opened {:?} stream {}x{}, ring of {}",
            params.codec,
            params.width,
            params.height,
            config.video.ring_capacity
        );

        Ok(Self {
            params,
            pool,
            ring: SurfaceRing::new(config.video.ring_capacity),
            clock: VideoClock::new(),
            audio,
            engine: Mutex::new(SyncEngine::new()),
            counters: FrameCounters::default(),
            interlaced: AtomicBool::new(false),
            sync_to_audio: AtomicBool::new(config.sync.sync_to_audio),
            config: config.sync.clone(),
        })
    }

    /// Producer entry point: queue a decoded picture for display
    ///
    /// `frame.surface` must have been taken from this stream with
    /// [`SurfaceSource::get_free_surface`]. A full ring rejects the picture
    /// and its surface goes straight back to the pool.
    pub fn on_decoded_frame(&self, frame: DecodedFrame) -> EnqueueOutcome {
        self.counters.inc_frame_counter();
        self.interlaced.store(frame.interlaced, Ordering::Relaxed);

        if self.ring.is_full() {
            return self.reject(frame.surface);
        }

        let nominal = nominal_frame_ticks(self.params.frame_rate, frame.interlaced);
        if let Some(pts) = self.clock.update(&frame, nominal) {
            self.audio.notify_video_clock_established(pts);
        }

        let id = frame.surface;
        self.pool.attach_frame(id, frame);
        match self.ring.enqueue(id) {
            EnqueueOutcome::Accepted => EnqueueOutcome::Accepted,
            EnqueueOutcome::Dropped(id) => self.reject(id),
        }
    }

    fn reject(&self, id: SurfaceId) -> EnqueueOutcome {
        log::debug!("Ring full, dropping decoded surface {}", id);
        self.counters.inc_rejected();
        self.pool.release(id);
        EnqueueOutcome::Dropped(id)
    }

    /// Display entry point: run the sync engine and paint one picture
    pub fn on_display_tick<R: Renderer + ?Sized>(&self, renderer: &mut R) -> Result<TickReport> {
        let mut engine = self.engine.lock();

        let frame_counter = self.counters.frame_counter();
        let state = engine.state_mut();
        let new_input = frame_counter != state.last_frame_counter;
        state.last_frame_counter = frame_counter;
        state.tick_phase(new_input);
        state.interlaced = self.interlaced.load(Ordering::Relaxed);

        let filled = self.ring.filled();
        let inputs = SyncInputs {
            video_clock: self.display_clock(engine.state(), filled),
            audio_clock: self.audio.clock(),
            audio_delay: self.config.audio_delay_ticks(),
            filled,
            sync_to_audio: self.sync_to_audio.load(Ordering::Relaxed),
            pulldown: self.config.pulldown_60hz,
            frames_displayed: self.counters.displayed(),
        };

        let decision = engine.decide(&inputs);
        let state = engine.state_mut();
        match decision.action {
            // the picture at the read position is still waiting for its first paint
            Action::Advance if !state.shown => {}
            Action::Advance => self.advance_display(state),
            Action::Repeat(RepeatReason::TrickSpeed) => {}
            Action::Repeat(_) => self.counters.inc_duped(),
            Action::DropAndAdvance if !state.shown => {
                if let Some(skipped) = self.ring.advance(1) {
                    self.pool.release(skipped);
                    self.counters.inc_dropped();
                }
            }
            Action::DropAndAdvance if state.interlaced => {
                // skip one field: two field steps in a single tick
                self.advance_display(state);
                self.counters.inc_dropped();
                self.advance_display(state);
            }
            Action::DropAndAdvance => {
                if let Some(skipped) = self.ring.advance(1) {
                    self.pool.release(skipped);
                    self.counters.inc_dropped();
                }
                self.advance_display(state);
            }
        }

        if let Some(ms) = decision.audio_delay_ms {
            self.audio.request_output_delay(ms);
        }

        let surface = self.paint(renderer, engine.state().phase)?;
        if surface.is_some() {
            engine.state_mut().shown = true;
        }
        self.counters.inc_displayed();

        Ok(TickReport {
            action: decision.action,
            surface,
            diff: decision.diff,
            filled: self.ring.filled(),
        })
    }

    /// Move to the next field or picture
    fn advance_display(&self, state: &mut SyncState) {
        if state.interlaced && state.surface_field == 0 && self.ring.filled() > 0 {
            state.surface_field = 1;
            return;
        }

        let min_filled = if state.interlaced { 3 } else { 2 };
        match self.ring.advance(min_filled) {
            Some(retired) => {
                self.pool.release(retired);
                state.surface_field = 0;
            }
            None => {
                self.counters.inc_duped();
                state.underruns += 1;
                if !state.phase.is_closing() && state.underruns % UNDERRUN_LOG_INTERVAL == 1 {
                    log::warn!(
                        "Video underrun with {} queued ({} so far)",
                        self.ring.filled(),
                        state.underruns
                    );
                }
            }
        }
    }

    fn paint<R: Renderer + ?Sized>(&self, renderer: &mut R, phase: StreamPhase) -> Result<Option<SurfaceId>> {
        let output = renderer.output_rect();

        let black = self.config.black_picture
            && match phase {
                StreamPhase::Draining { elapsed, .. } => elapsed >= self.config.black_picture_after_ticks,
                StreamPhase::Drained => true,
                StreamPhase::Decoding => false,
            };

        let id = match self.ring.peek() {
            Some(id) if !black => id,
            _ => {
                renderer.paint_black(output)?;
                return Ok(None);
            }
        };

        let surface = self
            .pool
            .handle(id)
            .ok_or_else(|| crate::internal_error!("queued surface {} has no handle", id))?;
        let import = self.pool.import(id)?;
        let crop = Rect::sized(self.params.width, self.params.height);
        renderer.paint(PaintSource { surface, import }, &self.params, crop, output.letterbox(crop))?;
        Ok(Some(id))
    }

    /// Clock of the picture on screen: last queued pts minus what is still queued
    fn display_clock(&self, state: &SyncState, filled: usize) -> Option<i64> {
        let pts = self.clock.pts()?;
        let filled = filled as i64;
        let queued = if state.interlaced {
            2 * filled - 2 - state.surface_field as i64
        } else {
            filled - 1
        };
        Some(pts - self.clock.frame_ticks() * queued.max(0) - self.config.output_latency_ticks)
    }

    /// Current video clock, compensated for queue depth, in ticks
    pub fn get_clock(&self) -> Option<i64> {
        let engine = self.engine.lock();
        self.display_clock(engine.state(), self.ring.filled())
    }

    /// Show every picture for `speed` ticks; 0 returns to normal playback
    pub fn set_trick_speed(&self, speed: u32) {
        let mut engine = self.engine.lock();
        let state = engine.state_mut();
        state.trick_speed = speed;
        state.trick_counter = 0;
        log::info!("Trick speed set to {}", speed);
    }

    /// Begin teardown: count down ticks without input, then stop input
    pub fn set_closing(&self) {
        let mut engine = self.engine.lock();
        let state = engine.state_mut();
        if state.phase.is_closing() {
            return;
        }
        state.phase = match self.config.closing_ticks {
            0 => StreamPhase::Drained,
            ticks => StreamPhase::Draining {
                ticks_left: ticks,
                elapsed: 0,
            },
        };
        log::info!("Stream closing");
    }

    /// Restart sync from scratch (seek, channel change)
    pub fn reset_start(&self) {
        self.clock.reset();
        self.engine.lock().state_mut().reset_start();
        log::debug!("Stream sync reset");
    }

    /// Whether this stream syncs its display to audio
    pub fn syncs_to_audio(&self) -> bool {
        self.sync_to_audio.load(Ordering::Relaxed)
    }

    /// Enable or disable sync to audio
    pub fn set_sync_to_audio(&self, enabled: bool) {
        self.sync_to_audio.store(enabled, Ordering::Relaxed);
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> StreamPhase {
        self.engine.lock().state().phase
    }

    /// Whether the decode side should keep feeding input
    pub fn wants_input(&self) -> bool {
        !self.phase().is_drained()
    }

    /// What the decode-input loop should do next
    pub fn input_action(&self, policy: &InputPolicy) -> InputAction {
        policy.decide(self.ring.filled(), self.ring.capacity(), self.phase().is_drained())
    }

    /// Drop every queued picture, releasing its surface
    ///
    /// Only call when the display context is quiescent.
    pub fn flush(&self) -> usize {
        let drained = self.ring.drain();
        for &id in &drained {
            self.pool.release(id);
        }
        let mut engine = self.engine.lock();
        let state = engine.state_mut();
        state.surface_field = 0;
        state.shown = false;
        drained.len()
    }

    /// Release every surface before the stream is dropped
    ///
    /// Both producer and consumer must have stopped. Returns the number of
    /// surfaces released.
    pub fn teardown(&self) -> usize {
        let queued = self.flush();
        let held = self.pool.release_all();
        log::info!(
            "Stream torn down: {} queued and {} held surfaces released",
            queued,
            held
        );
        queued + held
    }

    /// Statistics snapshot
    pub fn stats(&self) -> SyncStats {
        let engine = self.engine.lock();
        let state = engine.state();
        SyncStats {
            frames_displayed: self.counters.displayed(),
            frames_duped: self.counters.duped(),
            frames_dropped: self.counters.dropped(),
            frame_counter: self.counters.frame_counter(),
            frames_rejected: self.counters.rejected(),
            ring_filled: self.ring.filled(),
            surfaces_used: self.pool.used_count(),
            last_diff: state.last_diff,
            video_clock: self.display_clock(state, self.ring.filled()),
            phase: state.phase,
        }
    }

    /// Stream parameters
    pub fn params(&self) -> &CodecParams {
        &self.params
    }

    /// Surface pool of this stream
    pub fn pool(&self) -> &SurfacePool {
        &self.pool
    }

    /// Ring of decoded surfaces
    pub fn ring(&self) -> &SurfaceRing {
        &self.ring
    }
}

impl SurfaceSource for VideoStream {
    fn get_free_surface(&self) -> Option<(SurfaceId, SurfaceHandle)> {
        let id = self.pool.acquire()?;
        match self.pool.handle(id) {
            Some(handle) => Some((id, handle)),
            None => {
                self.pool.release(id);
                None
            }
        }
    }

    fn release_surface(&self, id: SurfaceId) {
        self.pool.release(id);
    }
}

impl FrameSink for VideoStream {
    fn on_decoded_frame(&self, frame: DecodedFrame) -> EnqueueOutcome {
        VideoStream::on_decoded_frame(self, frame)
    }
}
