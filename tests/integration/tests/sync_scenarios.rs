//! A/V sync scenarios driven through the public stream API

use mockall::predicate::eq;
use std::sync::Arc;
use surfsync::audio::{AudioSubsystem, SharedAudioClock};
use surfsync::decoder::EnqueueOutcome;
use surfsync::player::{Action, RepeatReason, StreamPhase};
use surfsync::renderer::{NullRenderer, Rect};
use surfsync::{Config, SyncError};
use surfsync_integration_tests::mocks::{MockAudio, MockDisplay};
use surfsync_integration_tests::sync_test::SyncTester;
use surfsync_integration_tests::StreamHarness;

fn free_running() -> Config {
    let mut config = Config::default();
    config.sync.sync_to_audio = false;
    config
}

fn display() -> NullRenderer {
    NullRenderer::new(Rect::sized(1920, 1080))
}

#[test]
fn test_renderer_gets_letterboxed_surface() {
    let mut harness = StreamHarness::open(&free_running(), Arc::new(SharedAudioClock::new()));
    harness.fill_to(2);

    let mut renderer = MockDisplay::new();
    renderer.expect_output_rect().return_const(Rect::sized(1920, 1080));
    renderer
        .expect_paint()
        .times(1)
        .withf(|_, params, crop, output| {
            params.width == 720
                && *crop == Rect::sized(720, 576)
                && *output == Rect::new(285, 0, 1350, 1080)
        })
        .returning(|_, _, _, _| Ok(()));
    renderer.expect_paint_black().times(0);

    let report = harness.stream.on_display_tick(&mut renderer).unwrap();
    assert_eq!(report.action, Action::Advance);
    // nothing was on screen yet, so the first queued picture is painted
    assert_eq!(report.surface.map(|s| s.index()), Some(0));
}

#[test]
fn test_renderer_gets_one_import_per_surface() {
    let mut harness = StreamHarness::open(&free_running(), Arc::new(SharedAudioClock::new()));
    harness.fill_to(3);

    let imports = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut renderer = MockDisplay::new();
    renderer.expect_output_rect().return_const(Rect::sized(1920, 1080));
    let seen = Arc::clone(&imports);
    renderer.expect_paint().times(2).returning(move |source, _, _, _| {
        seen.lock().unwrap().push(source.import);
        Ok(())
    });

    harness.stream.on_display_tick(&mut renderer).unwrap();
    assert_eq!(harness.backend.live_imports(), 1);
    harness.stream.on_display_tick(&mut renderer).unwrap();
    // the first surface was retired along with its import
    assert_eq!(harness.backend.live_imports(), 1);

    let imports = imports.lock().unwrap();
    assert_eq!(imports.len(), 2);
    assert_ne!(imports[0], imports[1]);
}

#[test]
fn test_renderer_error_is_returned() {
    let mut harness = StreamHarness::open(&free_running(), Arc::new(SharedAudioClock::new()));
    harness.fill_to(2);

    let mut renderer = MockDisplay::new();
    renderer.expect_output_rect().return_const(Rect::sized(640, 480));
    renderer
        .expect_paint()
        .returning(|_, _, _, _| Err(SyncError::Internal("device lost".to_string())));

    let err = harness.stream.on_display_tick(&mut renderer).unwrap_err();
    assert!(matches!(err, SyncError::Internal(_)));
}

#[test]
fn test_full_ring_rejects_newest_picture() {
    let mut config = Config::default();
    config.video.ring_capacity = 4;
    let mut harness = StreamHarness::open(&config, Arc::new(SharedAudioClock::new()));

    harness.fill_to(4);
    let used = harness.stream.pool().used_count();
    assert!(matches!(harness.push(), EnqueueOutcome::Dropped(_)));

    let stats = harness.stream.stats();
    assert_eq!(stats.frames_rejected, 1);
    assert_eq!(stats.ring_filled, 4);
    assert_eq!(harness.stream.pool().used_count(), used);
}

#[test]
fn test_video_behind_drops_at_most_one_picture_per_tick() {
    let mut audio = MockAudio::new();
    // audio 200 ms past the first picture
    audio.expect_clock().return_const(Some(90_000i64 + 200 * 90));
    audio
        .expect_notify_video_clock_established()
        .with(eq(90_000i64))
        .times(1)
        .return_const(());
    audio.expect_request_output_delay().return_const(());

    let mut harness = StreamHarness::open(&Config::default(), Arc::new(audio));
    harness.fill_to(8);

    let mut renderer = display();
    let mut tester = SyncTester::new();
    for _ in 0..6 {
        let stats = harness.stream.stats();
        tester.record(stats.video_clock, Some(90_000 + 200 * 90), stats.frames_dropped);
        harness.stream.on_display_tick(&mut renderer).unwrap();
    }
    tester.record(None, None, harness.stream.stats().frames_dropped);

    assert_eq!(tester.max_drops_per_tick(), 1);
    assert!(harness.stream.stats().frames_dropped >= 2);
}

#[test]
fn test_shallow_ring_asks_audio_for_delay() {
    let mut audio = MockAudio::new();
    audio.expect_clock().return_const(Some(90_000i64 + 50 * 90));
    audio
        .expect_notify_video_clock_established()
        .times(1)
        .return_const(());
    audio
        .expect_request_output_delay()
        .with(eq(50u32))
        .times(1)
        .return_const(());

    let mut harness = StreamHarness::open(&Config::default(), Arc::new(audio));
    harness.fill_to(2);

    let report = harness.stream.on_display_tick(&mut display()).unwrap();
    assert_eq!(report.action, Action::Advance);
    assert_eq!(report.diff, Some(-50 * 90));
    assert_eq!(harness.stream.stats().frames_dropped, 0);
}

#[test]
fn test_unknown_audio_clock_free_runs() {
    let mut audio = MockAudio::new();
    audio.expect_clock().return_const(None::<i64>);
    audio.expect_notify_video_clock_established().return_const(());
    audio.expect_request_output_delay().times(0);

    let mut harness = StreamHarness::open(&Config::default(), Arc::new(audio));
    harness.fill_to(4);

    let mut renderer = display();
    for _ in 0..2 {
        let report = harness.stream.on_display_tick(&mut renderer).unwrap();
        assert_eq!(report.action, Action::Advance);
        assert_eq!(report.diff, None);
    }
}

/// Start `offset_ms` off audio and keep four pictures queued
fn run_converging(offset_ms: i64) -> (SyncTester, u64) {
    let audio = Arc::new(SharedAudioClock::new());
    audio.set_pts(90_000 - offset_ms * 90);

    let mut harness = StreamHarness::open(&Config::default(), audio.clone());
    let mut renderer = display();
    let mut tester = SyncTester::new();

    for _ in 0..30 {
        harness.fill_to(4);
        let stats = harness.stream.stats();
        tester.record(harness.stream.get_clock(), audio.clock(), stats.frames_dropped);
        harness.stream.on_display_tick(&mut renderer).unwrap();
        audio.advance(1800);
    }
    (tester, harness.stream.stats().frames_duped)
}

#[test]
fn test_video_ahead_converges_by_duplicating() {
    let (tester, duped) = run_converging(80);

    let converged = tester.converged_at(250).expect("never converged");
    assert!(converged <= 10, "converged after {} ticks", converged);
    assert_eq!(tester.max_drops_per_tick(), 0);
    assert!(duped >= 3);
}

#[test]
fn test_video_behind_converges_by_dropping() {
    let (tester, _) = run_converging(-80);

    let converged = tester.converged_at(250).expect("never converged");
    assert!(converged <= 15, "converged after {} ticks", converged);
    assert_eq!(tester.max_drops_per_tick(), 1);
}

#[test]
fn test_interlaced_stream_stays_locked_at_field_rate() {
    let audio = Arc::new(SharedAudioClock::new());
    audio.set_pts(90_000);

    let mut harness = StreamHarness::open(&Config::default(), audio.clone()).interlaced();
    let mut renderer = display();
    let mut shown = Vec::new();

    for tick in 0..40 {
        harness.fill_to(6);
        // field accounting starts once the first interlaced tick has run;
        // from then on the field on screen is one field behind audio
        if tick > 0 {
            let (video, audio) = (harness.stream.get_clock().unwrap(), audio.clock().unwrap());
            assert_eq!(video - audio, -900, "tick {}", tick);
        }
        let report = harness.stream.on_display_tick(&mut renderer).unwrap();
        assert_eq!(report.action, Action::Advance);
        shown.push(report.surface.unwrap());
        // one field is 10 ms at 50 frames per second
        audio.advance(900);
    }

    let stats = harness.stream.stats();
    assert_eq!(stats.frames_duped, 0);
    assert_eq!(stats.frames_dropped, 0);
    // every picture is shown for two fields
    for pair in shown.chunks_exact(2) {
        assert_eq!(pair[0], pair[1]);
    }
}

#[test]
fn test_pulldown_repeats_a_field_every_sixth_tick() {
    let mut config = Config::default();
    config.sync.pulldown_60hz = true;

    let audio = Arc::new(SharedAudioClock::new());
    audio.set_pts(90_000);
    let mut harness = StreamHarness::open(&config, audio.clone());
    let mut renderer = display();

    let mut pulldowns = 0;
    for _ in 0..24 {
        harness.fill_to(4);
        let report = harness.stream.on_display_tick(&mut renderer).unwrap();
        if report.action == Action::Repeat(RepeatReason::Pulldown) {
            pulldowns += 1;
        }
        // audio clock of a 60 Hz display showing 50 Hz content
        audio.advance(1500);
    }

    assert!(pulldowns >= 3, "only {} pulldown repeats", pulldowns);
}

#[test]
fn test_closing_stream_paints_black_once_drained() {
    let mut config = free_running();
    config.sync.closing_ticks = 2;
    config.sync.black_picture = true;

    let mut harness = StreamHarness::open(&config, Arc::new(SharedAudioClock::new()));
    harness.fill_to(3);

    let mut renderer = display();
    harness.stream.on_display_tick(&mut renderer).unwrap();
    harness.stream.set_closing();

    let mut phases = Vec::new();
    for _ in 0..4 {
        harness.stream.on_display_tick(&mut renderer).unwrap();
        phases.push(harness.stream.phase());
    }

    assert_eq!(phases.last(), Some(&StreamPhase::Drained));
    assert!(renderer.stats().black_paints >= 1);
    assert!(!harness.stream.wants_input());
}
