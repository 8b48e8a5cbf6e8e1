//! Producer and display running on separate threads

use crossbeam_channel::{bounded, select, tick, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use surfsync::audio::SharedAudioClock;
use surfsync::decoder::{
    DecodedFrame, InputAction, InputPolicy, Packet, PacketDecoder, PacketSubmitter, SendStatus,
    SubmitOutcome, SurfaceSource,
};
use surfsync::renderer::{NullRenderer, Rect};
use surfsync::{Config, VideoStream};
use surfsync_integration_tests::perf_test::PerfMeasure;
use surfsync_integration_tests::StreamHarness;

/// Decoder that turns each packet into a picture as soon as a surface is free
#[derive(Default)]
struct InstantDecoder {
    pending: Option<Packet>,
}

impl PacketDecoder for InstantDecoder {
    fn send_packet(&mut self, packet: &Packet) -> surfsync::Result<SendStatus> {
        if self.pending.is_some() {
            return Ok(SendStatus::Again);
        }
        self.pending = Some(packet.clone());
        Ok(SendStatus::Accepted)
    }

    fn receive_frame(&mut self, surfaces: &dyn SurfaceSource) -> surfsync::Result<Option<DecodedFrame>> {
        if self.pending.is_none() {
            return Ok(None);
        }
        let (surface, _) = match surfaces.get_free_surface() {
            Some(surface) => surface,
            None => return Ok(None),
        };
        let packet = self.pending.take().unwrap_or_default();
        Ok(Some(DecodedFrame::new(surface, packet.pts)))
    }
}

fn produce(stream: &VideoStream, frames: i64) -> usize {
    let mut decoder = InstantDecoder::default();
    let submitter = PacketSubmitter::default();
    let policy = InputPolicy::new(Duration::from_millis(1));
    let mut next = 0;
    let mut decoded = 0;

    while next < frames {
        match stream.input_action(&policy) {
            InputAction::Pull => {
                let pts = 90_000 + next * 1800;
                let packet = Packet {
                    pts: Some(pts),
                    dts: None,
                    data: vec![0; 64],
                };
                match submitter.submit(&mut decoder, stream, &packet).unwrap() {
                    SubmitOutcome::Accepted { frames, .. } => {
                        decoded += frames;
                        next += 1;
                    }
                    SubmitOutcome::Rejected { frames, .. } => decoded += frames,
                }
            }
            InputAction::Poll(interval) => thread::sleep(interval),
            InputAction::Stop => break,
        }
    }
    decoded += PacketSubmitter::drain(&mut decoder, stream).unwrap();
    stream.set_closing();
    decoded
}

/// Tick until drained, returning the pts of every picture shown
fn display(stream: &VideoStream, max_ticks: usize) -> (Vec<i64>, u64) {
    let mut renderer = NullRenderer::new(Rect::sized(1280, 720));
    let ticker = tick(Duration::from_millis(1));
    let mut shown = Vec::new();
    let mut max_drops = 0;

    for _ in 0..max_ticks {
        ticker.recv().unwrap();
        let before = stream.stats().frames_dropped;
        let report = stream.on_display_tick(&mut renderer).unwrap();
        max_drops = max_drops.max(stream.stats().frames_dropped - before);

        // the shown surface stays queued until this thread advances past it
        if let Some(pts) = report
            .surface
            .and_then(|id| stream.pool().frame(id))
            .and_then(|frame| frame.pts)
        {
            shown.push(pts);
        }

        if stream.phase().is_drained() {
            break;
        }
    }
    (shown, max_drops)
}

fn audio_clock(audio: &SharedAudioClock, stop: &Receiver<()>) {
    let ticker = tick(Duration::from_millis(2));
    loop {
        select! {
            recv(ticker) -> _ => audio.advance(1800),
            recv(stop) -> _ => break,
        }
    }
}

#[test]
fn test_free_running_pipeline_keeps_fifo_order() {
    let mut config = Config::default();
    config.sync.sync_to_audio = false;
    config.sync.closing_ticks = 5;

    let harness = StreamHarness::open(&config, Arc::new(SharedAudioClock::new()));
    let stream = Arc::clone(&harness.stream);

    let producer = {
        let stream = Arc::clone(&stream);
        thread::spawn(move || produce(&stream, 200))
    };
    let consumer = {
        let stream = Arc::clone(&stream);
        thread::spawn(move || display(&stream, 10_000))
    };

    let decoded = producer.join().unwrap();
    let (shown, _) = consumer.join().unwrap();

    assert_eq!(decoded, 200);
    assert!(!shown.is_empty());
    assert!(shown.windows(2).all(|w| w[0] <= w[1]), "display order went backwards");

    let stats = stream.stats();
    assert_eq!(stats.frame_counter, 200);
    assert_eq!(stats.frames_rejected, 0);
    assert!(stats.phase.is_drained());

    // every used surface is either queued or nowhere
    assert_eq!(stream.pool().used_count(), stream.ring().filled());
    stream.teardown();
    assert_eq!(stream.pool().used_count(), 0);

    let backend = Arc::clone(&harness.backend);
    drop(stream);
    drop(harness);
    assert_eq!(backend.live_surfaces(), 0);
}

#[test]
fn test_synced_pipeline_drops_one_picture_at_a_time() {
    let mut config = Config::default();
    config.sync.closing_ticks = 5;

    let audio = Arc::new(SharedAudioClock::new());
    // audio starts 100 ms ahead so the display has to catch up
    audio.set_pts(90_000 + 100 * 90);

    let harness = StreamHarness::open(&config, audio.clone());
    let stream = Arc::clone(&harness.stream);
    let (stop_tx, stop_rx) = bounded::<()>(0);

    let audio_thread = {
        let audio = Arc::clone(&audio);
        thread::spawn(move || audio_clock(&audio, &stop_rx))
    };
    let producer = {
        let stream = Arc::clone(&stream);
        thread::spawn(move || produce(&stream, 300))
    };
    let consumer = {
        let stream = Arc::clone(&stream);
        thread::spawn(move || display(&stream, 20_000))
    };

    producer.join().unwrap();
    let (shown, max_drops) = consumer.join().unwrap();
    drop(stop_tx);
    audio_thread.join().unwrap();

    assert!(max_drops <= 1, "{} pictures dropped in one tick", max_drops);
    assert!(shown.windows(2).all(|w| w[0] <= w[1]), "display order went backwards");
    assert_eq!(stream.stats().frames_rejected, 0);
    assert_eq!(stream.pool().used_count(), stream.ring().filled());
    assert_eq!(audio.video_start(), Some(90_000));
}

#[test]
fn test_display_tick_is_cheap() {
    let audio = Arc::new(SharedAudioClock::new());
    audio.set_pts(90_000);
    let mut harness = StreamHarness::open(&Config::default(), audio.clone());
    let mut renderer = NullRenderer::new(Rect::sized(1920, 1080));
    let mut perf = PerfMeasure::new("display tick");

    for _ in 0..1000 {
        harness.fill_to(4);
        perf.start();
        harness.stream.on_display_tick(&mut renderer).unwrap();
        perf.stop();
        audio.advance(1800);
    }

    perf.report();
    assert_eq!(perf.samples(), 1000);
    assert!(perf.average() < Duration::from_millis(2));
}
