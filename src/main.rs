use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use crossbeam_channel::{bounded, select, tick, Receiver};
use env_logger::Env;
use log::{error, info};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use surfsync::audio::{
    AudioSubsystem, DriftCorrector, DriftUpdate, ResampleCompensator, SharedAudioClock,
};
use surfsync::decoder::{
    select_backend, Codec, CodecParams, DecodedFrame, InputAction, InputPolicy, Packet,
    PacketDecoder, PacketSubmitter, SendStatus, SubmitOutcome, SurfaceSource,
};
use surfsync::renderer::{NullRenderer, Rect};
use surfsync::utils::{format_ticks, ms_to_ticks};
use surfsync::{Config, DecoderRegistry, VideoStream};

/// surfsync - run a simulated stream through the surface pool and A/V sync engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Codec of the simulated stream (mpeg2, h264, hevc, vp9, av1)
    #[arg(long, default_value = "h264")]
    codec: String,

    /// Frame rate of the simulated stream
    #[arg(long, default_value = "50")]
    fps: u32,

    /// Deliver interlaced frames and tick at field rate
    #[arg(short, long)]
    interlaced: bool,

    /// Start video this many milliseconds ahead of audio (negative: behind)
    #[arg(long, value_name = "MS", default_value = "0", allow_hyphen_values = true)]
    offset_ms: i64,

    /// Audio clock error in parts per million
    #[arg(long, value_name = "PPM", default_value = "0", allow_hyphen_values = true)]
    drift_ppm: i64,

    /// Show every picture for this many ticks
    #[arg(long, default_value = "0")]
    trick_speed: u32,

    /// Enable 50 to 60 Hz pulldown
    #[arg(long)]
    pulldown: bool,

    /// Do not sync video to audio
    #[arg(long = "free-run", action = ArgAction::SetFalse)]
    sync_to_audio: bool,

    /// Number of frames to decode
    #[arg(short, long, default_value = "500")]
    frames: u64,

    /// Run this many times faster than real time
    #[arg(long, default_value = "1.0")]
    time_scale: f64,

    /// Configuration file (defaults to the system and user config files)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print final statistics as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };
    config.sync.pulldown_60hz |= args.pulldown;
    config.sync.sync_to_audio &= args.sync_to_audio;

    let log_level = if args.debug { "debug" } else { config.general.log_level.as_str() };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting surfsync v{}", env!("CARGO_PKG_VERSION"));

    if args.fps == 0 || args.time_scale <= 0.0 {
        anyhow::bail!("fps and time scale must be positive");
    }

    let params = stream_params(&args)?;
    let backend = select_backend(&config.video, &params, &[])?;
    let audio = Arc::new(SharedAudioClock::new());

    let stream = Arc::new(VideoStream::open(backend, params, audio.clone(), &config)?);
    stream.set_trick_speed(args.trick_speed);

    let mut registry = DecoderRegistry::new(config.sync.sync_to_audio);
    let id = registry.register(Arc::clone(&stream));

    let sim = Simulation::new(&args);
    audio.set_pts(sim.start_pts - ms_to_ticks(args.offset_ms));
    audio.set_output_delay(ms_to_ticks(40));

    let (done_tx, done_rx) = bounded::<()>(0);

    let producer = {
        let stream = Arc::clone(&stream);
        let sim = sim.clone();
        thread::Builder::new()
            .name("surfsync-decode".into())
            .spawn(move || run_producer(&stream, &sim))?
    };

    let audio_thread = {
        let audio = Arc::clone(&audio);
        let sim = sim.clone();
        let done = done_rx.clone();
        let corrector = DriftCorrector::from_config(&config.audio);
        thread::Builder::new()
            .name("surfsync-audio".into())
            .spawn(move || run_audio(&audio, corrector, &sim, &done))?
    };

    let result = run_display(&stream, &sim);

    drop(done_tx);
    if producer.join().is_err() {
        error!("Decode thread panicked");
    }
    let corrections = audio_thread.join().unwrap_or_else(|_| {
        error!("Audio thread panicked");
        0
    });

    let renderer = result?;
    let stats = stream.stats();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("frames decoded:   {}", stats.frame_counter);
        println!("ticks displayed:  {}", stats.frames_displayed);
        println!("duplicated:       {}", stats.frames_duped);
        println!("dropped:          {}", stats.frames_dropped);
        println!("rejected:         {}", stats.frames_rejected);
        println!("black pictures:   {}", renderer.stats().black_paints);
        println!("last diff:        {:?} ticks", stats.last_diff);
        println!("video clock:      {}", format_ticks(stats.video_clock));
        println!("audio clock:      {}", format_ticks(audio.clock()));
        println!("drift corrections: {}", corrections);
    }

    if let Some(stream) = registry.remove(id) {
        stream.teardown();
    }
    Ok(())
}

/// Parameters of the simulated stream
fn stream_params(args: &Args) -> Result<CodecParams> {
    let codec = Codec::from_name(&args.codec)?;
    Ok(CodecParams::new(codec, 720, 576).with_frame_rate(args.fps, 1))
}

/// Timing of the simulated stream
#[derive(Debug, Clone)]
struct Simulation {
    frames: u64,
    frame_ticks: i64,
    interlaced: bool,
    drift_ppm: i64,
    start_pts: i64,
    time_scale: f64,
    tick_period: Duration,
}

impl Simulation {
    fn new(args: &Args) -> Self {
        let fields = if args.interlaced { 2 } else { 1 };
        Self {
            frames: args.frames,
            frame_ticks: 90_000 / args.fps as i64,
            interlaced: args.interlaced,
            drift_ppm: args.drift_ppm,
            start_pts: 90_000,
            time_scale: args.time_scale,
            tick_period: Duration::from_secs_f64(1.0 / (args.fps * fields) as f64),
        }
    }

    /// Wall-clock interval for `sim` of simulated time
    fn scaled(&self, sim: Duration) -> Duration {
        sim.div_f64(self.time_scale)
    }
}

/// Decoder that turns each packet into one frame after a short delay
struct SimDecoder {
    pending: VecDeque<Packet>,
    depth: usize,
    interlaced: bool,
}

impl PacketDecoder for SimDecoder {
    fn send_packet(&mut self, packet: &Packet) -> surfsync::Result<SendStatus> {
        if self.pending.len() >= self.depth {
            return Ok(SendStatus::Again);
        }
        self.pending.push_back(packet.clone());
        Ok(SendStatus::Accepted)
    }

    fn receive_frame(&mut self, surfaces: &dyn SurfaceSource) -> surfsync::Result<Option<DecodedFrame>> {
        // Keep one packet in flight to model decoder latency.
        if self.pending.len() < self.depth {
            return Ok(None);
        }
        let (surface, _) = match surfaces.get_free_surface() {
            Some(surface) => surface,
            None => return Ok(None),
        };
        let packet = match self.pending.pop_front() {
            Some(packet) => packet,
            None => {
                surfaces.release_surface(surface);
                return Ok(None);
            }
        };
        Ok(Some(DecodedFrame {
            surface,
            pts: packet.pts,
            dts: packet.dts,
            interlaced: self.interlaced,
        }))
    }
}

fn run_producer(stream: &VideoStream, sim: &Simulation) {
    let mut decoder = SimDecoder {
        pending: VecDeque::new(),
        depth: 2,
        interlaced: sim.interlaced,
    };
    let submitter = PacketSubmitter::default();
    let policy = InputPolicy::default();
    let mut next = 0;

    while next < sim.frames {
        match stream.input_action(&policy) {
            InputAction::Pull => {
                let pts = sim.start_pts + next as i64 * sim.frame_ticks;
                let packet = Packet {
                    pts: Some(pts),
                    dts: Some(pts),
                    data: vec![0; 188],
                };
                match submitter.submit(&mut decoder, stream, &packet) {
                    Ok(SubmitOutcome::Accepted { .. }) => next += 1,
                    Ok(SubmitOutcome::Rejected { .. }) => thread::sleep(sim.scaled(sim.tick_period)),
                    Err(e) => {
                        error!("Decode failed: {}", e);
                        break;
                    }
                }
            }
            InputAction::Poll(interval) => thread::sleep(sim.scaled(interval)),
            InputAction::Stop => break,
        }
    }

    info!("Decoded {} frames, closing stream", next);
    stream.set_closing();
}

/// Advance the audio clock in 20 ms periods and run drift correction
fn run_audio(audio: &SharedAudioClock, mut corrector: DriftCorrector, sim: &Simulation, done: &Receiver<()>) -> u64 {
    struct LoggingResampler;

    impl ResampleCompensator for LoggingResampler {
        fn set_compensation(&mut self, sample_delta: i32, distance: i32) -> surfsync::Result<()> {
            log::debug!("Resampler compensation {} samples over {}", sample_delta, distance);
            Ok(())
        }
    }

    let period = Duration::from_millis(20);
    let ticker = tick(sim.scaled(period));
    let step = ms_to_ticks(20) * (1_000_000 + sim.drift_ppm) / 1_000_000;
    let start = Instant::now();
    let mut elapsed = Duration::ZERO;
    let mut resampler = LoggingResampler;
    let mut corrections = 0;

    loop {
        select! {
            recv(ticker) -> _ => {
                audio.advance(step);
                elapsed += period;

                if let Some(ms) = audio.take_requested_delay() {
                    log::debug!("Inserting {} ms of audio delay", ms);
                    audio.advance(-ms_to_ticks(ms as i64));
                }

                if let Some(pts) = audio.clock() {
                    let now = start + elapsed;
                    if let DriftUpdate::Corrected(compensation) = corrector.update(now, pts, audio.output_delay()) {
                        match corrector.apply(&compensation, &mut resampler) {
                            Ok(()) => corrections += 1,
                            Err(e) => error!("Drift correction failed: {}", e),
                        }
                    }
                }
            }
            recv(done) -> _ => break,
        }
    }
    corrections
}

fn run_display(stream: &VideoStream, sim: &Simulation) -> surfsync::Result<NullRenderer> {
    let mut renderer = NullRenderer::new(Rect::sized(1920, 1080));
    let ticker = tick(sim.scaled(sim.tick_period));
    let fields = if sim.interlaced { 2 } else { 1 };
    let max_ticks = sim.frames * fields * 4 + 1000;

    for _ in 0..max_ticks {
        if ticker.recv().is_err() {
            break;
        }
        stream.on_display_tick(&mut renderer)?;

        if stream.phase().is_drained() && stream.ring().filled() <= 1 {
            break;
        }
    }
    Ok(renderer)
}
