//! Integration test utilities for surfsync

use std::path::PathBuf;
use std::sync::Arc;
use surfsync::audio::AudioSubsystem;
use surfsync::decoder::{
    Codec, CodecParams, DecodedFrame, EnqueueOutcome, SoftwareBackend, SurfaceSource,
};
use surfsync::{Config, VideoStream};
use tempfile::TempDir;

/// Scratch directory for configuration files
pub struct TestFixture {
    pub temp_dir: TempDir,
}

impl TestFixture {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    /// Path for a file inside the fixture directory
    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Write `contents` to `name` and return its path
    pub fn write(&self, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.path(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Serialize `config` into the fixture directory
    pub fn write_config(&self, config: &Config) -> anyhow::Result<PathBuf> {
        let path = self.path("config.toml");
        config.save_to(&path)?;
        Ok(path)
    }
}

/// A stream on the software backend plus a frame generator feeding it
pub struct StreamHarness {
    pub backend: Arc<SoftwareBackend>,
    pub stream: Arc<VideoStream>,
    pub next_pts: i64,
    pub frame_ticks: i64,
    pub interlaced: bool,
}

impl StreamHarness {
    /// 720x576 at 50 fps, first pts 90000
    pub fn open(config: &Config, audio: Arc<dyn AudioSubsystem>) -> Self {
        let backend = Arc::new(SoftwareBackend::new());
        let params = CodecParams::new(Codec::H264, 720, 576).with_frame_rate(50, 1);
        let stream = VideoStream::open(backend.clone(), params, audio, config)
            .expect("stream open on software backend");
        Self {
            backend,
            stream: Arc::new(stream),
            next_pts: 90_000,
            frame_ticks: 1800,
            interlaced: false,
        }
    }

    pub fn interlaced(mut self) -> Self {
        self.interlaced = true;
        self
    }

    /// Decode one picture into a free surface and hand it to the stream
    pub fn push(&mut self) -> EnqueueOutcome {
        let (surface, _) = self
            .stream
            .get_free_surface()
            .expect("pool exhausted");
        let mut frame = DecodedFrame::new(surface, Some(self.next_pts));
        frame.interlaced = self.interlaced;
        self.next_pts += self.frame_ticks;
        self.stream.on_decoded_frame(frame)
    }

    /// Push until the ring holds `filled` pictures
    pub fn fill_to(&mut self, filled: usize) {
        while self.stream.ring().filled() < filled {
            assert_eq!(self.push(), EnqueueOutcome::Accepted);
        }
    }
}

/// Mock implementations of the traits the stream talks to
pub mod mocks {
    use mockall::mock;
    use surfsync::audio::AudioSubsystem;
    use surfsync::decoder::CodecParams;
    use surfsync::renderer::{PaintSource, Rect, Renderer};

    mock! {
        pub Audio {}

        impl AudioSubsystem for Audio {
            fn clock(&self) -> Option<i64>;
            fn output_delay(&self) -> i64;
            fn request_output_delay(&self, ms: u32);
            fn notify_video_clock_established(&self, pts: i64);
        }
    }

    mock! {
        pub Display {}

        impl Renderer for Display {
            fn paint(
                &mut self,
                source: PaintSource,
                params: &CodecParams,
                crop: Rect,
                output: Rect,
            ) -> surfsync::Result<()>;
            fn paint_black(&mut self, output: Rect) -> surfsync::Result<()>;
            fn output_rect(&self) -> Rect;
        }
    }
}

/// Utilities for testing audio/video synchronization
pub mod sync_test {
    /// Records video minus audio once per tick
    #[derive(Debug, Default)]
    pub struct SyncTester {
        diffs: Vec<Option<i64>>,
        dropped: Vec<u64>,
    }

    impl SyncTester {
        pub fn new() -> Self {
            Self::default()
        }

        /// Record the clocks and the running drop count before a tick
        pub fn record(&mut self, video: Option<i64>, audio: Option<i64>, dropped: u64) {
            let diff = match (video, audio) {
                (Some(video), Some(audio)) => Some(video - audio),
                _ => None,
            };
            self.diffs.push(diff);
            self.dropped.push(dropped);
        }

        pub fn diffs(&self) -> &[Option<i64>] {
            &self.diffs
        }

        /// First tick from which every recorded diff stays within `tolerance`
        pub fn converged_at(&self, tolerance: i64) -> Option<usize> {
            let within = |d: &Option<i64>| matches!(d, Some(d) if d.abs() <= tolerance);
            let last_outside = self.diffs.iter().rposition(|d| !within(d));
            match last_outside {
                None if !self.diffs.is_empty() => Some(0),
                None => None,
                Some(i) if i + 1 < self.diffs.len() => Some(i + 1),
                Some(_) => None,
            }
        }

        /// Largest number of pictures dropped between two recordings
        pub fn max_drops_per_tick(&self) -> u64 {
            self.dropped
                .windows(2)
                .map(|w| w[1] - w[0])
                .max()
                .unwrap_or(0)
        }
    }
}

/// Performance measurement utilities
pub mod perf_test {
    use std::time::{Duration, Instant};

    pub struct PerfMeasure {
        name: String,
        start: Instant,
        measurements: Vec<Duration>,
    }

    impl PerfMeasure {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                start: Instant::now(),
                measurements: Vec::new(),
            }
        }

        pub fn start(&mut self) {
            self.start = Instant::now();
        }

        pub fn stop(&mut self) {
            self.measurements.push(self.start.elapsed());
        }

        pub fn samples(&self) -> usize {
            self.measurements.len()
        }

        pub fn average(&self) -> Duration {
            if self.measurements.is_empty() {
                return Duration::ZERO;
            }

            let sum: Duration = self.measurements.iter().sum();
            sum / self.measurements.len() as u32
        }

        pub fn max(&self) -> Option<Duration> {
            self.measurements.iter().max().copied()
        }

        pub fn report(&self) {
            println!(
                "{}: {} samples, average {:?}, max {:?}",
                self.name,
                self.samples(),
                self.average(),
                self.max().unwrap_or(Duration::ZERO)
            );
        }
    }
}
