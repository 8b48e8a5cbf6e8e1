//! Decoder module for surfsync
//!
//! The hardware decode backend itself lives outside this crate. This module
//! holds what sits between it and the display loop: the fixed pool of
//! decode-target surfaces, the ring of decoded surfaces waiting for display,
//! the video clock filter, backend selection and the packet submit loop.

mod hw_accel;
mod input;
mod surface_pool;
mod surface_ring;
mod video_clock;

pub use hw_accel::{select_backend, HwAccelConfig, HwAccelMethod, SoftwareBackend};
pub use input::{
    FrameSink, InputAction, InputPolicy, PacketDecoder, PacketSubmitter, SendStatus, SubmitOutcome,
    DEFAULT_POLL_INTERVAL, DEFAULT_SUBMIT_ATTEMPTS,
};
pub use surface_pool::{with_gpu_context, GpuImport, GpuSurface, SurfacePool};
pub use surface_ring::{EnqueueOutcome, SurfaceRing};
pub use video_clock::{
    filter_pts, nominal_frame_ticks, PtsFilter, VideoClock, DEFAULT_FRAME_TICKS, PTS_REORDER_WINDOW,
};

use crate::utils::error::{Result, SyncError};
use std::fmt;

/// Opaque decode-target handle owned by the decode backend
///
/// The value is whatever the backend uses to name a surface (a VA surface
/// id, a VDPAU handle, a host buffer slot). It is only meaningful to the
/// backend and renderer that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u32);

/// Opaque handle of a transient GPU import (e.g. a texture bound to a surface)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImportHandle(pub u32);

/// Index of a slot in a [`SurfacePool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(usize);

impl SurfaceId {
    /// Create an id from a raw pool index
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw pool index
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Compressed video codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Mpeg2,
    H264,
    Hevc,
    Vp9,
    Av1,
}

impl Codec {
    /// Parse a codec name as reported by a demuxer
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "mpeg2" | "mpeg2video" => Ok(Self::Mpeg2),
            "h264" | "avc" => Ok(Self::H264),
            "h265" | "hevc" => Ok(Self::Hevc),
            "vp9" => Ok(Self::Vp9),
            "av1" => Ok(Self::Av1),
            _ => Err(SyncError::decoder_error(format!("Unknown codec: {}", name))),
        }
    }
}

/// Stream parameters known at stream-open time
#[derive(Debug, Clone, PartialEq)]
pub struct CodecParams {
    /// Codec of the elementary stream
    pub codec: Codec,

    /// Coded width in pixels
    pub width: u32,

    /// Coded height in pixels
    pub height: u32,

    /// Frame rate as (numerator, denominator), if the stream reports one
    pub frame_rate: Option<(u32, u32)>,

    /// Surfaces the codec needs for its reference frames plus display.
    /// `None` falls back to the configured pool capacity.
    pub surfaces_required: Option<usize>,
}

impl CodecParams {
    /// Parameters for a stream of the given codec and size
    pub fn new(codec: Codec, width: u32, height: u32) -> Self {
        Self {
            codec,
            width,
            height,
            frame_rate: None,
            surfaces_required: None,
        }
    }

    /// Set the reported frame rate
    pub fn with_frame_rate(mut self, num: u32, den: u32) -> Self {
        self.frame_rate = Some((num, den));
        self
    }

    /// Set the reported surface requirement
    pub fn with_surfaces(mut self, count: usize) -> Self {
        self.surfaces_required = Some(count);
        self
    }
}

/// Pixel layout of the surfaces a backend hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceFormat {
    Nv12,
    P010,
    Yuv420,
}

/// A decoded picture as delivered by the decode backend
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Pool slot the picture was decoded into
    pub surface: SurfaceId,

    /// Presentation timestamp in 90 kHz ticks
    pub pts: Option<i64>,

    /// Decode-order timestamp in 90 kHz ticks
    pub dts: Option<i64>,

    /// Whether the picture holds two interlaced fields
    pub interlaced: bool,
}

impl DecodedFrame {
    /// A progressive frame with a presentation timestamp
    pub fn new(surface: SurfaceId, pts: Option<i64>) -> Self {
        Self {
            surface,
            pts,
            dts: None,
            interlaced: false,
        }
    }
}

/// Capability set of a hardware (or host-memory) decode backend
///
/// One implementation exists per backend; [`select_backend`] picks one when a
/// stream is opened and it stays fixed for the lifetime of the stream.
pub trait DecodeBackend: Send + Sync {
    /// Acceleration method implemented by this backend
    fn method(&self) -> HwAccelMethod;

    /// Check if this backend can decode the given codec
    fn supports_codec(&self, codec: Codec) -> bool;

    /// Pixel layout of surfaces created for these parameters
    fn surface_format(&self, params: &CodecParams) -> SurfaceFormat;

    /// Create one decode-target surface
    ///
    /// Called with the GPU context lock held.
    fn create_surface(&self, params: &CodecParams) -> Result<SurfaceHandle>;

    /// Destroy a surface previously returned by `create_surface`
    ///
    /// Called exactly once per surface, with the GPU context lock held.
    fn destroy_surface(&self, handle: SurfaceHandle);

    /// Import a surface for rendering (texture binding)
    fn import_surface(&self, handle: SurfaceHandle) -> Result<ImportHandle>;

    /// Destroy an import previously returned by `import_surface`
    fn destroy_import(&self, import: ImportHandle);
}

/// Surface allocation as seen by a decoder producing frames
///
/// `get_free_surface` never blocks: `None` means the pool is exhausted.
pub trait SurfaceSource {
    /// Take a free surface for the next picture
    fn get_free_surface(&self) -> Option<(SurfaceId, SurfaceHandle)>;

    /// Give back a surface that will not be delivered as a frame
    fn release_surface(&self, id: SurfaceId);
}

/// A compressed packet handed to the decoder
#[derive(Debug, Clone, Default)]
pub struct Packet {
    /// Presentation timestamp in 90 kHz ticks
    pub pts: Option<i64>,

    /// Decode timestamp in 90 kHz ticks
    pub dts: Option<i64>,

    /// Compressed payload
    pub data: Vec<u8>,
}
