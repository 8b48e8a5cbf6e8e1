//! Decode backend selection
//!
//! A stream picks its backend once, at open time. Hardware backends are
//! provided by the embedding application; the host-memory
//! [`SoftwareBackend`] is always available as a fallback.

use crate::decoder::{Codec, CodecParams, DecodeBackend, ImportHandle, SurfaceFormat, SurfaceHandle};
use crate::utils::config::VideoConfig;
use crate::utils::error::{Result, SyncError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Hardware acceleration method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwAccelMethod {
    /// Host-memory surfaces, no hardware acceleration
    None,

    /// NVIDIA CUVID/NVDEC
    Nvdec,

    /// Video Acceleration API (Linux)
    Vaapi,

    /// Video Decode and Presentation API for Unix
    Vdpau,

    /// VideoToolbox (macOS)
    VideoToolbox,

    /// Direct3D11 Video Acceleration (Windows)
    D3d11va,
}

impl HwAccelMethod {
    /// Whether this method decodes on a GPU
    pub fn is_hardware(self) -> bool {
        self != Self::None
    }

    /// Preference order on the current platform, best first
    pub fn platform_preference() -> &'static [HwAccelMethod] {
        if cfg!(target_os = "windows") {
            &[Self::D3d11va, Self::Nvdec]
        } else if cfg!(target_os = "macos") {
            &[Self::VideoToolbox]
        } else {
            &[Self::Vaapi, Self::Nvdec, Self::Vdpau]
        }
    }
}

/// Hardware acceleration configuration
#[derive(Debug, Clone)]
pub struct HwAccelConfig {
    /// Acceleration method to use
    pub method: HwAccelMethod,
}

impl HwAccelConfig {
    /// Pick the best method among `available` for this stream
    ///
    /// Returns `None` when no hardware method supports the codec.
    pub fn detect_best_method(params: &CodecParams, available: &[Arc<dyn DecodeBackend>]) -> Option<Self> {
        HwAccelMethod::platform_preference()
            .iter()
            .copied()
            .find(|&method| {
                available
                    .iter()
                    .any(|b| b.method() == method && b.supports_codec(params.codec))
            })
            .map(|method| Self { method })
    }
}

/// Select the backend for a stream being opened
///
/// With hardware acceleration enabled, the best hardware candidate that
/// supports the codec wins. Otherwise, or if none qualifies, host-memory
/// surfaces are used.
pub fn select_backend(
    config: &VideoConfig,
    params: &CodecParams,
    candidates: &[Arc<dyn DecodeBackend>],
) -> Result<Arc<dyn DecodeBackend>> {
    if config.hw_accel {
        if let Some(accel) = HwAccelConfig::detect_best_method(params, candidates) {
            let backend = candidates
                .iter()
                .find(|b| b.method() == accel.method && b.supports_codec(params.codec))
                .cloned()
                .ok_or_else(|| crate::internal_error!("backend {:?} vanished", accel.method))?;
            log::info!("Using {:?} decode backend for {:?}", accel.method, params.codec);
            return Ok(backend);
        }
        log::warn!("No hardware backend supports {:?}, using host-memory surfaces", params.codec);
    }

    if let Some(software) = candidates.iter().find(|b| b.method() == HwAccelMethod::None) {
        return Ok(Arc::clone(software));
    }
    Ok(Arc::new(SoftwareBackend::new()))
}

/// Host-memory decode surfaces
///
/// Surfaces are plain handles with no device behind them; the backend only
/// tracks which are alive so that leaks and double destruction show up.
pub struct SoftwareBackend {
    next_handle: AtomicU32,
    live_surfaces: Mutex<HashSet<u32>>,
    live_imports: Mutex<HashSet<u32>>,
    limit: Option<usize>,
}

impl SoftwareBackend {
    /// Create a backend without an allocation limit
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU32::new(1),
            live_surfaces: Mutex::new(HashSet::new()),
            live_imports: Mutex::new(HashSet::new()),
            limit: None,
        }
    }

    /// Create a backend that fails once `limit` surfaces are alive
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Number of surfaces created and not yet destroyed
    pub fn live_surfaces(&self) -> usize {
        self.live_surfaces.lock().len()
    }

    /// Number of imports created and not yet destroyed
    pub fn live_imports(&self) -> usize {
        self.live_imports.lock().len()
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeBackend for SoftwareBackend {
    fn method(&self) -> HwAccelMethod {
        HwAccelMethod::None
    }

    fn supports_codec(&self, _codec: Codec) -> bool {
        true
    }

    fn surface_format(&self, _params: &CodecParams) -> SurfaceFormat {
        SurfaceFormat::Yuv420
    }

    fn create_surface(&self, params: &CodecParams) -> Result<SurfaceHandle> {
        if params.width == 0 || params.height == 0 {
            return Err(SyncError::InvalidInput(format!(
                "Surface size {}x{}",
                params.width, params.height
            )));
        }

        let mut live = self.live_surfaces.lock();
        if let Some(limit) = self.limit {
            if live.len() >= limit {
                return Err(SyncError::resource_error(format!(
                    "Host surface limit of {} reached",
                    limit
                )));
            }
        }

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        live.insert(handle);
        Ok(SurfaceHandle(handle))
    }

    fn destroy_surface(&self, handle: SurfaceHandle) {
        if !self.live_surfaces.lock().remove(&handle.0) {
            log::error!("Destroying unknown host surface {:?}", handle);
        }
    }

    fn import_surface(&self, handle: SurfaceHandle) -> Result<ImportHandle> {
        if !self.live_surfaces.lock().contains(&handle.0) {
            return Err(SyncError::InvalidInput(format!("Import of unknown surface {:?}", handle)));
        }
        let import = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.live_imports.lock().insert(import);
        Ok(ImportHandle(import))
    }

    fn destroy_import(&self, import: ImportHandle) {
        if !self.live_imports.lock().remove(&import.0) {
            log::error!("Destroying unknown import {:?}", import);
        }
    }
}
