//! Fixed pool of decode-target surfaces
//!
//! Every slot owns one backend surface for the whole life of the stream.
//! Slots move between a FIFO free list and the used set; a used slot also
//! owns the decoded frame it holds and any GPU import made from it.
//!
//! Lock order is pool lock, then GPU context lock. The display path takes
//! the GPU lock only to create or destroy an import, never across a paint.

use crate::decoder::{CodecParams, DecodeBackend, DecodedFrame, ImportHandle, SurfaceHandle, SurfaceId};
use crate::utils::error::{Result, SyncError};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Serializes make-current/release of the GPU context around object
/// creation and destruction.
static GPU_CONTEXT_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Run `f` with the GPU context lock held
pub fn with_gpu_context<T>(f: impl FnOnce() -> T) -> T {
    let _guard = GPU_CONTEXT_LOCK.lock();
    f()
}

/// A backend surface that is destroyed exactly once, when dropped
pub struct GpuSurface {
    handle: SurfaceHandle,
    backend: Arc<dyn DecodeBackend>,
}

impl GpuSurface {
    /// Create a surface through the backend
    pub fn create(backend: &Arc<dyn DecodeBackend>, params: &CodecParams) -> Result<Self> {
        let handle = with_gpu_context(|| backend.create_surface(params))?;
        Ok(Self {
            handle,
            backend: Arc::clone(backend),
        })
    }

    /// Backend handle of this surface
    pub fn handle(&self) -> SurfaceHandle {
        self.handle
    }
}

impl Drop for GpuSurface {
    fn drop(&mut self) {
        log::trace!("Destroying surface {:?}", self.handle);
        with_gpu_context(|| self.backend.destroy_surface(self.handle));
    }
}

/// A transient GPU import tied to a pool slot, destroyed exactly once
pub struct GpuImport {
    handle: ImportHandle,
    backend: Arc<dyn DecodeBackend>,
}

impl GpuImport {
    /// Import a surface through the backend
    pub fn create(backend: &Arc<dyn DecodeBackend>, surface: SurfaceHandle) -> Result<Self> {
        let handle = with_gpu_context(|| backend.import_surface(surface))?;
        Ok(Self {
            handle,
            backend: Arc::clone(backend),
        })
    }

    /// Backend handle of this import
    pub fn handle(&self) -> ImportHandle {
        self.handle
    }
}

impl Drop for GpuImport {
    fn drop(&mut self) {
        with_gpu_context(|| self.backend.destroy_import(self.handle));
    }
}

struct Slot {
    surface: GpuSurface,
    in_use: bool,
    frame: Option<DecodedFrame>,
    import: Option<GpuImport>,
}

struct PoolInner {
    slots: Vec<Slot>,
    free: VecDeque<SurfaceId>,
}

impl PoolInner {
    fn used_slot_mut(&mut self, id: SurfaceId, op: &str) -> &mut Slot {
        match self.slots.get_mut(id.index()) {
            Some(slot) if slot.in_use => slot,
            _ => {
                log::error!("{} on surface {} which is not in use", op, id);
                panic!("surface pool: {} on surface {} which is not in use", op, id);
            }
        }
    }
}

/// Fixed-capacity arena of decode-target surfaces for one decoder instance
pub struct SurfacePool {
    inner: Mutex<PoolInner>,
    backend: Arc<dyn DecodeBackend>,
    capacity: usize,
}

impl SurfacePool {
    /// Allocate `capacity` surfaces for a stream
    ///
    /// The capacity is fixed until the pool is dropped. Any allocation
    /// failure releases the surfaces created so far and is returned as
    /// [`SyncError::ResourceCreation`].
    pub fn open(backend: Arc<dyn DecodeBackend>, params: &CodecParams, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SyncError::InvalidInput("Surface pool capacity must be non-zero".to_string()));
        }

        let mut slots = Vec::with_capacity(capacity);
        for index in 0..capacity {
            let surface = GpuSurface::create(&backend, params).map_err(|e| {
                SyncError::resource_error(format!("surface {} of {}: {}", index, capacity, e))
            })?;
            slots.push(Slot {
                surface,
                in_use: false,
                frame: None,
                import: None,
            });
        }

        log::info!(
            "Opened surface pool: {} x {}x{} {:?} surfaces ({:?})",
            capacity,
            params.width,
            params.height,
            backend.surface_format(params),
            backend.method()
        );

        Ok(Self {
            inner: Mutex::new(PoolInner {
                slots,
                free: (0..capacity).map(SurfaceId::new).collect(),
            }),
            backend,
            capacity,
        })
    }

    /// Take the oldest free surface
    ///
    /// Returns `None` when every surface is in use. This is a hard limit;
    /// callers must not wait for a surface to come back.
    pub fn acquire(&self) -> Option<SurfaceId> {
        let mut inner = self.inner.lock();
        let id = inner.free.pop_front()?;
        inner.slots[id.index()].in_use = true;
        Some(id)
    }

    /// Return a used surface to the free list
    ///
    /// Drops the frame and GPU import held by the slot.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not currently in use. The renderer may still be
    /// reading such a surface, so this is never recovered from.
    pub fn release(&self, id: SurfaceId) {
        let (frame, import) = {
            let mut inner = self.inner.lock();
            let slot = inner.used_slot_mut(id, "release");
            slot.in_use = false;
            let frame = slot.frame.take();
            let import = slot.import.take();
            inner.free.push_back(id);
            (frame, import)
        };
        // Import destruction takes the GPU lock; do it after the pool lock is gone.
        drop(import);
        drop(frame);
    }

    /// Store the decoded frame a used surface now holds
    ///
    /// # Panics
    ///
    /// Panics if `id` is not currently in use.
    pub fn attach_frame(&self, id: SurfaceId, frame: DecodedFrame) {
        let mut inner = self.inner.lock();
        inner.used_slot_mut(id, "attach_frame").frame = Some(frame);
    }

    /// Import a used surface for rendering, reusing an existing import
    ///
    /// # Panics
    ///
    /// Panics if `id` is not currently in use.
    pub fn import(&self, id: SurfaceId) -> Result<ImportHandle> {
        let surface = {
            let mut inner = self.inner.lock();
            let slot = inner.used_slot_mut(id, "import");
            if let Some(import) = &slot.import {
                return Ok(import.handle());
            }
            slot.surface.handle()
        };

        let import = GpuImport::create(&self.backend, surface)?;
        let handle = import.handle();

        let mut inner = self.inner.lock();
        inner.used_slot_mut(id, "import").import = Some(import);
        Ok(handle)
    }

    /// Backend handle of a slot
    pub fn handle(&self, id: SurfaceId) -> Option<SurfaceHandle> {
        self.inner.lock().slots.get(id.index()).map(|s| s.surface.handle())
    }

    /// Frame currently held by a used slot
    pub fn frame(&self, id: SurfaceId) -> Option<DecodedFrame> {
        let inner = self.inner.lock();
        inner.slots.get(id.index()).and_then(|s| s.frame.clone())
    }

    /// Whether a slot is currently in use
    pub fn is_used(&self, id: SurfaceId) -> bool {
        self.inner.lock().slots.get(id.index()).map_or(false, |s| s.in_use)
    }

    /// Release every used surface (stream teardown)
    ///
    /// Returns the number of surfaces released.
    pub fn release_all(&self) -> usize {
        let used: Vec<SurfaceId> = {
            let inner = self.inner.lock();
            (0..inner.slots.len())
                .filter(|&i| inner.slots[i].in_use)
                .map(SurfaceId::new)
                .collect()
        };

        for &id in &used {
            self.release(id);
        }
        used.len()
    }

    /// Number of surfaces currently in use
    pub fn used_count(&self) -> usize {
        self.capacity - self.free_count()
    }

    /// Number of free surfaces
    pub fn free_count(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// Total number of surfaces
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
