//! Ring of decoded surfaces waiting for display
//!
//! Single producer (the decode callback), single consumer (the display
//! tick). The producer owns `write`, the consumer owns `read`, and `filled`
//! is the only counter both sides touch: the producer only increments it,
//! the consumer only decrements it.
//!
//! The surface at `read` is the one on screen. It stays counted in
//! `filled` until the consumer advances past it.

use crate::decoder::SurfaceId;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Result of offering a surface to the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The surface is queued for display
    Accepted,

    /// The ring was full; the surface was not queued and the caller still owns it
    Dropped(SurfaceId),
}

/// Fixed-capacity SPSC ring of surface indices
pub struct SurfaceRing {
    slots: Box<[AtomicUsize]>,
    write: AtomicUsize,
    read: AtomicUsize,
    filled: AtomicUsize,
    dropped: AtomicU64,
}

impl SurfaceRing {
    /// Create an empty ring holding at most `capacity` surfaces
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "surface ring capacity must be non-zero");
        Self {
            slots: (0..capacity).map(|_| AtomicUsize::new(usize::MAX)).collect(),
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            filled: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Maximum number of queued surfaces
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of queued surfaces, including the one on screen
    pub fn filled(&self) -> usize {
        self.filled.load(Ordering::Acquire)
    }

    /// Whether the next enqueue would be dropped
    pub fn is_full(&self) -> bool {
        self.filled() >= self.capacity()
    }

    /// Surfaces rejected because the ring was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Producer side: queue a surface for display
    ///
    /// A full ring rejects the new surface; queued surfaces are never
    /// reordered or overwritten.
    pub fn enqueue(&self, id: SurfaceId) -> EnqueueOutcome {
        if self.is_full() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return EnqueueOutcome::Dropped(id);
        }

        let write = self.write.load(Ordering::Relaxed);
        self.slots[write].store(id.index(), Ordering::Relaxed);
        self.write.store((write + 1) % self.capacity(), Ordering::Relaxed);
        // Publishes the slot store to the consumer.
        self.filled.fetch_add(1, Ordering::Release);
        EnqueueOutcome::Accepted
    }

    /// Consumer side: the surface at the read cursor
    pub fn peek(&self) -> Option<SurfaceId> {
        if self.filled() == 0 {
            return None;
        }
        let read = self.read.load(Ordering::Relaxed);
        Some(SurfaceId::new(self.slots[read].load(Ordering::Relaxed)))
    }

    /// Consumer side: move past the surface at the read cursor
    ///
    /// Only succeeds when at least `min_filled` surfaces are queued, so the
    /// next candidate is available once the current one is retired. Returns
    /// the retired surface, which the caller must release to its pool.
    pub fn advance(&self, min_filled: usize) -> Option<SurfaceId> {
        let filled = self.filled();
        if filled == 0 || filled < min_filled {
            return None;
        }

        let read = self.read.load(Ordering::Relaxed);
        let retired = SurfaceId::new(self.slots[read].load(Ordering::Relaxed));
        self.read.store((read + 1) % self.capacity(), Ordering::Relaxed);
        // Hands the slot back to the producer only after it was read.
        self.filled.fetch_sub(1, Ordering::AcqRel);
        Some(retired)
    }

    /// Consumer side: remove every queued surface, oldest first
    pub fn drain(&self) -> Vec<SurfaceId> {
        let mut drained = Vec::with_capacity(self.filled());
        while let Some(id) = self.advance(1) {
            drained.push(id);
        }
        drained
    }
}
