//! Registry of active decoder instances
//!
//! Streams live in an arena indexed by [`DecoderId`]; freed slots are
//! reused. The first live stream owns audio sync, the others free-run.

use crate::player::VideoStream;
use std::fmt;
use std::sync::Arc;

/// Index of a stream in a [`DecoderRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecoderId(usize);

impl fmt::Display for DecoderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decoder {}", self.0)
    }
}

/// Arena of active streams
pub struct DecoderRegistry {
    slots: Vec<Option<Arc<VideoStream>>>,
    sync_enabled: bool,
}

impl DecoderRegistry {
    /// Create an empty registry
    ///
    /// With `sync_enabled` false no stream is ever given audio sync.
    pub fn new(sync_enabled: bool) -> Self {
        Self {
            slots: Vec::new(),
            sync_enabled,
        }
    }

    /// Add a stream; it owns audio sync only if no other live stream does
    pub fn register(&mut self, stream: Arc<VideoStream>) -> DecoderId {
        let owns_sync = self.sync_enabled && self.audio_owner().is_none();
        stream.set_sync_to_audio(owns_sync);

        let index = match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(stream);
                index
            }
            None => {
                self.slots.push(Some(stream));
                self.slots.len() - 1
            }
        };

        let id = DecoderId(index);
        log::info!("Registered {} (audio sync: {})", id, owns_sync);
        id
    }

    /// Remove a stream, handing audio sync to the next live one
    pub fn remove(&mut self, id: DecoderId) -> Option<Arc<VideoStream>> {
        let stream = self.slots.get_mut(id.0)?.take()?;

        if stream.syncs_to_audio() {
            stream.set_sync_to_audio(false);
            if let Some((next, heir)) = self.iter().next() {
                heir.set_sync_to_audio(true);
                log::info!("Audio sync handed from {} to {}", id, next);
            }
        }
        Some(stream)
    }

    /// Stream registered under `id`
    pub fn get(&self, id: DecoderId) -> Option<&Arc<VideoStream>> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// The stream that currently owns audio sync
    pub fn audio_owner(&self) -> Option<DecoderId> {
        self.iter().find(|(_, s)| s.syncs_to_audio()).map(|(id, _)| id)
    }

    /// Live streams in index order
    pub fn iter(&self) -> impl Iterator<Item = (DecoderId, &Arc<VideoStream>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (DecoderId(i), s)))
    }

    /// Number of live streams
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether no stream is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
