//! surfsync - hardware video surface management and A/V sync
//!
//! The crate sits between a hardware decode backend, a renderer and an
//! audio output. Per decoder it keeps a fixed pool of decode surfaces, a
//! lock-free ring of decoded surfaces waiting for display and a filtered
//! video clock, and it decides every display tick whether to show the next
//! picture, repeat the current one or skip one to stay in sync with audio.
//! On the audio side a drift corrector keeps the resampler locked to wall
//! time.

pub mod audio;
pub mod decoder;
pub mod player;
pub mod renderer;
pub mod utils;

pub use player::{DecoderRegistry, VideoStream};
pub use utils::{Config, Result, SyncError};
