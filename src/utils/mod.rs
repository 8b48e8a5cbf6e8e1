//! Utility module for surfsync
//!
//! This module provides common utilities used throughout the crate:
//! - Error handling with custom error types
//! - Configuration management
//! - 90 kHz timestamp helpers

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::{AudioConfig, Config, DriftCorrection, GeneralConfig, SyncConfig, VideoConfig};
pub use error::{IntoSyncError, Result, SyncError};

/// Ticks per millisecond of the 90 kHz presentation clock
pub const TICKS_PER_MS: i64 = 90;

/// Convert milliseconds to 90 kHz ticks
pub fn ms_to_ticks(ms: i64) -> i64 {
    ms * TICKS_PER_MS
}

/// Convert 90 kHz ticks to whole milliseconds, rounding toward zero
pub fn ticks_to_ms(ticks: i64) -> i64 {
    ticks / TICKS_PER_MS
}

/// Format an optional 90 kHz timestamp for log output
///
/// # Returns
///
/// `"--:--:--.---"` for an unknown clock, otherwise `"HH:MM:SS.mmm"`
pub fn format_ticks(ticks: Option<i64>) -> String {
    match ticks {
        None => "--:--:--.---".to_string(),
        Some(ticks) => {
            let sign = if ticks < 0 { "-" } else { "" };
            let total_ms = ticks_to_ms(ticks).abs();
            let hours = total_ms / 3_600_000;
            let minutes = (total_ms % 3_600_000) / 60_000;
            let seconds = (total_ms % 60_000) / 1000;
            let millis = total_ms % 1000;
            format!("{}{:02}:{:02}:{:02}.{:03}", sign, hours, minutes, seconds, millis)
        }
    }
}
