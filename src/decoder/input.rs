//! Packet submission and decode-input pacing
//!
//! The producer side pushes compressed packets into the decode backend and
//! collects the pictures it returns. A backend that is full answers
//! [`SendStatus::Again`]; the submitter then drains decoded frames and
//! tries again, a bounded number of times.

use crate::decoder::{DecodedFrame, EnqueueOutcome, Packet, SurfaceSource};
use crate::utils::error::Result;
use std::time::Duration;

/// Attempts made for one packet before giving up
pub const DEFAULT_SUBMIT_ATTEMPTS: u32 = 8;

/// Sleep between input polls while the ring is nearly full
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Whether the decoder took a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The packet was consumed
    Accepted,

    /// The decoder has no room; drain frames and resend
    Again,
}

/// A decoder fed with compressed packets
pub trait PacketDecoder {
    /// Offer a packet to the decoder
    fn send_packet(&mut self, packet: &Packet) -> Result<SendStatus>;

    /// Fetch the next decoded picture, if one is ready
    ///
    /// Surfaces for new pictures come from `surfaces`; a decoder that cannot
    /// get one returns `Ok(None)` and retries later.
    fn receive_frame(&mut self, surfaces: &dyn SurfaceSource) -> Result<Option<DecodedFrame>>;
}

/// Destination of decoded pictures
pub trait FrameSink: SurfaceSource {
    /// Hand a decoded picture to the display side
    fn on_decoded_frame(&self, frame: DecodedFrame) -> EnqueueOutcome;
}

/// Result of submitting one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The decoder took the packet
    Accepted { attempts: u32, frames: usize },

    /// The decoder stayed full for every attempt; the packet was not consumed
    Rejected { attempts: u32, frames: usize },
}

impl SubmitOutcome {
    /// Frames delivered to the sink while submitting
    pub fn frames(&self) -> usize {
        match *self {
            Self::Accepted { frames, .. } | Self::Rejected { frames, .. } => frames,
        }
    }
}

/// Bounded send/receive loop for one decoder
#[derive(Debug, Clone)]
pub struct PacketSubmitter {
    max_attempts: u32,
}

impl PacketSubmitter {
    /// Create a submitter that tries each packet at most `max_attempts` times
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Submit a packet, draining decoded frames into `sink` between attempts
    pub fn submit<S: FrameSink>(
        &self,
        decoder: &mut dyn PacketDecoder,
        sink: &S,
        packet: &Packet,
    ) -> Result<SubmitOutcome> {
        let mut frames = 0;

        for attempt in 1..=self.max_attempts {
            let status = decoder.send_packet(packet)?;
            frames += Self::drain(decoder, sink)?;

            if status == SendStatus::Accepted {
                return Ok(SubmitOutcome::Accepted {
                    attempts: attempt,
                    frames,
                });
            }
            log::trace!("Decoder full, resending packet (attempt {})", attempt);
        }

        log::warn!(
            "Decoder refused packet pts {:?} after {} attempts",
            packet.pts,
            self.max_attempts
        );
        Ok(SubmitOutcome::Rejected {
            attempts: self.max_attempts,
            frames,
        })
    }

    /// Move every ready picture from the decoder into the sink
    pub fn drain<S: FrameSink>(decoder: &mut dyn PacketDecoder, sink: &S) -> Result<usize> {
        let mut frames = 0;
        while let Some(frame) = decoder.receive_frame(sink)? {
            sink.on_decoded_frame(frame);
            frames += 1;
        }
        Ok(frames)
    }
}

impl Default for PacketSubmitter {
    fn default() -> Self {
        Self::new(DEFAULT_SUBMIT_ATTEMPTS)
    }
}

/// What the input loop should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    /// Read and submit the next packet now
    Pull,

    /// The ring is nearly full; wait this long before checking again
    Poll(Duration),

    /// The stream is drained; stop reading input
    Stop,
}

/// Fill-driven pacing of decode input
#[derive(Debug, Clone)]
pub struct InputPolicy {
    poll_interval: Duration,
}

impl InputPolicy {
    /// Create a policy that sleeps `poll_interval` while the ring is nearly full
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Decide from the current ring fill
    pub fn decide(&self, filled: usize, capacity: usize, drained: bool) -> InputAction {
        if drained {
            InputAction::Stop
        } else if filled + 1 >= capacity {
            InputAction::Poll(self.poll_interval)
        } else {
            InputAction::Pull
        }
    }
}

impl Default for InputPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}
