//! Protocol definitions for EnOcean serial communication.
//!
//! This module contains the low-level protocol types including:
//! - The packet model shared by both protocol versions
//! - ESP2 and ESP3 framing
//! - Common commands and their responses

pub mod command;
pub mod esp2;
pub mod esp3;
pub mod packet;

use bytes::Bytes;

use crate::error::FrameError;

pub use command::{BaseIdResponse, CommonCommand, RepeaterResponse, VersionResponse};
pub use esp2::Esp2Framer;
pub use esp3::Esp3Framer;
pub use packet::{
    EventMessage, EventType, Packet, PacketType, RadioTelegram, RawPacket, Response, ResponseType,
    Rorg, SenderId,
};

/// A byte stream decoder for one protocol version.
///
/// Bytes are consumed one at a time; corrupted frames are dropped and the
/// decoder resynchronizes on its own. Decoding never fails.
pub trait Framer: Send {
    /// Feeds received bytes into the decoder.
    fn feed(&mut self, data: &[u8]);

    /// Returns the next complete packet, if any.
    fn decode(&mut self) -> Option<Packet>;

    /// Returns true while the decoder is looking for the start of a frame.
    fn is_searching(&self) -> bool;

    /// Drops any partial frame.
    fn reset(&mut self);
}

/// EnOcean serial protocol version spoken by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    /// ESP2 (TCM 120 and older gateways).
    Esp2,
    /// ESP3 (TCM 310, USB 300 and newer).
    #[default]
    Esp3,
}

impl ProtocolVersion {
    /// Creates a fresh decoder for this protocol version.
    #[must_use]
    pub fn framer(self) -> Box<dyn Framer> {
        match self {
            Self::Esp2 => Box::new(Esp2Framer::new()),
            Self::Esp3 => Box::new(Esp3Framer::new()),
        }
    }

    /// Serializes a packet for this protocol version.
    pub fn encode(self, packet: &Packet) -> Result<Bytes, FrameError> {
        match self {
            Self::Esp2 => esp2::encode(packet),
            Self::Esp3 => esp3::encode(packet),
        }
    }

    /// Returns the baud rate gateways of this version use.
    #[must_use]
    pub const fn baud_rate(self) -> u32 {
        match self {
            Self::Esp2 => 9_600,
            Self::Esp3 => 57_600,
        }
    }
}
