//! ESP3 framing.
//!
//! The wire format is:
//! ```text
//! ┌──────┬─────────────┬─────────┬──────┬──────────┬──────┬──────────┬──────────┐
//! │ 0x55 │ data_len BE │ opt_len │ type │ CRC8 hdr │ data │ opt data │ CRC8 dat │
//! │  1   │      2      │    1    │  1   │    1     │  n   │    m     │    1     │
//! └──────┴─────────────┴─────────┴──────┴──────────┴──────┴──────────┴──────────┘
//! ```
//! Both checks are CRC-8/SMBUS (polynomial 0x07, init 0).

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};
use crc::{CRC_8_SMBUS, Crc};

use crate::error::FrameError;
use crate::protocol::Framer;
use crate::protocol::packet::{Packet, PacketType};

/// Sync byte starting every ESP3 packet.
pub const SYNC_BYTE: u8 = 0x55;

/// Header length (data length, optional length, packet type).
pub const HEADER_LEN: usize = 4;

/// Header plus its CRC8.
const HEADER_WINDOW: usize = HEADER_LEN + 1;

/// Maximum data length expressible in the header.
pub const MAX_DATA_LEN: usize = u16::MAX as usize;

/// Maximum optional data length expressible in the header.
pub const MAX_OPTIONAL_LEN: usize = u8::MAX as usize;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Computes the ESP3 CRC8 of `data`.
#[must_use]
pub fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

/// Encodes a packet into an ESP3 frame.
pub fn encode(packet: &Packet) -> Result<Bytes, FrameError> {
    let payload = packet.payload();
    let optional = packet.optional_payload();

    let data_len = u16::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: MAX_DATA_LEN,
    })?;
    let optional_len = u8::try_from(optional.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: optional.len(),
        max: MAX_OPTIONAL_LEN,
    })?;

    let mut header = [0u8; HEADER_LEN];
    header[..2].copy_from_slice(&data_len.to_be_bytes());
    header[2] = optional_len;
    header[3] = packet.packet_type().as_byte();

    let mut digest = CRC8.digest();
    digest.update(payload);
    digest.update(optional);

    let mut buf = BytesMut::with_capacity(1 + HEADER_WINDOW + payload.len() + optional.len() + 1);
    buf.put_u8(SYNC_BYTE);
    buf.put_slice(&header);
    buf.put_u8(crc8(&header));
    buf.put_slice(payload);
    buf.put_slice(optional);
    buf.put_u8(digest.finalize());
    Ok(buf.freeze())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadingState {
    WaitingForSyncByte,
    ReadingHeader,
    ReadingData,
}

/// Byte-at-a-time ESP3 decoder with CRC8 validation and resynchronization.
#[derive(Debug)]
pub struct Esp3Framer {
    state: ReadingState,
    header: [u8; HEADER_WINDOW],
    header_pos: usize,
    data: BytesMut,
    data_length: usize,
    optional_length: usize,
    packet_type: PacketType,
    ready: VecDeque<Packet>,
}

impl Default for Esp3Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp3Framer {
    /// Creates a new framer waiting for a sync byte.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ReadingState::WaitingForSyncByte,
            header: [0u8; HEADER_WINDOW],
            header_pos: 0,
            data: BytesMut::new(),
            data_length: 0,
            optional_length: 0,
            packet_type: PacketType::Unknown(0),
            ready: VecDeque::new(),
        }
    }

    fn push(&mut self, byte: u8) {
        let mut pending = VecDeque::from([byte]);
        while let Some(byte) = pending.pop_front() {
            if let Some(replay) = self.step(byte) {
                // Replayed bytes precede anything still pending.
                for &b in replay.iter().rev() {
                    pending.push_front(b);
                }
            }
        }
    }

    /// Advances the state machine by one byte.
    ///
    /// Returns bytes that must be fed again after a resynchronization.
    fn step(&mut self, byte: u8) -> Option<Vec<u8>> {
        match self.state {
            ReadingState::WaitingForSyncByte => {
                if byte == SYNC_BYTE {
                    self.start_header();
                }
                None
            }
            ReadingState::ReadingHeader => {
                self.header[self.header_pos] = byte;
                self.header_pos += 1;
                if self.header_pos < HEADER_WINDOW {
                    return None;
                }

                if self.accept_header() {
                    return None;
                }

                tracing::debug!("ESP3 header malformed: {}", hex::encode(self.header));
                let window = self.header;
                self.resync(&window)
            }
            ReadingState::ReadingData => {
                if self.data.len() < self.data_length + self.optional_length {
                    self.data.put_u8(byte);
                    return None;
                }

                if crc8(&self.data) == byte {
                    self.complete();
                    return None;
                }

                tracing::debug!(
                    "ESP3 data CRC mismatch for {} byte packet, resynchronizing",
                    self.data.len()
                );
                let mut window = std::mem::take(&mut self.data).to_vec();
                window.push(byte);
                self.resync(&window)
            }
        }
    }

    fn start_header(&mut self) {
        self.state = ReadingState::ReadingHeader;
        self.header_pos = 0;
    }

    /// Validates a complete header window and prepares for the data span.
    fn accept_header(&mut self) -> bool {
        let header = &self.header[..HEADER_LEN];
        if crc8(header) != self.header[HEADER_LEN] {
            return false;
        }

        let data_length = usize::from(u16::from_be_bytes([header[0], header[1]]));
        let optional_length = usize::from(header[2]);
        if data_length + optional_length == 0 {
            return false;
        }

        self.data_length = data_length;
        self.optional_length = optional_length;
        self.packet_type = PacketType::from_byte(header[3]);
        self.data.clear();
        self.data.reserve(data_length + optional_length);
        self.state = ReadingState::ReadingData;
        true
    }

    /// Restarts header search inside `window`.
    ///
    /// If `window` holds a sync byte, the bytes after the first one are
    /// returned for replay so a frame starting mid-buffer is not lost.
    fn resync(&mut self, window: &[u8]) -> Option<Vec<u8>> {
        self.reset();
        let pos = window.iter().position(|&b| b == SYNC_BYTE)?;
        self.start_header();
        Some(window[pos + 1..].to_vec())
    }

    fn complete(&mut self) {
        let mut payload = std::mem::take(&mut self.data);
        let optional = payload.split_off(self.data_length).freeze();
        let payload = payload.freeze();
        let packet_type = self.packet_type;
        self.reset();

        tracing::trace!(
            "ESP3 packet type 0x{:02x}: {} / {}",
            packet_type.as_byte(),
            hex::encode(&payload),
            hex::encode(&optional)
        );

        match Packet::from_parts(packet_type, payload, optional) {
            Ok(packet) => self.ready.push_back(packet),
            Err(e) => tracing::debug!("dropping ESP3 packet: {}", e),
        }
    }
}

impl Framer for Esp3Framer {
    fn feed(&mut self, data: &[u8]) {
        for &byte in data {
            self.push(byte);
        }
    }

    fn decode(&mut self) -> Option<Packet> {
        self.ready.pop_front()
    }

    fn is_searching(&self) -> bool {
        self.state == ReadingState::WaitingForSyncByte
    }

    fn reset(&mut self) {
        self.state = ReadingState::WaitingForSyncByte;
        self.header_pos = 0;
        self.data.clear();
        self.data_length = 0;
        self.optional_length = 0;
        self.packet_type = PacketType::Unknown(0);
    }
}
