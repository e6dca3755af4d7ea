//! ESP2 framing.
//!
//! The wire format is:
//! ```text
//! ┌──────┬──────┬─────────────────────┬──────────────┬──────────┐
//! │ 0xA5 │ 0x5A │ H_SEQ:3 │ LENGTH:5  │ data         │ checksum │
//! │  1   │  1   │          1          │ LENGTH - 1   │    1     │
//! └──────┴──────┴─────────────────────┴──────────────┴──────────┘
//! ```
//! `LENGTH` counts every octet after the header, checksum included. The
//! checksum is the low byte of the sum of header and data.
//!
//! ESP2 radio telegrams are mapped onto the ERP1 payload layout used by
//! [`RadioTelegram`], and module messages onto [`Response`], so the rest of
//! the library never sees which protocol version is on the wire.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;
use crate::protocol::Framer;
use crate::protocol::command::CommonCommand;
use crate::protocol::packet::{
    Packet, PacketType, RadioTelegram, RawPacket, Response, ResponseType, Rorg, SENDER_ID_LEN,
};

/// First sync byte.
pub const FIRST_SYNC_BYTE: u8 = 0xA5;

/// Second sync byte.
pub const SECOND_SYNC_BYTE: u8 = 0x5A;

/// `LENGTH` of every telegram a TCM module sends or accepts.
pub const TELEGRAM_LENGTH: u8 = 0x0B;

/// Data octets of a telegram (`LENGTH` minus the checksum).
const DATA_LEN: usize = TELEGRAM_LENGTH as usize - 1;

const LENGTH_MASK: u8 = 0x1F;

/// Telegram kinds carried in the upper 3 header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeaderSequence {
    /// Receive radio telegram.
    ReceiveRadio = 0b000,
    /// Transmit radio telegram.
    TransmitRadio = 0b011,
    /// Receive message telegram (module to host).
    ReceiveMessage = 0b100,
    /// Transmit command telegram (host to module).
    TransmitCommand = 0b101,
}

impl HeaderSequence {
    const fn from_header(header: u8) -> Option<Self> {
        match header >> 5 {
            0b000 => Some(Self::ReceiveRadio),
            0b011 => Some(Self::TransmitRadio),
            0b100 => Some(Self::ReceiveMessage),
            0b101 => Some(Self::TransmitCommand),
            _ => None,
        }
    }

    const fn header(self) -> u8 {
        ((self as u8) << 5) | TELEGRAM_LENGTH
    }
}

/// ESP2 organization bytes.
mod org {
    pub const RPS: u8 = 0x05;
    pub const ONE_BS: u8 = 0x06;
    pub const FOUR_BS: u8 = 0x07;
}

/// Message codes of receive message telegrams.
mod message_code {
    pub const ERR_SYNTAX_H_SEQ: u8 = 0x08;
    pub const ERR_SYNTAX_ORG: u8 = 0x0B;
    pub const ERR: u8 = 0x19;
    pub const ERR_IDRANGE: u8 = 0x1A;
    pub const ERR_TX_IDRANGE: u8 = 0x22;
    pub const ERR_MODEM_NOTWANTEDACK: u8 = 0x28;
    pub const ERR_MODEM_NOTACK: u8 = 0x29;
    pub const OK: u8 = 0x58;
    pub const INF_SW_VERSION: u8 = 0x8C;
    pub const INF_INIT: u8 = 0x89;
    pub const INF_IDBASE: u8 = 0x98;
}

/// Command codes of transmit command telegrams.
mod command_code {
    pub const RESET: u8 = 0x0A;
    pub const SET_IDBASE: u8 = 0x18;
    pub const RD_SW_VERSION: u8 = 0x4B;
    pub const RD_IDBASE: u8 = 0x58;
}

/// Computes the ESP2 checksum over header and data.
#[must_use]
pub fn checksum(header: u8, data: &[u8]) -> u8 {
    data.iter().fold(header, |sum, &b| sum.wrapping_add(b))
}

/// Returns true if the checksum byte matches header and data.
#[must_use]
pub fn validate_checksum(header: u8, data: &[u8], expected: u8) -> bool {
    checksum(header, data) == expected
}

/// Encodes a packet into an ESP2 telegram.
///
/// Only RPS, 1BS and 4BS radio telegrams and the common commands the TCM
/// command set knows have an ESP2 form.
pub fn encode(packet: &Packet) -> Result<Bytes, FrameError> {
    let (sequence, data) = match packet {
        Packet::Radio(telegram) => (HeaderSequence::TransmitRadio, encode_radio(telegram)?),
        Packet::Other(raw) if raw.packet_type() == PacketType::CommonCommand => {
            (HeaderSequence::TransmitCommand, encode_command(raw.payload())?)
        }
        other => {
            return Err(FrameError::Unsupported {
                reason: format!("{:?} packets have no ESP2 form", other.packet_type()),
            });
        }
    };

    let header = sequence.header();
    let mut buf = BytesMut::with_capacity(3 + DATA_LEN + 1);
    buf.put_u8(FIRST_SYNC_BYTE);
    buf.put_u8(SECOND_SYNC_BYTE);
    buf.put_u8(header);
    buf.put_slice(&data);
    buf.put_u8(checksum(header, &data));
    Ok(buf.freeze())
}

fn encode_radio(telegram: &RadioTelegram) -> Result<[u8; DATA_LEN], FrameError> {
    let (org, data_len) = match telegram.rorg() {
        Rorg::Rps => (org::RPS, 1),
        Rorg::OneBs => (org::ONE_BS, 1),
        Rorg::FourBs => (org::FOUR_BS, 4),
        other => {
            return Err(FrameError::Unsupported {
                reason: format!("RORG {other:?} has no ESP2 form"),
            });
        }
    };

    let user_data = telegram.data();
    if user_data.len() != data_len {
        return Err(FrameError::Unsupported {
            reason: format!(
                "{:?} telegram needs {data_len} data bytes, got {}",
                telegram.rorg(),
                user_data.len()
            ),
        });
    }
    let sender_id = telegram.sender_id().ok_or(FrameError::Truncated {
        expected: SENDER_ID_LEN,
        got: 0,
    })?;

    let mut data = [0u8; DATA_LEN];
    data[0] = org;
    data[1..=data_len].copy_from_slice(user_data);
    data[5..9].copy_from_slice(&sender_id.to_bytes());
    data[9] = telegram.status();
    Ok(data)
}

fn encode_command(payload: &[u8]) -> Result<[u8; DATA_LEN], FrameError> {
    let mut data = [0u8; DATA_LEN];
    match payload {
        [CommonCommand::READ_ID_BASE] => data[0] = command_code::RD_IDBASE,
        [CommonCommand::READ_VERSION] => data[0] = command_code::RD_SW_VERSION,
        [CommonCommand::RESET] => data[0] = command_code::RESET,
        [CommonCommand::WRITE_ID_BASE, id @ ..] if id.len() == SENDER_ID_LEN => {
            data[0] = command_code::SET_IDBASE;
            data[1..5].copy_from_slice(id);
        }
        _ => {
            return Err(FrameError::Unsupported {
                reason: format!("common command {} has no ESP2 form", hex::encode(payload)),
            });
        }
    }
    Ok(data)
}

/// Returns true for telegrams that are dropped without notice.
///
/// The module announces itself with `INF_INIT` after power-up; it carries
/// nothing a caller could act on.
fn is_noop(sequence: Option<HeaderSequence>, data: &[u8]) -> bool {
    sequence == Some(HeaderSequence::ReceiveMessage) && data.first() == Some(&message_code::INF_INIT)
}

/// Converts a validated telegram into a packet.
fn decode_telegram(sequence: Option<HeaderSequence>, data: &[u8]) -> Option<Packet> {
    if data.len() != DATA_LEN {
        return None;
    }

    match sequence? {
        HeaderSequence::ReceiveRadio | HeaderSequence::TransmitRadio => decode_radio(data),
        HeaderSequence::ReceiveMessage => decode_message(data),
        HeaderSequence::TransmitCommand => decode_command(data),
    }
}

fn decode_radio(data: &[u8]) -> Option<Packet> {
    let (rorg, data_len) = match data[0] {
        org::RPS => (Rorg::Rps, 1),
        org::ONE_BS => (Rorg::OneBs, 1),
        org::FOUR_BS => (Rorg::FourBs, 4),
        _ => return None,
    };
    let rorg_byte = rorg.to_byte()?;

    let mut payload = BytesMut::with_capacity(1 + data_len + SENDER_ID_LEN + 1);
    payload.put_u8(rorg_byte);
    payload.put_slice(&data[1..=data_len]);
    payload.put_slice(&data[5..10]);
    Some(Packet::Radio(RadioTelegram::from_payload(payload.freeze(), Bytes::new())))
}

fn decode_message(data: &[u8]) -> Option<Packet> {
    let response = match data[0] {
        message_code::OK => Response::new(ResponseType::Ok, &[]),
        message_code::INF_IDBASE | message_code::INF_SW_VERSION => {
            Response::new(ResponseType::Ok, &data[1..5])
        }
        message_code::ERR_IDRANGE | message_code::ERR_TX_IDRANGE => {
            Response::new(ResponseType::WrongParam, &[])
        }
        message_code::ERR
        | message_code::ERR_SYNTAX_H_SEQ..=message_code::ERR_SYNTAX_ORG
        | message_code::ERR_MODEM_NOTWANTEDACK
        | message_code::ERR_MODEM_NOTACK => Response::new(ResponseType::Error, &[]),
        _ => return None,
    };
    Some(Packet::Response(response))
}

fn decode_command(data: &[u8]) -> Option<Packet> {
    let payload = match data[0] {
        command_code::RD_IDBASE => vec![CommonCommand::READ_ID_BASE],
        command_code::RD_SW_VERSION => vec![CommonCommand::READ_VERSION],
        command_code::RESET => vec![CommonCommand::RESET],
        command_code::SET_IDBASE => {
            let mut payload = vec![CommonCommand::WRITE_ID_BASE];
            payload.extend_from_slice(&data[1..5]);
            payload
        }
        _ => return None,
    };
    Some(Packet::Other(RawPacket::new(PacketType::CommonCommand, payload, Bytes::new())))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadingState {
    WaitingForFirstSyncByte,
    WaitingForSecondSyncByte,
    ReadingHeader,
    ReadingData,
}

/// Byte-at-a-time ESP2 decoder with checksum validation.
#[derive(Debug)]
pub struct Esp2Framer {
    state: ReadingState,
    header: u8,
    data_length: usize,
    data: Vec<u8>,
    ready: VecDeque<Packet>,
}

impl Default for Esp2Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp2Framer {
    /// Creates a new framer waiting for the first sync byte.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ReadingState::WaitingForFirstSyncByte,
            header: 0,
            data_length: 0,
            data: Vec::with_capacity(usize::from(LENGTH_MASK)),
            ready: VecDeque::new(),
        }
    }

    fn step(&mut self, byte: u8) {
        match self.state {
            ReadingState::WaitingForFirstSyncByte => {
                if byte == FIRST_SYNC_BYTE {
                    self.state = ReadingState::WaitingForSecondSyncByte;
                }
            }
            ReadingState::WaitingForSecondSyncByte => {
                self.state = match byte {
                    SECOND_SYNC_BYTE => ReadingState::ReadingHeader,
                    FIRST_SYNC_BYTE => ReadingState::WaitingForSecondSyncByte,
                    _ => ReadingState::WaitingForFirstSyncByte,
                };
            }
            ReadingState::ReadingHeader => {
                let length = usize::from(byte & LENGTH_MASK);
                if length == 0 {
                    tracing::debug!("ESP2 header 0x{byte:02x} declares no checksum, dropping");
                    self.finish(byte);
                    return;
                }
                self.header = byte;
                self.data_length = length - 1;
                self.data.clear();
                self.state = ReadingState::ReadingData;
            }
            ReadingState::ReadingData => {
                if self.data.len() < self.data_length {
                    self.data.push(byte);
                    return;
                }

                if validate_checksum(self.header, &self.data, byte) {
                    self.complete();
                } else {
                    tracing::debug!(
                        "ESP2 checksum mismatch: {:02x} {}",
                        self.header,
                        hex::encode(&self.data)
                    );
                }
                self.finish(byte);
            }
        }
    }

    fn complete(&mut self) {
        let sequence = HeaderSequence::from_header(self.header);
        if let Some(packet) = decode_telegram(sequence, &self.data) {
            tracing::trace!("ESP2 telegram {:02x}: {}", self.header, hex::encode(&self.data));
            self.ready.push_back(packet);
        } else if is_noop(sequence, &self.data) {
            tracing::trace!("ESP2 module initialized");
        } else {
            tracing::debug!(
                "unsupported ESP2 telegram {:02x}: {}",
                self.header,
                hex::encode(&self.data)
            );
        }
    }

    /// Clears packet state; a completing first-sync byte may open the next frame.
    fn finish(&mut self, last: u8) {
        self.header = 0;
        self.data_length = 0;
        self.data.clear();
        self.state = if last == FIRST_SYNC_BYTE {
            ReadingState::WaitingForSecondSyncByte
        } else {
            ReadingState::WaitingForFirstSyncByte
        };
    }
}

impl Framer for Esp2Framer {
    fn feed(&mut self, data: &[u8]) {
        for &byte in data {
            self.step(byte);
        }
    }

    fn decode(&mut self) -> Option<Packet> {
        self.ready.pop_front()
    }

    fn is_searching(&self) -> bool {
        matches!(
            self.state,
            ReadingState::WaitingForFirstSyncByte | ReadingState::WaitingForSecondSyncByte
        )
    }

    fn reset(&mut self) {
        self.finish(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::SenderId;

    /// Builds a receive telegram with a correct checksum.
    fn telegram(sequence: HeaderSequence, data: [u8; DATA_LEN]) -> Vec<u8> {
        let header = sequence.header();
        let mut frame = vec![FIRST_SYNC_BYTE, SECOND_SYNC_BYTE, header];
        frame.extend_from_slice(&data);
        frame.push(checksum(header, &data));
        frame
    }

    fn rps_telegram() -> Vec<u8> {
        telegram(
            HeaderSequence::ReceiveRadio,
            [org::RPS, 0x30, 0x00, 0x00, 0x00, 0x00, 0x21, 0xAB, 0x2E, 0x30],
        )
    }

    fn decode_all(framer: &mut Esp2Framer, bytes: &[u8]) -> Vec<Packet> {
        for &b in bytes {
            framer.feed(&[b]);
        }
        std::iter::from_fn(|| framer.decode()).collect()
    }

    #[test]
    fn test_checksum() {
        assert_eq!(checksum(0x0B, &[0x05, 0x30]), 0x40);
        assert_eq!(checksum(0xFF, &[0x02]), 0x01);
    }

    #[test]
    fn test_decode_rps() {
        let mut framer = Esp2Framer::new();
        let packets = decode_all(&mut framer, &rps_telegram());

        assert_eq!(packets.len(), 1);
        let Packet::Radio(telegram) = &packets[0] else {
            panic!("expected radio telegram, got {:?}", packets[0]);
        };
        assert_eq!(telegram.rorg(), Rorg::Rps);
        assert_eq!(telegram.data(), &[0x30]);
        assert_eq!(telegram.sender_id(), Some(SenderId::new(0x0021_AB2E)));
        assert_eq!(telegram.status(), 0x30);
    }

    #[test]
    fn test_decode_4bs_teach_in() {
        let frame = telegram(
            HeaderSequence::ReceiveRadio,
            [org::FOUR_BS, 0x08, 0x28, 0x46, 0x80, 0x01, 0x02, 0x03, 0x04, 0x00],
        );
        let mut framer = Esp2Framer::new();
        let packets = decode_all(&mut framer, &frame);

        let Packet::Radio(telegram) = &packets[0] else {
            panic!("expected radio telegram");
        };
        assert_eq!(telegram.rorg(), Rorg::FourBs);
        assert_eq!(telegram.data(), &[0x08, 0x28, 0x46, 0x80]);
        assert!(telegram.is_teach_in());
    }

    #[test]
    fn test_decode_messages() {
        let mut ok = [0u8; DATA_LEN];
        ok[0] = message_code::OK;
        let mut base = [0u8; DATA_LEN];
        base[..5].copy_from_slice(&[message_code::INF_IDBASE, 0xFF, 0x80, 0x00, 0x00]);

        let mut stream = telegram(HeaderSequence::ReceiveMessage, ok);
        stream.extend(telegram(HeaderSequence::ReceiveMessage, base));

        let mut framer = Esp2Framer::new();
        let packets = decode_all(&mut framer, &stream);
        assert_eq!(
            packets,
            vec![
                Packet::Response(Response::new(ResponseType::Ok, &[])),
                Packet::Response(Response::new(ResponseType::Ok, &[0xFF, 0x80, 0x00, 0x00])),
            ]
        );
    }

    #[test]
    fn test_init_message_dropped() {
        let mut init = [0u8; DATA_LEN];
        init[0] = message_code::INF_INIT;
        let mut framer = Esp2Framer::new();
        assert!(decode_all(&mut framer, &telegram(HeaderSequence::ReceiveMessage, init)).is_empty());
        assert!(framer.is_searching());
    }

    #[test]
    fn test_round_trip() {
        let packets: [Packet; 4] = [
            RadioTelegram::new(Rorg::Rps, &[0x50], SenderId::new(0xFF80_0001), 0x30)
                .unwrap()
                .into(),
            RadioTelegram::new(Rorg::FourBs, &[0x01, 0x02, 0x03, 0x08], SenderId::new(0xFF80_0002), 0x00)
                .unwrap()
                .into(),
            CommonCommand::ReadIdBase.into(),
            CommonCommand::WriteIdBase(SenderId::new(0xFF80_0000)).into(),
        ];

        let mut framer = Esp2Framer::new();
        for packet in packets {
            let frame = encode(&packet).unwrap();
            assert_eq!(decode_all(&mut framer, &frame), vec![packet]);
        }
    }

    #[test]
    fn test_encode_unsupported() {
        let vld = RadioTelegram::new(Rorg::Vld, &[0x01], SenderId::new(1), 0).unwrap();
        assert!(encode(&vld.into()).is_err());

        let wrong_len = RadioTelegram::new(Rorg::Rps, &[0x01, 0x02], SenderId::new(1), 0).unwrap();
        assert!(encode(&wrong_len.into()).is_err());

        assert!(encode(&CommonCommand::ReadRepeater.into()).is_err());
    }

    #[test]
    fn test_resync_after_noise() {
        let mut stream = vec![0x00, 0x5A, 0x12, 0xFF, 0x0B];
        stream.extend(rps_telegram());

        let mut framer = Esp2Framer::new();
        assert_eq!(decode_all(&mut framer, &stream).len(), 1);
    }

    #[test]
    fn test_repeated_first_sync_byte() {
        let mut stream = vec![FIRST_SYNC_BYTE, FIRST_SYNC_BYTE];
        stream.extend(rps_telegram());

        let mut framer = Esp2Framer::new();
        assert_eq!(decode_all(&mut framer, &stream).len(), 1);
    }

    #[test]
    fn test_checksum_bit_flip_rejected() {
        for bit in 0..8 {
            let mut frame = rps_telegram();
            let last = frame.len() - 1;
            frame[last] ^= 1 << bit;

            let mut framer = Esp2Framer::new();
            assert!(decode_all(&mut framer, &frame).is_empty(), "bit {bit}");
            assert!(framer.is_searching(), "bit {bit}");
        }
    }

    #[test]
    fn test_back_to_back_after_first_sync_checksum() {
        // A checksum that happens to equal the first sync byte doubles as the
        // start of the next frame.
        let data = [org::RPS, 0x95, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let header = HeaderSequence::ReceiveRadio.header();
        assert_eq!(checksum(header, &data), FIRST_SYNC_BYTE);

        let mut stream = vec![FIRST_SYNC_BYTE, SECOND_SYNC_BYTE, header];
        stream.extend_from_slice(&data);
        stream.push(FIRST_SYNC_BYTE);
        // Second frame without its own first sync byte.
        let second = rps_telegram();
        stream.extend_from_slice(&second[1..]);

        let mut framer = Esp2Framer::new();
        assert_eq!(decode_all(&mut framer, &stream).len(), 2);
    }
}
