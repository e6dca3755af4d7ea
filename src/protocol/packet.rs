//! Packet model shared by the ESP2 and ESP3 framers.
//!
//! Every decoded packet is an envelope of a [`PacketType`], a payload and an
//! optional payload. Radio telegrams, responses and events get a typed view on
//! top of that envelope; everything else stays a [`RawPacket`].

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Length of a sender id in bytes.
pub const SENDER_ID_LEN: usize = 4;

/// Radio telegram trailer: sender id plus status byte.
const TELEGRAM_TRAILER_LEN: usize = SENDER_ID_LEN + 1;

/// Smallest ERP1 payload that carries a RORG, sender id and status.
pub const MIN_TELEGRAM_LEN: usize = 1 + TELEGRAM_TRAILER_LEN;

/// Teach-in flag in the last data byte of 1BS and 4BS telegrams (cleared = teach-in).
const LRN_BIT: u8 = 0x08;

/// Sub-telegram count used for outbound radio telegrams.
const SEND_SUB_TELEGRAMS: u8 = 0x03;

/// ESP3 packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// ERP1 radio telegram.
    RadioErp1,
    /// Response to a previously sent command.
    Response,
    /// Radio sub telegram.
    RadioSubTelegram,
    /// Unsolicited event from the module.
    Event,
    /// Common command to the module.
    CommonCommand,
    /// Smart Ack command.
    SmartAckCommand,
    /// Remote management command.
    RemoteManagement,
    /// Radio message (chained telegrams).
    RadioMessage,
    /// ERP2 radio telegram.
    RadioErp2,
    /// Any type this library does not know.
    Unknown(u8),
}

impl PacketType {
    /// Parses a packet type from its wire byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => Self::RadioErp1,
            0x02 => Self::Response,
            0x03 => Self::RadioSubTelegram,
            0x04 => Self::Event,
            0x05 => Self::CommonCommand,
            0x06 => Self::SmartAckCommand,
            0x07 => Self::RemoteManagement,
            0x09 => Self::RadioMessage,
            0x0A => Self::RadioErp2,
            other => Self::Unknown(other),
        }
    }

    /// Returns the wire byte of this packet type.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::RadioErp1 => 0x01,
            Self::Response => 0x02,
            Self::RadioSubTelegram => 0x03,
            Self::Event => 0x04,
            Self::CommonCommand => 0x05,
            Self::SmartAckCommand => 0x06,
            Self::RemoteManagement => 0x07,
            Self::RadioMessage => 0x09,
            Self::RadioErp2 => 0x0A,
            Self::Unknown(byte) => byte,
        }
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        packet_type.as_byte()
    }
}

/// A 4-byte EnOcean device identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SenderId(u32);

impl SenderId {
    /// Mask selecting the 128-id block a gateway base id belongs to.
    const BASE_ID_MASK: u32 = 0xFFFF_FF80;

    /// Creates a sender id from its numeric value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Creates a sender id from its big-endian wire bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SENDER_ID_LEN]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    /// Tries to create a sender id from a slice.
    ///
    /// Returns `None` if the slice is not exactly 4 bytes.
    #[must_use]
    pub fn try_from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; SENDER_ID_LEN] = bytes.try_into().ok()?;
        Some(Self::from_bytes(bytes))
    }

    /// Parses a sender id from 8 hex digits.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; SENDER_ID_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self::from_bytes(bytes))
    }

    /// Returns the big-endian wire bytes.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; SENDER_ID_LEN] {
        self.0.to_be_bytes()
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns true if both ids lie in the same 128-id base id block.
    ///
    /// Gateways send with ids from `base_id..base_id + 128`, so this matches
    /// any telegram that originated from the gateway owning `self`.
    #[must_use]
    pub const fn same_base_block(self, other: Self) -> bool {
        self.0 & Self::BASE_ID_MASK == other.0 & Self::BASE_ID_MASK
    }
}

impl From<u32> for SenderId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<[u8; SENDER_ID_LEN]> for SenderId {
    fn from(bytes: [u8; SENDER_ID_LEN]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

impl fmt::Debug for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SenderId({self})")
    }
}

/// Radio organization: the payload family of a radio telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rorg {
    /// Repeated switch communication.
    Rps,
    /// 1 byte communication.
    OneBs,
    /// 4 byte communication.
    FourBs,
    /// Variable length data.
    Vld,
    /// Manufacturer specific communication.
    Msc,
    /// Addressing destination telegram.
    Adt,
    /// Smart Ack learn request.
    SmartAckLearnRequest,
    /// Smart Ack learn answer.
    SmartAckLearnAnswer,
    /// Smart Ack reclaim.
    SmartAckReclaim,
    /// Remote management.
    SysEx,
    /// Secure telegram.
    Secure,
    /// Secure telegram with encapsulated RORG.
    SecureEncapsulated,
    /// Universal teach-in.
    Ute,
    /// Signal telegram.
    Signal,
    /// Any RORG this library does not know.
    Unknown,
}

impl Rorg {
    /// Parses a RORG from its wire byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0xF6 => Self::Rps,
            0xD5 => Self::OneBs,
            0xA5 => Self::FourBs,
            0xD2 => Self::Vld,
            0xD1 => Self::Msc,
            0xA6 => Self::Adt,
            0xC6 => Self::SmartAckLearnRequest,
            0xC7 => Self::SmartAckLearnAnswer,
            0xA7 => Self::SmartAckReclaim,
            0xC5 => Self::SysEx,
            0x30 => Self::Secure,
            0x31 => Self::SecureEncapsulated,
            0xD4 => Self::Ute,
            0xD0 => Self::Signal,
            _ => Self::Unknown,
        }
    }

    /// Returns the wire byte, or `None` for [`Rorg::Unknown`].
    #[must_use]
    pub const fn to_byte(self) -> Option<u8> {
        let byte = match self {
            Self::Rps => 0xF6,
            Self::OneBs => 0xD5,
            Self::FourBs => 0xA5,
            Self::Vld => 0xD2,
            Self::Msc => 0xD1,
            Self::Adt => 0xA6,
            Self::SmartAckLearnRequest => 0xC6,
            Self::SmartAckLearnAnswer => 0xC7,
            Self::SmartAckReclaim => 0xA7,
            Self::SysEx => 0xC5,
            Self::Secure => 0x30,
            Self::SecureEncapsulated => 0x31,
            Self::Ute => 0xD4,
            Self::Signal => 0xD0,
            Self::Unknown => return None,
        };
        Some(byte)
    }
}

/// A packet without a typed view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    packet_type: PacketType,
    payload: Bytes,
    optional: Bytes,
}

impl RawPacket {
    /// Creates a new raw packet.
    #[must_use]
    pub fn new(packet_type: PacketType, payload: impl Into<Bytes>, optional: impl Into<Bytes>) -> Self {
        Self {
            packet_type,
            payload: payload.into(),
            optional: optional.into(),
        }
    }

    /// Returns the packet type.
    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the optional payload.
    #[must_use]
    pub const fn optional_payload(&self) -> &Bytes {
        &self.optional
    }
}

/// An ERP1 radio telegram.
///
/// Payload layout:
/// ```text
/// [rorg:1] [data:n] [sender_id:4] [status:1]
/// ```
/// Optional payload (ESP3 only):
/// ```text
/// [sub_telegrams:1] [destination_id:4] [dbm:1] [security_level:1]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioTelegram {
    payload: Bytes,
    optional: Bytes,
    rorg: Rorg,
    sender_id: Option<SenderId>,
    teach_in: bool,
}

impl RadioTelegram {
    /// Builds a telegram view over a received payload.
    ///
    /// Payloads too short to carry a sender id decode as [`Rorg::Unknown`].
    #[must_use]
    pub fn from_payload(payload: Bytes, optional: Bytes) -> Self {
        if payload.len() < MIN_TELEGRAM_LEN {
            return Self {
                payload,
                optional,
                rorg: Rorg::Unknown,
                sender_id: None,
                teach_in: false,
            };
        }

        let rorg = Rorg::from_byte(payload[0]);
        let id_start = payload.len() - TELEGRAM_TRAILER_LEN;
        let sender_id = SenderId::try_from_slice(&payload[id_start..id_start + SENDER_ID_LEN]);
        let teach_in = detect_teach_in(rorg, &payload[1..id_start]);

        Self {
            payload,
            optional,
            rorg,
            sender_id,
            teach_in,
        }
    }

    /// Builds an outbound telegram.
    ///
    /// Returns an error for [`Rorg::Unknown`], which has no wire byte.
    pub fn new(rorg: Rorg, data: &[u8], sender_id: SenderId, status: u8) -> Result<Self, FrameError> {
        let rorg_byte = rorg.to_byte().ok_or_else(|| FrameError::Unsupported {
            reason: "cannot send a telegram with unknown RORG".into(),
        })?;

        let mut buf = BytesMut::with_capacity(MIN_TELEGRAM_LEN + data.len());
        buf.put_u8(rorg_byte);
        buf.put_slice(data);
        buf.put_slice(&sender_id.to_bytes());
        buf.put_u8(status);

        Ok(Self::from_payload(buf.freeze(), Bytes::new()))
    }

    /// Addresses the telegram to a destination (ESP3 optional data).
    #[must_use]
    pub fn with_destination(mut self, destination: SenderId) -> Self {
        let mut buf = BytesMut::with_capacity(7);
        buf.put_u8(SEND_SUB_TELEGRAMS);
        buf.put_slice(&destination.to_bytes());
        buf.put_u8(0xFF); // dBm is ignored on send
        buf.put_u8(0x00); // security level
        self.optional = buf.freeze();
        self
    }

    /// Returns the radio organization.
    #[must_use]
    pub const fn rorg(&self) -> Rorg {
        self.rorg
    }

    /// Returns the sender id. Always `Some` unless the RORG is unknown.
    #[must_use]
    pub const fn sender_id(&self) -> Option<SenderId> {
        self.sender_id
    }

    /// Returns true if this telegram announces a device for pairing.
    #[must_use]
    pub const fn is_teach_in(&self) -> bool {
        self.teach_in
    }

    /// Returns the user data between RORG and sender id.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        if self.payload.len() < MIN_TELEGRAM_LEN {
            return &[];
        }
        &self.payload[1..self.payload.len() - TELEGRAM_TRAILER_LEN]
    }

    /// Returns the status byte.
    #[must_use]
    pub fn status(&self) -> u8 {
        if self.payload.len() < MIN_TELEGRAM_LEN {
            return 0;
        }
        self.payload[self.payload.len() - 1]
    }

    /// Returns the destination id from the optional payload.
    #[must_use]
    pub fn destination_id(&self) -> Option<SenderId> {
        self.optional.get(1..5).and_then(SenderId::try_from_slice)
    }

    /// Returns the received signal strength in dBm.
    #[must_use]
    pub fn dbm(&self) -> Option<i16> {
        self.optional.get(5).map(|&v| -i16::from(v))
    }

    /// Returns the security level from the optional payload.
    #[must_use]
    pub fn security_level(&self) -> Option<u8> {
        self.optional.get(6).copied()
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the optional payload.
    #[must_use]
    pub const fn optional_payload(&self) -> &Bytes {
        &self.optional
    }
}

fn detect_teach_in(rorg: Rorg, data: &[u8]) -> bool {
    match rorg {
        Rorg::OneBs => data.first().is_some_and(|db0| db0 & LRN_BIT == 0),
        Rorg::FourBs => data.get(3).is_some_and(|db0| db0 & LRN_BIT == 0),
        Rorg::Ute | Rorg::SmartAckLearnRequest => true,
        _ => false,
    }
}

/// Return codes of a response packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    /// Command accepted.
    Ok,
    /// Generic error.
    Error,
    /// Command not supported.
    NotSupported,
    /// Invalid parameter.
    WrongParam,
    /// Operation denied.
    OperationDenied,
    /// Lock is set.
    LockSet,
    /// Buffer too small.
    BufferTooSmall,
    /// No free buffer.
    NoFreeBuffer,
    /// Any code this library does not know.
    Unknown(u8),
}

impl ResponseType {
    /// Parses a return code.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Ok,
            0x01 => Self::Error,
            0x02 => Self::NotSupported,
            0x03 => Self::WrongParam,
            0x04 => Self::OperationDenied,
            0x05 => Self::LockSet,
            0x06 => Self::BufferTooSmall,
            0x07 => Self::NoFreeBuffer,
            other => Self::Unknown(other),
        }
    }

    /// Returns the wire byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Ok => 0x00,
            Self::Error => 0x01,
            Self::NotSupported => 0x02,
            Self::WrongParam => 0x03,
            Self::OperationDenied => 0x04,
            Self::LockSet => 0x05,
            Self::BufferTooSmall => 0x06,
            Self::NoFreeBuffer => 0x07,
            Self::Unknown(byte) => byte,
        }
    }
}

/// A response to a previously sent request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    response_type: ResponseType,
    payload: Bytes,
    optional: Bytes,
}

impl Response {
    /// Builds a response view over a received payload.
    pub fn from_payload(payload: Bytes, optional: Bytes) -> Result<Self, FrameError> {
        let Some(&code) = payload.first() else {
            return Err(FrameError::Truncated {
                expected: 1,
                got: 0,
            });
        };
        Ok(Self {
            response_type: ResponseType::from_byte(code),
            payload,
            optional,
        })
    }

    /// Builds a response from a return code and return data.
    #[must_use]
    pub fn new(response_type: ResponseType, data: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(1 + data.len());
        buf.put_u8(response_type.as_byte());
        buf.put_slice(data);
        Self {
            response_type,
            payload: buf.freeze(),
            optional: Bytes::new(),
        }
    }

    /// Returns the return code.
    #[must_use]
    pub const fn response_type(&self) -> ResponseType {
        self.response_type
    }

    /// Returns true if the gateway accepted the command.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.response_type == ResponseType::Ok
    }

    /// Returns the data following the return code.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.payload[1..]
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the optional payload.
    #[must_use]
    pub const fn optional_payload(&self) -> &Bytes {
        &self.optional
    }
}

/// Event codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Smart Ack reclaim was not successful.
    SmartAckReclaimFailed,
    /// A Smart Ack learn request needs confirmation.
    SmartAckConfirmLearn,
    /// Smart Ack learn acknowledged.
    SmartAckLearnAck,
    /// The module is ready.
    Ready,
    /// Secure device event.
    SecureDevices,
    /// Duty cycle limit reached.
    DutyCycleLimit,
    /// A transmission failed.
    TransmitFailed,
    /// A transmission finished.
    TxDone,
    /// Learn mode was disabled.
    LearnModeDisabled,
    /// Any code this library does not know.
    Unknown(u8),
}

impl EventType {
    /// Parses an event code.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => Self::SmartAckReclaimFailed,
            0x02 => Self::SmartAckConfirmLearn,
            0x03 => Self::SmartAckLearnAck,
            0x04 => Self::Ready,
            0x05 => Self::SecureDevices,
            0x06 => Self::DutyCycleLimit,
            0x07 => Self::TransmitFailed,
            0x08 => Self::TxDone,
            0x09 => Self::LearnModeDisabled,
            other => Self::Unknown(other),
        }
    }

    /// Returns the wire byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::SmartAckReclaimFailed => 0x01,
            Self::SmartAckConfirmLearn => 0x02,
            Self::SmartAckLearnAck => 0x03,
            Self::Ready => 0x04,
            Self::SecureDevices => 0x05,
            Self::DutyCycleLimit => 0x06,
            Self::TransmitFailed => 0x07,
            Self::TxDone => 0x08,
            Self::LearnModeDisabled => 0x09,
            Self::Unknown(byte) => byte,
        }
    }
}

/// An unsolicited event from the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    event_type: EventType,
    payload: Bytes,
    optional: Bytes,
}

impl EventMessage {
    /// Builds an event view over a received payload.
    pub fn from_payload(payload: Bytes, optional: Bytes) -> Result<Self, FrameError> {
        let Some(&code) = payload.first() else {
            return Err(FrameError::Truncated {
                expected: 1,
                got: 0,
            });
        };
        Ok(Self {
            event_type: EventType::from_byte(code),
            payload,
            optional,
        })
    }

    /// Builds an event from its code and data.
    #[must_use]
    pub fn new(event_type: EventType, data: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(1 + data.len());
        buf.put_u8(event_type.as_byte());
        buf.put_slice(data);
        Self {
            event_type,
            payload: buf.freeze(),
            optional: Bytes::new(),
        }
    }

    /// Returns the event code.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Returns the data following the event code.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.payload[1..]
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the optional payload.
    #[must_use]
    pub const fn optional_payload(&self) -> &Bytes {
        &self.optional
    }
}

/// A decoded or outbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// ERP1 radio telegram.
    Radio(RadioTelegram),
    /// Response to a request.
    Response(Response),
    /// Unsolicited event.
    Event(EventMessage),
    /// Any other packet type.
    Other(RawPacket),
}

impl Packet {
    /// Builds the typed packet for a validated envelope.
    pub fn from_parts(packet_type: PacketType, payload: Bytes, optional: Bytes) -> Result<Self, FrameError> {
        let packet = match packet_type {
            PacketType::RadioErp1 => Self::Radio(RadioTelegram::from_payload(payload, optional)),
            PacketType::Response => Self::Response(Response::from_payload(payload, optional)?),
            PacketType::Event => Self::Event(EventMessage::from_payload(payload, optional)?),
            other => Self::Other(RawPacket::new(other, payload, optional)),
        };
        Ok(packet)
    }

    /// Returns the packet type.
    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        match self {
            Self::Radio(_) => PacketType::RadioErp1,
            Self::Response(_) => PacketType::Response,
            Self::Event(_) => PacketType::Event,
            Self::Other(raw) => raw.packet_type(),
        }
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        match self {
            Self::Radio(telegram) => telegram.payload(),
            Self::Response(response) => response.payload(),
            Self::Event(event) => event.payload(),
            Self::Other(raw) => raw.payload(),
        }
    }

    /// Returns the optional payload.
    #[must_use]
    pub const fn optional_payload(&self) -> &Bytes {
        match self {
            Self::Radio(telegram) => telegram.optional_payload(),
            Self::Response(response) => response.optional_payload(),
            Self::Event(event) => event.optional_payload(),
            Self::Other(raw) => raw.optional_payload(),
        }
    }
}

impl From<RadioTelegram> for Packet {
    fn from(telegram: RadioTelegram) -> Self {
        Self::Radio(telegram)
    }
}

impl From<Response> for Packet {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<EventMessage> for Packet {
    fn from(event: EventMessage) -> Self {
        Self::Event(event)
    }
}

impl From<RawPacket> for Packet {
    fn from(raw: RawPacket) -> Self {
        Self::Other(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_from_byte() {
        assert_eq!(PacketType::from_byte(0x01), PacketType::RadioErp1);
        assert_eq!(PacketType::from_byte(0x02), PacketType::Response);
        assert_eq!(PacketType::from_byte(0x08), PacketType::Unknown(0x08));
        assert_eq!(PacketType::Unknown(0x42).as_byte(), 0x42);
    }

    #[test]
    fn test_sender_id_formatting() {
        let id = SenderId::from_bytes([0xFF, 0x9B, 0x2A, 0x01]);
        assert_eq!(id.to_string(), "FF9B2A01");
        assert_eq!(SenderId::from_hex("ff9b2a01").unwrap(), id);
        assert!(SenderId::from_hex("ff9b").is_err());
        assert_eq!(SenderId::try_from_slice(&[1, 2, 3]), None);
    }

    #[test]
    fn test_sender_id_base_block() {
        let base = SenderId::new(0xFF80_0000);
        assert!(base.same_base_block(SenderId::new(0xFF80_007F)));
        assert!(!base.same_base_block(SenderId::new(0xFF80_0080)));
    }

    #[test]
    fn test_rps_telegram() {
        let payload = Bytes::from_static(&[0xF6, 0x50, 0x00, 0x29, 0x89, 0x79, 0x30]);
        let telegram = RadioTelegram::from_payload(payload, Bytes::new());
        assert_eq!(telegram.rorg(), Rorg::Rps);
        assert_eq!(telegram.sender_id(), Some(SenderId::new(0x0029_8979)));
        assert_eq!(telegram.data(), &[0x50]);
        assert_eq!(telegram.status(), 0x30);
        assert!(!telegram.is_teach_in());
    }

    #[test]
    fn test_4bs_teach_in_flag() {
        let teach_in = RadioTelegram::new(Rorg::FourBs, &[0x08, 0x28, 0x46, 0x80], SenderId::new(1), 0).unwrap();
        assert!(teach_in.is_teach_in());

        let data = RadioTelegram::new(Rorg::FourBs, &[0x00, 0x00, 0x80, 0x08], SenderId::new(1), 0).unwrap();
        assert!(!data.is_teach_in());
    }

    #[test]
    fn test_1bs_and_ute_teach_in() {
        let contact_open = RadioTelegram::new(Rorg::OneBs, &[0x09], SenderId::new(1), 0).unwrap();
        assert!(!contact_open.is_teach_in());
        let learn = RadioTelegram::new(Rorg::OneBs, &[0x00], SenderId::new(1), 0).unwrap();
        assert!(learn.is_teach_in());

        let ute = RadioTelegram::new(Rorg::Ute, &[0; 7], SenderId::new(1), 0).unwrap();
        assert!(ute.is_teach_in());
    }

    #[test]
    fn test_short_telegram_is_unknown() {
        let telegram = RadioTelegram::from_payload(Bytes::from_static(&[0xF6, 0x01]), Bytes::new());
        assert_eq!(telegram.rorg(), Rorg::Unknown);
        assert_eq!(telegram.sender_id(), None);
        assert!(telegram.data().is_empty());
    }

    #[test]
    fn test_optional_data() {
        let optional = Bytes::from_static(&[0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x4D, 0x00]);
        let payload = Bytes::from_static(&[0xD5, 0x09, 0x01, 0x02, 0x03, 0x04, 0x00]);
        let telegram = RadioTelegram::from_payload(payload, optional);
        assert_eq!(telegram.destination_id(), Some(SenderId::new(0xFFFF_FFFF)));
        assert_eq!(telegram.dbm(), Some(-77));
        assert_eq!(telegram.security_level(), Some(0));
    }

    #[test]
    fn test_unknown_rorg_cannot_be_sent() {
        assert!(RadioTelegram::new(Rorg::Unknown, &[], SenderId::new(1), 0).is_err());
    }

    #[test]
    fn test_response_and_event_parsing() {
        let response = Response::from_payload(Bytes::from_static(&[0x02]), Bytes::new()).unwrap();
        assert_eq!(response.response_type(), ResponseType::NotSupported);
        assert!(response.data().is_empty());
        assert!(Response::from_payload(Bytes::new(), Bytes::new()).is_err());

        let event = EventMessage::from_payload(Bytes::from_static(&[0x02, 0xAA]), Bytes::new()).unwrap();
        assert_eq!(event.event_type(), EventType::SmartAckConfirmLearn);
        assert_eq!(event.data(), &[0xAA]);
    }

    #[test]
    fn test_packet_from_parts() {
        let packet = Packet::from_parts(PacketType::CommonCommand, Bytes::from_static(&[0x08]), Bytes::new()).unwrap();
        assert!(matches!(packet, Packet::Other(_)));
        assert_eq!(packet.packet_type(), PacketType::CommonCommand);
        assert_eq!(packet.payload().as_ref(), &[0x08]);
    }
}
