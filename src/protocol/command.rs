//! Common commands to the gateway module and typed views of their responses.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, FrameError, Result};
use crate::protocol::packet::{Packet, PacketType, RawPacket, Response, SENDER_ID_LEN, SenderId};

/// Common commands understood by the gateway module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonCommand {
    /// Resets the module.
    Reset,
    /// Reads the firmware and API version.
    ReadVersion,
    /// Writes the base id (allowed a limited number of times).
    WriteIdBase(SenderId),
    /// Reads the base id.
    ReadIdBase,
    /// Configures the built-in repeater.
    WriteRepeater {
        /// Whether repeating is enabled.
        enabled: bool,
        /// Repeater level (1 or 2).
        level: u8,
    },
    /// Reads the repeater configuration.
    ReadRepeater,
}

impl CommonCommand {
    /// `CO_WR_RESET` command code.
    pub const RESET: u8 = 0x02;
    /// `CO_RD_VERSION` command code.
    pub const READ_VERSION: u8 = 0x03;
    /// `CO_WR_IDBASE` command code.
    pub const WRITE_ID_BASE: u8 = 0x07;
    /// `CO_RD_IDBASE` command code.
    pub const READ_ID_BASE: u8 = 0x08;
    /// `CO_WR_REPEATER` command code.
    pub const WRITE_REPEATER: u8 = 0x09;
    /// `CO_RD_REPEATER` command code.
    pub const READ_REPEATER: u8 = 0x0A;

    /// Returns the command code.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Reset => Self::RESET,
            Self::ReadVersion => Self::READ_VERSION,
            Self::WriteIdBase(_) => Self::WRITE_ID_BASE,
            Self::ReadIdBase => Self::READ_ID_BASE,
            Self::WriteRepeater { .. } => Self::WRITE_REPEATER,
            Self::ReadRepeater => Self::READ_REPEATER,
        }
    }

    /// Builds the command packet.
    #[must_use]
    pub fn to_packet(&self) -> Packet {
        let mut buf = BytesMut::with_capacity(1 + SENDER_ID_LEN);
        buf.put_u8(self.code());
        match self {
            Self::WriteIdBase(id) => buf.put_slice(&id.to_bytes()),
            Self::WriteRepeater { enabled, level } => {
                buf.put_u8(u8::from(*enabled));
                buf.put_u8(*level);
            }
            Self::Reset | Self::ReadVersion | Self::ReadIdBase | Self::ReadRepeater => {}
        }
        Packet::Other(RawPacket::new(PacketType::CommonCommand, buf.freeze(), Vec::new()))
    }
}

impl From<CommonCommand> for Packet {
    fn from(command: CommonCommand) -> Self {
        command.to_packet()
    }
}

/// Rejects responses that did not succeed.
fn ensure_ok(response: &Response) -> Result<()> {
    if response.is_ok() {
        Ok(())
    } else {
        Err(Error::Protocol {
            message: format!("gateway returned {:?}", response.response_type()),
        })
    }
}

fn ensure_len(data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(FrameError::Truncated {
            expected,
            got: data.len(),
        }
        .into());
    }
    Ok(())
}

/// Response to [`CommonCommand::ReadIdBase`].
///
/// Format:
/// ```text
/// [return_code:1] [base_id:4] (optional: [remaining_writes:1])
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseIdResponse {
    /// First id of the gateway's 128-id sending range.
    pub base_id: SenderId,
    /// How many times the base id may still be changed.
    pub remaining_writes: Option<u8>,
}

impl TryFrom<&Response> for BaseIdResponse {
    type Error = Error;

    fn try_from(response: &Response) -> Result<Self> {
        ensure_ok(response)?;
        let data = response.data();
        ensure_len(data, SENDER_ID_LEN)?;
        let base_id = SenderId::try_from_slice(&data[..SENDER_ID_LEN]).ok_or(Error::Protocol {
            message: "malformed base id".into(),
        })?;
        Ok(Self {
            base_id,
            remaining_writes: response.optional_payload().first().copied(),
        })
    }
}

/// Response to [`CommonCommand::ReadVersion`].
///
/// ESP3 format:
/// ```text
/// [return_code:1] [app_version:4] [api_version:4] [chip_id:4] [chip_version:4] [description:16]
/// ```
/// ESP2 modules only report the application version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionResponse {
    /// Application (firmware) version, main.beta.alpha.build.
    pub app_version: [u8; 4],
    /// API version.
    pub api_version: Option<[u8; 4]>,
    /// Chip id.
    pub chip_id: Option<SenderId>,
    /// Chip version.
    pub chip_version: Option<u32>,
    /// Application description.
    pub description: String,
}

impl VersionResponse {
    /// Formats the application version as `main.beta.alpha.build`.
    #[must_use]
    pub fn app_version_string(&self) -> String {
        let [main, beta, alpha, build] = self.app_version;
        format!("{main}.{beta}.{alpha}.{build}")
    }
}

impl TryFrom<&Response> for VersionResponse {
    type Error = Error;

    fn try_from(response: &Response) -> Result<Self> {
        ensure_ok(response)?;
        let data = response.data();
        ensure_len(data, 4)?;

        let word = |at: usize| -> Option<[u8; 4]> { data.get(at..at + 4)?.try_into().ok() };

        let description = data.get(16..).map_or_else(String::new, |raw| {
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            String::from_utf8_lossy(&raw[..end]).into_owned()
        });

        Ok(Self {
            app_version: word(0).unwrap_or_default(),
            api_version: word(4),
            chip_id: word(8).map(SenderId::from_bytes),
            chip_version: word(12).map(u32::from_be_bytes),
            description,
        })
    }
}

/// Response to [`CommonCommand::ReadRepeater`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeaterResponse {
    /// Whether repeating is enabled.
    pub enabled: bool,
    /// Repeater level.
    pub level: u8,
}

impl TryFrom<&Response> for RepeaterResponse {
    type Error = Error;

    fn try_from(response: &Response) -> Result<Self> {
        ensure_ok(response)?;
        let data = response.data();
        ensure_len(data, 2)?;
        Ok(Self {
            enabled: data[0] != 0,
            level: data[1],
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::protocol::packet::ResponseType;

    #[test]
    fn test_command_payloads() {
        assert_eq!(CommonCommand::ReadIdBase.to_packet().payload().as_ref(), &[0x08]);
        assert_eq!(
            CommonCommand::WriteIdBase(SenderId::new(0xFF80_0000)).to_packet().payload().as_ref(),
            &[0x07, 0xFF, 0x80, 0x00, 0x00]
        );
        assert_eq!(
            CommonCommand::WriteRepeater { enabled: true, level: 2 }.to_packet().payload().as_ref(),
            &[0x09, 0x01, 0x02]
        );
        assert_eq!(CommonCommand::Reset.to_packet().packet_type(), PacketType::CommonCommand);
    }

    #[test]
    fn test_parse_base_id() {
        let response = Response::from_payload(
            Bytes::from_static(&[0x00, 0xFF, 0x80, 0x00, 0x00]),
            Bytes::from_static(&[0x0A]),
        )
        .unwrap();
        let base = BaseIdResponse::try_from(&response).unwrap();
        assert_eq!(base.base_id, SenderId::new(0xFF80_0000));
        assert_eq!(base.remaining_writes, Some(10));
    }

    #[test]
    fn test_parse_base_id_error_code() {
        let response = Response::new(ResponseType::NotSupported, &[]);
        assert!(matches!(
            BaseIdResponse::try_from(&response),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn test_parse_version() {
        let mut data = vec![2, 11, 1, 0, 2, 6, 3, 0, 0x01, 0x83, 0x5D, 0x2B, 0x45, 0x4F, 0x01, 0x03];
        data.extend_from_slice(b"GATEWAYCTRL\0\0\0\0\0");
        let response = Response::new(ResponseType::Ok, &data);

        let version = VersionResponse::try_from(&response).unwrap();
        assert_eq!(version.app_version_string(), "2.11.1.0");
        assert_eq!(version.api_version, Some([2, 6, 3, 0]));
        assert_eq!(version.chip_id, Some(SenderId::new(0x0183_5D2B)));
        assert_eq!(version.description, "GATEWAYCTRL");
    }

    #[test]
    fn test_parse_short_version() {
        let response = Response::new(ResponseType::Ok, &[1, 2, 3, 4]);
        let version = VersionResponse::try_from(&response).unwrap();
        assert_eq!(version.app_version, [1, 2, 3, 4]);
        assert_eq!(version.api_version, None);
        assert!(version.description.is_empty());

        let truncated = Response::new(ResponseType::Ok, &[1]);
        assert!(matches!(
            VersionResponse::try_from(&truncated),
            Err(Error::Frame(FrameError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_parse_repeater() {
        let response = Response::new(ResponseType::Ok, &[0x01, 0x01]);
        let repeater = RepeaterResponse::try_from(&response).unwrap();
        assert!(repeater.enabled);
        assert_eq!(repeater.level, 1);
    }
}
