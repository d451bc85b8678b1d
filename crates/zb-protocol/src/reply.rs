//! Reply layouts
//!
//! Replies have no length prefix. Each layout below is either fixed-size or
//! a status byte followed by a whole number of fixed-size entries, so a client
//! can always tell where a reply ends from the opcode it sent.
//!
//! | Reply | Layout |
//! |---|---|
//! | status only | `status` |
//! | `GetActiveNodes` | `status` + n × `addr(8) short(2) type(1) 00 rssi(1) lqi(1)` |
//! | `GetAllNodes` | `status` + n × `addr(8) presence(1)` |
//! | `GetNetworkInfo` | `status channel(1) pan(8) ext_pan(8) permit(1)` |
//! | `GetFirmwareVersion` | `status addr(8) version(22)` |
//! | `SendMeterRequest` | `status` + 8 × f64 |

use crate::address::{LongAddress, LONG_ADDRESS_LEN};
use crate::error::ParseError;
use crate::status::StatusCode;
use crate::NodeType;

/// Width of the firmware version field, NUL padded
pub const FIRMWARE_FIELD_LEN: usize = 22;

/// Presence byte of a known node that is online
pub const PRESENCE_ONLINE: u8 = 0x03;
/// Presence byte of a known node in any other status
pub const PRESENCE_ABSENT: u8 = 0x00;

/// Trait for replies that can be encoded to bytes
pub trait EncodeReply {
    /// Encode this reply to its wire format, status byte included
    fn encode(&self) -> Vec<u8>;
}

/// Split a successful reply into its payload, or surface the failure status
fn payload(data: &[u8]) -> Result<&[u8], ParseError> {
    let (&status, rest) = data
        .split_first()
        .ok_or(ParseError::Incomplete { needed: 1 })?;
    match StatusCode::try_from(status)? {
        StatusCode::Success => Ok(rest),
        other => Err(ParseError::Status(other)),
    }
}

/// One entry of the `GetActiveNodes` reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveNodeEntry {
    pub address: LongAddress,
    pub short_address: u16,
    pub node_type: NodeType,
    pub rssi: i8,
    pub lqi: u8,
}

impl ActiveNodeEntry {
    /// Encoded size of one entry
    pub const LEN: usize = LONG_ADDRESS_LEN + 2 + 1 + 1 + 1 + 1;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.address.to_bytes());
        out.extend_from_slice(&self.short_address.to_be_bytes());
        out.push(self.node_type.as_u8());
        out.push(0x00); // reserved
        out.push(self.rssi as u8);
        out.push(self.lqi);
    }

    fn read_from(chunk: &[u8]) -> Result<Self, ParseError> {
        Ok(Self {
            address: LongAddress::from_slice(chunk)?,
            short_address: u16::from_be_bytes([chunk[8], chunk[9]]),
            node_type: NodeType::try_from(chunk[10])?,
            rssi: chunk[12] as i8,
            lqi: chunk[13],
        })
    }
}

/// Complete `GetActiveNodes` reply
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActiveNodesReply(pub Vec<ActiveNodeEntry>);

impl EncodeReply for ActiveNodesReply {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.0.len() * ActiveNodeEntry::LEN);
        out.push(StatusCode::Success.as_u8());
        for entry in &self.0 {
            entry.write_to(&mut out);
        }
        out
    }
}

impl ActiveNodesReply {
    /// Decode a reply received from a coordinator
    pub fn decode(data: &[u8]) -> Result<Self, ParseError> {
        let body = payload(data)?;
        if body.len() % ActiveNodeEntry::LEN != 0 {
            return Err(ParseError::InvalidLength {
                what: "active node list",
                len: data.len(),
            });
        }
        body.chunks_exact(ActiveNodeEntry::LEN)
            .map(ActiveNodeEntry::read_from)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// One entry of the `GetAllNodes` reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownNodeEntry {
    pub address: LongAddress,
    pub online: bool,
}

impl KnownNodeEntry {
    /// Encoded size of one entry
    pub const LEN: usize = LONG_ADDRESS_LEN + 1;
}

/// Complete `GetAllNodes` reply
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllNodesReply(pub Vec<KnownNodeEntry>);

impl EncodeReply for AllNodesReply {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.0.len() * KnownNodeEntry::LEN);
        out.push(StatusCode::Success.as_u8());
        for entry in &self.0 {
            out.extend_from_slice(&entry.address.to_bytes());
            out.push(if entry.online {
                PRESENCE_ONLINE
            } else {
                PRESENCE_ABSENT
            });
        }
        out
    }
}

impl AllNodesReply {
    /// Decode a reply received from a coordinator
    pub fn decode(data: &[u8]) -> Result<Self, ParseError> {
        let body = payload(data)?;
        if body.len() % KnownNodeEntry::LEN != 0 {
            return Err(ParseError::InvalidLength {
                what: "known node list",
                len: data.len(),
            });
        }
        body.chunks_exact(KnownNodeEntry::LEN)
            .map(|chunk| {
                Ok(KnownNodeEntry {
                    address: LongAddress::from_slice(chunk)?,
                    online: chunk[LONG_ADDRESS_LEN] == PRESENCE_ONLINE,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// `GetNetworkInfo` reply
///
/// The PAN id occupies an 8-byte field for compatibility with the hardware's
/// legacy layout; only the low 16 bits are ever set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfoReply {
    pub channel: u8,
    pub pan_id: u16,
    pub extended_pan_id: [u8; 8],
    pub permit_joining: bool,
}

impl NetworkInfoReply {
    /// Encoded size, status byte included
    pub const LEN: usize = 1 + 1 + 8 + 8 + 1;

    /// Decode a reply received from a coordinator
    pub fn decode(data: &[u8]) -> Result<Self, ParseError> {
        let body = payload(data)?;
        if data.len() != Self::LEN {
            return Err(ParseError::InvalidLength {
                what: "network info",
                len: data.len(),
            });
        }
        let pan = u64::from_be_bytes(body[1..9].try_into().unwrap_or_default());
        let mut extended_pan_id = [0u8; 8];
        extended_pan_id.copy_from_slice(&body[9..17]);
        Ok(Self {
            channel: body[0],
            pan_id: pan as u16,
            extended_pan_id,
            permit_joining: body[17] == 0x01,
        })
    }
}

impl EncodeReply for NetworkInfoReply {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(StatusCode::Success.as_u8());
        out.push(self.channel);
        out.extend_from_slice(&u64::from(self.pan_id).to_be_bytes());
        out.extend_from_slice(&self.extended_pan_id);
        out.push(u8::from(self.permit_joining));
        out
    }
}

/// `GetFirmwareVersion` reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVersionReply {
    pub address: LongAddress,
    pub version: String,
}

impl FirmwareVersionReply {
    /// Encoded size, status byte included
    pub const LEN: usize = 1 + LONG_ADDRESS_LEN + FIRMWARE_FIELD_LEN;

    /// Decode a reply received from a coordinator
    pub fn decode(data: &[u8]) -> Result<Self, ParseError> {
        let body = payload(data)?;
        if data.len() != Self::LEN {
            return Err(ParseError::InvalidLength {
                what: "firmware version",
                len: data.len(),
            });
        }
        let field = &body[LONG_ADDRESS_LEN..];
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        Ok(Self {
            address: LongAddress::from_slice(body)?,
            version: String::from_utf8_lossy(&field[..end]).into_owned(),
        })
    }
}

impl EncodeReply for FirmwareVersionReply {
    fn encode(&self) -> Vec<u8> {
        let mut field = [0u8; FIRMWARE_FIELD_LEN];
        let version = self.version.as_bytes();
        let n = version.len().min(FIRMWARE_FIELD_LEN);
        field[..n].copy_from_slice(&version[..n]);

        let mut out = Vec::with_capacity(Self::LEN);
        out.push(StatusCode::Success.as_u8());
        out.extend_from_slice(&self.address.to_bytes());
        out.extend_from_slice(&field);
        out
    }
}

/// `SendMeterRequest` reply: eight big-endian doubles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterReading {
    /// Volts
    pub voltage: f64,
    /// Amperes
    pub current: f64,
    /// kW
    pub active_power: f64,
    /// kVar
    pub reactive_power: f64,
    /// kVA
    pub apparent_power: f64,
    pub power_factor: f64,
    /// Hz
    pub frequency: f64,
    /// Amperes
    pub neutral_current: f64,
}

impl MeterReading {
    /// Encoded size, status byte included
    pub const LEN: usize = 1 + 8 * 8;

    fn fields(&self) -> [f64; 8] {
        [
            self.voltage,
            self.current,
            self.active_power,
            self.reactive_power,
            self.apparent_power,
            self.power_factor,
            self.frequency,
            self.neutral_current,
        ]
    }

    /// Decode a reply received from a coordinator
    pub fn decode(data: &[u8]) -> Result<Self, ParseError> {
        let body = payload(data)?;
        if data.len() != Self::LEN {
            return Err(ParseError::InvalidLength {
                what: "meter reading",
                len: data.len(),
            });
        }
        let mut values = [0f64; 8];
        for (value, chunk) in values.iter_mut().zip(body.chunks_exact(8)) {
            *value = f64::from_be_bytes(chunk.try_into().unwrap_or_default());
        }
        let [voltage, current, active_power, reactive_power, apparent_power, power_factor, frequency, neutral_current] =
            values;
        Ok(Self {
            voltage,
            current,
            active_power,
            reactive_power,
            apparent_power,
            power_factor,
            frequency,
            neutral_current,
        })
    }
}

impl EncodeReply for MeterReading {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(StatusCode::Success.as_u8());
        for value in self.fields() {
            out.extend_from_slice(&value.to_be_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_node_entry_layout() {
        let reply = ActiveNodesReply(vec![ActiveNodeEntry {
            address: LongAddress(1),
            short_address: 0x0102,
            node_type: NodeType::Router,
            rssi: -65,
            lqi: 95,
        }]);
        let bytes = reply.encode();

        assert_eq!(
            bytes,
            vec![0x00, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x01, 0x02, 0x01, 0x00, 0xBF, 95]
        );
        assert_eq!(ActiveNodesReply::decode(&bytes).unwrap(), reply);
    }

    #[test]
    fn test_all_nodes_presence_byte() {
        let bytes = AllNodesReply(vec![
            KnownNodeEntry { address: LongAddress(2), online: true },
            KnownNodeEntry { address: LongAddress(3), online: false },
        ])
        .encode();

        assert_eq!(bytes.len(), 1 + 2 * KnownNodeEntry::LEN);
        assert_eq!(bytes[9], PRESENCE_ONLINE);
        assert_eq!(bytes[18], PRESENCE_ABSENT);
    }

    #[test]
    fn test_network_info_layout() {
        let bytes = NetworkInfoReply {
            channel: 15,
            pan_id: 0x1234,
            extended_pan_id: [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7],
            permit_joining: true,
        }
        .encode();

        assert_eq!(bytes.len(), NetworkInfoReply::LEN);
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[1], 15);
        assert_eq!(&bytes[2..10], &[0, 0, 0, 0, 0, 0, 0x12, 0x34]);
        assert_eq!(bytes[10], 0xA0);
        assert_eq!(*bytes.last().unwrap(), 0x01);
    }

    #[test]
    fn test_firmware_version_padded_and_truncated() {
        let short = FirmwareVersionReply {
            address: LongAddress(4),
            version: "ZigBee-3.0-1.0.0".into(),
        };
        let bytes = short.encode();
        assert_eq!(bytes.len(), FirmwareVersionReply::LEN);
        assert_eq!(bytes[bytes.len() - 1], 0x00);
        assert_eq!(FirmwareVersionReply::decode(&bytes).unwrap(), short);

        let long = FirmwareVersionReply {
            address: LongAddress(4),
            version: "A-very-long-version-string-indeed".into(),
        };
        let decoded = FirmwareVersionReply::decode(&long.encode()).unwrap();
        assert_eq!(decoded.version.len(), FIRMWARE_FIELD_LEN);
        assert!(long.version.starts_with(&decoded.version));
    }

    #[test]
    fn test_failure_status_surfaces_on_decode() {
        assert_eq!(
            FirmwareVersionReply::decode(&[0x02]),
            Err(ParseError::Status(StatusCode::NodeNotFound))
        );
        assert_eq!(
            AllNodesReply::decode(&[]),
            Err(ParseError::Incomplete { needed: 1 })
        );
    }

    #[test]
    fn test_meter_reading_layout() {
        let reading = MeterReading {
            voltage: 230.0,
            current: 10.0,
            active_power: 3.0,
            reactive_power: 4.0,
            apparent_power: 5.0,
            power_factor: 0.9,
            frequency: 50.0,
            neutral_current: 0.5,
        };
        let bytes = reading.encode();

        assert_eq!(bytes.len(), MeterReading::LEN);
        assert_eq!(&bytes[1..9], &230.0f64.to_be_bytes());
        assert_eq!(MeterReading::decode(&bytes).unwrap(), reading);
    }
}
