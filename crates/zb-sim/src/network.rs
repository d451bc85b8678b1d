//! Network identity: PAN id, extended PAN id, channel and permit-joining

use std::fmt;
use std::ops::RangeInclusive;

use rand::Rng;
use zb_protocol::NetworkInfoReply;

use crate::error::NetworkConfigError;

/// Radio channels the coordinator may form a network on
pub const CHANNEL_RANGE: RangeInclusive<u8> = 11..=26;

/// 8-byte long-form network identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtendedPanId(pub [u8; 8]);

impl ExtendedPanId {
    /// Random identifier, as chosen at startup or on re-formation
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 8];
        rng.fill(&mut bytes);
        Self(bytes)
    }
}

/// Colon-separated hex, e.g. `A1:B2:C3:D4:E5:F6:07:18`
impl fmt::Display for ExtendedPanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

/// Process-wide network identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pan_id: u16,
    extended_pan_id: ExtendedPanId,
    channel: u8,
    permit_joining: bool,
}

impl NetworkConfig {
    /// Create a network identity, rejecting channels outside 11-26
    pub fn new(
        pan_id: u16,
        channel: u8,
        extended_pan_id: ExtendedPanId,
        permit_joining: bool,
    ) -> Result<Self, NetworkConfigError> {
        validate_channel(channel)?;
        Ok(Self {
            pan_id,
            extended_pan_id,
            channel,
            permit_joining,
        })
    }

    pub fn pan_id(&self) -> u16 {
        self.pan_id
    }

    pub fn extended_pan_id(&self) -> ExtendedPanId {
        self.extended_pan_id
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn permit_joining(&self) -> bool {
        self.permit_joining
    }

    pub fn set_permit_joining(&mut self, permit: bool) {
        self.permit_joining = permit;
    }

    /// Move to another channel; the current one is kept on error
    pub fn set_channel(&mut self, channel: u8) -> Result<(), NetworkConfigError> {
        validate_channel(channel)?;
        self.channel = channel;
        Ok(())
    }

    /// Pick a fresh random channel, PAN id and extended PAN id
    pub fn reform_random<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.channel = rng.gen_range(CHANNEL_RANGE);
        self.pan_id = rng.gen();
        self.extended_pan_id = ExtendedPanId::random(rng);
    }

    /// `GetNetworkInfo` reply for the current identity
    pub fn info_reply(&self) -> NetworkInfoReply {
        NetworkInfoReply {
            channel: self.channel,
            pan_id: self.pan_id,
            extended_pan_id: self.extended_pan_id.0,
            permit_joining: self.permit_joining,
        }
    }
}

fn validate_channel(channel: u8) -> Result<(), NetworkConfigError> {
    if CHANNEL_RANGE.contains(&channel) {
        Ok(())
    } else {
        Err(NetworkConfigError::InvalidChannel(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> NetworkConfig {
        NetworkConfig::new(0x1234, 11, ExtendedPanId([1, 2, 3, 4, 5, 6, 7, 8]), true).unwrap()
    }

    #[test]
    fn test_channel_bounds() {
        let mut net = config();
        assert_eq!(net.set_channel(10), Err(NetworkConfigError::InvalidChannel(10)));
        assert_eq!(net.set_channel(27), Err(NetworkConfigError::InvalidChannel(27)));
        assert_eq!(net.channel(), 11);

        net.set_channel(26).unwrap();
        assert_eq!(net.channel(), 26);
        net.set_channel(11).unwrap();
        assert_eq!(net.channel(), 11);

        assert!(NetworkConfig::new(0, 30, ExtendedPanId([0; 8]), false).is_err());
    }

    #[test]
    fn test_reform_random_keeps_channel_valid() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut net = config();
        for _ in 0..200 {
            net.reform_random(&mut rng);
            assert!(CHANNEL_RANGE.contains(&net.channel()));
        }
    }

    #[test]
    fn test_extended_pan_id_display() {
        let id = ExtendedPanId([0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6, 0x07, 0x18]);
        assert_eq!(id.to_string(), "A1:B2:C3:D4:E5:F6:07:18");
    }
}
