//! Emulator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use zb_sim::{demo_nodes, NodeSeed, CHANNEL_RANGE};

use crate::error::GatewayError;

/// Delays and periods of the simulated hardware, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timings {
    /// Telemetry simulator period
    pub telemetry_period_ms: u64,
    /// A session that sends nothing for this long is closed
    pub idle_timeout_ms: u64,
    /// RebootNode completion
    pub reboot_ms: u64,
    /// SendFirmware completion
    pub firmware_push_ms: u64,
    /// RecreateNetworkChannel completion
    pub channel_change_ms: u64,
    /// RecreateNetworkRandom completion
    pub reformation_ms: u64,
    /// UploadFirmware reply delay
    pub firmware_upload_ms: u64,
    /// Operator-triggered firmware update completion
    pub simulated_update_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            telemetry_period_ms: 10_000,
            idle_timeout_ms: 30_000,
            reboot_ms: 2_000,
            firmware_push_ms: 5_000,
            channel_change_ms: 2_000,
            reformation_ms: 3_000,
            firmware_upload_ms: 1_000,
            simulated_update_ms: 3_000,
        }
    }
}

impl Timings {
    pub fn telemetry_period(&self) -> Duration {
        Duration::from_millis(self.telemetry_period_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn reboot(&self) -> Duration {
        Duration::from_millis(self.reboot_ms)
    }

    pub fn firmware_push(&self) -> Duration {
        Duration::from_millis(self.firmware_push_ms)
    }

    pub fn channel_change(&self) -> Duration {
        Duration::from_millis(self.channel_change_ms)
    }

    pub fn reformation(&self) -> Duration {
        Duration::from_millis(self.reformation_ms)
    }

    pub fn firmware_upload(&self) -> Duration {
        Duration::from_millis(self.firmware_upload_ms)
    }

    pub fn simulated_update(&self) -> Duration {
        Duration::from_millis(self.simulated_update_ms)
    }
}

/// Configuration of one coordinator instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Address to bind the listener on
    pub host: String,
    /// TCP port; 0 picks an ephemeral port
    pub port: u16,
    /// 16-bit PAN id
    pub pan_id: u16,
    /// Radio channel, 11-26
    pub channel: u8,
    /// Extended PAN id; random when absent
    pub extended_pan_id: Option<[u8; 8]>,
    /// Initial permit-joining flag
    pub permit_joining: bool,
    /// Simulated hardware timings
    pub timings: Timings,
    /// Nodes present at startup; the demo set when absent
    pub nodes: Option<Vec<NodeSeed>>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            pan_id: 0x1234,
            channel: 11,
            extended_pan_id: None,
            permit_joining: true,
            timings: Timings::default(),
            nodes: None,
        }
    }
}

impl EmulatorConfig {
    /// Check values that would otherwise only fail once the emulator starts
    pub fn validate(&self) -> Result<(), GatewayError> {
        if !CHANNEL_RANGE.contains(&self.channel) {
            return Err(GatewayError::Config(format!(
                "channel {} is outside {}-{}",
                self.channel,
                CHANNEL_RANGE.start(),
                CHANNEL_RANGE.end()
            )));
        }
        if self.timings.telemetry_period_ms == 0 {
            return Err(GatewayError::Config(
                "telemetry period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Nodes to create at startup
    pub fn initial_nodes(&self) -> Vec<NodeSeed> {
        self.nodes.clone().unwrap_or_else(demo_nodes)
    }

    /// `host:port` string for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
