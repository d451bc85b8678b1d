//! Several coordinators in one process
//!
//! Instance `i` listens on `base_port + i` with PAN id `0x1000 + i` on
//! channel `11 + i`, so at most one instance per channel can be started.

use thiserror::Error;
use tracing::{info, warn};
use zb_gateway::{start, EmulatorConfig, GatewayError, RunningCoordinator};
use zb_sim::CHANNEL_RANGE;

const BASE_PAN_ID: u16 = 0x1000;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("at least one instance is required")]
    NoInstances,

    #[error("{count} instances requested but only {max} channels are available")]
    TooManyInstances { count: usize, max: usize },

    #[error("ports {base_port}+{count} run past 65535")]
    PortOverflow { base_port: u16, count: usize },

    #[error("instance {index} failed to start: {source}")]
    Start {
        index: usize,
        source: GatewayError,
    },
}

/// Largest number of instances, one per channel
pub fn max_instances() -> usize {
    CHANNEL_RANGE.len()
}

/// Per-instance configurations derived from `base`
pub fn instance_configs(
    base: &EmulatorConfig,
    base_port: u16,
    count: usize,
) -> Result<Vec<EmulatorConfig>, LaunchError> {
    if count == 0 {
        return Err(LaunchError::NoInstances);
    }
    let max = max_instances();
    if count > max {
        return Err(LaunchError::TooManyInstances { count, max });
    }
    if usize::from(base_port) + count - 1 > usize::from(u16::MAX) {
        return Err(LaunchError::PortOverflow { base_port, count });
    }

    Ok((0..count as u16)
        .map(|i| EmulatorConfig {
            port: base_port + i,
            pan_id: BASE_PAN_ID + i,
            channel: CHANNEL_RANGE.start() + i as u8,
            ..base.clone()
        })
        .collect())
}

/// Start every instance, or none if one of them fails
pub async fn launch(
    base: &EmulatorConfig,
    base_port: u16,
    count: usize,
) -> Result<Vec<RunningCoordinator>, LaunchError> {
    let configs = instance_configs(base, base_port, count)?;
    let mut running = Vec::with_capacity(configs.len());

    for (index, config) in configs.into_iter().enumerate() {
        let (port, pan_id, channel) = (config.port, config.pan_id, config.channel);
        match start(config).await {
            Ok(coordinator) => {
                info!(
                    "Coordinator {}: port={}, PAN=0x{:04X}, channel={}",
                    index + 1,
                    coordinator.port(),
                    pan_id,
                    channel
                );
                running.push(coordinator);
            }
            Err(source) => {
                warn!("Coordinator {} on port {} failed: {}", index + 1, port, source);
                stop_all(running).await;
                return Err(LaunchError::Start { index, source });
            }
        }
    }

    Ok(running)
}

pub async fn stop_all(coordinators: Vec<RunningCoordinator>) {
    for coordinator in coordinators {
        coordinator.shutdown().await;
    }
}
