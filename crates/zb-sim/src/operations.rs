//! Long-running node and network operations
//!
//! Each operation puts its target into a transient status and schedules the
//! completion that resolves it. The completion is always queued before the
//! status changes, so a node never sits in a transient status without a
//! pending resolution.

use std::time::Duration;

use rand::Rng;
use tracing::info;
use zb_protocol::LongAddress;

use crate::error::OperationError;
use crate::node::NodeStatus;
use crate::scheduler::Scheduler;
use crate::state::CoordinatorState;

/// Random firmware version in the `ZigBee-3.0-X.Y.Z` family
pub fn random_firmware_version<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "ZigBee-3.0-{}.{}.{}",
        rng.gen_range(1..=5),
        rng.gen_range(1..=5),
        rng.gen_range(0..=9)
    )
}

/// Reboot one node; it comes back after `delay`
pub fn reboot_node(
    state: &mut CoordinatorState,
    scheduler: &Scheduler,
    address: LongAddress,
    delay: Duration,
) -> Result<(), OperationError> {
    let node = state.registry.get_mut(address)?;
    let short_address = node.short_address;

    scheduler.schedule(format!("reboot of {address}"), delay, move |s| {
        if let Some(node) = s.registry.get_by_short_mut(short_address) {
            if node.resolve(NodeStatus::Rebooting) {
                info!("Node {} rebooted", node.long_address);
            }
        }
    })?;

    node.status = NodeStatus::Rebooting;
    info!("Rebooting node {}", address);
    Ok(())
}

/// Flash new firmware onto one node
///
/// After `delay` the node reports a new pseudo-random version and returns to
/// its settled status.
pub fn push_firmware(
    state: &mut CoordinatorState,
    scheduler: &Scheduler,
    address: LongAddress,
    delay: Duration,
) -> Result<(), OperationError> {
    let node = state.registry.get_mut(address)?;
    let short_address = node.short_address;

    scheduler.schedule(format!("firmware update of {address}"), delay, move |s| {
        if let Some(node) = s.registry.get_by_short_mut(short_address) {
            if node.status == NodeStatus::Updating {
                node.firmware_version = random_firmware_version(&mut rand::thread_rng());
                node.resolve(NodeStatus::Updating);
                info!(
                    "Firmware update of {} finished: {}",
                    node.long_address, node.firmware_version
                );
            }
        }
    })?;

    node.status = NodeStatus::Updating;
    info!("Updating firmware of node {}", address);
    Ok(())
}

/// Move the whole network to `channel`
///
/// Invalid channels are rejected before anything changes.
pub fn change_channel(
    state: &mut CoordinatorState,
    scheduler: &Scheduler,
    channel: u8,
    delay: Duration,
) -> Result<(), OperationError> {
    let previous = state.network.channel();
    state.network.set_channel(channel)?;

    if let Err(e) = scheduler.schedule("channel change", delay, |s| {
        let resolved = s.resolve_all(NodeStatus::ChannelChanging);
        info!("Channel change finished, {} nodes back", resolved);
    }) {
        state.network.set_channel(previous)?;
        return Err(e);
    }

    state.mark_all(NodeStatus::ChannelChanging);
    info!("Network moving from channel {} to {}", previous, channel);
    Ok(())
}

/// Re-form the network on a random channel with fresh PAN ids
pub fn reform_network<R: Rng + ?Sized>(
    state: &mut CoordinatorState,
    scheduler: &Scheduler,
    rng: &mut R,
    delay: Duration,
) -> Result<(), OperationError> {
    scheduler.schedule("network re-formation", delay, |s| {
        let resolved = s.resolve_all(NodeStatus::Reconnecting);
        info!("Network re-formation finished, {} nodes reconnected", resolved);
    })?;

    state.network.reform_random(rng);
    state.mark_all(NodeStatus::Reconnecting);
    info!(
        "Network re-formed: channel {}, PAN ID 0x{:04X}, extended PAN ID {}",
        state.network.channel(),
        state.network.pan_id(),
        state.network.extended_pan_id()
    );
    Ok(())
}
