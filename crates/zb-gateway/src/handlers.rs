//! Command handlers
//!
//! One function per opcode. Parameter lengths have already been checked
//! against [`Opcode::param_rule`] by the dispatcher, so handlers only parse.

use std::time::Duration;

use tracing::info;
use zb_protocol::{
    ActiveNodesReply, AllNodesReply, EncodeReply, FirmwareVersionReply, LongAddress, Opcode,
    StatusCode,
};
use zb_sim::{operations, CoordinatorState, Scheduler};

use crate::config::Timings;
use crate::error::CommandError;

/// Bytes to send back, and how long to hold them first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub bytes: Vec<u8>,
    /// Simulated processing time, waited out by the session without the lock
    pub delay: Option<Duration>,
}

impl Reply {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, delay: None }
    }

    /// Bare status reply
    pub fn status(status: StatusCode) -> Self {
        Self::new(status.reply())
    }

    pub fn success() -> Self {
        Self::status(StatusCode::Success)
    }

    /// Hold the reply for `delay` before sending
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// First byte of the reply
    pub fn status_byte(&self) -> Option<u8> {
        self.bytes.first().copied()
    }
}

/// Everything a handler may touch
pub struct HandlerContext<'a> {
    pub state: &'a mut CoordinatorState,
    pub scheduler: &'a Scheduler,
    pub timings: &'a Timings,
}

pub type HandlerResult = Result<Reply, CommandError>;

/// Handler signature shared by every opcode
pub type Handler = fn(&[u8], &mut HandlerContext<'_>) -> HandlerResult;

/// Handler for an opcode
pub fn handler_for(opcode: Opcode) -> Handler {
    match opcode {
        Opcode::OpenSession => open_session,
        Opcode::SetMacAddress => set_mac_address,
        Opcode::RemoveNode => remove_node,
        Opcode::RebootNode => reboot_node,
        Opcode::GetActiveNodes => get_active_nodes,
        Opcode::SetPermitJoining => set_permit_joining,
        Opcode::GetNetworkInfo => get_network_info,
        Opcode::RecreateNetworkRandom => recreate_network_random,
        Opcode::GetAllNodes => get_all_nodes,
        Opcode::GetFirmwareVersion => get_firmware_version,
        Opcode::UploadFirmware => upload_firmware,
        Opcode::SendFirmware => send_firmware,
        Opcode::RecreateNetworkChannel => recreate_network_channel,
        Opcode::SendMeterRequest => send_meter_request,
        Opcode::SetDebugMode => set_debug_mode,
        Opcode::CloseSession => close_session,
    }
}

fn address_at(params: &[u8], offset: usize) -> Result<LongAddress, CommandError> {
    let field = params
        .get(offset..)
        .ok_or_else(|| CommandError::InvalidParameters("missing address".to_string()))?;
    Ok(LongAddress::from_slice(field)?)
}

fn open_session(_params: &[u8], _ctx: &mut HandlerContext<'_>) -> HandlerResult {
    Ok(Reply::success())
}

fn close_session(_params: &[u8], _ctx: &mut HandlerContext<'_>) -> HandlerResult {
    Ok(Reply::success())
}

fn set_mac_address(params: &[u8], ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let old = address_at(params, 0)?;
    let new = address_at(params, 8)?;
    ctx.state.registry.remap(old, new)?;
    info!("Node address changed: {} -> {}", old, new);
    Ok(Reply::success())
}

fn remove_node(params: &[u8], ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let address = address_at(params, 0)?;
    let node = ctx.state.registry.remove(address)?;
    info!("Node removed: {} ({})", node.name, address);
    Ok(Reply::success())
}

fn reboot_node(params: &[u8], ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let address = address_at(params, 0)?;
    operations::reboot_node(ctx.state, ctx.scheduler, address, ctx.timings.reboot())?;
    Ok(Reply::success())
}

fn get_active_nodes(_params: &[u8], ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let entries = ctx.state.registry.online().map(|n| n.active_entry()).collect();
    Ok(Reply::new(ActiveNodesReply(entries).encode()))
}

fn set_permit_joining(params: &[u8], ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let permit = params.first() == Some(&0x01);
    ctx.state.network.set_permit_joining(permit);
    info!("Permit joining set to: {}", permit);
    Ok(Reply::success())
}

fn get_network_info(_params: &[u8], ctx: &mut HandlerContext<'_>) -> HandlerResult {
    Ok(Reply::new(ctx.state.network.info_reply().encode()))
}

fn recreate_network_random(_params: &[u8], ctx: &mut HandlerContext<'_>) -> HandlerResult {
    operations::reform_network(
        ctx.state,
        ctx.scheduler,
        &mut rand::thread_rng(),
        ctx.timings.reformation(),
    )?;
    Ok(Reply::success())
}

fn get_all_nodes(_params: &[u8], ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let entries = ctx.state.registry.iter().map(|n| n.known_entry()).collect();
    Ok(Reply::new(AllNodesReply(entries).encode()))
}

fn get_firmware_version(params: &[u8], ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let address = address_at(params, 0)?;
    let node = ctx.state.registry.get(address)?;
    let reply = FirmwareVersionReply {
        address,
        version: node.firmware_version.clone(),
    };
    Ok(Reply::new(reply.encode()))
}

fn upload_firmware(params: &[u8], ctx: &mut HandlerContext<'_>) -> HandlerResult {
    info!("Firmware upload: {} bytes", params.len());
    Ok(Reply::success().after(ctx.timings.firmware_upload()))
}

fn send_firmware(params: &[u8], ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let address = address_at(params, 0)?;
    operations::push_firmware(ctx.state, ctx.scheduler, address, ctx.timings.firmware_push())?;
    info!("Firmware image of {} bytes sent to {}", params.len() - 8, address);
    Ok(Reply::success())
}

fn recreate_network_channel(params: &[u8], ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let channel = params
        .first()
        .copied()
        .ok_or_else(|| CommandError::InvalidParameters("missing channel".to_string()))?;
    operations::change_channel(ctx.state, ctx.scheduler, channel, ctx.timings.channel_change())?;
    Ok(Reply::success())
}

fn send_meter_request(params: &[u8], ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let address = address_at(params, 0)?;
    let node = ctx.state.registry.get(address)?;
    // A node without telemetry answers like an absent one
    let meter = node.meter.as_ref().ok_or(CommandError::NodeNotFound)?;
    Ok(Reply::new(meter.reading().encode()))
}

fn set_debug_mode(params: &[u8], ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let address = address_at(params, 0)?;
    let (debug_type, debug_level) = match params.get(8..10) {
        Some(&[t, l]) => (t, l),
        _ => {
            return Err(CommandError::InvalidParameters(
                "missing debug type and level".to_string(),
            ))
        }
    };

    let node = ctx.state.registry.get_mut(address)?;
    node.debug_mode = true;
    node.debug_type = debug_type;
    node.debug_level = debug_level;
    info!(
        "Debug mode for {}: type={}, level={}",
        address, debug_type, debug_level
    );
    Ok(Reply::success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use zb_protocol::{FirmwareVersionReply, MeterReading, NetworkInfoReply};
    use zb_sim::{demo_nodes, ExtendedPanId, NetworkConfig, NodeStatus};

    fn demo_state() -> CoordinatorState {
        let mut rng = StdRng::seed_from_u64(21);
        let network = NetworkConfig::new(0x1234, 11, ExtendedPanId([0xAA; 8]), true).unwrap();
        CoordinatorState::with_nodes(network, &demo_nodes(), &mut rng).unwrap()
    }

    fn call(opcode: Opcode, params: &[u8], state: &mut CoordinatorState) -> HandlerResult {
        // No handler exercised here schedules work that must complete
        let (scheduler, _worker) = Scheduler::channel();
        let timings = Timings::default();
        let mut ctx = HandlerContext {
            state,
            scheduler: &scheduler,
            timings: &timings,
        };
        handler_for(opcode)(params, &mut ctx)
    }

    fn addr(n: u64) -> [u8; 8] {
        n.to_be_bytes()
    }

    #[test]
    fn test_remap_keeps_firmware() {
        let mut state = demo_state();
        state.registry.get_mut(LongAddress(2)).unwrap().firmware_version = "ZigBee-3.0-4.2.7".into();

        let mut params = addr(2).to_vec();
        params.extend_from_slice(&addr(0xBEEF));
        call(Opcode::SetMacAddress, &params, &mut state).unwrap();

        let reply = call(Opcode::GetFirmwareVersion, &addr(0xBEEF), &mut state).unwrap();
        let decoded = FirmwareVersionReply::decode(&reply.bytes).unwrap();
        assert_eq!(decoded.version, "ZigBee-3.0-4.2.7");
        assert_eq!(decoded.address, LongAddress(0xBEEF));

        let err = call(Opcode::GetFirmwareVersion, &addr(2), &mut state).unwrap_err();
        assert_eq!(err, CommandError::NodeNotFound);
    }

    #[test]
    fn test_remap_onto_existing_address() {
        let mut state = demo_state();
        let mut params = addr(1).to_vec();
        params.extend_from_slice(&addr(2));

        let err = call(Opcode::SetMacAddress, &params, &mut state).unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidParameters);
        assert_eq!(state.registry.len(), 5);
        assert!(state.registry.get(LongAddress(1)).is_ok());
    }

    #[test]
    fn test_active_nodes_only_online() {
        let mut state = demo_state();
        state.registry.get_mut(LongAddress(3)).unwrap().status = NodeStatus::Offline;
        state.registry.get_mut(LongAddress(4)).unwrap().status = NodeStatus::Updating;

        let reply = call(Opcode::GetActiveNodes, &[], &mut state).unwrap();
        let decoded = ActiveNodesReply::decode(&reply.bytes).unwrap();
        let addresses: Vec<u64> = decoded.0.iter().map(|e| e.address.0).collect();
        assert_eq!(addresses, vec![1, 2, 5]);
    }

    #[test]
    fn test_all_nodes_presence() {
        let mut state = demo_state();
        state.registry.get_mut(LongAddress(3)).unwrap().status = NodeStatus::Rebooting;

        let reply = call(Opcode::GetAllNodes, &[], &mut state).unwrap();
        let decoded = AllNodesReply::decode(&reply.bytes).unwrap();
        assert_eq!(decoded.0.len(), 5);
        let online: Vec<bool> = decoded.0.iter().map(|e| e.online).collect();
        assert_eq!(online, vec![true, true, false, true, true]);
    }

    #[test]
    fn test_permit_joining_only_one_is_true() {
        let mut state = demo_state();
        for (flag, expected) in [(0x00, false), (0x01, true), (0x02, false), (0x01, true)] {
            call(Opcode::SetPermitJoining, &[flag], &mut state).unwrap();
            let reply = call(Opcode::GetNetworkInfo, &[], &mut state).unwrap();
            let info = NetworkInfoReply::decode(&reply.bytes).unwrap();
            assert_eq!(info.permit_joining, expected);
            assert_eq!(reply.bytes.last(), Some(&(expected as u8)));
        }
    }

    #[test]
    fn test_meter_request() {
        let mut state = demo_state();

        let reply = call(Opcode::SendMeterRequest, &addr(2), &mut state).unwrap();
        assert_eq!(reply.bytes.len(), MeterReading::LEN);
        let reading = MeterReading::decode(&reply.bytes).unwrap();
        let meter = state.registry.get(LongAddress(2)).unwrap().meter.clone().unwrap();
        assert_eq!(reading, meter.reading());

        // Routers carry no telemetry
        let err = call(Opcode::SendMeterRequest, &addr(1), &mut state).unwrap_err();
        assert_eq!(err, CommandError::NodeNotFound);
    }

    #[test]
    fn test_debug_mode_stored() {
        let mut state = demo_state();
        let mut params = addr(4).to_vec();
        params.extend_from_slice(&[0x02, 0x07]);

        call(Opcode::SetDebugMode, &params, &mut state).unwrap();
        let node = state.registry.get(LongAddress(4)).unwrap();
        assert!(node.debug_mode);
        assert_eq!((node.debug_type, node.debug_level), (0x02, 0x07));
    }

    #[test]
    fn test_upload_firmware_is_delayed() {
        let mut state = demo_state();
        let reply = call(Opcode::UploadFirmware, &[0xAB; 40], &mut state).unwrap();
        assert_eq!(reply.bytes, vec![0x00]);
        assert_eq!(reply.delay, Some(Duration::from_secs(1)));
    }
}
