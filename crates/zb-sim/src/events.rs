//! Operator-triggered network events
//!
//! These model things that happen to a real mesh without any client asking:
//! devices joining and leaving, radio interference, mains outages and
//! over-the-air firmware updates.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;
use zb_protocol::{LongAddress, NodeType};

use crate::error::OperationError;
use crate::node::NodeStatus;
use crate::operations;
use crate::scheduler::Scheduler;
use crate::state::CoordinatorState;

/// Name prefixes given to nodes that join on their own
const JOIN_NAME_PREFIXES: [&str; 4] = ["Router", "Meter", "Sensor", "Controller"];

/// Simulated network event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// A new end device joins
    Join,
    /// A random node leaves
    Leave,
    /// Radio interference degrades every link
    Interference,
    /// Metering nodes lose mains power
    PowerOutage,
    /// Mains power comes back
    PowerRestore,
    /// A random node receives a firmware update
    FirmwareUpdate,
}

impl NetworkEvent {
    pub const ALL: [NetworkEvent; 6] = [
        NetworkEvent::Join,
        NetworkEvent::Leave,
        NetworkEvent::Interference,
        NetworkEvent::PowerOutage,
        NetworkEvent::PowerRestore,
        NetworkEvent::FirmwareUpdate,
    ];

    /// Keyword used to trigger the event from the console
    pub fn keyword(&self) -> &'static str {
        match self {
            NetworkEvent::Join => "join",
            NetworkEvent::Leave => "leave",
            NetworkEvent::Interference => "interference",
            NetworkEvent::PowerOutage => "outage",
            NetworkEvent::PowerRestore => "restore",
            NetworkEvent::FirmwareUpdate => "firmware",
        }
    }
}

impl FromStr for NetworkEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        NetworkEvent::ALL
            .into_iter()
            .find(|event| event.keyword() == s)
            .ok_or_else(|| format!("unknown event '{s}'"))
    }
}

/// What an applied event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Joined { name: String, address: LongAddress },
    Left { name: String, address: LongAddress },
    Interference { affected: usize },
    PowerOutage { affected: usize },
    PowerRestored { affected: usize },
    FirmwareUpdating { name: String, address: LongAddress },
    /// The event needed a node but the network is empty
    NoNodes,
}

impl fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventOutcome::Joined { name, address } => {
                write!(f, "Node {name} ({address}) joined the network")
            }
            EventOutcome::Left { name, address } => {
                write!(f, "Node {name} ({address}) left the network")
            }
            EventOutcome::Interference { affected } => {
                write!(f, "Network interference degraded {affected} links")
            }
            EventOutcome::PowerOutage { affected } => {
                write!(f, "Power outage: {affected} metering nodes went dark")
            }
            EventOutcome::PowerRestored { affected } => {
                write!(f, "Power restored to {affected} nodes")
            }
            EventOutcome::FirmwareUpdating { name, address } => {
                write!(f, "Firmware update started for {name} ({address})")
            }
            EventOutcome::NoNodes => f.write_str("No nodes in the network"),
        }
    }
}

/// Apply `event` to the network
///
/// `firmware_delay` is how long a simulated firmware update takes.
pub fn apply_event<R: Rng + ?Sized>(
    state: &mut CoordinatorState,
    scheduler: &Scheduler,
    event: NetworkEvent,
    firmware_delay: Duration,
    rng: &mut R,
) -> Result<EventOutcome, OperationError> {
    let outcome = match event {
        NetworkEvent::Join => {
            let prefix = JOIN_NAME_PREFIXES.choose(rng).copied().unwrap_or("Sensor");
            let name = format!("{}-{}", prefix, rng.gen_range(100..=999));
            let node = state.add_node(name, NodeType::EndDevice, rng)?;
            EventOutcome::Joined {
                name: node.name.clone(),
                address: node.long_address,
            }
        }

        NetworkEvent::Leave => match random_address(state, rng) {
            Some(address) => {
                let node = state.registry.remove(address)?;
                EventOutcome::Left {
                    name: node.name,
                    address,
                }
            }
            None => EventOutcome::NoNodes,
        },

        NetworkEvent::Interference => {
            let mut affected = 0;
            for node in state.registry.iter_mut() {
                node.rssi = node.rssi.saturating_sub(rng.gen_range(10..=30));
                node.lqi = node.lqi.saturating_sub(rng.gen_range(20..=40));
                affected += 1;
            }
            EventOutcome::Interference { affected }
        }

        NetworkEvent::PowerOutage => {
            let mut affected = 0;
            for node in state.registry.iter_mut() {
                if let Some(meter) = node.meter.as_mut() {
                    meter.de_energize();
                    node.powered = false;
                    node.status = NodeStatus::Offline;
                    affected += 1;
                }
            }
            EventOutcome::PowerOutage { affected }
        }

        NetworkEvent::PowerRestore => {
            let mut affected = 0;
            for node in state.registry.iter_mut().filter(|n| !n.powered) {
                node.powered = true;
                if let Some(meter) = node.meter.as_mut() {
                    meter.clamp();
                }
                // Nodes mid-operation resolve through their own completion
                if !node.status.is_transient() {
                    node.status = node.settled_status();
                }
                affected += 1;
            }
            EventOutcome::PowerRestored { affected }
        }

        NetworkEvent::FirmwareUpdate => match random_address(state, rng) {
            Some(address) => {
                operations::push_firmware(state, scheduler, address, firmware_delay)?;
                let name = state.registry.get(address)?.name.clone();
                EventOutcome::FirmwareUpdating { name, address }
            }
            None => EventOutcome::NoNodes,
        },
    };

    info!("Simulated {}: {}", event.keyword(), outcome);
    Ok(outcome)
}

fn random_address<R: Rng + ?Sized>(state: &CoordinatorState, rng: &mut R) -> Option<LongAddress> {
    let addresses: Vec<LongAddress> = state.registry.iter().map(|n| n.long_address).collect();
    addresses.choose(rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::VOLTAGE;
    use crate::network::{ExtendedPanId, NetworkConfig};
    use crate::node::demo_nodes;
    use crate::scheduler::spawn_scheduler;
    use crate::state::SharedState;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio::sync::watch;

    fn demo_state() -> CoordinatorState {
        let mut rng = StdRng::seed_from_u64(8);
        let network = NetworkConfig::new(0x1234, 15, ExtendedPanId([0; 8]), true).unwrap();
        CoordinatorState::with_nodes(network, &demo_nodes(), &mut rng).unwrap()
    }

    fn apply(state: &mut CoordinatorState, event: NetworkEvent, rng: &mut StdRng) -> EventOutcome {
        // Events that never schedule work get a detached scheduler
        let (scheduler, _worker) = Scheduler::channel();
        apply_event(state, &scheduler, event, Duration::from_secs(3), rng).unwrap()
    }

    #[test]
    fn test_parse_keywords() {
        for event in NetworkEvent::ALL {
            assert_eq!(event.keyword().parse::<NetworkEvent>(), Ok(event));
        }
        assert_eq!("OUTAGE".parse::<NetworkEvent>(), Ok(NetworkEvent::PowerOutage));
        assert!("earthquake".parse::<NetworkEvent>().is_err());
    }

    #[test]
    fn test_join_and_leave() {
        let mut state = demo_state();
        let mut rng = StdRng::seed_from_u64(1);

        let (name, address) = match apply(&mut state, NetworkEvent::Join, &mut rng) {
            EventOutcome::Joined { name, address } => (name, address),
            other => panic!("expected a join, got {other:?}"),
        };
        assert!(JOIN_NAME_PREFIXES.iter().any(|p| name.starts_with(p)));
        assert_eq!(state.registry.get(address).unwrap().node_type, NodeType::EndDevice);
        assert_eq!(state.registry.len(), 6);

        assert!(matches!(
            apply(&mut state, NetworkEvent::Leave, &mut rng),
            EventOutcome::Left { .. }
        ));
        assert_eq!(state.registry.len(), 5);
    }

    #[test]
    fn test_leave_on_empty_network() {
        let mut state = demo_state();
        state.registry.clear();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(apply(&mut state, NetworkEvent::Leave, &mut rng), EventOutcome::NoNodes);
    }

    #[test]
    fn test_interference_saturates() {
        let mut state = demo_state();
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..20 {
            apply(&mut state, NetworkEvent::Interference, &mut rng);
        }
        assert!(state.registry.iter().all(|n| n.rssi == i8::MIN && n.lqi == 0));
    }

    #[test]
    fn test_outage_and_restore() {
        let mut state = demo_state();
        let mut rng = StdRng::seed_from_u64(4);

        let outcome = apply(&mut state, NetworkEvent::PowerOutage, &mut rng);
        assert_eq!(outcome, EventOutcome::PowerOutage { affected: 3 });
        for node in state.registry.iter().filter(|n| n.meter.is_some()) {
            let meter = node.meter.as_ref().unwrap();
            assert_eq!(meter.voltage(), 210.0);
            assert_eq!(meter.current(), 0.0);
            assert_eq!(meter.active_power(), 0.0);
            assert!(meter.in_range());
            assert_eq!(node.status, NodeStatus::Offline);
        }
        assert_eq!(state.registry.online().count(), 2);

        let outcome = apply(&mut state, NetworkEvent::PowerRestore, &mut rng);
        assert_eq!(outcome, EventOutcome::PowerRestored { affected: 3 });
        for node in state.registry.iter() {
            assert!(node.is_online());
            if let Some(meter) = &node.meter {
                assert!(meter.in_range());
                assert!(VOLTAGE.contains(meter.voltage()));
            }
        }
    }

    #[tokio::test]
    async fn test_firmware_event_resolves() {
        let shared = SharedState::new(demo_state());
        let (_stop, stop_rx) = watch::channel(false);
        let (scheduler, _worker) = spawn_scheduler(&shared, stop_rx);
        let mut rng = StdRng::seed_from_u64(6);

        let outcome = apply_event(
            &mut shared.lock(),
            &scheduler,
            NetworkEvent::FirmwareUpdate,
            Duration::from_millis(30),
            &mut rng,
        )
        .unwrap();
        let address = match outcome {
            EventOutcome::FirmwareUpdating { address, .. } => address,
            other => panic!("expected a firmware update, got {other:?}"),
        };
        assert_eq!(
            shared.lock().registry.get(address).unwrap().status,
            NodeStatus::Updating
        );

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(shared.lock().registry.get(address).unwrap().is_online());
    }
}
