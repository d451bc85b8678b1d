//! Telemetry simulator
//!
//! Periodically perturbs meter readings and link metrics of metering nodes,
//! and occasionally flips them between online and offline.

use std::time::{Duration, SystemTime};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::node::{NodeStatus, LQI_RANGE, RSSI_RANGE};
use crate::state::{CoordinatorState, SharedState};

/// Result of one simulator tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Metering nodes whose readings were updated
    pub updated: usize,
    /// Nodes whose online/offline status changed
    pub flipped: usize,
}

/// Parameters of the telemetry random process
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySimulator {
    /// Chance per tick that a node re-rolls its online/offline status
    pub flip_probability: f64,
    /// Chance that a re-rolled status comes out online
    pub online_bias: f64,
}

impl Default for TelemetrySimulator {
    fn default() -> Self {
        Self {
            flip_probability: 0.05,
            online_bias: 0.7,
        }
    }
}

impl TelemetrySimulator {
    /// Advance every metering node by one step
    ///
    /// Unpowered nodes and nodes waiting on an operation are left alone.
    pub fn tick<R: Rng + ?Sized>(&self, state: &mut CoordinatorState, rng: &mut R) -> TickSummary {
        let mut summary = TickSummary::default();
        let now = SystemTime::now();

        for node in state.registry.iter_mut() {
            if !node.powered || node.status.is_transient() {
                continue;
            }
            let Some(meter) = node.meter.as_mut() else {
                continue;
            };

            meter.random_walk(rng);

            if rng.gen_bool(self.flip_probability) {
                let status = if rng.gen_bool(self.online_bias) {
                    NodeStatus::Online
                } else {
                    NodeStatus::Offline
                };
                if status != node.status {
                    debug!("Node {} is now {}", node.long_address, status);
                    node.status = status;
                    summary.flipped += 1;
                }
            }

            node.rssi = rng.gen_range(RSSI_RANGE);
            node.lqi = rng.gen_range(LQI_RANGE);
            node.last_seen = now;
            summary.updated += 1;
        }

        summary
    }
}

/// Run the simulator every `period` until shutdown
pub async fn run_telemetry_task(
    state: SharedState,
    simulator: TelemetrySimulator,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut rng = StdRng::from_entropy();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!("Telemetry simulator running every {:?}", period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let summary = simulator.tick(&mut state.lock(), &mut rng);
                debug!(
                    "Telemetry tick: {} meters updated, {} status changes",
                    summary.updated, summary.flipped
                );
            }
            _ = shutdown.wait_for(|&stop| stop) => break,
        }
    }

    debug!("Telemetry simulator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ExtendedPanId, NetworkConfig};
    use crate::node::demo_nodes;
    use proptest::prelude::*;
    use zb_protocol::LongAddress;

    fn demo_state(seed: u64) -> CoordinatorState {
        let mut rng = StdRng::seed_from_u64(seed);
        let network = NetworkConfig::new(0x1234, 11, ExtendedPanId([0; 8]), true).unwrap();
        CoordinatorState::with_nodes(network, &demo_nodes(), &mut rng).unwrap()
    }

    #[test]
    fn test_tick_touches_meters_only() {
        let mut state = demo_state(1);
        let mut rng = StdRng::seed_from_u64(2);
        let router_before = state.registry.get(LongAddress(1)).unwrap().rssi;

        let summary = TelemetrySimulator::default().tick(&mut state, &mut rng);

        assert_eq!(summary.updated, 3);
        assert_eq!(state.registry.get(LongAddress(1)).unwrap().rssi, router_before);
    }

    #[test]
    fn test_tick_skips_transient_and_unpowered() {
        let mut state = demo_state(1);
        let mut rng = StdRng::seed_from_u64(2);
        state.registry.get_mut(LongAddress(2)).unwrap().status = NodeStatus::Rebooting;
        state.registry.get_mut(LongAddress(3)).unwrap().powered = false;

        let always_flip = TelemetrySimulator {
            flip_probability: 1.0,
            online_bias: 0.0,
        };
        let summary = always_flip.tick(&mut state, &mut rng);

        assert_eq!(summary.updated, 1);
        assert_eq!(
            state.registry.get(LongAddress(2)).unwrap().status,
            NodeStatus::Rebooting
        );
        assert_eq!(
            state.registry.get(LongAddress(5)).unwrap().status,
            NodeStatus::Offline
        );
    }

    #[test]
    fn test_link_metrics_stay_in_range() {
        let mut state = demo_state(3);
        let mut rng = StdRng::seed_from_u64(4);
        let simulator = TelemetrySimulator::default();

        for _ in 0..100 {
            simulator.tick(&mut state, &mut rng);
            for node in state.registry.iter().filter(|n| n.meter.is_some()) {
                assert!(RSSI_RANGE.contains(&node.rssi));
                assert!(LQI_RANGE.contains(&node.lqi));
            }
        }
    }

    #[tokio::test]
    async fn test_task_stops_on_shutdown() {
        let shared = SharedState::new(demo_state(5));
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_telemetry_task(
            shared.clone(),
            TelemetrySimulator::default(),
            Duration::from_millis(10),
            stop_rx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    proptest! {
        #[test]
        fn meters_stay_bounded(seed in any::<u64>(), ticks in 1usize..200) {
            let mut state = demo_state(seed);
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
            let simulator = TelemetrySimulator::default();

            for _ in 0..ticks {
                simulator.tick(&mut state, &mut rng);
                for meter in state.registry.iter().filter_map(|n| n.meter.as_ref()) {
                    prop_assert!(meter.in_range());
                    let p = meter.active_power();
                    let q = meter.reactive_power();
                    prop_assert_eq!(meter.apparent_power(), (p * p + q * q).sqrt());
                }
            }
        }
    }
}
