//! Shared coordinator state
//!
//! The node registry and the network identity live together in one
//! [`CoordinatorState`] behind a single mutex. Sessions, the telemetry
//! simulator and scheduled completions all go through [`SharedState`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use rand::Rng;
use tracing::info;
use zb_protocol::{LongAddress, NodeType};

use crate::error::RegistryError;
use crate::network::NetworkConfig;
use crate::node::{Node, NodeSeed, NodeStatus, LQI_RANGE, RSSI_RANGE};
use crate::registry::NodeRegistry;

/// Lowest long address given to nodes added at runtime
pub const FIRST_DYNAMIC_ADDRESS: u64 = 0x0006;

/// Everything a coordinator knows about its network
#[derive(Debug)]
pub struct CoordinatorState {
    pub registry: NodeRegistry,
    pub network: NetworkConfig,
}

impl CoordinatorState {
    /// Create a state with no nodes
    pub fn new(network: NetworkConfig) -> Self {
        Self {
            registry: NodeRegistry::new(),
            network,
        }
    }

    /// Create a state populated from `seeds`
    pub fn with_nodes<R: Rng + ?Sized>(
        network: NetworkConfig,
        seeds: &[NodeSeed],
        rng: &mut R,
    ) -> Result<Self, RegistryError> {
        let mut state = Self::new(network);
        for seed in seeds {
            state.seed_node(seed, rng)?;
        }
        Ok(state)
    }

    /// Insert a node described by a seed
    pub fn seed_node<R: Rng + ?Sized>(
        &mut self,
        seed: &NodeSeed,
        rng: &mut R,
    ) -> Result<(), RegistryError> {
        let short = match seed.short_address {
            Some(short) => short,
            None => self.registry.allocate_short_address()?,
        };
        let node = Node::new(
            seed.long_address,
            seed.name.clone(),
            short,
            seed.node_type,
            seed.rssi,
            seed.lqi,
            rng,
        );
        self.registry.insert(node)
    }

    /// Add a node with a random unused long address and fresh radio metrics
    pub fn add_node<R: Rng + ?Sized>(
        &mut self,
        name: impl Into<String>,
        node_type: NodeType,
        rng: &mut R,
    ) -> Result<&Node, RegistryError> {
        let address = loop {
            let candidate = LongAddress(rng.gen_range(FIRST_DYNAMIC_ADDRESS..=u64::MAX));
            if !self.registry.contains(candidate) {
                break candidate;
            }
        };
        let short = self.registry.allocate_short_address()?;
        let node = Node::new(
            address,
            name,
            short,
            node_type,
            rng.gen_range(RSSI_RANGE),
            rng.gen_range(LQI_RANGE),
            rng,
        );
        info!("Node added: {} ({})", node.name, address);
        self.registry.insert(node)?;
        self.registry.get(address)
    }

    /// Put every node into the same status
    pub fn mark_all(&mut self, status: NodeStatus) {
        for node in self.registry.iter_mut() {
            node.status = status;
        }
    }

    /// Resolve every node still in `expected`; returns how many were resolved
    pub fn resolve_all(&mut self, expected: NodeStatus) -> usize {
        self.registry
            .iter_mut()
            .map(|node| node.resolve(expected))
            .filter(|&resolved| resolved)
            .count()
    }
}

/// Cloneable handle to the state mutex
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Mutex<CoordinatorState>>,
}

impl SharedState {
    pub fn new(state: CoordinatorState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Lock the state
    ///
    /// A panic while the lock was held leaves the data usable, so poisoning
    /// is ignored rather than propagated to every later caller.
    pub fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the lock
    pub fn with<T>(&self, f: impl FnOnce(&mut CoordinatorState) -> T) -> T {
        f(&mut self.lock())
    }

    /// Handle that does not keep the state alive
    pub fn downgrade(&self) -> WeakState {
        WeakState {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning handle used by deferred work
#[derive(Debug, Clone)]
pub struct WeakState {
    inner: Weak<Mutex<CoordinatorState>>,
}

impl WeakState {
    /// The state, if it has not been torn down
    pub fn upgrade(&self) -> Option<SharedState> {
        self.inner.upgrade().map(|inner| SharedState { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ExtendedPanId;
    use crate::node::demo_nodes;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn demo_state() -> CoordinatorState {
        let mut rng = StdRng::seed_from_u64(5);
        let network = NetworkConfig::new(0x1234, 11, ExtendedPanId([0; 8]), true).unwrap();
        CoordinatorState::with_nodes(network, &demo_nodes(), &mut rng).unwrap()
    }

    #[test]
    fn test_demo_state() {
        let state = demo_state();
        assert_eq!(state.registry.len(), 5);
        assert!(state.registry.iter().all(|n| n.is_online()));
        let meters = state.registry.iter().filter(|n| n.meter.is_some()).count();
        assert_eq!(meters, 3);
    }

    #[test]
    fn test_add_node_gets_next_short_address() {
        let mut state = demo_state();
        let mut rng = StdRng::seed_from_u64(9);

        let node = state.add_node("Meter-100", NodeType::EndDevice, &mut rng).unwrap();
        assert_eq!(node.short_address, 6);
        assert!(node.long_address.0 >= FIRST_DYNAMIC_ADDRESS);
        assert!(node.meter.is_some());
        assert!(RSSI_RANGE.contains(&node.rssi));
        assert!(LQI_RANGE.contains(&node.lqi));
        assert_eq!(state.registry.len(), 6);
    }

    #[test]
    fn test_resolve_all_skips_other_statuses() {
        let mut state = demo_state();
        state.mark_all(NodeStatus::Reconnecting);
        state.registry.get_mut(LongAddress(3)).unwrap().status = NodeStatus::Rebooting;

        assert_eq!(state.resolve_all(NodeStatus::Reconnecting), 4);
        assert_eq!(
            state.registry.get(LongAddress(3)).unwrap().status,
            NodeStatus::Rebooting
        );
    }

    #[test]
    fn test_weak_state_after_teardown() {
        let shared = SharedState::new(demo_state());
        let weak = shared.downgrade();
        assert!(weak.upgrade().is_some());
        drop(shared);
        assert!(weak.upgrade().is_none());
    }
}
