//! Node registry
//!
//! In-memory table of simulated nodes keyed by long address. Iteration order
//! is insertion order, which is the order `GetAllNodes` and `GetActiveNodes`
//! report nodes in.

use tracing::debug;
use zb_protocol::LongAddress;

use crate::error::RegistryError;
use crate::node::Node;

/// Lowest short address handed out by the counter
const FIRST_SHORT_ADDRESS: u16 = 0x0001;
/// Highest short address handed out by the counter
const LAST_SHORT_ADDRESS: u16 = 0xFFFE;

/// Table of simulated nodes
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
    next_short_address: u16,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            next_short_address: FIRST_SHORT_ADDRESS,
        }
    }

    fn position(&self, address: LongAddress) -> Option<usize> {
        self.nodes.iter().position(|n| n.long_address == address)
    }

    /// Check whether a node holds `address`
    pub fn contains(&self, address: LongAddress) -> bool {
        self.position(address).is_some()
    }

    /// Look up a node by long address
    pub fn get(&self, address: LongAddress) -> Result<&Node, RegistryError> {
        self.nodes
            .iter()
            .find(|n| n.long_address == address)
            .ok_or(RegistryError::NodeNotFound(address))
    }

    /// Look up a node by long address for mutation
    pub fn get_mut(&mut self, address: LongAddress) -> Result<&mut Node, RegistryError> {
        self.nodes
            .iter_mut()
            .find(|n| n.long_address == address)
            .ok_or(RegistryError::NodeNotFound(address))
    }

    /// Look up a node by short address for mutation
    ///
    /// Short addresses survive a remap, so deferred work that must follow a
    /// node across `SetMacAddress` keys on them.
    pub fn get_by_short_mut(&mut self, short_address: u16) -> Option<&mut Node> {
        self.nodes
            .iter_mut()
            .find(|n| n.short_address == short_address)
    }

    /// Add a node at the end of the iteration order
    pub fn insert(&mut self, node: Node) -> Result<(), RegistryError> {
        if self.contains(node.long_address) {
            return Err(RegistryError::DuplicateAddress(node.long_address));
        }
        if self.nodes.iter().any(|n| n.short_address == node.short_address) {
            return Err(RegistryError::DuplicateShortAddress(node.short_address));
        }

        // Explicitly numbered nodes push the counter past themselves so it
        // stays monotonic.
        if node.short_address >= self.next_short_address {
            self.next_short_address = node.short_address.saturating_add(1);
        }

        debug!(
            "Registered node {} ({}) short=0x{:04X}",
            node.name, node.long_address, node.short_address
        );
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node, returning it
    pub fn remove(&mut self, address: LongAddress) -> Result<Node, RegistryError> {
        let index = self
            .position(address)
            .ok_or(RegistryError::NodeNotFound(address))?;
        Ok(self.nodes.remove(index))
    }

    /// Move a node to a new long address, keeping every other field
    ///
    /// The node keeps its place in the iteration order. Remapping onto an
    /// address held by a different node fails without changing anything.
    pub fn remap(&mut self, old: LongAddress, new: LongAddress) -> Result<(), RegistryError> {
        let index = self.position(old).ok_or(RegistryError::NodeNotFound(old))?;
        if old != new && self.contains(new) {
            return Err(RegistryError::DuplicateAddress(new));
        }
        self.nodes[index].long_address = new;
        Ok(())
    }

    /// Next unused short address from the monotonic counter
    ///
    /// The counter only wraps once the top of the range is reached; values
    /// still held by a live node are skipped.
    pub fn allocate_short_address(&mut self) -> Result<u16, RegistryError> {
        let span = usize::from(LAST_SHORT_ADDRESS - FIRST_SHORT_ADDRESS) + 1;
        let mut candidate = self.next_short_address;

        for _ in 0..span {
            if !(FIRST_SHORT_ADDRESS..=LAST_SHORT_ADDRESS).contains(&candidate) {
                candidate = FIRST_SHORT_ADDRESS;
            }
            if !self.nodes.iter().any(|n| n.short_address == candidate) {
                self.next_short_address = candidate.wrapping_add(1);
                return Ok(candidate);
            }
            candidate = candidate.wrapping_add(1);
        }

        Err(RegistryError::AddressSpaceExhausted)
    }

    /// Nodes in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Nodes in insertion order, mutable
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    /// Nodes whose status is online, in insertion order
    pub fn online(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_online())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}
