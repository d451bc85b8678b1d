//! Coordinator Network Simulation Library
//!
//! This crate holds the simulated radio network behind the coordinator
//! emulator. It includes:
//!
//! - **NodeRegistry**: the node table keyed by long address
//! - **NetworkConfig**: PAN id, extended PAN id, channel and permit-joining
//! - **TelemetrySimulator**: periodic random walk of meter readings
//! - **Scheduler**: deferred completion of reboots, firmware pushes and
//!   network re-formation
//! - **NetworkEvent**: operator-triggered joins, outages and interference
//!
//! All of it lives in one [`CoordinatorState`] guarded by a single mutex.
//!
//! # Example
//!
//! ```rust
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use zb_protocol::LongAddress;
//! use zb_sim::{demo_nodes, CoordinatorState, ExtendedPanId, NetworkConfig};
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let network = NetworkConfig::new(0x1A2B, 11, ExtendedPanId::random(&mut rng), true).unwrap();
//! let mut state = CoordinatorState::with_nodes(network, &demo_nodes(), &mut rng).unwrap();
//!
//! state.registry.remove(LongAddress(5)).unwrap();
//! assert_eq!(state.registry.len(), 4);
//! assert!(state.registry.get(LongAddress(5)).is_err());
//! ```

pub mod error;
pub mod events;
pub mod meter;
pub mod network;
pub mod node;
pub mod operations;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod telemetry;

pub use error::{NetworkConfigError, OperationError, RegistryError};
pub use events::{apply_event, EventOutcome, NetworkEvent};
pub use meter::MeterTelemetry;
pub use network::{ExtendedPanId, NetworkConfig, CHANNEL_RANGE};
pub use node::{demo_nodes, Node, NodeSeed, NodeStatus, DEFAULT_FIRMWARE};
pub use registry::NodeRegistry;
pub use scheduler::{spawn_scheduler, Scheduler};
pub use state::{CoordinatorState, SharedState, WeakState};
pub use telemetry::{run_telemetry_task, TelemetrySimulator, TickSummary};
