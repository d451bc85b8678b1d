//! Error types for the simulated network

use thiserror::Error;
use zb_protocol::LongAddress;

/// Errors raised by the node registry
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No node holds this long address
    #[error("node not found: {0}")]
    NodeNotFound(LongAddress),

    /// Another node already holds this long address
    #[error("duplicate long address: {0}")]
    DuplicateAddress(LongAddress),

    /// Another node already holds this short address
    #[error("duplicate short address: 0x{0:04X}")]
    DuplicateShortAddress(u16),

    /// Every short address is in use
    #[error("short address space exhausted")]
    AddressSpaceExhausted,
}

/// Errors raised when changing the network identity
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkConfigError {
    /// Channel outside 11-26
    #[error("invalid channel {0}: must be within 11-26")]
    InvalidChannel(u8),
}

/// Errors raised by operations that go through the scheduler
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// Registry rejected the operation
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Network identity rejected the operation
    #[error(transparent)]
    Network(#[from] NetworkConfigError),

    /// The scheduler worker is gone, so no completion could be scheduled
    #[error("scheduler is not running")]
    SchedulerStopped,
}
