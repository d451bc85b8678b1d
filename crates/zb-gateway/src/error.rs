//! Error types for the gateway

use thiserror::Error;
use zb_protocol::StatusCode;
use zb_sim::{NetworkConfigError, OperationError, RegistryError};

/// Errors that stop a coordinator from starting or running
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Initial node set was rejected by the registry
    #[error("invalid initial nodes: {0}")]
    Registry(#[from] RegistryError),

    /// Initial network identity was rejected
    #[error("invalid network: {0}")]
    Network(#[from] NetworkConfigError),
}

/// Failure of a single command handler
///
/// Every variant resolves to one status byte at the dispatcher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Malformed request; nothing was changed
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The target node does not exist
    #[error("node not found")]
    NodeNotFound,

    /// Unexpected internal fault
    #[error("internal error: {0}")]
    Internal(String),
}

impl CommandError {
    /// Status byte reported to the client
    pub fn status(&self) -> StatusCode {
        match self {
            CommandError::InvalidParameters(_) => StatusCode::InvalidParameters,
            CommandError::NodeNotFound => StatusCode::NodeNotFound,
            CommandError::Internal(_) => StatusCode::NetworkError,
        }
    }
}

impl From<RegistryError> for CommandError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NodeNotFound(_) => CommandError::NodeNotFound,
            RegistryError::DuplicateAddress(_) => CommandError::InvalidParameters(e.to_string()),
            RegistryError::DuplicateShortAddress(_) | RegistryError::AddressSpaceExhausted => {
                CommandError::Internal(e.to_string())
            }
        }
    }
}

impl From<NetworkConfigError> for CommandError {
    fn from(e: NetworkConfigError) -> Self {
        CommandError::InvalidParameters(e.to_string())
    }
}

impl From<OperationError> for CommandError {
    fn from(e: OperationError) -> Self {
        match e {
            OperationError::Registry(e) => e.into(),
            OperationError::Network(e) => e.into(),
            OperationError::SchedulerStopped => CommandError::Internal(e.to_string()),
        }
    }
}

impl From<zb_protocol::ParseError> for CommandError {
    fn from(e: zb_protocol::ParseError) -> Self {
        CommandError::InvalidParameters(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zb_protocol::LongAddress;

    #[test]
    fn test_status_mapping() {
        let not_found: CommandError = RegistryError::NodeNotFound(LongAddress(1)).into();
        assert_eq!(not_found.status(), StatusCode::NodeNotFound);

        let duplicate: CommandError = RegistryError::DuplicateAddress(LongAddress(1)).into();
        assert_eq!(duplicate.status(), StatusCode::InvalidParameters);

        let channel: CommandError = OperationError::Network(NetworkConfigError::InvalidChannel(9)).into();
        assert_eq!(channel.status(), StatusCode::InvalidParameters);

        let stopped: CommandError = OperationError::SchedulerStopped.into();
        assert_eq!(stopped.status(), StatusCode::NetworkError);
    }
}
