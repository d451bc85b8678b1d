//! Coordinator Gateway Engine
//!
//! This crate serves the coordinator protocol over TCP against the simulated
//! network from `zb_sim`.
//!
//! # Architecture
//!
//! - **Dispatcher**: validates parameter lengths and routes each opcode to
//!   its handler, turning every failure into a status byte
//! - **Session**: one read-dispatch-write loop per connection, with an idle
//!   timeout
//! - **Server**: accept loop, telemetry simulator and scheduler worker,
//!   started and stopped together
//!
//! # Example
//!
//! ```rust,no_run
//! use zb_gateway::{start, EmulatorConfig};
//!
//! # async fn run() -> Result<(), zb_gateway::GatewayError> {
//! let coordinator = start(EmulatorConfig {
//!     port: 8080,
//!     ..Default::default()
//! })
//! .await?;
//!
//! println!("{}", coordinator.status());
//! coordinator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod server;
pub mod session;

pub use config::{EmulatorConfig, Timings};
pub use dispatcher::Dispatcher;
pub use error::{CommandError, GatewayError};
pub use handlers::Reply;
pub use server::{start, CoordinatorStatus, RunningCoordinator};
pub use session::{run_session, SessionEnd};
