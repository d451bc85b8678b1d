//! Coordinator server lifecycle
//!
//! [`start`] binds the listener, builds the coordinator state and spawns the
//! accept loop, the telemetry simulator and the scheduler worker. Everything
//! is torn down through the returned [`RunningCoordinator`].

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use zb_protocol::{LongAddress, NodeType};
use zb_sim::{
    apply_event, run_telemetry_task, spawn_scheduler, CoordinatorState, EventOutcome,
    ExtendedPanId, NetworkConfig, NetworkEvent, Node, OperationError, RegistryError,
    SharedState, TelemetrySimulator,
};

use crate::config::EmulatorConfig;
use crate::dispatcher::Dispatcher;
use crate::error::GatewayError;
use crate::session::run_session;

/// Open connections, keyed by a per-coordinator connection id
type Connections = Arc<Mutex<HashMap<u64, SocketAddr>>>;

/// Snapshot of a running coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorStatus {
    pub port: u16,
    pub pan_id: u16,
    pub channel: u8,
    pub extended_pan_id: String,
    pub permit_joining: bool,
    pub running: bool,
    pub active_connections: usize,
    pub network_nodes: usize,
}

impl fmt::Display for CoordinatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Port:               {}", self.port)?;
        writeln!(f, "PAN ID:             0x{:04X}", self.pan_id)?;
        writeln!(f, "Channel:            {}", self.channel)?;
        writeln!(f, "Extended PAN ID:    {}", self.extended_pan_id)?;
        writeln!(f, "Permit joining:     {}", self.permit_joining)?;
        writeln!(f, "Running:            {}", self.running)?;
        writeln!(f, "Active connections: {}", self.active_connections)?;
        write!(f, "Network nodes:      {}", self.network_nodes)
    }
}

/// Handle to a started coordinator
pub struct RunningCoordinator {
    config: EmulatorConfig,
    local_addr: SocketAddr,
    dispatcher: Dispatcher,
    connections: Connections,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Bind the listener and start every coordinator task
pub async fn start(config: EmulatorConfig) -> Result<RunningCoordinator, GatewayError> {
    config.validate()?;

    let (state, extended_pan_id) = build_state(&config)?;
    let node_count = state.lock().registry.len();

    let listener = TcpListener::bind(config.bind_address()).await?;
    let local_addr = listener.local_addr()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (scheduler, scheduler_task) = spawn_scheduler(&state, shutdown_rx.clone());
    let dispatcher = Dispatcher::new(state.clone(), scheduler, config.timings.clone());
    let connections: Connections = Arc::default();

    let telemetry_task = tokio::spawn(run_telemetry_task(
        state,
        TelemetrySimulator::default(),
        config.timings.telemetry_period(),
        shutdown_rx.clone(),
    ));
    let accept_task = tokio::spawn(accept_loop(
        listener,
        dispatcher.clone(),
        connections.clone(),
        shutdown_rx,
    ));

    info!("Coordinator emulator started on {}", local_addr);
    info!(
        "PAN ID: 0x{:04X}, channel: {}, extended PAN ID: {}",
        config.pan_id, config.channel, extended_pan_id
    );
    info!("Network nodes: {}", node_count);

    Ok(RunningCoordinator {
        config,
        local_addr,
        dispatcher,
        connections,
        shutdown_tx,
        tasks: vec![accept_task, telemetry_task, scheduler_task],
    })
}

/// Initial coordinator state described by `config`
fn build_state(config: &EmulatorConfig) -> Result<(SharedState, ExtendedPanId), GatewayError> {
    let mut rng = rand::thread_rng();
    let extended_pan_id = config
        .extended_pan_id
        .map(ExtendedPanId)
        .unwrap_or_else(|| ExtendedPanId::random(&mut rng));
    let network = NetworkConfig::new(
        config.pan_id,
        config.channel,
        extended_pan_id,
        config.permit_joining,
    )?;
    let state = CoordinatorState::with_nodes(network, &config.initial_nodes(), &mut rng)?;
    Ok((SharedState::new(state), extended_pan_id))
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Dispatcher,
    connections: Connections,
    mut shutdown: watch::Receiver<bool>,
) {
    let session_shutdown = shutdown.clone();
    let mut next_id: u64 = 0;
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let id = next_id;
                    next_id += 1;
                    info!("New connection from {}", peer);
                    lock(&connections).insert(id, peer);
                    sessions.spawn(serve(
                        stream,
                        peer,
                        id,
                        dispatcher.clone(),
                        connections.clone(),
                        session_shutdown.clone(),
                    ));
                }
                Err(e) => warn!("Error accepting connection: {}", e),
            },

            // Reap finished sessions so the set does not grow
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}

            _ = shutdown.wait_for(|&stop| stop) => break,
        }
    }

    drop(listener);
    debug!("Waiting for {} sessions to close", sessions.len());
    while sessions.join_next().await.is_some() {}
}

async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    id: u64,
    dispatcher: Dispatcher,
    connections: Connections,
    shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
    }

    let peer_name = peer.to_string();
    match run_session(stream, &peer_name, dispatcher, shutdown).await {
        Ok(end) => info!("Connection closed: {} ({})", peer, end),
        Err(e) => warn!("Error handling client {}: {}", peer, e),
    }

    lock(&connections).remove(&id);
}

fn lock(connections: &Connections) -> std::sync::MutexGuard<'_, HashMap<u64, SocketAddr>> {
    connections.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RunningCoordinator {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn state(&self) -> &SharedState {
        self.dispatcher.state()
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown_tx.borrow()
    }

    pub fn active_connections(&self) -> usize {
        lock(&self.connections).len()
    }

    /// Current coordinator status
    pub fn status(&self) -> CoordinatorStatus {
        let state = self.state().lock();
        CoordinatorStatus {
            port: self.port(),
            pan_id: state.network.pan_id(),
            channel: state.network.channel(),
            extended_pan_id: state.network.extended_pan_id().to_string(),
            permit_joining: state.network.permit_joining(),
            running: self.is_running(),
            active_connections: self.active_connections(),
            network_nodes: state.registry.len(),
        }
    }

    /// Snapshot of every node, in registry order
    pub fn nodes(&self) -> Vec<Node> {
        self.state().lock().registry.iter().cloned().collect()
    }

    /// Add a node with a random address
    pub fn add_node(&self, name: &str, node_type: NodeType) -> Result<Node, RegistryError> {
        let mut state = self.state().lock();
        let node = state.add_node(name, node_type, &mut rand::thread_rng())?;
        Ok(node.clone())
    }

    /// Remove a node
    pub fn remove_node(&self, address: LongAddress) -> Result<Node, RegistryError> {
        let node = self.state().lock().registry.remove(address)?;
        info!("Node removed: {} ({})", node.name, address);
        Ok(node)
    }

    /// Trigger a simulated network event
    pub fn simulate(&self, event: NetworkEvent) -> Result<EventOutcome, OperationError> {
        let mut state = self.state().lock();
        apply_event(
            &mut state,
            self.dispatcher.scheduler(),
            event,
            self.dispatcher.timings().simulated_update(),
            &mut rand::thread_rng(),
        )
    }

    /// Stop accepting, close every session and drop all nodes
    ///
    /// Scheduled completions still pending are abandoned.
    pub async fn shutdown(self) {
        info!("Stopping coordinator emulator on {}", self.local_addr);
        self.shutdown_tx.send_replace(true);

        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Coordinator task failed: {}", e);
            }
        }

        self.dispatcher.state().lock().registry.clear();
        info!("Coordinator emulator stopped");
    }
}
