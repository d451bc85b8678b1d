//! Interactive operator console
//!
//! Reads commands from stdin and applies them to a running coordinator.
//! Parsing is kept separate from execution so both can be tested without a
//! terminal.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use zb_gateway::{start, RunningCoordinator};
use zb_protocol::{LongAddress, NodeType};
use zb_sim::{NetworkEvent, Node};

use crate::settings::Settings;

const HELP: &str = "\
Available commands:
  help                        - Show this help message
  status                      - Show coordinator status
  list                        - List all nodes in the network
  nodes                       - Show detailed node information
  add <name> [router|end|sleepy]
                              - Add a node (end device by default)
  remove <addr>               - Remove a node by hex address
  simulate <event>            - Simulate a network event:
                                join, leave, interference, outage, restore, firmware
  restart                     - Restart the coordinator on the same port
  save                        - Save the current configuration
  exit                        - Stop the coordinator and exit";

/// A parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Status,
    List,
    Nodes,
    Add { name: String, node_type: NodeType },
    Remove(LongAddress),
    Simulate(NetworkEvent),
    Restart,
    Save,
    Exit,
}

impl ConsoleCommand {
    /// Parse one input line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(keyword) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match keyword.to_ascii_lowercase().as_str() {
            "help" | "?" => Self::Help,
            "status" => Self::Status,
            "list" => Self::List,
            "nodes" => Self::Nodes,
            "restart" => Self::Restart,
            "save" => Self::Save,
            "exit" | "quit" => Self::Exit,
            "add" => {
                let (name, node_type) = match args.as_slice() {
                    [name] => (*name, NodeType::EndDevice),
                    [name, kind] => (*name, parse_node_type(kind)?),
                    _ => return Err("Usage: add <name> [router|end|sleepy]".to_string()),
                };
                Self::Add {
                    name: name.to_string(),
                    node_type,
                }
            }
            "remove" => match args.as_slice() {
                [addr] => Self::Remove(
                    addr.parse::<LongAddress>()
                        .map_err(|_| format!("Invalid address: {}", addr))?,
                ),
                _ => return Err("Usage: remove <hex_address>".to_string()),
            },
            "simulate" => match args.as_slice() {
                [event] => Self::Simulate(event.parse::<NetworkEvent>()?),
                _ => return Err(format!("Usage: simulate <{}>", event_keywords())),
            },
            other => {
                return Err(format!(
                    "Unknown command: {}\nType 'help' for available commands",
                    other
                ))
            }
        };
        Ok(Some(command))
    }
}

fn parse_node_type(kind: &str) -> Result<NodeType, String> {
    match kind.to_ascii_lowercase().as_str() {
        "router" | "1" => Ok(NodeType::Router),
        "end" | "end-device" | "2" => Ok(NodeType::EndDevice),
        "sleepy" | "sleepy-end-device" | "3" => Ok(NodeType::SleepyEndDevice),
        other => Err(format!(
            "Unknown node type '{}', expected router, end or sleepy",
            other
        )),
    }
}

fn event_keywords() -> String {
    NetworkEvent::ALL
        .iter()
        .map(|e| e.keyword())
        .collect::<Vec<_>>()
        .join("|")
}

/// What the console loop should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleOutcome {
    /// Print the text and read the next command
    Continue(String),
    /// Stop the coordinator and leave
    Exit,
}

/// Operator console bound to one coordinator
pub struct Console {
    coordinator: Option<RunningCoordinator>,
    settings: Settings,
    settings_path: Option<PathBuf>,
}

impl Console {
    pub fn new(
        coordinator: RunningCoordinator,
        settings: Settings,
        settings_path: Option<PathBuf>,
    ) -> Self {
        Self {
            coordinator: Some(coordinator),
            settings,
            settings_path,
        }
    }

    pub fn coordinator(&self) -> Option<&RunningCoordinator> {
        self.coordinator.as_ref()
    }

    /// Parse and run one input line
    pub async fn execute(&mut self, line: &str) -> ConsoleOutcome {
        match ConsoleCommand::parse(line) {
            Ok(Some(command)) => self.run(command).await,
            Ok(None) => ConsoleOutcome::Continue(String::new()),
            Err(message) => ConsoleOutcome::Continue(message),
        }
    }

    pub async fn run(&mut self, command: ConsoleCommand) -> ConsoleOutcome {
        let text = match command {
            ConsoleCommand::Exit => return ConsoleOutcome::Exit,
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Restart => self.restart().await,
            ConsoleCommand::Save => self.save(),
            command => match &self.coordinator {
                Some(coordinator) => inspect(coordinator, command),
                None => "Coordinator not running; try 'restart'".to_string(),
            },
        };
        ConsoleOutcome::Continue(text)
    }

    async fn restart(&mut self) -> String {
        let Some(previous) = self.coordinator.take() else {
            return self.start_fresh(self.settings.emulator.clone()).await;
        };

        let mut config = previous.config().clone();
        config.port = previous.port();
        previous.shutdown().await;
        self.start_fresh(config).await
    }

    async fn start_fresh(&mut self, config: zb_gateway::EmulatorConfig) -> String {
        match start(config).await {
            Ok(coordinator) => {
                let port = coordinator.port();
                self.coordinator = Some(coordinator);
                format!("Coordinator restarted on port {}", port)
            }
            Err(e) => {
                warn!("Restart failed: {}", e);
                format!("Failed to restart coordinator: {}", e)
            }
        }
    }

    fn save(&mut self) -> String {
        if let Some(coordinator) = &self.coordinator {
            let status = coordinator.status();
            let mut config = coordinator.config().clone();
            config.pan_id = status.pan_id;
            config.channel = status.channel;
            config.permit_joining = status.permit_joining;
            self.settings.emulator = config;
        }

        match self.settings.save(self.settings_path.as_deref()) {
            Ok(path) => format!("Configuration saved to {}", path.display()),
            Err(e) => format!("Failed to save configuration: {}", e),
        }
    }

    /// Read commands from stdin until `exit`, EOF or Ctrl+C
    pub async fn run_interactive(mut self) -> anyhow::Result<()> {
        println!("{}", "=".repeat(60));
        println!("ZigBee Coordinator Emulator - Command Line Interface");
        println!("{}", "=".repeat(60));
        println!("{}", HELP);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("\ncoordinator> ");
            std::io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    println!("\nInterrupted");
                    None
                }
            };
            let Some(line) = line else { break };

            match self.execute(&line).await {
                ConsoleOutcome::Continue(text) if text.is_empty() => {}
                ConsoleOutcome::Continue(text) => println!("{}", text),
                ConsoleOutcome::Exit => break,
            }
        }

        println!("\nStopping coordinator...");
        self.shutdown().await;
        println!("Goodbye!");
        Ok(())
    }

    pub async fn shutdown(mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            coordinator.shutdown().await;
        }
    }
}

/// Commands that only need a live coordinator
fn inspect(coordinator: &RunningCoordinator, command: ConsoleCommand) -> String {
    match command {
        ConsoleCommand::Status => {
            let rule = "=".repeat(40);
            format!("Coordinator Status:\n{rule}\n{}\n{rule}", coordinator.status())
        }
        ConsoleCommand::List => node_table(&coordinator.nodes()),
        ConsoleCommand::Nodes => node_details(&coordinator.nodes()),
        ConsoleCommand::Add { name, node_type } => {
            match coordinator.add_node(&name, node_type) {
                Ok(node) => format!(
                    "Node added successfully: {} ({})",
                    node.name, node.long_address
                ),
                Err(e) => format!("Error adding node: {}", e),
            }
        }
        ConsoleCommand::Remove(address) => match coordinator.remove_node(address) {
            Ok(node) => format!("Node removed successfully: {}", node.name),
            Err(e) => format!("Failed to remove node: {}", e),
        },
        ConsoleCommand::Simulate(event) => match coordinator.simulate(event) {
            Ok(outcome) => format!("Simulated: {}", outcome),
            Err(e) => format!("Simulation failed: {}", e),
        },
        ConsoleCommand::Help
        | ConsoleCommand::Restart
        | ConsoleCommand::Save
        | ConsoleCommand::Exit => String::new(),
    }
}

fn node_table(nodes: &[Node]) -> String {
    if nodes.is_empty() {
        return "No nodes in network".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Nodes in network:");
    let _ = writeln!(out, "{}", "=".repeat(80));
    let _ = writeln!(
        out,
        "{:<15} {:<18} {:<18} {:<16} {:<6} {:<6}",
        "Name", "Address", "Type", "Status", "RSSI", "LQI"
    );
    let _ = writeln!(out, "{}", "-".repeat(80));
    for node in nodes {
        let _ = writeln!(
            out,
            "{:<15} {:<18} {:<18} {:<16} {:<6} {:<6}",
            node.name,
            node.long_address.to_string(),
            node.node_type.name(),
            node.status.name(),
            node.rssi,
            node.lqi
        );
    }
    let _ = writeln!(out, "{}", "=".repeat(80));
    let _ = write!(out, "Total: {} nodes", nodes.len());
    out
}

fn node_details(nodes: &[Node]) -> String {
    if nodes.is_empty() {
        return "No nodes in network".to_string();
    }

    let mut out = String::from("Detailed Node Information:\n");
    out.push_str(&"=".repeat(100));
    for node in nodes {
        let _ = writeln!(out, "\n\nNode: {}", node.name);
        let _ = writeln!(out, "  Address: {}", node.long_address);
        let _ = writeln!(out, "  Short Address: 0x{:04X}", node.short_address);
        let _ = writeln!(out, "  Type: {}", node.node_type.name());
        let _ = writeln!(out, "  Status: {}", node.status);
        let _ = writeln!(out, "  RSSI: {} dBm, LQI: {}", node.rssi, node.lqi);
        let _ = write!(out, "  Firmware: {}", node.firmware_version);
        if node.debug_mode {
            let _ = write!(
                out,
                "\n  Debug: type {} level {}",
                node.debug_type, node.debug_level
            );
        }

        if let Some(meter) = &node.meter {
            let _ = writeln!(out, "\n  Meter Data:");
            let _ = writeln!(out, "    Voltage: {:.2} V", meter.voltage());
            let _ = writeln!(out, "    Current: {:.2} A", meter.current());
            let _ = writeln!(out, "    Active Power: {:.2} kW", meter.active_power());
            let _ = writeln!(out, "    Reactive Power: {:.2} kVar", meter.reactive_power());
            let _ = writeln!(out, "    Apparent Power: {:.2} kVA", meter.apparent_power());
            let _ = writeln!(out, "    Power Factor: {:.3}", meter.power_factor());
            let _ = writeln!(out, "    Frequency: {:.2} Hz", meter.frequency());
            let _ = write!(out, "    Neutral Current: {:.2} A", meter.neutral_current());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use zb_gateway::{EmulatorConfig, Timings};

    fn local_config() -> EmulatorConfig {
        EmulatorConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            timings: Timings {
                telemetry_period_ms: 60_000,
                ..Timings::default()
            },
            ..EmulatorConfig::default()
        }
    }

    async fn console() -> Console {
        let coordinator = start(local_config()).await.unwrap();
        Console::new(coordinator, Settings::default(), None)
    }

    fn text(outcome: ConsoleOutcome) -> String {
        match outcome {
            ConsoleOutcome::Continue(text) => text,
            ConsoleOutcome::Exit => panic!("unexpected exit"),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse("  "), Ok(None));
        assert_eq!(ConsoleCommand::parse("STATUS"), Ok(Some(ConsoleCommand::Status)));
        assert_eq!(
            ConsoleCommand::parse("add Meter-9 router"),
            Ok(Some(ConsoleCommand::Add {
                name: "Meter-9".to_string(),
                node_type: NodeType::Router,
            }))
        );
        assert_eq!(
            ConsoleCommand::parse("add Sensor-1"),
            Ok(Some(ConsoleCommand::Add {
                name: "Sensor-1".to_string(),
                node_type: NodeType::EndDevice,
            }))
        );
        assert_eq!(
            ConsoleCommand::parse("remove 0x0000000000000003"),
            Ok(Some(ConsoleCommand::Remove(LongAddress(3))))
        );
        assert_eq!(
            ConsoleCommand::parse("simulate outage"),
            Ok(Some(ConsoleCommand::Simulate(NetworkEvent::PowerOutage)))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(ConsoleCommand::parse("add").is_err());
        assert!(ConsoleCommand::parse("add x toaster").is_err());
        assert!(ConsoleCommand::parse("remove zz").is_err());
        assert!(ConsoleCommand::parse("simulate").is_err());
        assert!(ConsoleCommand::parse("simulate meteor").is_err());
        assert!(ConsoleCommand::parse("launch").is_err());
    }

    #[tokio::test]
    async fn test_add_list_remove() {
        let mut console = console().await;

        let added = text(console.execute("add Meter-77 sleepy").await);
        assert!(added.starts_with("Node added successfully: Meter-77"));

        let listing = text(console.execute("list").await);
        assert!(listing.contains("Meter-77"));
        assert!(listing.contains("SLEEPY_END_DEVICE"));
        assert!(listing.ends_with("Total: 6 nodes"));

        let removed = text(console.execute("remove 3").await);
        assert_eq!(removed, "Node removed successfully: Meter-2");
        assert!(text(console.execute("remove 3").await).starts_with("Failed"));

        let details = text(console.execute("nodes").await);
        assert!(details.contains("Voltage:"));
        assert!(!details.contains("Meter-2"));

        console.shutdown().await;
    }

    #[tokio::test]
    async fn test_simulate_and_status() {
        let mut console = console().await;

        let outage = text(console.execute("simulate outage").await);
        assert!(outage.contains("3 metering nodes"));

        let status = text(console.execute("status").await);
        assert!(status.contains("PAN ID:             0x1234"));
        assert!(status.contains("Network nodes:      5"));

        assert_eq!(console.execute("exit").await, ConsoleOutcome::Exit);
        console.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_keeps_port_and_resets_nodes() {
        let mut console = console().await;
        let port = console.coordinator().unwrap().port();

        text(console.execute("add Extra-1").await);
        let restarted = text(console.execute("restart").await);
        assert_eq!(restarted, format!("Coordinator restarted on port {}", port));

        let coordinator = console.coordinator().unwrap();
        assert_eq!(coordinator.port(), port);
        assert_eq!(coordinator.nodes().len(), 5);

        console.shutdown().await;
    }

    proptest! {
        #[test]
        fn parse_never_panics(line in "\\PC{0,40}") {
            let _ = ConsoleCommand::parse(&line);
        }
    }
}
