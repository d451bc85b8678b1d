//! ZigBee coordinator emulator
//!
//! Runs one or more emulated coordinators speaking the binary TCP command
//! protocol, with an optional operator console and a connectivity probe.

mod console;
mod launcher;
mod probe;
mod settings;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::Console;
use settings::Settings;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zb_gateway::{start, EmulatorConfig};

/// ZigBee Coordinator Emulator
#[derive(Parser, Debug)]
#[command(name = "zigemu")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Settings file (default: $XDG_CONFIG_HOME/zigemu/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a coordinator until Ctrl+C (the default)
    Start(NetworkArgs),
    /// Run a coordinator with the interactive operator console
    Console(NetworkArgs),
    /// Run several coordinators on sequential ports
    Multi(MultiArgs),
    /// Send an OpenSession frame to a coordinator and print the reply
    Probe(ProbeArgs),
}

/// Overrides applied on top of the settings file
#[derive(Args, Debug, Default)]
struct NetworkArgs {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// PAN id in hex, e.g. 0x1234
    #[arg(long, value_parser = parse_pan_id)]
    pan_id: Option<u16>,

    /// Radio channel, 11-26
    #[arg(long)]
    channel: Option<u8>,
}

impl NetworkArgs {
    fn apply(&self, config: &mut EmulatorConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(pan_id) = self.pan_id {
            config.pan_id = pan_id;
        }
        if let Some(channel) = self.channel {
            config.channel = channel;
        }
    }
}

#[derive(Args, Debug)]
struct MultiArgs {
    /// Port of the first instance
    #[arg(long, default_value_t = 9000)]
    base_port: u16,

    /// Number of instances
    #[arg(long, default_value_t = 3)]
    count: usize,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,
}

#[derive(Args, Debug)]
struct ProbeArgs {
    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Accepts `0x1234`, `0X1234` or `1234`, always hex
fn parse_pan_id(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid PAN id '{}': {}", s, e))
}

/// Filter covering every workspace crate at `level`
fn default_directive(level: LogLevel) -> String {
    let level = level.as_str();
    format!("zigemu={level},zb_protocol={level},zb_sim={level},zb_gateway={level}")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive(cli.log_level).into()),
        )
        .with(fmt::layer())
        .init();

    match cli.command.unwrap_or_else(|| Commands::Start(NetworkArgs::default())) {
        Commands::Start(args) => run_start(cli.config, args).await,
        Commands::Console(args) => run_console(cli.config, args).await,
        Commands::Multi(args) => run_multi(cli.config, args).await,
        Commands::Probe(args) => run_probe(args).await,
    }
}

fn load_config(path: Option<&PathBuf>, args: &NetworkArgs) -> (Settings, EmulatorConfig) {
    let settings = Settings::load(path.map(PathBuf::as_path));
    let mut config = settings.emulator.clone();
    args.apply(&mut config);
    (settings, config)
}

async fn run_start(config_path: Option<PathBuf>, args: NetworkArgs) -> anyhow::Result<()> {
    let (_, config) = load_config(config_path.as_ref(), &args);

    println!("Starting ZigBee Coordinator Emulator...");
    println!("Port: {}", config.port);
    println!("PAN ID: 0x{:04X}", config.pan_id);
    println!("Channel: {}", config.channel);
    println!("Press Ctrl+C to stop\n");

    let coordinator = start(config)
        .await
        .context("Failed to start coordinator")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    println!("\nShutting down...");
    coordinator.shutdown().await;
    Ok(())
}

async fn run_console(config_path: Option<PathBuf>, args: NetworkArgs) -> anyhow::Result<()> {
    let (settings, config) = load_config(config_path.as_ref(), &args);
    let coordinator = start(config)
        .await
        .context("Failed to start coordinator")?;

    Console::new(coordinator, settings, config_path)
        .run_interactive()
        .await
}

async fn run_multi(config_path: Option<PathBuf>, args: MultiArgs) -> anyhow::Result<()> {
    let settings = Settings::load(config_path.as_deref());
    let mut base = settings.emulator;
    if let Some(host) = args.host {
        base.host = host;
    }

    println!("Starting {} coordinators...", args.count);
    let coordinators = launcher::launch(&base, args.base_port, args.count).await?;
    for (i, coordinator) in coordinators.iter().enumerate() {
        let status = coordinator.status();
        println!(
            "  Coordinator {}: port={}, PAN=0x{:04X}, channel={}",
            i + 1,
            status.port,
            status.pan_id,
            status.channel
        );
    }
    println!("\nAll {} coordinators started!", coordinators.len());
    println!("Press Ctrl+C to stop all coordinators");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    println!("\nStopping all coordinators...");
    launcher::stop_all(coordinators).await;
    println!("All coordinators stopped");
    Ok(())
}

async fn run_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let addr = format!("{}:{}", args.host, args.port);
    println!("Connecting to {}...", addr);

    let reply = probe::probe(&addr, probe::PROBE_TIMEOUT)
        .await
        .with_context(|| format!("Probe of {} failed", addr))?;
    println!("Connected. Sent: 00 00");
    println!("{}", probe::describe(&reply));
    Ok(())
}
