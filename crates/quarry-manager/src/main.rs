// SPDX-License-Identifier: MIT

//! Quarry CLI - headless console for the manager core
//!
//! Starts servers, attaches their console, and drives the update pipeline.
//! A graphical frontend would call the same library surface.

use anyhow::Result;
use clap::{Parser, Subcommand};
use quarry_manager::{
    ManagerConfig, MetadataStore, PluginProvisioner, ProcessSupervisor, UpdateOutcome,
    UpdatePipeline,
};
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Run and update local game servers", long_about = None)]
struct Cli {
    /// Working root holding one directory per server (overrides the config)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Path to the tool configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new server on the latest stable build
    Create { name: String },
    /// Start a server and attach its console to this terminal
    Run { name: String },
    /// Update a server binary and its managed plugins
    Update { name: String },
    /// Enable the tunneling plugin for a server
    EnableTunnel { name: String },
    /// Enable the protocol-bridge plugin set for a server
    EnableBridge { name: String },
    /// List known servers
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ManagerConfig::load_or_create(path)?,
        None => ManagerConfig::default(),
    };
    if let Some(root) = cli.root {
        config.root = root;
    }

    match cli.command {
        Commands::Create { name } => {
            let supervisor = ProcessSupervisor::new(&config);
            let pipeline = UpdatePipeline::new(&config, &supervisor)?;
            let version = pipeline.create(&name).await?;
            info!("created {name} on version {version}");
        }
        Commands::Run { name } => {
            run_console(&config, &name)?;
        }
        Commands::Update { name } => {
            let supervisor = ProcessSupervisor::new(&config);
            let pipeline = UpdatePipeline::new(&config, &supervisor)?;
            match pipeline.update(&name).await? {
                UpdateOutcome::UpToDate { version } => {
                    info!("{name} already on latest version {version}");
                }
                UpdateOutcome::Updated { from, to, warnings } => {
                    info!("{name} updated from {from} to {to}");
                    for warning in warnings {
                        warn!("{warning}");
                    }
                }
            }
        }
        Commands::EnableTunnel { name } => {
            let provisioner = PluginProvisioner::new(&config)?;
            provisioner.enable_tunnel(&name).await?;
            info!("tunneling enabled for {name}");
        }
        Commands::EnableBridge { name } => {
            let provisioner = PluginProvisioner::new(&config)?;
            provisioner.enable_bridge(&name).await?;
            info!("bridge enabled for {name}");
        }
        Commands::List => {
            let store = MetadataStore::new(&config.root);
            for instance in store.list_instances()? {
                match store.load(&instance) {
                    Ok(record) => println!("{instance}\t{}", record.version),
                    Err(e) => println!("{instance}\t(unreadable metadata: {e})"),
                }
            }
        }
    }

    Ok(())
}

/// Start the server, print its console lines, and forward operator commands
/// typed on stdin. Typing `stop` shuts the server down and returns.
fn run_console(config: &ManagerConfig, name: &str) -> Result<()> {
    let supervisor = ProcessSupervisor::new(config);
    supervisor.start(name)?;

    let lines = supervisor.lines();
    std::thread::spawn(move || {
        for line in lines {
            println!("[{}] {}", line.instance, line.line);
        }
    });

    let stdin = std::io::stdin();
    for input in stdin.lock().lines() {
        let input = input?;
        let command = input.trim();
        if command.is_empty() {
            continue;
        }
        if command == "stop" {
            break;
        }
        if !supervisor.is_running(name) {
            warn!("{name} is no longer running");
            break;
        }
        if let Err(e) = supervisor.send_command(name, command) {
            error!("{e}");
            break;
        }
    }

    supervisor.stop(name)?;
    Ok(())
}
