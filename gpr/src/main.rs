#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use clap::{Args, Parser, Subcommand};
use gpr::commands::{CommandError, Probe};
use gpr::config::{Config, Overrides};
use gpr::shutdown;
use gpr_core::Direction;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "gpr")]
#[command(about = "GraphProbe: raft leader discovery and edge index consistency checks")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    #[arg(short, long, global = true, help = "Config file (.toml or .json)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Space id")]
    space: Option<i32>,
    #[arg(long, global = true, help = "Partition id")]
    part: Option<i32>,
    #[arg(long, global = true, help = "Edge type name")]
    edge: Option<String>,
    #[arg(
        long,
        global = true,
        value_delimiter = ',',
        help = "Raft peers, comma-separated [id@]host[:port]"
    )]
    peers: Option<Vec<String>>,
    #[arg(long, global = true, help = "Metadata service host[:port]")]
    meta: Option<String>,
    #[arg(long, global = true, help = "Log filter, e.g. info or gpr::raft=debug")]
    log_level: Option<String>,
}

impl CommonArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            space_id: self.space,
            partition_id: self.part,
            edge_name: self.edge.clone(),
            peers: self.peers.clone(),
            meta_addr: self.meta.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the forward and reverse indexes of the edge type
    CheckEdges,
    /// Print the current raft leader of the partition
    Leader,
    /// Query every peer once and print its raft state
    RaftState,
    /// Print the edges of one or both indexes
    ScanEdges {
        #[arg(short, long, default_value = "forward", help = "forward, reverse or both")]
        direction: Direction,
        #[arg(short, long, help = "Stop after this many edges")]
        limit: Option<usize>,
    },
    /// Write a default configuration file
    GenConfig {
        #[arg(help = "Output path (.toml)")]
        path: PathBuf,
    },
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.common.log_level.as_deref());

    match run(cli).await {
        Ok(()) => {},
        Err(CommandError::Interrupted) => {
            eprintln!("Interrupted");
            std::process::exit(130);
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        },
    }
}

async fn run(cli: Cli) -> Result<(), CommandError> {
    if let Commands::GenConfig { path } = &cli.command {
        generate_config(path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = Config::load(cli.common.config.as_deref(), cli.common.overrides())?;

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    tokio::spawn(shutdown::install_signal_handlers(shutdown_tx)?);

    let probe = tokio::select! {
        probe = Probe::connect(config) => probe?,
        _ = shutdown_rx.recv() => return Err(CommandError::Interrupted),
    };

    let outcome = tokio::select! {
        result = execute(&probe, cli.command) => result,
        _ = shutdown_rx.recv() => Err(CommandError::Interrupted),
    };

    probe.close().await;
    outcome
}

async fn execute(probe: &Probe, command: Commands) -> Result<(), CommandError> {
    match command {
        Commands::CheckEdges => probe.check_edges().await.map(|_| ()),
        Commands::Leader => probe.leader().await.map(|_| ()),
        Commands::RaftState => probe.raft_state().await,
        Commands::ScanEdges { direction, limit } => {
            probe.scan_edges(direction, limit).await.map(|_| ())
        },
        Commands::GenConfig { .. } => Ok(()),
    }
}

fn generate_config(path: &Path) -> std::io::Result<()> {
    let config = Config::default();
    let peers = config
        .peers
        .iter()
        .map(|p| format!("{:?}", p))
        .collect::<Vec<_>>()
        .join(", ");

    let content = format!(
        r#"# GraphProbe Configuration File
# Generated by: gpr gen-config {}
#
# All values shown are defaults. Command-line flags override them.

# =============================================================================
# Target
# =============================================================================

space_id = {}
partition_id = {}

# Edge type checked by check-edges and scanned by scan-edges
edge_name = "{}"

# =============================================================================
# Endpoints
# =============================================================================

# Metadata service, host[:port]
meta_addr = "{}"

# Raft-state endpoints of the partition replicas: host, host:port or id@host[:port]
# (default port 9780)
peers = [{}]

# Storage service port on the leader's host, used for scans
storage_port = {}

[timeouts]
connect_ms = {}
raft_state_ms = {}
meta_ms = {}
# Per page of a scan
scan_ms = {}
# Give up when no leader is found within this bound
leader_wait_ms = {}

[leader]
# How long a resolved leader is served from cache
refresh_interval_ms = {}
# Pause between attempts while no leader is known
retry_delay_ms = {}

[scan]
page_limit = {}

[transport]
max_frame_size = {}
buffer_size = {}
"#,
        path.display(),
        config.space_id,
        config.partition_id,
        config.edge_name,
        config.meta_addr,
        peers,
        config.storage_port,
        config.timeouts.connect_ms,
        config.timeouts.raft_state_ms,
        config.timeouts.meta_ms,
        config.timeouts.scan_ms,
        config.timeouts.leader_wait_ms,
        config.leader.refresh_interval_ms,
        config.leader.retry_delay_ms,
        config.scan.page_limit,
        config.transport.max_frame_size,
        config.transport.buffer_size,
    );

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    std::io::Write::write_all(&mut file, content.as_bytes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_config_parses_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpr.toml");

        generate_config(&path).unwrap();
        let parsed = Config::from_file(&path).unwrap();
        let defaults = Config::default();

        assert_eq!(parsed.peers, defaults.peers);
        assert_eq!(parsed.edge_name, defaults.edge_name);
        assert_eq!(parsed.timeouts.leader_wait_ms, defaults.timeouts.leader_wait_ms);
        assert_eq!(parsed.transport.max_frame_size, defaults.transport.max_frame_size);
    }

    #[test]
    fn test_gen_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpr.toml");
        std::fs::write(&path, "space_id = 4\n").unwrap();

        assert!(generate_config(&path).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "space_id = 4\n");
    }

    #[test]
    fn test_cli_parses_common_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gpr",
            "scan-edges",
            "--direction",
            "reverse",
            "--peers",
            "a@h1:1,h2",
            "--part",
            "3",
        ])
        .unwrap();

        let overrides = cli.common.overrides();
        assert_eq!(overrides.partition_id, Some(3));
        assert_eq!(overrides.peers.unwrap(), ["a@h1:1", "h2"]);
        assert!(matches!(
            cli.command,
            Commands::ScanEdges {
                direction: Direction::Reverse,
                limit: None
            }
        ));
    }
}
