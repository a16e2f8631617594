use gpr_client::{ClusterConfig, PeerSpec, ScanConfig, TransportConfig};
use gpr_core::{DEFAULT_STORAGE_PORT, PartitionId, ProbeError, Result, SpaceId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub space_id: SpaceId,
    pub partition_id: PartitionId,
    pub edge_name: String,
    /// Metadata service, `host[:port]`
    pub meta_addr: String,
    /// Raft-state endpoints, each `host`, `host:port` or `id@host[:port]`
    pub peers: Vec<String>,
    /// Storage service port on the leader's host
    pub storage_port: u16,
    pub timeouts: TimeoutSettings,
    pub leader: LeaderSettings,
    pub scan: ScanSettings,
    pub transport: TransportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub connect_ms: u64,
    pub raft_state_ms: u64,
    pub meta_ms: u64,
    /// Per page, not per scan
    pub scan_ms: u64,
    pub leader_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderSettings {
    pub refresh_interval_ms: u64,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub page_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub max_frame_size: usize,
    pub buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            space_id: 1,
            partition_id: 1,
            edge_name: "known2".into(),
            meta_addr: "meta1:9559".into(),
            peers: vec!["store1".into(), "store2".into(), "store3".into()],
            storage_port: DEFAULT_STORAGE_PORT,
            timeouts: TimeoutSettings::default(),
            leader: LeaderSettings::default(),
            scan: ScanSettings::default(),
            transport: TransportSettings::default(),
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect_ms: 4000,
            raft_state_ms: 500,
            meta_ms: 500,
            scan_ms: 30_000,
            leader_wait_ms: 5000,
        }
    }
}

impl Default for LeaderSettings {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 500,
            retry_delay_ms: 50,
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self { page_limit: 4096 }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            buffer_size: 64 * 1024,
        }
    }
}

/// Values given on the command line, applied over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub space_id: Option<SpaceId>,
    pub partition_id: Option<PartitionId>,
    pub edge_name: Option<String>,
    pub peers: Option<Vec<String>>,
    pub meta_addr: Option<String>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext {
            "toml" => toml::from_str(&content)
                .map_err(|e| ProbeError::Config(format!("TOML parse error: {}", e))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| ProbeError::Config(format!("JSON parse error: {}", e))),
            _ => Err(ProbeError::Config(format!(
                "Unknown config file extension: {}",
                ext
            ))),
        }
    }

    /// File values when `path` is given, defaults otherwise, then overrides.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(space_id) = overrides.space_id {
            self.space_id = space_id;
        }
        if let Some(partition_id) = overrides.partition_id {
            self.partition_id = partition_id;
        }
        if let Some(edge_name) = overrides.edge_name {
            self.edge_name = edge_name;
        }
        if let Some(peers) = overrides.peers {
            self.peers = peers;
        }
        if let Some(meta_addr) = overrides.meta_addr {
            self.meta_addr = meta_addr;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.peers.is_empty() {
            return Err(ProbeError::Config("at least one peer is required".into()));
        }
        if self.edge_name.is_empty() {
            return Err(ProbeError::Config("edge name must not be empty".into()));
        }
        if self.scan.page_limit == 0 {
            return Err(ProbeError::Config("scan.page_limit must be positive".into()));
        }
        for (name, value) in [
            ("timeouts.leader_wait_ms", self.timeouts.leader_wait_ms),
            ("leader.refresh_interval_ms", self.leader.refresh_interval_ms),
            ("leader.retry_delay_ms", self.leader.retry_delay_ms),
        ] {
            if value == 0 {
                return Err(ProbeError::Config(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn peer_specs(&self) -> Result<Vec<PeerSpec>> {
        self.peers
            .iter()
            .map(|peer| {
                peer.parse::<PeerSpec>()
                    .map_err(|e| ProbeError::Config(format!("peer {:?}: {}", peer, e)))
            })
            .collect()
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_millis(self.timeouts.connect_ms),
            max_frame_size: self.transport.max_frame_size,
            buffer_size: self.transport.buffer_size,
        }
    }

    pub fn cluster_config(&self) -> Result<ClusterConfig> {
        Ok(ClusterConfig {
            space_id: self.space_id,
            partition_id: self.partition_id,
            peers: self.peer_specs()?,
            transport: self.transport_config(),
            raft_state_timeout: Duration::from_millis(self.timeouts.raft_state_ms),
            refresh_interval: Duration::from_millis(self.leader.refresh_interval_ms),
            retry_delay: Duration::from_millis(self.leader.retry_delay_ms),
            leader_wait: Duration::from_millis(self.timeouts.leader_wait_ms),
        })
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            storage_port: self.storage_port,
            page_limit: self.scan.page_limit,
            scan_timeout: Duration::from_millis(self.timeouts.scan_ms),
            transport: self.transport_config(),
            meta_addr: self.meta_addr.clone(),
            meta_timeout: Duration::from_millis(self.timeouts.meta_ms),
        }
    }
}
