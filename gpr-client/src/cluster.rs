//! The replicas of one (space, partition) and their shared leader cache.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use gpr_core::{PartitionId, SpaceId};
use gpr_network::RaftStateResponse;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::connection::TransportConfig;
use crate::error::{ClientError, ErrorCategory, Result};
use crate::leader::LeaderSlot;
use crate::peer::{Peer, PeerSpec, PeerState};

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub space_id: SpaceId,
    pub partition_id: PartitionId,
    pub peers: Vec<PeerSpec>,
    pub transport: TransportConfig,
    /// Per-call timeout for raft-state requests
    pub raft_state_timeout: Duration,
    /// How long a resolved leader is served from cache
    pub refresh_interval: Duration,
    /// Pause between attempts while no leader is known
    pub retry_delay: Duration,
    /// Upper bound on how long `get_leader` waits
    pub leader_wait: Duration,
}

impl ClusterConfig {
    pub fn new(space_id: SpaceId, partition_id: PartitionId, peers: Vec<PeerSpec>) -> Self {
        Self {
            space_id,
            partition_id,
            peers,
            transport: TransportConfig::default(),
            raft_state_timeout: Duration::from_millis(500),
            refresh_interval: Duration::from_millis(500),
            retry_delay: Duration::from_millis(50),
            leader_wait: Duration::from_secs(5),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.peers.is_empty() {
            return Err(ClientError::Config("no peers configured".to_string()));
        }
        let mut ids = std::collections::BTreeSet::new();
        for spec in &self.peers {
            if !ids.insert(spec.id.as_str()) {
                return Err(ClientError::Config(format!("duplicate peer id {:?}", spec.id)));
            }
        }
        for (name, value) in [
            ("leader wait", self.leader_wait),
            ("refresh interval", self.refresh_interval),
            ("retry delay", self.retry_delay),
        ] {
            if value.is_zero() {
                return Err(ClientError::Config(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}

/// Outcome of one raft-state query.
#[derive(Debug)]
pub struct PeerReport {
    pub peer_id: String,
    pub addr: String,
    pub outcome: Result<RaftStateResponse>,
}

/// Owns every [`Peer`] of a partition for the length of one run.
///
/// Each peer sits behind its own lock, so a connection is only ever used by
/// one flow at a time.
pub struct ClusterView {
    config: ClusterConfig,
    peers: BTreeMap<String, Mutex<Peer>>,
    pub(crate) leader: Mutex<LeaderSlot>,
    pub(crate) refreshed: watch::Sender<u64>,
    closed: AtomicBool,
}

impl ClusterView {
    /// Validate the configuration and open every peer. Unreachable peers do
    /// not fail construction.
    pub async fn new(config: ClusterConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let peers = join_all(
            config
                .peers
                .iter()
                .map(|spec| Peer::open(spec.clone(), config.transport.clone())),
        )
        .await;

        let open = peers.iter().filter(|p| p.state() == PeerState::Open).count();
        info!(
            target: "gpr::raft",
            space = config.space_id,
            part = config.partition_id,
            peers = peers.len(),
            open,
            "Cluster view ready"
        );

        let peers = peers
            .into_iter()
            .map(|peer| (peer.id().to_string(), Mutex::new(peer)))
            .collect();
        let (refreshed, _) = watch::channel(0);

        Ok(Arc::new(Self {
            config,
            peers,
            leader: Mutex::new(LeaderSlot::default()),
            refreshed,
            closed: AtomicBool::new(false),
        }))
    }

    #[inline]
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    #[inline]
    pub fn space_id(&self) -> SpaceId {
        self.config.space_id
    }

    #[inline]
    pub fn partition_id(&self) -> PartitionId {
        self.config.partition_id
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = &str> {
        self.peers.keys().map(String::as_str)
    }

    pub fn peer_spec(&self, id: &str) -> Result<&PeerSpec> {
        self.config
            .peers
            .iter()
            .find(|spec| spec.id == id)
            .ok_or_else(|| ClientError::NotFound(format!("peer {:?}", id)))
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Ask every peer for its raft state, concurrently.
    ///
    /// Failures are per peer: a connectivity failure discards that peer's
    /// connection, an application status is logged. Neither affects the
    /// other peers.
    pub async fn poll_raft_states(&self) -> Vec<PeerReport> {
        if self.is_closed() {
            return Vec::new();
        }

        let timeout = self.config.raft_state_timeout;
        let space = self.config.space_id;
        let part = self.config.partition_id;

        join_all(self.peers.iter().map(|(id, peer)| async move {
            let mut peer = peer.lock().await;
            let outcome = peer.get_raft_state(space, part, timeout).await;
            if let Err(e) = &outcome {
                match e.category() {
                    ErrorCategory::Connectivity => warn!(
                        target: "gpr::raft",
                        peer = %id,
                        error = %e,
                        "Peer unreachable this round, will reconnect"
                    ),
                    ErrorCategory::Application => warn!(
                        target: "gpr::raft",
                        peer = %id,
                        error = %e,
                        "Peer returned error status, excluded this round"
                    ),
                    _ => warn!(target: "gpr::raft", peer = %id, error = %e, "Raft state failed"),
                }
            }
            PeerReport {
                peer_id: id.clone(),
                addr: peer.spec().addr(),
                outcome,
            }
        }))
        .await
    }

    /// Close every peer and stop any background refresh. Only the first
    /// call has an effect.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(task) = self.leader.lock().await.task.take() {
            task.abort();
        }
        // wake waiters so they observe the closed flag
        self.refreshed.send_modify(|generation| *generation += 1);

        for (id, peer) in &self.peers {
            peer.lock().await.close().await;
            debug!(target: "gpr::raft", peer = %id, "Peer closed");
        }
        info!(target: "gpr::raft", "Cluster view closed");
    }
}

impl std::fmt::Debug for ClusterView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterView")
            .field("space_id", &self.config.space_id)
            .field("partition_id", &self.config.partition_id)
            .field("peers", &self.peers.keys().collect::<Vec<_>>())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_peer_ids_rejected() {
        let config = ClusterConfig::new(
            1,
            1,
            vec![
                PeerSpec::new("a", "127.0.0.1", 1),
                PeerSpec::new("a", "127.0.0.2", 1),
            ],
        );
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let peers = vec![PeerSpec::new("a", "127.0.0.1", 1)];
        assert!(ClusterConfig::new(1, 1, peers.clone()).validate().is_ok());

        let config = ClusterConfig {
            retry_delay: Duration::ZERO,
            ..ClusterConfig::new(1, 1, peers.clone())
        };
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));

        let config = ClusterConfig {
            refresh_interval: Duration::ZERO,
            ..ClusterConfig::new(1, 1, peers)
        };
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_empty_peers_rejected() {
        let config = ClusterConfig::new(1, 1, Vec::new());
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }
}
