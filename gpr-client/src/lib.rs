#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod checker;
mod cluster;
pub mod connection;
mod error;
mod leader;
mod meta;
mod peer;
mod scanner;

pub use checker::{CheckReport, ConsistencyChecker, reconcile};
pub use cluster::{ClusterConfig, ClusterView, PeerReport};
pub use connection::{RpcConnection, TransportConfig};
pub use error::{ClientError, ErrorCategory, Result};
pub use leader::{LeaderCache, LeaderTracker, RaftVote, resolve_leader};
pub use meta::MetaClient;
pub use peer::{Peer, PeerSpec, PeerState};
pub use scanner::{EDGE_COLUMNS, EdgeScan, EdgeScanner, ScanConfig};
