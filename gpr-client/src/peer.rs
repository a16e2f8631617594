//! One replica of a partition and its raft-state connection.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use gpr_core::{DEFAULT_RAFT_PORT, PartitionId, SpaceId};
use gpr_network::{Command, RaftStateRequest, RaftStateResponse};
use tracing::{debug, info, warn};

use crate::connection::{RpcConnection, TransportConfig};
use crate::error::{ClientError, Result};

/// Where a replica listens, and the id it is known by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSpec {
    pub id: String,
    pub host: String,
    pub port: u16,
}

impl PeerSpec {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
        }
    }

    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for PeerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}

/// Split `host[:port]`, falling back to `default_port`. IPv6 literals must
/// be bracketed (`[::1]:9780`) and keep their brackets in the host.
pub(crate) fn split_host_port(s: &str, default_port: u16) -> Result<(String, u16)> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ClientError::Config("empty address".to_string()));
    }

    let (host, port) = if let Some(rest) = s.strip_prefix('[') {
        let (ip, tail) = rest
            .split_once(']')
            .ok_or_else(|| ClientError::Config(format!("unclosed bracket in {:?}", s)))?;
        if ip.is_empty() {
            return Err(ClientError::Config(format!("missing host in {:?}", s)));
        }
        let port = match tail {
            "" => None,
            tail => Some(tail.strip_prefix(':').ok_or_else(|| {
                ClientError::Config(format!("unexpected {:?} after host in {:?}", tail, s))
            })?),
        };
        (&s[..ip.len() + 2], port)
    } else {
        match s.split_once(':') {
            Some((_, port)) if port.contains(':') => {
                return Err(ClientError::Config(format!(
                    "IPv6 address {:?} must be bracketed",
                    s
                )));
            },
            Some((host, port)) => (host, Some(port)),
            None => (s, None),
        }
    };

    if host.is_empty() {
        return Err(ClientError::Config(format!("missing host in {:?}", s)));
    }
    let port = match port {
        Some(port) => port
            .parse::<u16>()
            .map_err(|_| ClientError::Config(format!("invalid port in {:?}", s)))?,
        None => default_port,
    };
    Ok((host.to_string(), port))
}

impl FromStr for PeerSpec {
    type Err = ClientError;

    /// Accepts `host`, `host:port` or `id@host[:port]`. The id defaults to
    /// the host and the port to the raft-state port.
    fn from_str(s: &str) -> Result<Self> {
        let (id, rest) = match s.split_once('@') {
            Some((id, rest)) if !id.trim().is_empty() => (Some(id.trim()), rest),
            Some(_) => return Err(ClientError::Config(format!("empty peer id in {:?}", s))),
            None => (None, s),
        };
        let (host, port) = split_host_port(rest, DEFAULT_RAFT_PORT)?;
        Ok(Self {
            id: id.map_or_else(|| host.clone(), str::to_string),
            host,
            port,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Open,
    Closed,
}

/// A replica and the single connection used to query its raft state.
///
/// A failed transport never gets reused: the connection object is discarded
/// and the next call opens a fresh one.
pub struct Peer {
    spec: PeerSpec,
    transport: TransportConfig,
    conn: Option<RpcConnection>,
}

impl Peer {
    /// Open a peer. A connect failure is logged and leaves the peer closed;
    /// the next request retries the connect.
    pub async fn open(spec: PeerSpec, transport: TransportConfig) -> Self {
        let mut peer = Self {
            spec,
            transport,
            conn: None,
        };
        if let Err(e) = peer.reconnect().await {
            warn!(
                target: "gpr::raft",
                peer = %peer.spec.id,
                addr = %peer.spec.addr(),
                error = %e,
                "Peer unreachable at startup"
            );
        }
        peer
    }

    #[inline]
    pub fn spec(&self) -> &PeerSpec {
        &self.spec
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn state(&self) -> PeerState {
        match &self.conn {
            Some(conn) if conn.is_open() => PeerState::Open,
            _ => PeerState::Closed,
        }
    }

    /// Replace the connection with a freshly opened one.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.close().await;
        let conn = RpcConnection::connect(&self.spec.addr(), &self.transport).await?;
        self.conn = Some(conn);
        info!(
            target: "gpr::raft",
            peer = %self.spec.id,
            addr = %self.spec.addr(),
            "Peer connected"
        );
        Ok(())
    }

    /// Query the raft state of (space, part). A non-success status is
    /// returned as [`ClientError::Application`].
    ///
    /// `timeout` bounds the whole call, including a reconnect of a closed
    /// peer.
    pub async fn get_raft_state(
        &mut self,
        space_id: SpaceId,
        part_id: PartitionId,
        timeout: Duration,
    ) -> Result<RaftStateResponse> {
        let request = RaftStateRequest { space_id, part_id };
        let call = self.request_raft_state(&request, timeout);
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout),
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                if e.is_retryable() {
                    self.close().await;
                }
                return Err(e);
            },
        };

        if !response.error_code.is_success() {
            return Err(ClientError::Application {
                code: response.error_code,
                message: format!("raft state of space {} part {}", space_id, part_id),
            });
        }

        debug!(
            target: "gpr::raft",
            peer = %self.spec.id,
            term = response.term,
            is_leader = response.is_leader,
            role = ?response.role,
            "Raft state"
        );
        Ok(response)
    }

    async fn request_raft_state(
        &mut self,
        request: &RaftStateRequest,
        timeout: Duration,
    ) -> Result<RaftStateResponse> {
        if self.state() == PeerState::Closed {
            self.reconnect().await?;
        }
        let conn = self.conn.as_mut().ok_or(ClientError::ConnectionClosed)?;
        conn.request(Command::GetRaftState, request, timeout).await
    }

    /// Release the connection. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close().await;
        }
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("spec", &self.spec)
            .field("state", &self.state())
            .finish()
    }
}
