use std::time::Duration;

use gpr_core::{DEFAULT_META_PORT, EdgeTypeId, SpaceId};
use gpr_network::{Command, EdgeItem, ListEdgesRequest, ListEdgesResponse};
use tracing::debug;

use crate::connection::{RpcConnection, TransportConfig};
use crate::error::{ClientError, Result};
use crate::peer::split_host_port;

/// Client for the metadata service, used to look up edge schemas.
#[derive(Debug)]
pub struct MetaClient {
    conn: RpcConnection,
    timeout: Duration,
}

impl MetaClient {
    /// Connect to `addr` (`host` or `host:port`, default port 9559).
    pub async fn connect(
        addr: &str,
        transport: &TransportConfig,
        timeout: Duration,
    ) -> Result<Self> {
        let (host, port) = split_host_port(addr, DEFAULT_META_PORT)?;
        let conn = RpcConnection::connect(&format!("{}:{}", host, port), transport).await?;
        Ok(Self { conn, timeout })
    }

    pub async fn list_edges(&mut self, space_id: SpaceId) -> Result<Vec<EdgeItem>> {
        let response: ListEdgesResponse = self
            .conn
            .request(Command::ListEdges, &ListEdgesRequest { space_id }, self.timeout)
            .await?;

        if !response.error_code.is_success() {
            return Err(ClientError::Application {
                code: response.error_code,
                message: format!("list edges of space {}", space_id),
            });
        }

        debug!(target: "gpr::meta", space = space_id, edges = response.edges.len(), "Listed edges");
        Ok(response.edges)
    }

    /// Type id of the edge named exactly `name`.
    pub async fn resolve_edge_type(&mut self, space_id: SpaceId, name: &str) -> Result<EdgeTypeId> {
        let edges = self.list_edges(space_id).await?;
        edges
            .into_iter()
            .find(|item| item.edge_name == name)
            .map(|item| {
                debug!(
                    target: "gpr::meta",
                    edge = name,
                    edge_type = item.edge_type,
                    schema_version = item.schema_version,
                    "Resolved edge type"
                );
                item.edge_type
            })
            .ok_or_else(|| {
                ClientError::NotFound(format!("edge type {:?} in space {}", name, space_id))
            })
    }

    pub async fn close(&mut self) {
        self.conn.close().await;
    }
}
