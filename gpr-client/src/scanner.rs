//! Paginated edge scans against the partition leader.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use gpr_core::{
    DEFAULT_STORAGE_PORT, DateTime, Direction, Edge, EdgeKey, EdgeTypeId, PartitionId, SpaceId,
    Value,
};
use gpr_network::{Command, EdgeProp, ScanCursor, ScanEdgeRequest, ScanEdgeResponse};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cluster::ClusterView;
use crate::connection::{RpcConnection, TransportConfig};
use crate::error::{ClientError, Result};
use crate::leader::LeaderTracker;
use crate::meta::MetaClient;

/// Columns requested from every scan, in row order.
pub const EDGE_COLUMNS: [&str; 6] = ["_src", "_type", "_rank", "_dst", "idx", "ts"];

const COL_SRC: usize = 0;
const COL_TYPE: usize = 1;
const COL_RANK: usize = 2;
const COL_DST: usize = 3;
const COL_IDX: usize = 4;
const COL_TS: usize = 5;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub storage_port: u16,
    pub page_limit: u32,
    /// Per-page timeout
    pub scan_timeout: Duration,
    pub transport: TransportConfig,
    pub meta_addr: String,
    pub meta_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            storage_port: DEFAULT_STORAGE_PORT,
            page_limit: 4096,
            scan_timeout: Duration::from_secs(30),
            transport: TransportConfig::default(),
            meta_addr: "meta1:9559".to_string(),
            meta_timeout: Duration::from_millis(500),
        }
    }
}

/// How one scan pass reads the edge index.
///
/// The store encodes direction as the sign of the edge type id: the reverse
/// index is addressed by the negated id and returns rows keyed by
/// destination. This type is the only place that knows about the trick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Orientation {
    reverse: bool,
    wire_type: EdgeTypeId,
}

impl Orientation {
    pub(crate) fn new(edge_type: EdgeTypeId, reverse: bool) -> Result<Self> {
        if edge_type <= 0 {
            return Err(ClientError::InvalidResponse(format!(
                "edge type id must be positive, got {}",
                edge_type
            )));
        }
        Ok(Self {
            reverse,
            wire_type: if reverse { -edge_type } else { edge_type },
        })
    }

    #[inline]
    pub(crate) fn wire_type(&self) -> EdgeTypeId {
        self.wire_type
    }

    #[inline]
    pub(crate) fn direction(&self) -> Direction {
        if self.reverse {
            Direction::Reverse
        } else {
            Direction::Forward
        }
    }

    /// Bring a decoded row into forward orientation.
    pub(crate) fn apply(&self, raw: Edge) -> Edge {
        if self.reverse { raw.swapped() } else { raw }
    }
}

fn column<'a>(row: &'a [Value], index: usize) -> Result<&'a Value> {
    row.get(index).ok_or_else(|| {
        ClientError::Decode(format!(
            "row has {} columns, missing {}",
            row.len(),
            EDGE_COLUMNS[index]
        ))
    })
}

fn mistyped(index: usize, expected: &str, found: &Value) -> ClientError {
    ClientError::Decode(format!(
        "column {} should be {}, got {}",
        EDGE_COLUMNS[index],
        expected,
        found.type_name()
    ))
}

fn int_column(row: &[Value], index: usize) -> Result<i64> {
    match column(row, index)? {
        Value::Int(v) => Ok(*v),
        other => Err(mistyped(index, "int", other)),
    }
}

fn str_column(row: &[Value], index: usize) -> Result<String> {
    match column(row, index)? {
        Value::Str(v) => Ok(v.clone()),
        other => Err(mistyped(index, "string", other)),
    }
}

fn datetime_column(row: &[Value], index: usize) -> Result<Option<DateTime>> {
    match column(row, index)? {
        Value::Null => Ok(None),
        Value::DateTime(v) => Ok(Some(*v)),
        other => Err(mistyped(index, "datetime or null", other)),
    }
}

/// Bind the columns of a raw row to an [`Edge`] as stored, before any swap.
pub(crate) fn decode_row(row: &[Value]) -> Result<Edge> {
    int_column(row, COL_TYPE)?;
    Ok(Edge {
        src: int_column(row, COL_SRC)?,
        dst: int_column(row, COL_DST)?,
        rank: int_column(row, COL_RANK)?,
        idx: str_column(row, COL_IDX)?,
        ts: datetime_column(row, COL_TS)?,
    })
}

/// Opens edge scans against the current leader of a partition.
#[derive(Debug)]
pub struct EdgeScanner {
    tracker: LeaderTracker,
    config: ScanConfig,
    edge_types: Mutex<HashMap<String, EdgeTypeId>>,
}

impl EdgeScanner {
    pub fn new(tracker: LeaderTracker, config: ScanConfig) -> Self {
        Self {
            tracker,
            config,
            edge_types: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn view(&self) -> &Arc<ClusterView> {
        self.tracker.view()
    }

    /// Type id for `name`, looked up once per scanner through the metadata
    /// service.
    pub async fn resolve_edge_type(&self, name: &str) -> Result<EdgeTypeId> {
        let mut cache = self.edge_types.lock().await;
        if let Some(edge_type) = cache.get(name) {
            return Ok(*edge_type);
        }

        let space = self.view().space_id();
        let mut meta = MetaClient::connect(
            &self.config.meta_addr,
            &self.config.transport,
            self.config.meta_timeout,
        )
        .await?;
        let result = meta.resolve_edge_type(space, name).await;
        meta.close().await;

        let edge_type = result?;
        cache.insert(name.to_string(), edge_type);
        Ok(edge_type)
    }

    /// Start a scan session. Nothing is read until the first page is
    /// requested.
    pub async fn open(&self, edge_name: &str, direction: Direction) -> Result<EdgeScan> {
        let edge_type = self.resolve_edge_type(edge_name).await?;
        let orientations = match direction {
            Direction::Forward => vec![Orientation::new(edge_type, false)?],
            Direction::Reverse => vec![Orientation::new(edge_type, true)?],
            Direction::Both => vec![
                Orientation::new(edge_type, false)?,
                Orientation::new(edge_type, true)?,
            ],
        };

        let leader = self.tracker.get_leader().await?;
        let view = self.view();
        let host = view.peer_spec(&leader)?.host.clone();
        let addr = format!("{}:{}", host, self.config.storage_port);
        let conn = RpcConnection::connect(&addr, &self.config.transport).await?;

        info!(
            target: "gpr::scan",
            edge = edge_name,
            edge_type,
            direction = %direction,
            leader = %leader,
            addr = %addr,
            "Scan opened"
        );

        Ok(EdgeScan {
            conn,
            space_id: view.space_id(),
            part_id: view.partition_id(),
            pending: orientations.into(),
            cursor: ScanCursor::default(),
            dedupe: direction == Direction::Both,
            seen: HashSet::new(),
            page_limit: self.config.page_limit,
            timeout: self.config.scan_timeout,
            pages: 0,
            rows: 0,
            state: SessionState::Active,
        })
    }

    /// Scan `edge_name` to completion.
    pub async fn scan(&self, edge_name: &str, direction: Direction) -> Result<Vec<Edge>> {
        self.open(edge_name, direction).await?.collect().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active,
    Finished,
    Failed,
}

/// One scan of one partition, consumed a page at a time.
///
/// A session cannot resume across a transport failure: the error is
/// returned once, and later calls fail with [`ClientError::SessionAborted`].
/// Scanning again needs a new session from [`EdgeScanner::open`].
#[derive(Debug)]
pub struct EdgeScan {
    conn: RpcConnection,
    space_id: SpaceId,
    part_id: PartitionId,
    pending: VecDeque<Orientation>,
    cursor: ScanCursor,
    dedupe: bool,
    seen: HashSet<EdgeKey>,
    page_limit: u32,
    timeout: Duration,
    pages: usize,
    rows: usize,
    state: SessionState,
}

impl EdgeScan {
    /// Next page of edges in forward orientation, or `None` when the scan
    /// is exhausted. A page may be empty after deduplication.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Edge>>> {
        match self.state {
            SessionState::Finished => return Ok(None),
            SessionState::Failed => return Err(ClientError::SessionAborted),
            SessionState::Active => {},
        }

        match self.fetch_page().await {
            Ok(Some(page)) => Ok(Some(page)),
            Ok(None) => {
                self.state = SessionState::Finished;
                self.conn.close().await;
                debug!(target: "gpr::scan", pages = self.pages, rows = self.rows, "Scan finished");
                Ok(None)
            },
            Err(e) => {
                self.state = SessionState::Failed;
                self.conn.close().await;
                warn!(
                    target: "gpr::scan",
                    pages = self.pages,
                    rows = self.rows,
                    error = %e,
                    "Scan aborted"
                );
                Err(e)
            },
        }
    }

    /// Drain the session.
    pub async fn collect(mut self) -> Result<Vec<Edge>> {
        let mut edges = Vec::new();
        while let Some(page) = self.next_page().await? {
            edges.extend(page);
        }
        Ok(edges)
    }

    async fn fetch_page(&mut self) -> Result<Option<Vec<Edge>>> {
        let Some(orientation) = self.pending.front().copied() else {
            return Ok(None);
        };

        let mut parts = BTreeMap::new();
        parts.insert(self.part_id, self.cursor.clone());
        let request = ScanEdgeRequest {
            space_id: self.space_id,
            parts,
            return_columns: vec![EdgeProp {
                edge_type: orientation.wire_type(),
                props: EDGE_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            }],
            limit: i64::from(self.page_limit),
        };

        let response: ScanEdgeResponse = self
            .conn
            .request(Command::ScanEdge, &request, self.timeout)
            .await?;
        self.pages += 1;

        if !response.error_code.is_success() {
            return Err(ClientError::Application {
                code: response.error_code,
                message: format!("scan of part {}", self.part_id),
            });
        }
        if let Some(failed) = response.failed_parts.iter().find(|p| p.part_id == self.part_id) {
            return Err(ClientError::Application {
                code: failed.code,
                message: format!("scan of part {} failed", self.part_id),
            });
        }

        let mut page = Vec::with_capacity(response.props.rows.len());
        for row in &response.props.rows {
            let edge = orientation.apply(decode_row(&row.values)?);
            self.rows += 1;
            if self.dedupe && !self.seen.insert(edge.key()) {
                continue;
            }
            page.push(edge);
        }

        let cursor = response.cursors.get(&self.part_id).cloned().ok_or_else(|| {
            ClientError::InvalidResponse(format!("no cursor for part {}", self.part_id))
        })?;
        if cursor.has_next && cursor.next_cursor.is_none() {
            return Err(ClientError::InvalidResponse(
                "has_next set without a cursor".to_string(),
            ));
        }

        debug!(
            target: "gpr::scan",
            direction = %orientation.direction(),
            page = self.pages,
            rows = page.len(),
            has_next = cursor.has_next,
            "Page"
        );

        if cursor.has_next {
            self.cursor = cursor;
        } else {
            self.pending.pop_front();
            self.cursor = ScanCursor::default();
        }
        Ok(Some(page))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(src: i64, edge_type: i64, rank: i64, dst: i64, idx: &str, ts: Value) -> Vec<Value> {
        vec![
            Value::Int(src),
            Value::Int(edge_type),
            Value::Int(rank),
            Value::Int(dst),
            Value::from(idx),
            ts,
        ]
    }

    #[test]
    fn test_orientation_negates_and_swaps() {
        let forward = Orientation::new(7, false).unwrap();
        let reverse = Orientation::new(7, true).unwrap();
        assert_eq!(forward.wire_type(), 7);
        assert_eq!(reverse.wire_type(), -7);

        let stored_forward = decode_row(&row(1, 7, 0, 2, "idx1", Value::Null)).unwrap();
        let stored_reverse = decode_row(&row(2, -7, 0, 1, "idx1", Value::Null)).unwrap();
        assert_eq!(
            forward.apply(stored_forward).key(),
            reverse.apply(stored_reverse).key()
        );
    }

    #[test]
    fn test_non_positive_edge_type_rejected() {
        assert!(Orientation::new(0, false).is_err());
        assert!(Orientation::new(-3, true).is_err());
    }

    #[test]
    fn test_decode_row_with_timestamp() {
        let ts = DateTime {
            year: 2020,
            month: 2,
            day: 29,
            ..Default::default()
        };
        let edge = decode_row(&row(10, 3, 2, 20, "x", Value::DateTime(ts))).unwrap();
        assert_eq!(edge.src, 10);
        assert_eq!(edge.dst, 20);
        assert_eq!(edge.rank, 2);
        assert_eq!(edge.idx, "x");
        assert_eq!(edge.ts, Some(ts));
    }

    #[test]
    fn test_decode_row_rejects_mistyped_column() {
        let mut values = row(1, 3, 0, 2, "x", Value::Null);
        values[COL_RANK] = Value::Str("0".into());

        let err = decode_row(&values).unwrap_err();
        assert!(matches!(err, ClientError::Decode(ref msg) if msg.contains("_rank")));
    }

    #[test]
    fn test_decode_row_rejects_missing_column() {
        let mut values = row(1, 3, 0, 2, "x", Value::Null);
        values.truncate(5);

        let err = decode_row(&values).unwrap_err();
        assert!(matches!(err, ClientError::Decode(ref msg) if msg.contains("ts")));
    }

    #[test]
    fn test_decode_row_rejects_non_datetime_ts() {
        let values = row(1, 3, 0, 2, "x", Value::Int(1_600_000_000));
        assert!(decode_row(&values).is_err());
    }
}
