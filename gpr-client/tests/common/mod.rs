//! In-process fake replica speaking the GraphProbe frame protocol.
//!
//! One fake answers raft-state, list-edges and scan requests, so a single
//! instance can stand in for a replica, the storage service of the leader,
//! and the metadata service at once.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use gpr_client::{ClusterConfig, PeerSpec, ScanConfig, TransportConfig};
use gpr_core::{DateTime, Edge, EdgeTypeId, Value};
use gpr_network::{
    Command, DEFAULT_MAX_FRAME_SIZE, DataSet, EdgeItem, ErrorCode, ErrorPayload, Frame,
    ListEdgesResponse, PartResult, RaftStateResponse, Row, ScanCursor, ScanEdgeRequest,
    ScanEdgeResponse, WireMessage, encode_frame, parse_frame,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

pub const SPACE: i32 = 1;
pub const PART: i32 = 1;
pub const EDGE_NAME: &str = "known2";
pub const EDGE_TYPE: EdgeTypeId = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftBehavior {
    Leader(i64),
    Follower(i64),
    /// Respond with this status instead of a raft state
    Status(ErrorCode),
    /// Read the request and never answer
    Silent,
}

struct Script {
    raft: RaftBehavior,
    edge_items: Vec<EdgeItem>,
    rows: HashMap<EdgeTypeId, Vec<Vec<Value>>>,
    drop_scan_after: Option<usize>,
    failed_part: Option<ErrorCode>,
}

#[derive(Default)]
pub struct Counters {
    pub connections: AtomicUsize,
    pub raft_requests: AtomicUsize,
    pub list_requests: AtomicUsize,
    pub scan_requests: AtomicUsize,
    hangup_next: AtomicBool,
}

pub struct FakeReplica {
    addr: SocketAddr,
    script: Arc<Mutex<Script>>,
    counters: Arc<Counters>,
    accept: JoinHandle<()>,
}

impl FakeReplica {
    pub async fn start(raft: RaftBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let script = Arc::new(Mutex::new(Script {
            raft,
            edge_items: vec![EdgeItem {
                edge_type: EDGE_TYPE,
                edge_name: EDGE_NAME.to_string(),
                schema_version: 0,
            }],
            rows: HashMap::new(),
            drop_scan_after: None,
            failed_part: None,
        }));
        let counters = Arc::new(Counters::default());

        let accept = tokio::spawn({
            let script = Arc::clone(&script);
            let counters = Arc::clone(&counters);
            async move {
                let mut connections = JoinSet::new();
                while let Ok((stream, _)) = listener.accept().await {
                    counters.connections.fetch_add(1, Ordering::SeqCst);
                    connections.spawn(serve(
                        stream,
                        Arc::clone(&script),
                        Arc::clone(&counters),
                    ));
                }
            }
        });

        Self {
            addr,
            script,
            counters,
            accept,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn peer(&self, id: &str) -> PeerSpec {
        PeerSpec::new(id, "127.0.0.1", self.port())
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn raft_requests(&self) -> usize {
        self.counters.raft_requests.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.counters.connections.load(Ordering::SeqCst)
    }

    pub fn set_raft(&self, raft: RaftBehavior) {
        self.script.lock().unwrap().raft = raft;
    }

    /// Close the connection instead of answering the next raft-state request.
    pub fn hang_up_next(&self) {
        self.counters.hangup_next.store(true, Ordering::SeqCst);
    }

    /// Close the connection on every scan request after the first `pages`.
    pub fn drop_scan_after(&self, pages: Option<usize>) {
        let mut script = self.script.lock().unwrap();
        script.drop_scan_after = pages;
        self.counters.scan_requests.store(0, Ordering::SeqCst);
    }

    pub fn fail_part(&self, code: Option<ErrorCode>) {
        self.script.lock().unwrap().failed_part = code;
    }

    /// Raw rows served for a signed (wire) edge type.
    pub fn set_rows(&self, wire_type: EdgeTypeId, rows: Vec<Vec<Value>>) {
        self.script.lock().unwrap().rows.insert(wire_type, rows);
    }

    /// Store `edges` consistently in both the forward and the reverse index.
    pub fn store_edges(&self, edges: &[Edge]) {
        self.set_rows(EDGE_TYPE, edges.iter().map(forward_row).collect());
        self.set_rows(-EDGE_TYPE, edges.iter().map(reverse_row).collect());
    }
}

impl Drop for FakeReplica {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

pub fn edge(src: i64, dst: i64, rank: i64, idx: &str, ts: Option<DateTime>) -> Edge {
    Edge {
        src,
        dst,
        rank,
        idx: idx.to_string(),
        ts,
    }
}

pub fn ts(day: u8) -> DateTime {
    DateTime {
        year: 2021,
        month: 6,
        day,
        hour: 12,
        ..Default::default()
    }
}

/// Row as stored in the forward index: `_src, _type, _rank, _dst, idx, ts`.
pub fn forward_row(edge: &Edge) -> Vec<Value> {
    vec![
        Value::Int(edge.src),
        Value::Int(i64::from(EDGE_TYPE)),
        Value::Int(edge.rank),
        Value::Int(edge.dst),
        Value::Str(edge.idx.clone()),
        Value::from(edge.ts),
    ]
}

/// Row as stored in the reverse index, keyed by destination.
pub fn reverse_row(edge: &Edge) -> Vec<Value> {
    vec![
        Value::Int(edge.dst),
        Value::Int(-i64::from(EDGE_TYPE)),
        Value::Int(edge.rank),
        Value::Int(edge.src),
        Value::Str(edge.idx.clone()),
        Value::from(edge.ts),
    ]
}

/// An address nothing listens on.
pub async fn dead_peer(id: &str) -> PeerSpec {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    PeerSpec::new(id, "127.0.0.1", port)
}

/// A listener that never accepts, with its accept queue filled so that new
/// connects hang instead of failing.
pub struct Blackhole {
    listener: TcpListener,
    queued: Vec<TcpStream>,
}

impl Blackhole {
    pub async fn start() -> Self {
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(1).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut queued = Vec::new();
        while queued.len() < 64 {
            match tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => queued.push(stream),
                _ => break,
            }
        }
        Self { listener, queued }
    }

    pub fn peer(&self, id: &str) -> PeerSpec {
        PeerSpec::new(id, "127.0.0.1", self.listener.local_addr().unwrap().port())
    }
}

pub fn transport() -> TransportConfig {
    TransportConfig::default().with_connect_timeout(Duration::from_millis(500))
}

pub fn cluster_config(peers: Vec<PeerSpec>) -> ClusterConfig {
    ClusterConfig {
        transport: transport(),
        raft_state_timeout: Duration::from_millis(300),
        refresh_interval: Duration::from_secs(5),
        retry_delay: Duration::from_millis(20),
        leader_wait: Duration::from_millis(1500),
        ..ClusterConfig::new(SPACE, PART, peers)
    }
}

pub fn scan_config(storage: &FakeReplica, page_limit: u32) -> ScanConfig {
    ScanConfig {
        storage_port: storage.port(),
        page_limit,
        scan_timeout: Duration::from_secs(2),
        transport: transport(),
        meta_addr: storage.addr().to_string(),
        meta_timeout: Duration::from_millis(500),
    }
}

async fn serve(mut stream: TcpStream, script: Arc<Mutex<Script>>, counters: Arc<Counters>) {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        let frame = loop {
            match parse_frame(&buf, DEFAULT_MAX_FRAME_SIZE) {
                Ok(Some((frame, consumed))) => {
                    buf.advance(consumed);
                    break frame;
                },
                Ok(None) => {},
                Err(_) => return,
            }
            match stream.read_buf(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {},
            }
        };

        let reply = match frame.command() {
            Command::GetRaftState => {
                counters.raft_requests.fetch_add(1, Ordering::SeqCst);
                if counters.hangup_next.swap(false, Ordering::SeqCst) {
                    return;
                }
                let raft = script.lock().unwrap().raft;
                let response = match raft {
                    RaftBehavior::Leader(term) => RaftStateResponse::new(term, true),
                    RaftBehavior::Follower(term) => RaftStateResponse::new(term, false),
                    RaftBehavior::Status(code) => RaftStateResponse::with_error(code),
                    RaftBehavior::Silent => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        return;
                    },
                };
                (Command::RaftStateResponse, response.to_bytes())
            },
            Command::ListEdges => {
                counters.list_requests.fetch_add(1, Ordering::SeqCst);
                let edges = script.lock().unwrap().edge_items.clone();
                let response = ListEdgesResponse {
                    error_code: ErrorCode::Succeeded,
                    edges,
                };
                (Command::ListEdgesResponse, response.to_bytes())
            },
            Command::ScanEdge => {
                let served = counters.scan_requests.fetch_add(1, Ordering::SeqCst);
                let request = ScanEdgeRequest::from_bytes(&frame.payload).unwrap();
                let Some(response) = scan_page(&script, &request, served) else {
                    return;
                };
                (Command::ScanEdgeResponse, response.to_bytes())
            },
            _ => {
                let error = ErrorPayload {
                    code: ErrorCode::Other(-100),
                    message: "unsupported command".to_string(),
                };
                (Command::ErrorResponse, error.to_bytes())
            },
        };

        let out = Frame::new(reply.0, frame.request_id(), reply.1);
        if stream.write_all(&encode_frame(&out)).await.is_err() {
            return;
        }
    }
}

/// `None` means the connection should be dropped.
fn scan_page(
    script: &Mutex<Script>,
    request: &ScanEdgeRequest,
    served: usize,
) -> Option<ScanEdgeResponse> {
    let script = script.lock().unwrap();
    if script.drop_scan_after.is_some_and(|limit| served >= limit) {
        return None;
    }

    let (&part, cursor) = request.parts.iter().next().unwrap();
    let wire_type = request.return_columns[0].edge_type;
    let rows = script.rows.get(&wire_type).cloned().unwrap_or_default();

    let offset = cursor
        .next_cursor
        .as_ref()
        .map_or(0, |c| u64::from_le_bytes(c[..8].try_into().unwrap()) as usize);
    let end = (offset + request.limit as usize).min(rows.len());
    let has_next = end < rows.len();

    let mut cursors = BTreeMap::new();
    cursors.insert(
        part,
        ScanCursor {
            has_next,
            next_cursor: has_next.then(|| Bytes::copy_from_slice(&(end as u64).to_le_bytes())),
        },
    );

    Some(ScanEdgeResponse {
        error_code: ErrorCode::Succeeded,
        failed_parts: script
            .failed_part
            .map(|code| vec![PartResult { part_id: part, code }])
            .unwrap_or_default(),
        props: DataSet {
            column_names: request.return_columns[0].props.clone(),
            rows: rows[offset..end]
                .iter()
                .map(|values| Row {
                    values: values.clone(),
                })
                .collect(),
        },
        cursors,
    })
}
