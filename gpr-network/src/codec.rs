//! Payload codecs for the raft-state, metadata and scan RPCs.
//!
//! Every payload is little-endian. Strings and byte blobs are length-prefixed
//! with a `u32`, collections with a `u32` element count. Every response
//! payload starts with an `i32` status code.

use crate::protocol::{ErrorCode, RaftRole, RaftStatus};
use bytes::{BufMut, Bytes, BytesMut};
use gpr_core::{DateTime, EdgeTypeId, PartitionId, ProbeError, Result, SpaceId, Value};
use std::collections::BTreeMap;

const VALUE_NULL: u8 = 0;
const VALUE_BOOL: u8 = 1;
const VALUE_INT: u8 = 2;
const VALUE_FLOAT: u8 = 3;
const VALUE_STR: u8 = 4;
const VALUE_DATETIME: u8 = 5;

/// Bounds-checked cursor over a payload.
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ProbeError::Protocol(format!(
                "Truncated payload reading {}: need {} bytes, have {}",
                what,
                len,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub fn get_u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub fn get_bool(&mut self, what: &str) -> Result<bool> {
        match self.get_u8(what)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProbeError::Protocol(format!(
                "Invalid boolean {} for {}",
                other, what
            ))),
        }
    }

    pub fn get_i16(&mut self, what: &str) -> Result<i16> {
        Ok(i16::from_le_bytes(self.array(what)?))
    }

    pub fn get_u32(&mut self, what: &str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    pub fn get_i32(&mut self, what: &str) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array(what)?))
    }

    pub fn get_i64(&mut self, what: &str) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array(what)?))
    }

    pub fn get_f64(&mut self, what: &str) -> Result<f64> {
        Ok(f64::from_le_bytes(self.array(what)?))
    }

    pub fn get_bytes(&mut self, what: &str) -> Result<Bytes> {
        let len = self.get_u32(what)? as usize;
        Ok(Bytes::copy_from_slice(self.take(len, what)?))
    }

    pub fn get_string(&mut self, what: &str) -> Result<String> {
        let len = self.get_u32(what)? as usize;
        let raw = self.take(len, what)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| ProbeError::Protocol(format!("Invalid UTF-8 in {}: {}", what, e)))
    }

    /// Element count of a collection. Every element takes at least one byte,
    /// so a count larger than the remaining payload is rejected up front.
    pub fn get_count(&mut self, what: &str) -> Result<usize> {
        let count = self.get_u32(what)? as usize;
        if count > self.remaining() {
            return Err(ProbeError::Protocol(format!(
                "Implausible {} count {} with {} bytes left",
                what,
                count,
                self.remaining()
            )));
        }
        Ok(count)
    }

    pub fn get_error_code(&mut self) -> Result<ErrorCode> {
        Ok(ErrorCode::from_i32(self.get_i32("status code")?))
    }

    pub fn get_value(&mut self) -> Result<Value> {
        match self.get_u8("value tag")? {
            VALUE_NULL => Ok(Value::Null),
            VALUE_BOOL => Ok(Value::Bool(self.get_bool("bool value")?)),
            VALUE_INT => Ok(Value::Int(self.get_i64("int value")?)),
            VALUE_FLOAT => Ok(Value::Float(self.get_f64("float value")?)),
            VALUE_STR => Ok(Value::Str(self.get_string("string value")?)),
            VALUE_DATETIME => Ok(Value::DateTime(DateTime {
                year: self.get_i16("datetime year")?,
                month: self.get_u8("datetime month")?,
                day: self.get_u8("datetime day")?,
                hour: self.get_u8("datetime hour")?,
                minute: self.get_u8("datetime minute")?,
                sec: self.get_u8("datetime sec")?,
                microsec: self.get_u32("datetime microsec")?,
            })),
            other => Err(ProbeError::Protocol(format!("Unknown value tag: {}", other))),
        }
    }

    /// Fails if bytes are left over after a message was decoded.
    pub fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(ProbeError::Protocol(format!(
                "{} trailing bytes after message",
                self.remaining()
            )));
        }
        Ok(())
    }
}

fn put_bytes(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32_le(data.len() as u32);
    buf.put_slice(data);
}

fn put_string(buf: &mut BytesMut, s: &str) {
    put_bytes(buf, s.as_bytes());
}

fn put_value(buf: &mut BytesMut, value: &Value) {
    match value {
        Value::Null => buf.put_u8(VALUE_NULL),
        Value::Bool(v) => {
            buf.put_u8(VALUE_BOOL);
            buf.put_u8(u8::from(*v));
        },
        Value::Int(v) => {
            buf.put_u8(VALUE_INT);
            buf.put_i64_le(*v);
        },
        Value::Float(v) => {
            buf.put_u8(VALUE_FLOAT);
            buf.put_f64_le(*v);
        },
        Value::Str(v) => {
            buf.put_u8(VALUE_STR);
            put_string(buf, v);
        },
        Value::DateTime(dt) => {
            buf.put_u8(VALUE_DATETIME);
            buf.put_i16_le(dt.year);
            buf.put_u8(dt.month);
            buf.put_u8(dt.day);
            buf.put_u8(dt.hour);
            buf.put_u8(dt.minute);
            buf.put_u8(dt.sec);
            buf.put_u32_le(dt.microsec);
        },
    }
}

pub trait WireMessage: Sized {
    fn encode(&self, buf: &mut BytesMut);

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self>;

    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        self.encode(&mut buf);
        buf.freeze()
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(data);
        let message = Self::decode(&mut reader)?;
        reader.finish()?;
        Ok(message)
    }
}

/// Body of an `ErrorResponse` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

impl WireMessage for ErrorPayload {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.code.as_i32());
        put_string(buf, &self.message);
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            code: reader.get_error_code()?,
            message: reader.get_string("error message")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaftStateRequest {
    pub space_id: SpaceId,
    pub part_id: PartitionId,
}

impl WireMessage for RaftStateRequest {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.space_id);
        buf.put_i32_le(self.part_id);
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            space_id: reader.get_i32("space id")?,
            part_id: reader.get_i32("part id")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaftStateResponse {
    pub error_code: ErrorCode,
    pub role: RaftRole,
    pub term: i64,
    pub is_leader: bool,
    pub committed_log_id: i64,
    pub last_log_id: i64,
    pub last_log_term: i64,
    pub status: RaftStatus,
}

impl RaftStateResponse {
    /// A successful response with no log progress, handy for servers and tests.
    #[must_use]
    pub fn new(term: i64, is_leader: bool) -> Self {
        Self {
            error_code: ErrorCode::Succeeded,
            role: if is_leader {
                RaftRole::Leader
            } else {
                RaftRole::Follower
            },
            term,
            is_leader,
            committed_log_id: 0,
            last_log_id: 0,
            last_log_term: term,
            status: RaftStatus::Running,
        }
    }

    #[must_use]
    pub fn with_error(code: ErrorCode) -> Self {
        Self {
            error_code: code,
            role: RaftRole::Unknown,
            term: 0,
            is_leader: false,
            committed_log_id: 0,
            last_log_id: 0,
            last_log_term: 0,
            status: RaftStatus::Unknown,
        }
    }
}

impl WireMessage for RaftStateResponse {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.error_code.as_i32());
        buf.put_u8(self.role as u8);
        buf.put_i64_le(self.term);
        buf.put_u8(u8::from(self.is_leader));
        buf.put_i64_le(self.committed_log_id);
        buf.put_i64_le(self.last_log_id);
        buf.put_i64_le(self.last_log_term);
        buf.put_u8(self.status as u8);
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            error_code: reader.get_error_code()?,
            role: RaftRole::from(reader.get_u8("role")?),
            term: reader.get_i64("term")?,
            is_leader: reader.get_bool("is_leader")?,
            committed_log_id: reader.get_i64("committed log id")?,
            last_log_id: reader.get_i64("last log id")?,
            last_log_term: reader.get_i64("last log term")?,
            status: RaftStatus::from(reader.get_u8("status")?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEdgesRequest {
    pub space_id: SpaceId,
}

impl WireMessage for ListEdgesRequest {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.space_id);
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self> {
        Ok(Self {
            space_id: reader.get_i32("space id")?,
        })
    }
}

/// Schema entry for one edge type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeItem {
    pub edge_type: EdgeTypeId,
    pub edge_name: String,
    pub schema_version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEdgesResponse {
    pub error_code: ErrorCode,
    pub edges: Vec<EdgeItem>,
}

impl WireMessage for ListEdgesResponse {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.error_code.as_i32());
        buf.put_u32_le(self.edges.len() as u32);
        for item in &self.edges {
            buf.put_i32_le(item.edge_type);
            put_string(buf, &item.edge_name);
            buf.put_i64_le(item.schema_version);
        }
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self> {
        let error_code = reader.get_error_code()?;
        let count = reader.get_count("edge item")?;
        let mut edges = Vec::with_capacity(count);
        for _ in 0..count {
            edges.push(EdgeItem {
                edge_type: reader.get_i32("edge type")?,
                edge_name: reader.get_string("edge name")?,
                schema_version: reader.get_i64("schema version")?,
            });
        }
        Ok(Self { error_code, edges })
    }
}

/// Per-partition continuation state of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanCursor {
    pub has_next: bool,
    pub next_cursor: Option<Bytes>,
}

impl ScanCursor {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(self.has_next));
        match &self.next_cursor {
            Some(cursor) => {
                buf.put_u8(1);
                put_bytes(buf, cursor);
            },
            None => buf.put_u8(0),
        }
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self> {
        let has_next = reader.get_bool("cursor has_next")?;
        let next_cursor = if reader.get_bool("cursor present")? {
            Some(reader.get_bytes("cursor")?)
        } else {
            None
        };
        Ok(Self {
            has_next,
            next_cursor,
        })
    }
}

fn put_cursors(buf: &mut BytesMut, cursors: &BTreeMap<PartitionId, ScanCursor>) {
    buf.put_u32_le(cursors.len() as u32);
    for (part, cursor) in cursors {
        buf.put_i32_le(*part);
        cursor.encode(buf);
    }
}

fn get_cursors(reader: &mut PayloadReader<'_>) -> Result<BTreeMap<PartitionId, ScanCursor>> {
    let count = reader.get_count("cursor")?;
    let mut cursors = BTreeMap::new();
    for _ in 0..count {
        let part = reader.get_i32("cursor part id")?;
        cursors.insert(part, ScanCursor::decode(reader)?);
    }
    Ok(cursors)
}

/// Columns to return for one (signed) edge type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeProp {
    pub edge_type: EdgeTypeId,
    pub props: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEdgeRequest {
    pub space_id: SpaceId,
    pub parts: BTreeMap<PartitionId, ScanCursor>,
    pub return_columns: Vec<EdgeProp>,
    pub limit: i64,
}

impl WireMessage for ScanEdgeRequest {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.space_id);
        put_cursors(buf, &self.parts);
        buf.put_u32_le(self.return_columns.len() as u32);
        for column in &self.return_columns {
            buf.put_i32_le(column.edge_type);
            buf.put_u32_le(column.props.len() as u32);
            for prop in &column.props {
                put_string(buf, prop);
            }
        }
        buf.put_i64_le(self.limit);
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self> {
        let space_id = reader.get_i32("space id")?;
        let parts = get_cursors(reader)?;
        let column_count = reader.get_count("return column")?;
        let mut return_columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let edge_type = reader.get_i32("edge type")?;
            let prop_count = reader.get_count("prop")?;
            let mut props = Vec::with_capacity(prop_count);
            for _ in 0..prop_count {
                props.push(reader.get_string("prop name")?);
            }
            return_columns.push(EdgeProp { edge_type, props });
        }
        Ok(Self {
            space_id,
            parts,
            return_columns,
            limit: reader.get_i64("limit")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartResult {
    pub part_id: PartitionId,
    pub code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSet {
    pub column_names: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanEdgeResponse {
    pub error_code: ErrorCode,
    pub failed_parts: Vec<PartResult>,
    pub props: DataSet,
    pub cursors: BTreeMap<PartitionId, ScanCursor>,
}

impl WireMessage for ScanEdgeResponse {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.error_code.as_i32());
        buf.put_u32_le(self.failed_parts.len() as u32);
        for part in &self.failed_parts {
            buf.put_i32_le(part.part_id);
            buf.put_i32_le(part.code.as_i32());
        }
        buf.put_u32_le(self.props.column_names.len() as u32);
        for name in &self.props.column_names {
            put_string(buf, name);
        }
        buf.put_u32_le(self.props.rows.len() as u32);
        for row in &self.props.rows {
            buf.put_u32_le(row.values.len() as u32);
            for value in &row.values {
                put_value(buf, value);
            }
        }
        put_cursors(buf, &self.cursors);
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self> {
        let error_code = reader.get_error_code()?;

        let failed_count = reader.get_count("failed part")?;
        let mut failed_parts = Vec::with_capacity(failed_count);
        for _ in 0..failed_count {
            failed_parts.push(PartResult {
                part_id: reader.get_i32("failed part id")?,
                code: reader.get_error_code()?,
            });
        }

        let name_count = reader.get_count("column name")?;
        let mut column_names = Vec::with_capacity(name_count);
        for _ in 0..name_count {
            column_names.push(reader.get_string("column name")?);
        }

        let row_count = reader.get_count("row")?;
        let mut rows = Vec::with_capacity(row_count);
        for _ in 0..row_count {
            let value_count = reader.get_count("row value")?;
            let mut values = Vec::with_capacity(value_count);
            for _ in 0..value_count {
                values.push(reader.get_value()?);
            }
            rows.push(Row { values });
        }

        Ok(Self {
            error_code,
            failed_parts,
            props: DataSet { column_names, rows },
            cursors: get_cursors(reader)?,
        })
    }
}
