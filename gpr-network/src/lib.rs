#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![allow(clippy::module_name_repetitions)]

mod codec;
mod frame;
mod protocol;

pub use codec::{
    DataSet, EdgeItem, EdgeProp, ErrorPayload, ListEdgesRequest, ListEdgesResponse, PartResult,
    PayloadReader, RaftStateRequest, RaftStateResponse, Row, ScanCursor, ScanEdgeRequest,
    ScanEdgeResponse, WireMessage,
};
pub use frame::{Frame, FrameHeader, encode_frame, parse_frame};
pub use protocol::{Command, ErrorCode, FRAME_MAGIC, PROTOCOL_VERSION, RaftRole, RaftStatus};

pub const FRAME_HEADER_SIZE: usize = 32;
/// Default upper bound on a frame payload (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
/// Default read/write buffer capacity for a transport.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
