#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![allow(clippy::module_name_repetitions)]

mod checksum;
mod edge;
mod error;
mod value;

pub use checksum::crc32;
pub use edge::{Direction, Discrepancy, Edge, EdgeKey};
pub use error::{ProbeError, Result};
pub use value::{DateTime, Value};

/// Raft-state service port used when a peer is given without one.
pub const DEFAULT_RAFT_PORT: u16 = 9780;
/// Storage (scan) service port.
pub const DEFAULT_STORAGE_PORT: u16 = 9779;
/// Metadata service port.
pub const DEFAULT_META_PORT: u16 = 9559;

pub type SpaceId = i32;
pub type PartitionId = i32;
pub type EdgeTypeId = i32;
