pub const PROTOCOL_VERSION: u8 = 1;
pub const FRAME_MAGIC: [u8; 4] = [0x47, 0x50, 0x52, 0x42]; // 'GPRB'

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Requests (0x01-0x7F)
    /// Raft state of one (space, partition) on a replica
    GetRaftState = 0x01,
    /// Edge schemas of a space, served by the metadata service
    ListEdges = 0x02,
    /// One page of a bulk edge scan, served by the storage service
    ScanEdge = 0x03,

    // Responses (0x80+)
    RaftStateResponse = 0x81,
    ListEdgesResponse = 0x82,
    ScanEdgeResponse = 0x83,
    ErrorResponse = 0xFF,
}

impl Command {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::GetRaftState),
            0x02 => Some(Self::ListEdges),
            0x03 => Some(Self::ScanEdge),
            0x81 => Some(Self::RaftStateResponse),
            0x82 => Some(Self::ListEdgesResponse),
            0x83 => Some(Self::ScanEdgeResponse),
            0xFF => Some(Self::ErrorResponse),
            _ => None,
        }
    }

    /// Response command expected for a request command.
    #[must_use]
    pub fn response(self) -> Option<Self> {
        match self {
            Self::GetRaftState => Some(Self::RaftStateResponse),
            Self::ListEdges => Some(Self::ListEdgesResponse),
            Self::ScanEdge => Some(Self::ScanEdgeResponse),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_request(self) -> bool {
        (self as u8) < 0x80
    }
}

/// Status code carried by every response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Succeeded,
    Disconnected,
    LeaderChanged,
    SpaceNotFound,
    PartNotFound,
    EdgeNotFound,
    TermOutOfDate,
    Other(i32),
}

impl ErrorCode {
    #[must_use]
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Succeeded,
            -1 => Self::Disconnected,
            -2 => Self::LeaderChanged,
            -3 => Self::SpaceNotFound,
            -4 => Self::PartNotFound,
            -5 => Self::EdgeNotFound,
            -6 => Self::TermOutOfDate,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::Disconnected => -1,
            Self::LeaderChanged => -2,
            Self::SpaceNotFound => -3,
            Self::PartNotFound => -4,
            Self::EdgeNotFound => -5,
            Self::TermOutOfDate => -6,
            Self::Other(v) => v,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaftRole {
    Leader = 1,
    Follower = 2,
    Candidate = 3,
    Learner = 4,
    Unknown = 0,
}

impl From<u8> for RaftRole {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Leader,
            2 => Self::Follower,
            3 => Self::Candidate,
            4 => Self::Learner,
            _ => Self::Unknown,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaftStatus {
    Starting = 1,
    Running = 2,
    Stopped = 3,
    WaitingSnapshot = 4,
    Unknown = 0,
}

impl From<u8> for RaftStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopped,
            4 => Self::WaitingSnapshot,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_response_pairs() {
        assert_eq!(
            Command::GetRaftState.response(),
            Some(Command::RaftStateResponse)
        );
        assert_eq!(Command::ScanEdge.response(), Some(Command::ScanEdgeResponse));
        assert_eq!(Command::ErrorResponse.response(), None);
        assert!(Command::ListEdges.is_request());
        assert!(!Command::ListEdgesResponse.is_request());
    }

    #[test]
    fn test_unknown_command_byte() {
        assert_eq!(Command::from_u8(0x42), None);
        assert_eq!(Command::from_u8(0x83), Some(Command::ScanEdgeResponse));
    }

    #[test]
    fn test_error_code_preserves_unknown_values() {
        assert_eq!(ErrorCode::from_i32(-99), ErrorCode::Other(-99));
        assert_eq!(ErrorCode::Other(-99).as_i32(), -99);
        assert!(ErrorCode::from_i32(0).is_success());
        assert!(!ErrorCode::from_i32(-2).is_success());
    }
}
