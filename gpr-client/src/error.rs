use std::fmt;
use std::io;
use std::time::Duration;

use gpr_network::ErrorCode;

/// Coarse failure classes used to decide what a caller does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transient transport failure: drop the connection, reconnect, retry later.
    Connectivity,
    /// The remote answered with a non-success status.
    Application,
    /// A named entity (edge type, peer) does not exist.
    NotFound,
    /// No leader could be determined within the configured bound.
    Timeout,
    /// Malformed row data or configuration. Never retried or coerced.
    Data,
    /// The run was cancelled or the cluster view closed.
    Cancelled,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connectivity => "connectivity",
            Self::Application => "application",
            Self::NotFound => "not-found",
            Self::Timeout => "timeout",
            Self::Data => "data",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during client operations
#[derive(Debug)]
pub enum ClientError {
    /// Failed to establish a connection
    ConnectionFailed(io::Error),
    /// Connection was closed by the remote end
    ConnectionClosed,
    /// I/O error during communication
    Io(io::Error),
    /// A single RPC did not complete within its timeout
    Timeout,
    /// Framing or payload encoding error
    Protocol(String),
    VersionMismatch {
        expected: u8,
        actual: u8,
    },
    CrcMismatch {
        expected: u32,
        actual: u32,
    },
    /// Response request id does not match the request in flight
    OutOfSequence {
        expected: u64,
        actual: u64,
    },
    FrameTooLarge {
        size: usize,
        max: usize,
    },
    /// The remote returned a non-success status code
    Application {
        code: ErrorCode,
        message: String,
    },
    NotFound(String),
    /// No leader was resolved within `waited`
    LeaderUnavailable {
        waited: Duration,
    },
    /// A scan row is missing a column or carries the wrong type
    Decode(String),
    /// Well-framed response whose content is unusable
    InvalidResponse(String),
    Config(String),
    /// The scan session already failed and cannot continue
    SessionAborted,
    Cancelled,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed(e) => write!(f, "Connection failed: {}", e),
            Self::ConnectionClosed => write!(f, "Connection closed by remote"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Timeout => write!(f, "Operation timed out"),
            Self::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Self::VersionMismatch { expected, actual } => {
                write!(
                    f,
                    "Bad version in response: expected {}, got {}",
                    expected, actual
                )
            },
            Self::CrcMismatch { expected, actual } => {
                write!(
                    f,
                    "CRC mismatch: expected {:#x}, got {:#x}",
                    expected, actual
                )
            },
            Self::OutOfSequence { expected, actual } => {
                write!(
                    f,
                    "Out of sequence response: expected request {}, got {}",
                    expected, actual
                )
            },
            Self::FrameTooLarge { size, max } => {
                write!(f, "Frame too large: {} bytes (max {})", size, max)
            },
            Self::Application { code, message } => {
                write!(f, "Remote error {:?} ({}): {}", code, code.as_i32(), message)
            },
            Self::NotFound(what) => write!(f, "Not found: {}", what),
            Self::LeaderUnavailable { waited } => {
                write!(f, "No leader determined after {:?}", waited)
            },
            Self::Decode(msg) => write!(f, "Row decode error: {}", msg),
            Self::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::SessionAborted => write!(f, "Scan session aborted by an earlier failure"),
            Self::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

/// `io::ErrorKind` values that are not transport failures. Every other kind
/// is treated as connectivity.
const IO_KIND_CATEGORIES: &[(io::ErrorKind, ErrorCategory)] = &[
    (io::ErrorKind::InvalidData, ErrorCategory::Data),
    (io::ErrorKind::InvalidInput, ErrorCategory::Data),
    (io::ErrorKind::NotFound, ErrorCategory::NotFound),
    (io::ErrorKind::PermissionDenied, ErrorCategory::Application),
];

fn io_category(err: &io::Error) -> ErrorCategory {
    IO_KIND_CATEGORIES
        .iter()
        .find(|(kind, _)| *kind == err.kind())
        .map_or(ErrorCategory::Connectivity, |(_, category)| *category)
}

impl ClientError {
    /// Map this error onto the failure taxonomy. This is the only place
    /// where errors are classified.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionFailed(_)
            | Self::ConnectionClosed
            | Self::Timeout
            | Self::Protocol(_)
            | Self::VersionMismatch { .. }
            | Self::CrcMismatch { .. }
            | Self::OutOfSequence { .. }
            | Self::FrameTooLarge { .. } => ErrorCategory::Connectivity,
            Self::Io(e) => io_category(e),
            Self::Application { .. } => ErrorCategory::Application,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::LeaderUnavailable { .. } => ErrorCategory::Timeout,
            Self::Decode(_) | Self::InvalidResponse(_) | Self::Config(_) | Self::SessionAborted => {
                ErrorCategory::Data
            },
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// True when the connection should be dropped and re-established.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Connectivity
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConnectionFailed(e) | Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Self::ConnectionClosed,
            _ => Self::Io(err),
        }
    }
}

impl From<gpr_core::ProbeError> for ClientError {
    fn from(err: gpr_core::ProbeError) -> Self {
        use gpr_core::ProbeError;

        match err {
            ProbeError::Io(e) => Self::from(e),
            ProbeError::InvalidMagic => Self::Protocol("invalid frame magic".to_string()),
            ProbeError::VersionMismatch { expected, actual } => {
                Self::VersionMismatch { expected, actual }
            },
            ProbeError::CrcMismatch { expected, actual } => Self::CrcMismatch { expected, actual },
            ProbeError::FrameTooLarge { size, max } => Self::FrameTooLarge { size, max },
            ProbeError::Protocol(msg) => Self::Protocol(msg),
            ProbeError::InvalidData(msg) => Self::Decode(msg),
            ProbeError::Config(msg) => Self::Config(msg),
            ProbeError::NotFound(what) => Self::NotFound(what),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failures_are_connectivity() {
        let cases = [
            ClientError::Timeout,
            ClientError::ConnectionClosed,
            ClientError::VersionMismatch {
                expected: 1,
                actual: 2,
            },
            ClientError::OutOfSequence {
                expected: 4,
                actual: 3,
            },
            ClientError::FrameTooLarge { size: 10, max: 5 },
            ClientError::from(io::Error::from(io::ErrorKind::BrokenPipe)),
            ClientError::from(io::Error::from(io::ErrorKind::ConnectionReset)),
        ];
        for err in cases {
            assert!(err.is_retryable(), "{err} should be retryable");
        }
    }

    #[test]
    fn test_unexpected_eof_maps_to_closed() {
        let err = ClientError::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, ClientError::ConnectionClosed));
    }

    #[test]
    fn test_non_transport_categories() {
        let app = ClientError::Application {
            code: ErrorCode::LeaderChanged,
            message: "moved".into(),
        };
        assert_eq!(app.category(), ErrorCategory::Application);
        assert!(!app.is_retryable());

        assert_eq!(
            ClientError::NotFound("edge".into()).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            ClientError::LeaderUnavailable {
                waited: Duration::from_secs(1)
            }
            .category(),
            ErrorCategory::Timeout
        );
        assert_eq!(
            ClientError::Decode("rank".into()).category(),
            ErrorCategory::Data
        );
        assert_eq!(
            ClientError::from(io::Error::from(io::ErrorKind::InvalidData)).category(),
            ErrorCategory::Data
        );
    }

    #[test]
    fn test_probe_error_conversion() {
        let err = ClientError::from(gpr_core::ProbeError::VersionMismatch {
            expected: 1,
            actual: 9,
        });
        assert!(err.to_string().contains("Bad version"));
        assert!(err.is_retryable());
    }
}
