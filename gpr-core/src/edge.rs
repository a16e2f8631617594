//! Edge records as observed from one scan direction, and the discrepancies
//! reported when the forward and reverse indexes disagree.

use crate::value::DateTime;
use std::fmt;
use std::str::FromStr;

/// Which edge index a scan reads.
///
/// `Forward` reads edges keyed by their source vertex, `Reverse` reads the
/// inverse index keyed by destination, and `Both` reads the two in turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Reverse,
    Both,
}

impl Direction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Reverse => "reverse",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" | "out" => Ok(Self::Forward),
            "reverse" | "in" => Ok(Self::Reverse),
            "both" | "all" => Ok(Self::Both),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// Identity of a logical edge: `(src, dst, rank)` after any direction swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey {
    pub src: i64,
    pub dst: i64,
    pub rank: i64,
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}@{}", self.src, self.dst, self.rank)
    }
}

/// One logical edge. Equality covers every field, and a missing timestamp
/// only equals another missing timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub src: i64,
    pub dst: i64,
    pub rank: i64,
    pub idx: String,
    pub ts: Option<DateTime>,
}

impl Edge {
    #[inline]
    #[must_use]
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            src: self.src,
            dst: self.dst,
            rank: self.rank,
        }
    }

    /// The same edge with source and destination exchanged.
    #[must_use]
    pub fn swapped(self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
            ..self
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} idx={:?}", self.key(), self.idx)?;
        match &self.ts {
            Some(ts) => write!(f, " ts={ts}"),
            None => f.write_str(" ts=null"),
        }
    }
}

/// A disagreement between the forward and reverse edge indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    /// The edge was only seen in the index named by `found_in`.
    MissingInverse { edge: Edge, found_in: Direction },
    /// Both indexes hold the key but the records differ.
    Mismatch { forward: Edge, reverse: Edge },
}

impl Discrepancy {
    #[must_use]
    pub fn key(&self) -> EdgeKey {
        match self {
            Self::MissingInverse { edge, .. } => edge.key(),
            Self::Mismatch { forward, .. } => forward.key(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::MissingInverse { .. })
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingInverse {
                edge,
                found_in: Direction::Reverse,
            } => write!(f, "missing out edge: {edge}"),
            Self::MissingInverse { edge, .. } => write!(f, "missing in edge: {edge}"),
            Self::Mismatch { forward, reverse } => {
                write!(f, "edge mismatch, out edge: {forward}, in edge: {reverse}")
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn edge(src: i64, dst: i64, rank: i64, idx: &str, ts: Option<DateTime>) -> Edge {
        Edge {
            src,
            dst,
            rank,
            idx: idx.to_string(),
            ts,
        }
    }

    #[test]
    fn test_swapped_reverse_edge_shares_key() {
        let forward = edge(1, 2, 0, "idx1", None);
        let reverse_raw = edge(2, 1, 0, "idx1", None);

        assert_ne!(forward.key(), reverse_raw.key());
        assert_eq!(forward.key(), reverse_raw.swapped().key());
        assert_eq!(forward.key().to_string(), "1->2@0");
    }

    #[test]
    fn test_equality_treats_null_timestamp_strictly() {
        let ts = DateTime {
            year: 2021,
            month: 1,
            day: 1,
            ..Default::default()
        };

        assert_eq!(edge(1, 2, 0, "a", None), edge(1, 2, 0, "a", None));
        assert_eq!(edge(1, 2, 0, "a", Some(ts)), edge(1, 2, 0, "a", Some(ts)));
        assert_ne!(edge(1, 2, 0, "a", Some(ts)), edge(1, 2, 0, "a", None));
        assert_ne!(edge(1, 2, 0, "a", None), edge(1, 2, 0, "b", None));
        assert_ne!(edge(1, 2, 0, "a", None), edge(1, 2, 1, "a", None));
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("forward".parse::<Direction>().unwrap(), Direction::Forward);
        assert_eq!("IN".parse::<Direction>().unwrap(), Direction::Reverse);
        assert_eq!("both".parse::<Direction>().unwrap(), Direction::Both);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_discrepancy_display() {
        let missing = Discrepancy::MissingInverse {
            edge: edge(1, 2, 0, "idx1", None),
            found_in: Direction::Forward,
        };
        assert_eq!(missing.to_string(), "missing in edge: 1->2@0 idx=\"idx1\" ts=null");
        assert!(missing.is_missing());
        assert_eq!(missing.key().src, 1);
    }
}
