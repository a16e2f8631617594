//! Forward/reverse edge index reconciliation.

use std::collections::BTreeMap;

use gpr_core::{Direction, Discrepancy, Edge, EdgeKey};
use tracing::{info, warn};

use crate::error::Result;
use crate::scanner::EdgeScanner;

/// Result of one audit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub forward_count: usize,
    pub reverse_count: usize,
    /// Sorted by edge key
    pub discrepancies: Vec<Discrepancy>,
}

impl CheckReport {
    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.discrepancies.iter().filter(|d| d.is_missing()).count()
    }

    #[must_use]
    pub fn mismatch_count(&self) -> usize {
        self.discrepancies.len() - self.missing_count()
    }

    #[inline]
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Compare two scans that are already in forward orientation.
///
/// Duplicate keys within one side keep the last record seen.
#[must_use]
pub fn reconcile(forward: Vec<Edge>, reverse: Vec<Edge>) -> CheckReport {
    let forward_count = forward.len();
    let reverse_count = reverse.len();

    let index = |edges: Vec<Edge>| -> BTreeMap<EdgeKey, Edge> {
        edges.into_iter().map(|edge| (edge.key(), edge)).collect()
    };
    let forward = index(forward);
    let mut reverse = index(reverse);

    let mut discrepancies = Vec::new();
    for (key, out_edge) in forward {
        match reverse.remove(&key) {
            Some(in_edge) if in_edge != out_edge => discrepancies.push(Discrepancy::Mismatch {
                forward: out_edge,
                reverse: in_edge,
            }),
            Some(_) => {},
            None => discrepancies.push(Discrepancy::MissingInverse {
                edge: out_edge,
                found_in: Direction::Forward,
            }),
        }
    }
    discrepancies.extend(reverse.into_values().map(|edge| Discrepancy::MissingInverse {
        edge,
        found_in: Direction::Reverse,
    }));
    discrepancies.sort_by_key(Discrepancy::key);

    CheckReport {
        forward_count,
        reverse_count,
        discrepancies,
    }
}

/// Read-only audit of one edge type's two indexes.
#[derive(Debug)]
pub struct ConsistencyChecker<'a> {
    scanner: &'a EdgeScanner,
}

impl<'a> ConsistencyChecker<'a> {
    pub fn new(scanner: &'a EdgeScanner) -> Self {
        Self { scanner }
    }

    /// Scan both directions of `edge_name` and report every disagreement.
    pub async fn check(&self, edge_name: &str) -> Result<CheckReport> {
        let forward = self.scanner.scan(edge_name, Direction::Forward).await?;
        let reverse = self.scanner.scan(edge_name, Direction::Reverse).await?;

        let report = reconcile(forward, reverse);
        for discrepancy in &report.discrepancies {
            warn!(target: "gpr::check", edge = edge_name, "{}", discrepancy);
        }
        info!(
            target: "gpr::check",
            edge = edge_name,
            forward = report.forward_count,
            reverse = report.reverse_count,
            missing = report.missing_count(),
            mismatched = report.mismatch_count(),
            "Edge check complete"
        );
        Ok(report)
    }
}
