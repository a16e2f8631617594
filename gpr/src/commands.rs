use std::sync::Arc;

use gpr_client::{
    CheckReport, ClientError, ClusterView, ConsistencyChecker, EdgeScanner, LeaderTracker,
    PeerReport,
};
use gpr_core::{Direction, ProbeError};
use thiserror::Error;
use tracing::info;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ProbeError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("interrupted")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, CommandError>;

/// One diagnostic run against one (space, partition).
pub struct Probe {
    config: Config,
    tracker: LeaderTracker,
    scanner: EdgeScanner,
}

impl Probe {
    pub async fn connect(config: Config) -> Result<Self> {
        let view = ClusterView::new(config.cluster_config()?).await?;
        let tracker = LeaderTracker::new(view);
        let scanner = EdgeScanner::new(tracker.clone(), config.scan_config());
        Ok(Self {
            config,
            tracker,
            scanner,
        })
    }

    #[inline]
    pub fn view(&self) -> &Arc<ClusterView> {
        self.tracker.view()
    }

    /// Close every peer connection. Safe to call more than once.
    pub async fn close(&self) {
        self.view().close().await;
    }

    pub async fn check_edges(&self) -> Result<CheckReport> {
        let edge = &self.config.edge_name;
        let report = ConsistencyChecker::new(&self.scanner).check(edge).await?;
        print!("{}", render_report(edge, &self.config, &report));
        Ok(report)
    }

    pub async fn leader(&self) -> Result<String> {
        let leader = self.tracker.get_leader().await?;
        let spec = self.view().peer_spec(&leader)?;
        println!(
            "Leader of space {} part {}: {} ({})",
            self.config.space_id,
            self.config.partition_id,
            leader,
            spec.addr()
        );
        Ok(leader)
    }

    pub async fn raft_state(&self) -> Result<()> {
        let reports = self.view().poll_raft_states().await;
        println!(
            "Raft state of space {} part {}:",
            self.config.space_id, self.config.partition_id
        );
        for report in &reports {
            println!("  {}", render_peer(report));
        }
        Ok(())
    }

    /// Print edges as they are paged in, stopping after `limit` if given.
    pub async fn scan_edges(&self, direction: Direction, limit: Option<usize>) -> Result<usize> {
        let edge = &self.config.edge_name;
        let mut scan = self.scanner.open(edge, direction).await?;
        let mut printed = 0usize;

        'pages: while let Some(page) = scan.next_page().await? {
            for item in page {
                if limit.is_some_and(|limit| printed >= limit) {
                    break 'pages;
                }
                println!("{}", item);
                printed += 1;
            }
        }

        info!(target: "gpr::scan", edge = %edge, direction = %direction, printed, "Scan printed");
        Ok(printed)
    }
}

pub fn render_report(edge: &str, config: &Config, report: &CheckReport) -> String {
    let mut out = format!(
        "Edge {} (space {}, part {})\n  Forward edges: {}\n  Reverse edges: {}\n",
        edge, config.space_id, config.partition_id, report.forward_count, report.reverse_count
    );
    for discrepancy in &report.discrepancies {
        out.push_str(&format!("  {}\n", discrepancy));
    }
    if report.is_consistent() {
        out.push_str("  Consistent\n");
    } else {
        out.push_str(&format!(
            "  Missing: {}\n  Mismatched: {}\n",
            report.missing_count(),
            report.mismatch_count()
        ));
    }
    out
}

pub fn render_peer(report: &PeerReport) -> String {
    match &report.outcome {
        Ok(state) => format!(
            "{} ({}): role={:?} term={} is_leader={} committed={} last_log={} last_log_term={} status={:?}",
            report.peer_id,
            report.addr,
            state.role,
            state.term,
            state.is_leader,
            state.committed_log_id,
            state.last_log_id,
            state.last_log_term,
            state.status
        ),
        Err(e) => format!(
            "{} ({}): unavailable [{}] {}",
            report.peer_id,
            report.addr,
            e.category(),
            e
        ),
    }
}
