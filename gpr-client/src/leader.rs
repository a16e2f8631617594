//! Leader discovery for one partition.
//!
//! The cache moves `Unknown -> Refreshing -> Known`, and back to
//! `Refreshing` whenever a known leader goes stale. At most one refresh runs
//! per [`ClusterView`]; it is spawned in the background, so stale callers are
//! answered from cache while it runs. Callers with nothing cached wait for
//! the refresh to finish, bounded by `leader_wait`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cluster::ClusterView;
use crate::error::{ClientError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LeaderCache {
    #[default]
    Unknown,
    /// A refresh is in flight. `stale` is the previously known leader.
    Refreshing { stale: Option<String> },
    Known(String),
}

#[derive(Debug, Default)]
pub(crate) struct LeaderSlot {
    pub(crate) state: LeaderCache,
    /// When a refresh last resolved a leader
    pub(crate) last_refresh: Option<Instant>,
    /// When a refresh was last started
    pub(crate) last_attempt: Option<Instant>,
    pub(crate) task: Option<JoinHandle<()>>,
}

/// One peer's leadership claim from a completed raft-state query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftVote {
    pub peer_id: String,
    pub term: i64,
    pub is_leader: bool,
}

/// Pick the leader among `votes`: the highest term among peers claiming
/// leadership, ties going to the lexicographically smallest peer id.
#[must_use]
pub fn resolve_leader(votes: &[RaftVote]) -> Option<String> {
    votes
        .iter()
        .filter(|vote| vote.is_leader)
        .max_by(|a, b| {
            a.term
                .cmp(&b.term)
                .then_with(|| b.peer_id.cmp(&a.peer_id))
        })
        .map(|vote| vote.peer_id.clone())
}

#[derive(Debug, Clone)]
pub struct LeaderTracker {
    view: Arc<ClusterView>,
}

impl LeaderTracker {
    pub fn new(view: Arc<ClusterView>) -> Self {
        Self { view }
    }

    #[inline]
    pub fn view(&self) -> &Arc<ClusterView> {
        &self.view
    }

    /// Current cache state, for diagnostics.
    pub async fn cache_state(&self) -> LeaderCache {
        self.view.leader.lock().await.state.clone()
    }

    /// Id of the current leader.
    ///
    /// Fails with [`ClientError::LeaderUnavailable`] when no leader is
    /// resolved within `leader_wait`, and [`ClientError::Cancelled`] once the
    /// view is closed.
    pub async fn get_leader(&self) -> Result<String> {
        let wait = self.view.config().leader_wait;
        match tokio::time::timeout(wait, self.await_leader()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    target: "gpr::raft",
                    space = self.view.space_id(),
                    part = self.view.partition_id(),
                    waited_ms = wait.as_millis() as u64,
                    "No leader found"
                );
                Err(ClientError::LeaderUnavailable { waited: wait })
            },
        }
    }

    async fn await_leader(&self) -> Result<String> {
        let retry_delay = self.view.config().retry_delay;
        let mut refreshed = self.view.refreshed.subscribe();

        loop {
            if self.view.is_closed() {
                return Err(ClientError::Cancelled);
            }
            if let Some(leader) = self.poll().await {
                return Ok(leader);
            }
            tokio::select! {
                changed = refreshed.changed() => {
                    if changed.is_err() {
                        return Err(ClientError::Cancelled);
                    }
                }
                () = tokio::time::sleep(retry_delay) => {}
            }
        }
    }

    /// Serve from cache, starting a refresh when the cache is stale. Never
    /// waits on the network.
    async fn poll(&self) -> Option<String> {
        let config = self.view.config();
        let mut guard = self.view.leader.lock().await;
        let slot = &mut *guard;
        let now = Instant::now();

        match &slot.state {
            LeaderCache::Known(leader)
                if is_fresh(slot.last_refresh, now, config.refresh_interval) =>
            {
                return Some(leader.clone());
            },
            LeaderCache::Refreshing { stale } => return stale.clone(),
            LeaderCache::Unknown if is_fresh(slot.last_attempt, now, config.retry_delay) => {
                return None;
            },
            _ => {},
        }

        let stale = match &slot.state {
            LeaderCache::Known(leader) => Some(leader.clone()),
            _ => None,
        };
        debug!(target: "gpr::raft", stale = ?stale, "Starting leader refresh");

        slot.state = LeaderCache::Refreshing {
            stale: stale.clone(),
        };
        slot.last_attempt = Some(now);
        slot.task = Some(tokio::spawn(refresh(Arc::clone(&self.view))));
        stale
    }
}

fn is_fresh(at: Option<Instant>, now: Instant, window: Duration) -> bool {
    at.is_some_and(|at| now.duration_since(at) < window)
}

async fn refresh(view: Arc<ClusterView>) {
    let reports = view.poll_raft_states().await;
    let votes: Vec<RaftVote> = reports
        .iter()
        .filter_map(|report| {
            report.outcome.as_ref().ok().map(|state| RaftVote {
                peer_id: report.peer_id.clone(),
                term: state.term,
                is_leader: state.is_leader,
            })
        })
        .collect();
    let leader = resolve_leader(&votes);

    {
        let mut slot = view.leader.lock().await;
        let previous = match &slot.state {
            LeaderCache::Refreshing { stale } => stale.clone(),
            LeaderCache::Known(leader) => Some(leader.clone()),
            LeaderCache::Unknown => None,
        };

        match &leader {
            Some(leader) => {
                if previous.as_deref() != Some(leader.as_str()) {
                    info!(
                        target: "gpr::raft",
                        leader = %leader,
                        previous = ?previous,
                        votes = votes.len(),
                        "Leader resolved"
                    );
                }
                slot.state = LeaderCache::Known(leader.clone());
                slot.last_refresh = Some(Instant::now());
            },
            None => {
                debug!(
                    target: "gpr::raft",
                    responded = votes.len(),
                    peers = reports.len(),
                    "No peer claims leadership"
                );
                slot.state = LeaderCache::Unknown;
            },
        }
        slot.task = None;
    }

    view.refreshed.send_modify(|generation| *generation += 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(peer_id: &str, term: i64, is_leader: bool) -> RaftVote {
        RaftVote {
            peer_id: peer_id.to_string(),
            term,
            is_leader,
        }
    }

    #[test]
    fn test_highest_term_leader_wins() {
        let votes = [vote("A", 5, true), vote("B", 7, true), vote("C", 3, false)];
        assert_eq!(resolve_leader(&votes).as_deref(), Some("B"));
    }

    #[test]
    fn test_follower_with_higher_term_is_ignored() {
        let votes = [vote("A", 5, true), vote("B", 9, false)];
        assert_eq!(resolve_leader(&votes).as_deref(), Some("A"));
    }

    #[test]
    fn test_tie_breaks_on_lowest_id_regardless_of_order() {
        let forward = [vote("b", 4, true), vote("a", 4, true), vote("c", 4, true)];
        let mut backward = forward.clone();
        backward.reverse();

        assert_eq!(resolve_leader(&forward).as_deref(), Some("a"));
        assert_eq!(resolve_leader(&backward).as_deref(), Some("a"));
    }

    #[test]
    fn test_no_claims_no_leader() {
        assert_eq!(resolve_leader(&[]), None);
        assert_eq!(resolve_leader(&[vote("a", 3, false)]), None);
    }

    #[test]
    fn test_term_zero_is_a_valid_claim() {
        assert_eq!(resolve_leader(&[vote("a", 0, true)]).as_deref(), Some("a"));
    }
}
