use std::sync::Arc;

use super::error::WaitlistError;
use crate::{
    db::{QueryTimeout, WaitlistStore},
    models::referralmodel::{LeaderboardEntry, MemberTally},
};

pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;
pub const MAX_LEADERBOARD_SIZE: usize = 100;

/// Read-only view of members ordered by how many signups they brought in.
pub struct RankingEngine {
    store: Arc<dyn WaitlistStore>,
}

impl RankingEngine {
    pub fn new(store: Arc<dyn WaitlistStore>) -> Self {
        RankingEngine { store }
    }

    pub async fn top_n(&self, n: usize) -> Result<Vec<LeaderboardEntry>, WaitlistError> {
        let n = n.min(MAX_LEADERBOARD_SIZE);
        if n == 0 {
            return Ok(Vec::new());
        }

        let tallies = QueryTimeout::run(
            self.store.get_referral_tallies(n as i64),
            QueryTimeout::DEFAULT_TIMEOUT,
        )
        .await?;

        let entries = rank_entries(tallies, n);
        tracing::debug!("Leaderboard computed with {} entries", entries.len());
        Ok(entries)
    }
}

/// Order by referral count (highest first), then earliest join, then id,
/// and number the result from 1. The store already sorts; sorting again
/// keeps ranks correct whatever order the rows arrive in.
pub fn rank_entries(mut tallies: Vec<MemberTally>, n: usize) -> Vec<LeaderboardEntry> {
    tallies.sort_by(|a, b| {
        b.referral_count
            .cmp(&a.referral_count)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.member_id.cmp(&b.member_id))
    });

    tallies
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(index, tally)| LeaderboardEntry {
            full_name: tally.full_name,
            brand_name: tally.brand_name,
            referral_code: tally.referral_code,
            referral_count: tally.referral_count,
            rank: index as u32 + 1,
        })
        .collect()
}
