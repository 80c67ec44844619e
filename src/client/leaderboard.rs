use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, PoisonError, RwLock,
};

use super::{api::WaitlistApi, ClientError, InFlight};
use crate::{models::referralmodel::LeaderboardEntry, service::ranking_service::DEFAULT_LEADERBOARD_SIZE};

/// The public leaderboard as the landing page shows it. A refetch while one
/// is still running is turned away instead of queued.
pub struct LeaderboardFeed {
    api: Arc<WaitlistApi>,
    limit: usize,
    entries: RwLock<Vec<LeaderboardEntry>>,
    refreshing: AtomicBool,
}

impl LeaderboardFeed {
    pub fn new(api: Arc<WaitlistApi>) -> Self {
        LeaderboardFeed::with_limit(api, DEFAULT_LEADERBOARD_SIZE)
    }

    pub fn with_limit(api: Arc<WaitlistApi>, limit: usize) -> Self {
        LeaderboardFeed {
            api,
            limit,
            entries: RwLock::new(Vec::new()),
            refreshing: AtomicBool::new(false),
        }
    }

    /// Whether the refresh trigger should be disabled.
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    pub fn entries(&self) -> Vec<LeaderboardEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Initial load; same as a refetch.
    pub async fn load(&self) -> Result<Vec<LeaderboardEntry>, ClientError> {
        self.refetch().await
    }

    pub async fn refetch(&self) -> Result<Vec<LeaderboardEntry>, ClientError> {
        let _in_flight =
            InFlight::try_acquire(&self.refreshing).ok_or(ClientError::AlreadyRefreshing)?;

        let entries = self.api.leaderboard(Some(self.limit)).await?;
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = entries.clone();
        tracing::debug!("Leaderboard refreshed with {} entries", entries.len());
        Ok(entries)
    }
}
