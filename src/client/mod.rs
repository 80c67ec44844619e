pub mod api;
pub mod auth;
pub mod dashboard;
pub mod form;
pub mod leaderboard;

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::service::error::WaitlistError;

pub use api::{JoinOutcome, WaitlistApi};
pub use auth::HttpAuthClient;
pub use dashboard::{DashboardLoad, DashboardView};
pub use form::WaitlistForm;
pub use leaderboard::LeaderboardFeed;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("A submission is already in progress")]
    AlreadySubmitting,

    #[error("The leaderboard is already refreshing")]
    AlreadyRefreshing,

    #[error(transparent)]
    Request(#[from] WaitlistError),
}

/// Marks an operation as in flight until dropped, so a cancelled caller
/// still frees the slot.
pub(crate) struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<InFlight<'a>> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight { flag })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_holder_at_a_time() {
        let flag = AtomicBool::new(false);
        let first = InFlight::try_acquire(&flag);
        assert!(first.is_some());
        assert!(InFlight::try_acquire(&flag).is_none());

        drop(first);
        assert!(InFlight::try_acquire(&flag).is_some());
    }
}
