pub mod db;
pub mod memberdb;
pub mod memorydb;
pub mod query_timeout;
pub mod referraldb;
pub mod tokendb;

use std::time::Duration;

use thiserror::Error;

pub use self::{
    db::DBClient,
    memberdb::MemberExt,
    memorydb::MemoryStore,
    query_timeout::QueryTimeout,
    referraldb::ReferralExt,
    tokendb::LoginTokenExt,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),
}

/// Everything the waitlist needs from durable storage.
pub trait WaitlistStore: MemberExt + ReferralExt + LoginTokenExt + Send + Sync {}

impl<T> WaitlistStore for T where T: MemberExt + ReferralExt + LoginTokenExt + Send + Sync {}
