pub mod client;
pub mod config;
pub mod db;
pub mod dtos;
pub mod error;
pub mod gate;
pub mod handler;
pub mod mail;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod service;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use redis::aio::ConnectionManager;

use config::Config;
use db::WaitlistStore;
use mail::Mailer;
use service::{
    dashboard_service::DashboardAggregator, magic_link_service::MagicLinkService,
    ranking_service::RankingEngine, waitlist_service::ReferralAttributor,
};

pub struct AppState {
    pub env: Config,
    pub db_client: Arc<dyn WaitlistStore>,
    pub magic_links: Arc<MagicLinkService>,
    pub attributor: Arc<ReferralAttributor>,
    pub ranking: Arc<RankingEngine>,
    pub dashboard: Arc<DashboardAggregator>,
}

impl AppState {
    pub fn new(
        config: Config,
        db_client: Arc<dyn WaitlistStore>,
        mailer: Arc<dyn Mailer>,
        redis: Option<Arc<ConnectionManager>>,
    ) -> Self {
        let magic_links = Arc::new(MagicLinkService::new(
            &config,
            db_client.clone(),
            mailer,
            redis.clone(),
        ));

        let attributor = Arc::new(ReferralAttributor::new(
            &config,
            db_client.clone(),
            magic_links.clone(),
            ReferralAttributor::limiter_for(&config, redis),
        ));

        let ranking = Arc::new(RankingEngine::new(db_client.clone()));
        let dashboard = Arc::new(DashboardAggregator::new(&config, db_client.clone()));

        Self {
            env: config,
            db_client,
            magic_links,
            attributor,
            ranking,
            dashboard,
        }
    }
}
