pub mod dashboard_service;
pub mod error;
pub mod magic_link_service;
pub mod ranking_service;
pub mod referral;
pub mod waitlist_service;
