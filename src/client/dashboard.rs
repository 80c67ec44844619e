use std::sync::Arc;

use super::api::WaitlistApi;
use crate::{
    dtos::waitlistdtos::DashboardResponseDto,
    gate::{routes::PUBLIC_HOME, GateState, SessionGate},
    service::error::WaitlistError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardLoad {
    Loaded(DashboardResponseDto),
    /// No usable session; the visitor belongs on this path instead.
    Redirect(String),
}

/// The private dashboard page, loaded for whatever session the gate holds.
pub struct DashboardView {
    api: Arc<WaitlistApi>,
    gate: Arc<SessionGate>,
}

impl DashboardView {
    pub fn new(api: Arc<WaitlistApi>, gate: Arc<SessionGate>) -> Self {
        DashboardView { api, gate }
    }

    pub async fn load(&self) -> Result<DashboardLoad, WaitlistError> {
        let session = match self.gate.wait_ready().await {
            GateState::Authenticated(session) => session,
            _ => return Ok(DashboardLoad::Redirect(PUBLIC_HOME.to_string())),
        };

        match self.api.dashboard(&session).await {
            Ok(dashboard) => Ok(DashboardLoad::Loaded(dashboard)),
            Err(WaitlistError::Unauthorized(message)) => {
                tracing::info!("Dashboard refused the session: {}", message);
                self.gate.invalidate().await;
                Ok(DashboardLoad::Redirect(PUBLIC_HOME.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}
