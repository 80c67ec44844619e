use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::{
    config::Config,
    db::MemoryStore,
    mail::{MailError, Mailer, OutgoingMail},
    routes::create_router,
    AppState,
};

pub const TEST_API_KEY: &str = "test-api-key";

/// Keeps every message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The raw token from the most recent login link mailed out.
    pub fn last_login_token(&self) -> Option<String> {
        const MARKER: &str = "token&#61;";
        let mail = self.sent().pop()?;
        let start = mail.html.find(MARKER)? + MARKER.len();
        let token: String = mail.html[start..]
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .collect();
        (!token.is_empty()).then_some(token)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mail);
        Ok(())
    }
}

pub fn test_state() -> (Arc<AppState>, Arc<MemoryStore>, Arc<RecordingMailer>) {
    test_state_with(Config::for_tests())
}

pub fn test_state_with(config: Config) -> (Arc<AppState>, Arc<MemoryStore>, Arc<RecordingMailer>) {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    let state = Arc::new(AppState::new(config, store.clone(), mailer.clone(), None));
    (state, store, mailer)
}

pub struct TestServer {
    pub base_url: String,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve the full router on an ephemeral local port.
pub async fn spawn_server() -> TestServer {
    let (state, store, mailer) = test_state();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let app = create_router(state);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Test server stopped: {}", e);
        }
    });

    TestServer {
        base_url,
        store,
        mailer,
        handle,
    }
}
