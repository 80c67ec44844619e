pub mod provider;
pub mod routes;
pub mod state;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};

use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
};

pub use provider::{AuthChange, AuthChangeEvent, AuthClient};
pub use routes::{Access, Navigation, RouteTable, View};
pub use state::GateState;

use crate::service::error::WaitlistError;

struct GateInner {
    /// Logical clock; every update takes the next tick.
    clock: AtomicU64,
    /// Tick of the update the current state came from.
    applied: Mutex<u64>,
    state_tx: watch::Sender<GateState>,
}

impl GateInner {
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply `state` unless something newer already has been.
    fn apply(&self, stamp: u64, state: GateState) -> bool {
        let mut applied = self.applied.lock().unwrap_or_else(PoisonError::into_inner);
        if stamp <= *applied {
            tracing::debug!("Dropping stale session update (stamp {} <= {})", stamp, *applied);
            return false;
        }
        *applied = stamp;

        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        })
    }
}

/// Owns the visitor's authentication state and decides which view a path
/// renders. Start it once, share it by `Arc`, and shut it down (or drop it)
/// to release the provider subscription.
pub struct SessionGate {
    inner: Arc<GateInner>,
    auth: Arc<dyn AuthClient>,
    routes: RouteTable,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionGate {
    pub fn start(auth: Arc<dyn AuthClient>) -> SessionGate {
        SessionGate::start_with_routes(auth, RouteTable::default())
    }

    /// Must be called inside a tokio runtime.
    pub fn start_with_routes(auth: Arc<dyn AuthClient>, routes: RouteTable) -> SessionGate {
        let (state_tx, _) = watch::channel(GateState::Initializing);
        let inner = Arc::new(GateInner {
            clock: AtomicU64::new(0),
            applied: Mutex::new(0),
            state_tx,
        });

        let mut changes = auth.subscribe();
        // Stamped before any notification can be received, so a recovery
        // that resolves late loses to whatever arrived in the meantime.
        let recovery_stamp = inner.tick();

        let listener = {
            let inner = inner.clone();
            tokio::spawn(async move {
                loop {
                    match changes.recv().await {
                        Ok(change) => {
                            let stamp = inner.tick();
                            match GateState::from_change(&change) {
                                Some(state) => {
                                    if inner.apply(stamp, state) {
                                        tracing::debug!("Session gate moved on {:?}", change.event);
                                    }
                                }
                                None => tracing::debug!("Ignoring {:?} without a session", change.event),
                            }
                        }
                        Err(RecvError::Lagged(missed)) => {
                            tracing::warn!("Session gate missed {} notifications", missed);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        };

        let recovery = {
            let inner = inner.clone();
            let auth = auth.clone();
            tokio::spawn(async move {
                let state = match auth.get_session().await {
                    Ok(session) => GateState::from_recovered(session),
                    Err(e) => {
                        tracing::warn!("Could not recover the session: {}", e);
                        GateState::Anonymous
                    }
                };
                inner.apply(recovery_stamp, state);
            })
        };

        SessionGate {
            inner,
            auth,
            routes,
            tasks: Mutex::new(vec![listener, recovery]),
        }
    }

    pub fn current(&self) -> GateState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.inner.state_tx.subscribe()
    }

    /// Wait until the gate has left `Initializing`.
    pub async fn wait_ready(&self) -> GateState {
        let mut rx = self.subscribe();
        let ready = rx.wait_for(GateState::is_ready).await.map(|state| state.clone());
        ready.unwrap_or_else(|_| self.current())
    }

    pub fn navigate(&self, path: &str) -> Navigation {
        self.routes.resolve(path, &self.current())
    }

    /// Drops to `Anonymous` at once, then clears the session at the provider.
    /// The provider's own sign-out notification lands on the same state.
    pub async fn sign_out(&self) -> Result<(), WaitlistError> {
        let stamp = self.inner.tick();
        self.inner.apply(stamp, GateState::Anonymous);
        tracing::info!("Signed out");

        self.auth.sign_out().await
    }

    /// The server refused the session; treat the visitor as signed out and
    /// drop the session the provider still holds.
    pub async fn invalidate(&self) {
        let stamp = self.inner.tick();
        if self.inner.apply(stamp, GateState::Anonymous) {
            tracing::info!("Session rejected by the server; gate is now anonymous");
        }

        if let Err(e) = self.auth.sign_out().await {
            tracing::warn!("Could not clear the rejected session: {}", e);
        }
    }

    pub fn shutdown(&self) {
        let tasks = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            task.abort();
        }
    }
}

impl Drop for SessionGate {
    fn drop(&mut self) {
        self.shutdown();
    }
}
