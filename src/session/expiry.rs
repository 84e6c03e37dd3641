//! Session-expiry broadcaster.
//!
//! The REST client and the push connection report authentication failures
//! here; whoever owns navigation subscribes and redirects to login. At most
//! one [`SessionExpired`] is broadcast per session, however many requests
//! fail with 401 at the same time.

use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::metrics;

/// Endpoints whose 401 is part of the unauthenticated flow itself.
pub const DEFAULT_AUTH_ENDPOINTS: &[&str] =
    &["/v1/auth/login", "/v1/auth/register", "/v1/auth/whoami"];

lazy_static! {
    static ref GLOBAL_SIGNAL: SessionExpirySignal = SessionExpirySignal::new(
        DEFAULT_AUTH_ENDPOINTS.iter().map(|s| s.to_string()).collect()
    );
}

/// Identifies one authenticated session. Requests are stamped with the
/// generation they were issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionGeneration(u64);

/// Broadcast payload: the session is invalid, go back to login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionExpired {
    pub generation: SessionGeneration,
}

#[derive(Debug, Default)]
struct SessionState {
    generation: u64,
    active: bool,
    fired: bool,
}

struct Inner {
    state: Mutex<SessionState>,
    sender: broadcast::Sender<SessionExpired>,
    auth_endpoints: Vec<String>,
}

#[derive(Clone)]
pub struct SessionExpirySignal {
    inner: Arc<Inner>,
}

impl SessionExpirySignal {
    pub fn new(auth_endpoints: Vec<String>) -> Self {
        let (sender, _) = broadcast::channel(8);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState::default()),
                sender,
                auth_endpoints,
            }),
        }
    }

    /// Process-wide instance using the default auth endpoints.
    pub fn global() -> &'static SessionExpirySignal {
        &GLOBAL_SIGNAL
    }

    /// A credential was established (login or restored token).
    pub fn begin_session(&self) -> SessionGeneration {
        let mut state = self.inner.state.lock().unwrap();
        state.generation += 1;
        state.active = true;
        state.fired = false;
        debug!("Session generation {} started", state.generation);
        SessionGeneration(state.generation)
    }

    /// The credential was dropped on purpose (logout).
    pub fn end_session(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.active = false;
    }

    /// The current session, if one is active.
    pub fn current(&self) -> Option<SessionGeneration> {
        let state = self.inner.state.lock().unwrap();
        state.active.then_some(SessionGeneration(state.generation))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionExpired> {
        self.inner.sender.subscribe()
    }

    /// Whether `endpoint` (a path or full URL) belongs to the auth flow.
    pub fn is_auth_endpoint(&self, endpoint: &str) -> bool {
        let path = endpoint.split('?').next().unwrap_or(endpoint);
        let path = path.trim_end_matches('/');
        self.inner
            .auth_endpoints
            .iter()
            .any(|e| path.ends_with(e.trim_end_matches('/')))
    }

    /// Report an authentication failure seen by a request issued under
    /// `generation`. Returns true if this report fired the signal.
    pub fn report_unauthorized(&self, generation: SessionGeneration, endpoint: &str) -> bool {
        if self.is_auth_endpoint(endpoint) {
            debug!("Ignoring 401 from auth endpoint {}", endpoint);
            return false;
        }

        {
            let mut state = self.inner.state.lock().unwrap();
            if !state.active || state.fired || state.generation != generation.0 {
                debug!(
                    "Ignoring 401 from {} for generation {} (current {}, active {})",
                    endpoint, generation.0, state.generation, state.active
                );
                return false;
            }
            state.fired = true;
            state.active = false;
        }

        info!(
            "Session generation {} expired (detected by {})",
            generation.0, endpoint
        );
        metrics::record_session_expired();

        // No subscriber is not an error: nobody is left to redirect.
        let _ = self.inner.sender.send(SessionExpired { generation });
        true
    }
}
